//! In-process test doubles for pipelines and adjudicators.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use claimcheck::adapters::{
    Adjudicator, Pipeline, PipelineInput, RunCredentials, StageSender, StageSnapshot,
};
use claimcheck::core::{PipelineDefinition, StageRule};
use claimcheck::domain::{Event, PartialResult, PipelineId, ResultSchema, Verdict};
use serde_json::Value;
use tokio_stream::StreamExt;

/// Pipeline replaying a fixed list of stage snapshots
pub struct ScriptedPipeline {
    pub definition: PipelineDefinition,
    pub stages: Vec<StageSnapshot>,
    pub delay: Duration,
    pub fail_after: Option<(usize, String)>,
    pub launched: Arc<AtomicUsize>,
    pub finished: Arc<AtomicBool>,
}

impl ScriptedPipeline {
    pub fn new(id: &str, result_key: &str) -> Self {
        Self {
            definition: PipelineDefinition::new(id, result_key),
            stages: Vec::new(),
            delay: Duration::ZERO,
            fail_after: None,
            launched: Arc::new(AtomicUsize::new(0)),
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn schema(mut self, schema: ResultSchema) -> Self {
        self.definition.schema = schema;
        self
    }

    pub fn rule(mut self, rule: StageRule) -> Self {
        self.definition.stages.push(rule);
        self
    }

    pub fn stage(mut self, name: &str, state: Value) -> Self {
        self.stages.push(StageSnapshot::new(name, state));
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail after emitting `count` stages
    pub fn fail_after(mut self, count: usize, message: &str) -> Self {
        self.fail_after = Some((count, message.to_string()));
        self
    }

    pub fn shared(self) -> Arc<dyn Pipeline> {
        Arc::new(self)
    }
}

#[async_trait]
impl Pipeline for ScriptedPipeline {
    fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    async fn execute(&self, _input: PipelineInput, stages: StageSender) -> Result<()> {
        self.launched.fetch_add(1, Ordering::SeqCst);

        for (i, snapshot) in self.stages.iter().enumerate() {
            if let Some((count, ref message)) = self.fail_after {
                if i == count {
                    self.finished.store(true, Ordering::SeqCst);
                    anyhow::bail!("{}", message);
                }
            }

            if self.delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(self.delay).await;
            }
            stages.send(snapshot.clone()).await?;
        }

        if let Some((count, ref message)) = self.fail_after {
            if count >= self.stages.len() {
                self.finished.store(true, Ordering::SeqCst);
                anyhow::bail!("{}", message);
            }
        }

        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Adjudicator returning a fixed verdict and recording every call
#[derive(Default)]
pub struct RecordingAdjudicator {
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<BTreeMap<PipelineId, PartialResult>>>,
    /// Flags that must all be set when adjudication starts
    pub must_be_finished: Vec<Arc<AtomicBool>>,
    pub finished_at_call: Mutex<Vec<bool>>,
}

impl RecordingAdjudicator {
    pub fn watching(flags: Vec<Arc<AtomicBool>>) -> Self {
        Self {
            must_be_finished: flags,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Adjudicator for RecordingAdjudicator {
    fn name(&self) -> &str {
        "recording"
    }

    async fn adjudicate(
        &self,
        _claim: &str,
        partials: &BTreeMap<PipelineId, PartialResult>,
        _credentials: &RunCredentials,
    ) -> Result<Verdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(partials.clone());

        let all_finished = self
            .must_be_finished
            .iter()
            .all(|flag| flag.load(Ordering::SeqCst));
        self.finished_at_call.lock().unwrap().push(all_finished);

        Ok(Verdict::new("TRUE", 82.0, 91.0).with_narrative("Both pipelines agree."))
    }
}

/// Adjudicator that always fails
pub struct FailingAdjudicator;

#[async_trait]
impl Adjudicator for FailingAdjudicator {
    fn name(&self) -> &str {
        "failing"
    }

    async fn adjudicate(
        &self,
        _claim: &str,
        _partials: &BTreeMap<PipelineId, PartialResult>,
        _credentials: &RunCredentials,
    ) -> Result<Verdict> {
        anyhow::bail!("judge model unavailable")
    }
}

/// Collect every event of a stream
pub async fn collect<S>(stream: S) -> Vec<Event>
where
    S: tokio_stream::Stream<Item = Event> + Unpin,
{
    stream.collect().await
}

/// Messages of log events attributed to `producer`, in stream order
pub fn logs_of<'a>(events: &'a [Event], producer: &str) -> Vec<&'a str> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Log { producer: p, message } if p.as_str() == producer => Some(message.as_str()),
            _ => None,
        })
        .collect()
}
