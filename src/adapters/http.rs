//! HTTP adjudicator.
//!
//! POSTs `{"claim": ..., "partials": {...}}` to a configured endpoint and
//! expects a verdict object back. The generation credential, when present,
//! is sent as a bearer token for this request only.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::domain::{PartialResult, PipelineId, Verdict};

use super::{AdjudicationRequest, Adjudicator, RunCredentials};

/// Adjudicator reached over HTTP
pub struct HttpAdjudicator {
    /// Endpoint receiving adjudication requests
    url: String,
    /// HTTP client
    client: reqwest::Client,
}

impl HttpAdjudicator {
    /// Create an adjudicator for `url` with a request timeout
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }

    /// Endpoint this adjudicator posts to
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Adjudicator for HttpAdjudicator {
    fn name(&self) -> &str {
        "http"
    }

    async fn adjudicate(
        &self,
        claim: &str,
        partials: &BTreeMap<PipelineId, PartialResult>,
        credentials: &RunCredentials,
    ) -> Result<Verdict> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&AdjudicationRequest::new(claim, partials));

        if let Some(key) = credentials.get("generation") {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach adjudicator at {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Adjudicator returned {}: {}", status, body.trim());
        }

        response
            .json::<Verdict>()
            .await
            .context("Adjudicator response is not a verdict object")
    }
}
