//! Partial results contributed by individual pipelines.
//!
//! Internally each known pipeline output has its own schema. The open
//! string-keyed mapping only appears at the outward boundary via
//! [`PartialResult::into_map`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Extras key holding typed fields whose value had the wrong shape
pub const REJECTED_FIELDS_KEY: &str = "rejected_fields";

/// Typed field name and a shape check for its value
type FieldCheck = (&'static str, fn(&Value) -> bool);

fn fits<T: DeserializeOwned>(value: &Value) -> bool {
    T::deserialize(value).is_ok()
}

const EVIDENCE_FIELDS: [FieldCheck; 1] = [("search_results", fits::<Vec<Value>>)];

const INTEGRITY_FIELDS: [FieldCheck; 5] = [
    ("integrity_score", fits::<f64>),
    ("verdict", fits::<String>),
    ("penalties_applied", fits::<Vec<Value>>),
    ("detection_summary", fits::<Map<String, Value>>),
    ("checks_performed", fits::<Vec<Value>>),
];

/// Which result shape a pipeline produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSchema {
    /// Fact-checking dossier with discovered sources
    Evidence,

    /// Forensic integrity log
    Integrity,

    /// Any other mapping, passed through untouched
    Open,
}

impl Default for ResultSchema {
    fn default() -> Self {
        Self::Open
    }
}

/// Output of the fact-checking pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceDossier {
    /// Sources found while corroborating the claim
    #[serde(default)]
    pub search_results: Vec<Value>,

    /// Remaining fields (assessment, citations, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Output of the forensic integrity pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForensicLog {
    #[serde(default)]
    pub integrity_score: f64,

    #[serde(default = "unknown_verdict")]
    pub verdict: String,

    #[serde(default)]
    pub penalties_applied: Vec<Value>,

    #[serde(default)]
    pub detection_summary: Map<String, Value>,

    #[serde(default)]
    pub checks_performed: Vec<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn unknown_verdict() -> String {
    "UNKNOWN".to_string()
}

/// The terminal structured output of one pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PartialResult {
    Evidence(EvidenceDossier),
    Integrity(ForensicLog),
    Open(Map<String, Value>),
}

impl PartialResult {
    /// Structurally complete default used when a pipeline produced nothing
    pub fn empty(schema: ResultSchema) -> Self {
        match schema {
            ResultSchema::Evidence => Self::Evidence(EvidenceDossier::default()),
            ResultSchema::Integrity => Self::Integrity(ForensicLog {
                verdict: unknown_verdict(),
                ..Default::default()
            }),
            ResultSchema::Open => Self::Open(Map::new()),
        }
    }

    /// Reduce a located payload to the schema's shape.
    ///
    /// Reduction never fails. An absent or non-object payload yields the empty
    /// default. Typed fields are checked one by one: `null` counts as missing,
    /// and a value of the wrong shape is defaulted and kept verbatim under
    /// `rejected_fields` in the extras. Every other key survives untouched.
    pub fn from_value(schema: ResultSchema, value: Option<Value>) -> Self {
        let Some(Value::Object(mut map)) = value else {
            return Self::empty(schema);
        };

        match schema {
            ResultSchema::Open => Self::Open(map),
            ResultSchema::Evidence => {
                let rejected = take_rejected(&mut map, &EVIDENCE_FIELDS);
                let mut dossier = match serde_json::from_value(Value::Object(map.clone())) {
                    Ok(dossier) => dossier,
                    Err(_) => EvidenceDossier {
                        extra: map,
                        ..Default::default()
                    },
                };
                attach_rejected(&mut dossier.extra, rejected);
                Self::Evidence(dossier)
            }
            ResultSchema::Integrity => {
                let rejected = take_rejected(&mut map, &INTEGRITY_FIELDS);
                let mut log = match serde_json::from_value(Value::Object(map.clone())) {
                    Ok(log) => log,
                    Err(_) => ForensicLog {
                        verdict: unknown_verdict(),
                        extra: map,
                        ..Default::default()
                    },
                };
                attach_rejected(&mut log.extra, rejected);
                Self::Integrity(log)
            }
        }
    }

    /// The schema this result belongs to
    pub fn schema(&self) -> ResultSchema {
        match self {
            Self::Evidence(_) => ResultSchema::Evidence,
            Self::Integrity(_) => ResultSchema::Integrity,
            Self::Open(_) => ResultSchema::Open,
        }
    }

    /// Project to the open string-keyed mapping used on the wire
    pub fn into_map(self) -> Map<String, Value> {
        let projected = match self {
            Self::Open(map) => return map,
            Self::Evidence(dossier) => serde_json::to_value(dossier),
            Self::Integrity(log) => serde_json::to_value(log),
        };

        match projected {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Borrowing projection, see [`PartialResult::into_map`]
    pub fn to_map(&self) -> Map<String, Value> {
        self.clone().into_map()
    }
}

/// Remove typed fields that are null or of the wrong shape.
///
/// Returns the wrongly shaped ones so they can be kept in the extras.
fn take_rejected(map: &mut Map<String, Value>, fields: &[FieldCheck]) -> Map<String, Value> {
    let mut rejected = Map::new();

    for (key, check) in fields {
        let Some(value) = map.get(*key) else {
            continue;
        };

        if value.is_null() {
            map.remove(*key);
        } else if !check(value) {
            if let Some(value) = map.remove(*key) {
                warn!(field = *key, value = %value, "Result field has the wrong shape, using default");
                rejected.insert((*key).to_string(), value);
            }
        }
    }

    rejected
}

fn attach_rejected(extra: &mut Map<String, Value>, rejected: Map<String, Value>) {
    if !rejected.is_empty() {
        extra.insert(REJECTED_FIELDS_KEY.to_string(), Value::Object(rejected));
    }
}
