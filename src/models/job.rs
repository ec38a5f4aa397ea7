use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One unit of work handed out by the job queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(default)]
    pub input: Value,
}

impl Job {
    pub fn new(id: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            input,
        }
    }
}

/// The validated job payload.
#[derive(Debug, Clone, PartialEq)]
pub struct JobInput {
    pub prompt: String,
    pub image_url: String,
}

impl JobInput {
    /// Returns `None` when either field is absent, not a string, or empty.
    pub fn from_value(input: &Value) -> Option<Self> {
        let field = |name: &str| {
            input
                .get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Some(Self {
            prompt: field("prompt")?,
            image_url: field("image_url")?,
        })
    }
}
