use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub model: String,
    pub time_ms: u64,
    pub b2_file: String,
}

/// What the handler returns for a job: a public image URL or an error string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobOutput {
    Success { image: String, metadata: JobMetadata },
    Failure { error: String },
}

impl JobOutput {
    pub fn failure(error: impl Into<String>) -> Self {
        JobOutput::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutput::Success { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            JobOutput::Failure { error } => Some(error),
            JobOutput::Success { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_serializes_to_flat_record() {
        let output = JobOutput::Success {
            image: "https://f000.backblazeb2.com/file/outputs/a.png".into(),
            metadata: JobMetadata {
                model: "flux-dev".into(),
                time_ms: 1834,
                b2_file: "a.png".into(),
            },
        };

        assert_eq!(
            serde_json::to_value(&output).unwrap(),
            json!({
                "image": "https://f000.backblazeb2.com/file/outputs/a.png",
                "metadata": {"model": "flux-dev", "time_ms": 1834, "b2_file": "a.png"}
            })
        );
    }

    #[test]
    fn failure_serializes_to_error_only() {
        let output = JobOutput::failure("Inference failed: out of memory");
        assert_eq!(
            serde_json::to_value(&output).unwrap(),
            json!({"error": "Inference failed: out of memory"})
        );
        assert!(!output.is_success());
        assert_eq!(output.error(), Some("Inference failed: out of memory"));
    }
}
