use serde::{Deserialize, Serialize};

/// Caller-supplied, untrusted. The language stays a plain string here so an
/// unrecognized tag can be rejected before any sandbox work starts.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionRequest {
    pub language: String,
    pub code: String,
}

/// What the caller gets back for code that actually ran: the stringified
/// return value, or the error the submitted code raised. Orchestration
/// failures never produce one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn runtime_error(message: String) -> Self {
        Self {
            result: String::new(),
            error: Some(message),
        }
    }
}
