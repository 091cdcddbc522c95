use std::time::Duration;

use crate::request::StudyRequest;
use crate::response::{ParseError, StudyResponse};

/// Failure of one generation attempt. Every variant leaves the session in
/// the same recoverable error state; the distinction is diagnostic only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("provider rejected the request ({status}): {body}")]
    ProviderRejected { status: u16, body: String },
    #[error("provider did not answer within {}s", .0.as_secs_f64())]
    ProviderTimeout(Duration),
    #[error(transparent)]
    Response(#[from] ParseError),
}

impl GenerationError {
    /// Short machine-readable tag for logs.
    pub fn code(&self) -> &'static str {
        match self {
            GenerationError::ProviderUnavailable(_) => "provider_unavailable",
            GenerationError::ProviderRejected { .. } => "provider_rejected",
            GenerationError::ProviderTimeout(_) => "provider_timeout",
            GenerationError::Response(ParseError::MalformedJson(_)) => "malformed_json",
            GenerationError::Response(ParseError::SchemaViolation(_)) => "schema_violation",
        }
    }
}

/// A generative-language backend that answers a study request with a
/// schema-conformant response.
pub trait StudyProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &StudyRequest) -> Result<StudyResponse, GenerationError>;
}
