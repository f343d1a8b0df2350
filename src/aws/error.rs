// ABOUTME: Error type shared by every AWS client trait.
// ABOUTME: Separates expected remote failures from malformed requests.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AwsError {
    #[error("AWS credentials unavailable: {0}")]
    Credentials(String),

    #[error("{service} error {code}: {message}")]
    Service {
        service: &'static str,
        code: String,
        message: String,
    },

    #[error("request to {service} failed: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    /// The request itself was malformed. Indicates a bug, not a remote condition.
    #[error("invalid {service} request: {message}")]
    InvalidRequest {
        service: &'static str,
        message: String,
    },
}

impl AwsError {
    pub fn service(service: &'static str, code: impl Into<String>, message: impl Into<String>) -> Self {
        AwsError::Service {
            service,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether a step should turn this into a failed outcome instead of
    /// propagating it.
    pub fn is_expected(&self) -> bool {
        !matches!(self, AwsError::InvalidRequest { .. })
    }

    /// Service error code, if the service returned one.
    pub fn code(&self) -> Option<&str> {
        match self {
            AwsError::Service { code, .. } => Some(code),
            _ => None,
        }
    }
}
