use std::time::Duration;
use thiserror::Error;

/// Longest upstream body excerpt kept in an error message.
const BODY_EXCERPT_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum RagError {
    /// Malformed input or a vector of the wrong dimension.
    #[error("validation error: {0}")]
    Validation(String),

    /// Network unreachable, DNS failure, connection dropped before a response.
    #[error("connection error: {0}")]
    Connection(String),

    #[error("timed out after {} ms: {context}", elapsed.as_millis())]
    Timeout { elapsed: Duration, context: String },

    /// Non-2xx answer from an upstream service.
    #[error("upstream returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RagError>;

impl RagError {
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::Validation(_) => "validation_error",
            RagError::Connection(_) => "connection_error",
            RagError::Timeout { .. } => "timeout",
            RagError::Upstream { .. } => "upstream_error",
            RagError::Decode(_) => "decode_error",
            RagError::Config(_) => "config_error",
            RagError::Io(_) => "io_error",
        }
    }

    /// Only connection-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RagError::Connection(_))
    }

    pub fn upstream(status: u16, body: &str) -> Self {
        RagError::Upstream {
            status,
            body: excerpt(body),
        }
    }

    /// Classify a transport error from `reqwest`.
    ///
    /// `elapsed` is the time spent on the call so far and ends up in timeout errors.
    pub fn from_transport(err: reqwest::Error, elapsed: Duration, context: &str) -> Self {
        if err.is_timeout() {
            RagError::Timeout {
                elapsed,
                context: context.to_string(),
            }
        } else if err.is_decode() {
            RagError::Decode(format!("{}: {}", context, err))
        } else if let Some(status) = err.status() {
            RagError::Upstream {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else if err.is_builder() {
            RagError::Validation(format!("{}: {}", context, err))
        } else {
            RagError::Connection(format!("{}: {}", context, err))
        }
    }
}

pub(crate) fn excerpt(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() > BODY_EXCERPT_CHARS {
        let head: String = body.chars().take(BODY_EXCERPT_CHARS).collect();
        format!("{}...", head)
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connection_errors_retry() {
        assert!(RagError::Connection("refused".into()).is_retryable());
        assert!(!RagError::upstream(500, "boom").is_retryable());
        assert!(!RagError::Decode("bad".into()).is_retryable());
        assert!(!RagError::Timeout {
            elapsed: Duration::from_secs(1),
            context: "generate".into()
        }
        .is_retryable());
    }

    #[test]
    fn upstream_body_is_cut_to_an_excerpt() {
        let body = "x".repeat(500);
        match RagError::upstream(503, &body) {
            RagError::Upstream { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body.chars().count(), BODY_EXCERPT_CHARS + 3);
                assert!(body.ends_with("..."));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
