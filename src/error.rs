use std::fmt;

use thiserror::Error;

pub const TRANSPORT_EXCERPT: usize = 120;
pub const STATUS_EXCERPT: usize = 200;
pub const PAYLOAD_EXCERPT: usize = 220;

/// Non-fatal failures of a poll cycle. The display text is what ends up in the
/// last-error field.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("network error ({status}): {message} {excerpt}")]
    Transport {
        status: u16,
        message: String,
        excerpt: String,
    },

    #[error("HTTP {status}: {excerpt}")]
    HttpStatus { status: u16, excerpt: String },

    #[error("{message}")]
    Schema { message: String },

    #[error("{message}")]
    Token { message: String },
}

impl FetchError {
    pub fn schema(message: impl Into<String>) -> Self {
        FetchError::Schema {
            message: message.into(),
        }
    }

    pub fn token(message: impl Into<String>) -> Self {
        FetchError::Token {
            message: message.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusMessage {
    pub severity: Severity,
    pub text: String,
}

impl StatusMessage {
    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            text: text.into(),
        }
    }
}

impl From<&FetchError> for StatusMessage {
    fn from(err: &FetchError) -> Self {
        StatusMessage::error(err.to_string())
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Warning => write!(f, "warning: {}", self.text),
            Severity::Error => write!(f, "error: {}", self.text),
        }
    }
}

/// Lossy UTF-8 view of at most `max` leading bytes of a response body.
pub fn excerpt(body: &[u8], max: usize) -> String {
    let end = body.len().min(max);
    String::from_utf8_lossy(&body[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::{excerpt, FetchError, Severity, StatusMessage};

    #[test]
    fn excerpt_truncates_bytes() {
        let body = vec![b'x'; 500];
        assert_eq!(excerpt(&body, 200).len(), 200);
        assert_eq!(excerpt(b"short", 200), "short");
        assert_eq!(excerpt(b"", 120), "");
    }

    #[test]
    fn excerpt_split_multibyte_is_lossy_not_panicking() {
        let text = "çok uçak".as_bytes();
        let cut = excerpt(text, 2);
        assert!(cut.starts_with('ç'));
    }

    #[test]
    fn error_messages_carry_status() {
        let err = FetchError::HttpStatus {
            status: 429,
            excerpt: "Too many requests".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 429: Too many requests");
        let status = StatusMessage::from(&err);
        assert_eq!(status.severity, Severity::Error);
        assert_eq!(status.to_string(), "error: HTTP 429: Too many requests");
    }
}
