use reqwest::StatusCode;
use thiserror::Error;

/// Maximum number of bytes of an error body kept for diagnostics
const MAX_ERROR_BODY: usize = 512;

/// Failures talking to the completion service.
///
/// None of the variants ever carry the API key; response bodies are redacted
/// and truncated before they are stored here.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("no API key configured (set {env} or api_key in the config file)")]
    MissingApiKey { env: String },

    #[error("completion request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("completion service returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("malformed completion response: {0}")]
    MalformedResponse(String),
}

impl CompletionError {
    /// Wrap a reqwest error, dropping the request URL from its message.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CompletionError::Timeout
        } else {
            CompletionError::Transport(err.without_url())
        }
    }

    /// Build a status error from a raw body, scrubbing `secret` out of it.
    pub fn status(status: StatusCode, body: &str, secret: &str) -> Self {
        let mut body = if secret.is_empty() {
            body.to_string()
        } else {
            body.replace(secret, "[redacted]")
        };
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
            body.push('…');
        }
        CompletionError::Status { status, body }
    }
}

/// Failures writing to the system clipboard.
#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),

    #[error("clipboard write failed: {0}")]
    Write(String),
}
