//! Error types for chat platform backends.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("HTTP error: {status_code} - {message}")]
    Http { status_code: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited (retry after {retry_after:.1}s)")]
    RateLimited { retry_after: f64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Request failed after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl ChatError {
    /// Build an error from a non-success Discord response.
    pub fn from_response(status_code: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|json| json.get("message").and_then(|v| v.as_str()).map(str::to_string))
            .unwrap_or_else(|| body.to_string());

        if status_code == 404 {
            return Self::NotFound(message);
        }
        Self::Http {
            status_code,
            message,
        }
    }
}
