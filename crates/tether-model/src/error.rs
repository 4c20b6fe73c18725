// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

/// Errors produced by the completion client.
///
/// `Status` carries the HTTP status so callers can distinguish retryable
/// backend conditions from hard request failures.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed stream payload: {0}")]
    Stream(String),

    #[error("max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetries { attempts: u32, last_error: String },
}

impl CompletionError {
    /// Whether another attempt may succeed.  Transport failures and the
    /// overload/server-error statuses are retryable; everything else
    /// surfaces immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => matches!(status, 429 | 500 | 502 | 503),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_server_errors_are_retryable() {
        for status in [429, 500, 502, 503] {
            let e = CompletionError::Status {
                status,
                body: String::new(),
            };
            assert!(e.is_retryable(), "HTTP {status} should be retryable");
        }
    }

    #[test]
    fn client_errors_are_not_retryable() {
        for status in [400, 401, 403, 404, 422] {
            let e = CompletionError::Status {
                status,
                body: String::new(),
            };
            assert!(!e.is_retryable(), "HTTP {status} must surface immediately");
        }
    }

    #[test]
    fn transport_errors_are_retryable() {
        assert!(CompletionError::Transport("connection reset".into()).is_retryable());
    }

    #[test]
    fn max_retries_is_terminal() {
        let e = CompletionError::MaxRetries {
            attempts: 3,
            last_error: "HTTP 503".into(),
        };
        assert!(!e.is_retryable());
        assert!(e.to_string().contains("max retries exceeded"));
    }

    #[test]
    fn status_error_message_names_the_status() {
        let e = CompletionError::Status {
            status: 404,
            body: "no such model".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("404"), "{msg}");
        assert!(msg.contains("no such model"), "{msg}");
    }
}
