//! Error taxonomy for provider adapters
//!
//! Adapters never panic past their boundary: a whole-request failure maps
//! to one of these variants and the caller decides whether to retry
//! (fast cycle), skip (slow cycle) or answer 404 (read API).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    /// Network or HTTP-status failure for the whole request. The fast
    /// cycle retries these with bounded backoff; the slow cycle logs and
    /// moves on.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The payload arrived but was not in the expected shape.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Credential refresh failed for the token-based provider. Fatal to
    /// that tick's adapter call only.
    #[error("auth error: {message}")]
    Auth { message: String },

    /// The provider answered but produced nothing usable. A normal,
    /// loggable gap, not a system fault.
    #[error("no data: {message}")]
    NoData { message: String },
}

impl ProviderError {
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn auth<S: Into<String>>(message: S) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn no_data<S: Into<String>>(message: S) -> Self {
        Self::NoData {
            message: message.into(),
        }
    }

    /// True for failures worth retrying at the transport level.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let parse_err = ProviderError::parse("unexpected shape");
        assert!(matches!(parse_err, ProviderError::Parse { .. }));
        assert!(!parse_err.is_transient());

        let auth_err = ProviderError::auth("refresh rejected");
        assert!(matches!(auth_err, ProviderError::Auth { .. }));

        let gap = ProviderError::no_data("empty timeseries");
        assert!(gap.to_string().contains("empty timeseries"));
    }
}
