//! Token exchange errors.

use crate::discovery::DiscoveryError;
use crate::error::{AuthError, TokenInvalidReason};

/// Errors produced while exchanging or validating a credential.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The grant type is not supported for this provider.
    #[error("Unsupported grant type: {0}")]
    UnsupportedGrant(String),

    /// The request lacks fields its grant type requires.
    #[error("Malformed token request: {0}")]
    MalformedRequest(String),

    /// The request names a different client than the provider's.
    #[error("Client id does not match the provider's client")]
    InvalidClient,

    /// The provider could not be reached or failed server-side.
    #[error("Provider unreachable: {0}")]
    Unreachable(String),

    /// The credential or the token it produced was rejected.
    #[error("Token invalid ({reason}): {message}")]
    Invalid {
        /// The failed check.
        reason: TokenInvalidReason,
        /// Detail for server logs.
        message: String,
    },

    /// The provider's published metadata cannot be trusted or used.
    #[error("Provider misconfigured: {0}")]
    Misconfigured(String),
}

impl TokenError {
    /// Creates an `Invalid` error.
    pub fn invalid(reason: TokenInvalidReason, message: impl Into<String>) -> Self {
        Self::Invalid {
            reason,
            message: message.into(),
        }
    }

    /// Converts into the broker taxonomy, attributing the failure to
    /// `provider_id`.
    pub fn into_auth_error(self, provider_id: &str) -> AuthError {
        let provider_id = provider_id.to_string();
        match self {
            Self::UnsupportedGrant(grant_type) => AuthError::UnsupportedGrant {
                provider_id,
                grant_type,
            },
            Self::MalformedRequest(message) => AuthError::MalformedRequest { message },
            Self::InvalidClient => AuthError::InvalidClient { provider_id },
            Self::Unreachable(message) => AuthError::ProviderUnreachable {
                provider_id,
                message,
            },
            Self::Invalid { reason, message } => AuthError::TokenInvalid {
                provider_id,
                reason,
                message,
            },
            Self::Misconfigured(message) => AuthError::InvalidProviderConfig {
                provider_id,
                message,
            },
        }
    }
}

impl From<DiscoveryError> for TokenError {
    fn from(err: DiscoveryError) -> Self {
        match err {
            DiscoveryError::KeyNotFound(kid) => Self::invalid(
                TokenInvalidReason::UnknownKey,
                format!("no signing key with kid '{kid}'"),
            ),
            err if err.is_transient() => Self::Unreachable(err.to_string()),
            err => Self::Misconfigured(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for TokenError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Unreachable(format!("request timed out: {err}"))
        } else {
            Self::Unreachable(err.to_string())
        }
    }
}
