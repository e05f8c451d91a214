//! Broker error taxonomy.
//!
//! Every failure produced by the registry, discovery, token exchange or
//! identity mapping stages is folded into [`AuthError`] at the broker
//! boundary. The `Display` output carries server-side detail for logs;
//! [`AuthError::public_description`] is what an unauthenticated caller sees.

use std::fmt;

/// Why a presented or issued token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenInvalidReason {
    /// `exp` is in the past (beyond the clock skew tolerance).
    Expired,
    /// `nbf` is in the future (beyond the clock skew tolerance).
    NotYetValid,
    /// The signature does not verify against the resolved key.
    BadSignature,
    /// `iss` is not the configured issuer.
    IssuerMismatch,
    /// `aud` does not include the configured client id.
    AudienceMismatch,
    /// No signing key with the token's key id is published by the provider.
    UnknownKey,
    /// The token could not be decoded or uses a disallowed algorithm.
    Malformed,
    /// The provider's token endpoint refused the grant.
    ProviderRejected,
}

impl TokenInvalidReason {
    /// Returns the reason as a short, stable string for log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::NotYetValid => "not_yet_valid",
            Self::BadSignature => "bad_signature",
            Self::IssuerMismatch => "issuer_mismatch",
            Self::AudienceMismatch => "audience_mismatch",
            Self::UnknownKey => "unknown_key",
            Self::Malformed => "malformed",
            Self::ProviderRejected => "provider_rejected",
        }
    }
}

impl fmt::Display for TokenInvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by [`AuthBroker`](crate::broker::AuthBroker).
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// A provider configuration failed validation and was not stored.
    #[error("Invalid provider configuration for '{provider_id}': {message}")]
    InvalidProviderConfig {
        /// Identifier of the rejected provider.
        provider_id: String,
        /// What failed validation.
        message: String,
    },

    /// No enabled provider with this identifier exists.
    #[error("Unknown provider: {provider_id}")]
    UnknownProvider {
        /// The requested identifier.
        provider_id: String,
    },

    /// The grant type is not supported for this provider type.
    #[error("Grant type '{grant_type}' is not supported by provider '{provider_id}'")]
    UnsupportedGrant {
        /// The provider the request targeted.
        provider_id: String,
        /// The requested grant type.
        grant_type: String,
    },

    /// The provider could not be reached or answered with a server error.
    #[error("Provider '{provider_id}' is unreachable: {message}")]
    ProviderUnreachable {
        /// The provider that failed.
        provider_id: String,
        /// Transport-level detail.
        message: String,
    },

    /// The credential was rejected.
    #[error("Token rejected by '{provider_id}' ({reason}): {message}")]
    TokenInvalid {
        /// The provider that issued the token.
        provider_id: String,
        /// The failed check.
        reason: TokenInvalidReason,
        /// Detail for server logs.
        message: String,
    },

    /// The configured username claim is absent from the provider's claims.
    #[error("Claim '{claim}' from provider '{provider_id}' is missing or not a string")]
    MissingUsernameClaim {
        /// The provider whose claims were mapped.
        provider_id: String,
        /// The configured claim path.
        claim: String,
    },

    /// The organization assignment policy could not be applied.
    #[error("Identity mapping failed for provider '{provider_id}': {message}")]
    MappingError {
        /// The provider whose claims were mapped.
        provider_id: String,
        /// What went wrong.
        message: String,
    },

    /// The inbound request is missing grant fields or is otherwise malformed.
    #[error("Malformed request: {message}")]
    MalformedRequest {
        /// What is wrong with the request.
        message: String,
    },

    /// The inbound client id does not match the provider's client.
    #[error("Invalid client for provider '{provider_id}'")]
    InvalidClient {
        /// The provider the request targeted.
        provider_id: String,
    },
}

impl AuthError {
    /// Creates an `InvalidProviderConfig` error.
    pub fn invalid_provider_config(
        provider_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidProviderConfig {
            provider_id: provider_id.into(),
            message: message.into(),
        }
    }

    /// Creates an `UnknownProvider` error.
    pub fn unknown_provider(provider_id: impl Into<String>) -> Self {
        Self::UnknownProvider {
            provider_id: provider_id.into(),
        }
    }

    /// Creates a `MalformedRequest` error.
    pub fn malformed_request(message: impl Into<String>) -> Self {
        Self::MalformedRequest {
            message: message.into(),
        }
    }

    /// Returns the stable kind name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidProviderConfig { .. } => "invalid_provider_config",
            Self::UnknownProvider { .. } => "unknown_provider",
            Self::UnsupportedGrant { .. } => "unsupported_grant",
            Self::ProviderUnreachable { .. } => "provider_unreachable",
            Self::TokenInvalid { .. } => "token_invalid",
            Self::MissingUsernameClaim { .. } => "missing_username_claim",
            Self::MappingError { .. } => "mapping_error",
            Self::MalformedRequest { .. } => "malformed_request",
            Self::InvalidClient { .. } => "invalid_client",
        }
    }

    /// Returns the token rejection reason, if this is a `TokenInvalid` error.
    pub fn token_invalid_reason(&self) -> Option<TokenInvalidReason> {
        match self {
            Self::TokenInvalid { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Returns `true` if a caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderUnreachable { .. })
    }

    /// Returns `true` if the failure is caused by operator configuration.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidProviderConfig { .. }
                | Self::MissingUsernameClaim { .. }
                | Self::MappingError { .. }
        )
    }

    /// Returns the OAuth 2.0 error code for this error.
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidProviderConfig { .. } => "server_error",
            Self::UnknownProvider { .. } => "invalid_request",
            Self::UnsupportedGrant { .. } => "unsupported_grant_type",
            Self::ProviderUnreachable { .. } => "server_error",
            Self::TokenInvalid { .. } => "invalid_grant",
            Self::MissingUsernameClaim { .. } => "invalid_grant",
            Self::MappingError { .. } => "server_error",
            Self::MalformedRequest { .. } => "invalid_request",
            Self::InvalidClient { .. } => "invalid_client",
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::UnknownProvider { .. } => 404,
            Self::UnsupportedGrant { .. } | Self::MalformedRequest { .. } => 400,
            Self::TokenInvalid { .. } | Self::MissingUsernameClaim { .. } => 400,
            Self::InvalidClient { .. } => 401,
            Self::ProviderUnreachable { .. } => 502,
            Self::InvalidProviderConfig { .. } | Self::MappingError { .. } => 500,
        }
    }

    /// Returns a generic description that is safe to send to an
    /// unauthenticated caller.
    ///
    /// Never includes token rejection reasons, endpoint URLs or claim names.
    pub fn public_description(&self) -> &'static str {
        match self {
            Self::UnknownProvider { .. } => "The requested identity provider is not available",
            Self::UnsupportedGrant { .. } => "The grant type is not supported for this provider",
            Self::MalformedRequest { .. } => "The token request is malformed",
            Self::InvalidClient { .. } => "Client authentication failed",
            Self::TokenInvalid { .. } | Self::MissingUsernameClaim { .. } => {
                "The provided credentials are invalid"
            }
            Self::ProviderUnreachable { .. } => {
                "The identity provider is temporarily unavailable"
            }
            Self::InvalidProviderConfig { .. } | Self::MappingError { .. } => {
                "Authentication could not be completed"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_invalid(reason: TokenInvalidReason) -> AuthError {
        AuthError::TokenInvalid {
            provider_id: "corp".to_string(),
            reason,
            message: "kid 'k-9' not in https://idp.internal/jwks".to_string(),
        }
    }

    #[test]
    fn test_oauth_error_codes() {
        assert_eq!(
            token_invalid(TokenInvalidReason::Expired).oauth_error_code(),
            "invalid_grant"
        );
        assert_eq!(
            AuthError::InvalidClient {
                provider_id: "corp".into()
            }
            .oauth_error_code(),
            "invalid_client"
        );
        assert_eq!(
            AuthError::ProviderUnreachable {
                provider_id: "corp".into(),
                message: "connection refused".into()
            }
            .oauth_error_code(),
            "server_error"
        );
        assert_eq!(
            AuthError::unknown_provider("nope").oauth_error_code(),
            "invalid_request"
        );
    }

    #[test]
    fn test_public_description_hides_detail() {
        for reason in [
            TokenInvalidReason::Expired,
            TokenInvalidReason::BadSignature,
            TokenInvalidReason::IssuerMismatch,
            TokenInvalidReason::AudienceMismatch,
            TokenInvalidReason::UnknownKey,
        ] {
            let err = token_invalid(reason);
            assert_eq!(
                err.public_description(),
                "The provided credentials are invalid"
            );
            assert!(err.to_string().contains(reason.as_str()));
        }

        let missing = AuthError::MissingUsernameClaim {
            provider_id: "corp".into(),
            claim: "preferred_username".into(),
        };
        assert!(!missing.public_description().contains("preferred_username"));
    }

    #[test]
    fn test_predicates() {
        let unreachable = AuthError::ProviderUnreachable {
            provider_id: "corp".into(),
            message: "timeout".into(),
        };
        assert!(unreachable.is_retryable());
        assert!(!token_invalid(TokenInvalidReason::Expired).is_retryable());
        assert!(
            AuthError::MappingError {
                provider_id: "corp".into(),
                message: "empty claim path".into()
            }
            .is_configuration_error()
        );
        assert_eq!(
            token_invalid(TokenInvalidReason::AudienceMismatch).token_invalid_reason(),
            Some(TokenInvalidReason::AudienceMismatch)
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(AuthError::unknown_provider("x").http_status(), 404);
        assert_eq!(token_invalid(TokenInvalidReason::Expired).http_status(), 400);
        assert_eq!(
            AuthError::InvalidClient {
                provider_id: "x".into()
            }
            .http_status(),
            401
        );
    }
}
