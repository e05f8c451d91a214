//! Inbound token request parsing.
//!
//! The form body is deserialized into [`TokenRequest`] as-is and then
//! narrowed into a typed [`Grant`]. Only the fields belonging to the
//! requested grant are read; everything else is ignored.

use std::fmt;

use secrecy::SecretString;
use serde::Deserialize;

use super::error::TokenError;

/// Grant type for presenting a provider-issued token directly.
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Raw token request form (`application/x-www-form-urlencoded`).
#[derive(Clone, Default, Deserialize)]
pub struct TokenRequest {
    /// Requested grant type.
    #[serde(default)]
    pub grant_type: String,

    /// Resource owner username (`password`).
    #[serde(default)]
    pub username: Option<String>,

    /// Resource owner password (`password`).
    #[serde(default)]
    pub password: Option<String>,

    /// Refresh token (`refresh_token`).
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Authorization code (`authorization_code`).
    #[serde(default)]
    pub code: Option<String>,

    /// Redirect URI used in the authorization request (`authorization_code`).
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// PKCE verifier (`authorization_code`).
    #[serde(default)]
    pub code_verifier: Option<String>,

    /// Provider-issued JWT (`jwt-bearer`).
    #[serde(default)]
    pub assertion: Option<String>,

    /// Alternative field for a provider-issued ID token (`jwt-bearer`).
    #[serde(default)]
    pub id_token: Option<String>,

    /// Client id; must match the provider's client when present.
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret. Ignored: the configured secret is always used.
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Space-separated scopes overriding the provider's configured scopes.
    #[serde(default)]
    pub scope: Option<String>,
}

impl fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRequest")
            .field("grant_type", &self.grant_type)
            .field("username", &self.username)
            .field("client_id", &self.client_id)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// A validated grant with exactly the fields it needs.
#[derive(Debug, Clone)]
pub enum Grant {
    /// Resource owner password credentials.
    Password {
        /// Username.
        username: String,
        /// Password.
        password: SecretString,
    },
    /// Authorization code exchange.
    AuthorizationCode {
        /// The code returned by the provider.
        code: SecretString,
        /// Redirect URI used in the authorization request.
        redirect_uri: Option<String>,
        /// PKCE verifier.
        code_verifier: Option<String>,
    },
    /// Refresh token exchange.
    RefreshToken {
        /// The refresh token.
        refresh_token: SecretString,
    },
    /// A provider-issued token presented for validation.
    IdToken {
        /// The compact JWT.
        token: SecretString,
    },
}

impl Grant {
    /// Returns the grant type name.
    pub fn grant_type(&self) -> &'static str {
        match self {
            Self::Password { .. } => "password",
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::RefreshToken { .. } => "refresh_token",
            Self::IdToken { .. } => JWT_BEARER_GRANT,
        }
    }
}

impl TokenRequest {
    /// Creates a `password` request.
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            grant_type: "password".to_string(),
            username: Some(username.into()),
            password: Some(password.into()),
            ..Self::default()
        }
    }

    /// Creates an `authorization_code` request.
    pub fn authorization_code(code: impl Into<String>) -> Self {
        Self {
            grant_type: "authorization_code".to_string(),
            code: Some(code.into()),
            ..Self::default()
        }
    }

    /// Creates a `refresh_token` request.
    pub fn refresh_token(refresh_token: impl Into<String>) -> Self {
        Self {
            grant_type: "refresh_token".to_string(),
            refresh_token: Some(refresh_token.into()),
            ..Self::default()
        }
    }

    /// Creates a request presenting a provider-issued JWT.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            grant_type: JWT_BEARER_GRANT.to_string(),
            assertion: Some(token.into()),
            ..Self::default()
        }
    }

    /// Narrows the raw form into a typed grant.
    ///
    /// # Errors
    ///
    /// `UnsupportedGrant` for unknown grant types, `MalformedRequest` when a
    /// required field is missing or empty.
    pub fn grant(&self) -> Result<Grant, TokenError> {
        match self.grant_type.as_str() {
            "password" => Ok(Grant::Password {
                username: required(&self.username, "username")?.to_string(),
                password: SecretString::new(required(&self.password, "password")?.to_string()),
            }),
            "authorization_code" => Ok(Grant::AuthorizationCode {
                code: SecretString::new(required(&self.code, "code")?.to_string()),
                redirect_uri: non_empty(&self.redirect_uri),
                code_verifier: non_empty(&self.code_verifier),
            }),
            "refresh_token" => Ok(Grant::RefreshToken {
                refresh_token: SecretString::new(
                    required(&self.refresh_token, "refresh_token")?.to_string(),
                ),
            }),
            JWT_BEARER_GRANT => {
                let token = non_empty(&self.assertion)
                    .or_else(|| non_empty(&self.id_token))
                    .ok_or_else(|| {
                        TokenError::MalformedRequest("missing 'assertion' parameter".to_string())
                    })?;
                Ok(Grant::IdToken {
                    token: SecretString::new(token),
                })
            }
            "" => Err(TokenError::MalformedRequest(
                "missing 'grant_type' parameter".to_string(),
            )),
            other => Err(TokenError::UnsupportedGrant(other.to_string())),
        }
    }

    /// Returns the requested scopes, if the request overrides them.
    pub fn scopes(&self) -> Option<Vec<String>> {
        let scopes: Vec<String> = self
            .scope
            .as_deref()?
            .split_whitespace()
            .map(String::from)
            .collect();
        if scopes.is_empty() { None } else { Some(scopes) }
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, TokenError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| TokenError::MalformedRequest(format!("missing '{name}' parameter")))
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(String::from)
}
