//! OpenID Connect discovery document.
//!
//! Only the provider metadata the broker acts on is modeled; unknown fields
//! are ignored when deserializing.

use serde::{Deserialize, Serialize};

/// Provider metadata served at `{issuer}/.well-known/openid-configuration`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    /// URL that the provider asserts as its issuer identifier.
    pub issuer: String,

    /// Authorization endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,

    /// Token endpoint.
    pub token_endpoint: String,

    /// Userinfo endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,

    /// JSON Web Key Set document.
    pub jwks_uri: String,

    /// Supported `response_type` values.
    #[serde(default)]
    pub response_types_supported: Vec<String>,

    /// Supported grant types. Absent means the OIDC default
    /// (`authorization_code` and `implicit`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_types_supported: Option<Vec<String>>,

    /// Signing algorithms used for ID tokens.
    #[serde(default)]
    pub id_token_signing_alg_values_supported: Vec<String>,

    /// Supported scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    /// RP-initiated logout endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,
}

impl DiscoveryDocument {
    /// Returns `true` if the provider lists this grant type.
    #[must_use]
    pub fn supports_grant_type(&self, grant_type: &str) -> bool {
        self.grant_types_supported
            .as_ref()
            .is_some_and(|grants| grants.iter().any(|g| g == grant_type))
    }

    /// Returns `true` if the provider supports `authorization_code`.
    ///
    /// When `grant_types_supported` is absent the OIDC default applies.
    #[must_use]
    pub fn supports_authorization_code(&self) -> bool {
        match &self.grant_types_supported {
            Some(grants) => grants.iter().any(|g| g == "authorization_code"),
            None => true,
        }
    }

    /// Returns `true` if the provider may accept `refresh_token` grants.
    ///
    /// Many providers issue refresh tokens without advertising the grant, so
    /// only an explicit list that omits it counts as unsupported.
    #[must_use]
    pub fn supports_refresh_token(&self) -> bool {
        match &self.grant_types_supported {
            Some(grants) => grants.iter().any(|g| g == "refresh_token"),
            None => true,
        }
    }

    /// Returns `true` if the provider explicitly supports the resource owner
    /// password grant.
    #[must_use]
    pub fn supports_password(&self) -> bool {
        self.supports_grant_type("password")
    }
}
