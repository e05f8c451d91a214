//! Identity provider configuration types.
//!
//! A provider is either an OpenID Connect provider, whose endpoints and keys
//! are discovered from its issuer, or a plain OAuth 2.0 provider with
//! explicitly configured endpoints. The variant is selected by the
//! `providerType` field when deserializing.
//!
//! # Example
//!
//! ```toml
//! [[providers]]
//! providerType = "oidc"
//! id = "corp"
//! issuer = "https://login.example.com/realms/corp"
//! clientId = "console"
//! clientSecret = "s3cr3t-value"
//! scopes = ["openid", "profile", "email"]
//! usernameClaim = "preferred_username"
//! roleClaim = "realm_access.roles"
//!
//! [providers.organizationAssignment]
//! type = "dynamic"
//! claimPath = "org"
//! organizationNamePrefix = "corp-"
//! ```

use std::collections::HashSet;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::error::AuthError;

/// Claim used for the username when none is configured.
pub const DEFAULT_USERNAME_CLAIM: &str = "sub";

/// Value emitted in place of a client secret whenever a config is serialized.
pub const MASKED_SECRET: &str = "*****";

/// Discriminant of [`ProviderConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderType {
    /// OpenID Connect provider.
    #[serde(rename = "oidc")]
    Oidc,
    /// Plain OAuth 2.0 provider.
    #[serde(rename = "oauth2")]
    OAuth2,
}

impl ProviderType {
    /// Returns the wire name of the provider type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Oidc => "oidc",
            Self::OAuth2 => "oauth2",
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration of one external identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "providerType")]
pub enum ProviderConfig {
    /// OpenID Connect provider.
    #[serde(rename = "oidc")]
    Oidc(OidcProviderConfig),
    /// Plain OAuth 2.0 provider.
    #[serde(rename = "oauth2")]
    OAuth2(OAuth2ProviderConfig),
}

/// Fields shared by every provider type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCommon {
    /// Unique provider identifier, used in request paths.
    pub id: String,

    /// Human-readable name for provider listings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Disabled providers are kept but refuse authentication.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// OAuth client identifier registered with the provider.
    pub client_id: String,

    /// OAuth client secret.
    #[serde(serialize_with = "serialize_masked")]
    pub client_secret: SecretString,

    /// Scopes requested from the provider.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// How organizations are assigned to users of this provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_assignment: Option<OrganizationAssignment>,

    /// Claim path holding the username. Defaults to `sub`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_claim: Option<String>,

    /// Claim path holding the user's roles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_claim: Option<String>,
}

fn default_enabled() -> bool {
    true
}

/// OpenID Connect provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OidcProviderConfig {
    /// Issuer URL; discovery is fetched from
    /// `{issuer}/.well-known/openid-configuration`.
    pub issuer: String,

    /// Shared provider fields.
    #[serde(flatten)]
    pub common: ProviderCommon,
}

/// OAuth 2.0 provider configuration with explicit endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuth2ProviderConfig {
    /// Opaque issuer identifier. Never fetched.
    pub issuer: String,

    /// Authorization endpoint, published to clients for the redirect step.
    pub authorization_url: String,

    /// Token endpoint.
    pub token_url: String,

    /// Userinfo endpoint.
    pub userinfo_url: String,

    /// Shared provider fields.
    #[serde(flatten)]
    pub common: ProviderCommon,
}

/// Policy deciding which organizations a mapped user belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OrganizationAssignment {
    /// Every user is placed into a fixed list of organizations.
    #[serde(rename_all = "camelCase")]
    Static {
        /// Organization names.
        #[serde(alias = "organizationName", deserialize_with = "one_or_many")]
        organizations: Vec<String>,
    },

    /// Organizations are read from a claim, optionally decorated.
    #[serde(rename_all = "camelCase")]
    Dynamic {
        /// Claim path holding one or many organization names.
        claim_path: String,
        /// Prepended to every extracted name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        organization_name_prefix: Option<String>,
        /// Appended to every extracted name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        organization_name_suffix: Option<String>,
    },

    /// Each user gets a personal organization named after their username.
    #[serde(rename_all = "camelCase")]
    PerUser {
        /// Prepended to the username.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        organization_name_prefix: Option<String>,
        /// Appended to the username.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        organization_name_suffix: Option<String>,
    },

    /// One organization per role namespace, e.g. `acme:admin` yields `acme`.
    #[serde(rename_all = "camelCase")]
    RoleNamespace {
        /// Separator between namespace and role name.
        separator: String,
    },
}

impl OrganizationAssignment {
    /// Returns the policy's wire name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Static { .. } => "static",
            Self::Dynamic { .. } => "dynamic",
            Self::PerUser { .. } => "perUser",
            Self::RoleNamespace { .. } => "roleNamespace",
        }
    }

    /// Checks the policy for missing required fields.
    pub fn check(&self) -> Result<(), String> {
        match self {
            Self::Static { organizations } => {
                if organizations.is_empty() || organizations.iter().any(|o| o.trim().is_empty()) {
                    return Err(
                        "static organization assignment requires non-empty organization names"
                            .to_string(),
                    );
                }
            }
            Self::Dynamic { claim_path, .. } => {
                if !is_valid_claim_path(claim_path) {
                    return Err(format!(
                        "dynamic organization assignment has an invalid claimPath '{claim_path}'"
                    ));
                }
            }
            Self::PerUser { .. } => {}
            Self::RoleNamespace { separator } => {
                if separator.is_empty() {
                    return Err(
                        "roleNamespace organization assignment requires a separator".to_string()
                    );
                }
            }
        }
        Ok(())
    }
}

impl ProviderConfig {
    /// Returns the provider's shared fields.
    pub fn common(&self) -> &ProviderCommon {
        match self {
            Self::Oidc(config) => &config.common,
            Self::OAuth2(config) => &config.common,
        }
    }

    fn common_mut(&mut self) -> &mut ProviderCommon {
        match self {
            Self::Oidc(config) => &mut config.common,
            Self::OAuth2(config) => &mut config.common,
        }
    }

    /// Returns the provider identifier.
    pub fn id(&self) -> &str {
        &self.common().id
    }

    /// Returns the provider type.
    pub fn provider_type(&self) -> ProviderType {
        match self {
            Self::Oidc(_) => ProviderType::Oidc,
            Self::OAuth2(_) => ProviderType::OAuth2,
        }
    }

    /// Returns the configured issuer.
    pub fn issuer(&self) -> &str {
        match self {
            Self::Oidc(config) => &config.issuer,
            Self::OAuth2(config) => &config.issuer,
        }
    }

    /// Returns the OAuth client id.
    pub fn client_id(&self) -> &str {
        &self.common().client_id
    }

    /// Returns the client secret. Never log the exposed value.
    pub fn client_secret(&self) -> &SecretString {
        &self.common().client_secret
    }

    /// Returns `true` if the provider accepts authentication.
    pub fn is_enabled(&self) -> bool {
        self.common().enabled
    }

    /// Returns the effective username claim path.
    pub fn username_claim(&self) -> &str {
        self.common()
            .username_claim
            .as_deref()
            .unwrap_or(DEFAULT_USERNAME_CLAIM)
    }

    /// Returns the role claim path, if configured.
    pub fn role_claim(&self) -> Option<&str> {
        self.common().role_claim.as_deref()
    }

    /// Returns the configured scopes.
    pub fn scopes(&self) -> &[String] {
        &self.common().scopes
    }

    /// Returns the organization assignment policy, if configured.
    pub fn organization_assignment(&self) -> Option<&OrganizationAssignment> {
        self.common().organization_assignment.as_ref()
    }

    /// Returns a copy with the enabled flag set.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.common_mut().enabled = enabled;
        self
    }

    /// Validates the configuration.
    ///
    /// URLs must be absolute `https` URLs, or `http` when `allow_http` is set.
    /// Client credentials must be non-empty and scopes must not repeat.
    pub fn validate(&self, allow_http: bool) -> Result<(), AuthError> {
        let id = self.id();
        let invalid = |message: String| AuthError::invalid_provider_config(id, message);

        if id.is_empty() {
            return Err(invalid("provider id must not be empty".to_string()));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(invalid(
                "provider id may only contain ASCII letters, digits, '-', '_' and '.'".to_string(),
            ));
        }

        let common = self.common();
        if common.client_id.trim().is_empty() {
            return Err(invalid("clientId must not be empty".to_string()));
        }
        if common.client_secret.expose_secret().trim().is_empty() {
            return Err(invalid("clientSecret must not be empty".to_string()));
        }

        let mut seen = HashSet::new();
        for scope in &common.scopes {
            if scope.trim().is_empty() {
                return Err(invalid("scopes must not contain empty entries".to_string()));
            }
            if !seen.insert(scope.as_str()) {
                return Err(invalid(format!("duplicate scope '{scope}'")));
            }
        }

        if let Some(claim) = &common.username_claim
            && !is_valid_claim_path(claim)
        {
            return Err(invalid(format!("invalid usernameClaim '{claim}'")));
        }
        if let Some(claim) = &common.role_claim
            && !is_valid_claim_path(claim)
        {
            return Err(invalid(format!("invalid roleClaim '{claim}'")));
        }
        if let Some(assignment) = &common.organization_assignment {
            assignment.check().map_err(invalid)?;
        }

        match self {
            Self::Oidc(config) => {
                validate_url("issuer", &config.issuer, allow_http).map_err(invalid)?;
            }
            Self::OAuth2(config) => {
                if config.issuer.trim().is_empty() {
                    return Err(invalid("issuer must not be empty".to_string()));
                }
                validate_url("authorizationUrl", &config.authorization_url, allow_http)
                    .map_err(invalid)?;
                validate_url("tokenUrl", &config.token_url, allow_http).map_err(invalid)?;
                validate_url("userinfoUrl", &config.userinfo_url, allow_http)
                    .map_err(invalid)?;
                if common.scopes.is_empty() {
                    return Err(invalid(
                        "OAuth2 providers require at least one scope".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Builds the listing entry for this provider.
    pub fn summary(&self, is_default: bool) -> ProviderSummary {
        let common = self.common();
        let (auth_url, token_url, userinfo_url) = match self {
            Self::Oidc(_) => (None, None, None),
            Self::OAuth2(config) => (
                Some(config.authorization_url.clone()),
                Some(config.token_url.clone()),
                Some(config.userinfo_url.clone()),
            ),
        };

        ProviderSummary {
            id: common.id.clone(),
            display_name: common
                .display_name
                .clone()
                .unwrap_or_else(|| common.id.clone()),
            provider_type: self.provider_type(),
            issuer: self.issuer().to_string(),
            client_id: common.client_id.clone(),
            auth_url,
            token_url,
            userinfo_url,
            scopes: common.scopes.clone(),
            username_claim: self.username_claim().to_string(),
            is_default,
        }
    }
}

/// Public description of a provider. Carries no secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSummary {
    /// Provider identifier.
    pub id: String,
    /// Display name, the id when none is configured.
    pub display_name: String,
    /// Provider type.
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    /// Issuer.
    pub issuer: String,
    /// OAuth client id.
    pub client_id: String,
    /// Authorization endpoint (OAuth2 only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
    /// Token endpoint (OAuth2 only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
    /// Userinfo endpoint (OAuth2 only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_url: Option<String>,
    /// Requested scopes.
    pub scopes: Vec<String>,
    /// Effective username claim.
    pub username_claim: String,
    /// Whether this is the default provider.
    pub is_default: bool,
}

/// Renders a secret as a short hint for diagnostics.
///
/// Empty secrets render as `(empty)`, secrets of four characters or fewer
/// as `***`, anything longer as its first four characters followed by `***`.
pub fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return "(empty)".to_string();
    }
    if secret.chars().count() <= 4 {
        return "***".to_string();
    }
    let head: String = secret.chars().take(4).collect();
    format!("{head}***")
}

fn serialize_masked<S>(_secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(MASKED_SECRET)
}

/// Accepts either a single string or a list of strings.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => Ok(vec![s]),
        OneOrMany::Many(v) => Ok(v),
    }
}

fn is_valid_claim_path(path: &str) -> bool {
    !path.is_empty() && path.split('.').all(|segment| !segment.trim().is_empty())
}

fn validate_url(field: &str, value: &str, allow_http: bool) -> Result<(), String> {
    let url = Url::parse(value).map_err(|e| format!("{field} is not a valid URL: {e}"))?;

    match url.scheme() {
        "https" => {}
        "http" if allow_http => {}
        scheme => {
            return Err(format!(
                "{field} must use https (got '{scheme}')"
            ));
        }
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(format!("{field} must include a host"));
    }

    Ok(())
}
