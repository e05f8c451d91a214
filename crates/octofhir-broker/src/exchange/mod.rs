//! Provider-specific credential exchange.
//!
//! [`TokenExchanger::exchange`] turns an inbound [`TokenRequest`] into the
//! raw claims of the authenticated user:
//!
//! - OAuth2 providers: form POST to `tokenUrl`, then GET `userinfoUrl` with
//!   the returned access token.
//! - OIDC providers: a presented JWT is verified against the provider's
//!   published keys; other grants are POSTed to the discovered token
//!   endpoint and the resulting ID token and/or userinfo supply the claims.
//!
//! It also builds the browser-facing authorization and logout URLs and runs
//! provider connection checks.
//!
//! Nothing here retries. Transport failures and timeouts surface as
//! [`TokenError::Unreachable`]; rejected credentials as [`TokenError::Invalid`].

mod check;
mod error;
mod oauth2;
mod oidc;
mod redirect;
mod request;

pub use check::{CheckNote, EndpointCheck, NoteLevel, ProviderCheckReport};
pub use error::TokenError;
pub use request::{Grant, JWT_BEARER_GRANT, TokenRequest};

use std::sync::Arc;

use secrecy::ExposeSecret;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::config::{BrokerConfig, ConfigError};
use crate::discovery::DiscoveryClient;
use crate::error::TokenInvalidReason;
use crate::provider::ProviderConfig;

/// Claims returned by a provider, consumed by the identity mapper.
pub type RawClaims = Value;

/// Performs grant exchanges and token validation against providers.
pub struct TokenExchanger {
    http_client: reqwest::Client,
    discovery: Arc<DiscoveryClient>,
    config: BrokerConfig,
}

impl TokenExchanger {
    /// Creates an exchanger sharing `discovery` for OIDC key material.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: BrokerConfig, discovery: Arc<DiscoveryClient>) -> Result<Self, ConfigError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            http_client,
            discovery,
            config,
        })
    }

    /// Returns the discovery client used for OIDC providers.
    pub fn discovery(&self) -> &Arc<DiscoveryClient> {
        &self.discovery
    }

    /// Exchanges `request` with `provider` and returns the user's claims.
    pub async fn exchange(
        &self,
        provider: &ProviderConfig,
        request: &TokenRequest,
    ) -> Result<RawClaims, TokenError> {
        let grant = request.grant()?;

        if let Some(client_id) = request.client_id.as_deref()
            && !client_id.is_empty()
            && client_id != provider.client_id()
        {
            return Err(TokenError::InvalidClient);
        }

        let scopes = request
            .scopes()
            .unwrap_or_else(|| provider.scopes().to_vec());

        debug!(
            provider_id = %provider.id(),
            provider_type = %provider.provider_type(),
            grant_type = grant.grant_type(),
            "Exchanging credential with provider"
        );

        match provider {
            ProviderConfig::OAuth2(config) => self.exchange_oauth2(config, &grant, &scopes).await,
            ProviderConfig::Oidc(config) => self.exchange_oidc(config, &grant, &scopes).await,
        }
    }

    /// Builds the form fields of a grant exchange.
    ///
    /// Client credentials are always those configured for the provider.
    fn grant_form(
        &self,
        grant: &Grant,
        client_id: &str,
        client_secret: &secrecy::SecretString,
        scopes: &[String],
    ) -> Result<Vec<(&'static str, String)>, TokenError> {
        let mut form = vec![("grant_type", grant.grant_type().to_string())];

        match grant {
            Grant::Password { username, password } => {
                form.push(("username", username.clone()));
                form.push(("password", password.expose_secret().clone()));
                if !scopes.is_empty() {
                    form.push(("scope", scopes.join(" ")));
                }
            }
            Grant::AuthorizationCode {
                code,
                redirect_uri,
                code_verifier,
            } => {
                form.push(("code", code.expose_secret().clone()));
                if let Some(redirect_uri) = redirect_uri.as_ref().or(self.config.callback_url.as_ref()) {
                    form.push(("redirect_uri", redirect_uri.clone()));
                }
                if let Some(verifier) = code_verifier {
                    form.push(("code_verifier", verifier.clone()));
                }
            }
            Grant::RefreshToken { refresh_token } => {
                form.push(("refresh_token", refresh_token.expose_secret().clone()));
            }
            Grant::IdToken { .. } => {
                return Err(TokenError::UnsupportedGrant(grant.grant_type().to_string()));
            }
        }

        form.push(("client_id", client_id.to_string()));
        form.push(("client_secret", client_secret.expose_secret().clone()));
        Ok(form)
    }

    /// POSTs a grant to a token endpoint and parses the response.
    async fn request_token(
        &self,
        token_endpoint: &str,
        form: &[(&'static str, String)],
    ) -> Result<TokenResponse, TokenError> {
        let response = self
            .http_client
            .post(token_endpoint)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = self.read_body(response).await?;

        if status.is_server_error() || status.as_u16() == 429 {
            return Err(TokenError::Unreachable(format!(
                "token endpoint returned HTTP {status}"
            )));
        }

        // Some providers (GitHub) report grant errors with HTTP 200.
        let oauth_error = serde_json::from_slice::<OAuthErrorResponse>(&body).ok();

        if !status.is_success() || oauth_error.is_some() {
            let message = match oauth_error {
                Some(oauth_error) => oauth_error.into_message(),
                None => format!("token endpoint returned HTTP {status}"),
            };
            return Err(TokenError::invalid(
                TokenInvalidReason::ProviderRejected,
                message,
            ));
        }

        serde_json::from_slice(&body).map_err(|e| {
            TokenError::Unreachable(format!("token endpoint returned an unreadable response: {e}"))
        })
    }

    /// GETs a userinfo endpoint with a bearer access token.
    async fn fetch_userinfo(
        &self,
        userinfo_endpoint: &str,
        access_token: &str,
    ) -> Result<RawClaims, TokenError> {
        let response = self
            .http_client
            .get(userinfo_endpoint)
            .header("Accept", "application/json")
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(TokenError::Unreachable(format!(
                "userinfo endpoint returned HTTP {status}"
            )));
        }
        if !status.is_success() {
            return Err(TokenError::invalid(
                TokenInvalidReason::ProviderRejected,
                format!("userinfo endpoint returned HTTP {status}"),
            ));
        }

        let body = self.read_body(response).await?;
        let claims: Value = serde_json::from_slice(&body).map_err(|e| {
            TokenError::Unreachable(format!("userinfo endpoint returned invalid JSON: {e}"))
        })?;

        if !claims.is_object() {
            return Err(TokenError::Unreachable(
                "userinfo endpoint did not return a JSON object".to_string(),
            ));
        }
        Ok(claims)
    }

    async fn read_body(&self, response: reqwest::Response) -> Result<Vec<u8>, TokenError> {
        let max_size = self.config.max_response_size;
        if let Some(len) = response.content_length()
            && len as usize > max_size
        {
            return Err(TokenError::Unreachable(format!(
                "response exceeds maximum size of {max_size} bytes"
            )));
        }

        let body = response.bytes().await?;
        if body.len() > max_size {
            return Err(TokenError::Unreachable(format!(
                "response exceeds maximum size of {max_size} bytes"
            )));
        }
        Ok(body.to_vec())
    }
}

/// Token endpoint success response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_expires_in")]
    expires_in: Option<u64>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// OAuth error response from a provider.
#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl OAuthErrorResponse {
    fn into_message(self) -> String {
        match self.error_description {
            Some(description) => format!("{}: {description}", self.error),
            None => self.error,
        }
    }
}

/// `expires_in` arrives as a number from most providers and as a string
/// from some.
fn deserialize_expires_in<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        String(String),
    }

    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
