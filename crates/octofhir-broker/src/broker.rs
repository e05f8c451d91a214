//! Authentication broker.
//!
//! [`AuthBroker`] is the single entry point the rest of the application
//! calls. It resolves the provider, runs the exchange, maps the resulting
//! claims and logs the outcome. It also starts browser logins, builds logout
//! URLs and runs provider connection checks.
//!
//! ```ignore
//! use std::sync::Arc;
//! use octofhir_broker::{AuthBroker, BrokerConfig, ProviderRegistry, TokenRequest};
//!
//! let registry = Arc::new(ProviderRegistry::new(false));
//! registry.register(provider_config)?;
//!
//! let broker = AuthBroker::new(BrokerConfig::default(), registry)?;
//! let identity = broker
//!     .authenticate("corp", &TokenRequest::password("jane", "s3cret"))
//!     .await?;
//! ```

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::{BrokerConfig, ConfigError};
use crate::discovery::DiscoveryClient;
use crate::error::AuthError;
use crate::exchange::{ProviderCheckReport, TokenExchanger, TokenRequest};
use crate::identity::NormalizedIdentity;
use crate::login::AuthorizationRequest;
use crate::mapping::{IdentityMapper, MappingError};
use crate::provider::{ProviderConfig, ProviderSummary};
use crate::registry::ProviderRegistry;

/// Routes credential exchanges to the configured providers.
///
/// Holds no per-request state; cloning the `Arc` it is usually wrapped in
/// is all concurrent callers need.
pub struct AuthBroker {
    registry: Arc<ProviderRegistry>,
    exchanger: TokenExchanger,
}

impl AuthBroker {
    /// Creates a broker over `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid or the HTTP clients cannot
    /// be built.
    pub fn new(config: BrokerConfig, registry: Arc<ProviderRegistry>) -> Result<Self, ConfigError> {
        config.validate()?;
        let discovery = Arc::new(DiscoveryClient::new(config.clone())?);
        let exchanger = TokenExchanger::new(config, discovery)?;
        Ok(Self {
            registry,
            exchanger,
        })
    }

    /// Authenticates `request` against the provider `provider_id`.
    ///
    /// # Errors
    ///
    /// - `UnknownProvider` if the provider is not registered or disabled
    /// - `UnsupportedGrant`, `MalformedRequest` or `InvalidClient` for bad requests
    /// - `ProviderUnreachable` if the provider cannot be reached
    /// - `TokenInvalid` if the provider rejects the credential or the token
    ///   fails validation
    /// - `MissingUsernameClaim` or `MappingError` if the claims cannot be mapped
    /// - `InvalidProviderConfig` if the provider's published metadata is unusable
    pub async fn authenticate(
        &self,
        provider_id: &str,
        request: &TokenRequest,
    ) -> Result<NormalizedIdentity, AuthError> {
        let result = self.authenticate_inner(provider_id, request).await;

        match &result {
            Ok(identity) => info!(
                provider_id = %provider_id,
                subject = %identity.subject,
                roles = identity.roles.len(),
                organizations = identity.organizations.len(),
                "User authenticated"
            ),
            Err(err) => log_failure(provider_id, err),
        }

        result
    }

    async fn authenticate_inner(
        &self,
        provider_id: &str,
        request: &TokenRequest,
    ) -> Result<NormalizedIdentity, AuthError> {
        let provider = self.enabled_provider(provider_id)?;

        let claims = self
            .exchanger
            .exchange(&provider, request)
            .await
            .map_err(|e| e.into_auth_error(provider_id))?;

        IdentityMapper::map(&provider, &claims).map_err(|e| match e {
            MappingError::MissingUsernameClaim { claim } => AuthError::MissingUsernameClaim {
                provider_id: provider_id.to_string(),
                claim,
            },
            MappingError::InvalidPolicy(message) => AuthError::MappingError {
                provider_id: provider_id.to_string(),
                message,
            },
        })
    }

    /// Starts a browser login against `provider_id`.
    ///
    /// Returns the authorization URL (with PKCE S256 challenge) plus the
    /// `state` and `code_verifier` the caller must keep until the callback.
    ///
    /// # Errors
    ///
    /// - `UnknownProvider` if the provider is not registered or disabled
    /// - `UnsupportedGrant` if the provider does not offer the code flow
    /// - `ProviderUnreachable` or `InvalidProviderConfig` if discovery fails
    pub async fn login_redirect(
        &self,
        provider_id: &str,
        redirect_uri: Option<&str>,
        state: Option<&str>,
    ) -> Result<AuthorizationRequest, AuthError> {
        let provider = self.enabled_provider(provider_id)?;
        let result = self
            .exchanger
            .authorization_request(&provider, redirect_uri, state)
            .await
            .map_err(|e| e.into_auth_error(provider_id));

        match &result {
            Ok(_) => debug!(provider_id = %provider_id, "Started authorization code flow"),
            Err(err) => log_failure(provider_id, err),
        }
        result
    }

    /// Builds the provider logout URL for `provider_id`.
    ///
    /// `Ok(None)` means the provider offers no RP-initiated logout and only
    /// the local session needs to end.
    ///
    /// # Errors
    ///
    /// - `UnknownProvider` if the provider is not registered or disabled
    /// - `ProviderUnreachable` or `InvalidProviderConfig` if discovery fails
    pub async fn logout_url(
        &self,
        provider_id: &str,
        post_logout_redirect_uri: Option<&str>,
        id_token_hint: Option<&str>,
    ) -> Result<Option<String>, AuthError> {
        let provider = self.enabled_provider(provider_id)?;
        self.exchanger
            .logout_url(&provider, post_logout_redirect_uri, id_token_hint)
            .await
            .map_err(|e| {
                let err = e.into_auth_error(provider_id);
                log_failure(provider_id, &err);
                err
            })
    }

    /// Checks a provider configuration against the live provider.
    ///
    /// The configuration need not be registered, so a candidate can be
    /// checked before it replaces the current one.
    pub async fn check_provider(&self, provider: &ProviderConfig) -> ProviderCheckReport {
        let report = self.exchanger.check_provider(provider).await;
        if report.valid {
            info!(provider_id = %report.provider_id, "Provider check passed");
        } else {
            warn!(
                provider_id = %report.provider_id,
                errors = report.errors().len(),
                "Provider check found problems"
            );
        }
        report
    }

    /// Lists enabled providers in registration order.
    pub fn providers(&self) -> Vec<ProviderSummary> {
        self.registry.summaries()
    }

    /// Returns the id of the default provider, if one is set and enabled.
    pub fn default_provider(&self) -> Option<String> {
        let snapshot = self.registry.snapshot();
        snapshot
            .default_provider()
            .filter(|id| snapshot.get(id).is_some_and(|p| p.is_enabled()))
            .map(String::from)
    }

    /// Returns the provider registry.
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Returns the shared discovery client.
    pub fn discovery(&self) -> &Arc<DiscoveryClient> {
        self.exchanger.discovery()
    }

    fn enabled_provider(&self, provider_id: &str) -> Result<Arc<ProviderConfig>, AuthError> {
        let provider = self.registry.get(provider_id)?;
        if !provider.is_enabled() {
            return Err(AuthError::unknown_provider(provider_id));
        }
        Ok(provider)
    }
}

fn log_failure(provider_id: &str, err: &AuthError) {
    match err {
        AuthError::MissingUsernameClaim { claim, .. } => warn!(
            provider_id = %provider_id,
            claim = %claim,
            "Provider claims lack the configured username claim"
        ),
        AuthError::ProviderUnreachable { message, .. } => warn!(
            provider_id = %provider_id,
            error = %message,
            "Identity provider unreachable"
        ),
        AuthError::TokenInvalid {
            reason, message, ..
        } => info!(
            provider_id = %provider_id,
            reason = %reason,
            error = %message,
            "Credential rejected"
        ),
        err if err.is_configuration_error() => error!(
            provider_id = %provider_id,
            kind = err.kind(),
            error = %err,
            "Authentication failed due to provider configuration"
        ),
        err => debug!(
            provider_id = %provider_id,
            kind = err.kind(),
            error = %err,
            "Authentication request refused"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::block_on;

    fn registry() -> Arc<ProviderRegistry> {
        let registry = ProviderRegistry::new(false);
        for (id, enabled) in [("corp", true), ("legacy", false)] {
            let config = serde_json::from_value(json!({
                "providerType": "oidc",
                "id": id,
                "enabled": enabled,
                "issuer": "https://login.example.com",
                "clientId": "console",
                "clientSecret": "secret-1234",
            }))
            .unwrap();
            registry.register(config).unwrap();
        }
        Arc::new(registry)
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = BrokerConfig::default().with_max_response_size(0);
        assert!(AuthBroker::new(config, registry()).is_err());
    }

    #[test]
    fn test_providers_lists_enabled_only() {
        let broker = AuthBroker::new(BrokerConfig::default(), registry()).unwrap();
        let ids: Vec<_> = broker.providers().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["corp"]);
    }

    #[test]
    fn test_default_provider_must_be_enabled() {
        let registry = registry();
        let broker = AuthBroker::new(BrokerConfig::default(), registry.clone()).unwrap();
        assert!(broker.default_provider().is_none());

        registry.set_default_provider(Some("legacy")).unwrap();
        assert!(broker.default_provider().is_none());

        registry.set_default_provider(Some("corp")).unwrap();
        assert_eq!(broker.default_provider().as_deref(), Some("corp"));
    }

    #[tokio::test]
    async fn test_unknown_and_disabled_providers() {
        let broker = AuthBroker::new(BrokerConfig::default(), registry()).unwrap();
        let request = TokenRequest::password("jane", "pw");

        let err = broker.authenticate("nope", &request).await.unwrap_err();
        assert!(matches!(err, AuthError::UnknownProvider { ref provider_id } if provider_id == "nope"));

        let err = broker.authenticate("legacy", &request).await.unwrap_err();
        assert!(matches!(err, AuthError::UnknownProvider { .. }));
    }

    #[test]
    fn test_malformed_request_never_contacts_provider() {
        let broker = AuthBroker::new(BrokerConfig::default(), registry()).unwrap();
        let request = TokenRequest {
            grant_type: "password".to_string(),
            ..TokenRequest::default()
        };
        let err = block_on(broker.authenticate("corp", &request)).unwrap_err();
        assert!(matches!(err, AuthError::MalformedRequest { .. }));
    }

    #[test]
    fn test_login_and_logout_require_enabled_provider() {
        let broker = AuthBroker::new(BrokerConfig::default(), registry()).unwrap();

        let err = block_on(broker.login_redirect("legacy", None, None)).unwrap_err();
        assert!(matches!(err, AuthError::UnknownProvider { .. }));

        let err = block_on(broker.logout_url("nope", None, None)).unwrap_err();
        assert!(matches!(err, AuthError::UnknownProvider { .. }));
    }
}
