//! Authorization and RP-initiated logout URLs.

use tracing::debug;

use super::{TokenError, TokenExchanger};
use crate::login::{AuthorizationRequest, PKCE_METHOD, Pkce, random_token};
use crate::provider::ProviderConfig;

impl TokenExchanger {
    /// Starts an authorization code flow with PKCE against `provider`.
    ///
    /// `redirect_uri` falls back to the configured callback URL; with
    /// neither, the provider's registered default applies. A fresh random
    /// `state` is generated unless one is supplied.
    ///
    /// # Errors
    ///
    /// - `UnsupportedGrant` if an OIDC provider does not list `authorization_code`
    /// - `Misconfigured` if the authorization endpoint is absent or unusable
    /// - Discovery failures as for [`exchange`](Self::exchange)
    pub async fn authorization_request(
        &self,
        provider: &ProviderConfig,
        redirect_uri: Option<&str>,
        state: Option<&str>,
    ) -> Result<AuthorizationRequest, TokenError> {
        let endpoint = match provider {
            ProviderConfig::OAuth2(config) => config.authorization_url.clone(),
            ProviderConfig::Oidc(config) => {
                let metadata = self.discovery.metadata(&config.issuer).await?;
                let document = &metadata.document;
                if !document.supports_authorization_code() {
                    return Err(TokenError::UnsupportedGrant(
                        "authorization_code".to_string(),
                    ));
                }
                document.authorization_endpoint.clone().ok_or_else(|| {
                    TokenError::Misconfigured(
                        "discovery document has no authorization_endpoint".to_string(),
                    )
                })?
            }
        };

        let mut url = self.ensure_endpoint("authorization_endpoint", &endpoint)?;
        let pkce = Pkce::generate();
        let state = state.map_or_else(random_token, String::from);
        let redirect_uri = redirect_uri.or(self.config.callback_url.as_deref());

        {
            let mut params = url.query_pairs_mut();
            params.append_pair("response_type", "code");
            params.append_pair("client_id", provider.client_id());
            if let Some(redirect_uri) = redirect_uri {
                params.append_pair("redirect_uri", redirect_uri);
            }
            if !provider.scopes().is_empty() {
                params.append_pair("scope", &provider.scopes().join(" "));
            }
            params.append_pair("state", &state);
            params.append_pair("code_challenge", pkce.challenge());
            params.append_pair("code_challenge_method", PKCE_METHOD);
        }

        debug!(
            provider_id = %provider.id(),
            endpoint = %endpoint,
            "Built authorization URL"
        );

        Ok(AuthorizationRequest {
            authorization_url: url.into(),
            state,
            code_verifier: pkce.verifier().to_string(),
            provider_id: provider.id().to_string(),
        })
    }

    /// Builds the provider's RP-initiated logout URL.
    ///
    /// Returns `None` when the provider has no logout endpoint: plain OAuth2
    /// providers, and OIDC providers without `end_session_endpoint`. The
    /// caller then ends only its local session.
    pub async fn logout_url(
        &self,
        provider: &ProviderConfig,
        post_logout_redirect_uri: Option<&str>,
        id_token_hint: Option<&str>,
    ) -> Result<Option<String>, TokenError> {
        let ProviderConfig::Oidc(config) = provider else {
            return Ok(None);
        };

        let metadata = self.discovery.metadata(&config.issuer).await?;
        let Some(endpoint) = metadata.document.end_session_endpoint.as_deref() else {
            debug!(provider_id = %provider.id(), "No end_session_endpoint, local logout only");
            return Ok(None);
        };

        let mut url = self.ensure_endpoint("end_session_endpoint", endpoint)?;
        {
            let mut params = url.query_pairs_mut();
            if let Some(redirect_uri) = post_logout_redirect_uri {
                params.append_pair("post_logout_redirect_uri", redirect_uri);
            }
            params.append_pair("client_id", provider.client_id());
            if let Some(hint) = id_token_hint {
                params.append_pair("id_token_hint", hint);
            }
        }
        Ok(Some(url.into()))
    }
}
