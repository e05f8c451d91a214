//! Plain OAuth 2.0 exchange: token endpoint, then userinfo.

use tracing::debug;

use super::{Grant, RawClaims, TokenError, TokenExchanger};
use crate::provider::OAuth2ProviderConfig;

impl TokenExchanger {
    pub(super) async fn exchange_oauth2(
        &self,
        config: &OAuth2ProviderConfig,
        grant: &Grant,
        scopes: &[String],
    ) -> Result<RawClaims, TokenError> {
        if matches!(grant, Grant::IdToken { .. }) {
            return Err(TokenError::UnsupportedGrant(grant.grant_type().to_string()));
        }

        let form = self.grant_form(
            grant,
            &config.common.client_id,
            &config.common.client_secret,
            scopes,
        )?;
        let token = self.request_token(&config.token_url, &form).await?;

        debug!(
            provider_id = %config.common.id,
            token_type = ?token.token_type,
            expires_in = ?token.expires_in,
            scope = ?token.scope,
            "OAuth2 token exchange succeeded"
        );

        self.fetch_userinfo(&config.userinfo_url, &token.access_token)
            .await
    }
}
