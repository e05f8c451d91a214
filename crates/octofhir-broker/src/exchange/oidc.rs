//! OpenID Connect exchange and ID token validation.

use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{Grant, RawClaims, TokenError, TokenExchanger};
use crate::discovery::{SigningKey, is_asymmetric};
use crate::error::TokenInvalidReason;
use crate::provider::OidcProviderConfig;

impl TokenExchanger {
    pub(super) async fn exchange_oidc(
        &self,
        config: &OidcProviderConfig,
        grant: &Grant,
        scopes: &[String],
    ) -> Result<RawClaims, TokenError> {
        if let Grant::IdToken { token } = grant {
            return self.validate_id_token(config, token.expose_secret()).await;
        }

        let metadata = self.discovery.metadata(&config.issuer).await?;
        let document = &metadata.document;

        let supported = match grant {
            Grant::Password { .. } => document.supports_password(),
            Grant::AuthorizationCode { .. } => document.supports_authorization_code(),
            Grant::RefreshToken { .. } => document.supports_refresh_token(),
            Grant::IdToken { .. } => true,
        };
        if !supported {
            return Err(TokenError::UnsupportedGrant(grant.grant_type().to_string()));
        }

        self.ensure_endpoint("token_endpoint", &document.token_endpoint)?;
        let form = self.grant_form(
            grant,
            &config.common.client_id,
            &config.common.client_secret,
            scopes,
        )?;
        let token = self.request_token(&document.token_endpoint, &form).await?;

        let id_claims = match &token.id_token {
            Some(id_token) => Some(self.validate_id_token(config, id_token).await?),
            None => None,
        };

        let userinfo = match &document.userinfo_endpoint {
            Some(endpoint) => {
                self.ensure_endpoint("userinfo_endpoint", endpoint)?;
                Some(self.fetch_userinfo(endpoint, &token.access_token).await?)
            }
            None => None,
        };

        debug!(
            provider_id = %config.common.id,
            id_token = id_claims.is_some(),
            userinfo = userinfo.is_some(),
            expires_in = ?token.expires_in,
            "OIDC token exchange succeeded"
        );

        match (id_claims, userinfo) {
            (Some(id_claims), Some(userinfo)) => merge_claims(id_claims, userinfo),
            (Some(claims), None) | (None, Some(claims)) => Ok(claims),
            (None, None) => Err(TokenError::Misconfigured(
                "provider returned no ID token and publishes no userinfo endpoint".to_string(),
            )),
        }
    }

    /// Verifies a provider-issued JWT and returns its claims.
    ///
    /// Checks the signature against the provider's published key, `iss`
    /// against the configured issuer, `aud` against the client id, and
    /// `exp` / `nbf` with the configured clock skew.
    pub(super) async fn validate_id_token(
        &self,
        config: &OidcProviderConfig,
        token: &str,
    ) -> Result<RawClaims, TokenError> {
        let header = decode_header(token).map_err(|e| {
            TokenError::invalid(
                TokenInvalidReason::Malformed,
                format!("undecodable token header: {e}"),
            )
        })?;

        if !is_asymmetric(header.alg) {
            return Err(TokenError::invalid(
                TokenInvalidReason::Malformed,
                format!("algorithm {:?} is not accepted", header.alg),
            ));
        }

        let validation = self.validation(config, header.alg);

        let claims = match header.kid.as_deref() {
            Some(kid) => {
                let key = self.discovery.signing_key(&config.issuer, kid).await?;
                if !key.accepts(header.alg) {
                    return Err(TokenError::invalid(
                        TokenInvalidReason::Malformed,
                        format!("algorithm {:?} does not match key '{kid}'", header.alg),
                    ));
                }
                verify(token, &key, &validation)?
            }
            None => {
                let keys = self.discovery.signing_keys(&config.issuer).await?;
                let mut last_error = None;
                let mut verified = None;
                for key in keys.candidates(header.alg) {
                    match jsonwebtoken::decode::<Value>(token, &key.key, &validation) {
                        Ok(data) => {
                            verified = Some(data.claims);
                            break;
                        }
                        Err(e)
                            if matches!(
                                e.kind(),
                                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm
                            ) =>
                        {
                            last_error = Some(e);
                        }
                        Err(e) => return Err(jwt_error(e)),
                    }
                }
                match (verified, last_error) {
                    (Some(claims), _) => claims,
                    (None, Some(e)) => return Err(jwt_error(e)),
                    (None, None) => {
                        return Err(TokenError::invalid(
                            TokenInvalidReason::UnknownKey,
                            format!("no published key accepts {:?}", header.alg),
                        ));
                    }
                }
            }
        };

        debug!(
            provider_id = %config.common.id,
            kid = ?header.kid,
            "Validated provider token"
        );
        Ok(claims)
    }

    fn validation(&self, config: &OidcProviderConfig, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&[config.common.client_id.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.validate_nbf = true;
        validation.leeway = self.config.clock_skew.as_secs();
        validation
    }

    /// Parses a provider endpoint and checks its scheme.
    pub(super) fn ensure_endpoint(&self, name: &str, endpoint: &str) -> Result<Url, TokenError> {
        let url = Url::parse(endpoint)
            .map_err(|e| TokenError::Misconfigured(format!("{name} is not a valid URL: {e}")))?;
        let allowed = match url.scheme() {
            "https" => true,
            "http" => self.config.allow_http,
            _ => false,
        };
        if !allowed {
            return Err(TokenError::Misconfigured(format!(
                "{name} uses disallowed scheme '{}'",
                url.scheme()
            )));
        }
        Ok(url)
    }
}

fn verify(token: &str, key: &SigningKey, validation: &Validation) -> Result<Value, TokenError> {
    decode::<Value>(token, &key.key, validation)
        .map(|data| data.claims)
        .map_err(jwt_error)
}

/// Overlays userinfo claims on ID token claims.
///
/// Both documents must describe the same subject.
fn merge_claims(id_claims: Value, userinfo: Value) -> Result<Value, TokenError> {
    let (Value::Object(mut merged), Value::Object(extra)) = (id_claims, userinfo) else {
        return Err(TokenError::invalid(
            TokenInvalidReason::Malformed,
            "claims are not JSON objects",
        ));
    };

    if let (Some(a), Some(b)) = (merged.get("sub"), extra.get("sub"))
        && a != b
    {
        return Err(TokenError::invalid(
            TokenInvalidReason::Malformed,
            "userinfo subject differs from ID token subject",
        ));
    }

    merged.extend(extra);
    Ok(Value::Object(merged))
}

fn jwt_error(err: JwtError) -> TokenError {
    let reason = match err.kind() {
        ErrorKind::ExpiredSignature => TokenInvalidReason::Expired,
        ErrorKind::ImmatureSignature => TokenInvalidReason::NotYetValid,
        ErrorKind::InvalidSignature => TokenInvalidReason::BadSignature,
        ErrorKind::InvalidIssuer => TokenInvalidReason::IssuerMismatch,
        ErrorKind::InvalidAudience => TokenInvalidReason::AudienceMismatch,
        ErrorKind::MissingRequiredClaim(claim) => match claim.as_str() {
            "iss" => TokenInvalidReason::IssuerMismatch,
            "aud" => TokenInvalidReason::AudienceMismatch,
            _ => TokenInvalidReason::Malformed,
        },
        _ => TokenInvalidReason::Malformed,
    };
    TokenError::invalid(reason, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_claims_prefers_userinfo() {
        let merged = merge_claims(
            json!({"sub": "u1", "email": "old@example.com", "aud": "console"}),
            json!({"sub": "u1", "email": "new@example.com", "groups": ["a"]}),
        )
        .unwrap();
        assert_eq!(merged["email"], "new@example.com");
        assert_eq!(merged["aud"], "console");
        assert_eq!(merged["groups"], json!(["a"]));
    }

    #[test]
    fn test_merge_claims_subject_mismatch() {
        let err = merge_claims(json!({"sub": "u1"}), json!({"sub": "u2"})).unwrap_err();
        assert!(matches!(
            err,
            TokenError::Invalid {
                reason: TokenInvalidReason::Malformed,
                ..
            }
        ));
    }

    #[test]
    fn test_jwt_error_classification() {
        let cases = [
            (ErrorKind::ExpiredSignature, TokenInvalidReason::Expired),
            (ErrorKind::ImmatureSignature, TokenInvalidReason::NotYetValid),
            (ErrorKind::InvalidSignature, TokenInvalidReason::BadSignature),
            (ErrorKind::InvalidIssuer, TokenInvalidReason::IssuerMismatch),
            (ErrorKind::InvalidAudience, TokenInvalidReason::AudienceMismatch),
            (
                ErrorKind::MissingRequiredClaim("aud".to_string()),
                TokenInvalidReason::AudienceMismatch,
            ),
            (ErrorKind::InvalidToken, TokenInvalidReason::Malformed),
        ];
        for (kind, expected) in cases {
            match jwt_error(JwtError::from(kind)) {
                TokenError::Invalid { reason, .. } => assert_eq!(reason, expected),
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }
}
