//! Browser login and logout redirects.
//!
//! The broker never sees the user's password in an authorization code flow.
//! It builds the provider's authorization URL, hands the caller the `state`
//! and PKCE verifier to keep, and later receives the code through
//! `POST /auth/{provider_id}/token` with `grant_type=authorization_code`.
//!
//! ```ignore
//! let login = broker.login_redirect("corp", Some("https://console.example.com/callback"), None).await?;
//! // store login.state and login.code_verifier in the session, then redirect
//! // the browser to login.authorization_url
//! ```
//!
//! PKCE uses the S256 method only (RFC 7636).

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// PKCE challenge method sent with every authorization request.
pub const PKCE_METHOD: &str = "S256";

/// PKCE code verifier and its S256 challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pkce {
    verifier: String,
    challenge: String,
}

impl Pkce {
    /// Generates a verifier from 32 random bytes (43 base64url characters).
    #[must_use]
    pub fn generate() -> Self {
        Self::from_verifier(random_token())
    }

    /// Derives the S256 challenge for `verifier`.
    #[must_use]
    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }

    /// The verifier, sent later as `code_verifier`.
    #[must_use]
    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    /// The challenge, sent now as `code_challenge`.
    #[must_use]
    pub fn challenge(&self) -> &str {
        &self.challenge
    }
}

/// A started authorization code flow.
///
/// `state` and `code_verifier` must be kept by the caller: the state to match
/// the provider's callback, the verifier to send with the code.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRequest {
    /// Where to send the browser.
    pub authorization_url: String,
    /// Opaque value echoed by the provider on callback.
    pub state: String,
    /// PKCE verifier to present with the authorization code.
    pub code_verifier: String,
    /// The provider the flow was started against.
    pub provider_id: String,
}

/// Returns 32 random bytes as unpadded base64url.
pub(crate) fn random_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().r#gen();
    URL_SAFE_NO_PAD.encode(bytes)
}
