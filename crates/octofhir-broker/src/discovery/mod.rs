//! OpenID Connect discovery and signing key cache.
//!
//! [`DiscoveryClient`] fetches a provider's discovery document and JWKS and
//! keeps them per issuer as one [`ProviderMetadata`] value.
//!
//! # Caching
//!
//! - Metadata is fresh for `discovery_ttl` (12h by default).
//! - A token whose key id is not in the cached key set triggers one refresh,
//!   at most once per `refresh_cooldown` (60s by default) per issuer.
//! - A failed refresh keeps serving the previously fetched metadata and logs
//!   a warning. A failed first fetch is an error.
//! - Concurrent callers for the same issuer wait on a single in-flight fetch
//!   and all take its outcome. Issuers never block each other.
//!
//! # Security Considerations
//!
//! - Issuer and JWKS URLs must be HTTPS unless `allow_http` is set
//! - The discovery document's `issuer` must equal the configured issuer
//! - Response bodies are size-limited and every request has a timeout
//! - Key sets are replaced wholesale, never merged

mod document;
mod keys;

pub use document::DiscoveryDocument;
pub use keys::{KeySet, SigningKey, is_asymmetric};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use jsonwebtoken::jwk::JwkSet;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::config::{BrokerConfig, ConfigError};

/// Errors that can occur during discovery and key resolution.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DiscoveryError {
    /// A network error occurred.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The request did not complete within the configured timeout.
    #[error("Request to {0} timed out")]
    Timeout(String),

    /// The provider answered with a non-success status.
    #[error("HTTP error: status {0}")]
    HttpError(u16),

    /// The response body could not be parsed.
    #[error("Failed to parse provider response: {0}")]
    ParseError(String),

    /// A URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The document's issuer differs from the configured issuer.
    #[error("Issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch {
        /// The configured issuer.
        expected: String,
        /// The issuer asserted by the document.
        actual: String,
    },

    /// The URL scheme is not allowed.
    #[error("Invalid URL scheme: {0} (only HTTPS is allowed)")]
    InvalidScheme(String),

    /// The response exceeded the maximum allowed size.
    #[error("Response exceeds maximum size of {max_size} bytes")]
    ResponseTooLarge {
        /// The maximum allowed size.
        max_size: usize,
    },

    /// No usable key with this key id is published.
    #[error("Key not found: {0}")]
    KeyNotFound(String),
}

impl DiscoveryError {
    /// Returns `true` if the failure is on the transport or provider side
    /// and may go away on retry. Unreadable documents are not transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NetworkError(_) | Self::Timeout(_) => true,
            Self::HttpError(status) => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Discovery document and signing keys of one issuer.
#[derive(Debug)]
pub struct ProviderMetadata {
    /// The discovery document.
    pub document: DiscoveryDocument,
    /// Usable signing keys from `jwks_uri`.
    pub keys: KeySet,
    fetched_at: Instant,
}

impl ProviderMetadata {
    /// Time since this metadata was fetched.
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

/// Per-issuer cache slot.
#[derive(Default)]
struct IssuerSlot {
    /// Last successfully fetched metadata.
    current: ArcSwapOption<ProviderMetadata>,
    /// Bumped each time a fetch completes.
    generation: AtomicU64,
    /// Coalescing point; held for the duration of a fetch.
    fetch: Mutex<FetchState>,
}

#[derive(Default)]
struct FetchState {
    last_outcome: Option<Result<Arc<ProviderMetadata>, DiscoveryError>>,
    last_failure: Option<Instant>,
    last_key_refresh: Option<Instant>,
}

/// Fetches and caches provider discovery documents and key sets.
pub struct DiscoveryClient {
    http_client: reqwest::Client,
    config: BrokerConfig,
    issuers: DashMap<String, Arc<IssuerSlot>>,
}

impl DiscoveryClient {
    /// Creates a discovery client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: BrokerConfig) -> Result<Self, ConfigError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            http_client,
            config,
            issuers: DashMap::new(),
        })
    }

    /// Returns the discovery document for `issuer`.
    pub async fn discovery(&self, issuer: &str) -> Result<DiscoveryDocument, DiscoveryError> {
        Ok(self.metadata(issuer).await?.document.clone())
    }

    /// Returns cached metadata for `issuer`, fetching it when absent or
    /// older than the TTL.
    pub async fn metadata(&self, issuer: &str) -> Result<Arc<ProviderMetadata>, DiscoveryError> {
        let slot = self.slot(issuer);
        if let Some(current) = slot.current.load_full()
            && current.age() < self.config.discovery_ttl
        {
            return Ok(current);
        }

        let seen = slot.generation.load(Ordering::Acquire);
        let mut state = slot.fetch.lock().await;

        if slot.generation.load(Ordering::Acquire) != seen
            && let Some(outcome) = &state.last_outcome
        {
            return outcome.clone();
        }

        if let Some(current) = slot.current.load_full() {
            if current.age() < self.config.discovery_ttl {
                return Ok(current);
            }
            if state
                .last_failure
                .is_some_and(|at| at.elapsed() < self.config.refresh_cooldown)
            {
                return Ok(current);
            }
        }

        self.refresh_locked(issuer, &slot, &mut state).await
    }

    /// Returns the signing key with `kid` for `issuer`.
    ///
    /// A key id missing from the cached set triggers one refresh unless a
    /// key-miss refresh already ran within the cool-down window.
    pub async fn signing_key(&self, issuer: &str, kid: &str) -> Result<SigningKey, DiscoveryError> {
        let metadata = self.metadata(issuer).await?;
        if let Some(key) = metadata.keys.get(kid) {
            return Ok(key.clone());
        }

        let slot = self.slot(issuer);
        let seen = slot.generation.load(Ordering::Acquire);
        let mut state = slot.fetch.lock().await;

        let metadata = if slot.generation.load(Ordering::Acquire) != seen
            && let Some(outcome) = &state.last_outcome
        {
            outcome.clone()?
        } else if state
            .last_key_refresh
            .is_some_and(|at| at.elapsed() < self.config.refresh_cooldown)
        {
            debug!(issuer, kid, "Unknown key id within refresh cool-down");
            slot.current.load_full().unwrap_or(metadata)
        } else {
            debug!(issuer, kid, "Unknown key id, refreshing provider keys");
            state.last_key_refresh = Some(Instant::now());
            self.refresh_locked(issuer, &slot, &mut state).await?
        };

        metadata
            .keys
            .get(kid)
            .cloned()
            .ok_or_else(|| DiscoveryError::KeyNotFound(kid.to_string()))
    }

    /// Returns all cached signing keys for `issuer`.
    pub async fn signing_keys(&self, issuer: &str) -> Result<KeySet, DiscoveryError> {
        Ok(self.metadata(issuer).await?.keys.clone())
    }

    /// Fetches metadata for `issuer` without reading or updating the cache.
    ///
    /// Used by connection checks, which must observe the provider as it is
    /// now and must not disturb metadata served to logins.
    pub async fn fetch_uncached(&self, issuer: &str) -> Result<ProviderMetadata, DiscoveryError> {
        self.fetch_metadata(issuer).await
    }

    /// Drops the cached metadata for `issuer`.
    pub fn invalidate(&self, issuer: &str) {
        if self.issuers.remove(issuer).is_some() {
            debug!(issuer, "Invalidated provider metadata");
        }
    }

    /// Returns the number of issuers with a cache slot.
    pub fn cached_issuers(&self) -> usize {
        self.issuers.len()
    }

    fn slot(&self, issuer: &str) -> Arc<IssuerSlot> {
        if let Some(slot) = self.issuers.get(issuer) {
            return Arc::clone(&slot);
        }
        Arc::clone(&self.issuers.entry(issuer.to_string()).or_default())
    }

    /// Fetches fresh metadata. Caller holds the slot's fetch lock.
    async fn refresh_locked(
        &self,
        issuer: &str,
        slot: &IssuerSlot,
        state: &mut FetchState,
    ) -> Result<Arc<ProviderMetadata>, DiscoveryError> {
        let outcome = match self.fetch_metadata(issuer).await {
            Ok(metadata) => {
                let metadata = Arc::new(metadata);
                slot.current.store(Some(Arc::clone(&metadata)));
                state.last_failure = None;
                Ok(metadata)
            }
            Err(err) => {
                state.last_failure = Some(Instant::now());
                match slot.current.load_full() {
                    Some(stale) => {
                        warn!(
                            issuer,
                            error = %err,
                            age_secs = stale.age().as_secs(),
                            "Provider metadata refresh failed, serving cached copy"
                        );
                        Ok(stale)
                    }
                    None => {
                        warn!(issuer, error = %err, "Provider metadata fetch failed");
                        Err(err)
                    }
                }
            }
        };

        state.last_outcome = Some(outcome.clone());
        slot.generation.fetch_add(1, Ordering::Release);
        outcome
    }

    async fn fetch_metadata(&self, issuer: &str) -> Result<ProviderMetadata, DiscoveryError> {
        let discovery_url = discovery_url(issuer)?;
        self.validate_scheme(&discovery_url)?;

        debug!(issuer, url = %discovery_url, "Fetching OIDC discovery document");
        let document: DiscoveryDocument = self.fetch_json(&discovery_url).await?;

        if document.issuer != issuer {
            return Err(DiscoveryError::IssuerMismatch {
                expected: issuer.to_string(),
                actual: document.issuer,
            });
        }

        let jwks_url = Url::parse(&document.jwks_uri)
            .map_err(|e| DiscoveryError::InvalidUrl(format!("{}: {e}", document.jwks_uri)))?;
        self.validate_scheme(&jwks_url)?;

        let jwks: JwkSet = self.fetch_json(&jwks_url).await?;
        let keys = KeySet::from_jwks(&jwks);

        debug!(
            issuer,
            keys = keys.len(),
            "Fetched provider metadata"
        );

        Ok(ProviderMetadata {
            document,
            keys,
            fetched_at: Instant::now(),
        })
    }

    async fn fetch_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, DiscoveryError> {
        let response = self
            .http_client
            .get(url.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DiscoveryError::Timeout(url.to_string())
                } else {
                    DiscoveryError::NetworkError(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(DiscoveryError::HttpError(response.status().as_u16()));
        }

        let max_size = self.config.max_response_size;
        if let Some(len) = response.content_length()
            && len as usize > max_size
        {
            return Err(DiscoveryError::ResponseTooLarge { max_size });
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                DiscoveryError::Timeout(url.to_string())
            } else {
                DiscoveryError::NetworkError(e.to_string())
            }
        })?;
        if body.len() > max_size {
            return Err(DiscoveryError::ResponseTooLarge { max_size });
        }

        serde_json::from_slice(&body).map_err(|e| DiscoveryError::ParseError(e.to_string()))
    }

    fn validate_scheme(&self, url: &Url) -> Result<(), DiscoveryError> {
        match url.scheme() {
            "https" => Ok(()),
            "http" if self.config.allow_http => Ok(()),
            scheme => Err(DiscoveryError::InvalidScheme(scheme.to_string())),
        }
    }
}

/// Returns the discovery document URL of `issuer`.
pub fn discovery_url(issuer: &str) -> Result<Url, DiscoveryError> {
    let issuer_url =
        Url::parse(issuer).map_err(|e| DiscoveryError::InvalidUrl(format!("{issuer}: {e}")))?;
    Ok(build_discovery_url(&issuer_url))
}

/// Builds `{issuer}/.well-known/openid-configuration`.
fn build_discovery_url(issuer: &Url) -> Url {
    let mut discovery_url = issuer.clone();
    let path = issuer.path().trim_end_matches('/');
    discovery_url.set_path(&format!("{path}/.well-known/openid-configuration"));
    discovery_url
}
