//! # octofhir-broker
//!
//! Multi-provider authentication broker.
//!
//! Users authenticate against one of several configured external identity
//! providers (OpenID Connect or plain OAuth 2.0). The broker exchanges the
//! presented credential with the selected provider, validates what comes
//! back and normalizes the provider's claims into a single
//! [`NormalizedIdentity`].
//!
//! ## Modules
//!
//! - [`claims`] - Dot-path lookups into claim documents
//! - [`provider`] - Provider configuration and organization policies
//! - [`registry`] - Thread-safe provider registry with snapshot reads
//! - [`discovery`] - Cached OIDC discovery and signing keys
//! - [`exchange`] - Grant exchange, ID token validation and connection checks
//! - [`login`] - Authorization code flow start (PKCE) and logout redirects
//! - [`mapping`] - Claims to [`NormalizedIdentity`] mapping
//! - [`broker`] - The [`AuthBroker`] entry point
//! - [`http`] - Axum handlers for the token, login, logout and provider listing endpoints

pub mod broker;
pub mod claims;
pub mod config;
pub mod discovery;
pub mod error;
pub mod exchange;
pub mod http;
pub mod identity;
pub mod login;
pub mod mapping;
pub mod provider;
pub mod registry;

pub use broker::AuthBroker;
pub use claims::ClaimExtractor;
pub use config::{BrokerConfig, ConfigError};
pub use discovery::{DiscoveryClient, DiscoveryDocument, DiscoveryError, ProviderMetadata};
pub use error::{AuthError, TokenInvalidReason};
pub use exchange::{
    CheckNote, EndpointCheck, Grant, NoteLevel, ProviderCheckReport, RawClaims, TokenError,
    TokenExchanger, TokenRequest,
};
pub use http::router;
pub use identity::NormalizedIdentity;
pub use login::{AuthorizationRequest, Pkce};
pub use mapping::{IdentityMapper, MappingError};
pub use provider::{
    OAuth2ProviderConfig, OidcProviderConfig, OrganizationAssignment, ProviderCommon,
    ProviderConfig, ProviderSummary, ProviderType, mask_secret,
};
pub use registry::{ProviderRegistry, RegistrySnapshot};

/// Type alias for broker results.
pub type AuthResult<T> = Result<T, AuthError>;
