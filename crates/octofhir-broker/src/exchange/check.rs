//! Provider connection checks.
//!
//! A check validates a provider configuration and then contacts the
//! provider the way a login would, without credentials: the discovery
//! document for OIDC providers, then each endpoint the broker would call.
//! Every problem becomes a note on the field it concerns instead of an
//! error, so an operator sees all of them at once.
//!
//! | Endpoint        | Request                       | Failure                         |
//! |-----------------|-------------------------------|---------------------------------|
//! | authorization   | `GET`                         | transport error, 404            |
//! | token           | `POST` empty form             | transport error, 404, 405       |
//! | userinfo        | `GET` with a dummy bearer     | transport error, 404, 405       |
//!
//! A userinfo endpoint answering 200 with something other than JSON is a
//! warning.

use reqwest::StatusCode;
use serde::Serialize;
use tracing::debug;

use super::TokenExchanger;
use crate::discovery::{DiscoveryError, discovery_url};
use crate::provider::{ProviderConfig, ProviderType};

/// Severity of a check note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteLevel {
    /// Logins will likely work, but something looks off.
    Warning,
    /// Logins through this provider will fail.
    Error,
}

/// A finding attached to part of a check report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckNote {
    /// Severity.
    pub level: NoteLevel,
    /// Human-readable description.
    pub text: String,
}

impl CheckNote {
    fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoteLevel::Error,
            text: text.into(),
        }
    }

    fn warning(text: impl Into<String>) -> Self {
        Self {
            level: NoteLevel::Warning,
            text: text.into(),
        }
    }
}

/// Result of probing one provider endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointCheck {
    /// Endpoint role, e.g. `token_endpoint`.
    pub name: String,
    /// The requested URL, when known.
    pub url: Option<String>,
    /// Whether the endpoint answered at all.
    pub reachable: bool,
    /// Findings for this endpoint.
    pub notes: Vec<CheckNote>,
}

impl EndpointCheck {
    fn new(name: &str, url: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            url,
            reachable: false,
            notes: Vec::new(),
        }
    }
}

/// Outcome of checking one provider configuration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCheckReport {
    /// The checked provider.
    pub provider_id: String,
    /// Its type.
    pub provider_type: ProviderType,
    /// `true` when no error-level note was recorded.
    pub valid: bool,
    /// Configuration findings.
    pub notes: Vec<CheckNote>,
    /// Discovery document fetch (OIDC only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery: Option<EndpointCheck>,
    /// Provider endpoints in call order.
    pub endpoints: Vec<EndpointCheck>,
    /// `scopes_supported` from discovery.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub supported_scopes: Vec<String>,
    /// `grant_types_supported` from discovery.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub supported_grant_types: Vec<String>,
}

impl ProviderCheckReport {
    /// Returns every error-level note in the report.
    pub fn errors(&self) -> Vec<&CheckNote> {
        self.notes
            .iter()
            .chain(self.discovery.iter().flat_map(|d| d.notes.iter()))
            .chain(self.endpoints.iter().flat_map(|e| e.notes.iter()))
            .filter(|n| n.level == NoteLevel::Error)
            .collect()
    }

    /// Returns the endpoint check named `name`.
    pub fn endpoint(&self, name: &str) -> Option<&EndpointCheck> {
        self.endpoints.iter().find(|e| e.name == name)
    }
}

#[derive(Clone, Copy)]
enum Attempt {
    Get,
    PostForm,
    BearerGet,
}

impl TokenExchanger {
    /// Checks `provider`'s configuration and connectivity.
    ///
    /// Never fails; every problem is reported as a note.
    pub async fn check_provider(&self, provider: &ProviderConfig) -> ProviderCheckReport {
        let mut report = ProviderCheckReport {
            provider_id: provider.id().to_string(),
            provider_type: provider.provider_type(),
            valid: true,
            notes: Vec::new(),
            discovery: None,
            endpoints: Vec::new(),
            supported_scopes: Vec::new(),
            supported_grant_types: Vec::new(),
        };

        if let Err(err) = provider.validate(self.config.allow_http) {
            report.notes.push(CheckNote::error(err.to_string()));
        }

        let endpoints: Vec<(&str, Option<String>, Attempt)> = match provider {
            ProviderConfig::OAuth2(config) => vec![
                ("authorization_endpoint", Some(config.authorization_url.clone()), Attempt::Get),
                ("token_endpoint", Some(config.token_url.clone()), Attempt::PostForm),
                ("userinfo_endpoint", Some(config.userinfo_url.clone()), Attempt::BearerGet),
            ],
            ProviderConfig::Oidc(config) => {
                let mut discovery = EndpointCheck::new(
                    "discovery",
                    discovery_url(&config.issuer).ok().map(String::from),
                );
                match self.discovery.fetch_uncached(&config.issuer).await {
                    Ok(metadata) => {
                        discovery.reachable = true;
                        let document = metadata.document;
                        if metadata.keys.is_empty() {
                            discovery
                                .notes
                                .push(CheckNote::error("JWKS publishes no usable signing keys"));
                        }
                        if document.userinfo_endpoint.is_none() {
                            discovery.notes.push(CheckNote::warning(
                                "userinfo_endpoint missing; claims come from the ID token only",
                            ));
                        }
                        report.supported_scopes = document.scopes_supported.unwrap_or_default();
                        report.supported_grant_types =
                            document.grant_types_supported.unwrap_or_default();
                        report.discovery = Some(discovery);
                        vec![
                            ("authorization_endpoint", document.authorization_endpoint, Attempt::Get),
                            ("token_endpoint", Some(document.token_endpoint), Attempt::PostForm),
                            ("userinfo_endpoint", document.userinfo_endpoint, Attempt::BearerGet),
                        ]
                    }
                    Err(err) => {
                        discovery.reachable = !matches!(
                            err,
                            DiscoveryError::NetworkError(_)
                                | DiscoveryError::Timeout(_)
                                | DiscoveryError::InvalidUrl(_)
                                | DiscoveryError::InvalidScheme(_)
                        );
                        discovery.notes.push(CheckNote::error(format!(
                            "Failed to fetch OIDC discovery document: {err}"
                        )));
                        report.discovery = Some(discovery);
                        Vec::new()
                    }
                }
            }
        };

        for (name, url, attempt) in endpoints {
            let check = match url {
                Some(url) => self.contact_endpoint(name, url, attempt).await,
                None if name == "userinfo_endpoint" => continue,
                None => {
                    let mut check = EndpointCheck::new(name, None);
                    check
                        .notes
                        .push(CheckNote::error(format!("{name} missing from discovery document")));
                    check
                }
            };
            report.endpoints.push(check);
        }

        report.valid = report.errors().is_empty();
        debug!(
            provider_id = %report.provider_id,
            valid = report.valid,
            "Checked provider configuration"
        );
        report
    }

    async fn contact_endpoint(&self, name: &str, url: String, attempt: Attempt) -> EndpointCheck {
        let mut check = EndpointCheck::new(name, Some(url.clone()));
        if let Err(err) = self.ensure_endpoint(name, &url) {
            check.notes.push(CheckNote::error(err.to_string()));
            return check;
        }

        let request = match attempt {
            Attempt::Get => self.http_client.get(&url),
            Attempt::PostForm => self
                .http_client
                .post(&url)
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(""),
            Attempt::BearerGet => self
                .http_client
                .get(&url)
                .header("Accept", "application/json")
                .bearer_auth("connection-check"),
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                check
                    .notes
                    .push(CheckNote::error(format!("endpoint not reachable: {err}")));
                return check;
            }
        };
        check.reachable = true;

        let status = response.status();
        match (attempt, status) {
            (_, StatusCode::NOT_FOUND) => {
                check.notes.push(CheckNote::error("endpoint not found (404)"));
            }
            (Attempt::PostForm, StatusCode::METHOD_NOT_ALLOWED) => {
                check
                    .notes
                    .push(CheckNote::error("endpoint does not accept POST"));
            }
            (Attempt::BearerGet, StatusCode::METHOD_NOT_ALLOWED) => {
                check
                    .notes
                    .push(CheckNote::error("endpoint does not accept GET"));
            }
            (Attempt::BearerGet, StatusCode::OK) => {
                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                if !content_type.contains("json") {
                    check.notes.push(CheckNote::warning(format!(
                        "endpoint does not return JSON (got '{content_type}')"
                    )));
                }
            }
            _ => {}
        }

        check
    }
}
