//! Mapping of raw provider claims into a [`NormalizedIdentity`].

use std::collections::HashSet;

use serde_json::Value;

use crate::claims::ClaimExtractor;
use crate::identity::NormalizedIdentity;
use crate::provider::{OrganizationAssignment, ProviderConfig};

/// Errors produced while mapping claims.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    /// The username claim is absent or not a scalar.
    #[error("Username claim '{claim}' is missing")]
    MissingUsernameClaim {
        /// The configured claim path.
        claim: String,
    },

    /// The organization assignment policy is unusable.
    #[error("Invalid organization assignment: {0}")]
    InvalidPolicy(String),
}

/// Converts raw claims into a normalized identity using a provider's claim
/// paths and organization assignment policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityMapper;

impl IdentityMapper {
    /// Maps `claims` produced by `provider`.
    ///
    /// # Errors
    ///
    /// - `MissingUsernameClaim` if the username claim is absent
    /// - `InvalidPolicy` if the organization assignment is malformed
    pub fn map(
        provider: &ProviderConfig,
        claims: &Value,
    ) -> Result<NormalizedIdentity, MappingError> {
        let username_claim = provider.username_claim();
        let username = ClaimExtractor::extract_identifier(claims, username_claim).ok_or_else(|| {
            MappingError::MissingUsernameClaim {
                claim: username_claim.to_string(),
            }
        })?;

        let roles = provider
            .role_claim()
            .and_then(|claim| ClaimExtractor::extract_strings(claims, claim))
            .map(dedup)
            .unwrap_or_default();

        let organizations = match provider.organization_assignment() {
            Some(policy) => Self::organizations(policy, claims, &username, &roles)?,
            None => Vec::new(),
        };

        let subject =
            ClaimExtractor::extract_identifier(claims, "sub").unwrap_or_else(|| username.clone());

        Ok(NormalizedIdentity {
            subject,
            display_name: display_name(claims),
            email: ClaimExtractor::extract_string(claims, "email"),
            email_verified: ClaimExtractor::extract_bool(claims, "email_verified"),
            username,
            roles,
            organizations,
            provider_id: provider.id().to_string(),
        })
    }

    /// Applies an organization assignment policy.
    pub fn organizations(
        policy: &OrganizationAssignment,
        claims: &Value,
        username: &str,
        roles: &[String],
    ) -> Result<Vec<String>, MappingError> {
        policy.check().map_err(MappingError::InvalidPolicy)?;

        let organizations = match policy {
            OrganizationAssignment::Static { organizations } => organizations.clone(),
            OrganizationAssignment::Dynamic {
                claim_path,
                organization_name_prefix,
                organization_name_suffix,
            } => ClaimExtractor::extract_strings(claims, claim_path)
                .unwrap_or_default()
                .iter()
                .map(|name| {
                    decorate(
                        name,
                        organization_name_prefix.as_deref(),
                        organization_name_suffix.as_deref(),
                    )
                })
                .collect(),
            OrganizationAssignment::PerUser {
                organization_name_prefix,
                organization_name_suffix,
            } => vec![decorate(
                username,
                organization_name_prefix.as_deref(),
                organization_name_suffix.as_deref(),
            )],
            OrganizationAssignment::RoleNamespace { separator } => roles
                .iter()
                .filter_map(|role| role.split_once(separator.as_str()))
                .map(|(namespace, _)| namespace)
                .filter(|namespace| !namespace.is_empty())
                .map(String::from)
                .collect(),
        };

        Ok(dedup(organizations))
    }
}

fn decorate(name: &str, prefix: Option<&str>, suffix: Option<&str>) -> String {
    format!(
        "{}{}{}",
        prefix.unwrap_or_default(),
        name,
        suffix.unwrap_or_default()
    )
}

fn display_name(claims: &Value) -> Option<String> {
    if let Some(name) = ClaimExtractor::extract_string(claims, "name") {
        return Some(name);
    }
    let given = ClaimExtractor::extract_string(claims, "given_name");
    let family = ClaimExtractor::extract_string(claims, "family_name");
    match (given, family) {
        (Some(g), Some(f)) => Some(format!("{g} {f}")),
        (Some(n), None) | (None, Some(n)) => Some(n),
        (None, None) => None,
    }
}

/// Removes duplicates, keeping the first occurrence.
fn dedup(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(v.clone()))
        .collect()
}
