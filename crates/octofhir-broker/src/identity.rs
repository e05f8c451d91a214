//! The normalized identity handed to the rest of the application.

use serde::{Deserialize, Serialize};

/// Provider-agnostic identity of an authenticated user.
///
/// Created per successful authentication and never cached by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedIdentity {
    /// Stable subject id (`sub`), falling back to the username.
    pub subject: String,

    /// Username from the provider's configured username claim.
    pub username: String,

    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Whether the provider verified the email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,

    /// Roles in the order the provider listed them, without duplicates.
    #[serde(default)]
    pub roles: Vec<String>,

    /// Organizations, without duplicates.
    #[serde(default)]
    pub organizations: Vec<String>,

    /// Provider that authenticated the user.
    pub provider_id: String,
}

impl NormalizedIdentity {
    /// Returns `true` if the identity carries `role`.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Returns `true` if the identity belongs to `organization`.
    pub fn in_organization(&self, organization: &str) -> bool {
        self.organizations.iter().any(|o| o == organization)
    }
}
