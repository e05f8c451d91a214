//! Provider registry.
//!
//! Holds every configured provider in an immutable [`RegistrySnapshot`]
//! behind an [`ArcSwap`]. Readers take a snapshot with a single atomic load
//! and keep a consistent view for the whole request, even if an operator
//! registers, replaces or disables providers meanwhile. Writers build a new
//! snapshot and swap it in; a rejected change leaves the current snapshot
//! untouched.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use tracing::{debug, info};

use crate::error::AuthError;
use crate::provider::{ProviderConfig, ProviderSummary};

/// Immutable view of all registered providers.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    /// Providers in registration order.
    providers: Vec<Arc<ProviderConfig>>,
    /// Provider id to position in `providers`.
    index: HashMap<String, usize>,
    /// Provider marked as default in listings.
    default_provider: Option<String>,
}

impl RegistrySnapshot {
    /// Returns the provider with this id, enabled or not.
    pub fn get(&self, provider_id: &str) -> Option<&Arc<ProviderConfig>> {
        self.index.get(provider_id).map(|&i| &self.providers[i])
    }

    /// Returns all providers in registration order.
    pub fn all(&self) -> &[Arc<ProviderConfig>] {
        &self.providers
    }

    /// Returns enabled providers in registration order.
    pub fn enabled(&self) -> impl Iterator<Item = &Arc<ProviderConfig>> {
        self.providers.iter().filter(|p| p.is_enabled())
    }

    /// Returns the default provider id.
    pub fn default_provider(&self) -> Option<&str> {
        self.default_provider.as_deref()
    }

    /// Returns the number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns `true` if no provider is registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    fn push(&mut self, config: ProviderConfig) {
        self.index
            .insert(config.id().to_string(), self.providers.len());
        self.providers.push(Arc::new(config));
    }

    fn reindex(&mut self) {
        self.index = self
            .providers
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id().to_string(), i))
            .collect();
    }
}

/// Registry of provider configurations keyed by provider id.
pub struct ProviderRegistry {
    snapshot: ArcSwap<RegistrySnapshot>,
    /// Serializes writers; readers never take it.
    write_lock: Mutex<()>,
    allow_http: bool,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    ///
    /// With `allow_http` set, provider URLs may use plain `http://`.
    #[must_use]
    pub fn new(allow_http: bool) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(RegistrySnapshot::default()),
            write_lock: Mutex::new(()),
            allow_http,
        }
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.load_full()
    }

    /// Validates and stores a new provider.
    ///
    /// # Errors
    ///
    /// Returns `InvalidProviderConfig` if the configuration is invalid or the
    /// id is already registered. Nothing is stored in that case.
    pub fn register(&self, config: ProviderConfig) -> Result<(), AuthError> {
        config.validate(self.allow_http)?;

        self.update(|snapshot| {
            if snapshot.get(config.id()).is_some() {
                return Err(AuthError::invalid_provider_config(
                    config.id(),
                    "a provider with this id is already registered",
                ));
            }
            info!(
                provider_id = %config.id(),
                provider_type = %config.provider_type(),
                issuer = %config.issuer(),
                "Registered identity provider"
            );
            snapshot.push(config);
            Ok(())
        })
    }

    /// Replaces an existing provider's configuration.
    ///
    /// The provider type cannot change.
    pub fn replace(&self, config: ProviderConfig) -> Result<(), AuthError> {
        config.validate(self.allow_http)?;

        self.update(|snapshot| {
            let position = *snapshot
                .index
                .get(config.id())
                .ok_or_else(|| AuthError::unknown_provider(config.id()))?;

            let existing = &snapshot.providers[position];
            if existing.provider_type() != config.provider_type() {
                return Err(AuthError::invalid_provider_config(
                    config.id(),
                    format!(
                        "providerType cannot change from '{}' to '{}'",
                        existing.provider_type(),
                        config.provider_type()
                    ),
                ));
            }

            debug!(provider_id = %config.id(), "Replaced identity provider configuration");
            snapshot.providers[position] = Arc::new(config);
            Ok(())
        })
    }

    /// Enables or disables a provider.
    pub fn set_enabled(&self, provider_id: &str, enabled: bool) -> Result<(), AuthError> {
        self.update(|snapshot| {
            let position = *snapshot
                .index
                .get(provider_id)
                .ok_or_else(|| AuthError::unknown_provider(provider_id))?;

            let updated = ProviderConfig::clone(&snapshot.providers[position]).with_enabled(enabled);
            snapshot.providers[position] = Arc::new(updated);
            info!(provider_id, enabled, "Changed identity provider state");
            Ok(())
        })
    }

    /// Removes a provider.
    pub fn remove(&self, provider_id: &str) -> Result<Arc<ProviderConfig>, AuthError> {
        self.update(|snapshot| {
            let position = *snapshot
                .index
                .get(provider_id)
                .ok_or_else(|| AuthError::unknown_provider(provider_id))?;

            let removed = snapshot.providers.remove(position);
            snapshot.reindex();
            if snapshot.default_provider.as_deref() == Some(provider_id) {
                snapshot.default_provider = None;
            }
            info!(provider_id, "Removed identity provider");
            Ok(removed)
        })
    }

    /// Marks a registered provider as the default, or clears the default.
    pub fn set_default_provider(&self, provider_id: Option<&str>) -> Result<(), AuthError> {
        self.update(|snapshot| {
            if let Some(id) = provider_id
                && snapshot.get(id).is_none()
            {
                return Err(AuthError::unknown_provider(id));
            }
            snapshot.default_provider = provider_id.map(String::from);
            Ok(())
        })
    }

    /// Returns the provider with this id, enabled or not.
    ///
    /// # Errors
    ///
    /// Returns `UnknownProvider` if no provider has this id.
    pub fn get(&self, provider_id: &str) -> Result<Arc<ProviderConfig>, AuthError> {
        self.snapshot
            .load()
            .get(provider_id)
            .cloned()
            .ok_or_else(|| AuthError::unknown_provider(provider_id))
    }

    /// Returns enabled providers in registration order.
    pub fn list(&self) -> Vec<Arc<ProviderConfig>> {
        self.snapshot.load().enabled().cloned().collect()
    }

    /// Returns listing entries for enabled providers.
    pub fn summaries(&self) -> Vec<ProviderSummary> {
        let snapshot = self.snapshot.load();
        let default = snapshot.default_provider();
        snapshot
            .enabled()
            .map(|p| p.summary(default == Some(p.id())))
            .collect()
    }

    /// Returns the number of registered providers.
    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    /// Returns `true` if no provider is registered.
    pub fn is_empty(&self) -> bool {
        self.snapshot.load().is_empty()
    }

    /// Applies `change` to a copy of the current snapshot and publishes it
    /// only if `change` succeeds.
    fn update<T>(
        &self,
        change: impl FnOnce(&mut RegistrySnapshot) -> Result<T, AuthError>,
    ) -> Result<T, AuthError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut next = RegistrySnapshot::clone(&self.snapshot.load());
        let result = change(&mut next)?;
        self.snapshot.store(Arc::new(next));
        Ok(result)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new(false)
    }
}
