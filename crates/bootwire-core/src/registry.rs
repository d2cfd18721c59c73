use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::error::BootstrapError;
use crate::lifecycle::Bootstrapper;

type FactoryFn = dyn Fn() -> Result<Arc<dyn Bootstrapper>, BootstrapError> + Send + Sync;

/// Registration entry: one named factory for the Bootstrapper contract.
#[derive(Clone)]
pub struct ProviderDescriptor {
    name: String,
    factory: Arc<FactoryFn>,
}

impl ProviderDescriptor {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Bootstrapper>, BootstrapError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

static GLOBAL: ProviderRegistry = ProviderRegistry::new();

/// Finds the one provider a process runs with.
///
/// Providers register a [`ProviderDescriptor`]; the first [`locate`] picks
/// one, calls its factory once and keeps the result for the life of the
/// registry. When several are registered the name that sorts first
/// (byte-wise) wins and the others are logged and ignored.
///
/// Factories run while the registry is locked and must not call back into it.
///
/// [`locate`]: ProviderRegistry::locate
pub struct ProviderRegistry {
    descriptors: Mutex<Vec<ProviderDescriptor>>,
    resolved: OnceLock<Arc<dyn Bootstrapper>>,
}

impl ProviderRegistry {
    pub const fn new() -> Self {
        Self {
            descriptors: Mutex::new(Vec::new()),
            resolved: OnceLock::new(),
        }
    }

    /// The process-wide registry used by [`crate::start`].
    pub fn global() -> &'static ProviderRegistry {
        &GLOBAL
    }

    /// Add a provider. Registering a name twice keeps the first entry, even
    /// after resolution.
    ///
    /// A new name fails once a provider has been resolved: the choice is final.
    pub fn register(&self, descriptor: ProviderDescriptor) -> Result<(), BootstrapError> {
        let mut descriptors = self
            .descriptors
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if descriptors.iter().any(|d| d.name == descriptor.name) {
            tracing::debug!(provider = %descriptor.name, "Provider already registered");
            return Ok(());
        }
        if self.resolved.get().is_some() {
            return Err(BootstrapError::RegistryLocked(descriptor.name));
        }

        tracing::debug!(provider = %descriptor.name, "Provider registered");
        descriptors.push(descriptor);
        Ok(())
    }

    /// Resolve the provider, initializing it on first use.
    pub fn locate(&self) -> Result<Arc<dyn Bootstrapper>, BootstrapError> {
        // Fast path: already resolved
        if let Some(provider) = self.resolved.get() {
            return Ok(Arc::clone(provider));
        }

        let descriptors = self
            .descriptors
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(provider) = self.resolved.get() {
            return Ok(Arc::clone(provider));
        }

        let mut candidates: Vec<&ProviderDescriptor> = descriptors.iter().collect();
        candidates.sort_by(|a, b| a.name.cmp(&b.name));

        let Some((chosen, ignored)) = candidates.split_first() else {
            return Err(BootstrapError::Unsupported(
                "no provider registered for the Bootstrapper contract".into(),
            ));
        };

        for other in ignored {
            tracing::warn!(
                provider = %other.name,
                chosen = %chosen.name,
                "Multiple bootstrap providers registered, ignoring"
            );
        }

        let provider = (chosen.factory)()?;
        tracing::info!(provider = %chosen.name, "Bootstrap provider resolved");

        // Cannot already be set: we hold the descriptor lock.
        let _ = self.resolved.set(Arc::clone(&provider));
        Ok(provider)
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// Registered provider names, in tie-break order.
    pub fn provider_names(&self) -> Vec<String> {
        let descriptors = self
            .descriptors
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = descriptors.iter().map(|d| d.name.clone()).collect();
        names.sort();
        names
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
