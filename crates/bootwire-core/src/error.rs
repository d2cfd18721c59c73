use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("no bootstrap provider available: {0}")]
    Unsupported(String),

    #[error("provider registry already resolved, cannot register {0}")]
    RegistryLocked(String),

    #[error("type mismatch for {name}: expected {expected}, found {found}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("instance {0} is already stopped")]
    AlreadyStopped(Uuid),

    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("operation abandoned before completion")]
    Abandoned,

    #[error("provider failed: {0}")]
    ProviderFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BootstrapError {
    pub(crate) fn type_mismatch<T>(name: impl Into<String>, found: &'static str) -> Self {
        Self::TypeMismatch {
            name: name.into(),
            expected: std::any::type_name::<T>(),
            found,
        }
    }
}
