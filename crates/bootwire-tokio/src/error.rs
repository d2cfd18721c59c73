use std::io;

use bootwire_core::BootstrapError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to build runtime: {0}")]
    RuntimeBuild(#[source] io::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("port out of range: {0}")]
    InvalidPort(i32),

    #[error("accept loop failed: {0}")]
    AcceptLoop(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<ProviderError> for BootstrapError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Bind { addr, source } => BootstrapError::Io(io::Error::new(
                source.kind(),
                format!("failed to bind {addr}: {source}"),
            )),
            ProviderError::Io(e) => BootstrapError::Io(e),
            other => BootstrapError::ProviderFailed(other.to_string()),
        }
    }
}
