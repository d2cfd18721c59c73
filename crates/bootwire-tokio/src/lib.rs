//! Tokio-backed provider for the bootwire bootstrap contract.
//!
//! Provides [`TokioBootstrapper`], which binds a TCP listener per instance on
//! a dedicated multi-thread runtime and hands every accepted connection to
//! the application.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bootwire_core::{Application, Configuration};
//! use bootwire_tokio::ServerHandle;
//!
//! # async fn run(app: Arc<dyn Application>) -> anyhow::Result<()> {
//! bootwire_tokio::install()?;
//!
//! let instance = bootwire_core::start(app, Configuration::builder().build())?.await?;
//! if let Some(server) = instance.unwrap_native::<ServerHandle>()? {
//!     println!("listening on {}", server.local_addr);
//! }
//! instance.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod handle;
pub mod lifecycle;
pub mod runtime_context;

use std::sync::Arc;

use bootwire_core::{BootstrapError, Bootstrapper, ProviderDescriptor, ProviderRegistry};

pub use error::ProviderError;
pub use handle::{ServerHandle, ShutdownReport};
pub use lifecycle::TokioBootstrapper;
pub use runtime_context::RuntimeContext;

/// Name this provider registers under.
pub const PROVIDER_NAME: &str = "tokio";

/// Registration entry for this provider; the runtime is built on first use.
pub fn descriptor() -> ProviderDescriptor {
    ProviderDescriptor::new(PROVIDER_NAME, || {
        let provider = TokioBootstrapper::new()?;
        Ok(Arc::new(provider) as Arc<dyn Bootstrapper>)
    })
}

/// Register this provider in the process-wide registry.
pub fn install() -> Result<(), BootstrapError> {
    ProviderRegistry::global().register(descriptor())
}
