//! Pluggable runtime bootstrap for bootwire.
//!
//! Callers start a long-running service without naming the runtime that
//! provides it. A provider registers itself in the [`ProviderRegistry`];
//! [`start`] resolves it, hands over the [`Application`] and its
//! [`Configuration`], and returns a [`Pending`] that resolves to a running
//! [`Instance`].
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bootwire_core::{Application, Configuration};
//!
//! # async fn run(app: Arc<dyn Application>) -> Result<(), bootwire_core::BootstrapError> {
//! let configuration = Configuration::builder().protocol("HTTP").port(8080).build();
//!
//! let instance = bootwire_core::start(app, configuration)?.await?;
//! println!("running on port {}", instance.configuration().port());
//!
//! let stopped = instance.stop().await?;
//! println!("stopped {}", stopped.instance_id());
//! # Ok(())
//! # }
//! ```

pub mod configuration;
pub mod error;
pub mod lifecycle;
pub mod pending;
pub mod registry;
pub mod value;

use std::sync::Arc;

pub use configuration::{
    Configuration, ConfigurationBuilder, ParseSslClientAuthError, SslClientAuth, SslContext,
};
pub use error::BootstrapError;
pub use lifecycle::{
    Application, Bootstrapper, BoxedConnection, Connection, ConnectionInfo, Instance,
    InstanceControl, LifecycleState, StopCompletion, StopResult,
};
pub use pending::Pending;
pub use registry::{ProviderDescriptor, ProviderRegistry};
pub use value::Value;

/// Start `application` on the process-wide provider.
///
/// Fails right away only when no provider can be found. Everything that
/// happens while binding is reported through the returned [`Pending`].
pub fn start(
    application: Arc<dyn Application>,
    configuration: Configuration,
) -> Result<Pending<Instance>, BootstrapError> {
    start_with(ProviderRegistry::global(), application, configuration)
}

/// [`start`] against an explicit registry.
pub fn start_with(
    registry: &ProviderRegistry,
    application: Arc<dyn Application>,
    configuration: Configuration,
) -> Result<Pending<Instance>, BootstrapError> {
    let provider = registry.locate()?;
    tracing::debug!(
        provider = provider.name(),
        application = application.name(),
        protocol = configuration.protocol(),
        host = configuration.host(),
        port = configuration.port(),
        "Bootstrapping application"
    );
    Ok(provider.bootstrap(application, configuration))
}

/// A configuration builder from the process-wide provider.
///
/// Providers may pre-seed it with their own defaults. Use
/// [`Configuration::builder`] when no provider is involved.
pub fn builder() -> Result<ConfigurationBuilder, BootstrapError> {
    Ok(ProviderRegistry::global().locate()?.configuration_builder())
}
