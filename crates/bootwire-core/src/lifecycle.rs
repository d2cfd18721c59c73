use std::any::Any;
use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

use crate::configuration::{Configuration, ConfigurationBuilder};
use crate::error::BootstrapError;
use crate::pending::Pending;
use crate::value::Value;

/// A byte stream accepted by a provider on behalf of an application.
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Connection for T {}

pub type BoxedConnection = Box<dyn Connection>;

/// What an application learns about a connection besides its bytes.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub peer: Option<SocketAddr>,
    pub instance_id: Uuid,
    /// The running configuration of the instance that accepted the connection.
    pub configuration: Configuration,
}

/// The service a provider runs.
///
/// Request routing and protocol handling live behind this trait; providers
/// only hand over accepted connections.
pub trait Application: Send + Sync + 'static {
    /// The display name of this application (for logging).
    fn name(&self) -> &str;

    /// Serve one connection until it is done.
    fn handle<'a>(
        &'a self,
        connection: BoxedConnection,
        info: ConnectionInfo,
    ) -> Pin<Box<dyn Future<Output = io::Result<()>> + Send + 'a>>;
}

/// A concrete runtime able to start applications.
pub trait Bootstrapper: Send + Sync {
    /// The display name of this provider (for logging).
    fn name(&self) -> &str;

    /// A fresh builder, optionally pre-seeded with provider defaults.
    fn configuration_builder(&self) -> ConfigurationBuilder {
        Configuration::builder()
    }

    /// Start `application` with `configuration`.
    ///
    /// Must return at once. Bind failures are reported through the returned
    /// future, never by blocking or panicking here.
    fn bootstrap(
        &self,
        application: Arc<dyn Application>,
        configuration: Configuration,
    ) -> Pending<Instance>;
}

/// Provider side of a running instance.
pub trait InstanceControl: Send + Sync {
    /// Release the instance's resources; resolves to the native stop handle.
    ///
    /// The instance reads as stopped once `completion` is dropped, whether or
    /// not anyone awaits the returned future. Move it into the work that
    /// actually releases the resources.
    fn stop(&self, completion: StopCompletion) -> Pending<Option<Value>>;
}

/// Marks an instance stopped when dropped.
///
/// Handed to [`InstanceControl::stop`] so the transition follows the
/// provider's own work instead of the caller's future.
#[must_use = "dropping the completion marks the instance stopped at once"]
pub struct StopCompletion {
    id: Uuid,
    state: Arc<AtomicU8>,
}

impl StopCompletion {
    /// Mark the instance stopped now.
    pub fn complete(self) {}
}

impl Drop for StopCompletion {
    fn drop(&mut self) {
        if self.state.swap(STOPPED, Ordering::AcqRel) != STOPPED {
            tracing::debug!(instance = %self.id, "Instance released by provider");
        }
    }
}

/// Where an [`Instance`] is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Running,
    Stopping,
    Stopped,
}

const RUNNING: u8 = 0;
const STOPPING: u8 = 1;
const STOPPED: u8 = 2;

/// Handle to a running service.
///
/// Clones share the same instance: stopping through one clone stops them
/// all. Only the first `stop()` does anything; later calls fail with
/// [`BootstrapError::AlreadyStopped`] through the returned future.
#[derive(Clone)]
pub struct Instance {
    inner: Arc<InstanceInner>,
}

struct InstanceInner {
    id: Uuid,
    configuration: Configuration,
    native: Option<Value>,
    control: Box<dyn InstanceControl>,
    state: Arc<AtomicU8>,
}

impl Instance {
    pub fn new(
        id: Uuid,
        configuration: Configuration,
        native: Option<Value>,
        control: impl InstanceControl + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(InstanceInner {
                id,
                configuration,
                native,
                control: Box::new(control),
                state: Arc::new(AtomicU8::new(RUNNING)),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// The configuration the instance actually runs with.
    pub fn configuration(&self) -> &Configuration {
        &self.inner.configuration
    }

    pub fn state(&self) -> LifecycleState {
        match self.inner.state.load(Ordering::Acquire) {
            RUNNING => LifecycleState::Running,
            STOPPING => LifecycleState::Stopping,
            _ => LifecycleState::Stopped,
        }
    }

    pub fn native_handle(&self) -> Option<&Value> {
        self.inner.native.as_ref()
    }

    /// The provider's native handle as `T`.
    ///
    /// `Ok(None)` when the provider exposes none; a handle of another type is
    /// a [`BootstrapError::TypeMismatch`].
    pub fn unwrap_native<T: Any>(&self) -> Result<Option<&T>, BootstrapError> {
        unwrap_value(self.inner.native.as_ref(), "instance native handle")
    }

    /// Stop the instance. Resolves once the provider released it.
    ///
    /// The instance counts as stopped afterwards even when the provider
    /// reported a failure.
    pub fn stop(&self) -> Pending<StopResult> {
        let id = self.inner.id;
        if self
            .inner
            .state
            .compare_exchange(RUNNING, STOPPING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(instance = %id, "Stop requested on an instance that is not running");
            return Pending::failed(BootstrapError::AlreadyStopped(id));
        }

        tracing::info!(instance = %id, "Stopping instance");
        let completion = StopCompletion {
            id,
            state: Arc::clone(&self.inner.state),
        };
        let stopping = self.inner.control.stop(completion);
        let state = Arc::clone(&self.inner.state);
        Pending::from_future(async move {
            let result = stopping.await;
            state.store(STOPPED, Ordering::Release);
            match result {
                Ok(native) => {
                    tracing::info!(instance = %id, "Instance stopped");
                    Ok(StopResult {
                        instance_id: id,
                        native,
                    })
                }
                Err(e) => {
                    tracing::warn!(instance = %id, error = %e, "Instance stopped with error");
                    Err(e)
                }
            }
        })
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("configuration", &self.inner.configuration)
            .field("native", &self.inner.native)
            .finish()
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.id)
    }
}

/// Outcome of a successful [`Instance::stop`].
#[derive(Clone)]
pub struct StopResult {
    instance_id: Uuid,
    native: Option<Value>,
}

impl StopResult {
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn native_handle(&self) -> Option<&Value> {
        self.native.as_ref()
    }

    /// Same contract as [`Instance::unwrap_native`].
    pub fn unwrap_native<T: Any>(&self) -> Result<Option<&T>, BootstrapError> {
        unwrap_value(self.native.as_ref(), "stop result native handle")
    }
}

impl fmt::Debug for StopResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopResult")
            .field("instance_id", &self.instance_id)
            .field("native", &self.native)
            .finish()
    }
}

fn unwrap_value<'a, T: Any>(
    value: Option<&'a Value>,
    what: &str,
) -> Result<Option<&'a T>, BootstrapError> {
    value.map(|v| v.cast::<T>(what)).transpose()
}
