use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bootwire_core::configuration::DEFAULT_PORT;
use bootwire_core::{
    Application, BootstrapError, Bootstrapper, Configuration, ConnectionInfo, Instance,
    InstanceControl, Pending, StopCompletion, Value,
};
use chrono::Utc;
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

use crate::error::ProviderError;
use crate::handle::{ServerHandle, ShutdownReport};
use crate::runtime_context::RuntimeContext;

/// Backoff after a failed `accept`, so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Provider that serves applications over plain TCP on its own tokio runtime.
///
/// Only the `HTTP` protocol is accepted; secure transports are left to other
/// providers. Each `bootstrap` call binds its own listener and owns its own
/// accept loop, so instances share nothing but the runtime.
pub struct TokioBootstrapper {
    context: Arc<RuntimeContext>,
}

impl TokioBootstrapper {
    pub fn new() -> Result<Self, ProviderError> {
        Ok(Self::with_context(Arc::new(RuntimeContext::new(None)?)))
    }

    pub fn with_context(context: Arc<RuntimeContext>) -> Self {
        Self { context }
    }
}

impl Bootstrapper for TokioBootstrapper {
    fn name(&self) -> &str {
        crate::PROVIDER_NAME
    }

    fn bootstrap(
        &self,
        application: Arc<dyn Application>,
        configuration: Configuration,
    ) -> Pending<Instance> {
        let handle = self.context.handle().clone();
        Pending::spawn(
            self.context.handle(),
            bind_instance(handle, application, configuration),
        )
    }
}

fn requested_port(configuration: &Configuration) -> Result<u16, ProviderError> {
    match configuration.port() {
        DEFAULT_PORT => Ok(0),
        port => u16::try_from(port).map_err(|_| ProviderError::InvalidPort(port)),
    }
}

async fn bind_instance(
    handle: Handle,
    application: Arc<dyn Application>,
    requested: Configuration,
) -> Result<Instance, BootstrapError> {
    if !requested.protocol().eq_ignore_ascii_case("HTTP") {
        return Err(BootstrapError::UnsupportedProtocol(
            requested.protocol().to_string(),
        ));
    }

    let host = requested.host().to_string();
    let port = requested_port(&requested)?;
    let listener = TcpListener::bind((host.as_str(), port))
        .await
        .map_err(|source| ProviderError::Bind {
            addr: format!("{host}:{port}"),
            source,
        })?;
    let local_addr = listener.local_addr().map_err(ProviderError::Io)?;

    let id = Uuid::new_v4();
    let running = requested
        .to_builder()
        .port(i32::from(local_addr.port()))
        .build();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let served = Arc::new(AtomicU64::new(0));
    let accept = handle.spawn(accept_loop(
        listener,
        application,
        running.clone(),
        id,
        shutdown_rx,
        Arc::clone(&served),
    ));

    let started_at = Utc::now();
    tracing::info!(
        instance = %id,
        addr = %local_addr,
        root_path = running.root_path(),
        "Instance running"
    );

    let native = ServerHandle {
        id,
        local_addr,
        started_at,
    };
    let control = ServerControl {
        id,
        handle,
        shutdown: shutdown_tx,
        accept: Mutex::new(Some(accept)),
        served,
        started_at,
    };
    Ok(Instance::new(id, running, Some(Value::new(native)), control))
}

/// Accept connections until told to stop; returns how many were cut off.
async fn accept_loop(
    listener: TcpListener,
    application: Arc<dyn Application>,
    configuration: Configuration,
    id: Uuid,
    mut shutdown: watch::Receiver<bool>,
    served: Arc<AtomicU64>,
) -> usize {
    let mut connections = JoinSet::new();
    // Set once every instance handle is gone: keep serving, nobody can stop us.
    let mut detached = false;

    loop {
        tokio::select! {
            changed = shutdown.changed(), if !detached => match changed {
                Ok(()) => break,
                Err(_) => {
                    tracing::debug!(instance = %id, "Instance handle dropped, serving until runtime shutdown");
                    detached = true;
                }
            },
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    served.fetch_add(1, Ordering::Relaxed);
                    spawn_connection(&mut connections, &application, &configuration, id, stream, peer);
                }
                Err(e) => {
                    tracing::warn!(instance = %id, error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    let aborted = connections.len();
    connections.shutdown().await;
    tracing::debug!(instance = %id, aborted, "Accept loop finished");
    aborted
}

fn spawn_connection(
    connections: &mut JoinSet<()>,
    application: &Arc<dyn Application>,
    configuration: &Configuration,
    id: Uuid,
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
) {
    let application = Arc::clone(application);
    let info = ConnectionInfo {
        peer: Some(peer),
        instance_id: id,
        configuration: configuration.clone(),
    };
    connections.spawn(async move {
        tracing::trace!(instance = %id, %peer, "Connection accepted");
        if let Err(e) = application.handle(Box::new(stream), info).await {
            tracing::debug!(instance = %id, %peer, error = %e, "Connection ended with error");
        }
    });
}

struct ServerControl {
    id: Uuid,
    handle: Handle,
    shutdown: watch::Sender<bool>,
    accept: Mutex<Option<JoinHandle<usize>>>,
    served: Arc<AtomicU64>,
    started_at: chrono::DateTime<Utc>,
}

impl InstanceControl for ServerControl {
    fn stop(&self, completion: StopCompletion) -> Pending<Option<Value>> {
        let accept = self
            .accept
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // No receiver means the accept loop already ended on its own.
        let _ = self.shutdown.send(true);

        let id = self.id;
        let served = Arc::clone(&self.served);
        let started_at = self.started_at;
        Pending::spawn(&self.handle, async move {
            let aborted = match accept {
                Some(task) => task
                    .await
                    .map_err(|e| ProviderError::AcceptLoop(e.to_string()))?,
                None => 0,
            };
            // Listener dropped and connections aborted by now.
            completion.complete();
            let report = ShutdownReport {
                id,
                connections_served: served.load(Ordering::Relaxed),
                connections_aborted: aborted,
                uptime: (Utc::now() - started_at).to_std().unwrap_or_default(),
            };
            tracing::info!(
                instance = %id,
                served = report.connections_served,
                aborted = report.connections_aborted,
                "Listener closed"
            );
            Ok::<_, BootstrapError>(Some(Value::new(report)))
        })
    }
}
