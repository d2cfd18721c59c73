use std::net::SocketAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Native handle of a running instance, via `Instance::unwrap_native`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHandle {
    pub id: Uuid,
    /// Address the listener is actually bound to.
    pub local_addr: SocketAddr,
    pub started_at: DateTime<Utc>,
}

/// Native handle of a stop result, via `StopResult::unwrap_native`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub id: Uuid,
    /// Connections accepted over the instance's life.
    pub connections_served: u64,
    /// Connections still open at stop time and cut off.
    pub connections_aborted: usize,
    pub uptime: Duration,
}
