// Transport lifecycle state machine with synchronous listener fan-out.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    fn as_u8(self) -> u8 {
        match self {
            ConnectionStatus::Disconnected => 0,
            ConnectionStatus::Connecting => 1,
            ConnectionStatus::Connected => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            2 => ConnectionStatus::Connected,
            1 => ConnectionStatus::Connecting,
            _ => ConnectionStatus::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        })
    }
}

/// Status value readable from any thread without locking.
#[derive(Debug)]
pub struct AtomicStatus(AtomicU8);

impl AtomicStatus {
    pub fn new(status: ConnectionStatus) -> Self {
        Self(AtomicU8::new(status.as_u8()))
    }

    pub fn load(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, status: ConnectionStatus) {
        self.0.store(status.as_u8(), Ordering::Release);
    }

    fn swap(&self, status: ConnectionStatus) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.0.swap(status.as_u8(), Ordering::AcqRel))
    }
}

/// Receives every status transition. Runs on the thread that drove the transition, so
/// implementations must be fast, must not block, and must not call
/// [`ConnectionStatusMonitor::transition`] themselves.
pub trait StatusListener: Send + Sync {
    fn status_changed(&self, status: ConnectionStatus);
}

/// Single authoritative status per transport. Starts `Disconnected`, has no terminal
/// state, and notifies listeners in registration order on every change.
pub struct ConnectionStatusMonitor {
    status: AtomicStatus,
    listeners: RwLock<Vec<Arc<dyn StatusListener>>>,
    // Serializes transitions so listeners observe them in the order they happened.
    transition_lock: Mutex<()>,
}

impl Default for ConnectionStatusMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStatusMonitor {
    pub fn new() -> Self {
        Self {
            status: AtomicStatus::new(ConnectionStatus::Disconnected),
            listeners: RwLock::new(Vec::new()),
            transition_lock: Mutex::new(()),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn StatusListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.load()
    }

    /// Moves to `status` and notifies listeners. Returns false, without notifying, when
    /// the status is unchanged.
    pub fn transition(&self, status: ConnectionStatus) -> bool {
        let _serial = self
            .transition_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let previous = self.status.swap(status);
        if previous == status {
            return false;
        }
        debug!(from = %previous, to = %status, "connection status changed");
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener.status_changed(status);
        }
        true
    }
}
