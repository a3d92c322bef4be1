// ConnectionStatusMonitor tests: initial state, listener fan-out, no-op transitions

use apm_telemetry::agent::{ConnectionStatus, ConnectionStatusMonitor, StatusListener};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Recorder {
    name: &'static str,
    log: Arc<Mutex<Vec<(&'static str, ConnectionStatus)>>>,
}

impl StatusListener for Recorder {
    fn status_changed(&self, status: ConnectionStatus) {
        self.log.lock().unwrap().push((self.name, status));
    }
}

#[test]
fn monitor_starts_disconnected() {
    let monitor = ConnectionStatusMonitor::new();
    assert_eq!(monitor.status(), ConnectionStatus::Disconnected);
}

#[test]
fn monitor_notifies_listeners_in_registration_order() {
    let monitor = ConnectionStatusMonitor::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    monitor.add_listener(Arc::new(Recorder {
        name: "first",
        log: log.clone(),
    }));
    monitor.add_listener(Arc::new(Recorder {
        name: "second",
        log: log.clone(),
    }));

    assert!(monitor.transition(ConnectionStatus::Connected));
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            ("first", ConnectionStatus::Connected),
            ("second", ConnectionStatus::Connected),
        ]
    );
}

#[test]
fn monitor_ignores_unchanged_status() {
    let monitor = ConnectionStatusMonitor::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    monitor.add_listener(Arc::new(Recorder {
        name: "only",
        log: log.clone(),
    }));

    assert!(!monitor.transition(ConnectionStatus::Disconnected));
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn monitor_reconnect_sequence_is_observed_in_order() {
    let monitor = ConnectionStatusMonitor::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    monitor.add_listener(Arc::new(Recorder {
        name: "l",
        log: log.clone(),
    }));

    for status in [
        ConnectionStatus::Connecting,
        ConnectionStatus::Connected,
        ConnectionStatus::Disconnected,
        ConnectionStatus::Connected,
    ] {
        monitor.transition(status);
    }

    let seen: Vec<ConnectionStatus> = log.lock().unwrap().iter().map(|(_, s)| *s).collect();
    assert_eq!(
        seen,
        vec![
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected,
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connected,
        ]
    );
    assert_eq!(monitor.status(), ConnectionStatus::Connected);
}

#[test]
fn status_display_is_lowercase() {
    assert_eq!(ConnectionStatus::Connecting.to_string(), "connecting");
}
