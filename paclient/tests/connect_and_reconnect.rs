//! Cold start and server-restart scenarios (connection-status lattice).

mod support;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use paclient::{Client, ClientConfig, ConnectionStatus};
use support::MockServer;

#[test]
fn cold_start_reaches_connected_once_the_server_accepts() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::bind(dir.path());

    let client = Client::new(ClientConfig::default().with_server_path_override(&server.socket_path).with_connect_timeout(Duration::from_secs(5))).unwrap();
    client.connect_async().unwrap();

    let _session = server.accept_and_handshake(1);

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !client.is_connected() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(client.is_connected(), "client never reached CONNECTED");
}

#[test]
fn repeated_connect_on_an_already_connected_client_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::bind(dir.path());

    let client = Client::new(ClientConfig::default().with_server_path_override(&server.socket_path)).unwrap();
    client.connect_async().unwrap();
    let _session = server.accept_and_handshake(1);

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !client.is_connected() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(client.is_connected());

    // A second connect request while already CONNECTED must not tear
    // anything down or re-dial; is_connected should simply stay true.
    client.connect_async().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    assert!(client.is_connected());
}

/// Scenario 2: the server closes its connection and recreates its socket
/// file; the client's connection-status callback sees DISCONNECTED then
/// CONNECTED again with no user action.
#[test]
fn server_restart_reconnects_and_reports_disconnected_then_connected() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = MockServer::bind(dir.path());

    let client = Client::new(ClientConfig::default().with_server_path_override(&server.socket_path)).unwrap();

    let statuses = Arc::new(Mutex::new(Vec::new()));
    let statuses_clone = statuses.clone();
    client
        .register_connection_status_callback(move |status| statuses_clone.lock().unwrap().push(status))
        .unwrap();

    client.connect_async().unwrap();
    let session = server.accept_and_handshake(1);
    assert!(wait_for(|| client.is_connected(), Duration::from_secs(5)));

    // The server hangs up and removes its socket file.
    drop(session);
    drop(server);
    let _ = std::fs::remove_file(dir.path().join("audio-server.socket"));
    assert!(wait_for(|| !client.is_connected(), Duration::from_secs(5)));

    // It comes back: a fresh listener at the same path, accept again.
    server = MockServer::bind(dir.path());
    let _session = server.accept_and_handshake(1);
    assert!(wait_for(|| client.is_connected(), Duration::from_secs(5)));

    let seen = statuses.lock().unwrap().clone();
    let first_connected = seen.iter().position(|s| *s == ConnectionStatus::Connected).unwrap();
    let disconnected_after = seen[first_connected + 1..]
        .iter()
        .position(|s| *s == ConnectionStatus::Disconnected);
    assert!(disconnected_after.is_some(), "expected a DISCONNECTED status after the restart: {seen:?}");
    assert_eq!(seen.last(), Some(&ConnectionStatus::Connected));
}

fn wait_for<F: Fn() -> bool>(cond: F, timeout: Duration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while !cond() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
