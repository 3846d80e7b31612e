//! Registering before a connection exists, then having the registration
//! replayed once the handshake completes.

mod support;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use paclient::{Client, ClientConfig, NotificationKind};
use paclient_proto::command::Command as WireCommand;
use paclient_proto::notify::NotificationEvent;

fn wait_for<F: Fn() -> bool>(cond: F, timeout: Duration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while !cond() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

#[test]
fn registration_made_before_connect_is_replayed_once_connected() {
    let dir = tempfile::tempdir().unwrap();
    let server = support::MockServer::bind(dir.path());

    let client = Client::new(ClientConfig::default().with_server_path_override(&server.socket_path)).unwrap();

    // Register before the connection even exists.
    client.register_notification(NotificationKind::OutputVolume, |_| {}).unwrap();

    client.connect_async().unwrap();
    let mut session = server.accept_and_handshake(1);
    assert!(wait_for(|| client.is_connected(), Duration::from_secs(5)));

    let (command, _) = session.recv_command();
    match command {
        WireCommand::RegisterNotification(reg) => assert_eq!(reg.kind, NotificationKind::OutputVolume),
        other => panic!("expected a replayed RegisterNotification, got {other:?}"),
    }
}

#[test]
fn pushed_notification_reaches_the_registered_callback() {
    let dir = tempfile::tempdir().unwrap();
    let server = support::MockServer::bind(dir.path());

    let client = Client::new(ClientConfig::default().with_server_path_override(&server.socket_path)).unwrap();
    client.connect_async().unwrap();
    let session = server.accept_and_handshake(1);
    assert!(wait_for(|| client.is_connected(), Duration::from_secs(5)));

    let received = Arc::new(AtomicU32::new(0));
    let received_clone = received.clone();
    client
        .register_notification(NotificationKind::CaptureMute, move |event: NotificationEvent| {
            if (event.value - 1.0).abs() < f32::EPSILON {
                received_clone.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

    // Drain the register record the client just sent before pushing ours.
    // (Not read back here: the mock session only needs to emit, not consume,
    // for this scenario -- the control worker's read loop keeps up with
    // both directions independently.)
    session.push_notification(NotificationEvent {
        kind: NotificationKind::CaptureMute,
        node_index: 0,
        value: 1.0,
    });

    assert!(wait_for(|| received.load(Ordering::SeqCst) == 1, Duration::from_secs(5)));
}
