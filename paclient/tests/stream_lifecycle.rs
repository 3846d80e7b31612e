//! Stream add/remove and the capture/playback data path end to end.

mod support;

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use paclient::{Client, ClientConfig, Direction};
use paclient_proto::audio_control::{AudioControlRecord, AudioControlTag};
use paclient_proto::command::Command as WireCommand;
use paclient_proto::record::{ClientType, SampleFormat};

fn wait_for<F: Fn() -> bool>(cond: F, timeout: Duration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while !cond() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn capture_stream_params(callback_calls: Arc<AtomicU32>) -> paclient::StreamParams {
    paclient::StreamParams {
        buffer_frames: 480,
        callback_threshold: 240,
        sample_format: SampleFormat::S16Le,
        channels: 2,
        rate_hz: 48_000,
        client_type: ClientType::Media,
        flags: 0,
        effects: 0,
        callback: Box::new(move |_buf, frames| {
            callback_calls.fetch_add(1, Ordering::SeqCst);
            frames as i32
        }),
        error_callback: None,
    }
}

#[test]
fn add_then_remove_stream_leaves_the_server_state_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let server = support::MockServer::bind(dir.path());

    let client = Client::new(ClientConfig::default().with_server_path_override(&server.socket_path)).unwrap();
    client.connect_async().unwrap();
    let mut session = server.accept_and_handshake(1);
    assert!(wait_for(|| client.is_connected(), Duration::from_secs(5)));

    let calls = Arc::new(AtomicU32::new(0));
    let params = capture_stream_params(calls.clone());

    let id = std::thread::scope(|scope| {
        let add_thread = scope.spawn(|| client.add_stream(Direction::Capture, params));

        let (command, mut fds) = session.recv_command();
        let stream_id = match command {
            WireCommand::AddStream(req) => req.stream_id,
            other => panic!("expected AddStream, got {other:?}"),
        };
        assert_eq!(fds.len(), 1, "add-stream carries exactly the audio socketpair end");
        drop(fds.pop());

        let _region = session.reply_stream_connected(stream_id, 64 * 1024);

        let id = add_thread.join().unwrap().unwrap();
        assert_eq!(id.raw(), stream_id);
        id
    });

    client.remove_stream(id).unwrap();
    let (command, _) = session.recv_command();
    assert!(matches!(command, WireCommand::RemoveStream { .. }));
}

/// Scenario 3: a capture stream observes exactly the frames the server
/// marks ready, and the reply to the server carries the frame count the
/// callback consumed.
#[test]
fn capture_stream_reads_the_frames_the_server_marks_ready() {
    let dir = tempfile::tempdir().unwrap();
    let server = support::MockServer::bind(dir.path());

    let client = Client::new(ClientConfig::default().with_server_path_override(&server.socket_path)).unwrap();
    client.connect_async().unwrap();
    let mut session = server.accept_and_handshake(1);
    assert!(wait_for(|| client.is_connected(), Duration::from_secs(5)));

    let observed_frames = Arc::new(AtomicU32::new(0));
    let observed_frames_clone = observed_frames.clone();
    let observed_value = Arc::new(AtomicU32::new(0));
    let observed_value_clone = observed_value.clone();
    let params = paclient::StreamParams {
        buffer_frames: 480,
        callback_threshold: 240,
        sample_format: SampleFormat::S16Le,
        channels: 2,
        rate_hz: 48_000,
        client_type: ClientType::Media,
        flags: 0,
        effects: 0,
        callback: Box::new(move |buf, frames| {
            observed_frames_clone.store(frames, Ordering::SeqCst);
            let sample = u16::from_le_bytes([buf[0], buf[1]]);
            observed_value_clone.store(u32::from(sample), Ordering::SeqCst);
            frames as i32
        }),
        error_callback: None,
    };

    let (audio_fd, region) = std::thread::scope(|scope| {
        let add_thread = scope.spawn(|| client.add_stream(Direction::Capture, params));

        let (command, mut fds) = session.recv_command();
        let stream_id = match command {
            WireCommand::AddStream(req) => req.stream_id,
            other => panic!("expected AddStream, got {other:?}"),
        };
        let audio_fd = fds.pop().expect("AddStream carries the audio socketpair end");

        let region = session.reply_stream_connected(stream_id, 64 * 1024);

        add_thread.join().unwrap().unwrap();
        (audio_fd, region)
    });

    // Give the control worker time to finish mapping and hand the region
    // off to the audio worker before driving the data path.
    std::thread::sleep(Duration::from_millis(50));

    let samples = unsafe { region.region.samples_mut() };
    for frame in 0..240usize {
        let bytes = 0x1234u16.to_le_bytes();
        samples[frame * 4] = bytes[0];
        samples[frame * 4 + 1] = bytes[1];
        samples[frame * 4 + 2] = bytes[0];
        samples[frame * 4 + 3] = bytes[1];
    }
    unsafe { region.region.header() }.advance_write_index(240);

    let reply = support::drive_audio_control(&audio_fd, AudioControlRecord::ok(AudioControlTag::DataReady, 240));
    assert_eq!(reply.tag, AudioControlTag::DataCaptured);
    assert_eq!(reply.frames, 240);
    assert_eq!(reply.error, 0);
    assert_eq!(observed_frames.load(Ordering::SeqCst), 240);
    assert_eq!(observed_value.load(Ordering::SeqCst), 0x1234);
}

/// Scenario 4: a playback callback returning a negative frame count ends
/// the stream and invokes the error callback with a negative code.
#[test]
fn playback_underflow_removes_the_stream_and_invokes_the_error_callback() {
    let dir = tempfile::tempdir().unwrap();
    let server = support::MockServer::bind(dir.path());

    let client = Client::new(ClientConfig::default().with_server_path_override(&server.socket_path)).unwrap();
    client.connect_async().unwrap();
    let mut session = server.accept_and_handshake(1);
    assert!(wait_for(|| client.is_connected(), Duration::from_secs(5)));

    let error_code = Arc::new(AtomicI32::new(0));
    let error_code_clone = error_code.clone();
    let params = paclient::StreamParams {
        buffer_frames: 480,
        callback_threshold: 240,
        sample_format: SampleFormat::S16Le,
        channels: 2,
        rate_hz: 48_000,
        client_type: ClientType::Media,
        flags: 0,
        effects: 0,
        callback: Box::new(|_buf, _frames| -1),
        error_callback: Some(Box::new(move |code| {
            error_code_clone.store(code, Ordering::SeqCst);
        })),
    };

    let (audio_fd, id) = std::thread::scope(|scope| {
        let add_thread = scope.spawn(|| client.add_stream(Direction::Playback, params));

        let (command, mut fds) = session.recv_command();
        let stream_id = match command {
            WireCommand::AddStream(req) => req.stream_id,
            other => panic!("expected AddStream, got {other:?}"),
        };
        let audio_fd = fds.pop().expect("AddStream carries the audio socketpair end");
        let _region = session.reply_stream_connected(stream_id, 64 * 1024);

        let id = add_thread.join().unwrap().unwrap();
        (audio_fd, id)
    });

    std::thread::sleep(Duration::from_millis(50));

    let encoded = AudioControlRecord::ok(AudioControlTag::RequestData, 240).encode();
    nix::unistd::write(std::os::fd::AsRawFd::as_raw_fd(&audio_fd), &encoded).unwrap();

    assert!(wait_for(|| error_code.load(Ordering::SeqCst) < 0, Duration::from_secs(5)));
    assert!(client.remove_stream(id).is_err(), "stream should already be gone after underflow");
}

/// Scenario 5: a volume set before the stream-connect reply arrives is
/// cached and applied to the shared-memory header as soon as it maps.
#[test]
fn volume_set_before_connect_reply_is_applied_once_mapped() {
    let dir = tempfile::tempdir().unwrap();
    let server = support::MockServer::bind(dir.path());

    let client = Client::new(ClientConfig::default().with_server_path_override(&server.socket_path)).unwrap();
    client.connect_async().unwrap();
    let mut session = server.accept_and_handshake(1);
    assert!(wait_for(|| client.is_connected(), Duration::from_secs(5)));

    let calls = Arc::new(AtomicU32::new(0));
    let params = capture_stream_params(calls);

    let region = std::thread::scope(|scope| {
        let add_thread = scope.spawn(|| client.add_stream(Direction::Capture, params));

        let (command, mut fds) = session.recv_command();
        let stream_id = match command {
            WireCommand::AddStream(req) => req.stream_id,
            other => panic!("expected AddStream, got {other:?}"),
        };
        drop(fds.pop());

        // Set the volume while the control worker is still waiting on the
        // stream-connect reply, i.e. before the region exists.
        let id = paclient_core::ids::StreamId::from_raw(stream_id);
        client.set_stream_volume(id, paclient::Volume::new(0.5).unwrap()).unwrap();

        let region = session.reply_stream_connected(stream_id, 64 * 1024);
        add_thread.join().unwrap().unwrap();
        region
    });

    assert!(wait_for(
        || (unsafe { region.region.header() }.volume() - 0.5).abs() < f32::EPSILON,
        Duration::from_secs(5)
    ));
}
