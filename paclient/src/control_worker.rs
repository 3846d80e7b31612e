//! The control worker: sole mutator of the stream list and connection
//! state, multiplexing four descriptor sources (§4.2).
//!
//! Runs on its own thread for the life of the `Client`. Never blocks on
//! user code -- callbacks installed via `RegisterNotification` or a
//! stream's error callback run synchronously on this thread, so they must
//! be quick, matching the contract the teacher's `monitor.rs` places on
//! its own dispatch loop.

use std::collections::HashMap;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, error, warn};

use paclient_core::endpoint::{resolve_socket_path, watch_directory, ConnectionType, EndpointError};
use paclient_core::error::ClientError;
use paclient_core::fds::{audio_socketpair, recv_with_fds, send_with_fds};
use paclient_core::ids::{ClientId, StreamId, StreamIdAllocator};
use paclient_core::reconnect::ErrorDelay;
use paclient_core::shm::MappedRegion;
use paclient_proto::codec::{encode_record, WireDecoder};
use paclient_proto::command::Command as WireCommand;
use paclient_proto::notify::NotificationRegistration;
use paclient_proto::record::RecordTag;
use paclient_proto::server_message::ServerMessage;
use paclient_proto::stream_connect::StreamConnectRequest;

use crate::audio_worker::{self, StreamWorkerExit, WorkerControl};
use crate::command_channel::{apply_observer_command, Command, CommandReply, ReplySender};
use crate::config::ClientConfig;
use crate::fs_watch::{SocketFileEvent, SocketFileWatch};
use crate::observer::ObserverOps;
use crate::state::{self, Action, ConnectionEvent, ConnectionState};
use crate::stream::{Stream, WorkerState};

const FS_WATCH_TOKEN: Token = Token(0);
const SERVER_TOKEN: Token = Token(1);
const COMMAND_TOKEN: Token = Token(2);
const STREAM_EVENT_TOKEN: Token = Token(3);

/// Shared flag flipped to 1 exactly while `ConnectionState::Connected`,
/// read by [`crate::client::Client::is_connected`] without going through
/// the command channel.
#[derive(Default)]
pub struct ConnectedFlag(AtomicBool);

impl ConnectedFlag {
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn set(&self, value: bool) {
        self.0.store(value, Ordering::Release);
    }
}

struct ActiveStream {
    stream: Stream,
    control: Arc<WorkerControl>,
    region_slot: Arc<parking_lot::Mutex<Option<Arc<MappedRegion>>>>,
    wake_writer: OwnedFd,
    worker: Option<std::thread::JoinHandle<()>>,
    params_snapshot: crate::stream::StreamParams,
}

pub struct ControlWorker {
    config: ClientConfig,
    socket_path: PathBuf,
    state: ConnectionState,
    error_delay: ErrorDelay,
    error_timer_deadline: Option<Instant>,

    fs_watch: Option<SocketFileWatch>,
    server_stream: Option<UnixStream>,
    decoder: WireDecoder,
    read_buf: [u8; 64 * 1024],

    client_id: Option<ClientId>,
    stream_ids: Option<StreamIdAllocator>,
    streams: HashMap<StreamId, ActiveStream>,
    observers: ObserverOps,
    server_state_region: Option<Arc<MappedRegion>>,

    command_rx: flume::Receiver<Command>,
    stream_event_rx: flume::Receiver<StreamWorkerExit>,
    stream_event_tx: flume::Sender<StreamWorkerExit>,
    wake_command_r: OwnedFd,
    wake_command_w: OwnedFd,
    wake_stream_event_r: OwnedFd,
    wake_stream_event_w: OwnedFd,

    connected_flag: Arc<ConnectedFlag>,
    connection_status_callback: Option<Box<dyn FnMut(state::ConnectionStatus) + Send>>,
    last_connection_status: Option<state::ConnectionStatus>,
    shutdown: bool,
}

impl ControlWorker {
    pub fn new(
        config: ClientConfig,
        command_rx: flume::Receiver<Command>,
        connected_flag: Arc<ConnectedFlag>,
    ) -> Result<Self, ClientError> {
        let socket_path = match &config.server_path_override {
            Some(path) => path.clone(),
            None => resolve_socket_path(config.connection_type())
                .map_err(|EndpointError::NoRuntimeDir| {
                    ClientError::WorkerSpawn("could not resolve server socket path".into())
                })?,
        };

        let (wake_command_r, wake_command_w) = pipe()?;
        let (wake_stream_event_r, wake_stream_event_w) = pipe()?;
        let (stream_event_tx, stream_event_rx) = flume::unbounded();

        Ok(Self {
            error_delay: ErrorDelay::new(config.error_delay()),
            config,
            socket_path,
            state: ConnectionState::Disconnected,
            error_timer_deadline: None,
            fs_watch: None,
            server_stream: None,
            decoder: WireDecoder::new(),
            read_buf: [0u8; 64 * 1024],
            client_id: None,
            stream_ids: None,
            streams: HashMap::new(),
            observers: ObserverOps::new(),
            server_state_region: None,
            command_rx,
            stream_event_rx,
            stream_event_tx,
            wake_command_r,
            wake_command_w,
            wake_stream_event_r,
            wake_stream_event_w,
            connected_flag,
            connection_status_callback: None,
            last_connection_status: None,
            shutdown: false,
        })
    }

    /// Expose the write end of the command wake pipe so the client handle
    /// can poke the worker after pushing onto `command_rx`'s backing flume
    /// channel (flume itself wakes blocking recv; this wake pipe backs the
    /// mio-multiplexed variant used here instead of a blocking thread).
    #[must_use]
    pub fn command_wake_fd(&self) -> RawFd {
        self.wake_command_w.as_raw_fd()
    }

    pub fn run(mut self) {
        let mut poll = match Poll::new() {
            Ok(poll) => poll,
            Err(err) => {
                error!(%err, "control worker failed to create poll instance");
                return;
            }
        };
        let mut events = Events::with_capacity(8);

        let command_raw = self.wake_command_r.as_raw_fd();
        let stream_event_raw = self.wake_stream_event_r.as_raw_fd();
        if poll
            .registry()
            .register(&mut SourceFd(&command_raw), COMMAND_TOKEN, Interest::READABLE)
            .is_err()
            || poll
                .registry()
                .register(&mut SourceFd(&stream_event_raw), STREAM_EVENT_TOKEN, Interest::READABLE)
                .is_err()
        {
            error!("control worker failed to register wake descriptors");
            return;
        }

        loop {
            if self.shutdown {
                self.teardown_all_streams();
                return;
            }

            let timeout = self.poll_timeout();
            if poll.poll(&mut events, timeout).is_err() {
                continue;
            }

            if events.is_empty() {
                self.on_timer_tick(&mut poll);
                continue;
            }

            // Process at most one ready descriptor per wakeup (§4.2).
            if let Some(event) = events.iter().next() {
                match event.token() {
                    FS_WATCH_TOKEN => self.on_fs_watch_readable(&mut poll),
                    SERVER_TOKEN => self.on_server_readable(&mut poll),
                    COMMAND_TOKEN => {
                        drain_wake_pipe(&self.wake_command_r);
                        self.on_command_readable(&mut poll);
                    }
                    STREAM_EVENT_TOKEN => {
                        drain_wake_pipe(&self.wake_stream_event_r);
                        self.on_stream_event_readable();
                    }
                    _ => {}
                }
            }
        }
    }

    fn poll_timeout(&self) -> Option<Duration> {
        self.error_timer_deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    fn on_timer_tick(&mut self, poll: &mut Poll) {
        if let Some(deadline) = self.error_timer_deadline {
            if Instant::now() >= deadline {
                self.error_timer_deadline = None;
                self.apply_action(Action::CloseErrorTimer, poll);
                self.dispatch(ConnectionEvent::TimerExpired, poll);
            }
        }
    }

    fn dispatch(&mut self, event: ConnectionEvent, poll: &mut Poll) {
        let action = state::apply(&mut self.state, event);
        self.connected_flag.set(self.state == ConnectionState::Connected);
        self.notify_connection_status();
        self.apply_action(action, poll);
    }

    /// Invoke the connection-status callback if the coarse
    /// `{Failed, Disconnected, Connected}` status changed since the last
    /// transition.
    fn notify_connection_status(&mut self) {
        let status = state::ConnectionStatus::from_state(self.state);
        if self.last_connection_status == Some(status) {
            return;
        }
        self.last_connection_status = Some(status);
        if let Some(callback) = &mut self.connection_status_callback {
            callback(status);
        }
    }

    fn apply_action(&mut self, action: Action, poll: &mut Poll) {
        match action {
            Action::InstallFsWatch => self.install_fs_watch(poll),
            Action::OpenSocketAndConnect => self.open_socket_and_connect(poll),
            Action::MakeSocketBlocking => self.make_socket_blocking(),
            Action::CloseSocket => self.close_server_socket(poll),
            Action::MapServerState => {}
            Action::ReRegisterNotifications => self.reregister_notifications(),
            Action::SignalConnectedEvent => {
                self.error_delay.reset();
                self.connected_flag.set(true);
            }
            Action::TearDownStreams => {
                self.teardown_all_streams();
                self.close_server_socket(poll);
            }
            Action::UnmapServerState => self.server_state_region = None,
            Action::DrainConnectedEvent => self.connected_flag.set(false),
            Action::ArmErrorTimer => {
                self.error_timer_deadline = Some(Instant::now() + self.error_delay.arm());
            }
            Action::CloseErrorTimer => {}
            Action::None => {}
        }
    }

    fn install_fs_watch(&mut self, poll: &mut Poll) {
        let dir = watch_directory(&self.socket_path).to_path_buf();
        let name = self
            .socket_path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new(""));
        match SocketFileWatch::new(&dir, name) {
            Ok(watch) => {
                let raw = watch.raw_fd();
                if poll
                    .registry()
                    .register(&mut SourceFd(&raw), FS_WATCH_TOKEN, Interest::READABLE)
                    .is_ok()
                {
                    self.fs_watch = Some(watch);
                    if self.socket_path.exists() {
                        self.dispatch(ConnectionEvent::SocketFileCreated, poll);
                    }
                } else {
                    self.dispatch(ConnectionEvent::SetupError, poll);
                }
            }
            Err(err) => {
                warn!(%err, "failed to install filesystem watch");
                self.dispatch(ConnectionEvent::SetupError, poll);
            }
        }
    }

    fn on_fs_watch_readable(&mut self, poll: &mut Poll) {
        let Some(watch) = &self.fs_watch else { return };
        let events = match watch.read_events() {
            Ok(events) => events,
            Err(err) => {
                warn!(%err, "fs watch read failed");
                return;
            }
        };
        for event in events {
            match event {
                SocketFileEvent::Created => self.dispatch(ConnectionEvent::SocketFileCreated, poll),
                SocketFileEvent::Deleted => self.dispatch(ConnectionEvent::SocketFileDeleted, poll),
                SocketFileEvent::Unrelated => {}
            }
        }
    }

    fn open_socket_and_connect(&mut self, poll: &mut Poll) {
        match UnixStream::connect(&self.socket_path) {
            Ok(stream) => {
                let raw = stream.as_raw_fd();
                if poll
                    .registry()
                    .register(&mut SourceFd(&raw), SERVER_TOKEN, Interest::READABLE)
                    .is_ok()
                {
                    self.server_stream = Some(stream);
                    self.dispatch(ConnectionEvent::ConnectWritable, poll);
                } else {
                    self.dispatch(ConnectionEvent::SetupError, poll);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::ConnectionRefused => {
                self.dispatch(ConnectionEvent::ConnectRefused, poll);
            }
            Err(err) => {
                warn!(%err, "failed to connect to server socket");
                self.dispatch(ConnectionEvent::SetupError, poll);
            }
        }
    }

    fn make_socket_blocking(&mut self) {
        if let Some(stream) = &self.server_stream {
            let _ = stream.set_nonblocking(false);
        }
    }

    fn close_server_socket(&mut self, poll: &mut Poll) {
        if let Some(stream) = self.server_stream.take() {
            let raw = stream.as_raw_fd();
            let _ = poll.registry().deregister(&mut SourceFd(&raw));
        }
        self.decoder = WireDecoder::new();
    }

    fn on_server_readable(&mut self, poll: &mut Poll) {
        let Some(stream) = &self.server_stream else { return };
        let (n, fds) = match recv_with_fds(&*stream, &mut self.read_buf) {
            Ok(pair) => pair,
            Err(_) => {
                self.dispatch(ConnectionEvent::ReadError, poll);
                return;
            }
        };
        if n == 0 {
            self.dispatch(ConnectionEvent::Hangup, poll);
            return;
        }

        let mut src = paclient_core::buffer::SegmentedBuffer::new();
        src.push(bytes::Bytes::copy_from_slice(&self.read_buf[..n]));

        let mut aux_fds = fds.into_iter();
        loop {
            match self.decoder.decode(&mut src) {
                Ok(Some(record)) => self.handle_server_record(record, &mut aux_fds, poll),
                Ok(None) => break,
                Err(err) => {
                    warn!(%err, "malformed record from server");
                    break;
                }
            }
        }
    }

    fn handle_server_record(
        &mut self,
        record: paclient_proto::codec::WireRecord,
        aux_fds: &mut impl Iterator<Item = OwnedFd>,
        poll: &mut Poll,
    ) {
        let message = match ServerMessage::decode(record.tag, &record.payload) {
            Ok(message) => message,
            Err(err) => {
                warn!(%err, "protocol violation decoding server message");
                return;
            }
        };

        match message {
            ServerMessage::Connected { client_id } => {
                self.client_id = Some(ClientId(client_id));
                self.stream_ids = Some(StreamIdAllocator::new(ClientId(client_id)));
                if let Some(state_fd) = aux_fds.next() {
                    match MappedRegion::map(state_fd.as_raw_fd(), RINGHEADER_STATE_LEN, false) {
                        Ok(region) => {
                            self.server_state_region = Some(Arc::new(region));
                            drop(state_fd);
                        }
                        Err(err) => warn!(%err, "failed to map server-state region"),
                    }
                }
                self.apply_action(Action::ReRegisterNotifications, poll);
                self.dispatch(ConnectionEvent::FirstServerMessage { client_id }, poll);
            }
            ServerMessage::StreamConnected(reply) => {
                self.finish_stream_connect(reply, aux_fds);
            }
            ServerMessage::Notification(event) => {
                self.observers.dispatch(event);
            }
            ServerMessage::DebugInfoReady | ServerMessage::AtlogFdReady => {
                // No per-client state beyond the shared server-state region;
                // debug consumers re-read it under the odd/even counter.
            }
            ServerMessage::GetHotwordModelsReady { .. } | ServerMessage::RequestFloopReady { .. } => {
                debug!("received an async reply with no pending command to satisfy (dropped)");
            }
        }
    }

    fn finish_stream_connect(
        &mut self,
        reply: paclient_proto::stream_connect::StreamConnectedReply,
        aux_fds: &mut impl Iterator<Item = OwnedFd>,
    ) {
        let stream_id = StreamId::from_raw(reply.stream_id);
        let Some(active) = self.streams.get_mut(&stream_id) else {
            warn!(%stream_id, "stream-connected reply for unknown stream");
            return;
        };

        let (Some(header_fd), Some(samples_fd)) = (aux_fds.next(), aux_fds.next()) else {
            warn!(%stream_id, "stream-connected reply missing expected aux fds");
            return;
        };

        if reply.samples_region_len == 0 {
            warn!(%stream_id, "server proposed a zero-length samples region, rejecting");
            return;
        }

        let total_len = paclient_core::shm::RingHeader::SIZE + reply.samples_region_len as usize;
        // Always writable: even a capture stream, whose samples the server
        // alone produces, still advances its own read_index and can have
        // its volume written into the header.
        match MappedRegion::map(header_fd.as_raw_fd(), total_len, true) {
            Ok(region) => {
                let region = Arc::new(region);
                drop(header_fd);
                drop(samples_fd);
                unsafe { region.header() }.set_volume(active.stream.volume.get());
                *active.region_slot.lock() = Some(region.clone());
                active.stream.mapped_region = Some(region.clone());
                active.stream.worker_state = WorkerState::Running;
                active.control.mark_mapped();
                let _ = nix::unistd::write(active.wake_writer.as_raw_fd(), &[1]);
            }
            Err(err) => warn!(%stream_id, %err, "failed to map stream shared memory"),
        }
    }

    fn reregister_notifications(&mut self) {
        let Some(stream) = &self.server_stream else { return };
        for kind in self.observers.registered_kinds().collect::<Vec<_>>() {
            let registration = NotificationRegistration { kind };
            let wire = WireCommand::RegisterNotification(registration);
            let payload = wire.encode_payload();
            let encoded = encode_record(RecordTag::RegisterNotification as u8, &payload);
            if send_with_fds(stream, &encoded, &[]).is_err() {
                warn!(?kind, "best-effort notification re-registration failed");
            }
        }
    }

    fn on_command_readable(&mut self, poll: &mut Poll) {
        while let Ok(command) = self.command_rx.try_recv() {
            self.handle_command(command, poll);
        }
    }

    fn handle_command(&mut self, mut command: Command, poll: &mut Poll) {
        apply_observer_command(&mut self.observers, &mut command);
        let sender = reply_sender(&command).clone();

        let reply = match command {
            Command::Connect { .. } | Command::ConnectAsync { .. } => {
                if self.state == ConnectionState::Disconnected {
                    self.dispatch(ConnectionEvent::RequestConnect, poll);
                }
                Ok(CommandReply::Ack)
            }
            Command::Disconnect { .. } => {
                self.teardown_all_streams();
                if let Some(stream) = self.server_stream.take() {
                    let raw = stream.as_raw_fd();
                    let _ = poll.registry().deregister(&mut SourceFd(&raw));
                }
                self.state = ConnectionState::Disconnected;
                self.connected_flag.set(false);
                Ok(CommandReply::Ack)
            }
            Command::AddStream { direction, params, .. } => self.add_stream(direction, params),
            Command::RemoveStream { stream_id, .. } => self.remove_stream(stream_id),
            Command::SetStreamVolume { stream_id, volume, .. } => self.set_stream_volume(stream_id, volume),
            Command::SetAecRef { stream_id, ref_stream_id, .. } => self.set_aec_ref(stream_id, ref_stream_id),
            Command::RegisterNotification { kind, .. } => self.send_notification_toggle(kind, true),
            Command::DeregisterNotification { kind, .. } => self.send_notification_toggle(kind, false),
            Command::RegisterConnectionStatusCallback { mut callback, .. } => {
                let current = state::ConnectionStatus::from_state(self.state);
                callback(current);
                self.last_connection_status = Some(current);
                self.connection_status_callback = Some(callback);
                Ok(CommandReply::Ack)
            }
            Command::Shutdown { .. } => {
                self.shutdown = true;
                Ok(CommandReply::Ack)
            }
        };

        let _ = sender.send(reply);
    }

    fn send_notification_toggle(
        &mut self,
        kind: paclient_proto::record::NotificationKind,
        register: bool,
    ) -> Result<CommandReply, ClientError> {
        if let Some(stream) = &self.server_stream {
            let tag = if register {
                RecordTag::RegisterNotification
            } else {
                RecordTag::DeregisterNotification
            };
            let registration = NotificationRegistration { kind };
            let payload = registration.encode();
            let encoded = encode_record(tag as u8, &payload);
            let _ = send_with_fds(stream, &encoded, &[]);
        }
        Ok(CommandReply::Ack)
    }

    fn add_stream(
        &mut self,
        direction: paclient_proto::record::Direction,
        mut params: crate::stream::StreamParams,
    ) -> Result<CommandReply, ClientError> {
        let Some(allocator) = &mut self.stream_ids else {
            return Err(ClientError::NotConnected);
        };
        let stream_id = allocator.allocate(&|id| self.streams.contains_key(&id));

        let (client_end, server_end) = audio_socketpair()?;
        let (wake_r, wake_w) = pipe()?;
        let control = Arc::new(WorkerControl::default());

        let format = paclient_proto::stream_connect::AudioFormat {
            sample_format: params.sample_format,
            rate_hz: params.rate_hz,
            channels: params.channels,
            channel_map: [0u8; paclient_proto::stream_connect::MAX_CHANNELS],
        };
        let request = StreamConnectRequest {
            direction,
            stream_id: stream_id.raw(),
            stream_type: paclient_proto::record::StreamType::Normal,
            client_type: params.client_type,
            buffer_frames: params.buffer_frames,
            callback_threshold: params.callback_threshold,
            flags: params.flags,
            effects: params.effects,
            format,
            target_device: paclient_proto::record::NO_DEVICE,
        };

        if let Some(stream) = &self.server_stream {
            let wire = WireCommand::AddStream(request);
            let payload = wire.encode_payload();
            let encoded = encode_record(RecordTag::AddStream as u8, &payload);
            send_with_fds(stream, &encoded, &[server_end.as_raw_fd()])?;
        }
        drop(server_end);

        let region_slot: Arc<parking_lot::Mutex<Option<Arc<MappedRegion>>>> =
            Arc::new(parking_lot::Mutex::new(None));

        let callback = std::mem::replace(&mut params.callback, Box::new(|_, _| 0));
        let error_callback = params.error_callback.take();
        let worker_params = crate::stream::StreamParams {
            buffer_frames: params.buffer_frames,
            callback_threshold: params.callback_threshold,
            sample_format: params.sample_format,
            channels: params.channels,
            rate_hz: params.rate_hz,
            client_type: params.client_type,
            flags: params.flags,
            effects: params.effects,
            callback,
            error_callback: None,
        };

        let worker_handle = audio_worker::spawn(
            stream_id,
            direction,
            worker_params,
            client_end,
            dup_fd(&wake_r)?,
            control.clone(),
            region_slot.clone(),
            self.stream_event_tx.clone(),
            dup_fd(&self.wake_stream_event_w)?,
        );

        let stream = Stream {
            stream_id,
            direction,
            volume: crate::volume::Volume::SILENT,
            mapped_region: None,
            audio_socket: None,
            worker_state: WorkerState::Warmup,
        };

        self.streams.insert(
            stream_id,
            ActiveStream {
                stream,
                control,
                region_slot,
                wake_writer: wake_w,
                worker: Some(worker_handle),
                params_snapshot: crate::stream::StreamParams {
                    buffer_frames: params.buffer_frames,
                    callback_threshold: params.callback_threshold,
                    sample_format: params.sample_format,
                    channels: params.channels,
                    rate_hz: params.rate_hz,
                    client_type: params.client_type,
                    flags: params.flags,
                    effects: params.effects,
                    callback: Box::new(|_, _| 0),
                    error_callback,
                },
            },
        );
        drop(wake_r);

        Ok(CommandReply::StreamAdded(stream_id))
    }

    fn remove_stream(&mut self, stream_id: StreamId) -> Result<CommandReply, ClientError> {
        self.remove_stream_for(stream_id, RemovalReason::UserRequested)
    }

    /// Tear down one stream, either because the user asked for it
    /// (`UserRequested`, no error callback) or because the connection
    /// dropped out from under it (`Disconnected`, invokes the per-stream
    /// error callback with a "not connected" code per the transport's
    /// disconnect propagation policy).
    fn remove_stream_for(&mut self, stream_id: StreamId, reason: RemovalReason) -> Result<CommandReply, ClientError> {
        let Some(mut active) = self.streams.remove(&stream_id) else {
            return Err(ClientError::NoSuchStream(stream_id.raw()));
        };

        if let Some(stream) = &self.server_stream {
            let wire = WireCommand::RemoveStream { stream_id: stream_id.raw() };
            let payload = wire.encode_payload();
            let encoded = encode_record(RecordTag::RemoveStream as u8, &payload);
            let _ = send_with_fds(stream, &encoded, &[]);
        }

        active.control.request_stop();
        let _ = nix::unistd::write(active.wake_writer.as_raw_fd(), &[1]);
        if let Some(handle) = active.worker.take() {
            let _ = handle.join();
        }

        if reason == RemovalReason::Disconnected {
            if let Some(callback) = &mut active.params_snapshot.error_callback {
                callback(ERR_NOT_CONNECTED);
            }
        }

        Ok(CommandReply::Ack)
    }

    fn set_stream_volume(&mut self, stream_id: StreamId, volume: crate::volume::Volume) -> Result<CommandReply, ClientError> {
        let Some(active) = self.streams.get_mut(&stream_id) else {
            return Err(ClientError::NoSuchStream(stream_id.raw()));
        };
        active.stream.volume = volume;
        if let Some(region) = &active.stream.mapped_region {
            unsafe { region.header() }.set_volume(volume.get());
        }

        if let Some(stream) = &self.server_stream {
            let wire = WireCommand::SetStreamVolume {
                stream_id: stream_id.raw(),
                volume: volume.get(),
            };
            let payload = wire.encode_payload();
            let encoded = encode_record(RecordTag::SetStreamVolume as u8, &payload);
            let _ = send_with_fds(stream, &encoded, &[]);
        }
        Ok(CommandReply::Ack)
    }

    fn set_aec_ref(&mut self, stream_id: StreamId, ref_stream_id: StreamId) -> Result<CommandReply, ClientError> {
        if !self.streams.contains_key(&stream_id) {
            return Err(ClientError::NoSuchStream(stream_id.raw()));
        }
        if let Some(stream) = &self.server_stream {
            let wire = WireCommand::SetAecRef {
                stream_id: stream_id.raw(),
                ref_stream_id: ref_stream_id.raw(),
            };
            let payload = wire.encode_payload();
            let encoded = encode_record(RecordTag::SetAecRef as u8, &payload);
            let _ = send_with_fds(stream, &encoded, &[]);
        }
        Ok(CommandReply::Ack)
    }

    fn on_stream_event_readable(&mut self) {
        while let Ok(exit) = self.stream_event_rx.try_recv() {
            if let Some(mut active) = self.streams.remove(&exit.stream_id) {
                if let Some(handle) = active.worker.take() {
                    let _ = handle.join();
                }
                if let Some(callback) = &mut active.params_snapshot.error_callback {
                    callback(exit.error);
                }
            }
        }
    }

    fn teardown_all_streams(&mut self) {
        let ids: Vec<_> = self.streams.keys().copied().collect();
        for id in ids {
            let _ = self.remove_stream_for(id, RemovalReason::Disconnected);
        }
        self.server_state_region = None;
    }
}

/// Why a stream is being removed, controlling whether its error callback
/// fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemovalReason {
    UserRequested,
    Disconnected,
}

const RINGHEADER_STATE_LEN: usize = 64 * 1024;
/// Negative error code handed to a stream's error callback when it is torn
/// down because the connection dropped, mirroring `-ENOTCONN`.
const ERR_NOT_CONNECTED: i32 = -(libc::ENOTCONN as i32);

fn drain_wake_pipe(fd: &OwnedFd) {
    let mut buf = [0u8; 64];
    loop {
        match nix::unistd::read(fd.as_raw_fd(), &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) if n < buf.len() => break,
            Ok(_) => continue,
        }
    }
}

fn reply_sender(command: &Command) -> &ReplySender {
    match command {
        Command::Connect { reply } | Command::ConnectAsync { reply } | Command::Disconnect { reply } => reply,
        Command::AddStream { reply, .. } => reply,
        Command::RemoveStream { reply, .. } => reply,
        Command::SetStreamVolume { reply, .. } => reply,
        Command::SetAecRef { reply, .. } => reply,
        Command::RegisterNotification { reply, .. } => reply,
        Command::DeregisterNotification { reply, .. } => reply,
        Command::RegisterConnectionStatusCallback { reply, .. } => reply,
        Command::Shutdown { reply } => reply,
    }
}

fn pipe() -> Result<(OwnedFd, OwnedFd), ClientError> {
    nix::unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC | nix::fcntl::OFlag::O_NONBLOCK)
        .map(|(r, w)| (r, w))
        .map_err(|errno| ClientError::Io(std::io::Error::from_raw_os_error(errno as i32)))
}

fn dup_fd(fd: &OwnedFd) -> Result<OwnedFd, ClientError> {
    fd.try_clone().map_err(ClientError::Io)
}
