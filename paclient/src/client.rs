//! The public client handle.
//!
//! Owns nothing the control worker doesn't also need a handle to: every
//! mutation flows through the command channel so the worker thread stays
//! the sole mutator of connection state and the stream list (§4.2,
//! enforced structurally rather than by convention).

use std::sync::Arc;
use std::time::{Duration, Instant};

use paclient_core::error::ClientError;
use paclient_core::ids::StreamId;
use paclient_proto::record::{Direction, NotificationKind};

use crate::command_channel::{reply_channel, Command, CommandReply};
use crate::config::ClientConfig;
use crate::control_worker::{ConnectedFlag, ControlWorker};
use crate::state::ConnectionStatus;
use crate::stream::StreamParams;
use crate::volume::Volume;

/// A handle to a connection to the audio server.
///
/// Cloning is not supported -- a single `Client` owns the control
/// worker thread and all streams created through it; share it behind an
/// `Arc` if multiple owners are needed.
pub struct Client {
    command_tx: flume::Sender<Command>,
    worker_wake_fd: std::os::fd::RawFd,
    worker: Option<std::thread::JoinHandle<()>>,
    connected_flag: Arc<ConnectedFlag>,
    connect_timeout: Option<Duration>,
}

impl Client {
    /// Create a client and spawn its control worker. The connection is
    /// not established until [`Client::connect`] or
    /// [`Client::connect_async`] is called.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let connect_timeout = config.connect_timeout();
        let (command_tx, command_rx) = flume::bounded(config.command_channel_capacity);
        let connected_flag = Arc::new(ConnectedFlag::default());

        let worker = ControlWorker::new(config, command_rx, connected_flag.clone())?;
        let worker_wake_fd = worker.command_wake_fd();

        let handle = std::thread::Builder::new()
            .name("paclient-control".into())
            .spawn(move || worker.run())
            .map_err(|err| ClientError::WorkerSpawn(err.to_string()))?;

        Ok(Self {
            command_tx,
            worker_wake_fd,
            worker: Some(handle),
            connected_flag,
            connect_timeout,
        })
    }

    /// True iff the connection state machine currently reports `CONNECTED`.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected_flag.is_connected()
    }

    /// Request a connection and block until `CONNECTED` or the configured
    /// `connect_timeout` elapses (indefinitely if unset).
    pub fn connect(&self) -> Result<(), ClientError> {
        self.send(|reply| Command::Connect { reply })?;

        let deadline = self.connect_timeout.map(|timeout| Instant::now() + timeout);
        loop {
            if self.connected_flag.is_connected() {
                return Ok(());
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(ClientError::TimedOut);
                }
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Request a connection without waiting for it to complete.
    pub fn connect_async(&self) -> Result<(), ClientError> {
        self.send(|reply| Command::ConnectAsync { reply }).map(drop)
    }

    /// Tear down the connection and every active stream, returning to
    /// `DISCONNECTED`. The client can be reconnected afterwards.
    pub fn disconnect(&self) -> Result<(), ClientError> {
        self.send(|reply| Command::Disconnect { reply }).map(drop)
    }

    /// Create a new stream. Returns once the control worker has started
    /// the audio worker in `WARMUP` and appended the stream to its list
    /// (the stream id is assigned before this call returns, never before
    /// the worker exists, matching the ordering invariant in §8).
    pub fn add_stream(&self, direction: Direction, params: StreamParams) -> Result<StreamId, ClientError> {
        match self.send(|reply| Command::AddStream { direction, params, reply })? {
            CommandReply::StreamAdded(id) => Ok(id),
            CommandReply::Ack => unreachable!("add-stream always replies StreamAdded on success"),
        }
    }

    pub fn remove_stream(&self, stream_id: StreamId) -> Result<(), ClientError> {
        self.send(|reply| Command::RemoveStream { stream_id, reply }).map(drop)
    }

    pub fn set_stream_volume(&self, stream_id: StreamId, volume: Volume) -> Result<(), ClientError> {
        self.send(|reply| Command::SetStreamVolume { stream_id, volume, reply }).map(drop)
    }

    pub fn set_aec_ref(&self, stream_id: StreamId, ref_stream_id: StreamId) -> Result<(), ClientError> {
        self.send(|reply| Command::SetAecRef { stream_id, ref_stream_id, reply }).map(drop)
    }

    /// Subscribe to a notification kind. The callback runs on the control
    /// worker's thread -- keep it fast and non-blocking.
    pub fn register_notification(
        &self,
        kind: NotificationKind,
        callback: impl FnMut(paclient_proto::notify::NotificationEvent) + Send + 'static,
    ) -> Result<(), ClientError> {
        self.send(|reply| Command::RegisterNotification {
            kind,
            callback: Box::new(callback),
            reply,
        })
        .map(drop)
    }

    pub fn deregister_notification(&self, kind: NotificationKind) -> Result<(), ClientError> {
        self.send(|reply| Command::DeregisterNotification { kind, reply }).map(drop)
    }

    /// Register a callback for the coarse `{Failed, Disconnected, Connected}`
    /// connection-status lattice. Fires once immediately with the current
    /// status, then again on every status change. Runs on the control
    /// worker's thread -- keep it fast and non-blocking, same contract as
    /// [`Client::register_notification`]. Only one callback is kept; a
    /// second registration replaces the first.
    pub fn register_connection_status_callback(
        &self,
        callback: impl FnMut(ConnectionStatus) + Send + 'static,
    ) -> Result<(), ClientError> {
        self.send(|reply| Command::RegisterConnectionStatusCallback {
            callback: Box::new(callback),
            reply,
        })
        .map(drop)
    }

    fn send(&self, build: impl FnOnce(flume::Sender<Result<CommandReply, ClientError>>) -> Command) -> Result<CommandReply, ClientError> {
        let (reply_tx, reply_rx) = reply_channel();
        let command = build(reply_tx);
        self.command_tx.send(command).map_err(|_| ClientError::ChannelClosed)?;
        wake(self.worker_wake_fd);
        reply_rx.recv().map_err(|_| ClientError::ChannelClosed)?
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        let (reply_tx, reply_rx) = reply_channel();
        if self.command_tx.send(Command::Shutdown { reply: reply_tx }).is_ok() {
            wake(self.worker_wake_fd);
            let _ = reply_rx.recv();
        }
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

fn wake(fd: std::os::fd::RawFd) {
    let _ = nix::unistd::write(fd, &[1]);
}
