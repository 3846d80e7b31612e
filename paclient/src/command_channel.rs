//! The user -> control-worker command pipe and its reply channel.
//!
//! Every public `Client`/`Stream` method that needs the control worker
//! sends a [`Command`] and blocks on a one-shot reply channel bundled with
//! it; the worker itself only ever blocks on the four descriptor sources
//! it multiplexes (§4.2), never on a call back into user code.

use paclient_core::error::ClientError;
use paclient_core::ids::StreamId;
use paclient_proto::record::NotificationKind;

use crate::observer::ObserverOps;
use crate::stream::StreamParams;
use crate::volume::Volume;

/// Result of a command, delivered on its reply channel.
#[derive(Debug)]
pub enum CommandReply {
    Ack,
    StreamAdded(StreamId),
}

pub type ReplySender = flume::Sender<Result<CommandReply, ClientError>>;
pub type ReplyReceiver = flume::Receiver<Result<CommandReply, ClientError>>;

#[must_use]
pub fn reply_channel() -> (ReplySender, ReplyReceiver) {
    flume::bounded(1)
}

/// A command sent from user threads to the control worker.
pub enum Command {
    Connect { reply: ReplySender },
    ConnectAsync { reply: ReplySender },
    Disconnect { reply: ReplySender },
    AddStream {
        direction: paclient_proto::record::Direction,
        params: StreamParams,
        reply: ReplySender,
    },
    RemoveStream { stream_id: StreamId, reply: ReplySender },
    SetStreamVolume {
        stream_id: StreamId,
        volume: Volume,
        reply: ReplySender,
    },
    SetAecRef {
        stream_id: StreamId,
        ref_stream_id: StreamId,
        reply: ReplySender,
    },
    RegisterNotification {
        kind: NotificationKind,
        callback: Box<dyn FnMut(paclient_proto::notify::NotificationEvent) + Send>,
        reply: ReplySender,
    },
    DeregisterNotification { kind: NotificationKind, reply: ReplySender },
    RegisterConnectionStatusCallback {
        callback: Box<dyn FnMut(crate::state::ConnectionStatus) + Send>,
        reply: ReplySender,
    },
    Shutdown { reply: ReplySender },
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connect { .. } => "Connect",
            Self::ConnectAsync { .. } => "ConnectAsync",
            Self::Disconnect { .. } => "Disconnect",
            Self::AddStream { .. } => "AddStream",
            Self::RemoveStream { .. } => "RemoveStream",
            Self::SetStreamVolume { .. } => "SetStreamVolume",
            Self::SetAecRef { .. } => "SetAecRef",
            Self::RegisterNotification { .. } => "RegisterNotification",
            Self::DeregisterNotification { .. } => "DeregisterNotification",
            Self::RegisterConnectionStatusCallback { .. } => "RegisterConnectionStatusCallback",
            Self::Shutdown { .. } => "Shutdown",
        };
        f.write_str(name)
    }
}

/// Apply the observer-mutating side of a command to the worker's table;
/// pure-data commands (volume, add/remove stream) are handled directly by
/// the control worker against its own state.
pub fn apply_observer_command(ops: &mut ObserverOps, command: &mut Command) {
    match command {
        Command::RegisterNotification { kind, callback, .. } => {
            let taken = std::mem::replace(callback, Box::new(|_| {}));
            ops.register(*kind, taken);
        }
        Command::DeregisterNotification { kind, .. } => {
            ops.unregister(*kind);
        }
        _ => {}
    }
}
