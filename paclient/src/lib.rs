//! Client library for streaming PCM audio to and from a separate
//! audio-server process over a length-prefixed Unix-domain control
//! socket, with audio itself carried over per-stream shared-memory rings
//! and a notification socketpair.
//!
//! The public surface is [`Client`] (a connection) and [`Stream`] (one
//! active capture or playback stream on that connection). Everything
//! else in this crate runs on the control worker's thread and is not
//! meant to be driven directly.

pub mod client;
pub mod command_channel;
pub mod config;
pub mod control_worker;
pub mod dev_tracing;
pub mod error;
pub mod fs_watch;
pub mod observer;
pub mod state;
pub mod stream;
pub(crate) mod audio_worker;
pub mod volume;

pub use client::Client;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use state::ConnectionStatus;
pub use stream::{Stream, StreamParams, WorkerState};
pub use volume::Volume;

pub use paclient_proto::record::{
    ClientType, Direction, NotificationKind, SampleFormat, StreamType,
};
pub use paclient_proto::notify::NotificationEvent;

/// Commonly used items, re-exported for a single `use paclient::prelude::*;`.
pub mod prelude {
    pub use crate::{
        Client, ClientConfig, ClientError, ConnectionStatus, Stream, StreamParams, Volume, WorkerState,
    };
    pub use paclient_proto::notify::NotificationEvent;
    pub use paclient_proto::record::{ClientType, Direction, NotificationKind, SampleFormat, StreamType};
}
