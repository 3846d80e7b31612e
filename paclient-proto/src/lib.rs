//! Paclient Proto
//!
//! Wire records and the stateful codec for the control protocol spoken
//! between the client and the audio server:
//! - Tag ids and shared enums (`record`)
//! - The length-prefixed control-socket codec (`codec`)
//! - Client -> server commands (`command`)
//! - Server -> client messages (`server_message`)
//! - Stream-connect request/reply (`stream_connect`)
//! - Fixed-size audio-socket control records (`audio_control`)
//! - Notification registration and event records (`notify`)

pub mod audio_control;
pub mod codec;
pub mod command;
pub mod notify;
pub mod record;
pub mod server_message;
pub mod stream_connect;

pub mod prelude {
    pub use crate::audio_control::{AudioControlRecord, AudioControlTag, AUDIO_CONTROL_RECORD_SIZE};
    pub use crate::codec::{encode_record, CodecError, WireDecoder, WireRecord, MAX_RECORD_SIZE};
    pub use crate::command::{Command, CommandDecodeError};
    pub use crate::notify::{NotificationEvent, NotificationRegistration};
    pub use crate::record::{
        ClientType, Direction, NotificationKind, RecordTag, SampleFormat, StreamType, NO_DEVICE,
    };
    pub use crate::server_message::{ServerMessage, ServerMessageDecodeError};
    pub use crate::stream_connect::{AudioFormat, StreamConnectRequest, StreamConnectedReply};
}
