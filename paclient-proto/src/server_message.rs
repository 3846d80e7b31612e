//! Server -> client message records.

use bytes::{Buf, Bytes};

use crate::notify::NotificationEvent;
use crate::record::RecordTag;
use crate::stream_connect::StreamConnectedReply;

/// A parsed server -> client message. Variants that carry auxiliary file
/// descriptors document how many and in what order; the caller reads them
/// off the same `recvmsg` call that produced this payload.
#[derive(Debug, Clone)]
pub enum ServerMessage {
    /// Carries the client id and one aux fd: the server-state shared
    /// memory region.
    Connected { client_id: u32 },
    /// Carries two aux fds, in order: header region, samples region.
    StreamConnected(StreamConnectedReply),
    /// The server-state region's debug-info block was (re)populated; no
    /// payload beyond the tag, the data itself lives in shared memory.
    DebugInfoReady,
    /// Carries one aux fd: a read-only log-buffer descriptor.
    AtlogFdReady,
    /// A bounded-length list of hotword model names, `\0`-joined.
    GetHotwordModelsReady { names_blob: Bytes },
    /// Reply to an async flexible-loopback request.
    RequestFloopReady { request_tag: u32, result_index: u32 },
    /// A pushed notification event.
    Notification(NotificationEvent),
}

#[derive(Debug, thiserror::Error)]
pub enum ServerMessageDecodeError {
    #[error("unrecognized server message tag {0:#x}")]
    UnknownTag(u8),
    #[error("malformed payload for server message tag {0:#x}")]
    MalformedPayload(u8),
}

impl ServerMessage {
    pub fn decode(tag: u8, payload: &Bytes) -> Result<Self, ServerMessageDecodeError> {
        let record_tag =
            RecordTag::from_wire(tag).ok_or(ServerMessageDecodeError::UnknownTag(tag))?;
        let malformed = || ServerMessageDecodeError::MalformedPayload(tag);

        match record_tag {
            RecordTag::Connected => {
                let mut buf = payload.clone();
                if buf.remaining() < 4 {
                    return Err(malformed());
                }
                Ok(Self::Connected {
                    client_id: buf.get_u32_le(),
                })
            }
            RecordTag::StreamConnected => StreamConnectedReply::decode(payload)
                .map(Self::StreamConnected)
                .ok_or_else(malformed),
            RecordTag::DebugInfoReady => Ok(Self::DebugInfoReady),
            RecordTag::AtlogFdReady => Ok(Self::AtlogFdReady),
            RecordTag::GetHotwordModelsReady => Ok(Self::GetHotwordModelsReady {
                names_blob: payload.clone(),
            }),
            RecordTag::RequestFloopReady => {
                let mut buf = payload.clone();
                if buf.remaining() < 8 {
                    return Err(malformed());
                }
                Ok(Self::RequestFloopReady {
                    request_tag: buf.get_u32_le(),
                    result_index: buf.get_u32_le(),
                })
            }
            RecordTag::Notification => NotificationEvent::decode(payload)
                .map(Self::Notification)
                .ok_or_else(malformed),
            _ => Err(ServerMessageDecodeError::UnknownTag(tag)),
        }
    }
}
