//! Client -> server command records.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::notify::NotificationRegistration;
use crate::record::RecordTag;
use crate::stream_connect::StreamConnectRequest;

/// A parsed or to-be-encoded client -> server command.
#[derive(Debug, Clone)]
pub enum Command {
    /// Tear down the connection cleanly.
    Stop,
    /// Create a stream; carries the audio socketpair endpoint as an aux fd.
    AddStream(StreamConnectRequest),
    RemoveStream { stream_id: u64 },
    SetStreamVolume { stream_id: u64, volume: f32 },
    SetAecRef { stream_id: u64, ref_stream_id: u64 },
    ServerConnect,
    ServerConnectAsync { request_tag: u32 },
    RegisterNotification(NotificationRegistration),
    DeregisterNotification(NotificationRegistration),
}

#[derive(Debug, thiserror::Error)]
pub enum CommandDecodeError {
    #[error("unrecognized command tag {0:#x}")]
    UnknownTag(u8),
    #[error("malformed payload for command tag {0:#x}")]
    MalformedPayload(u8),
}

impl Command {
    #[must_use]
    pub fn tag(&self) -> RecordTag {
        match self {
            Self::Stop => RecordTag::Stop,
            Self::AddStream(_) => RecordTag::AddStream,
            Self::RemoveStream { .. } => RecordTag::RemoveStream,
            Self::SetStreamVolume { .. } => RecordTag::SetStreamVolume,
            Self::SetAecRef { .. } => RecordTag::SetAecRef,
            Self::ServerConnect => RecordTag::ServerConnect,
            Self::ServerConnectAsync { .. } => RecordTag::ServerConnectAsync,
            Self::RegisterNotification(_) => RecordTag::RegisterNotification,
            Self::DeregisterNotification(_) => RecordTag::DeregisterNotification,
        }
    }

    #[must_use]
    pub fn encode_payload(&self) -> Bytes {
        match self {
            Self::Stop | Self::ServerConnect => Bytes::new(),
            Self::AddStream(req) => req.encode(),
            Self::RemoveStream { stream_id } => {
                let mut out = BytesMut::with_capacity(8);
                out.put_u64_le(*stream_id);
                out.freeze()
            }
            Self::SetStreamVolume { stream_id, volume } => {
                let mut out = BytesMut::with_capacity(12);
                out.put_u64_le(*stream_id);
                out.put_u32_le(volume.to_bits());
                out.freeze()
            }
            Self::SetAecRef {
                stream_id,
                ref_stream_id,
            } => {
                let mut out = BytesMut::with_capacity(16);
                out.put_u64_le(*stream_id);
                out.put_u64_le(*ref_stream_id);
                out.freeze()
            }
            Self::ServerConnectAsync { request_tag } => {
                let mut out = BytesMut::with_capacity(4);
                out.put_u32_le(*request_tag);
                out.freeze()
            }
            Self::RegisterNotification(reg) | Self::DeregisterNotification(reg) => reg.encode(),
        }
    }

    pub fn decode(tag: u8, payload: &Bytes) -> Result<Self, CommandDecodeError> {
        let record_tag = RecordTag::from_wire(tag).ok_or(CommandDecodeError::UnknownTag(tag))?;
        let malformed = || CommandDecodeError::MalformedPayload(tag);

        match record_tag {
            RecordTag::Stop => Ok(Self::Stop),
            RecordTag::ServerConnect => Ok(Self::ServerConnect),
            RecordTag::AddStream => {
                StreamConnectRequest::decode(payload).map(Self::AddStream).ok_or_else(malformed)
            }
            RecordTag::RemoveStream => {
                let mut buf = payload.clone();
                if buf.remaining() < 8 {
                    return Err(malformed());
                }
                Ok(Self::RemoveStream {
                    stream_id: buf.get_u64_le(),
                })
            }
            RecordTag::SetStreamVolume => {
                let mut buf = payload.clone();
                if buf.remaining() < 12 {
                    return Err(malformed());
                }
                Ok(Self::SetStreamVolume {
                    stream_id: buf.get_u64_le(),
                    volume: f32::from_bits(buf.get_u32_le()),
                })
            }
            RecordTag::SetAecRef => {
                let mut buf = payload.clone();
                if buf.remaining() < 16 {
                    return Err(malformed());
                }
                Ok(Self::SetAecRef {
                    stream_id: buf.get_u64_le(),
                    ref_stream_id: buf.get_u64_le(),
                })
            }
            RecordTag::ServerConnectAsync => {
                let mut buf = payload.clone();
                if buf.remaining() < 4 {
                    return Err(malformed());
                }
                Ok(Self::ServerConnectAsync {
                    request_tag: buf.get_u32_le(),
                })
            }
            RecordTag::RegisterNotification => NotificationRegistration::decode(payload)
                .map(Self::RegisterNotification)
                .ok_or_else(malformed),
            RecordTag::DeregisterNotification => NotificationRegistration::decode(payload)
                .map(Self::DeregisterNotification)
                .ok_or_else(malformed),
            _ => Err(CommandDecodeError::UnknownTag(tag)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_stream_round_trips() {
        let cmd = Command::RemoveStream { stream_id: 99 };
        let payload = cmd.encode_payload();
        let decoded = Command::decode(cmd.tag() as u8, &payload).unwrap();
        match decoded {
            Command::RemoveStream { stream_id } => assert_eq!(stream_id, 99),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn set_stream_volume_round_trips() {
        let cmd = Command::SetStreamVolume {
            stream_id: 1,
            volume: 0.5,
        };
        let decoded = Command::decode(cmd.tag() as u8, &cmd.encode_payload()).unwrap();
        match decoded {
            Command::SetStreamVolume { stream_id, volume } => {
                assert_eq!(stream_id, 1);
                assert!((volume - 0.5).abs() < f32::EPSILON);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn decode_rejects_unknown_tag() {
        let result = Command::decode(0xEE, &Bytes::new());
        assert!(matches!(result, Err(CommandDecodeError::UnknownTag(0xEE))));
    }

    #[test]
    fn decode_rejects_truncated_payload() {
        let result = Command::decode(RecordTag::RemoveStream as u8, &Bytes::from_static(&[0, 1]));
        assert!(matches!(result, Err(CommandDecodeError::MalformedPayload(_))));
    }
}
