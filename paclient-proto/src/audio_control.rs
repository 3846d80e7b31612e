//! Fixed-size control records exchanged on a stream's audio socketpair.
//!
//! Unlike the control-socket records, these are not length-prefixed: the
//! socket is `SOCK_SEQPACKET`, so a single `recvmsg` yields exactly one
//! record already framed by the kernel.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Wire size of an [`AudioControlRecord`]: tag (1) + frames (4) + error (4).
pub const AUDIO_CONTROL_RECORD_SIZE: usize = 1 + 4 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AudioControlTag {
    /// Server -> client (capture): N frames available. Client -> server
    /// (playback reply): N frames written.
    DataReady = 0,
    /// Server -> client (playback): N frames needed.
    RequestData = 1,
    /// Client -> server (capture reply): N frames consumed.
    DataCaptured = 2,
}

impl AudioControlTag {
    #[must_use]
    pub const fn from_wire(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::DataReady),
            1 => Some(Self::RequestData),
            2 => Some(Self::DataCaptured),
            _ => None,
        }
    }
}

/// A `{tag, frames, error}` record.
///
/// `error` is zero on success; a negative value (stored as its two's
/// complement bit pattern) reports a worker-side failure such as an
/// underflow, mirroring the POSIX negative-errno convention used
/// throughout the command-reply path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioControlRecord {
    pub tag: AudioControlTag,
    pub frames: u32,
    pub error: i32,
}

impl AudioControlRecord {
    #[must_use]
    pub const fn ok(tag: AudioControlTag, frames: u32) -> Self {
        Self { tag, frames, error: 0 }
    }

    #[must_use]
    pub const fn failed(tag: AudioControlTag, error: i32) -> Self {
        Self { tag, frames: 0, error }
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error < 0
    }

    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(AUDIO_CONTROL_RECORD_SIZE);
        out.put_u8(self.tag as u8);
        out.put_u32_le(self.frames);
        out.put_i32_le(self.error);
        out.freeze()
    }

    #[must_use]
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < AUDIO_CONTROL_RECORD_SIZE {
            return None;
        }
        let mut cursor = Bytes::copy_from_slice(buf);
        let tag = AudioControlTag::from_wire(cursor.get_u8())?;
        let frames = cursor.get_u32_le();
        let error = cursor.get_i32_le();
        Some(Self { tag, frames, error })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_and_decodes_a_success_record() {
        let record = AudioControlRecord::ok(AudioControlTag::DataReady, 240);
        let encoded = record.encode();
        assert_eq!(encoded.len(), AUDIO_CONTROL_RECORD_SIZE);
        let decoded = AudioControlRecord::decode(&encoded).unwrap();
        assert_eq!(decoded, record);
        assert!(!decoded.is_error());
    }

    #[test]
    fn encodes_and_decodes_an_error_record() {
        let record = AudioControlRecord::failed(AudioControlTag::DataCaptured, -1);
        let decoded = AudioControlRecord::decode(&record.encode()).unwrap();
        assert!(decoded.is_error());
        assert_eq!(decoded.error, -1);
    }

    #[test]
    fn decode_rejects_short_buffers() {
        assert!(AudioControlRecord::decode(&[0u8; 4]).is_none());
    }
}
