//! Stream-connect request/reply records.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::record::{ClientType, Direction, SampleFormat, StreamType, NO_DEVICE};

/// Maximum channels accepted in a channel map; bounds the fixed-size wire
/// encoding rather than requiring a length-prefixed array.
pub const MAX_CHANNELS: usize = 8;

/// PCM format negotiated for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_format: SampleFormat,
    pub rate_hz: u32,
    pub channels: u8,
    pub channel_map: [u8; MAX_CHANNELS],
}

impl AudioFormat {
    #[must_use]
    pub fn bytes_per_frame(&self) -> usize {
        self.sample_format.bytes_per_sample() * self.channels as usize
    }

    fn encode(&self, out: &mut BytesMut) {
        out.put_u8(self.sample_format as u8);
        out.put_u32_le(self.rate_hz);
        out.put_u8(self.channels);
        out.put_slice(&self.channel_map);
    }

    fn decode(buf: &mut Bytes) -> Option<Self> {
        if buf.remaining() < 1 + 4 + 1 + MAX_CHANNELS {
            return None;
        }
        let sample_format = match buf.get_u8() {
            0 => SampleFormat::S16Le,
            1 => SampleFormat::S32Le,
            2 => SampleFormat::F32Le,
            _ => return None,
        };
        let rate_hz = buf.get_u32_le();
        let channels = buf.get_u8();
        let mut channel_map = [0u8; MAX_CHANNELS];
        buf.copy_to_slice(&mut channel_map);
        Some(Self {
            sample_format,
            rate_hz,
            channels,
            channel_map,
        })
    }
}

/// Everything the server needs to set up a stream, sent with one endpoint
/// of the audio socketpair attached as an auxiliary file descriptor.
#[derive(Debug, Clone)]
pub struct StreamConnectRequest {
    pub direction: Direction,
    pub stream_id: u64,
    pub stream_type: StreamType,
    pub client_type: ClientType,
    pub buffer_frames: u32,
    pub callback_threshold: u32,
    pub flags: u32,
    pub effects: u32,
    pub format: AudioFormat,
    pub target_device: u32,
}

impl StreamConnectRequest {
    #[must_use]
    pub fn unpinned_device() -> u32 {
        NO_DEVICE
    }

    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(64);
        out.put_u8(self.direction as u8);
        out.put_u64_le(self.stream_id);
        out.put_u8(self.stream_type as u8);
        out.put_u8(self.client_type as u8);
        out.put_u32_le(self.buffer_frames);
        out.put_u32_le(self.callback_threshold);
        out.put_u32_le(self.flags);
        out.put_u32_le(self.effects);
        self.format.encode(&mut out);
        out.put_u32_le(self.target_device);
        out.freeze()
    }

    #[must_use]
    pub fn decode(payload: &Bytes) -> Option<Self> {
        let mut buf = payload.clone();
        if buf.remaining() < 1 + 8 + 1 + 1 + 4 + 4 + 4 + 4 {
            return None;
        }
        let direction = Direction::from_wire(buf.get_u8())?;
        let stream_id = buf.get_u64_le();
        let stream_type = match buf.get_u8() {
            0 => StreamType::Normal,
            1 => StreamType::Hotword,
            2 => StreamType::FlexibleLoopback,
            _ => return None,
        };
        let client_type = match buf.get_u8() {
            0 => ClientType::Media,
            1 => ClientType::Communication,
            2 => ClientType::Assistant,
            3 => ClientType::System,
            _ => return None,
        };
        let buffer_frames = buf.get_u32_le();
        let callback_threshold = buf.get_u32_le();
        let flags = buf.get_u32_le();
        let effects = buf.get_u32_le();
        let format = AudioFormat::decode(&mut buf)?;
        if buf.remaining() < 4 {
            return None;
        }
        let target_device = buf.get_u32_le();

        Some(Self {
            direction,
            stream_id,
            stream_type,
            client_type,
            buffer_frames,
            callback_threshold,
            flags,
            effects,
            format,
            target_device,
        })
    }
}

/// Server's reply to a successful stream-connect request. The header and
/// samples shared-memory descriptors arrive as auxiliary `SCM_RIGHTS` data
/// alongside this payload, in that order.
#[derive(Debug, Clone)]
pub struct StreamConnectedReply {
    pub stream_id: u64,
    pub samples_region_len: u64,
}

impl StreamConnectedReply {
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(16);
        out.put_u64_le(self.stream_id);
        out.put_u64_le(self.samples_region_len);
        out.freeze()
    }

    #[must_use]
    pub fn decode(payload: &Bytes) -> Option<Self> {
        let mut buf = payload.clone();
        if buf.remaining() < 16 {
            return None;
        }
        Some(Self {
            stream_id: buf.get_u64_le(),
            samples_region_len: buf.get_u64_le(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_format() -> AudioFormat {
        AudioFormat {
            sample_format: SampleFormat::S16Le,
            rate_hz: 48_000,
            channels: 2,
            channel_map: [0u8; MAX_CHANNELS],
        }
    }

    #[test]
    fn stream_connect_request_round_trips() {
        let req = StreamConnectRequest {
            direction: Direction::Capture,
            stream_id: 0x0000_0007_0000_0003,
            stream_type: StreamType::Normal,
            client_type: ClientType::Media,
            buffer_frames: 480,
            callback_threshold: 240,
            flags: 0,
            effects: 0,
            format: sample_format(),
            target_device: StreamConnectRequest::unpinned_device(),
        };
        let encoded = req.encode();
        let decoded = StreamConnectRequest::decode(&encoded).unwrap();
        assert_eq!(decoded.stream_id, req.stream_id);
        assert_eq!(decoded.direction, req.direction);
        assert_eq!(decoded.format.rate_hz, 48_000);
        assert_eq!(decoded.target_device, NO_DEVICE);
    }

    #[test]
    fn stream_connected_reply_round_trips() {
        let reply = StreamConnectedReply {
            stream_id: 42,
            samples_region_len: 65536,
        };
        let decoded = StreamConnectedReply::decode(&reply.encode()).unwrap();
        assert_eq!(decoded.stream_id, 42);
        assert_eq!(decoded.samples_region_len, 65536);
    }

    #[test]
    fn decode_rejects_truncated_payload() {
        let short = Bytes::from_static(&[0, 1, 2]);
        assert!(StreamConnectRequest::decode(&short).is_none());
    }
}
