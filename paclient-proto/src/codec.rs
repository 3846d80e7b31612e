//! Stateful length-prefixed record codec.
//!
//! Every record on the control socket starts with a 4-byte little-endian
//! length covering the tag byte and payload that follow it. The decoder
//! takes whatever bytes a `read()` produced, however they happen to be
//! chunked, and yields complete records: zero-copy when a record lands
//! entirely within the buffered data, reassembled into a staging buffer
//! when it straddles more than one read.

use bytes::{Buf, Bytes, BytesMut};
use paclient_core::buffer::SegmentedBuffer;
use thiserror::Error;

const LENGTH_PREFIX_SIZE: usize = 4;
const TAG_SIZE: usize = 1;

/// Refuse to reassemble a record past this many bytes; guards against a
/// corrupt or hostile peer forcing unbounded staging-buffer growth.
pub const MAX_RECORD_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("record length {0} exceeds the maximum of {MAX_RECORD_SIZE}")]
    RecordTooLarge(usize),

    #[error("record length {0} is smaller than the tag byte it must contain")]
    RecordTooSmall(usize),
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// A decoded record: tag byte plus its payload.
#[derive(Debug, Clone)]
pub struct WireRecord {
    pub tag: u8,
    pub payload: Bytes,
}

/// Stateful decoder for the control-socket wire format.
///
/// Fast path: the whole record (length prefix + tag + payload) is already
/// present in the segmented buffer -> zero-copy slice out.
/// Slow path: the record straddles more than one read -> reassembled into
/// `staging`.
pub struct WireDecoder {
    pending_len: Option<usize>,
    staging: BytesMut,
}

impl Default for WireDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl WireDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending_len: None,
            staging: BytesMut::new(),
        }
    }

    /// True while reassembling a fragmented record.
    #[must_use]
    pub const fn is_reassembling(&self) -> bool {
        self.pending_len.is_some()
    }

    /// Decode a single record from `src`.
    ///
    /// Returns `Ok(None)` when more data is needed, and advances `src`
    /// past the consumed bytes in either case.
    pub fn decode(&mut self, src: &mut SegmentedBuffer) -> Result<Option<WireRecord>> {
        // `self.staging` accumulates the tag byte plus payload (`total_len`
        // bytes) of a record whose length prefix has already been consumed.
        if let Some(total_len) = self.pending_len {
            let needed = total_len - self.staging.len();
            let take = needed.min(src.len());
            if let Some(bytes) = src.take_bytes(take) {
                self.staging.extend_from_slice(&bytes);
            }

            if self.staging.len() < total_len {
                return Ok(None);
            }

            let mut record = self.staging.split().freeze();
            self.pending_len = None;
            let tag = record.get_u8();
            return Ok(Some(WireRecord { tag, payload: record }));
        }

        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let mut len_bytes = [0u8; LENGTH_PREFIX_SIZE];
        if !src.copy_prefix(LENGTH_PREFIX_SIZE, &mut len_bytes) {
            return Ok(None);
        }
        let total_len = u32::from_le_bytes(len_bytes) as usize;

        if total_len > MAX_RECORD_SIZE {
            return Err(CodecError::RecordTooLarge(total_len));
        }
        if total_len < TAG_SIZE {
            return Err(CodecError::RecordTooSmall(total_len));
        }

        if src.len() < LENGTH_PREFIX_SIZE + total_len {
            // Fragmented: consume the length prefix and whatever of the
            // tag+payload is already here, then wait for the rest.
            src.advance(LENGTH_PREFIX_SIZE);
            self.pending_len = Some(total_len);
            self.staging.clear();
            let available = src.len().min(total_len);
            if let Some(bytes) = src.take_bytes(available) {
                self.staging.extend_from_slice(&bytes);
            }
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        let mut record = src
            .take_bytes(total_len)
            .expect("length check above ensures the record is fully buffered");
        let tag = record.get_u8();
        Ok(Some(WireRecord { tag, payload: record }))
    }
}

/// Encode a record into a freshly allocated buffer.
#[must_use]
pub fn encode_record(tag: u8, payload: &[u8]) -> Bytes {
    let total_len = TAG_SIZE + payload.len();
    let mut out = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + total_len);
    out.extend_from_slice(&(total_len as u32).to_le_bytes());
    out.extend_from_slice(&[tag]);
    out.extend_from_slice(payload);
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_all(buf: &mut SegmentedBuffer, bytes: Bytes) {
        buf.push(bytes);
    }

    #[test]
    fn decodes_a_single_buffered_record() {
        let encoded = encode_record(0x02, b"hello");
        let mut src = SegmentedBuffer::new();
        push_all(&mut src, encoded);

        let mut decoder = WireDecoder::new();
        let record = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(record.tag, 0x02);
        assert_eq!(&record.payload[..], b"hello");
        assert!(src.is_empty());
    }

    #[test]
    fn reassembles_a_record_split_across_reads() {
        let encoded = encode_record(0x03, b"0123456789");
        let (first, second) = encoded.split_at(6);

        let mut decoder = WireDecoder::new();
        let mut src = SegmentedBuffer::new();
        src.push(Bytes::copy_from_slice(first));
        assert!(decoder.decode(&mut src).unwrap().is_none());
        assert!(decoder.is_reassembling());

        src.push(Bytes::copy_from_slice(second));
        let record = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(record.tag, 0x03);
        assert_eq!(&record.payload[..], b"0123456789");
        assert!(!decoder.is_reassembling());
    }

    #[test]
    fn rejects_oversized_record() {
        let mut src = SegmentedBuffer::new();
        let mut len_bytes = BytesMut::new();
        len_bytes.extend_from_slice(&((MAX_RECORD_SIZE as u32) + 1).to_le_bytes());
        src.push(len_bytes.freeze());

        let mut decoder = WireDecoder::new();
        assert!(matches!(decoder.decode(&mut src), Err(CodecError::RecordTooLarge(_))));
    }

    #[test]
    fn decodes_consecutive_records_back_to_back() {
        let mut src = SegmentedBuffer::new();
        src.push(encode_record(0x01, b""));
        src.push(encode_record(0x04, b"vol"));

        let mut decoder = WireDecoder::new();
        let first = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(first.tag, 0x01);
        assert!(first.payload.is_empty());

        let second = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(second.tag, 0x04);
        assert_eq!(&second.payload[..], b"vol");
    }
}
