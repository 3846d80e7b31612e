//! Stream handle and parameters.

use std::os::fd::OwnedFd;
use std::sync::Arc;

use paclient_core::ids::StreamId;
use paclient_core::shm::MappedRegion;
use paclient_proto::record::{ClientType, Direction, SampleFormat};

use crate::volume::Volume;

/// Worker-side lifecycle state for a stream's audio worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Stop,
    Warmup,
    Running,
}

/// User-supplied parameters for a new stream, mirrored into the
/// stream-connect wire request once the control worker is ready to send
/// it.
pub struct StreamParams {
    pub buffer_frames: u32,
    pub callback_threshold: u32,
    pub sample_format: SampleFormat,
    pub channels: u8,
    pub rate_hz: u32,
    pub client_type: ClientType,
    pub flags: u32,
    pub effects: u32,
    /// Invoked on the audio worker's thread to produce (playback) or
    /// consume (capture) frames. Return value: `>= 0` is the frame count
    /// actually handled; negative signals EOF/fatal error and terminates
    /// the worker.
    pub callback: Box<dyn FnMut(&mut [u8], u32) -> i32 + Send>,
    /// Invoked on the control worker's thread when the stream is torn
    /// down abnormally (server disconnect, worker EOF).
    pub error_callback: Option<Box<dyn FnMut(i32) + Send>>,
}

impl std::fmt::Debug for StreamParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamParams")
            .field("buffer_frames", &self.buffer_frames)
            .field("callback_threshold", &self.callback_threshold)
            .field("sample_format", &self.sample_format)
            .field("channels", &self.channels)
            .field("rate_hz", &self.rate_hz)
            .field("client_type", &self.client_type)
            .field("flags", &self.flags)
            .field("effects", &self.effects)
            .finish_non_exhaustive()
    }
}

/// Handle to a single active or pending stream.
///
/// Owned by the client's stream list after the control worker has sent
/// the stream-connect request and started the audio worker. Destroyed on
/// removal (explicit or via the stream self-reporting EOF/error).
pub struct Stream {
    pub(crate) stream_id: StreamId,
    pub(crate) direction: Direction,
    pub(crate) volume: Volume,
    pub(crate) mapped_region: Option<Arc<MappedRegion>>,
    pub(crate) audio_socket: Option<OwnedFd>,
    pub(crate) worker_state: WorkerState,
}

impl Stream {
    #[must_use]
    pub const fn id(&self) -> StreamId {
        self.stream_id
    }

    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub const fn volume(&self) -> Volume {
        self.volume
    }

    #[must_use]
    pub const fn worker_state(&self) -> WorkerState {
        self.worker_state
    }

    #[must_use]
    pub fn is_mapped(&self) -> bool {
        self.mapped_region.is_some()
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("stream_id", &self.stream_id)
            .field("direction", &self.direction)
            .field("volume", &self.volume)
            .field("is_mapped", &self.is_mapped())
            .field("worker_state", &self.worker_state)
            .finish()
    }
}
