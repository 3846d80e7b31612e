//! Per-stream audio worker.
//!
//! One worker per active stream, reading fixed-size control records off
//! the stream's audio socketpair and invoking the user callback with a
//! pointer into the shared-memory ring. Runs at elevated scheduling
//! priority so its wakeups aren't delayed behind normal-priority work.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use tracing::{trace, warn};

use paclient_core::ids::StreamId;
use paclient_core::sched::{apply_realtime_priority, DEFAULT_RT_PRIORITY};
use paclient_core::shm::MappedRegion;
use paclient_proto::audio_control::{AudioControlRecord, AudioControlTag};
use paclient_proto::record::Direction;

use crate::stream::{StreamParams, WorkerState};

const WAKE_TOKEN: Token = Token(0);
const AUDIO_TOKEN: Token = Token(1);

/// Reported to the control worker over the stream-event pipe when a
/// worker exits, so the stream can be removed and the error callback
/// invoked.
#[derive(Debug, Clone, Copy)]
pub struct StreamWorkerExit {
    pub stream_id: StreamId,
    pub error: i32,
}

/// Shared control block letting the owning thread (control worker) signal
/// the audio worker without locking the hot path.
pub struct WorkerControl {
    stop: AtomicBool,
    mapped: AtomicBool,
}

impl Default for WorkerControl {
    fn default() -> Self {
        Self {
            stop: AtomicBool::new(false),
            mapped: AtomicBool::new(false),
        }
    }
}

impl WorkerControl {
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn mark_mapped(&self) {
        self.mapped.store(true, Ordering::Release);
    }
}

/// Spawn the worker thread for one stream.
///
/// `wake_fd` is the read end of a pipe the control worker writes to after
/// calling `mark_mapped` or `request_stop`, to break the WARMUP poll wait.
/// `stream_event_wake_fd` is the write end of the control worker's
/// stream-event pipe: written once on exit so the control worker's own
/// poll wakes up and drains `exit_tx` instead of blocking forever.
pub fn spawn(
    stream_id: StreamId,
    direction: Direction,
    mut params: StreamParams,
    audio_socket: OwnedFd,
    wake_fd: OwnedFd,
    control: Arc<WorkerControl>,
    region_slot: Arc<parking_lot::Mutex<Option<Arc<MappedRegion>>>>,
    exit_tx: flume::Sender<StreamWorkerExit>,
    stream_event_wake_fd: OwnedFd,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name(format!("paclient-audio-{}", stream_id.raw()))
        .spawn(move || {
            match apply_realtime_priority(DEFAULT_RT_PRIORITY) {
                paclient_core::sched::SchedulingOutcome::Unavailable => {
                    warn!(%stream_id, "audio worker running at default scheduling priority");
                }
                _ => {}
            }

            let exit_error = run(
                stream_id,
                direction,
                &mut params,
                &audio_socket,
                &wake_fd,
                &control,
                &region_slot,
            );

            let _ = exit_tx.send(StreamWorkerExit {
                stream_id,
                error: exit_error,
            });
            let _ = nix::unistd::write(stream_event_wake_fd.as_raw_fd(), &[1]);
        })
        .expect("spawning an audio worker thread should not fail under normal resource limits")
}

fn run(
    stream_id: StreamId,
    direction: Direction,
    params: &mut StreamParams,
    audio_socket: &OwnedFd,
    wake_fd: &OwnedFd,
    control: &WorkerControl,
    region_slot: &parking_lot::Mutex<Option<Arc<MappedRegion>>>,
) -> i32 {
    let mut poll = match Poll::new() {
        Ok(poll) => poll,
        Err(err) => {
            warn!(%stream_id, %err, "failed to create audio worker poll");
            return -1;
        }
    };
    let mut events = Events::with_capacity(4);

    let wake_raw: RawFd = wake_fd.as_raw_fd();
    if poll
        .registry()
        .register(&mut SourceFd(&wake_raw), WAKE_TOKEN, Interest::READABLE)
        .is_err()
    {
        return -1;
    }

    let mut state = WorkerState::Warmup;
    let audio_raw: RawFd = audio_socket.as_raw_fd();
    let mut audio_registered = false;

    loop {
        if control.stop.load(Ordering::Acquire) {
            state = WorkerState::Stop;
        }
        if state == WorkerState::Stop {
            return 0;
        }

        if state == WorkerState::Warmup && control.mapped.load(Ordering::Acquire) {
            if !audio_registered {
                if poll
                    .registry()
                    .register(&mut SourceFd(&audio_raw), AUDIO_TOKEN, Interest::READABLE)
                    .is_err()
                {
                    return -1;
                }
                audio_registered = true;
            }
            state = WorkerState::Running;
            trace!(%stream_id, "audio worker entering RUNNING");
        }

        if poll.poll(&mut events, None).is_err() {
            continue;
        }

        for event in &events {
            match event.token() {
                WAKE_TOKEN => drain_wake_pipe(wake_fd),
                AUDIO_TOKEN if state == WorkerState::Running => {
                    let region = region_slot.lock().clone();
                    let Some(region) = region else { continue };
                    match handle_one_record(direction, params, audio_socket, &region) {
                        Ok(true) => {}
                        Ok(false) => return 0,
                        Err(err) => return err,
                    }
                }
                _ => {}
            }
        }
    }
}

fn drain_wake_pipe(wake_fd: &OwnedFd) {
    let mut buf = [0u8; 64];
    loop {
        match nix::unistd::read(wake_fd.as_raw_fd(), &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) if n < buf.len() => break,
            Ok(_) => continue,
        }
    }
}

/// Read, handle, and reply to exactly one control record.
///
/// Returns `Ok(true)` to keep running, `Ok(false)` on a clean EOF (short
/// read), `Err(code)` when the callback reported a fatal error.
fn handle_one_record(
    direction: Direction,
    params: &mut StreamParams,
    audio_socket: &OwnedFd,
    region: &MappedRegion,
) -> Result<bool, i32> {
    let mut buf = [0u8; paclient_proto::audio_control::AUDIO_CONTROL_RECORD_SIZE];
    let n = nix::unistd::read(audio_socket.as_raw_fd(), &mut buf).unwrap_or(0);
    if n != buf.len() {
        return Ok(false);
    }
    let Some(record) = AudioControlRecord::decode(&buf) else {
        return Ok(false);
    };

    let header = unsafe { region.header() };
    let cap = if params.flags & paclient_proto::record::stream_flags::BULK_AUDIO_OK != 0 {
        params.buffer_frames
    } else {
        params.callback_threshold.min(params.buffer_frames)
    };

    let reply = match (direction.is_readable(), record.tag) {
        (true, AudioControlTag::DataReady) => {
            let requested = record.frames.min(cap);
            if header.readable_frames() < u64::from(requested) {
                AudioControlRecord::ok(AudioControlTag::DataCaptured, 0)
            } else {
                let base = read_base(region, header, params);
                let produced = (params.callback)(base, requested);
                if produced < 0 {
                    return Err(produced);
                }
                header.advance_read_index(u64::from(produced as u32));
                AudioControlRecord::ok(AudioControlTag::DataCaptured, produced as u32)
            }
        }
        (_, AudioControlTag::RequestData) if direction.is_writable() => {
            let requested = record.frames.min(cap);
            let base = write_base(region, header, params);
            let produced = (params.callback)(base, requested);
            if produced < 0 {
                return Err(produced);
            }
            if produced > 0 {
                header.advance_write_index(u64::from(produced as u32));
            }
            AudioControlRecord::ok(AudioControlTag::DataReady, produced as u32)
        }
        _ => AudioControlRecord::failed(record.tag, -22),
    };

    let encoded = reply.encode();
    let _ = nix::unistd::write(audio_socket.as_raw_fd(), &encoded);
    Ok(true)
}

fn read_base<'a>(region: &'a MappedRegion, header: &paclient_core::shm::RingHeader, params: &StreamParams) -> &'a mut [u8] {
    ring_window(region, header.read_index(), params)
}

fn write_base<'a>(region: &'a MappedRegion, header: &paclient_core::shm::RingHeader, params: &StreamParams) -> &'a mut [u8] {
    ring_window(region, header.write_index(), params)
}

/// A mutable view starting at `cursor`'s position within the ring,
/// wrapped to the buffer's start if it doesn't fit without wraparound.
///
/// Simplification: the caller is expected to request no more than
/// `buffer_frames` at once, so the only wraparound case handled is
/// "doesn't fit, restart from offset 0" -- true for any single request
/// bounded by the ring's own capacity.
fn ring_window<'a>(region: &'a MappedRegion, cursor: u64, params: &StreamParams) -> &'a mut [u8] {
    let bytes_per_frame = params.sample_format.bytes_per_sample() * params.channels as usize;
    let capacity_frames = u64::from(params.buffer_frames);
    let offset_frames = if capacity_frames == 0 { 0 } else { cursor % capacity_frames };
    let offset_bytes = offset_frames as usize * bytes_per_frame;

    // SAFETY: the audio worker is the sole local accessor of its stream's
    // samples region for the direction it owns.
    let samples = unsafe { region.samples_mut() };
    &mut samples[offset_bytes..]
}
