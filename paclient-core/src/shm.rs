//! Shared-memory ring-buffer transport.
//!
//! Each stream gets a header region (fixed layout, below) and a samples
//! region -- a plain byte ring sized by the connect reply. Both are mapped
//! from file descriptors the server passes over the control socket. The
//! header's cursors are plain atomics: the producer advances its index
//! with `Release`, the consumer observes it with `Acquire`, and no lock is
//! ever held across the kernel boundary.

use std::mem::size_of;
use std::os::unix::io::RawFd;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::error::{ClientError, Result};

/// Layout of the per-stream shared-memory header.
///
/// `#[repr(C)]` because this struct is mapped directly onto memory also
/// written by the server process; field order and size must match exactly
/// on both sides.
#[repr(C)]
pub struct RingHeader {
    write_index: AtomicU64,
    read_index: AtomicU64,
    timestamp_secs: AtomicU64,
    timestamp_nanos: AtomicU32,
    overrun_count: AtomicU64,
    dropped_sample_duration_nanos: AtomicU64,
    underrun_duration_nanos: AtomicU64,
    volume_bits: AtomicU32,
}

impl RingHeader {
    pub const SIZE: usize = size_of::<Self>();

    #[must_use]
    pub fn write_index(&self) -> u64 {
        self.write_index.load(Ordering::Acquire)
    }

    pub fn advance_write_index(&self, frames: u64) {
        self.write_index.fetch_add(frames, Ordering::Release);
    }

    #[must_use]
    pub fn read_index(&self) -> u64 {
        self.read_index.load(Ordering::Acquire)
    }

    pub fn advance_read_index(&self, frames: u64) {
        self.read_index.fetch_add(frames, Ordering::Release);
    }

    #[must_use]
    pub fn overrun_count(&self) -> u64 {
        self.overrun_count.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn dropped_sample_duration_nanos(&self) -> u64 {
        self.dropped_sample_duration_nanos.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn underrun_duration_nanos(&self) -> u64 {
        self.underrun_duration_nanos.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn timestamp(&self) -> (u64, u32) {
        (
            self.timestamp_secs.load(Ordering::Acquire),
            self.timestamp_nanos.load(Ordering::Acquire),
        )
    }

    pub fn set_timestamp(&self, secs: u64, nanos: u32) {
        self.timestamp_secs.store(secs, Ordering::Release);
        self.timestamp_nanos.store(nanos, Ordering::Release);
    }

    #[must_use]
    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Acquire))
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume_bits.store(volume.to_bits(), Ordering::Release);
    }

    /// Frames available to read without crossing the writer's current
    /// index (capture direction).
    #[must_use]
    pub fn readable_frames(&self) -> u64 {
        self.write_index().saturating_sub(self.read_index())
    }

    /// Frames the writer may still produce before catching up with the
    /// last-known reader position (playback direction).
    #[must_use]
    pub fn writable_frames(&self, ring_capacity_frames: u64) -> u64 {
        ring_capacity_frames.saturating_sub(self.write_index().saturating_sub(self.read_index()))
    }
}

/// An `mmap`-ed region owned exclusively by this client, unmapped on drop.
pub struct MappedRegion {
    ptr: NonNull<u8>,
    len: usize,
}

// The mapping is either read-only from both sides or single-producer /
// single-consumer, so sharing the pointer across threads is sound as long
// as callers respect the direction contract documented on `samples_mut`.
unsafe impl Send for MappedRegion {}
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    /// Map `len` bytes of `fd`.
    pub fn map(fd: RawFd, len: usize, writable: bool) -> Result<Self> {
        if len == 0 {
            return Err(ClientError::shared_memory("zero-length mapping requested"));
        }
        let prot = if writable {
            libc::PROT_READ | libc::PROT_WRITE
        } else {
            libc::PROT_READ
        };
        // SAFETY: fd is a valid, server-passed shared-memory descriptor;
        // the mapping is released exactly once, in `Drop` below.
        let addr = unsafe { libc::mmap(std::ptr::null_mut(), len, prot, libc::MAP_SHARED, fd, 0) };
        if addr == libc::MAP_FAILED {
            return Err(ClientError::shared_memory(format!(
                "mmap failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        let ptr = NonNull::new(addr.cast::<u8>()).expect("mmap returned non-null on success");
        Ok(Self { ptr, len })
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View the first `RingHeader::SIZE` bytes as the ring header.
    ///
    /// # Safety
    /// The mapping must be at least `RingHeader::SIZE` bytes and must have
    /// been established against a region the server populates with this
    /// exact header layout.
    #[must_use]
    pub unsafe fn header(&self) -> &RingHeader {
        &*self.ptr.as_ptr().cast::<RingHeader>()
    }

    /// Byte slice of the samples region, after the header.
    ///
    /// # Panics
    /// Panics if the mapping is smaller than `RingHeader::SIZE`.
    #[must_use]
    pub fn samples(&self) -> &[u8] {
        assert!(self.len >= RingHeader::SIZE);
        // SAFETY: bounds checked above; the pointer is valid for `self.len`
        // bytes for the lifetime of `self`.
        unsafe {
            std::slice::from_raw_parts(self.ptr.as_ptr().add(RingHeader::SIZE), self.len - RingHeader::SIZE)
        }
    }

    /// Mutable byte slice of the samples region, for playback writers.
    ///
    /// # Safety
    /// Caller must be the sole producer writing into this stream's samples
    /// region (true for the audio worker that owns the mapping).
    #[must_use]
    pub unsafe fn samples_mut(&self) -> &mut [u8] {
        assert!(self.len >= RingHeader::SIZE);
        std::slice::from_raw_parts_mut(self.ptr.as_ptr().add(RingHeader::SIZE), self.len - RingHeader::SIZE)
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: ptr/len came from a successful mmap call in `map` and are
        // never handed out past this struct's lifetime.
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.len);
        }
    }
}

/// Snapshot-and-retry reader for a region published under an odd/even
/// update counter: the writer increments the counter (making it odd)
/// before touching the fields, writes them, then increments again (making
/// it even). A reader takes the counter, copies the fields, and retries if
/// the counter was odd or changed underneath it.
pub fn read_versioned<T>(counter: &AtomicU32, mut copy: impl FnMut() -> T) -> T {
    loop {
        let before = counter.load(Ordering::Acquire);
        if before % 2 != 0 {
            std::hint::spin_loop();
            continue;
        }
        let snapshot = copy();
        let after = counter.load(Ordering::Acquire);
        if after == before {
            return snapshot;
        }
    }
}

/// Writer-side helper: bracket `update` with the odd/even counter bump.
pub fn write_versioned(counter: &AtomicU32, update: impl FnOnce()) {
    counter.fetch_add(1, Ordering::AcqRel);
    update();
    counter.fetch_add(1, Ordering::Release);
}
