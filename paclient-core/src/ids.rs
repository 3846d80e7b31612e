//! Stream id allocation.
//!
//! A stream id is unique per client for the client's whole lifetime. The
//! high bits carry the client id the server assigned on CONNECTED; the low
//! bits are a per-client monotonic counter. Because the control worker is
//! the sole mutator of the stream list, allocation never needs to guard
//! against concurrent adds -- it only needs to avoid colliding with ids
//! still present in the list (a counter wrap after ~4 billion streams).

const COUNTER_BITS: u32 = 32;

/// The server-assigned identifier for this client's whole connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u32);

/// A 64-bit id unique within a client: `client_id << 32 | counter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl StreamId {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Allocates stream ids for a single client connection.
///
/// Reset on every successful (re)connect, since the server hands out a
/// fresh client id each time and old stream ids from a previous connection
/// are meaningless after the streams behind them were torn down.
#[derive(Debug)]
pub struct StreamIdAllocator {
    client_id: ClientId,
    next_counter: u32,
}

impl StreamIdAllocator {
    #[must_use]
    pub const fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            next_counter: 0,
        }
    }

    /// Allocate the next id, skipping any value already present in
    /// `existing` (a linear scan is fine: the active-stream count per
    /// client is small and collisions only happen after a `u32` wrap).
    pub fn allocate(&mut self, existing: &impl Fn(StreamId) -> bool) -> StreamId {
        loop {
            let candidate = self.compose(self.next_counter);
            self.next_counter = self.next_counter.wrapping_add(1);
            if !existing(candidate) {
                return candidate;
            }
        }
    }

    fn compose(&self, counter: u32) -> StreamId {
        StreamId((u64::from(self.client_id.0) << COUNTER_BITS) | u64::from(counter))
    }
}
