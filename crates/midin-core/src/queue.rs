//! Double-buffered state-delta queue.
//!
//! Any number of [`EventSender`]s append encoded records into the shared
//! writable buffer under a short lock. The single [`EventDrain`] swaps that
//! buffer with its own (O(1), under the same lock) and then decodes and
//! resets it without holding the lock, so producers are never blocked by
//! consumer work.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::Result;
use crate::record::{align_up, StateDelta};

/// Default initial capacity of each buffer, in bytes.
pub const DEFAULT_CAPACITY: usize = 2048;

/// Capacity is always grown to a multiple of this many bytes.
const CAPACITY_INCREMENT: usize = 2048;

/// Append-only arena of encoded records.
#[derive(Debug, Default)]
pub struct EventBuffer {
    bytes: Vec<u8>,
    event_count: usize,
}

impl EventBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(align_up(capacity.max(1), CAPACITY_INCREMENT)),
            event_count: 0,
        }
    }

    #[inline]
    pub fn used_len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    #[inline]
    pub fn event_count(&self) -> usize {
        self.event_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.event_count == 0
    }

    fn append(&mut self, delta: &StateDelta) {
        let needed = self.bytes.len() + delta.encoded_len();
        if needed > self.bytes.capacity() {
            let target = align_up(needed.max(self.bytes.capacity() * 2), CAPACITY_INCREMENT);
            self.bytes.reserve_exact(target - self.bytes.len());
        }
        delta.encode_into(&mut self.bytes);
        self.event_count += 1;
    }

    /// Empty the buffer, keeping its allocation.
    pub fn reset(&mut self) {
        self.bytes.clear();
        self.event_count = 0;
    }

    pub fn iter(&self) -> Records<'_> {
        Records {
            bytes: &self.bytes,
            remaining: self.event_count,
        }
    }
}

/// Decoding iterator over an [`EventBuffer`].
pub struct Records<'a> {
    bytes: &'a [u8],
    remaining: usize,
}

impl Iterator for Records<'_> {
    type Item = StateDelta;

    fn next(&mut self) -> Option<StateDelta> {
        if self.remaining == 0 {
            return None;
        }
        match StateDelta::decode(self.bytes) {
            Ok((delta, len)) => {
                self.bytes = &self.bytes[len..];
                self.remaining -= 1;
                Some(delta)
            }
            Err(e) => {
                // Only reachable if the arena was corrupted; drop the rest of the cycle
                tracing::error!("Corrupt state delta record, dropping {} events: {}", self.remaining, e);
                self.remaining = 0;
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

struct Shared {
    writable: Mutex<EventBuffer>,
}

/// Producer half. Cheap to clone, one per port reader.
#[derive(Clone)]
pub struct EventSender {
    shared: Arc<Shared>,
}

impl EventSender {
    /// Validate and copy one delta into the writable buffer.
    pub fn append(&self, delta: &StateDelta) -> Result<()> {
        delta.validate()?;
        self.shared.writable.lock().append(delta);
        Ok(())
    }

    /// Validate every delta, then append them under a single lock acquisition.
    pub fn append_all(&self, deltas: &[StateDelta]) -> Result<()> {
        for delta in deltas {
            delta.validate()?;
        }
        let mut writable = self.shared.writable.lock();
        for delta in deltas {
            writable.append(delta);
        }
        Ok(())
    }
}

impl std::fmt::Debug for EventSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender").finish_non_exhaustive()
    }
}

/// Consumer half. Not `Clone`: exactly one consumer drains the queue.
pub struct EventDrain {
    shared: Arc<Shared>,
    draining: EventBuffer,
}

impl EventDrain {
    /// Swap buffers and return an iterator over everything appended since the last drain.
    ///
    /// The drained buffer is reset when the iterator is dropped, whether or
    /// not it was fully consumed.
    pub fn drain(&mut self) -> Drain<'_> {
        self.draining.reset();
        std::mem::swap(&mut *self.shared.writable.lock(), &mut self.draining);
        Drain {
            records: Records {
                bytes: &self.draining.bytes,
                remaining: self.draining.event_count,
            },
            buffer_len: &mut self.draining.event_count,
        }
    }

    /// Number of events waiting in the writable buffer.
    ///
    /// Takes the producer lock; intended for diagnostics, not the hot path.
    pub fn pending(&self) -> usize {
        self.shared.writable.lock().event_count()
    }

    /// Number of live producer handles.
    pub fn sender_count(&self) -> usize {
        Arc::strong_count(&self.shared) - 1
    }
}

impl std::fmt::Debug for EventDrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDrain")
            .field("draining_capacity", &self.draining.capacity())
            .finish_non_exhaustive()
    }
}

/// Iterator returned by [`EventDrain::drain`].
pub struct Drain<'a> {
    records: Records<'a>,
    buffer_len: &'a mut usize,
}

impl Iterator for Drain<'_> {
    type Item = StateDelta;

    #[inline]
    fn next(&mut self) -> Option<StateDelta> {
        self.records.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

impl Drop for Drain<'_> {
    fn drop(&mut self) {
        // The bytes are cleared on the next swap; the count makes the buffer read as empty now
        *self.buffer_len = 0;
    }
}

/// Create an event queue with [`DEFAULT_CAPACITY`] bytes per buffer.
pub fn event_queue() -> (EventSender, EventDrain) {
    event_queue_with_capacity(DEFAULT_CAPACITY)
}

/// Create an event queue with `capacity` bytes per buffer.
pub fn event_queue_with_capacity(capacity: usize) -> (EventSender, EventDrain) {
    let shared = Arc::new(Shared {
        writable: Mutex::new(EventBuffer::with_capacity(capacity)),
    });
    (
        EventSender {
            shared: Arc::clone(&shared),
        },
        EventDrain {
            shared,
            draining: EventBuffer::with_capacity(capacity),
        },
    )
}
