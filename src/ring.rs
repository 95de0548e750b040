//! Lock-free SPSC ring buffers carrying events and responses across the
//! user/kernel boundary.
//!
//! Head and tail are unwrapped 64-bit counters; the slot index is
//! `counter & (capacity - 1)`, so capacity must be a power of two and the
//! counters never suffer ABA. The producer writes a slot and then
//! publishes `head` with release ordering; the consumer loads `head` with
//! acquire ordering, reads the slot, and frees it by publishing `tail`
//! with release ordering. Neither side ever blocks: a full ring reports
//! `Backpressure` to the producer.

use std::cell::UnsafeCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Push refused: the ring is full. The producer must back off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backpressure;

/// Counters live on their own cache lines so the producer's head stores
/// do not false-share with the consumer's tail stores.
#[repr(align(64))]
struct CachePadded(AtomicU64);

struct Shared<T> {
    slots: Box<[UnsafeCell<T>]>,
    mask: u64,
    /// Producer-owned counter: next slot to write.
    head: CachePadded,
    /// Consumer-owned counter: next slot to read.
    tail: CachePadded,
}

// SAFETY: slots are handed across threads, but each slot is accessed by
// exactly one side at a time — the producer only writes slots the
// consumer has freed (head - tail < capacity), the consumer only reads
// slots the producer has published (tail < head), and the head/tail
// release/acquire pairs order those accesses.
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Shared<T> {
    fn capacity(&self) -> u64 {
        self.mask + 1
    }

    /// Occupancy snapshot with the corruption check from the error
    /// design: a head/tail pair that is impossible for any interleaving
    /// of one producer and one consumer halts the system.
    fn occupancy(&self, head: u64, tail: u64) -> u64 {
        assert!(
            head >= tail && head - tail <= self.capacity(),
            "ring counter corruption: head={head} tail={tail} capacity={}",
            self.capacity()
        );
        head - tail
    }
}

/// Producer half. Owning it is what makes the "single producer" rule
/// hold: there is no way to clone it.
pub struct RingProducer<T> {
    shared: Arc<Shared<T>>,
}

/// Consumer half; same ownership argument as the producer.
pub struct RingConsumer<T> {
    shared: Arc<Shared<T>>,
}

/// Build a matched producer/consumer pair over `capacity` slots, each
/// pre-initialised via `factory`.
pub fn channel<T>(capacity: usize, mut factory: impl FnMut() -> T) -> (RingProducer<T>, RingConsumer<T>) {
    assert!(
        capacity.is_power_of_two() && capacity > 0,
        "ring capacity must be a power of two"
    );
    let slots: Box<[UnsafeCell<T>]> = (0..capacity).map(|_| UnsafeCell::new(factory())).collect();
    let shared = Arc::new(Shared {
        slots,
        mask: capacity as u64 - 1,
        head: CachePadded(AtomicU64::new(0)),
        tail: CachePadded(AtomicU64::new(0)),
    });
    (
        RingProducer {
            shared: Arc::clone(&shared),
        },
        RingConsumer { shared },
    )
}

impl<T: Copy> RingProducer<T> {
    /// Publish one value. Returns `Backpressure` without blocking when
    /// the ring is full.
    pub fn try_push(&mut self, value: T) -> Result<(), Backpressure> {
        let shared = &self.shared;
        // Relaxed: we are the only writer of head.
        let head = shared.head.0.load(Ordering::Relaxed);
        let tail = shared.tail.0.load(Ordering::Acquire);
        if shared.occupancy(head, tail) == shared.capacity() {
            return Err(Backpressure);
        }
        let idx = (head & shared.mask) as usize;
        // SAFETY: occupancy < capacity, so the consumer has freed this
        // slot; the release store below publishes the write.
        unsafe {
            *shared.slots[idx].get() = value;
        }
        shared.head.0.store(head + 1, Ordering::Release);
        Ok(())
    }

    /// Occupancy snapshot (approximate under concurrency).
    pub fn len(&self) -> usize {
        let head = self.shared.head.0.load(Ordering::Relaxed);
        let tail = self.shared.tail.0.load(Ordering::Acquire);
        self.shared.occupancy(head, tail) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.shared.capacity() as usize
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity() as usize
    }
}

impl<T: Copy> RingConsumer<T> {
    /// Consume one value, or `None` when the ring is empty.
    pub fn try_pop(&mut self) -> Option<T> {
        let shared = &self.shared;
        let head = shared.head.0.load(Ordering::Acquire);
        // Relaxed: we are the only writer of tail.
        let tail = shared.tail.0.load(Ordering::Relaxed);
        if shared.occupancy(head, tail) == 0 {
            return None;
        }
        let idx = (tail & shared.mask) as usize;
        // SAFETY: tail < head, so the producer's release store has
        // published this slot and will not touch it again until we free
        // it with the release store below.
        let value = unsafe { *shared.slots[idx].get() };
        shared.tail.0.store(tail + 1, Ordering::Release);
        Some(value)
    }

    /// Occupancy snapshot (approximate under concurrency).
    pub fn len(&self) -> usize {
        let head = self.shared.head.0.load(Ordering::Acquire);
        let tail = self.shared.tail.0.load(Ordering::Relaxed);
        self.shared.occupancy(head, tail) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw unwrapped counters, for invariant checks in tests.
    pub fn counters(&self) -> (u64, u64) {
        (
            self.shared.head.0.load(Ordering::Acquire),
            self.shared.tail.0.load(Ordering::Relaxed),
        )
    }
}
