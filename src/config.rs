//! Kernel sizing and operational configuration.
//!
//! Hardcoded values that are not shared protocol constants. Protocol
//! constants (payload capacities, tag widths) live in `constants`.

use crate::constants::EVENT_DATA_CAPACITY;

/// Event ring capacity (user → kernel). Must be a power of two.
pub const EVENT_RING_CAPACITY: usize = 1024;

/// Response ring capacity (kernel → user). Must be a power of two and
/// >= EVENT_RING_CAPACITY, so a fully drained event ring can always be
/// answered without parking every deck on a full response ring.
pub const RESPONSE_RING_CAPACITY: usize = 2048;

/// Per-deck routing FIFO capacity.
pub const DECK_FIFO_CAPACITY: usize = 256;

/// Max events the router handles per step (batch bound `B`).
pub const ROUTER_BATCH: usize = 64;

/// Max routing entries a deck processes per `run_once` (batch bound `K`).
pub const DECK_BATCH: usize = 32;

/// Routing attempts before a backpressured event fails with Overloaded.
pub const MAX_ROUTE_RETRIES: u32 = 3;

/// Lifetime of a deadline-flagged event, in kernel ticks past its timestamp.
pub const EVENT_TTL_TICKS: u64 = 1024;

/// TagFS geometry: fixed inode table size.
pub const TAGFS_INODE_COUNT: usize = 128;

/// TagFS geometry: data block size in bytes.
pub const TAGFS_BLOCK_SIZE: usize = 512;

/// TagFS geometry: total data blocks.
pub const TAGFS_BLOCK_COUNT: usize = 4096;

/// Pages backing the MEMORY_ALLOC arena (64 MiB at 4 KiB pages).
pub const VMM_PAGE_COUNT: usize = 16384;

/// Synthetic base address of the MEMORY_ALLOC arena. Non-zero so a
/// successful allocation is never confused with a null result.
pub const VMM_BASE_ADDR: u64 = 0x4000_0000;

// Compile-time sanity checks
const _: () = assert!(
    EVENT_RING_CAPACITY.is_power_of_two() && RESPONSE_RING_CAPACITY.is_power_of_two(),
    "ring capacities must be powers of two (index = counter & (cap - 1))"
);
const _: () = assert!(
    RESPONSE_RING_CAPACITY >= EVENT_RING_CAPACITY,
    "response ring must not be smaller than the event ring"
);
const _: () = assert!(
    DECK_FIFO_CAPACITY >= ROUTER_BATCH,
    "a routing batch must fit an empty deck FIFO"
);
const _: () = assert!(
    TAGFS_BLOCK_SIZE.is_power_of_two() && TAGFS_BLOCK_SIZE >= EVENT_DATA_CAPACITY,
    "block size must be a power of two and hold at least one max payload"
);
