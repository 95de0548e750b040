//! Protocol constants shared across the user/kernel boundary.
//!
//! Sizing and operational knobs that are not part of the wire contract
//! live in `config`.

/// Inline payload capacity of an `Event` record (bytes).
pub const EVENT_DATA_CAPACITY: usize = 256;

/// Inline result capacity of a `Response` record (bytes).
pub const RESPONSE_DATA_CAPACITY: usize = 256;

/// Fixed storage width of a tag key, NUL-padded.
pub const TAG_KEY_LEN: usize = 32;

/// Fixed storage width of a tag value, NUL-padded.
pub const TAG_VALUE_LEN: usize = 64;

/// Wire size of one tag: key bytes followed by value bytes.
pub const TAG_WIRE_LEN: usize = TAG_KEY_LEN + TAG_VALUE_LEN;

/// Maximum tags carried by one inode.
pub const MAX_TAGS_PER_FILE: usize = 16;

/// Maximum process name length, excluding the NUL.
pub const MAX_PROC_NAME_LEN: usize = 63;

/// Page granularity of MEMORY_ALLOC / MEMORY_FREE.
pub const PAGE_SIZE: u64 = 4096;

/// Maximum inode ids one FILE_QUERY response can carry inline:
/// `{count: u32, truncated: u8, _pad: [u8; 3]}` header, then u64 ids.
pub const QUERY_RESULT_MAX_IDS: usize = (RESPONSE_DATA_CAPACITY - 8) / 8;

/// Maximum tags one FILE_TAG_GET response can carry inline:
/// `{total: u32, returned: u32}` header, then 96-byte tags.
pub const TAG_GET_MAX_TAGS: usize = (RESPONSE_DATA_CAPACITY - 8) / TAG_WIRE_LEN;

// Compile-time sanity checks
const _: () = assert!(
    8 + TAG_WIRE_LEN <= EVENT_DATA_CAPACITY,
    "FILE_TAG_ADD (inode_id + one tag) must fit an event payload"
);
const _: () = assert!(
    QUERY_RESULT_MAX_IDS >= 1 && TAG_GET_MAX_TAGS >= 1,
    "response payload too small for any query/tag-get result"
);
const _: () = assert!(
    MAX_PROC_NAME_LEN + 1 + 4 + 8 <= EVENT_DATA_CAPACITY,
    "PROC_CREATE (name_len + name + entry_point) must fit an event payload"
);
