//! Ring slot records crossing the user/kernel boundary.
//!
//! Both records are packed little-endian `Pod` structs so a slot can be
//! viewed as raw bytes on either side of the boundary. Pre-allocated per
//! slot via the factory functions.

use bytemuck::{Pod, Zeroable};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::constants::{EVENT_DATA_CAPACITY, RESPONSE_DATA_CAPACITY};

/// Deck prefix: the top byte of an event type.
pub const PREFIX_STORAGE: u8 = 0x01;
pub const PREFIX_OPERATIONS: u8 = 0x02;

/// Event flag: the event expires `EVENT_TTL_TICKS` after `timestamp`.
pub const EVENT_FLAG_DEADLINE: u8 = 1 << 0;

/// Event record published on the user → kernel ring. Immutable once
/// published.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct Event {
    pub id: u64,
    pub event_type: u32,
    pub priority: u8,
    pub flags: u8,
    pub _pad: u16,
    pub submitter: u64,
    pub timestamp: u64,
    pub data_len: u32,
    pub _pad2: u32,
    pub data: [u8; EVENT_DATA_CAPACITY],
}

impl Event {
    /// Factory for ring slot initialisation.
    pub fn factory() -> Self {
        Self::zeroed()
    }

    /// Deck prefix encoded in the high byte of the type.
    pub fn prefix(&self) -> u8 {
        (self.event_type >> 24) as u8
    }

    /// The valid prefix of the inline payload. `data_len` is clamped so
    /// a record with a corrupt length cannot index out of bounds; the
    /// router rejects such events before any handler sees them.
    pub fn payload(&self) -> &[u8] {
        &self.data[..(self.data_len as usize).min(EVENT_DATA_CAPACITY)]
    }
}

/// Response record published on the kernel → user ring. At most one
/// terminal response is ever published per `event_id`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct Response {
    pub event_id: u64,
    pub status: u32,
    pub result_code: u32,
    pub completed_at: u64,
    pub result_len: u32,
    pub _pad: u32,
    pub result: [u8; RESPONSE_DATA_CAPACITY],
}

impl Response {
    /// Factory for ring slot initialisation.
    pub fn factory() -> Self {
        Self::zeroed()
    }

    fn with_result(event_id: u64, status: EventStatus, code: u32, now: u64, result: &[u8]) -> Self {
        debug_assert!(result.len() <= RESPONSE_DATA_CAPACITY);
        let mut resp = Self::zeroed();
        resp.event_id = event_id;
        resp.status = status.into();
        resp.result_code = code;
        resp.completed_at = now;
        resp.result_len = result.len() as u32;
        resp.result[..result.len()].copy_from_slice(result);
        resp
    }

    /// Terminal success with an inline result.
    pub fn success(event_id: u64, now: u64, result: &[u8]) -> Self {
        Self::with_result(event_id, EventStatus::Success, 0, now, result)
    }

    /// Terminal failure carrying a stable numeric code.
    pub fn failure(event_id: u64, now: u64, code: u32) -> Self {
        Self::with_result(event_id, EventStatus::Failure, code, now, &[])
    }

    /// Terminal timeout (deadline exceeded pre- or post-routing).
    pub fn timeout(event_id: u64, now: u64) -> Self {
        Self::with_result(event_id, EventStatus::Timeout, codes::TIMEOUT, now, &[])
    }

    /// Non-terminal progress note (e.g. routing backpressure).
    pub fn in_progress(event_id: u64, now: u64, code: u32) -> Self {
        Self::with_result(event_id, EventStatus::InProgress, code, now, &[])
    }

    /// The valid prefix of the inline result.
    pub fn result_bytes(&self) -> &[u8] {
        &self.result[..self.result_len as usize]
    }

    pub fn status(&self) -> Option<EventStatus> {
        EventStatus::try_from(self.status).ok()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status(),
            Some(EventStatus::Success | EventStatus::Failure | EventStatus::Timeout)
        )
    }
}

/// Lifecycle of a submitted event, as reported in responses.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
pub enum EventStatus {
    Pending = 0,
    InProgress = 1,
    Success = 2,
    Failure = 3,
    Timeout = 4,
}

/// Event type numbering: deck prefix in the top byte, subtype in the low
/// 24 bits.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
pub enum EventType {
    // Storage deck (0x01)
    MemoryAlloc = 0x0100_0001,
    MemoryFree = 0x0100_0002,
    MemoryMap = 0x0100_0003,
    FileOpen = 0x0100_0010,
    FileClose = 0x0100_0011,
    FileRead = 0x0100_0012,
    FileWrite = 0x0100_0013,
    FileStat = 0x0100_0014,
    FileCreateTagged = 0x0100_0020,
    FileQuery = 0x0100_0021,
    FileTagAdd = 0x0100_0022,
    FileTagRemove = 0x0100_0023,
    FileTagGet = 0x0100_0024,
    // Operations deck (0x02)
    ProcCreate = 0x0200_0001,
    ProcExit = 0x0200_0002,
    ProcKill = 0x0200_0003,
    ProcWait = 0x0200_0004,
    ProcGetpid = 0x0200_0005,
    ProcSignal = 0x0200_0006,
    IpcSend = 0x0200_0010,
    IpcRecv = 0x0200_0011,
    IpcShmCreate = 0x0200_0012,
    IpcShmAttach = 0x0200_0013,
    IpcPipeCreate = 0x0200_0014,
}

impl EventType {
    pub fn prefix(self) -> u8 {
        (u32::from(self) >> 24) as u8
    }
}

/// Stable result codes outside any single deck's handler namespace.
/// Deck-specific handler codes live next to their handlers.
pub mod codes {
    /// Payload failed schema validation (short read, bad count, bad enum).
    pub const INVALID_PAYLOAD: u32 = 100;
    /// Event type matches no deck prefix.
    pub const UNKNOWN_TYPE: u32 = 101;
    /// Routing backpressure persisted past the retry bound.
    pub const OVERLOADED: u32 = 102;
    /// Deadline exceeded.
    pub const TIMEOUT: u32 = 103;
    /// Routing backpressure note on an InProgress response.
    pub const BACKPRESSURE: u32 = 104;
}

const _: () = assert!(size_of::<Event>() == 296, "Event layout drifted");
const _: () = assert!(size_of::<Response>() == 288, "Response layout drifted");
