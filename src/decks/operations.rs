//! Operations deck: process lifecycle and IPC.
//!
//! PROC_CREATE is real (allocates a PCB and returns the pid); the
//! remaining process and IPC operations validate their payloads and
//! acknowledge, as placeholders for the full implementations.

use crate::deck::{Reply, RoutingEntry, ServiceResult};
use crate::payload;
use crate::process::{ProcState, ProcessTable};
use crate::record::EventType;

/// Stable operations result codes.
pub mod codes {
    pub const CREATE_FAILURE: u32 = 1;
    pub const PROC_NOT_FOUND: u32 = 2;
    pub const UNKNOWN_TYPE: u32 = 3;
    pub const INVALID_REQUEST: u32 = 4;
}

pub struct OperationsService {
    table: ProcessTable,
    /// The submitting context; 0 is the kernel itself until processes
    /// can actually run.
    current_pid: u64,
}

impl OperationsService {
    pub fn new() -> Self {
        Self {
            table: ProcessTable::new(),
            current_pid: 0,
        }
    }

    pub fn table(&self) -> &ProcessTable {
        &self.table
    }

    pub(crate) fn process(&mut self, entry: &RoutingEntry) -> ServiceResult {
        let event = &entry.event;
        let Ok(ty) = EventType::try_from(event.event_type) else {
            return Err(codes::UNKNOWN_TYPE);
        };
        let data = event.payload();
        match ty {
            EventType::ProcCreate => {
                let req = payload::decode_proc_create(data).map_err(|_| codes::CREATE_FAILURE)?;
                let pid = self
                    .table
                    .create(req.name, req.entry_point, self.current_pid)
                    .map_err(|_| codes::CREATE_FAILURE)?;
                Ok(Reply::bytes(payload::encode_u64(pid)))
            }
            EventType::ProcExit => {
                payload::decode_exit_code(data).map_err(|_| codes::INVALID_REQUEST)?;
                Ok(Reply::empty())
            }
            EventType::ProcKill => {
                let pid = payload::decode_u64(data).map_err(|_| codes::INVALID_REQUEST)?;
                self.table.kill(pid, 0).map_err(|_| codes::PROC_NOT_FOUND)?;
                Ok(Reply::empty())
            }
            EventType::ProcWait => {
                let pid = payload::decode_u64(data).map_err(|_| codes::INVALID_REQUEST)?;
                let pcb = self.table.get(pid).ok_or(codes::PROC_NOT_FOUND)?;
                let state = match pcb.state {
                    ProcState::Ready => 0u32,
                    ProcState::Running => 1,
                    ProcState::Blocked => 2,
                    ProcState::Terminated => 3,
                };
                let mut bytes = state.to_le_bytes().to_vec();
                bytes.extend_from_slice(&pcb.exit_code.to_le_bytes());
                Ok(Reply::bytes(bytes))
            }
            EventType::ProcGetpid => Ok(Reply::bytes(payload::encode_u64(self.current_pid))),
            EventType::ProcSignal => {
                payload::decode_proc_signal(data).map_err(|_| codes::INVALID_REQUEST)?;
                Ok(Reply::empty())
            }
            EventType::IpcSend => {
                payload::decode_ipc_send(data).map_err(|_| codes::INVALID_REQUEST)?;
                Ok(Reply::empty())
            }
            EventType::IpcRecv
            | EventType::IpcShmCreate
            | EventType::IpcShmAttach
            | EventType::IpcPipeCreate => Ok(Reply::empty()),
            _ => Err(codes::UNKNOWN_TYPE),
        }
    }
}

impl Default for OperationsService {
    fn default() -> Self {
        Self::new()
    }
}
