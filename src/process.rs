//! Process control blocks for the operations deck, plus the atomic id
//! counters shared across the kernel.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::constants::MAX_PROC_NAME_LEN;

/// Monotonic 64-bit id source. All process-wide counters (`next_pid`,
/// `next_fd`) go through this increment-and-return primitive.
pub struct IdCounter(AtomicU64);

impl IdCounter {
    pub const fn new(start: u64) -> Self {
        Self(AtomicU64::new(start))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Ready,
    Running,
    Blocked,
    Terminated,
}

/// Process control block. Page table, stack and instruction pointers
/// are placeholders in this core; only the bookkeeping is real.
pub struct Pcb {
    pub pid: u64,
    pub parent_pid: u64,
    name: [u8; MAX_PROC_NAME_LEN + 1],
    name_len: usize,
    pub state: ProcState,
    pub page_table: u64,
    pub stack_ptr: u64,
    pub instr_ptr: u64,
    pub exit_code: u32,
}

impl Pcb {
    pub fn name(&self) -> &[u8] {
        &self.name[..self.name_len]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcError {
    NotFound,
    NameTooLong,
}

/// Live process table, keyed by pid. Pids start at 1 and are never
/// reused.
pub struct ProcessTable {
    procs: BTreeMap<u64, Pcb>,
    next_pid: IdCounter,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self {
            procs: BTreeMap::new(),
            next_pid: IdCounter::new(1),
        }
    }

    pub fn create(
        &mut self,
        name: &[u8],
        entry_point: u64,
        parent_pid: u64,
    ) -> Result<u64, ProcError> {
        if name.len() > MAX_PROC_NAME_LEN {
            return Err(ProcError::NameTooLong);
        }
        let pid = self.next_pid.next();
        let mut stored = [0u8; MAX_PROC_NAME_LEN + 1];
        stored[..name.len()].copy_from_slice(name);
        self.procs.insert(
            pid,
            Pcb {
                pid,
                parent_pid,
                name: stored,
                name_len: name.len(),
                state: ProcState::Ready,
                page_table: 0,
                stack_ptr: 0,
                instr_ptr: entry_point,
                exit_code: 0,
            },
        );
        Ok(pid)
    }

    pub fn get(&self, pid: u64) -> Option<&Pcb> {
        self.procs.get(&pid)
    }

    pub fn kill(&mut self, pid: u64, exit_code: u32) -> Result<(), ProcError> {
        let pcb = self.procs.get_mut(&pid).ok_or(ProcError::NotFound)?;
        pcb.state = ProcState::Terminated;
        pcb.exit_code = exit_code;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pids_start_at_one_and_increase() {
        let mut table = ProcessTable::new();
        let a = table.create(b"init", 0xDEAD, 0).unwrap();
        let b = table.create(b"shell", 0xBEEF, a).unwrap();
        assert_eq!(a, 1);
        assert!(b > a);
        assert_eq!(table.get(b).unwrap().parent_pid, a);
        assert_eq!(table.get(a).unwrap().name(), b"init");
        assert_eq!(table.get(a).unwrap().instr_ptr, 0xDEAD);
    }

    #[test]
    fn kill_marks_terminated() {
        let mut table = ProcessTable::new();
        let pid = table.create(b"victim", 0, 0).unwrap();
        table.kill(pid, 9).unwrap();
        assert_eq!(table.get(pid).unwrap().state, ProcState::Terminated);
        assert_eq!(table.kill(999, 9), Err(ProcError::NotFound));
    }
}
