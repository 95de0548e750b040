//! User-side surface: the only legitimate way for user code to reach
//! the kernel. Two operations, no syscalls, no interrupts.
//!
//! `submit` builds an event record (id assignment, timestamp, submitter
//! identity) and pushes the event ring; `poll` drains the response ring
//! into a pending map and returns the terminal response for an event id
//! once it has arrived.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::constants::EVENT_DATA_CAPACITY;
use crate::metrics;
use crate::record::{EVENT_FLAG_DEADLINE, Event, EventStatus, EventType, Response};
use crate::ring::{RingConsumer, RingProducer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// Event ring full; retry after the kernel has made progress.
    Backpressure,
    /// Payload exceeds the inline event capacity.
    PayloadTooLarge,
}

pub struct UserPort {
    events: RingProducer<Event>,
    responses: RingConsumer<Response>,
    /// Strictly increasing within this producer.
    next_event_id: u64,
    submitter: u64,
    /// Kernel tick, shared read-only; stamps submissions.
    clock: Arc<AtomicU64>,
    pending: BTreeMap<u64, Response>,
}

impl UserPort {
    pub(crate) fn new(
        events: RingProducer<Event>,
        responses: RingConsumer<Response>,
        clock: Arc<AtomicU64>,
        submitter: u64,
    ) -> Self {
        Self {
            events,
            responses,
            next_event_id: 1,
            submitter,
            clock,
            pending: BTreeMap::new(),
        }
    }

    /// Submit an event. Returns its id, or `Backpressure` with the ring
    /// (and the id counter) untouched.
    pub fn submit(
        &mut self,
        event_type: EventType,
        priority: u8,
        payload: &[u8],
    ) -> Result<u64, SubmitError> {
        self.submit_flags(event_type, priority, 0, payload)
    }

    /// Submit an event that expires `EVENT_TTL_TICKS` after its
    /// timestamp.
    pub fn submit_with_deadline(
        &mut self,
        event_type: EventType,
        priority: u8,
        payload: &[u8],
    ) -> Result<u64, SubmitError> {
        self.submit_flags(event_type, priority, EVENT_FLAG_DEADLINE, payload)
    }

    fn submit_flags(
        &mut self,
        event_type: EventType,
        priority: u8,
        flags: u8,
        payload: &[u8],
    ) -> Result<u64, SubmitError> {
        if payload.len() > EVENT_DATA_CAPACITY {
            return Err(SubmitError::PayloadTooLarge);
        }
        let mut event = Event::factory();
        event.id = self.next_event_id;
        event.event_type = event_type.into();
        event.priority = priority;
        event.flags = flags;
        event.submitter = self.submitter;
        event.timestamp = self.clock.load(Ordering::Relaxed);
        event.data_len = payload.len() as u32;
        event.data[..payload.len()].copy_from_slice(payload);
        match self.events.try_push(event) {
            Ok(()) => {
                metrics::inc_events_submitted();
                self.next_event_id += 1;
                Ok(event.id)
            }
            Err(_) => {
                metrics::inc_event_ring_full();
                Err(SubmitError::Backpressure)
            }
        }
    }

    /// Return the terminal response for `event_id` if it has arrived,
    /// consuming it. Non-terminal (InProgress) notes are kept visible
    /// through `status` until the terminal response lands.
    pub fn poll(&mut self, event_id: u64) -> Option<Response> {
        self.drain_responses();
        if self
            .pending
            .get(&event_id)
            .is_some_and(|resp| resp.is_terminal())
        {
            return self.pending.remove(&event_id);
        }
        None
    }

    /// Last observed status for an event, terminal or not.
    pub fn status(&mut self, event_id: u64) -> Option<EventStatus> {
        self.drain_responses();
        self.pending.get(&event_id).and_then(|resp| resp.status())
    }

    /// Responses drained but not yet claimed by `poll`.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn drain_responses(&mut self) {
        while let Some(resp) = self.responses.try_pop() {
            metrics::inc_responses_polled();
            match self.pending.get(&resp.event_id) {
                // A terminal response is never displaced.
                Some(existing) if existing.is_terminal() => {}
                _ => {
                    self.pending.insert(resp.event_id, resp);
                }
            }
        }
    }
}
