//! Deck framework: typed workers, each bound to a deck prefix, with a
//! deck-local routing FIFO and a service that processes entries in
//! bounded batches.
//!
//! The single-terminal-response rule is enforced by construction: a
//! service returns exactly one `Result` per entry and only the
//! framework publishes responses. When the response ring is full the
//! already-computed response is parked and re-published on the next
//! `run_once` — handlers are never re-run, so side effects happen once.

use std::collections::VecDeque;

use log::debug;

use crate::constants::RESPONSE_DATA_CAPACITY;
use crate::decks::operations::OperationsService;
use crate::decks::storage::StorageService;
use crate::metrics;
use crate::record::{Event, Response};
use crate::ring::RingProducer;

/// Deck-local copy of an event awaiting processing. Decks never share
/// routing entries.
#[derive(Clone, Copy, Debug)]
pub struct RoutingEntry {
    pub event: Event,
    pub enqueued_at: u64,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeckState {
    Created,
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DeckStats {
    pub processed: u64,
    pub errors: u64,
    pub in_flight: u64,
}

/// Successful handler output: the inline result bytes of the response.
pub struct Reply {
    bytes: Vec<u8>,
}

impl Reply {
    pub fn empty() -> Self {
        Self { bytes: Vec::new() }
    }

    pub fn bytes(bytes: Vec<u8>) -> Self {
        debug_assert!(bytes.len() <= RESPONSE_DATA_CAPACITY);
        Self { bytes }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

/// One `Result` per entry: `Ok` publishes Success with the reply,
/// `Err` publishes Failure with the deck's stable numeric code.
pub type ServiceResult = Result<Reply, u32>;

/// Tagged dispatch over the deck services; the set of decks is closed,
/// so no `dyn` indirection is needed.
pub enum DeckService {
    Storage(StorageService),
    Operations(OperationsService),
}

impl DeckService {
    pub fn name(&self) -> &'static str {
        match self {
            DeckService::Storage(_) => "storage",
            DeckService::Operations(_) => "operations",
        }
    }

    pub fn prefix(&self) -> u8 {
        match self {
            DeckService::Storage(_) => crate::record::PREFIX_STORAGE,
            DeckService::Operations(_) => crate::record::PREFIX_OPERATIONS,
        }
    }

    fn process(&mut self, entry: &RoutingEntry) -> ServiceResult {
        match self {
            DeckService::Storage(svc) => svc.process(entry),
            DeckService::Operations(svc) => svc.process(entry),
        }
    }

    pub fn as_storage(&self) -> Option<&StorageService> {
        match self {
            DeckService::Storage(svc) => Some(svc),
            _ => None,
        }
    }

    pub fn as_operations(&self) -> Option<&OperationsService> {
        match self {
            DeckService::Operations(svc) => Some(svc),
            _ => None,
        }
    }
}

pub struct Deck {
    service: DeckService,
    fifo: VecDeque<RoutingEntry>,
    capacity: usize,
    stats: DeckStats,
    state: DeckState,
    parked: Option<Response>,
}

impl Deck {
    pub fn new(service: DeckService, fifo_capacity: usize) -> Self {
        Self {
            service,
            fifo: VecDeque::with_capacity(fifo_capacity),
            capacity: fifo_capacity,
            stats: DeckStats::default(),
            state: DeckState::Created,
            parked: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.service.name()
    }

    pub fn prefix(&self) -> u8 {
        self.service.prefix()
    }

    pub fn state(&self) -> DeckState {
        self.state
    }

    pub fn stats(&self) -> DeckStats {
        self.stats
    }

    pub fn service(&self) -> &DeckService {
        &self.service
    }

    /// Whether the router may append another entry.
    pub fn can_accept(&self) -> bool {
        !matches!(self.state, DeckState::Draining | DeckState::Stopped)
            && self.fifo.len() < self.capacity
    }

    /// Append a routing entry. Caller checks `can_accept` first; a full
    /// or stopping deck refuses.
    pub fn route(&mut self, entry: RoutingEntry) -> Result<(), RoutingEntry> {
        if !self.can_accept() {
            return Err(entry);
        }
        self.fifo.push_back(entry);
        self.stats.in_flight += 1;
        Ok(())
    }

    /// Ask the deck to stop: it keeps processing what it already
    /// accepted, refuses new entries, and reaches Stopped once empty.
    pub fn begin_drain(&mut self) {
        if !matches!(self.state, DeckState::Stopped) {
            self.state = DeckState::Draining;
        }
    }

    /// One cooperative step: re-publish any parked response, then
    /// process up to `batch` entries. Returns entries processed.
    pub fn run_once(
        &mut self,
        responses: &mut RingProducer<Response>,
        now: u64,
        batch: usize,
    ) -> usize {
        if self.state == DeckState::Stopped {
            return 0;
        }
        if self.state == DeckState::Created {
            self.state = DeckState::Running;
        }
        if let Some(parked) = self.parked.take() {
            if responses.try_push(parked).is_err() {
                metrics::inc_response_ring_full();
                self.parked = Some(parked);
                return 0;
            }
            metrics::inc_responses_published();
        }
        let mut handled = 0;
        while handled < batch {
            let Some(entry) = self.fifo.pop_front() else {
                break;
            };
            self.stats.in_flight -= 1;
            let response = match self.service.process(&entry) {
                Ok(reply) => {
                    self.stats.processed += 1;
                    Response::success(entry.event.id, now, reply.as_slice())
                }
                Err(code) => {
                    self.stats.errors += 1;
                    debug!(
                        "deck {}: event {} failed with code {}",
                        self.name(),
                        entry.event.id,
                        code
                    );
                    Response::failure(entry.event.id, now, code)
                }
            };
            handled += 1;
            if responses.try_push(response).is_err() {
                metrics::inc_response_ring_full();
                self.parked = Some(response);
                break;
            }
            metrics::inc_responses_published();
        }
        if self.state == DeckState::Draining && self.fifo.is_empty() && self.parked.is_none() {
            self.state = DeckState::Stopped;
        }
        handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload;
    use crate::record::EventType;
    use crate::ring;

    fn entry(id: u64, ty: EventType, payload_bytes: &[u8]) -> RoutingEntry {
        let mut event = Event::factory();
        event.id = id;
        event.event_type = ty.into();
        event.data_len = payload_bytes.len() as u32;
        event.data[..payload_bytes.len()].copy_from_slice(payload_bytes);
        RoutingEntry {
            event,
            enqueued_at: 0,
            attempts: 0,
        }
    }

    #[test]
    fn state_machine_walks_created_running_draining_stopped() {
        let mut deck = Deck::new(DeckService::Storage(StorageService::new()), 4);
        let (mut resp_tx, _resp_rx) = ring::channel(8, Response::factory);
        assert_eq!(deck.state(), DeckState::Created);
        deck.run_once(&mut resp_tx, 1, 8);
        assert_eq!(deck.state(), DeckState::Running);
        deck.route(entry(
            1,
            EventType::MemoryAlloc,
            &payload::encode_memory_alloc(4096),
        ))
        .unwrap();
        deck.begin_drain();
        assert!(!deck.can_accept());
        deck.run_once(&mut resp_tx, 2, 8);
        assert_eq!(deck.state(), DeckState::Stopped);
        let stats = deck.stats();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.in_flight, 0);
    }

    #[test]
    fn processed_plus_errors_equals_dequeued() {
        let mut deck = Deck::new(DeckService::Storage(StorageService::new()), 8);
        let (mut resp_tx, mut resp_rx) = ring::channel(16, Response::factory);
        deck.route(entry(
            1,
            EventType::MemoryAlloc,
            &payload::encode_memory_alloc(4096),
        ))
        .unwrap();
        // malformed payload: fails inside the handler
        deck.route(entry(2, EventType::MemoryAlloc, &[1, 2])).unwrap();
        let handled = deck.run_once(&mut resp_tx, 1, 8);
        assert_eq!(handled, 2);
        let stats = deck.stats();
        assert_eq!(stats.processed + stats.errors, 2);
        assert_eq!(stats.errors, 1);
        let first = resp_rx.try_pop().unwrap();
        let second = resp_rx.try_pop().unwrap();
        assert_eq!(first.event_id, 1);
        assert_eq!(second.event_id, 2);
        assert!(first.is_terminal() && second.is_terminal());
    }

    #[test]
    fn full_response_ring_parks_exactly_one_reply() {
        let mut deck = Deck::new(DeckService::Storage(StorageService::new()), 8);
        let (mut resp_tx, mut resp_rx) = ring::channel(1, Response::factory);
        for id in 1..=3u64 {
            deck.route(entry(
                id,
                EventType::MemoryAlloc,
                &payload::encode_memory_alloc(4096),
            ))
            .unwrap();
        }
        // Ring holds one response; the second computed reply parks.
        assert_eq!(deck.run_once(&mut resp_tx, 1, 8), 2);
        assert_eq!(deck.stats().processed, 2);
        assert_eq!(resp_rx.try_pop().unwrap().event_id, 1);
        // Parked reply flushes first, then the remaining entry runs.
        assert_eq!(deck.run_once(&mut resp_tx, 2, 8), 1);
        assert_eq!(resp_rx.try_pop().unwrap().event_id, 2);
        assert_eq!(deck.run_once(&mut resp_tx, 3, 8), 0);
        assert_eq!(resp_rx.try_pop().unwrap().event_id, 3);
        assert_eq!(deck.stats().processed, 3);
    }

    #[test]
    fn fifo_capacity_refuses_and_returns_the_entry() {
        let mut deck = Deck::new(DeckService::Storage(StorageService::new()), 1);
        let e1 = entry(1, EventType::MemoryAlloc, &payload::encode_memory_alloc(1));
        let e2 = entry(2, EventType::MemoryAlloc, &payload::encode_memory_alloc(1));
        deck.route(e1).unwrap();
        assert!(!deck.can_accept());
        let back = deck.route(e2).unwrap_err();
        assert_eq!(back.event.id, 2);
        assert_eq!(deck.stats().in_flight, 1);
    }
}
