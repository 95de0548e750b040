//! System assembly: both rings, the router, the decks, and the
//! cooperative main loop that advances them round-robin.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config;
use crate::deck::{Deck, DeckService, DeckState, DeckStats};
use crate::decks::operations::OperationsService;
use crate::decks::storage::StorageService;
use crate::record::{Event, Response};
use crate::ring::{self, RingConsumer, RingProducer};
use crate::router::Router;
use crate::userapi::UserPort;

#[derive(Debug, Clone, Copy)]
pub struct SystemConfig {
    pub event_ring_capacity: usize,
    pub response_ring_capacity: usize,
    pub deck_fifo_capacity: usize,
    pub router_batch: usize,
    pub deck_batch: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            event_ring_capacity: config::EVENT_RING_CAPACITY,
            response_ring_capacity: config::RESPONSE_RING_CAPACITY,
            deck_fifo_capacity: config::DECK_FIFO_CAPACITY,
            router_batch: config::ROUTER_BATCH,
            deck_batch: config::DECK_BATCH,
        }
    }
}

/// Outcome of one kernel step.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepReport {
    pub routed: usize,
    pub processed: usize,
}

/// Kernel side of the boundary: owns the event-ring consumer, the
/// response-ring producer, the router, and every deck.
pub struct Kernel {
    events: RingConsumer<Event>,
    responses: RingProducer<Response>,
    router: Router,
    decks: Vec<Deck>,
    clock: Arc<AtomicU64>,
    cfg: SystemConfig,
}

/// Build the full system with default sizing.
pub fn build() -> (Kernel, UserPort) {
    build_with(SystemConfig::default())
}

pub fn build_with(cfg: SystemConfig) -> (Kernel, UserPort) {
    let (event_tx, event_rx) = ring::channel(cfg.event_ring_capacity, Event::factory);
    let (resp_tx, resp_rx) = ring::channel(cfg.response_ring_capacity, Response::factory);
    let clock = Arc::new(AtomicU64::new(0));
    let decks = vec![
        Deck::new(
            DeckService::Storage(StorageService::new()),
            cfg.deck_fifo_capacity,
        ),
        Deck::new(
            DeckService::Operations(OperationsService::new()),
            cfg.deck_fifo_capacity,
        ),
    ];
    let kernel = Kernel {
        events: event_rx,
        responses: resp_tx,
        router: Router::new(),
        decks,
        clock: Arc::clone(&clock),
        cfg,
    };
    let port = UserPort::new(event_tx, resp_rx, clock, 1);
    (kernel, port)
}

impl Kernel {
    /// One cooperative round: advance the tick, run a router batch,
    /// then give every deck one bounded `run_once`.
    pub fn step(&mut self) -> StepReport {
        let now = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
        let routed = self.router.step(
            &mut self.events,
            &mut self.decks,
            &mut self.responses,
            now,
            self.cfg.router_batch,
        );
        let mut processed = 0;
        for deck in &mut self.decks {
            processed += deck.run_once(&mut self.responses, now, self.cfg.deck_batch);
        }
        StepReport { routed, processed }
    }

    /// Step until a round makes no progress. Returns steps taken.
    pub fn drain(&mut self) -> usize {
        let mut steps = 0;
        loop {
            let report = self.step();
            steps += 1;
            if report.routed == 0 && report.processed == 0 {
                return steps;
            }
        }
    }

    /// Move every deck towards Stopped; in-flight entries still finish.
    pub fn begin_shutdown(&mut self) {
        for deck in &mut self.decks {
            deck.begin_drain();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.decks
            .iter()
            .all(|deck| deck.state() == DeckState::Stopped)
    }

    pub fn now(&self) -> u64 {
        self.clock.load(Ordering::Relaxed)
    }

    pub fn deck(&self, prefix: u8) -> Option<&Deck> {
        self.decks.iter().find(|deck| deck.prefix() == prefix)
    }

    pub fn deck_stats(&self, prefix: u8) -> Option<DeckStats> {
        self.deck(prefix).map(|deck| deck.stats())
    }
}
