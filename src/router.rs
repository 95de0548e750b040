//! Router: the sole consumer of the event ring.
//!
//! Each step dequeues a bounded batch, validates every event, drops
//! expired ones with a Timeout response, and copies the rest into the
//! routing FIFO of the deck whose prefix matches the event type's top
//! byte. The router never blocks and never panics on input: malformed
//! events become Failure responses.
//!
//! A backpressured event cannot literally be re-enqueued at the head of
//! an SPSC ring from the consumer side, so it is held in a one-slot
//! holdback that is always retried before new traffic — same ordering,
//! no second producer.

use log::warn;

use crate::config::{EVENT_TTL_TICKS, MAX_ROUTE_RETRIES};
use crate::constants::EVENT_DATA_CAPACITY;
use crate::deck::{Deck, RoutingEntry};
use crate::metrics;
use crate::record::{EVENT_FLAG_DEADLINE, Event, Response, codes};
use crate::ring::{RingConsumer, RingProducer};

/// What became of one event during a router step.
enum Disposition {
    Handled,
    HeldBack(RoutingEntry),
}

pub struct Router {
    holdback: Option<RoutingEntry>,
}

impl Router {
    pub fn new() -> Self {
        Self { holdback: None }
    }

    /// Route up to `batch` events. Returns the number of events given a
    /// disposition this step (routed, failed, or timed out); a held-back
    /// event does not count.
    pub fn step(
        &mut self,
        events: &mut RingConsumer<Event>,
        decks: &mut [Deck],
        responses: &mut RingProducer<Response>,
        now: u64,
        batch: usize,
    ) -> usize {
        let mut handled = 0;
        while handled < batch {
            let entry = match self.holdback.take() {
                Some(entry) => entry,
                None => match events.try_pop() {
                    Some(event) => {
                        metrics::inc_events_routed();
                        RoutingEntry {
                            event,
                            enqueued_at: now,
                            attempts: 0,
                        }
                    }
                    None => break,
                },
            };
            match self.dispatch(entry, decks, responses, now) {
                Disposition::Handled => handled += 1,
                Disposition::HeldBack(entry) => {
                    self.holdback = Some(entry);
                    // Stop the batch: later events must not overtake
                    // the held one (submission order is FIFO per
                    // producer).
                    break;
                }
            }
        }
        handled
    }

    fn dispatch(
        &mut self,
        mut entry: RoutingEntry,
        decks: &mut [Deck],
        responses: &mut RingProducer<Response>,
        now: u64,
    ) -> Disposition {
        let event = entry.event;

        if event.data_len as usize > EVENT_DATA_CAPACITY {
            warn!("router: event {} has invalid data_len {}", event.id, event.data_len);
            return self.publish_or_hold(
                entry,
                responses,
                Response::failure(event.id, now, codes::INVALID_PAYLOAD),
            );
        }

        if event.flags & EVENT_FLAG_DEADLINE != 0 && now > event.timestamp + EVENT_TTL_TICKS {
            metrics::inc_router_timeouts();
            return self.publish_or_hold(entry, responses, Response::timeout(event.id, now));
        }

        let Some(deck) = decks.iter_mut().find(|deck| deck.prefix() == event.prefix()) else {
            warn!(
                "router: event {} type {:#010x} matches no deck prefix",
                event.id, event.event_type
            );
            metrics::inc_router_rejects();
            return self.publish_or_hold(
                entry,
                responses,
                Response::failure(event.id, now, codes::UNKNOWN_TYPE),
            );
        };

        if !deck.can_accept() {
            metrics::inc_deck_fifo_full();
            entry.attempts += 1;
            if entry.attempts >= MAX_ROUTE_RETRIES {
                metrics::inc_router_rejects();
                return self.publish_or_hold(
                    entry,
                    responses,
                    Response::failure(event.id, now, codes::OVERLOADED),
                );
            }
            metrics::inc_router_retries();
            // Note the backpressure to the submitter, then retry the
            // event ahead of new traffic.
            if responses
                .try_push(Response::in_progress(event.id, now, codes::BACKPRESSURE))
                .is_ok()
            {
                metrics::inc_responses_published();
            } else {
                metrics::inc_response_ring_full();
            }
            return Disposition::HeldBack(entry);
        }

        match deck.route(entry) {
            Ok(()) => Disposition::Handled,
            // can_accept was just checked; a refusal here means the
            // deck started draining between the check and the push.
            Err(entry) => Disposition::HeldBack(entry),
        }
    }

    /// Publish a response for an event that will not be routed. If the
    /// response ring is full the event is held back and re-judged next
    /// step instead of losing its response.
    fn publish_or_hold(
        &mut self,
        entry: RoutingEntry,
        responses: &mut RingProducer<Response>,
        response: Response,
    ) -> Disposition {
        match responses.try_push(response) {
            Ok(()) => {
                metrics::inc_responses_published();
                Disposition::Handled
            }
            Err(_) => {
                metrics::inc_response_ring_full();
                Disposition::HeldBack(entry)
            }
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::{DeckService, DeckState};
    use crate::decks::operations::OperationsService;
    use crate::decks::storage::StorageService;
    use crate::payload;
    use crate::record::{EventStatus, EventType};
    use crate::ring;

    fn make_event(id: u64, ty: u32, payload_bytes: &[u8]) -> Event {
        let mut event = Event::factory();
        event.id = id;
        event.event_type = ty;
        event.data_len = payload_bytes.len() as u32;
        event.data[..payload_bytes.len()].copy_from_slice(payload_bytes);
        event
    }

    fn harness() -> (
        crate::ring::RingProducer<Event>,
        crate::ring::RingConsumer<Event>,
        crate::ring::RingProducer<Response>,
        crate::ring::RingConsumer<Response>,
        Vec<Deck>,
        Router,
    ) {
        let (event_tx, event_rx) = ring::channel(16, Event::factory);
        let (resp_tx, resp_rx) = ring::channel(16, Response::factory);
        let decks = vec![
            Deck::new(DeckService::Storage(StorageService::new()), 2),
            Deck::new(DeckService::Operations(OperationsService::new()), 2),
        ];
        (event_tx, event_rx, resp_tx, resp_rx, decks, Router::new())
    }

    #[test]
    fn unknown_prefix_fails_immediately() {
        let (mut event_tx, mut event_rx, mut resp_tx, mut resp_rx, mut decks, mut router) =
            harness();
        event_tx
            .try_push(make_event(7, 0x7F00_0001, &[]))
            .unwrap();
        assert_eq!(router.step(&mut event_rx, &mut decks, &mut resp_tx, 1, 8), 1);
        let resp = resp_rx.try_pop().unwrap();
        assert_eq!(resp.event_id, 7);
        assert_eq!(resp.status(), Some(EventStatus::Failure));
        assert_eq!(resp.result_code, codes::UNKNOWN_TYPE);
    }

    #[test]
    fn unknown_subtype_with_valid_prefix_reaches_the_deck() {
        let (mut event_tx, mut event_rx, mut resp_tx, mut resp_rx, mut decks, mut router) =
            harness();
        // Storage prefix, but a subtype no deck knows.
        event_tx
            .try_push(make_event(4, 0x0100_00FF, &[]))
            .unwrap();
        assert_eq!(router.step(&mut event_rx, &mut decks, &mut resp_tx, 1, 8), 1);
        decks[0].run_once(&mut resp_tx, 2, 8);
        let resp = resp_rx.try_pop().unwrap();
        assert_eq!(resp.event_id, 4);
        assert_eq!(resp.status(), Some(EventStatus::Failure));
        assert_eq!(
            resp.result_code,
            crate::decks::storage::codes::UNKNOWN_TYPE
        );
    }

    #[test]
    fn expired_event_is_dropped_with_timeout() {
        let (mut event_tx, mut event_rx, mut resp_tx, mut resp_rx, mut decks, mut router) =
            harness();
        let mut event = make_event(
            1,
            EventType::MemoryAlloc.into(),
            &payload::encode_memory_alloc(4096),
        );
        event.flags = crate::record::EVENT_FLAG_DEADLINE;
        event.timestamp = 0;
        event_tx.try_push(event).unwrap();
        let now = crate::config::EVENT_TTL_TICKS + 1;
        router.step(&mut event_rx, &mut decks, &mut resp_tx, now, 8);
        let resp = resp_rx.try_pop().unwrap();
        assert_eq!(resp.status(), Some(EventStatus::Timeout));
        // nothing reached the storage deck
        assert_eq!(decks[0].stats().in_flight, 0);
    }

    #[test]
    fn backpressure_retries_then_overloads() {
        let (mut event_tx, mut event_rx, mut resp_tx, mut resp_rx, mut decks, mut router) =
            harness();
        // Deck FIFO capacity is 2: the third event backpressures.
        for id in 1..=3u64 {
            event_tx
                .try_push(make_event(
                    id,
                    EventType::MemoryAlloc.into(),
                    &payload::encode_memory_alloc(4096),
                ))
                .unwrap();
        }
        // Decks never run, so the FIFO never drains.
        assert_eq!(router.step(&mut event_rx, &mut decks, &mut resp_tx, 1, 8), 2);
        // retry 1 and 2: InProgress notes, event held back
        assert_eq!(router.step(&mut event_rx, &mut decks, &mut resp_tx, 2, 8), 0);
        assert_eq!(router.step(&mut event_rx, &mut decks, &mut resp_tx, 3, 8), 1);
        let mut statuses = Vec::new();
        while let Some(resp) = resp_rx.try_pop() {
            if resp.event_id == 3 {
                statuses.push((resp.status().unwrap(), resp.result_code));
            }
        }
        assert_eq!(
            statuses,
            vec![
                (EventStatus::InProgress, codes::BACKPRESSURE),
                (EventStatus::InProgress, codes::BACKPRESSURE),
                (EventStatus::Failure, codes::OVERLOADED),
            ]
        );
    }

    #[test]
    fn draining_deck_refuses_traffic() {
        let (mut event_tx, mut event_rx, mut resp_tx, mut resp_rx, mut decks, mut router) =
            harness();
        decks[0].begin_drain();
        event_tx
            .try_push(make_event(
                1,
                EventType::MemoryAlloc.into(),
                &payload::encode_memory_alloc(4096),
            ))
            .unwrap();
        // held back, retried, and finally rejected as Overloaded
        for now in 1..=3u64 {
            router.step(&mut event_rx, &mut decks, &mut resp_tx, now, 8);
        }
        let mut last = None;
        while let Some(resp) = resp_rx.try_pop() {
            last = Some(resp);
        }
        let last = last.unwrap();
        assert_eq!(last.status(), Some(EventStatus::Failure));
        assert_eq!(last.result_code, codes::OVERLOADED);
        assert_eq!(decks[0].state(), DeckState::Draining);
    }
}
