//! Cross-thread exercise of the SPSC rings carrying real records, the
//! way the user and kernel sides actually share them.

use std::thread;

use deckos::record::{Event, EventType, Response};
use deckos::ring::{self, Backpressure};

#[test]
fn events_cross_the_boundary_in_order_with_intact_payloads() {
    const N: u64 = 20_000;
    let (mut tx, mut rx) = ring::channel(128, Event::factory);

    let producer = thread::spawn(move || {
        for id in 1..=N {
            let mut event = Event::factory();
            event.id = id;
            event.event_type = EventType::MemoryAlloc.into();
            event.data_len = 8;
            event.data[..8].copy_from_slice(&id.to_le_bytes());
            loop {
                match tx.try_push(event) {
                    Ok(()) => break,
                    Err(Backpressure) => std::hint::spin_loop(),
                }
            }
        }
    });

    let mut expected = 1u64;
    while expected <= N {
        if let Some(event) = rx.try_pop() {
            assert_eq!(event.id, expected);
            assert_eq!(event.payload(), &expected.to_le_bytes());
            expected += 1;
        } else {
            std::hint::spin_loop();
        }
    }
    producer.join().unwrap();

    let (head, tail) = rx.counters();
    assert_eq!(head, tail);
    assert_eq!(head, N);
}

#[test]
fn responses_flow_the_other_way() {
    const N: u64 = 5_000;
    let (mut tx, mut rx) = ring::channel(64, Response::factory);

    let kernel = thread::spawn(move || {
        for id in 1..=N {
            let resp = Response::success(id, id, &id.to_le_bytes());
            loop {
                match tx.try_push(resp) {
                    Ok(()) => break,
                    Err(Backpressure) => std::hint::spin_loop(),
                }
            }
        }
    });

    let mut seen = 0u64;
    while seen < N {
        if let Some(resp) = rx.try_pop() {
            seen += 1;
            assert_eq!(resp.event_id, seen);
            assert!(resp.is_terminal());
            assert_eq!(resp.result_bytes(), &seen.to_le_bytes());
        } else {
            std::hint::spin_loop();
        }
    }
    kernel.join().unwrap();
}

#[test]
fn occupancy_is_bounded_by_capacity_under_load() {
    const N: u64 = 10_000;
    let (mut tx, mut rx) = ring::channel(32, Event::factory);

    let producer = thread::spawn(move || {
        let mut pushed = 0u64;
        while pushed < N {
            let mut event = Event::factory();
            event.id = pushed + 1;
            if tx.try_push(event).is_ok() {
                pushed += 1;
            }
            assert!(tx.len() <= 32);
        }
    });

    let mut popped = 0u64;
    while popped < N {
        let (head, tail) = rx.counters();
        assert!(head - tail <= 32);
        if rx.try_pop().is_some() {
            popped += 1;
        }
    }
    producer.join().unwrap();
}
