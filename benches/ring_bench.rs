//! Benchmark: raw SPSC ring throughput with full-size event records,
//! single-threaded push/pop pairs and a cross-thread handoff.

use std::hint::black_box;
use std::time::{Duration, Instant};

use deckos::record::Event;
use deckos::ring;

const TARGET_DURATION: Duration = Duration::from_secs(2);

fn single_thread() {
    const RING_SIZE: usize = 1024;
    const BATCH: usize = 256;

    let (mut tx, mut rx) = ring::channel(RING_SIZE, Event::factory);
    let mut event = Event::factory();
    event.data_len = 64;

    // Warm up
    for _ in 0..10_000 {
        for _ in 0..BATCH {
            tx.try_push(event).unwrap();
        }
        while rx.try_pop().is_some() {}
    }

    let start = Instant::now();
    let mut iterations: u64 = 0;
    while start.elapsed() < TARGET_DURATION {
        for i in 0..BATCH {
            event.id = i as u64;
            let _ = black_box(tx.try_push(black_box(event)));
        }
        while let Some(popped) = rx.try_pop() {
            let _ = black_box(popped.id);
        }
        iterations += 1;
    }

    let elapsed = start.elapsed();
    let total = iterations * BATCH as u64;
    eprintln!("ring single-thread: {} transfers in {:?}", total, elapsed);
    eprintln!(
        "  {:.0} transfers/s ({:.1} ns/transfer)",
        total as f64 / elapsed.as_secs_f64(),
        elapsed.as_nanos() as f64 / total as f64
    );
}

fn cross_thread() {
    const RING_SIZE: usize = 1024;
    const N: u64 = 4_000_000;

    let (mut tx, mut rx) = ring::channel(RING_SIZE, Event::factory);
    let start = Instant::now();

    let producer = std::thread::spawn(move || {
        let mut event = Event::factory();
        event.data_len = 64;
        for id in 0..N {
            event.id = id;
            while tx.try_push(event).is_err() {
                std::hint::spin_loop();
            }
        }
    });

    let mut popped = 0u64;
    while popped < N {
        if let Some(event) = rx.try_pop() {
            let _ = black_box(event.id);
            popped += 1;
        } else {
            std::hint::spin_loop();
        }
    }
    producer.join().unwrap();

    let elapsed = start.elapsed();
    eprintln!("ring cross-thread: {} transfers in {:?}", N, elapsed);
    eprintln!(
        "  {:.0} transfers/s ({:.1} ns/transfer)",
        N as f64 / elapsed.as_secs_f64(),
        elapsed.as_nanos() as f64 / N as f64
    );
}

fn main() {
    single_thread();
    cross_thread();
}
