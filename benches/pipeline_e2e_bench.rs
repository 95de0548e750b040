//! Benchmark: full pipeline (submit → route → deck → response → poll)
//! stepped inline, measuring sustained events per second.

use std::hint::black_box;
use std::time::{Duration, Instant};

use deckos::payload;
use deckos::record::EventType;
use deckos::system::{self, SystemConfig};

fn main() {
    const BATCH: u64 = 64;
    const TARGET_DURATION: Duration = Duration::from_secs(2);

    let (mut kernel, mut port) = system::build_with(SystemConfig::default());
    let alloc = payload::encode_memory_alloc(4096);
    let free_size = 4096u64;

    // Warm up: one full alloc/free cycle keeps the arena from filling.
    let mut cycle = |port: &mut deckos::userapi::UserPort,
                     kernel: &mut deckos::system::Kernel| {
        let mut ids = Vec::with_capacity(BATCH as usize);
        for _ in 0..BATCH {
            ids.push(port.submit(EventType::MemoryAlloc, 0, &alloc).unwrap());
        }
        kernel.drain();
        for id in ids {
            let resp = port.poll(id).expect("terminal response");
            let addr = u64::from_le_bytes(resp.result_bytes().try_into().unwrap());
            let free = payload::encode_memory_free(addr, free_size);
            let fid = port.submit(EventType::MemoryFree, 0, &free).unwrap();
            kernel.drain();
            let _ = black_box(port.poll(fid));
        }
    };

    for _ in 0..50 {
        cycle(&mut port, &mut kernel);
    }

    let start = Instant::now();
    let mut iterations: u64 = 0;
    while start.elapsed() < TARGET_DURATION {
        cycle(&mut port, &mut kernel);
        iterations += 1;
    }

    let elapsed = start.elapsed();
    // Each cycle round-trips BATCH allocs and BATCH frees.
    let total_events = iterations * BATCH * 2;
    eprintln!(
        "pipeline e2e: {} events in {:?} (sustained)",
        total_events, elapsed
    );
    eprintln!(
        "  {:.0} events/s ({:.2} us/event)",
        total_events as f64 / elapsed.as_secs_f64(),
        elapsed.as_micros() as f64 / total_events as f64
    );
}
