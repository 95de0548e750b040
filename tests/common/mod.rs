#![allow(dead_code)]

use deckos::payload::Tag;
use deckos::record::{EventType, Response};
use deckos::system::{self, Kernel, SystemConfig};
use deckos::userapi::UserPort;

/// Small geometry so backpressure paths are reachable in tests.
pub fn small_system() -> (Kernel, UserPort) {
    system::build_with(SystemConfig {
        event_ring_capacity: 16,
        response_ring_capacity: 32,
        deck_fifo_capacity: 8,
        router_batch: 8,
        deck_batch: 8,
    })
}

pub fn tag(key: &[u8], value: &[u8]) -> Tag {
    Tag::new(key, value).unwrap()
}

/// Submit one event and step the kernel inline until its terminal
/// response arrives.
pub fn roundtrip(
    kernel: &mut Kernel,
    port: &mut UserPort,
    ty: EventType,
    payload: &[u8],
) -> Response {
    let id = port.submit(ty, 0, payload).expect("event ring full");
    step_until(kernel, port, id)
}

pub fn step_until(kernel: &mut Kernel, port: &mut UserPort, id: u64) -> Response {
    for _ in 0..1000 {
        kernel.step();
        if let Some(resp) = port.poll(id) {
            return resp;
        }
    }
    panic!("no terminal response for event {id}");
}

pub fn result_u64(resp: &Response) -> u64 {
    u64::from_le_bytes(resp.result_bytes().try_into().expect("u64 result"))
}
