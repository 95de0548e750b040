//! Full pipeline integration: submit → event ring → router → deck →
//! response ring → poll, with the kernel stepped inline.

mod common;

use std::collections::BTreeMap;

use common::{result_u64, roundtrip, small_system, tag};
use deckos::decks::storage::codes as storage_codes;
use deckos::payload::{self, QueryOp};
use deckos::record::{EventStatus, EventType, PREFIX_OPERATIONS, PREFIX_STORAGE};
use deckos::userapi::SubmitError;

#[test]
fn memory_alloc_succeeds_and_counts() {
    let (mut kernel, mut port) = small_system();
    let resp = roundtrip(
        &mut kernel,
        &mut port,
        EventType::MemoryAlloc,
        &payload::encode_memory_alloc(4096),
    );
    assert_eq!(resp.status(), Some(EventStatus::Success));
    assert_ne!(result_u64(&resp), 0);
    let stats = kernel.deck_stats(PREFIX_STORAGE).unwrap();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.errors, 0);
    assert_eq!(stats.in_flight, 0);
}

#[test]
fn alloc_then_free_round_trip() {
    let (mut kernel, mut port) = small_system();
    let resp = roundtrip(
        &mut kernel,
        &mut port,
        EventType::MemoryAlloc,
        &payload::encode_memory_alloc(3 * 4096 + 1),
    );
    let addr = result_u64(&resp);
    let resp = roundtrip(
        &mut kernel,
        &mut port,
        EventType::MemoryFree,
        &payload::encode_memory_free(addr, 3 * 4096 + 1),
    );
    assert_eq!(resp.status(), Some(EventStatus::Success));
    // double free is a stable failure
    let resp = roundtrip(
        &mut kernel,
        &mut port,
        EventType::MemoryFree,
        &payload::encode_memory_free(addr, 3 * 4096 + 1),
    );
    assert_eq!(resp.status(), Some(EventStatus::Failure));
    assert_eq!(resp.result_code, storage_codes::FREE_FAILURE);
}

#[test]
fn tagged_create_is_queryable() {
    let (mut kernel, mut port) = small_system();
    let tags = [tag(b"name", b"a.txt"), tag(b"type", b"text")];
    let resp = roundtrip(
        &mut kernel,
        &mut port,
        EventType::FileCreateTagged,
        &payload::encode_create_tagged(&tags),
    );
    assert_eq!(resp.status(), Some(EventStatus::Success));
    let inode = result_u64(&resp);

    let resp = roundtrip(
        &mut kernel,
        &mut port,
        EventType::FileQuery,
        &payload::encode_query(QueryOp::And, &[tag(b"type", b"text")]),
    );
    let result = payload::decode_query_result(resp.result_bytes()).unwrap();
    assert_eq!(result.ids, vec![inode]);
    assert!(!result.truncated);
}

#[test]
fn and_query_over_disjoint_tags_is_empty_success() {
    let (mut kernel, mut port) = small_system();
    roundtrip(
        &mut kernel,
        &mut port,
        EventType::FileCreateTagged,
        &payload::encode_create_tagged(&[tag(b"type", b"text")]),
    );
    let resp = roundtrip(
        &mut kernel,
        &mut port,
        EventType::FileQuery,
        &payload::encode_query(
            QueryOp::And,
            &[tag(b"type", b"text"), tag(b"owner", b"root")],
        ),
    );
    assert_eq!(resp.status(), Some(EventStatus::Success));
    let result = payload::decode_query_result(resp.result_bytes()).unwrap();
    assert!(result.ids.is_empty());
}

#[test]
fn removing_a_missing_key_changes_nothing() {
    let (mut kernel, mut port) = small_system();
    let resp = roundtrip(
        &mut kernel,
        &mut port,
        EventType::FileCreateTagged,
        &payload::encode_create_tagged(&[tag(b"name", b"a.txt"), tag(b"type", b"text")]),
    );
    let inode = result_u64(&resp);

    let before = roundtrip(
        &mut kernel,
        &mut port,
        EventType::FileTagGet,
        &payload::encode_u64(inode),
    );
    let resp = roundtrip(
        &mut kernel,
        &mut port,
        EventType::FileTagRemove,
        &payload::encode_tag_remove(inode, b"missing"),
    );
    assert_eq!(resp.status(), Some(EventStatus::Success));
    let after = roundtrip(
        &mut kernel,
        &mut port,
        EventType::FileTagGet,
        &payload::encode_u64(inode),
    );
    assert_eq!(before.result_bytes(), after.result_bytes());
    let list = payload::decode_tag_list(after.result_bytes()).unwrap();
    assert_eq!(list.total, 2);
}

#[test]
fn full_event_ring_reports_backpressure_and_recovers() {
    let (mut kernel, mut port) = small_system();
    // Kernel never steps: the 16-slot event ring fills.
    let mut ids = Vec::new();
    loop {
        match port.submit(
            EventType::MemoryAlloc,
            0,
            &payload::encode_memory_alloc(4096),
        ) {
            Ok(id) => ids.push(id),
            Err(err) => {
                assert_eq!(err, SubmitError::Backpressure);
                break;
            }
        }
    }
    assert_eq!(ids.len(), 16);
    // Still refused until the router makes room.
    assert_eq!(
        port.submit(EventType::MemoryAlloc, 0, &payload::encode_memory_alloc(1)),
        Err(SubmitError::Backpressure)
    );
    // Once drained, every submitted event has exactly one terminal
    // response.
    for id in &ids {
        let resp = common::step_until(&mut kernel, &mut port, *id);
        assert_eq!(resp.status(), Some(EventStatus::Success));
        assert!(port.poll(*id).is_none());
    }
    assert!(port.submit(EventType::MemoryAlloc, 0, &payload::encode_memory_alloc(1)).is_ok());
}

#[test]
fn pids_are_monotonic_from_one() {
    let (mut kernel, mut port) = small_system();
    let mut last = 0u64;
    for i in 0..5u32 {
        let resp = roundtrip(
            &mut kernel,
            &mut port,
            EventType::ProcCreate,
            &payload::encode_proc_create(b"init", 0xDEAD + u64::from(i)),
        );
        assert_eq!(resp.status(), Some(EventStatus::Success));
        let pid = result_u64(&resp);
        assert!(pid >= 1);
        assert!(pid > last);
        last = pid;
    }
}

#[test]
fn file_io_through_the_pipeline() {
    let (mut kernel, mut port) = small_system();
    roundtrip(
        &mut kernel,
        &mut port,
        EventType::FileCreateTagged,
        &payload::encode_create_tagged(&[tag(b"name", b"notes.txt")]),
    );
    let resp = roundtrip(
        &mut kernel,
        &mut port,
        EventType::FileOpen,
        &payload::encode_path(b"notes.txt"),
    );
    let fd = result_u64(&resp) as u32;

    let resp = roundtrip(
        &mut kernel,
        &mut port,
        EventType::FileWrite,
        &payload::encode_file_write(fd, b"event driven"),
    );
    assert_eq!(result_u64(&resp), 12);

    // The write advanced the cursor; reopen to read from the start.
    roundtrip(&mut kernel, &mut port, EventType::FileClose, &payload::encode_fd(fd));
    let resp = roundtrip(
        &mut kernel,
        &mut port,
        EventType::FileOpen,
        &payload::encode_path(b"notes.txt"),
    );
    let fd2 = result_u64(&resp) as u32;
    assert!(fd2 > fd, "fds are monotonic, never reused");

    let resp = roundtrip(
        &mut kernel,
        &mut port,
        EventType::FileRead,
        &payload::encode_file_read(fd2, 1024),
    );
    assert_eq!(resp.result_bytes(), b"event driven");

    let resp = roundtrip(
        &mut kernel,
        &mut port,
        EventType::FileStat,
        &payload::encode_path(b"notes.txt"),
    );
    let stat = payload::decode_stat(resp.result_bytes()).unwrap();
    assert_eq!(stat.size, 12);
    assert_eq!(stat.tag_count, 1);

    // Reads on a closed fd fail with the stable code.
    let resp = roundtrip(
        &mut kernel,
        &mut port,
        EventType::FileRead,
        &payload::encode_file_read(fd, 8),
    );
    assert_eq!(resp.status(), Some(EventStatus::Failure));
    assert_eq!(resp.result_code, storage_codes::READ_FAILURE);
}

#[test]
fn malformed_payload_is_a_stable_failure() {
    let (mut kernel, mut port) = small_system();
    let resp = roundtrip(&mut kernel, &mut port, EventType::MemoryAlloc, &[1, 2, 3]);
    assert_eq!(resp.status(), Some(EventStatus::Failure));
    assert_eq!(resp.result_code, storage_codes::ALLOC_FAILURE);
    let stats = kernel.deck_stats(PREFIX_STORAGE).unwrap();
    assert_eq!(stats.errors, 1);
}

#[test]
fn mixed_traffic_gets_exactly_one_terminal_response_each() {
    let (mut kernel, mut port) = small_system();
    let mut submitted = Vec::new();
    for i in 0..6u64 {
        let (ty, data) = if i % 2 == 0 {
            (EventType::MemoryAlloc, payload::encode_memory_alloc(4096))
        } else {
            (
                EventType::ProcCreate,
                payload::encode_proc_create(b"worker", i),
            )
        };
        submitted.push(port.submit(ty, 0, &data).unwrap());
    }
    kernel.drain();
    let mut seen: BTreeMap<u64, u32> = BTreeMap::new();
    for id in &submitted {
        let resp = port.poll(*id).expect("terminal response");
        assert!(resp.is_terminal());
        *seen.entry(resp.event_id).or_default() += 1;
        assert!(port.poll(*id).is_none(), "terminal response consumed once");
    }
    assert_eq!(seen.len(), submitted.len());
    assert!(seen.values().all(|&n| n == 1));

    let storage = kernel.deck_stats(PREFIX_STORAGE).unwrap();
    let operations = kernel.deck_stats(PREFIX_OPERATIONS).unwrap();
    assert_eq!(storage.processed + storage.errors, 3);
    assert_eq!(operations.processed + operations.errors, 3);
}

#[test]
fn shutdown_drains_then_stops() {
    let (mut kernel, mut port) = small_system();
    let id = port
        .submit(
            EventType::MemoryAlloc,
            0,
            &payload::encode_memory_alloc(4096),
        )
        .unwrap();
    kernel.step();
    kernel.begin_shutdown();
    kernel.drain();
    assert!(kernel.is_stopped());
    let resp = port.poll(id).expect("drained before stopping");
    assert_eq!(resp.status(), Some(EventStatus::Success));
}
