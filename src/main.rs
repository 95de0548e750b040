use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use clap::{Parser, Subcommand};

use deckos::payload::{self, QueryOp, Tag};
use deckos::record::{EventStatus, EventType, PREFIX_OPERATIONS, PREFIX_STORAGE, Response};
use deckos::system::{self, Kernel};
use deckos::userapi::UserPort;

#[derive(Parser)]
#[command(about = "Event-driven kernel core: demo harness over the submit/poll boundary")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Narrated walk through the pipeline (default)
    Demo,
    /// Drive the end-to-end scenarios and assert every result
    Smoke,
}

/// Spin until the terminal response for `id` arrives. The kernel runs
/// on its own thread, so progress is guaranteed while it is alive.
fn wait_for(port: &mut UserPort, id: u64) -> Response {
    loop {
        if let Some(resp) = port.poll(id) {
            return resp;
        }
        std::hint::spin_loop();
    }
}

fn submit_and_wait(port: &mut UserPort, ty: EventType, data: &[u8]) -> Response {
    let id = port.submit(ty, 0, data).expect("event ring full");
    wait_for(port, id)
}

fn result_u64(resp: &Response) -> u64 {
    u64::from_le_bytes(resp.result_bytes().try_into().expect("u64 result"))
}

fn spawn_kernel(mut kernel: Kernel, stop: Arc<AtomicBool>) -> thread::JoinHandle<Kernel> {
    thread::Builder::new()
        .name("kernel".into())
        .spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                let report = kernel.step();
                if report.routed == 0 && report.processed == 0 {
                    thread::yield_now();
                }
            }
            kernel.begin_shutdown();
            while !kernel.is_stopped() {
                kernel.step();
            }
            kernel
        })
        .expect("failed to spawn kernel thread")
}

fn demo(port: &mut UserPort) {
    println!("== memory ==");
    let resp = submit_and_wait(port, EventType::MemoryAlloc, &payload::encode_memory_alloc(4096));
    let addr = result_u64(&resp);
    println!("  alloc 4096 -> {addr:#x}");
    let resp = submit_and_wait(
        port,
        EventType::MemoryFree,
        &payload::encode_memory_free(addr, 4096),
    );
    println!("  free {addr:#x} -> {:?}", resp.status().unwrap());

    println!("== tagged files ==");
    let tags = [
        Tag::new(b"name", b"a.txt").unwrap(),
        Tag::new(b"type", b"text").unwrap(),
    ];
    let resp = submit_and_wait(
        port,
        EventType::FileCreateTagged,
        &payload::encode_create_tagged(&tags),
    );
    let inode = result_u64(&resp);
    println!("  create (name=a.txt, type=text) -> inode {inode}");

    let logs = [
        Tag::new(b"name", b"boot.log").unwrap(),
        Tag::new(b"type", b"log").unwrap(),
    ];
    let resp = submit_and_wait(
        port,
        EventType::FileCreateTagged,
        &payload::encode_create_tagged(&logs),
    );
    println!("  create (name=boot.log, type=log) -> inode {}", result_u64(&resp));

    let query = payload::encode_query(QueryOp::And, &[Tag::new(b"type", b"text").unwrap()]);
    let resp = submit_and_wait(port, EventType::FileQuery, &query);
    let result = payload::decode_query_result(resp.result_bytes()).unwrap();
    println!("  query type=text -> {:?}", result.ids);

    let resp = submit_and_wait(
        port,
        EventType::FileTagAdd,
        &payload::encode_tag_add(inode, &Tag::new(b"owner", b"root").unwrap()),
    );
    println!("  tag add owner=root -> {:?}", resp.status().unwrap());
    let resp = submit_and_wait(port, EventType::FileTagGet, &payload::encode_u64(inode));
    let list = payload::decode_tag_list(resp.result_bytes()).unwrap();
    println!("  tag get -> {} tags ({} returned inline)", list.total, list.tags.len());

    println!("== file io ==");
    let resp = submit_and_wait(port, EventType::FileOpen, &payload::encode_path(b"a.txt"));
    let fd = result_u64(&resp) as u32;
    println!("  open a.txt -> fd {fd}");
    let resp = submit_and_wait(
        port,
        EventType::FileWrite,
        &payload::encode_file_write(fd, b"hello, deck"),
    );
    println!("  write -> {} bytes", result_u64(&resp));
    let resp = submit_and_wait(port, EventType::FileClose, &payload::encode_fd(fd));
    println!("  close -> {:?}", resp.status().unwrap());
    let resp = submit_and_wait(port, EventType::FileOpen, &payload::encode_path(b"a.txt"));
    let fd = result_u64(&resp) as u32;
    let resp = submit_and_wait(port, EventType::FileRead, &payload::encode_file_read(fd, 64));
    println!(
        "  read -> {:?}",
        String::from_utf8_lossy(resp.result_bytes())
    );
    let resp = submit_and_wait(port, EventType::FileStat, &payload::encode_path(b"a.txt"));
    let stat = payload::decode_stat(resp.result_bytes()).unwrap();
    println!(
        "  stat -> inode {} size {} blocks {} tags {}",
        stat.inode_id, stat.size, stat.block_count, stat.tag_count
    );

    println!("== processes ==");
    for name in [b"init".as_slice(), b"shell".as_slice(), b"logd".as_slice()] {
        let resp = submit_and_wait(
            port,
            EventType::ProcCreate,
            &payload::encode_proc_create(name, 0xDEAD_0000),
        );
        println!(
            "  create {} -> pid {}",
            String::from_utf8_lossy(name),
            result_u64(&resp)
        );
    }
    let resp = submit_and_wait(port, EventType::IpcPipeCreate, &[]);
    println!("  pipe create (stub) -> {:?}", resp.status().unwrap());
}

fn smoke(port: &mut UserPort) {
    // MEMORY_ALLOC returns a non-null address.
    let resp = submit_and_wait(port, EventType::MemoryAlloc, &payload::encode_memory_alloc(4096));
    assert_eq!(resp.status(), Some(EventStatus::Success));
    assert_ne!(result_u64(&resp), 0);

    // Tagged create is findable through an AND query.
    let tags = [
        Tag::new(b"name", b"a.txt").unwrap(),
        Tag::new(b"type", b"text").unwrap(),
    ];
    let resp = submit_and_wait(
        port,
        EventType::FileCreateTagged,
        &payload::encode_create_tagged(&tags),
    );
    assert_eq!(resp.status(), Some(EventStatus::Success));
    let inode = result_u64(&resp);
    let resp = submit_and_wait(
        port,
        EventType::FileQuery,
        &payload::encode_query(QueryOp::And, &[Tag::new(b"type", b"text").unwrap()]),
    );
    let result = payload::decode_query_result(resp.result_bytes()).unwrap();
    assert_eq!(result.ids, vec![inode]);

    // AND over disjoint tags is an empty success.
    let resp = submit_and_wait(
        port,
        EventType::FileQuery,
        &payload::encode_query(
            QueryOp::And,
            &[
                Tag::new(b"type", b"text").unwrap(),
                Tag::new(b"owner", b"root").unwrap(),
            ],
        ),
    );
    assert_eq!(resp.status(), Some(EventStatus::Success));
    assert!(payload::decode_query_result(resp.result_bytes())
        .unwrap()
        .ids
        .is_empty());

    // Removing a missing key succeeds and leaves the tag set alone.
    let before = submit_and_wait(port, EventType::FileTagGet, &payload::encode_u64(inode));
    let resp = submit_and_wait(
        port,
        EventType::FileTagRemove,
        &payload::encode_tag_remove(inode, b"missing"),
    );
    assert_eq!(resp.status(), Some(EventStatus::Success));
    let after = submit_and_wait(port, EventType::FileTagGet, &payload::encode_u64(inode));
    assert_eq!(before.result_bytes(), after.result_bytes());

    // Pids start at 1 and increase across creations.
    let mut last_pid = 0;
    for _ in 0..3 {
        let resp = submit_and_wait(
            port,
            EventType::ProcCreate,
            &payload::encode_proc_create(b"init", 0xDEAD),
        );
        assert_eq!(resp.status(), Some(EventStatus::Success));
        let pid = result_u64(&resp);
        assert!(pid > last_pid && pid >= 1);
        last_pid = pid;
    }

    println!("smoke: ok");
}

fn main() {
    env_logger::init();
    deckos::metrics::spawn_reporter();
    let args = Args::parse();

    let (kernel, mut port) = system::build();
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_kernel(kernel, Arc::clone(&stop));
    eprintln!("deckos: kernel thread up");

    match args.command.unwrap_or(Command::Demo) {
        Command::Demo => demo(&mut port),
        Command::Smoke => smoke(&mut port),
    }

    stop.store(true, Ordering::Relaxed);
    let kernel = handle.join().expect("kernel thread panicked");
    for prefix in [PREFIX_STORAGE, PREFIX_OPERATIONS] {
        if let (Some(deck), Some(stats)) = (kernel.deck(prefix), kernel.deck_stats(prefix)) {
            eprintln!(
                "deckos: deck {} processed={} errors={}",
                deck.name(),
                stats.processed,
                stats.errors
            );
        }
    }
}
