#[cfg(feature = "metrics")]
mod imp {
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;

    // Stall / backpressure (cumulative counts)
    static EVENT_RING_FULL: AtomicU64 = AtomicU64::new(0);
    static RESPONSE_RING_FULL: AtomicU64 = AtomicU64::new(0);
    static DECK_FIFO_FULL: AtomicU64 = AtomicU64::new(0);
    // Throughput (cumulative)
    static EVENTS_SUBMITTED: AtomicU64 = AtomicU64::new(0);
    static EVENTS_ROUTED: AtomicU64 = AtomicU64::new(0);
    static RESPONSES_PUBLISHED: AtomicU64 = AtomicU64::new(0);
    // Router outcomes
    static ROUTER_REJECTS: AtomicU64 = AtomicU64::new(0);
    static ROUTER_TIMEOUTS: AtomicU64 = AtomicU64::new(0);
    static ROUTER_RETRIES: AtomicU64 = AtomicU64::new(0);
    // Gauges
    static EVENT_OCC: AtomicUsize = AtomicUsize::new(0);
    static RESP_OCC: AtomicUsize = AtomicUsize::new(0);
    static EVENT_MAX_OCC: AtomicUsize = AtomicUsize::new(0);
    static RESP_MAX_OCC: AtomicUsize = AtomicUsize::new(0);

    #[derive(Clone, Copy)]
    pub struct MetricsSnapshot {
        pub event_ring_full: u64,
        pub response_ring_full: u64,
        pub deck_fifo_full: u64,
        pub events_submitted: u64,
        pub events_routed: u64,
        pub responses_published: u64,
        pub router_rejects: u64,
        pub router_timeouts: u64,
        pub router_retries: u64,
        pub event_occ: usize,
        pub resp_occ: usize,
        pub event_max_occ: usize,
        pub resp_max_occ: usize,
    }

    fn update_max(target: &AtomicUsize, value: usize) {
        let mut prev = target.load(Ordering::Relaxed);
        while value > prev {
            match target.compare_exchange_weak(prev, value, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => break,
                Err(next) => prev = next,
            }
        }
    }

    pub fn inc_event_ring_full() {
        EVENT_RING_FULL.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_response_ring_full() {
        RESPONSE_RING_FULL.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_deck_fifo_full() {
        DECK_FIFO_FULL.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_events_submitted() {
        EVENTS_SUBMITTED.fetch_add(1, Ordering::Relaxed);
        let v = EVENT_OCC.fetch_add(1, Ordering::Relaxed) + 1;
        update_max(&EVENT_MAX_OCC, v);
    }

    pub fn inc_events_routed() {
        EVENTS_ROUTED.fetch_add(1, Ordering::Relaxed);
        EVENT_OCC.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn inc_responses_published() {
        RESPONSES_PUBLISHED.fetch_add(1, Ordering::Relaxed);
        let v = RESP_OCC.fetch_add(1, Ordering::Relaxed) + 1;
        update_max(&RESP_MAX_OCC, v);
    }

    pub fn inc_responses_polled() {
        RESP_OCC.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn inc_router_rejects() {
        ROUTER_REJECTS.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_router_timeouts() {
        ROUTER_TIMEOUTS.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_router_retries() {
        ROUTER_RETRIES.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            event_ring_full: EVENT_RING_FULL.load(Ordering::Relaxed),
            response_ring_full: RESPONSE_RING_FULL.load(Ordering::Relaxed),
            deck_fifo_full: DECK_FIFO_FULL.load(Ordering::Relaxed),
            events_submitted: EVENTS_SUBMITTED.load(Ordering::Relaxed),
            events_routed: EVENTS_ROUTED.load(Ordering::Relaxed),
            responses_published: RESPONSES_PUBLISHED.load(Ordering::Relaxed),
            router_rejects: ROUTER_REJECTS.load(Ordering::Relaxed),
            router_timeouts: ROUTER_TIMEOUTS.load(Ordering::Relaxed),
            router_retries: ROUTER_RETRIES.load(Ordering::Relaxed),
            event_occ: EVENT_OCC.load(Ordering::Relaxed),
            resp_occ: RESP_OCC.load(Ordering::Relaxed),
            event_max_occ: EVENT_MAX_OCC.load(Ordering::Relaxed),
            resp_max_occ: RESP_MAX_OCC.load(Ordering::Relaxed),
        }
    }

    pub fn spawn_reporter() {
        const INTERVAL_SECS: u64 = 10;
        std::thread::spawn(|| {
            let mut last_snap = snapshot();
            loop {
                std::thread::sleep(Duration::from_secs(INTERVAL_SECS));
                let snap = snapshot();
                let submitted_d = snap
                    .events_submitted
                    .saturating_sub(last_snap.events_submitted);
                let routed_d = snap.events_routed.saturating_sub(last_snap.events_routed);
                let published_d = snap
                    .responses_published
                    .saturating_sub(last_snap.responses_published);
                let ev_full_d = snap.event_ring_full.saturating_sub(last_snap.event_ring_full);
                let resp_full_d = snap
                    .response_ring_full
                    .saturating_sub(last_snap.response_ring_full);
                let fifo_full_d = snap.deck_fifo_full.saturating_sub(last_snap.deck_fifo_full);
                println!(
                    "metrics delta {}s: submitted={} routed={} published={} | stalls: event_ring_full={} response_ring_full={} deck_fifo_full={} | router: rejects={} timeouts={} retries={} | gauges: event_occ={} resp_occ={} event_max={} resp_max={}",
                    INTERVAL_SECS,
                    submitted_d,
                    routed_d,
                    published_d,
                    ev_full_d,
                    resp_full_d,
                    fifo_full_d,
                    snap.router_rejects,
                    snap.router_timeouts,
                    snap.router_retries,
                    snap.event_occ,
                    snap.resp_occ,
                    snap.event_max_occ,
                    snap.resp_max_occ,
                );
                last_snap = snap;
            }
        });
    }
}

#[cfg(not(feature = "metrics"))]
#[allow(dead_code)]
mod imp {
    #[derive(Clone, Copy)]
    pub struct MetricsSnapshot {
        pub event_ring_full: u64,
        pub response_ring_full: u64,
        pub deck_fifo_full: u64,
        pub events_submitted: u64,
        pub events_routed: u64,
        pub responses_published: u64,
        pub router_rejects: u64,
        pub router_timeouts: u64,
        pub router_retries: u64,
        pub event_occ: usize,
        pub resp_occ: usize,
        pub event_max_occ: usize,
        pub resp_max_occ: usize,
    }

    pub fn inc_event_ring_full() {}
    pub fn inc_response_ring_full() {}
    pub fn inc_deck_fifo_full() {}
    pub fn inc_events_submitted() {}
    pub fn inc_events_routed() {}
    pub fn inc_responses_published() {}
    pub fn inc_responses_polled() {}
    pub fn inc_router_rejects() {}
    pub fn inc_router_timeouts() {}
    pub fn inc_router_retries() {}
    pub fn snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            event_ring_full: 0,
            response_ring_full: 0,
            deck_fifo_full: 0,
            events_submitted: 0,
            events_routed: 0,
            responses_published: 0,
            router_rejects: 0,
            router_timeouts: 0,
            router_retries: 0,
            event_occ: 0,
            resp_occ: 0,
            event_max_occ: 0,
            resp_max_occ: 0,
        }
    }
    pub fn spawn_reporter() {}
}

pub use imp::*;
