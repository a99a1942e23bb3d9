// Global ordering stamp for presentation-bound events. Receivers use the
// seq to drop stale payloads that arrive out of order after a reconnect.

use std::sync::atomic::{AtomicU64, Ordering};

static EVENT_SEQ: AtomicU64 = AtomicU64::new(1);

pub fn next_event_seq() -> u64 {
    EVENT_SEQ.fetch_add(1, Ordering::Relaxed)
}
