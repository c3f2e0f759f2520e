#![forbid(unsafe_code)]

//! Per-thread bookkeeping of outstanding pooled connections.

use std::backtrace::Backtrace;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

static NEXT_THREAD_KEY: AtomicU64 = AtomicU64::new(1);

struct ThreadToken {
    key: u64,
    alive: Arc<AtomicBool>,
}

impl Drop for ThreadToken {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
    }
}

thread_local! {
    static THREAD_TOKEN: ThreadToken = ThreadToken {
        key: NEXT_THREAD_KEY.fetch_add(1, Ordering::Relaxed),
        alive: Arc::new(AtomicBool::new(true)),
    };
}

fn current_thread() -> (u64, Arc<AtomicBool>) {
    THREAD_TOKEN.with(|token| (token.key, Arc::clone(&token.alive)))
}

fn current_thread_key() -> u64 {
    THREAD_TOKEN.with(|token| token.key)
}

struct Allocation {
    thread_key: u64,
    thread_name: Option<String>,
    alive: Arc<AtomicBool>,
    acquired_at: Instant,
    backtrace: Backtrace,
    reported: bool,
}

/// A connection still checked out by a thread that has exited.
#[derive(Clone, Debug)]
pub struct LeakReport {
    pub allocation_id: u64,
    pub thread_name: Option<String>,
    pub held_for: Duration,
    pub backtrace: String,
}

#[derive(Default)]
pub(crate) struct AllocationTracker {
    next_id: AtomicU64,
    allocations: Mutex<HashMap<u64, Allocation>>,
}

impl AllocationTracker {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Allocation>> {
        self.allocations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Connections the calling thread currently holds, i.e. its nesting level.
    pub(crate) fn held_by_current_thread(&self) -> usize {
        let key = current_thread_key();
        self.lock()
            .values()
            .filter(|allocation| allocation.thread_key == key)
            .count()
    }

    pub(crate) fn record(&self) -> u64 {
        let (thread_key, alive) = current_thread();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let allocation = Allocation {
            thread_key,
            thread_name: std::thread::current().name().map(str::to_string),
            alive,
            acquired_at: Instant::now(),
            backtrace: Backtrace::capture(),
            reported: false,
        };
        self.lock().insert(id, allocation);
        id
    }

    pub(crate) fn release(&self, id: u64) {
        self.lock().remove(&id);
    }

    pub(crate) fn scan_leaks(&self) -> Vec<LeakReport> {
        let mut allocations = self.lock();
        let mut leaks = Vec::new();
        for (id, allocation) in allocations.iter_mut() {
            if allocation.alive.load(Ordering::Acquire) {
                continue;
            }
            let report = LeakReport {
                allocation_id: *id,
                thread_name: allocation.thread_name.clone(),
                held_for: allocation.acquired_at.elapsed(),
                backtrace: allocation.backtrace.to_string(),
            };
            if !allocation.reported {
                allocation.reported = true;
                tracing::warn!(
                    allocation_id = report.allocation_id,
                    thread = report.thread_name.as_deref().unwrap_or("<unnamed>"),
                    held_ms = u64::try_from(report.held_for.as_millis()).unwrap_or(u64::MAX),
                    "connection leaked by exited thread, acquired at:\n{}",
                    report.backtrace
                );
            }
            leaks.push(report);
        }
        leaks.sort_by_key(|report| report.allocation_id);
        leaks
    }
}
