#![forbid(unsafe_code)]

//! Bounded connection pool with nesting-aware budgets.
//!
//! Capacity `N` is split into `max_nesting` segments of `S = N / max_nesting`
//! connections. A thread that already holds `k` connections acquires at
//! nesting level `k` and may only draw while fewer than
//! `N - (max_nesting - 1 - k) * S` connections are out. First-level callers
//! therefore can never drain the slots a nested acquisition needs to make
//! progress, and a thread nesting deeper than `max_nesting` is refused.

mod connection;
mod tracker;

pub use connection::json_contains;
pub use tracker::LeakReport;

use rusqlite::Connection;
use serde::Deserialize;
use std::backtrace::Backtrace;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::thread::JoinHandle;
use std::time::Duration;
use tracker::AllocationTracker;

const DEFAULT_MAX_CONNECTIONS: usize = 16;
const DEFAULT_MAX_NESTING: usize = 3;
const DEFAULT_POLL_INTERVAL_MS: u64 = 5;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_max_nesting")]
    pub max_nesting: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

const fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

const fn default_max_nesting() -> usize {
    DEFAULT_MAX_NESTING
}

const fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_nesting: default_max_nesting(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_nesting == 0 {
            return Err(PoolError::InvalidConfig("max_nesting must be at least 1"));
        }
        if self.max_connections < self.max_nesting {
            return Err(PoolError::InvalidConfig(
                "max_connections must be at least max_nesting",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(PoolError::InvalidConfig("poll_interval_ms must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("connection nesting too deep (thread already holds {depth} connections)")]
    NestingTooDeep { depth: usize },
    #[error("unable to open connection: {0}")]
    Open(#[from] rusqlite::Error),
    #[error("pool is closed")]
    Closed,
    #[error("invalid pool config: {0}")]
    InvalidConfig(&'static str),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolMetrics {
    pub capacity: usize,
    pub outstanding: usize,
    pub idle: usize,
    pub max_nesting: usize,
    pub segment_size: usize,
    pub acquired_total: u64,
    pub refused_total: u64,
    pub waits_total: u64,
}

#[derive(Default)]
struct PoolState {
    idle: Vec<Connection>,
    outstanding: usize,
}

#[derive(Default)]
struct Counters {
    acquired: AtomicU64,
    refused: AtomicU64,
    waits: AtomicU64,
}

pub struct ConnectionPool {
    db_path: PathBuf,
    busy_timeout: Duration,
    capacity: usize,
    max_nesting: usize,
    segment_size: usize,
    poll_interval: Duration,
    state: Mutex<PoolState>,
    released: Condvar,
    closed: AtomicBool,
    tracker: AllocationTracker,
    counters: Counters,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("db_path", &self.db_path)
            .field("capacity", &self.capacity)
            .field("max_nesting", &self.max_nesting)
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    pub fn open(
        db_path: impl AsRef<Path>,
        config: &PoolConfig,
        busy_timeout: Duration,
    ) -> Result<Arc<Self>, PoolError> {
        config.validate()?;
        let db_path = db_path.as_ref().to_path_buf();

        // fail early on an unusable path; the connection seeds the idle list
        let first = connection::open_connection(&db_path, busy_timeout)?;

        Ok(Arc::new(Self {
            db_path,
            busy_timeout,
            capacity: config.max_connections,
            max_nesting: config.max_nesting,
            segment_size: config.max_connections / config.max_nesting,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            state: Mutex::new(PoolState {
                idle: vec![first],
                outstanding: 0,
            }),
            released: Condvar::new(),
            closed: AtomicBool::new(false),
            tracker: AllocationTracker::default(),
            counters: Counters::default(),
        }))
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Live budget for a caller at nesting level `level`.
    pub fn budget(&self, level: usize) -> usize {
        let reserved = self.max_nesting.saturating_sub(1).saturating_sub(level);
        self.capacity.saturating_sub(reserved * self.segment_size)
    }

    /// Blocks until the calling thread's budget allows another connection.
    pub fn acquire(self: &Arc<Self>) -> Result<PooledConnection, PoolError> {
        let level = self.tracker.held_by_current_thread();
        if level >= self.max_nesting {
            self.counters.refused.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                depth = level,
                max_nesting = self.max_nesting,
                "refusing connection, nesting too deep:\n{}",
                Backtrace::force_capture()
            );
            return Err(PoolError::NestingTooDeep { depth: level });
        }

        let budget = self.budget(level);
        let mut waited = false;
        let reused = {
            let mut state = self.lock_state();
            loop {
                if self.closed.load(Ordering::Acquire) {
                    return Err(PoolError::Closed);
                }
                if state.outstanding < budget {
                    state.outstanding += 1;
                    break state.idle.pop();
                }
                if !waited {
                    waited = true;
                    self.counters.waits.fetch_add(1, Ordering::Relaxed);
                }
                state = match self.released.wait_timeout(state, self.poll_interval) {
                    Ok((guard, _)) => guard,
                    Err(poisoned) => poisoned.into_inner().0,
                };
            }
        };

        let conn = match reused {
            Some(conn) => conn,
            None => match connection::open_connection(&self.db_path, self.busy_timeout) {
                Ok(conn) => conn,
                Err(err) => {
                    self.lock_state().outstanding -= 1;
                    self.released.notify_one();
                    return Err(PoolError::Open(err));
                }
            },
        };

        let allocation_id = self.tracker.record();
        self.counters.acquired.fetch_add(1, Ordering::Relaxed);
        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(self),
            allocation_id,
        })
    }

    fn release(&self, conn: Connection, allocation_id: u64) {
        self.tracker.release(allocation_id);
        let mut state = self.lock_state();
        state.outstanding = state.outstanding.saturating_sub(1);
        // a connection left inside a transaction is not reusable
        if conn.is_autocommit() && !self.closed.load(Ordering::Acquire) {
            state.idle.push(conn);
        } else {
            tracing::debug!("discarding pooled connection");
        }
        drop(state);
        self.released.notify_one();
    }

    /// Connections held by threads that exited without returning them.
    pub fn scan_leaks(&self) -> Vec<LeakReport> {
        self.tracker.scan_leaks()
    }

    /// Runs [`ConnectionPool::scan_leaks`] every `interval` until the
    /// returned handle is dropped or the pool goes away.
    pub fn spawn_leak_monitor(self: &Arc<Self>, interval: Duration) -> LeakMonitor {
        let pool: Weak<Self> = Arc::downgrade(self);
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name("ld-pool-leak-monitor".to_string())
            .spawn(move || {
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let Some(pool) = pool.upgrade() else {
                        break;
                    };
                    pool.scan_leaks();
                }
            });
        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::warn!("unable to start leak monitor: {err}");
                None
            }
        };
        LeakMonitor {
            stop: Some(stop),
            handle,
        }
    }

    pub fn metrics(&self) -> PoolMetrics {
        let state = self.lock_state();
        PoolMetrics {
            capacity: self.capacity,
            outstanding: state.outstanding,
            idle: state.idle.len(),
            max_nesting: self.max_nesting,
            segment_size: self.segment_size,
            acquired_total: self.counters.acquired.load(Ordering::Relaxed),
            refused_total: self.counters.refused.load(Ordering::Relaxed),
            waits_total: self.counters.waits.load(Ordering::Relaxed),
        }
    }

    /// Drops idle connections and refuses further acquisitions.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.lock_state().idle.clear();
        self.released.notify_all();
    }
}

/// A checked-out connection, returned to its pool on drop.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<ConnectionPool>,
    allocation_id: u64,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
            .as_ref()
            .expect("pooled connection is present until drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn
            .as_mut()
            .expect("pooled connection is present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn, self.allocation_id);
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("allocation_id", &self.allocation_id)
            .finish_non_exhaustive()
    }
}

pub struct LeakMonitor {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for LeakMonitor {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
