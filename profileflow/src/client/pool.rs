//! Connection pool bookkeeping.
//!
//! Slots are bookkeeping records, not sockets: the transport owns the
//! wire. The pool enforces the process-wide cap, prefers reusing idle
//! slots per target, evicts slots idle past the keep-alive window (both
//! at checkout and from a background sweep), and counts reuse so the
//! behavior is observable.
//!
//! The bookkeeping lock is never held across an await point; capacity
//! waits happen on the semaphore, outside the lock.

use crate::config::PoolConfig;
use crate::errors::PipelineError;
use crate::metrics::PoolMetrics;
use crate::shutdown::ShutdownToken;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace};
use uuid::Uuid;

/// One reusable connection slot.
#[derive(Debug, Clone)]
pub struct PooledConnection {
    /// Slot identity, for tracing.
    pub id: Uuid,
    /// The upstream host this slot belongs to.
    pub target: String,
    /// When the slot was opened.
    pub created_at: Instant,
    /// When the slot last finished a request.
    pub last_used_at: Instant,
}

impl PooledConnection {
    fn new(target: &str) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            target: target.to_string(),
            created_at: now,
            last_used_at: now,
        }
    }

    fn is_idle_expired(&self, config: &PoolConfig) -> bool {
        self.last_used_at.elapsed() > config.keep_alive()
    }
}

/// A checked-out connection.
///
/// Holding a lease means holding one unit of pool capacity; the slot is
/// never visible to another caller until [`ConnectionPool::checkin`]
/// returns it. Dropping a lease without checkin releases capacity but
/// discards the slot.
#[derive(Debug)]
pub struct ConnectionLease {
    /// The slot itself.
    pub connection: PooledConnection,
    _permit: OwnedSemaphorePermit,
}

#[derive(Debug, Default)]
struct PoolState {
    idle: HashMap<String, Vec<PooledConnection>>,
    total: usize,
}

#[derive(Debug)]
struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
    capacity: Arc<Semaphore>,
    metrics: Arc<PoolMetrics>,
}

impl PoolInner {
    /// Picks or opens a slot. Called with a capacity permit in hand.
    fn take_slot(&self, target: &str) -> PooledConnection {
        let mut state = self.state.lock();
        let idle = state.idle.entry(target.to_string()).or_default();

        let before = idle.len();
        idle.retain(|conn| !conn.is_idle_expired(&self.config));
        let evicted = before - idle.len();
        let reusable = state.idle.get_mut(target).and_then(|idle| idle.pop());

        if evicted > 0 {
            state.total -= evicted;
            self.metrics
                .evicted
                .fetch_add(evicted as u64, Ordering::Relaxed);
            debug!(target, evicted, "evicted idle-expired connections at checkout");
        }

        if let Some(conn) = reusable {
            self.metrics.reused.fetch_add(1, Ordering::Relaxed);
            trace!(target, id = %conn.id, "reusing pooled connection");
            conn
        } else {
            state.total += 1;
            self.metrics.created.fetch_add(1, Ordering::Relaxed);
            let conn = PooledConnection::new(target);
            trace!(target, id = %conn.id, "opened new connection");
            conn
        }
    }

    fn sweep_idle(&self) {
        let mut state = self.state.lock();
        let mut evicted = 0usize;
        for idle in state.idle.values_mut() {
            let before = idle.len();
            idle.retain(|conn| !conn.is_idle_expired(&self.config));
            evicted += before - idle.len();
        }
        state.total -= evicted;
        if evicted > 0 {
            self.metrics
                .evicted
                .fetch_add(evicted as u64, Ordering::Relaxed);
            debug!(evicted, "idle sweep evicted connections");
        }
    }
}

/// The shared connection pool.
#[derive(Debug)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
    shutdown: ShutdownToken,
    sweeper: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ConnectionPool {
    /// Creates a pool; call [`ConnectionPool::start`] to run the sweep.
    #[must_use]
    pub fn new(config: PoolConfig, metrics: Arc<PoolMetrics>) -> Self {
        let capacity = Arc::new(Semaphore::new(config.max_connections));
        Self {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(PoolState::default()),
                capacity,
                metrics,
            }),
            shutdown: ShutdownToken::new(),
            sweeper: Mutex::new(None),
        }
    }

    /// The pool's metrics registry.
    #[must_use]
    pub fn metrics(&self) -> &Arc<PoolMetrics> {
        &self.inner.metrics
    }

    /// Starts the background idle sweep. Idempotent.
    pub fn start(&self) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let shutdown = self.shutdown.clone();
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.config.sweep_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = shutdown.wait() => break,
                    _ = ticker.tick() => inner.sweep_idle(),
                }
            }
        }));
    }

    /// Stops the background sweep and waits for it to exit.
    pub async fn stop(&self) {
        self.shutdown.trigger("pool stopped");
        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Checks out a slot for `target`.
    ///
    /// Waits for capacity up to the configured acquire timeout; beyond
    /// that the pool is exhausted and the error is fatal to the caller.
    /// Idle slots past the keep-alive window are discarded before reuse
    /// is considered — a stale slot is never handed out.
    pub async fn checkout(&self, target: &str) -> Result<ConnectionLease, PipelineError> {
        let permit = tokio::time::timeout(
            self.inner.config.acquire_timeout(),
            Arc::clone(&self.inner.capacity).acquire_owned(),
        )
        .await
        .map_err(|_| PipelineError::PoolExhausted {
            target: target.to_string(),
        })?
        .map_err(|_| PipelineError::PoolExhausted {
            target: target.to_string(),
        })?;

        Ok(ConnectionLease {
            connection: self.inner.take_slot(target),
            _permit: permit,
        })
    }

    /// Returns a slot to the idle set.
    pub fn checkin(&self, mut lease: ConnectionLease) {
        lease.connection.last_used_at = Instant::now();
        let mut state = self.inner.state.lock();
        state
            .idle
            .entry(lease.connection.target.clone())
            .or_default()
            .push(lease.connection);
        // Capacity is released when the lease's permit drops.
    }

    /// Discards a slot instead of returning it (broken transport, etc.).
    pub fn discard(&self, lease: ConnectionLease) {
        let mut state = self.inner.state.lock();
        state.total = state.total.saturating_sub(1);
        trace!(target = %lease.connection.target, "discarded connection");
    }

    /// Number of slots currently tracked (idle + checked out).
    #[must_use]
    pub fn total_connections(&self) -> usize {
        self.inner.state.lock().total
    }

    /// Number of idle slots across targets.
    #[must_use]
    pub fn idle_connections(&self) -> usize {
        self.inner.state.lock().idle.values().map(Vec::len).sum()
    }
}
