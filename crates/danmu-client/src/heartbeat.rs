//! Shared heartbeat scheduling
//!
//! One [`HeartbeatCoordinator`] serves any number of connections with a
//! single timer. Ticks are aligned to the wall clock, so every
//! coordinator in a process fires on the same boundary regardless of
//! when it started, and the schedule does not drift.

use bytes::Bytes;
use danmu_core::codec;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;

/// Default heartbeat interval
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Ticks are aligned within this window
const ALIGNMENT_WINDOW_MS: u64 = 60_000;

/// Receives the shared heartbeat packet on every tick
pub trait HeartbeatSink: Send + Sync {
    fn beat(&self, packet: &Bytes) -> Result<()>;
}

impl<F> HeartbeatSink for F
where
    F: Fn(&Bytes) -> Result<()> + Send + Sync,
{
    fn beat(&self, packet: &Bytes) -> Result<()> {
        self(packet)
    }
}

/// Registration handle returned by [`HeartbeatCoordinator::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeartbeatId(u64);

/// Delay from `now_ms` to the next tick boundary
pub fn aligned_delay(now_ms: u64, interval: Duration) -> Duration {
    let interval_ms = (interval.as_millis() as u64).max(1);
    Duration::from_millis(interval_ms - (now_ms % ALIGNMENT_WINDOW_MS) % interval_ms)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

struct Inner {
    sinks: DashMap<u64, Arc<dyn HeartbeatSink>>,
    next_id: AtomicU64,
    interval_ms: AtomicU64,
    timer: Mutex<Option<JoinHandle<()>>>,
    packet: Bytes,
}

/// Sends one heartbeat packet to every registered sink per interval
///
/// Cheap to clone; clones share the registry and the timer.
#[derive(Clone)]
pub struct HeartbeatCoordinator {
    inner: Arc<Inner>,
}

impl Default for HeartbeatCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT_INTERVAL)
    }
}

impl HeartbeatCoordinator {
    pub fn new(interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                sinks: DashMap::new(),
                next_id: AtomicU64::new(1),
                interval_ms: AtomicU64::new((interval.as_millis() as u64).max(1)),
                timer: Mutex::new(None),
                packet: codec::heartbeat_packet(),
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.inner.interval_ms.load(Ordering::SeqCst))
    }

    /// Change the interval; applies from the next scheduled tick
    pub fn set_interval(&self, interval: Duration) {
        let ms = (interval.as_millis() as u64).max(1);
        self.inner.interval_ms.store(ms, Ordering::SeqCst);
        debug!("Heartbeat interval set to {}ms", ms);
    }

    /// The packet sent on every tick
    pub fn packet(&self) -> &Bytes {
        &self.inner.packet
    }

    /// Number of registered sinks
    pub fn len(&self) -> usize {
        self.inner.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.sinks.is_empty()
    }

    /// Whether the shared timer task is alive
    pub fn is_running(&self) -> bool {
        self.inner
            .timer
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Add a sink, send it one heartbeat right away and make sure the
    /// timer is running. Must be called within a tokio runtime.
    pub fn register(&self, sink: Arc<dyn HeartbeatSink>) -> HeartbeatId {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.sinks.insert(id, sink.clone());

        if let Err(e) = sink.beat(&self.inner.packet) {
            warn!("Initial heartbeat failed: {}", e);
        }

        self.ensure_timer();
        HeartbeatId(id)
    }

    /// Remove a sink; returns false if it was not registered
    pub fn deregister(&self, id: HeartbeatId) -> bool {
        self.inner.sinks.remove(&id.0).is_some()
    }

    /// Send the heartbeat to every sink once, in registration order;
    /// returns how many were called
    pub fn tick(&self) -> usize {
        tick(&self.inner)
    }

    fn ensure_timer(&self) {
        let mut timer = self.inner.timer.lock();
        if timer.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            return;
        }

        debug!("Starting heartbeat timer");
        let weak = Arc::downgrade(&self.inner);
        *timer = Some(tokio::spawn(run_timer(weak)));
    }
}

fn tick(inner: &Inner) -> usize {
    // Snapshot so sinks can deregister themselves while being called
    let mut sinks: Vec<(u64, Arc<dyn HeartbeatSink>)> = inner
        .sinks
        .iter()
        .map(|entry| (*entry.key(), entry.value().clone()))
        .collect();
    sinks.sort_by_key(|(id, _)| *id);

    for (_, sink) in &sinks {
        if let Err(e) = sink.beat(&inner.packet) {
            warn!("Heartbeat send failed: {}", e);
        }
    }

    sinks.len()
}

async fn run_timer(weak: Weak<Inner>) {
    loop {
        let delay = match weak.upgrade() {
            Some(inner) => {
                let interval = Duration::from_millis(inner.interval_ms.load(Ordering::SeqCst));
                aligned_delay(now_ms(), interval)
            }
            None => return,
        };

        tokio::time::sleep(delay).await;

        let Some(inner) = weak.upgrade() else {
            return;
        };

        {
            // Registration inserts before taking this lock, so an empty
            // registry here means nobody is waiting on this timer
            let mut timer = inner.timer.lock();
            if inner.sinks.is_empty() {
                debug!("No heartbeat sinks left, stopping timer");
                *timer = None;
                return;
            }
        }

        let sent = tick(&inner);
        debug!("Heartbeat sent to {} connection(s)", sent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientError;
    use std::sync::atomic::AtomicUsize;

    fn counting_sink(counter: Arc<AtomicUsize>) -> Arc<dyn HeartbeatSink> {
        Arc::new(move |_: &Bytes| -> Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_aligned_delay() {
        let interval = Duration::from_secs(30);
        assert_eq!(aligned_delay(0, interval), Duration::from_secs(30));
        assert_eq!(aligned_delay(1_000, interval), Duration::from_secs(29));
        assert_eq!(aligned_delay(31_000, interval), Duration::from_secs(29));
        assert_eq!(aligned_delay(60_000 * 7 + 45_500, interval), Duration::from_millis(14_500));
    }

    #[test]
    fn test_aligned_delay_converges() {
        // Two schedules started at different times meet on the same boundary
        let interval = Duration::from_secs(20);
        let a = 120_000 + 3_000;
        let b = 120_000 + 17_250;
        let next_a = a + aligned_delay(a, interval).as_millis() as u64;
        let next_b = b + aligned_delay(b, interval).as_millis() as u64;
        assert_eq!(next_a, next_b);
        assert_eq!(next_a % 20_000, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_sink_does_not_block_others() {
        let coordinator = HeartbeatCoordinator::new(Duration::from_secs(3600));
        let counter = Arc::new(AtomicUsize::new(0));

        coordinator.register(Arc::new(|_: &Bytes| -> Result<()> {
            Err(ClientError::NotConnected)
        }));
        coordinator.register(counting_sink(counter.clone()));
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        assert_eq!(coordinator.tick(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_interval() {
        let coordinator = HeartbeatCoordinator::default();
        assert_eq!(coordinator.interval(), DEFAULT_HEARTBEAT_INTERVAL);
        coordinator.set_interval(Duration::from_secs(45));
        assert_eq!(coordinator.interval(), Duration::from_secs(45));
        coordinator.set_interval(Duration::ZERO);
        assert_eq!(coordinator.interval(), Duration::from_millis(1));
    }
}
