//! Common test helpers and utilities for danmu tests
//!
//! This crate provides:
//! - Condition-based waiting (no hardcoded sleeps)
//! - An in-memory [`MockTransport`] whose peers are driven by the test
//! - A thread-safe [`Collector`] for callback observations

use async_trait::async_trait;
use bytes::Bytes;
use danmu_core::Host;
use danmu_transport::{
    Result as TransportResult, Transport, TransportError, TransportEvent, TransportReceiver,
    TransportSender,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Notify};
use tokio::time::timeout;

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(5);

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
pub async fn wait_for<F>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check() {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    check()
}

/// Wait for an atomic counter to reach a target value
pub async fn wait_for_count(counter: &AtomicU32, target: u32, max_wait: Duration) -> bool {
    wait_for(
        || counter.load(Ordering::SeqCst) >= target,
        DEFAULT_CHECK_INTERVAL,
        max_wait,
    )
    .await
}

/// Wait for a boolean flag to become true
pub async fn wait_for_flag(flag: &AtomicBool, max_wait: Duration) -> bool {
    wait_for(
        || flag.load(Ordering::SeqCst),
        DEFAULT_CHECK_INTERVAL,
        max_wait,
    )
    .await
}

/// Wait with notification - more efficient than polling
pub async fn wait_with_notify(notify: &Notify, max_wait: Duration) -> bool {
    timeout(max_wait, notify.notified()).await.is_ok()
}

// ============================================================================
// Mock Transport
// ============================================================================

/// Test-side handle to one connection made through [`MockTransport`]
#[derive(Clone)]
pub struct MockPeer {
    events: mpsc::UnboundedSender<TransportEvent>,
    sent: Arc<Mutex<Vec<Bytes>>>,
    connected: Arc<AtomicBool>,
    closes: Arc<AtomicU32>,
}

impl MockPeer {
    /// Signal that the transport opened
    pub fn open(&self) {
        let _ = self.events.send(TransportEvent::Connected);
    }

    /// Deliver one inbound packet batch
    pub fn deliver(&self, data: impl Into<Bytes>) {
        let _ = self.events.send(TransportEvent::Data(data.into()));
    }

    /// Signal a remote close
    pub fn disconnect(&self, reason: Option<&str>) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Disconnected {
            reason: reason.map(str::to_string),
        });
    }

    /// Signal a transport error
    pub fn error(&self, message: &str) {
        let _ = self.events.send(TransportEvent::Error(message.to_string()));
    }

    /// Everything the client sent on this connection
    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// How many times the client closed this connection
    pub fn close_count(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Sender half handed to the client
pub struct MockSender {
    sent: Arc<Mutex<Vec<Bytes>>>,
    connected: Arc<AtomicBool>,
    closes: Arc<AtomicU32>,
}

#[async_trait]
impl TransportSender for MockSender {
    async fn send(&self, data: Bytes) -> TransportResult<()> {
        self.try_send(data)
    }

    fn try_send(&self, data: Bytes) -> TransportResult<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.sent.lock().push(data);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> TransportResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Receiver half handed to the client
pub struct MockReceiver {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for MockReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

/// In-memory transport; every connect creates a [`MockPeer`]
#[derive(Clone, Default)]
pub struct MockTransport {
    peers: Arc<Mutex<Vec<MockPeer>>>,
    hosts: Arc<Mutex<Vec<Host>>>,
    refuse: Arc<AtomicBool>,
    auto_open: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit `Connected` as soon as a connection is made
    pub fn auto_open(self) -> Self {
        self.auto_open.store(true, Ordering::SeqCst);
        self
    }

    /// Make subsequent connects fail
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.peers.lock().len()
    }

    /// Hosts passed to each connect, in order
    pub fn hosts(&self) -> Vec<Host> {
        self.hosts.lock().clone()
    }

    pub fn peer(&self, index: usize) -> Option<MockPeer> {
        self.peers.lock().get(index).cloned()
    }

    pub fn last_peer(&self) -> Option<MockPeer> {
        self.peers.lock().last().cloned()
    }

    /// Wait until at least `n` connections were made and return the n-th
    pub async fn wait_for_peer(&self, n: usize) -> Option<MockPeer> {
        let ok = wait_for(
            || self.connect_count() >= n,
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT,
        )
        .await;
        if ok {
            self.peer(n - 1)
        } else {
            None
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Sender = MockSender;
    type Receiver = MockReceiver;

    async fn connect(&self, host: &Host) -> TransportResult<(MockSender, MockReceiver)> {
        self.hosts.lock().push(host.clone());
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed("refused".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let peer = MockPeer {
            events: tx,
            sent: Arc::new(Mutex::new(Vec::new())),
            connected: Arc::new(AtomicBool::new(true)),
            closes: Arc::new(AtomicU32::new(0)),
        };

        let sender = MockSender {
            sent: peer.sent.clone(),
            connected: peer.connected.clone(),
            closes: peer.closes.clone(),
        };

        if self.auto_open.load(Ordering::SeqCst) {
            peer.open();
        }
        self.peers.lock().push(peer);

        Ok((sender, MockReceiver { rx }))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

// ============================================================================
// Collector
// ============================================================================

/// Collector for callback observations with thread-safe access
#[derive(Clone)]
pub struct Collector<T> {
    values: Arc<Mutex<Vec<T>>>,
    count: Arc<AtomicU32>,
}

impl<T: Clone + Send + 'static> Collector<T> {
    pub fn new() -> Self {
        Self {
            values: Arc::new(Mutex::new(Vec::new())),
            count: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn push(&self, value: T) {
        self.values.lock().push(value);
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    /// Get the count of received values
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    /// Wait for at least n values to be received
    pub async fn wait_for_count(&self, n: u32, max_wait: Duration) -> bool {
        wait_for_count(&self.count, n, max_wait).await
    }

    /// Get all collected values
    pub fn values(&self) -> Vec<T> {
        self.values.lock().clone()
    }

    /// Get the last value received
    pub fn last(&self) -> Option<T> {
        self.values.lock().last().cloned()
    }

    /// Clear all collected values
    pub fn clear(&self) {
        self.values.lock().clear();
        self.count.store(0, Ordering::SeqCst);
    }
}

impl<T: Clone + Send + 'static> Default for Collector<T> {
    fn default() -> Self {
        Self::new()
    }
}
