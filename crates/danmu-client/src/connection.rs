//! Connection lifecycle
//!
//! A [`Connection`] drives one transport at a time through
//! connect → auth → receive → close and tells its subscribers about
//! each step. Every transport gets a generation number; signals from a
//! transport whose generation is no longer current are dropped, so a
//! superseded or closed transport cannot touch the connection.

use bytes::Bytes;
use danmu_core::{codec, AuthPayload, Command, Event, Header};
use danmu_transport::{Transport, TransportEvent, TransportReceiver, TransportSender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ConnectionConfig, HeartbeatPolicy};
use crate::error::{ClientError, Result};
use crate::heartbeat::{HeartbeatCoordinator, HeartbeatId, HeartbeatSink};
use crate::notify::{Notification, Subscribers, SubscriptionId, Topic};

/// Online count reported while not connected
pub const OFFLINE: i64 = -1;

/// Lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Built, not started
    Idle,
    /// Transport connect in flight
    Connecting,
    /// Transport open, auth sent
    Open,
    Closed,
}

struct State<S> {
    phase: ConnectionState,
    generation: u64,
    sender: Option<Arc<S>>,
    driver: Option<JoinHandle<()>>,
    has_data: bool,
    online: i64,
    heartbeat: Option<HeartbeatId>,
}

struct Inner<T: Transport> {
    config: ConnectionConfig,
    transport: Arc<T>,
    coordinator: HeartbeatCoordinator,
    subscribers: Subscribers,
    state: Mutex<State<T::Sender>>,
}

impl<T: Transport> Drop for Inner<T> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(id) = state.heartbeat.take() {
            self.coordinator.deregister(id);
        }
        if let Some(driver) = state.driver.take() {
            driver.abort();
        }
        if let Some(sender) = state.sender.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = sender.close().await;
                });
            }
        }
        debug!(room_id = self.config.room_id, "Connection dropped");
    }
}

/// A live-room connection
///
/// Cheap to clone; clones drive the same connection.
pub struct Connection<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for Connection<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Transport> Connection<T> {
    /// Build an idle connection; call [`Connection::start`] to connect
    pub fn new(
        config: ConnectionConfig,
        transport: T,
        coordinator: HeartbeatCoordinator,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                transport: Arc::new(transport),
                coordinator,
                subscribers: Subscribers::default(),
                state: Mutex::new(State {
                    phase: ConnectionState::Idle,
                    generation: 0,
                    sender: None,
                    driver: None,
                    has_data: false,
                    online: OFFLINE,
                    heartbeat: None,
                }),
            }),
        })
    }

    /// Begin connecting; a no-op unless the connection is idle
    pub fn start(&self) {
        if self.state() == ConnectionState::Idle {
            self.connect();
        }
    }

    /// Drop any current transport and connect a fresh one
    ///
    /// Must be called within a tokio runtime.
    pub fn connect(&self) {
        self.close();

        let generation = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            state.phase = ConnectionState::Connecting;
            state.has_data = false;
            state.generation
        };

        debug!(
            room_id = self.inner.config.room_id,
            generation, "Connecting via {}",
            self.inner.transport.name()
        );

        let driver = tokio::spawn(drive(Arc::downgrade(&self.inner), generation));

        let mut state = self.inner.state.lock();
        if state.generation == generation {
            state.driver = Some(driver);
        }
    }

    /// Tear down the transport; idempotent
    pub fn close(&self) {
        let (sender, driver, heartbeat) = {
            let mut state = self.inner.state.lock();
            if matches!(state.phase, ConnectionState::Idle | ConnectionState::Closed) {
                return;
            }
            state.generation += 1;
            state.phase = ConnectionState::Closed;
            state.online = OFFLINE;
            (state.sender.take(), state.driver.take(), state.heartbeat.take())
        };

        if let Some(id) = heartbeat {
            self.inner.coordinator.deregister(id);
        }
        if let Some(driver) = driver {
            driver.abort();
        }
        if let Some(sender) = sender {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = sender.close().await;
                });
            }
        }

        info!(room_id = self.inner.config.room_id, "Connection closed");
        self.inner.subscribers.emit(&Notification::Close);
    }

    /// Send raw bytes on the current transport; a no-op without one
    pub fn send(&self, data: Bytes) -> Result<()> {
        let sender = self.inner.state.lock().sender.clone();
        match sender {
            Some(sender) => sender.try_send(data).map_err(ClientError::from),
            None => {
                debug!(room_id = self.inner.config.room_id, "Send without transport ignored");
                Ok(())
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().phase
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Last reported online count, or [`OFFLINE`]
    pub fn online(&self) -> i64 {
        self.inner.state.lock().online
    }

    /// Whether the current transport delivered anything yet
    pub fn has_received_data(&self) -> bool {
        self.inner.state.lock().has_data
    }

    pub fn room_id(&self) -> u64 {
        self.inner.config.room_id
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn coordinator(&self) -> &HeartbeatCoordinator {
        &self.inner.coordinator
    }

    // ------------------------------------------------------------------
    // Subscribers
    // ------------------------------------------------------------------

    /// Subscribe to a topic
    pub fn on<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&Notification<'_>) + Send + Sync + 'static,
    {
        self.inner.subscribers.add(topic, Arc::new(handler))
    }

    pub fn on_open<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on(Topic::Open, move |_| handler())
    }

    pub fn on_close<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on(Topic::Close, move |_| handler())
    }

    pub fn on_buffer<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Bytes) + Send + Sync + 'static,
    {
        self.on(Topic::Buffer, move |n| {
            if let Notification::Buffer(data) = n {
                handler(data)
            }
        })
    }

    /// Every decoded event
    pub fn on_message<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Event, &Header) + Send + Sync + 'static,
    {
        self.on(Topic::Message, move |n| {
            if let Notification::Message { event, header } = n {
                handler(event, header)
            }
        })
    }

    /// Events with one command
    pub fn on_command<F>(&self, command: impl Into<Command>, handler: F) -> SubscriptionId
    where
        F: Fn(&Event, &Header) + Send + Sync + 'static,
    {
        self.on(Topic::Command(command.into()), move |n| {
            if let Notification::Command { event, header, .. } = n {
                handler(event, header)
            }
        })
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        self.inner.subscribers.remove(id)
    }

    // ------------------------------------------------------------------
    // Transport signals
    // ------------------------------------------------------------------

    fn is_current(&self, generation: u64) -> bool {
        self.inner.state.lock().generation == generation
    }

    /// Store the sender of a freshly connected transport
    fn install(&self, generation: u64, sender: Arc<T::Sender>) -> bool {
        let mut state = self.inner.state.lock();
        if state.generation != generation {
            return false;
        }
        state.sender = Some(sender);
        true
    }

    fn handle_open(&self, generation: u64) {
        let sender = {
            let mut state = self.inner.state.lock();
            if state.generation != generation {
                return;
            }
            state.phase = ConnectionState::Open;
            state.sender.clone()
        };

        let config = &self.inner.config;
        let auth = AuthPayload::new(config.room_id, config.protover, config.token.as_deref());
        if let Some(sender) = sender {
            if let Err(e) = sender.try_send(codec::auth_packet(&auth)) {
                warn!(room_id = config.room_id, "Auth send failed: {}", e);
            }
        }

        info!(room_id = config.room_id, "Connection open, auth sent");
        self.inner.subscribers.emit(&Notification::Open);

        if config.heartbeat_policy == HeartbeatPolicy::OnOpen {
            self.register_heartbeat(generation);
        }
    }

    fn handle_data(&self, generation: u64, data: Bytes) {
        let first = {
            let mut state = self.inner.state.lock();
            if state.generation != generation {
                return;
            }
            let first = !state.has_data;
            state.has_data = true;
            first
        };

        self.inner.subscribers.emit(&Notification::Buffer(&data));

        if !self.inner.config.buffer_only {
            self.dispatch(generation, &data);
        }

        if first {
            self.register_heartbeat(generation);
        }
    }

    fn dispatch(&self, generation: u64, data: &Bytes) {
        let room_id = self.inner.config.room_id;
        let packet = match codec::decode(data) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(room_id, "Dropping undecodable packet: {}", e);
                return;
            }
        };

        for failure in &packet.failures {
            warn!(room_id, "Dropping undecodable sub-packet: {}", failure);
        }

        let header = &packet.header;
        for event in &packet.events {
            if let Event::Heartbeat { online } = event {
                let mut state = self.inner.state.lock();
                if state.generation == generation {
                    state.online = i64::from(*online);
                }
            }

            self.inner
                .subscribers
                .emit(&Notification::Message { event, header });

            let command = event
                .command()
                .unwrap_or_else(|| Command::Other(header.operation.as_u32().to_string()));
            self.inner.subscribers.emit(&Notification::Command {
                command: &command,
                event,
                header,
            });
        }
    }

    fn register_heartbeat(&self, generation: u64) {
        {
            let state = self.inner.state.lock();
            if state.generation != generation || state.heartbeat.is_some() {
                return;
            }
        }

        // The coordinator beats the sink immediately, so the state lock
        // must not be held here
        let sink = Arc::new(ConnectionHeartbeat {
            inner: Arc::downgrade(&self.inner),
            generation,
            primed: AtomicBool::new(false),
        });
        let id = self.inner.coordinator.register(sink);

        let mut state = self.inner.state.lock();
        if state.generation == generation && state.heartbeat.is_none() {
            state.heartbeat = Some(id);
            debug!(room_id = self.inner.config.room_id, "Heartbeat registered");
        } else {
            drop(state);
            self.inner.coordinator.deregister(id);
        }
    }

    fn handle_transport_close(&self, generation: u64, reason: Option<String>) {
        let heartbeat = {
            let mut state = self.inner.state.lock();
            if state.generation != generation || state.phase == ConnectionState::Closed {
                return;
            }
            state.phase = ConnectionState::Closed;
            state.sender = None;
            state.driver = None;
            state.online = OFFLINE;
            state.heartbeat.take()
        };

        if let Some(id) = heartbeat {
            self.inner.coordinator.deregister(id);
        }

        info!(
            room_id = self.inner.config.room_id,
            "Transport closed: {}",
            reason.as_deref().unwrap_or("no reason")
        );
        self.inner.subscribers.emit(&Notification::Close);
    }
}

/// Drive one transport generation until it closes or is superseded
async fn drive<T: Transport>(weak: Weak<Inner<T>>, generation: u64) {
    // No strong reference to the connection across the connect
    let (transport, host) = match weak.upgrade() {
        Some(inner) => (inner.transport.clone(), inner.config.host.clone()),
        None => return,
    };
    let connected = transport.connect(&host).await;
    drop(transport);

    let (sender, mut receiver) = match connected {
        Ok(halves) => halves,
        Err(e) => {
            if let Some(inner) = weak.upgrade() {
                warn!(room_id = inner.config.room_id, "Connect failed: {}", e);
                Connection { inner }.handle_transport_close(generation, Some(e.to_string()));
            }
            return;
        }
    };

    let sender = Arc::new(sender);
    let installed = match weak.upgrade() {
        Some(inner) => Connection { inner }.install(generation, sender.clone()),
        None => false,
    };
    if !installed {
        debug!(generation, "Discarding superseded transport");
        let _ = sender.close().await;
        return;
    }
    drop(sender);

    while let Some(event) = receiver.recv().await {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let conn = Connection { inner };
        if !conn.is_current(generation) {
            return;
        }

        match event {
            TransportEvent::Connected => conn.handle_open(generation),
            TransportEvent::Data(data) => conn.handle_data(generation, data),
            TransportEvent::Error(e) => {
                conn.handle_transport_close(generation, Some(e));
                return;
            }
            TransportEvent::Disconnected { reason } => {
                conn.handle_transport_close(generation, reason);
                return;
            }
        }
    }

    if let Some(inner) = weak.upgrade() {
        Connection { inner }.handle_transport_close(generation, Some("event stream ended".into()));
    }
}

/// Heartbeat sink registered for one transport generation
///
/// The registration beat is always sent. On later ticks a connection
/// that never received data is closed instead. A sink that outlived its
/// transport does nothing.
struct ConnectionHeartbeat<T: Transport> {
    inner: Weak<Inner<T>>,
    generation: u64,
    primed: AtomicBool,
}

impl<T: Transport> HeartbeatSink for ConnectionHeartbeat<T> {
    fn beat(&self, packet: &Bytes) -> Result<()> {
        let inner = self.inner.upgrade().ok_or(ClientError::NotConnected)?;
        let conn = Connection { inner };

        let (has_data, sender) = {
            let state = conn.inner.state.lock();
            if state.generation != self.generation {
                return Ok(());
            }
            (state.has_data, state.sender.clone())
        };
        let was_primed = self.primed.swap(true, Ordering::SeqCst);

        if was_primed && !has_data {
            warn!(
                room_id = conn.inner.config.room_id,
                "No data received since open, closing silent connection"
            );
            conn.close();
            return Ok(());
        }

        let sender = sender.ok_or(ClientError::NotConnected)?;
        sender.try_send(packet.clone())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use danmu_core::Operation;
    use danmu_test_utils::{wait_for, MockTransport, DEFAULT_CHECK_INTERVAL, DEFAULT_TIMEOUT};
    use std::time::Duration;

    #[tokio::test]
    async fn test_sink_from_previous_transport_is_inert() {
        let coordinator = HeartbeatCoordinator::new(Duration::from_secs(3600));
        let transport = MockTransport::new().auto_open();
        let conn = Connection::new(
            ConnectionConfig::new(5440),
            transport.clone(),
            coordinator.clone(),
        )
        .unwrap();

        conn.start();
        let first = transport.wait_for_peer(1).await.unwrap();
        first.deliver(codec::encode(r#"{"cmd":"LIVE"}"#, Operation::Message));
        assert!(wait_for(|| coordinator.len() == 1, DEFAULT_CHECK_INTERVAL, DEFAULT_TIMEOUT).await);

        let old = ConnectionHeartbeat {
            inner: Arc::downgrade(&conn.inner),
            generation: conn.inner.state.lock().generation,
            primed: AtomicBool::new(true),
        };

        conn.connect();
        let second = transport.wait_for_peer(2).await.unwrap();
        assert!(
            wait_for(
                || conn.is_open() && second.sent_count() == 1,
                DEFAULT_CHECK_INTERVAL,
                DEFAULT_TIMEOUT
            )
            .await
        );

        // New transport has no data yet; the old sink must neither close
        // it nor send on it
        old.beat(coordinator.packet()).unwrap();
        assert!(conn.is_open());
        assert_eq!(second.sent_count(), 1);
        assert_eq!(second.close_count(), 0);
        conn.close();
    }
}
