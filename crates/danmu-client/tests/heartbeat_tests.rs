//! Heartbeat Coordinator Tests (danmu-client)
//!
//! Tests for the shared timer: registration beats, periodic ticks and
//! the timer shutting itself down once nobody is registered.

use bytes::Bytes;
use danmu_client::{HeartbeatCoordinator, HeartbeatSink, Result};
use danmu_core::{codec, Operation, HEADER_SIZE, HEARTBEAT_PAYLOAD};
use danmu_test_utils::{wait_for, wait_for_count, DEFAULT_CHECK_INTERVAL, DEFAULT_TIMEOUT};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn counting_sink(counter: Arc<AtomicU32>) -> Arc<dyn HeartbeatSink> {
    Arc::new(move |_: &Bytes| -> Result<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

#[test]
fn test_cached_packet_is_heartbeat() {
    let coordinator = HeartbeatCoordinator::default();
    let packet = coordinator.packet();

    let decoded = codec::decode(packet).unwrap();
    assert_eq!(decoded.header.operation, Operation::Heartbeat);
    assert_eq!(&packet[HEADER_SIZE..], HEARTBEAT_PAYLOAD.as_bytes());
}

#[tokio::test]
async fn test_register_beats_immediately() {
    let coordinator = HeartbeatCoordinator::new(Duration::from_secs(3600));
    let counter = Arc::new(AtomicU32::new(0));

    let id = coordinator.register(counting_sink(counter.clone()));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(coordinator.is_running());

    assert!(coordinator.deregister(id));
    assert!(!coordinator.deregister(id));
    assert_eq!(coordinator.tick(), 0);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_timer_ticks_periodically() {
    let coordinator = HeartbeatCoordinator::new(Duration::from_millis(20));
    let a = Arc::new(AtomicU32::new(0));
    let b = Arc::new(AtomicU32::new(0));

    coordinator.register(counting_sink(a.clone()));
    coordinator.register(counting_sink(b.clone()));

    // One registration beat plus at least two timer ticks each
    assert!(wait_for_count(&a, 3, DEFAULT_TIMEOUT).await);
    assert!(wait_for_count(&b, 3, DEFAULT_TIMEOUT).await);
}

#[tokio::test]
async fn test_timer_stops_when_empty() {
    let coordinator = HeartbeatCoordinator::new(Duration::from_millis(20));
    let counter = Arc::new(AtomicU32::new(0));

    let id = coordinator.register(counting_sink(counter.clone()));
    assert!(wait_for_count(&counter, 2, DEFAULT_TIMEOUT).await);

    coordinator.deregister(id);
    assert!(
        wait_for(|| !coordinator.is_running(), DEFAULT_CHECK_INTERVAL, DEFAULT_TIMEOUT).await,
        "timer kept running with no sinks"
    );

    // Registering again restarts it
    coordinator.register(counting_sink(counter.clone()));
    assert!(coordinator.is_running());
}

#[tokio::test]
async fn test_sink_can_deregister_itself_during_tick() {
    let coordinator = HeartbeatCoordinator::new(Duration::from_secs(3600));
    let calls = Arc::new(AtomicU32::new(0));

    let slot: Arc<parking_lot::Mutex<Option<danmu_client::HeartbeatId>>> = Default::default();
    let sink = {
        let coordinator = coordinator.clone();
        let slot = slot.clone();
        let calls = calls.clone();
        Arc::new(move |_: &Bytes| -> Result<()> {
            if calls.fetch_add(1, Ordering::SeqCst) > 0 {
                if let Some(id) = slot.lock().take() {
                    coordinator.deregister(id);
                }
            }
            Ok(())
        })
    };

    let id = coordinator.register(sink);
    *slot.lock() = Some(id);

    assert_eq!(coordinator.tick(), 1);
    assert!(coordinator.is_empty());
    assert_eq!(coordinator.tick(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
