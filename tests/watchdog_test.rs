//! Transport watchdog driven through the executor

use palaver::application::{SessionExecutor, SessionHandle};
use palaver::config::SessionConfig;
use palaver::domain::session::TransportEvent;
use palaver::infrastructure::loopback::{
    ChannelObserver, InMemoryChannelManager, LoopbackTransport, ObserverEvent,
};
use palaver::infrastructure::media_factory::MediaSessionDescriptionFactory;
use palaver::SignalingError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn session(timeout_ms: u64) -> (SessionHandle, mpsc::UnboundedReceiver<ObserverEvent>) {
    let config = SessionConfig {
        call_setup_timeout_ms: timeout_ms,
        ..SessionConfig::default()
    };
    let (observer, events) = ChannelObserver::new();
    let (handle, _task) = SessionExecutor::spawn(
        &config,
        Box::new(MediaSessionDescriptionFactory::new()),
        Arc::new(InMemoryChannelManager::new()),
        Some(Arc::new(observer)),
    )
    .expect("Failed to spawn session");

    (handle, events)
}

async fn errors_within(
    events: &mut mpsc::UnboundedReceiver<ObserverEvent>,
    window: Duration,
) -> Vec<SignalingError> {
    let mut errors = Vec::new();
    let _ = tokio::time::timeout(window, async {
        while let Some(event) = events.recv().await {
            if let ObserverEvent::Error(err) = event {
                errors.push(err);
            }
        }
    })
    .await;
    errors
}

#[tokio::test]
async fn test_stuck_transport_raises_timeout_once() {
    let (handle, mut events) = session(40);
    let transport = Arc::new(LoopbackTransport::new("video"));

    handle
        .post_transport_event(TransportEvent::Connecting(transport.clone()))
        .unwrap();

    let errors = errors_within(&mut events, Duration::from_millis(250)).await;
    assert_eq!(errors, vec![SignalingError::TransportTimeout("video".to_string())]);
    assert_eq!(handle.snapshot().await.unwrap().pending_deadlines, 0);
}

#[tokio::test]
async fn test_writable_transport_disarms_deadline() {
    let (handle, mut events) = session(60);
    let transport = Arc::new(LoopbackTransport::new("audio"));

    handle
        .post_transport_event(TransportEvent::Connecting(transport.clone()))
        .unwrap();
    assert_eq!(handle.snapshot().await.unwrap().pending_deadlines, 1);

    transport.set_writable(true);
    handle
        .post_transport_event(TransportEvent::Writable(transport.clone()))
        .unwrap();
    assert_eq!(handle.snapshot().await.unwrap().pending_deadlines, 0);

    assert!(errors_within(&mut events, Duration::from_millis(200)).await.is_empty());
}

#[tokio::test]
async fn test_rearm_restarts_the_clock() {
    let (handle, mut events) = session(120);
    let transport = Arc::new(LoopbackTransport::new("audio"));

    handle
        .post_transport_event(TransportEvent::Connecting(transport.clone()))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    handle
        .post_transport_event(TransportEvent::Writable(transport.clone()))
        .unwrap();

    // The first deadline would have run out by now
    assert!(errors_within(&mut events, Duration::from_millis(80)).await.is_empty());

    let errors = errors_within(&mut events, Duration::from_millis(300)).await;
    assert_eq!(errors, vec![SignalingError::TransportTimeout("audio".to_string())]);
}

#[tokio::test]
async fn test_transport_without_channels_is_not_watched() {
    let (handle, mut events) = session(20);
    let transport = Arc::new(LoopbackTransport::new("audio"));
    transport.set_has_channels(false);

    handle
        .post_transport_event(TransportEvent::Connecting(transport))
        .unwrap();

    assert_eq!(handle.snapshot().await.unwrap().pending_deadlines, 0);
    assert!(errors_within(&mut events, Duration::from_millis(100)).await.is_empty());
}

#[tokio::test]
async fn test_terminate_cancels_pending_deadlines() {
    let (handle, mut events) = session(40);
    let transport = Arc::new(LoopbackTransport::new("video"));

    handle
        .post_transport_event(TransportEvent::Connecting(transport))
        .unwrap();
    handle.terminate().await.unwrap();

    assert!(errors_within(&mut events, Duration::from_millis(150)).await.is_empty());
}
