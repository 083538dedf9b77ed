//! In-process collaborators
//!
//! Channels, transports and an observer that keep everything in memory.
//! They let two sessions negotiate inside one process and record what the
//! engine asked of them.

use crate::domain::description::{Candidate, MediaKind};
use crate::domain::session::{
    ChannelManager, MediaChannel, NegotiationState, SessionObserver, Transport, VideoRenderer,
};
use crate::domain::shared::{SignalingError, TransportGroupId};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Media channel that only remembers its flags
pub struct LoopbackChannel {
    kind: MediaKind,
    group: TransportGroupId,
    enabled: AtomicBool,
    muted: AtomicBool,
    renderer: Mutex<Option<String>>,
}

impl LoopbackChannel {
    pub fn new(kind: MediaKind, group: TransportGroupId) -> Self {
        Self {
            kind,
            group,
            enabled: AtomicBool::new(false),
            muted: AtomicBool::new(false),
            renderer: Mutex::new(None),
        }
    }

    pub fn group(&self) -> TransportGroupId {
        self.group
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    pub fn renderer_name(&self) -> Option<String> {
        self.renderer.lock().ok().and_then(|r| r.clone())
    }
}

impl MediaChannel for LoopbackChannel {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn enable(&self, enabled: bool) {
        debug!("{} channel enabled={}", self.kind.as_str(), enabled);
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn mute(&self, muted: bool) {
        debug!("{} channel muted={}", self.kind.as_str(), muted);
        self.muted.store(muted, Ordering::SeqCst);
    }

    fn set_renderer(&self, stream_index: u32, renderer: Arc<dyn VideoRenderer>) {
        debug!("Renderer {} on stream {}", renderer.name(), stream_index);
        if let Ok(mut slot) = self.renderer.lock() {
            *slot = Some(renderer.name().to_string());
        }
    }
}

/// Hands out [`LoopbackChannel`]s and tracks which are still alive
#[derive(Default)]
pub struct InMemoryChannelManager {
    channels: Mutex<Vec<Arc<LoopbackChannel>>>,
    destroyed: AtomicUsize,
    refuse_video: bool,
}

impl InMemoryChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// A manager whose video channel creation always fails
    pub fn without_video() -> Self {
        Self {
            refuse_video: true,
            ..Self::default()
        }
    }

    /// Live channel of the given kind, if any
    pub fn channel(&self, kind: MediaKind) -> Option<Arc<LoopbackChannel>> {
        self.channels
            .lock()
            .ok()
            .and_then(|c| c.iter().find(|ch| ch.kind == kind).cloned())
    }

    pub fn live_count(&self) -> usize {
        self.channels.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn destroyed_count(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl ChannelManager for InMemoryChannelManager {
    fn create_channel(
        &self,
        kind: MediaKind,
        _rtcp_enabled: bool,
        group: TransportGroupId,
    ) -> Option<Arc<dyn MediaChannel>> {
        if kind == MediaKind::Video && self.refuse_video {
            return None;
        }

        let channel = Arc::new(LoopbackChannel::new(kind, group));
        self.channels.lock().ok()?.push(channel.clone());
        Some(channel)
    }

    fn destroy_channel(&self, channel: Arc<dyn MediaChannel>) {
        let kind = channel.kind();
        if let Ok(mut channels) = self.channels.lock() {
            channels.retain(|c| c.kind != kind);
        }
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Transport whose writability is flipped by the caller
pub struct LoopbackTransport {
    content_name: String,
    has_channels: AtomicBool,
    writable: AtomicBool,
    negotiated: AtomicBool,
    signaling_requests: AtomicUsize,
    remote_candidates: Mutex<Vec<Candidate>>,
}

impl LoopbackTransport {
    pub fn new(content_name: &str) -> Self {
        Self {
            content_name: content_name.to_string(),
            has_channels: AtomicBool::new(true),
            writable: AtomicBool::new(false),
            negotiated: AtomicBool::new(false),
            signaling_requests: AtomicUsize::new(0),
            remote_candidates: Mutex::new(Vec::new()),
        }
    }

    pub fn set_writable(&self, writable: bool) {
        self.writable.store(writable, Ordering::SeqCst);
    }

    pub fn set_has_channels(&self, has_channels: bool) {
        self.has_channels.store(has_channels, Ordering::SeqCst);
    }

    pub fn is_negotiated(&self) -> bool {
        self.negotiated.load(Ordering::SeqCst)
    }

    pub fn signaling_requests(&self) -> usize {
        self.signaling_requests.load(Ordering::SeqCst)
    }

    pub fn remote_candidates(&self) -> Vec<Candidate> {
        self.remote_candidates
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

impl Transport for LoopbackTransport {
    fn content_name(&self) -> String {
        self.content_name.clone()
    }

    fn has_channels(&self) -> bool {
        self.has_channels.load(Ordering::SeqCst)
    }

    fn writable(&self) -> bool {
        self.writable.load(Ordering::SeqCst)
    }

    fn on_signaling_ready(&self) {
        self.signaling_requests.fetch_add(1, Ordering::SeqCst);
    }

    fn complete_negotiation_if_needed(&self) {
        if !self.negotiated.swap(true, Ordering::SeqCst) {
            info!("{} transport negotiated", self.content_name);
        }
    }

    fn apply_remote_candidates(&self, candidates: Vec<Candidate>) {
        if let Ok(mut remote) = self.remote_candidates.lock() {
            remote.extend(candidates);
        }
    }
}

/// Observer callbacks as values
#[derive(Debug, Clone, PartialEq)]
pub enum ObserverEvent {
    CandidatesReady(Vec<Candidate>),
    Error(SignalingError),
    StateChanged(NegotiationState),
}

/// Forwards every observer callback into an unbounded channel
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ObserverEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ObserverEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: ObserverEvent) {
        // Receiver may have been dropped
        let _ = self.tx.send(event);
    }
}

impl SessionObserver for ChannelObserver {
    fn on_candidates_ready(&self, candidates: Vec<Candidate>) {
        self.forward(ObserverEvent::CandidatesReady(candidates));
    }

    fn on_error(&self, error: SignalingError) {
        self.forward(ObserverEvent::Error(error));
    }

    fn on_state_change(&self, state: NegotiationState) {
        self.forward(ObserverEvent::StateChanged(state));
    }
}

/// Renderer that only has a name
pub struct NamedRenderer {
    name: String,
}

impl NamedRenderer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl VideoRenderer for NamedRenderer {
    fn name(&self) -> &str {
        &self.name
    }
}
