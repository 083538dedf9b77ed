//! Collaborator ports
//!
//! Channels, transports, the channel manager and the description factory
//! live outside this core. The engine only sees them through these traits.

use crate::domain::description::{Candidate, MediaKind, MediaSessionOptions, SecurePolicy, SessionDescription};
use crate::domain::session::state::NegotiationState;
use crate::domain::shared::{SignalingError, TransportGroupId};
use std::fmt;
use std::sync::Arc;

/// Sink for decoded video frames
pub trait VideoRenderer: Send + Sync {
    fn name(&self) -> &str;
}

/// A media channel the engine enables and mutes but does not own
#[cfg_attr(test, mockall::automock)]
pub trait MediaChannel: Send + Sync {
    fn kind(&self) -> MediaKind;

    fn enable(&self, enabled: bool);

    fn mute(&self, muted: bool);

    fn set_renderer(&self, stream_index: u32, renderer: Arc<dyn VideoRenderer>);
}

/// Creates and destroys media channels
#[cfg_attr(test, mockall::automock)]
pub trait ChannelManager: Send + Sync {
    /// Channels created with the same group share one transport session
    fn create_channel(
        &self,
        kind: MediaKind,
        rtcp_enabled: bool,
        group: TransportGroupId,
    ) -> Option<Arc<dyn MediaChannel>>;

    fn destroy_channel(&self, channel: Arc<dyn MediaChannel>);
}

/// Transport endpoint for one media kind
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync {
    /// Content this transport serves ("audio", "video")
    fn content_name(&self) -> String;

    fn has_channels(&self) -> bool;

    fn writable(&self) -> bool;

    fn on_signaling_ready(&self);

    /// Completes negotiation if it has not completed yet; idempotent
    fn complete_negotiation_if_needed(&self);

    fn apply_remote_candidates(&self, candidates: Vec<Candidate>);
}

/// Outward callback surface of a session
#[cfg_attr(test, mockall::automock)]
pub trait SessionObserver: Send + Sync {
    /// Fired once, when the local candidate set is complete
    fn on_candidates_ready(&self, candidates: Vec<Candidate>);

    fn on_error(&self, error: SignalingError);

    fn on_state_change(&self, state: NegotiationState);
}

/// Builds offers and answers
pub trait DescriptionFactory: Send {
    fn create_offer(
        &self,
        options: &MediaSessionOptions,
        current_local: Option<&SessionDescription>,
    ) -> SessionDescription;

    /// `None` when no compatible answer can be built
    fn create_answer(
        &self,
        remote: Option<&SessionDescription>,
        options: &MediaSessionOptions,
        current_local: Option<&SessionDescription>,
    ) -> Option<SessionDescription>;

    /// Affects descriptions created after the call only
    fn set_secure_policy(&mut self, policy: SecurePolicy);
}

/// Events the transport layer delivers to a session
pub enum TransportEvent {
    RequestSignaling(Arc<dyn Transport>),
    Connecting(Arc<dyn Transport>),
    Writable(Arc<dyn Transport>),
    CandidatesReady(Arc<dyn Transport>, Vec<Candidate>),
    ChannelGone(Arc<dyn Transport>, String),
}

impl TransportEvent {
    pub fn transport(&self) -> &Arc<dyn Transport> {
        match self {
            TransportEvent::RequestSignaling(t)
            | TransportEvent::Connecting(t)
            | TransportEvent::Writable(t)
            | TransportEvent::CandidatesReady(t, _)
            | TransportEvent::ChannelGone(t, _) => t,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            TransportEvent::RequestSignaling(_) => "RequestSignaling",
            TransportEvent::Connecting(_) => "Connecting",
            TransportEvent::Writable(_) => "Writable",
            TransportEvent::CandidatesReady(_, _) => "CandidatesReady",
            TransportEvent::ChannelGone(_, _) => "ChannelGone",
        }
    }
}

impl fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct(self.label());
        out.field("transport", &self.transport().content_name());
        match self {
            TransportEvent::CandidatesReady(_, candidates) => {
                out.field("candidates", &candidates.len());
            }
            TransportEvent::ChannelGone(_, name) => {
                out.field("channel", name);
            }
            _ => {}
        }
        out.finish()
    }
}
