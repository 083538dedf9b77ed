//! Session domain events

use crate::domain::session::state::NegotiationState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub event_type: String,
}

impl EventMetadata {
    pub fn new(event_type: &str) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            event_type: event_type.to_string(),
        }
    }
}

/// Things that happened to a negotiation session, kept as an audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    StateChanged {
        metadata: EventMetadata,
        from: NegotiationState,
        to: NegotiationState,
    },
    LocalDescriptionInstalled {
        metadata: EventMetadata,
        sdp_type: String,
        session_version: String,
    },
    RemoteDescriptionInstalled {
        metadata: EventMetadata,
        sdp_type: String,
        candidates: usize,
    },
    CandidatesReady {
        metadata: EventMetadata,
        count: usize,
    },
    TransportTimedOut {
        metadata: EventMetadata,
        content_name: String,
    },
}

impl SessionEvent {
    pub fn state_changed(from: NegotiationState, to: NegotiationState) -> Self {
        SessionEvent::StateChanged {
            metadata: EventMetadata::new("session.state_changed"),
            from,
            to,
        }
    }

    pub fn local_description_installed(sdp_type: &str, session_version: &str) -> Self {
        SessionEvent::LocalDescriptionInstalled {
            metadata: EventMetadata::new("session.local_description_installed"),
            sdp_type: sdp_type.to_string(),
            session_version: session_version.to_string(),
        }
    }

    pub fn remote_description_installed(sdp_type: &str, candidates: usize) -> Self {
        SessionEvent::RemoteDescriptionInstalled {
            metadata: EventMetadata::new("session.remote_description_installed"),
            sdp_type: sdp_type.to_string(),
            candidates,
        }
    }

    pub fn candidates_ready(count: usize) -> Self {
        SessionEvent::CandidatesReady {
            metadata: EventMetadata::new("session.candidates_ready"),
            count,
        }
    }

    pub fn transport_timed_out(content_name: &str) -> Self {
        SessionEvent::TransportTimedOut {
            metadata: EventMetadata::new("session.transport_timed_out"),
            content_name: content_name.to_string(),
        }
    }

    pub fn metadata(&self) -> &EventMetadata {
        match self {
            SessionEvent::StateChanged { metadata, .. }
            | SessionEvent::LocalDescriptionInstalled { metadata, .. }
            | SessionEvent::RemoteDescriptionInstalled { metadata, .. }
            | SessionEvent::CandidatesReady { metadata, .. }
            | SessionEvent::TransportTimedOut { metadata, .. } => metadata,
        }
    }

    /// Returns the event type name
    pub fn event_type(&self) -> &str {
        &self.metadata().event_type
    }
}
