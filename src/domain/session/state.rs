//! Negotiation state machine

use serde::{Deserialize, Serialize};

/// Negotiation state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationState {
    /// Descriptions may be exchanged; channels are not enabled yet
    Init,
    /// Local offer considered sent
    OfferSent,
    /// Answer received, channels enabled
    AnswerReceived,
    /// Session torn down
    Terminated,
    /// Caller declared the session failed
    Failed,
}

impl NegotiationState {
    /// Check if state transition is valid
    pub fn can_transition_to(&self, next: NegotiationState) -> bool {
        use NegotiationState::*;

        match (self, next) {
            (Init, OfferSent) => true,
            (OfferSent, AnswerReceived) => true,

            (Init | OfferSent | AnswerReceived, Failed) => true,
            (Init | OfferSent | AnswerReceived | Failed, Terminated) => true,

            // Can't leave Terminated
            (Terminated, _) => false,

            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NegotiationState::Init => "init",
            NegotiationState::OfferSent => "offer_sent",
            NegotiationState::AnswerReceived => "answer_received",
            NegotiationState::Terminated => "terminated",
            NegotiationState::Failed => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::NegotiationState::*;
    use super::*;

    #[test]
    fn test_forward_path() {
        assert!(Init.can_transition_to(OfferSent));
        assert!(OfferSent.can_transition_to(AnswerReceived));
        assert!(!Init.can_transition_to(AnswerReceived));
        assert!(!AnswerReceived.can_transition_to(OfferSent));
    }

    #[test]
    fn test_terminal_states() {
        assert!(AnswerReceived.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Terminated));
        assert!(!Failed.can_transition_to(Init));
        assert!(!Terminated.can_transition_to(Failed));
        assert!(!Terminated.can_transition_to(Terminated));
    }
}
