//! Shared value objects

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies the transport group a set of media channels share.
///
/// The video channel is created in the same group as the voice channel, so
/// both ride the same underlying transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransportGroupId(Uuid);

impl TransportGroupId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TransportGroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransportGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
