//! Shared kernel - types used by every part of the signaling core

pub mod error;
pub mod events;
pub mod result;
pub mod value_objects;

pub use error::SignalingError;
pub use events::{EventMetadata, SessionEvent};
pub use result::Result;
pub use value_objects::TransportGroupId;
