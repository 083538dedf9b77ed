//! Domain layer - negotiation rules and the types they work on
//!
//! - `description`: session descriptions, candidates and documents
//! - `session`: the negotiation engine and its collaborator ports
//! - `shared`: errors, events and value objects

pub mod description;
pub mod session;
pub mod shared;

pub use shared::{Result, SignalingError};
