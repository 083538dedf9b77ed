//! Application layer - runs negotiation sessions
//!
//! Each session's engine lives on its own executor task and is driven
//! through a [`SessionHandle`].

pub mod executor;

pub use executor::{SessionExecutor, SessionHandle, SessionSnapshot, TransportEventSink};
