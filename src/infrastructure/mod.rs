//! Infrastructure layer - concrete collaborators
//!
//! - SDP text codec
//! - Offer/answer description factory
//! - In-memory channels and transports
//! - Metrics recording

pub mod loopback;
pub mod media_factory;
pub mod metrics;
pub mod sdp;
