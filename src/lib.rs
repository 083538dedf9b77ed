//! Palaver - offer/answer session negotiation core
//!
//! Drives the offer/answer exchange for an audio/video session: installs
//! local and remote descriptions, aggregates transport candidates and
//! watches transports that fail to become writable in time.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use domain::shared::error::SignalingError;
pub use domain::shared::result::Result;
