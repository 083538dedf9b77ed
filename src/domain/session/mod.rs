//! Session negotiation: the engine, its state machine, the candidate
//! aggregator, the transport watchdog and the collaborator ports

pub mod aggregator;
pub mod engine;
pub mod ports;
pub mod state;
pub mod watchdog;

pub use aggregator::{CandidateAggregator, ChannelRouting, PartitionedCandidates};
pub use engine::{MediaChannels, SessionNegotiationEngine};
pub use ports::{
    ChannelManager, DescriptionFactory, MediaChannel, SessionObserver, Transport, TransportEvent,
    VideoRenderer,
};
pub use state::NegotiationState;
pub use watchdog::{
    DeadlineElapsed, DeadlineHandle, DeadlineSink, TransportWatchdog, WatchdogState,
};
