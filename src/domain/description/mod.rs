//! Session descriptions: media sections, candidates and the documents
//! exchanged during offer/answer

pub mod candidate;
pub mod codec;
pub mod document;
pub mod media;
pub mod options;

pub use candidate::{Candidate, CandidateCollection, CandidateType, TransportProtocol};
pub use codec::{ParsedSdp, SdpCodec};
pub use document::SessionDescriptionDocument;
pub use media::{
    ContentInfo, CryptoParams, MediaContentDescription, MediaDirection, MediaKind, RtpCodec,
    SdpType, SessionDescription, StreamParams,
};
pub use options::{MediaSessionOptions, SecurePolicy, StreamOption};
