/// Caller options for building offers and answers
use crate::domain::description::media::MediaKind;
use serde::{Deserialize, Serialize};

/// Secure media policy applied by the description factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurePolicy {
    /// No crypto attributes are offered or accepted
    Disabled,
    /// Crypto is offered, and used in answers when the remote offers it
    Enabled,
    /// Crypto is mandatory; a remote section without it cannot be answered
    #[default]
    Required,
}

/// A local send stream the caller wants announced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOption {
    pub kind: MediaKind,
    pub label: String,
    pub cname: String,
}

impl StreamOption {
    pub fn new(kind: MediaKind, label: &str, cname: &str) -> Self {
        Self {
            kind,
            label: label.to_string(),
            cname: cname.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSessionOptions {
    pub has_audio: bool,
    pub has_video: bool,
    pub streams: Vec<StreamOption>,
}

impl MediaSessionOptions {
    /// Audio and video, no send streams
    pub fn audio_video() -> Self {
        Self {
            has_audio: true,
            has_video: true,
            streams: Vec::new(),
        }
    }

    pub fn with_stream(mut self, kind: MediaKind, label: &str, cname: &str) -> Self {
        self.streams.push(StreamOption::new(kind, label, cname));
        self
    }

    pub fn streams_of(&self, kind: MediaKind) -> impl Iterator<Item = &StreamOption> {
        self.streams.iter().filter(move |s| s.kind == kind)
    }
}

impl Default for MediaSessionOptions {
    fn default() -> Self {
        Self {
            has_audio: true,
            has_video: false,
            streams: Vec::new(),
        }
    }
}
