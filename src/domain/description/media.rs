/// Structured session description: ordered media sections (contents)
use crate::domain::description::candidate::Candidate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Role a description plays in the offer/answer exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

impl SdpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
            SdpType::Pranswer => "pranswer",
            SdpType::Rollback => "rollback",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "offer" => Some(SdpType::Offer),
            "answer" => Some(SdpType::Answer),
            "pranswer" => Some(SdpType::Pranswer),
            "rollback" => Some(SdpType::Rollback),
            _ => None,
        }
    }
}

/// Media direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaDirection {
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

impl MediaDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaDirection::SendRecv => "sendrecv",
            MediaDirection::SendOnly => "sendonly",
            MediaDirection::RecvOnly => "recvonly",
            MediaDirection::Inactive => "inactive",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "sendrecv" => Some(MediaDirection::SendRecv),
            "sendonly" => Some(MediaDirection::SendOnly),
            "recvonly" => Some(MediaDirection::RecvOnly),
            "inactive" => Some(MediaDirection::Inactive),
            _ => None,
        }
    }
}

/// Media kind of a content section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
    Application,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Application => "application",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "audio" => Some(MediaKind::Audio),
            "video" => Some(MediaKind::Video),
            "application" => Some(MediaKind::Application),
            _ => None,
        }
    }

    /// Name of the transport channel carrying `component` (1 = RTP, 2 = RTCP)
    pub fn channel_name(&self, component: u16) -> &'static str {
        match (self, component) {
            (MediaKind::Video, 2) => "video_rtcp",
            (MediaKind::Video, _) => "video_rtp",
            (MediaKind::Application, _) => "data",
            (MediaKind::Audio, 2) => "rtcp",
            (MediaKind::Audio, _) => "rtp",
        }
    }
}

/// RTP codec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtpCodec {
    pub payload_type: u8,
    pub name: String,
    pub clock_rate: u32,
    pub channels: Option<u8>,
    pub parameters: BTreeMap<String, String>,
}

impl RtpCodec {
    pub fn new(payload_type: u8, name: &str, clock_rate: u32) -> Self {
        Self {
            payload_type,
            name: name.to_string(),
            clock_rate,
            channels: None,
            parameters: BTreeMap::new(),
        }
    }

    pub fn pcmu() -> Self {
        Self::new(0, "PCMU", 8000)
    }

    pub fn pcma() -> Self {
        Self::new(8, "PCMA", 8000)
    }

    pub fn opus() -> Self {
        Self {
            channels: Some(2),
            ..Self::new(111, "opus", 48000)
        }
    }

    pub fn vp8() -> Self {
        Self::new(96, "VP8", 90000)
    }

    /// Two codecs describe the same format when name and clock rate agree
    pub fn matches(&self, other: &RtpCodec) -> bool {
        self.name.eq_ignore_ascii_case(&other.name) && self.clock_rate == other.clock_rate
    }

    /// To rtpmap format: "96 VP8/90000"
    pub fn to_rtpmap(&self) -> String {
        if let Some(channels) = self.channels {
            format!("{} {}/{}/{}", self.payload_type, self.name, self.clock_rate, channels)
        } else {
            format!("{} {}/{}", self.payload_type, self.name, self.clock_rate)
        }
    }
}

/// A send stream announced in a media section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamParams {
    pub ssrc: u32,
    pub cname: String,
    pub label: String,
}

/// SDES crypto attribute: `a=crypto:<tag> <suite> <key_params>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoParams {
    pub tag: u32,
    pub suite: String,
    pub key_params: String,
}

/// Media content description for one section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaContentDescription {
    pub kind: MediaKind,
    pub port: u16,
    pub protocol: String,
    pub codecs: Vec<RtpCodec>,
    pub streams: Vec<StreamParams>,
    pub cryptos: Vec<CryptoParams>,
    pub direction: MediaDirection,
    pub ice_ufrag: Option<String>,
    pub ice_pwd: Option<String>,
    pub rtcp_mux: bool,
    /// Candidates carried inline; documents move these into their collections
    pub candidates: Vec<Candidate>,
}

impl MediaContentDescription {
    pub fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            port: 9,
            protocol: "RTP/AVPF".to_string(),
            codecs: Vec::new(),
            streams: Vec::new(),
            cryptos: Vec::new(),
            direction: MediaDirection::SendRecv,
            ice_ufrag: None,
            ice_pwd: None,
            rtcp_mux: false,
            candidates: Vec::new(),
        }
    }

    pub fn add_codec(&mut self, codec: RtpCodec) {
        self.codecs.push(codec);
    }

    pub fn add_stream(&mut self, stream: StreamParams) {
        self.streams.push(stream);
    }

    pub fn set_ice_credentials(&mut self, ufrag: String, pwd: String) {
        self.ice_ufrag = Some(ufrag);
        self.ice_pwd = Some(pwd);
    }

    pub fn has_streams(&self) -> bool {
        !self.streams.is_empty()
    }

    pub fn find_stream(&self, label: &str) -> Option<&StreamParams> {
        self.streams.iter().find(|s| s.label == label)
    }
}

/// One negotiated media section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentInfo {
    /// Content name, carried as `a=mid`
    pub name: String,
    pub rejected: bool,
    pub description: MediaContentDescription,
}

impl ContentInfo {
    pub fn new(name: &str, description: MediaContentDescription) -> Self {
        Self {
            name: name.to_string(),
            rejected: false,
            description,
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.description.kind
    }
}

/// Structured session description: an ordered list of media sections.
///
/// The position of a content in `contents` is its media-section index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub session_name: String,
    pub contents: Vec<ContentInfo>,
    pub bundle_group: Option<Vec<String>>,
}

impl SessionDescription {
    pub fn new() -> Self {
        Self {
            session_name: "-".to_string(),
            contents: Vec::new(),
            bundle_group: None,
        }
    }

    pub fn add_content(&mut self, content: ContentInfo) {
        self.contents.push(content);
    }

    pub fn content(&self, name: &str) -> Option<&ContentInfo> {
        self.contents.iter().find(|c| c.name == name)
    }

    /// First content of the given kind, if any
    pub fn first_content(&self, kind: MediaKind) -> Option<&ContentInfo> {
        self.contents.iter().find(|c| c.kind() == kind)
    }

    /// Index of the first content of the given kind
    pub fn content_index(&self, kind: MediaKind) -> Option<usize> {
        self.contents.iter().position(|c| c.kind() == kind)
    }

    pub fn enable_bundle(&mut self) {
        let names: Vec<String> = self.contents.iter().map(|c| c.name.clone()).collect();

        if !names.is_empty() {
            self.bundle_group = Some(names);
        }
    }
}

impl Default for SessionDescription {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sdp_type() {
        assert_eq!(SdpType::Offer.as_str(), "offer");
        assert_eq!(SdpType::Rollback.as_str(), "rollback");
        assert_eq!(SdpType::from_string("pranswer"), Some(SdpType::Pranswer));
        assert_eq!(SdpType::from_string("bogus"), None);
    }

    #[test]
    fn test_codec_rtpmap() {
        assert_eq!(RtpCodec::opus().to_rtpmap(), "111 opus/48000/2");
        assert_eq!(RtpCodec::pcmu().to_rtpmap(), "0 PCMU/8000");
    }

    #[test]
    fn test_codec_matching_ignores_payload_type() {
        let mut remote_vp8 = RtpCodec::vp8();
        remote_vp8.payload_type = 100;
        remote_vp8.name = "vp8".to_string();

        assert!(RtpCodec::vp8().matches(&remote_vp8));
        assert!(!RtpCodec::pcmu().matches(&RtpCodec::pcma()));
    }

    #[test]
    fn test_channel_names() {
        assert_eq!(MediaKind::Audio.channel_name(1), "rtp");
        assert_eq!(MediaKind::Audio.channel_name(2), "rtcp");
        assert_eq!(MediaKind::Video.channel_name(1), "video_rtp");
        assert_eq!(MediaKind::Video.channel_name(2), "video_rtcp");
    }

    #[test]
    fn test_first_content_lookup() {
        let mut desc = SessionDescription::new();
        desc.add_content(ContentInfo::new("audio", MediaContentDescription::new(MediaKind::Audio)));
        desc.add_content(ContentInfo::new("video", MediaContentDescription::new(MediaKind::Video)));

        assert_eq!(desc.content_index(MediaKind::Video), Some(1));
        assert_eq!(desc.first_content(MediaKind::Audio).map(|c| c.name.as_str()), Some("audio"));
        assert!(desc.first_content(MediaKind::Application).is_none());
    }

    #[test]
    fn test_bundle_enable() {
        let mut desc = SessionDescription::new();
        desc.enable_bundle();
        assert!(desc.bundle_group.is_none());

        desc.add_content(ContentInfo::new("audio", MediaContentDescription::new(MediaKind::Audio)));
        desc.add_content(ContentInfo::new("video", MediaContentDescription::new(MediaKind::Video)));
        desc.enable_bundle();

        assert_eq!(
            desc.bundle_group,
            Some(vec!["audio".to_string(), "video".to_string()])
        );
    }
}
