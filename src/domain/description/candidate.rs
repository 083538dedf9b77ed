/// Transport candidates and the per-section candidate collection
use crate::domain::description::media::MediaKind;
use crate::domain::shared::{Result, SignalingError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// ICE candidate types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateType {
    /// Host candidate - local interface address
    Host,
    /// Server reflexive candidate - public address discovered via STUN
    #[serde(rename = "srflx")]
    ServerReflexive,
    /// Peer reflexive candidate - discovered during connectivity checks
    #[serde(rename = "prflx")]
    PeerReflexive,
    /// Relay candidate - address on TURN relay server
    Relay,
}

impl CandidateType {
    pub fn priority_preference(&self) -> u32 {
        match self {
            CandidateType::Host => 126,
            CandidateType::PeerReflexive => 110,
            CandidateType::ServerReflexive => 100,
            CandidateType::Relay => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateType::Host => "host",
            CandidateType::ServerReflexive => "srflx",
            CandidateType::PeerReflexive => "prflx",
            CandidateType::Relay => "relay",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "host" => Some(CandidateType::Host),
            "srflx" => Some(CandidateType::ServerReflexive),
            "prflx" => Some(CandidateType::PeerReflexive),
            "relay" => Some(CandidateType::Relay),
            _ => None,
        }
    }
}

/// Transport protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    Udp,
    Tcp,
}

impl TransportProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportProtocol::Udp => "udp",
            TransportProtocol::Tcp => "tcp",
        }
    }
}

/// A transport candidate.
///
/// `name` is the channel-identifying key ("rtp", "rtcp", "video_rtp",
/// "video_rtcp"); the aggregator only ever looks at this field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub foundation: String,
    /// Component ID (1 = RTP, 2 = RTCP)
    pub component: u16,
    pub protocol: TransportProtocol,
    pub priority: u32,
    pub address: SocketAddr,
    pub candidate_type: CandidateType,
    pub related_address: Option<SocketAddr>,
    pub generation: u32,
}

impl Candidate {
    /// Create a candidate for the channel `kind` uses for `component`
    pub fn new(
        kind: MediaKind,
        candidate_type: CandidateType,
        address: SocketAddr,
        component: u16,
    ) -> Self {
        Self {
            name: kind.channel_name(component).to_string(),
            foundation: Self::compute_foundation(&candidate_type, &address),
            component,
            protocol: TransportProtocol::Udp,
            priority: Self::compute_priority(candidate_type, component),
            address,
            candidate_type,
            related_address: None,
            generation: 0,
        }
    }

    /// Create with related address
    pub fn with_related_address(mut self, related_addr: SocketAddr) -> Self {
        self.related_address = Some(related_addr);
        self
    }

    /// The channel-identifying key
    pub fn channel_key(&self) -> &str {
        &self.name
    }

    fn compute_foundation(candidate_type: &CandidateType, address: &SocketAddr) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        format!("{:?}{}", candidate_type, address.ip()).hash(&mut hasher);
        format!("{:x}", hasher.finish() & 0xffff_ffff)
    }

    /// Compute priority according to RFC 5245
    /// priority = (2^24)*(type preference) + (2^8)*(local preference) + (256 - component ID)
    pub fn compute_priority(candidate_type: CandidateType, component: u16) -> u32 {
        let type_pref = candidate_type.priority_preference();
        let local_pref = 65535u32;
        let component_id = component.min(256) as u32;

        (1 << 24) * type_pref + (1 << 8) * local_pref + (256 - component_id)
    }

    /// Convert to SDP candidate attribute format
    /// Example: "candidate:1 1 UDP 2130706431 192.168.1.100 5000 typ host generation 0"
    pub fn to_sdp(&self) -> String {
        let mut sdp = format!(
            "candidate:{} {} {} {} {} {} typ {}",
            self.foundation,
            self.component,
            self.protocol.as_str().to_uppercase(),
            self.priority,
            self.address.ip(),
            self.address.port(),
            self.candidate_type.as_str()
        );

        if let Some(related) = self.related_address {
            sdp.push_str(&format!(" raddr {} rport {}", related.ip(), related.port()));
        }
        sdp.push_str(&format!(" generation {}", self.generation));

        sdp
    }

    /// Parse an SDP candidate attribute found in a `kind` media section
    pub fn from_sdp(sdp: &str, kind: MediaKind) -> Result<Self> {
        let invalid = |what: &str| SignalingError::Parse(format!("{} in candidate '{}'", what, sdp));
        let parts: Vec<&str> = sdp.split_whitespace().collect();

        if parts.len() < 8 {
            return Err(invalid("Too few fields"));
        }

        let foundation = parts[0].trim_start_matches("candidate:").to_string();
        let component = parts[1]
            .parse::<u16>()
            .map_err(|_| invalid("Invalid component"))?;
        let protocol = match parts[2].to_lowercase().as_str() {
            "udp" => TransportProtocol::Udp,
            "tcp" => TransportProtocol::Tcp,
            _ => return Err(invalid("Invalid transport protocol")),
        };
        let priority = parts[3]
            .parse::<u32>()
            .map_err(|_| invalid("Invalid priority"))?;
        let port = parts[5]
            .parse::<u16>()
            .map_err(|_| invalid("Invalid port"))?;
        let ip: std::net::IpAddr = parts[4].parse().map_err(|_| invalid("Invalid address"))?;

        let typ_idx = parts
            .iter()
            .position(|&p| p == "typ")
            .ok_or_else(|| invalid("Missing 'typ' keyword"))?;
        let candidate_type = parts
            .get(typ_idx + 1)
            .and_then(|t| CandidateType::from_string(t))
            .ok_or_else(|| invalid("Invalid candidate type"))?;

        let mut candidate = Self {
            name: kind.channel_name(component).to_string(),
            foundation,
            component,
            protocol,
            priority,
            address: SocketAddr::new(ip, port),
            candidate_type,
            related_address: None,
            generation: 0,
        };

        let value_after = |key: &str| {
            parts
                .iter()
                .position(|&p| p == key)
                .and_then(|idx| parts.get(idx + 1))
                .copied()
        };

        if let (Some(raddr), Some(rport)) = (value_after("raddr"), value_after("rport")) {
            if let (Ok(ip), Ok(port)) = (raddr.parse::<std::net::IpAddr>(), rport.parse::<u16>()) {
                candidate.related_address = Some(SocketAddr::new(ip, port));
            }
        }
        if let Some(generation) = value_after("generation").and_then(|g| g.parse().ok()) {
            candidate.generation = generation;
        }

        Ok(candidate)
    }
}

/// Ordered candidates of one media section.
///
/// Uniqueness per channel key is not enforced here; callers that need it
/// check [`CandidateCollection::has_channel`] before adding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateCollection {
    entries: Vec<Candidate>,
}

impl CandidateCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, candidate: Candidate) {
        self.entries.push(candidate);
    }

    pub fn has_channel(&self, key: &str) -> bool {
        self.entries.iter().any(|c| c.channel_key() == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[Candidate] {
        &self.entries
    }

    pub fn to_vec(&self) -> Vec<Candidate> {
        self.entries.clone()
    }
}
