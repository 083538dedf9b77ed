/// SDP text codec
///
/// Line-oriented reader and writer for the session-level and media-level
/// lines this crate exchanges. Unknown attributes are skipped.
use crate::domain::description::{
    Candidate, ContentInfo, CryptoParams, MediaContentDescription, MediaDirection, MediaKind,
    ParsedSdp, RtpCodec, SdpCodec, SessionDescription, StreamParams,
};
use crate::domain::shared::{Result, SignalingError};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct TextSdpCodec;

impl TextSdpCodec {
    pub fn new() -> Self {
        Self
    }

    fn write_content(sdp: &mut String, content: &ContentInfo) {
        let media = &content.description;
        let payload_types: Vec<String> = media
            .codecs
            .iter()
            .map(|c| c.payload_type.to_string())
            .collect();
        let port = if content.rejected { 0 } else { media.port };

        sdp.push_str(&format!(
            "m={} {} {} {}\r\n",
            media.kind.as_str(),
            port,
            media.protocol,
            payload_types.join(" ")
        ));
        sdp.push_str("c=IN IP4 0.0.0.0\r\n");

        if media.rtcp_mux {
            sdp.push_str("a=rtcp-mux\r\n");
        }
        sdp.push_str(&format!("a=mid:{}\r\n", content.name));
        sdp.push_str(&format!("a={}\r\n", media.direction.as_str()));

        if let Some(ref ufrag) = media.ice_ufrag {
            sdp.push_str(&format!("a=ice-ufrag:{}\r\n", ufrag));
        }
        if let Some(ref pwd) = media.ice_pwd {
            sdp.push_str(&format!("a=ice-pwd:{}\r\n", pwd));
        }

        for crypto in &media.cryptos {
            sdp.push_str(&format!(
                "a=crypto:{} {} {}\r\n",
                crypto.tag, crypto.suite, crypto.key_params
            ));
        }

        for codec in &media.codecs {
            sdp.push_str(&format!("a=rtpmap:{}\r\n", codec.to_rtpmap()));

            if !codec.parameters.is_empty() {
                let params: Vec<String> = codec
                    .parameters
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect();
                sdp.push_str(&format!("a=fmtp:{} {}\r\n", codec.payload_type, params.join(";")));
            }
        }

        for stream in &media.streams {
            sdp.push_str(&format!("a=ssrc:{} cname:{}\r\n", stream.ssrc, stream.cname));
            sdp.push_str(&format!("a=ssrc:{} label:{}\r\n", stream.ssrc, stream.label));
        }

        for candidate in &media.candidates {
            sdp.push_str(&format!("a={}\r\n", candidate.to_sdp()));
        }
    }
}

impl SdpCodec for TextSdpCodec {
    fn parse(&self, text: &str) -> Result<ParsedSdp> {
        let mut lines = text.lines().map(|l| l.trim_end_matches('\r')).filter(|l| !l.is_empty());

        match lines.next() {
            Some("v=0") => {}
            other => {
                return Err(SignalingError::Parse(format!(
                    "Expected 'v=0', found {:?}",
                    other
                )))
            }
        }

        let mut description = SessionDescription::new();
        let mut origin: Option<(String, String)> = None;
        let mut bundle: Option<Vec<String>> = None;
        let mut section: Option<SectionBuilder> = None;

        for line in lines {
            let (kind, value) = line
                .split_once('=')
                .ok_or_else(|| SignalingError::Parse(format!("Malformed line '{}'", line)))?;

            match kind {
                "o" => origin = Some(parse_origin(value)?),
                "s" => description.session_name = value.to_string(),
                "m" => {
                    if let Some(done) = section.take() {
                        description.add_content(done.finish());
                    }
                    section = Some(SectionBuilder::from_media_line(value)?);
                }
                "a" => match section.as_mut() {
                    Some(builder) => builder.attribute(value)?,
                    None => {
                        if let Some(mids) = value.strip_prefix("group:BUNDLE") {
                            bundle = Some(mids.split_whitespace().map(str::to_string).collect());
                        }
                    }
                },
                _ => debug!("Skipping SDP line '{}'", line),
            }
        }

        if let Some(done) = section.take() {
            description.add_content(done.finish());
        }
        description.bundle_group = bundle;

        let (session_id, session_version) =
            origin.ok_or_else(|| SignalingError::Parse("Missing origin line".to_string()))?;

        Ok(ParsedSdp {
            description,
            session_id,
            session_version,
        })
    }

    fn serialize(
        &self,
        description: &SessionDescription,
        session_id: &str,
        session_version: &str,
    ) -> String {
        let mut sdp = String::new();

        sdp.push_str("v=0\r\n");
        sdp.push_str(&format!(
            "o=- {} {} IN IP4 0.0.0.0\r\n",
            session_id, session_version
        ));
        sdp.push_str(&format!("s={}\r\n", description.session_name));
        sdp.push_str("t=0 0\r\n");

        if let Some(ref bundle) = description.bundle_group {
            sdp.push_str(&format!("a=group:BUNDLE {}\r\n", bundle.join(" ")));
        }

        for content in &description.contents {
            Self::write_content(&mut sdp, content);
        }

        sdp
    }
}

/// `o=<user> <sess-id> <sess-version> IN IP4 <addr>`
fn parse_origin(value: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = value.split_whitespace().collect();
    if parts.len() < 3 {
        return Err(SignalingError::Parse(format!("Malformed origin '{}'", value)));
    }
    Ok((parts[1].to_string(), parts[2].to_string()))
}

/// Accumulates one media section while its attribute lines are read
struct SectionBuilder {
    name: Option<String>,
    rejected: bool,
    payload_types: Vec<u8>,
    rtpmaps: BTreeMap<u8, RtpCodec>,
    fmtps: BTreeMap<u8, BTreeMap<String, String>>,
    ssrcs: Vec<(u32, Option<String>, Option<String>)>,
    description: MediaContentDescription,
}

impl SectionBuilder {
    /// `m=<media> <port> <proto> <fmt> ...`
    fn from_media_line(value: &str) -> Result<Self> {
        let parts: Vec<&str> = value.split_whitespace().collect();
        if parts.len() < 3 {
            return Err(SignalingError::Parse(format!("Malformed media line '{}'", value)));
        }

        let kind = MediaKind::from_string(parts[0])
            .ok_or_else(|| SignalingError::Parse(format!("Unknown media '{}'", parts[0])))?;
        let port = parts[1]
            .parse::<u16>()
            .map_err(|_| SignalingError::Parse(format!("Invalid port '{}'", parts[1])))?;

        let mut description = MediaContentDescription::new(kind);
        description.port = port;
        description.protocol = parts[2].to_string();

        Ok(Self {
            name: None,
            rejected: port == 0,
            payload_types: parts[3..].iter().filter_map(|p| p.parse().ok()).collect(),
            rtpmaps: BTreeMap::new(),
            fmtps: BTreeMap::new(),
            ssrcs: Vec::new(),
            description,
        })
    }

    fn attribute(&mut self, value: &str) -> Result<()> {
        let (name, rest) = value.split_once(':').unwrap_or((value, ""));

        match name {
            "mid" => self.name = Some(rest.to_string()),
            "rtcp-mux" => self.description.rtcp_mux = true,
            "ice-ufrag" => self.description.ice_ufrag = Some(rest.to_string()),
            "ice-pwd" => self.description.ice_pwd = Some(rest.to_string()),
            "rtpmap" => {
                let codec = parse_rtpmap(rest)?;
                self.rtpmaps.insert(codec.payload_type, codec);
            }
            "fmtp" => {
                if let Some((pt, params)) = rest.split_once(' ') {
                    if let Ok(pt) = pt.parse::<u8>() {
                        let entry = self.fmtps.entry(pt).or_default();
                        for param in params.split(';') {
                            if let Some((k, v)) = param.trim().split_once('=') {
                                entry.insert(k.to_string(), v.to_string());
                            }
                        }
                    }
                }
            }
            "ssrc" => self.ssrc(rest)?,
            "crypto" => self.description.cryptos.push(parse_crypto(rest)?),
            "candidate" => {
                let candidate = Candidate::from_sdp(value, self.description.kind)?;
                self.description.candidates.push(candidate);
            }
            other => match MediaDirection::from_string(other) {
                Some(direction) => self.description.direction = direction,
                None => debug!("Skipping attribute '{}'", value),
            },
        }

        Ok(())
    }

    /// `a=ssrc:<ssrc> cname:<cname>` / `a=ssrc:<ssrc> label:<label>`
    fn ssrc(&mut self, rest: &str) -> Result<()> {
        let (ssrc, attr) = rest.split_once(' ').unwrap_or((rest, ""));
        let ssrc = ssrc
            .parse::<u32>()
            .map_err(|_| SignalingError::Parse(format!("Invalid ssrc '{}'", ssrc)))?;

        let index = match self.ssrcs.iter().position(|(s, _, _)| *s == ssrc) {
            Some(index) => index,
            None => {
                self.ssrcs.push((ssrc, None, None));
                self.ssrcs.len() - 1
            }
        };

        match attr.split_once(':') {
            Some(("cname", cname)) => self.ssrcs[index].1 = Some(cname.to_string()),
            Some(("label", label)) => self.ssrcs[index].2 = Some(label.to_string()),
            _ => {}
        }
        Ok(())
    }

    fn finish(mut self) -> ContentInfo {
        for pt in &self.payload_types {
            let codec = match self.rtpmaps.remove(pt) {
                Some(codec) => Some(codec),
                None => static_codec(*pt),
            };
            if let Some(mut codec) = codec {
                if let Some(params) = self.fmtps.remove(pt) {
                    codec.parameters = params;
                }
                self.description.add_codec(codec);
            }
        }

        for (ssrc, cname, label) in self.ssrcs {
            self.description.add_stream(StreamParams {
                ssrc,
                cname: cname.unwrap_or_default(),
                label: label.unwrap_or_else(|| ssrc.to_string()),
            });
        }

        let name = self
            .name
            .unwrap_or_else(|| self.description.kind.as_str().to_string());
        let mut content = ContentInfo::new(&name, self.description);
        content.rejected = self.rejected;
        content
    }
}

/// `<pt> <name>/<rate>[/<channels>]`
fn parse_rtpmap(rest: &str) -> Result<RtpCodec> {
    let invalid = || SignalingError::Parse(format!("Malformed rtpmap '{}'", rest));
    let (pt, encoding) = rest.split_once(' ').ok_or_else(invalid)?;
    let pt = pt.parse::<u8>().map_err(|_| invalid())?;

    let mut fields = encoding.split('/');
    let name = fields.next().ok_or_else(invalid)?;
    let clock_rate = fields
        .next()
        .and_then(|r| r.parse::<u32>().ok())
        .ok_or_else(invalid)?;

    let mut codec = RtpCodec::new(pt, name, clock_rate);
    codec.channels = fields.next().and_then(|c| c.parse().ok());
    Ok(codec)
}

/// `<tag> <suite> <key-params>`
fn parse_crypto(rest: &str) -> Result<CryptoParams> {
    let parts: Vec<&str> = rest.split_whitespace().collect();
    if parts.len() < 3 {
        return Err(SignalingError::Parse(format!("Malformed crypto '{}'", rest)));
    }

    Ok(CryptoParams {
        tag: parts[0]
            .parse()
            .map_err(|_| SignalingError::Parse(format!("Invalid crypto tag '{}'", parts[0])))?,
        suite: parts[1].to_string(),
        key_params: parts[2].to_string(),
    })
}

/// Static payload types that may appear without an rtpmap
fn static_codec(pt: u8) -> Option<RtpCodec> {
    match pt {
        0 => Some(RtpCodec::pcmu()),
        8 => Some(RtpCodec::pcma()),
        _ => None,
    }
}
