/// Offer/answer description factory
///
/// Builds audio and video sections from a fixed codec list. SSRCs, SDES keys
/// and ICE credentials are generated once per section and reused whenever a
/// current local description already carries them.
use crate::domain::description::{
    ContentInfo, CryptoParams, MediaContentDescription, MediaDirection, MediaKind,
    MediaSessionOptions, RtpCodec, SecurePolicy, SessionDescription, StreamParams,
};
use crate::domain::session::DescriptionFactory;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, warn};

const CRYPTO_SUITE: &str = "AES_CM_128_HMAC_SHA1_80";

pub struct MediaSessionDescriptionFactory {
    secure_policy: SecurePolicy,
    audio_codecs: Vec<RtpCodec>,
    video_codecs: Vec<RtpCodec>,
}

impl MediaSessionDescriptionFactory {
    pub fn new() -> Self {
        Self {
            secure_policy: SecurePolicy::default(),
            audio_codecs: vec![RtpCodec::opus(), RtpCodec::pcmu(), RtpCodec::pcma()],
            video_codecs: vec![RtpCodec::vp8()],
        }
    }

    pub fn secure_policy(&self) -> SecurePolicy {
        self.secure_policy
    }

    fn supported_codecs(&self, kind: MediaKind) -> &[RtpCodec] {
        match kind {
            MediaKind::Audio => &self.audio_codecs,
            MediaKind::Video => &self.video_codecs,
            MediaKind::Application => &[],
        }
    }

    /// Streams, crypto and ICE credentials shared by offers and answers
    fn fill_local_section(
        &self,
        media: &mut MediaContentDescription,
        options: &MediaSessionOptions,
        current: Option<&MediaContentDescription>,
        crypto_suite: Option<&str>,
    ) {
        for stream in options.streams_of(media.kind) {
            let ssrc = current
                .and_then(|c| c.find_stream(&stream.label))
                .map(|s| s.ssrc)
                .unwrap_or_else(|| rand::thread_rng().gen());

            media.add_stream(StreamParams {
                ssrc,
                cname: stream.cname.clone(),
                label: stream.label.clone(),
            });
        }

        if let Some(suite) = crypto_suite {
            let crypto = current
                .and_then(|c| c.cryptos.iter().find(|k| k.suite == suite))
                .cloned()
                .unwrap_or_else(|| CryptoParams {
                    tag: 1,
                    suite: suite.to_string(),
                    key_params: format!("inline:{}", random_token(40)),
                });
            media.cryptos.push(crypto);
        }

        match current.and_then(|c| c.ice_ufrag.clone().zip(c.ice_pwd.clone())) {
            Some((ufrag, pwd)) => media.set_ice_credentials(ufrag, pwd),
            None => media.set_ice_credentials(random_token(16), random_token(24)),
        }
        media.rtcp_mux = true;
    }

    fn answer_section(
        &self,
        offered: &ContentInfo,
        options: &MediaSessionOptions,
        current_local: Option<&SessionDescription>,
    ) -> Option<ContentInfo> {
        let kind = offered.kind();
        let remote = &offered.description;
        let mut media = MediaContentDescription::new(kind);
        media.protocol = remote.protocol.clone();

        let wanted = match kind {
            MediaKind::Audio => options.has_audio,
            MediaKind::Video => options.has_video,
            MediaKind::Application => false,
        };

        // Answer payload types follow the offer
        let supported = self.supported_codecs(kind);
        media.codecs = remote
            .codecs
            .iter()
            .filter(|c| supported.iter().any(|s| s.matches(c)))
            .cloned()
            .collect();

        if offered.rejected || !wanted || media.codecs.is_empty() {
            debug!("Rejecting {} section {}", kind.as_str(), offered.name);
            let mut content = ContentInfo::new(&offered.name, media);
            content.rejected = true;
            return Some(content);
        }

        let crypto_suite = match self.secure_policy {
            SecurePolicy::Disabled => None,
            policy => match remote.cryptos.first() {
                Some(crypto) => Some(crypto.suite.clone()),
                None if policy == SecurePolicy::Required => {
                    warn!("Section {} offers no crypto but crypto is required", offered.name);
                    return None;
                }
                None => None,
            },
        };

        let current = current_local
            .and_then(|d| d.content(&offered.name))
            .map(|c| &c.description);
        self.fill_local_section(&mut media, options, current, crypto_suite.as_deref());
        media.direction = reverse_direction(remote.direction);

        Some(ContentInfo::new(&offered.name, media))
    }
}

impl Default for MediaSessionDescriptionFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptionFactory for MediaSessionDescriptionFactory {
    fn create_offer(
        &self,
        options: &MediaSessionOptions,
        current_local: Option<&SessionDescription>,
    ) -> SessionDescription {
        let mut offer = SessionDescription::new();
        let crypto_suite = match self.secure_policy {
            SecurePolicy::Disabled => None,
            _ => Some(CRYPTO_SUITE),
        };

        let mut kinds = vec![MediaKind::Audio];
        if options.has_video {
            kinds.push(MediaKind::Video);
        }

        for kind in kinds {
            let mut media = MediaContentDescription::new(kind);
            for codec in self.supported_codecs(kind) {
                media.add_codec(codec.clone());
            }

            let current = current_local
                .and_then(|d| d.first_content(kind))
                .map(|c| &c.description);
            self.fill_local_section(&mut media, options, current, crypto_suite);

            offer.add_content(ContentInfo::new(kind.as_str(), media));
        }

        offer.enable_bundle();
        offer
    }

    fn create_answer(
        &self,
        remote: Option<&SessionDescription>,
        options: &MediaSessionOptions,
        current_local: Option<&SessionDescription>,
    ) -> Option<SessionDescription> {
        let remote = remote?;
        let mut answer = SessionDescription::new();

        for offered in &remote.contents {
            answer.add_content(self.answer_section(offered, options, current_local)?);
        }

        if let Some(ref offered_bundle) = remote.bundle_group {
            let accepted: Vec<String> = answer
                .contents
                .iter()
                .filter(|c| !c.rejected && offered_bundle.contains(&c.name))
                .map(|c| c.name.clone())
                .collect();
            if !accepted.is_empty() {
                answer.bundle_group = Some(accepted);
            }
        }

        Some(answer)
    }

    fn set_secure_policy(&mut self, policy: SecurePolicy) {
        self.secure_policy = policy;
    }
}

fn reverse_direction(direction: MediaDirection) -> MediaDirection {
    match direction {
        MediaDirection::SendOnly => MediaDirection::RecvOnly,
        MediaDirection::RecvOnly => MediaDirection::SendOnly,
        other => other,
    }
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
