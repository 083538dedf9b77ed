/// Session negotiation engine
///
/// Owns the local/remote description pair and the local candidate set,
/// drives the negotiation state machine, and turns transport events into
/// watchdog and aggregator work. Every method takes `&mut self`: the engine
/// lives on a single executor task and is never shared, which is what keeps
/// all entry points on one logical signaling thread.
use crate::config::SessionConfig;
use crate::domain::description::{
    Candidate, CandidateCollection, MediaKind, MediaSessionOptions, SdpType, SecurePolicy,
    SessionDescription, SessionDescriptionDocument,
};
use crate::domain::session::aggregator::CandidateAggregator;
use crate::domain::session::ports::{
    ChannelManager, DescriptionFactory, MediaChannel, SessionObserver, Transport, TransportEvent,
    VideoRenderer,
};
use crate::domain::session::state::NegotiationState;
use crate::domain::session::watchdog::{DeadlineElapsed, DeadlineSink, TransportWatchdog};
use crate::domain::shared::{Result, SessionEvent, SignalingError, TransportGroupId};
use crate::infrastructure::metrics;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Voice and video channels created together in one transport group
pub struct MediaChannels {
    pub group: TransportGroupId,
    pub voice: Arc<dyn MediaChannel>,
    pub video: Arc<dyn MediaChannel>,
}

impl MediaChannels {
    fn get(&self, kind: MediaKind) -> Option<&Arc<dyn MediaChannel>> {
        match kind {
            MediaKind::Audio => Some(&self.voice),
            MediaKind::Video => Some(&self.video),
            MediaKind::Application => None,
        }
    }
}

pub struct SessionNegotiationEngine {
    session_id: String,
    session_version: u64,
    state: NegotiationState,
    default_secure_policy: SecurePolicy,
    factory: Box<dyn DescriptionFactory>,
    channel_manager: Arc<dyn ChannelManager>,
    observer: Option<Arc<dyn SessionObserver>>,
    channels: Option<MediaChannels>,
    transports: HashMap<MediaKind, Arc<dyn Transport>>,
    local_description: Option<SessionDescriptionDocument>,
    remote_description: Option<SessionDescriptionDocument>,
    local_candidates: CandidateCollection,
    aggregator: CandidateAggregator,
    watchdog: TransportWatchdog,
    events: Vec<SessionEvent>,
}

impl SessionNegotiationEngine {
    /// Create an engine. Deadline notices from the watchdog go to
    /// `deadline_sink` and must be fed back through [`Self::on_deadline_elapsed`].
    pub fn new(
        config: &SessionConfig,
        factory: Box<dyn DescriptionFactory>,
        channel_manager: Arc<dyn ChannelManager>,
        deadline_sink: Arc<dyn DeadlineSink>,
    ) -> Self {
        let session_id = rand::thread_rng().gen::<u64>().to_string();

        Self {
            session_id,
            session_version: 0,
            state: NegotiationState::Init,
            default_secure_policy: config.secure_policy,
            factory,
            channel_manager,
            observer: None,
            channels: None,
            transports: HashMap::new(),
            local_description: None,
            remote_description: None,
            local_candidates: CandidateCollection::new(),
            aggregator: CandidateAggregator::new(
                config.channel_routing(),
                config.allowed_candidates,
            ),
            watchdog: TransportWatchdog::new(config.call_setup_timeout(), deadline_sink),
            events: Vec::new(),
        }
    }

    pub fn set_observer(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observer = Some(observer);
    }

    /// Apply the default secure policy and create the voice and video
    /// channels in one transport group.
    pub fn initialize(&mut self) -> Result<()> {
        if self.channels.is_some() {
            return Err(SignalingError::Channel("Channels already created".to_string()));
        }

        self.set_secure_policy(self.default_secure_policy);

        let group = TransportGroupId::new();
        let voice = self
            .channel_manager
            .create_channel(MediaKind::Audio, true, group)
            .ok_or_else(|| {
                error!("Failed to create voice channel");
                SignalingError::Channel("Failed to create voice channel".to_string())
            })?;

        let video = match self.channel_manager.create_channel(MediaKind::Video, true, group) {
            Some(video) => video,
            None => {
                error!("Failed to create video channel");
                self.channel_manager.destroy_channel(voice);
                return Err(SignalingError::Channel(
                    "Failed to create video channel".to_string(),
                ));
            }
        };

        info!("Session {} created channels in group {}", self.session_id, group);
        self.channels = Some(MediaChannels { group, voice, video });
        Ok(())
    }

    /// Destroy channels, cancel deadlines and move to `Terminated`
    pub fn terminate(&mut self) {
        if self.state == NegotiationState::Terminated {
            return;
        }

        self.watchdog.cancel_all();
        if let Some(channels) = self.channels.take() {
            self.channel_manager.destroy_channel(channels.voice);
            self.channel_manager.destroy_channel(channels.video);
        }

        // Terminated is reachable from every other state
        let _ = self.transition(NegotiationState::Terminated);
        info!("Session {} terminated", self.session_id);
    }

    /// Declare the session failed; the caller's decision after an error signal
    pub fn fail(&mut self) -> Result<()> {
        self.transition(NegotiationState::Failed)
    }

    /// Takes effect on descriptions created after this call
    pub fn set_secure_policy(&mut self, policy: SecurePolicy) {
        debug!("Session {} secure policy {:?}", self.session_id, policy);
        self.factory.set_secure_policy(policy);
    }

    /// Register the transport that serves one media kind
    pub fn attach_transport(&mut self, kind: MediaKind, transport: Arc<dyn Transport>) {
        self.transports.insert(kind, transport);
    }

    /// Create a new local offer. Video is mandatory.
    pub fn provide_offer(&mut self, options: &MediaSessionOptions) -> Result<&SessionDescriptionDocument> {
        if !options.has_video {
            warn!("To receive video, has_video flag must be set to true");
            metrics::record_offer_rejected("missing_video");
            return Err(SignalingError::RejectedInput(
                "has_video must be set".to_string(),
            ));
        }

        let offer = self
            .factory
            .create_offer(options, self.local_description.as_ref().map(|d| d.description()));
        Ok(self.install_local(offer, SdpType::Offer))
    }

    /// Install a remote description and seed the remote candidates.
    ///
    /// Installed in every state, replacing any previous remote description,
    /// so renegotiation flows keep working.
    pub fn apply_remote_description(
        &mut self,
        remote: SessionDescriptionDocument,
        remote_candidates: Vec<Candidate>,
    ) -> &SessionDescriptionDocument {
        self.events.push(SessionEvent::remote_description_installed(
            remote.sdp_type().as_str(),
            remote_candidates.len(),
        ));
        info!(
            "Session {} installed remote {} with {} candidates in state {}",
            self.session_id,
            remote.sdp_type().as_str(),
            remote_candidates.len(),
            self.state.as_str()
        );
        self.aggregator.route_remote(remote_candidates, &self.transports);

        self.remote_description.insert(remote)
    }

    /// Answer the current remote description
    pub fn provide_answer(&mut self, options: &MediaSessionOptions) -> Result<&SessionDescriptionDocument> {
        let answer = self
            .factory
            .create_answer(
                self.remote_description.as_ref().map(|d| d.description()),
                options,
                self.local_description.as_ref().map(|d| d.description()),
            )
            .ok_or_else(|| {
                warn!("Session {} could not build an answer", self.session_id);
                SignalingError::Negotiation("No compatible answer for remote description".to_string())
            })?;

        Ok(self.install_local(answer, SdpType::Answer))
    }

    /// Both sides have exchanged descriptions.
    ///
    /// From `Init` this walks `OfferSent -> AnswerReceived` and enables the
    /// channels; in any other state that part is skipped. Mute state is
    /// refreshed from the local description every time.
    pub fn notify_negotiation_complete(&mut self) -> Result<()> {
        if self.state == NegotiationState::Init {
            self.transition(NegotiationState::OfferSent)?;
            self.transition(NegotiationState::AnswerReceived)?;

            match &self.channels {
                Some(channels) => {
                    channels.voice.enable(true);
                    channels.video.enable(true);
                }
                None => warn!("Session {} has no channels to enable", self.session_id),
            }
            metrics::record_negotiation_completed();
        }

        self.propagate_mute();
        Ok(())
    }

    /// Route the remote video stream to `renderer`. Only stream 0 exists.
    pub fn set_remote_renderer(&mut self, renderer: Arc<dyn VideoRenderer>) -> Result<()> {
        let channels = self
            .channels
            .as_ref()
            .ok_or_else(|| SignalingError::Channel("No video channel".to_string()))?;

        channels.video.set_renderer(0, renderer);
        Ok(())
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        debug!("Session {} transport event {:?}", self.session_id, event);

        match event {
            TransportEvent::RequestSignaling(transport) => transport.on_signaling_ready(),
            TransportEvent::Connecting(transport) | TransportEvent::Writable(transport) => {
                self.watchdog.on_writable_check(transport.as_ref());
            }
            TransportEvent::CandidatesReady(_, candidates) => self.on_candidates_ready(candidates),
            TransportEvent::ChannelGone(transport, name) => {
                debug!("Channel {} gone from {} transport", name, transport.content_name());
            }
        }
    }

    pub fn on_deadline_elapsed(&mut self, notice: DeadlineElapsed) {
        if !self.watchdog.on_deadline_elapsed(&notice) {
            return;
        }

        error!("Transport {} is not in writable state", notice.content_name);
        metrics::record_watchdog_fired(&notice.content_name);
        self.events
            .push(SessionEvent::transport_timed_out(&notice.content_name));

        if let Some(observer) = &self.observer {
            observer.on_error(SignalingError::TransportTimeout(notice.content_name));
        }
    }

    fn on_candidates_ready(&mut self, candidates: Vec<Candidate>) {
        if let Some(ready) = self
            .aggregator
            .accept_local(&mut self.local_candidates, candidates)
        {
            info!("Session {} has {} local candidates", self.session_id, ready.len());
            self.events.push(SessionEvent::candidates_ready(ready.len()));

            if let Some(observer) = &self.observer {
                observer.on_candidates_ready(ready);
            }
        }
    }

    fn install_local(&mut self, description: SessionDescription, sdp_type: SdpType) -> &SessionDescriptionDocument {
        self.session_version += 1;
        let version = self.session_version.to_string();

        self.events.push(SessionEvent::local_description_installed(
            sdp_type.as_str(),
            &version,
        ));
        info!(
            "Session {} installed local {} version {}",
            self.session_id,
            sdp_type.as_str(),
            version
        );

        let document = SessionDescriptionDocument::new(
            description,
            self.session_id.clone(),
            version,
            sdp_type,
        );
        self.local_description.insert(document)
    }

    fn propagate_mute(&self) {
        let (Some(local), Some(channels)) = (&self.local_description, &self.channels) else {
            return;
        };

        for kind in [MediaKind::Audio, MediaKind::Video] {
            let Some(content) = local.description().first_content(kind) else {
                continue;
            };
            if let Some(channel) = channels.get(kind) {
                // A section with no send streams is removed by muting it
                channel.mute(!content.description.has_streams());
            }
        }
    }

    fn transition(&mut self, next: NegotiationState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(SignalingError::InvalidStateTransition(format!(
                "{} -> {}",
                self.state.as_str(),
                next.as_str()
            )));
        }

        let previous = self.state;
        self.state = next;
        info!(
            "Session {} state {} -> {}",
            self.session_id,
            previous.as_str(),
            next.as_str()
        );
        self.events.push(SessionEvent::state_changed(previous, next));

        if let Some(observer) = &self.observer {
            observer.on_state_change(next);
        }
        Ok(())
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn channels(&self) -> Option<&MediaChannels> {
        self.channels.as_ref()
    }

    pub fn local_description(&self) -> Option<&SessionDescriptionDocument> {
        self.local_description.as_ref()
    }

    pub fn remote_description(&self) -> Option<&SessionDescriptionDocument> {
        self.remote_description.as_ref()
    }

    pub fn local_candidates(&self) -> &CandidateCollection {
        &self.local_candidates
    }

    pub fn watchdog(&self) -> &TransportWatchdog {
        &self.watchdog
    }

    /// Drain the recorded session events
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::description::{CandidateType, ContentInfo, MediaContentDescription, StreamParams};
    use crate::domain::session::ports::{MockChannelManager, MockMediaChannel, MockSessionObserver, MockTransport};
    use crate::infrastructure::media_factory::MediaSessionDescriptionFactory;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Harness {
        engine: SessionNegotiationEngine,
        deadlines: mpsc::UnboundedReceiver<DeadlineElapsed>,
    }

    fn config() -> SessionConfig {
        SessionConfig {
            call_setup_timeout_ms: 20,
            ..SessionConfig::default()
        }
    }

    fn harness(channel_manager: MockChannelManager) -> Harness {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = SessionNegotiationEngine::new(
            &config(),
            Box::new(MediaSessionDescriptionFactory::new()),
            Arc::new(channel_manager),
            Arc::new(tx),
        );
        Harness { engine, deadlines: rx }
    }

    /// Channel manager handing out the given voice and video channels
    fn channel_manager(voice: MockMediaChannel, video: MockMediaChannel) -> MockChannelManager {
        let voice: Arc<dyn MediaChannel> = Arc::new(voice);
        let video: Arc<dyn MediaChannel> = Arc::new(video);
        let mut manager = MockChannelManager::new();
        manager
            .expect_create_channel()
            .returning(move |kind, _, _| match kind {
                MediaKind::Audio => Some(voice.clone()),
                _ => Some(video.clone()),
            });
        manager.expect_destroy_channel().return_const(());
        manager
    }

    fn quiet_channel() -> MockMediaChannel {
        let mut channel = MockMediaChannel::new();
        channel.expect_enable().return_const(());
        channel.expect_mute().return_const(());
        channel
    }

    fn candidate(name: &str, port: u16) -> Candidate {
        let mut c = Candidate::new(
            MediaKind::Audio,
            CandidateType::Host,
            format!("10.0.0.1:{}", port).parse().unwrap(),
            1,
        );
        c.name = name.to_string();
        c
    }

    fn remote_offer() -> SessionDescriptionDocument {
        let mut desc = SessionDescription::new();
        for (name, kind, codec) in [
            ("audio", MediaKind::Audio, crate::domain::description::RtpCodec::opus()),
            ("video", MediaKind::Video, crate::domain::description::RtpCodec::vp8()),
        ] {
            let mut media = MediaContentDescription::new(kind);
            media.add_codec(codec);
            media.cryptos.push(crate::domain::description::CryptoParams {
                tag: 1,
                suite: "AES_CM_128_HMAC_SHA1_80".to_string(),
                key_params: "inline:remotekey".to_string(),
            });
            desc.add_content(ContentInfo::new(name, media));
        }
        SessionDescriptionDocument::new(desc, "99", "1", SdpType::Offer)
    }

    #[test]
    fn test_offer_without_video_is_rejected() {
        let mut h = harness(channel_manager(quiet_channel(), quiet_channel()));
        h.engine.initialize().unwrap();
        let options = MediaSessionOptions::default();

        let err = h.engine.provide_offer(&options).unwrap_err();
        assert!(matches!(err, SignalingError::RejectedInput(_)));
        assert!(h.engine.local_description().is_none());

        let first = h.engine.provide_offer(&MediaSessionOptions::audio_video()).unwrap().clone();
        assert!(h.engine.provide_offer(&options).is_err());
        assert_eq!(h.engine.local_description(), Some(&first));
        assert_eq!(h.engine.state(), NegotiationState::Init);

        h.engine.notify_negotiation_complete().unwrap();
        let err = h.engine.provide_offer(&options).unwrap_err();
        assert!(matches!(err, SignalingError::RejectedInput(_)));
        assert_eq!(h.engine.local_description(), Some(&first));
        assert_eq!(h.engine.state(), NegotiationState::AnswerReceived);

        h.engine.fail().unwrap();
        let err = h.engine.provide_offer(&options).unwrap_err();
        assert!(matches!(err, SignalingError::RejectedInput(_)));
        assert_eq!(h.engine.local_description(), Some(&first));
        assert_eq!(h.engine.state(), NegotiationState::Failed);
    }

    #[test]
    fn test_offer_replaces_local_description() {
        let mut h = harness(channel_manager(quiet_channel(), quiet_channel()));
        let options = MediaSessionOptions::audio_video();

        let first_version = h.engine.provide_offer(&options).unwrap().session_version().to_string();
        let second = h.engine.provide_offer(&options).unwrap();

        assert_eq!(second.sdp_type(), SdpType::Offer);
        assert_ne!(second.session_version(), first_version);
        assert_eq!(second.number_of_media_sections(), 2);
    }

    #[test]
    fn test_answer_requires_remote_description() {
        let mut h = harness(channel_manager(quiet_channel(), quiet_channel()));

        let err = h.engine.provide_answer(&MediaSessionOptions::audio_video()).unwrap_err();
        assert!(matches!(err, SignalingError::Negotiation(_)));

        h.engine.apply_remote_description(remote_offer(), Vec::new());
        let answer = h.engine.provide_answer(&MediaSessionOptions::audio_video()).unwrap();
        assert_eq!(answer.sdp_type(), SdpType::Answer);
        assert_eq!(answer.number_of_media_sections(), 2);
    }

    #[test]
    fn test_remote_description_routes_candidates() {
        let mut h = harness(channel_manager(quiet_channel(), quiet_channel()));
        let mut audio = MockTransport::new();
        audio.expect_complete_negotiation_if_needed().times(1).return_const(());
        audio
            .expect_apply_remote_candidates()
            .withf(|c: &Vec<Candidate>| c.len() == 2)
            .times(1)
            .return_const(());
        h.engine.attach_transport(MediaKind::Audio, Arc::new(audio));

        let installed = h
            .engine
            .apply_remote_description(
                remote_offer(),
                vec![candidate("rtp", 1), candidate("rtcp", 2), candidate("video_rtp", 3)],
            );

        assert_eq!(installed.session_id(), "99");
        assert_eq!(h.engine.remote_description().unwrap().session_id(), "99");
    }

    #[test]
    fn test_remote_description_installed_after_fail_and_terminate() {
        let mut h = harness(channel_manager(quiet_channel(), quiet_channel()));
        h.engine.initialize().unwrap();
        h.engine.fail().unwrap();

        let after_fail = SessionDescriptionDocument::new(SessionDescription::new(), "7", "1", SdpType::Offer);
        assert_eq!(h.engine.apply_remote_description(after_fail, Vec::new()).session_id(), "7");
        assert_eq!(h.engine.remote_description().unwrap().session_id(), "7");
        assert_eq!(h.engine.state(), NegotiationState::Failed);

        h.engine.terminate();
        let after_terminate = SessionDescriptionDocument::new(SessionDescription::new(), "8", "1", SdpType::Answer);
        h.engine.apply_remote_description(after_terminate, Vec::new());
        assert_eq!(h.engine.remote_description().unwrap().session_id(), "8");
        assert_eq!(h.engine.remote_description().unwrap().sdp_type(), SdpType::Answer);
        assert_eq!(h.engine.state(), NegotiationState::Terminated);
    }

    #[test]
    fn test_negotiation_complete_is_idempotent() {
        let mut voice = MockMediaChannel::new();
        voice.expect_enable().with(mockall::predicate::eq(true)).times(1).return_const(());
        voice.expect_mute().return_const(());
        let mut video = MockMediaChannel::new();
        video.expect_enable().with(mockall::predicate::eq(true)).times(1).return_const(());
        video.expect_mute().return_const(());

        let mut observer = MockSessionObserver::new();
        let mut seq = mockall::Sequence::new();
        observer
            .expect_on_state_change()
            .with(mockall::predicate::eq(NegotiationState::OfferSent))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        observer
            .expect_on_state_change()
            .with(mockall::predicate::eq(NegotiationState::AnswerReceived))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        let mut h = harness(channel_manager(voice, video));
        h.engine.set_observer(Arc::new(observer));
        h.engine.initialize().unwrap();

        h.engine.notify_negotiation_complete().unwrap();
        h.engine.notify_negotiation_complete().unwrap();

        assert_eq!(h.engine.state(), NegotiationState::AnswerReceived);
        let transitions = h
            .engine
            .take_events()
            .into_iter()
            .filter(|e| e.event_type() == "session.state_changed")
            .count();
        assert_eq!(transitions, 2);
    }

    #[test]
    fn test_mute_follows_stream_presence() {
        let mut voice = MockMediaChannel::new();
        voice.expect_enable().return_const(());
        voice.expect_mute().with(mockall::predicate::eq(true)).times(1).return_const(());
        let mut video = MockMediaChannel::new();
        video.expect_enable().return_const(());
        video.expect_mute().with(mockall::predicate::eq(false)).times(1).return_const(());

        let mut h = harness(channel_manager(voice, video));
        h.engine.initialize().unwrap();

        let options = MediaSessionOptions::audio_video().with_stream(MediaKind::Video, "cam", "me");
        let offer = h.engine.provide_offer(&options).unwrap();
        assert!(offer.description().first_content(MediaKind::Video).unwrap().description.has_streams());
        assert!(!offer.description().first_content(MediaKind::Audio).unwrap().description.has_streams());

        h.engine.notify_negotiation_complete().unwrap();
    }

    #[test]
    fn test_mute_skips_absent_content() {
        let mut voice = MockMediaChannel::new();
        voice.expect_enable().return_const(());
        voice.expect_mute().with(mockall::predicate::eq(false)).times(1).return_const(());
        let mut video = MockMediaChannel::new();
        video.expect_enable().return_const(());
        video.expect_mute().never();

        let mut h = harness(channel_manager(voice, video));
        h.engine.initialize().unwrap();

        // Answer to an audio-only remote offer
        let mut desc = SessionDescription::new();
        let mut audio = MediaContentDescription::new(MediaKind::Audio);
        audio.add_codec(crate::domain::description::RtpCodec::pcmu());
        audio.add_stream(StreamParams {
            ssrc: 1,
            cname: "them".to_string(),
            label: "mic".to_string(),
        });
        desc.add_content(ContentInfo::new("audio", audio));
        h.engine.set_secure_policy(SecurePolicy::Disabled);
        h.engine
            .apply_remote_description(SessionDescriptionDocument::new(desc, "5", "1", SdpType::Offer), Vec::new());

        let options = MediaSessionOptions::audio_video().with_stream(MediaKind::Audio, "mic", "me");
        h.engine.provide_answer(&options).unwrap();
        h.engine.notify_negotiation_complete().unwrap();
    }

    #[test]
    fn test_local_candidates_notify_once() {
        let mut observer = MockSessionObserver::new();
        observer
            .expect_on_candidates_ready()
            .withf(|c: &Vec<Candidate>| c.len() == 4)
            .times(1)
            .return_const(());

        let mut h = harness(channel_manager(quiet_channel(), quiet_channel()));
        h.engine.set_observer(Arc::new(observer));

        let mut transport = MockTransport::new();
        transport.expect_content_name().return_const("audio".to_string());
        let transport: Arc<dyn Transport> = Arc::new(transport);

        for (i, name) in ["rtp", "rtp", "rtcp", "video_rtp", "video_rtcp", "extra"].iter().enumerate() {
            h.engine.handle_transport_event(TransportEvent::CandidatesReady(
                transport.clone(),
                vec![candidate(name, 5000 + i as u16)],
            ));
        }

        assert_eq!(h.engine.local_candidates().len(), 4);
        assert!(!h.engine.local_candidates().has_channel("extra"));
    }

    #[test]
    fn test_request_signaling_reaches_transport() {
        let mut h = harness(channel_manager(quiet_channel(), quiet_channel()));
        let mut transport = MockTransport::new();
        transport.expect_content_name().return_const("video".to_string());
        transport.expect_on_signaling_ready().times(1).return_const(());

        h.engine
            .handle_transport_event(TransportEvent::RequestSignaling(Arc::new(transport)));
    }

    #[tokio::test]
    async fn test_watchdog_raises_error_once() {
        let mut observer = MockSessionObserver::new();
        observer
            .expect_on_error()
            .withf(|e: &SignalingError| *e == SignalingError::TransportTimeout("audio".to_string()))
            .times(1)
            .return_const(());

        let mut h = harness(channel_manager(quiet_channel(), quiet_channel()));
        h.engine.set_observer(Arc::new(observer));

        let mut transport = MockTransport::new();
        transport.expect_content_name().return_const("audio".to_string());
        transport.expect_has_channels().return_const(true);
        transport.expect_writable().return_const(false);
        let transport: Arc<dyn Transport> = Arc::new(transport);

        h.engine.handle_transport_event(TransportEvent::Connecting(transport.clone()));
        h.engine.handle_transport_event(TransportEvent::Writable(transport));

        let notice = h.deadlines.recv().await.unwrap();
        h.engine.on_deadline_elapsed(notice.clone());
        // Redelivery of the same notice does not fire twice
        h.engine.on_deadline_elapsed(notice);

        let extra = tokio::time::timeout(Duration::from_millis(60), h.deadlines.recv()).await;
        assert!(extra.is_err());
    }

    #[tokio::test]
    async fn test_writable_transport_cancels_watchdog() {
        let mut observer = MockSessionObserver::new();
        observer.expect_on_error().never();

        let mut h = harness(channel_manager(quiet_channel(), quiet_channel()));
        h.engine.set_observer(Arc::new(observer));

        let mut connecting = MockTransport::new();
        connecting.expect_content_name().return_const("video".to_string());
        connecting.expect_has_channels().return_const(true);
        connecting.expect_writable().return_const(false);
        let mut writable = MockTransport::new();
        writable.expect_content_name().return_const("video".to_string());
        writable.expect_has_channels().return_const(true);
        writable.expect_writable().return_const(true);

        h.engine.handle_transport_event(TransportEvent::Connecting(Arc::new(connecting)));
        h.engine.handle_transport_event(TransportEvent::Writable(Arc::new(writable)));
        assert_eq!(h.engine.watchdog().pending_count(), 0);

        let notice = tokio::time::timeout(Duration::from_millis(60), h.deadlines.recv()).await;
        assert!(notice.is_err());
    }

    #[test]
    fn test_initialize_failure_destroys_voice_channel() {
        let voice: Arc<dyn MediaChannel> = Arc::new(MockMediaChannel::new());
        let mut manager = MockChannelManager::new();
        manager
            .expect_create_channel()
            .returning(move |kind, _, _| match kind {
                MediaKind::Audio => Some(voice.clone()),
                _ => None,
            });
        manager.expect_destroy_channel().times(1).return_const(());

        let mut h = harness(manager);
        let err = h.engine.initialize().unwrap_err();

        assert!(matches!(err, SignalingError::Channel(_)));
        assert!(h.engine.channels().is_none());
    }

    #[test]
    fn test_video_channel_shares_voice_group() {
        let groups = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = groups.clone();
        let mut manager = MockChannelManager::new();
        manager
            .expect_create_channel()
            .times(2)
            .returning(move |kind, rtcp, group| {
                assert!(rtcp);
                seen.lock().unwrap().push(group);
                let mut channel = MockMediaChannel::new();
                channel.expect_kind().return_const(kind);
                Some(Arc::new(channel) as Arc<dyn MediaChannel>)
            });

        let mut h = harness(manager);
        h.engine.initialize().unwrap();

        let groups = groups.lock().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], groups[1]);
        assert_eq!(h.engine.channels().unwrap().group, groups[0]);
        assert!(h.engine.initialize().is_err());
    }

    #[test]
    fn test_terminate_destroys_channels_once() {
        let mut manager = MockChannelManager::new();
        manager
            .expect_create_channel()
            .returning(|_, _, _| Some(Arc::new(MockMediaChannel::new()) as Arc<dyn MediaChannel>));
        manager.expect_destroy_channel().times(2).return_const(());

        let mut h = harness(manager);
        h.engine.initialize().unwrap();
        h.engine.terminate();
        h.engine.terminate();

        assert_eq!(h.engine.state(), NegotiationState::Terminated);
        assert!(h.engine.fail().is_err());
    }
}
