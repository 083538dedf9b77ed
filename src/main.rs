use palaver::application::{SessionExecutor, SessionHandle, TransportEventSink};
use palaver::config::Config;
use palaver::domain::description::{
    Candidate, CandidateType, MediaKind, MediaSessionOptions, SdpType, SessionDescriptionDocument,
};
use palaver::domain::session::{Transport, TransportEvent};
use palaver::infrastructure::loopback::{
    ChannelObserver, InMemoryChannelManager, LoopbackTransport, ObserverEvent,
};
use palaver::infrastructure::media_factory::MediaSessionDescriptionFactory;
use palaver::infrastructure::metrics::init_metrics;
use palaver::infrastructure::sdp::TextSdpCodec;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional config file as the first argument
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting palaver negotiation demo");
    info!("Configuration loaded: {:?}", config);

    let metrics = init_metrics()?;

    let (alice, mut alice_events) = start_session(&config)?;
    let (bob, _bob_events) = start_session(&config)?;
    info!("Sessions {} and {} started", alice.session_id(), bob.session_id());

    let codec = TextSdpCodec::new();

    // Offer
    let offer = alice.provide_offer(options("alice")).await?;
    let offer_text = offer.to_sdp(&codec);
    info!("Alice offer:\n{}", offer_text);

    let alice_audio = Arc::new(LoopbackTransport::new("audio"));
    let alice_video = Arc::new(LoopbackTransport::new("video"));
    alice.attach_transport(MediaKind::Audio, alice_audio.clone())?;
    alice.attach_transport(MediaKind::Video, alice_video.clone())?;

    // Alice's transports gather candidates
    for (transport, kind, port) in [
        (alice_audio.clone(), MediaKind::Audio, 5000),
        (alice_video.clone(), MediaKind::Video, 6000),
    ] {
        let transport: Arc<dyn Transport> = transport;
        alice.post(TransportEvent::Connecting(transport.clone()))?;
        alice.post(TransportEvent::CandidatesReady(
            transport,
            vec![host(kind, 1, port), host(kind, 2, port + 1)],
        ))?;
    }

    let local_candidates = loop {
        match alice_events.recv().await {
            Some(ObserverEvent::CandidatesReady(candidates)) => break candidates,
            Some(other) => info!("Alice observer: {:?}", other),
            None => anyhow::bail!("Alice session stopped before candidates were ready"),
        }
    };
    info!("Alice gathered {} candidates", local_candidates.len());

    // Answer
    let remote_offer = SessionDescriptionDocument::from_sdp(&offer_text, SdpType::Offer, &codec)?;
    let bob_audio = Arc::new(LoopbackTransport::new("audio"));
    bob.attach_transport(MediaKind::Audio, bob_audio.clone())?;
    bob.apply_remote_description(remote_offer, local_candidates).await?;
    info!(
        "Bob's audio transport received {} remote candidates",
        bob_audio.remote_candidates().len()
    );

    let answer = bob.provide_answer(options("bob")).await?;
    let answer_text = answer.to_sdp(&codec);
    info!("Bob answer:\n{}", answer_text);

    let remote_answer = SessionDescriptionDocument::from_sdp(&answer_text, SdpType::Answer, &codec)?;
    alice.apply_remote_description(remote_answer, Vec::new()).await?;

    alice.notify_negotiation_complete().await?;
    bob.notify_negotiation_complete().await?;

    // Transports come up
    for transport in [alice_audio, alice_video] {
        transport.set_writable(true);
        alice.post(TransportEvent::Writable(transport))?;
    }

    for handle in [&alice, &bob] {
        let snapshot = handle.snapshot().await?;
        info!(
            "Session {} is {} with {} pending deadlines",
            handle.session_id(),
            snapshot.state.as_str(),
            snapshot.pending_deadlines
        );

        for event in handle.take_events().await? {
            match serde_json::to_string(&event) {
                Ok(json) => info!("Event: {}", json),
                Err(e) => warn!("Failed to encode event: {}", e),
            }
        }
        handle.terminate().await?;
    }

    info!("Metrics snapshot:\n{}", metrics.render());
    info!("Palaver demo finished");

    Ok(())
}

fn start_session(
    config: &Config,
) -> anyhow::Result<(SessionHandle, mpsc::UnboundedReceiver<ObserverEvent>)> {
    let (observer, events) = ChannelObserver::new();
    let (handle, _task) = SessionExecutor::spawn(
        &config.session,
        Box::new(MediaSessionDescriptionFactory::new()),
        Arc::new(InMemoryChannelManager::new()),
        Some(Arc::new(observer)),
    )?;
    Ok((handle, events))
}

fn options(cname: &str) -> MediaSessionOptions {
    MediaSessionOptions::audio_video()
        .with_stream(MediaKind::Audio, "microphone", cname)
        .with_stream(MediaKind::Video, "camera", cname)
}

fn host(kind: MediaKind, component: u16, port: u16) -> Candidate {
    Candidate::new(
        kind,
        CandidateType::Host,
        std::net::SocketAddr::from(([127, 0, 0, 1], port)),
        component,
    )
}
