//! Session executor
//!
//! Runs one [`SessionNegotiationEngine`] on its own tokio task. Callers talk
//! to it through a cloneable [`SessionHandle`]; commands carry oneshot
//! replies, transport events are fire-and-forget. Watchdog deadline notices
//! are posted into the same inbox, so every engine entry point runs on one
//! logical signaling thread strictly in arrival order. A notice that lands
//! behind a cancelling `Writable` event is recognised as stale by its arm id.

use crate::config::SessionConfig;
use crate::domain::description::{
    Candidate, MediaKind, MediaSessionOptions, SecurePolicy, SessionDescriptionDocument,
};
use crate::domain::session::{
    ChannelManager, DeadlineElapsed, DeadlineSink, DescriptionFactory, NegotiationState,
    SessionNegotiationEngine, SessionObserver, Transport, TransportEvent, VideoRenderer,
};
use crate::domain::shared::{Result, SessionEvent, SignalingError};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Receives transport-layer events for one session
pub trait TransportEventSink: Send + Sync {
    fn post(&self, event: TransportEvent) -> Result<()>;
}

/// Point-in-time view of a session
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: NegotiationState,
    pub local_description: Option<SessionDescriptionDocument>,
    pub remote_description: Option<SessionDescriptionDocument>,
    pub local_candidates: Vec<Candidate>,
    pub pending_deadlines: usize,
}

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    ProvideOffer {
        options: MediaSessionOptions,
        reply: Reply<SessionDescriptionDocument>,
    },
    ApplyRemoteDescription {
        description: SessionDescriptionDocument,
        candidates: Vec<Candidate>,
        reply: Reply<SessionDescriptionDocument>,
    },
    ProvideAnswer {
        options: MediaSessionOptions,
        reply: Reply<SessionDescriptionDocument>,
    },
    NotifyNegotiationComplete {
        reply: Reply<()>,
    },
    SetSecurePolicy(SecurePolicy),
    SetRemoteRenderer {
        renderer: Arc<dyn VideoRenderer>,
        reply: Reply<()>,
    },
    AttachTransport(MediaKind, Arc<dyn Transport>),
    Transport(TransportEvent),
    DeadlineElapsed(DeadlineElapsed),
    Fail {
        reply: Reply<()>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    TakeEvents {
        reply: oneshot::Sender<Vec<SessionEvent>>,
    },
    Terminate {
        reply: oneshot::Sender<()>,
    },
}

/// Posts watchdog notices into a session inbox.
///
/// Holds a weak sender so pending timers never keep a session alive after
/// every handle is gone.
struct InboxDeadlineSink {
    inbox: mpsc::WeakUnboundedSender<Command>,
}

impl DeadlineSink for InboxDeadlineSink {
    fn deliver(&self, notice: DeadlineElapsed) {
        if let Some(inbox) = self.inbox.upgrade() {
            let _ = inbox.send(Command::DeadlineElapsed(notice));
        }
    }
}

pub struct SessionExecutor;

impl SessionExecutor {
    /// Build and initialize an engine, then start its task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        config: &SessionConfig,
        factory: Box<dyn DescriptionFactory>,
        channel_manager: Arc<dyn ChannelManager>,
        observer: Option<Arc<dyn SessionObserver>>,
    ) -> Result<(SessionHandle, JoinHandle<()>)> {
        config.validate().map_err(|e| SignalingError::RejectedInput(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let deadline_sink = Arc::new(InboxDeadlineSink {
            inbox: tx.downgrade(),
        });
        let mut engine =
            SessionNegotiationEngine::new(config, factory, channel_manager, deadline_sink);

        if let Some(observer) = observer {
            engine.set_observer(observer);
        }
        engine.initialize()?;

        let handle = SessionHandle {
            session_id: engine.session_id().to_string(),
            tx,
        };

        info!("Starting executor for session {}", handle.session_id);
        let task = tokio::spawn(run(engine, rx));

        Ok((handle, task))
    }
}

async fn run(mut engine: SessionNegotiationEngine, mut inbox: mpsc::UnboundedReceiver<Command>) {
    loop {
        match inbox.recv().await {
            Some(Command::Terminate { reply }) => {
                engine.terminate();
                let _ = reply.send(());
                break;
            }
            Some(command) => dispatch(&mut engine, command),
            None => {
                debug!("All handles to session {} dropped", engine.session_id());
                break;
            }
        }
    }

    engine.terminate();
    info!("Executor for session {} stopped", engine.session_id());
}

fn dispatch(engine: &mut SessionNegotiationEngine, command: Command) {
    // A dropped reply receiver means the caller stopped waiting
    match command {
        Command::ProvideOffer { options, reply } => {
            let _ = reply.send(engine.provide_offer(&options).cloned());
        }
        Command::ApplyRemoteDescription {
            description,
            candidates,
            reply,
        } => {
            let installed = engine.apply_remote_description(description, candidates);
            let _ = reply.send(Ok(installed.clone()));
        }
        Command::ProvideAnswer { options, reply } => {
            let _ = reply.send(engine.provide_answer(&options).cloned());
        }
        Command::NotifyNegotiationComplete { reply } => {
            let _ = reply.send(engine.notify_negotiation_complete());
        }
        Command::SetSecurePolicy(policy) => engine.set_secure_policy(policy),
        Command::SetRemoteRenderer { renderer, reply } => {
            let _ = reply.send(engine.set_remote_renderer(renderer));
        }
        Command::AttachTransport(kind, transport) => engine.attach_transport(kind, transport),
        Command::Transport(event) => engine.handle_transport_event(event),
        Command::DeadlineElapsed(notice) => engine.on_deadline_elapsed(notice),
        Command::Fail { reply } => {
            let _ = reply.send(engine.fail());
        }
        Command::Snapshot { reply } => {
            let _ = reply.send(SessionSnapshot {
                state: engine.state(),
                local_description: engine.local_description().cloned(),
                remote_description: engine.remote_description().cloned(),
                local_candidates: engine.local_candidates().to_vec(),
                pending_deadlines: engine.watchdog().pending_count(),
            });
        }
        Command::TakeEvents { reply } => {
            let _ = reply.send(engine.take_events());
        }
        Command::Terminate { reply } => {
            engine.terminate();
            let _ = reply.send(());
        }
    }
}

/// Cloneable handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    session_id: String,
    tx: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether the executor task is still accepting commands
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| SignalingError::SessionClosed)
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply))?;
        rx.await.map_err(|_| SignalingError::SessionClosed)
    }

    pub async fn provide_offer(
        &self,
        options: MediaSessionOptions,
    ) -> Result<SessionDescriptionDocument> {
        self.request(|reply| Command::ProvideOffer { options, reply })
            .await?
    }

    pub async fn apply_remote_description(
        &self,
        description: SessionDescriptionDocument,
        candidates: Vec<Candidate>,
    ) -> Result<SessionDescriptionDocument> {
        self.request(|reply| Command::ApplyRemoteDescription {
            description,
            candidates,
            reply,
        })
        .await?
    }

    pub async fn provide_answer(
        &self,
        options: MediaSessionOptions,
    ) -> Result<SessionDescriptionDocument> {
        self.request(|reply| Command::ProvideAnswer { options, reply })
            .await?
    }

    pub async fn notify_negotiation_complete(&self) -> Result<()> {
        self.request(|reply| Command::NotifyNegotiationComplete { reply })
            .await?
    }

    pub fn set_secure_policy(&self, policy: SecurePolicy) -> Result<()> {
        self.send(Command::SetSecurePolicy(policy))
    }

    pub async fn set_remote_renderer(&self, renderer: Arc<dyn VideoRenderer>) -> Result<()> {
        self.request(|reply| Command::SetRemoteRenderer { renderer, reply })
            .await?
    }

    pub fn attach_transport(&self, kind: MediaKind, transport: Arc<dyn Transport>) -> Result<()> {
        self.send(Command::AttachTransport(kind, transport))
    }

    pub fn post_transport_event(&self, event: TransportEvent) -> Result<()> {
        self.send(Command::Transport(event))
    }

    pub async fn fail(&self) -> Result<()> {
        self.request(|reply| Command::Fail { reply }).await?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Drain the session's recorded events
    pub async fn take_events(&self) -> Result<Vec<SessionEvent>> {
        self.request(|reply| Command::TakeEvents { reply }).await
    }

    /// Terminate the session and stop its executor
    pub async fn terminate(&self) -> Result<()> {
        self.request(|reply| Command::Terminate { reply }).await
    }
}

impl TransportEventSink for SessionHandle {
    fn post(&self, event: TransportEvent) -> Result<()> {
        self.post_transport_event(event)
    }
}
