/// Transport watchdog
///
/// Bounds how long a transport may stay non-writable. Each transport has at
/// most one pending deadline, held as a cancellable task handle. When the
/// timer runs out it hands a [`DeadlineElapsed`] notice to a [`DeadlineSink`],
/// which feeds it back into the session executor's inbox so the fire is
/// serialized with every other session event.
use crate::domain::session::ports::Transport;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Notice posted when an armed deadline runs out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlineElapsed {
    pub content_name: String,
    pub arm_id: u64,
}

/// Receives notices from deadlines that ran out
pub trait DeadlineSink: Send + Sync {
    fn deliver(&self, notice: DeadlineElapsed);
}

impl DeadlineSink for mpsc::UnboundedSender<DeadlineElapsed> {
    fn deliver(&self, notice: DeadlineElapsed) {
        // The receiving session may be gone already
        let _ = self.send(notice);
    }
}

/// Watchdog state of one transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    Idle,
    Armed { deadline: Instant },
    Fired,
}

/// Handle to a pending deadline. Dropping or cancelling it aborts the timer.
#[derive(Debug)]
pub struct DeadlineHandle {
    arm_id: u64,
    deadline: Instant,
    task: JoinHandle<()>,
}

impl DeadlineHandle {
    pub fn arm_id(&self) -> u64 {
        self.arm_id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for DeadlineHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct TransportWatchdog {
    timeout: Duration,
    pending: HashMap<String, DeadlineHandle>,
    fired: HashMap<String, u64>,
    next_arm_id: u64,
    sink: Arc<dyn DeadlineSink>,
}

impl TransportWatchdog {
    pub fn new(timeout: Duration, sink: Arc<dyn DeadlineSink>) -> Self {
        Self {
            timeout,
            pending: HashMap::new(),
            fired: HashMap::new(),
            next_arm_id: 0,
            sink,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Connecting and writability changes both land here: drop any pending
    /// deadline, then re-arm while the transport has channels but cannot
    /// write yet.
    pub fn on_writable_check(&mut self, transport: &dyn Transport) {
        let content_name = transport.content_name();
        self.cancel(&content_name);

        if transport.has_channels() && !transport.writable() {
            self.arm(&content_name);
        }
    }

    /// Arm a fresh deadline, replacing any pending one
    pub fn arm(&mut self, content_name: &str) {
        self.next_arm_id += 1;
        let arm_id = self.next_arm_id;
        let deadline = Instant::now() + self.timeout;

        let sink = self.sink.clone();
        let notice = DeadlineElapsed {
            content_name: content_name.to_string(),
            arm_id,
        };
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            sink.deliver(notice);
        });

        debug!("Armed watchdog #{} for {} transport", arm_id, content_name);
        self.fired.remove(content_name);
        self.pending.insert(
            content_name.to_string(),
            DeadlineHandle {
                arm_id,
                deadline,
                task,
            },
        );
    }

    /// Cancel the pending deadline, if any. Returns whether one was pending.
    pub fn cancel(&mut self, content_name: &str) -> bool {
        match self.pending.remove(content_name) {
            Some(handle) => {
                debug!("Cancelled watchdog #{} for {} transport", handle.arm_id(), content_name);
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.pending.drain() {
            handle.cancel();
        }
    }

    /// Accept a deadline notice.
    ///
    /// Returns `true` when the notice belongs to the deadline currently
    /// armed for that transport, i.e. the error signal must be raised.
    /// Notices from cancelled or replaced arms are stale and ignored.
    pub fn on_deadline_elapsed(&mut self, notice: &DeadlineElapsed) -> bool {
        let current = self
            .pending
            .get(&notice.content_name)
            .map(|h| h.arm_id());

        if current != Some(notice.arm_id) {
            debug!(
                "Ignoring stale watchdog #{} for {} transport",
                notice.arm_id, notice.content_name
            );
            return false;
        }

        self.pending.remove(&notice.content_name);
        self.fired.insert(notice.content_name.clone(), notice.arm_id);
        true
    }

    pub fn state(&self, content_name: &str) -> WatchdogState {
        if let Some(handle) = self.pending.get(content_name) {
            WatchdogState::Armed {
                deadline: handle.deadline(),
            }
        } else if self.fired.contains_key(content_name) {
            WatchdogState::Fired
        } else {
            WatchdogState::Idle
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::ports::MockTransport;

    fn transport(has_channels: bool, writable: bool) -> MockTransport {
        let mut t = MockTransport::new();
        t.expect_content_name().return_const("audio".to_string());
        t.expect_has_channels().return_const(has_channels);
        t.expect_writable().return_const(writable);
        t
    }

    fn watchdog(timeout_ms: u64) -> (TransportWatchdog, mpsc::UnboundedReceiver<DeadlineElapsed>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TransportWatchdog::new(Duration::from_millis(timeout_ms), Arc::new(tx)), rx)
    }

    #[tokio::test]
    async fn test_arms_while_not_writable() {
        let (mut dog, _rx) = watchdog(1_000);

        dog.on_writable_check(&transport(true, false));

        assert!(matches!(dog.state("audio"), WatchdogState::Armed { .. }));
        assert_eq!(dog.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_no_arm_without_channels_or_when_writable() {
        let (mut dog, _rx) = watchdog(1_000);

        dog.on_writable_check(&transport(false, false));
        assert_eq!(dog.state("audio"), WatchdogState::Idle);

        dog.on_writable_check(&transport(true, true));
        assert_eq!(dog.state("audio"), WatchdogState::Idle);
    }

    #[tokio::test]
    async fn test_rearm_replaces_pending_deadline() {
        let (mut dog, mut rx) = watchdog(30);

        dog.on_writable_check(&transport(true, false));
        dog.on_writable_check(&transport(true, false));
        assert_eq!(dog.pending_count(), 1);

        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.arm_id, 2);
        assert!(dog.on_deadline_elapsed(&notice));
        assert_eq!(dog.state("audio"), WatchdogState::Fired);

        // The first arm was aborted, nothing else arrives
        let extra = tokio::time::timeout(Duration::from_millis(60), rx.recv()).await;
        assert!(extra.is_err());
    }

    #[tokio::test]
    async fn test_writable_before_deadline_disarms() {
        let (mut dog, mut rx) = watchdog(30);

        dog.on_writable_check(&transport(true, false));
        dog.on_writable_check(&transport(true, true));
        assert_eq!(dog.state("audio"), WatchdogState::Idle);

        let notice = tokio::time::timeout(Duration::from_millis(80), rx.recv()).await;
        assert!(notice.is_err());
    }

    #[tokio::test]
    async fn test_stale_notice_is_ignored() {
        let (mut dog, _rx) = watchdog(1_000);

        dog.arm("audio");
        dog.arm("audio");

        let stale = DeadlineElapsed {
            content_name: "audio".to_string(),
            arm_id: 1,
        };
        assert!(!dog.on_deadline_elapsed(&stale));
        assert!(matches!(dog.state("audio"), WatchdogState::Armed { .. }));

        dog.cancel("audio");
        let late = DeadlineElapsed {
            content_name: "audio".to_string(),
            arm_id: 2,
        };
        assert!(!dog.on_deadline_elapsed(&late));
        assert_eq!(dog.state("audio"), WatchdogState::Idle);
    }

    #[tokio::test]
    async fn test_fired_can_rearm() {
        let (mut dog, mut rx) = watchdog(10);

        dog.arm("video");
        let notice = rx.recv().await.unwrap();
        assert!(dog.on_deadline_elapsed(&notice));
        assert!(!dog.on_deadline_elapsed(&notice));

        dog.arm("video");
        assert!(matches!(dog.state("video"), WatchdogState::Armed { .. }));
    }
}
