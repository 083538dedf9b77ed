/// Candidate aggregation: per-channel partitioning, dedup and the
/// one-shot "candidates ready" decision
use crate::domain::description::{Candidate, CandidateCollection, MediaKind};
use crate::domain::session::ports::Transport;
use crate::infrastructure::metrics;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Maps channel names onto media kinds
#[derive(Debug, Clone)]
pub struct ChannelRouting {
    audio: Vec<String>,
    video: Vec<String>,
}

impl ChannelRouting {
    pub fn new(audio: Vec<String>, video: Vec<String>) -> Self {
        Self { audio, video }
    }

    /// `None` for names that belong to no known channel
    pub fn kind_of(&self, channel_name: &str) -> Option<MediaKind> {
        if self.video.iter().any(|n| n == channel_name) {
            Some(MediaKind::Video)
        } else if self.audio.iter().any(|n| n == channel_name) {
            Some(MediaKind::Audio)
        } else {
            None
        }
    }
}

impl Default for ChannelRouting {
    fn default() -> Self {
        Self::new(
            vec!["rtp".to_string(), "rtcp".to_string()],
            vec!["video_rtp".to_string(), "video_rtcp".to_string()],
        )
    }
}

/// A candidate batch split by owning channel kind
#[derive(Debug, Default)]
pub struct PartitionedCandidates {
    pub audio: Vec<Candidate>,
    pub video: Vec<Candidate>,
    pub unrecognized: Vec<Candidate>,
}

pub struct CandidateAggregator {
    routing: ChannelRouting,
    allowed_candidates: usize,
    notified: bool,
}

impl CandidateAggregator {
    pub fn new(routing: ChannelRouting, allowed_candidates: usize) -> Self {
        Self {
            routing,
            allowed_candidates,
            notified: false,
        }
    }

    pub fn allowed_candidates(&self) -> usize {
        self.allowed_candidates
    }

    /// Whether the ready notification has been handed out
    pub fn is_complete(&self) -> bool {
        self.notified
    }

    pub fn partition(&self, candidates: Vec<Candidate>) -> PartitionedCandidates {
        let mut parts = PartitionedCandidates::default();

        for candidate in candidates {
            match self.routing.kind_of(candidate.channel_key()) {
                Some(MediaKind::Video) => parts.video.push(candidate),
                Some(_) => parts.audio.push(candidate),
                None => parts.unrecognized.push(candidate),
            }
        }

        parts
    }

    /// Hand remote candidates to the transport of their media kind.
    ///
    /// Groups with no transport are dropped; a session need not negotiate
    /// every kind. Returns how many candidates were delivered.
    pub fn route_remote(
        &self,
        candidates: Vec<Candidate>,
        transports: &HashMap<MediaKind, Arc<dyn Transport>>,
    ) -> usize {
        let parts = self.partition(candidates);

        if !parts.unrecognized.is_empty() {
            info!(
                "Dropping {} remote candidates for unknown channels",
                parts.unrecognized.len()
            );
            metrics::record_candidates_dropped("unknown_channel", parts.unrecognized.len());
        }

        let mut delivered = 0;
        for (kind, group) in [(MediaKind::Audio, parts.audio), (MediaKind::Video, parts.video)] {
            if group.is_empty() {
                continue;
            }

            match transports.get(&kind) {
                Some(transport) => {
                    transport.complete_negotiation_if_needed();
                    debug!(
                        "Applying {} remote {} candidates",
                        group.len(),
                        kind.as_str()
                    );
                    delivered += group.len();
                    transport.apply_remote_candidates(group);
                }
                None => {
                    info!("No {} transport exists", kind.as_str());
                    metrics::record_candidates_dropped("missing_endpoint", group.len());
                }
            }
        }

        delivered
    }

    /// Fold a batch of local candidates into `local`.
    ///
    /// The first candidate per channel key wins; once `allowed_candidates`
    /// entries exist every further arrival is discarded. Returns the full
    /// set exactly once, on the batch that fills the collection.
    pub fn accept_local(
        &mut self,
        local: &mut CandidateCollection,
        batch: Vec<Candidate>,
    ) -> Option<Vec<Candidate>> {
        if local.len() >= self.allowed_candidates {
            metrics::record_candidates_dropped("capacity", batch.len());
            return None;
        }

        for candidate in batch {
            if local.len() >= self.allowed_candidates {
                debug!("Candidate cap reached, dropping {}", candidate.channel_key());
                metrics::record_candidates_dropped("capacity", 1);
                continue;
            }
            if local.has_channel(candidate.channel_key()) {
                debug!("Already have a candidate for {}", candidate.channel_key());
                metrics::record_candidates_dropped("duplicate", 1);
                continue;
            }
            local.add(candidate);
        }

        if local.len() == self.allowed_candidates && !self.notified {
            self.notified = true;
            return Some(local.to_vec());
        }

        None
    }
}
