//! Topic-scoped community voting.
//!
//! Each topic moves `Open → Closed(result)` exactly once. Ballots are a
//! map from participant to option, so re-voting overwrites instead of
//! double-counting and the final tally is independent of arrival order.

use crate::config::ConsensusConfig;
use crate::error::{ConsensusError, Result};
use arkivo_types::{ConsensusId, HybridTimestamp, PeerId, Score};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Outcome of a closed consensus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusResult {
    /// The leading option cleared the threshold decisively.
    Approved,
    /// Quorum was met but no option cleared the threshold.
    Rejected,
    /// The leading option cleared the threshold with a runner-up close
    /// behind; the community wants an amended proposal.
    Modified,
    /// Closed without enough participation to decide.
    Pending,
}

/// Final tally and outcome of a consensus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedConsensus {
    /// The decision.
    pub result: ConsensusResult,
    /// Votes per option at closure.
    pub votes: HashMap<String, usize>,
    /// The leading option's vote share.
    pub confidence: Score,
    /// Human-readable account of how the result was reached.
    pub reasoning: Vec<String>,
    /// When the topic closed.
    pub closed_at: HybridTimestamp,
}

/// A community vote over a fixed set of options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityConsensus {
    /// Unique id for this vote.
    pub id: ConsensusId,
    /// What is being decided.
    pub topic: String,
    /// Cultural origin scoping the topic, if any. Two communities may vote
    /// on the same topic text independently.
    pub cultural_origin: Option<String>,
    /// The options participants choose between.
    pub options: Vec<String>,
    /// One ballot per participant; re-voting overwrites.
    pub ballots: HashMap<PeerId, String>,
    /// When the topic opened.
    pub opened_at: HybridTimestamp,
    /// When the topic closes absent early closure.
    pub deadline: HybridTimestamp,
    /// Set exactly once when the topic closes.
    pub closed: Option<ClosedConsensus>,
}

impl CommunityConsensus {
    /// Participants that have voted so far.
    #[must_use]
    pub fn participants(&self) -> Vec<PeerId> {
        self.ballots.keys().copied().collect()
    }

    /// Live tally of ballots per option.
    #[must_use]
    pub fn tally(&self) -> HashMap<String, usize> {
        let mut counts: HashMap<String, usize> =
            self.options.iter().map(|o| (o.clone(), 0)).collect();
        for option in self.ballots.values() {
            *counts.entry(option.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Whether the topic is still accepting votes.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.closed.is_none()
    }
}

/// Runs topic-scoped community votes.
pub struct ConsensusEngine {
    config: ConsensusConfig,
    topics: RwLock<HashMap<ConsensusId, CommunityConsensus>>,
    open_index: RwLock<HashMap<(String, Option<String>), ConsensusId>>,
}

impl ConsensusEngine {
    /// Creates an engine with the given configuration.
    pub fn new(config: ConsensusConfig) -> Self {
        Self {
            config,
            topics: RwLock::new(HashMap::new()),
            open_index: RwLock::new(HashMap::new()),
        }
    }

    /// Opens a new consensus. At most one topic may be open per
    /// `(topic, cultural_origin)` pair at a time.
    pub async fn initiate(
        &self,
        topic: impl Into<String>,
        options: Vec<String>,
        cultural_origin: Option<String>,
    ) -> Result<ConsensusId> {
        let topic = topic.into();
        if options.len() < 2 {
            return Err(ConsensusError::NotEnoughOptions);
        }

        let key = (topic.clone(), cultural_origin.clone());
        let mut open_index = self.open_index.write().await;
        if open_index.contains_key(&key) {
            return Err(ConsensusError::DuplicateTopic(topic));
        }

        let id = ConsensusId::new();
        let opened_at = HybridTimestamp::now();
        let record = CommunityConsensus {
            id,
            topic: topic.clone(),
            cultural_origin,
            options,
            ballots: HashMap::new(),
            opened_at,
            deadline: opened_at.plus(self.config.vote_window),
            closed: None,
        };

        open_index.insert(key, id);
        self.topics.write().await.insert(id, record);
        info!("Opened consensus {} on topic '{}'", id, topic);
        Ok(id)
    }

    /// Casts a ballot. Re-voting overwrites the participant's earlier
    /// choice. Closes the topic when the participation target is reached.
    pub async fn vote(
        &self,
        id: ConsensusId,
        participant: PeerId,
        option: impl Into<String>,
    ) -> Result<()> {
        let option = option.into();
        let should_close = {
            let mut topics = self.topics.write().await;
            let record = topics.get_mut(&id).ok_or(ConsensusError::UnknownConsensus(id))?;
            if !record.is_open() {
                return Err(ConsensusError::Closed(id));
            }
            if !record.options.contains(&option) {
                return Err(ConsensusError::UnknownOption { id, option });
            }
            record.ballots.insert(participant, option);
            debug!("Consensus {} now holds {} ballots", id, record.ballots.len());
            self.config.participation_target > 0
                && record.ballots.len() >= self.config.participation_target
        };

        if should_close {
            self.close(id).await?;
        }
        Ok(())
    }

    /// Closes a topic and computes its result. Rejected if already closed.
    pub async fn close(&self, id: ConsensusId) -> Result<CommunityConsensus> {
        let mut topics = self.topics.write().await;
        let record = topics.get_mut(&id).ok_or(ConsensusError::UnknownConsensus(id))?;
        if !record.is_open() {
            return Err(ConsensusError::Closed(id));
        }

        let closed = decide(record, &self.config);
        info!(
            "Closed consensus {} on '{}': {:?} (confidence {})",
            id, record.topic, closed.result, closed.confidence
        );
        record.closed = Some(closed);
        let snapshot = record.clone();
        drop(topics);

        self.open_index
            .write()
            .await
            .remove(&(snapshot.topic.clone(), snapshot.cultural_origin.clone()));
        Ok(snapshot)
    }

    /// Returns a snapshot of a consensus record, open or closed.
    pub async fn get(&self, id: ConsensusId) -> Option<CommunityConsensus> {
        self.topics.read().await.get(&id).cloned()
    }

    /// Snapshots of all currently open topics.
    pub async fn open_topics(&self) -> Vec<CommunityConsensus> {
        self.topics
            .read()
            .await
            .values()
            .filter(|r| r.is_open())
            .cloned()
            .collect()
    }

    /// Closes every open topic whose deadline has passed. Returns the ids
    /// closed by this sweep.
    pub async fn expire_due(&self, now: HybridTimestamp) -> Vec<ConsensusId> {
        let due: Vec<ConsensusId> = self
            .topics
            .read()
            .await
            .values()
            .filter(|r| r.is_open() && r.deadline < now)
            .map(|r| r.id)
            .collect();

        let mut closed = Vec::new();
        for id in due {
            if self.close(id).await.is_ok() {
                closed.push(id);
            }
        }
        closed
    }
}

/// Computes the outcome of a topic from its ballots.
///
/// The tally is a pure function of the participant→option map, so any
/// permutation of the vote sequence produces the same result.
fn decide(record: &CommunityConsensus, config: &ConsensusConfig) -> ClosedConsensus {
    let votes = record.tally();
    let total = record.ballots.len();
    let closed_at = HybridTimestamp::now();

    if total == 0 {
        return ClosedConsensus {
            result: ConsensusResult::Pending,
            votes,
            confidence: Score::MIN,
            reasoning: vec!["no ballots were cast before closure".into()],
            closed_at,
        };
    }

    // Rank options by count, ties broken by option order for determinism.
    let mut ranked: Vec<(&String, usize)> = record
        .options
        .iter()
        .map(|o| (o, votes.get(o).copied().unwrap_or(0)))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    let (leader, leader_count) = (ranked[0].0.clone(), ranked[0].1);
    let leader_share = leader_count as f64 / total as f64;
    let runner_up_share = ranked
        .get(1)
        .map(|(_, count)| *count as f64 / total as f64)
        .unwrap_or(0.0);

    let mut reasoning = vec![format!(
        "option '{leader}' took {leader_count} of {total} ballots ({leader_share:.2})"
    )];

    let quorum_met =
        config.participation_target == 0 || total >= config.participation_target;

    let result = if leader_share > config.consensus_threshold {
        if leader_share - runner_up_share <= config.modified_margin {
            reasoning.push(format!(
                "runner-up within {:.2} of the leader; the community asks for an amended proposal",
                config.modified_margin
            ));
            ConsensusResult::Modified
        } else {
            ConsensusResult::Approved
        }
    } else if quorum_met {
        reasoning.push(format!(
            "no option exceeded the {:.2} threshold",
            config.consensus_threshold
        ));
        ConsensusResult::Rejected
    } else {
        reasoning.push(format!(
            "participation below target ({total}/{})",
            config.participation_target
        ));
        ConsensusResult::Pending
    };

    ClosedConsensus {
        result,
        votes,
        confidence: Score::new(leader_share),
        reasoning,
        closed_at,
    }
}
