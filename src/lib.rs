//! # Muletrace
//!
//! A memory-safe money-muling detection engine for closed transaction
//! batches.
//!
//! ## Features
//!
//! - **Graph Construction**: Forward/reverse adjacency with per-account
//!   aggregates over a directed transfer multigraph
//! - **Cycle Detection**: Pruned enumeration of short directed cycles
//! - **Smurfing Detection**: Fan-in/fan-out hubs scored with a multi-signal
//!   heuristic against a legitimacy penalty
//! - **Shell Network Tracing**: Layered chains through dormant intermediaries
//! - **False-Positive Filtering**: Merchant, payroll, and exchange
//!   classification with counterparty sweep
//! - **Two-Stage Scoring**: Deterministic account suspicion and ring risk
//!
//! The pipeline is a pure function from a transaction batch to a result
//! snapshot: no interior state survives an [`FraudRingAnalyzer::analyze`]
//! call, and identical input yields identical output.

pub mod cycle_detection;
pub mod false_positives;
pub mod graph;
pub mod rings;
pub mod scoring;
pub mod shell_networks;
pub mod smurfing;
mod stats;

pub use cycle_detection::{CycleDetection, CycleFinding};
pub use false_positives::LegitimacySets;
pub use graph::{GraphStats, TransactionGraph};
pub use rings::{RawRing, RingKind};
pub use shell_networks::{AmountPattern, ShellChain};
pub use smurfing::SmurfGroup;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Instant;
use thiserror::Error;

/// Minimum simple-cycle length considered by the cycle detector.
pub const CYCLE_MIN: usize = 3;
/// Maximum simple-cycle length (and DFS depth) considered.
pub const CYCLE_MAX: usize = 5;
/// Global cap on enumerated cycles; enumeration stops once reached.
pub const CYCLE_MAX_RESULTS: usize = 500;
/// Nodes with more outgoing edges are skipped as seeds and hops.
pub const CYCLE_MAX_OUT_DEGREE: usize = 30;
/// Unique-counterparty count that makes a node a smurfing candidate.
pub const FAN_THRESHOLD: usize = 10;
/// Minimum heuristic score for a smurfing group to be emitted.
pub const SMURF_EMIT_THRESHOLD: f64 = 40.0;
/// Maximum transaction count for a shell intermediary.
pub const SHELL_TX_THRESHOLD: usize = 3;
/// Minimum shell-chain length in nodes, endpoints included.
pub const SHELL_MIN_NODES: usize = 4;
/// Maximum shell-chain length in nodes, endpoints included.
pub const SHELL_MAX_NODES: usize = 7;
/// A hop-to-hop amount drop beyond this breaks a shell chain.
pub const SHELL_MAX_DROP: f64 = 10_000.0;
/// Transaction count above which a low pass-through account is treated as
/// an operational hub rather than a mule.
pub const FPP_TX_COUNT: usize = 50;
/// Pass-through rate below which the high-volume penalty applies.
pub const FPP_PTR: f64 = 0.3;
/// Sliding-window width for the velocity component of account suspicion.
pub const VELOCITY_WINDOW_HOURS: i64 = 72;

/// Analysis errors.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum AnalysisError {
    #[error("Self transfer rejected: {0}")]
    SelfTransfer(String),

    #[error("Non-positive amount in transaction: {0}")]
    NonPositiveAmount(String),

    #[error("Duplicate transaction detected: {0}")]
    DuplicateTransaction(String),

    #[error("Empty identifier in transaction: {0}")]
    EmptyIdentifier(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

/// One validated transfer record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
}

/// Pattern tags attached to accounts by the detectors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum PatternTag {
    #[serde(rename = "cycle_3")]
    Cycle3,
    #[serde(rename = "cycle_4")]
    Cycle4,
    #[serde(rename = "cycle_5")]
    Cycle5,
    #[serde(rename = "fan_in")]
    FanIn,
    #[serde(rename = "fan_out")]
    FanOut,
    #[serde(rename = "fan_in_member")]
    FanInMember,
    #[serde(rename = "fan_out_member")]
    FanOutMember,
    #[serde(rename = "shell_intermediary")]
    ShellIntermediary,
    #[serde(rename = "shell_network_endpoint")]
    ShellNetworkEndpoint,
}

impl PatternTag {
    /// True for any cycle-membership tag, regardless of length.
    pub fn is_cycle(&self) -> bool {
        matches!(
            self,
            PatternTag::Cycle3 | PatternTag::Cycle4 | PatternTag::Cycle5
        )
    }

    fn for_cycle_length(length: usize) -> Self {
        match length {
            3 => PatternTag::Cycle3,
            4 => PatternTag::Cycle4,
            _ => PatternTag::Cycle5,
        }
    }
}

/// Operator-tunable pipeline configuration.
///
/// Defaults mirror the exported constants. `local_hour_offset` is the fixed
/// UTC offset of the operator-declared zone used by every hour-of-day
/// signal; timestamps themselves carry no zone.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub cycle_min_length: usize,
    pub cycle_max_length: usize,
    pub cycle_max_results: usize,
    pub cycle_max_out_degree: usize,
    pub fan_threshold: usize,
    pub smurf_emit_threshold: f64,
    pub shell_tx_threshold: usize,
    pub shell_min_nodes: usize,
    pub shell_max_nodes: usize,
    pub shell_max_drop: f64,
    pub fpp_tx_count: usize,
    pub fpp_ptr: f64,
    pub velocity_window_hours: i64,
    pub local_hour_offset: i32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            cycle_min_length: CYCLE_MIN,
            cycle_max_length: CYCLE_MAX,
            cycle_max_results: CYCLE_MAX_RESULTS,
            cycle_max_out_degree: CYCLE_MAX_OUT_DEGREE,
            fan_threshold: FAN_THRESHOLD,
            smurf_emit_threshold: SMURF_EMIT_THRESHOLD,
            shell_tx_threshold: SHELL_TX_THRESHOLD,
            shell_min_nodes: SHELL_MIN_NODES,
            shell_max_nodes: SHELL_MAX_NODES,
            shell_max_drop: SHELL_MAX_DROP,
            fpp_tx_count: FPP_TX_COUNT,
            fpp_ptr: FPP_PTR,
            velocity_window_hours: VELOCITY_WINDOW_HOURS,
            local_hour_offset: 0,
        }
    }
}

/// Account flagged by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspiciousAccount {
    pub account_id: String,
    pub suspicion_score: f64,
    pub suspicion_label: String,
    pub detected_patterns: BTreeSet<PatternTag>,
    /// First ring, in production order, that contains the account.
    pub ring_id: String,
}

/// Group of accounts acting jointly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudRing {
    pub ring_id: String,
    pub pattern_type: RingKind,
    pub member_accounts: Vec<String>,
    pub risk_score: f64,
    pub risk_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_pattern: Option<AmountPattern>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal_window_hours: Option<f64>,
    #[serde(rename = "aggregatorNode", skip_serializing_if = "Option::is_none")]
    pub hub_in: Option<String>,
    #[serde(rename = "disperserNode", skip_serializing_if = "Option::is_none")]
    pub hub_out: Option<String>,
}

/// Batch-level figures for the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_accounts_analyzed: usize,
    pub suspicious_accounts_flagged: usize,
    pub fraud_rings_detected: usize,
    pub processing_time_seconds: f64,
    /// True when the cycle enumeration cap truncated results.
    pub cycle_cap_hit: bool,
}

/// Immutable result snapshot of one `analyze` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResults {
    pub suspicious_accounts: Vec<SuspiciousAccount>,
    pub fraud_rings: Vec<FraudRing>,
    pub summary: AnalysisSummary,
}

impl AnalysisResults {
    /// Export as JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Money-muling detection pipeline over a closed transaction batch.
pub struct FraudRingAnalyzer {
    config: AnalyzerConfig,
}

impl FraudRingAnalyzer {
    /// Create an analyzer with default configuration.
    pub fn new() -> Self {
        Self {
            config: AnalyzerConfig::default(),
        }
    }

    /// Create an analyzer with custom configuration.
    pub fn with_config(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Run the full pipeline: graph construction, the three structural
    /// detectors, false-positive filtering, ring merging, and two-stage
    /// scoring. Empty input yields empty results.
    pub fn analyze(&self, transactions: &[Transaction]) -> Result<AnalysisResults, AnalysisError> {
        let started = Instant::now();
        self.validate_batch(transactions)?;

        let graph = TransactionGraph::build(transactions);
        tracing::debug!(
            accounts = graph.account_count(),
            edges = graph.edge_count(),
            "graph constructed"
        );

        let mut raw_rings: Vec<RawRing> = Vec::new();
        let mut tags: BTreeMap<String, BTreeSet<PatternTag>> = BTreeMap::new();

        let cycle_detection = cycle_detection::detect_cycles(&graph, &self.config)?;
        for cycle in &cycle_detection.cycles {
            let tag = PatternTag::for_cycle_length(cycle.accounts.len());
            for account in &cycle.accounts {
                tags.entry(account.clone()).or_default().insert(tag);
            }
            raw_rings.push(RawRing {
                kind: RingKind::Cycle,
                members: cycle.accounts.iter().cloned().collect(),
                hub_in: None,
                hub_out: None,
                time_window_hours: stats::span_hours(&cycle.timestamps),
                raw_score: cycle.score,
                cycle_length: Some(cycle.accounts.len()),
                chain_length: None,
                amount_pattern: None,
            });
        }

        let smurf_groups = smurfing::detect_smurfing(&graph, &self.config)?;
        for group in &smurf_groups {
            self.tag_smurf_group(&graph, group, &mut tags)?;
            let (hub_in, hub_out) = match group.kind {
                RingKind::FanIn => (Some(group.hub.clone()), None),
                RingKind::FanOut => (None, Some(group.hub.clone())),
                _ => (Some(group.hub.clone()), Some(group.hub.clone())),
            };
            raw_rings.push(RawRing {
                kind: group.kind,
                members: group.members.clone(),
                hub_in,
                hub_out,
                time_window_hours: group.time_window_hours,
                raw_score: group.score,
                cycle_length: None,
                chain_length: None,
                amount_pattern: None,
            });
        }

        let shell_chains = shell_networks::detect_shell_networks(&graph, &self.config)?;
        for chain in &shell_chains {
            let last = chain.accounts.len() - 1;
            for (index, account) in chain.accounts.iter().enumerate() {
                let tag = if index == 0 || index == last {
                    PatternTag::ShellNetworkEndpoint
                } else {
                    PatternTag::ShellIntermediary
                };
                tags.entry(account.clone()).or_default().insert(tag);
            }
            raw_rings.push(RawRing {
                kind: RingKind::ShellNetwork,
                members: chain.accounts.iter().cloned().collect(),
                hub_in: None,
                hub_out: None,
                time_window_hours: stats::span_hours(&chain.timestamps),
                raw_score: chain.score,
                cycle_length: None,
                chain_length: Some(chain.accounts.len()),
                amount_pattern: Some(chain.amount_pattern),
            });
        }

        let legitimacy = false_positives::classify_legitimate_accounts(&graph, &self.config)?;
        let surviving = legitimacy.filter_rings(raw_rings);
        let merged = rings::merge_rings(surviving);

        let ring_ids: Vec<String> = (1..=merged.len())
            .map(|index| format!("RING_{:03}", index))
            .collect();

        // Stage 1: suspicion for every account in a surviving ring.
        let mut suspects: Vec<SuspiciousAccount> = Vec::new();
        let mut suspect_scores: BTreeMap<String, f64> = BTreeMap::new();
        let mut member_union: BTreeSet<&String> = BTreeSet::new();
        for ring in &merged {
            member_union.extend(ring.members.iter());
        }
        let empty_tags = BTreeSet::new();
        for account in member_union {
            let meta = graph.require_metadata(account)?;
            let account_tags = tags.get(account).unwrap_or(&empty_tags);
            let score = scoring::account_suspicion(meta, account_tags, &self.config);
            suspect_scores.insert(account.clone(), score);
            let rounded = stats::round1(score);

            let primary_ring = merged
                .iter()
                .position(|ring| ring.members.contains(account))
                .map(|index| ring_ids[index].clone())
                .unwrap_or_default();
            suspects.push(SuspiciousAccount {
                account_id: account.clone(),
                suspicion_score: rounded,
                suspicion_label: scoring::suspicion_label(rounded).to_string(),
                detected_patterns: account_tags.clone(),
                ring_id: primary_ring,
            });
        }
        suspects.sort_by(|a, b| {
            b.suspicion_score
                .partial_cmp(&a.suspicion_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.account_id.cmp(&b.account_id))
        });

        // Stage 2: ring risk from member suspicions.
        let mut fraud_rings: Vec<FraudRing> = Vec::new();
        for (index, ring) in merged.iter().enumerate() {
            let member_scores: Vec<f64> = ring
                .members
                .iter()
                .filter_map(|member| suspect_scores.get(member).copied())
                .collect();
            let risk = stats::round1(scoring::ring_risk(&graph, ring, &member_scores)?);
            fraud_rings.push(FraudRing {
                ring_id: ring_ids[index].clone(),
                pattern_type: ring.kind,
                member_accounts: ring.members.iter().cloned().collect(),
                risk_score: risk,
                risk_label: scoring::risk_label(risk).to_string(),
                cycle_length: ring.cycle_length,
                chain_length: ring.chain_length,
                amount_pattern: ring.amount_pattern,
                temporal_window_hours: ring.time_window_hours.map(stats::round1),
                hub_in: ring.hub_in.clone(),
                hub_out: ring.hub_out.clone(),
            });
        }

        let elapsed = started.elapsed().as_secs_f64();
        let summary = AnalysisSummary {
            total_accounts_analyzed: graph.account_count(),
            suspicious_accounts_flagged: suspects.len(),
            fraud_rings_detected: fraud_rings.len(),
            processing_time_seconds: (elapsed * 1000.0).round() / 1000.0,
            cycle_cap_hit: cycle_detection.cap_hit,
        };
        tracing::info!(
            accounts = summary.total_accounts_analyzed,
            flagged = summary.suspicious_accounts_flagged,
            rings = summary.fraud_rings_detected,
            "analysis complete"
        );

        Ok(AnalysisResults {
            suspicious_accounts: suspects,
            fraud_rings,
            summary,
        })
    }

    /// Enforce the entry contract even though hosts are expected to
    /// pre-filter: positive finite amounts, non-empty identifiers, no
    /// self-transfers, unique transaction ids.
    fn validate_batch(&self, transactions: &[Transaction]) -> Result<(), AnalysisError> {
        let mut seen_ids: HashSet<&str> = HashSet::with_capacity(transactions.len());
        for txn in transactions {
            if txn.transaction_id.is_empty()
                || txn.sender_id.is_empty()
                || txn.receiver_id.is_empty()
            {
                return Err(AnalysisError::EmptyIdentifier(txn.transaction_id.clone()));
            }
            if !txn.amount.is_finite() || txn.amount <= 0.0 {
                return Err(AnalysisError::NonPositiveAmount(txn.transaction_id.clone()));
            }
            if txn.sender_id == txn.receiver_id {
                return Err(AnalysisError::SelfTransfer(txn.transaction_id.clone()));
            }
            if !seen_ids.insert(&txn.transaction_id) {
                return Err(AnalysisError::DuplicateTransaction(
                    txn.transaction_id.clone(),
                ));
            }
        }
        Ok(())
    }

    /// Hubs carry the directional tag; counterparties the member tag.
    fn tag_smurf_group(
        &self,
        graph: &TransactionGraph,
        group: &SmurfGroup,
        tags: &mut BTreeMap<String, BTreeSet<PatternTag>>,
    ) -> Result<(), AnalysisError> {
        let hub_meta = graph.require_metadata(&group.hub)?;
        let hub_entry = tags.entry(group.hub.clone()).or_default();
        match group.kind {
            RingKind::FanIn => {
                hub_entry.insert(PatternTag::FanIn);
            }
            RingKind::FanOut => {
                hub_entry.insert(PatternTag::FanOut);
            }
            _ => {
                hub_entry.insert(PatternTag::FanIn);
                hub_entry.insert(PatternTag::FanOut);
            }
        }
        for member in &group.members {
            if *member == group.hub {
                continue;
            }
            let entry = tags.entry(member.clone()).or_default();
            if matches!(group.kind, RingKind::FanIn | RingKind::FanInFanOut)
                && hub_meta.senders.contains(member)
            {
                entry.insert(PatternTag::FanInMember);
            }
            if matches!(group.kind, RingKind::FanOut | RingKind::FanInFanOut)
                && hub_meta.receivers.contains(member)
            {
                entry.insert(PatternTag::FanOutMember);
            }
        }
        Ok(())
    }
}

impl Default for FraudRingAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
