//! Two-stage scoring: account suspicion first, then ring risk from member
//! suspicions.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;

use crate::graph::{NodeMetadata, TransactionGraph};
use crate::rings::{NormalizedKind, RawRing};
use crate::{AnalysisError, AnalyzerConfig, PatternTag};

/// Pass-through rate: how symmetric the account's flow is.
pub fn pass_through_rate(meta: &NodeMetadata) -> f64 {
    let max = meta.total_received.max(meta.total_sent);
    if max == 0.0 {
        return 0.0;
    }
    meta.total_received.min(meta.total_sent) / max
}

/// Velocity: maximum transaction count inside any right-open sliding window
/// divided by the total count. Defined as 1 for fewer than two transactions.
pub fn velocity_ratio(timestamps: &[DateTime<Utc>], window_hours: i64) -> f64 {
    let count = timestamps.len();
    if count <= 1 {
        return 1.0;
    }
    let window = Duration::hours(window_hours);
    let mut max_in_window = 0usize;
    let mut end = 0usize;
    for start in 0..count {
        if end < start {
            end = start;
        }
        while end < count && timestamps[end] - timestamps[start] < window {
            end += 1;
        }
        max_in_window = max_in_window.max(end - start);
    }
    max_in_window as f64 / count as f64
}

/// Pattern modifier: each detection role contributes at most once,
/// regardless of how many rings or detectors produced the tag.
pub fn pattern_modifier(tags: &BTreeSet<PatternTag>, tx_count: usize) -> f64 {
    let mut modifier = 0.0;
    if tags.iter().any(|t| t.is_cycle()) {
        modifier += 20.0;
    }
    if tags.contains(&PatternTag::FanIn) {
        modifier += 25.0;
    }
    if tags.contains(&PatternTag::FanOut) {
        modifier += 25.0;
    }
    if tags.contains(&PatternTag::ShellIntermediary)
        || tags.contains(&PatternTag::ShellNetworkEndpoint)
    {
        modifier += if tx_count <= 3 { 30.0 } else { 15.0 };
    }
    modifier
}

/// Stage 1: account suspicion in [0, 100].
pub fn account_suspicion(
    meta: &NodeMetadata,
    tags: &BTreeSet<PatternTag>,
    config: &AnalyzerConfig,
) -> f64 {
    let ptr = pass_through_rate(meta);
    let velocity = velocity_ratio(&meta.all_timestamps, config.velocity_window_hours);
    let modifier = pattern_modifier(tags, meta.tx_count());
    let false_positive_penalty =
        if meta.tx_count() > config.fpp_tx_count && ptr < config.fpp_ptr {
            50.0
        } else {
            0.0
        };
    (35.0 * ptr + 35.0 * velocity + modifier - false_positive_penalty).clamp(0.0, 100.0)
}

pub fn suspicion_label(score: f64) -> &'static str {
    if score >= 75.0 {
        "High Risk"
    } else if score >= 50.0 {
        "Suspicious"
    } else if score >= 20.0 {
        "Monitor"
    } else {
        "Stable / Merchant"
    }
}

/// Stage 2: ring risk from the members' (unrounded) suspicion scores.
pub fn ring_risk(
    graph: &TransactionGraph,
    ring: &RawRing,
    member_scores: &[f64],
) -> Result<f64, AnalysisError> {
    let avg = if member_scores.is_empty() {
        0.0
    } else {
        member_scores.iter().sum::<f64>() / member_scores.len() as f64
    };

    let risk = avg + temporal_density_bonus(graph, ring) + severity_bonus(ring);
    Ok(risk.clamp(0.0, 100.0))
}

/// +15 when the ring's internal transactions are tightly clustered, or too
/// few to measure.
fn temporal_density_bonus(graph: &TransactionGraph, ring: &RawRing) -> f64 {
    let mut timestamps: Vec<DateTime<Utc>> = Vec::new();
    for member in &ring.members {
        for edge in graph.out_edges(member) {
            if ring.members.contains(&edge.to) {
                timestamps.push(edge.timestamp);
            }
        }
    }
    if timestamps.len() < 2 {
        return 15.0;
    }
    let min = timestamps.iter().min().copied().unwrap_or_default();
    let max = timestamps.iter().max().copied().unwrap_or_default();
    if max - min <= Duration::hours(72) {
        15.0
    } else {
        0.0
    }
}

/// Structural severity by normalized ring family.
fn severity_bonus(ring: &RawRing) -> f64 {
    match ring.kind.normalized() {
        NormalizedKind::CycleRing => 10.0,
        NormalizedKind::LayeredChain => {
            if ring.hop_length() > 3 {
                15.0
            } else {
                10.0
            }
        }
        NormalizedKind::SmurfCluster => {
            if ring.members.len() >= 25 {
                20.0
            } else {
                10.0
            }
        }
    }
}

pub fn risk_label(score: f64) -> &'static str {
    if score >= 80.0 {
        "Critical"
    } else if score >= 60.0 {
        "High"
    } else if score >= 40.0 {
        "Medium"
    } else {
        "Low"
    }
}
