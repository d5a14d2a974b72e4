//! Smurfing detection: fan-in aggregators, fan-out dispersers, and combined
//! hubs, scored with a multi-signal heuristic against a legitimacy penalty.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};

use crate::graph::{NodeMetadata, TransactionGraph};
use crate::rings::RingKind;
use crate::stats;
use crate::{AnalysisError, AnalyzerConfig};

/// A scored fan-in, fan-out, or combined hub with its counterparties.
#[derive(Debug, Clone)]
pub struct SmurfGroup {
    pub kind: RingKind,
    pub hub: String,
    /// Unique counterparties plus the hub, as a set.
    pub members: BTreeSet<String>,
    pub score: f64,
    /// Span of the relevant transactions. None with fewer than two.
    pub time_window_hours: Option<f64>,
}

/// Run the fan-in, fan-out, and combined scans in that order. A node
/// already emitted by one of the first two scans is not reconsidered for
/// the combined scan.
pub fn detect_smurfing(
    graph: &TransactionGraph,
    config: &AnalyzerConfig,
) -> Result<Vec<SmurfGroup>, AnalysisError> {
    let mut groups = Vec::new();
    let mut emitted: HashSet<&String> = HashSet::new();
    let accounts = graph.accounts_sorted();

    for &account in &accounts {
        let meta = graph.require_metadata(account)?;
        if meta.unique_senders() >= config.fan_threshold {
            if let Some(group) = score_candidate(graph, account, meta, RingKind::FanIn, config) {
                emitted.insert(account);
                groups.push(group);
            }
        }
    }

    for &account in &accounts {
        let meta = graph.require_metadata(account)?;
        if meta.unique_receivers() >= config.fan_threshold {
            if let Some(group) = score_candidate(graph, account, meta, RingKind::FanOut, config) {
                emitted.insert(account);
                groups.push(group);
            }
        }
    }

    for &account in &accounts {
        if emitted.contains(account) {
            continue;
        }
        let meta = graph.require_metadata(account)?;
        if meta.unique_senders() >= config.fan_threshold
            && meta.unique_receivers() >= config.fan_threshold
        {
            if let Some(group) =
                score_candidate(graph, account, meta, RingKind::FanInFanOut, config)
            {
                groups.push(group);
            }
        }
    }

    tracing::debug!(groups = groups.len(), "smurfing scan finished");
    Ok(groups)
}

/// Transactions relevant to one candidate: in-edges for fan-in, out-edges
/// for fan-out, the union for combined hubs.
struct Sample {
    amounts: Vec<f64>,
    /// Ascending.
    timestamps: Vec<DateTime<Utc>>,
    total: f64,
}

impl Sample {
    fn collect(graph: &TransactionGraph, hub: &str, kind: RingKind) -> Self {
        let mut amounts = Vec::new();
        let mut timestamps = Vec::new();
        if matches!(kind, RingKind::FanIn | RingKind::FanInFanOut) {
            for edge in graph.in_edges(hub) {
                amounts.push(edge.amount);
                timestamps.push(edge.timestamp);
            }
        }
        if matches!(kind, RingKind::FanOut | RingKind::FanInFanOut) {
            for edge in graph.out_edges(hub) {
                amounts.push(edge.amount);
                timestamps.push(edge.timestamp);
            }
        }
        timestamps.sort();
        let total = amounts.iter().sum();
        Self {
            amounts,
            timestamps,
            total,
        }
    }

    fn window_hours(&self) -> f64 {
        stats::span_hours(&self.timestamps).unwrap_or(0.0)
    }
}

fn score_candidate(
    graph: &TransactionGraph,
    hub: &str,
    meta: &NodeMetadata,
    kind: RingKind,
    config: &AnalyzerConfig,
) -> Option<SmurfGroup> {
    let sample = Sample::collect(graph, hub, kind);
    let fan_degree = match kind {
        RingKind::FanIn => meta.unique_senders(),
        RingKind::FanOut => meta.unique_receivers(),
        _ => meta.unique_senders().max(meta.unique_receivers()),
    };

    let signals = structural_signal(fan_degree)
        + temporal_burst_signal(&sample)
        + off_hours_signal(&sample, config.local_hour_offset)
        + velocity_signal(&sample)
        + behavioral_amount_signal(&sample.amounts)
        + throughput_signal(meta);
    let penalty = legitimacy_penalty(&sample, meta, config.local_hour_offset);
    let score = (signals - penalty).clamp(0.0, 100.0);

    if score < config.smurf_emit_threshold {
        return None;
    }

    let mut members: BTreeSet<String> = BTreeSet::new();
    if matches!(kind, RingKind::FanIn | RingKind::FanInFanOut) {
        members.extend(meta.senders.iter().cloned());
    }
    if matches!(kind, RingKind::FanOut | RingKind::FanInFanOut) {
        members.extend(meta.receivers.iter().cloned());
    }
    members.insert(hub.to_string());

    Some(SmurfGroup {
        kind,
        hub: hub.to_string(),
        members,
        score,
        time_window_hours: stats::span_hours(&sample.timestamps),
    })
}

/// Fan-degree signal, max 25.
fn structural_signal(fan_degree: usize) -> f64 {
    if fan_degree >= 30 {
        25.0
    } else if fan_degree >= 20 {
        20.0
    } else if fan_degree >= 15 {
        15.0
    } else {
        10.0
    }
}

/// Burst signal, max 25. Tight windows with many transactions dominate;
/// evenly spaced same-day activity still registers.
fn temporal_burst_signal(sample: &Sample) -> f64 {
    let window = sample.window_hours();
    let count = sample.timestamps.len();

    if window < 6.0 && count >= 10 {
        return 25.0;
    }
    if window < 12.0 && count >= 10 {
        return 22.0;
    }
    let gaps = stats::gaps_seconds(&sample.timestamps);
    let mean_gap = stats::mean(&gaps);
    if mean_gap > 0.0 && stats::std_dev(&gaps) / mean_gap < 0.3 && window < 24.0 {
        return 20.0;
    }
    if window < 24.0 {
        12.0
    } else if window < 72.0 {
        6.0
    } else {
        0.0
    }
}

/// Off-hours signal, max 15: local hours 23:00 through 04:59.
fn off_hours_signal(sample: &Sample, hour_offset: i32) -> f64 {
    if sample.timestamps.is_empty() {
        return 0.0;
    }
    let off = sample
        .timestamps
        .iter()
        .filter(|ts| {
            let hour = stats::local_hour(**ts, hour_offset);
            hour >= 23 || hour <= 4
        })
        .count();
    let fraction = off as f64 / sample.timestamps.len() as f64;
    if fraction > 0.7 {
        15.0
    } else if fraction > 0.5 {
        10.0
    } else if fraction > 0.3 {
        5.0
    } else {
        0.0
    }
}

/// Velocity signal, max 20: amount moved per hour of window.
fn velocity_signal(sample: &Sample) -> f64 {
    let per_hour = sample.total / sample.window_hours().max(0.1);
    if per_hour > 5000.0 {
        20.0
    } else if per_hour > 2000.0 {
        15.0
    } else if per_hour > 1000.0 {
        10.0
    } else if per_hour > 500.0 {
        5.0
    } else {
        0.0
    }
}

/// Amount-shape signal, max 15, floored at 0. Structuring-band amounts and
/// mule-typical mid-range clusters add; organic cent values subtract.
fn behavioral_amount_signal(amounts: &[f64]) -> f64 {
    if amounts.is_empty() {
        return 0.0;
    }
    let n = amounts.len() as f64;
    let mut signal: f64 = 0.0;

    let structuring = amounts
        .iter()
        .filter(|a| **a >= 8000.0 && **a < 10_000.0)
        .count() as f64;
    if structuring / n > 0.3 {
        signal += 8.0;
    }

    if let Some(cv) = stats::coefficient_of_variation(amounts) {
        let mid_range = amounts
            .iter()
            .filter(|a| **a >= 200.0 && **a <= 3000.0)
            .count() as f64;
        if (0.2..=0.6).contains(&cv) && mid_range / n > 0.6 {
            signal += 5.0;
        }
    }

    let with_cents = amounts.iter().filter(|a| stats::has_cents(**a)).count() as f64;
    if with_cents / n > 0.7 {
        signal -= 5.0;
    }

    signal.max(0.0)
}

/// Throughput signal, max 10: money in roughly equals money out.
fn throughput_signal(meta: &NodeMetadata) -> f64 {
    if meta.total_sent > 0.0 {
        if let Some(ratio) = meta.throughput_ratio {
            if ratio > 0.7 && ratio < 1.3 {
                return 10.0;
            }
        }
    }
    0.0
}

/// Legitimacy penalty: sustained, business-hours, regularly spaced, or
/// merchant/payroll-shaped activity pulls the score down.
fn legitimacy_penalty(sample: &Sample, meta: &NodeMetadata, hour_offset: i32) -> f64 {
    let mut penalty = 0.0;
    let window = sample.window_hours();

    if window > 72.0 {
        penalty += 10.0;
    }
    if window > 168.0 {
        penalty += 10.0;
    }
    if window > 720.0 {
        penalty += 15.0;
    }

    if !sample.timestamps.is_empty() {
        let business = sample
            .timestamps
            .iter()
            .filter(|ts| (8..=18).contains(&stats::local_hour(**ts, hour_offset)))
            .count() as f64;
        if business / sample.timestamps.len() as f64 > 0.7 {
            penalty += 10.0;
        }
    }

    let gaps = stats::gaps_seconds(&sample.timestamps);
    if stats::matches_regular_interval(&gaps, 0.2) {
        penalty += 15.0;
    }

    if amount_mode_fraction(&sample.amounts) > 0.4 {
        penalty += 10.0;
    }

    let senders = meta.unique_senders();
    let receivers = meta.unique_receivers();
    let overlap = meta.counterparty_overlap();
    if receivers <= 5 && senders >= 15 && (overlap as f64 / senders.max(1) as f64) < 0.1 {
        penalty += 15.0;
    }
    if senders <= 5 && receivers >= 10 && overlap == 0 {
        penalty += 10.0;
    }

    penalty
}

/// Fraction of transactions sharing the most common rounded amount.
fn amount_mode_fraction(amounts: &[f64]) -> f64 {
    if amounts.is_empty() {
        return 0.0;
    }
    let mut counts: std::collections::HashMap<i64, usize> = std::collections::HashMap::new();
    for amount in amounts {
        *counts.entry(amount.round() as i64).or_insert(0) += 1;
    }
    let mode = counts.values().max().copied().unwrap_or(0);
    mode as f64 / amounts.len() as f64
}
