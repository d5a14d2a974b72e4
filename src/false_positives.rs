//! Legitimate-hub classification and suppression.
//!
//! Merchants, payroll sources, and exchanges share the structural shape of
//! muling hubs. This pass classifies them from the whole graph before rings
//! are finalized, then strips them (and their orbiting counterparties) from
//! the detector output.

use std::collections::BTreeSet;

use crate::graph::{NodeMetadata, TransactionGraph};
use crate::rings::RawRing;
use crate::stats;
use crate::{AnalysisError, AnalyzerConfig};

/// Accounts cleared by the filter. Hubs discard whole rings; plain
/// legitimate accounts are only removed from memberships and suspects.
#[derive(Debug, Clone, Default)]
pub struct LegitimacySets {
    pub legitimate_accounts: BTreeSet<String>,
    pub legitimate_hubs: BTreeSet<String>,
}

impl LegitimacySets {
    pub fn is_legitimate_account(&self, account: &str) -> bool {
        self.legitimate_accounts.contains(account)
    }

    pub fn is_legitimate_hub(&self, account: &str) -> bool {
        self.legitimate_hubs.contains(account)
    }

    /// Apply the filter to raw rings: discard rings touching a legitimate
    /// hub, strip legitimate accounts from the rest, and drop rings whose
    /// remaining membership falls below three.
    pub fn filter_rings(&self, rings: Vec<RawRing>) -> Vec<RawRing> {
        rings
            .into_iter()
            .filter_map(|mut ring| {
                let hub_is_legit = ring
                    .hub_in
                    .as_deref()
                    .map(|h| self.is_legitimate_hub(h))
                    .unwrap_or(false)
                    || ring
                        .hub_out
                        .as_deref()
                        .map(|h| self.is_legitimate_hub(h))
                        .unwrap_or(false);
                if hub_is_legit {
                    return None;
                }
                if ring.members.iter().any(|m| self.is_legitimate_hub(m)) {
                    return None;
                }
                ring.members
                    .retain(|m| !self.legitimate_accounts.contains(m));
                if ring.members.len() < 3 {
                    return None;
                }
                Some(ring)
            })
            .collect()
    }
}

/// Classify every account against the merchant, payroll, and exchange
/// profiles, then sweep their low-activity counterparties.
pub fn classify_legitimate_accounts(
    graph: &TransactionGraph,
    config: &AnalyzerConfig,
) -> Result<LegitimacySets, AnalysisError> {
    let mut sets = LegitimacySets::default();

    for &account in &graph.accounts_sorted() {
        let meta = graph.require_metadata(account)?;
        if is_merchant(graph, account, meta, config)
            || is_payroll(graph, account, meta, config)
            || is_exchange(meta)
        {
            sets.legitimate_accounts.insert(account.clone());
            sets.legitimate_hubs.insert(account.clone());
        }
    }

    sweep_counterparties(graph, &mut sets)?;

    tracing::debug!(
        hubs = sets.legitimate_hubs.len(),
        accounts = sets.legitimate_accounts.len(),
        "false-positive classification finished"
    );
    Ok(sets)
}

/// Merchant: broad payer base, almost no outflow fan, organic amounts and
/// hours. Gate first, then accumulate legitimacy points to 40.
fn is_merchant(
    graph: &TransactionGraph,
    account: &str,
    meta: &NodeMetadata,
    config: &AnalyzerConfig,
) -> bool {
    let senders = meta.unique_senders();
    if senders < 10 || meta.unique_receivers() > 5 {
        return false;
    }
    if meta.counterparty_overlap() as f64 / senders.max(1) as f64 >= 0.2 {
        return false;
    }

    let in_edges = graph.in_edges(account);
    let amounts: Vec<f64> = in_edges.iter().map(|e| e.amount).collect();
    let mut timestamps: Vec<_> = in_edges.iter().map(|e| e.timestamp).collect();
    timestamps.sort();

    let mut points = 0.0;
    if let Some(cv) = stats::coefficient_of_variation(&amounts) {
        if cv > 0.4 {
            points += 20.0;
        }
    }
    if let Some(span) = stats::span_hours(&timestamps) {
        if span > 168.0 {
            points += 25.0;
        } else if span > 72.0 {
            points += 15.0;
        }
    }
    if !timestamps.is_empty() {
        let business = timestamps
            .iter()
            .filter(|ts| (8..=20).contains(&stats::local_hour(**ts, config.local_hour_offset)))
            .count() as f64;
        if business / timestamps.len() as f64 > 0.6 {
            points += 20.0;
        }
    }
    let gaps = stats::gaps_seconds(&timestamps);
    if let Some(gap_cv) = stats::coefficient_of_variation(&gaps) {
        if gap_cv < 0.8 {
            points += 15.0;
        }
    }
    if let Some(span) = stats::span_hours(&timestamps) {
        if span > 0.0 && meta.total_received / span < 500.0 {
            points += 10.0;
        }
    }

    points >= 40.0
}

/// Payroll: few funding sources, many regularly paid receivers, zero
/// counterparty overlap.
fn is_payroll(
    graph: &TransactionGraph,
    account: &str,
    meta: &NodeMetadata,
    config: &AnalyzerConfig,
) -> bool {
    if meta.unique_receivers() < 10
        || meta.unique_senders() > 5
        || meta.out_degree < 10
        || meta.counterparty_overlap() != 0
    {
        return false;
    }

    let out_edges = graph.out_edges(account);
    let amounts: Vec<f64> = out_edges.iter().map(|e| e.amount).collect();
    let mut timestamps: Vec<_> = out_edges.iter().map(|e| e.timestamp).collect();
    timestamps.sort();

    let mut points = 0.0;
    if largest_amount_cluster(&amounts) as f64 / amounts.len().max(1) as f64 > 0.3 {
        points += 20.0;
    }
    let with_cents = amounts.iter().filter(|a| stats::has_cents(**a)).count() as f64;
    if with_cents / amounts.len().max(1) as f64 > 0.5 {
        points += 15.0;
    }
    if repeat_receiver_fraction(out_edges.iter().map(|e| e.to.as_str())) >= 0.4 {
        points += 15.0;
    }
    let gaps = stats::gaps_seconds(&timestamps);
    if stats::matches_regular_interval(&gaps, 0.25) {
        points += 20.0;
    }
    if !timestamps.is_empty() {
        let business = timestamps
            .iter()
            .filter(|ts| (8..=18).contains(&stats::local_hour(**ts, config.local_hour_offset)))
            .count() as f64;
        if business / timestamps.len() as f64 > 0.7 {
            points += 10.0;
        }
    }
    if let Some(span) = stats::span_hours(&timestamps) {
        if span > 168.0 {
            points += 15.0;
        } else if span > 72.0 {
            points += 10.0;
        }
    }

    points >= 40.0
}

/// Exchange/platform: wide two-sided traffic with little overlap over a
/// sustained window. No point system; the shape itself is the evidence.
fn is_exchange(meta: &NodeMetadata) -> bool {
    let senders = meta.unique_senders();
    let receivers = meta.unique_receivers();
    if senders < 20 || receivers < 20 {
        return false;
    }
    let overlap = meta.counterparty_overlap() as f64;
    if overlap / senders.max(receivers).max(1) as f64 >= 0.15 {
        return false;
    }
    stats::span_hours(&meta.all_timestamps)
        .map(|span| span > 48.0)
        .unwrap_or(false)
}

/// Mark counterparties that exist almost entirely in a legitimate hub's
/// orbit. They suppress individual accounts only, never whole rings.
fn sweep_counterparties(
    graph: &TransactionGraph,
    sets: &mut LegitimacySets,
) -> Result<(), AnalysisError> {
    let hubs: Vec<String> = sets.legitimate_hubs.iter().cloned().collect();
    for hub in hubs {
        let hub_meta = graph.require_metadata(&hub)?;
        let mut neighbors: BTreeSet<&String> = BTreeSet::new();
        neighbors.extend(hub_meta.senders.iter());
        neighbors.extend(hub_meta.receivers.iter());

        for neighbor in neighbors {
            if sets.legitimate_accounts.contains(neighbor) {
                continue;
            }
            let meta = graph.require_metadata(neighbor)?;
            if meta.tx_count() > 5 {
                continue;
            }
            let interactions = graph
                .out_edges(neighbor)
                .iter()
                .filter(|e| e.to == hub)
                .count()
                + graph
                    .in_edges(neighbor)
                    .iter()
                    .filter(|e| e.from == hub)
                    .count();
            let dominated = interactions as f64 > 0.5 * meta.tx_count() as f64;
            if dominated || meta.tx_count() <= 3 {
                sets.legitimate_accounts.insert(neighbor.clone());
            }
        }
    }
    Ok(())
}

/// Size of the largest group of amounts within 10% of the group's start,
/// over the sorted values.
fn largest_amount_cluster(amounts: &[f64]) -> usize {
    if amounts.is_empty() {
        return 0;
    }
    let mut sorted = amounts.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut largest = 1;
    let mut start = sorted[0];
    let mut current = 1;
    for amount in &sorted[1..] {
        if *amount <= start * 1.1 {
            current += 1;
        } else {
            start = *amount;
            current = 1;
        }
        largest = largest.max(current);
    }
    largest
}

/// Fraction of distinct receivers paid at least twice.
fn repeat_receiver_fraction<'a>(receivers: impl Iterator<Item = &'a str>) -> f64 {
    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for receiver in receivers {
        *counts.entry(receiver).or_insert(0) += 1;
    }
    if counts.is_empty() {
        return 0.0;
    }
    let repeated = counts.values().filter(|c| **c >= 2).count();
    repeated as f64 / counts.len() as f64
}
