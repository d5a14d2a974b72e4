//! Layered shell-chain tracing.
//!
//! A shell is a near-dormant account that both receives and forwards. Money
//! threaded through several shells in sequence, without growing and without
//! large unexplained drops, is the layering stage of a muling operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::graph::TransactionGraph;
use crate::stats;
use crate::{AnalysisError, AnalyzerConfig};

/// Progression of hop amounts along a chain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AmountPattern {
    /// Every hop within 1% of the previous amount.
    ExactPassthrough,
    /// At least half of the hop ratios in [0.80, 0.99).
    GradualDecay,
    Mixed,
}

impl AmountPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            AmountPattern::ExactPassthrough => "exact_passthrough",
            AmountPattern::GradualDecay => "gradual_decay",
            AmountPattern::Mixed => "mixed",
        }
    }
}

impl std::fmt::Display for AmountPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One traced chain: non-shell origin, shell interior, non-shell endpoint.
#[derive(Debug, Clone)]
pub struct ShellChain {
    pub accounts: Vec<String>,
    /// Hop amounts, one per edge.
    pub amounts: Vec<f64>,
    /// Hop timestamps, one per edge.
    pub timestamps: Vec<DateTime<Utc>>,
    pub amount_pattern: AmountPattern,
    pub score: f64,
}

/// Trace all coherent chains through low-activity intermediaries.
pub fn detect_shell_networks(
    graph: &TransactionGraph,
    config: &AnalyzerConfig,
) -> Result<Vec<ShellChain>, AnalysisError> {
    let mut shells: HashSet<&String> = HashSet::new();
    for &account in &graph.accounts_sorted() {
        let meta = graph.require_metadata(account)?;
        if meta.tx_count() <= config.shell_tx_threshold
            && meta.in_degree >= 1
            && meta.out_degree >= 1
        {
            shells.insert(account);
        }
    }

    let mut chains = Vec::new();
    let mut seen: HashSet<Vec<String>> = HashSet::new();

    let mut sorted_shells: Vec<&String> = shells.iter().copied().collect();
    sorted_shells.sort();

    for shell in sorted_shells {
        for entry in graph.in_edges(shell) {
            if shells.contains(&entry.from) {
                continue;
            }
            // Chain enters the shell layer here: origin -> first shell.
            let mut path = vec![entry.from.clone(), shell.clone()];
            let mut visited: HashSet<String> = path.iter().cloned().collect();
            let mut amounts = vec![entry.amount];
            let mut timestamps = vec![entry.timestamp];
            extend_chain(
                graph,
                config,
                &shells,
                shell,
                &mut path,
                &mut visited,
                &mut amounts,
                &mut timestamps,
                &mut seen,
                &mut chains,
            )?;
        }
    }

    tracing::debug!(chains = chains.len(), "shell network trace finished");
    Ok(chains)
}

#[allow(clippy::too_many_arguments)]
fn extend_chain(
    graph: &TransactionGraph,
    config: &AnalyzerConfig,
    shells: &HashSet<&String>,
    current: &str,
    path: &mut Vec<String>,
    visited: &mut HashSet<String>,
    amounts: &mut Vec<f64>,
    timestamps: &mut Vec<DateTime<Utc>>,
    seen: &mut HashSet<Vec<String>>,
    chains: &mut Vec<ShellChain>,
) -> Result<(), AnalysisError> {
    let previous_amount = *amounts.last().unwrap_or(&0.0);

    for edge in graph.out_edges(current) {
        // Money cannot grow along a chain, and a large drop breaks it.
        if edge.amount > previous_amount
            || previous_amount - edge.amount > config.shell_max_drop
        {
            continue;
        }
        if visited.contains(&edge.to) {
            continue;
        }

        if shells.contains(&edge.to) {
            // Leave room for a non-shell endpoint within the node cap.
            if path.len() + 1 > config.shell_max_nodes - 1 {
                continue;
            }
            path.push(edge.to.clone());
            visited.insert(edge.to.clone());
            amounts.push(edge.amount);
            timestamps.push(edge.timestamp);
            extend_chain(
                graph, config, shells, &edge.to, path, visited, amounts, timestamps, seen,
                chains,
            )?;
            path.pop();
            visited.remove(&edge.to);
            amounts.pop();
            timestamps.pop();
        } else {
            let node_count = path.len() + 1;
            if node_count < config.shell_min_nodes || node_count > config.shell_max_nodes {
                continue;
            }
            let mut accounts = path.clone();
            accounts.push(edge.to.clone());
            if !seen.insert(accounts.clone()) {
                continue;
            }
            let mut hop_amounts = amounts.clone();
            hop_amounts.push(edge.amount);
            let mut hop_timestamps = timestamps.clone();
            hop_timestamps.push(edge.timestamp);

            let amount_pattern = classify_amount_pattern(&hop_amounts);
            let score = score_chain(
                graph,
                &accounts,
                amount_pattern,
                &hop_timestamps,
            )?;
            chains.push(ShellChain {
                accounts,
                amounts: hop_amounts,
                timestamps: hop_timestamps,
                amount_pattern,
                score,
            });
        }
    }
    Ok(())
}

/// Classify the hop-amount progression.
fn classify_amount_pattern(amounts: &[f64]) -> AmountPattern {
    let ratios: Vec<f64> = amounts
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0])
        .collect();
    if ratios.is_empty() {
        return AmountPattern::Mixed;
    }
    if ratios.iter().all(|r| (r - 1.0).abs() <= 0.01) {
        return AmountPattern::ExactPassthrough;
    }
    let decaying = ratios
        .iter()
        .filter(|&&ratio| (0.80..0.99).contains(&ratio))
        .count();
    if decaying * 2 >= ratios.len() {
        AmountPattern::GradualDecay
    } else {
        AmountPattern::Mixed
    }
}

fn score_chain(
    graph: &TransactionGraph,
    accounts: &[String],
    pattern: AmountPattern,
    timestamps: &[DateTime<Utc>],
) -> Result<f64, AnalysisError> {
    let mut score: f64 = 45.0;

    score += match accounts.len() {
        n if n >= 6 => 20.0,
        5 => 15.0,
        4 => 10.0,
        _ => 5.0,
    };

    score += match pattern {
        AmountPattern::ExactPassthrough => 15.0,
        AmountPattern::GradualDecay => 20.0,
        AmountPattern::Mixed => 10.0,
    };

    let ordered = timestamps.windows(2).all(|w| w[0] <= w[1]);
    if ordered {
        if let Some(span) = stats::span_hours(timestamps) {
            if span < 24.0 {
                score += 15.0;
            } else if span < 72.0 {
                score += 10.0;
            } else if span < 168.0 {
                score += 5.0;
            }
        }
    }

    let interior = &accounts[1..accounts.len() - 1];
    let mut pure = 0usize;
    for account in interior {
        if graph.require_metadata(account)?.tx_count() == 2 {
            pure += 1;
        }
    }
    if pure * 2 > interior.len() {
        score += 10.0;
    }

    Ok(score.clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Transaction;
    use chrono::TimeZone;

    fn txn(id: &str, from: &str, to: &str, amount: f64, hour: u32, minute: u32) -> Transaction {
        Transaction {
            transaction_id: id.to_string(),
            sender_id: from.to_string(),
            receiver_id: to.to_string(),
            amount,
            timestamp: Utc.with_ymd_and_hms(2026, 1, 6, hour, minute, 0).unwrap(),
        }
    }

    fn detect(transactions: &[Transaction]) -> Vec<ShellChain> {
        let graph = TransactionGraph::build(transactions);
        detect_shell_networks(&graph, &AnalyzerConfig::default()).unwrap()
    }

    fn passthrough_chain() -> Vec<Transaction> {
        vec![
            txn("T1", "O1", "SH1", 200_000.0, 10, 0),
            txn("T2", "SH1", "SH2", 200_000.0, 10, 8),
            txn("T3", "SH2", "SH3", 200_000.0, 10, 15),
            txn("T4", "SH3", "E1", 200_000.0, 10, 23),
        ]
    }

    #[test]
    fn test_exact_passthrough_chain() {
        let chains = detect(&passthrough_chain());
        assert_eq!(chains.len(), 1);
        let chain = &chains[0];
        assert_eq!(chain.accounts, vec!["O1", "SH1", "SH2", "SH3", "E1"]);
        assert_eq!(chain.amount_pattern, AmountPattern::ExactPassthrough);
        assert_eq!(chain.amounts.len(), 4);
        assert_eq!(chain.score, 100.0);
    }

    #[test]
    fn test_gradual_decay_chain() {
        let chains = detect(&[
            txn("T1", "O1", "SH1", 200_000.0, 11, 0),
            txn("T2", "SH1", "SH2", 198_000.0, 11, 8),
            txn("T3", "SH2", "SH3", 195_000.0, 11, 15),
            txn("T4", "SH3", "E1", 190_000.0, 11, 23),
        ]);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].amount_pattern, AmountPattern::GradualDecay);
    }

    #[test]
    fn test_amount_increase_breaks_chain() {
        let chains = detect(&[
            txn("T1", "O1", "SH1", 5_000.0, 10, 0),
            txn("T2", "SH1", "SH2", 6_000.0, 10, 8),
            txn("T3", "SH2", "SH3", 6_000.0, 10, 15),
            txn("T4", "SH3", "E1", 6_000.0, 10, 23),
        ]);
        assert!(chains.is_empty());
    }

    #[test]
    fn test_large_drop_breaks_chain() {
        let chains = detect(&[
            txn("T1", "O1", "SH1", 50_000.0, 10, 0),
            txn("T2", "SH1", "SH2", 35_000.0, 10, 8),
            txn("T3", "SH2", "SH3", 35_000.0, 10, 15),
            txn("T4", "SH3", "E1", 35_000.0, 10, 23),
        ]);
        assert!(chains.is_empty());
    }

    #[test]
    fn test_short_chain_not_reported() {
        // Only one shell between the endpoints: three nodes, below minimum.
        let chains = detect(&[
            txn("T1", "O1", "SH1", 10_000.0, 10, 0),
            txn("T2", "SH1", "E1", 10_000.0, 10, 8),
        ]);
        assert!(chains.is_empty());
    }

    #[test]
    fn test_busy_intermediary_is_not_a_shell() {
        // SH2 carries extra traffic, pushing tx_count past the threshold.
        let mut transactions = passthrough_chain();
        transactions.push(txn("X1", "M1", "SH2", 50.0, 9, 0));
        transactions.push(txn("X2", "M2", "SH2", 50.0, 9, 5));
        let chains = detect(&transactions);
        assert!(chains.is_empty());
    }

    #[test]
    fn test_mixed_pattern() {
        let chains = detect(&[
            txn("T1", "O1", "SH1", 20_000.0, 10, 0),
            txn("T2", "SH1", "SH2", 12_000.0, 10, 8),
            txn("T3", "SH2", "SH3", 11_900.0, 10, 15),
            txn("T4", "SH3", "E1", 5_000.0, 10, 23),
        ]);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].amount_pattern, AmountPattern::Mixed);
    }

    #[test]
    fn test_seven_node_chain_reported() {
        let chains = detect(&[
            txn("T1", "O1", "SH1", 9_000.0, 10, 0),
            txn("T2", "SH1", "SH2", 9_000.0, 10, 5),
            txn("T3", "SH2", "SH3", 9_000.0, 10, 10),
            txn("T4", "SH3", "SH4", 9_000.0, 10, 15),
            txn("T5", "SH4", "SH5", 9_000.0, 10, 20),
            txn("T6", "SH5", "E1", 9_000.0, 10, 25),
        ]);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].accounts.len(), 7);
    }

    #[test]
    fn test_overlong_chain_not_reported() {
        // Eight nodes: the interior no longer fits under the node cap and
        // the only entry edge is the non-shell origin, so nothing is emitted.
        let chains = detect(&[
            txn("T1", "O1", "SH1", 9_000.0, 10, 0),
            txn("T2", "SH1", "SH2", 9_000.0, 10, 5),
            txn("T3", "SH2", "SH3", 9_000.0, 10, 10),
            txn("T4", "SH3", "SH4", 9_000.0, 10, 15),
            txn("T5", "SH4", "SH5", 9_000.0, 10, 20),
            txn("T6", "SH5", "SH6", 9_000.0, 10, 25),
            txn("T7", "SH6", "E1", 9_000.0, 10, 30),
        ]);
        assert!(chains.is_empty());
    }

    #[test]
    fn test_classify_ratio_boundaries() {
        assert_eq!(
            classify_amount_pattern(&[100.0, 99.5, 100.0]),
            AmountPattern::ExactPassthrough
        );
        assert_eq!(
            classify_amount_pattern(&[100.0, 90.0, 81.0]),
            AmountPattern::GradualDecay
        );
        // A cliff followed by a near-hold matches neither shape.
        assert_eq!(
            classify_amount_pattern(&[100.0, 50.0, 49.9]),
            AmountPattern::Mixed
        );
    }
}
