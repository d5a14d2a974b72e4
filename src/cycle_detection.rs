//! Directed-cycle enumeration over the transfer graph.
//!
//! Money returning to its origin through a short chain of accounts is the
//! classic layering shape. Enumeration is a pruned depth-first search seeded
//! at each account in ascending lexicographic order; intermediate vertices
//! must be strictly greater than the seed, which yields each cycle exactly
//! once rooted at its smallest member.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::graph::TransactionGraph;
use crate::stats;
use crate::{AnalysisError, AnalyzerConfig};

/// One enumerated simple cycle with the concrete edges walked.
#[derive(Debug, Clone)]
pub struct CycleFinding {
    /// Cycle vertices in canonical rotation (smallest member first).
    pub accounts: Vec<String>,
    /// Edge amounts in traversal order, closing edge last.
    pub amounts: Vec<f64>,
    /// Edge timestamps in traversal order, closing edge last.
    pub timestamps: Vec<DateTime<Utc>>,
    pub score: f64,
}

/// Detector output plus the enumeration-cap flag.
#[derive(Debug, Clone)]
pub struct CycleDetection {
    pub cycles: Vec<CycleFinding>,
    /// True when the result cap terminated enumeration early.
    pub cap_hit: bool,
}

/// Enumerate and score simple directed cycles of length 3 to 5.
pub fn detect_cycles(
    graph: &TransactionGraph,
    config: &AnalyzerConfig,
) -> Result<CycleDetection, AnalysisError> {
    let mut search = CycleSearch {
        graph,
        config,
        seen: HashSet::new(),
        cycles: Vec::new(),
        cap_hit: false,
    };

    for seed in graph.accounts_sorted() {
        if search.cap_hit {
            break;
        }
        let meta = graph.require_metadata(seed)?;
        if meta.out_degree > config.cycle_max_out_degree {
            // High-degree hubs blow up enumeration and are almost always
            // legitimate; the false-positive filter handles them anyway.
            continue;
        }
        let mut path = vec![seed.clone()];
        let mut on_path: HashSet<String> = HashSet::new();
        on_path.insert(seed.clone());
        search.dfs(seed, seed, &mut path, &mut Vec::new(), &mut Vec::new(), &mut on_path)?;
    }

    tracing::debug!(
        cycles = search.cycles.len(),
        cap_hit = search.cap_hit,
        "cycle enumeration finished"
    );

    Ok(CycleDetection {
        cycles: search.cycles,
        cap_hit: search.cap_hit,
    })
}

struct CycleSearch<'a> {
    graph: &'a TransactionGraph,
    config: &'a AnalyzerConfig,
    seen: HashSet<Vec<String>>,
    cycles: Vec<CycleFinding>,
    cap_hit: bool,
}

impl CycleSearch<'_> {
    fn dfs(
        &mut self,
        seed: &str,
        current: &str,
        path: &mut Vec<String>,
        amounts: &mut Vec<f64>,
        timestamps: &mut Vec<DateTime<Utc>>,
        on_path: &mut HashSet<String>,
    ) -> Result<(), AnalysisError> {
        let graph = self.graph;
        for edge in graph.out_edges(current) {
            if self.cap_hit {
                return Ok(());
            }

            if edge.to == seed {
                if path.len() >= self.config.cycle_min_length
                    && path.len() <= self.config.cycle_max_length
                {
                    self.record_cycle(path, amounts, timestamps, edge.amount, edge.timestamp)?;
                }
                continue;
            }

            if path.len() >= self.config.cycle_max_length {
                continue;
            }
            // Johnson-style lower bound: intermediates strictly above the seed.
            if edge.to.as_str() <= seed {
                continue;
            }
            if on_path.contains(&edge.to) {
                continue;
            }
            let next_meta = graph.require_metadata(&edge.to)?;
            if next_meta.out_degree > self.config.cycle_max_out_degree {
                continue;
            }

            path.push(edge.to.clone());
            on_path.insert(edge.to.clone());
            amounts.push(edge.amount);
            timestamps.push(edge.timestamp);

            self.dfs(seed, &edge.to, path, amounts, timestamps, on_path)?;

            path.pop();
            on_path.remove(&edge.to);
            amounts.pop();
            timestamps.pop();
        }
        Ok(())
    }

    fn record_cycle(
        &mut self,
        path: &[String],
        amounts: &[f64],
        timestamps: &[DateTime<Utc>],
        closing_amount: f64,
        closing_timestamp: DateTime<Utc>,
    ) -> Result<(), AnalysisError> {
        let canonical = canonical_rotation(path);
        if !self.seen.insert(canonical.clone()) {
            return Ok(());
        }

        let mut cycle_amounts = amounts.to_vec();
        cycle_amounts.push(closing_amount);
        let mut cycle_timestamps = timestamps.to_vec();
        cycle_timestamps.push(closing_timestamp);

        let score = self.score_cycle(&canonical, &cycle_amounts, &cycle_timestamps)?;
        self.cycles.push(CycleFinding {
            accounts: canonical,
            amounts: cycle_amounts,
            timestamps: cycle_timestamps,
            score,
        });

        if self.cycles.len() >= self.config.cycle_max_results {
            self.cap_hit = true;
        }
        Ok(())
    }

    fn score_cycle(
        &self,
        accounts: &[String],
        amounts: &[f64],
        timestamps: &[DateTime<Utc>],
    ) -> Result<f64, AnalysisError> {
        let mut score: f64 = 50.0;

        score += match accounts.len() {
            3 => 15.0,
            4 => 10.0,
            _ => 5.0,
        };

        if let Some(cv) = stats::coefficient_of_variation(amounts) {
            if cv < 0.1 {
                score += 15.0;
            } else if cv < 0.3 {
                score += 10.0;
            } else if cv < 0.5 {
                score += 5.0;
            }
        }

        if let Some(span) = stats::span_hours(timestamps) {
            if span < 24.0 {
                score += 15.0;
            } else if span < 72.0 {
                score += 10.0;
            } else if span < 168.0 {
                score += 5.0;
            }
        }

        let mut low_activity = 0usize;
        for account in accounts {
            if self.graph.require_metadata(account)?.tx_count() <= 5 {
                low_activity += 1;
            }
        }
        if low_activity * 2 > accounts.len() {
            score += 10.0;
        }

        Ok(score.clamp(0.0, 100.0))
    }
}

/// Rotate a cycle so its lexicographically smallest vertex comes first.
/// Direction is preserved; mirror cycles stay distinct.
fn canonical_rotation(path: &[String]) -> Vec<String> {
    let smallest = path
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(i, _)| i)
        .unwrap_or(0);
    path[smallest..]
        .iter()
        .chain(path[..smallest].iter())
        .cloned()
        .collect()
}
