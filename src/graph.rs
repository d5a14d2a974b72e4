//! Transaction graph construction for money-muling analysis.
//!
//! Builds forward and reverse adjacency plus per-account aggregates from a
//! validated transaction batch. The graph is immutable once built; every
//! detector reads it without further synchronization.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::{AnalysisError, Transaction};

/// Outgoing transfer edge, stored in insertion order.
#[derive(Debug, Clone)]
pub struct OutEdge {
    pub to: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    pub txn_id: String,
}

/// Incoming transfer edge, stored in insertion order.
#[derive(Debug, Clone)]
pub struct InEdge {
    pub from: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    pub txn_id: String,
}

/// Per-account aggregates derived in a single pass after ingestion.
#[derive(Debug, Clone)]
pub struct NodeMetadata {
    pub total_sent: f64,
    pub total_received: f64,
    pub in_degree: usize,
    pub out_degree: usize,
    /// Distinct counterparties that sent to this account.
    pub senders: HashSet<String>,
    /// Distinct counterparties this account sent to.
    pub receivers: HashSet<String>,
    /// All transaction timestamps, ascending, with multiplicity.
    pub all_timestamps: Vec<DateTime<Utc>>,
    /// Minimum gap between consecutive timestamps. None with fewer than two.
    pub min_time_delta: Option<Duration>,
    /// total_sent / total_received. None when nothing was received.
    pub throughput_ratio: Option<f64>,
}

impl NodeMetadata {
    fn new() -> Self {
        Self {
            total_sent: 0.0,
            total_received: 0.0,
            in_degree: 0,
            out_degree: 0,
            senders: HashSet::new(),
            receivers: HashSet::new(),
            all_timestamps: Vec::new(),
            min_time_delta: None,
            throughput_ratio: None,
        }
    }

    pub fn tx_count(&self) -> usize {
        self.in_degree + self.out_degree
    }

    pub fn unique_senders(&self) -> usize {
        self.senders.len()
    }

    pub fn unique_receivers(&self) -> usize {
        self.receivers.len()
    }

    /// Count of counterparties appearing on both sides.
    pub fn counterparty_overlap(&self) -> usize {
        self.senders.intersection(&self.receivers).count()
    }
}

/// Aggregate figures for a built graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStats {
    pub account_count: usize,
    pub edge_count: usize,
    pub total_volume: f64,
}

/// Directed transfer multigraph over a closed transaction batch.
pub struct TransactionGraph {
    forward: HashMap<String, Vec<OutEdge>>,
    reverse: HashMap<String, Vec<InEdge>>,
    metadata: HashMap<String, NodeMetadata>,
    edge_count: usize,
}

impl TransactionGraph {
    /// Build adjacency and metadata from an ordered transaction sequence.
    pub fn build(transactions: &[Transaction]) -> Self {
        let mut forward: HashMap<String, Vec<OutEdge>> = HashMap::new();
        let mut reverse: HashMap<String, Vec<InEdge>> = HashMap::new();

        for txn in transactions {
            forward
                .entry(txn.sender_id.clone())
                .or_default()
                .push(OutEdge {
                    to: txn.receiver_id.clone(),
                    amount: txn.amount,
                    timestamp: txn.timestamp,
                    txn_id: txn.transaction_id.clone(),
                });
            reverse
                .entry(txn.receiver_id.clone())
                .or_default()
                .push(InEdge {
                    from: txn.sender_id.clone(),
                    amount: txn.amount,
                    timestamp: txn.timestamp,
                    txn_id: txn.transaction_id.clone(),
                });
            // Both endpoints exist in both maps, possibly with empty lists.
            forward.entry(txn.receiver_id.clone()).or_default();
            reverse.entry(txn.sender_id.clone()).or_default();
        }

        let mut metadata: HashMap<String, NodeMetadata> = HashMap::new();
        for account in forward.keys() {
            let mut meta = NodeMetadata::new();

            if let Some(out_edges) = forward.get(account) {
                for edge in out_edges {
                    meta.total_sent += edge.amount;
                    meta.out_degree += 1;
                    meta.receivers.insert(edge.to.clone());
                    meta.all_timestamps.push(edge.timestamp);
                }
            }
            if let Some(in_edges) = reverse.get(account) {
                for edge in in_edges {
                    meta.total_received += edge.amount;
                    meta.in_degree += 1;
                    meta.senders.insert(edge.from.clone());
                    meta.all_timestamps.push(edge.timestamp);
                }
            }

            meta.all_timestamps.sort();
            meta.min_time_delta = meta
                .all_timestamps
                .windows(2)
                .map(|w| w[1] - w[0])
                .min();
            if meta.total_received > 0.0 {
                meta.throughput_ratio = Some(meta.total_sent / meta.total_received);
            }

            metadata.insert(account.clone(), meta);
        }

        Self {
            forward,
            reverse,
            metadata,
            edge_count: transactions.len(),
        }
    }

    /// All account identifiers in ascending lexicographic order.
    pub fn accounts_sorted(&self) -> Vec<&String> {
        let mut accounts: Vec<&String> = self.forward.keys().collect();
        accounts.sort();
        accounts
    }

    pub fn contains(&self, account: &str) -> bool {
        self.forward.contains_key(account)
    }

    pub fn out_edges(&self, account: &str) -> &[OutEdge] {
        self.forward.get(account).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn in_edges(&self, account: &str) -> &[InEdge] {
        self.reverse.get(account).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn metadata(&self, account: &str) -> Option<&NodeMetadata> {
        self.metadata.get(account)
    }

    /// Metadata lookup that treats absence as a pipeline bug.
    pub fn require_metadata(&self, account: &str) -> Result<&NodeMetadata, AnalysisError> {
        self.metadata.get(account).ok_or_else(|| {
            AnalysisError::InvariantViolation(format!(
                "account {} missing from metadata map",
                account
            ))
        })
    }

    pub fn account_count(&self) -> usize {
        self.forward.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Aggregate graph figures.
    pub fn stats(&self) -> GraphStats {
        let total_volume = self
            .forward
            .values()
            .flat_map(|edges| edges.iter().map(|e| e.amount))
            .sum();
        GraphStats {
            account_count: self.forward.len(),
            edge_count: self.edge_count,
            total_volume,
        }
    }
}
