//! Ring records shared by the detectors, and the post-filter merge pass.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::shell_networks::AmountPattern;

/// Structural pattern behind a ring. Closed enumeration; code over rings
/// branches on this tag rather than a type hierarchy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RingKind {
    Cycle,
    FanIn,
    FanOut,
    FanInFanOut,
    ShellNetwork,
}

impl RingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RingKind::Cycle => "cycle",
            RingKind::FanIn => "fan_in",
            RingKind::FanOut => "fan_out",
            RingKind::FanInFanOut => "fan_in_fan_out",
            RingKind::ShellNetwork => "shell_network",
        }
    }

    /// Severity family used by the ring scoring stage.
    pub fn normalized(&self) -> NormalizedKind {
        match self {
            RingKind::Cycle => NormalizedKind::CycleRing,
            RingKind::ShellNetwork => NormalizedKind::LayeredChain,
            RingKind::FanIn | RingKind::FanOut | RingKind::FanInFanOut => {
                NormalizedKind::SmurfCluster
            }
        }
    }
}

impl std::fmt::Display for RingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized ring family for severity scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizedKind {
    CycleRing,
    LayeredChain,
    SmurfCluster,
}

/// Detector output prior to scoring. Membership is a set; the hub of a
/// combined fan-in/fan-out group appears exactly once.
#[derive(Debug, Clone)]
pub struct RawRing {
    pub kind: RingKind,
    pub members: BTreeSet<String>,
    /// Aggregator for fan-in and combined groups.
    pub hub_in: Option<String>,
    /// Disperser for fan-out and combined groups.
    pub hub_out: Option<String>,
    pub time_window_hours: Option<f64>,
    pub raw_score: f64,
    pub cycle_length: Option<usize>,
    pub chain_length: Option<usize>,
    pub amount_pattern: Option<AmountPattern>,
}

impl RawRing {
    /// Hop count used for chain severity: edges for chains, vertices for
    /// cycles, membership size otherwise.
    pub fn hop_length(&self) -> usize {
        if let Some(chain) = self.chain_length {
            chain.saturating_sub(1)
        } else if let Some(cycle) = self.cycle_length {
            cycle
        } else {
            self.members.len()
        }
    }
}

/// Membership overlap relative to the smaller ring.
fn overlap_ratio(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let smaller = a.len().min(b.len());
    if smaller == 0 {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    shared as f64 / smaller as f64
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, index: usize) -> usize {
        if self.parent[index] != index {
            let root = self.find(self.parent[index]);
            self.parent[index] = root;
        }
        self.parent[index]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            // Attach to the lower index so each component's representative
            // is its first-produced ring.
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

/// Greedily union rings of identical kind with more than 50% membership
/// overlap. The merged ring carries the union of members and the
/// kind-specific fields of the first ring in its group; production order
/// is preserved.
pub fn merge_rings(rings: Vec<RawRing>) -> Vec<RawRing> {
    if rings.len() < 2 {
        return rings;
    }

    let mut sets = DisjointSet::new(rings.len());
    for i in 0..rings.len() {
        for j in (i + 1)..rings.len() {
            if rings[i].kind == rings[j].kind
                && overlap_ratio(&rings[i].members, &rings[j].members) > 0.5
            {
                sets.union(i, j);
            }
        }
    }

    let mut merged: Vec<RawRing> = Vec::new();
    let mut root_slot: Vec<Option<usize>> = vec![None; rings.len()];
    for (index, ring) in rings.into_iter().enumerate() {
        let root = sets.find(index);
        match root_slot[root] {
            Some(slot) => {
                merged[slot].members.extend(ring.members);
            }
            None => {
                root_slot[root] = Some(merged.len());
                merged.push(ring);
            }
        }
    }
    merged
}
