//! End-to-end scenarios over the full pipeline: canonical muling shapes in,
//! scored accounts and rings out.

use chrono::{DateTime, TimeZone, Utc};
use muletrace::{
    AmountPattern, AnalysisResults, FraudRingAnalyzer, PatternTag, RingKind, Transaction,
};

fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, day, hour, minute, 0).unwrap()
}

fn txn(id: &str, from: &str, to: &str, amount: f64, timestamp: DateTime<Utc>) -> Transaction {
    Transaction {
        transaction_id: id.to_string(),
        sender_id: from.to_string(),
        receiver_id: to.to_string(),
        amount,
        timestamp,
    }
}

fn analyze(transactions: &[Transaction]) -> AnalysisResults {
    FraudRingAnalyzer::new().analyze(transactions).unwrap()
}

fn suspect_ids(results: &AnalysisResults) -> Vec<&str> {
    results
        .suspicious_accounts
        .iter()
        .map(|s| s.account_id.as_str())
        .collect()
}

#[test]
fn exact_passthrough_shell_chain() {
    let results = analyze(&[
        txn("T1", "O1", "SH1", 200_000.0, at(6, 10, 0)),
        txn("T2", "SH1", "SH2", 200_000.0, at(6, 10, 8)),
        txn("T3", "SH2", "SH3", 200_000.0, at(6, 10, 15)),
        txn("T4", "SH3", "E1", 200_000.0, at(6, 10, 23)),
    ]);

    assert_eq!(results.fraud_rings.len(), 1);
    let ring = &results.fraud_rings[0];
    assert_eq!(ring.pattern_type, RingKind::ShellNetwork);
    assert_eq!(
        ring.member_accounts,
        vec!["E1", "O1", "SH1", "SH2", "SH3"]
    );
    assert_eq!(ring.chain_length, Some(5));
    assert_eq!(ring.amount_pattern, Some(AmountPattern::ExactPassthrough));
    assert!(ring.risk_score >= 60.0);

    for shell in ["SH1", "SH2", "SH3"] {
        let suspect = results
            .suspicious_accounts
            .iter()
            .find(|s| s.account_id == shell)
            .expect("shell intermediary flagged");
        assert!(suspect
            .detected_patterns
            .contains(&PatternTag::ShellIntermediary));
    }
}

#[test]
fn gradual_decay_shell_chain() {
    let results = analyze(&[
        txn("T1", "O1", "SH1", 200_000.0, at(6, 11, 0)),
        txn("T2", "SH1", "SH2", 198_000.0, at(6, 11, 8)),
        txn("T3", "SH2", "SH3", 195_000.0, at(6, 11, 15)),
        txn("T4", "SH3", "E1", 190_000.0, at(6, 11, 23)),
    ]);

    assert_eq!(results.fraud_rings.len(), 1);
    let ring = &results.fraud_rings[0];
    assert_eq!(ring.amount_pattern, Some(AmountPattern::GradualDecay));
    assert!(ring.risk_score >= 60.0);
    assert!(suspect_ids(&results).contains(&"SH2"));
}

#[test]
fn three_cycle_ring() {
    let results = analyze(&[
        txn("T1", "A", "B", 10_000.0, at(6, 9, 0)),
        txn("T2", "B", "C", 9_900.0, at(6, 9, 50)),
        txn("T3", "C", "A", 9_800.0, at(6, 10, 40)),
    ]);

    assert_eq!(results.fraud_rings.len(), 1);
    let ring = &results.fraud_rings[0];
    assert_eq!(ring.pattern_type, RingKind::Cycle);
    assert_eq!(ring.cycle_length, Some(3));
    assert!(ring.risk_score >= 70.0);

    let flagged = suspect_ids(&results);
    for account in ["A", "B", "C"] {
        assert!(flagged.contains(&account));
    }
}

fn fan_in_batch() -> Vec<Transaction> {
    (0..12)
        .map(|i| {
            txn(
                &format!("T{:02}", i),
                &format!("S{:02}", i),
                "H",
                9_500.0,
                at(6, 10 + (i / 4) as u32, (i % 4 * 13) as u32),
            )
        })
        .collect()
}

#[test]
fn fan_in_smurf_ring() {
    let results = analyze(&fan_in_batch());

    assert_eq!(results.fraud_rings.len(), 1);
    let ring = &results.fraud_rings[0];
    assert_eq!(ring.pattern_type, RingKind::FanIn);
    assert_eq!(ring.hub_in.as_deref(), Some("H"));
    assert!(ring.member_accounts.iter().any(|m| m == "H"));
    for i in 0..12 {
        let sender = format!("S{:02}", i);
        assert!(ring.member_accounts.contains(&sender));
    }
    assert!(ring.risk_score >= 60.0);

    let hub = results
        .suspicious_accounts
        .iter()
        .find(|s| s.account_id == "H")
        .expect("hub flagged");
    assert!(hub.detected_patterns.contains(&PatternTag::FanIn));
}

/// Forty payers over ten business days, scattered small amounts, no outflow.
fn merchant_batch() -> Vec<Transaction> {
    (0..40u32)
        .map(|i| {
            txn(
                &format!("M{:03}", i),
                &format!("C{:02}", i),
                "M",
                5.0 + (i as f64 * 37.3) % 495.0,
                at(2 + (i % 10), 9 + (i % 9), i % 60),
            )
        })
        .collect()
}

#[test]
fn merchant_false_positive_suppressed() {
    let results = analyze(&merchant_batch());

    assert!(results
        .fraud_rings
        .iter()
        .all(|ring| ring.hub_in.as_deref() != Some("M")
            && !ring.member_accounts.iter().any(|m| m == "M")));
    assert!(!suspect_ids(&results).contains(&"M"));
}

#[test]
fn payroll_false_positive_suppressed() {
    let mut transactions = Vec::new();
    let mut id = 0;
    // Identical day-of-month runs across three months, one funding source.
    for month in 1..=3u32 {
        for i in 0..25u32 {
            transactions.push(txn(
                &format!("P{:03}", id),
                "P",
                &format!("W{:02}", i),
                2_412.33,
                Utc.with_ymd_and_hms(2026, month, 25, 10, i % 60, 0).unwrap(),
            ));
            id += 1;
        }
        transactions.push(txn(
            &format!("F{:03}", month),
            "CORP",
            "P",
            61_000.0,
            Utc.with_ymd_and_hms(2026, month, 24, 15, 0, 0).unwrap(),
        ));
    }

    let results = analyze(&transactions);
    assert!(results
        .fraud_rings
        .iter()
        .all(|ring| ring.pattern_type != RingKind::FanOut
            || ring.hub_out.as_deref() != Some("P")));
    assert!(!suspect_ids(&results).contains(&"P"));
}

#[test]
fn idempotence_is_byte_equal() {
    let mut batch = fan_in_batch();
    batch.extend([
        txn("C1", "A", "B", 10_000.0, at(7, 9, 0)),
        txn("C2", "B", "C", 9_900.0, at(7, 9, 45)),
        txn("C3", "C", "A", 9_800.0, at(7, 10, 30)),
    ]);
    let analyzer = FraudRingAnalyzer::new();
    let mut first = analyzer.analyze(&batch).unwrap();
    let mut second = analyzer.analyze(&batch).unwrap();
    first.summary.processing_time_seconds = 0.0;
    second.summary.processing_time_seconds = 0.0;
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
}

#[test]
fn permutation_invariance_of_memberships() {
    let mut batch = fan_in_batch();
    batch.extend([
        txn("C1", "A", "B", 10_000.0, at(7, 9, 0)),
        txn("C2", "B", "C", 9_900.0, at(7, 9, 45)),
        txn("C3", "C", "A", 9_800.0, at(7, 10, 30)),
    ]);
    let forward = analyze(&batch);
    let mut reversed_batch = batch.clone();
    reversed_batch.reverse();
    let reversed = analyze(&reversed_batch);

    assert_eq!(suspect_ids(&forward), suspect_ids(&reversed));
    let memberships = |r: &AnalysisResults| -> Vec<Vec<String>> {
        r.fraud_rings
            .iter()
            .map(|ring| ring.member_accounts.clone())
            .collect()
    };
    assert_eq!(memberships(&forward), memberships(&reversed));
}

#[test]
fn legitimacy_dominance() {
    // The smurf hub alone is flagged...
    let flagged = analyze(&fan_in_batch());
    assert!(suspect_ids(&flagged).contains(&"H"));

    // ...but widening its inflow into a sustained, business-hours merchant
    // profile can only remove it from the output, never add to it.
    let mut widened = fan_in_batch();
    for i in 0..30u32 {
        widened.push(txn(
            &format!("L{:02}", i),
            &format!("C{:02}", i),
            "H",
            45.0 + (i as f64 * 21.7) % 410.0,
            at(10 + (i % 14), 9 + (i % 9), i % 60),
        ));
    }
    let cleared = analyze(&widened);
    assert!(!suspect_ids(&cleared).contains(&"H"));
    assert!(cleared
        .fraud_rings
        .iter()
        .all(|ring| ring.hub_in.as_deref() != Some("H")));
}

#[test]
fn ring_ids_are_sequential_and_unique() {
    let mut batch = fan_in_batch();
    batch.extend([
        txn("C1", "A", "B", 10_000.0, at(7, 9, 0)),
        txn("C2", "B", "C", 9_900.0, at(7, 9, 45)),
        txn("C3", "C", "A", 9_800.0, at(7, 10, 30)),
        txn("S1", "O1", "X1", 80_000.0, at(8, 10, 0)),
        txn("S2", "X1", "X2", 80_000.0, at(8, 10, 10)),
        txn("S3", "X2", "X3", 80_000.0, at(8, 10, 20)),
        txn("S4", "X3", "E9", 80_000.0, at(8, 10, 30)),
    ]);
    let results = analyze(&batch);
    assert!(results.fraud_rings.len() >= 3);
    for (index, ring) in results.fraud_rings.iter().enumerate() {
        assert_eq!(ring.ring_id, format!("RING_{:03}", index + 1));
    }
}

#[test]
fn suspects_reference_their_primary_ring() {
    let results = analyze(&fan_in_batch());
    let ring_ids: Vec<&str> = results
        .fraud_rings
        .iter()
        .map(|r| r.ring_id.as_str())
        .collect();
    for suspect in &results.suspicious_accounts {
        assert!(ring_ids.contains(&suspect.ring_id.as_str()));
    }
}
