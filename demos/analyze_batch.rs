//! Batch analysis example
//!
//! This example demonstrates the full money-muling pipeline on a small
//! batch containing a laundering cycle, a smurfing fan-in, a layered shell
//! chain, and a legitimate merchant that must not be flagged.

use chrono::{TimeZone, Utc};
use muletrace::{FraudRingAnalyzer, Transaction, TransactionGraph};

fn txn(id: &str, from: &str, to: &str, amount: f64, day: u32, hour: u32, minute: u32) -> Transaction {
    Transaction {
        transaction_id: id.to_string(),
        sender_id: from.to_string(),
        receiver_id: to.to_string(),
        amount,
        timestamp: Utc.with_ymd_and_hms(2026, 1, day, hour, minute, 0).unwrap(),
    }
}

fn main() {
    println!("=== Money-Muling Detection Engine ===\n");

    let mut transactions = Vec::new();

    // A three-party laundering cycle inside two hours.
    transactions.push(txn("CYC-001", "ACCT-ALPHA", "ACCT-BRAVO", 10_000.0, 6, 9, 0));
    transactions.push(txn("CYC-002", "ACCT-BRAVO", "ACCT-CHARLIE", 9_900.0, 6, 9, 50));
    transactions.push(txn("CYC-003", "ACCT-CHARLIE", "ACCT-ALPHA", 9_800.0, 6, 10, 40));

    // Twelve money mules feed one aggregator overnight.
    for i in 0..12 {
        transactions.push(txn(
            &format!("SMF-{:03}", i),
            &format!("MULE-{:02}", i),
            "AGGREGATOR",
            9_400.0,
            7,
            1 + (i / 4) as u32,
            (i % 4 * 12) as u32,
        ));
    }

    // A pass-through shell chain moving a large sum in under an hour.
    transactions.push(txn("SHL-001", "ORIGIN", "SHELL-A", 150_000.0, 8, 22, 0));
    transactions.push(txn("SHL-002", "SHELL-A", "SHELL-B", 150_000.0, 8, 22, 12));
    transactions.push(txn("SHL-003", "SHELL-B", "SHELL-C", 150_000.0, 8, 22, 25));
    transactions.push(txn("SHL-004", "SHELL-C", "CASHOUT", 150_000.0, 8, 22, 40));

    // A storefront with forty customers over two weeks: structurally a
    // fan-in, behaviorally a merchant.
    for i in 0..40u32 {
        transactions.push(txn(
            &format!("MRC-{:03}", i),
            &format!("CUST-{:02}", i),
            "STOREFRONT",
            8.0 + (i as f64 * 41.7) % 480.0,
            2 + (i % 14),
            9 + (i % 9),
            i % 60,
        ));
    }

    let graph = TransactionGraph::build(&transactions);
    let stats = graph.stats();
    println!("Batch: {} transactions", transactions.len());
    println!(
        "Graph: {} accounts, {} edges, total volume ${:.2}\n",
        stats.account_count, stats.edge_count, stats.total_volume
    );

    let analyzer = FraudRingAnalyzer::new();
    let results = match analyzer.analyze(&transactions) {
        Ok(results) => results,
        Err(err) => {
            eprintln!("analysis failed: {}", err);
            return;
        }
    };

    println!("--- Fraud Rings ---");
    for ring in &results.fraud_rings {
        println!(
            "{} [{}] risk {:.1} ({}) members: {}",
            ring.ring_id,
            ring.pattern_type,
            ring.risk_score,
            ring.risk_label,
            ring.member_accounts.join(", ")
        );
        if let Some(pattern) = ring.amount_pattern {
            println!("      amount pattern: {}", pattern);
        }
        if let Some(hub) = &ring.hub_in {
            println!("      aggregator: {}", hub);
        }
    }

    println!("\n--- Suspicious Accounts (top 10) ---");
    for suspect in results.suspicious_accounts.iter().take(10) {
        println!(
            "{:<14} score {:>5.1} ({}) ring {}",
            suspect.account_id, suspect.suspicion_score, suspect.suspicion_label, suspect.ring_id
        );
    }

    println!("\n--- Summary ---");
    println!(
        "accounts analyzed: {}",
        results.summary.total_accounts_analyzed
    );
    println!(
        "accounts flagged:  {}",
        results.summary.suspicious_accounts_flagged
    );
    println!(
        "rings detected:    {}",
        results.summary.fraud_rings_detected
    );
    println!(
        "elapsed:           {:.3}s",
        results.summary.processing_time_seconds
    );

    // The merchant and its customers must stay out of the output.
    let flagged_storefront = results
        .suspicious_accounts
        .iter()
        .any(|s| s.account_id == "STOREFRONT");
    println!(
        "\nSTOREFRONT flagged: {} (expected: false)",
        flagged_storefront
    );
}
