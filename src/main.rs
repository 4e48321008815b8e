//! AML Detection Engine - Demo Entry Point
//!
//! Ingests a synthetic transaction set through the pipeline, runs a full
//! batch analysis, and reports the resulting alerts and metrics.

use aml_engine::{AppConfig, Clock, MemoryStore, Pipeline, Store, SystemClock, Transaction};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

fn main() -> Result<()> {
    // Load configuration, falling back to defaults outside a deployment
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("using default configuration: {e:#}");
            AppConfig::default()
        }
    };

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("aml_engine={}", config.logging.level).parse()?);
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Starting AML detection engine");

    let clock: Arc<SystemClock> = Arc::new(SystemClock);
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let pipeline = Pipeline::new(
        store.clone(),
        Arc::new(config.detection.clone()),
        clock.clone(),
    );

    // Stream the sample set through the pipeline in chronological order
    for tx in sample_transactions(clock.now()) {
        match pipeline.process(tx) {
            Ok(outcome) => {
                for account in &outcome.accounts {
                    if account.alert_generated {
                        info!(
                            account_id = %account.account_id,
                            score = account.score,
                            risk_level = %account.risk_level,
                            "alert raised during ingestion"
                        );
                    }
                }
            }
            Err(e) => warn!(error = %e, "transaction rejected"),
        }
    }

    // Batch pass over the full history
    let report = pipeline.full_analysis()?;
    info!(
        accounts = report.accounts_evaluated,
        normal = report.normal,
        suspicious = report.suspicious,
        high_risk = report.high_risk,
        probable_ml = report.probable_ml,
        new_alerts = report.alerts_created,
        "full analysis"
    );

    let history = store.list_transactions()?;
    for evidence in pipeline.evidence().high_risk_accounts()? {
        let recent = pipeline
            .evidence()
            .baseline_engine()
            .recent_activity(&evidence.account_id, &history, 24);
        info!(
            account_id = %evidence.account_id,
            score = evidence.score,
            risk_level = %evidence.risk_level,
            transactions_24h = recent.len(),
            "high risk account"
        );
    }

    for alert in store.list_alerts()? {
        info!(
            alert_id = %alert.id,
            severity = %alert.severity,
            "{}",
            alert.summary
        );
    }

    pipeline.metrics().print_summary();
    Ok(())
}

/// A small history exercising each detector: smurfing into `retail-42`,
/// layering through `conduit-9`, a circular flow around `alpha`, and some
/// benign background traffic.
fn sample_transactions(now: DateTime<Utc>) -> Vec<Transaction> {
    let mut txs = Vec::new();
    let mut id = 0;
    let mut push = |sender: &str, receiver: &str, amount: f64, hours_ago: i64| {
        id += 1;
        txs.push(Transaction::new(
            format!("TX-{id:03}"),
            sender,
            receiver,
            amount,
            now - Duration::hours(hours_ago),
        ));
    };

    // Benign background traffic
    push("payroll", "alice", 3_200.0, 96);
    push("alice", "grocer", 120.0, 70);
    push("payroll", "bob", 2_900.0, 48);
    push("bob", "utility", 85.0, 24);

    // Smurfing: seven mules fund one collector inside two days
    for i in 0..7 {
        push(&format!("mule-{i}"), "retail-42", 5_000.0, 40 - i * 4);
    }

    // Layering: three rapid in-out cycles through a conduit
    push("shell-a", "conduit-9", 10_000.0, 12);
    push("conduit-9", "offshore-1", 9_800.0, 11);
    push("shell-b", "conduit-9", 12_000.0, 9);
    push("conduit-9", "offshore-2", 11_900.0, 8);
    push("shell-c", "conduit-9", 8_000.0, 6);
    push("conduit-9", "offshore-3", 8_000.0, 5);

    // Circular flow back to alpha
    push("alpha", "beta", 1_500.0, 3);
    push("beta", "gamma", 1_500.0, 2);
    push("gamma", "alpha", 1_500.0, 1);

    txs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    txs
}
