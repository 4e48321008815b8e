//! Pipeline orchestration.
//!
//! The composition root: wires the store, config, and clock into the
//! evidence and alert engines and drives them for single transactions and
//! batch runs. Every public operation runs to completion synchronously; the
//! transaction is observable in the store before any evidence or alert write
//! that refers to it.

use crate::clock::Clock;
use crate::config::DetectionConfig;
use crate::engine::alert::AlertEngine;
use crate::engine::evidence::EvidenceEngine;
use crate::error::Result;
use crate::metrics::EngineMetrics;
use crate::store::Store;
use crate::types::evidence::RiskLevel;
use crate::types::transaction::Transaction;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Per-account outcome of processing one transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountOutcome {
    pub account_id: String,
    pub score: u32,
    pub risk_level: RiskLevel,
    pub alert_generated: bool,
}

/// Outcome of one `process` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessOutcome {
    pub transaction_id: String,
    pub accounts: Vec<AccountOutcome>,
    /// Account with the highest score of this call
    pub highest_risk: String,
}

/// Outcome of a batch run over the full history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnalysisReport {
    pub accounts_evaluated: usize,
    pub normal: usize,
    pub suspicious: usize,
    pub high_risk: usize,
    pub probable_ml: usize,
    pub alerts_created: usize,
}

/// Orchestrates ingestion, evaluation, and alerting.
pub struct Pipeline {
    store: Arc<dyn Store>,
    config: Arc<DetectionConfig>,
    evidence: EvidenceEngine,
    alerts: AlertEngine,
    metrics: Arc<EngineMetrics>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn Store>,
        config: Arc<DetectionConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let evidence = EvidenceEngine::new(store.clone(), config.clone(), clock.clone());
        let alerts = AlertEngine::new(store.clone(), config.clone(), clock, evidence.clone());
        Self {
            store,
            config,
            evidence,
            alerts,
            metrics: Arc::new(EngineMetrics::new()),
        }
    }

    pub fn evidence(&self) -> &EvidenceEngine {
        &self.evidence
    }

    pub fn alerts(&self) -> &AlertEngine {
        &self.alerts
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        self.metrics.clone()
    }

    /// Ingest one transaction and re-evaluate both touched accounts.
    ///
    /// Invalid transactions are rejected before the store is written.
    pub fn process(&self, transaction: Transaction) -> Result<ProcessOutcome> {
        transaction.validate()?;
        let start = Instant::now();

        let transaction_id = transaction.id.clone();
        let sender = transaction.sender.clone();
        let receiver = transaction.receiver.clone();
        self.store.add_transaction(transaction)?;

        let mut accounts = Vec::with_capacity(2);
        for account_id in [&sender, &receiver] {
            let evaluation = self.evidence.evaluate(account_id)?;
            self.evidence.update_evidence(&evaluation)?;

            let alert = if evaluation.score >= self.config.risk_bands.suspicious {
                self.alerts.create_and_save(account_id)?
            } else {
                None
            };
            if let Some(alert) = &alert {
                self.metrics.record_alert(alert.severity);
            }

            accounts.push(AccountOutcome {
                account_id: account_id.clone(),
                score: evaluation.score,
                risk_level: evaluation.risk_level,
                alert_generated: alert.is_some(),
            });
        }

        // Sender wins ties, being evaluated first.
        let mut highest_risk = sender;
        let mut top_score = 0;
        for outcome in &accounts {
            if outcome.score > top_score {
                highest_risk = outcome.account_id.clone();
                top_score = outcome.score;
            }
        }
        self.metrics.record_transaction(start.elapsed(), top_score);

        info!(
            transaction_id = %transaction_id,
            highest_risk = %highest_risk,
            top_score,
            "transaction processed"
        );

        Ok(ProcessOutcome {
            transaction_id,
            accounts,
            highest_risk,
        })
    }

    /// Re-evaluate every known account and alert on all that qualify.
    pub fn full_analysis(&self) -> Result<AnalysisReport> {
        let evaluations = self.evidence.evaluate_all()?;

        let mut report = AnalysisReport {
            accounts_evaluated: evaluations.len(),
            normal: 0,
            suspicious: 0,
            high_risk: 0,
            probable_ml: 0,
            alerts_created: 0,
        };
        for evaluation in &evaluations {
            match evaluation.risk_level {
                RiskLevel::Normal => report.normal += 1,
                RiskLevel::Suspicious => report.suspicious += 1,
                RiskLevel::HighRisk => report.high_risk += 1,
                RiskLevel::ProbableMl => report.probable_ml += 1,
            }
            if evaluation.score >= self.config.risk_bands.suspicious {
                if let Some(alert) = self.alerts.create_and_save(&evaluation.account_id)? {
                    self.metrics.record_alert(alert.severity);
                    report.alerts_created += 1;
                }
            }
        }

        info!(
            accounts = report.accounts_evaluated,
            suspicious = report.suspicious,
            high_risk = report.high_risk,
            probable_ml = report.probable_ml,
            alerts = report.alerts_created,
            "full analysis complete"
        );
        Ok(report)
    }
}
