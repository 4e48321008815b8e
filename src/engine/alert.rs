//! Alert construction, deduplication, and persistence.

use crate::clock::Clock;
use crate::config::DetectionConfig;
use crate::engine::evidence::{Evaluation, EvidenceEngine};
use crate::error::Result;
use crate::store::Store;
use crate::types::alert::{Alert, AlertStatus, Severity, TimelineEvent};
use crate::types::evidence::RiskLevel;
use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info};

/// Builds explainable alerts from evaluations and appends them to the store.
#[derive(Clone)]
pub struct AlertEngine {
    store: Arc<dyn Store>,
    config: Arc<DetectionConfig>,
    clock: Arc<dyn Clock>,
    evidence: EvidenceEngine,
}

impl AlertEngine {
    pub fn new(
        store: Arc<dyn Store>,
        config: Arc<DetectionConfig>,
        clock: Arc<dyn Clock>,
        evidence: EvidenceEngine,
    ) -> Self {
        Self {
            store,
            config,
            clock,
            evidence,
        }
    }

    /// Build an alert from an evaluation, or nothing when the score sits
    /// below the suspicious band.
    pub fn generate(&self, evaluation: &Evaluation) -> Option<Alert> {
        if evaluation.score < self.config.risk_bands.suspicious {
            return None;
        }

        let now = self.clock.now();
        let severity = Severity::from_risk_level(evaluation.risk_level);
        let breakdown = evaluation.breakdown();

        let summary = format!(
            "{}: {} suspicious transactions, {} laundering patterns, {} network signals",
            evaluation.account_id,
            breakdown.suspicious_transactions,
            breakdown.confirmed_patterns,
            breakdown.network_signals
        );

        let mut timeline: Vec<TimelineEvent> = evaluation
            .suspicious_transactions
            .iter()
            .map(|finding| TimelineEvent {
                timestamp: finding.transaction.timestamp,
                event: "suspicious_transaction".to_string(),
                description: format!("{}: {}", finding.kind.name(), finding.description),
                transaction_id: Some(finding.transaction_id.clone()),
            })
            .collect();
        timeline.extend(evaluation.patterns.iter().map(|pattern| TimelineEvent {
            timestamp: now,
            event: "pattern_detected".to_string(),
            description: pattern.description.clone(),
            transaction_id: None,
        }));
        timeline.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        Some(Alert {
            id: format!("ALERT-{}", self.clock.epoch_millis()),
            account_id: evaluation.account_id.clone(),
            severity,
            risk_level: evaluation.risk_level,
            score: evaluation.score,
            timestamp: now,
            status: AlertStatus::Open,
            summary,
            behavior_summary: behavior_summary(evaluation),
            detected_patterns: evaluation.patterns.clone(),
            timeline,
            network_relationships: evaluation.network.signals.clone(),
            evidence_breakdown: breakdown,
            recommendations: recommendations(evaluation.risk_level),
            analyst_comments: None,
        })
    }

    /// Evaluate the account, build an alert, and persist it unless an alert
    /// for the same account already exists inside the dedup window.
    pub fn create_and_save(&self, account_id: &str) -> Result<Option<Alert>> {
        let evaluation = self.evidence.evaluate(account_id)?;
        let Some(alert) = self.generate(&evaluation) else {
            return Ok(None);
        };

        let cutoff =
            self.clock.now() - Duration::hours(self.config.alerting.dedup_window_hours);
        let duplicate = self
            .store
            .list_alerts()?
            .iter()
            .any(|existing| existing.account_id == account_id && existing.timestamp > cutoff);
        if duplicate {
            debug!(
                account_id,
                window_hours = self.config.alerting.dedup_window_hours,
                "alert suppressed, recent alert exists for account"
            );
            return Ok(None);
        }

        self.store.append_alert(alert.clone())?;
        self.store.log_audit(
            "system",
            "generate_alert",
            &format!(
                "{} alert for account {}: {}",
                alert.severity.to_string().to_uppercase(),
                account_id,
                alert.summary
            ),
        )?;
        info!(
            account_id,
            alert_id = %alert.id,
            severity = %alert.severity,
            score = alert.score,
            "alert created"
        );
        Ok(Some(alert))
    }
}

fn behavior_summary(evaluation: &Evaluation) -> String {
    let b = &evaluation.baseline;
    let (p10, p90) = b.typical_amount_range;
    [
        format!(
            "Account {} active for {} days with {} transactions.",
            b.account_id, b.account_age_days, b.total_transactions
        ),
        format!(
            "Average daily inflow {:.2}, average daily outflow {:.2}.",
            b.avg_daily_inflow, b.avg_daily_outflow
        ),
        format!(
            "Typically {:.2} transactions per day with amounts between {:.2} and {:.2}.",
            b.avg_tx_frequency, p10, p90
        ),
        format!(
            "On an average day {:.2} unique senders and {:.2} unique receivers.",
            b.avg_unique_senders, b.avg_unique_receivers
        ),
    ]
    .join("\n")
}

fn recommendations(risk_level: RiskLevel) -> Vec<String> {
    let lines: &[&str] = match risk_level {
        RiskLevel::ProbableMl => &[
            "File a Suspicious Activity Report with the financial intelligence unit",
            "Escalate to the compliance officer for immediate review",
            "Consider freezing outbound transfers pending investigation",
        ],
        RiskLevel::HighRisk => &[
            "Apply enhanced due diligence to the account",
            "Queue the account for compliance review",
            "Place the account under close monitoring",
        ],
        RiskLevel::Suspicious => &[
            "Continue monitoring account activity",
            "Document the observed behavior",
            "Escalate if further evidence accumulates",
        ],
        RiskLevel::Normal => &[],
    };
    lines.iter().map(|s| s.to_string()).collect()
}
