//! Per-account evidence evaluation and risk classification.
//!
//! Evaluation runs the baseline, pattern, and network subsystems over the
//! stored history, adds its own per-transaction suspicion tests, reduces the
//! counts to a weighted score capped at 100, and classifies the account into
//! a risk band. The persisted record is overwritten on every run.

use crate::clock::Clock;
use crate::config::DetectionConfig;
use crate::engine::baseline::{Baseline, BaselineEngine};
use crate::engine::network::{NetworkAnalysis, NetworkAnalyzer};
use crate::engine::patterns::{PatternDetection, PatternDetector};
use crate::error::Result;
use crate::store::Store;
use crate::types::alert::EvidenceBreakdown;
use crate::types::evidence::{AccountEvidence, RiskLevel};
use crate::types::transaction::Transaction;
use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Kind tag of one suspicious-transaction finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspiciousKind {
    BaselineDeviation,
    FrequencySpike,
    SenderCountSpike,
    SimilarValueRepeat,
    UnusualTiming,
}

impl SuspiciousKind {
    pub fn name(&self) -> &'static str {
        match self {
            SuspiciousKind::BaselineDeviation => "baseline_deviation",
            SuspiciousKind::FrequencySpike => "frequency_spike",
            SuspiciousKind::SenderCountSpike => "sender_count_spike",
            SuspiciousKind::SimilarValueRepeat => "similar_value_repeat",
            SuspiciousKind::UnusualTiming => "unusual_timing",
        }
    }
}

/// One suspicious finding against one transaction. The same transaction may
/// appear under several kinds; each occurrence scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspiciousTransaction {
    pub transaction_id: String,
    pub kind: SuspiciousKind,
    pub description: String,
    pub transaction: Transaction,
}

/// Full outcome of evaluating one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub account_id: String,
    pub score: u32,
    pub risk_level: RiskLevel,
    pub baseline: Baseline,
    pub suspicious_transactions: Vec<SuspiciousTransaction>,
    pub patterns: Vec<PatternDetection>,
    pub network: NetworkAnalysis,
    pub evaluated_at: DateTime<Utc>,
}

impl Evaluation {
    pub fn breakdown(&self) -> EvidenceBreakdown {
        EvidenceBreakdown {
            suspicious_transactions: self.suspicious_transactions.len() as u32,
            confirmed_patterns: self.patterns.len() as u32,
            network_signals: self.network.signals.len() as u32,
            is_probable_ml: self.network.is_probable_ml,
        }
    }
}

/// Evaluates accounts and maintains their persisted evidence records.
#[derive(Clone)]
pub struct EvidenceEngine {
    store: Arc<dyn Store>,
    config: Arc<DetectionConfig>,
    clock: Arc<dyn Clock>,
    baseline: BaselineEngine,
    patterns: PatternDetector,
    network: NetworkAnalyzer,
}

impl EvidenceEngine {
    pub fn new(
        store: Arc<dyn Store>,
        config: Arc<DetectionConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let baseline = BaselineEngine::new(config.clone(), clock.clone());
        let patterns = PatternDetector::new(config.clone(), clock.clone());
        let network = NetworkAnalyzer::new(config.clone(), store.clone());
        Self {
            store,
            config,
            clock,
            baseline,
            patterns,
            network,
        }
    }

    pub fn baseline_engine(&self) -> &BaselineEngine {
        &self.baseline
    }

    /// Evaluate one account against the full stored history. Read-only; the
    /// caller persists the outcome with [`EvidenceEngine::update_evidence`].
    pub fn evaluate(&self, account_id: &str) -> Result<Evaluation> {
        let transactions = self.store.list_transactions()?;
        let baseline = self.baseline.compute(account_id, &transactions);
        let suspicious_transactions =
            self.find_suspicious(account_id, &transactions, &baseline);
        let patterns = self.patterns.detect_all(account_id, &transactions, &baseline);
        let network = self.network.analyze(account_id, &transactions)?;

        let score = self.score(&suspicious_transactions, &patterns, &network);
        let risk_level = RiskLevel::from_score(score, &self.config.risk_bands);

        debug!(
            account_id,
            score,
            risk_level = %risk_level,
            suspicious = suspicious_transactions.len(),
            patterns = patterns.len(),
            network_signals = network.signals.len(),
            "account evaluated"
        );

        Ok(Evaluation {
            account_id: account_id.to_string(),
            score,
            risk_level,
            baseline,
            suspicious_transactions,
            patterns,
            network,
            evaluated_at: self.clock.now(),
        })
    }

    fn score(
        &self,
        suspicious: &[SuspiciousTransaction],
        patterns: &[PatternDetection],
        network: &NetworkAnalysis,
    ) -> u32 {
        let weights = &self.config.weights;
        let mut score = weights.suspicious_transaction * suspicious.len() as u32
            + weights.pattern * patterns.len() as u32
            + weights.network_signal * network.signals.len() as u32;
        if network.is_probable_ml {
            score += weights.probable_ml_bonus;
        }
        score.min(weights.cap)
    }

    /// Run the per-transaction suspicion tests over every transaction
    /// touching the account, in chronological order.
    pub fn find_suspicious(
        &self,
        account_id: &str,
        transactions: &[Transaction],
        baseline: &Baseline,
    ) -> Vec<SuspiciousTransaction> {
        let cfg = &self.config.suspicion;
        let mut touching: Vec<&Transaction> = transactions
            .iter()
            .filter(|tx| tx.touches(account_id))
            .collect();
        touching.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));

        let daytime_count = touching
            .iter()
            .filter(|tx| tx.timestamp.hour() >= cfg.unusual_hour_end)
            .count();

        let mut findings = Vec::new();
        for tx in &touching {
            if tx.sender == account_id {
                let report = self.baseline.check_deviation(tx, baseline);
                if report.has_deviation {
                    let detail = report
                        .deviations
                        .iter()
                        .map(|d| d.description.as_str())
                        .collect::<Vec<_>>()
                        .join("; ");
                    findings.push(SuspiciousTransaction {
                        transaction_id: tx.id.clone(),
                        kind: SuspiciousKind::BaselineDeviation,
                        description: detail,
                        transaction: (*tx).clone(),
                    });
                }
            }

            let tx_date = tx.timestamp.date_naive();
            if baseline.avg_tx_frequency > 0.0 {
                let same_day = touching
                    .iter()
                    .filter(|t| t.timestamp.date_naive() == tx_date)
                    .count();
                if same_day as f64 > cfg.frequency_multiplier * baseline.avg_tx_frequency {
                    findings.push(SuspiciousTransaction {
                        transaction_id: tx.id.clone(),
                        kind: SuspiciousKind::FrequencySpike,
                        description: format!(
                            "{} transactions on {} against a daily average of {:.2}",
                            same_day, tx_date, baseline.avg_tx_frequency
                        ),
                        transaction: (*tx).clone(),
                    });
                }
            }

            if tx.receiver == account_id && baseline.avg_unique_senders > 0.0 {
                let same_day_senders: HashSet<&str> = touching
                    .iter()
                    .filter(|t| t.receiver == account_id && t.timestamp.date_naive() == tx_date)
                    .map(|t| t.sender.as_str())
                    .collect();
                if same_day_senders.len() as f64
                    > cfg.sender_count_multiplier * baseline.avg_unique_senders
                {
                    findings.push(SuspiciousTransaction {
                        transaction_id: tx.id.clone(),
                        kind: SuspiciousKind::SenderCountSpike,
                        description: format!(
                            "{} distinct senders on {} against a daily average of {:.2}",
                            same_day_senders.len(),
                            tx_date,
                            baseline.avg_unique_senders
                        ),
                        transaction: (*tx).clone(),
                    });
                }
            }

            let window_start = tx.timestamp - Duration::hours(cfg.similar_value_window_hours);
            let similar = touching
                .iter()
                .filter(|t| {
                    t.timestamp > window_start
                        && t.timestamp <= tx.timestamp
                        && (t.amount - tx.amount).abs() / tx.amount < cfg.similar_value_tolerance
                })
                .count();
            if similar >= cfg.similar_value_min_count {
                findings.push(SuspiciousTransaction {
                    transaction_id: tx.id.clone(),
                    kind: SuspiciousKind::SimilarValueRepeat,
                    description: format!(
                        "{} transfers of nearly identical value within {} hours",
                        similar, cfg.similar_value_window_hours
                    ),
                    transaction: (*tx).clone(),
                });
            }

            if tx.timestamp.hour() < cfg.unusual_hour_end
                && daytime_count as f64 / touching.len() as f64 > cfg.daytime_fraction
            {
                findings.push(SuspiciousTransaction {
                    transaction_id: tx.id.clone(),
                    kind: SuspiciousKind::UnusualTiming,
                    description: format!(
                        "activity at {:02}:00 UTC on an account that otherwise transacts in daytime hours",
                        tx.timestamp.hour()
                    ),
                    transaction: (*tx).clone(),
                });
            }
        }
        findings
    }

    /// Persist the evaluation outcome, overwriting the previous record.
    pub fn update_evidence(&self, evaluation: &Evaluation) -> Result<()> {
        let breakdown = evaluation.breakdown();
        let record = AccountEvidence {
            account_id: evaluation.account_id.clone(),
            score: evaluation.score,
            risk_level: evaluation.risk_level,
            suspicious_transactions: breakdown.suspicious_transactions,
            confirmed_patterns: breakdown.confirmed_patterns,
            network_signals: breakdown.network_signals,
            is_probable_ml: breakdown.is_probable_ml,
            last_updated: self.clock.now(),
        };
        self.store.put_evidence(&evaluation.account_id, record)
    }

    /// Evaluate and persist every account present in the transaction history.
    pub fn evaluate_all(&self) -> Result<Vec<Evaluation>> {
        let transactions = self.store.list_transactions()?;
        let accounts: BTreeSet<String> = transactions
            .iter()
            .flat_map(|tx| [tx.sender.clone(), tx.receiver.clone()])
            .collect();

        let mut evaluations = Vec::with_capacity(accounts.len());
        for account_id in &accounts {
            let evaluation = self.evaluate(account_id)?;
            self.update_evidence(&evaluation)?;
            evaluations.push(evaluation);
        }
        Ok(evaluations)
    }

    /// Flagged accounts, highest score first.
    pub fn high_risk_accounts(&self) -> Result<Vec<AccountEvidence>> {
        let mut flagged: Vec<AccountEvidence> = self
            .store
            .list_evidence()?
            .into_iter()
            .filter(|e| e.risk_level.is_flagged())
            .collect();
        flagged.sort_by(|a, b| b.score.cmp(&a.score).then(a.account_id.cmp(&b.account_id)));
        Ok(flagged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    fn engine() -> (EvidenceEngine, Arc<MemoryStore>) {
        let clock = Arc::new(FixedClock::new(now()));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let engine = EvidenceEngine::new(
            store.clone(),
            Arc::new(DetectionConfig::default()),
            clock,
        );
        (engine, store)
    }

    fn add(store: &MemoryStore, id: &str, sender: &str, receiver: &str, amount: f64, hours_ago: i64) {
        store
            .add_transaction(Transaction::new(
                id,
                sender,
                receiver,
                amount,
                now() - Duration::hours(hours_ago),
            ))
            .unwrap();
    }

    #[test]
    fn test_unseen_account_scores_zero() {
        let (engine, _store) = engine();
        let evaluation = engine.evaluate("ghost").unwrap();
        assert_eq!(evaluation.score, 0);
        assert_eq!(evaluation.risk_level, RiskLevel::Normal);
        assert_eq!(evaluation.baseline, Baseline::default_for("ghost"));
    }

    #[test]
    fn test_similar_value_repeat_detected() {
        let (engine, store) = engine();
        // Four near-identical transfers inside one day.
        add(&store, "TX-1", "x", "a", 1_000.0, 20);
        add(&store, "TX-2", "x", "a", 1_010.0, 15);
        add(&store, "TX-3", "x", "a", 990.0, 10);
        add(&store, "TX-4", "x", "a", 1_005.0, 5);

        let evaluation = engine.evaluate("a").unwrap();
        assert!(evaluation
            .suspicious_transactions
            .iter()
            .any(|s| s.kind == SuspiciousKind::SimilarValueRepeat));
    }

    #[test]
    fn test_unusual_timing_needs_daytime_history() {
        let (engine, store) = engine();
        // Nine daytime transfers, one at 03:00 UTC.
        for i in 0..9 {
            store
                .add_transaction(Transaction::new(
                    format!("TX-{i}"),
                    "x",
                    "a",
                    500.0 + i as f64 * 400.0,
                    Utc.with_ymd_and_hms(2024, 5, 1 + i, 14, 0, 0).unwrap(),
                ))
                .unwrap();
        }
        store
            .add_transaction(Transaction::new(
                "TX-NIGHT",
                "x",
                "a",
                5_000.0,
                Utc.with_ymd_and_hms(2024, 5, 10, 3, 0, 0).unwrap(),
            ))
            .unwrap();

        let evaluation = engine.evaluate("a").unwrap();
        let timing: Vec<_> = evaluation
            .suspicious_transactions
            .iter()
            .filter(|s| s.kind == SuspiciousKind::UnusualTiming)
            .collect();
        assert_eq!(timing.len(), 1);
        assert_eq!(timing[0].transaction_id, "TX-NIGHT");
    }

    #[test]
    fn test_score_weights_and_band() {
        let (engine, _store) = engine();
        let network = NetworkAnalysis {
            signals: Vec::new(),
            is_probable_ml: false,
        };
        assert_eq!(engine.score(&[], &[], &network), 0);

        let suspicious = vec![SuspiciousTransaction {
            transaction_id: "TX-1".to_string(),
            kind: SuspiciousKind::FrequencySpike,
            description: String::new(),
            transaction: Transaction::new("TX-1", "a", "b", 1.0, now()),
        }];
        assert_eq!(engine.score(&suspicious, &[], &network), 10);
    }

    #[test]
    fn test_score_caps_at_one_hundred() {
        let (engine, _store) = engine();
        let tx = Transaction::new("TX-1", "a", "b", 1.0, now());
        let suspicious: Vec<SuspiciousTransaction> = (0..20)
            .map(|_| SuspiciousTransaction {
                transaction_id: "TX-1".to_string(),
                kind: SuspiciousKind::FrequencySpike,
                description: String::new(),
                transaction: tx.clone(),
            })
            .collect();
        assert_eq!(engine.score(&suspicious, &[], &NetworkAnalysis {
            signals: Vec::new(),
            is_probable_ml: false,
        }), 100);
    }

    #[test]
    fn test_update_evidence_persists_band_consistent_record() {
        let (engine, store) = engine();
        add(&store, "TX-1", "x", "a", 1_000.0, 20);
        add(&store, "TX-2", "x", "a", 1_010.0, 15);
        add(&store, "TX-3", "x", "a", 990.0, 10);
        add(&store, "TX-4", "x", "a", 1_005.0, 5);

        let evaluation = engine.evaluate("a").unwrap();
        engine.update_evidence(&evaluation).unwrap();

        let record = store.get_evidence("a").unwrap().expect("evidence persisted");
        assert_eq!(record.score, evaluation.score);
        assert_eq!(record.risk_level, evaluation.risk_level);
        assert_eq!(
            record.risk_level,
            RiskLevel::from_score(record.score, &DetectionConfig::default().risk_bands)
        );
        assert_eq!(record.last_updated, now());
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let (engine, store) = engine();
        add(&store, "TX-1", "x", "a", 1_000.0, 20);
        add(&store, "TX-2", "y", "a", 1_010.0, 15);

        let first = engine.evaluate("a").unwrap();
        let second = engine.evaluate("a").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_evaluate_all_covers_every_account() {
        let (engine, store) = engine();
        add(&store, "TX-1", "a", "b", 100.0, 10);
        add(&store, "TX-2", "c", "a", 200.0, 5);

        let evaluations = engine.evaluate_all().unwrap();
        let ids: Vec<&str> = evaluations.iter().map(|e| e.account_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        for id in ids {
            assert!(store.get_evidence(id).unwrap().is_some());
        }
    }

    #[test]
    fn test_high_risk_accounts_sorted_by_score() {
        let (engine, store) = engine();
        let put = |id: &str, score: u32, level: RiskLevel| {
            store
                .put_evidence(
                    id,
                    AccountEvidence {
                        account_id: id.to_string(),
                        score,
                        risk_level: level,
                        suspicious_transactions: 0,
                        confirmed_patterns: 0,
                        network_signals: 0,
                        is_probable_ml: false,
                        last_updated: now(),
                    },
                )
                .unwrap();
        };
        put("low", 10, RiskLevel::Normal);
        put("mid", 45, RiskLevel::Suspicious);
        put("high", 70, RiskLevel::HighRisk);
        put("worst", 95, RiskLevel::ProbableMl);

        let flagged = engine.high_risk_accounts().unwrap();
        let ids: Vec<&str> = flagged.iter().map(|e| e.account_id.as_str()).collect();
        assert_eq!(ids, vec!["worst", "high"]);
    }
}
