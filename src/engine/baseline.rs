//! Per-account behavioral baselines and deviation tests.
//!
//! A [`Baseline`] is derived from the transaction history on demand and never
//! persisted; every evaluation recomputes it so the profile always reflects
//! the full history.

use crate::clock::Clock;
use crate::config::DetectionConfig;
use crate::types::alert::Severity;
use crate::types::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

const SECONDS_PER_DAY: i64 = 86_400;

/// Statistical profile of one account's historical behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub account_id: String,
    pub avg_daily_inflow: f64,
    pub avg_daily_outflow: f64,
    /// Transactions per day touching this account
    pub avg_tx_frequency: f64,
    pub avg_unique_senders: f64,
    pub avg_unique_receivers: f64,
    /// [p10, p90] over all amounts touching this account
    pub typical_amount_range: (f64, f64),
    /// Days since the first transaction, floored at 1 once any history exists
    pub account_age_days: i64,
    pub total_transactions: usize,
}

impl Baseline {
    /// Profile of an account with no history: all zeros, age 0.
    pub fn default_for(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            avg_daily_inflow: 0.0,
            avg_daily_outflow: 0.0,
            avg_tx_frequency: 0.0,
            avg_unique_senders: 0.0,
            avg_unique_receivers: 0.0,
            typical_amount_range: (0.0, 0.0),
            account_age_days: 0,
            total_transactions: 0,
        }
    }
}

/// One way a transaction departs from the account's baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviationKind {
    /// Outflow far above the account's average daily outflow
    AmountDeviation { ratio: f64 },
    /// First observed outflow from an account with no outflow history
    FirstTransaction,
    /// Amount above the account's typical range
    RangeDeviation { p90: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deviation {
    #[serde(flatten)]
    pub kind: DeviationKind,
    pub severity: Severity,
    pub description: String,
}

/// Outcome of checking one transaction against a baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviationReport {
    pub has_deviation: bool,
    pub deviations: Vec<Deviation>,
}

/// Computes baselines and runs deviation tests against them.
#[derive(Clone)]
pub struct BaselineEngine {
    config: Arc<DetectionConfig>,
    clock: Arc<dyn Clock>,
}

impl BaselineEngine {
    pub fn new(config: Arc<DetectionConfig>, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// Derive the account's profile from the full transaction history.
    pub fn compute(&self, account_id: &str, transactions: &[Transaction]) -> Baseline {
        let touching: Vec<&Transaction> = transactions
            .iter()
            .filter(|tx| tx.touches(account_id))
            .collect();
        if touching.is_empty() {
            return Baseline::default_for(account_id);
        }

        let now = self.clock.now();
        let first_ts = touching
            .iter()
            .map(|tx| tx.timestamp)
            .min()
            .unwrap_or(now);
        let account_age_days = ((now - first_ts).num_seconds() / SECONDS_PER_DAY).max(1);
        let age = account_age_days as f64;

        let mut inflow_total = 0.0;
        let mut outflow_total = 0.0;
        let mut senders = HashSet::new();
        let mut receivers = HashSet::new();
        let mut amounts: Vec<f64> = Vec::with_capacity(touching.len());

        for tx in &touching {
            if tx.receiver == account_id {
                inflow_total += tx.amount;
                senders.insert(tx.sender.as_str());
            }
            if tx.sender == account_id {
                outflow_total += tx.amount;
                receivers.insert(tx.receiver.as_str());
            }
            amounts.push(tx.amount);
        }

        amounts.sort_by(f64::total_cmp);
        let n = amounts.len();
        let p10 = amounts[((0.1 * n as f64).floor() as usize).min(n - 1)];
        let p90 = amounts[((0.9 * n as f64).floor() as usize).min(n - 1)];

        Baseline {
            account_id: account_id.to_string(),
            avg_daily_inflow: inflow_total / age,
            avg_daily_outflow: outflow_total / age,
            avg_tx_frequency: touching.len() as f64 / age,
            avg_unique_senders: senders.len() as f64 / age,
            avg_unique_receivers: receivers.len() as f64 / age,
            typical_amount_range: (p10, p90),
            account_age_days,
            total_transactions: touching.len(),
        }
    }

    /// Test one transaction against the account's profile.
    ///
    /// A zero outflow baseline is treated as a first transaction rather than
    /// divided by.
    pub fn check_deviation(&self, tx: &Transaction, baseline: &Baseline) -> DeviationReport {
        let cfg = &self.config.deviation;
        let mut deviations = Vec::new();
        let is_outflow = tx.sender == baseline.account_id;

        if is_outflow && baseline.avg_daily_outflow > 0.0 {
            let ratio = tx.amount / baseline.avg_daily_outflow;
            if ratio > cfg.outflow_ratio {
                let severity = if ratio > cfg.outflow_ratio_high {
                    Severity::High
                } else {
                    Severity::Medium
                };
                deviations.push(Deviation {
                    kind: DeviationKind::AmountDeviation { ratio },
                    severity,
                    description: format!(
                        "outflow of {:.2} is {:.1}x the average daily outflow of {:.2}",
                        tx.amount, ratio, baseline.avg_daily_outflow
                    ),
                });
            }
        } else if is_outflow && tx.amount > 0.0 {
            deviations.push(Deviation {
                kind: DeviationKind::FirstTransaction,
                severity: Severity::Medium,
                description: format!(
                    "first outflow of {:.2} from an account with no outflow history",
                    tx.amount
                ),
            });
        }

        let p90 = baseline.typical_amount_range.1;
        if p90 > 0.0 && tx.amount > cfg.range_factor * p90 {
            deviations.push(Deviation {
                kind: DeviationKind::RangeDeviation { p90 },
                severity: Severity::Medium,
                description: format!(
                    "amount {:.2} exceeds {:.1}x the typical upper range of {:.2}",
                    tx.amount, cfg.range_factor, p90
                ),
            });
        }

        DeviationReport {
            has_deviation: !deviations.is_empty(),
            deviations,
        }
    }

    /// Transactions touching the account within the last `hours_back` hours.
    pub fn recent_activity(
        &self,
        account_id: &str,
        transactions: &[Transaction],
        hours_back: i64,
    ) -> Vec<Transaction> {
        let cutoff = self.clock.now() - chrono::Duration::hours(hours_back);
        transactions
            .iter()
            .filter(|tx| tx.touches(account_id) && tx.timestamp >= cutoff)
            .cloned()
            .collect()
    }
}
