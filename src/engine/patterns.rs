//! Time-windowed laundering pattern matchers.
//!
//! Each matcher is a pure function of the transaction history, the account's
//! baseline, and the clock reading; it returns a structured detection or
//! nothing. Thresholds come from [`DetectionConfig`].

use crate::clock::Clock;
use crate::config::DetectionConfig;
use crate::engine::baseline::Baseline;
use crate::types::alert::Severity;
use crate::types::transaction::Transaction;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// One inflow matched to a later near-equal outflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayeringCycle {
    pub inflow_id: String,
    pub outflow_id: String,
    pub inflow_amount: f64,
    pub outflow_amount: f64,
    pub minutes_between: i64,
}

/// Structured payload of a confirmed pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatternKind {
    /// Many distinct senders funding one account in a short window
    Smurfing {
        unique_senders: usize,
        inflow_count: usize,
        total_amount: f64,
        /// Whether inflow amounts cluster around their mean
        clustered: bool,
    },
    /// Near-equal amounts deposited and withdrawn in rapid succession
    Layering {
        matched_cycles: usize,
        cycles: Vec<LayeringCycle>,
    },
    /// Repeated outflows just below the reporting threshold
    Structuring {
        threshold: f64,
        outflow_count: usize,
        distinct_days: usize,
        average_amount: f64,
    },
    /// Recent inflows far above the account's own historical level
    IncomeMismatch {
        recent_daily_avg: f64,
        baseline_daily_avg: f64,
        ratio: f64,
    },
}

impl PatternKind {
    pub fn name(&self) -> &'static str {
        match self {
            PatternKind::Smurfing { .. } => "smurfing",
            PatternKind::Layering { .. } => "layering",
            PatternKind::Structuring { .. } => "structuring",
            PatternKind::IncomeMismatch { .. } => "income_mismatch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDetection {
    pub severity: Severity,
    pub description: String,
    #[serde(flatten)]
    pub kind: PatternKind,
}

/// Runs all pattern matchers for one account.
#[derive(Clone)]
pub struct PatternDetector {
    config: Arc<DetectionConfig>,
    clock: Arc<dyn Clock>,
}

impl PatternDetector {
    pub fn new(config: Arc<DetectionConfig>, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// Run every matcher; order of the result is fixed.
    pub fn detect_all(
        &self,
        account_id: &str,
        transactions: &[Transaction],
        baseline: &Baseline,
    ) -> Vec<PatternDetection> {
        [
            self.detect_smurfing(account_id, transactions),
            self.detect_layering(account_id, transactions),
            self.detect_structuring(account_id, transactions, baseline),
            self.detect_income_mismatch(account_id, transactions, baseline),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Many-to-one: distinct senders funding the account inside the window.
    pub fn detect_smurfing(
        &self,
        account_id: &str,
        transactions: &[Transaction],
    ) -> Option<PatternDetection> {
        let cfg = &self.config.smurfing;
        let cutoff = self.clock.now() - Duration::hours(cfg.window_hours);

        let inflows: Vec<&Transaction> = transactions
            .iter()
            .filter(|tx| tx.receiver == account_id && tx.timestamp >= cutoff)
            .collect();
        if inflows.is_empty() {
            return None;
        }

        let unique_senders: HashSet<&str> =
            inflows.iter().map(|tx| tx.sender.as_str()).collect();
        if unique_senders.len() < cfg.min_unique_senders {
            return None;
        }

        let total_amount: f64 = inflows.iter().map(|tx| tx.amount).sum();
        let mean = total_amount / inflows.len() as f64;
        let near_mean = inflows
            .iter()
            .filter(|tx| (tx.amount - mean).abs() <= cfg.cluster_tolerance * mean)
            .count();
        let clustered = near_mean as f64 / inflows.len() as f64 >= cfg.cluster_fraction;

        Some(PatternDetection {
            severity: Severity::High,
            description: format!(
                "{} distinct senders moved {:.2} into {} within {} hours",
                unique_senders.len(),
                total_amount,
                account_id,
                cfg.window_hours
            ),
            kind: PatternKind::Smurfing {
                unique_senders: unique_senders.len(),
                inflow_count: inflows.len(),
                total_amount,
                clustered,
            },
        })
    }

    /// Rapid in-out: each inflow greedily matched, in time order, to the
    /// first later outflow of near-equal amount inside the window. An outflow
    /// may satisfy multiple inflows.
    pub fn detect_layering(
        &self,
        account_id: &str,
        transactions: &[Transaction],
    ) -> Option<PatternDetection> {
        let cfg = &self.config.layering;
        let window = Duration::hours(cfg.window_hours);

        let mut inflows: Vec<&Transaction> = transactions
            .iter()
            .filter(|tx| tx.receiver == account_id)
            .collect();
        let mut outflows: Vec<&Transaction> = transactions
            .iter()
            .filter(|tx| tx.sender == account_id)
            .collect();
        inflows.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        outflows.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));

        let mut cycles = Vec::new();
        for inflow in &inflows {
            let matched = outflows.iter().find(|outflow| {
                outflow.timestamp > inflow.timestamp
                    && outflow.timestamp - inflow.timestamp < window
                    && (outflow.amount - inflow.amount).abs() / inflow.amount
                        < cfg.amount_tolerance
            });
            if let Some(outflow) = matched {
                cycles.push(LayeringCycle {
                    inflow_id: inflow.id.clone(),
                    outflow_id: outflow.id.clone(),
                    inflow_amount: inflow.amount,
                    outflow_amount: outflow.amount,
                    minutes_between: (outflow.timestamp - inflow.timestamp).num_minutes(),
                });
            }
        }

        if cycles.len() < cfg.min_cycles {
            return None;
        }

        Some(PatternDetection {
            severity: Severity::High,
            description: format!(
                "{} in-out cycles through {} with matching amounts inside {} hours",
                cycles.len(),
                account_id,
                cfg.window_hours
            ),
            kind: PatternKind::Layering {
                matched_cycles: cycles.len(),
                cycles,
            },
        })
    }

    /// Outflows held just below the effective reporting threshold, spread
    /// over multiple calendar days (UTC).
    pub fn detect_structuring(
        &self,
        account_id: &str,
        transactions: &[Transaction],
        baseline: &Baseline,
    ) -> Option<PatternDetection> {
        let cfg = &self.config.structuring;
        let p90 = baseline.typical_amount_range.1;
        let threshold = (cfg.p90_factor * p90).max(cfg.default_threshold);
        let low = cfg.band_low * threshold;
        let high = cfg.band_high * threshold;

        let in_band: Vec<&Transaction> = transactions
            .iter()
            .filter(|tx| tx.sender == account_id && tx.amount >= low && tx.amount <= high)
            .collect();
        if in_band.len() < cfg.min_outflows {
            return None;
        }

        let days: HashSet<chrono::NaiveDate> =
            in_band.iter().map(|tx| tx.timestamp.date_naive()).collect();
        if days.len() < cfg.min_distinct_days {
            return None;
        }

        let average_amount =
            in_band.iter().map(|tx| tx.amount).sum::<f64>() / in_band.len() as f64;

        Some(PatternDetection {
            severity: Severity::High,
            description: format!(
                "{} outflows from {} averaging {:.2}, just below the {:.2} threshold, across {} days",
                in_band.len(),
                account_id,
                average_amount,
                threshold,
                days.len()
            ),
            kind: PatternKind::Structuring {
                threshold,
                outflow_count: in_band.len(),
                distinct_days: days.len(),
                average_amount,
            },
        })
    }

    /// Recent inflow level measured against the account's own history.
    /// Accounts younger than the minimum age have no meaningful baseline.
    pub fn detect_income_mismatch(
        &self,
        account_id: &str,
        transactions: &[Transaction],
        baseline: &Baseline,
    ) -> Option<PatternDetection> {
        let cfg = &self.config.income;
        if baseline.account_age_days < cfg.min_account_age_days {
            return None;
        }
        if baseline.avg_daily_inflow <= 0.0 {
            return None;
        }

        let cutoff = self.clock.now() - Duration::days(cfg.lookback_days);
        let recent_total: f64 = transactions
            .iter()
            .filter(|tx| tx.receiver == account_id && tx.timestamp >= cutoff)
            .map(|tx| tx.amount)
            .sum();
        let recent_daily_avg = recent_total / cfg.lookback_days as f64;

        let ratio = recent_daily_avg / baseline.avg_daily_inflow;
        if ratio <= cfg.ratio {
            return None;
        }

        let severity = if ratio > cfg.high_ratio {
            Severity::High
        } else {
            Severity::Medium
        };
        Some(PatternDetection {
            severity,
            description: format!(
                "recent daily inflow of {:.2} is {:.1}x the historical average of {:.2} for {}",
                recent_daily_avg, ratio, baseline.avg_daily_inflow, account_id
            ),
            kind: PatternKind::IncomeMismatch {
                recent_daily_avg,
                baseline_daily_avg: baseline.avg_daily_inflow,
                ratio,
            },
        })
    }
}
