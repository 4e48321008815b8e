//! Risk classification and persisted per-account evidence

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Risk tier an account is classified into after evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Normal,
    Suspicious,
    HighRisk,
    ProbableMl,
}

impl RiskLevel {
    /// Classify a score into its band.
    pub fn from_score(score: u32, bands: &RiskBands) -> Self {
        if score >= bands.probable_ml {
            RiskLevel::ProbableMl
        } else if score >= bands.high_risk {
            RiskLevel::HighRisk
        } else if score >= bands.suspicious {
            RiskLevel::Suspicious
        } else {
            RiskLevel::Normal
        }
    }

    pub fn is_flagged(&self) -> bool {
        matches!(self, RiskLevel::HighRisk | RiskLevel::ProbableMl)
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RiskLevel::Normal => "normal",
            RiskLevel::Suspicious => "suspicious",
            RiskLevel::HighRisk => "high_risk",
            RiskLevel::ProbableMl => "probable_ml",
        };
        f.write_str(label)
    }
}

/// Lower bounds of the non-normal score bands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskBands {
    pub suspicious: u32,
    pub high_risk: u32,
    pub probable_ml: u32,
}

impl Default for RiskBands {
    fn default() -> Self {
        Self {
            suspicious: 30,
            high_risk: 60,
            probable_ml: 80,
        }
    }
}

/// Persisted evaluation outcome for one account, overwritten on each run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountEvidence {
    pub account_id: String,
    /// Weighted evidence score in [0, 100]
    pub score: u32,
    pub risk_level: RiskLevel,
    pub suspicious_transactions: u32,
    pub confirmed_patterns: u32,
    pub network_signals: u32,
    pub is_probable_ml: bool,
    pub last_updated: DateTime<Utc>,
}
