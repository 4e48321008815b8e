//! Alert data structures

use crate::engine::network::NetworkSignal;
use crate::engine::patterns::PatternDetection;
use crate::types::evidence::RiskLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity attached to alerts, pattern detections, and deviations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Alert severity is fixed by the account's risk tier.
    pub fn from_risk_level(level: RiskLevel) -> Self {
        match level {
            RiskLevel::Normal => Severity::Low,
            RiskLevel::Suspicious => Severity::Medium,
            RiskLevel::HighRisk => Severity::High,
            RiskLevel::ProbableMl => Severity::Critical,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(label)
    }
}

/// Lifecycle state of an alert; transitions come from the analyst workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Open,
    Closed,
    SarFiled,
}

/// One entry in the alert's chronological reconstruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub timestamp: DateTime<Utc>,
    /// Event kind tag: `suspicious_transaction` or `pattern_detected`
    pub event: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

/// Counts that produced the score; the forensic artifact behind the number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceBreakdown {
    pub suspicious_transactions: u32,
    pub confirmed_patterns: u32,
    pub network_signals: u32,
    pub is_probable_ml: bool,
}

/// Explainable alert emitted for accounts at or above the suspicious band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// `ALERT-<epoch-ms>`
    pub id: String,
    pub account_id: String,
    pub severity: Severity,
    pub risk_level: RiskLevel,
    pub score: u32,
    pub timestamp: DateTime<Utc>,
    pub status: AlertStatus,

    /// One-line explanation
    pub summary: String,
    /// Multi-line account profile
    pub behavior_summary: String,
    pub detected_patterns: Vec<PatternDetection>,
    /// Events sorted ascending by timestamp
    pub timeline: Vec<TimelineEvent>,
    pub network_relationships: Vec<NetworkSignal>,
    pub evidence_breakdown: EvidenceBreakdown,
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyst_comments: Option<String>,
}

/// Partial update applied by the external analyst workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AlertStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyst_comments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_from_risk_level() {
        assert_eq!(Severity::from_risk_level(RiskLevel::Normal), Severity::Low);
        assert_eq!(
            Severity::from_risk_level(RiskLevel::Suspicious),
            Severity::Medium
        );
        assert_eq!(Severity::from_risk_level(RiskLevel::HighRisk), Severity::High);
        assert_eq!(
            Severity::from_risk_level(RiskLevel::ProbableMl),
            Severity::Critical
        );
    }

    #[test]
    fn test_severity_display_is_lowercase() {
        assert_eq!(Severity::Critical.to_string(), "critical");
        assert_eq!(Severity::Medium.to_string(), "medium");
    }

    #[test]
    fn test_alert_status_serialization() {
        let json = serde_json::to_string(&AlertStatus::SarFiled).unwrap();
        assert_eq!(json, "\"sar_filed\"");
        let back: AlertStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AlertStatus::SarFiled);
    }
}
