//! Transaction data structures for money-laundering detection

use crate::clock::Clock;
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single funds transfer between two accounts, immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction identifier (externally supplied, opaque)
    pub id: String,

    /// Originating account
    pub sender: String,

    /// Beneficiary account
    pub receiver: String,

    /// Transferred amount, strictly positive
    pub amount: f64,

    /// Absolute instant of the transfer
    pub timestamp: DateTime<Utc>,

    /// Pass-through fields, not consumed by the engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_account: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl Transaction {
    /// Create a transaction with the required fields.
    pub fn new(
        id: impl Into<String>,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        amount: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
            timestamp,
            bank_account: None,
            currency: None,
            country: None,
        }
    }

    /// Conventional generated id: `TX-<epoch-ms>`.
    pub fn generate_id(clock: &dyn Clock) -> String {
        format!("TX-{}", clock.epoch_millis())
    }

    /// Whether the account appears on either side of the transfer.
    pub fn touches(&self, account_id: &str) -> bool {
        self.sender == account_id || self.receiver == account_id
    }

    /// Reject transfers the engine must never ingest.
    pub fn validate(&self) -> Result<()> {
        if self.amount <= 0.0 || !self.amount.is_finite() {
            return Err(EngineError::invalid_transaction(
                &self.id,
                format!("amount must be positive, got {}", self.amount),
            ));
        }
        if self.sender == self.receiver {
            return Err(EngineError::invalid_transaction(
                &self.id,
                "sender and receiver must differ",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_transaction_serialization() {
        let tx = Transaction::new("TX-1", "acct-a", "acct-b", 2500.0, ts());

        let json = serde_json::to_string(&tx).unwrap();
        let deserialized: Transaction = serde_json::from_str(&json).unwrap();

        assert_eq!(tx, deserialized);
    }

    #[test]
    fn test_validation_rejects_bad_transfers() {
        let zero = Transaction::new("TX-2", "a", "b", 0.0, ts());
        assert!(zero.validate().is_err());

        let negative = Transaction::new("TX-3", "a", "b", -10.0, ts());
        assert!(negative.validate().is_err());

        let self_transfer = Transaction::new("TX-4", "a", "a", 100.0, ts());
        assert!(self_transfer.validate().is_err());

        let ok = Transaction::new("TX-5", "a", "b", 100.0, ts());
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_touches() {
        let tx = Transaction::new("TX-6", "a", "b", 100.0, ts());
        assert!(tx.touches("a"));
        assert!(tx.touches("b"));
        assert!(!tx.touches("c"));
    }

    #[test]
    fn test_generated_id_follows_convention() {
        let clock = crate::clock::FixedClock::new(ts());
        let id = Transaction::generate_id(&clock);
        assert_eq!(id, format!("TX-{}", ts().timestamp_millis()));
    }
}
