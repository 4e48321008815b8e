//! Persistence abstraction.
//!
//! The engine reads and writes exclusively through [`Store`]. [`MemoryStore`]
//! backs tests and the demo binary with a single mutex-guarded document; a
//! production implementation can serialize the same document into a
//! transactional KV. Lists keep newest-first order, which callers observe.

use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::types::alert::{Alert, AlertPatch};
use crate::types::evidence::AccountEvidence;
use crate::types::transaction::Transaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Timestamped entry in the append-only audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Random opaque id
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub action: String,
    pub details: String,
}

/// Narrow persistence contract consumed by the engine.
pub trait Store: Send + Sync {
    /// Prepend a transaction; the list stays newest-first.
    fn add_transaction(&self, tx: Transaction) -> Result<()>;
    fn list_transactions(&self) -> Result<Vec<Transaction>>;
    /// Overwrite an existing transaction by id.
    fn update_transaction(&self, tx: Transaction) -> Result<()>;

    fn get_evidence(&self, account_id: &str) -> Result<Option<AccountEvidence>>;
    fn put_evidence(&self, account_id: &str, evidence: AccountEvidence) -> Result<()>;
    fn list_evidence(&self) -> Result<Vec<AccountEvidence>>;

    fn list_alerts(&self) -> Result<Vec<Alert>>;
    /// Alerts are append-only; prepended, newest-first.
    fn append_alert(&self, alert: Alert) -> Result<()>;
    fn update_alert(&self, alert_id: &str, patch: AlertPatch) -> Result<()>;

    fn log_audit(&self, user: &str, action: &str, details: &str) -> Result<()>;
    fn audit_log(&self) -> Result<Vec<AuditRecord>>;
}

/// The one logical document a production KV would persist.
///
/// `users` and `watchlist` belong to outer layers (auth, case management);
/// the engine carries them through serialization untouched.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    users: Vec<serde_json::Value>,
    transactions: Vec<Transaction>,
    alerts: Vec<Alert>,
    audit_logs: Vec<AuditRecord>,
    watchlist: Vec<String>,
    account_evidence: HashMap<String, AccountEvidence>,
}

/// In-memory store; all writes serialize through one lock.
pub struct MemoryStore {
    document: RwLock<StoreDocument>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            document: RwLock::new(StoreDocument::default()),
            clock,
        }
    }

    /// Serialize the whole document, e.g. to seed a persistent backing.
    pub fn to_json(&self) -> Result<String> {
        let doc = self.read()?;
        serde_json::to_string(&*doc).map_err(|e| EngineError::Store(e.to_string()))
    }

    /// Replace the document with a previously serialized one.
    pub fn from_json(clock: Arc<dyn Clock>, json: &str) -> Result<Self> {
        let document: StoreDocument =
            serde_json::from_str(json).map_err(|e| EngineError::Store(e.to_string()))?;
        Ok(Self {
            document: RwLock::new(document),
            clock,
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreDocument>> {
        self.document
            .read()
            .map_err(|_| EngineError::Store("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreDocument>> {
        self.document
            .write()
            .map_err(|_| EngineError::Store("store lock poisoned".to_string()))
    }
}

impl Store for MemoryStore {
    fn add_transaction(&self, tx: Transaction) -> Result<()> {
        let mut doc = self.write()?;
        doc.transactions.insert(0, tx);
        Ok(())
    }

    fn list_transactions(&self) -> Result<Vec<Transaction>> {
        Ok(self.read()?.transactions.clone())
    }

    fn update_transaction(&self, tx: Transaction) -> Result<()> {
        let mut doc = self.write()?;
        match doc.transactions.iter_mut().find(|t| t.id == tx.id) {
            Some(slot) => {
                *slot = tx;
                Ok(())
            }
            None => Err(EngineError::Store(format!(
                "unknown transaction id {}",
                tx.id
            ))),
        }
    }

    fn get_evidence(&self, account_id: &str) -> Result<Option<AccountEvidence>> {
        Ok(self.read()?.account_evidence.get(account_id).cloned())
    }

    fn put_evidence(&self, account_id: &str, evidence: AccountEvidence) -> Result<()> {
        let mut doc = self.write()?;
        doc.account_evidence.insert(account_id.to_string(), evidence);
        Ok(())
    }

    fn list_evidence(&self) -> Result<Vec<AccountEvidence>> {
        Ok(self.read()?.account_evidence.values().cloned().collect())
    }

    fn list_alerts(&self) -> Result<Vec<Alert>> {
        Ok(self.read()?.alerts.clone())
    }

    fn append_alert(&self, alert: Alert) -> Result<()> {
        let mut doc = self.write()?;
        doc.alerts.insert(0, alert);
        Ok(())
    }

    fn update_alert(&self, alert_id: &str, patch: AlertPatch) -> Result<()> {
        let mut doc = self.write()?;
        let alert = doc
            .alerts
            .iter_mut()
            .find(|a| a.id == alert_id)
            .ok_or_else(|| EngineError::Store(format!("unknown alert id {alert_id}")))?;
        if let Some(status) = patch.status {
            alert.status = status;
        }
        if let Some(comments) = patch.analyst_comments {
            alert.analyst_comments = Some(comments);
        }
        Ok(())
    }

    fn log_audit(&self, user: &str, action: &str, details: &str) -> Result<()> {
        let record = AuditRecord {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: self.clock.now(),
            user: user.to_string(),
            action: action.to_string(),
            details: details.to_string(),
        };
        let mut doc = self.write()?;
        doc.audit_logs.insert(0, record);
        Ok(())
    }

    fn audit_log(&self) -> Result<Vec<AuditRecord>> {
        Ok(self.read()?.audit_logs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::types::alert::AlertStatus;
    use chrono::TimeZone;

    fn store() -> MemoryStore {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        ));
        MemoryStore::new(clock)
    }

    fn tx(id: &str, amount: f64) -> Transaction {
        Transaction::new(
            id,
            "acct-a",
            "acct-b",
            amount,
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_transactions_are_newest_first() {
        let store = store();
        store.add_transaction(tx("TX-1", 100.0)).unwrap();
        store.add_transaction(tx("TX-2", 200.0)).unwrap();

        let txs = store.list_transactions().unwrap();
        assert_eq!(txs[0].id, "TX-2");
        assert_eq!(txs[1].id, "TX-1");
    }

    #[test]
    fn test_update_transaction_overwrites_by_id() {
        let store = store();
        store.add_transaction(tx("TX-1", 100.0)).unwrap();

        let mut updated = tx("TX-1", 100.0);
        updated.currency = Some("EUR".to_string());
        store.update_transaction(updated).unwrap();

        let txs = store.list_transactions().unwrap();
        assert_eq!(txs[0].currency.as_deref(), Some("EUR"));

        assert!(store.update_transaction(tx("TX-404", 1.0)).is_err());
    }

    #[test]
    fn test_audit_log_records_timestamp_and_user() {
        let store = store();
        store.log_audit("system", "generate_alert", "details").unwrap();

        let log = store.audit_log().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].user, "system");
        assert_eq!(log[0].action, "generate_alert");
        assert_eq!(
            log[0].timestamp,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
        );
        assert!(!log[0].id.is_empty());
    }

    #[test]
    fn test_update_alert_applies_patch() {
        let store = store();
        let alert = crate::engine::alert::tests_support::minimal_alert("ALERT-1", "acct-a");
        store.append_alert(alert).unwrap();

        store
            .update_alert(
                "ALERT-1",
                AlertPatch {
                    status: Some(AlertStatus::SarFiled),
                    analyst_comments: Some("filed with FIU".to_string()),
                },
            )
            .unwrap();

        let alerts = store.list_alerts().unwrap();
        assert_eq!(alerts[0].status, AlertStatus::SarFiled);
        assert_eq!(alerts[0].analyst_comments.as_deref(), Some("filed with FIU"));
    }

    #[test]
    fn test_document_round_trip() {
        let store = store();
        store.add_transaction(tx("TX-1", 100.0)).unwrap();
        store.log_audit("system", "ingest", "TX-1").unwrap();

        let json = store.to_json().unwrap();
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap(),
        ));
        let restored = MemoryStore::from_json(clock, &json).unwrap();

        assert_eq!(restored.list_transactions().unwrap().len(), 1);
        assert_eq!(restored.audit_log().unwrap().len(), 1);
    }
}
