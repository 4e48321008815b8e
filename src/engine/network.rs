//! Fund-flow network analysis.
//!
//! The directed multigraph is implied by the transaction list: nodes are
//! accounts, edges are transactions. It is rebuilt from the store on every
//! call, so traversal state lives in a single reusable path vector plus an
//! edge-visited set keyed by transaction id.

use crate::config::DetectionConfig;
use crate::error::Result;
use crate::store::Store;
use crate::types::alert::Severity;
use crate::types::evidence::RiskLevel;
use crate::types::transaction::Transaction;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Which side of the flagged counterparty the account sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkDirection {
    Inbound,
    Outbound,
}

/// One transaction connecting the account to an already-flagged counterparty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedLink {
    pub transaction_id: String,
    pub counterparty: String,
    pub direction: LinkDirection,
    pub amount: f64,
    pub counterparty_risk: RiskLevel,
}

/// Structured payload of one network signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NetworkSignalKind {
    /// Funds leave the account and cycle back to it
    CircularFlow {
        /// Account hops, starting and ending at the analyzed account
        path: Vec<String>,
        transaction_ids: Vec<String>,
        length: usize,
    },
    /// Many counterparties on both sides with rapid pass-through
    HubAccount {
        unique_senders: usize,
        unique_receivers: usize,
        rapid_redistributions: usize,
    },
    /// Direct edges to accounts already classified high risk
    FlaggedLinks {
        counterparties: Vec<String>,
        links: Vec<FlaggedLink>,
    },
}

impl NetworkSignalKind {
    pub fn name(&self) -> &'static str {
        match self {
            NetworkSignalKind::CircularFlow { .. } => "circular_flow",
            NetworkSignalKind::HubAccount { .. } => "hub_account",
            NetworkSignalKind::FlaggedLinks { .. } => "flagged_links",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSignal {
    pub severity: Severity,
    pub description: String,
    #[serde(flatten)]
    pub kind: NetworkSignalKind,
}

/// Result of analyzing one account's position in the flow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkAnalysis {
    pub signals: Vec<NetworkSignal>,
    /// Two or more independent signals mark the account as probable ML
    pub is_probable_ml: bool,
}

/// Detects circular flows, hub behavior, and links to flagged accounts.
#[derive(Clone)]
pub struct NetworkAnalyzer {
    config: Arc<DetectionConfig>,
    store: Arc<dyn Store>,
}

impl NetworkAnalyzer {
    pub fn new(config: Arc<DetectionConfig>, store: Arc<dyn Store>) -> Self {
        Self { config, store }
    }

    /// Run all signal detectors for one account.
    pub fn analyze(
        &self,
        account_id: &str,
        transactions: &[Transaction],
    ) -> Result<NetworkAnalysis> {
        let mut signals = Vec::new();

        if let Some(signal) = self.circular_flow(account_id, transactions) {
            signals.push(signal);
        }
        if let Some(signal) = self.hub_account(account_id, transactions) {
            signals.push(signal);
        }
        if let Some(signal) = self.flagged_links(account_id, transactions)? {
            signals.push(signal);
        }

        let is_probable_ml = signals.len() >= 2;
        debug!(
            account_id,
            signal_count = signals.len(),
            is_probable_ml,
            "network analysis complete"
        );
        Ok(NetworkAnalysis {
            signals,
            is_probable_ml,
        })
    }

    /// Bounded DFS from the account. Each edge is traversable once per path;
    /// accounts may repeat. Paths that return to the origin with at least the
    /// minimum cycle length are candidates; the longest one is emitted.
    fn circular_flow(&self, account_id: &str, transactions: &[Transaction]) -> Option<NetworkSignal> {
        let mut adjacency: HashMap<&str, Vec<&Transaction>> = HashMap::new();
        for tx in transactions {
            adjacency.entry(tx.sender.as_str()).or_default().push(tx);
        }
        for edges in adjacency.values_mut() {
            edges.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        }

        let mut path: Vec<&Transaction> = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut best: Vec<&Transaction> = Vec::new();
        self.walk(account_id, account_id, &adjacency, &mut path, &mut visited, &mut best);

        if best.is_empty() {
            return None;
        }

        let mut hops = Vec::with_capacity(best.len() + 1);
        hops.push(account_id.to_string());
        hops.extend(best.iter().map(|tx| tx.receiver.clone()));
        let transaction_ids: Vec<String> = best.iter().map(|tx| tx.id.clone()).collect();
        let length = best.len();

        Some(NetworkSignal {
            severity: Severity::Critical,
            description: format!(
                "funds leaving {} cycle back through {} hops: {}",
                account_id,
                length,
                hops.join(" -> ")
            ),
            kind: NetworkSignalKind::CircularFlow {
                path: hops,
                transaction_ids,
                length,
            },
        })
    }

    fn walk<'a>(
        &self,
        origin: &str,
        current: &str,
        adjacency: &HashMap<&str, Vec<&'a Transaction>>,
        path: &mut Vec<&'a Transaction>,
        visited: &mut HashSet<&'a str>,
        best: &mut Vec<&'a Transaction>,
    ) {
        if path.len() >= self.config.network.max_path_depth {
            return;
        }
        let Some(edges) = adjacency.get(current) else {
            return;
        };
        for &edge in edges {
            if !visited.insert(edge.id.as_str()) {
                continue;
            }
            path.push(edge);
            if edge.receiver == origin {
                if path.len() >= self.config.network.min_cycle_length && path.len() > best.len() {
                    *best = path.clone();
                }
            } else {
                self.walk(origin, &edge.receiver, adjacency, path, visited, best);
            }
            path.pop();
            visited.remove(edge.id.as_str());
        }
    }

    /// Fan-in plus fan-out with rapid pass-through of received funds.
    fn hub_account(&self, account_id: &str, transactions: &[Transaction]) -> Option<NetworkSignal> {
        let cfg = &self.config.network;

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

        let unique_senders: HashSet<&str> = inflows.iter().map(|tx| tx.sender.as_str()).collect();
        let unique_receivers: HashSet<&str> =
            outflows.iter().map(|tx| tx.receiver.as_str()).collect();
        if unique_senders.len() < cfg.hub_min_counterparties
            || unique_receivers.len() < cfg.hub_min_counterparties
        {
            return None;
        }

        let window = Duration::hours(cfg.rapid_redistribution_hours);
        let rapid_redistributions = inflows
            .iter()
            .filter(|inflow| {
                outflows.iter().any(|outflow| {
                    outflow.timestamp > inflow.timestamp
                        && outflow.timestamp - inflow.timestamp < window
                })
            })
            .count();
        if rapid_redistributions < cfg.min_rapid_redistributions {
            return None;
        }

        Some(NetworkSignal {
            severity: Severity::Critical,
            description: format!(
                "{} receives from {} accounts and pays out to {} accounts, redistributing {} inflows within {} hours",
                account_id,
                unique_senders.len(),
                unique_receivers.len(),
                rapid_redistributions,
                cfg.rapid_redistribution_hours
            ),
            kind: NetworkSignalKind::HubAccount {
                unique_senders: unique_senders.len(),
                unique_receivers: unique_receivers.len(),
                rapid_redistributions,
            },
        })
    }

    /// Direct edges between the account and counterparties whose persisted
    /// evidence already classifies them high risk or probable ML.
    fn flagged_links(
        &self,
        account_id: &str,
        transactions: &[Transaction],
    ) -> Result<Option<NetworkSignal>> {
        let flagged: HashMap<String, RiskLevel> = self
            .store
            .list_evidence()?
            .into_iter()
            .filter(|e| e.risk_level.is_flagged() && e.account_id != account_id)
            .map(|e| (e.account_id, e.risk_level))
            .collect();
        if flagged.is_empty() {
            return Ok(None);
        }

        let mut links = Vec::new();
        for tx in transactions {
            if tx.sender == account_id {
                if let Some(&risk) = flagged.get(&tx.receiver) {
                    links.push(FlaggedLink {
                        transaction_id: tx.id.clone(),
                        counterparty: tx.receiver.clone(),
                        direction: LinkDirection::Outbound,
                        amount: tx.amount,
                        counterparty_risk: risk,
                    });
                }
            } else if tx.receiver == account_id {
                if let Some(&risk) = flagged.get(&tx.sender) {
                    links.push(FlaggedLink {
                        transaction_id: tx.id.clone(),
                        counterparty: tx.sender.clone(),
                        direction: LinkDirection::Inbound,
                        amount: tx.amount,
                        counterparty_risk: risk,
                    });
                }
            }
        }
        if links.is_empty() {
            return Ok(None);
        }

        let mut counterparties: Vec<String> = links
            .iter()
            .map(|link| link.counterparty.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        counterparties.sort();

        Ok(Some(NetworkSignal {
            severity: Severity::High,
            description: format!(
                "{} transacted with {} flagged counterparties across {} transfers",
                account_id,
                counterparties.len(),
                links.len()
            ),
            kind: NetworkSignalKind::FlaggedLinks {
                counterparties,
                links,
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::MemoryStore;
    use crate::types::evidence::AccountEvidence;
    use chrono::{DateTime, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    fn analyzer() -> (NetworkAnalyzer, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new(Arc::new(FixedClock::new(now()))));
        let analyzer = NetworkAnalyzer::new(Arc::new(DetectionConfig::default()), store.clone());
        (analyzer, store)
    }

    fn tx_at(id: &str, sender: &str, receiver: &str, amount: f64, minutes_ago: i64) -> Transaction {
        Transaction::new(
            id,
            sender,
            receiver,
            amount,
            now() - Duration::minutes(minutes_ago),
        )
    }

    fn flag(store: &MemoryStore, account_id: &str, level: RiskLevel) {
        store
            .put_evidence(
                account_id,
                AccountEvidence {
                    account_id: account_id.to_string(),
                    score: 70,
                    risk_level: level,
                    suspicious_transactions: 0,
                    confirmed_patterns: 0,
                    network_signals: 0,
                    is_probable_ml: level == RiskLevel::ProbableMl,
                    last_updated: now(),
                },
            )
            .unwrap();
    }

    #[test]
    fn test_circular_flow_three_hop_cycle() {
        let (analyzer, _store) = analyzer();
        let txs = vec![
            tx_at("TX-1", "a", "b", 1000.0, 120),
            tx_at("TX-2", "b", "c", 1000.0, 60),
            tx_at("TX-3", "c", "a", 1000.0, 10),
        ];

        let analysis = analyzer.analyze("a", &txs).unwrap();
        assert_eq!(analysis.signals.len(), 1);
        assert!(!analysis.is_probable_ml);

        let signal = &analysis.signals[0];
        assert_eq!(signal.severity, Severity::Critical);
        match &signal.kind {
            NetworkSignalKind::CircularFlow { path, length, .. } => {
                assert_eq!(*length, 3);
                assert_eq!(path, &["a", "b", "c", "a"]);
            }
            other => panic!("expected circular flow, got {other:?}"),
        }
    }

    #[test]
    fn test_circular_flow_two_hop_too_short() {
        let (analyzer, _store) = analyzer();
        let txs = vec![
            tx_at("TX-1", "a", "b", 1000.0, 60),
            tx_at("TX-2", "b", "a", 1000.0, 30),
        ];

        let analysis = analyzer.analyze("a", &txs).unwrap();
        assert!(analysis.signals.is_empty());
    }

    #[test]
    fn test_circular_flow_depth_bound() {
        // Seven-hop cycle exceeds the depth limit of five.
        let (analyzer, _store) = analyzer();
        let accounts = ["a", "b", "c", "d", "e", "f", "g"];
        let txs: Vec<Transaction> = (0..7)
            .map(|i| {
                tx_at(
                    &format!("TX-{i}"),
                    accounts[i],
                    accounts[(i + 1) % 7],
                    500.0,
                    (7 - i as i64) * 10,
                )
            })
            .collect();

        let analysis = analyzer.analyze("a", &txs).unwrap();
        assert!(analysis.signals.is_empty());
    }

    #[test]
    fn test_circular_flow_emits_longest_path() {
        let (analyzer, _store) = analyzer();
        let txs = vec![
            // 3-hop cycle
            tx_at("TX-1", "a", "b", 1000.0, 300),
            tx_at("TX-2", "b", "c", 1000.0, 280),
            tx_at("TX-3", "c", "a", 1000.0, 260),
            // 4-hop cycle
            tx_at("TX-4", "a", "p", 900.0, 200),
            tx_at("TX-5", "p", "q", 900.0, 180),
            tx_at("TX-6", "q", "r", 900.0, 160),
            tx_at("TX-7", "r", "a", 900.0, 140),
        ];

        let analysis = analyzer.analyze("a", &txs).unwrap();
        let signal = &analysis.signals[0];
        match &signal.kind {
            NetworkSignalKind::CircularFlow { length, .. } => assert_eq!(*length, 4),
            other => panic!("expected circular flow, got {other:?}"),
        }
    }

    fn hub_transactions() -> Vec<Transaction> {
        let mut txs = Vec::new();
        // Six senders pay in; four of the inflows are redistributed within a day.
        for i in 0..6 {
            txs.push(tx_at(
                &format!("IN-{i}"),
                &format!("src-{i}"),
                "hub",
                2_000.0,
                600 - i as i64 * 10,
            ));
        }
        for i in 0..6 {
            txs.push(tx_at(
                &format!("OUT-{i}"),
                "hub",
                &format!("dst-{i}"),
                1_900.0,
                400 - i as i64 * 10,
            ));
        }
        txs
    }

    #[test]
    fn test_hub_account_detected() {
        let (analyzer, _store) = analyzer();
        let txs = hub_transactions();

        let analysis = analyzer.analyze("hub", &txs).unwrap();
        let hub = analysis
            .signals
            .iter()
            .find(|s| matches!(s.kind, NetworkSignalKind::HubAccount { .. }))
            .expect("hub signal");
        match &hub.kind {
            NetworkSignalKind::HubAccount {
                unique_senders,
                unique_receivers,
                rapid_redistributions,
            } => {
                assert_eq!(*unique_senders, 6);
                assert_eq!(*unique_receivers, 6);
                assert!(*rapid_redistributions >= 3);
            }
            other => panic!("expected hub, got {other:?}"),
        }
    }

    #[test]
    fn test_hub_requires_both_sides() {
        let (analyzer, _store) = analyzer();
        // Six senders but only two receivers.
        let mut txs = Vec::new();
        for i in 0..6 {
            txs.push(tx_at(
                &format!("IN-{i}"),
                &format!("src-{i}"),
                "hub",
                2_000.0,
                300,
            ));
        }
        txs.push(tx_at("OUT-0", "hub", "dst-0", 1_900.0, 100));
        txs.push(tx_at("OUT-1", "hub", "dst-1", 1_900.0, 90));

        let analysis = analyzer.analyze("hub", &txs).unwrap();
        assert!(analysis.signals.is_empty());
    }

    #[test]
    fn test_flagged_links_either_direction() {
        let (analyzer, store) = analyzer();
        flag(&store, "dirty-1", RiskLevel::HighRisk);
        flag(&store, "dirty-2", RiskLevel::ProbableMl);

        let txs = vec![
            tx_at("TX-1", "a", "dirty-1", 500.0, 60),
            tx_at("TX-2", "dirty-2", "a", 700.0, 30),
            tx_at("TX-3", "a", "clean", 100.0, 10),
        ];

        let analysis = analyzer.analyze("a", &txs).unwrap();
        let signal = analysis
            .signals
            .iter()
            .find(|s| matches!(s.kind, NetworkSignalKind::FlaggedLinks { .. }))
            .expect("flagged links signal");
        assert_eq!(signal.severity, Severity::High);
        match &signal.kind {
            NetworkSignalKind::FlaggedLinks {
                counterparties,
                links,
            } => {
                assert_eq!(counterparties, &["dirty-1", "dirty-2"]);
                assert_eq!(links.len(), 2);
                assert!(links
                    .iter()
                    .any(|l| l.direction == LinkDirection::Outbound
                        && l.counterparty == "dirty-1"));
                assert!(links
                    .iter()
                    .any(|l| l.direction == LinkDirection::Inbound
                        && l.counterparty == "dirty-2"));
            }
            other => panic!("expected flagged links, got {other:?}"),
        }
    }

    #[test]
    fn test_suspicious_counterparty_below_flag_threshold_ignored() {
        let (analyzer, store) = analyzer();
        flag(&store, "borderline", RiskLevel::Suspicious);

        let txs = vec![tx_at("TX-1", "a", "borderline", 500.0, 60)];
        let analysis = analyzer.analyze("a", &txs).unwrap();
        assert!(analysis.signals.is_empty());
    }

    #[test]
    fn test_two_signals_mark_probable_ml() {
        let (analyzer, store) = analyzer();
        flag(&store, "dirty-1", RiskLevel::HighRisk);
        flag(&store, "dirty-2", RiskLevel::HighRisk);

        let mut txs = hub_transactions();
        txs.push(tx_at("TX-D1", "hub", "dirty-1", 800.0, 50));
        txs.push(tx_at("TX-D2", "dirty-2", "hub", 800.0, 40));

        let analysis = analyzer.analyze("hub", &txs).unwrap();
        assert!(analysis.signals.len() >= 2);
        assert!(analysis.is_probable_ml);
    }
}
