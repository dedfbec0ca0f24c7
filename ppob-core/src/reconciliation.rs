//! Reconciliation ledger for payments the provider applied but the local
//! store never recorded.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{error, info};

use ppob_types::{Money, ProviderReceipt, TransactionId};

/// A payment the provider accepted whose local commit did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationEntry {
    pub transaction_id: TransactionId,
    pub provider_reference: String,
    pub bill_id: String,
    pub amount: Money,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

impl ReconciliationEntry {
    fn from_receipt(receipt: &ProviderReceipt, reason: impl Into<String>) -> Self {
        Self {
            transaction_id: receipt.transaction_id.clone(),
            provider_reference: receipt.provider_reference.clone(),
            bill_id: receipt.bill_id.clone(),
            amount: receipt.amount,
            reason: reason.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Shared, concurrent log of unreconciled settlements, keyed by transaction.
#[derive(Debug, Default)]
pub struct ReconciliationLog {
    entries: DashMap<TransactionId, ReconciliationEntry>,
}

impl ReconciliationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: ReconciliationEntry) {
        error!(
            transaction_id = %entry.transaction_id,
            provider_reference = %entry.provider_reference,
            amount = %entry.amount,
            reason = %entry.reason,
            "provider settled payment but local record was lost"
        );
        self.entries.insert(entry.transaction_id.clone(), entry);
    }

    /// Marks a transaction as reconciled, returning its entry if it had one.
    pub fn resolve(&self, transaction_id: &TransactionId) -> Option<ReconciliationEntry> {
        let (_, entry) = self.entries.remove(transaction_id)?;
        info!(transaction_id = %transaction_id, "reconciliation entry resolved");
        Some(entry)
    }

    pub fn get(&self, transaction_id: &TransactionId) -> Option<ReconciliationEntry> {
        self.entries.get(transaction_id).map(|e| e.value().clone())
    }

    /// Unresolved entries, oldest first.
    pub fn pending(&self) -> Vec<ReconciliationEntry> {
        let mut entries: Vec<_> = self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| {
            (a.recorded_at, &a.transaction_id).cmp(&(b.recorded_at, &b.transaction_id))
        });
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Arms a guard for a receipt the provider just returned.
    pub fn guard(&self, receipt: &ProviderReceipt) -> SettlementGuard<'_> {
        SettlementGuard {
            log: self,
            receipt: Some(receipt.clone()),
        }
    }
}

/// Records a reconciliation entry unless the settlement is confirmed as
/// committed locally.
///
/// Dropping an armed guard (early return, panic, or the payment future being
/// cancelled mid-commit) records the entry.
#[must_use = "dropping the guard records the settlement as unreconciled"]
pub struct SettlementGuard<'a> {
    log: &'a ReconciliationLog,
    receipt: Option<ProviderReceipt>,
}

impl SettlementGuard<'_> {
    /// The settlement is durable locally; nothing to reconcile.
    pub fn disarm(mut self) {
        self.receipt = None;
    }

    /// Records the entry now with a specific reason.
    pub fn fail(mut self, reason: impl Into<String>) {
        if let Some(receipt) = self.receipt.take() {
            self.log
                .record(ReconciliationEntry::from_receipt(&receipt, reason));
        }
    }
}

impl Drop for SettlementGuard<'_> {
    fn drop(&mut self) {
        if let Some(receipt) = self.receipt.take() {
            self.log.record(ReconciliationEntry::from_receipt(
                &receipt,
                "abandoned before local commit",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppob_types::Currency;

    fn receipt(id: &str) -> ProviderReceipt {
        ProviderReceipt {
            transaction_id: TransactionId::from(id),
            provider_reference: format!("REF-{id}"),
            bill_id: "BILL-1".to_string(),
            amount: Money::new(10_250, Currency::IDR).unwrap(),
            paid_at: Utc::now(),
        }
    }

    #[test]
    fn test_disarmed_guard_records_nothing() {
        let log = ReconciliationLog::new();
        log.guard(&receipt("tx-1")).disarm();
        assert!(log.is_empty());
    }

    #[test]
    fn test_dropped_guard_records_entry() {
        let log = ReconciliationLog::new();
        {
            let _guard = log.guard(&receipt("tx-1"));
        }
        let entry = log.get(&TransactionId::from("tx-1")).unwrap();
        assert_eq!(entry.provider_reference, "REF-tx-1");
        assert_eq!(entry.reason, "abandoned before local commit");
    }

    #[test]
    fn test_failed_guard_keeps_reason_and_resolves() {
        let log = ReconciliationLog::new();
        log.guard(&receipt("tx-1")).fail("commit conflict");
        log.guard(&receipt("tx-2")).fail("storage down");

        let pending = log.pending();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].reason, "commit conflict");

        let resolved = log.resolve(&TransactionId::from("tx-1")).unwrap();
        assert_eq!(resolved.transaction_id.as_str(), "tx-1");
        assert!(log.resolve(&TransactionId::from("tx-1")).is_none());
        assert_eq!(log.len(), 1);
    }
}
