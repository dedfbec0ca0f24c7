//! Data Transfer Objects exchanged with bill providers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Money, TransactionId};

// ─────────────────────────────────────────────────────────────────────────────
// Inquiry
// ─────────────────────────────────────────────────────────────────────────────

/// Outstanding bill returned by a provider inquiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillDetails {
    /// Provider-side bill identifier
    pub bill_id: String,
    pub customer_id: String,
    /// Name on the account, when the provider discloses it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    /// Amount due
    pub amount: Money,
    /// Human readable summary (period, product)
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Payment
// ─────────────────────────────────────────────────────────────────────────────

/// Request to pay a bill.
///
/// `transaction_id` doubles as the idempotency key: a provider must apply at
/// most one financial effect per transaction id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayRequest {
    pub transaction_id: TransactionId,
    pub bill_id: String,
    /// Final chargeable amount (after fees and discounts)
    pub amount: Money,
}

/// Provider's confirmation that a payment was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderReceipt {
    pub transaction_id: TransactionId,
    /// Reference assigned by the provider
    pub provider_reference: String,
    pub bill_id: String,
    pub amount: Money,
    pub paid_at: DateTime<Utc>,
}
