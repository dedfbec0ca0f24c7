//! Payables and the transient payment data derived from them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::money::Money;
use crate::dto::BillDetails;

/// Fields a validator inspects. Transient: only the outcome of a payment is
/// persisted, through the transaction aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentData {
    pub amount: Money,
    pub method: Option<String>,
    pub reference: Option<String>,
    pub customer_id: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl PaymentData {
    pub fn new(amount: Money) -> Self {
        Self {
            amount,
            method: None,
            reference: None,
            customer_id: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Looks up a named field: `method`, `reference`, `customer_id`, or a
    /// metadata key.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "method" => self.method.as_deref(),
            "reference" => self.reference.as_deref(),
            "customer_id" => self.customer_id.as_deref(),
            other => self.metadata.get(other).map(String::as_str),
        }
    }
}

/// Anything exposing a chargeable, non-negative amount.
pub trait Payable: Send + Sync {
    fn amount(&self) -> Money;

    /// Provider-side identifier of the bill this payment settles.
    fn bill_id(&self) -> &str;

    fn customer_id(&self) -> &str;

    fn description(&self) -> String {
        format!("bill {}", self.bill_id())
    }

    /// Derives the data validators run against.
    fn payment_data(&self) -> PaymentData {
        PaymentData::new(self.amount())
            .with_reference(self.bill_id())
            .with_customer(self.customer_id())
    }
}

/// A bill ready to be paid, usually built from an inquiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillPayment {
    pub bill_id: String,
    pub customer_id: String,
    pub amount: Money,
    pub method: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl BillPayment {
    pub fn new(bill_id: impl Into<String>, customer_id: impl Into<String>, amount: Money) -> Self {
        Self {
            bill_id: bill_id.into(),
            customer_id: customer_id.into(),
            amount,
            method: None,
            description: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Builds a payable for the outstanding amount of an inquired bill.
    pub fn from_details(details: &BillDetails) -> Self {
        let mut payment = Self::new(&details.bill_id, &details.customer_id, details.amount);
        payment.description = Some(details.description.clone());
        payment
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl Payable for BillPayment {
    fn amount(&self) -> Money {
        self.amount
    }

    fn bill_id(&self) -> &str {
        &self.bill_id
    }

    fn customer_id(&self) -> &str {
        &self.customer_id
    }

    fn description(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("bill {}", self.bill_id))
    }

    fn payment_data(&self) -> PaymentData {
        let mut data = PaymentData::new(self.amount)
            .with_reference(&self.bill_id)
            .with_customer(&self.customer_id);
        data.method = self.method.clone();
        data.metadata = self.metadata.clone();
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Currency;

    #[test]
    fn test_payment_data_fields() {
        let data = PaymentData::new(Money::new(100, Currency::IDR).unwrap())
            .with_method("EWALLET")
            .with_metadata("area", "0123");

        assert_eq!(data.field("method"), Some("EWALLET"));
        assert_eq!(data.field("area"), Some("0123"));
        assert_eq!(data.field("reference"), None);
    }

    #[test]
    fn test_bill_payment_derives_payment_data() {
        let payment = BillPayment::new("BILL-1", "0123456789", Money::new(100, Currency::IDR).unwrap())
            .with_method("VA")
            .with_metadata("channel", "mobile");

        let data = payment.payment_data();
        assert_eq!(data.reference.as_deref(), Some("BILL-1"));
        assert_eq!(data.customer_id.as_deref(), Some("0123456789"));
        assert_eq!(data.method.as_deref(), Some("VA"));
        assert_eq!(data.field("channel"), Some("mobile"));
        assert_eq!(payment.description(), "bill BILL-1");
    }
}
