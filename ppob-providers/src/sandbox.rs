//! In-process bill provider for development and tests.
//!
//! Holds outstanding bills, a prepaid wallet and the receipts it has issued.
//! Payments are idempotent per transaction id. Faults can be queued to
//! reproduce timeouts on either side of the financial effect.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::{debug, info};

use ppob_types::{
    BillDetails, BillProvider, PayRequest, ProviderError, ProviderReceipt, TransactionId,
};

use crate::product::BillProduct;

/// Failure injected into the next `pay` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Times out without charging.
    TimeoutBeforeApply,
    /// Charges, then times out before answering.
    TimeoutAfterApply,
    /// Fails with the given error without charging.
    Fail(ProviderError),
}

pub struct SandboxBillProvider {
    product: BillProduct,
    /// Outstanding bills by customer id
    bills: DashMap<String, BillDetails>,
    paid: DashMap<TransactionId, ProviderReceipt>,
    balance: AtomicI64,
    faults: Mutex<VecDeque<Fault>>,
    latency: Option<Duration>,
}

impl SandboxBillProvider {
    /// Sandbox with an unlimited wallet and no bills.
    pub fn new(product: BillProduct) -> Self {
        Self {
            product,
            bills: DashMap::new(),
            paid: DashMap::new(),
            balance: AtomicI64::new(i64::MAX),
            faults: Mutex::new(VecDeque::new()),
            latency: None,
        }
    }

    /// Wallet balance in minor units.
    pub fn with_balance(self, balance: i64) -> Self {
        self.balance.store(balance, Ordering::SeqCst);
        self
    }

    /// Delay applied to every provider call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_bill(self, bill: BillDetails) -> Self {
        self.add_bill(bill);
        self
    }

    pub fn add_bill(&self, bill: BillDetails) {
        self.bills.insert(bill.customer_id.clone(), bill);
    }

    /// Queues a fault for a later `pay` call, in FIFO order.
    pub async fn inject(&self, fault: Fault) {
        self.faults.lock().await.push_back(fault);
    }

    pub fn balance(&self) -> i64 {
        self.balance.load(Ordering::SeqCst)
    }

    /// Number of distinct payments applied.
    pub fn payments(&self) -> usize {
        self.paid.len()
    }

    pub fn receipt(&self, transaction_id: &TransactionId) -> Option<ProviderReceipt> {
        self.paid.get(transaction_id).map(|r| r.value().clone())
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Takes an outstanding bill out of the book so no other transaction
    /// can pay it. Returns `None` when another payer got there first.
    fn claim(&self, bill_id: &str) -> Option<BillDetails> {
        let customer_id = self
            .bills
            .iter()
            .find(|b| b.bill_id == bill_id)
            .map(|b| b.key().clone())?;
        self.bills
            .remove_if(&customer_id, |_, b| b.bill_id == bill_id)
            .map(|(_, bill)| bill)
    }

    /// Puts back a claimed bill whose payment did not go through.
    fn release(&self, bill: BillDetails) {
        self.bills.insert(bill.customer_id.clone(), bill);
    }

    /// Debits the wallet and issues a receipt, once per transaction id.
    fn apply(&self, request: &PayRequest) -> Result<ProviderReceipt, ProviderError> {
        let entry = match self.paid.entry(request.transaction_id.clone()) {
            Entry::Occupied(existing) => {
                debug!(transaction_id = %request.transaction_id, "replaying receipt");
                return Ok(existing.get().clone());
            }
            Entry::Vacant(vacant) => vacant,
        };

        let bill = self
            .claim(&request.bill_id)
            .ok_or_else(|| ProviderError::BillNotFound(request.bill_id.clone()))?;
        if let Err(err) = self.debit(request, &bill) {
            self.release(bill);
            return Err(err);
        }

        let receipt = ProviderReceipt {
            transaction_id: request.transaction_id.clone(),
            provider_reference: self.next_reference(),
            bill_id: request.bill_id.clone(),
            amount: request.amount,
            paid_at: Utc::now(),
        };
        info!(
            transaction_id = %request.transaction_id,
            reference = %receipt.provider_reference,
            amount = request.amount.amount(),
            "sandbox payment applied"
        );
        Ok(entry.insert(receipt).value().clone())
    }

    fn debit(&self, request: &PayRequest, bill: &BillDetails) -> Result<(), ProviderError> {
        if request.amount.currency() != bill.amount.currency() {
            return Err(ProviderError::Rejected(format!(
                "currency mismatch: bill is {:?}",
                bill.amount.currency()
            )));
        }
        if request.amount.amount() < bill.amount.amount() {
            return Err(ProviderError::Rejected(format!(
                "amount {} below bill amount {}",
                request.amount.amount(),
                bill.amount.amount()
            )));
        }

        let requested = request.amount.amount();
        self.balance
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |available| {
                (available >= requested).then(|| available - requested)
            })
            .map(|_| ())
            .map_err(|available| ProviderError::InsufficientBalance {
                available,
                requested,
            })
    }

    fn next_reference(&self) -> String {
        let suffix: u32 = rand::rng().random();
        format!("{}-{suffix:08X}", self.product.code().to_ascii_uppercase())
    }
}

#[async_trait]
impl BillProvider for SandboxBillProvider {
    async fn inquiry(&self, customer_id: &str) -> Result<BillDetails, ProviderError> {
        self.simulate_latency().await;
        if !self.validate_customer_id(customer_id) {
            return Err(ProviderError::InvalidCustomerId(customer_id.to_string()));
        }
        self.bills
            .get(customer_id)
            .map(|b| b.value().clone())
            .ok_or_else(|| ProviderError::BillNotFound(customer_id.to_string()))
    }

    async fn pay(&self, request: &PayRequest) -> Result<ProviderReceipt, ProviderError> {
        self.simulate_latency().await;
        let fault = self.faults.lock().await.pop_front();
        match fault {
            Some(Fault::TimeoutBeforeApply) => {
                Err(ProviderError::Timeout("sandbox timeout before apply".to_string()))
            }
            Some(Fault::TimeoutAfterApply) => {
                self.apply(request)?;
                Err(ProviderError::Timeout("sandbox timeout after apply".to_string()))
            }
            Some(Fault::Fail(err)) => Err(err),
            None => self.apply(request),
        }
    }

    fn validate_customer_id(&self, customer_id: &str) -> bool {
        self.product.validate_customer_id(customer_id)
    }
}
