//! Payment Processor
//!
//! Orchestrates one bill payment through the unit of work: load, validate,
//! calculate, pay at the provider, record the settlement, commit.
//! Contains NO infrastructure logic; storage and providers are injected.

use std::sync::Arc;

use serde::Serialize;
use tracing::{Instrument, debug, info, info_span, instrument, warn};

use ppob_repo::{Store, UnitOfWork};
use ppob_types::{
    BillDetails, BillPayment, BillProvider, DomainError, EntryKind, Money, NotificationSender, PayRequest,
    Payable, PaymentCalculator, PaymentError, PaymentErrorKind, PaymentValidator, ProviderError,
    RepoError, Settlement, Stage, TransactionAggregate, TransactionId, TransactionStatus,
    UnitOfWorkState, ValidationFailure,
};
use ppob_types::policy::{CalculatorChain, ValidatorChain};

use crate::reconciliation::ReconciliationLog;

/// Outcome of a committed (or replayed) payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentReceipt {
    pub transaction_id: TransactionId,
    pub bill_id: String,
    pub base_amount: Money,
    pub charged_amount: Money,
    pub provider_reference: String,
    /// Entities held by the transaction after the payment
    pub entry_count: usize,
    pub unit_of_work: UnitOfWorkState,
    /// True when the transaction was already committed and nothing was paid
    pub replayed: bool,
}

impl PaymentReceipt {
    fn from_transaction(
        tx: &TransactionAggregate,
        settlement: &Settlement,
        unit_of_work: UnitOfWorkState,
        replayed: bool,
    ) -> Self {
        Self {
            transaction_id: tx.id().clone(),
            bill_id: settlement.bill_id.clone(),
            base_amount: settlement.base_amount,
            charged_amount: settlement.charged_amount,
            provider_reference: settlement.provider_reference.clone(),
            entry_count: tx.entry_count(),
            unit_of_work,
            replayed,
        }
    }
}

/// Application service for bill payments.
///
/// Generic over `P: BillProvider` - the provider adapter is injected at
/// compile time; validators, calculator and notifier at construction.
pub struct PaymentProcessor<P: BillProvider> {
    provider: P,
    store: Store,
    validators: ValidatorChain,
    calculator: Box<dyn PaymentCalculator>,
    notifier: Option<Arc<dyn NotificationSender>>,
    reconciliation: Arc<ReconciliationLog>,
}

impl<P: BillProvider> PaymentProcessor<P> {
    /// Creates a processor with no validators and no fees.
    pub fn new(provider: P, store: Store) -> Self {
        Self {
            provider,
            store,
            validators: ValidatorChain::new(),
            calculator: Box::new(CalculatorChain::new()),
            notifier: None,
            reconciliation: Arc::new(ReconciliationLog::new()),
        }
    }

    pub fn with_validators(mut self, validators: ValidatorChain) -> Self {
        self.validators = validators;
        self
    }

    pub fn with_calculator(mut self, calculator: impl PaymentCalculator + 'static) -> Self {
        self.calculator = Box::new(calculator);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSender>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Shares a reconciliation log between processors.
    pub fn with_reconciliation(mut self, log: Arc<ReconciliationLog>) -> Self {
        self.reconciliation = log;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn reconciliation(&self) -> &ReconciliationLog {
        &self.reconciliation
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Payment Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Pays a payable under a freshly generated transaction id.
    pub async fn process_payment(
        &self,
        payable: &dyn Payable,
    ) -> Result<PaymentReceipt, PaymentError> {
        self.process_payment_with_id(TransactionId::new(), payable)
            .await
    }

    /// Pays a payable under a caller-chosen transaction id.
    ///
    /// The id is the idempotency key: retrying after a transient failure
    /// never charges twice, and retrying after success returns the stored
    /// settlement without calling the provider.
    #[instrument(
        skip(self, payable),
        fields(transaction_id = %id, bill_id = %payable.bill_id())
    )]
    pub async fn process_payment_with_id(
        &self,
        id: TransactionId,
        payable: &dyn Payable,
    ) -> Result<PaymentReceipt, PaymentError> {
        let mut uow = self.store.begin();

        let found = uow.repository::<TransactionAggregate>().find(&id).await;
        let existing = found.map_err(|e| abort(&mut uow, Stage::Load, &id, e))?;

        if let Some(tx) = &existing {
            if let Err(failure) = ensure_same_payable(tx, payable) {
                return Err(abort(
                    &mut uow,
                    Stage::Validate,
                    &id,
                    PaymentErrorKind::Validation(failure),
                ));
            }
        }

        let mut tx = match existing {
            Some(tx) if tx.status() == TransactionStatus::Committed => {
                return self.replay(uow, tx).await;
            }
            Some(tx) if tx.status() == TransactionStatus::Voided => {
                let closed = DomainError::TransactionClosed {
                    id: id.clone(),
                    status: tx.status().to_string(),
                };
                return Err(abort(&mut uow, Stage::Load, &id, closed));
            }
            Some(tx) => tx,
            None => TransactionAggregate::open(id.clone()),
        };

        let data = payable.payment_data();
        if let Err(failure) = self.validators.check(&data) {
            return Err(abort(
                &mut uow,
                Stage::Validate,
                &id,
                PaymentErrorKind::Validation(failure),
            ));
        }
        if !self.provider.validate_customer_id(payable.customer_id()) {
            let failure = ValidationFailure::new(
                "customer_id",
                format!("invalid customer id {}", payable.customer_id()),
            );
            return Err(abort(
                &mut uow,
                Stage::Validate,
                &id,
                PaymentErrorKind::Validation(failure),
            ));
        }

        let base_amount = payable.amount();
        let charged_amount = self
            .calculator
            .calculate(base_amount)
            .map_err(|e| abort(&mut uow, Stage::Calculate, &id, e))?;
        debug!(base = %base_amount, charged = %charged_amount, "amount calculated");

        // The unit of work holds no locks; nothing is contended while the
        // provider is in flight.
        let request = PayRequest {
            transaction_id: id.clone(),
            bill_id: payable.bill_id().to_string(),
            amount: charged_amount,
        };
        let receipt = self
            .provider
            .pay(&request)
            .instrument(info_span!("provider_pay", amount = %charged_amount))
            .await
            .map_err(|e| abort(&mut uow, Stage::Provider, &id, e))?;

        let guard = self.reconciliation.guard(&receipt);
        if receipt.bill_id != request.bill_id {
            // The provider already settled another bill under this id.
            guard.fail(format!("provider receipt is for bill {}", receipt.bill_id));
            let failure = ValidationFailure::new(
                KEY_REUSE_RULE,
                format!(
                    "provider settled bill {} under transaction {id}",
                    receipt.bill_id
                ),
            );
            return Err(abort(
                &mut uow,
                Stage::Provider,
                &id,
                PaymentErrorKind::Validation(failure),
            ));
        }

        let settlement = Settlement {
            provider_reference: receipt.provider_reference.clone(),
            bill_id: receipt.bill_id.clone(),
            base_amount,
            charged_amount,
            settled_at: receipt.paid_at,
        };
        if let Err(e) = tx.record_settlement(settlement.clone()).and_then(|_| tx.seal()) {
            guard.fail(format!("could not record settlement: {e}"));
            return Err(abort(&mut uow, Stage::Record, &id, e));
        }
        if let Err(e) = uow.repository::<TransactionAggregate>().add(&tx).await {
            guard.fail(format!("could not stage settlement: {e}"));
            return Err(abort(&mut uow, Stage::Record, &id, e));
        }

        if let Err(e) = uow.commit().await {
            if self.settled_elsewhere(&id).await {
                // A concurrent attempt with the same id committed this
                // settlement; a retry replays it.
                guard.disarm();
            } else {
                guard.fail(format!("local commit failed: {e}"));
            }
            warn!(error = %e, "payment commit failed");
            return Err(PaymentError::new(Stage::Commit, id, uow.state(), e));
        }
        guard.disarm();
        self.reconciliation.resolve(&id);

        info!(
            charged = %charged_amount,
            provider_reference = %settlement.provider_reference,
            "payment committed"
        );
        let receipt = PaymentReceipt::from_transaction(&tx, &settlement, uow.state(), false);
        self.notify(payable.customer_id(), &receipt).await;
        Ok(receipt)
    }

    /// Inquires the outstanding bill and pays it in full.
    #[instrument(skip(self))]
    pub async fn pay_bill(&self, customer_id: &str) -> Result<PaymentReceipt, PaymentError> {
        let details = self
            .inquire(customer_id)
            .await
            .map_err(|e| PaymentError::before_transaction(Stage::Inquiry, e))?;
        self.process_payment(&BillPayment::from_details(&details))
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Inquiry
    // ─────────────────────────────────────────────────────────────────────────────

    /// Looks up the outstanding bill for a customer.
    #[instrument(skip(self))]
    pub async fn inquire(&self, customer_id: &str) -> Result<BillDetails, ProviderError> {
        if !self.provider.validate_customer_id(customer_id) {
            return Err(ProviderError::InvalidCustomerId(customer_id.to_string()));
        }
        self.provider.inquiry(customer_id).await
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Transaction Lifecycle
    // ─────────────────────────────────────────────────────────────────────────────

    /// Records an open transaction for a payable without paying it yet.
    #[instrument(skip(self, payable), fields(bill_id = %payable.bill_id()))]
    pub async fn open_transaction(
        &self,
        payable: &dyn Payable,
    ) -> Result<TransactionId, PaymentError> {
        let id = TransactionId::new();
        let mut uow = self.store.begin();

        if let Err(failure) = self.validators.check(&payable.payment_data()) {
            return Err(abort(
                &mut uow,
                Stage::Validate,
                &id,
                PaymentErrorKind::Validation(failure),
            ));
        }

        let mut tx = TransactionAggregate::open(id.clone());
        tx.add_line_item(
            payable.bill_id(),
            payable.customer_id(),
            payable.description(),
            payable.amount(),
        )
        .map_err(|e| abort(&mut uow, Stage::Record, &id, e))?;

        let staged = uow.repository::<TransactionAggregate>().add(&tx).await;
        staged.map_err(|e| abort(&mut uow, Stage::Record, &id, e))?;
        if let Err(e) = uow.commit().await {
            return Err(PaymentError::new(Stage::Commit, id, uow.state(), e));
        }

        info!(transaction_id = %id, "transaction opened");
        Ok(id)
    }

    /// Abandons an open transaction.
    #[instrument(skip(self))]
    pub async fn void_transaction(
        &self,
        id: &TransactionId,
        reason: &str,
    ) -> Result<TransactionAggregate, PaymentError> {
        let mut uow = self.store.begin();

        let loaded = uow.repository::<TransactionAggregate>().get(id).await;
        let mut tx = loaded.map_err(|e| abort(&mut uow, Stage::Load, id, e))?;
        tx.void(reason)
            .map_err(|e| abort(&mut uow, Stage::Record, id, e))?;
        let staged = uow.repository::<TransactionAggregate>().add(&tx).await;
        staged.map_err(|e| abort(&mut uow, Stage::Record, id, e))?;
        if let Err(e) = uow.commit().await {
            return Err(PaymentError::new(Stage::Commit, id.clone(), uow.state(), e));
        }

        info!("transaction voided");
        Ok(tx)
    }

    /// Committed state of a transaction.
    pub async fn transaction(&self, id: &TransactionId) -> Result<TransactionAggregate, RepoError> {
        self.store.get::<TransactionAggregate>(id).await
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────────

    async fn replay(
        &self,
        mut uow: UnitOfWork,
        tx: TransactionAggregate,
    ) -> Result<PaymentReceipt, PaymentError> {
        let Some(settlement) = tx.settlement().cloned() else {
            let missing = DomainError::ValidationError(format!(
                "committed transaction {} has no settlement",
                tx.id()
            ));
            return Err(abort(&mut uow, Stage::Load, tx.id(), missing));
        };
        if let Err(e) = uow.commit().await {
            return Err(PaymentError::new(Stage::Commit, tx.id().clone(), uow.state(), e));
        }
        self.reconciliation.resolve(tx.id());

        info!("payment already committed, replaying settlement");
        Ok(PaymentReceipt::from_transaction(
            &tx,
            &settlement,
            uow.state(),
            true,
        ))
    }

    async fn settled_elsewhere(&self, id: &TransactionId) -> bool {
        matches!(
            self.store.get::<TransactionAggregate>(id).await,
            Ok(tx) if tx.status() == TransactionStatus::Committed
        )
    }

    async fn notify(&self, recipient: &str, receipt: &PaymentReceipt) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let message = match serde_json::to_string(receipt) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "could not encode payment notification");
                return;
            }
        };
        if let Err(e) = notifier.send(recipient, &message).await {
            warn!(error = %e, recipient, "payment notification failed");
        }
    }
}

/// Validation rule reported when a transaction id is reused for another payable.
pub const KEY_REUSE_RULE: &str = "idempotency_key_reuse";

/// A stored transaction may only be retried with the bill and amount it
/// already holds.
fn ensure_same_payable(
    tx: &TransactionAggregate,
    payable: &dyn Payable,
) -> Result<(), ValidationFailure> {
    for entry in tx.entries() {
        let (bill_id, amount) = match &entry.kind {
            EntryKind::LineItem { bill_id, amount, .. } => (bill_id.as_str(), *amount),
            EntryKind::Settlement(settlement) => {
                (settlement.bill_id.as_str(), settlement.base_amount)
            }
        };
        if bill_id != payable.bill_id() || amount != payable.amount() {
            return Err(ValidationFailure::new(
                KEY_REUSE_RULE,
                format!(
                    "transaction {} holds bill {bill_id} for {amount}, not bill {} for {}",
                    tx.id(),
                    payable.bill_id(),
                    payable.amount()
                ),
            ));
        }
    }
    Ok(())
}

/// Rolls the unit of work back and wraps the cause with its context.
fn abort(
    uow: &mut UnitOfWork,
    stage: Stage,
    id: &TransactionId,
    kind: impl Into<PaymentErrorKind>,
) -> PaymentError {
    uow.rollback();
    let err = PaymentError::new(stage, id.clone(), uow.state(), kind);
    warn!(stage = %stage, error = %err.kind, "payment rolled back");
    err
}
