//! PaymentProcessor unit tests.

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;

    use ppob_repo::{MemoryBackend, Store, StoreConfig};
    use ppob_types::policy::{FlatFee, PositiveAmount, RequiredField, ValidatorChain};
    use ppob_types::ports::{ChangeSet, Snapshot};
    use ppob_types::{
        BillDetails, BillPayment, BillProvider, Currency, Money, NotificationError,
        NotificationSender, PayRequest, PaymentErrorKind, PersistenceBackend, ProviderError,
        ProviderReceipt, RepoError, Stage, StoreKey, TransactionId, TransactionStatus,
        UnitOfWorkState,
    };

    use crate::{KEY_REUSE_RULE, PaymentProcessor};

    fn idr(amount: i64) -> Money {
        Money::new(amount, Currency::IDR).unwrap()
    }

    fn bill(amount: i64) -> BillPayment {
        BillPayment::new("PDAM-0001", "0123456789", idr(amount))
    }

    /// Provider that dedups by transaction id and fails on a script.
    pub struct MockProvider {
        failures: Mutex<VecDeque<ProviderError>>,
        receipts: Mutex<HashMap<TransactionId, ProviderReceipt>>,
        pay_calls: AtomicUsize,
        hang: AtomicBool,
    }

    impl MockProvider {
        pub fn new() -> Self {
            Self {
                failures: Mutex::new(VecDeque::new()),
                receipts: Mutex::new(HashMap::new()),
                pay_calls: AtomicUsize::new(0),
                hang: AtomicBool::new(false),
            }
        }

        pub fn failing_with(errors: impl IntoIterator<Item = ProviderError>) -> Self {
            let provider = Self::new();
            provider.failures.lock().unwrap().extend(errors);
            provider
        }

        pub fn hanging() -> Self {
            let provider = Self::new();
            provider.hang.store(true, Ordering::SeqCst);
            provider
        }

        pub fn pay_calls(&self) -> usize {
            self.pay_calls.load(Ordering::SeqCst)
        }

        /// Distinct payments applied.
        pub fn effects(&self) -> usize {
            self.receipts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl BillProvider for MockProvider {
        async fn inquiry(&self, customer_id: &str) -> Result<BillDetails, ProviderError> {
            Ok(BillDetails {
                bill_id: "PDAM-0001".to_string(),
                customer_id: customer_id.to_string(),
                customer_name: Some("Budi".to_string()),
                amount: idr(10_000),
                description: "Water, September".to_string(),
                due_date: None,
            })
        }

        async fn pay(&self, request: &PayRequest) -> Result<ProviderReceipt, ProviderError> {
            self.pay_calls.fetch_add(1, Ordering::SeqCst);
            if self.hang.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if let Some(err) = self.failures.lock().unwrap().pop_front() {
                return Err(err);
            }
            let mut receipts = self.receipts.lock().unwrap();
            let n = receipts.len() + 1;
            let receipt = receipts
                .entry(request.transaction_id.clone())
                .or_insert_with(|| ProviderReceipt {
                    transaction_id: request.transaction_id.clone(),
                    provider_reference: format!("REF-{n}"),
                    bill_id: request.bill_id.clone(),
                    amount: request.amount,
                    paid_at: Utc::now(),
                });
            Ok(receipt.clone())
        }

        fn validate_customer_id(&self, customer_id: &str) -> bool {
            customer_id.len() >= 10 && customer_id.bytes().all(|b| b.is_ascii_digit())
        }
    }

    /// Memory backend whose commits can be made to fail or hang.
    #[derive(Default)]
    pub struct FlakyBackend {
        inner: MemoryBackend,
        fail_apply: AtomicBool,
        hang_apply: AtomicBool,
    }

    #[async_trait]
    impl PersistenceBackend for FlakyBackend {
        async fn load(&self, key: &StoreKey) -> Result<Snapshot, RepoError> {
            self.inner.load(key).await
        }

        async fn apply(&self, changes: &ChangeSet) -> Result<(), RepoError> {
            if self.hang_apply.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.fail_apply.load(Ordering::SeqCst) {
                return Err(RepoError::Database("disk full".to_string()));
            }
            self.inner.apply(changes).await
        }
    }

    #[derive(Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationSender for RecordingNotifier {
        async fn send(&self, recipient: &str, message: &str) -> Result<(), NotificationError> {
            if self.fail {
                return Err(NotificationError::Delivery("smtp down".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), message.to_string()));
            Ok(())
        }

        async fn notify(&self, message: &str) -> Result<(), NotificationError> {
            self.send("*", message).await
        }
    }

    fn processor(provider: MockProvider) -> PaymentProcessor<MockProvider> {
        PaymentProcessor::new(provider, Store::in_memory())
            .with_validators(ValidatorChain::new().with(PositiveAmount))
            .with_calculator(FlatFee(idr(250)))
    }

    #[tokio::test]
    async fn test_process_payment_commits_one_settlement() {
        let processor = processor(MockProvider::new());

        let receipt = processor.process_payment(&bill(10_000)).await.unwrap();

        assert_eq!(receipt.charged_amount, idr(10_250));
        assert_eq!(receipt.base_amount, idr(10_000));
        assert_eq!(receipt.entry_count, 1);
        assert_eq!(receipt.unit_of_work, UnitOfWorkState::Committed);
        assert!(!receipt.replayed);

        let tx = processor.transaction(&receipt.transaction_id).await.unwrap();
        assert_eq!(tx.status(), TransactionStatus::Committed);
        assert_eq!(tx.entry_count(), 1);
        assert_eq!(tx.settlement().unwrap().provider_reference, "REF-1");
    }

    #[tokio::test]
    async fn test_insufficient_balance_rolls_back() {
        let processor = processor(MockProvider::failing_with([
            ProviderError::InsufficientBalance {
                available: 5_000,
                requested: 10_250,
            },
        ]));
        let id = TransactionId::from("tx-short");

        let err = processor
            .process_payment_with_id(id.clone(), &bill(10_000))
            .await
            .unwrap_err();

        assert_eq!(err.stage, Stage::Provider);
        assert_eq!(err.unit_of_work, Some(UnitOfWorkState::RolledBack));
        assert_eq!(err.transaction_id, Some(id.clone()));
        assert!(matches!(err.kind, PaymentErrorKind::InsufficientBalance(_)));
        assert!(!err.is_retryable());
        assert!(matches!(
            processor.transaction(&id).await,
            Err(RepoError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_insufficient_balance_keeps_open_transaction_unchanged() {
        let processor = processor(MockProvider::failing_with([
            ProviderError::InsufficientBalance {
                available: 0,
                requested: 10_250,
            },
        ]));
        let id = processor.open_transaction(&bill(10_000)).await.unwrap();
        let before = processor.transaction(&id).await.unwrap();

        let result = processor
            .process_payment_with_id(id.clone(), &bill(10_000))
            .await;
        assert!(result.is_err());

        let after = processor.transaction(&id).await.unwrap();
        assert_eq!(after, before);
        assert_eq!(after.entry_count(), 1);
        assert_eq!(after.status(), TransactionStatus::Open);
    }

    #[tokio::test]
    async fn test_open_transaction_gains_exactly_one_entity() {
        let processor = processor(MockProvider::new());
        let id = processor.open_transaction(&bill(10_000)).await.unwrap();

        let receipt = processor
            .process_payment_with_id(id.clone(), &bill(10_000))
            .await
            .unwrap();

        assert_eq!(receipt.entry_count, 2);
        let tx = processor.transaction(&id).await.unwrap();
        assert_eq!(tx.entry_count(), 2);
        assert_eq!(tx.status(), TransactionStatus::Committed);
    }

    #[tokio::test]
    async fn test_transient_failure_then_retry_charges_once() {
        let processor = processor(MockProvider::failing_with([ProviderError::Timeout(
            "gateway".to_string(),
        )]));
        let id = TransactionId::from("tx-retry");

        let err = processor
            .process_payment_with_id(id.clone(), &bill(10_000))
            .await
            .unwrap_err();
        assert!(matches!(err.kind, PaymentErrorKind::Transaction(_)));
        assert!(err.is_retryable());
        assert!(processor.transaction(&id).await.is_err());

        let receipt = processor
            .process_payment_with_id(id.clone(), &bill(10_000))
            .await
            .unwrap();
        assert_eq!(receipt.unit_of_work, UnitOfWorkState::Committed);
        assert_eq!(processor.provider().pay_calls(), 2);
        assert_eq!(processor.provider().effects(), 1);
    }

    #[tokio::test]
    async fn test_committed_transaction_replays_without_paying() {
        let processor = processor(MockProvider::new());
        let id = TransactionId::from("tx-once");

        let first = processor
            .process_payment_with_id(id.clone(), &bill(10_000))
            .await
            .unwrap();
        let second = processor
            .process_payment_with_id(id.clone(), &bill(10_000))
            .await
            .unwrap();

        assert!(second.replayed);
        assert_eq!(second.provider_reference, first.provider_reference);
        assert_eq!(second.charged_amount, first.charged_amount);
        assert_eq!(processor.provider().pay_calls(), 1);
        assert_eq!(processor.transaction(&id).await.unwrap().entry_count(), 1);
    }

    #[tokio::test]
    async fn test_validation_failure_names_rule_and_skips_provider() {
        let processor = processor(MockProvider::new())
            .with_validators(ValidatorChain::new().with(PositiveAmount).with(RequiredField::new("method")));

        let err = processor.process_payment(&bill(0)).await.unwrap_err();
        assert_eq!(err.stage, Stage::Validate);
        assert!(matches!(err.kind, PaymentErrorKind::Validation(ref f) if f.rule == "positive_amount"));

        let err = processor.process_payment(&bill(100)).await.unwrap_err();
        assert!(matches!(err.kind, PaymentErrorKind::Validation(ref f) if f.rule == "required:method"));

        assert_eq!(processor.provider().pay_calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_customer_id_is_a_validation_error() {
        let processor = processor(MockProvider::new());
        let payable = BillPayment::new("PDAM-0001", "12ab", idr(10_000));

        let err = processor.process_payment(&payable).await.unwrap_err();
        assert!(matches!(err.kind, PaymentErrorKind::Validation(ref f) if f.rule == "customer_id"));
        assert_eq!(processor.provider().pay_calls(), 0);

        assert!(matches!(
            processor.inquire("12ab").await,
            Err(ProviderError::InvalidCustomerId(_))
        ));
    }

    #[tokio::test]
    async fn test_pay_bill_inquires_then_pays() {
        let processor = processor(MockProvider::new());
        let details = processor.inquire("0123456789").await.unwrap();
        assert_eq!(details.amount, idr(10_000));

        let receipt = processor.pay_bill("0123456789").await.unwrap();
        assert_eq!(receipt.bill_id, "PDAM-0001");
        assert_eq!(receipt.charged_amount, idr(10_250));

        let err = processor.pay_bill("bad").await.unwrap_err();
        assert_eq!(err.stage, Stage::Inquiry);
        assert_eq!(err.transaction_id, None);
        assert_eq!(err.unit_of_work, None);
        assert_eq!(processor.provider().pay_calls(), 1);
    }

    #[tokio::test]
    async fn test_committed_id_reused_for_another_bill_is_rejected() {
        let processor = processor(MockProvider::new());
        let id = TransactionId::from("tx-reused");

        let first = processor
            .process_payment_with_id(id.clone(), &bill(10_000))
            .await
            .unwrap();

        let other = BillPayment::new("PDAM-0002", "0123456789", idr(75_000));
        let err = processor
            .process_payment_with_id(id.clone(), &other)
            .await
            .unwrap_err();
        assert_eq!(err.stage, Stage::Validate);
        assert!(matches!(err.kind, PaymentErrorKind::Validation(ref f) if f.rule == KEY_REUSE_RULE));
        assert!(!err.is_retryable());

        // Same bill, different amount is also a different payable
        let err = processor
            .process_payment_with_id(id.clone(), &bill(12_000))
            .await
            .unwrap_err();
        assert!(matches!(err.kind, PaymentErrorKind::Validation(ref f) if f.rule == KEY_REUSE_RULE));

        assert_eq!(processor.provider().pay_calls(), 1);
        let tx = processor.transaction(&id).await.unwrap();
        assert_eq!(tx.settlement().unwrap().provider_reference, first.provider_reference);
        assert_eq!(tx.settlement().unwrap().bill_id, "PDAM-0001");
    }

    #[tokio::test]
    async fn test_open_transaction_cannot_settle_another_bill() {
        let processor = processor(MockProvider::new());
        let id = processor.open_transaction(&bill(10_000)).await.unwrap();

        let other = BillPayment::new("PDAM-0002", "0123456789", idr(75_000));
        let err = processor
            .process_payment_with_id(id.clone(), &other)
            .await
            .unwrap_err();
        assert_eq!(err.stage, Stage::Validate);
        assert_eq!(err.unit_of_work, Some(UnitOfWorkState::RolledBack));
        assert!(matches!(err.kind, PaymentErrorKind::Validation(ref f) if f.rule == KEY_REUSE_RULE));
        assert_eq!(processor.provider().pay_calls(), 0);

        let tx = processor.transaction(&id).await.unwrap();
        assert_eq!(tx.status(), TransactionStatus::Open);
        assert_eq!(tx.entry_count(), 1);

        // The bill it was opened for still pays
        let receipt = processor
            .process_payment_with_id(id, &bill(10_000))
            .await
            .unwrap();
        assert_eq!(receipt.bill_id, "PDAM-0001");
    }

    #[tokio::test]
    async fn test_provider_receipt_for_another_bill_is_not_recorded() {
        let backend = Arc::new(FlakyBackend::default());
        backend.fail_apply.store(true, Ordering::SeqCst);
        let store = Store::new(backend.clone(), StoreConfig::default());
        let processor = PaymentProcessor::new(MockProvider::new(), store);
        let id = TransactionId::from("tx-unrecorded");

        // Paid at the provider, lost locally
        assert!(
            processor
                .process_payment_with_id(id.clone(), &bill(10_000))
                .await
                .is_err()
        );
        backend.fail_apply.store(false, Ordering::SeqCst);

        let other = BillPayment::new("PDAM-0002", "0123456789", idr(75_000));
        let err = processor
            .process_payment_with_id(id.clone(), &other)
            .await
            .unwrap_err();
        assert_eq!(err.stage, Stage::Provider);
        assert!(matches!(err.kind, PaymentErrorKind::Validation(ref f) if f.rule == KEY_REUSE_RULE));
        assert!(processor.transaction(&id).await.is_err());
        assert_eq!(processor.provider().effects(), 1);

        let entry = processor.reconciliation().get(&id).unwrap();
        assert_eq!(entry.provider_reference, "REF-1");
        assert!(entry.reason.contains("PDAM-0001"));
    }

    #[tokio::test]
    async fn test_voided_transaction_cannot_be_paid() {
        let processor = processor(MockProvider::new());
        let id = processor.open_transaction(&bill(10_000)).await.unwrap();

        let voided = processor.void_transaction(&id, "customer cancelled").await.unwrap();
        assert_eq!(voided.status(), TransactionStatus::Voided);

        let err = processor
            .process_payment_with_id(id.clone(), &bill(10_000))
            .await
            .unwrap_err();
        assert!(matches!(err.kind, PaymentErrorKind::TransactionClosed(_)));
        assert_eq!(processor.provider().pay_calls(), 0);

        let err = processor.void_transaction(&id, "again").await.unwrap_err();
        assert!(matches!(err.kind, PaymentErrorKind::TransactionClosed(_)));
    }

    #[tokio::test]
    async fn test_void_missing_transaction_is_not_found() {
        let processor = processor(MockProvider::new());
        let err = processor
            .void_transaction(&TransactionId::from("missing"), "n/a")
            .await
            .unwrap_err();
        assert_eq!(err.stage, Stage::Load);
        assert!(matches!(err.kind, PaymentErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_commit_failure_is_recorded_for_reconciliation() {
        let backend = Arc::new(FlakyBackend::default());
        backend.fail_apply.store(true, Ordering::SeqCst);
        let store = Store::new(backend.clone(), StoreConfig::default());
        let processor = PaymentProcessor::new(MockProvider::new(), store);
        let id = TransactionId::from("tx-lost");

        let err = processor
            .process_payment_with_id(id.clone(), &bill(10_000))
            .await
            .unwrap_err();
        assert_eq!(err.stage, Stage::Commit);
        assert_eq!(err.unit_of_work, Some(UnitOfWorkState::RolledBack));
        assert!(matches!(err.kind, PaymentErrorKind::Storage(_)));

        let entry = processor.reconciliation().get(&id).unwrap();
        assert_eq!(entry.provider_reference, "REF-1");
        assert!(entry.reason.contains("local commit failed"));

        // Storage recovers; the retry replays at the provider and reconciles.
        backend.fail_apply.store(false, Ordering::SeqCst);
        let receipt = processor
            .process_payment_with_id(id.clone(), &bill(10_000))
            .await
            .unwrap();
        assert_eq!(receipt.provider_reference, "REF-1");
        assert_eq!(processor.provider().effects(), 1);
        assert!(processor.reconciliation().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_before_provider_returns_leaves_nothing() {
        let processor = processor(MockProvider::hanging());
        let id = TransactionId::from("tx-cancel");

        let result = tokio::time::timeout(
            Duration::from_millis(20),
            processor.process_payment_with_id(id.clone(), &bill(10_000)),
        )
        .await;

        assert!(result.is_err());
        assert!(processor.transaction(&id).await.is_err());
        assert!(processor.reconciliation().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_after_provider_accepts_is_recorded() {
        let backend = Arc::new(FlakyBackend::default());
        backend.hang_apply.store(true, Ordering::SeqCst);
        let store = Store::new(backend.clone(), StoreConfig::default());
        let processor = PaymentProcessor::new(MockProvider::new(), store);
        let id = TransactionId::from("tx-midflight");

        let result = tokio::time::timeout(
            Duration::from_millis(20),
            processor.process_payment_with_id(id.clone(), &bill(10_000)),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(processor.provider().effects(), 1);
        let entry = processor.reconciliation().get(&id).unwrap();
        assert_eq!(entry.reason, "abandoned before local commit");
        assert!(processor.transaction(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_notification_sent_after_commit() {
        let notifier = Arc::new(RecordingNotifier::default());
        let processor = processor(MockProvider::new()).with_notifier(notifier.clone());

        let receipt = processor.process_payment(&bill(10_000)).await.unwrap();

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "0123456789");
        assert!(sent[0].1.contains(receipt.transaction_id.as_str()));
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_undo_payment() {
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let processor = processor(MockProvider::new()).with_notifier(notifier);

        let receipt = processor.process_payment(&bill(10_000)).await.unwrap();
        let tx = processor.transaction(&receipt.transaction_id).await.unwrap();
        assert_eq!(tx.status(), TransactionStatus::Committed);
    }

    #[tokio::test]
    async fn test_no_notification_on_failure() {
        let notifier = Arc::new(RecordingNotifier::default());
        let processor = processor(MockProvider::failing_with([ProviderError::Rejected(
            "bill already paid".to_string(),
        )]))
        .with_notifier(notifier.clone());

        assert!(processor.process_payment(&bill(10_000)).await.is_err());
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_payments_same_id_charge_once() {
        let processor = Arc::new(processor(MockProvider::new()));
        let id = TransactionId::from("tx-race");

        let mut handles = Vec::new();
        for _ in 0..4 {
            let processor = processor.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                processor.process_payment_with_id(id, &bill(10_000)).await
            }));
        }
        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(err) => assert!(err.is_retryable()),
            }
        }

        assert!(ok >= 1);
        assert_eq!(processor.provider().effects(), 1);
        let tx = processor.transaction(&id).await.unwrap();
        assert_eq!(tx.entry_count(), 1);
        assert!(processor.reconciliation().is_empty());
    }
}
