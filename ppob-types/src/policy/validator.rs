//! Payment validators.
//!
//! Validators are pure and side-effect free. A [`ValidatorChain`] accepts a
//! payment only if every rule accepts it, and reports the first rule that did
//! not.

use std::collections::BTreeSet;

use crate::domain::{Currency, Money, PaymentData};
use crate::error::ValidationFailure;

/// A single business rule over [`PaymentData`].
pub trait PaymentValidator: Send + Sync {
    /// Rule name reported on failure.
    fn name(&self) -> &str;

    /// Accepts the payment or explains why not.
    fn check(&self, data: &PaymentData) -> Result<(), ValidationFailure>;

    fn validate(&self, data: &PaymentData) -> bool {
        self.check(data).is_ok()
    }
}

/// Requires `amount > 0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositiveAmount;

impl PaymentValidator for PositiveAmount {
    fn name(&self) -> &str {
        "positive_amount"
    }

    fn check(&self, data: &PaymentData) -> Result<(), ValidationFailure> {
        if data.amount.is_zero() {
            return Err(ValidationFailure::new(self.name(), "amount must be positive"));
        }
        Ok(())
    }
}

/// Requires `min <= amount <= max` in the bounds' currency.
#[derive(Debug, Clone)]
pub struct AmountRange {
    min: Money,
    max: Money,
}

impl AmountRange {
    pub fn new(min: Money, max: Money) -> Self {
        Self { min, max }
    }
}

impl PaymentValidator for AmountRange {
    fn name(&self) -> &str {
        "amount_range"
    }

    fn check(&self, data: &PaymentData) -> Result<(), ValidationFailure> {
        let amount = data.amount;
        let mismatch = |e: crate::error::DomainError| ValidationFailure::new(self.name(), e.to_string());
        let above_min = amount.gte(&self.min).map_err(mismatch)?;
        let below_max = self.max.gte(&amount).map_err(mismatch)?;
        if !(above_min && below_max) {
            return Err(ValidationFailure::new(
                self.name(),
                format!("{} is outside {}..={}", amount, self.min, self.max),
            ));
        }
        Ok(())
    }
}

/// Requires payments in one currency.
#[derive(Debug, Clone, Copy)]
pub struct CurrencyIs(pub Currency);

impl PaymentValidator for CurrencyIs {
    fn name(&self) -> &str {
        "currency"
    }

    fn check(&self, data: &PaymentData) -> Result<(), ValidationFailure> {
        if data.amount.currency() != self.0 {
            return Err(ValidationFailure::new(
                self.name(),
                format!("expected {}, got {}", self.0, data.amount.currency()),
            ));
        }
        Ok(())
    }
}

/// Requires a non-blank field (see [`PaymentData::field`]).
#[derive(Debug, Clone)]
pub struct RequiredField {
    field: String,
    rule: String,
}

impl RequiredField {
    pub fn new(field: impl Into<String>) -> Self {
        let field = field.into();
        let rule = format!("required:{field}");
        Self { field, rule }
    }
}

impl PaymentValidator for RequiredField {
    fn name(&self) -> &str {
        &self.rule
    }

    fn check(&self, data: &PaymentData) -> Result<(), ValidationFailure> {
        match data.field(&self.field) {
            Some(value) if !value.trim().is_empty() => Ok(()),
            _ => Err(ValidationFailure::new(
                self.name(),
                format!("`{}` is required", self.field),
            )),
        }
    }
}

/// Restricts the payment method to a configured set (case-insensitive).
#[derive(Debug, Clone)]
pub struct AllowedMethods {
    methods: BTreeSet<String>,
}

impl AllowedMethods {
    pub fn new<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            methods: methods
                .into_iter()
                .map(|m| m.as_ref().trim().to_ascii_uppercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }
}

impl PaymentValidator for AllowedMethods {
    fn name(&self) -> &str {
        "allowed_methods"
    }

    fn check(&self, data: &PaymentData) -> Result<(), ValidationFailure> {
        let Some(method) = data.method.as_deref() else {
            return Err(ValidationFailure::new(self.name(), "payment method missing"));
        };
        if !self.methods.contains(&method.trim().to_ascii_uppercase()) {
            return Err(ValidationFailure::new(
                self.name(),
                format!("method {method} is not accepted"),
            ));
        }
        Ok(())
    }
}

/// Logical AND over a list of validators, evaluated in order.
#[derive(Default)]
pub struct ValidatorChain {
    validators: Vec<Box<dyn PaymentValidator>>,
}

impl ValidatorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, validator: impl PaymentValidator + 'static) -> Self {
        self.push(validator);
        self
    }

    pub fn push(&mut self, validator: impl PaymentValidator + 'static) {
        self.validators.push(Box::new(validator));
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.validators.iter().map(|v| v.name()).collect()
    }
}

impl std::fmt::Debug for ValidatorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorChain")
            .field("rules", &self.rule_names())
            .finish()
    }
}

impl PaymentValidator for ValidatorChain {
    fn name(&self) -> &str {
        "chain"
    }

    fn check(&self, data: &PaymentData) -> Result<(), ValidationFailure> {
        self.validators.iter().try_for_each(|v| v.check(data))
    }
}
