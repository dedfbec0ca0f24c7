//! Payment calculators.
//!
//! A calculator maps a base amount to the final chargeable amount. Every
//! calculator here is deterministic and monotonic: a larger base never yields
//! a smaller charge. Composition preserves both properties.

use crate::domain::Money;
use crate::error::DomainError;

/// Maps a base amount to the amount actually charged.
pub trait PaymentCalculator: Send + Sync {
    /// Negative amounts can not reach this point (`Money` rejects them on
    /// construction); overflow and currency mismatches surface as errors.
    fn calculate(&self, base_amount: Money) -> Result<Money, DomainError>;
}

/// Charges exactly the base amount.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFee;

impl PaymentCalculator for NoFee {
    fn calculate(&self, base_amount: Money) -> Result<Money, DomainError> {
        Ok(base_amount)
    }
}

/// Adds a fixed admin fee.
#[derive(Debug, Clone, Copy)]
pub struct FlatFee(pub Money);

impl PaymentCalculator for FlatFee {
    fn calculate(&self, base_amount: Money) -> Result<Money, DomainError> {
        base_amount.checked_add(self.0)
    }
}

/// Adds a percentage surcharge in basis points, rounded up to the next minor unit.
#[derive(Debug, Clone, Copy)]
pub struct PercentageFee {
    pub basis_points: u32,
}

impl PercentageFee {
    pub fn new(basis_points: u32) -> Self {
        Self { basis_points }
    }
}

impl PaymentCalculator for PercentageFee {
    fn calculate(&self, base_amount: Money) -> Result<Money, DomainError> {
        let fee = base_amount.basis_points_ceil(self.basis_points)?;
        base_amount.checked_add(fee)
    }
}

/// Subtracts a fixed discount, never going below zero.
#[derive(Debug, Clone, Copy)]
pub struct FlatDiscount(pub Money);

impl PaymentCalculator for FlatDiscount {
    fn calculate(&self, base_amount: Money) -> Result<Money, DomainError> {
        base_amount.saturating_sub(self.0)
    }
}

/// Applies calculators left to right, feeding each output into the next.
#[derive(Default)]
pub struct CalculatorChain {
    steps: Vec<Box<dyn PaymentCalculator>>,
}

impl CalculatorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, calculator: impl PaymentCalculator + 'static) -> Self {
        self.steps.push(Box::new(calculator));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl std::fmt::Debug for CalculatorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalculatorChain")
            .field("steps", &self.steps.len())
            .finish()
    }
}

impl PaymentCalculator for CalculatorChain {
    fn calculate(&self, base_amount: Money) -> Result<Money, DomainError> {
        self.steps
            .iter()
            .try_fold(base_amount, |amount, step| step.calculate(amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Currency;
    use proptest::prelude::*;

    fn idr(amount: i64) -> Money {
        Money::new(amount, Currency::IDR).unwrap()
    }

    #[test]
    fn test_flat_fee() {
        let calc = FlatFee(idr(250));
        assert_eq!(calc.calculate(idr(10_000)).unwrap(), idr(10_250));
    }

    #[test]
    fn test_flat_fee_currency_mismatch() {
        let calc = FlatFee(Money::new(250, Currency::USD).unwrap());
        assert!(matches!(
            calc.calculate(idr(10_000)),
            Err(DomainError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn test_flat_fee_overflow_is_invalid_amount() {
        let calc = FlatFee(idr(1));
        assert!(matches!(
            calc.calculate(idr(i64::MAX)),
            Err(DomainError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_percentage_fee_rounds_up() {
        let calc = PercentageFee::new(150);
        // 1.5% of 333 = 4.995 -> 5
        assert_eq!(calc.calculate(idr(333)).unwrap(), idr(338));
    }

    #[test]
    fn test_discount_floors_at_zero() {
        let calc = FlatDiscount(idr(500));
        assert_eq!(calc.calculate(idr(300)).unwrap(), idr(0));
        assert_eq!(calc.calculate(idr(800)).unwrap(), idr(300));
    }

    #[test]
    fn test_chain_applies_in_order() {
        let calc = CalculatorChain::new()
            .then(FlatDiscount(idr(1_000)))
            .then(PercentageFee::new(100))
            .then(FlatFee(idr(250)));
        // (10000 - 1000) = 9000, +1% = 9090, +250 = 9340
        assert_eq!(calc.calculate(idr(10_000)).unwrap(), idr(9_340));
        assert_eq!(CalculatorChain::new().calculate(idr(7)).unwrap(), idr(7));
    }

    fn chain() -> CalculatorChain {
        CalculatorChain::new()
            .then(FlatDiscount(idr(1_500)))
            .then(PercentageFee::new(275))
            .then(FlatFee(idr(250)))
    }

    proptest! {
        #[test]
        fn calculators_are_monotonic(a in 0i64..1_000_000_000, b in 0i64..1_000_000_000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let calculators: Vec<Box<dyn PaymentCalculator>> = vec![
                Box::new(NoFee),
                Box::new(FlatFee(idr(250))),
                Box::new(PercentageFee::new(275)),
                Box::new(FlatDiscount(idr(1_500))),
                Box::new(chain()),
            ];
            for calc in &calculators {
                let low = calc.calculate(idr(lo)).unwrap();
                let high = calc.calculate(idr(hi)).unwrap();
                prop_assert!(low.amount() <= high.amount());
            }
        }

        #[test]
        fn calculators_are_deterministic(a in 0i64..1_000_000_000) {
            let calc = chain();
            prop_assert_eq!(calc.calculate(idr(a)).unwrap(), calc.calculate(idr(a)).unwrap());
        }
    }
}
