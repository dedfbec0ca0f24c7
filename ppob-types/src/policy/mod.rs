//! Pure payment policies: validation rules and amount calculators.

pub mod calculator;
pub mod validator;

pub use calculator::{
    CalculatorChain, FlatDiscount, FlatFee, NoFee, PaymentCalculator, PercentageFee,
};
pub use validator::{
    AllowedMethods, AmountRange, CurrencyIs, PaymentValidator, PositiveAmount, RequiredField,
    ValidatorChain,
};
