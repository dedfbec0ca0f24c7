//! Configuration loading from environment.

use std::env;

use ppob_repo::{RemovePolicy, Store, StoreConfig, build_store};
use ppob_types::policy::{
    AllowedMethods, AmountRange, CalculatorChain, CurrencyIs, FlatFee, PercentageFee,
    PositiveAmount, ValidatorChain,
};
use ppob_types::{Currency, Money};

use crate::telemetry::LogFormat;

/// Payment core configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub currency: Currency,
    pub flat_fee: Money,
    pub fee_basis_points: u32,
    pub min_amount: Option<Money>,
    pub max_amount: Option<Money>,
    pub allowed_methods: Vec<String>,
    pub strict_remove: bool,
    pub log_format: LogFormat,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
}

impl Config {
    /// Loads `.env` (if present) and reads `PPOB_*` variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let currency: Currency = var("PPOB_CURRENCY")
            .unwrap_or_else(|| "IDR".to_string())
            .parse()?;
        let money = |key: &str| -> anyhow::Result<Option<Money>> {
            var(key)
                .map(|v| Money::parse(&v, currency))
                .transpose()
                .map_err(|e| anyhow::anyhow!("{key}: {e}"))
        };

        let flat_fee = money("PPOB_FLAT_FEE")?.unwrap_or_else(|| Money::zero(currency));
        let fee_basis_points = var("PPOB_FEE_BASIS_POINTS")
            .map(|v| v.parse::<u32>())
            .transpose()?
            .unwrap_or(0);
        let min_amount = money("PPOB_MIN_AMOUNT")?;
        let max_amount = money("PPOB_MAX_AMOUNT")?;
        let allowed_methods = var("PPOB_ALLOWED_METHODS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        let strict_remove = var("PPOB_STRICT_REMOVE")
            .map(|v| v.parse::<bool>())
            .transpose()?
            .unwrap_or(false);
        let log_format = var("PPOB_LOG_FORMAT")
            .map(|v| v.parse::<LogFormat>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            database_url: var("PPOB_DATABASE_URL").unwrap_or_else(|| "memory://".to_string()),
            currency,
            flat_fee,
            fee_basis_points,
            min_amount,
            max_amount,
            allowed_methods,
            strict_remove,
            log_format,
            webhook_url: var("PPOB_WEBHOOK_URL"),
            webhook_secret: var("PPOB_WEBHOOK_SECRET"),
        })
    }

    /// Validators implied by the configuration, cheapest first.
    pub fn validators(&self) -> anyhow::Result<ValidatorChain> {
        let mut chain = ValidatorChain::new()
            .with(PositiveAmount)
            .with(CurrencyIs(self.currency));

        if self.min_amount.is_some() || self.max_amount.is_some() {
            let min = self.min_amount.unwrap_or_else(|| Money::zero(self.currency));
            let max = match self.max_amount {
                Some(max) => max,
                None => Money::new(i64::MAX, self.currency)?,
            };
            chain.push(AmountRange::new(min, max));
        }
        if !self.allowed_methods.is_empty() {
            chain.push(AllowedMethods::new(&self.allowed_methods));
        }
        Ok(chain)
    }

    /// Flat fee first, then the percentage surcharge.
    pub fn calculator(&self) -> CalculatorChain {
        let mut chain = CalculatorChain::new();
        if !self.flat_fee.is_zero() {
            chain = chain.then(FlatFee(self.flat_fee));
        }
        if self.fee_basis_points > 0 {
            chain = chain.then(PercentageFee::new(self.fee_basis_points));
        }
        chain
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            remove_policy: if self.strict_remove {
                RemovePolicy::Strict
            } else {
                RemovePolicy::Ignore
            },
        }
    }

    /// Connects the configured persistence backend.
    pub async fn build_store(&self) -> anyhow::Result<Store> {
        build_store(&self.database_url, self.store_config()).await
    }
}
