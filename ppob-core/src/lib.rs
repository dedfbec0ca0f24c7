//! # PPOB Core
//!
//! Payment processing for the PPOB payment core.
//!
//! ## Architecture
//!
//! - `processor` - Payment processor (orchestrates one payment per unit of work)
//! - `reconciliation` - Ledger of settlements the provider applied but the
//!   local store lost
//! - `config` - Environment configuration
//! - `telemetry` - Tracing subscriber setup
//!
//! The processor is generic over `P: BillProvider`, allowing different
//! provider adapters to be injected.

pub mod config;
pub mod processor;
pub mod reconciliation;
pub mod telemetry;

#[cfg(test)]
mod processor_tests;

pub use config::Config;
pub use processor::{KEY_REUSE_RULE, PaymentProcessor, PaymentReceipt};
pub use reconciliation::{ReconciliationEntry, ReconciliationLog, SettlementGuard};
