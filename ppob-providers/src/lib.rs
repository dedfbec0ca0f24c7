//! # PPOB Providers
//!
//! Adapters for the bill provider and notification ports.
//!
//! - `http` - bill provider reached over HTTP (PDAM, BPJS)
//! - `sandbox` - in-process provider with a wallet and fault injection
//! - `webhook` - signed webhook notifications

pub mod http;
pub mod product;
pub mod sandbox;
pub mod signing;
pub mod webhook;

pub use http::HttpBillProvider;
pub use product::BillProduct;
pub use sandbox::{Fault, SandboxBillProvider};
pub use signing::{sign_payload, verify_signature};
pub use webhook::WebhookNotifier;
