//! Wallet participant: debits funds for wallet payments, credits refunds.

pub mod error;
pub mod service;

pub use error::{Result, WalletError};
pub use service::{RefundReceipt, RefundRequest, WalletService};
