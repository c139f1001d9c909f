//! Wallet ledger and escrow-style order settlement for a house marketplace.
//!
//! Balances only change through credit, debit and two-party transfer, each of
//! which appends its ledger entries in the same atomic commit, so a wallet's
//! balance always equals the sum of its entries.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
