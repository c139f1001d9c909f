//! Entities, value objects and the ports the application layer talks through.

pub mod account;
pub mod changeset;
pub mod house;
pub mod money;
pub mod order;
pub mod ports;
pub mod topup;
pub mod transaction;
pub mod wallet;
