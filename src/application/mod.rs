//! Application layer: the ledger, the top-up and order workflows built on it,
//! and the engine facade that dispatches boundary commands to them.
//!
//! Every mutating operation follows the same shape: take the ordered locks it
//! needs from the shared [`locks::LockManager`], re-read state, validate, stage
//! a [`crate::domain::changeset::Changeset`] and commit it while still holding
//! the locks.

pub mod engine;
pub mod gate;
pub mod ledger;
pub mod locks;
pub mod orders;
pub mod topup;
