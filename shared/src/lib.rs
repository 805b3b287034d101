//! Shared types and domain logic for the stock ledger
//!
//! Everything in this crate is pure: the backend executes the plans computed
//! here inside its transactions, and the wasm crate exposes parts of it to the
//! browser client.

pub mod fifo;
pub mod lifecycle;
pub mod models;
pub mod pricing;
pub mod stock;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
