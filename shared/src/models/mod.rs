//! Domain models for the stock ledger

mod document;
mod lot;
mod product;

pub use document::*;
pub use lot::*;
pub use product::*;
