//! HTTP handlers

mod documents;
mod health;
mod lots;
mod products;

pub use documents::*;
pub use health::*;
pub use lots::*;
pub use products::*;
