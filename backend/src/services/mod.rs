//! Business logic services for the stock ledger

pub mod document;
pub mod lot;
pub mod pricing;
pub mod product;
pub mod stock;

pub use document::DocumentService;
pub use lot::LotService;
pub use product::ProductService;
