//! Common types used across the ledger

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ProductId = i64;
pub type VariantId = i64;
pub type DocumentId = i64;
pub type LineId = i64;
pub type LotId = i64;

/// Scale used for every stored money amount (purchase, cost, wholesale, retail prices)
pub const PRICE_SCALE: u32 = 2;

/// A sum or product left the range `Decimal` can represent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("amount out of range")]
pub struct AmountOverflow;

/// Identifies one countable stock line: a product's base counter, or one of its variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
}

impl StockKey {
    pub fn new(product_id: ProductId, variant_id: Option<VariantId>) -> Self {
        Self {
            product_id,
            variant_id,
        }
    }

    pub fn base(product_id: ProductId) -> Self {
        Self::new(product_id, None)
    }
}

impl std::fmt::Display for StockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.variant_id {
            Some(variant_id) => write!(f, "product {} / variant {}", self.product_id, variant_id),
            None => write!(f, "product {}", self.product_id),
        }
    }
}

/// Direction a document moves stock while it is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockSign {
    Increase,
    Decrease,
}

impl StockSign {
    /// +1 or -1
    pub fn factor(&self) -> i64 {
        match self {
            StockSign::Increase => 1,
            StockSign::Decrease => -1,
        }
    }

    pub fn inverted(&self) -> Self {
        match self {
            StockSign::Increase => StockSign::Decrease,
            StockSign::Decrease => StockSign::Increase,
        }
    }
}

/// Which physical counters a stock key resolves to when a delta is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterTarget {
    /// Base keys hit `products.quantity`, variant keys hit the variant counter
    Owned,
    /// Base keys hit `products.shared_channel_quantity` only, variant keys hit the
    /// variant counter
    SharedChannel,
}

impl CounterTarget {
    /// Column of `products` a base key moves
    pub fn base_counter(&self) -> &'static str {
        match self {
            CounterTarget::Owned => "quantity",
            CounterTarget::SharedChannel => "shared_channel_quantity",
        }
    }
}
