//! Purchase lots: one record per purchase-order line, consumed oldest first

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::product::{DerivedPrices, MarginPercentages, PatchValue};
use crate::types::{AmountOverflow, DocumentId, LotId, ProductId, StockKey, VariantId};

/// A purchase batch and the price basis in force when it was recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub id: LotId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    /// May be zero or negative only after an administrative correction
    pub remaining_quantity: Decimal,
    pub purchase_price: Decimal,
    pub margins: MarginPercentages,
    pub prices: DerivedPrices,
    /// Cleared if the originating purchase order is deleted
    pub purchase_order_id: Option<DocumentId>,
    pub created_at: DateTime<Utc>,
}

impl Lot {
    pub fn stock_key(&self) -> StockKey {
        StockKey::new(self.product_id, self.variant_id)
    }
}

/// Values captured for a new lot at purchase-order creation time
#[derive(Debug, Clone, PartialEq)]
pub struct LotSnapshot {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: Decimal,
    pub purchase_price: Decimal,
    pub margins: MarginPercentages,
    pub prices: DerivedPrices,
    pub purchase_order_id: DocumentId,
}

impl LotSnapshot {
    /// Capture a lot from a purchase line priced at `unit_price`, using the
    /// product's margin percentages as they stand right now.
    ///
    /// Cost, wholesale and retail prices are projected from the line's unit
    /// price with those margins. The product's stored derived prices are not
    /// read: on creation they may still reflect an older purchase price.
    pub fn capture(
        purchase_order_id: DocumentId,
        key: StockKey,
        quantity: Decimal,
        unit_price: Decimal,
        margins: MarginPercentages,
    ) -> Result<Self, AmountOverflow> {
        Ok(Self {
            product_id: key.product_id,
            variant_id: key.variant_id,
            quantity,
            purchase_price: unit_price,
            margins,
            prices: DerivedPrices::project(unit_price, &margins)?,
            purchase_order_id,
        })
    }
}

/// Columns an administrative lot correction may write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LotColumn {
    RemainingQuantity,
    PurchasePrice,
    CostPercentage,
    CostPrice,
    WholesalePercentage,
    WholesalePrice,
    RetailPercentage,
    RetailPrice,
}

impl LotColumn {
    pub fn column_name(&self) -> &'static str {
        match self {
            LotColumn::RemainingQuantity => "remaining_quantity",
            LotColumn::PurchasePrice => "purchase_price",
            LotColumn::CostPercentage => "cost_percentage",
            LotColumn::CostPrice => "cost_price",
            LotColumn::WholesalePercentage => "wholesale_percentage",
            LotColumn::WholesalePrice => "wholesale_price",
            LotColumn::RetailPercentage => "retail_percentage",
            LotColumn::RetailPrice => "retail_price",
        }
    }
}

/// Administrative correction of a lot. No effect outside the lot row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LotPatch {
    pub remaining_quantity: Option<Decimal>,
    pub purchase_price: Option<Decimal>,
    pub cost_percentage: Option<Decimal>,
    pub wholesale_percentage: Option<Decimal>,
    pub retail_percentage: Option<Decimal>,
}

impl LotPatch {
    pub fn is_empty(&self) -> bool {
        self.remaining_quantity.is_none() && !self.touches_prices()
    }

    pub fn touches_prices(&self) -> bool {
        self.purchase_price.is_some()
            || self.cost_percentage.is_some()
            || self.wholesale_percentage.is_some()
            || self.retail_percentage.is_some()
    }

    pub fn resolve(&self, current: &Lot) -> Result<Vec<(LotColumn, PatchValue)>, AmountOverflow> {
        let mut writes = Vec::new();

        if let Some(quantity) = self.remaining_quantity {
            writes.push((LotColumn::RemainingQuantity, PatchValue::Amount(quantity)));
        }

        if !self.touches_prices() {
            return Ok(writes);
        }

        let base = self.purchase_price.unwrap_or(current.purchase_price);
        let margins = MarginPercentages {
            cost: self.cost_percentage.unwrap_or(current.margins.cost),
            wholesale: self.wholesale_percentage.unwrap_or(current.margins.wholesale),
            retail: self.retail_percentage.unwrap_or(current.margins.retail),
        };
        let prices = DerivedPrices::project(base, &margins)?;

        writes.extend([
            (LotColumn::PurchasePrice, PatchValue::Amount(base)),
            (LotColumn::CostPercentage, PatchValue::Amount(margins.cost)),
            (LotColumn::CostPrice, PatchValue::Amount(prices.cost_price)),
            (LotColumn::WholesalePercentage, PatchValue::Amount(margins.wholesale)),
            (LotColumn::WholesalePrice, PatchValue::Amount(prices.wholesale_price)),
            (LotColumn::RetailPercentage, PatchValue::Amount(margins.retail)),
            (LotColumn::RetailPrice, PatchValue::Amount(prices.retail_price)),
        ]);
        Ok(writes)
    }
}
