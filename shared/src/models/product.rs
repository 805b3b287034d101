//! Product pricing and stock counters

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AmountOverflow, ProductId, VariantId, PRICE_SCALE};

/// Margin percentages, the source of truth for derived prices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MarginPercentages {
    pub cost: Decimal,
    pub wholesale: Decimal,
    pub retail: Decimal,
}

/// Absolute prices projected from a base purchase price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DerivedPrices {
    pub cost_price: Decimal,
    pub wholesale_price: Decimal,
    pub retail_price: Decimal,
}

impl DerivedPrices {
    pub fn project(base: Decimal, margins: &MarginPercentages) -> Result<Self, AmountOverflow> {
        Ok(Self {
            cost_price: derive_price(base, margins.cost)?,
            wholesale_price: derive_price(base, margins.wholesale)?,
            retail_price: derive_price(base, margins.retail)?,
        })
    }
}

/// `base * (1 + percentage / 100)`, rounded to the money scale
pub fn derive_price(base: Decimal, percentage: Decimal) -> Result<Decimal, AmountOverflow> {
    let factor = percentage
        .checked_div(Decimal::ONE_HUNDRED)
        .and_then(|ratio| ratio.checked_add(Decimal::ONE))
        .ok_or(AmountOverflow)?;
    base.checked_mul(factor)
        .map(|price| price.round_dp(PRICE_SCALE))
        .ok_or(AmountOverflow)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub designation: String,
    pub purchase_price: Decimal,
    pub margins: MarginPercentages,
    pub prices: DerivedPrices,
    /// Total owned quantity. May go negative (oversold).
    pub quantity: Decimal,
    /// Sub-allocation of `quantity` exposed to the online channel
    pub shared_channel_quantity: Decimal,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether the stored absolute prices match their projection
    pub fn prices_reconciled(&self) -> bool {
        DerivedPrices::project(self.purchase_price, &self.margins)
            .map_or(false, |projected| projected == self.prices)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub name: String,
    pub stock_quantity: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a product. Derived prices are always computed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProduct {
    pub designation: String,
    #[serde(default)]
    pub purchase_price: Decimal,
    #[serde(default)]
    pub margins: MarginPercentages,
    #[serde(default)]
    pub quantity: Decimal,
    #[serde(default)]
    pub shared_channel_quantity: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewVariant {
    pub name: String,
    #[serde(default)]
    pub stock_quantity: Decimal,
}

/// Columns a product pricing patch may write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductColumn {
    Designation,
    PurchasePrice,
    CostPercentage,
    CostPrice,
    WholesalePercentage,
    WholesalePrice,
    RetailPercentage,
    RetailPrice,
}

impl ProductColumn {
    pub fn column_name(&self) -> &'static str {
        match self {
            ProductColumn::Designation => "designation",
            ProductColumn::PurchasePrice => "purchase_price",
            ProductColumn::CostPercentage => "cost_percentage",
            ProductColumn::CostPrice => "cost_price",
            ProductColumn::WholesalePercentage => "wholesale_percentage",
            ProductColumn::WholesalePrice => "wholesale_price",
            ProductColumn::RetailPercentage => "retail_percentage",
            ProductColumn::RetailPrice => "retail_price",
        }
    }
}

/// Value bound to one patched column
#[derive(Debug, Clone, PartialEq)]
pub enum PatchValue {
    Text(String),
    Amount(Decimal),
}

/// Administrative product edit. Counters are not patchable; absolute prices
/// are reconciled from the base price and percentages whenever either changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductPatch {
    pub designation: Option<String>,
    pub purchase_price: Option<Decimal>,
    pub cost_percentage: Option<Decimal>,
    pub wholesale_percentage: Option<Decimal>,
    pub retail_percentage: Option<Decimal>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        self.designation.is_none() && !self.touches_prices()
    }

    pub fn touches_prices(&self) -> bool {
        self.purchase_price.is_some()
            || self.cost_percentage.is_some()
            || self.wholesale_percentage.is_some()
            || self.retail_percentage.is_some()
    }

    /// Resolve the patch against the current row into the exact column writes
    pub fn resolve(
        &self,
        current: &Product,
    ) -> Result<Vec<(ProductColumn, PatchValue)>, AmountOverflow> {
        let mut writes = Vec::new();

        if let Some(designation) = &self.designation {
            writes.push((
                ProductColumn::Designation,
                PatchValue::Text(designation.trim().to_string()),
            ));
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
            (ProductColumn::PurchasePrice, PatchValue::Amount(base)),
            (ProductColumn::CostPercentage, PatchValue::Amount(margins.cost)),
            (ProductColumn::CostPrice, PatchValue::Amount(prices.cost_price)),
            (ProductColumn::WholesalePercentage, PatchValue::Amount(margins.wholesale)),
            (ProductColumn::WholesalePrice, PatchValue::Amount(prices.wholesale_price)),
            (ProductColumn::RetailPercentage, PatchValue::Amount(margins.retail)),
            (ProductColumn::RetailPrice, PatchValue::Amount(prices.retail_price)),
        ]);
        Ok(writes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn product(purchase_price: &str) -> Product {
        let margins = MarginPercentages {
            cost: dec("20"),
            wholesale: dec("50"),
            retail: dec("100"),
        };
        let base = dec(purchase_price);
        Product {
            id: 7,
            designation: "Vis 6mm".to_string(),
            purchase_price: base,
            margins,
            prices: DerivedPrices::project(base, &margins).unwrap(),
            quantity: Decimal::ZERO,
            shared_channel_quantity: Decimal::ZERO,
            updated_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_derive_price() {
        assert_eq!(derive_price(dec("8"), dec("20")).unwrap(), dec("9.6"));
        assert_eq!(derive_price(dec("8"), dec("50")).unwrap(), dec("12"));
        assert_eq!(derive_price(dec("8"), dec("100")).unwrap(), dec("16"));
        assert_eq!(derive_price(dec("6"), dec("0")).unwrap(), dec("6"));
    }

    #[test]
    fn test_derive_price_rounds_to_cents() {
        assert_eq!(derive_price(dec("3.33"), dec("12.5")).unwrap(), dec("3.75"));
    }

    #[test]
    fn test_patch_without_prices_leaves_prices_alone() {
        let patch = ProductPatch {
            designation: Some("  Vis 8mm ".to_string()),
            ..Default::default()
        };
        let writes = patch.resolve(&product("6")).unwrap();
        assert_eq!(
            writes,
            vec![(ProductColumn::Designation, PatchValue::Text("Vis 8mm".to_string()))]
        );
    }

    #[test]
    fn test_patch_percentage_reconciles_derived_price() {
        let patch = ProductPatch {
            retail_percentage: Some(dec("50")),
            ..Default::default()
        };
        let writes = patch.resolve(&product("6")).unwrap();
        assert!(writes.contains(&(ProductColumn::RetailPrice, PatchValue::Amount(dec("9")))));
        assert!(writes.contains(&(ProductColumn::CostPrice, PatchValue::Amount(dec("7.2")))));
        assert!(writes.contains(&(ProductColumn::PurchasePrice, PatchValue::Amount(dec("6")))));
    }

    #[test]
    fn test_fixture_is_reconciled() {
        assert!(product("6").prices_reconciled());
    }

    #[test]
    fn test_derive_price_overflow_is_an_error() {
        assert_eq!(derive_price(Decimal::MAX, dec("100")), Err(AmountOverflow));
        assert_eq!(derive_price(dec("8"), Decimal::MAX), Err(AmountOverflow));
    }

    #[test]
    fn test_patch_with_overflowing_price_is_rejected() {
        let patch = ProductPatch {
            purchase_price: Some(Decimal::MAX),
            ..Default::default()
        };
        assert_eq!(patch.resolve(&product("6")), Err(AmountOverflow));
    }
}
