//! Purchase price cascade
//!
//! Validating a purchase order pushes each line's unit price onto its product
//! and re-projects cost, wholesale and retail prices from the stored margins.
//! Reverting restores the remembered price only if nobody overwrote it since.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{DerivedPrices, DocumentLine, MarginPercentages};
use crate::types::{AmountOverflow, ProductId};

/// Pricing state of one product as the cascade sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPricing {
    pub purchase_price: Decimal,
    pub margins: MarginPercentages,
}

impl ProductPricing {
    pub fn derived(&self) -> Result<DerivedPrices, AmountOverflow> {
        DerivedPrices::project(self.purchase_price, &self.margins)
    }
}

/// Current pricing of every product touched by a document
pub type PricingBook = BTreeMap<ProductId, ProductPricing>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum CascadeStep {
    /// Overwrite the product price and remember the previous one on the line
    Apply {
        line: usize,
        product_id: ProductId,
        old_price: Decimal,
        new_price: Decimal,
        prices: DerivedPrices,
    },
    /// Put the remembered price back and clear the line flag
    Restore {
        line: usize,
        product_id: ProductId,
        restored_price: Decimal,
        prices: DerivedPrices,
    },
    /// The product price moved since this line applied it; only clear the flag
    Skip {
        line: usize,
        product_id: ProductId,
        current_price: Decimal,
        expected_price: Decimal,
    },
}

impl CascadeStep {
    pub fn line(&self) -> usize {
        match self {
            CascadeStep::Apply { line, .. }
            | CascadeStep::Restore { line, .. }
            | CascadeStep::Skip { line, .. } => *line,
        }
    }

    pub fn product_id(&self) -> ProductId {
        match self {
            CascadeStep::Apply { product_id, .. }
            | CascadeStep::Restore { product_id, .. }
            | CascadeStep::Skip { product_id, .. } => *product_id,
        }
    }

    /// New purchase price written to the product, if any
    pub fn written_price(&self) -> Option<Decimal> {
        match self {
            CascadeStep::Apply { new_price, .. } => Some(*new_price),
            CascadeStep::Restore { restored_price, .. } => Some(*restored_price),
            CascadeStep::Skip { .. } => None,
        }
    }

    /// Mirror the step onto in-memory products and lines
    pub fn commit(&self, book: &mut PricingBook, lines: &mut [DocumentLine]) {
        if let (Some(price), Some(pricing)) =
            (self.written_price(), book.get_mut(&self.product_id()))
        {
            pricing.purchase_price = price;
        }

        if let Some(line) = lines.get_mut(self.line()) {
            match self {
                CascadeStep::Apply { old_price, .. } => {
                    line.old_purchase_price = Some(*old_price);
                    line.price_applied = true;
                }
                CascadeStep::Restore { .. } | CascadeStep::Skip { .. } => {
                    line.price_applied = false;
                }
            }
        }
    }
}

/// Steps for a purchase order entering its validated state.
///
/// Lines are taken in order; several lines for one product chain their
/// remembered prices so a later revert unwinds them in reverse.
pub fn plan_apply(
    lines: &[DocumentLine],
    book: &PricingBook,
) -> Result<Vec<CascadeStep>, AmountOverflow> {
    let mut working = book.clone();
    let mut steps = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        if line.price_applied {
            continue;
        }
        let Some(pricing) = working.get_mut(&line.product_id) else {
            continue;
        };
        if pricing.purchase_price == line.unit_price {
            continue;
        }

        let old_price = pricing.purchase_price;
        pricing.purchase_price = line.unit_price;
        steps.push(CascadeStep::Apply {
            line: index,
            product_id: line.product_id,
            old_price,
            new_price: line.unit_price,
            prices: pricing.derived()?,
        });
    }

    Ok(steps)
}

/// Steps for a purchase order leaving its validated state.
///
/// Every applied line loses its flag; the price is restored only while the
/// product still carries the price this line wrote.
pub fn plan_revert(
    lines: &[DocumentLine],
    book: &PricingBook,
) -> Result<Vec<CascadeStep>, AmountOverflow> {
    let mut working = book.clone();
    let mut steps = Vec::new();

    for (index, line) in lines.iter().enumerate().rev() {
        if !line.price_applied {
            continue;
        }
        let Some(pricing) = working.get_mut(&line.product_id) else {
            continue;
        };

        match line.old_purchase_price {
            Some(old_price) if pricing.purchase_price == line.unit_price => {
                pricing.purchase_price = old_price;
                steps.push(CascadeStep::Restore {
                    line: index,
                    product_id: line.product_id,
                    restored_price: old_price,
                    prices: pricing.derived()?,
                });
            }
            _ => steps.push(CascadeStep::Skip {
                line: index,
                product_id: line.product_id,
                current_price: pricing.purchase_price,
                expected_price: line.unit_price,
            }),
        }
    }

    Ok(steps)
}

/// Keep the cascade bookkeeping of lines re-inserted with the same product
/// and unit price, matched by position
pub fn carry_bookkeeping(old: &[DocumentLine], new: &mut [DocumentLine]) {
    for (old, new) in old.iter().zip(new.iter_mut()) {
        if old.product_id == new.product_id && old.unit_price == new.unit_price {
            new.old_purchase_price = old.old_purchase_price;
            new.price_applied = old.price_applied;
        }
    }
}
