//! Stock delta computation
//!
//! Turns line items into signed per-key quantity changes and merges them so a
//! reversal and a re-application become a single net write per stock key.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::DocumentLine;
use crate::types::{AmountOverflow, StockKey, StockSign};

/// Mapping from stock key to signed quantity change.
///
/// Keys are kept ordered so writes always hit rows in the same order.
/// Zero entries are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaMap(BTreeMap<StockKey, Decimal>);

impl DeltaMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` to `key`, dropping the entry if it nets to zero.
    /// The map is left untouched on overflow.
    pub fn add(&mut self, key: StockKey, delta: Decimal) -> Result<(), AmountOverflow> {
        if delta.is_zero() {
            return Ok(());
        }
        let sum = self.get(&key).checked_add(delta).ok_or(AmountOverflow)?;
        if sum.is_zero() {
            self.0.remove(&key);
        } else {
            self.0.insert(key, sum);
        }
        Ok(())
    }

    pub fn get(&self, key: &StockKey) -> Decimal {
        self.0.get(key).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn merge(&mut self, other: &DeltaMap) -> Result<(), AmountOverflow> {
        for (key, delta) in other.iter() {
            self.add(*key, *delta)?;
        }
        Ok(())
    }

    pub fn negated(&self) -> DeltaMap {
        DeltaMap(self.0.iter().map(|(key, delta)| (*key, -*delta)).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StockKey, &Decimal)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &StockKey> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Accumulate `sign * quantity` per stock key.
///
/// Lines without a usable product id are skipped; callers validate first.
pub fn build_delta_map(
    lines: &[DocumentLine],
    sign: StockSign,
) -> Result<DeltaMap, AmountOverflow> {
    let factor = Decimal::from(sign.factor());
    let mut map = DeltaMap::new();
    for line in lines.iter().filter(|line| line.product_id > 0) {
        let delta = line.quantity.checked_mul(factor).ok_or(AmountOverflow)?;
        map.add(line.stock_key(), delta)?;
    }
    Ok(map)
}

/// Sum any number of delta maps key by key
pub fn merge_delta_maps<'a, I>(maps: I) -> Result<DeltaMap, AmountOverflow>
where
    I: IntoIterator<Item = &'a DeltaMap>,
{
    let mut merged = DeltaMap::new();
    for map in maps {
        merged.merge(map)?;
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn line(product_id: i64, variant_id: Option<i64>, quantity: &str) -> DocumentLine {
        DocumentLine {
            id: None,
            product_id,
            variant_id,
            unit_id: None,
            lot_id: None,
            quantity: dec(quantity),
            unit_price: dec("10"),
            discount_percentage: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            total: dec("10") * dec(quantity),
            old_purchase_price: None,
            price_applied: false,
        }
    }

    #[test]
    fn test_build_accumulates_per_key() {
        let lines = vec![
            line(7, None, "3"),
            line(7, None, "2"),
            line(7, Some(1), "4"),
            line(9, None, "1.5"),
        ];
        let map = build_delta_map(&lines, StockSign::Decrease).unwrap();

        assert_eq!(map.len(), 3);
        assert_eq!(map.get(&StockKey::base(7)), dec("-5"));
        assert_eq!(map.get(&StockKey::new(7, Some(1))), dec("-4"));
        assert_eq!(map.get(&StockKey::base(9)), dec("-1.5"));
    }

    #[test]
    fn test_build_skips_invalid_product_and_zero_quantity() {
        let lines = vec![line(0, None, "3"), line(7, None, "0")];
        assert!(build_delta_map(&lines, StockSign::Increase).unwrap().is_empty());
    }

    #[test]
    fn test_merge_cancels_identical_reverse_and_apply() {
        let lines = vec![line(7, None, "3"), line(8, Some(2), "1")];
        let reverse = build_delta_map(&lines, StockSign::Increase).unwrap();
        let apply = build_delta_map(&lines, StockSign::Decrease).unwrap();
        assert!(merge_delta_maps([&reverse, &apply]).unwrap().is_empty());
    }

    #[test]
    fn test_merge_nets_shared_keys() {
        let old = build_delta_map(&[line(7, None, "3")], StockSign::Increase).unwrap();
        let new = build_delta_map(&[line(7, None, "5"), line(8, None, "1")], StockSign::Decrease).unwrap();
        let net = merge_delta_maps([&old, &new]).unwrap();

        assert_eq!(net.get(&StockKey::base(7)), dec("-2"));
        assert_eq!(net.get(&StockKey::base(8)), dec("-1"));
    }

    #[test]
    fn test_overflowing_sum_is_rejected() {
        let lines = vec![line(7, None, "1"), line(7, None, "1")];
        let mut huge = lines.clone();
        huge[0].quantity = Decimal::MAX;
        assert_eq!(build_delta_map(&huge, StockSign::Increase), Err(AmountOverflow));

        let mut map = build_delta_map(&lines, StockSign::Increase).unwrap();
        assert_eq!(map.add(StockKey::base(7), Decimal::MAX), Err(AmountOverflow));
        assert_eq!(map.get(&StockKey::base(7)), dec("2"));
    }

    #[test]
    fn test_negated() {
        let map = build_delta_map(&[line(7, None, "3")], StockSign::Decrease).unwrap();
        assert_eq!(map.negated().get(&StockKey::base(7)), dec("3"));
    }
}
