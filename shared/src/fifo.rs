//! FIFO ordering and read-only cost estimation over purchase lots

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::Lot;
use crate::types::{LotId, PRICE_SCALE};

/// Order lots oldest first, ties broken by id
pub fn sort_fifo(lots: &mut [Lot]) {
    lots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

/// Whether `lots` already respect the FIFO contract
pub fn is_fifo_ordered(lots: &[Lot]) -> bool {
    lots.windows(2)
        .all(|pair| (pair[0].created_at, pair[0].id) <= (pair[1].created_at, pair[1].id))
}

/// Remaining quantity across every lot, corrections included
pub fn sum_remaining(lots: &[Lot]) -> Decimal {
    lots.iter().map(|lot| lot.remaining_quantity).sum()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotDraw {
    pub lot_id: LotId,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub cost: Decimal,
}

/// Cost of goods for a quantity if it were drawn from lots oldest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FifoCost {
    pub requested: Decimal,
    pub draws: Vec<LotDraw>,
    pub total_cost: Decimal,
    /// Zero when nothing could be drawn
    pub average_cost: Decimal,
    /// Quantity the lots could not cover
    pub shortfall: Decimal,
}

/// Walk `lots` in FIFO order drawing up to `quantity`.
///
/// Lots with nothing left are ignored. Lots are not modified.
pub fn fifo_cost(lots: &[Lot], quantity: Decimal) -> FifoCost {
    let mut ordered: Vec<&Lot> = lots.iter().collect();
    ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    let mut outstanding = quantity.max(Decimal::ZERO);
    let mut draws = Vec::new();

    for lot in ordered {
        if outstanding.is_zero() {
            break;
        }
        if lot.remaining_quantity <= Decimal::ZERO {
            continue;
        }
        let taken = outstanding.min(lot.remaining_quantity);
        outstanding -= taken;
        draws.push(LotDraw {
            lot_id: lot.id,
            quantity: taken,
            unit_cost: lot.purchase_price,
            cost: taken * lot.purchase_price,
        });
    }

    let drawn: Decimal = draws.iter().map(|d| d.quantity).sum();
    let total_cost: Decimal = draws.iter().map(|d| d.cost).sum();
    let average_cost = if drawn.is_zero() {
        Decimal::ZERO
    } else {
        (total_cost / drawn).round_dp(PRICE_SCALE)
    };

    FifoCost {
        requested: quantity,
        draws,
        total_cost: total_cost.round_dp(PRICE_SCALE),
        average_cost,
        shortfall: outstanding,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DerivedPrices, MarginPercentages};
    use chrono::{TimeZone, Utc};
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn lot(id: LotId, day: u32, remaining: &str, price: &str) -> Lot {
        Lot {
            id,
            product_id: 7,
            variant_id: None,
            remaining_quantity: dec(remaining),
            purchase_price: dec(price),
            margins: MarginPercentages::default(),
            prices: DerivedPrices::default(),
            purchase_order_id: Some(1),
            created_at: Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_sort_breaks_ties_by_id() {
        let mut lots = vec![lot(5, 2, "1", "1"), lot(3, 2, "1", "1"), lot(9, 1, "1", "1")];
        sort_fifo(&mut lots);
        let ids: Vec<_> = lots.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![9, 3, 5]);
        assert!(is_fifo_ordered(&lots));
    }

    #[test]
    fn test_fifo_cost_draws_oldest_first() {
        let lots = vec![lot(2, 5, "10", "8"), lot(1, 1, "4", "6")];
        let cost = fifo_cost(&lots, dec("6"));

        assert_eq!(cost.draws.len(), 2);
        assert_eq!(cost.draws[0].lot_id, 1);
        assert_eq!(cost.draws[0].quantity, dec("4"));
        assert_eq!(cost.draws[1].quantity, dec("2"));
        assert_eq!(cost.total_cost, dec("40"));
        assert_eq!(cost.average_cost, dec("6.67"));
        assert!(cost.shortfall.is_zero());
    }

    #[test]
    fn test_fifo_cost_skips_depleted_and_reports_shortfall() {
        let lots = vec![lot(1, 1, "0", "5"), lot(2, 2, "-3", "5"), lot(3, 3, "2", "7")];
        let cost = fifo_cost(&lots, dec("5"));

        assert_eq!(cost.draws.len(), 1);
        assert_eq!(cost.total_cost, dec("14"));
        assert_eq!(cost.shortfall, dec("3"));
    }

    #[test]
    fn test_sum_remaining_includes_corrections() {
        let lots = vec![lot(1, 1, "4", "6"), lot(2, 2, "-1", "6")];
        assert_eq!(sum_remaining(&lots), dec("3"));
    }

    #[test]
    fn test_empty_lots_cost_nothing() {
        let cost = fifo_cost(&[], dec("2"));
        assert!(cost.draws.is_empty());
        assert_eq!(cost.average_cost, Decimal::ZERO);
        assert_eq!(cost.shortfall, dec("2"));
    }
}
