//! Document status lifecycle
//!
//! Decides, for a create, edit, status change or delete, which net stock delta
//! must be written and whether the purchase price cascade runs or is reverted.
//! Every stock decision reduces to `merge(effect(before).negated(), effect(after))`
//! where a document's effect is empty whenever it is not in force.

use serde::Serialize;

use crate::models::{DocumentKind, DocumentLine, DocumentStatus};
use crate::stock::{build_delta_map, merge_delta_maps, DeltaMap};
use crate::types::AmountOverflow;

/// A document as the lifecycle sees it
#[derive(Debug, Clone, Copy)]
pub struct DocumentState<'a> {
    pub kind: DocumentKind,
    pub status: DocumentStatus,
    /// Financial reporting only; stock and prices ignore it
    pub excluded_from_aggregation: bool,
    pub lines: &'a [DocumentLine],
}

impl<'a> DocumentState<'a> {
    /// Whether the document currently contributes its stock effect.
    /// Exclusion from financial aggregation has no bearing on stock.
    pub fn stock_in_force(&self) -> bool {
        self.kind.stock_sign().is_some() && self.status.is_active()
    }

    /// Whether the purchase price cascade is currently applied for this document
    pub fn cascade_in_force(&self) -> bool {
        self.kind.drives_price_cascade() && holds_cascade(self.status)
    }

    /// Stock delta the document contributes while in its current state
    pub fn stock_effect(&self) -> Result<DeltaMap, AmountOverflow> {
        match self.kind.stock_sign() {
            Some(sign) if self.stock_in_force() => build_delta_map(self.lines, sign),
            _ => Ok(DeltaMap::new()),
        }
    }
}

/// Statuses in which a purchase order's prices are in force
pub fn holds_cascade(status: DocumentStatus) -> bool {
    matches!(
        status,
        DocumentStatus::Validated | DocumentStatus::Delivered | DocumentStatus::Invoiced
    )
}

/// What happens to the stock contribution of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StockTransition {
    /// Nothing to write
    Unchanged,
    /// The effect starts applying (creation, leaving Cancelled)
    Apply,
    /// The effect is withdrawn (entering Cancelled, deletion)
    Reverse,
    /// Old lines reversed and new lines applied as one write
    Replace,
}

/// What happens to purchase prices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceAction {
    None,
    Apply,
    Revert,
    /// Revert for the previous lines, then apply for the new lines
    Reapply,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    pub stock: StockTransition,
    pub delta: DeltaMap,
    pub price: PriceAction,
}

impl TransitionPlan {
    pub fn is_inert(&self) -> bool {
        self.delta.is_empty() && self.price == PriceAction::None
    }
}

/// Outcome of planning a status change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    /// Old and new status are equal: nothing is written
    NoOp,
    Transition(TransitionPlan),
}

fn net_delta(
    before: Option<&DocumentState<'_>>,
    after: Option<&DocumentState<'_>>,
) -> Result<DeltaMap, AmountOverflow> {
    let reversed = match before {
        Some(state) => state.stock_effect()?.negated(),
        None => DeltaMap::new(),
    };
    let applied = match after {
        Some(state) => state.stock_effect()?,
        None => DeltaMap::new(),
    };
    merge_delta_maps([&reversed, &applied])
}

fn classify(was_in_force: bool, is_in_force: bool, lines_changed: bool) -> StockTransition {
    match (was_in_force, is_in_force) {
        (false, true) => StockTransition::Apply,
        (true, false) => StockTransition::Reverse,
        (true, true) if lines_changed => StockTransition::Replace,
        _ => StockTransition::Unchanged,
    }
}

/// Lines compared on what they order, ignoring row ids and cascade bookkeeping
fn same_terms(a: &[DocumentLine], b: &[DocumentLine]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x.stock_key() == y.stock_key()
                && x.unit_id == y.unit_id
                && x.lot_id == y.lot_id
                && x.quantity == y.quantity
                && x.unit_price == y.unit_price
                && x.discount_percentage == y.discount_percentage
                && x.discount_amount == y.discount_amount
                && x.total == y.total
        })
}

/// A freshly created document applies its effect unless created cancelled
pub fn plan_creation(state: &DocumentState<'_>) -> Result<TransitionPlan, AmountOverflow> {
    let price = if state.cascade_in_force() {
        PriceAction::Apply
    } else {
        PriceAction::None
    };

    Ok(TransitionPlan {
        stock: classify(false, state.stock_in_force(), false),
        delta: net_delta(None, Some(state))?,
        price,
    })
}

/// Status-only change on an existing document
pub fn plan_status_change(
    before: &DocumentState<'_>,
    new_status: DocumentStatus,
) -> Result<StatusChange, AmountOverflow> {
    if before.status == new_status {
        return Ok(StatusChange::NoOp);
    }

    let after = DocumentState {
        status: new_status,
        ..*before
    };

    let price = match (before.cascade_in_force(), after.cascade_in_force()) {
        (false, true) => PriceAction::Apply,
        (true, false) => PriceAction::Revert,
        _ => PriceAction::None,
    };

    Ok(StatusChange::Transition(TransitionPlan {
        stock: classify(before.stock_in_force(), after.stock_in_force(), false),
        delta: net_delta(Some(before), Some(&after))?,
        price,
    }))
}

/// Line and header edit; the status is carried over from `before`
pub fn plan_edit(
    before: &DocumentState<'_>,
    after: &DocumentState<'_>,
) -> Result<TransitionPlan, AmountOverflow> {
    let lines_changed = !same_terms(before.lines, after.lines);

    let price = if before.cascade_in_force() && lines_changed {
        PriceAction::Reapply
    } else {
        PriceAction::None
    };

    Ok(TransitionPlan {
        stock: classify(before.stock_in_force(), after.stock_in_force(), lines_changed),
        delta: net_delta(Some(before), Some(after))?,
        price,
    })
}

/// Deletion withdraws whatever the document currently contributes
pub fn plan_deletion(before: &DocumentState<'_>) -> Result<TransitionPlan, AmountOverflow> {
    let price = if before.cascade_in_force() {
        PriceAction::Revert
    } else {
        PriceAction::None
    };

    Ok(TransitionPlan {
        stock: classify(before.stock_in_force(), false, false),
        delta: net_delta(Some(before), None)?,
        price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StockKey;
    use rust_decimal::Decimal;

    fn line(product_id: i64, quantity: i64) -> DocumentLine {
        DocumentLine {
            id: None,
            product_id,
            variant_id: None,
            unit_id: None,
            lot_id: None,
            quantity: Decimal::from(quantity),
            unit_price: Decimal::from(10),
            discount_percentage: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            total: Decimal::from(10 * quantity),
            old_purchase_price: None,
            price_applied: false,
        }
    }

    fn state(kind: DocumentKind, status: DocumentStatus, lines: &[DocumentLine]) -> DocumentState<'_> {
        DocumentState {
            kind,
            status,
            excluded_from_aggregation: false,
            lines,
        }
    }

    #[test]
    fn test_same_status_is_noop() {
        let lines = vec![line(7, 3)];
        let before = state(DocumentKind::SaleSlipA, DocumentStatus::Pending, &lines);
        assert_eq!(plan_status_change(&before, DocumentStatus::Pending).unwrap(), StatusChange::NoOp);
    }

    #[test]
    fn test_entering_cancelled_reverses() {
        let lines = vec![line(7, 3)];
        let before = state(DocumentKind::SaleSlipA, DocumentStatus::Validated, &lines);
        let StatusChange::Transition(plan) = plan_status_change(&before, DocumentStatus::Cancelled).unwrap()
        else {
            panic!("expected a transition");
        };
        assert_eq!(plan.stock, StockTransition::Reverse);
        assert_eq!(plan.delta.get(&StockKey::base(7)), Decimal::from(3));
        assert_eq!(plan.price, PriceAction::None);
    }

    #[test]
    fn test_between_active_statuses_moves_nothing() {
        let lines = vec![line(7, 3)];
        let before = state(DocumentKind::CreditNoteClient, DocumentStatus::Pending, &lines);
        let StatusChange::Transition(plan) = plan_status_change(&before, DocumentStatus::Applied).unwrap()
        else {
            panic!("expected a transition");
        };
        assert_eq!(plan.stock, StockTransition::Unchanged);
        assert!(plan.is_inert());
    }

    #[test]
    fn test_purchase_order_moves_no_stock() {
        let lines = vec![line(7, 3)];
        let created = state(DocumentKind::PurchaseOrder, DocumentStatus::Validated, &lines);
        let plan = plan_creation(&created).unwrap();
        assert!(plan.delta.is_empty());
        assert_eq!(plan.price, PriceAction::Apply);
    }

    #[test]
    fn test_cascade_survives_delivery() {
        let lines = vec![line(7, 3)];
        let before = state(DocumentKind::PurchaseOrder, DocumentStatus::Validated, &lines);
        let StatusChange::Transition(plan) = plan_status_change(&before, DocumentStatus::Delivered).unwrap()
        else {
            panic!("expected a transition");
        };
        assert_eq!(plan.price, PriceAction::None);

        let StatusChange::Transition(plan) = plan_status_change(&before, DocumentStatus::Pending).unwrap()
        else {
            panic!("expected a transition");
        };
        assert_eq!(plan.price, PriceAction::Revert);
    }

    #[test]
    fn test_excluded_document_still_moves_stock() {
        let lines = vec![line(7, 3)];
        let mut created = state(DocumentKind::SaleSlipB, DocumentStatus::Pending, &lines);
        created.excluded_from_aggregation = true;
        let plan = plan_creation(&created).unwrap();
        assert_eq!(plan.stock, StockTransition::Apply);
        assert_eq!(plan.delta.get(&StockKey::base(7)), Decimal::from(-3));
    }

    #[test]
    fn test_created_cancelled_applies_nothing() {
        let lines = vec![line(7, 3)];
        let created = state(DocumentKind::SaleSlipA, DocumentStatus::Cancelled, &lines);
        let plan = plan_creation(&created).unwrap();
        assert_eq!(plan.stock, StockTransition::Unchanged);
        assert!(plan.delta.is_empty());
    }

    #[test]
    fn test_overflowing_lines_fail_planning() {
        let mut lines = vec![line(7, 1), line(7, 1)];
        lines[0].quantity = Decimal::MAX;
        let created = state(DocumentKind::CreditNoteClient, DocumentStatus::Pending, &lines);
        assert_eq!(plan_creation(&created), Err(AmountOverflow));
    }
}
