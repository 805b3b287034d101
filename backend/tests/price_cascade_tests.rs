//! Purchase price cascade tests
//!
//! Tests for price propagation including:
//! - Derived price projection from margins
//! - Apply and revert of a validated purchase order
//! - Revert guard when another order overwrote the price
//! - Line edits on a validated purchase order
//! - Reversibility across arbitrary purchase lines

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::lifecycle::{plan_edit, DocumentState, PriceAction};
use shared::pricing::{
    carry_bookkeeping, plan_apply, plan_revert, CascadeStep, PricingBook, ProductPricing,
};
use shared::{
    derive_price, DerivedPrices, DocumentKind, DocumentLine, DocumentStatus, MarginPercentages,
};
use std::str::FromStr;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn margins() -> MarginPercentages {
    MarginPercentages {
        cost: dec("20"),
        wholesale: dec("50"),
        retail: dec("100"),
    }
}

fn purchase_line(product_id: i64, unit_price: Decimal) -> DocumentLine {
    DocumentLine {
        id: None,
        product_id,
        variant_id: None,
        unit_id: None,
        lot_id: None,
        quantity: dec("10"),
        unit_price,
        discount_percentage: Decimal::ZERO,
        discount_amount: Decimal::ZERO,
        total: dec("10") * unit_price,
        old_purchase_price: None,
        price_applied: false,
    }
}

fn book_with(entries: &[(i64, &str)]) -> PricingBook {
    entries
        .iter()
        .map(|(id, price)| {
            (
                *id,
                ProductPricing {
                    purchase_price: dec(price),
                    margins: margins(),
                },
            )
        })
        .collect()
}

fn run(steps: Vec<CascadeStep>, book: &mut PricingBook, lines: &mut [DocumentLine]) {
    for step in steps {
        step.commit(book, lines);
    }
}

fn apply(book: &mut PricingBook, lines: &mut [DocumentLine]) {
    let steps = plan_apply(lines, book).unwrap();
    run(steps, book, lines);
}

fn revert(book: &mut PricingBook, lines: &mut [DocumentLine]) {
    let steps = plan_revert(lines, book).unwrap();
    run(steps, book, lines);
}

fn validated_order(lines: &[DocumentLine]) -> DocumentState<'_> {
    DocumentState {
        kind: DocumentKind::PurchaseOrder,
        status: DocumentStatus::Validated,
        excluded_from_aggregation: false,
        lines,
    }
}

/// Replace the lines of a validated order the way the document service does:
/// changed lines revert the old cascade and apply the new one, unchanged lines
/// inherit the old bookkeeping. Returns the lines as stored afterwards.
fn edit_lines(
    book: &mut PricingBook,
    old: &mut [DocumentLine],
    mut new: Vec<DocumentLine>,
) -> Vec<DocumentLine> {
    let plan = plan_edit(&validated_order(old), &validated_order(&new)).unwrap();
    if plan.price == PriceAction::Reapply {
        revert(book, old);
        apply(book, &mut new);
    } else {
        carry_bookkeeping(old, &mut new);
    }
    new
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_derive_price_rounds_to_cents() {
        assert_eq!(derive_price(dec("8"), dec("20")).unwrap(), dec("9.60"));
        assert_eq!(derive_price(dec("3.33"), dec("15")).unwrap(), dec("3.83"));
        assert_eq!(derive_price(dec("8"), Decimal::ZERO).unwrap(), dec("8"));
    }

    #[test]
    fn test_validate_then_cancel_purchase_order() {
        let mut book = book_with(&[(7, "6")]);
        let mut lines = vec![purchase_line(7, dec("8"))];

        let steps = plan_apply(&lines, &book).unwrap();
        match &steps[..] {
            [CascadeStep::Apply { prices, old_price, .. }] => {
                assert_eq!(*old_price, dec("6"));
                assert_eq!(prices.cost_price, dec("9.6"));
                assert_eq!(prices.wholesale_price, dec("12"));
                assert_eq!(prices.retail_price, dec("16"));
            }
            other => panic!("unexpected steps: {:?}", other),
        }
        run(steps, &mut book, &mut lines);
        assert_eq!(book[&7].purchase_price, dec("8"));

        let steps = plan_revert(&lines, &book).unwrap();
        match &steps[..] {
            [CascadeStep::Restore { prices, restored_price, .. }] => {
                assert_eq!(*restored_price, dec("6"));
                assert_eq!(prices.cost_price, dec("7.2"));
                assert_eq!(prices.wholesale_price, dec("9"));
                assert_eq!(prices.retail_price, dec("12"));
            }
            other => panic!("unexpected steps: {:?}", other),
        }
        run(steps, &mut book, &mut lines);
        assert_eq!(book[&7].purchase_price, dec("6"));
        assert!(!lines[0].price_applied);
    }

    #[test]
    fn test_second_validation_is_idempotent() {
        let mut book = book_with(&[(7, "6")]);
        let mut lines = vec![purchase_line(7, dec("8"))];
        apply(&mut book, &mut lines);
        assert!(plan_apply(&lines, &book).unwrap().is_empty());
    }

    #[test]
    fn test_revert_without_apply_does_nothing() {
        let book = book_with(&[(7, "6")]);
        let lines = vec![purchase_line(7, dec("8"))];
        assert!(plan_revert(&lines, &book).unwrap().is_empty());
    }

    #[test]
    fn test_two_orders_reverted_newest_first_restore_everything() {
        let mut book = book_with(&[(7, "6")]);
        let mut first = vec![purchase_line(7, dec("8"))];
        let mut second = vec![purchase_line(7, dec("9"))];

        apply(&mut book, &mut first);
        apply(&mut book, &mut second);
        assert_eq!(book[&7].purchase_price, dec("9"));

        revert(&mut book, &mut second);
        assert_eq!(book[&7].purchase_price, dec("8"));
        revert(&mut book, &mut first);
        assert_eq!(book[&7].purchase_price, dec("6"));
    }

    #[test]
    fn test_older_order_reverted_first_keeps_newer_price() {
        let mut book = book_with(&[(7, "6")]);
        let mut first = vec![purchase_line(7, dec("8"))];
        let mut second = vec![purchase_line(7, dec("9"))];

        apply(&mut book, &mut first);
        apply(&mut book, &mut second);

        let steps = plan_revert(&first, &book).unwrap();
        assert!(matches!(
            steps.as_slice(),
            [CascadeStep::Skip { current_price, expected_price, .. }]
                if *current_price == dec("9") && *expected_price == dec("8")
        ));
        run(steps, &mut book, &mut first);
        assert_eq!(book[&7].purchase_price, dec("9"));
        assert!(!first[0].price_applied);
    }

    #[test]
    fn test_unknown_product_is_ignored() {
        let book = book_with(&[(7, "6")]);
        let lines = vec![purchase_line(99, dec("8"))];
        assert!(plan_apply(&lines, &book).unwrap().is_empty());
    }

    #[test]
    fn test_edit_price_then_cancel_restores_original_price() {
        let mut book = book_with(&[(7, "6")]);
        let mut old = vec![purchase_line(7, dec("8"))];
        apply(&mut book, &mut old);
        assert_eq!(book[&7].purchase_price, dec("8"));

        let mut stored = edit_lines(&mut book, &mut old, vec![purchase_line(7, dec("10"))]);
        assert_eq!(book[&7].purchase_price, dec("10"));
        assert_eq!(stored[0].old_purchase_price, Some(dec("6")));
        assert!(stored[0].price_applied);
        assert!(!old[0].price_applied);

        revert(&mut book, &mut stored);
        assert_eq!(book[&7].purchase_price, dec("6"));
        assert_eq!(book[&7].derived().unwrap().retail_price, dec("12"));
    }

    #[test]
    fn test_unchanged_edit_then_cancel_restores_original_price() {
        let mut book = book_with(&[(7, "6")]);
        let mut old = vec![purchase_line(7, dec("8"))];
        apply(&mut book, &mut old);

        // Resubmitted lines arrive without bookkeeping
        let mut stored = edit_lines(&mut book, &mut old, vec![purchase_line(7, dec("8"))]);
        assert_eq!(book[&7].purchase_price, dec("8"));
        assert_eq!(stored[0].old_purchase_price, Some(dec("6")));
        assert!(stored[0].price_applied);

        revert(&mut book, &mut stored);
        assert_eq!(book[&7].purchase_price, dec("6"));
    }

    #[test]
    fn test_quantity_edit_then_cancel_restores_original_price() {
        let mut book = book_with(&[(7, "6")]);
        let mut old = vec![purchase_line(7, dec("8"))];
        apply(&mut book, &mut old);

        let mut resized = purchase_line(7, dec("8"));
        resized.quantity = dec("4");
        resized.total = dec("32");
        let mut stored = edit_lines(&mut book, &mut old, vec![resized]);
        assert_eq!(book[&7].purchase_price, dec("8"));
        assert_eq!(stored[0].old_purchase_price, Some(dec("6")));

        revert(&mut book, &mut stored);
        assert_eq!(book[&7].purchase_price, dec("6"));
    }

    #[test]
    fn test_derived_prices_follow_margins() {
        let prices = DerivedPrices::project(dec("10"), &margins()).unwrap();
        assert_eq!(prices.cost_price, dec("12"));
        assert_eq!(prices.wholesale_price, dec("15"));
        assert_eq!(prices.retail_price, dec("20"));
    }
}

// ============================================================================
// Property Tests
// ============================================================================

fn arb_price() -> impl Strategy<Value = Decimal> {
    (1i64..100_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn arb_book() -> impl Strategy<Value = PricingBook> {
    prop::collection::vec(arb_price(), 3).prop_map(|prices| {
        prices
            .into_iter()
            .enumerate()
            .map(|(i, purchase_price)| {
                (
                    i as i64 + 1,
                    ProductPricing {
                        purchase_price,
                        margins: margins(),
                    },
                )
            })
            .collect()
    })
}

fn arb_lines() -> impl Strategy<Value = Vec<DocumentLine>> {
    prop::collection::vec((1i64..4, arb_price()), 1..6).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(product_id, price)| purchase_line(product_id, price))
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Applying then reverting one order restores every product exactly
    #[test]
    fn prop_apply_then_revert_restores_book(book in arb_book(), lines in arb_lines()) {
        let original = book.clone();
        let mut book = book;
        let mut lines = lines;

        apply(&mut book, &mut lines);
        revert(&mut book, &mut lines);

        prop_assert_eq!(book, original);
        prop_assert!(lines.iter().all(|l| !l.price_applied));
    }

    /// After apply each product carries the last line's price for it
    #[test]
    fn prop_last_line_wins(book in arb_book(), lines in arb_lines()) {
        let mut book = book;
        let mut lines = lines;
        apply(&mut book, &mut lines);

        for line in &lines {
            let last = lines
                .iter()
                .rev()
                .find(|l| l.product_id == line.product_id)
                .map(|l| l.unit_price);
            prop_assert_eq!(Some(book[&line.product_id].purchase_price), last);
        }
    }

    /// Derived prices projected by a step always match the written price
    #[test]
    fn prop_steps_carry_consistent_prices(book in arb_book(), lines in arb_lines()) {
        for step in plan_apply(&lines, &book).unwrap() {
            if let CascadeStep::Apply { new_price, prices, .. } = step {
                prop_assert_eq!(prices, DerivedPrices::project(new_price, &margins()).unwrap());
            }
        }
    }

    /// Revert clears every flag even when a later order moved the price
    #[test]
    fn prop_revert_always_clears_flags(
        book in arb_book(),
        lines in arb_lines(),
        later in arb_lines(),
    ) {
        let mut book = book;
        let mut lines = lines;
        let mut later = later;
        apply(&mut book, &mut lines);
        apply(&mut book, &mut later);
        revert(&mut book, &mut lines);
        prop_assert!(lines.iter().all(|l| !l.price_applied));
    }
}
