//! WebAssembly module for the stock ledger
//!
//! Provides client-side computation for:
//! - Derived price previews while editing a product
//! - Display numbers and accepted statuses per document kind
//! - Line validation and stock delta previews before submitting a document

use rust_decimal::Decimal;
use serde::Serialize;
use shared::stock::build_delta_map;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

#[derive(Serialize)]
struct DeltaEntry {
    product_id: ProductId,
    variant_id: Option<VariantId>,
    delta: Decimal,
}

fn to_js_error(message: String) -> JsValue {
    JsValue::from_str(&message)
}

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, String> {
    raw.trim()
        .parse::<Decimal>()
        .map_err(|e| format!("Invalid {}: {}", field, e))
}

fn price_preview(
    purchase_price: &str,
    cost: &str,
    wholesale: &str,
    retail: &str,
) -> Result<String, String> {
    let base = parse_decimal("purchase_price", purchase_price)?;
    let margins = MarginPercentages {
        cost: parse_decimal("cost_percentage", cost)?,
        wholesale: parse_decimal("wholesale_percentage", wholesale)?,
        retail: parse_decimal("retail_percentage", retail)?,
    };
    let prices = DerivedPrices::project(base, &margins).map_err(|e| e.to_string())?;
    serde_json::to_string(&prices).map_err(|e| e.to_string())
}

fn checked_lines(lines_json: &str) -> Result<Vec<DocumentLine>, String> {
    let inputs: Vec<LineInput> =
        serde_json::from_str(lines_json).map_err(|e| format!("Invalid lines JSON: {}", e))?;
    validate_lines(&inputs).map_err(|e| e.to_string())
}

fn stock_preview(kind: &str, lines_json: &str) -> Result<String, String> {
    let kind = parse_kind(kind).map_err(|e| e.to_string())?;
    let lines = checked_lines(lines_json)?;
    let entries: Vec<DeltaEntry> = match kind.stock_sign() {
        Some(sign) => build_delta_map(&lines, sign)
            .map_err(|e| e.to_string())?
            .iter()
            .map(|(key, delta)| DeltaEntry {
                product_id: key.product_id,
                variant_id: key.variant_id,
                delta: *delta,
            })
            .collect(),
        None => Vec::new(),
    };
    serde_json::to_string(&entries).map_err(|e| e.to_string())
}

fn accepted_labels(kind: &str) -> Result<Vec<&'static str>, String> {
    let kind = parse_kind(kind).map_err(|e| e.to_string())?;
    Ok(kind
        .accepted_statuses()
        .iter()
        .map(|status| status.label())
        .collect())
}

/// Derived cost, wholesale and retail prices as JSON. Amounts are decimal strings.
#[wasm_bindgen]
pub fn preview_prices(
    purchase_price: &str,
    cost_percentage: &str,
    wholesale_percentage: &str,
    retail_percentage: &str,
) -> Result<String, JsValue> {
    price_preview(
        purchase_price,
        cost_percentage,
        wholesale_percentage,
        retail_percentage,
    )
    .map_err(to_js_error)
}

/// Display number for a document, e.g. `SOR07`
#[wasm_bindgen]
pub fn document_display_number(kind: &str, id: i64) -> Result<String, JsValue> {
    let kind = parse_kind(kind).map_err(|e| to_js_error(e.to_string()))?;
    Ok(display_number(kind, id))
}

/// Status labels a document kind accepts
#[wasm_bindgen]
pub fn document_status_labels(kind: &str) -> Result<js_sys::Array, JsValue> {
    let labels = accepted_labels(kind).map_err(to_js_error)?;
    Ok(labels.into_iter().map(JsValue::from_str).collect())
}

/// Validate submitted lines; the error names the first offending line and field
#[wasm_bindgen]
pub fn validate_document_lines(lines_json: &str) -> Result<usize, JsValue> {
    checked_lines(lines_json)
        .map(|lines| lines.len())
        .map_err(|message| {
            web_sys::console::warn_1(&JsValue::from_str(&message));
            to_js_error(message)
        })
}

/// Stock movement the lines would cause once the document is active
#[wasm_bindgen]
pub fn preview_stock_delta(kind: &str, lines_json: &str) -> Result<String, JsValue> {
    stock_preview(kind, lines_json).map_err(to_js_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_preview() {
        let json = price_preview("8", "20", "50", "100").unwrap();
        let prices: DerivedPrices = serde_json::from_str(&json).unwrap();
        assert_eq!(prices.cost_price, Decimal::new(96, 1));
        assert_eq!(prices.wholesale_price, Decimal::from(12));
        assert_eq!(prices.retail_price, Decimal::from(16));
    }

    #[test]
    fn test_price_preview_rejects_garbage() {
        assert!(price_preview("eight", "20", "50", "100").is_err());
    }

    #[test]
    fn test_price_preview_reports_overflow() {
        let max = Decimal::MAX.to_string();
        let err = price_preview(&max, "20", "50", "100").unwrap_err();
        assert_eq!(err, "amount out of range");
    }

    #[test]
    fn test_display_number() {
        assert_eq!(document_display_number("sale_slip_a", 7).unwrap(), "SOR07");
        assert_eq!(
            document_display_number("credit_note_supplier", 12).unwrap(),
            "AVF12"
        );
    }

    #[test]
    fn test_accepted_labels() {
        let labels = accepted_labels("credit_note_client").unwrap();
        assert!(labels.contains(&"Appliqué"));
        assert!(!labels.contains(&"Livré"));
        assert!(accepted_labels("invoice").is_err());
    }

    #[test]
    fn test_stock_preview_for_sale() {
        let lines = r#"[
            {"product_id": 7, "quantity": "3", "unit_price": "10", "total": "30"},
            {"product_id": 7, "quantity": "2", "unit_price": "10", "total": "20"}
        ]"#;
        let json = stock_preview("sale_slip_a", lines).unwrap();
        let entries: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(entries.as_array().unwrap().len(), 1);
        assert_eq!(entries[0]["product_id"], 7);
        assert_eq!(entries[0]["delta"], "-5");
    }

    #[test]
    fn test_stock_preview_reports_overflow() {
        let lines = format!(
            r#"[
            {{"product_id": 7, "quantity": "{max}", "unit_price": "1", "total": "1"}},
            {{"product_id": 7, "quantity": "1", "unit_price": "1", "total": "1"}}
        ]"#,
            max = Decimal::MAX
        );
        let err = stock_preview("credit_note_client", &lines).unwrap_err();
        assert_eq!(err, "amount out of range");
    }

    #[test]
    fn test_stock_preview_for_purchase_order_is_empty() {
        let lines = r#"[{"product_id": 7, "quantity": "3", "unit_price": "8", "total": "24"}]"#;
        assert_eq!(stock_preview("purchase_order", lines).unwrap(), "[]");
    }

    #[test]
    fn test_incomplete_line_rejected() {
        let lines = r#"[{"product_id": 7, "quantity": "3"}]"#;
        let err = checked_lines(lines).unwrap_err();
        assert!(err.contains("unit_price"));
    }
}
