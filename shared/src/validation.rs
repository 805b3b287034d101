//! Input validation for documents
//!
//! Everything here runs before a transaction is opened; a rejected document
//! never reaches the store.

use chrono::{DateTime, NaiveDate};
use rust_decimal::Decimal;
use thiserror::Error;
use validator::Validate;

use crate::models::{DocumentKind, DocumentLine, DocumentStatus, LineInput};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("line {line}: {field} is required")]
    MissingLineField { line: usize, field: &'static str },

    #[error("line {line}: {field} is invalid")]
    InvalidLineField { line: usize, field: &'static str },

    #[error("status '{status}' is not valid for {kind}")]
    InvalidStatus { kind: DocumentKind, status: String },

    #[error("malformed date '{0}', expected YYYY-MM-DD")]
    MalformedDate(String),

    #[error("unknown document kind '{0}'")]
    UnknownKind(String),

    #[error("{field}: {message}")]
    InvalidValue { field: &'static str, message: String },
}

impl ValidationError {
    /// Name of the offending field, when there is one
    pub fn field(&self) -> Option<String> {
        match self {
            ValidationError::MissingLineField { line, field }
            | ValidationError::InvalidLineField { line, field } => {
                Some(format!("lines[{line}].{field}"))
            }
            ValidationError::InvalidStatus { .. } => Some("status".to_string()),
            ValidationError::MalformedDate(_) => Some("document_date".to_string()),
            ValidationError::UnknownKind(_) => Some("kind".to_string()),
            ValidationError::InvalidValue { field, .. } => Some(field.to_string()),
        }
    }
}

/// Required line fields, in the order they are reported
const LINE_FIELDS: [&str; 4] = ["product_id", "quantity", "unit_price", "total"];

/// Validate one submitted line and turn it into a storable one
pub fn validate_line(index: usize, input: &LineInput) -> Result<DocumentLine, ValidationError> {
    if let Err(errors) = input.validate() {
        let field_errors = errors.field_errors();
        for field in LINE_FIELDS {
            if let Some(found) = field_errors.get(field) {
                let missing = found.iter().any(|e| e.code == "required");
                return Err(if missing {
                    ValidationError::MissingLineField { line: index, field }
                } else {
                    ValidationError::InvalidLineField { line: index, field }
                });
            }
        }
    }

    let required = |value: Option<Decimal>, field| {
        value.ok_or(ValidationError::MissingLineField { line: index, field })
    };

    Ok(DocumentLine {
        id: None,
        product_id: input
            .product_id
            .ok_or(ValidationError::MissingLineField { line: index, field: "product_id" })?,
        variant_id: input.variant_id,
        unit_id: input.unit_id,
        lot_id: input.lot_id,
        quantity: required(input.quantity, "quantity")?,
        unit_price: required(input.unit_price, "unit_price")?,
        discount_percentage: input.discount_percentage.unwrap_or_default(),
        discount_amount: input.discount_amount.unwrap_or_default(),
        total: required(input.total, "total")?,
        old_purchase_price: None,
        price_applied: false,
    })
}

/// Validate every line; the first bad line rejects the whole set
pub fn validate_lines(inputs: &[LineInput]) -> Result<Vec<DocumentLine>, ValidationError> {
    inputs
        .iter()
        .enumerate()
        .map(|(index, input)| validate_line(index, input))
        .collect()
}

pub fn parse_kind(s: &str) -> Result<DocumentKind, ValidationError> {
    DocumentKind::from_str(s).ok_or_else(|| ValidationError::UnknownKind(s.to_string()))
}

/// Parse a status label and check the kind accepts it
pub fn parse_status(kind: DocumentKind, label: &str) -> Result<DocumentStatus, ValidationError> {
    DocumentStatus::from_label(label)
        .filter(|status| kind.accepts(*status))
        .ok_or_else(|| ValidationError::InvalidStatus {
            kind,
            status: label.to_string(),
        })
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp; `None` falls back to `today`
pub fn parse_document_date(
    value: Option<&str>,
    today: NaiveDate,
) -> Result<NaiveDate, ValidationError> {
    let Some(raw) = value.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(today);
    };

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.date_naive()))
        .map_err(|_| ValidationError::MalformedDate(raw.to_string()))
}
