//! Commercial documents and their line items

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::types::{
    CounterTarget, DocumentId, LineId, LotId, ProductId, StockKey, StockSign, VariantId,
};

/// The six document kinds that move stock or prices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Supplier purchase order (bon de commande)
    PurchaseOrder,
    /// Delivery sale slip (bon de sortie)
    SaleSlipA,
    /// Counter sale slip (comptant)
    SaleSlipB,
    CreditNoteClient,
    CreditNoteSupplier,
    /// Return coming back through the online channel
    CreditNoteChannel,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 6] = [
        DocumentKind::PurchaseOrder,
        DocumentKind::SaleSlipA,
        DocumentKind::SaleSlipB,
        DocumentKind::CreditNoteClient,
        DocumentKind::CreditNoteSupplier,
        DocumentKind::CreditNoteChannel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::PurchaseOrder => "purchase_order",
            DocumentKind::SaleSlipA => "sale_slip_a",
            DocumentKind::SaleSlipB => "sale_slip_b",
            DocumentKind::CreditNoteClient => "credit_note_client",
            DocumentKind::CreditNoteSupplier => "credit_note_supplier",
            DocumentKind::CreditNoteChannel => "credit_note_channel",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    /// Three-letter prefix used by display numbers
    pub fn prefix(&self) -> &'static str {
        match self {
            DocumentKind::PurchaseOrder => "CMD",
            DocumentKind::SaleSlipA => "SOR",
            DocumentKind::SaleSlipB => "COM",
            DocumentKind::CreditNoteClient => "AVC",
            DocumentKind::CreditNoteSupplier => "AVF",
            DocumentKind::CreditNoteChannel => "AVE",
        }
    }

    /// Direction stock moves while a document of this kind is active.
    /// Purchase orders only drive the price cascade.
    pub fn stock_sign(&self) -> Option<StockSign> {
        match self {
            DocumentKind::PurchaseOrder => None,
            DocumentKind::SaleSlipA | DocumentKind::SaleSlipB => Some(StockSign::Decrease),
            DocumentKind::CreditNoteClient => Some(StockSign::Increase),
            DocumentKind::CreditNoteSupplier => Some(StockSign::Decrease),
            DocumentKind::CreditNoteChannel => Some(StockSign::Increase),
        }
    }

    pub fn counter_target(&self) -> CounterTarget {
        match self {
            DocumentKind::CreditNoteChannel => CounterTarget::SharedChannel,
            _ => CounterTarget::Owned,
        }
    }

    pub fn is_credit_note(&self) -> bool {
        matches!(
            self,
            DocumentKind::CreditNoteClient
                | DocumentKind::CreditNoteSupplier
                | DocumentKind::CreditNoteChannel
        )
    }

    pub fn drives_price_cascade(&self) -> bool {
        matches!(self, DocumentKind::PurchaseOrder)
    }

    pub fn records_lots(&self) -> bool {
        matches!(self, DocumentKind::PurchaseOrder)
    }

    /// Statuses a document of this kind may hold
    pub fn accepted_statuses(&self) -> &'static [DocumentStatus] {
        if self.is_credit_note() {
            &[
                DocumentStatus::Draft,
                DocumentStatus::Pending,
                DocumentStatus::Validated,
                DocumentStatus::Applied,
                DocumentStatus::Cancelled,
            ]
        } else {
            &[
                DocumentStatus::Draft,
                DocumentStatus::Pending,
                DocumentStatus::Validated,
                DocumentStatus::Delivered,
                DocumentStatus::Invoiced,
                DocumentStatus::Cancelled,
            ]
        }
    }

    pub fn accepts(&self, status: DocumentStatus) -> bool {
        self.accepted_statuses().contains(&status)
    }

    pub fn default_status(&self) -> DocumentStatus {
        if self.is_credit_note() {
            DocumentStatus::Pending
        } else {
            DocumentStatus::Draft
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document status. Serialized with the labels operators see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentStatus {
    #[serde(rename = "Brouillon")]
    Draft,
    #[serde(rename = "En attente")]
    Pending,
    #[serde(rename = "Validé")]
    Validated,
    #[serde(rename = "Livré")]
    Delivered,
    #[serde(rename = "Facturé")]
    Invoiced,
    #[serde(rename = "Appliqué")]
    Applied,
    #[serde(rename = "Annulé")]
    Cancelled,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 7] = [
        DocumentStatus::Draft,
        DocumentStatus::Pending,
        DocumentStatus::Validated,
        DocumentStatus::Delivered,
        DocumentStatus::Invoiced,
        DocumentStatus::Applied,
        DocumentStatus::Cancelled,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "Brouillon",
            DocumentStatus::Pending => "En attente",
            DocumentStatus::Validated => "Validé",
            DocumentStatus::Delivered => "Livré",
            DocumentStatus::Invoiced => "Facturé",
            DocumentStatus::Applied => "Appliqué",
            DocumentStatus::Cancelled => "Annulé",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|status| status.label() == s)
    }

    /// An active document contributes its stock effect
    pub fn is_active(&self) -> bool {
        !matches!(self, DocumentStatus::Cancelled)
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A persisted, validated document line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub id: Option<LineId>,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub unit_id: Option<i64>,
    /// Lot the line was costed against, informational only
    pub lot_id: Option<LotId>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount_percentage: Decimal,
    pub discount_amount: Decimal,
    pub total: Decimal,
    /// Purchase price the product had before this line's cascade overwrote it
    pub old_purchase_price: Option<Decimal>,
    pub price_applied: bool,
}

impl DocumentLine {
    pub fn stock_key(&self) -> StockKey {
        StockKey::new(self.product_id, self.variant_id)
    }
}

/// Line as submitted by a client, before validation
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct LineInput {
    // validator's derive needs the primitive type to apply `range`
    #[validate(required, range(min = 1))]
    pub product_id: Option<i64>,
    pub variant_id: Option<VariantId>,
    pub unit_id: Option<i64>,
    pub lot_id: Option<LotId>,
    #[validate(required)]
    pub quantity: Option<Decimal>,
    #[validate(required)]
    pub unit_price: Option<Decimal>,
    pub discount_percentage: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    #[validate(required)]
    pub total: Option<Decimal>,
}

/// Header fields shared by all document kinds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentHeaderInput {
    /// `YYYY-MM-DD`; defaults to today
    pub document_date: Option<String>,
    pub counterpart_id: Option<i64>,
    #[serde(default)]
    pub total_amount: Decimal,
    #[serde(default)]
    pub excluded_from_aggregation: bool,
    /// Status label; defaults to the kind's initial status. Ignored on update.
    pub status: Option<String>,
}

/// A document with its ordered lines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub kind: DocumentKind,
    pub status: DocumentStatus,
    pub document_date: NaiveDate,
    pub counterpart_id: Option<i64>,
    pub total_amount: Decimal,
    pub excluded_from_aggregation: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub lines: Vec<DocumentLine>,
}

impl Document {
    pub fn display_number(&self) -> String {
        display_number(self.kind, self.id)
    }
}

/// Display number computed on read: kind prefix plus the id zero-padded to two digits
pub fn display_number(kind: DocumentKind, id: DocumentId) -> String {
    format!("{}{:02}", kind.prefix(), id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_number_padding() {
        assert_eq!(display_number(DocumentKind::SaleSlipA, 7), "SOR07");
        assert_eq!(display_number(DocumentKind::PurchaseOrder, 123), "CMD123");
        assert_eq!(display_number(DocumentKind::CreditNoteChannel, 10), "AVE10");
    }

    #[test]
    fn test_status_labels_round_trip() {
        for status in DocumentStatus::ALL {
            assert_eq!(DocumentStatus::from_label(status.label()), Some(status));
        }
        assert_eq!(DocumentStatus::from_label(" Annulé "), Some(DocumentStatus::Cancelled));
        assert_eq!(DocumentStatus::from_label("annule"), None);
    }

    #[test]
    fn test_status_serializes_as_label() {
        let json = serde_json::to_string(&DocumentStatus::Pending).unwrap();
        assert_eq!(json, "\"En attente\"");
    }

    #[test]
    fn test_applied_only_for_credit_notes() {
        assert!(DocumentKind::CreditNoteClient.accepts(DocumentStatus::Applied));
        assert!(!DocumentKind::SaleSlipB.accepts(DocumentStatus::Applied));
        assert!(!DocumentKind::CreditNoteSupplier.accepts(DocumentStatus::Delivered));
        for kind in DocumentKind::ALL {
            assert!(kind.accepts(DocumentStatus::Cancelled));
            assert!(kind.accepts(kind.default_status()));
        }
    }

    #[test]
    fn test_stock_signs() {
        assert_eq!(DocumentKind::PurchaseOrder.stock_sign(), None);
        assert_eq!(DocumentKind::SaleSlipA.stock_sign(), Some(StockSign::Decrease));
        assert_eq!(DocumentKind::SaleSlipB.stock_sign(), Some(StockSign::Decrease));
        assert_eq!(DocumentKind::CreditNoteClient.stock_sign(), Some(StockSign::Increase));
        assert_eq!(DocumentKind::CreditNoteSupplier.stock_sign(), Some(StockSign::Decrease));
        assert_eq!(DocumentKind::CreditNoteChannel.stock_sign(), Some(StockSign::Increase));
        assert_eq!(
            DocumentKind::CreditNoteChannel.counter_target(),
            CounterTarget::SharedChannel
        );
    }

    #[test]
    fn test_channel_returns_target_shared_channel_column() {
        assert_eq!(
            DocumentKind::CreditNoteChannel.counter_target().base_counter(),
            "shared_channel_quantity"
        );
        for kind in DocumentKind::ALL {
            if kind != DocumentKind::CreditNoteChannel {
                assert_eq!(kind.counter_target().base_counter(), "quantity");
            }
        }
    }
}
