//! Schema capability detection
//!
//! Some deployments run without the lot store or without the line columns the
//! price cascade uses for bookkeeping. Both are detected once at startup and
//! the resulting snapshot is shared read-only through the application state.

use serde::Serialize;
use sqlx::PgPool;

/// Proof that the lot store exists. Only `SchemaCapabilities::detect` creates one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HasLotLedger {
    _detected: (),
}

#[derive(Debug, Clone, Default)]
pub struct SchemaCapabilities {
    lot_ledger: Option<HasLotLedger>,
    line_price_tracking: bool,
}

#[derive(Debug, Serialize)]
pub struct CapabilityReport {
    pub lot_ledger: bool,
    pub line_price_tracking: bool,
}

impl SchemaCapabilities {
    /// Single detection pass against `information_schema`
    pub async fn detect(db: &PgPool) -> Result<Self, sqlx::Error> {
        let has_lots = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = current_schema() AND table_name = 'stock_lots'
            )
            "#,
        )
        .fetch_one(db)
        .await?;

        let tracking_columns = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM information_schema.columns
            WHERE table_schema = current_schema()
              AND table_name = 'document_lines'
              AND column_name IN ('old_purchase_price', 'price_applied')
            "#,
        )
        .fetch_one(db)
        .await?;

        let capabilities = Self {
            lot_ledger: has_lots.then_some(HasLotLedger { _detected: () }),
            line_price_tracking: tracking_columns == 2,
        };

        tracing::info!(
            lot_ledger = capabilities.lot_ledger.is_some(),
            line_price_tracking = capabilities.line_price_tracking,
            "Schema capabilities detected"
        );

        Ok(capabilities)
    }

    pub fn lot_ledger(&self) -> Option<HasLotLedger> {
        self.lot_ledger
    }

    /// Whether lines can remember the price a cascade overwrote
    pub fn tracks_line_prices(&self) -> bool {
        self.line_price_tracking
    }

    pub fn report(&self) -> CapabilityReport {
        CapabilityReport {
            lot_ledger: self.lot_ledger.is_some(),
            line_price_tracking: self.line_price_tracking,
        }
    }
}
