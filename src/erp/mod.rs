//! Read-only ERP adapter contract.
//!
//! The business stage talks to the ERP exclusively through [`ErpAdapter`];
//! the snapshots below are per-query copies, never live rows. A failing
//! query is always transient from the pipeline's point of view — the driver
//! retries it; an empty result is a normal answer.

pub mod pg;

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

/// Transient ERP query failure (connectivity, timeout).
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ErpError(pub String);

impl From<sqlx::Error> for ErpError {
    fn from(e: sqlx::Error) -> Self {
        Self(e.to_string())
    }
}

/// Vendor master record. Inactive vendors are still returned so the caller
/// can distinguish "unknown" from "deactivated".
#[derive(Debug, Clone)]
pub struct ErpVendor {
    pub vendor_id: String,
    pub vat_id: Option<String>,
    pub active: bool,
}

/// A bank account registered for a vendor.
#[derive(Debug, Clone)]
pub struct ErpBankDetails {
    pub iban: String,
}

/// Purchase-order line, keyed by item identifier in [`ErpPurchaseOrder`].
#[derive(Debug, Clone)]
pub struct ErpPurchaseOrderLine {
    pub item_identifier: String,
    pub quantity_ordered: Decimal,
    pub quantity_invoiced: Decimal,
}

impl ErpPurchaseOrderLine {
    pub fn quantity_open(&self) -> Decimal {
        self.quantity_ordered - self.quantity_invoiced
    }
}

/// Purchase order header plus lines keyed by HAN/EAN/GTIN.
#[derive(Debug, Clone)]
pub struct ErpPurchaseOrder {
    pub po_number: String,
    pub vendor_id: String,
    pub total_net: Decimal,
    pub open_for_invoicing: bool,
    pub lines: HashMap<String, ErpPurchaseOrderLine>,
}

/// Read-only queries against the ERP store.
#[async_trait]
pub trait ErpAdapter: Send + Sync {
    /// Look a vendor up by VAT id. Inactive vendors are returned with
    /// `active == false`.
    async fn find_vendor_by_vat_id(&self, vat_id: &str) -> Result<Option<ErpVendor>, ErpError>;

    /// Exact, case-sensitive match against the invoice journal.
    async fn is_duplicate_invoice(
        &self,
        vendor_id: &str,
        invoice_number: &str,
    ) -> Result<bool, ErpError>;

    /// All IBANs registered for the vendor.
    async fn get_vendor_bank_details(
        &self,
        vendor_id: &str,
    ) -> Result<Vec<ErpBankDetails>, ErpError>;

    /// Purchase order with lines. Returns `None` when the PO does not exist
    /// or belongs to a different vendor — the vendor scoping is a safety
    /// cross-check, not an error path.
    async fn get_purchase_order(
        &self,
        po_number: &str,
        vendor_id: &str,
    ) -> Result<Option<ErpPurchaseOrder>, ErpError>;
}
