//! Postgres implementation of the ERP adapter.
//!
//! All queries use bound parameters. The pool is opened with read-only
//! default transactions on top of the credential-level write restriction;
//! each query runs in its own implicit read-only transaction.
//!
//! The table names below are the deployment's ERP view layer; per-deployment
//! schema differences are absorbed by views, not by this adapter.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use super::{ErpAdapter, ErpBankDetails, ErpError, ErpPurchaseOrder, ErpPurchaseOrderLine, ErpVendor};

pub struct PgErpAdapter {
    pool: PgPool,
}

impl PgErpAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a dedicated read-only pool for the ERP store.
    pub async fn connect(dsn: &str, max_connections: u32) -> Result<Self, ErpError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("SET default_transaction_read_only = on")
                        .execute(conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(dsn)
            .await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl ErpAdapter for PgErpAdapter {
    async fn find_vendor_by_vat_id(&self, vat_id: &str) -> Result<Option<ErpVendor>, ErpError> {
        let row = sqlx::query(
            "SELECT vendor_id, vat_id, active FROM erp_vendors WHERE vat_id = $1",
        )
        .bind(vat_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| ErpVendor {
            vendor_id: row.get("vendor_id"),
            vat_id: row.get("vat_id"),
            active: row.get("active"),
        }))
    }

    async fn is_duplicate_invoice(
        &self,
        vendor_id: &str,
        invoice_number: &str,
    ) -> Result<bool, ErpError> {
        let row = sqlx::query(
            "SELECT count(*) AS n FROM erp_invoice_journal \
             WHERE vendor_id = $1 AND external_invoice_number = $2",
        )
        .bind(vendor_id)
        .bind(invoice_number)
        .fetch_one(&self.pool)
        .await?;

        let n: i64 = row.get("n");
        Ok(n > 0)
    }

    async fn get_vendor_bank_details(
        &self,
        vendor_id: &str,
    ) -> Result<Vec<ErpBankDetails>, ErpError> {
        let rows = sqlx::query("SELECT iban FROM erp_vendor_banks WHERE vendor_id = $1")
            .bind(vendor_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let iban: Option<String> = row.get("iban");
                iban.map(|iban| ErpBankDetails { iban })
            })
            .collect())
    }

    async fn get_purchase_order(
        &self,
        po_number: &str,
        vendor_id: &str,
    ) -> Result<Option<ErpPurchaseOrder>, ErpError> {
        let header = sqlx::query(
            "SELECT po_number, vendor_id, total_net, open_for_invoicing \
             FROM erp_purchase_orders WHERE po_number = $1",
        )
        .bind(po_number)
        .fetch_optional(&self.pool)
        .await?;

        let Some(header) = header else {
            return Ok(None);
        };

        // The PO must belong to the invoicing vendor; anything else is
        // answered as if the PO did not exist.
        let po_vendor: String = header.get("vendor_id");
        if po_vendor != vendor_id {
            return Ok(None);
        }

        let line_rows = sqlx::query(
            "SELECT item_identifier, quantity_ordered, quantity_invoiced \
             FROM erp_purchase_order_lines WHERE po_number = $1",
        )
        .bind(po_number)
        .fetch_all(&self.pool)
        .await?;

        let mut lines = HashMap::with_capacity(line_rows.len());
        for row in line_rows {
            let item_identifier: Option<String> = row.get("item_identifier");
            let Some(item_identifier) = item_identifier.filter(|id| !id.is_empty()) else {
                continue;
            };
            lines.insert(
                item_identifier.clone(),
                ErpPurchaseOrderLine {
                    item_identifier,
                    quantity_ordered: row.get("quantity_ordered"),
                    quantity_invoiced: row.get("quantity_invoiced"),
                },
            );
        }

        let total_net: Decimal = header.get("total_net");
        Ok(Some(ErpPurchaseOrder {
            po_number: header.get("po_number"),
            vendor_id: po_vendor,
            total_net,
            open_for_invoicing: header.get("open_for_invoicing"),
            lines,
        }))
    }
}
