//! Business validation against the ERP: vendor lookup, duplicate check,
//! bank-account verification and the three-way purchase-order match.

use rust_decimal::Decimal;
use tracing::info;

use crate::core::{iban, CanonicalInvoice};
use crate::erp::{ErpAdapter, ErpError};
use crate::report::{codes, Finding};

/// Result of the business stage: the findings plus the vendor resolution the
/// driver denormalises onto the transaction row.
#[derive(Debug, Default)]
pub struct BusinessCheck {
    pub findings: Vec<Finding>,
    pub vendor_id: Option<String>,
    pub duplicate: bool,
}

/// Run the business checks in order. ERP query failures are transient and
/// bubble up for the retry discipline; everything the ERP *answers* becomes
/// findings.
pub async fn validate_business(
    invoice: &CanonicalInvoice,
    erp: &dyn ErpAdapter,
    tolerance: Decimal,
) -> Result<BusinessCheck, ErpError> {
    let mut check = BusinessCheck::default();

    // 1. Vendor lookup. Without a resolvable vendor nothing else can run.
    let Some(vat_id) = invoice.seller.vat_id.as_deref() else {
        check.findings.push(Finding::error(
            codes::ERP_VENDOR_UNKNOWN,
            "invoice carries no seller VAT id, vendor cannot be resolved",
        ));
        return Ok(check);
    };
    let Some(vendor) = erp.find_vendor_by_vat_id(vat_id).await? else {
        check.findings.push(
            Finding::error(
                codes::ERP_VENDOR_UNKNOWN,
                format!("no vendor with VAT id {vat_id} in the ERP"),
            )
            .at("seller.vat_id"),
        );
        return Ok(check);
    };
    if !vendor.active {
        check.findings.push(Finding::warning(
            codes::ERP_VENDOR_INACTIVE,
            format!("vendor {} is deactivated", vendor.vendor_id),
        ));
    }
    check.vendor_id = Some(vendor.vendor_id.clone());

    // 2. Duplicate check — a known invoice number is a hard rejection.
    if erp
        .is_duplicate_invoice(&vendor.vendor_id, &invoice.number)
        .await?
    {
        check.duplicate = true;
        check.findings.push(Finding::fatal(
            codes::ERP_DUPLICATE,
            format!(
                "invoice {} already exists in the journal of vendor {}",
                invoice.number, vendor.vendor_id
            ),
        ));
        return Ok(check);
    }

    // 3. Bank verification: every IBAN on the invoice must be registered
    //    for the vendor. A mismatch forces manual review but the PO match
    //    still runs.
    if !invoice.payment_details.is_empty() {
        let registered: Vec<String> = erp
            .get_vendor_bank_details(&vendor.vendor_id)
            .await?
            .into_iter()
            .map(|b| iban::normalize(&b.iban))
            .collect();
        for (i, bank) in invoice.payment_details.iter().enumerate() {
            if !registered.contains(&iban::normalize(&bank.iban)) {
                check.findings.push(
                    Finding::error(
                        codes::ERP_BANK_MISMATCH,
                        format!(
                            "IBAN {} is not registered for vendor {}",
                            bank.iban, vendor.vendor_id
                        ),
                    )
                    .at(format!("payment_details[{i}].iban")),
                );
            }
        }
    }

    // 4./5. Purchase-order retrieval and three-way match.
    match invoice.purchase_order_reference.as_deref() {
        None => {
            check.findings.push(Finding::info(
                codes::ERP_PO_NONE,
                "no purchase order referenced, skipping the order match",
            ));
        }
        Some(po_number) => {
            match erp.get_purchase_order(po_number, &vendor.vendor_id).await? {
                None => check.findings.push(
                    Finding::error(
                        codes::ERP_PO_UNKNOWN,
                        format!(
                            "purchase order {po_number} not found for vendor {}",
                            vendor.vendor_id
                        ),
                    )
                    .at("purchase_order_reference"),
                ),
                Some(po) if !po.open_for_invoicing => check.findings.push(
                    Finding::error(
                        codes::ERP_PO_CLOSED,
                        format!("purchase order {po_number} is closed for invoicing"),
                    )
                    .at("purchase_order_reference"),
                ),
                Some(po) => {
                    match_order(invoice, &po, tolerance, &mut check.findings);
                }
            }
        }
    }

    if check.findings.is_empty() {
        info!(invoice = %invoice.number, vendor = %vendor.vendor_id, "business validation clean");
    }
    Ok(check)
}

/// Header-amount and per-line match between the invoice and an open PO.
fn match_order(
    invoice: &CanonicalInvoice,
    po: &crate::erp::ErpPurchaseOrder,
    tolerance: Decimal,
    findings: &mut Vec<Finding>,
) {
    let diff = invoice.tax_exclusive_amount - po.total_net;
    if diff > tolerance {
        findings.push(
            Finding::error(
                codes::ERP_PO_OVERBILL,
                format!(
                    "invoice net {} exceeds order net {} of {}",
                    invoice.tax_exclusive_amount, po.total_net, po.po_number
                ),
            )
            .at("tax_exclusive_amount")
            .with_values(po.total_net, invoice.tax_exclusive_amount),
        );
    } else if diff < -tolerance {
        // Partial billing is permitted; the gap is only worth a note.
        findings.push(
            Finding::warning(
                codes::ERP_PO_PARTIAL,
                format!(
                    "invoice net {} bills only part of order net {} of {}",
                    invoice.tax_exclusive_amount, po.total_net, po.po_number
                ),
            )
            .at("tax_exclusive_amount"),
        );
    }

    for line in &invoice.lines {
        let Some(identifier) = line.item_identifier.as_deref() else {
            findings.push(
                Finding::warning(
                    codes::ERP_LINE_UNIDENTIFIED,
                    format!(
                        "line {} carries no item identifier, order match impossible",
                        line.id
                    ),
                )
                .at(format!("lines[{}]", line.id)),
            );
            continue;
        };
        let Some(po_line) = po.lines.get(identifier) else {
            findings.push(
                Finding::error(
                    codes::ERP_LINE_UNKNOWN,
                    format!(
                        "line {} (item {identifier}) has no counterpart in order {}",
                        line.id, po.po_number
                    ),
                )
                .at(format!("lines[{}]", line.id)),
            );
            continue;
        };
        if line.quantity > po_line.quantity_open() {
            findings.push(
                Finding::error(
                    codes::ERP_QTY_EXCEEDED,
                    format!(
                        "line {} bills {} of item {identifier} but only {} remain open on order {}",
                        line.id,
                        line.quantity,
                        po_line.quantity_open(),
                        po.po_number
                    ),
                )
                .at(format!("lines[{}]", line.id))
                .with_values(po_line.quantity_open(), line.quantity),
            );
        }
    }
}
