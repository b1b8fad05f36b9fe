//! Arithmetic validation of the canonical invoice.
//!
//! Recomputes line, tax and document totals and compares them to the
//! declared amounts within an absolute tolerance (default two cents). Tax
//! recomputation rounds half-to-even on two fractional digits.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::core::{CanonicalInvoice, TaxCategory};
use crate::report::{codes, Finding};

/// Validate the totals chain. Every violation is an ERROR finding; none of
/// them halts the pipeline.
pub fn validate_calculations(invoice: &CanonicalInvoice, tolerance: Decimal) -> Vec<Finding> {
    let mut findings = Vec::new();

    // 1. Sum of line nets against the declared line-extension amount.
    let line_sum: Decimal = invoice.lines.iter().map(|l| l.net_amount).sum();
    if (line_sum - invoice.line_extension_amount).abs() > tolerance {
        findings.push(
            Finding::error(
                codes::CALC_TOTAL_MISMATCH,
                format!(
                    "sum of line net amounts ({line_sum}) does not match the declared line extension amount ({})",
                    invoice.line_extension_amount
                ),
            )
            .at("line_extension_amount")
            .with_values(line_sum, invoice.line_extension_amount),
        );
    }

    // 2. Tax-exclusive amount from lines and document-level allowances/charges.
    let expected_exclusive = invoice.line_extension_amount - invoice.allowance_total_amount
        + invoice.charge_total_amount;
    if (expected_exclusive - invoice.tax_exclusive_amount).abs() > tolerance {
        findings.push(
            Finding::error(
                codes::CALC_TOTAL_MISMATCH,
                format!(
                    "tax exclusive amount ({}) does not match lines minus allowances plus charges ({expected_exclusive})",
                    invoice.tax_exclusive_amount
                ),
            )
            .at("tax_exclusive_amount")
            .with_values(expected_exclusive, invoice.tax_exclusive_amount),
        );
    }

    // 3. Each breakdown entry must carry round(base * rate / 100, 2).
    let mut tax_sum = Decimal::ZERO;
    for (i, breakdown) in invoice.tax_breakdown.iter().enumerate() {
        tax_sum += breakdown.tax_amount;
        if breakdown.category == TaxCategory::ReverseCharge || breakdown.rate.is_zero() {
            continue;
        }
        let expected = (breakdown.taxable_amount * breakdown.rate / dec!(100))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
        if (expected - breakdown.tax_amount).abs() > tolerance {
            findings.push(
                Finding::error(
                    codes::CALC_TAX_MISMATCH,
                    format!(
                        "tax amount {} for rate {}% does not match base {} (expected {expected})",
                        breakdown.tax_amount, breakdown.rate, breakdown.taxable_amount
                    ),
                )
                .at(format!("tax_breakdown[{i}]"))
                .with_values(expected, breakdown.tax_amount),
            );
        }
    }

    // 4. Sum of tax amounts against the inclusive/exclusive difference.
    let declared_tax = invoice.tax_inclusive_amount - invoice.tax_exclusive_amount;
    if (tax_sum - declared_tax).abs() > tolerance {
        findings.push(
            Finding::error(
                codes::CALC_TAX_MISMATCH,
                format!(
                    "tax breakdown totals {tax_sum} but the document totals imply {declared_tax}"
                ),
            )
            .at("tax_inclusive_amount")
            .with_values(tax_sum, declared_tax),
        );
    }

    // 5. Payable = inclusive - prepaid.
    let expected_payable = invoice.tax_inclusive_amount - invoice.prepaid_amount;
    if (expected_payable - invoice.payable_amount).abs() > tolerance {
        findings.push(
            Finding::error(
                codes::CALC_PAYABLE_MISMATCH,
                format!(
                    "payable amount ({}) does not match tax inclusive minus prepaid ({expected_payable})",
                    invoice.payable_amount
                ),
            )
            .at("payable_amount")
            .with_values(expected_payable, invoice.payable_amount),
        );
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        Address, BankDetails, DocumentType, InvoiceLine, Party, TaxBreakdown,
    };
    use chrono::NaiveDate;

    fn party(name: &str) -> Party {
        Party {
            name: name.into(),
            vat_id: Some("DE123456789".into()),
            tax_number: None,
            address: Address {
                street: None,
                additional: None,
                city: Some("Berlin".into()),
                postal_code: Some("10115".into()),
                country_code: "DE".into(),
            },
        }
    }

    fn consistent_invoice() -> CanonicalInvoice {
        CanonicalInvoice {
            number: "R-TEST-2025-001".into(),
            issue_date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            document_type: DocumentType::Invoice,
            currency_code: "EUR".into(),
            delivery_date: None,
            due_date: None,
            seller: party("ACME GmbH"),
            buyer: party("Kunde AG"),
            lines: vec![InvoiceLine {
                id: "1".into(),
                item_name: "Beratung".into(),
                item_description: None,
                item_identifier: None,
                quantity: dec!(1),
                unit_code: "C62".into(),
                unit_price: dec!(100.00),
                net_amount: dec!(100.00),
                tax_category: TaxCategory::StandardRate,
                tax_rate: dec!(19),
            }],
            line_extension_amount: dec!(100.00),
            allowance_total_amount: Decimal::ZERO,
            charge_total_amount: Decimal::ZERO,
            tax_exclusive_amount: dec!(100.00),
            tax_inclusive_amount: dec!(119.00),
            prepaid_amount: Decimal::ZERO,
            payable_amount: dec!(119.00),
            tax_breakdown: vec![TaxBreakdown {
                category: TaxCategory::StandardRate,
                rate: dec!(19),
                taxable_amount: dec!(100.00),
                tax_amount: dec!(19.00),
            }],
            payment_details: vec![BankDetails {
                iban: "DE89370400440532013000".into(),
                bic: None,
            }],
            purchase_order_reference: None,
            note: None,
        }
    }

    const TOL: Decimal = dec!(0.02);

    #[test]
    fn consistent_totals_produce_no_findings() {
        assert!(validate_calculations(&consistent_invoice(), TOL).is_empty());
    }

    #[test]
    fn one_cent_rounding_is_within_tolerance() {
        let mut invoice = consistent_invoice();
        invoice.tax_breakdown[0].tax_amount = dec!(19.01);
        invoice.tax_inclusive_amount = dec!(119.01);
        invoice.payable_amount = dec!(119.01);
        assert!(validate_calculations(&invoice, TOL).is_empty());
    }

    #[test]
    fn line_sum_mismatch() {
        let mut invoice = consistent_invoice();
        invoice.lines[0].net_amount = dec!(90.00);
        let findings = validate_calculations(&invoice, TOL);
        assert!(findings.iter().any(|f| f.code == codes::CALC_TOTAL_MISMATCH));
    }

    #[test]
    fn inflated_inclusive_amount_hits_tax_and_payable() {
        // Declared gross of 120.00 over a 100.00 net at 19%.
        let mut invoice = consistent_invoice();
        invoice.tax_inclusive_amount = dec!(120.00);
        // Payable left at 119.00 — no longer inclusive minus prepaid.
        let findings = validate_calculations(&invoice, TOL);
        assert!(findings.iter().any(|f| f.code == codes::CALC_TAX_MISMATCH));
        assert!(findings
            .iter()
            .any(|f| f.code == codes::CALC_PAYABLE_MISMATCH));
    }

    #[test]
    fn tax_recomputation_uses_bankers_rounding() {
        // 0.125 rounds to 0.12 half-to-even; a declared 0.13 is still within
        // the two-cent tolerance, 0.15 is not.
        let mut invoice = consistent_invoice();
        invoice.lines[0].net_amount = dec!(0.50);
        invoice.lines[0].unit_price = dec!(0.50);
        invoice.line_extension_amount = dec!(0.50);
        invoice.tax_exclusive_amount = dec!(0.50);
        invoice.tax_breakdown[0] = TaxBreakdown {
            category: TaxCategory::StandardRate,
            rate: dec!(25),
            taxable_amount: dec!(0.50),
            tax_amount: dec!(0.15),
        };
        invoice.tax_inclusive_amount = dec!(0.65);
        invoice.payable_amount = dec!(0.65);
        let findings = validate_calculations(&invoice, TOL);
        assert!(findings.iter().any(|f| f.code == codes::CALC_TAX_MISMATCH));
    }

    #[test]
    fn prepayment_reduces_payable() {
        let mut invoice = consistent_invoice();
        invoice.prepaid_amount = dec!(19.00);
        invoice.payable_amount = dec!(100.00);
        assert!(validate_calculations(&invoice, TOL).is_empty());
    }

    #[test]
    fn reverse_charge_skips_rate_recomputation() {
        let mut invoice = consistent_invoice();
        invoice.tax_breakdown = vec![TaxBreakdown {
            category: TaxCategory::ReverseCharge,
            rate: dec!(19),
            taxable_amount: dec!(100.00),
            tax_amount: Decimal::ZERO,
        }];
        invoice.tax_inclusive_amount = dec!(100.00);
        invoice.payable_amount = dec!(100.00);
        assert!(validate_calculations(&invoice, TOL).is_empty());
    }
}
