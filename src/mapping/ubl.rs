//! UBL 2.1 Invoice / CreditNote → canonical model.
//!
//! Both UBL document types share the common-component vocabularies; the
//! differences (line element, quantity element, monetary total element,
//! default type code) are selected from the classified syntax.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::dom::XmlElement;
use super::xpath::{
    date, decimal, find, find_all, require_date, require_decimal, require_text, text, Nsmap,
};
use crate::core::currencies::is_known_currency_code;
use crate::core::{
    Address, BankDetails, CanonicalInvoice, DocumentType, InvoiceLine, Party, TaxBreakdown,
    TaxCategory,
};
use crate::error::MappingError;
use crate::extraction::XmlSyntax;
use crate::report::Finding;

pub const NS: Nsmap = &[
    (
        "cac",
        "urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2",
    ),
    (
        "cbc",
        "urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2",
    ),
];

/// Element names that differ between Invoice and CreditNote documents.
struct UblShape {
    line: &'static str,
    quantity: &'static str,
    type_code: &'static str,
    monetary_total: &'static str,
    default_type: DocumentType,
}

fn shape(syntax: XmlSyntax) -> UblShape {
    match syntax {
        XmlSyntax::UblCreditNote => UblShape {
            line: "cac:CreditNoteLine",
            quantity: "cbc:CreditedQuantity",
            type_code: "cbc:CreditNoteTypeCode",
            monetary_total: "cac:RequestedMonetaryTotal",
            default_type: DocumentType::CreditNote,
        },
        _ => UblShape {
            line: "cac:InvoiceLine",
            quantity: "cbc:InvoicedQuantity",
            type_code: "cbc:InvoiceTypeCode",
            monetary_total: "cac:LegalMonetaryTotal",
            default_type: DocumentType::Invoice,
        },
    }
}

/// Map a parsed UBL Invoice or CreditNote root.
pub fn map_ubl(
    root: &XmlElement,
    syntax: XmlSyntax,
    sink: &mut Vec<Finding>,
) -> Result<CanonicalInvoice, MappingError> {
    let shape = shape(syntax);

    let number = require_text(root, "cbc:ID", NS)?;
    let issue_date = require_date(root, "cbc:IssueDate", NS)?;

    let document_type = match text(root, shape.type_code, NS) {
        Some(raw) => raw
            .parse::<u16>()
            .ok()
            .and_then(DocumentType::from_type_code)
            .ok_or_else(|| {
                MappingError::invalid_value(
                    shape.type_code,
                    format!("unsupported document type code '{raw}'"),
                )
            })?,
        None => shape.default_type,
    };

    let currency_code = require_text(root, "cbc:DocumentCurrencyCode", NS)?;
    if !is_known_currency_code(&currency_code) {
        return Err(MappingError::invalid_value(
            "cbc:DocumentCurrencyCode",
            format!("unknown ISO 4217 code '{currency_code}'"),
        ));
    }

    let due_date = date(root, "cbc:DueDate", NS, sink);
    let delivery_date = date(root, "cac:Delivery/cbc:ActualDeliveryDate", NS, sink);

    let seller = map_party(root, "cac:AccountingSupplierParty")?;
    let buyer = map_party(root, "cac:AccountingCustomerParty")?;

    let totals = find(root, shape.monetary_total, NS)
        .ok_or_else(|| MappingError::field_missing(shape.monetary_total))?;
    let line_extension_amount = require_decimal(totals, "cbc:LineExtensionAmount", NS)?;
    let tax_exclusive_amount = require_decimal(totals, "cbc:TaxExclusiveAmount", NS)?;
    let tax_inclusive_amount = require_decimal(totals, "cbc:TaxInclusiveAmount", NS)?;
    let payable_amount = require_decimal(totals, "cbc:PayableAmount", NS)?;
    let allowance_total_amount =
        decimal(totals, "cbc:AllowanceTotalAmount", NS, sink).unwrap_or(Decimal::ZERO);
    let charge_total_amount =
        decimal(totals, "cbc:ChargeTotalAmount", NS, sink).unwrap_or(Decimal::ZERO);
    let prepaid_amount = decimal(totals, "cbc:PrepaidAmount", NS, sink).unwrap_or(Decimal::ZERO);

    let tax_breakdown = map_tax_breakdown(root, tax_inclusive_amount, tax_exclusive_amount)?;
    let lines = map_lines(root, &shape)?;
    let payment_details = map_payment_details(root);

    let purchase_order_reference = text(root, "cac:OrderReference/cbc:ID", NS);
    let note = text(root, "cbc:Note", NS);

    Ok(CanonicalInvoice {
        number,
        issue_date,
        document_type,
        currency_code,
        delivery_date,
        due_date,
        seller,
        buyer,
        lines,
        line_extension_amount,
        allowance_total_amount,
        charge_total_amount,
        tax_exclusive_amount,
        tax_inclusive_amount,
        prepaid_amount,
        payable_amount,
        tax_breakdown,
        payment_details,
        purchase_order_reference,
        note,
    })
}

fn map_party(root: &XmlElement, role: &str) -> Result<Party, MappingError> {
    let party_query = format!("{role}/cac:Party");
    let party = find(root, &party_query, NS)
        .ok_or_else(|| MappingError::field_missing(&party_query))?;

    // The name may live in PartyName or, for registered entities, only in
    // PartyLegalEntity/RegistrationName.
    let name = text(party, "cac:PartyName/cbc:Name", NS)
        .or_else(|| text(party, "cac:PartyLegalEntity/cbc:RegistrationName", NS))
        .ok_or_else(|| {
            MappingError::field_missing(&format!(
                "{party_query}/cac:PartyLegalEntity/cbc:RegistrationName"
            ))
        })?;

    let mut vat_id = None;
    for scheme in find_all(party, "cac:PartyTaxScheme", NS) {
        if text(scheme, "cac:TaxScheme/cbc:ID", NS).as_deref() == Some("VAT") {
            if let Some(company_id) = text(scheme, "cbc:CompanyID", NS) {
                vat_id = Some(company_id);
                break;
            }
        }
    }

    // German practice: the Steuernummer often rides in PartyLegalEntity when
    // it differs from the VAT id.
    let tax_number =
        text(party, "cac:PartyLegalEntity/cbc:CompanyID", NS).filter(|id| Some(id) != vat_id.as_ref());

    let address_query = format!("{party_query}/cac:PostalAddress");
    let address_el = find(party, "cac:PostalAddress", NS)
        .ok_or_else(|| MappingError::field_missing(&address_query))?;
    let country_code = text(address_el, "cac:Country/cbc:IdentificationCode", NS)
        .ok_or_else(|| {
            MappingError::field_missing(&format!(
                "{address_query}/cac:Country/cbc:IdentificationCode"
            ))
        })?;

    Ok(Party {
        name,
        vat_id,
        tax_number,
        address: Address {
            street: text(address_el, "cbc:StreetName", NS),
            additional: text(address_el, "cbc:AdditionalStreetName", NS),
            city: text(address_el, "cbc:CityName", NS),
            postal_code: text(address_el, "cbc:PostalZone", NS),
            country_code,
        },
    })
}

fn map_tax_breakdown(
    root: &XmlElement,
    tax_inclusive: Decimal,
    tax_exclusive: Decimal,
) -> Result<Vec<TaxBreakdown>, MappingError> {
    let subtotals: Vec<&XmlElement> = find_all(root, "cac:TaxTotal/cac:TaxSubtotal", NS);

    if subtotals.is_empty() {
        // No breakdown although the totals show tax was charged — the
        // document contradicts itself.
        if tax_inclusive > tax_exclusive {
            return Err(MappingError::field_missing("cac:TaxTotal/cac:TaxSubtotal"));
        }
        return Ok(Vec::new());
    }

    let mut breakdown = Vec::new();
    for sub in subtotals {
        let category_el = find(sub, "cac:TaxCategory", NS)
            .ok_or_else(|| MappingError::field_missing("cac:TaxSubtotal/cac:TaxCategory"))?;
        if text(category_el, "cac:TaxScheme/cbc:ID", NS).as_deref() != Some("VAT") {
            continue;
        }

        let taxable_amount = require_decimal(sub, "cbc:TaxableAmount", NS)?;
        let tax_amount = require_decimal(sub, "cbc:TaxAmount", NS)?;

        let category_raw = require_text(category_el, "cbc:ID", NS)?;
        let category = TaxCategory::from_code(&category_raw).ok_or_else(|| {
            MappingError::invalid_value(
                "cac:TaxCategory/cbc:ID",
                format!("unknown tax category '{category_raw}'"),
            )
        })?;

        let rate = match text(category_el, "cbc:Percent", NS) {
            Some(raw) => raw.parse().map_err(|_| {
                MappingError::invalid_value(
                    "cac:TaxCategory/cbc:Percent",
                    format!("'{raw}' is not a number"),
                )
            })?,
            None if category.rate_may_be_absent() => Decimal::ZERO,
            None => {
                return Err(MappingError::field_missing("cac:TaxCategory/cbc:Percent"));
            }
        };

        breakdown.push(TaxBreakdown {
            category,
            rate,
            taxable_amount,
            tax_amount,
        });
    }
    Ok(breakdown)
}

fn map_lines(root: &XmlElement, shape: &UblShape) -> Result<Vec<InvoiceLine>, MappingError> {
    let line_els = find_all(root, shape.line, NS);
    if line_els.is_empty() {
        return Err(MappingError::field_missing(shape.line));
    }

    let mut lines = Vec::with_capacity(line_els.len());
    for line_el in line_els {
        let id = require_text(line_el, "cbc:ID", NS)?;
        let quantity = require_decimal(line_el, shape.quantity, NS)?;
        let unit_code = text(line_el, &format!("{}/@unitCode", shape.quantity), NS)
            .unwrap_or_else(|| "C62".into());
        let net_amount = require_decimal(line_el, "cbc:LineExtensionAmount", NS)?;

        let item_name = require_text(line_el, "cac:Item/cbc:Name", NS)?;
        let item_description = text(line_el, "cac:Item/cbc:Description", NS);
        let item_identifier = text(
            line_el,
            "cac:Item/cac:StandardItemIdentification/cbc:ID",
            NS,
        )
        .or_else(|| text(line_el, "cac:Item/cac:SellersItemIdentification/cbc:ID", NS))
        .or_else(|| text(line_el, "cac:Item/cac:BuyersItemIdentification/cbc:ID", NS));

        let category_el = find(line_el, "cac:Item/cac:ClassifiedTaxCategory", NS)
            .ok_or_else(|| {
                MappingError::field_missing("cac:Item/cac:ClassifiedTaxCategory")
            })?;
        let category_raw = require_text(category_el, "cbc:ID", NS)?;
        let tax_category = TaxCategory::from_code(&category_raw).ok_or_else(|| {
            MappingError::invalid_value(
                "cac:ClassifiedTaxCategory/cbc:ID",
                format!("unknown tax category '{category_raw}' on line {id}"),
            )
        })?;
        let tax_rate = text(category_el, "cbc:Percent", NS)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(Decimal::ZERO);

        let price_amount = require_decimal(line_el, "cac:Price/cbc:PriceAmount", NS)?;
        let base_quantity = text(line_el, "cac:Price/cbc:BaseQuantity", NS)
            .map(|raw| {
                raw.parse::<Decimal>().map_err(|_| {
                    MappingError::invalid_value(
                        "cac:Price/cbc:BaseQuantity",
                        format!("'{raw}' is not a number"),
                    )
                })
            })
            .transpose()?
            .unwrap_or(dec!(1));
        if base_quantity.is_zero() {
            return Err(MappingError::invalid_value(
                "cac:Price/cbc:BaseQuantity",
                "base quantity of zero makes the unit price undefined",
            ));
        }
        let unit_price = price_amount / base_quantity;

        lines.push(InvoiceLine {
            id,
            item_name,
            item_description,
            item_identifier,
            quantity,
            unit_code,
            unit_price,
            net_amount,
            tax_category,
            tax_rate,
        });
    }
    Ok(lines)
}

fn map_payment_details(root: &XmlElement) -> Vec<BankDetails> {
    let mut details = Vec::new();
    for means in find_all(root, "cac:PaymentMeans", NS) {
        let code = text(means, "cbc:PaymentMeansCode", NS);
        if !matches!(code.as_deref(), Some("30") | Some("58")) {
            continue;
        }
        let Some(account) = find(means, "cac:PayeeFinancialAccount", NS) else {
            continue;
        };
        let Some(iban) = text(account, "cbc:ID", NS) else {
            continue;
        };
        // The BIC normally sits on the financial institution; some XRechnung
        // producers put it directly on the branch.
        let bic = text(
            account,
            "cac:FinancialInstitutionBranch/cac:FinancialInstitution/cbc:ID",
            NS,
        )
        .or_else(|| text(account, "cac:FinancialInstitutionBranch/cbc:ID", NS));

        details.push(BankDetails {
            iban: crate::core::iban::normalize(&iban),
            bic,
        });
    }
    details
}
