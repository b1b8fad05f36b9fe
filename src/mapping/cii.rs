//! UN/CEFACT Cross Industry Invoice → canonical model.
//!
//! Covers the CII syntax as used by XRechnung-CII, ZUGFeRD and Factur-X.
//! Every mandatory-field failure carries the element path of the offending
//! field; optional fields degrade to defaults with a WARNING.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::dom::XmlElement;
use super::xpath::{
    self, date, decimal, find, find_all, require_decimal, require_text, text, Nsmap,
};
use crate::core::currencies::is_known_currency_code;
use crate::core::{
    Address, BankDetails, CanonicalInvoice, DocumentType, InvoiceLine, Party, TaxBreakdown,
    TaxCategory,
};
use crate::error::MappingError;
use crate::report::Finding;

pub const NS: Nsmap = &[
    (
        "rsm",
        "urn:un:unece:uncefact:data:standard:CrossIndustryInvoice:100",
    ),
    (
        "ram",
        "urn:un:unece:uncefact:data:standard:ReusableAggregateBusinessInformationEntity:100",
    ),
    (
        "udt",
        "urn:un:unece:uncefact:data:standard:UnqualifiedDataType:100",
    ),
];

const Q_TRANSACTION: &str = "rsm:SupplyChainTradeTransaction";
const Q_AGREEMENT: &str = "rsm:SupplyChainTradeTransaction/ram:ApplicableHeaderTradeAgreement";
const Q_SETTLEMENT: &str = "rsm:SupplyChainTradeTransaction/ram:ApplicableHeaderTradeSettlement";

/// Map a parsed CrossIndustryInvoice root.
pub fn map_cii(
    root: &XmlElement,
    sink: &mut Vec<Finding>,
) -> Result<CanonicalInvoice, MappingError> {
    if find(root, "rsm:ExchangedDocument", NS).is_none() {
        return Err(MappingError::field_missing("rsm:ExchangedDocument"));
    }

    let number = require_text(root, "rsm:ExchangedDocument/ram:ID", NS)?;
    let issue_date = xpath::require_date(
        root,
        "rsm:ExchangedDocument/ram:IssueDateTime/udt:DateTimeString",
        NS,
    )?;

    let type_code_raw =
        text(root, "rsm:ExchangedDocument/ram:TypeCode", NS).unwrap_or_else(|| "380".into());
    let document_type = type_code_raw
        .parse::<u16>()
        .ok()
        .and_then(DocumentType::from_type_code)
        .ok_or_else(|| {
            MappingError::invalid_value(
                "rsm:ExchangedDocument/ram:TypeCode",
                format!("unsupported document type code '{type_code_raw}'"),
            )
        })?;

    let transaction = find(root, Q_TRANSACTION, NS)
        .ok_or_else(|| MappingError::field_missing(Q_TRANSACTION))?;
    let agreement =
        find(root, Q_AGREEMENT, NS).ok_or_else(|| MappingError::field_missing(Q_AGREEMENT))?;
    let settlement =
        find(root, Q_SETTLEMENT, NS).ok_or_else(|| MappingError::field_missing(Q_SETTLEMENT))?;

    let currency_code = require_text(settlement, "ram:InvoiceCurrencyCode", NS)?;
    if !is_known_currency_code(&currency_code) {
        return Err(MappingError::invalid_value(
            "ram:InvoiceCurrencyCode",
            format!("unknown ISO 4217 code '{currency_code}'"),
        ));
    }

    let delivery_date = date(
        transaction,
        "ram:ApplicableHeaderTradeDelivery/ram:ActualDeliverySupplyChainEvent/ram:OccurrenceDateTime/udt:DateTimeString",
        NS,
        sink,
    );
    let due_date = date(
        settlement,
        "ram:SpecifiedTradePaymentTerms/ram:DueDateDateTime/udt:DateTimeString",
        NS,
        sink,
    );

    let seller = map_party(agreement, "ram:SellerTradeParty")?;
    let buyer = map_party(agreement, "ram:BuyerTradeParty")?;

    let summation = find(
        settlement,
        "ram:SpecifiedTradeSettlementHeaderMonetarySummation",
        NS,
    )
    .ok_or_else(|| {
        MappingError::field_missing("ram:SpecifiedTradeSettlementHeaderMonetarySummation")
    })?;

    let line_extension_amount = require_decimal(summation, "ram:LineTotalAmount", NS)?;
    let tax_exclusive_amount = require_decimal(summation, "ram:TaxBasisTotalAmount", NS)?;
    let tax_inclusive_amount = require_decimal(summation, "ram:GrandTotalAmount", NS)?;
    let payable_amount = require_decimal(summation, "ram:DuePayableAmount", NS)?;
    let allowance_total_amount =
        decimal(summation, "ram:AllowanceTotalAmount", NS, sink).unwrap_or(Decimal::ZERO);
    let charge_total_amount =
        decimal(summation, "ram:ChargeTotalAmount", NS, sink).unwrap_or(Decimal::ZERO);
    let prepaid_amount =
        decimal(summation, "ram:TotalPrepaidAmount", NS, sink).unwrap_or(Decimal::ZERO);

    let tax_breakdown = map_tax_breakdown(settlement)?;
    let lines = map_lines(transaction)?;
    let payment_details = map_payment_details(settlement);

    let purchase_order_reference = text(
        agreement,
        "ram:BuyerOrderReferencedDocument/ram:IssuerAssignedID",
        NS,
    );
    let note = text(
        root,
        "rsm:ExchangedDocument/ram:IncludedNote/ram:Content",
        NS,
    );

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

fn map_party(agreement: &XmlElement, role: &str) -> Result<Party, MappingError> {
    let party = find(agreement, role, NS)
        .ok_or_else(|| MappingError::field_missing(role))?;

    let name = text(party, "ram:Name", NS)
        .ok_or_else(|| MappingError::field_missing(&format!("{role}/ram:Name")))?;

    // CII allows multiple tax registrations; VA carries the VAT id, FC the
    // national tax number.
    let mut vat_id = None;
    let mut tax_number = None;
    for reg in find_all(party, "ram:SpecifiedTaxRegistration", NS) {
        if let Some(id) = find(reg, "ram:ID", NS) {
            match (id.attr("schemeID"), id.non_empty_text()) {
                (Some("VA"), Some(value)) if vat_id.is_none() => {
                    vat_id = Some(value.to_owned());
                }
                (Some("FC"), Some(value)) if tax_number.is_none() => {
                    tax_number = Some(value.to_owned());
                }
                _ => {}
            }
        }
    }

    let address_el = find(party, "ram:PostalTradeAddress", NS).ok_or_else(|| {
        MappingError::field_missing(&format!("{role}/ram:PostalTradeAddress"))
    })?;
    let country_code = text(address_el, "ram:CountryID", NS).ok_or_else(|| {
        MappingError::field_missing(&format!("{role}/ram:PostalTradeAddress/ram:CountryID"))
    })?;

    Ok(Party {
        name,
        vat_id,
        tax_number,
        address: Address {
            street: text(address_el, "ram:LineOne", NS),
            additional: text(address_el, "ram:LineTwo", NS),
            city: text(address_el, "ram:CityName", NS),
            postal_code: text(address_el, "ram:PostcodeCode", NS),
            country_code,
        },
    })
}

fn map_tax_breakdown(settlement: &XmlElement) -> Result<Vec<TaxBreakdown>, MappingError> {
    let mut breakdown = Vec::new();
    for tax_el in find_all(settlement, "ram:ApplicableTradeTax", NS) {
        // Only VAT contributes to the breakdown.
        if text(tax_el, "ram:TypeCode", NS).as_deref() != Some("VAT") {
            continue;
        }

        let taxable_amount = require_decimal(tax_el, "ram:BasisAmount", NS)?;
        let tax_amount = require_decimal(tax_el, "ram:CalculatedAmount", NS)?;

        let category_raw = require_text(tax_el, "ram:CategoryCode", NS)?;
        let category = TaxCategory::from_code(&category_raw).ok_or_else(|| {
            MappingError::invalid_value(
                "ram:ApplicableTradeTax/ram:CategoryCode",
                format!("unknown tax category '{category_raw}'"),
            )
        })?;

        let rate = tax_rate(tax_el, category, "ram:ApplicableTradeTax")?;
        breakdown.push(TaxBreakdown {
            category,
            rate,
            taxable_amount,
            tax_amount,
        });
    }
    Ok(breakdown)
}

/// The rate lives in `RateApplicablePercent` or, in older ZUGFeRD profiles,
/// `ApplicablePercent`. Exemption categories may omit it entirely.
fn tax_rate(
    tax_el: &XmlElement,
    category: TaxCategory,
    context: &str,
) -> Result<Decimal, MappingError> {
    let raw = text(tax_el, "ram:RateApplicablePercent", NS)
        .or_else(|| text(tax_el, "ram:ApplicablePercent", NS));
    match raw {
        Some(raw) => raw.parse().map_err(|_| {
            MappingError::invalid_value(
                &format!("{context}/ram:RateApplicablePercent"),
                format!("'{raw}' is not a number"),
            )
        }),
        None if category.rate_may_be_absent() => Ok(Decimal::ZERO),
        None => Err(MappingError::field_missing(&format!(
            "{context}/ram:RateApplicablePercent"
        ))),
    }
}

fn map_lines(transaction: &XmlElement) -> Result<Vec<InvoiceLine>, MappingError> {
    let line_els = find_all(transaction, "ram:IncludedSupplyChainTradeLineItem", NS);
    if line_els.is_empty() {
        return Err(MappingError::field_missing(
            "rsm:SupplyChainTradeTransaction/ram:IncludedSupplyChainTradeLineItem",
        ));
    }

    let mut lines = Vec::with_capacity(line_els.len());
    for line_el in line_els {
        let id = require_text(
            line_el,
            "ram:AssociatedDocumentLineDocument/ram:LineID",
            NS,
        )?;
        let item_name = require_text(line_el, "ram:SpecifiedTradeProduct/ram:Name", NS)?;
        let item_description = text(line_el, "ram:SpecifiedTradeProduct/ram:Description", NS);

        // GTIN/EAN first, then the seller's article number, then the buyer's.
        let item_identifier = text(line_el, "ram:SpecifiedTradeProduct/ram:GlobalID", NS)
            .or_else(|| text(line_el, "ram:SpecifiedTradeProduct/ram:SellerAssignedID", NS))
            .or_else(|| text(line_el, "ram:SpecifiedTradeProduct/ram:BuyerAssignedID", NS));

        let quantity = require_decimal(
            line_el,
            "ram:SpecifiedLineTradeDelivery/ram:BilledQuantity",
            NS,
        )?;
        let unit_code = text(
            line_el,
            "ram:SpecifiedLineTradeDelivery/ram:BilledQuantity/@unitCode",
            NS,
        )
        .unwrap_or_else(|| "C62".into());

        let price_el = find(
            line_el,
            "ram:SpecifiedLineTradeAgreement/ram:NetPriceProductTradePrice",
            NS,
        )
        .ok_or_else(|| {
            MappingError::field_missing(
                "ram:SpecifiedLineTradeAgreement/ram:NetPriceProductTradePrice",
            )
        })?;
        let charge_amount = require_decimal(price_el, "ram:ChargeAmount", NS)?;
        let basis_quantity = text(price_el, "ram:BasisQuantity", NS)
            .map(|raw| {
                raw.parse::<Decimal>().map_err(|_| {
                    MappingError::invalid_value(
                        "ram:NetPriceProductTradePrice/ram:BasisQuantity",
                        format!("'{raw}' is not a number"),
                    )
                })
            })
            .transpose()?
            .unwrap_or(dec!(1));
        if basis_quantity.is_zero() {
            return Err(MappingError::invalid_value(
                "ram:NetPriceProductTradePrice/ram:BasisQuantity",
                "base quantity of zero makes the unit price undefined",
            ));
        }
        let unit_price = charge_amount / basis_quantity;

        let net_amount = require_decimal(
            line_el,
            "ram:SpecifiedLineTradeSettlement/ram:SpecifiedTradeSettlementLineMonetarySummation/ram:LineTotalAmount",
            NS,
        )?;

        let tax_el = find(
            line_el,
            "ram:SpecifiedLineTradeSettlement/ram:ApplicableTradeTax",
            NS,
        )
        .ok_or_else(|| {
            MappingError::field_missing(
                "ram:SpecifiedLineTradeSettlement/ram:ApplicableTradeTax",
            )
        })?;
        let category_raw = require_text(tax_el, "ram:CategoryCode", NS)?;
        let tax_category = TaxCategory::from_code(&category_raw).ok_or_else(|| {
            MappingError::invalid_value(
                "ram:SpecifiedLineTradeSettlement/ram:ApplicableTradeTax/ram:CategoryCode",
                format!("unknown tax category '{category_raw}' on line {id}"),
            )
        })?;
        // Line-level rates default to zero when absent.
        let tax_rate = text(tax_el, "ram:RateApplicablePercent", NS)
            .or_else(|| text(tax_el, "ram:ApplicablePercent", NS))
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(Decimal::ZERO);

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

/// Bank accounts from payment means that actually carry one (credit transfer
/// codes 30 and 58).
fn map_payment_details(settlement: &XmlElement) -> Vec<BankDetails> {
    let mut details = Vec::new();
    for means in find_all(settlement, "ram:SpecifiedTradeSettlementPaymentMeans", NS) {
        let type_code = text(means, "ram:TypeCode", NS);
        if !matches!(type_code.as_deref(), Some("30") | Some("58")) {
            continue;
        }
        if let Some(iban) = text(means, "ram:PayeePartyCreditorFinancialAccount/ram:IBANID", NS) {
            details.push(BankDetails {
                iban: crate::core::iban::normalize(&iban),
                bic: text(
                    means,
                    "ram:PayeeSpecifiedCreditorFinancialInstitution/ram:BICID",
                    NS,
                ),
            });
        }
    }
    details
}
