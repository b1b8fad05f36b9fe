//! Structure validation against cached schema tables.
//!
//! Each syntax has a compiled table of required element paths and datatype
//! checks covering the EN 16931 grammar skeleton. Tables are built once per
//! process and shared read-only across workers. Violations carry the
//! `XSD_VIOLATION` code; the KoSIT stage remains the authoritative semantic
//! check on top.

use std::sync::OnceLock;

use crate::extraction::XmlSyntax;
use crate::mapping::dom::XmlElement;
use crate::mapping::xpath::{self, Nsmap};
use crate::report::{codes, Finding};

#[derive(Debug, Clone, Copy)]
enum RuleKind {
    /// The element (or attribute) must be present with non-empty content.
    Presence,
    /// Present content must parse as a decimal amount.
    Decimal,
    /// Present content must parse as a date (basic or extended form).
    Date,
}

struct Rule {
    query: &'static str,
    kind: RuleKind,
}

struct Schema {
    ns: Nsmap,
    rules: Vec<Rule>,
}

struct Schemas {
    ubl_invoice: Schema,
    ubl_credit_note: Schema,
    cii: Schema,
}

fn rule(query: &'static str, kind: RuleKind) -> Rule {
    Rule { query, kind }
}

fn ubl_schema(line: &'static str, totals: &'static str) -> Schema {
    // Leaking the small per-process query strings keeps the table 'static.
    let amount = |field: &str| -> &'static str {
        Box::leak(format!("{totals}/{field}").into_boxed_str())
    };
    Schema {
        ns: crate::mapping::ubl::NS,
        rules: vec![
            rule("cbc:ID", RuleKind::Presence),
            rule("cbc:IssueDate", RuleKind::Date),
            rule("cbc:DocumentCurrencyCode", RuleKind::Presence),
            rule("cac:AccountingSupplierParty/cac:Party", RuleKind::Presence),
            rule("cac:AccountingCustomerParty/cac:Party", RuleKind::Presence),
            rule(line, RuleKind::Presence),
            rule(amount("cbc:LineExtensionAmount"), RuleKind::Decimal),
            rule(amount("cbc:TaxExclusiveAmount"), RuleKind::Decimal),
            rule(amount("cbc:TaxInclusiveAmount"), RuleKind::Decimal),
            rule(amount("cbc:PayableAmount"), RuleKind::Decimal),
        ],
    }
}

fn cii_schema() -> Schema {
    const SUMMATION: &str = "rsm:SupplyChainTradeTransaction/ram:ApplicableHeaderTradeSettlement/ram:SpecifiedTradeSettlementHeaderMonetarySummation";
    let amount = |field: &str| -> &'static str {
        Box::leak(format!("{SUMMATION}/{field}").into_boxed_str())
    };
    Schema {
        ns: crate::mapping::cii::NS,
        rules: vec![
            rule("rsm:ExchangedDocumentContext", RuleKind::Presence),
            rule("rsm:ExchangedDocument/ram:ID", RuleKind::Presence),
            rule("rsm:ExchangedDocument/ram:TypeCode", RuleKind::Presence),
            rule(
                "rsm:ExchangedDocument/ram:IssueDateTime/udt:DateTimeString",
                RuleKind::Date,
            ),
            rule(
                "rsm:SupplyChainTradeTransaction/ram:ApplicableHeaderTradeAgreement/ram:SellerTradeParty",
                RuleKind::Presence,
            ),
            rule(
                "rsm:SupplyChainTradeTransaction/ram:ApplicableHeaderTradeAgreement/ram:BuyerTradeParty",
                RuleKind::Presence,
            ),
            rule(
                "rsm:SupplyChainTradeTransaction/ram:ApplicableHeaderTradeSettlement/ram:InvoiceCurrencyCode",
                RuleKind::Presence,
            ),
            rule(
                "rsm:SupplyChainTradeTransaction/ram:IncludedSupplyChainTradeLineItem",
                RuleKind::Presence,
            ),
            rule(amount("ram:LineTotalAmount"), RuleKind::Decimal),
            rule(amount("ram:TaxBasisTotalAmount"), RuleKind::Decimal),
            rule(amount("ram:GrandTotalAmount"), RuleKind::Decimal),
            rule(amount("ram:DuePayableAmount"), RuleKind::Decimal),
        ],
    }
}

/// Compiled schema tables, built once per worker process.
fn schemas() -> &'static Schemas {
    static SCHEMAS: OnceLock<Schemas> = OnceLock::new();
    SCHEMAS.get_or_init(|| Schemas {
        ubl_invoice: ubl_schema("cac:InvoiceLine", "cac:LegalMonetaryTotal"),
        ubl_credit_note: ubl_schema("cac:CreditNoteLine", "cac:RequestedMonetaryTotal"),
        cii: cii_schema(),
    })
}

/// Validate a classified document against the schema table of its syntax.
pub fn validate_structure(root: &XmlElement, syntax: XmlSyntax) -> Vec<Finding> {
    let schema = match syntax {
        XmlSyntax::UblInvoice => &schemas().ubl_invoice,
        XmlSyntax::UblCreditNote => &schemas().ubl_credit_note,
        XmlSyntax::Cii => &schemas().cii,
    };

    let mut findings = Vec::new();
    for rule in &schema.rules {
        let location = plain_path(rule.query);
        match rule.kind {
            RuleKind::Presence => {
                if xpath::find(root, rule.query, schema.ns).is_none() {
                    findings.push(
                        Finding::error(codes::XSD_VIOLATION, "required element is missing")
                            .at(location),
                    );
                }
            }
            RuleKind::Decimal => match xpath::text(root, rule.query, schema.ns) {
                None => findings.push(
                    Finding::error(codes::XSD_VIOLATION, "required amount is missing")
                        .at(location),
                ),
                Some(raw) if raw.parse::<rust_decimal::Decimal>().is_err() => findings.push(
                    Finding::error(
                        codes::XSD_VIOLATION,
                        format!("'{raw}' is not a valid amount"),
                    )
                    .at(location),
                ),
                Some(_) => {}
            },
            RuleKind::Date => match xpath::text(root, rule.query, schema.ns) {
                None => findings.push(
                    Finding::error(codes::XSD_VIOLATION, "required date is missing").at(location),
                ),
                Some(raw) if xpath::parse_date(&raw).is_none() => findings.push(
                    Finding::error(codes::XSD_VIOLATION, format!("'{raw}' is not a valid date"))
                        .at(location),
                ),
                Some(_) => {}
            },
        }
    }
    findings
}

fn plain_path(query: &str) -> String {
    query
        .split('/')
        .map(|seg| seg.rsplit(':').next().unwrap_or(seg))
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::dom::parse;

    #[test]
    fn complete_cii_skeleton_passes() {
        let xml = br#"<rsm:CrossIndustryInvoice
            xmlns:rsm="urn:un:unece:uncefact:data:standard:CrossIndustryInvoice:100"
            xmlns:ram="urn:un:unece:uncefact:data:standard:ReusableAggregateBusinessInformationEntity:100"
            xmlns:udt="urn:un:unece:uncefact:data:standard:UnqualifiedDataType:100">
          <rsm:ExchangedDocumentContext/>
          <rsm:ExchangedDocument>
            <ram:ID>R-1</ram:ID>
            <ram:TypeCode>380</ram:TypeCode>
            <ram:IssueDateTime><udt:DateTimeString format="102">20250115</udt:DateTimeString></ram:IssueDateTime>
          </rsm:ExchangedDocument>
          <rsm:SupplyChainTradeTransaction>
            <ram:IncludedSupplyChainTradeLineItem/>
            <ram:ApplicableHeaderTradeAgreement>
              <ram:SellerTradeParty/>
              <ram:BuyerTradeParty/>
            </ram:ApplicableHeaderTradeAgreement>
            <ram:ApplicableHeaderTradeSettlement>
              <ram:InvoiceCurrencyCode>EUR</ram:InvoiceCurrencyCode>
              <ram:SpecifiedTradeSettlementHeaderMonetarySummation>
                <ram:LineTotalAmount>100.00</ram:LineTotalAmount>
                <ram:TaxBasisTotalAmount>100.00</ram:TaxBasisTotalAmount>
                <ram:GrandTotalAmount>119.00</ram:GrandTotalAmount>
                <ram:DuePayableAmount>119.00</ram:DuePayableAmount>
              </ram:SpecifiedTradeSettlementHeaderMonetarySummation>
            </ram:ApplicableHeaderTradeSettlement>
          </rsm:SupplyChainTradeTransaction>
        </rsm:CrossIndustryInvoice>"#;
        let root = parse(xml).unwrap();
        let findings = validate_structure(&root, XmlSyntax::Cii);
        assert!(findings.is_empty(), "unexpected findings: {findings:?}");
    }

    #[test]
    fn missing_elements_and_bad_amounts_are_reported() {
        let xml = br#"<rsm:CrossIndustryInvoice
            xmlns:rsm="urn:un:unece:uncefact:data:standard:CrossIndustryInvoice:100"
            xmlns:ram="urn:un:unece:uncefact:data:standard:ReusableAggregateBusinessInformationEntity:100"
            xmlns:udt="urn:un:unece:uncefact:data:standard:UnqualifiedDataType:100">
          <rsm:ExchangedDocument>
            <ram:ID>R-1</ram:ID>
            <ram:IssueDateTime><udt:DateTimeString>15.01.2025</udt:DateTimeString></ram:IssueDateTime>
          </rsm:ExchangedDocument>
        </rsm:CrossIndustryInvoice>"#;
        let root = parse(xml).unwrap();
        let findings = validate_structure(&root, XmlSyntax::Cii);
        assert!(findings
            .iter()
            .all(|f| f.code == codes::XSD_VIOLATION));
        // Context, type code, bad date, parties, currency, lines, 4 amounts.
        assert!(findings.len() >= 8, "got {} findings", findings.len());
        assert!(findings
            .iter()
            .any(|f| f.location.as_deref()
                == Some("ExchangedDocument/IssueDateTime/DateTimeString")));
    }

    #[test]
    fn ubl_tables_distinguish_invoice_and_credit_note() {
        let xml = format!(
            r#"<Invoice xmlns="{}"
                 xmlns:cac="urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2"
                 xmlns:cbc="urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2">
              <cbc:ID>R-1</cbc:ID>
              <cbc:IssueDate>2025-01-15</cbc:IssueDate>
              <cbc:DocumentCurrencyCode>EUR</cbc:DocumentCurrencyCode>
              <cac:AccountingSupplierParty><cac:Party/></cac:AccountingSupplierParty>
              <cac:AccountingCustomerParty><cac:Party/></cac:AccountingCustomerParty>
              <cac:LegalMonetaryTotal>
                <cbc:LineExtensionAmount>100.00</cbc:LineExtensionAmount>
                <cbc:TaxExclusiveAmount>100.00</cbc:TaxExclusiveAmount>
                <cbc:TaxInclusiveAmount>119.00</cbc:TaxInclusiveAmount>
                <cbc:PayableAmount>119.00</cbc:PayableAmount>
              </cac:LegalMonetaryTotal>
              <cac:InvoiceLine><cbc:ID>1</cbc:ID></cac:InvoiceLine>
            </Invoice>"#,
            crate::extraction::xml::NS_UBL_INVOICE
        );
        let root = parse(xml.as_bytes()).unwrap();
        assert!(validate_structure(&root, XmlSyntax::UblInvoice).is_empty());
        // The same document fails the credit-note table (no CreditNoteLine,
        // no RequestedMonetaryTotal).
        assert!(!validate_structure(&root, XmlSyntax::UblCreditNote).is_empty());
    }
}
