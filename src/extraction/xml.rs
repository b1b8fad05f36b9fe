//! XML syntax classification by root element and namespace.

use crate::error::ExtractionError;
use crate::mapping::dom::XmlElement;

/// UBL 2.1 Invoice root namespace.
pub const NS_UBL_INVOICE: &str = "urn:oasis:names:specification:ubl:schema:xsd:Invoice-2";
/// UBL 2.1 CreditNote root namespace.
pub const NS_UBL_CREDITNOTE: &str = "urn:oasis:names:specification:ubl:schema:xsd:CreditNote-2";
/// UN/CEFACT CrossIndustryInvoice root namespace.
pub const NS_CII: &str = "urn:un:unece:uncefact:data:standard:CrossIndustryInvoice:100";

/// The XML syntax of an EN 16931 invoice document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlSyntax {
    UblInvoice,
    UblCreditNote,
    Cii,
}

impl XmlSyntax {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UblInvoice => "UBL_INVOICE",
            Self::UblCreditNote => "UBL_CREDITNOTE",
            Self::Cii => "CII",
        }
    }

    pub fn is_ubl(&self) -> bool {
        matches!(self, Self::UblInvoice | Self::UblCreditNote)
    }
}

/// Classify a parsed document by its root element. Both the local name and
/// the namespace must match; a bare `<Invoice>` without the UBL namespace is
/// not an invoice.
pub fn classify(root: &XmlElement) -> Result<XmlSyntax, ExtractionError> {
    match (root.name.as_str(), root.namespace.as_deref()) {
        ("Invoice", Some(NS_UBL_INVOICE)) => Ok(XmlSyntax::UblInvoice),
        ("CreditNote", Some(NS_UBL_CREDITNOTE)) => Ok(XmlSyntax::UblCreditNote),
        ("CrossIndustryInvoice", Some(NS_CII)) => Ok(XmlSyntax::Cii),
        (name, ns) => Err(ExtractionError::UnknownFormat(format!(
            "root element '{}' in namespace '{}' is not an EN 16931 syntax",
            name,
            ns.unwrap_or("")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::dom::parse;

    #[test]
    fn classifies_the_three_syntaxes() {
        let ubl = parse(
            format!(r#"<Invoice xmlns="{NS_UBL_INVOICE}"><a/></Invoice>"#).as_bytes(),
        )
        .unwrap();
        assert_eq!(classify(&ubl).unwrap(), XmlSyntax::UblInvoice);

        let cn = parse(
            format!(r#"<CreditNote xmlns="{NS_UBL_CREDITNOTE}"><a/></CreditNote>"#).as_bytes(),
        )
        .unwrap();
        assert_eq!(classify(&cn).unwrap(), XmlSyntax::UblCreditNote);

        let cii = parse(
            format!(r#"<rsm:CrossIndustryInvoice xmlns:rsm="{NS_CII}"/>"#).as_bytes(),
        )
        .unwrap();
        assert_eq!(classify(&cii).unwrap(), XmlSyntax::Cii);
    }

    #[test]
    fn rejects_wrong_namespace() {
        let doc = parse(br#"<Invoice xmlns="urn:something:else"/>"#).unwrap();
        assert!(matches!(
            classify(&doc),
            Err(ExtractionError::UnknownFormat(_))
        ));
    }

    #[test]
    fn rejects_unknown_root() {
        let doc = parse(br#"<Order xmlns="urn:x"/>"#).unwrap();
        assert!(classify(&doc).is_err());
    }
}
