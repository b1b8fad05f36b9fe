//! Carrier routing: from a raw upload to a normalised XML document.
//!
//! Sniffs the first bytes to decide between the PDF path (attachment
//! extraction) and the XML path (direct classification), and tags the result
//! with the declared format the rest of the pipeline records.

pub mod pdf;
pub mod xml;

use tracing::{info, warn};

use crate::error::ExtractionError;
use crate::mapping::dom::{self, XmlElement};
pub use pdf::EmbeddedInvoiceKind;
pub use xml::XmlSyntax;

/// How the invoice arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Carrier {
    Xml,
    Pdf,
}

/// Declared format tag recorded on the transaction. For hybrid carriers it is
/// derived from the attachment naming, for pure XML from the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedFormat {
    XrechnungUbl,
    XrechnungCii,
    ZugferdCii,
    FacturxCii,
    OtherPdf,
}

impl DetectedFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::XrechnungUbl => "XRECHNUNG_UBL",
            Self::XrechnungCii => "XRECHNUNG_CII",
            Self::ZugferdCii => "ZUGFERD_CII",
            Self::FacturxCii => "FACTURX_CII",
            Self::OtherPdf => "OTHER_PDF",
        }
    }

    /// Syntax this format tag claims the payload uses.
    pub fn expected_syntax(&self) -> Option<XmlSyntax> {
        match self {
            Self::XrechnungUbl => Some(XmlSyntax::UblInvoice),
            Self::XrechnungCii | Self::ZugferdCii | Self::FacturxCii => Some(XmlSyntax::Cii),
            Self::OtherPdf => None,
        }
    }
}

/// A successfully routed document: the normalised XML bytes, their parsed
/// root, the observed syntax, and the declared format tag.
#[derive(Debug)]
pub struct RoutedDocument {
    pub carrier: Carrier,
    pub syntax: XmlSyntax,
    pub declared: DetectedFormat,
    pub xml: Vec<u8>,
    pub root: XmlElement,
}

/// Routing outcome. An opaque PDF (no embedded invoice XML) is a legitimate
/// result that the driver turns into MANUAL_REVIEW, not an error.
#[derive(Debug)]
pub enum Routed {
    Document(RoutedDocument),
    OpaquePdf,
}

/// Route a raw upload. The MIME hint is advisory only — detection always
/// sniffs the payload.
pub fn route(raw: &[u8], mime_hint: Option<&str>) -> Result<Routed, ExtractionError> {
    let body = sniffable(raw);

    if body.starts_with(b"%PDF-") {
        if let Some(hint) = mime_hint {
            if hint.contains("xml") {
                warn!(hint, "MIME hint disagrees with PDF payload, trusting the payload");
            }
        }
        return route_pdf(raw);
    }

    if body.starts_with(b"<") {
        let root = dom::parse(raw).map_err(|e| ExtractionError::MalformedXml(e.to_string()))?;
        let syntax = xml::classify(&root)?;
        let declared = if syntax.is_ubl() {
            DetectedFormat::XrechnungUbl
        } else {
            DetectedFormat::XrechnungCii
        };
        info!(format = declared.as_str(), "recognised pure XML invoice");
        return Ok(Routed::Document(RoutedDocument {
            carrier: Carrier::Xml,
            syntax,
            declared,
            xml: raw.to_vec(),
            root,
        }));
    }

    Err(ExtractionError::UnsupportedCarrier(format!(
        "payload starts with {:02x?}, neither PDF nor XML",
        &body[..body.len().min(8)]
    )))
}

fn route_pdf(raw: &[u8]) -> Result<Routed, ExtractionError> {
    match pdf::extract_embedded_xml(raw)? {
        Some((kind, xml_bytes)) => {
            let declared = match kind {
                EmbeddedInvoiceKind::FacturX => DetectedFormat::FacturxCii,
                EmbeddedInvoiceKind::Zugferd => DetectedFormat::ZugferdCii,
            };
            let root = match dom::parse(&xml_bytes) {
                Ok(root) => root,
                Err(e) => {
                    // The carrier is a PDF, but its attachment is unusable
                    // for automation. Route to a human.
                    warn!(error = %e, "embedded attachment is not well-formed XML");
                    return Ok(Routed::OpaquePdf);
                }
            };
            let syntax = xml::classify(&root)?;
            info!(format = declared.as_str(), "extracted embedded invoice XML from PDF");
            Ok(Routed::Document(RoutedDocument {
                carrier: Carrier::Pdf,
                syntax,
                declared,
                xml: xml_bytes,
                root,
            }))
        }
        None => {
            info!("PDF carries no recognised invoice attachment");
            Ok(Routed::OpaquePdf)
        }
    }
}

/// Skip a UTF-8 BOM and leading whitespace for sniffing.
fn sniffable(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(raw);
    let start = raw
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(raw.len());
    &raw[start..]
}
