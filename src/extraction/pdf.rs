//! Embedded invoice XML extraction from PDF/A-3 carriers.
//!
//! Walks the document catalogue's `Names/EmbeddedFiles` name tree and the
//! catalogue and page `/AF` arrays, looking for a file specification whose
//! name matches one of the standardised attachment names. Traversal is
//! bounded (recursion depth 8, at most 32 file specifications examined) so a
//! hostile PDF cannot drive the scanner into pathological object graphs. No
//! stream other than the matched attachment is ever decoded.

use lopdf::{Dictionary, Document, Object};
use tracing::debug;

use crate::error::ExtractionError;

/// Hybrid carrier kind, derived from the attachment filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddedInvoiceKind {
    /// `zugferd-invoice.xml` or `xrechnung.xml`.
    Zugferd,
    /// `factur-x.xml`.
    FacturX,
}

const MAX_TREE_DEPTH: usize = 8;
const MAX_FILESPECS: usize = 32;

/// Extract the embedded invoice XML from a PDF byte stream.
///
/// Returns `Ok(None)` for a structurally valid PDF that simply carries no
/// recognised invoice attachment — that is a routing outcome, not an error.
pub fn extract_embedded_xml(
    pdf_bytes: &[u8],
) -> Result<Option<(EmbeddedInvoiceKind, Vec<u8>)>, ExtractionError> {
    let doc = Document::load_mem(pdf_bytes).map_err(|e| {
        if looks_truncated(pdf_bytes) {
            ExtractionError::TruncatedPdf(e.to_string())
        } else {
            ExtractionError::MalformedPdf(e.to_string())
        }
    })?;

    let mut scanner = Scanner {
        doc: &doc,
        filespecs_examined: 0,
    };

    if let Some(hit) = scanner.scan_name_tree()? {
        return Ok(Some(hit));
    }
    scanner.scan_af_arrays()
}

/// A PDF without the trailing `%%EOF` marker was most likely cut off in
/// transfer; the driver treats that as retryable.
fn looks_truncated(bytes: &[u8]) -> bool {
    let tail_len = bytes.len().min(2048);
    let tail = &bytes[bytes.len() - tail_len..];
    !tail.windows(5).any(|w| w == b"%%EOF")
}

struct Scanner<'a> {
    doc: &'a Document,
    filespecs_examined: usize,
}

impl<'a> Scanner<'a> {
    fn scan_name_tree(
        &mut self,
    ) -> Result<Option<(EmbeddedInvoiceKind, Vec<u8>)>, ExtractionError> {
        let Ok(catalog) = self.doc.catalog() else {
            return Ok(None);
        };
        let Some(names) = catalog.get(b"Names").ok().and_then(|o| self.as_dict(o)) else {
            return Ok(None);
        };
        let Some(embedded) = names
            .get(b"EmbeddedFiles")
            .ok()
            .and_then(|o| self.as_dict(o))
        else {
            return Ok(None);
        };
        self.walk_name_tree(embedded, 0)
    }

    /// A name tree node either carries `Names` ([key, value, ...]) directly
    /// or delegates to child nodes via `Kids`.
    fn walk_name_tree(
        &mut self,
        node: &'a Dictionary,
        depth: usize,
    ) -> Result<Option<(EmbeddedInvoiceKind, Vec<u8>)>, ExtractionError> {
        if depth >= MAX_TREE_DEPTH {
            debug!("embedded-files name tree deeper than {MAX_TREE_DEPTH}, stopping");
            return Ok(None);
        }

        if let Some(pairs) = node.get(b"Names").ok().and_then(|o| o.as_array().ok()) {
            for chunk in pairs.chunks(2) {
                let [name_obj, spec_obj] = chunk else { continue };
                if self.over_budget() {
                    return Ok(None);
                }
                self.filespecs_examined += 1;

                let tree_name = string_value(name_obj).unwrap_or_default();
                if let Some(spec) = self.as_dict(spec_obj) {
                    if let Some(hit) = self.try_filespec(spec, Some(&tree_name))? {
                        return Ok(Some(hit));
                    }
                }
            }
        }

        if let Some(kids) = node.get(b"Kids").ok().and_then(|o| o.as_array().ok()) {
            for kid in kids {
                if let Some(kid_dict) = self.as_dict(kid) {
                    if let Some(hit) = self.walk_name_tree(kid_dict, depth + 1)? {
                        return Ok(Some(hit));
                    }
                }
            }
        }

        Ok(None)
    }

    fn scan_af_arrays(
        &mut self,
    ) -> Result<Option<(EmbeddedInvoiceKind, Vec<u8>)>, ExtractionError> {
        if let Ok(catalog) = self.doc.catalog() {
            if let Some(hit) = self.scan_af_of(catalog)? {
                return Ok(Some(hit));
            }
        }
        for page_id in self.doc.page_iter() {
            let Ok(page) = self.doc.get_dictionary(page_id) else {
                continue;
            };
            if let Some(hit) = self.scan_af_of(page)? {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }

    fn scan_af_of(
        &mut self,
        dict: &'a Dictionary,
    ) -> Result<Option<(EmbeddedInvoiceKind, Vec<u8>)>, ExtractionError> {
        let Some(af) = dict.get(b"AF").ok().and_then(|o| self.as_array(o)) else {
            return Ok(None);
        };
        for entry in af {
            if self.over_budget() {
                return Ok(None);
            }
            self.filespecs_examined += 1;
            if let Some(spec) = self.as_dict(entry) {
                if let Some(hit) = self.try_filespec(spec, None)? {
                    return Ok(Some(hit));
                }
            }
        }
        Ok(None)
    }

    /// Check one file specification; extract the stream on a filename match.
    fn try_filespec(
        &self,
        spec: &'a Dictionary,
        tree_name: Option<&str>,
    ) -> Result<Option<(EmbeddedInvoiceKind, Vec<u8>)>, ExtractionError> {
        let spec_name = spec
            .get(b"UF")
            .or_else(|_| spec.get(b"F"))
            .ok()
            .and_then(string_value);

        let kind = tree_name
            .and_then(classify_filename)
            .or_else(|| spec_name.as_deref().and_then(classify_filename));
        let Some(kind) = kind else {
            return Ok(None);
        };

        let Some(ef) = spec.get(b"EF").ok().and_then(|o| self.as_dict(o)) else {
            return Ok(None);
        };
        let Some(stream_obj) = ef
            .get(b"F")
            .or_else(|_| ef.get(b"UF"))
            .ok()
            .map(|o| self.resolve(o))
        else {
            return Ok(None);
        };
        let stream = stream_obj
            .as_stream()
            .map_err(|e| ExtractionError::MalformedPdf(format!("embedded file: {e}")))?;

        // decompressed_content fails on unfiltered streams; fall back to the
        // raw bytes in that case.
        let content = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        Ok(Some((kind, content)))
    }

    fn over_budget(&self) -> bool {
        self.filespecs_examined >= MAX_FILESPECS
    }

    fn resolve(&self, obj: &'a Object) -> &'a Object {
        match obj {
            Object::Reference(id) => self.doc.get_object(*id).unwrap_or(obj),
            other => other,
        }
    }

    fn as_dict(&self, obj: &'a Object) -> Option<&'a Dictionary> {
        match self.resolve(obj) {
            Object::Dictionary(d) => Some(d),
            Object::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    fn as_array(&self, obj: &'a Object) -> Option<&'a Vec<Object>> {
        self.resolve(obj).as_array().ok()
    }
}

/// Match a candidate attachment name against the standardised set.
/// `order-x.xml` names an order document, not an invoice, and is skipped.
fn classify_filename(name: &str) -> Option<EmbeddedInvoiceKind> {
    let lower = name.trim().to_ascii_lowercase();
    match lower.as_str() {
        "factur-x.xml" => Some(EmbeddedInvoiceKind::FacturX),
        "zugferd-invoice.xml" | "xrechnung.xml" => Some(EmbeddedInvoiceKind::Zugferd),
        _ => None,
    }
}

fn string_value(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => Some(String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}
