//! Minimal namespace-aware document tree over quick-xml.
//!
//! The mappers need random access along element paths (the field contracts
//! are expressed as paths, and mandatory-field errors must carry them), so
//! the streaming events are folded into a small tree first.
//!
//! Hardening: documents carrying a DOCTYPE are rejected outright — no DTD is
//! ever loaded and no entity beyond the XML built-ins is resolved, which
//! closes the XXE class entirely.

use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("XML syntax error: {0}")]
    Syntax(String),

    #[error("DOCTYPE declarations are not allowed")]
    DtdForbidden,

    #[error("document has no root element")]
    NoRoot,
}

/// One element of the parsed document.
#[derive(Debug, Clone)]
pub struct XmlElement {
    /// Local name without prefix.
    pub name: String,
    /// Resolved namespace URI, if the element is in a namespace.
    pub namespace: Option<String>,
    /// Attributes as (local name, value); attribute namespaces are dropped
    /// since the invoice vocabularies only use unprefixed attributes.
    pub attributes: Vec<(String, String)>,
    /// Concatenated direct text content, trimmed.
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Trimmed text content, `None` when empty.
    pub fn non_empty_text(&self) -> Option<&str> {
        let t = self.text.trim();
        (!t.is_empty()).then_some(t)
    }
}

/// Parse an XML byte stream into its root element.
pub fn parse(bytes: &[u8]) -> Result<XmlElement, XmlError> {
    let bytes = strip_bom(bytes);
    let mut reader = NsReader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let (resolve, event) = reader
            .read_resolved_event_into(&mut buf)
            .map_err(|e| XmlError::Syntax(e.to_string()))?;
        match event {
            Event::DocType(_) => return Err(XmlError::DtdForbidden),
            Event::Start(ref e) => {
                let el = element_from_start(&resolve, e)?;
                stack.push(el);
            }
            Event::Empty(ref e) => {
                let el = element_from_start(&resolve, e)?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::Text(ref t) => {
                if let Some(parent) = stack.last_mut() {
                    let text = t
                        .unescape()
                        .map_err(|e| XmlError::Syntax(e.to_string()))?;
                    parent.text.push_str(&text);
                }
            }
            Event::CData(ref t) => {
                if let Some(parent) = stack.last_mut() {
                    parent
                        .text
                        .push_str(&String::from_utf8_lossy(t.as_ref()));
                }
            }
            Event::End(_) => {
                let el = stack.pop().ok_or_else(|| {
                    XmlError::Syntax("unbalanced end tag".into())
                })?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(XmlError::Syntax("unexpected end of document".into()));
    }
    root.ok_or(XmlError::NoRoot)
}

fn element_from_start(
    resolve: &ResolveResult,
    e: &quick_xml::events::BytesStart<'_>,
) -> Result<XmlElement, XmlError> {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let namespace = match resolve {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
        _ => None,
    };

    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| XmlError::Syntax(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        // xmlns declarations are namespace machinery, not data.
        if key == "xmlns" || attr.key.as_ref().starts_with(b"xmlns:") {
            continue;
        }
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError::Syntax(e.to_string()))?
            .into_owned();
        attributes.push((key, value));
    }

    Ok(XmlElement {
        name,
        namespace,
        attributes,
        text: String::new(),
        children: Vec::new(),
    })
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    el: XmlElement,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(el);
            Ok(())
        }
        None => {
            if root.is_some() {
                return Err(XmlError::Syntax("multiple root elements".into()));
            }
            *root = Some(el);
            Ok(())
        }
    }
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)
}
