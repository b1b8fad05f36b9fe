//! Path query toolkit over the parsed document tree.
//!
//! Queries are slash-separated `prefix:LocalName` segments resolved against a
//! namespace map; a trailing `@name` segment selects an attribute. When more
//! than one node matches, the first in document order wins.
//!
//! Mandatory lookups (`require_*`) fail with a [`MappingError`] carrying the
//! query; optional decimals that are present but unparsable return `None` and
//! report a WARNING finding through the caller's sink.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::dom::XmlElement;
use crate::error::MappingError;
use crate::report::{codes, Finding};

/// Prefix → namespace URI bindings for one vocabulary.
pub type Nsmap = &'static [(&'static str, &'static str)];

fn resolve(ns: Nsmap, prefix: &str) -> Option<&'static str> {
    ns.iter().find(|(p, _)| *p == prefix).map(|(_, uri)| *uri)
}

enum Segment<'q> {
    Element { prefix: &'q str, local: &'q str },
    Attribute(&'q str),
}

fn compile<'q>(query: &'q str) -> Vec<Segment<'q>> {
    query
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|seg| {
            if let Some(attr) = seg.strip_prefix('@') {
                Segment::Attribute(attr)
            } else {
                match seg.split_once(':') {
                    Some((prefix, local)) => Segment::Element { prefix, local },
                    None => Segment::Element {
                        prefix: "",
                        local: seg,
                    },
                }
            }
        })
        .collect()
}

fn matches(child: &XmlElement, seg: &Segment<'_>, ns: Nsmap) -> bool {
    match seg {
        Segment::Element { prefix, local } => {
            child.name == *local
                && if prefix.is_empty() {
                    child.namespace.is_none()
                } else {
                    resolve(ns, prefix) == child.namespace.as_deref()
                }
        }
        Segment::Attribute(_) => false,
    }
}

fn collect<'a>(
    el: &'a XmlElement,
    segs: &[Segment<'_>],
    ns: Nsmap,
    out: &mut Vec<&'a XmlElement>,
) {
    let Some(seg) = segs.first() else {
        out.push(el);
        return;
    };
    for child in &el.children {
        if matches(child, seg, ns) {
            collect(child, &segs[1..], ns, out);
        }
    }
}

/// All elements matching the element path of `query`, in document order.
/// The query must not end in an attribute segment.
pub fn find_all<'a>(el: &'a XmlElement, query: &str, ns: Nsmap) -> Vec<&'a XmlElement> {
    let segs = compile(query);
    let mut out = Vec::new();
    collect(el, &segs, ns, &mut out);
    out
}

/// First element matching `query`, in document order.
pub fn find<'a>(el: &'a XmlElement, query: &str, ns: Nsmap) -> Option<&'a XmlElement> {
    find_all(el, query, ns).into_iter().next()
}

/// Scalar text at `query` (element text or attribute value), trimmed;
/// `None` when absent or empty.
pub fn text(el: &XmlElement, query: &str, ns: Nsmap) -> Option<String> {
    let segs = compile(query);
    let (el_segs, attr) = match segs.last() {
        Some(Segment::Attribute(name)) => (&segs[..segs.len() - 1], Some(*name)),
        _ => (&segs[..], None),
    };

    let mut found = Vec::new();
    collect(el, el_segs, ns, &mut found);
    let target = found.into_iter().next()?;

    match attr {
        Some(name) => target
            .attr(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned),
        None => target.non_empty_text().map(str::to_owned),
    }
}

/// Like [`text`], but absence is a mapping failure.
pub fn require_text(el: &XmlElement, query: &str, ns: Nsmap) -> Result<String, MappingError> {
    text(el, query, ns).ok_or_else(|| MappingError::field_missing(query))
}

/// Optional decimal. A present but unparsable value reports a WARNING into
/// `sink` and yields `None`.
pub fn decimal(
    el: &XmlElement,
    query: &str,
    ns: Nsmap,
    sink: &mut Vec<Finding>,
) -> Option<Decimal> {
    let raw = text(el, query, ns)?;
    match raw.parse::<Decimal>() {
        Ok(d) => Some(d),
        Err(_) => {
            sink.push(
                Finding::warning(
                    codes::MAP_INVALID_VALUE,
                    format!("ignoring unparsable decimal '{raw}'"),
                )
                .at(MappingError::field_missing(query).path().to_owned()),
            );
            None
        }
    }
}

/// Mandatory decimal; strict — absence and unparsable values both fail.
pub fn require_decimal(el: &XmlElement, query: &str, ns: Nsmap) -> Result<Decimal, MappingError> {
    let raw = require_text(el, query, ns)?;
    raw.parse::<Decimal>()
        .map_err(|_| MappingError::invalid_value(query, format!("'{raw}' is not a number")))
}

/// Accepts the two date shapes found in CII and UBL invoices:
/// basic `YYYYMMDD` (CII format code 102) and extended `YYYY-MM-DD` (UBL).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

/// Mandatory date in either accepted shape.
pub fn require_date(el: &XmlElement, query: &str, ns: Nsmap) -> Result<NaiveDate, MappingError> {
    let raw = require_text(el, query, ns)?;
    parse_date(&raw)
        .ok_or_else(|| MappingError::invalid_value(query, format!("'{raw}' is not a date")))
}

/// Optional date; unparsable values are dropped with a WARNING.
pub fn date(
    el: &XmlElement,
    query: &str,
    ns: Nsmap,
    sink: &mut Vec<Finding>,
) -> Option<NaiveDate> {
    let raw = text(el, query, ns)?;
    match parse_date(&raw) {
        Some(d) => Some(d),
        None => {
            sink.push(
                Finding::warning(
                    codes::MAP_INVALID_VALUE,
                    format!("ignoring unparsable date '{raw}'"),
                )
                .at(MappingError::field_missing(query).path().to_owned()),
            );
            None
        }
    }
}
