//! Error taxonomy for the processing pipeline.
//!
//! Two families matter to the driver: **transient** failures (I/O, database,
//! subprocess) are retried with backoff and end in `ERROR` once retries are
//! exhausted; **permanent** failures (unparseable carrier, missing mandatory
//! field) become FATAL findings and a terminal `INVALID`.

use std::time::Duration;

use thiserror::Error;

use crate::report::codes;

/// Mapping failure: a mandatory field is missing or a value cannot be
/// interpreted. Always permanent.
#[derive(Debug, Clone, Error)]
pub enum MappingError {
    /// A mandatory field was absent or empty. Carries the field path with
    /// namespace prefixes stripped.
    #[error("mandatory field missing: {0}")]
    FieldMissing(String),

    /// A present value could not be interpreted (non-numeric decimal,
    /// malformed date, zero base quantity, unknown code).
    #[error("invalid value at {path}: {detail}")]
    InvalidValue { path: String, detail: String },
}

impl MappingError {
    pub fn field_missing(query: &str) -> Self {
        Self::FieldMissing(strip_prefixes(query))
    }

    pub fn invalid_value(query: &str, detail: impl Into<String>) -> Self {
        Self::InvalidValue {
            path: strip_prefixes(query),
            detail: detail.into(),
        }
    }

    /// Field path the error points at.
    pub fn path(&self) -> &str {
        match self {
            Self::FieldMissing(path) => path,
            Self::InvalidValue { path, .. } => path,
        }
    }

    /// Finding code for this error class.
    pub fn code(&self) -> &'static str {
        match self {
            Self::FieldMissing(_) => codes::MAP_FIELD_MISSING,
            Self::InvalidValue { .. } => codes::MAP_INVALID_VALUE,
        }
    }
}

/// Turn a `prefix:LocalName/prefix:LocalName` query into the plain element
/// path used in findings (`ExchangedDocument/IssueDateTime/DateTimeString`).
fn strip_prefixes(query: &str) -> String {
    query
        .split('/')
        .map(|seg| {
            let seg = seg.strip_prefix('@').unwrap_or(seg);
            seg.rsplit(':').next().unwrap_or(seg)
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Extraction failure while routing the raw upload.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The upload is neither a PDF nor XML. Permanent.
    #[error("unsupported carrier: {0}")]
    UnsupportedCarrier(String),

    /// The PDF byte stream appears cut off; the blob may not have been
    /// transferred completely. Transient.
    #[error("truncated PDF stream: {0}")]
    TruncatedPdf(String),

    /// Structurally broken PDF. Permanent.
    #[error("malformed PDF: {0}")]
    MalformedPdf(String),

    /// The bytes look like XML but do not parse. Permanent.
    #[error("malformed XML: {0}")]
    MalformedXml(String),

    /// Well-formed XML whose root element is not one of the EN 16931
    /// syntaxes. Permanent.
    #[error("unrecognised XML root: {0}")]
    UnknownFormat(String),
}

/// Top-level pipeline error seen by the driver.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("blob not found: {0}")]
    BlobMissing(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("metadata store failure: {0}")]
    Metadata(#[from] crate::persistence::StoreError),

    #[error("ERP query failure: {0}")]
    Erp(#[from] crate::erp::ErpError),

    #[error("validator subprocess failure: {0}")]
    Subprocess(String),

    #[error("transaction timed out after {0:?}")]
    TaskTimeout(Duration),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Mapping(#[from] MappingError),
}

impl PipelineError {
    /// Transient errors are retried with backoff; everything else terminates
    /// the transaction immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Storage(_)
            | Self::Metadata(_)
            | Self::Erp(_)
            | Self::Subprocess(_)
            | Self::TaskTimeout(_) => true,
            Self::Extraction(ExtractionError::TruncatedPdf(_)) => true,
            Self::BlobMissing(_) | Self::Extraction(_) | Self::Mapping(_) => false,
        }
    }
}
