//! Findings, steps and the aggregate validation report.
//!
//! A report is an append-only sequence of [`ValidationStep`]s, one per
//! pipeline stage. Findings carry a code from the closed catalogue in
//! [`codes`]; free-form text never outranks the code.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of a single finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

/// Outcome of one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    Success,
    Warnings,
    Errors,
    Fatal,
    Skipped,
}

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    Extraction,
    Mapping,
    Structure,
    Semantic,
    Calculation,
    Business,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Extraction => "format_detection",
            Self::Mapping => "canonical_mapping",
            Self::Structure => "structure_validation",
            Self::Semantic => "semantic_validation",
            Self::Calculation => "calculation_validation",
            Self::Business => "business_validation",
        }
    }

    /// All stages in execution order.
    pub fn all() -> [Stage; 6] {
        [
            Self::Extraction,
            Self::Mapping,
            Self::Structure,
            Self::Semantic,
            Self::Calculation,
            Self::Business,
        ]
    }

    /// Validation level reached when this stage has executed.
    pub fn level(&self) -> ValidationLevel {
        match self {
            Self::Extraction | Self::Mapping => ValidationLevel::None,
            Self::Structure => ValidationLevel::Structure,
            Self::Semantic => ValidationLevel::Semantic,
            Self::Calculation => ValidationLevel::Calculation,
            Self::Business => ValidationLevel::Business,
        }
    }
}

/// Highest validation level a transaction has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValidationLevel {
    None,
    Structure,
    Semantic,
    Calculation,
    Business,
}

impl ValidationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Structure => "STRUCTURE",
            Self::Semantic => "SEMANTIC",
            Self::Calculation => "CALCULATION",
            Self::Business => "BUSINESS",
        }
    }
}

/// A single validation finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    /// Code from the closed catalogue in [`codes`] (Schematron rule ids are
    /// prefixed with `SCHEMATRON_`).
    pub code: String,
    pub message: String,
    /// XPath or field path locating the finding in the source document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

impl Finding {
    pub fn new(severity: Severity, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.into(),
            message: message.into(),
            location: None,
            expected: None,
            actual: None,
        }
    }

    pub fn info(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, code, message)
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    pub fn fatal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, code, message)
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_values(mut self, expected: impl ToString, actual: impl ToString) -> Self {
        self.expected = Some(expected.to_string());
        self.actual = Some(actual.to_string());
        self
    }
}

/// One executed (or skipped) pipeline stage with its findings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationStep {
    pub stage: Stage,
    pub outcome: StepOutcome,
    pub findings: Vec<Finding>,
}

impl ValidationStep {
    /// Build a step whose outcome is derived from the worst finding severity.
    pub fn from_findings(stage: Stage, findings: Vec<Finding>) -> Self {
        let outcome = match findings.iter().map(|f| f.severity).max() {
            Some(Severity::Fatal) => StepOutcome::Fatal,
            Some(Severity::Error) => StepOutcome::Errors,
            Some(Severity::Warning) => StepOutcome::Warnings,
            _ => StepOutcome::Success,
        };
        Self {
            stage,
            outcome,
            findings,
        }
    }

    pub fn skipped(stage: Stage, reason: Finding) -> Self {
        Self {
            stage,
            outcome: StepOutcome::Skipped,
            findings: vec![reason],
        }
    }
}

/// Aggregate outcome of one processing run. Append-only within the run;
/// persisted exactly once, atomically with the terminal status change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub transaction_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_format: Option<String>,
    pub steps: Vec<ValidationStep>,
}

impl ValidationReport {
    pub fn new(transaction_id: Uuid) -> Self {
        Self {
            transaction_id,
            invoice_number: None,
            detected_format: None,
            steps: Vec::new(),
        }
    }

    pub fn push(&mut self, step: ValidationStep) {
        self.steps.push(step);
    }

    /// Mark every not-yet-run stage after `after` as skipped, linking back to
    /// the stage that caused the short-circuit.
    pub fn skip_remaining(&mut self, after: Stage) {
        for stage in Stage::all() {
            if stage > after && !self.steps.iter().any(|s| s.stage == stage) {
                self.push(ValidationStep::skipped(
                    stage,
                    Finding::info(
                        codes::STAGE_SKIPPED,
                        format!("skipped after fatal outcome in {}", after.name()),
                    ),
                ));
            }
        }
    }

    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.steps.iter().flat_map(|s| s.findings.iter())
    }

    pub fn has_fatal(&self) -> bool {
        self.findings().any(|f| f.severity == Severity::Fatal)
    }

    pub fn has_errors(&self) -> bool {
        self.findings().any(|f| f.severity == Severity::Error)
    }

    /// Highest validation level among stages that actually executed.
    pub fn level_reached(&self) -> ValidationLevel {
        self.steps
            .iter()
            .filter(|s| s.outcome != StepOutcome::Skipped)
            .map(|s| s.stage.level())
            .max()
            .unwrap_or(ValidationLevel::None)
    }
}

/// Closed catalogue of finding codes.
pub mod codes {
    pub const XSD_VIOLATION: &str = "XSD_VIOLATION";
    pub const MAP_FIELD_MISSING: &str = "MAP_FIELD_MISSING";
    pub const MAP_INVALID_VALUE: &str = "MAP_INVALID_VALUE";
    pub const MAP_FORMAT_MISMATCH: &str = "MAP_FORMAT_MISMATCH";
    /// Prefix for Schematron rule ids (`SCHEMATRON_<rule-id>`).
    pub const SCHEMATRON_PREFIX: &str = "SCHEMATRON_";
    pub const SCHEMATRON_SKIPPED: &str = "SCHEMATRON_SKIPPED";
    pub const CALC_TOTAL_MISMATCH: &str = "CALC_TOTAL_MISMATCH";
    pub const CALC_TAX_MISMATCH: &str = "CALC_TAX_MISMATCH";
    pub const CALC_PAYABLE_MISMATCH: &str = "CALC_PAYABLE_MISMATCH";
    pub const ERP_VENDOR_UNKNOWN: &str = "ERP_VENDOR_UNKNOWN";
    pub const ERP_VENDOR_INACTIVE: &str = "ERP_VENDOR_INACTIVE";
    pub const ERP_DUPLICATE: &str = "ERP_DUPLICATE";
    pub const ERP_BANK_MISMATCH: &str = "ERP_BANK_MISMATCH";
    pub const ERP_PO_UNKNOWN: &str = "ERP_PO_UNKNOWN";
    pub const ERP_PO_CLOSED: &str = "ERP_PO_CLOSED";
    pub const ERP_PO_OVERBILL: &str = "ERP_PO_OVERBILL";
    pub const ERP_PO_PARTIAL: &str = "ERP_PO_PARTIAL";
    pub const ERP_PO_NONE: &str = "ERP_PO_NONE";
    pub const ERP_LINE_UNKNOWN: &str = "ERP_LINE_UNKNOWN";
    pub const ERP_QTY_EXCEEDED: &str = "ERP_QTY_EXCEEDED";
    pub const ERP_LINE_UNIDENTIFIED: &str = "ERP_LINE_UNIDENTIFIED";
    pub const IBAN_INVALID: &str = "IBAN_INVALID";
    pub const IBAN_UNKNOWN_COUNTRY: &str = "IBAN_UNKNOWN_COUNTRY";
    pub const VAT_PREFIX_UNKNOWN: &str = "VAT_PREFIX_UNKNOWN";
    pub const CARRIER_OPAQUE_PDF: &str = "CARRIER_OPAQUE_PDF";
    pub const CARRIER_UNSUPPORTED: &str = "CARRIER_UNSUPPORTED";
    pub const STAGE_SKIPPED: &str = "STAGE_SKIPPED";
}
