//! Dual-syntax mapping onto the canonical invoice model.
//!
//! The orchestrator dispatches on the observed syntax, cross-checks it
//! against the declared format tag, and translates mapper faults into
//! structured FATAL findings — callers never see a raw [`MappingError`].

pub mod cii;
pub mod dom;
pub mod ubl;
pub mod xpath;

use tracing::warn;

use crate::core::countries::vat_country_prefix;
use crate::core::iban::{self, IbanStatus};
use crate::core::CanonicalInvoice;
use crate::extraction::RoutedDocument;
use crate::report::{codes, Finding};

/// Result of the mapping stage: either a canonical invoice plus the warnings
/// collected on the way, or the findings describing why mapping failed.
#[derive(Debug)]
pub enum MappingOutcome {
    Mapped {
        invoice: Box<CanonicalInvoice>,
        findings: Vec<Finding>,
    },
    Failed {
        findings: Vec<Finding>,
    },
}

/// Map a routed document into the canonical model.
pub fn map_document(doc: &RoutedDocument) -> MappingOutcome {
    let mut findings = Vec::new();

    // The upload's declared format may disagree with what the XML actually
    // is; the observed syntax wins.
    if let Some(expected) = doc.declared.expected_syntax() {
        if expected.is_ubl() != doc.syntax.is_ubl() {
            warn!(
                declared = doc.declared.as_str(),
                observed = doc.syntax.as_str(),
                "declared format disagrees with observed syntax"
            );
            findings.push(Finding::warning(
                codes::MAP_FORMAT_MISMATCH,
                format!(
                    "declared format {} but document uses {} syntax, proceeding with the observed syntax",
                    doc.declared.as_str(),
                    doc.syntax.as_str()
                ),
            ));
        }
    }

    let mapped = if doc.syntax.is_ubl() {
        ubl::map_ubl(&doc.root, doc.syntax, &mut findings)
    } else {
        cii::map_cii(&doc.root, &mut findings)
    };

    match mapped {
        Ok(invoice) => {
            collect_plausibility_findings(&invoice, &mut findings);
            MappingOutcome::Mapped {
                invoice: Box::new(invoice),
                findings,
            }
        }
        Err(err) => {
            findings.push(
                Finding::fatal(err.code(), err.to_string()).at(err.path().to_owned()),
            );
            MappingOutcome::Failed { findings }
        }
    }
}

/// Syntax-independent checks on the mapped invoice: VAT-id country prefixes
/// and IBAN verification. Warnings and errors, never fatal.
fn collect_plausibility_findings(invoice: &CanonicalInvoice, sink: &mut Vec<Finding>) {
    for (role, party) in [("seller", &invoice.seller), ("buyer", &invoice.buyer)] {
        if let Some(vat_id) = &party.vat_id {
            if vat_country_prefix(vat_id).is_none() {
                sink.push(
                    Finding::warning(
                        codes::VAT_PREFIX_UNKNOWN,
                        format!("VAT id '{vat_id}' does not start with a known country prefix"),
                    )
                    .at(format!("{role}.vat_id")),
                );
            }
        }
    }

    for (i, bank) in invoice.payment_details.iter().enumerate() {
        let location = format!("payment_details[{i}].iban");
        match iban::check(&bank.iban) {
            IbanStatus::Valid => {}
            IbanStatus::UnknownCountry => sink.push(
                Finding::warning(
                    codes::IBAN_UNKNOWN_COUNTRY,
                    format!("IBAN '{}' has an unknown country prefix", bank.iban),
                )
                .at(location),
            ),
            IbanStatus::InvalidFormat | IbanStatus::InvalidChecksum => sink.push(
                Finding::error(
                    codes::IBAN_INVALID,
                    format!("IBAN '{}' fails verification", bank.iban),
                )
                .at(location),
            ),
        }
    }
}
