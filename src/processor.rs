//! The per-transaction driver.
//!
//! Claims the transaction row, runs the stages in order, classifies failures
//! into transient (retry with backoff) and permanent (terminal status from
//! the findings), and persists the report atomically with the terminal
//! status. Safe to replay: the claim protocol makes every re-delivery after
//! a terminal state a no-op.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::RetryPolicy;
use crate::erp::ErpAdapter;
use crate::error::{ExtractionError, PipelineError};
use crate::extraction::{self, Routed};
use crate::mapping::{self, MappingOutcome};
use crate::persistence::{
    InvoiceTransaction, KeyFields, MetadataStore, TerminalOutcome, TransactionStatus,
};
use crate::report::{codes, Finding, Stage, ValidationReport, ValidationStep};
use crate::storage::{BlobStore, StorageError};
use crate::validation::business::{validate_business, BusinessCheck};
use crate::validation::calculation::validate_calculations;
use crate::validation::semantic::SemanticValidator;
use crate::validation::structure::validate_structure;
use crate::worker::backoff_delay;

/// What one delivery of a transaction id amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Terminal status reached and persisted.
    Completed(TransactionStatus),
    /// The row was not claimable: another worker holds it or it is already
    /// terminal. Not an error under at-least-once delivery.
    NotClaimed,
    /// Unknown transaction id.
    NotFound,
    /// Transient failure, row released for a later attempt.
    Retrying { attempt: u32, delay: Duration },
    /// Retries exhausted (or a non-retryable internal failure): ERROR.
    Failed,
}

pub struct Processor {
    store: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    erp: Arc<dyn ErpAdapter>,
    semantic: SemanticValidator,
    retry: RetryPolicy,
    monetary_tolerance: Decimal,
    task_timeout: Duration,
}

impl Processor {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        erp: Arc<dyn ErpAdapter>,
        semantic: SemanticValidator,
        retry: RetryPolicy,
        monetary_tolerance: Decimal,
        task_timeout: Duration,
    ) -> Self {
        Self {
            store,
            blobs,
            erp,
            semantic,
            retry,
            monetary_tolerance,
            task_timeout,
        }
    }

    /// Entry point for one queue delivery.
    pub async fn process(&self, id: Uuid) -> Result<ProcessOutcome, crate::persistence::StoreError> {
        let Some(transaction) = self.store.load(id).await? else {
            warn!(%id, "transaction not found, dropping delivery");
            return Ok(ProcessOutcome::NotFound);
        };

        if !self.store.claim(id).await? {
            debug!(%id, status = transaction.status.as_str(), "claim lost, nothing to do");
            return Ok(ProcessOutcome::NotClaimed);
        }

        info!(%id, attempt = transaction.retry_count + 1, "processing claimed transaction");
        self.store
            .append_log(id, "processing", "started", "claimed for processing")
            .await?;

        let started = Instant::now();
        let result = match timeout(self.task_timeout, self.run_pipeline(&transaction)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::TaskTimeout(self.task_timeout)),
        };

        match result {
            Ok(mut outcome) => {
                outcome.duration_seconds = started.elapsed().as_secs_f64();
                let status = outcome.status;
                self.store.complete(id, &outcome).await?;
                self.store
                    .append_log(
                        id,
                        "processing",
                        "completed",
                        &format!("terminal status {}", status.as_str()),
                    )
                    .await?;
                info!(%id, status = status.as_str(), "transaction completed");
                Ok(ProcessOutcome::Completed(status))
            }
            Err(e) if e.is_transient() => {
                let prior_retries = transaction.retry_count.max(0) as u32;
                if prior_retries >= self.retry.max_attempts {
                    error!(%id, error = %e, "retries exhausted");
                    self.store.mark_failed(id, &e.to_string()).await?;
                    self.store
                        .append_log(
                            id,
                            "processing",
                            "failed",
                            &format!("retries exhausted: {e}"),
                        )
                        .await?;
                    return Ok(ProcessOutcome::Failed);
                }
                let delay = backoff_delay(prior_retries, &self.retry);
                let next_attempt_at = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
                warn!(%id, error = %e, delay_secs = delay.as_secs(), "transient failure, releasing for retry");
                self.store
                    .release_for_retry(id, next_attempt_at, &e.to_string())
                    .await?;
                self.store
                    .append_log(id, "processing", "retry", &e.to_string())
                    .await?;
                Ok(ProcessOutcome::Retrying {
                    attempt: prior_retries + 1,
                    delay,
                })
            }
            Err(e) => {
                // Permanent classes are folded into findings inside the
                // pipeline; anything arriving here is an internal failure.
                error!(%id, error = %e, "non-retryable pipeline failure");
                self.store.mark_failed(id, &e.to_string()).await?;
                self.store
                    .append_log(id, "processing", "failed", &e.to_string())
                    .await?;
                Ok(ProcessOutcome::Failed)
            }
        }
    }

    /// The stages, strictly in order. Returns the terminal outcome; only
    /// transient conditions escape as errors.
    async fn run_pipeline(
        &self,
        transaction: &InvoiceTransaction,
    ) -> Result<TerminalOutcome, PipelineError> {
        let id = transaction.id;
        let mut report = ValidationReport::new(id);

        let raw = self
            .blobs
            .get(&transaction.raw_blob_uri)
            .await
            .map_err(|e| match e {
                StorageError::NotFound(uri) => PipelineError::BlobMissing(uri),
                StorageError::Io(msg) => PipelineError::Storage(msg),
            })?;

        // --- Stage: extraction / format detection -----------------------
        let doc = match extraction::route(&raw, transaction.content_type.as_deref()) {
            Ok(Routed::Document(doc)) => doc,
            Ok(Routed::OpaquePdf) => {
                report.detected_format = Some("OTHER_PDF".into());
                let step = ValidationStep::from_findings(
                    Stage::Extraction,
                    vec![Finding::info(
                        codes::CARRIER_OPAQUE_PDF,
                        "PDF without embedded invoice XML, routing to manual review",
                    )],
                );
                self.log_step(id, &step).await?;
                report.push(step);
                report.skip_remaining(Stage::Extraction);
                return Ok(terminal(
                    TransactionStatus::ManualReview,
                    report,
                    KeyFields::default(),
                    None,
                ));
            }
            Err(e @ ExtractionError::TruncatedPdf(_)) => return Err(e.into()),
            Err(e) => {
                let finding = extraction_failure_finding(&e);
                let step = ValidationStep::from_findings(Stage::Extraction, vec![finding]);
                self.log_step(id, &step).await?;
                report.push(step);
                report.skip_remaining(Stage::Extraction);
                return Ok(terminal(
                    TransactionStatus::Invalid,
                    report,
                    KeyFields::default(),
                    None,
                ));
            }
        };

        report.detected_format = Some(doc.declared.as_str().to_owned());
        let step = ValidationStep::from_findings(Stage::Extraction, Vec::new());
        self.log_step(id, &step).await?;
        report.push(step);

        // Archive the normalised XML before validating anything — it is kept
        // for forensics even when the invoice ends up INVALID.
        let processed_uri = format!("processed/{id}.xml");
        self.blobs
            .put(&processed_uri, &doc.xml)
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        // --- Stage: canonical mapping -----------------------------------
        let (invoice, mapping_findings) = match mapping::map_document(&doc) {
            MappingOutcome::Mapped { invoice, findings } => (invoice, findings),
            MappingOutcome::Failed { findings } => {
                let step = ValidationStep::from_findings(Stage::Mapping, findings);
                self.log_step(id, &step).await?;
                report.push(step);
                report.skip_remaining(Stage::Mapping);
                return Ok(terminal(
                    TransactionStatus::Invalid,
                    report,
                    KeyFields::default(),
                    Some(processed_uri),
                ));
            }
        };
        report.invoice_number = Some(invoice.number.clone());
        let step = ValidationStep::from_findings(Stage::Mapping, mapping_findings);
        self.log_step(id, &step).await?;
        report.push(step);

        // --- Stage: structure -------------------------------------------
        let step = ValidationStep::from_findings(
            Stage::Structure,
            validate_structure(&doc.root, doc.syntax),
        );
        self.log_step(id, &step).await?;
        report.push(step);

        // --- Stage: semantic (KoSIT) ------------------------------------
        let step = self.semantic.validate(&doc.xml, id).await?;
        self.log_step(id, &step).await?;
        report.push(step);

        // --- Stage: arithmetic ------------------------------------------
        let step = ValidationStep::from_findings(
            Stage::Calculation,
            validate_calculations(&invoice, self.monetary_tolerance),
        );
        self.log_step(id, &step).await?;
        report.push(step);

        // --- Stage: business (ERP) --------------------------------------
        let mut check = validate_business(&invoice, self.erp.as_ref(), self.monetary_tolerance)
            .await?;
        let step = ValidationStep::from_findings(Stage::Business, std::mem::take(&mut check.findings));
        self.log_step(id, &step).await?;
        report.push(step);

        let status = if report.has_fatal() {
            TransactionStatus::Invalid
        } else if report.has_errors() {
            TransactionStatus::ManualReview
        } else {
            TransactionStatus::Valid
        };

        let key_fields = key_fields(&invoice, &check);
        Ok(terminal(status, report, key_fields, Some(processed_uri)))
    }

    async fn log_step(
        &self,
        id: Uuid,
        step: &ValidationStep,
    ) -> Result<(), crate::persistence::StoreError> {
        let status = match step.outcome {
            crate::report::StepOutcome::Success => "completed",
            crate::report::StepOutcome::Warnings => "completed_with_warnings",
            crate::report::StepOutcome::Errors => "completed_with_errors",
            crate::report::StepOutcome::Fatal => "failed",
            crate::report::StepOutcome::Skipped => "skipped",
        };
        self.store
            .append_log(
                id,
                step.stage.name(),
                status,
                &format!("{} findings", step.findings.len()),
            )
            .await
    }
}

fn terminal(
    status: TransactionStatus,
    report: ValidationReport,
    key_fields: KeyFields,
    processed_xml_uri: Option<String>,
) -> TerminalOutcome {
    TerminalOutcome {
        status,
        level: report.level_reached(),
        detected_format: report.detected_format.clone(),
        report,
        processed_xml_uri,
        key_fields,
        duration_seconds: 0.0,
    }
}

fn extraction_failure_finding(e: &ExtractionError) -> Finding {
    match e {
        ExtractionError::UnsupportedCarrier(_) | ExtractionError::MalformedPdf(_) => {
            Finding::fatal(codes::CARRIER_UNSUPPORTED, e.to_string())
        }
        _ => Finding::fatal(codes::XSD_VIOLATION, e.to_string()),
    }
}

fn key_fields(invoice: &crate::core::CanonicalInvoice, check: &BusinessCheck) -> KeyFields {
    KeyFields {
        invoice_number: Some(invoice.number.clone()),
        issue_date: Some(invoice.issue_date),
        payable_amount: Some(invoice.payable_amount),
        currency_code: Some(invoice.currency_code.clone()),
        seller_name: Some(invoice.seller.name.clone()),
        seller_vat_id: invoice.seller.vat_id.clone(),
        buyer_name: Some(invoice.buyer.name.clone()),
        buyer_vat_id: invoice.buyer.vat_id.clone(),
        erp_vendor_id: check.vendor_id.clone(),
        purchase_order_id: invoice.purchase_order_reference.clone(),
        duplicate: check.duplicate,
    }
}
