//! Metadata persistence: the transaction row, processing log and report.
//!
//! The driver owns a transaction row for the duration of one run through the
//! claim protocol: a conditional UPDATE is the single cross-worker
//! serialisation point, which makes at-least-once delivery safe. Terminal
//! states and the validation report are written in one statement, guarded by
//! the same condition, so the report exists exactly once per successful run.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use thiserror::Error;
use uuid::Uuid;

use crate::report::{ValidationLevel, ValidationReport};

/// Transient metadata-store failure.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self(e.to_string())
    }
}

/// Lifecycle states of an invoice transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Received,
    Processing,
    Valid,
    Invalid,
    ManualReview,
    Error,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::Processing => "PROCESSING",
            Self::Valid => "VALID",
            Self::Invalid => "INVALID",
            Self::ManualReview => "MANUAL_REVIEW",
            Self::Error => "ERROR",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "RECEIVED" => Some(Self::Received),
            "PROCESSING" => Some(Self::Processing),
            "VALID" => Some(Self::Valid),
            "INVALID" => Some(Self::Invalid),
            "MANUAL_REVIEW" => Some(Self::ManualReview),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    /// VALID, INVALID and MANUAL_REVIEW are absorbing; ERROR may be
    /// re-entered by an operator-initiated retry.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Valid | Self::Invalid | Self::ManualReview | Self::Error
        )
    }
}

/// Where the upload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTag {
    Api,
    Email,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Email => "email",
        }
    }
}

/// One row of the transaction table, as the driver sees it.
#[derive(Debug, Clone)]
pub struct InvoiceTransaction {
    pub id: Uuid,
    pub status: TransactionStatus,
    pub raw_blob_uri: String,
    pub processed_xml_uri: Option<String>,
    pub content_type: Option<String>,
    pub retry_count: i32,
    pub received_at: DateTime<Utc>,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

/// Denormalised key fields extracted from the canonical invoice.
#[derive(Debug, Clone, Default)]
pub struct KeyFields {
    pub invoice_number: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub payable_amount: Option<Decimal>,
    pub currency_code: Option<String>,
    pub seller_name: Option<String>,
    pub seller_vat_id: Option<String>,
    pub buyer_name: Option<String>,
    pub buyer_vat_id: Option<String>,
    pub erp_vendor_id: Option<String>,
    pub purchase_order_id: Option<String>,
    pub duplicate: bool,
}

/// Everything written atomically with the terminal status change.
#[derive(Debug, Clone)]
pub struct TerminalOutcome {
    pub status: TransactionStatus,
    pub level: ValidationLevel,
    pub report: ValidationReport,
    pub detected_format: Option<String>,
    pub processed_xml_uri: Option<String>,
    pub key_fields: KeyFields,
    pub duration_seconds: f64,
}

/// Read/write contract of the metadata store.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn load(&self, id: Uuid) -> Result<Option<InvoiceTransaction>, StoreError>;

    /// The claim protocol: atomically transition RECEIVED|ERROR → PROCESSING.
    /// Returns `false` when another worker holds the row or it is already
    /// terminal — the caller then simply walks away.
    async fn claim(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Write the terminal status, report and denormalised fields in one
    /// statement, conditional on still holding the PROCESSING state.
    async fn complete(&self, id: Uuid, outcome: &TerminalOutcome) -> Result<(), StoreError>;

    /// Transient failure: release the row back to RECEIVED with an
    /// incremented retry counter and the time of the next attempt.
    async fn release_for_retry(
        &self,
        id: Uuid,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError>;

    /// Retries exhausted (or a programmer error escaped): terminal ERROR.
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), StoreError>;

    /// Append one processing-log entry.
    async fn append_log(
        &self,
        id: Uuid,
        step_name: &str,
        step_status: &str,
        message: &str,
    ) -> Result<(), StoreError>;

    /// Transactions due for (re)processing, oldest first.
    async fn due_transactions(&self, limit: i64) -> Result<Vec<Uuid>, StoreError>;
}

/// Postgres-backed metadata store.
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn load(&self, id: Uuid) -> Result<Option<InvoiceTransaction>, StoreError> {
        let row = sqlx::query(
            "SELECT id, status, raw_blob_uri, processed_xml_uri, content_type, \
                    retry_count, received_at, next_attempt_at \
             FROM invoice_transactions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let status_raw: String = row.get("status");
            InvoiceTransaction {
                id: row.get("id"),
                status: TransactionStatus::parse(&status_raw)
                    .unwrap_or(TransactionStatus::Error),
                raw_blob_uri: row.get("raw_blob_uri"),
                processed_xml_uri: row.get("processed_xml_uri"),
                content_type: row.get("content_type"),
                retry_count: row.get("retry_count"),
                received_at: row.get("received_at"),
                next_attempt_at: row.get("next_attempt_at"),
            }
        }))
    }

    async fn claim(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE invoice_transactions \
             SET status = 'PROCESSING', updated_at = now() \
             WHERE id = $1 AND status IN ('RECEIVED', 'ERROR')",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn complete(&self, id: Uuid, outcome: &TerminalOutcome) -> Result<(), StoreError> {
        let report_json = serde_json::to_value(&outcome.report)
            .map_err(|e| StoreError(format!("report serialisation: {e}")))?;
        let kf = &outcome.key_fields;

        sqlx::query(
            "UPDATE invoice_transactions SET \
                status = $2, \
                validation_level = $3, \
                validation_report = $4, \
                detected_format = $5, \
                processed_xml_uri = COALESCE($6, processed_xml_uri), \
                invoice_number = $7, \
                issue_date = $8, \
                payable_amount = $9, \
                currency_code = $10, \
                seller_name = $11, \
                seller_vat_id = $12, \
                buyer_name = $13, \
                buyer_vat_id = $14, \
                erp_vendor_id = $15, \
                purchase_order_id = $16, \
                is_duplicate = $17, \
                processing_time_seconds = $18, \
                error_message = NULL, \
                processed_at = now(), \
                updated_at = now() \
             WHERE id = $1 AND status = 'PROCESSING'",
        )
        .bind(id)
        .bind(outcome.status.as_str())
        .bind(outcome.level.as_str())
        .bind(report_json)
        .bind(&outcome.detected_format)
        .bind(&outcome.processed_xml_uri)
        .bind(&kf.invoice_number)
        .bind(kf.issue_date)
        .bind(kf.payable_amount)
        .bind(&kf.currency_code)
        .bind(&kf.seller_name)
        .bind(&kf.seller_vat_id)
        .bind(&kf.buyer_name)
        .bind(&kf.buyer_vat_id)
        .bind(&kf.erp_vendor_id)
        .bind(&kf.purchase_order_id)
        .bind(kf.duplicate)
        .bind(outcome.duration_seconds)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn release_for_retry(
        &self,
        id: Uuid,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE invoice_transactions SET \
                status = 'RECEIVED', \
                retry_count = retry_count + 1, \
                next_attempt_at = $2, \
                error_message = $3, \
                updated_at = now() \
             WHERE id = $1 AND status = 'PROCESSING'",
        )
        .bind(id)
        .bind(next_attempt_at)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE invoice_transactions SET \
                status = 'ERROR', \
                error_message = $2, \
                processed_at = now(), \
                updated_at = now() \
             WHERE id = $1 AND status = 'PROCESSING'",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_log(
        &self,
        id: Uuid,
        step_name: &str,
        step_status: &str,
        message: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO processing_logs (id, transaction_id, step_name, step_status, message, created_at) \
             VALUES ($1, $2, $3, $4, $5, now())",
        )
        .bind(Uuid::new_v4())
        .bind(id)
        .bind(step_name)
        .bind(step_status)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn due_transactions(&self, limit: i64) -> Result<Vec<Uuid>, StoreError> {
        let rows = sqlx::query(
            "SELECT id FROM invoice_transactions \
             WHERE status = 'RECEIVED' \
               AND (next_attempt_at IS NULL OR next_attempt_at <= now()) \
             ORDER BY received_at \
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|row| row.get("id")).collect())
    }
}
