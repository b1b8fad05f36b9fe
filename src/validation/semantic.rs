//! Semantic validation through the external KoSIT Schematron engine.
//!
//! The engine is an opaque Java executable invoked once per transaction with
//! a scoped temporary directory for input and report. The exit status only
//! says the run completed; the verdict comes from the SVRL report. An absent
//! or timed-out engine degrades the stage to SKIPPED so the rest of the
//! pipeline keeps running.

use std::io::ErrorKind;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::KositConfig;
use crate::error::PipelineError;
use crate::mapping::dom::{self, XmlElement};
use crate::report::{codes, Finding, Severity, Stage, ValidationStep};

const NS_SVRL: &str = "http://purl.oclc.org/dsdl/svrl";

pub struct SemanticValidator {
    kosit: Option<KositConfig>,
    timeout: Duration,
}

impl SemanticValidator {
    pub fn new(kosit: Option<KositConfig>, timeout: Duration) -> Self {
        Self { kosit, timeout }
    }

    /// Run the engine over one document. Infrastructure failures that a
    /// retry could fix surface as transient errors; a missing or unusable
    /// engine yields a SKIPPED step instead.
    pub async fn validate(
        &self,
        xml: &[u8],
        transaction_id: Uuid,
    ) -> Result<ValidationStep, PipelineError> {
        let Some(kosit) = &self.kosit else {
            return Ok(skipped("Schematron engine not configured"));
        };
        if !kosit.jar_path.exists() || !kosit.scenarios_path.exists() {
            return Ok(skipped("Schematron engine assets not found"));
        }

        let workdir = tempfile::Builder::new()
            .prefix("belegwerk-kosit-")
            .tempdir()
            .map_err(|e| PipelineError::Subprocess(format!("tempdir: {e}")))?;
        let input_path = workdir.path().join(format!("{transaction_id}.xml"));
        tokio::fs::write(&input_path, xml)
            .await
            .map_err(|e| PipelineError::Subprocess(format!("write input: {e}")))?;

        let mut command = Command::new("java");
        command
            .arg("-Dfile.encoding=UTF-8")
            .arg("-jar")
            .arg(&kosit.jar_path)
            .arg("--scenarios")
            .arg(&kosit.scenarios_path);
        if let Some(repository) = &kosit.repository_path {
            command.arg("--repository").arg(repository);
        }
        command
            .arg("--output")
            .arg(workdir.path())
            .arg(&input_path)
            .kill_on_drop(true);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("no Java runtime available, skipping semantic validation");
                return Ok(skipped("Java runtime not available"));
            }
            Err(e) => return Err(PipelineError::Subprocess(format!("spawn: {e}"))),
        };

        // kill_on_drop reaps the child if the timeout wins the race.
        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Err(_) => {
                warn!(
                    timeout_secs = self.timeout.as_secs(),
                    "Schematron engine timed out"
                );
                return Ok(skipped(format!(
                    "Schematron engine timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
            Ok(Err(e)) => return Err(PipelineError::Subprocess(format!("wait: {e}"))),
            Ok(Ok(output)) => output,
        };

        // The engine writes `<input>.xml-report.xml` next to its output.
        let report_path = workdir.path().join(format!("{transaction_id}.xml-report.xml"));
        if report_path.exists() {
            let report_bytes = tokio::fs::read(&report_path)
                .await
                .map_err(|e| PipelineError::Subprocess(format!("read report: {e}")))?;
            let findings = parse_svrl(&report_bytes)
                .map_err(|e| PipelineError::Subprocess(format!("SVRL report: {e}")))?;
            info!(count = findings.len(), "parsed SVRL findings");
            return Ok(ValidationStep::from_findings(Stage::Semantic, findings));
        }

        if output.status.success() {
            // Run completed and produced no report — nothing to object to.
            return Ok(ValidationStep::from_findings(Stage::Semantic, Vec::new()));
        }

        Err(PipelineError::Subprocess(format!(
            "engine exited with {} and wrote no report: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )))
    }
}

fn skipped(reason: impl Into<String>) -> ValidationStep {
    ValidationStep::skipped(
        Stage::Semantic,
        Finding::info(codes::SCHEMATRON_SKIPPED, reason.into()),
    )
}

/// Parse an SVRL report into findings.
///
/// `failed-assert` elements map to ERROR (or WARNING/INFO when flagged as
/// such); `successful-report` elements are advisory and map to WARNING. The
/// Schematron rule id becomes the finding code, the assertion location is
/// preserved as an XPath pointer.
pub fn parse_svrl(bytes: &[u8]) -> Result<Vec<Finding>, crate::mapping::dom::XmlError> {
    let root = dom::parse(bytes)?;
    let mut findings = Vec::new();
    walk_svrl(&root, &mut findings);
    Ok(findings)
}

fn walk_svrl(el: &XmlElement, findings: &mut Vec<Finding>) {
    if el.namespace.as_deref() == Some(NS_SVRL) {
        match el.name.as_str() {
            "failed-assert" => {
                let severity = match el.attr("flag") {
                    Some("warning") => Severity::Warning,
                    Some("information") | Some("info") => Severity::Info,
                    _ => Severity::Error,
                };
                findings.push(svrl_finding(el, severity));
            }
            "successful-report" => {
                findings.push(svrl_finding(el, Severity::Warning));
            }
            _ => {}
        }
    }
    for child in &el.children {
        walk_svrl(child, findings);
    }
}

fn svrl_finding(el: &XmlElement, severity: Severity) -> Finding {
    let rule_id = el.attr("id").unwrap_or("RULE");
    let message = el
        .children
        .iter()
        .find(|c| c.name == "text" && c.namespace.as_deref() == Some(NS_SVRL))
        .and_then(|t| t.non_empty_text())
        .unwrap_or("no message in report")
        .to_owned();

    let mut finding = Finding::new(
        severity,
        format!("{}{rule_id}", codes::SCHEMATRON_PREFIX),
        message,
    );
    if let Some(location) = el.attr("location") {
        finding = finding.at(location.to_owned());
    }
    finding
}
