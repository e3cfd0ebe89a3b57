//! Human-readable and JSON rendering of a bootstrap run.
use crate::bootstrap::{BootstrapReport, Step, StepFailure, StepStatus};
use crate::error::BootstrapError;
use anyhow::{Context, Result};
use serde::Serialize;

/// Per-step lines, one per recorded step.
pub fn render_steps(report: &BootstrapReport) -> String {
    let mut out = String::new();
    for (index, record) in report.steps.iter().enumerate() {
        let (tag, detail) = match &record.status {
            StepStatus::Performed(detail) => ("done", detail),
            StepStatus::Skipped(detail) => ("skip", detail),
            StepStatus::Failed(detail) => ("FAIL", detail),
        };
        out.push_str(&format!(
            "[{}/{}] {:<4} {}: {}\n",
            index + 1,
            Step::ALL.len(),
            tag,
            record.step.title(),
            detail
        ));
    }
    out
}

/// Success summary with the commands that now work without a password.
pub fn render_success(report: &BootstrapReport) -> String {
    let label = &report.target.label;
    let mut out = render_steps(report);
    let changed = report.performed().filter(|step| *step != Step::Verification).count();
    if changed == 0 {
        out.push_str("\nNothing to change; everything was already in place.\n");
    }
    if let Some(StepStatus::Skipped(_)) = report.status_of(Step::AliasRegistration) {
        out.push_str(&format!(
            "\nnote: an existing `Host {label}` block was kept as is; it was used for the test above.\n"
        ));
    }
    out.push_str(&format!(
        "\n{label} is ready. Try:\n  ssh {label}\n  scp <file> {label}:\n  sftp {label}\n"
    ));
    out
}

/// Failure summary: what ran, what broke, and where to look.
pub fn render_failure(failure: &StepFailure) -> String {
    let mut out = render_steps(&failure.report);
    out.push_str(&format!("\n{failure}\n"));
    if let BootstrapError::Verification {
        timed_out: true, ..
    } = &failure.error
    {
        out.push_str("The connection attempt timed out.\n");
    }
    out.push_str("Likely causes:\n");
    for cause in failure.step.diagnostics() {
        out.push_str(&format!("  - {cause}\n"));
    }
    let kept: Vec<&str> = failure
        .report
        .performed()
        .map(|step| step.title())
        .collect();
    if !kept.is_empty() {
        out.push_str(&format!(
            "Completed steps are kept ({}); fix the cause and re-run the same command.\n",
            kept.join(", ")
        ));
    }
    out
}

/// JSON document printed by `--json`.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    #[serde(flatten)]
    pub report: &'a BootstrapReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<JsonFailure>,
}

#[derive(Debug, Serialize)]
pub struct JsonFailure {
    pub step: Step,
    pub error: String,
    pub exit_code: u8,
    pub likely_causes: Vec<&'static str>,
}

impl<'a> JsonReport<'a> {
    pub fn success(report: &'a BootstrapReport) -> Self {
        Self {
            report,
            failure: None,
        }
    }

    pub fn failure(failure: &'a StepFailure) -> Self {
        Self {
            report: &failure.report,
            failure: Some(JsonFailure {
                step: failure.step,
                error: failure.error.to_string(),
                exit_code: failure.error.exit_code(),
                likely_causes: failure.step.diagnostics().to_vec(),
            }),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serialize bootstrap report")
    }
}
