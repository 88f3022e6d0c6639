//! Findings and their output formats
//!
//! The `check` and `violations` commands collect [`Finding`]s and hand
//! them to a [`TextReport`] (stdout, one block per finding) or a
//! [`JsonReport`] (a single JSON document).
//!
//! ## Exit Code Semantics
//!
//! | Exit Code | Meaning |
//! |-----------|---------|
//! | 0 | No errors (warnings allowed) |
//! | 1 | One or more errors |
//!
//! With `--strict`, warnings count as errors.

use std::io::Write;
use std::process;

use clap::ValueEnum;
use serde::Serialize;
use slotplan_core::{
    Conflict, CourseId, PrerequisiteViolation, RepairReport, Snapshot, ViolationKind,
};

// ============================================================================
// Exit Code
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    Failure = 1,
}

impl ExitCode {
    pub fn from_error_count(count: usize) -> Self {
        if count > 0 {
            ExitCode::Failure
        } else {
            ExitCode::Success
        }
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code as u8)
    }
}

// ============================================================================
// Findings
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// One reported problem
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub code: &'static str,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl Finding {
    fn new(code: &'static str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            notes: Vec::new(),
        }
    }

    fn note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Slot overlap or other structural rejection
    pub fn conflict(conflict: &Conflict) -> Self {
        Finding::new("E001", Severity::Error, conflict.description.clone())
    }

    pub fn summary(message: impl Into<String>) -> Self {
        Finding::new("N001", Severity::Note, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Finding::new("E002", Severity::Error, message)
    }

    pub fn cycle(snapshot: &Snapshot, course: CourseId, cycle: &[CourseId]) -> Self {
        let path: Vec<String> = cycle.iter().map(|id| course_label(snapshot, *id)).collect();
        Finding::new(
            "W004",
            Severity::Warning,
            format!("prerequisite cycle reachable from {}", course_label(snapshot, course)),
        )
        .note(format!("cycle: {}", path.join(" -> ")))
    }
}

fn course_label(snapshot: &Snapshot, id: CourseId) -> String {
    snapshot
        .get_course(id)
        .map_or_else(|| format!("course {}", id), |c| c.code.clone())
}

/// Findings for every repair the import applied
pub fn repair_findings(snapshot: &Snapshot, report: &RepairReport) -> Vec<Finding> {
    let mut findings = Vec::new();
    for dropped in &report.dropped_assignments {
        let teacher = snapshot
            .get_teacher(dropped.teacher_id)
            .map_or_else(|| format!("teacher {}", dropped.teacher_id), |t| t.name.clone());
        findings.push(
            Finding::new(
                "W001",
                Severity::Warning,
                format!(
                    "{} removed from {} in slot {}",
                    teacher,
                    course_label(snapshot, dropped.course_id),
                    dropped.slot_id
                ),
            )
            .note(format!(
                "already teaching {} in that slot",
                course_label(snapshot, dropped.kept_course_id)
            )),
        );
    }
    for removed in &report.removed_offerings {
        let mut finding = Finding::new(
            "W002",
            Severity::Warning,
            format!(
                "offering of {} in slot {} removed: no available teacher",
                removed.course_name, removed.slot_id
            ),
        );
        if !removed.cohort_names.is_empty() {
            finding = finding.note(format!("affected cohorts: {}", removed.cohort_names.join(", ")));
        }
        findings.push(finding);
    }
    findings
}

pub fn violation_finding(snapshot: &Snapshot, violation: &PrerequisiteViolation) -> Finding {
    let cohort = snapshot
        .get_cohort(violation.cohort_id)
        .map_or_else(|| format!("cohort {}", violation.cohort_id), |c| c.name.clone());
    let course = course_label(snapshot, violation.course_id);
    let prerequisite = course_label(snapshot, violation.prerequisite_id);

    let message = match violation.kind {
        ViolationKind::Missing => format!("{}: {} requires {}, which is not scheduled", cohort, course, prerequisite),
        ViolationKind::BeforePrerequisite => format!(
            "{}: {} starts before {} has finished",
            cohort, course, prerequisite
        ),
    };
    Finding::new("W003", Severity::Warning, message).note(format!("run {}", violation.run_id))
}

// ============================================================================
// Output
// ============================================================================

/// Severity after `--strict` escalation
pub fn effective_severity(severity: Severity, strict: bool) -> Severity {
    match severity {
        Severity::Warning if strict => Severity::Error,
        s => s,
    }
}

pub fn exit_code(findings: &[Finding], strict: bool) -> ExitCode {
    let errors = findings
        .iter()
        .filter(|f| effective_severity(f.severity, strict) == Severity::Error)
        .count();
    ExitCode::from_error_count(errors)
}

/// Plain text output, one block per finding
pub struct TextReport<W: Write> {
    writer: W,
    strict: bool,
}

impl<W: Write> TextReport<W> {
    pub fn new(writer: W, strict: bool) -> Self {
        Self { writer, strict }
    }

    pub fn write(&mut self, findings: &[Finding]) -> std::io::Result<()> {
        for finding in findings {
            let severity = effective_severity(finding.severity, self.strict);
            writeln!(self.writer, "{}[{}]: {}", severity.as_str(), finding.code, finding.message)?;
            for note in &finding.notes {
                writeln!(self.writer, "   = {}", note)?;
            }
        }

        let errors = findings
            .iter()
            .filter(|f| effective_severity(f.severity, self.strict) == Severity::Error)
            .count();
        let warnings = findings
            .iter()
            .filter(|f| effective_severity(f.severity, self.strict) == Severity::Warning)
            .count();
        writeln!(self.writer, "{} error(s), {} warning(s)", errors, warnings)
    }
}

#[derive(Serialize)]
pub struct JsonReport<'a> {
    pub findings: &'a [Finding],
    pub errors: usize,
    pub warnings: usize,
}

impl<'a> JsonReport<'a> {
    pub fn new(findings: &'a [Finding], strict: bool) -> Self {
        let count = |wanted: Severity| {
            findings
                .iter()
                .filter(|f| effective_severity(f.severity, strict) == wanted)
                .count()
        };
        Self {
            findings,
            errors: count(Severity::Error),
            warnings: count(Severity::Warning),
        }
    }
}
