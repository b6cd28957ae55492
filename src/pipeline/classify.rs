// SPDX-License-Identifier: GPL-3.0-only

//! Classification of asynchronous stage errors into status outcomes
//!
//! Errors are matched against a small rule table: a structured error kind
//! wins when the engine supplies one, the error text is compared next, and
//! anything else from a watched stage gets the table's fallback outcome.
//! The outcome is handed to an external [`StatusReporter`] at most once
//! per streamer lifetime.

use super::message::{ErrorKind, StageError};
use super::topology::StageRole;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error};

/// Status reported for a terminal stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusOutcome {
    BadRequest,
    Unauthorized,
    NotFound,
    GenericFailure,
}

impl StatusOutcome {
    /// HTTP-style status code
    pub fn code(&self) -> u16 {
        match self {
            StatusOutcome::BadRequest => 400,
            StatusOutcome::Unauthorized => 401,
            StatusOutcome::NotFound => 404,
            StatusOutcome::GenericFailure => 500,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            StatusOutcome::BadRequest => "Bad Request",
            StatusOutcome::Unauthorized => "Unauthorized",
            StatusOutcome::NotFound => "Not Found",
            StatusOutcome::GenericFailure => "Internal Error",
        }
    }
}

impl std::fmt::Display for StatusOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

/// What the external status reporter receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub outcome: StatusOutcome,
    /// Element that posted the error
    pub stage: String,
    /// Error text as posted by the stage
    pub message: String,
}

/// External sink for the stream's terminal status
pub trait StatusReporter: Send + Sync {
    fn report_status(&self, report: &StatusReport);
}

impl<F> StatusReporter for F
where
    F: Fn(&StatusReport) + Send + Sync,
{
    fn report_status(&self, report: &StatusReport) {
        self(report)
    }
}

/// Reporter that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl StatusReporter for LogReporter {
    fn report_status(&self, report: &StatusReport) {
        error!(
            code = report.outcome.code(),
            reason = report.outcome.reason(),
            stage = %report.stage,
            message = %report.message,
            "Stream status"
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Matcher {
    Kind(ErrorKind),
    Text(String),
}

/// One row of the classification table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRule {
    matcher: Matcher,
    outcome: StatusOutcome,
}

impl ClassificationRule {
    /// Match on a structured error kind
    pub fn kind(kind: ErrorKind, outcome: StatusOutcome) -> Self {
        Self {
            matcher: Matcher::Kind(kind),
            outcome,
        }
    }

    /// Match on error text; case and a trailing period are ignored
    pub fn text(pattern: &str, outcome: StatusOutcome) -> Self {
        Self {
            matcher: Matcher::Text(normalize(pattern)),
            outcome,
        }
    }
}

/// Rule table mapping (stage, error) to an outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRules {
    stages: Vec<StageRole>,
    rules: Vec<ClassificationRule>,
    fallback: StatusOutcome,
}

impl Default for ClassificationRules {
    fn default() -> Self {
        use StatusOutcome::*;

        Self::new(
            vec![StageRole::Ingestion, StageRole::Encoder, StageRole::Sink],
            vec![
                ClassificationRule::kind(ErrorKind::OpenReadWrite, BadRequest),
                ClassificationRule::kind(ErrorKind::NotAuthorized, Unauthorized),
                ClassificationRule::kind(ErrorKind::OpenRead, NotFound),
                ClassificationRule::kind(ErrorKind::ResourceNotFound, NotFound),
                ClassificationRule::text("Could not open resource for reading and writing.", BadRequest),
                ClassificationRule::text("Could not establish connection to server.", BadRequest),
                ClassificationRule::text("Not authorized to access resource.", Unauthorized),
                ClassificationRule::text("Unauthorized", Unauthorized),
                ClassificationRule::text("Could not open resource for reading.", NotFound),
            ],
            NotFound,
        )
    }
}

impl ClassificationRules {
    /// Build a table watching `stages`, with `fallback` for unmatched errors
    pub fn new(
        stages: Vec<StageRole>,
        rules: Vec<ClassificationRule>,
        fallback: StatusOutcome,
    ) -> Self {
        Self {
            stages,
            rules,
            fallback,
        }
    }

    /// Classify an error, or `None` when its stage is not watched
    pub fn classify(&self, error: &StageError) -> Option<StatusOutcome> {
        let role = StageRole::from_element_name(&error.source)?;
        if !self.stages.contains(&role) {
            return None;
        }

        if let Some(kind) = error.kind
            && kind != ErrorKind::Other
            && let Some(rule) = self
                .rules
                .iter()
                .find(|rule| rule.matcher == Matcher::Kind(kind))
        {
            return Some(rule.outcome);
        }

        let text = normalize(&error.message);
        let by_text = self.rules.iter().find(|rule| match &rule.matcher {
            Matcher::Text(pattern) => *pattern == text,
            Matcher::Kind(_) => false,
        });

        Some(by_text.map_or(self.fallback, |rule| rule.outcome))
    }
}

fn normalize(text: &str) -> String {
    text.trim().trim_end_matches('.').to_lowercase()
}

/// Delivers at most one status report
pub struct ReportOnce {
    reporter: Arc<dyn StatusReporter>,
    reported: Mutex<bool>,
}

impl ReportOnce {
    pub fn new(reporter: Arc<dyn StatusReporter>) -> Self {
        Self {
            reporter,
            reported: Mutex::new(false),
        }
    }

    /// Forward the report unless one was already delivered
    ///
    /// Returns `true` if this call delivered it.
    pub fn report(&self, report: StatusReport) -> bool {
        {
            let mut reported = self.reported.lock().unwrap_or_else(PoisonError::into_inner);
            if *reported {
                debug!(outcome = %report.outcome, "Status already reported, skipping");
                return false;
            }
            *reported = true;
        }

        self.reporter.report_status(&report);
        true
    }

    pub fn has_reported(&self) -> bool {
        *self.reported.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ReportOnce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportOnce")
            .field("reported", &self.has_reported())
            .finish()
    }
}
