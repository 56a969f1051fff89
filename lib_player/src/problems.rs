//! # Problems
//!
//! Recoverable conditions surfaced to the consumer. Problems are keyed by a
//! stable string derived from the condition (`schema:/topic`,
//! `connection-failed`, ...) so a repeated condition replaces its previous
//! entry instead of piling up.

use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Error,
    Warn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProblem {
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tip: Option<String>,
    /// Text of the underlying cause, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PlayerProblem {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            tip: None,
            error: None,
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warn,
            ..Self::error(message)
        }
    }

    pub fn with_tip(mut self, tip: impl Into<String>) -> Self {
        self.tip = Some(tip.into());
        self
    }

    pub fn with_cause(mut self, cause: &dyn std::error::Error) -> Self {
        self.error = Some(cause.to_string());
        self
    }
}

/// The keyed set of active problems.
#[derive(Debug, Default, Clone)]
pub struct ProblemSet {
    problems: BTreeMap<String, PlayerProblem>,
}

impl ProblemSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a problem, replacing any previous one under the same key.
    pub fn add(&mut self, key: impl Into<String>, problem: PlayerProblem) {
        let key = key.into();
        match problem.severity {
            Severity::Error => log::error!("[{}] {}", key, problem.message),
            Severity::Warn => log::warn!("[{}] {}", key, problem.message),
        }
        self.problems.insert(key, problem);
    }

    pub fn clear(&mut self) {
        self.problems.clear();
    }

    pub fn get(&self, key: &str) -> Option<&PlayerProblem> {
        self.problems.get(key)
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    /// Copy of the current problems for a snapshot.
    pub fn snapshot(&self) -> BTreeMap<String, PlayerProblem> {
        self.problems.clone()
    }
}
