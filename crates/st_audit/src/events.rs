//! Setup lifecycle states and operational events.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ── Setup lifecycle ─────────────────────────────────────────────────────────

/// Steps of one table's setup pipeline, in execution order. A failure is
/// always attributed to the step it happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupStep {
    Validating,
    CreatingShadowTable,
    CreatingTriggers,
    PersistingMapping,
}

impl SetupStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetupStep::Validating => "validating",
            SetupStep::CreatingShadowTable => "creating shadow table",
            SetupStep::CreatingTriggers => "creating triggers",
            SetupStep::PersistingMapping => "persisting mapping",
        }
    }
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome for one table's setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum SetupStatus {
    Created { audit_table: String },
    Skipped { audit_table: String },
    Failed { step: SetupStep, error: String },
}

impl SetupStatus {
    pub fn success(&self) -> bool {
        !matches!(self, SetupStatus::Failed { .. })
    }

    pub fn audit_table(&self) -> Option<&str> {
        match self {
            SetupStatus::Created { audit_table } | SetupStatus::Skipped { audit_table } => {
                Some(audit_table)
            }
            SetupStatus::Failed { .. } => None,
        }
    }
}

// ── Operational events ──────────────────────────────────────────────────────

/// Fire-and-forget start marker for a long-running operation.
pub(crate) fn emit_start(action: &'static str, subject: &str, actor: Option<&str>) {
    info!(action, subject, actor = actor.unwrap_or("-"), "started");
}

/// Fire-and-forget completion event. The logger is a consumer, never a
/// dependency: nothing here can fail or block the pipeline.
pub(crate) fn emit(
    action: &'static str,
    subject: &str,
    actor: Option<&str>,
    success: bool,
    started: Instant,
    error: Option<&str>,
) {
    let duration_ms = started.elapsed().as_millis() as u64;
    let actor = actor.unwrap_or("-");
    if success {
        info!(action, subject, actor, duration_ms, "ok");
    } else {
        warn!(
            action,
            subject,
            actor,
            duration_ms,
            error = error.unwrap_or("unspecified"),
            "failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_accessors() {
        let created = SetupStatus::Created {
            audit_table: "aud_1".into(),
        };
        let failed = SetupStatus::Failed {
            step: SetupStep::CreatingTriggers,
            error: "boom".into(),
        };
        assert!(created.success());
        assert_eq!(created.audit_table(), Some("aud_1"));
        assert!(!failed.success());
        assert_eq!(failed.audit_table(), None);
    }

    #[test]
    fn step_names_are_human_readable() {
        assert_eq!(SetupStep::CreatingShadowTable.to_string(), "creating shadow table");
    }
}
