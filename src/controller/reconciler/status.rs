//! # Status Updates
//!
//! Reports the lifecycle phase, conditions and last error on the Extension.
//! Writes are skipped when nothing but the reconcile timestamp would change,
//! so status updates do not trigger watch events of their own.

use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{Condition, Extension, ExtensionStatus};
use tracing::debug;

pub const CONDITION_READY: &str = "Ready";
pub const CONDITION_CLEANUP_HEALTHY: &str = "CleanupHealthy";

/// Phase reported for extensions whose configuration is rejected
pub const PHASE_FAILED: &str = "Failed";

/// Desired status of a pass
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub phase: String,
    pub description: String,
    pub conditions: Vec<Condition>,
    pub last_error: Option<String>,
}

impl StatusReport {
    pub fn new(phase: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            description: description.into(),
            conditions: Vec::new(),
            last_error: None,
        }
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(error.into());
        self
    }
}

/// Status to write for a report, keeping transition times of unchanged conditions
pub fn desired_status(extension: &Extension, report: StatusReport) -> ExtensionStatus {
    let current = extension.status.as_ref();
    let conditions = report
        .conditions
        .into_iter()
        .map(|mut condition| {
            if let Some(previous) = current.and_then(|s| s.condition(&condition.r#type)) {
                if previous.status == condition.status
                    && previous.reason == condition.reason
                    && previous.message == condition.message
                {
                    condition
                        .last_transition_time
                        .clone_from(&previous.last_transition_time);
                }
            }
            condition
        })
        .collect();

    ExtensionStatus {
        phase: Some(report.phase),
        description: Some(report.description),
        conditions,
        observed_generation: extension.metadata.generation,
        last_reconcile_time: Some(chrono::Utc::now().to_rfc3339()),
        last_error: report.last_error,
    }
}

/// Whether two statuses differ in anything but the reconcile timestamp
pub fn status_changed(current: Option<&ExtensionStatus>, desired: &ExtensionStatus) -> bool {
    let Some(current) = current else {
        return true;
    };
    let mut current = current.clone();
    current.last_reconcile_time.clone_from(&desired.last_reconcile_time);
    current != *desired
}

/// Write the status of a pass, skipping unchanged writes
pub async fn update_status(
    reconciler: &Reconciler,
    extension: &Extension,
    report: StatusReport,
) -> Result<(), ReconcilerError> {
    let desired = desired_status(extension, report);
    if !status_changed(extension.status.as_ref(), &desired) {
        debug!(
            phase = desired.phase.as_deref().unwrap_or_default(),
            "Skipping status update - status unchanged"
        );
        return Ok(());
    }
    reconciler.extensions.patch_status(extension, &desired).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ExtensionSpec;

    fn extension(status: Option<ExtensionStatus>) -> Extension {
        let mut ext = Extension::new(
            "shoot-rsyslog-relp",
            ExtensionSpec {
                extension_type: "shoot-rsyslog-relp".to_string(),
                provider_config: None,
            },
        );
        ext.metadata.generation = Some(3);
        ext.status = status;
        ext
    }

    fn ready(ok: bool) -> Condition {
        Condition::new(CONDITION_READY, ok, "Reconciled", None)
    }

    #[test]
    fn test_first_status_is_written() {
        let ext = extension(None);
        let desired = desired_status(&ext, StatusReport::new("Active", "published").condition(ready(true)));
        assert_eq!(desired.observed_generation, Some(3));
        assert!(status_changed(None, &desired));
    }

    #[test]
    fn test_unchanged_status_keeps_transition_time_and_is_skipped() {
        let mut old_ready = ready(true);
        old_ready.last_transition_time = Some("2024-01-01T00:00:00+00:00".to_string());
        let previous = ExtensionStatus {
            phase: Some("Active".to_string()),
            description: Some("published".to_string()),
            conditions: vec![old_ready],
            observed_generation: Some(3),
            last_reconcile_time: Some("2024-01-01T00:00:00+00:00".to_string()),
            last_error: None,
        };
        let ext = extension(Some(previous.clone()));

        let desired = desired_status(&ext, StatusReport::new("Active", "published").condition(ready(true)));
        assert_eq!(
            desired.conditions[0].last_transition_time.as_deref(),
            Some("2024-01-01T00:00:00+00:00")
        );
        assert!(!status_changed(Some(&previous), &desired));
    }

    #[test]
    fn test_flipped_condition_is_written_with_new_transition_time() {
        let mut old_ready = ready(true);
        old_ready.last_transition_time = Some("2024-01-01T00:00:00+00:00".to_string());
        let previous = ExtensionStatus {
            phase: Some("Active".to_string()),
            description: Some("published".to_string()),
            conditions: vec![old_ready],
            observed_generation: Some(3),
            last_reconcile_time: None,
            last_error: None,
        };
        let ext = extension(Some(previous.clone()));

        let desired = desired_status(
            &ext,
            StatusReport::new(PHASE_FAILED, "rejected")
                .condition(ready(false))
                .error("invalid configuration"),
        );
        assert_ne!(
            desired.conditions[0].last_transition_time.as_deref(),
            Some("2024-01-01T00:00:00+00:00")
        );
        assert_eq!(desired.last_error.as_deref(), Some("invalid configuration"));
        assert!(status_changed(Some(&previous), &desired));
    }
}
