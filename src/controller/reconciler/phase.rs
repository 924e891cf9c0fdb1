//! # Lifecycle Phase
//!
//! Derives the lifecycle phase of an extension from observed state only: the
//! finalizer, the deletion request and the handles present in the store. No
//! phase is persisted between passes, so a restarted controller resumes from
//! whatever it observes.
//!
//! ```text
//! Absent ──► Active ──► DeletingTransition ──► DeletingGated ──► Removed
//!              ▲  │
//!              └──┘ (content changes)
//! ```

use crate::bundle::BundleKind;
use crate::controller::reconciler::types::ReconcilerError;
use crate::health::HealthOutcome;
use crate::store::PublishedBundle;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// No finalizer and no handles, nothing has been done yet
    Absent,
    /// Configuration published, finalizer held
    Active,
    /// Deletion requested, cleanup being published and configuration retracted
    DeletingTransition,
    /// Only the cleanup handle remains, waiting for the health gate
    DeletingGated,
    /// Finalizer released
    Removed,
}

impl LifecyclePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecyclePhase::Absent => "Absent",
            LifecyclePhase::Active => "Active",
            LifecyclePhase::DeletingTransition => "DeletingTransition",
            LifecyclePhase::DeletingGated => "DeletingGated",
            LifecyclePhase::Removed => "Removed",
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handles of one extension found in the store
#[derive(Debug, Clone, Default)]
pub struct ObservedHandles {
    pub configuration: Option<PublishedBundle>,
    pub cleanup: Option<PublishedBundle>,
}

impl ObservedHandles {
    /// Reject handles whose recorded kind contradicts the name they were found under
    ///
    /// Handles published by older controllers carry no kind label and are accepted.
    pub fn check(&self) -> Result<(), ReconcilerError> {
        for (expected, handle) in [
            (BundleKind::Configuration, &self.configuration),
            (BundleKind::Cleanup, &self.cleanup),
        ] {
            if let Some(handle) = handle {
                if let Some(kind) = handle.kind {
                    if kind != expected {
                        return Err(ReconcilerError::InvariantViolation(format!(
                            "handle {} is labelled as {kind} but holds the {expected} bundle",
                            handle.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.configuration.is_none() && self.cleanup.is_none()
    }
}

/// Phase of an extension given what is observed
pub fn derive_phase(
    handles: &ObservedHandles,
    finalizer_present: bool,
    deletion_requested: bool,
) -> Result<LifecyclePhase, ReconcilerError> {
    handles.check()?;

    let phase = match (deletion_requested, finalizer_present) {
        (false, false) if handles.is_empty() => LifecyclePhase::Absent,
        (false, _) => LifecyclePhase::Active,
        (true, false) => LifecyclePhase::Removed,
        // Configuration still present: retract it before gating, including after a
        // crash that left both handles behind
        (true, true) if handles.configuration.is_some() => LifecyclePhase::DeletingTransition,
        (true, true) if handles.cleanup.is_some() => LifecyclePhase::DeletingGated,
        // Neither handle: the cleanup has not been published yet
        (true, true) => LifecyclePhase::DeletingTransition,
    };
    Ok(phase)
}

/// Whether the finalizer may be released
///
/// Only a verified healthy cleanup releases it; a timed-out or failed gate holds.
pub fn can_remove(outcome: &HealthOutcome) -> bool {
    outcome.is_healthy()
}
