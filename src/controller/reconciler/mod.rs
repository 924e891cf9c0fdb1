//! # Reconciler
//!
//! Core reconciliation logic for `Extension` resources of the rsyslog RELP type.
//!
//! The reconciler:
//! - Holds a finalizer on every extension it has published for
//! - Renders and publishes the configuration bundle while the extension is active
//! - On deletion, swaps the configuration for the cleanup bundle
//! - Releases the finalizer only once the cleanup is verified healthy
//!
//! ## Reconciliation Flow
//!
//! 1. Observe the published handles of the extension
//! 2. Derive the lifecycle phase from handles, finalizer and deletion request
//! 3. Run the step of that phase
//! 4. Report the phase on the Extension status

pub mod extension_api;
pub mod phase;
pub mod reconcile;
pub mod status;
pub mod types;

// Re-export public API
pub use extension_api::{ExtensionApi, KubeExtensionApi};
pub use phase::{can_remove, derive_phase, LifecyclePhase, ObservedHandles};
pub use reconcile::reconcile;
pub use types::{BackoffState, Reconciler, ReconcilerError, TriggerSource};
