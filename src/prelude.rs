//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use rsyslog_relp_controller::prelude::*;
//! ```
//!
//! This brings into scope:
//! - All CRD types (Extension, RsyslogRelpConfig, etc.)
//! - Bundle building types
//! - Store, facts and credential traits
//! - Reconciler types (Reconciler, ReconcilerError, etc.)

pub use crate::crd::*;

pub use crate::bundle::{Bundle, BundleKind, BundleRequest, BuildError, ClusterContext, SecretMaterial};

pub use crate::store::{BundleStatus, BundleStore, CredentialResolver, Owner, PublishedBundle, StoreError};

pub use crate::facts::{ClusterFactsProvider, FactsError};

pub use crate::health::{HealthGate, HealthOutcome};

pub use crate::controller::reconciler::{
    reconcile, BackoffState, ExtensionApi, LifecyclePhase, Reconciler, ReconcilerError,
    TriggerSource,
};

pub use crate::config::ControllerConfig;
