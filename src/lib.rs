//! rsyslog RELP Controller Library
//!
//! Reconciliation core of the rsyslog RELP shoot extension: renders the node
//! configuration that forwards logs to a RELP receiver, publishes it for an
//! external applier, and tears it down again only after host cleanup has been
//! verified.
//!
//! ## Quick Start
//!
//! ```rust
//! use rsyslog_relp_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod bundle;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod facts;
pub mod fingerprint;
pub mod health;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod server;
pub mod store;
