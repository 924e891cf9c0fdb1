//! # Controller
//!
//! Core controller modules for the rsyslog RELP controller.
//!
//! - `backoff`: Exponential backoff for retries of transient failures
//! - `reconciler`: Lifecycle state machine and reconciliation passes

pub mod backoff;
pub mod reconciler;
