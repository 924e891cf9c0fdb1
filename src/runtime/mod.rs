//! # Runtime
//!
//! Process wiring of the controller: initialization, the watch loop and the
//! error policy applied to failed reconciliation passes.

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
