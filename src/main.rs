//! # rsyslog RELP Controller
//!
//! Watches `Extension` resources of the rsyslog RELP type and keeps the node
//! forwarding configuration of the matching shoot published, or cleaned up
//! once the extension is deleted.

use anyhow::Result;
use rsyslog_relp_controller::runtime::{initialization::initialize, watch_loop::run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;

    run_watch_loop(
        init.extensions,
        init.reconciler,
        init.server_state,
        init.config,
    )
    .await
}
