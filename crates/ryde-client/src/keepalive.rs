//! Background session keep-alive
//!
//! Long-lived processes refresh proactively on a timer instead of waiting
//! for a request to hit a 401. The task goes through the same coordinator
//! as the 401 path, so a timer firing during a request-driven refresh
//! joins it rather than racing it.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::RydeClient;
use crate::error::Error;

/// How often the keep-alive task refreshes by default.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Spawn the keep-alive loop. Abort the handle to stop it.
pub fn spawn_keepalive_task(client: RydeClient, interval: Duration) -> JoinHandle<()> {
    info!(interval_secs = interval.as_secs(), "starting session keep-alive task");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; skip it, the session was
        // just loaded
        ticker.tick().await;
        loop {
            ticker.tick().await;
            run_keepalive_cycle(&client).await;
        }
    })
}

/// One timer cycle.
///
/// Signed-out processes skip the network entirely. A terminal failure
/// means the coordinator has already cleared the session and notified
/// subscribers; anything transient is left for the next cycle.
pub(crate) async fn run_keepalive_cycle(client: &RydeClient) {
    if client.store().refresh_token().await.is_none() {
        debug!("no session to keep alive, skipping cycle");
        return;
    }

    match client.refresh_session().await {
        Ok(()) => debug!("keep-alive refresh complete"),
        Err(Error::SessionExpired) => {
            warn!("session expired during keep-alive");
        }
        Err(e) => {
            warn!(error = %e, "keep-alive refresh failed, retrying next cycle");
        }
    }
}
