pub mod eta;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod intake;
pub mod planner;
pub mod routing;
pub mod scoring;
pub mod tracking;

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::state::{AppState, EngineInbox};

/// Starts one worker per engine. Each drains its own bus subscription.
pub fn spawn_engines(state: &AppState, inbox: EngineInbox) -> (JoinHandle<()>, JoinHandle<()>) {
    let routing = tokio::spawn(routing::run_routing_engine(
        state.routing.clone(),
        inbox.routing_rx,
    ));
    let tracking = tokio::spawn(tracking::run_tracking_engine(
        state.tracking.clone(),
        inbox.tracking_rx,
        Duration::from_secs(state.config.location_poll_interval_secs),
        Duration::from_secs(state.config.eta_refresh_interval_secs),
    ));
    (routing, tracking)
}
