use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::server::AppState;
use crate::relay::{PeerId, RouterStatsSnapshot};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub active_sessions: usize,
    pub session_capacity: usize,
}

#[derive(Serialize)]
pub struct ConnectionsReport {
    pub count: usize,
    pub peers: Vec<PeerId>,
    pub frames: RouterStatsSnapshot,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if state.shutdown.is_forced() {
            "terminating"
        } else if state.shutdown.is_triggered() {
            "draining"
        } else {
            "operational"
        },
        active_sessions: state.tracker.active_count(),
        session_capacity: state.tracker.capacity(),
    })
}

pub async fn get_connections(State(state): State<AppState>) -> Json<ConnectionsReport> {
    let mut peers = state.router.registry().snapshot();
    peers.sort();
    Json(ConnectionsReport {
        count: peers.len(),
        peers,
        frames: state.router.stats(),
    })
}
