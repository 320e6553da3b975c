//! WebSocket session entry point.
//!
//! # Responsibilities
//! - Authenticate the connection credential before the upgrade completes
//! - Enforce the concurrent session limit
//! - Adapt the socket into a message sink (for the registry) and a text
//!   stream (for the router), then hand both to the relay
//!
//! # Data Flow
//! ```text
//! GET /ws?token=…
//!     → gate.authenticate ──✗──→ 401, no upgrade
//!     → tracker.try_track  ──✗──→ 503, no upgrade
//!     → upgrade → split
//!         write half → ConnectionHandle → Registry (Admission)
//!         read half  → Router::route (until disconnect)
//! ```
//!
//! # Design Decisions
//! - Text and UTF-8 binary messages are frames; ping/pong are transport noise
//! - A close message ends the inbound stream like end-of-stream does
//! - A superseded connection is closed from a separate task so the new
//!   session never waits on the old peer's writer

use std::sync::Arc;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use futures_util::{future, SinkExt, Stream, StreamExt};
use serde::Deserialize;

use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::net::connection::ConnectionGuard;
use crate::relay::{Admission, ConnectionHandle, PeerId, TransportError};

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    #[serde(default)]
    pub token: String,
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if state.shutdown.is_triggered() {
        return ApiError::unavailable("relay is shutting down").into_response();
    }

    let peer = match state.gate.authenticate(&params.token) {
        Ok(peer) => peer,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected relay connection");
            return ApiError::from(e).into_response();
        }
    };

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    let Some(guard) = state.tracker.try_track() else {
        tracing::warn!(
            peer = %peer,
            capacity = state.tracker.capacity(),
            "Session limit reached"
        );
        return ApiError::unavailable("too many connections").into_response();
    };

    upgrade
        .max_message_size(state.config.relay.max_message_bytes)
        .on_upgrade(move |socket| run_session(state, peer, guard, socket))
}

async fn run_session(state: AppState, peer: PeerId, guard: ConnectionGuard, socket: WebSocket) {
    let (sink, stream) = socket.split();

    let outbound = sink
        .sink_map_err(TransportError::from)
        .with(|payload: String| future::ready(Ok::<_, TransportError>(Message::Text(payload.into()))));
    let handle = Arc::new(ConnectionHandle::new(outbound));

    let (admission, superseded) =
        Admission::admit(state.router.registry().clone(), peer.clone(), handle.clone());
    let close_timeout = state.router.delivery_timeout();

    if let Some(old) = superseded {
        tracing::info!(
            peer = %peer,
            old_connection = %old.id(),
            new_connection = %handle.id(),
            "Superseding existing connection"
        );
        tokio::spawn(async move { old.close(close_timeout).await });
    }

    tracing::info!(
        peer = %peer,
        connection_id = %handle.id(),
        session = %guard.id(),
        "Peer connected"
    );

    let reason = state
        .router
        .route(admission, inbound_frames(stream), &state.shutdown)
        .await;

    handle.close(close_timeout).await;
    tracing::debug!(connection_id = %handle.id(), reason = %reason, "Session finished");
    drop(guard);
}

/// Text view of the socket's read half.
fn inbound_frames<S>(stream: S) -> impl Stream<Item = Result<String, TransportError>> + Unpin
where
    S: Stream<Item = Result<Message, axum::Error>> + Send + 'static,
{
    Box::pin(
        stream
            .take_while(|message| future::ready(!matches!(message, Ok(Message::Close(_)))))
            .filter_map(|message| future::ready(frame_text(message))),
    )
}

fn frame_text(message: Result<Message, axum::Error>) -> Option<Result<String, TransportError>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Some(Ok(text)),
            Err(_) => {
                tracing::debug!(len = bytes.len(), "Dropping non-UTF-8 binary message");
                None
            }
        },
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Close(_)) => None,
        Err(e) => Some(Err(e.into())),
    }
}
