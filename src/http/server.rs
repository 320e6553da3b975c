//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the shared state (stores, credential authority, registry, router)
//! - Create the Axum router with all handlers
//! - Wire up middleware (tracing, timeouts, request ID)
//! - Serve plain TCP or TLS until shutdown, then drain relay sessions
//! - Sweep expired entries from the in-memory revocation store

use axum::{
    body::Body,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::setup_admin_router;
use crate::auth::{CredentialAuthority, MemoryRevocationStore, RevocationStore};
use crate::config::{RelayConfig, TlsConfig};
use crate::http::handlers;
use crate::http::request::{request_span, UuidRequestId, X_REQUEST_ID};
use crate::http::websocket::ws_handler;
use crate::lifecycle::Shutdown;
use crate::net::connection::ConnectionTracker;
use crate::net::tls::load_tls_config;
use crate::relay::{Registry, Router as MessageRouter};
use crate::session::SessionGate;
use crate::users::{MemoryUserStore, UserStore};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gate: SessionGate,
    pub router: Arc<MessageRouter>,
    pub tracker: ConnectionTracker,
    pub shutdown: Shutdown,
    pub config: Arc<RelayConfig>,
}

/// HTTP + WebSocket server for the relay.
pub struct RelayServer {
    app: Router,
    state: AppState,
    sweep: Option<Arc<MemoryRevocationStore>>,
}

impl RelayServer {
    /// Create a server backed by in-memory user and revocation stores.
    pub fn new(config: RelayConfig) -> Self {
        let revocations = Arc::new(MemoryRevocationStore::new());
        let mut server = Self::with_stores(
            config,
            Arc::new(MemoryUserStore::new()),
            revocations.clone(),
        );
        server.sweep = Some(revocations);
        server
    }

    /// Create a server over caller-provided stores.
    pub fn with_stores(
        config: RelayConfig,
        users: Arc<dyn UserStore>,
        revocations: Arc<dyn RevocationStore>,
    ) -> Self {
        let authority = Arc::new(CredentialAuthority::from_config(&config.auth, revocations));
        let registry = Arc::new(Registry::new());
        let router = Arc::new(MessageRouter::new(
            registry,
            config.relay.idle_timeout(),
            config.relay.delivery_timeout(),
        ));

        let state = AppState {
            gate: SessionGate::new(authority, users),
            router,
            tracker: ConnectionTracker::new(config.listener.max_connections),
            shutdown: Shutdown::new(),
            config: Arc::new(config),
        };

        let app = Self::build_router(&state);
        Self {
            app,
            state,
            sweep: None,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: &AppState) -> Router {
        let config = &state.config;
        let api = Router::new()
            .route("/users", post(handlers::create_user).get(handlers::me))
            .route("/active", get(handlers::active))
            .route("/login", get(handlers::login).post(handlers::login))
            .route("/refresh", get(handlers::refresh).post(handlers::refresh))
            .route("/logout", post(handlers::logout))
            .route("/health", get(handlers::health))
            .layer(RequestBodyLimitLayer::new(config.relay.max_message_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)));

        let mut app = Router::new().route("/ws", get(ws_handler)).merge(api);
        if config.admin.enabled {
            app = app.merge(setup_admin_router(state.clone()));
        }

        app.with_state(state.clone())
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http().make_span_with(request_span::<Body>))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
    }

    /// Handle for triggering shutdown from outside the server.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.state.shutdown.clone()
    }

    /// The fully layered Axum router.
    pub fn app(&self) -> Router {
        self.app.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &RelayConfig {
        &self.state.config
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Relay server starting");

        let sweeper = self.spawn_revocation_sweeper();
        let shutdown = self.state.shutdown.clone();

        axum::serve(listener, self.app)
            .with_graceful_shutdown(async move { shutdown.drained().await })
            .await?;

        drain_sessions(&self.state).await;
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        tracing::info!("Relay server stopped");
        Ok(())
    }

    /// Run the server over TLS on the configured bind address.
    pub async fn run_tls(self, tls: &TlsConfig) -> Result<(), std::io::Error> {
        let addr: SocketAddr = self
            .state
            .config
            .listener
            .bind_address
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        let rustls = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
        tracing::info!(address = %addr, "Relay server starting (TLS)");

        let sweeper = self.spawn_revocation_sweeper();
        let handle = axum_server::Handle::new();
        let grace = Duration::from_secs(self.state.config.shutdown.grace_period_secs);
        let shutdown = self.state.shutdown.clone();
        let signal_handle = handle.clone();
        tokio::spawn(async move {
            shutdown.drained().await;
            signal_handle.graceful_shutdown(Some(grace));
        });

        axum_server::bind_rustls(addr, rustls)
            .handle(handle)
            .serve(self.app.into_make_service())
            .await?;

        drain_sessions(&self.state).await;
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        tracing::info!("Relay server stopped");
        Ok(())
    }

    fn spawn_revocation_sweeper(&self) -> Option<JoinHandle<()>> {
        let store = self.sweep.clone()?;
        let period = Duration::from_secs(self.state.config.auth.revocation_sweep_secs.max(1));
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let purged = store.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "Purged expired renewal credentials");
                }
            }
        }))
    }
}

/// Give relay sessions the grace period, then terminate the rest.
async fn drain_sessions(state: &AppState) {
    let grace = Duration::from_secs(state.config.shutdown.grace_period_secs);
    let active = state.tracker.active_count();
    if active > 0 {
        tracing::info!(active, grace_secs = grace.as_secs(), "Draining relay sessions");
    }
    if !state.tracker.wait_for_drain(grace).await {
        tracing::warn!(
            remaining = state.tracker.active_count(),
            "Grace period elapsed, terminating remaining sessions"
        );
    }
    state.shutdown.force();
    state.tracker.wait_for_drain(Duration::from_secs(1)).await;
}
