//! HTTP subscription endpoint.
//!
//! `GET /events` streams server-sent events. The first message carries the
//! replay snapshot, every later one a single published event:
//!
//! ```text
//! data: {"type":"history","value":{"onliner":{},"lastSeen":{},"eventHistory":[...],"version":"0.1.0"}}
//! data: {"type":"event","value":{"type":"userJoin","date":"...","value":{"name":"Steve"}}}
//! ```
//!
//! The stream owns its bus subscription, so a client disconnect drops the
//! stream and unsubscribes.

use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{debug, info};

use mcwarden_core::Event;

use crate::bus::{EventBus, OnlineEntry, Snapshot};
use crate::supervisor::SupervisorState;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub bus: EventBus,
    pub version: &'static str,
}

impl AppState {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
enum FeedMessage<'a> {
    History(HistoryValue<'a>),
    Event(&'a Event),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryValue<'a> {
    onliner: &'a BTreeMap<String, OnlineEntry>,
    last_seen: &'a BTreeMap<String, DateTime<Utc>>,
    event_history: &'a [Event],
    version: &'a str,
}

fn history_message<'a>(snapshot: &'a Snapshot, version: &'a str) -> FeedMessage<'a> {
    FeedMessage::History(HistoryValue {
        onliner: &snapshot.presence.onliner,
        last_seen: &snapshot.presence.last_seen,
        event_history: &snapshot.events,
        version,
    })
}

/// `GET /events`
pub async fn events(State(state): State<AppState>) -> Response {
    let mut subscription = match state.bus.subscribe() {
        Ok(subscription) => subscription,
        Err(e) => return (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    };
    let version = state.version;

    let stream = async_stream::stream! {
        if let Some(snapshot) = subscription.take_snapshot() {
            yield SseEvent::default().json_data(history_message(&snapshot, version));
        }
        while let Some(event) = subscription.recv().await {
            yield SseEvent::default().json_data(FeedMessage::Event(&event));
        }
        debug!(subscriber = %subscription.id(), "Event stream ended");
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// Build the router: the event feed plus optional static files.
pub fn build_router(state: AppState, public_dir: Option<&Path>) -> Router {
    let router = Router::new()
        .route("/events", get(events).layer(CorsLayer::permissive()))
        .with_state(state);
    match public_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    }
}

/// Resolves once the supervisor starts stopping (or is gone).
pub async fn supervisor_stopping(mut state_rx: watch::Receiver<SupervisorState>) {
    if state_rx.wait_for(|s| s.is_shutting_down()).await.is_err() {
        debug!("Supervisor state channel closed");
    }
}

/// Bound listener serving the router.
pub struct SubscriptionServer {
    listener: TcpListener,
    router: Router,
}

impl SubscriptionServer {
    pub async fn bind(addr: SocketAddr, router: Router) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, router })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` resolves and every open stream has finished.
    pub async fn serve<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.listener.local_addr()?;
        info!(%addr, "Event feed listening");
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("Event feed stopped");
        Ok(())
    }
}
