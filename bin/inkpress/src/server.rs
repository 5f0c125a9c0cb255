//! Embedded development server with live reload support

use std::{convert::Infallible, path::Path, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
};
use parking_lot::RwLock;
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};
use tower_http::services::ServeDir;

use crate::watch::{DevEvent, DevStatus, WatchCommand};

/// Server-sent events endpoint.
pub const LIVERELOAD_PATH: &str = "/__livereload";

/// Handles shared by every request.
#[derive(Clone)]
pub struct ServerState {
    pub events: broadcast::Sender<DevEvent>,
    pub commands: mpsc::Sender<WatchCommand>,
    pub status: Arc<RwLock<DevStatus>>,
}

/// Create the development server router.
pub fn create_router(output_dir: &Path, state: ServerState) -> Router {
    Router::new()
        .route(LIVERELOAD_PATH, get(livereload_handler))
        .route("/__inkpress/rebuild", post(rebuild_handler))
        .route("/__inkpress/clear-cache", post(clear_cache_handler))
        .route("/__inkpress/status", get(status_handler))
        .fallback_service(ServeDir::new(output_dir))
        .with_state(state)
}

/// Server-Sent Events handler for live reload.
async fn livereload_handler(
    State(state): State<ServerState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(event) => Some(Ok(Event::default()
            .event(event.name())
            .data(event.data().to_string()))),
        // Lagged clients just miss events.
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    )
}

async fn rebuild_handler(State(state): State<ServerState>) -> (StatusCode, Json<Value>) {
    enqueue(&state, WatchCommand::Rebuild).await
}

async fn clear_cache_handler(State(state): State<ServerState>) -> (StatusCode, Json<Value>) {
    enqueue(&state, WatchCommand::ClearCache).await
}

async fn enqueue(state: &ServerState, command: WatchCommand) -> (StatusCode, Json<Value>) {
    match state.commands.send(command).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "queued": true }))),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "queued": false, "error": "watch loop stopped" })),
        ),
    }
}

async fn status_handler(State(state): State<ServerState>) -> Json<DevStatus> {
    let status = state.status.read().clone();
    Json(status)
}

/// Insert the live reload client before the last `</body>`, or append it.
pub fn inject_livereload(html: &str) -> String {
    match html.rfind("</body>") {
        Some(at) => {
            let mut out = String::with_capacity(html.len() + LIVERELOAD_SCRIPT.len());
            out.push_str(&html[..at]);
            out.push_str(LIVERELOAD_SCRIPT);
            out.push_str(&html[at..]);
            out
        }
        None => format!("{html}{LIVERELOAD_SCRIPT}"),
    }
}

/// JavaScript snippet to inject for live reload.
pub const LIVERELOAD_SCRIPT: &str = r#"
<script>
(function() {
    const source = new EventSource('/__livereload');
    source.addEventListener('reload', function() {
        window.location.reload();
    });
    source.addEventListener('build:start', function() {
        console.log('[inkpress] rebuilding...');
    });
    source.addEventListener('build:error', function(event) {
        console.error('[inkpress] build failed: ' + JSON.parse(event.data).message);
    });
    source.onerror = function() {
        console.log('[livereload] Connection lost, retrying...');
    };
})();
</script>
"#;
