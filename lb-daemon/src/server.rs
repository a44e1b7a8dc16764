//! Status endpoint
//!
//! Serves the current detection record as `{"id": ..., "time": ...}`. Handlers only
//! clone the board's current snapshot, so a slow client never holds up the
//! detection loop.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderValue};
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use lb_core::constants::server::CURRENT_DETECTION_PATH;
use lb_core::{ConfirmedDetection, DetectionBoard};
use lb_error::{LapbeaconError, Result};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{debug, info};

async fn current_detection(State(board): State<Arc<DetectionBoard>>) -> Json<ConfirmedDetection> {
    let snapshot = board.snapshot();
    debug!("Status query served (revision {})", board.revision());
    Json(snapshot.as_ref().clone())
}

/// Routes of the status server.
pub fn router(board: Arc<DetectionBoard>) -> Router {
    Router::new()
        .route(CURRENT_DETECTION_PATH, get(current_detection))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .with_state(board)
}

/// Bind `bind` and serve until `shutdown` is notified.
pub async fn run_server(bind: &str, board: Arc<DetectionBoard>, shutdown: Arc<Notify>) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|e| LapbeaconError::server(format!("cannot bind {}: {}", bind, e)))?;
    serve(listener, board, shutdown).await
}

/// Serve on an already bound listener.
pub async fn serve(listener: TcpListener, board: Arc<DetectionBoard>, shutdown: Arc<Notify>) -> Result<()> {
    let addr = listener.local_addr()?;
    info!("Status server listening on http://{}{}", addr, CURRENT_DETECTION_PATH);

    axum::serve(listener, router(board))
        .with_graceful_shutdown(async move {
            shutdown.notified().await;
            info!("Status server shutting down");
        })
        .await
        .map_err(|e| LapbeaconError::server(e.to_string()))
}
