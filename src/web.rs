use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Error;
use crate::slideshow::{Slideshow, StartRequest, Status};

const IMAGE_CACHE_CONTROL: &str = "public, max-age=3600";

pub fn router(slideshow: Arc<Slideshow>) -> Router {
    Router::new()
        .route("/api/reindex", post(reindex))
        .route("/api/status", get(status))
        .route("/api/start", post(start))
        .route("/api/stop", post(stop))
        .route("/image/{file}", get(image))
        .with_state(slideshow)
}

/// Serve until `cancel` fires.
pub fn spawn(
    slideshow: Arc<Slideshow>,
    bind_addr: SocketAddr,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let app = router(slideshow);
    tokio::spawn(async move {
        tracing::info!(%bind_addr, "starting http server");
        match TcpListener::bind(bind_addr).await {
            Ok(listener) => {
                let shutdown = cancel.clone();
                if let Err(err) = axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        shutdown.cancelled().await;
                    })
                    .await
                {
                    tracing::error!(error = %err, "http server failed");
                }
            }
            Err(err) => {
                tracing::error!(error = %err, %bind_addr, "failed to bind http server");
                cancel.cancel();
            }
        }
    })
}

/// Library error rendered as `{ "ok": false, "error": ... }`.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::UnknownMediaId(_) => StatusCode::NOT_FOUND,
            Error::InvalidSetting(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        } else {
            debug!(error = %self.0, "request rejected");
        }
        let body = Json(json!({ "ok": false, "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

async fn reindex(State(slideshow): State<Arc<Slideshow>>) -> Json<serde_json::Value> {
    let count = slideshow.reindex().await;
    Json(json!({ "ok": true, "count": count }))
}

async fn status(State(slideshow): State<Arc<Slideshow>>) -> Json<Status> {
    Json(slideshow.status().await)
}

/// The body is optional; an empty body restarts the default devices.
async fn start(
    State(slideshow): State<Arc<Slideshow>>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        StartRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| Error::InvalidSetting(format!("malformed start request: {err}")))?
    };
    let devices = slideshow.start(request).await?;
    Ok(Json(json!({ "ok": true, "devices": devices })))
}

async fn stop(State(slideshow): State<Arc<Slideshow>>) -> Json<serde_json::Value> {
    slideshow.stop().await;
    Json(json!({ "ok": true }))
}

async fn image(
    State(slideshow): State<Arc<Slideshow>>,
    Path(file): Path<String>,
) -> Result<Response, ApiError> {
    let id = file
        .strip_suffix(".jpg")
        .ok_or_else(|| Error::UnknownMediaId(file.clone()))?;
    let path = slideshow.image(id).await?;
    let bytes = tokio::fs::read(&path).await.map_err(Error::Io)?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg".to_owned()),
            (header::CONTENT_LENGTH, bytes.len().to_string()),
            (header::CACHE_CONTROL, IMAGE_CACHE_CONTROL.to_owned()),
        ],
        bytes,
    )
        .into_response())
}
