//! HTTP surface: control page, MJPEG stream and storage listing

pub mod files;

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, Response};
use axum::routing::get;
use axum::Router;
use tokio_stream::StreamExt;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::capture::FrameSource;
use crate::error::StreamError;
use crate::hardware::CameraHardware;
use crate::stream::{sink, StreamSession};
use crate::Config;

const INDEX_HTML: &str = include_str!("index.html");

/// Shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn FrameSource>,
    pub hardware: Arc<CameraHardware>,
    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/stream", get(stream))
        .route("/files", get(file_list))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn file_list(State(state): State<AppState>) -> Html<String> {
    let storage = &state.config.storage;
    Html(files::render_file_list(storage.root.as_deref(), storage.max_entries).await)
}

/// Spawn a session feeding a channel and answer with the channel as body.
///
/// The session runs until the body is dropped, which is how axum reports a
/// client that went away.
async fn stream(State(state): State<AppState>) -> Result<Response, StreamError> {
    let (sink, rx) = sink::channel(state.config.stream.channel_capacity);
    let session = StreamSession::new(
        sink,
        state.source.clone(),
        state.hardware.clone(),
        &state.config,
    );
    tokio::spawn(async move {
        let report = session.run().await;
        debug!(frames = report.frames_sent, state = ?report.state, "Stream task done");
    });

    let head = rx
        .head
        .await
        .map_err(|_| StreamError::WriteFailed("session ended before the stream head".into()))?;

    let body = Body::from_stream(rx.body.into_stream().map(Ok::<_, Infallible>));
    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, head.content_type);
    for (name, value) in head.headers {
        response = response.header(name, value);
    }
    response
        .body(body)
        .map_err(|e| StreamError::WriteFailed(e.to_string()))
}
