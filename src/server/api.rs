use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::StreamBody,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderValue, Method},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::TryStreamExt;
use tokio_util::io::{ReaderStream, StreamReader};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use super::error::ApiError;
use crate::file::storage::CHUNK_SIZE;
use crate::file::{FileResult, FileStorage};

pub struct AppState {
    pub storage: FileStorage,
}

pub fn router(state: Arc<AppState>, timeout: Option<Duration>) -> Router {
    let app = Router::new()
        .route("/", get(hello))
        .route("/files", post(upload).fallback(unsupported_method))
        .route(
            "/files/",
            post(upload)
                .get(missing_file_id)
                .delete(missing_file_id)
                .fallback(unsupported_method),
        )
        .route(
            "/files/:file_id",
            get(download).delete(remove).fallback(unsupported_method),
        )
        .fallback(route_not_found)
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    match timeout {
        Some(timeout) => app.layer(TimeoutLayer::new(timeout)),
        None => app,
    }
}

async fn hello() -> &'static str {
    "Hello EasyGo!"
}

async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Vec<FileResult>>, ApiError> {
    let mut results = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let file_name = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => continue,
        };

        let reader = StreamReader::new(field.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));
        tokio::pin!(reader);
        results.push(state.storage.save(reader, &file_name).await?);
    }
    Ok(Json(results))
}

async fn download(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<Response, ApiError> {
    let stored = state.storage.retrieve(&file_id).await?;
    let disposition = content_disposition(&stored.file_name);
    let body = StreamBody::new(ReaderStream::with_capacity(stored.file, CHUNK_SIZE));

    let headers = [
        (header::PRAGMA, HeaderValue::from_static("no-cache")),
        (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        (header::EXPIRES, HeaderValue::from_static("0")),
        (header::CONTENT_DISPOSITION, disposition),
    ];
    Ok((headers, body).into_response())
}

async fn remove(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Json<FileResult> {
    Json(state.storage.delete(&file_id).await)
}

async fn missing_file_id() -> ApiError {
    ApiError::BadRequest("Missing parameter 'fileId'".to_string())
}

async fn unsupported_method(method: Method) -> ApiError {
    ApiError::BadRequest(format!("Request method '{}' not supported", method))
}

async fn route_not_found() -> ApiError {
    ApiError::RouteNotFound
}

fn content_disposition(file_name: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("attachment; filename={}", file_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
