use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use storage::{DistributedStorage, StorageBackend};
use tokio_util::io::ReaderStream;

use crate::ApiResult;

pub struct AppState {
    pub storage: Arc<DistributedStorage>,
}

/// Streams a body this node owns back to the requesting peer.
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path((bucket, file_id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let file = state.storage.load_local(&bucket, &file_id).await?;
    let length = file
        .metadata()
        .await
        .map_err(storage::StorageError::from)?
        .len();
    tracing::debug!("Serving {}/{} ({} bytes) to a peer", bucket, file_id, length);

    let stream = ReaderStream::with_capacity(file, state.storage.save_chunk_size());
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, length.to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

/// Deleting an absent body succeeds too; peers treat any 2xx as gone.
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path((bucket, file_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let removed = state.storage.delete_local(&bucket, &file_id).await?;
    if removed {
        tracing::info!("Deleted {}/{} on behalf of a peer", bucket, file_id);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "node": state.storage.node_address(),
    }))
}
