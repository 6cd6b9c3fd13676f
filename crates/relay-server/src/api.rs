//! HTTP endpoints for server-side injection and session administration.

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use relay_core::{ConnectionId, RelayError};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::relay::DisconnectReason;
use crate::server::AppState;
use crate::websocket::envelope;

/// Errors returned by the HTTP API.
#[derive(Debug)]
pub enum ApiError {
    /// Multipart body had no `file` field.
    MissingFile,
    /// The multipart body could not be read.
    Multipart(MultipartError),
    /// A relay operation failed.
    Relay(RelayError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::MissingFile => StatusCode::BAD_REQUEST,
            Self::Multipart(e) => e.status(),
            Self::Relay(RelayError::ConnectionNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Relay(RelayError::DecodeFailure(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Relay(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::MissingFile | Self::Multipart(_) => "INVALID_UPLOAD",
            Self::Relay(e) => e.code().as_str(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingFile => f.write_str("multipart field 'file' is required"),
            Self::Multipart(e) => write!(f, "{e}"),
            Self::Relay(e) => write!(f, "{e}"),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        Self::Multipart(e)
    }
}

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        Self::Relay(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (self.status(), Json(body)).into_response()
    }
}

/// Query string for `POST /broadcast/text`.
#[derive(Debug, Deserialize)]
pub struct BroadcastTextParams {
    /// Text to deliver to every text session.
    pub message: String,
}

/// POST /broadcast/text?message=...
pub async fn broadcast_text(
    State(state): State<AppState>,
    Query(params): Query<BroadcastTextParams>,
) -> Json<Value> {
    let recipients = state
        .relay
        .broadcast()
        .broadcast(envelope::server_broadcast(&params.message), None)
        .await;
    info!(recipients, "server text broadcast");
    Json(json!({
        "status": "message broadcasted",
        "text": params.message,
        "recipients": recipients,
    }))
}

/// POST /broadcast/image (multipart, field `file`)
///
/// The upload is relayed as-is, without downscaling.
pub async fn broadcast_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().map(str::to_owned);
        let data = field.bytes().await?;
        let size = data.len();
        let recipients = state.relay.images().inject(data).await;
        info!(recipients, size, filename = ?filename, "server image broadcast");
        return Ok(Json(json!({
            "status": "image broadcasted",
            "filename": filename,
            "recipients": recipients,
        })));
    }
    warn!("image broadcast without a file field");
    Err(ApiError::MissingFile)
}

/// GET /connections
pub async fn list_connections(State(state): State<AppState>) -> Json<Value> {
    let connections: Vec<_> = state
        .relay
        .registry()
        .snapshot()
        .into_iter()
        .map(|(_, session)| session.info())
        .collect();
    Json(json!({
        "count": connections.len(),
        "connections": connections,
    }))
}

/// DELETE /connections/{id}
pub async fn close_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = ConnectionId::from_string(id);
    if state
        .relay
        .lifecycle()
        .disconnect(&id, DisconnectReason::Administrative)
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(RelayError::ConnectionNotFound(id).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(err: ApiError) -> (StatusCode, Value) {
        let resp = err.into_response();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn not_found_maps_to_404() {
        let (status, body) =
            body_json(RelayError::ConnectionNotFound(ConnectionId::from("conn_x")).into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "CONNECTION_NOT_FOUND");
        assert_eq!(body["error"]["message"], "connection conn_x not found");
    }

    #[tokio::test]
    async fn missing_file_maps_to_400() {
        let (status, body) = body_json(ApiError::MissingFile).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_UPLOAD");
    }

    #[tokio::test]
    async fn decode_failure_maps_to_422() {
        let (status, body) = body_json(RelayError::DecodeFailure("bad".into()).into()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "DECODE_FAILED");
    }
}
