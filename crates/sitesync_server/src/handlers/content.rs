use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
};
use sitesync_core::server_path::{GetContentResponse, SaveContentRequest, SaveContentResponse};
use tracing::{debug, info};

use crate::db::ContentRepo;
use crate::error::{ErrorBody, ServerError};

/// Shared state for content handlers
#[derive(Clone)]
pub struct ContentState {
    pub repo: Arc<ContentRepo>,
}

/// Create content routes
pub fn content_routes(state: ContentState) -> Router {
    Router::new()
        .route("/save-content", post(save_content))
        .route("/get-content", get(get_content))
        .route("/content", delete(clear_content))
        .with_state(state)
}

/// POST /api/save-content - Replace the stored content
async fn save_content(
    State(state): State<ContentState>,
    Json(request): Json<SaveContentRequest>,
) -> Result<Json<SaveContentResponse>, ServerError> {
    if !request.content.is_object() {
        return Err(ServerError::BadRequest(
            "content must be a JSON object".to_string(),
        ));
    }

    let stored = state.repo.save(&request.content, &request.timestamp)?;
    info!(
        "Saved content version {} (client timestamp {})",
        stored.version, request.timestamp
    );

    Ok(Json(SaveContentResponse {
        success: true,
        message: "Content saved".to_string(),
        timestamp: stored.updated_at,
    }))
}

/// GET /api/get-content - Fetch the stored content
async fn get_content(State(state): State<ContentState>) -> Result<Response, ServerError> {
    let Some(stored) = state.repo.get()? else {
        debug!("No content saved yet");
        return Ok((
            StatusCode::NOT_FOUND,
            Json(ErrorBody::new("No content saved yet")),
        )
            .into_response());
    };

    Ok(Json(GetContentResponse {
        success: true,
        content: stored.content,
        last_updated: stored.updated_at,
        version: stored.version,
    })
    .into_response())
}

/// DELETE /api/content - Drop the stored content
async fn clear_content(State(state): State<ContentState>) -> Result<StatusCode, ServerError> {
    if state.repo.clear()? {
        info!("Cleared stored content");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use axum::body::to_bytes;
    use rusqlite::Connection;
    use serde_json::{Value as JsonValue, json};

    fn state() -> ContentState {
        let conn = Connection::open_in_memory().unwrap();
        init_database(&conn).unwrap();
        ContentState {
            repo: Arc::new(ContentRepo::new(conn)),
        }
    }

    async fn body_json(response: Response) -> JsonValue {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn request(content: JsonValue) -> Json<SaveContentRequest> {
        Json(SaveContentRequest {
            content,
            timestamp: "2026-01-01T00:00:00.000Z".to_string(),
        })
    }

    #[tokio::test]
    async fn test_get_before_save_is_not_found() {
        let response = get_content(State(state())).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_save_then_get() {
        let state = state();

        let Json(saved) = save_content(State(state.clone()), request(json!({ "hero": {} })))
            .await
            .unwrap();
        assert!(saved.success);

        let response = get_content(State(state)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["content"], json!({ "hero": {} }));
        assert_eq!(body["lastUpdated"], json!(saved.timestamp));
        assert_eq!(body["version"], 1);

        let parsed: GetContentResponse = serde_json::from_value(body).unwrap();
        assert!(parsed.success);
    }

    #[tokio::test]
    async fn test_save_rejects_non_object() {
        let err = save_content(State(state()), request(JsonValue::Null))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_clear() {
        let state = state();
        assert_eq!(
            clear_content(State(state.clone())).await.unwrap(),
            StatusCode::NOT_FOUND
        );

        save_content(State(state.clone()), request(json!({})))
            .await
            .unwrap();
        assert_eq!(
            clear_content(State(state.clone())).await.unwrap(),
            StatusCode::NO_CONTENT
        );

        let response = get_content(State(state)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
