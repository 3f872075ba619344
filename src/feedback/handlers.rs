use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use tracing::{error, info, instrument, warn};

use super::dto::{FeedbackRequest, FeedbackResponse};
use super::repo::insert_feedback;
use crate::{auth::AuthUser, state::AppState};

pub fn feedback_routes() -> Router<AppState> {
    Router::new().route("/feedback", post(submit_feedback))
}

#[instrument(skip(state, payload))]
pub async fn submit_feedback(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<FeedbackRequest>,
) -> Result<(StatusCode, Json<FeedbackResponse>), (StatusCode, String)> {
    let Some(details) = payload.details() else {
        warn!(user_id = %user_id, "empty feedback");
        return Err((StatusCode::BAD_REQUEST, "Feedback details are required".into()));
    };

    let (id, created_at) = insert_feedback(&state.db, user_id, payload.topic, details)
        .await
        .map_err(|e| {
            error!(error = %e, user_id = %user_id, "insert feedback failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    info!(user_id = %user_id, feedback_id = %id, topic = payload.topic.as_str(), "feedback received");
    Ok((
        StatusCode::CREATED,
        Json(FeedbackResponse {
            id,
            topic: payload.topic,
            created_at,
        }),
    ))
}
