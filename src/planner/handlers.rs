use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::{error, instrument, warn};

use super::dto::{
    ApplyReceiptRequest, ApplyReceiptResponse, EditMealRequest, ExpenseRequest,
    IngredientRequest, NavigateRequest, PriceRequest, ReceiptBase64Request, SuggestionQuery,
    SuggestionsResponse,
};
use super::error::PlannerError;
use super::model::{MealSlot, PlannerSettings};
use super::services::ContinueSource;
use super::state::{PlannerView, ServingsChange};
use crate::{auth::AuthUser, state::AppState};

type ViewResult = Result<Json<PlannerView>, (StatusCode, String)>;

const RECEIPT_LIMIT: usize = 10 * 1024 * 1024;

pub fn planner_routes() -> Router<AppState> {
    Router::new()
        .route("/planner", get(get_planner))
        .route("/planner/generate", post(generate))
        .route("/planner/days/:day/:slot", put(edit_meal))
        .route("/planner/days/:day/:slot/servings", patch(update_servings))
        .route("/planner/finalize", post(finalize))
        .route("/planner/shopping-list/toggle", post(toggle_ingredient))
        .route("/planner/shopping-list/toggle-all", post(toggle_all))
        .route("/planner/shopping-list/price", put(update_price))
        .route("/planner/expenses", post(add_expense))
        .route("/planner/expenses/:id", delete(remove_expense))
        .route("/planner/receipt/apply", post(apply_receipt))
        .route("/planner/navigate", post(navigate))
        .route("/planner/save", post(save))
        .route("/planner/reset", post(reset))
        .route("/planner/continue", post(continue_plan))
        .route("/planner/back", post(back))
        .route("/planner/saved/:id/view", post(view_saved_plan))
        .route("/planner/suggestions", get(suggestions))
}

pub fn receipt_routes() -> Router<AppState> {
    Router::new()
        .route("/planner/receipt", post(upload_receipt))
        .route("/planner/receipt/base64", post(upload_receipt_base64))
        .layer(DefaultBodyLimit::max(RECEIPT_LIMIT))
}

fn reject(e: PlannerError) -> (StatusCode, String) {
    warn!(error = %e, "planner request rejected");
    e.into()
}

#[instrument(skip(state))]
pub async fn get_planner(State(state): State<AppState>, AuthUser(user_id): AuthUser) -> ViewResult {
    state.planner.view(user_id).await.map(Json).map_err(reject)
}

#[instrument(skip(state, settings))]
pub async fn generate(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(settings): Json<PlannerSettings>,
) -> ViewResult {
    state
        .planner
        .generate(user_id, settings)
        .await
        .map(Json)
        .map_err(reject)
}

#[instrument(skip(state, body))]
pub async fn edit_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path((day, slot)): Path<(usize, MealSlot)>,
    Json(body): Json<EditMealRequest>,
) -> ViewResult {
    state
        .planner
        .edit_meal(user_id, day, slot, body.name)
        .await
        .map(Json)
        .map_err(reject)
}

#[instrument(skip(state))]
pub async fn update_servings(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path((day, slot)): Path<(usize, MealSlot)>,
    Json(change): Json<ServingsChange>,
) -> ViewResult {
    state
        .planner
        .update_servings(user_id, day, slot, change)
        .await
        .map(Json)
        .map_err(reject)
}

#[instrument(skip(state))]
pub async fn finalize(State(state): State<AppState>, AuthUser(user_id): AuthUser) -> ViewResult {
    state.planner.finalize(user_id).await.map(Json).map_err(reject)
}

#[instrument(skip(state))]
pub async fn toggle_ingredient(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<IngredientRequest>,
) -> ViewResult {
    state
        .planner
        .toggle_ingredient(user_id, body.name)
        .await
        .map(Json)
        .map_err(reject)
}

#[instrument(skip(state))]
pub async fn toggle_all(State(state): State<AppState>, AuthUser(user_id): AuthUser) -> ViewResult {
    state.planner.toggle_all(user_id).await.map(Json).map_err(reject)
}

#[instrument(skip(state))]
pub async fn update_price(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<PriceRequest>,
) -> ViewResult {
    state
        .planner
        .update_price(user_id, body.name, body.price)
        .await
        .map(Json)
        .map_err(reject)
}

#[instrument(skip(state))]
pub async fn add_expense(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<ExpenseRequest>,
) -> Result<(StatusCode, Json<PlannerView>), (StatusCode, String)> {
    let view = state
        .planner
        .add_expense(user_id, body.name, body.price)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[instrument(skip(state))]
pub async fn remove_expense(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> ViewResult {
    state
        .planner
        .remove_expense(user_id, id)
        .await
        .map(Json)
        .map_err(reject)
}

/// POST /planner/receipt (multipart, field `file`)
#[instrument(skip(state, mp))]
pub async fn upload_receipt(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut mp: Multipart,
) -> ViewResult {
    while let Some(field) = mp.next_field().await.map_err(|e| {
        warn!(error = %e, "bad multipart body");
        (StatusCode::BAD_REQUEST, e.to_string())
    })? {
        if field.name() != Some("file") {
            continue;
        }
        let mime = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| "application/octet-stream".into());
        let data = field.bytes().await.map_err(|e| {
            error!(error = %e, "read receipt upload failed");
            (StatusCode::BAD_REQUEST, e.to_string())
        })?;
        return state
            .planner
            .process_receipt(user_id, data, mime)
            .await
            .map(Json)
            .map_err(reject);
    }
    Err((StatusCode::BAD_REQUEST, "file is required".into()))
}

#[instrument(skip(state, body))]
pub async fn upload_receipt_base64(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<ReceiptBase64Request>,
) -> ViewResult {
    let bytes = STANDARD
        .decode(body.image_b64.trim())
        .map_err(|_| (StatusCode::BAD_REQUEST, "invalid base64".into()))?;
    state
        .planner
        .process_receipt(user_id, bytes.into(), body.content_type)
        .await
        .map(Json)
        .map_err(reject)
}

#[instrument(skip(state, body))]
pub async fn apply_receipt(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<ApplyReceiptRequest>,
) -> Result<Json<ApplyReceiptResponse>, (StatusCode, String)> {
    let (outcome, planner) = state
        .planner
        .apply_receipt(user_id, body.selected)
        .await
        .map_err(reject)?;
    Ok(Json(ApplyReceiptResponse { outcome, planner }))
}

#[instrument(skip(state))]
pub async fn navigate(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<NavigateRequest>,
) -> ViewResult {
    state
        .planner
        .navigate(user_id, body.view)
        .await
        .map(Json)
        .map_err(reject)
}

#[instrument(skip(state))]
pub async fn save(State(state): State<AppState>, AuthUser(user_id): AuthUser) -> ViewResult {
    state.planner.save(user_id).await.map(Json).map_err(reject)
}

#[instrument(skip(state))]
pub async fn reset(State(state): State<AppState>, AuthUser(user_id): AuthUser) -> ViewResult {
    state.planner.reset(user_id).await.map(Json).map_err(reject)
}

#[instrument(skip(state))]
pub async fn continue_plan(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(source): Json<ContinueSource>,
) -> ViewResult {
    state
        .planner
        .continue_plan(user_id, source)
        .await
        .map(Json)
        .map_err(reject)
}

#[instrument(skip(state))]
pub async fn back(State(state): State<AppState>, AuthUser(user_id): AuthUser) -> ViewResult {
    state.planner.back(user_id).await.map(Json).map_err(reject)
}

#[instrument(skip(state))]
pub async fn view_saved_plan(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> ViewResult {
    state
        .planner
        .view_saved_plan(user_id, id)
        .await
        .map(Json)
        .map_err(reject)
}

#[instrument(skip(state))]
pub async fn suggestions(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<SuggestionQuery>,
) -> Result<Json<SuggestionsResponse>, (StatusCode, String)> {
    let suggestions = state
        .planner
        .suggestions(user_id, &query.q)
        .await
        .map_err(reject)?;
    Ok(Json(SuggestionsResponse { suggestions }))
}
