use serde::{Deserialize, Serialize};

use super::model::OcrItem;
use super::state::{PlannerView, PriceInput, ReconcileOutcome, View};

#[derive(Debug, Deserialize)]
pub struct EditMealRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct IngredientRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct PriceRequest {
    pub name: String,
    pub price: PriceInput,
}

#[derive(Debug, Deserialize)]
pub struct ExpenseRequest {
    pub name: String,
    pub price: f64,
}

/// POST /planner/receipt/base64 { image_b64, content_type }
#[derive(Debug, Deserialize)]
pub struct ReceiptBase64Request {
    pub image_b64: String,
    pub content_type: String,
}

#[derive(Debug, Deserialize)]
pub struct ApplyReceiptRequest {
    pub selected: Vec<OcrItem>,
}

#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub view: View,
}

#[derive(Debug, Deserialize)]
pub struct SuggestionQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ApplyReceiptResponse {
    #[serde(flatten)]
    pub outcome: ReconcileOutcome,
    pub planner: PlannerView,
}
