use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::{debug, error, instrument};

use super::{ExtractReceiptItems, GeneratePlan, GenerateShoppingList, ReconcileItems};
use crate::config::GeminiConfig;
use crate::planner::model::{
    GeneratedPlan, GeneratedShoppingList, Ingredient, MatchedPair, MealDay, MealIngredientInfo,
    MealSlot, OcrItem, PlannerSettings,
};

#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("GEMINI_API_KEY is not set")]
    MissingApiKey,
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("gemini api error {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("gemini returned no content")]
    EmptyResponse,
    #[error("could not decode gemini reply: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MealIngredientsEntry {
    meal_name: String,
    #[serde(default)]
    ingredients: Vec<MealIngredientInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShoppingListReply {
    #[serde(default)]
    shopping_list: Vec<Ingredient>,
    #[serde(default)]
    meal_ingredients: Vec<MealIngredientsEntry>,
}

#[derive(Debug, Deserialize)]
struct ReceiptReply {
    #[serde(default)]
    items: Vec<OcrItem>,
}

#[derive(Debug, Deserialize)]
struct MatchReply {
    #[serde(default)]
    matches: Vec<MatchedPair>,
}

/// Gemini `generateContent` client with JSON-schema constrained replies.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn endpoint(&self, key: &str) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model,
            key
        )
    }

    async fn generate<T: DeserializeOwned>(
        &self,
        parts: Vec<Value>,
        schema: Value,
    ) -> Result<T, GeminiError> {
        let key = self
            .config
            .api_key
            .as_deref()
            .ok_or(GeminiError::MissingApiKey)?;

        let response = self
            .http
            .post(self.endpoint(key))
            .json(&request_body(parts, schema))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, "gemini request failed");
            return Err(GeminiError::Api { status, body });
        }

        let reply: GenerateContentResponse = response.json().await?;
        let text = reply_text(reply)?;
        debug!(bytes = text.len(), "gemini reply received");
        Ok(serde_json::from_str(text.trim())?)
    }
}

fn request_body(parts: Vec<Value>, schema: Value) -> Value {
    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": schema,
        },
    })
}

fn reply_text(reply: GenerateContentResponse) -> Result<String, GeminiError> {
    reply
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().find_map(|p| p.text))
        .filter(|t| !t.trim().is_empty())
        .ok_or(GeminiError::EmptyResponse)
}

/// Later entries for the same meal replace earlier ones.
fn fold_meal_ingredients(entries: Vec<MealIngredientsEntry>) -> BTreeMap<String, Vec<MealIngredientInfo>> {
    entries
        .into_iter()
        .filter(|e| !e.meal_name.is_empty())
        .map(|e| (e.meal_name, e.ingredients))
        .collect()
}

fn ingredient_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "name": { "type": "STRING" },
            "quantity": { "type": "STRING", "description": "Total quantity, e.g. '200g' or '1 can'." },
            "category": { "type": "STRING", "description": "Shopping category such as vegetables, meat, seasoning, dry goods." },
            "usedIn": {
                "type": "ARRAY",
                "description": "Names of the meals in the plan that use this ingredient.",
                "items": { "type": "STRING" }
            }
        },
        "required": ["name", "quantity", "category", "usedIn"]
    })
}

fn meal_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": { "name": { "type": "STRING" } },
        "nullable": true
    })
}

fn plan_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "mealPlan": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "day": { "type": "STRING", "description": "The date, formatted YYYY-MM-DD." },
                        "breakfast": meal_schema(),
                        "lunch": meal_schema(),
                        "dinner": meal_schema()
                    },
                    "required": ["day"]
                }
            },
            "shoppingList": { "type": "ARRAY", "items": ingredient_schema() }
        },
        "required": ["mealPlan"]
    })
}

fn shopping_list_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "shoppingList": { "type": "ARRAY", "items": ingredient_schema() },
            "mealIngredients": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "mealName": { "type": "STRING" },
                        "ingredients": {
                            "type": "ARRAY",
                            "items": {
                                "type": "OBJECT",
                                "properties": {
                                    "name": { "type": "STRING" },
                                    "quantity": { "type": "STRING", "description": "Quantity for this one meal." }
                                },
                                "required": ["name", "quantity"]
                            }
                        }
                    },
                    "required": ["mealName", "ingredients"]
                }
            }
        },
        "required": ["shoppingList", "mealIngredients"]
    })
}

fn receipt_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "items": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "name": { "type": "STRING" },
                        "price": { "type": "NUMBER" }
                    },
                    "required": ["name", "price"]
                }
            }
        },
        "required": ["items"]
    })
}

fn match_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "matches": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "receiptItemName": { "type": "STRING" },
                        "shoppingListItemName": { "type": "STRING" }
                    },
                    "required": ["receiptItemName", "shoppingListItemName"]
                }
            }
        },
        "required": ["matches"]
    })
}

fn plan_prompt(settings: &PlannerSettings) -> String {
    let dates: Vec<String> = settings.dates.iter().map(|d| d.to_string()).collect();
    let meals: Vec<&str> = settings
        .meals
        .iter()
        .map(|m| match m {
            MealSlot::Breakfast => "breakfast",
            MealSlot::Lunch => "lunch",
            MealSlot::Dinner => "dinner",
        })
        .collect();
    format!(
        "Create a meal plan for 2 people covering exactly these dates: {}. \
         Plan only these meals each day: {}. Prefer simple dishes that can be cooked \
         in a small condo kitchen. Use the date (YYYY-MM-DD) as the 'day' of each entry. \
         Also list every ingredient to buy, grouped by category, and for each ingredient \
         give 'usedIn', the names of the meals that need it.",
        dates.join(", "),
        meals.join(", ")
    )
}

fn shopping_list_prompt(meal_plan: &[MealDay]) -> Result<String, GeminiError> {
    let plan = serde_json::to_string(meal_plan)?;
    Ok(format!(
        "Given this meal plan: {plan}\n\
         1. Build 'shoppingList': every ingredient to buy for all meals, merging duplicate \
         ingredients, scaled to each meal's 'servings', grouped by category, with 'usedIn' \
         listing the meals that use it.\n\
         2. Build 'mealIngredients': one entry per meal with 'mealName' and 'ingredients', \
         giving the quantity needed for that meal alone."
    ))
}

#[async_trait]
impl GeneratePlan for GeminiClient {
    #[instrument(skip(self, settings), fields(days = settings.dates.len()))]
    async fn generate_plan(&self, settings: &PlannerSettings) -> anyhow::Result<GeneratedPlan> {
        let parts = vec![json!({ "text": plan_prompt(settings) })];
        Ok(self.generate(parts, plan_schema()).await?)
    }
}

#[async_trait]
impl GenerateShoppingList for GeminiClient {
    #[instrument(skip(self, meal_plan))]
    async fn generate_shopping_list(
        &self,
        meal_plan: &[MealDay],
    ) -> anyhow::Result<GeneratedShoppingList> {
        let parts = vec![json!({ "text": shopping_list_prompt(meal_plan)? })];
        let reply: ShoppingListReply = self.generate(parts, shopping_list_schema()).await?;
        Ok(GeneratedShoppingList {
            shopping_list: reply.shopping_list,
            meal_ingredients: fold_meal_ingredients(reply.meal_ingredients),
        })
    }
}

#[async_trait]
impl ExtractReceiptItems for GeminiClient {
    #[instrument(skip(self, image), fields(size = image.len()))]
    async fn extract_receipt_items(
        &self,
        image: Bytes,
        mime: &str,
    ) -> anyhow::Result<Vec<OcrItem>> {
        let parts = vec![
            json!({ "inlineData": { "mimeType": mime, "data": STANDARD.encode(&image) } }),
            json!({ "text": "Read this grocery receipt. List every purchased item with its name \
                             and final price as a number. Skip totals, taxes and discounts." }),
        ];
        let reply: ReceiptReply = self.generate(parts, receipt_schema()).await?;
        Ok(reply.items)
    }
}

#[async_trait]
impl ReconcileItems for GeminiClient {
    #[instrument(skip(self, receipt, unchecked))]
    async fn reconcile_items(
        &self,
        receipt: &[OcrItem],
        unchecked: &[Ingredient],
    ) -> anyhow::Result<Vec<MatchedPair>> {
        let names: Vec<&str> = unchecked.iter().map(|i| i.name.as_str()).collect();
        let prompt = format!(
            "Receipt items: {}\nShopping list items: {}\n\
             Match each receipt item to the shopping list item it most likely is. \
             Use the exact names given. Leave out items without a confident match.",
            serde_json::to_string(receipt)?,
            serde_json::to_string(&names)?
        );
        let reply: MatchReply = self
            .generate(vec![json!({ "text": prompt })], match_schema())
            .await?;
        Ok(reply.matches)
    }
}
