//! Generation collaborators. Each capability is its own trait so tests can
//! fake exactly the call they exercise.

use async_trait::async_trait;
use bytes::Bytes;

use crate::planner::model::{
    GeneratedPlan, GeneratedShoppingList, Ingredient, MatchedPair, MealDay, OcrItem,
    PlannerSettings,
};

pub mod gemini;

pub use gemini::GeminiClient;

#[async_trait]
pub trait GeneratePlan: Send + Sync {
    async fn generate_plan(&self, settings: &PlannerSettings) -> anyhow::Result<GeneratedPlan>;
}

#[async_trait]
pub trait GenerateShoppingList: Send + Sync {
    /// Quantities must account for each meal's servings.
    async fn generate_shopping_list(
        &self,
        meal_plan: &[MealDay],
    ) -> anyhow::Result<GeneratedShoppingList>;
}

#[async_trait]
pub trait ExtractReceiptItems: Send + Sync {
    async fn extract_receipt_items(&self, image: Bytes, mime: &str)
        -> anyhow::Result<Vec<OcrItem>>;
}

#[async_trait]
pub trait ReconcileItems: Send + Sync {
    async fn reconcile_items(
        &self,
        receipt: &[OcrItem],
        unchecked: &[Ingredient],
    ) -> anyhow::Result<Vec<MatchedPair>>;
}
