use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

pub const DEFAULT_SERVINGS: u32 = 2;

fn default_servings() -> u32 {
    DEFAULT_SERVINGS
}

/// Meal slot within a day.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Dinner,
}

impl MealSlot {
    pub const ALL: [MealSlot; 3] = [MealSlot::Breakfast, MealSlot::Lunch, MealSlot::Dinner];
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Meal {
    pub name: String,
    #[serde(default = "default_servings")]
    pub servings: u32,
}

impl Meal {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            servings: DEFAULT_SERVINGS,
        }
    }
}

/// One day of the plan. `day` is the ISO date label (`YYYY-MM-DD`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MealDay {
    pub day: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakfast: Option<Meal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lunch: Option<Meal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dinner: Option<Meal>,
}

impl MealDay {
    pub fn empty(day: impl Into<String>) -> Self {
        Self {
            day: day.into(),
            ..Default::default()
        }
    }

    pub fn slot(&self, slot: MealSlot) -> Option<&Meal> {
        match slot {
            MealSlot::Breakfast => self.breakfast.as_ref(),
            MealSlot::Lunch => self.lunch.as_ref(),
            MealSlot::Dinner => self.dinner.as_ref(),
        }
    }

    pub fn slot_mut(&mut self, slot: MealSlot) -> &mut Option<Meal> {
        match slot {
            MealSlot::Breakfast => &mut self.breakfast,
            MealSlot::Lunch => &mut self.lunch,
            MealSlot::Dinner => &mut self.dinner,
        }
    }

    pub fn meals(&self) -> impl Iterator<Item = &Meal> {
        MealSlot::ALL.into_iter().filter_map(move |s| self.slot(s))
    }
}

/// Shopping-list line item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    pub name: String,
    pub quantity: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub checked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default)]
    pub used_in: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MealIngredientInfo {
    pub name: String,
    pub quantity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdditionalExpense {
    pub id: String,
    pub name: String,
    pub price: f64,
}

impl AdditionalExpense {
    pub fn new(name: String, price: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            price,
        }
    }
}

/// Receipt line item recognised by OCR.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OcrItem {
    pub name: String,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MatchedPair {
    pub receipt_item_name: String,
    pub shopping_list_item_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlannerSettings {
    pub dates: Vec<Date>,
    pub meals: Vec<MealSlot>,
}

impl PlannerSettings {
    /// Duplicates removed, request order kept.
    pub fn normalized(&self) -> Self {
        let mut dates = Vec::with_capacity(self.dates.len());
        for d in &self.dates {
            if !dates.contains(d) {
                dates.push(*d);
            }
        }
        let mut meals = Vec::with_capacity(self.meals.len());
        for m in &self.meals {
            if !meals.contains(m) {
                meals.push(*m);
            }
        }
        Self { dates, meals }
    }
}

/// The editable body of a plan, shared by drafts and saved plans.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlanContent {
    #[serde(default)]
    pub meal_plan: Vec<MealDay>,
    #[serde(default)]
    pub shopping_list: Vec<Ingredient>,
    #[serde(default)]
    pub meal_ingredients: BTreeMap<String, Vec<MealIngredientInfo>>,
    #[serde(default)]
    pub additional_expenses: Vec<AdditionalExpense>,
    #[serde(default)]
    pub plan_dates: Vec<Date>,
}

impl PlanContent {
    pub fn is_empty(&self) -> bool {
        self.meal_plan.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SavedPlan {
    pub id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub user_id: Uuid,
    #[serde(flatten)]
    pub content: PlanContent,
}

impl SavedPlan {
    pub fn snapshot(user_id: Uuid, content: PlanContent, now: OffsetDateTime) -> Self {
        let millis = now.unix_timestamp_nanos() / 1_000_000;
        Self {
            id: format!("plan_{}", millis),
            created_at: now,
            user_id,
            content,
        }
    }
}

/// In-progress plan mirrored into the durable draft slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DraftPlan {
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(flatten)]
    pub content: PlanContent,
}

/// Raw output of the plan generator, before alignment to the requested dates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedPlan {
    #[serde(default)]
    pub meal_plan: Vec<MealDay>,
    #[serde(default)]
    pub shopping_list: Vec<Ingredient>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedShoppingList {
    #[serde(default)]
    pub shopping_list: Vec<Ingredient>,
    #[serde(default)]
    pub meal_ingredients: BTreeMap<String, Vec<MealIngredientInfo>>,
}
