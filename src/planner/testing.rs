//! Deterministic collaborators for planner tests.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Notify;

use super::model::{
    GeneratedPlan, GeneratedShoppingList, Ingredient, MatchedPair, Meal, MealDay, OcrItem,
    PlannerSettings,
};
use super::services::{Generators, PlannerService};
use crate::ai::{ExtractReceiptItems, GeneratePlan, GenerateShoppingList, ReconcileItems};
use crate::drafts::ObjectSlots;
use crate::plans::memory::MemoryPlanStore;
use crate::storage::{MemoryStorage, StorageClient};

#[derive(Default)]
pub struct FakeAi {
    pub fail_plan: AtomicBool,
    gate: Option<Arc<Notify>>,
    receipt: Mutex<Vec<OcrItem>>,
    matches: Mutex<Vec<MatchedPair>>,
}

impl FakeAi {
    /// Plan generation waits for the returned gate to be notified.
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Notify::new())),
            ..Default::default()
        }
    }

    pub fn gate(&self) -> Option<Arc<Notify>> {
        self.gate.clone()
    }

    pub fn set_receipt(&self, items: Vec<OcrItem>) {
        *self.receipt.lock().unwrap() = items;
    }

    pub fn set_matches(&self, pairs: Vec<MatchedPair>) {
        *self.matches.lock().unwrap() = pairs;
    }
}

#[async_trait]
impl GeneratePlan for FakeAi {
    async fn generate_plan(&self, settings: &PlannerSettings) -> anyhow::Result<GeneratedPlan> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail_plan.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("generator offline");
        }
        // Fills every slot, requested or not, with a duplicate fragment per day.
        let mut meal_plan = Vec::new();
        for date in &settings.dates {
            let label = date.to_string();
            meal_plan.push(MealDay {
                day: label.clone(),
                breakfast: Some(Meal::named(format!("Porridge {label}"))),
                lunch: Some(Meal::named(format!("Soup {label}"))),
                dinner: None,
            });
            meal_plan.push(MealDay {
                day: label.clone(),
                breakfast: None,
                lunch: None,
                dinner: Some(Meal { name: format!("Curry {label}"), servings: 6 }),
            });
        }
        Ok(GeneratedPlan {
            meal_plan,
            shopping_list: Vec::new(),
        })
    }
}

#[async_trait]
impl GenerateShoppingList for FakeAi {
    async fn generate_shopping_list(
        &self,
        meal_plan: &[MealDay],
    ) -> anyhow::Result<GeneratedShoppingList> {
        let mut shopping_list: Vec<Ingredient> = meal_plan
            .iter()
            .flat_map(|d| d.meals())
            .map(|m| Ingredient {
                name: format!("{} base", m.name),
                quantity: format!("{} portions", m.servings),
                category: "Pantry".into(),
                checked: true,
                price: Some(5.0),
                used_in: vec![m.name.clone()],
            })
            .collect();
        shopping_list.push(Ingredient {
            name: "unused garnish".into(),
            quantity: "1".into(),
            category: String::new(),
            checked: false,
            price: None,
            used_in: Vec::new(),
        });
        Ok(GeneratedShoppingList {
            shopping_list,
            meal_ingredients: Default::default(),
        })
    }
}

#[async_trait]
impl ExtractReceiptItems for FakeAi {
    async fn extract_receipt_items(&self, _image: Bytes, _mime: &str) -> anyhow::Result<Vec<OcrItem>> {
        Ok(self.receipt.lock().unwrap().clone())
    }
}

#[async_trait]
impl ReconcileItems for FakeAi {
    async fn reconcile_items(
        &self,
        _receipt: &[OcrItem],
        _unchecked: &[Ingredient],
    ) -> anyhow::Result<Vec<MatchedPair>> {
        Ok(self.matches.lock().unwrap().clone())
    }
}

pub struct Harness {
    pub service: Arc<PlannerService>,
    pub ai: Arc<FakeAi>,
    pub plans: Arc<MemoryPlanStore>,
    pub storage: Arc<dyn StorageClient>,
}

/// Object storage whose next `put_object` waits for a gate.
#[derive(Default)]
pub struct HeldStorage {
    inner: MemoryStorage,
    hold: Mutex<Option<Arc<Notify>>>,
    pub entered: Notify,
}

impl HeldStorage {
    pub fn hold_next_put(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.hold.lock().unwrap() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl StorageClient for HeldStorage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        let hold = self.hold.lock().unwrap().take();
        if let Some(gate) = hold {
            self.entered.notify_one();
            gate.notified().await;
        }
        self.inner.put_object(key, body, content_type).await
    }

    async fn get_object(&self, key: &str) -> anyhow::Result<Option<Bytes>> {
        self.inner.get_object(key).await
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.inner.delete_object(key).await
    }
}

pub fn service_with(ai: FakeAi) -> Harness {
    service_with_storage(ai, Arc::new(MemoryStorage::new()))
}

pub fn service_with_storage(ai: FakeAi, storage: Arc<dyn StorageClient>) -> Harness {
    let ai = Arc::new(ai);
    let plans = Arc::new(MemoryPlanStore::default());
    let slots = Arc::new(ObjectSlots::new(storage.clone()));
    let generators = Generators {
        plan: ai.clone(),
        shopping_list: ai.clone(),
        receipt: ai.clone(),
        reconcile: ai.clone(),
    };
    let service = Arc::new(PlannerService::new(
        generators,
        plans.clone(),
        slots.clone(),
        slots,
    ));
    Harness {
        service,
        ai,
        plans,
        storage,
    }
}
