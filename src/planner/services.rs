use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use serde::Deserialize;
use time::OffsetDateTime;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::error::PlannerError;
use super::fuzzy::fuzzy_search;
use super::model::{MealSlot, OcrItem, PlannerSettings};
use super::state::{
    Planner, PlannerView, PriceInput, ReconcileOutcome, ServingsChange, View, LOAD_PLANS_FAILED,
    REFRESH_PLANS_FAILED,
};
use crate::ai::{
    ExtractReceiptItems, GeminiClient, GeneratePlan, GenerateShoppingList, ReconcileItems,
};
use crate::drafts::{accept_draft, DraftStore, HistoryStore};
use crate::plans::PlanStore;

/// The generation capabilities the planner calls out to.
#[derive(Clone)]
pub struct Generators {
    pub plan: Arc<dyn GeneratePlan>,
    pub shopping_list: Arc<dyn GenerateShoppingList>,
    pub receipt: Arc<dyn ExtractReceiptItems>,
    pub reconcile: Arc<dyn ReconcileItems>,
}

impl Generators {
    pub fn gemini(client: GeminiClient) -> Self {
        let client = Arc::new(client);
        Self {
            plan: client.clone(),
            shopping_list: client.clone(),
            receipt: client.clone(),
            reconcile: client,
        }
    }
}

/// Where "continue" takes its plan from.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ContinueSource {
    Draft,
    Saved { id: String },
}

/// Owns one [`Planner`] per signed-in user and runs its remote calls.
///
/// The session map lock is only taken inside synchronous closures, never
/// across an `.await`. Draft slot writes go through a per-user async lock.
pub struct PlannerService {
    sessions: Mutex<HashMap<Uuid, Planner>>,
    draft_locks: AsyncMutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
    generators: Generators,
    plans: Arc<dyn PlanStore>,
    drafts: Arc<dyn DraftStore>,
    history: Arc<dyn HistoryStore>,
}

impl PlannerService {
    pub fn new(
        generators: Generators,
        plans: Arc<dyn PlanStore>,
        drafts: Arc<dyn DraftStore>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            draft_locks: AsyncMutex::new(HashMap::new()),
            generators,
            plans,
            drafts,
            history,
        }
    }

    fn with_session<T>(
        &self,
        user_id: Uuid,
        f: impl FnOnce(&mut Planner) -> Result<T, PlannerError>,
    ) -> Result<T, PlannerError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let planner = sessions.get_mut(&user_id).ok_or(PlannerError::NotSignedIn)?;
        f(planner)
    }

    fn snapshot(&self, user_id: Uuid) -> Result<PlannerView, PlannerError> {
        self.with_session(user_id, |p| Ok(p.snapshot()))
    }

    fn has_session(&self, user_id: Uuid) -> bool {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&user_id)
    }

    // --- session lifecycle ---

    /// Starts a fresh session: validated draft, then saved plans.
    #[instrument(skip(self))]
    pub async fn sign_in(&self, user_id: Uuid) -> PlannerView {
        self.open_session(user_id, true).await
    }

    async fn ensure_session(&self, user_id: Uuid) {
        if !self.has_session(user_id) {
            self.open_session(user_id, false).await;
        }
    }

    async fn open_session(&self, user_id: Uuid, replace: bool) -> PlannerView {
        let draft = self.load_draft(user_id).await;
        let plans = self.plans.list(user_id).await;

        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if !replace {
            if let Some(existing) = sessions.get(&user_id) {
                return existing.snapshot();
            }
        }
        let mut planner = Planner::new();
        planner.sign_in(user_id, draft);
        match plans {
            Ok(plans) => planner.set_saved_plans(plans),
            Err(e) => {
                error!(error = %e, user_id = %user_id, "load saved plans failed");
                planner.set_error(LOAD_PLANS_FAILED);
            }
        }
        let view = planner.snapshot();
        sessions.insert(user_id, planner);
        info!(user_id = %user_id, "planner session opened");
        view
    }

    /// Reads the draft slot; foreign or unreadable drafts are discarded.
    async fn load_draft(&self, user_id: Uuid) -> Option<crate::planner::model::DraftPlan> {
        let loaded = match self.drafts.load(user_id).await {
            Ok(draft) => draft,
            Err(e) => {
                warn!(error = %e, user_id = %user_id, "unreadable draft, discarding");
                self.clear_draft(user_id).await;
                return None;
            }
        };
        let had_draft = loaded.is_some();
        let accepted = accept_draft(user_id, loaded);
        if had_draft && accepted.is_none() {
            self.clear_draft(user_id).await;
        }
        accepted
    }

    #[instrument(skip(self))]
    pub async fn sign_out(&self, user_id: Uuid) -> PlannerView {
        let removed = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&user_id);
        self.clear_draft(user_id).await;
        let mut planner = removed.unwrap_or_default();
        planner.sign_out();
        info!(user_id = %user_id, "planner session closed");
        planner.snapshot()
    }

    pub async fn view(&self, user_id: Uuid) -> Result<PlannerView, PlannerError> {
        self.ensure_session(user_id).await;
        self.snapshot(user_id)
    }

    // --- draft mirroring ---

    /// Serializes draft slot writes for one user. The snapshot is taken while
    /// holding it, so a mirror can never land after a later clear.
    async fn draft_guard(&self, user_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = self
            .draft_locks
            .lock()
            .await
            .entry(user_id)
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    async fn mirror_draft(&self, user_id: Uuid) {
        let _guard = self.draft_guard(user_id).await;
        let draft = self.with_session(user_id, |p| Ok(p.draft_snapshot(OffsetDateTime::now_utc())));
        if let Ok(Some(draft)) = draft {
            if let Err(e) = self.drafts.save(user_id, &draft).await {
                error!(error = %e, user_id = %user_id, "draft save failed");
            }
        }
    }

    async fn clear_draft(&self, user_id: Uuid) {
        let _guard = self.draft_guard(user_id).await;
        if let Err(e) = self.drafts.clear(user_id).await {
            error!(error = %e, user_id = %user_id, "draft clear failed");
        }
    }

    /// Runs a local edit, mirrors the draft and returns the new view.
    async fn edit(
        &self,
        user_id: Uuid,
        f: impl FnOnce(&mut Planner) -> Result<(), PlannerError>,
    ) -> Result<PlannerView, PlannerError> {
        self.ensure_session(user_id).await;
        self.with_session(user_id, f)?;
        self.mirror_draft(user_id).await;
        self.snapshot(user_id)
    }

    // --- generation and editing ---

    #[instrument(skip(self, settings))]
    pub async fn generate(
        &self,
        user_id: Uuid,
        settings: PlannerSettings,
    ) -> Result<PlannerView, PlannerError> {
        self.ensure_session(user_id).await;
        let (ticket, settings) = self.with_session(user_id, |p| p.begin_generation(&settings))?;
        self.clear_draft(user_id).await;

        let outcome = self.generators.plan.generate_plan(&settings).await;
        if let Err(e) = &outcome {
            error!(error = %e, user_id = %user_id, "generate plan failed");
        }
        self.with_session(user_id, |p| p.finish_generation(ticket, &settings, outcome))?;
        self.mirror_draft(user_id).await;
        self.snapshot(user_id)
    }

    #[instrument(skip(self, name))]
    pub async fn edit_meal(
        &self,
        user_id: Uuid,
        day_index: usize,
        slot: MealSlot,
        name: String,
    ) -> Result<PlannerView, PlannerError> {
        let view = self
            .edit(user_id, |p| p.edit_meal(day_index, slot, &name))
            .await?;
        self.remember_meal(user_id, &name).await;
        Ok(view)
    }

    async fn remember_meal(&self, user_id: Uuid, name: &str) {
        let mut history = match self.history.load(user_id).await {
            Ok(h) => h,
            Err(e) => {
                error!(error = %e, user_id = %user_id, "meal history load failed");
                return;
            }
        };
        if history.add(name) {
            if let Err(e) = self.history.save(user_id, &history).await {
                error!(error = %e, user_id = %user_id, "meal history save failed");
            }
        }
    }

    pub async fn update_servings(
        &self,
        user_id: Uuid,
        day_index: usize,
        slot: MealSlot,
        change: ServingsChange,
    ) -> Result<PlannerView, PlannerError> {
        self.edit(user_id, |p| p.update_servings(day_index, slot, change))
            .await
    }

    #[instrument(skip(self))]
    pub async fn finalize(&self, user_id: Uuid) -> Result<PlannerView, PlannerError> {
        self.ensure_session(user_id).await;
        let (ticket, meal_plan) = self.with_session(user_id, |p| p.begin_finalize())?;

        let outcome = self
            .generators
            .shopping_list
            .generate_shopping_list(&meal_plan)
            .await;
        if let Err(e) = &outcome {
            error!(error = %e, user_id = %user_id, "generate shopping list failed");
        }
        self.with_session(user_id, |p| p.finish_finalize(ticket, outcome))?;
        self.mirror_draft(user_id).await;
        self.snapshot(user_id)
    }

    // --- shopping list ---

    pub async fn toggle_ingredient(
        &self,
        user_id: Uuid,
        name: String,
    ) -> Result<PlannerView, PlannerError> {
        self.edit(user_id, |p| p.toggle_ingredient(&name)).await
    }

    pub async fn toggle_all(&self, user_id: Uuid) -> Result<PlannerView, PlannerError> {
        self.edit(user_id, |p| p.toggle_all()).await
    }

    pub async fn update_price(
        &self,
        user_id: Uuid,
        name: String,
        price: PriceInput,
    ) -> Result<PlannerView, PlannerError> {
        self.edit(user_id, |p| p.update_price(&name, &price)).await
    }

    pub async fn add_expense(
        &self,
        user_id: Uuid,
        name: String,
        price: f64,
    ) -> Result<PlannerView, PlannerError> {
        self.edit(user_id, |p| p.add_expense(&name, price).map(|_| ()))
            .await
    }

    pub async fn remove_expense(
        &self,
        user_id: Uuid,
        id: String,
    ) -> Result<PlannerView, PlannerError> {
        self.edit(user_id, |p| p.remove_expense(&id)).await
    }

    // --- receipts ---

    #[instrument(skip(self, image), fields(size = image.len()))]
    pub async fn process_receipt(
        &self,
        user_id: Uuid,
        image: Bytes,
        mime: String,
    ) -> Result<PlannerView, PlannerError> {
        if image.is_empty() {
            return Err(PlannerError::invalid("receipt image is empty"));
        }
        if !mime.starts_with("image/") {
            return Err(PlannerError::invalid(format!("unsupported receipt type {}", mime)));
        }
        self.ensure_session(user_id).await;
        let ticket = self.with_session(user_id, |p| p.begin_receipt())?;

        let outcome = self
            .generators
            .receipt
            .extract_receipt_items(image, &mime)
            .await;
        match &outcome {
            Ok(items) => debug!(user_id = %user_id, count = items.len(), "receipt read"),
            Err(e) => error!(error = %e, user_id = %user_id, "receipt extraction failed"),
        }
        self.with_session(user_id, |p| p.finish_receipt(ticket, outcome))?;
        self.snapshot(user_id)
    }

    #[instrument(skip(self, selected), fields(selected = selected.len()))]
    pub async fn apply_receipt(
        &self,
        user_id: Uuid,
        selected: Vec<OcrItem>,
    ) -> Result<(ReconcileOutcome, PlannerView), PlannerError> {
        self.ensure_session(user_id).await;
        let (ticket, unchecked) = self.with_session(user_id, |p| p.begin_reconcile(&selected))?;

        let outcome = self
            .generators
            .reconcile
            .reconcile_items(&selected, &unchecked)
            .await;
        if let Err(e) = &outcome {
            error!(error = %e, user_id = %user_id, "receipt reconciliation failed");
        }
        let result = self.with_session(user_id, |p| p.finish_reconcile(ticket, &selected, outcome))?;
        self.mirror_draft(user_id).await;
        Ok((result, self.snapshot(user_id)?))
    }

    // --- lifecycle ---

    #[instrument(skip(self))]
    pub async fn save(&self, user_id: Uuid) -> Result<PlannerView, PlannerError> {
        self.ensure_session(user_id).await;
        let (ticket, plan) =
            self.with_session(user_id, |p| p.begin_save(OffsetDateTime::now_utc()))?;

        let outcome = match self.plans.create(&plan, user_id).await {
            Ok(()) => {
                info!(user_id = %user_id, plan_id = %plan.id, "plan saved");
                Ok(plan)
            }
            Err(e) => {
                error!(error = %e, user_id = %user_id, "save plan failed");
                Err(e)
            }
        };
        let saved = outcome.is_ok();
        let finished = self.with_session(user_id, |p| p.finish_save(ticket, outcome));
        if saved {
            self.clear_draft(user_id).await;
        } else if finished.is_ok() {
            self.mirror_draft(user_id).await;
        }
        finished?;
        self.snapshot(user_id)
    }

    pub async fn continue_plan(
        &self,
        user_id: Uuid,
        source: ContinueSource,
    ) -> Result<PlannerView, PlannerError> {
        self.edit(user_id, |p| {
            let content = match &source {
                ContinueSource::Draft => p
                    .active_plan()
                    .map(|d| d.content.clone())
                    .ok_or_else(|| PlannerError::NotFound("draft".into()))?,
                ContinueSource::Saved { id } => p.find_saved(id)?.content.clone(),
            };
            p.continue_plan(content, OffsetDateTime::now_utc()).map(|_| ())
        })
        .await
    }

    pub async fn view_saved_plan(
        &self,
        user_id: Uuid,
        id: String,
    ) -> Result<PlannerView, PlannerError> {
        self.ensure_session(user_id).await;
        self.with_session(user_id, |p| p.view_saved_plan(&id))?;
        self.snapshot(user_id)
    }

    pub async fn back(&self, user_id: Uuid) -> Result<PlannerView, PlannerError> {
        self.ensure_session(user_id).await;
        self.with_session(user_id, |p| p.back())?;
        self.snapshot(user_id)
    }

    pub async fn navigate(&self, user_id: Uuid, target: View) -> Result<PlannerView, PlannerError> {
        self.edit(user_id, |p| p.navigate(target)).await
    }

    #[instrument(skip(self))]
    pub async fn reset(&self, user_id: Uuid) -> Result<PlannerView, PlannerError> {
        self.ensure_session(user_id).await;
        self.with_session(user_id, |p| p.reset())?;
        self.clear_draft(user_id).await;

        let plans = self.plans.list(user_id).await;
        self.with_session(user_id, |p| {
            match plans {
                Ok(plans) => p.set_saved_plans(plans),
                Err(e) => {
                    error!(error = %e, user_id = %user_id, "refresh saved plans failed");
                    p.set_error(REFRESH_PLANS_FAILED);
                }
            }
            Ok(p.snapshot())
        })
    }

    /// Autocomplete over the user's meal history, newest first, then the
    /// meals already in the plan.
    pub async fn suggestions(&self, user_id: Uuid, query: &str) -> Result<Vec<String>, PlannerError> {
        self.ensure_session(user_id).await;
        let in_plan = self.with_session(user_id, |p| Ok(p.meal_names()))?;
        let history = match self.history.load(user_id).await {
            Ok(h) => h,
            Err(e) => {
                warn!(error = %e, user_id = %user_id, "meal history unavailable");
                Default::default()
            }
        };

        let mut pool: Vec<String> = history.newest_first().map(str::to_string).collect();
        for name in in_plan {
            if !pool.contains(&name) {
                pool.push(name);
            }
        }
        Ok(fuzzy_search(query, &pool)
            .into_iter()
            .map(str::to_string)
            .collect())
    }
}
