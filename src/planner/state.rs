use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::error::PlannerError;
use super::merge::align_to_settings;
use super::model::{
    AdditionalExpense, DraftPlan, GeneratedPlan, GeneratedShoppingList, Ingredient, MatchedPair,
    Meal, MealDay, MealIngredientInfo, MealSlot, OcrItem, PlanContent, PlannerSettings,
    SavedPlan, DEFAULT_SERVINGS,
};
use super::summary::{self, CategoryGroup, ShoppingProgress, SpendSummary};

pub const LOAD_PLANS_FAILED: &str = "Could not load saved plans.";
pub const REFRESH_PLANS_FAILED: &str = "Could not refresh saved plans.";
pub const SAVE_REQUIRES_LOGIN: &str = "You must be logged in to save a plan.";

/// Screens of the planner. `Loading` is a transient overlay entered before
/// every remote call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum View {
    AuthLoading,
    Login,
    Dashboard,
    Loading,
    Planning,
    ShoppingList,
    WeeklySummary,
    ViewSavedPlan,
}

impl View {
    /// Views in which a draft plan is being worked on.
    pub fn is_working(self) -> bool {
        matches!(
            self,
            View::Planning | View::ShoppingList | View::WeeklySummary
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteOp {
    GeneratePlan,
    FinalizePlan,
    SavePlan,
    ProcessReceipt,
    ApplyReceipt,
}

impl RemoteOp {
    pub fn failure_message(self) -> &'static str {
        match self {
            RemoteOp::GeneratePlan => "Could not generate the meal plan.",
            RemoteOp::FinalizePlan => "Could not generate the shopping list.",
            RemoteOp::SavePlan => "Failed to save the plan.",
            RemoteOp::ProcessReceipt => "Could not read the receipt.",
            RemoteOp::ApplyReceipt => "Could not match the receipt items.",
        }
    }
}

/// Proof that a remote call was started. Outcomes are only applied while the
/// ticket is still the session's current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    op: RemoteOp,
    epoch: u64,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    ticket: Ticket,
    return_to: View,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PriceInput {
    Number(f64),
    Text(String),
}

impl PriceInput {
    /// Non-numeric, negative or non-finite input clears the price.
    pub fn coerce(&self) -> Option<f64> {
        let value = match self {
            PriceInput::Number(n) => *n,
            PriceInput::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        (value.is_finite() && value >= 0.0).then_some(value)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServingsChange {
    Delta(i64),
    Set(i64),
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub matched: usize,
    pub remaining: usize,
}

/// Serializable snapshot of a session, returned by every planner endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerView {
    pub view: View,
    pub error: Option<String>,
    pub meal_plan: Vec<MealDay>,
    pub shopping_list: Vec<Ingredient>,
    pub meal_ingredients: BTreeMap<String, Vec<MealIngredientInfo>>,
    pub additional_expenses: Vec<AdditionalExpense>,
    pub plan_dates: Vec<time::Date>,
    pub categories: Vec<CategoryGroup>,
    pub progress: ShoppingProgress,
    pub spend: SpendSummary,
    pub saved_plans: Vec<SavedPlan>,
    pub selected_plan: Option<SavedPlan>,
    pub active_plan: Option<DraftPlan>,
    pub ocr_results: Vec<OcrItem>,
}

/// Per-user planner state machine. Every method is synchronous; remote work
/// is bracketed by `begin_*` / `finish_*` pairs so callers never hold the
/// session across an await.
#[derive(Debug, Clone)]
pub struct Planner {
    user_id: Option<Uuid>,
    view: View,
    plan: PlanContent,
    error: Option<String>,
    saved_plans: Vec<SavedPlan>,
    selected_plan: Option<SavedPlan>,
    active_plan: Option<DraftPlan>,
    ocr_results: Vec<OcrItem>,
    in_flight: Option<InFlight>,
    epoch: u64,
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

impl Planner {
    pub fn new() -> Self {
        Self {
            user_id: None,
            view: View::AuthLoading,
            plan: PlanContent::default(),
            error: None,
            saved_plans: Vec::new(),
            selected_plan: None,
            active_plan: None,
            ocr_results: Vec::new(),
            in_flight: None,
            epoch: 0,
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user_id
    }

    pub fn plan(&self) -> &PlanContent {
        &self.plan
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn saved_plans(&self) -> &[SavedPlan] {
        &self.saved_plans
    }

    pub fn active_plan(&self) -> Option<&DraftPlan> {
        self.active_plan.as_ref()
    }

    pub fn set_error(&mut self, msg: impl Into<String>) {
        self.error = Some(msg.into());
    }

    // --- session ---

    /// AUTH_LOADING -> DASHBOARD. `draft` must already be validated for this user.
    pub fn sign_in(&mut self, user_id: Uuid, draft: Option<DraftPlan>) {
        self.bump();
        self.user_id = Some(user_id);
        self.active_plan = draft;
        self.error = None;
        self.view = View::Dashboard;
    }

    pub fn sign_out(&mut self) {
        self.bump();
        self.clear_working();
        self.user_id = None;
        self.saved_plans.clear();
        self.selected_plan = None;
        self.error = None;
        self.view = View::Login;
    }

    pub fn set_saved_plans(&mut self, plans: Vec<SavedPlan>) {
        self.saved_plans = plans;
    }

    // --- in-flight bookkeeping ---

    fn bump(&mut self) {
        self.epoch += 1;
        self.in_flight = None;
    }

    fn begin(&mut self, op: RemoteOp) -> Result<Ticket, PlannerError> {
        if self.view == View::Loading {
            return Err(PlannerError::Busy);
        }
        self.epoch += 1;
        let ticket = Ticket {
            op,
            epoch: self.epoch,
        };
        self.in_flight = Some(InFlight {
            ticket,
            return_to: self.view,
        });
        self.error = None;
        self.view = View::Loading;
        Ok(ticket)
    }

    /// Consumes the in-flight slot; returns the view the call started from.
    fn settle(&mut self, ticket: Ticket) -> Result<View, PlannerError> {
        match self.in_flight {
            Some(f) if f.ticket == ticket && ticket.epoch == self.epoch => {
                self.in_flight = None;
                Ok(f.return_to)
            }
            _ => {
                debug!(op = ?ticket.op, "discarding stale response");
                Err(PlannerError::Stale)
            }
        }
    }

    fn fail(&mut self, op: RemoteOp, return_to: View) {
        self.error = Some(op.failure_message().to_string());
        self.view = return_to;
    }

    fn require_user(&self) -> Result<Uuid, PlannerError> {
        self.user_id.ok_or(PlannerError::NotSignedIn)
    }

    fn require_view(&self, allowed: &[View], to: View) -> Result<(), PlannerError> {
        if self.view == View::Loading {
            return Err(PlannerError::Busy);
        }
        if allowed.contains(&self.view) {
            Ok(())
        } else {
            Err(PlannerError::InvalidTransition {
                from: self.view,
                to,
            })
        }
    }

    fn require_working(&self) -> Result<(), PlannerError> {
        if self.view == View::Loading {
            return Err(PlannerError::Busy);
        }
        if self.view.is_working() {
            Ok(())
        } else {
            Err(PlannerError::NoActivePlan)
        }
    }

    fn clear_working(&mut self) {
        self.plan = PlanContent::default();
        self.active_plan = None;
        self.ocr_results.clear();
    }

    // --- generation ---

    pub fn begin_generation(
        &mut self,
        settings: &PlannerSettings,
    ) -> Result<(Ticket, PlannerSettings), PlannerError> {
        self.require_user()?;
        self.require_view(&[View::Dashboard], View::Planning)?;
        let settings = settings.normalized();
        if settings.dates.is_empty() {
            return Err(PlannerError::invalid("select at least one date"));
        }
        if settings.meals.is_empty() {
            return Err(PlannerError::invalid("select at least one meal type"));
        }
        let ticket = self.begin(RemoteOp::GeneratePlan)?;
        self.active_plan = None;
        Ok((ticket, settings))
    }

    pub fn finish_generation(
        &mut self,
        ticket: Ticket,
        settings: &PlannerSettings,
        outcome: anyhow::Result<GeneratedPlan>,
    ) -> Result<(), PlannerError> {
        let return_to = self.settle(ticket)?;
        match outcome {
            Ok(generated) => {
                // The preliminary list is regenerated, servings-aware, at finalize.
                self.plan = PlanContent {
                    meal_plan: align_to_settings(generated.meal_plan, settings),
                    plan_dates: settings.dates.clone(),
                    ..Default::default()
                };
                self.view = View::Planning;
            }
            Err(_) => self.fail(ticket.op, return_to),
        }
        Ok(())
    }

    // --- plan editing ---

    fn day_mut(&mut self, day_index: usize) -> Result<&mut MealDay, PlannerError> {
        self.plan
            .meal_plan
            .get_mut(day_index)
            .ok_or_else(|| PlannerError::NotFound(format!("day {}", day_index)))
    }

    pub fn edit_meal(
        &mut self,
        day_index: usize,
        slot: MealSlot,
        name: &str,
    ) -> Result<(), PlannerError> {
        self.require_view(&[View::Planning], View::Planning)?;
        let entry = self.day_mut(day_index)?.slot_mut(slot);
        let servings = entry.as_ref().map_or(DEFAULT_SERVINGS, |m| m.servings);
        *entry = Some(Meal {
            name: name.to_string(),
            servings,
        });
        Ok(())
    }

    pub fn update_servings(
        &mut self,
        day_index: usize,
        slot: MealSlot,
        change: ServingsChange,
    ) -> Result<(), PlannerError> {
        self.require_view(&[View::Planning], View::Planning)?;
        if let Some(meal) = self.day_mut(day_index)?.slot_mut(slot) {
            let next = match change {
                ServingsChange::Delta(d) => i64::from(meal.servings).saturating_add(d),
                ServingsChange::Set(n) => n,
            };
            meal.servings = next.clamp(1, i64::from(u32::MAX)) as u32;
        }
        Ok(())
    }

    pub fn meal_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for meal in self.plan.meal_plan.iter().flat_map(|d| d.meals()) {
            if !names.contains(&meal.name) {
                names.push(meal.name.clone());
            }
        }
        names
    }

    // --- finalize ---

    pub fn begin_finalize(&mut self) -> Result<(Ticket, Vec<MealDay>), PlannerError> {
        self.require_view(&[View::Planning], View::ShoppingList)?;
        if self.plan.meal_plan.iter().all(|d| d.meals().next().is_none()) {
            return Err(PlannerError::invalid("the plan has no meals"));
        }
        let ticket = self.begin(RemoteOp::FinalizePlan)?;
        Ok((ticket, self.plan.meal_plan.clone()))
    }

    pub fn finish_finalize(
        &mut self,
        ticket: Ticket,
        outcome: anyhow::Result<GeneratedShoppingList>,
    ) -> Result<(), PlannerError> {
        let return_to = self.settle(ticket)?;
        match outcome {
            Ok(generated) => {
                self.plan.shopping_list = generated
                    .shopping_list
                    .into_iter()
                    .filter(|i| !i.used_in.is_empty())
                    .map(|i| Ingredient {
                        price: Some(0.0),
                        checked: false,
                        ..i
                    })
                    .collect();
                self.plan.meal_ingredients = generated.meal_ingredients;
                self.view = View::ShoppingList;
            }
            Err(_) => self.fail(ticket.op, return_to),
        }
        Ok(())
    }

    // --- shopping list ---

    fn require_shopping(&self) -> Result<(), PlannerError> {
        self.require_view(&[View::ShoppingList, View::WeeklySummary], View::ShoppingList)
    }

    pub fn toggle_ingredient(&mut self, name: &str) -> Result<(), PlannerError> {
        self.require_shopping()?;
        let mut found = false;
        for item in self.plan.shopping_list.iter_mut().filter(|i| i.name == name) {
            item.checked = !item.checked;
            found = true;
        }
        if found {
            Ok(())
        } else {
            Err(PlannerError::NotFound(format!("ingredient {}", name)))
        }
    }

    pub fn toggle_all(&mut self) -> Result<(), PlannerError> {
        self.require_shopping()?;
        let all_checked = self.plan.shopping_list.iter().all(|i| i.checked);
        for item in &mut self.plan.shopping_list {
            item.checked = !all_checked;
        }
        Ok(())
    }

    pub fn update_price(&mut self, name: &str, input: &PriceInput) -> Result<(), PlannerError> {
        self.require_shopping()?;
        let price = input.coerce();
        let mut found = false;
        for item in self.plan.shopping_list.iter_mut().filter(|i| i.name == name) {
            item.price = price;
            found = true;
        }
        if found {
            Ok(())
        } else {
            Err(PlannerError::NotFound(format!("ingredient {}", name)))
        }
    }

    pub fn add_expense(&mut self, name: &str, price: f64) -> Result<String, PlannerError> {
        self.require_working()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(PlannerError::invalid("expense name is required"));
        }
        if !price.is_finite() || price < 0.0 {
            return Err(PlannerError::invalid("expense price must be a non-negative number"));
        }
        let expense = AdditionalExpense::new(name.to_string(), price);
        let id = expense.id.clone();
        self.plan.additional_expenses.push(expense);
        Ok(id)
    }

    pub fn remove_expense(&mut self, id: &str) -> Result<(), PlannerError> {
        self.require_working()?;
        let before = self.plan.additional_expenses.len();
        self.plan.additional_expenses.retain(|e| e.id != id);
        if self.plan.additional_expenses.len() == before {
            return Err(PlannerError::NotFound(format!("expense {}", id)));
        }
        Ok(())
    }

    // --- receipts ---

    pub fn begin_receipt(&mut self) -> Result<Ticket, PlannerError> {
        self.require_shopping()?;
        self.ocr_results.clear();
        self.begin(RemoteOp::ProcessReceipt)
    }

    pub fn finish_receipt(
        &mut self,
        ticket: Ticket,
        outcome: anyhow::Result<Vec<OcrItem>>,
    ) -> Result<(), PlannerError> {
        let return_to = self.settle(ticket)?;
        match outcome {
            Ok(items) => {
                self.ocr_results = items;
                self.view = return_to;
            }
            Err(_) => self.fail(ticket.op, return_to),
        }
        Ok(())
    }

    /// Returns the ticket and the items still open for matching.
    pub fn begin_reconcile(
        &mut self,
        selected: &[OcrItem],
    ) -> Result<(Ticket, Vec<Ingredient>), PlannerError> {
        self.require_shopping()?;
        if selected.is_empty() {
            return Err(PlannerError::invalid("select at least one receipt item"));
        }
        let unchecked: Vec<Ingredient> = self
            .plan
            .shopping_list
            .iter()
            .filter(|i| !i.checked)
            .cloned()
            .collect();
        let ticket = self.begin(RemoteOp::ApplyReceipt)?;
        Ok((ticket, unchecked))
    }

    /// Marks each matched, still-unchecked item as bought at the receipt price.
    pub fn finish_reconcile(
        &mut self,
        ticket: Ticket,
        selected: &[OcrItem],
        outcome: anyhow::Result<Vec<MatchedPair>>,
    ) -> Result<ReconcileOutcome, PlannerError> {
        let return_to = self.settle(ticket)?;
        let pairs = match outcome {
            Ok(pairs) => pairs,
            Err(_) => {
                self.fail(ticket.op, return_to);
                return Ok(self.reconcile_outcome(0));
            }
        };

        // Repeated receipt lines: the last one sets the price.
        let prices: HashMap<&str, f64> = selected
            .iter()
            .map(|item| (item.name.as_str(), item.price))
            .collect();

        let mut matched = 0;
        for pair in &pairs {
            let target = self
                .plan
                .shopping_list
                .iter_mut()
                .find(|i| !i.checked && i.name == pair.shopping_list_item_name);
            if let Some(item) = target {
                item.checked = true;
                if let Some(price) = prices.get(pair.receipt_item_name.as_str()) {
                    item.price = Some(*price);
                }
                matched += 1;
            }
        }
        self.ocr_results.clear();
        self.view = return_to;
        Ok(self.reconcile_outcome(matched))
    }

    fn reconcile_outcome(&self, matched: usize) -> ReconcileOutcome {
        ReconcileOutcome {
            matched,
            remaining: self.plan.shopping_list.iter().filter(|i| !i.checked).count(),
        }
    }

    // --- save / lifecycle ---

    pub fn begin_save(&mut self, now: OffsetDateTime) -> Result<(Ticket, SavedPlan), PlannerError> {
        let Some(user_id) = self.user_id else {
            self.error = Some(SAVE_REQUIRES_LOGIN.to_string());
            return Err(PlannerError::NotSignedIn);
        };
        self.require_working()?;
        let snapshot = SavedPlan::snapshot(user_id, self.plan.clone(), now);
        let ticket = self.begin(RemoteOp::SavePlan)?;
        Ok((ticket, snapshot))
    }

    /// A plan the store accepted is always recorded and the working state
    /// cleared; after a navigation only the move to the dashboard is skipped.
    pub fn finish_save(
        &mut self,
        ticket: Ticket,
        outcome: anyhow::Result<SavedPlan>,
    ) -> Result<(), PlannerError> {
        let settled = self.settle(ticket);
        match outcome {
            Ok(saved) => {
                self.saved_plans.insert(0, saved);
                self.clear_working();
                if settled.is_ok() {
                    self.selected_plan = None;
                    self.view = View::Dashboard;
                } else if self.view.is_working() {
                    self.view = View::Dashboard;
                }
            }
            Err(_) => {
                let return_to = settled?;
                self.fail(ticket.op, return_to);
            }
        }
        Ok(())
    }

    /// Rehydrates working state and resumes at the furthest reached step.
    pub fn continue_plan(
        &mut self,
        content: PlanContent,
        now: OffsetDateTime,
    ) -> Result<View, PlannerError> {
        let user_id = self.require_user()?;
        if self.view == View::Loading {
            return Err(PlannerError::Busy);
        }
        self.bump();
        self.active_plan = Some(DraftPlan {
            user_id,
            updated_at: now,
            content: content.clone(),
        });
        self.view = if content.shopping_list.is_empty() {
            View::Planning
        } else {
            View::ShoppingList
        };
        self.plan = content;
        self.ocr_results.clear();
        self.selected_plan = None;
        self.error = None;
        Ok(self.view)
    }

    pub fn find_saved(&self, id: &str) -> Result<&SavedPlan, PlannerError> {
        self.saved_plans
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| PlannerError::NotFound(format!("plan {}", id)))
    }

    pub fn view_saved_plan(&mut self, id: &str) -> Result<(), PlannerError> {
        self.require_user()?;
        let plan = self.find_saved(id)?.clone();
        self.bump();
        self.selected_plan = Some(plan);
        self.view = View::ViewSavedPlan;
        Ok(())
    }

    pub fn back(&mut self) -> Result<(), PlannerError> {
        if self.view != View::ViewSavedPlan {
            return Err(PlannerError::InvalidTransition {
                from: self.view,
                to: View::Dashboard,
            });
        }
        self.bump();
        self.selected_plan = None;
        self.view = View::Dashboard;
        Ok(())
    }

    pub fn reset(&mut self) -> Result<(), PlannerError> {
        self.require_user()?;
        self.bump();
        self.clear_working();
        self.selected_plan = None;
        self.error = None;
        self.view = View::Dashboard;
        Ok(())
    }

    pub fn navigate(&mut self, target: View) -> Result<(), PlannerError> {
        let allowed = matches!(
            (self.view, target),
            (View::ShoppingList, View::WeeklySummary) | (View::WeeklySummary, View::ShoppingList)
        );
        if !allowed {
            return Err(PlannerError::InvalidTransition {
                from: self.view,
                to: target,
            });
        }
        self.bump();
        self.view = target;
        Ok(())
    }

    /// Current draft for mirroring, if a plan is in progress.
    pub fn draft_snapshot(&mut self, now: OffsetDateTime) -> Option<DraftPlan> {
        let user_id = self.user_id?;
        if !self.view.is_working() || self.plan.is_empty() {
            return None;
        }
        let draft = DraftPlan {
            user_id,
            updated_at: now,
            content: self.plan.clone(),
        };
        self.active_plan = Some(draft.clone());
        Some(draft)
    }

    pub fn snapshot(&self) -> PlannerView {
        let list = &self.plan.shopping_list;
        PlannerView {
            view: self.view,
            error: self.error.clone(),
            meal_plan: self.plan.meal_plan.clone(),
            shopping_list: list.clone(),
            meal_ingredients: self.plan.meal_ingredients.clone(),
            additional_expenses: self.plan.additional_expenses.clone(),
            plan_dates: self.plan.plan_dates.clone(),
            categories: summary::group_by_category(list),
            progress: summary::progress(list),
            spend: summary::spend(list, &self.plan.additional_expenses),
            saved_plans: self.saved_plans.clone(),
            selected_plan: self.selected_plan.clone(),
            active_plan: self.active_plan.clone(),
            ocr_results: self.ocr_results.clone(),
        }
    }
}

#[cfg(test)]
mod state_tests {
    use super::*;
    use time::macros::{date, datetime};

    const NOW: OffsetDateTime = datetime!(2024-05-06 09:30 UTC);

    fn meal_day(label: &str, lunch: Option<&str>, dinner: Option<&str>) -> MealDay {
        MealDay {
            day: label.into(),
            breakfast: None,
            lunch: lunch.map(Meal::named),
            dinner: dinner.map(Meal::named),
        }
    }

    fn ingredient(name: &str, checked: bool, used_in: &[&str]) -> Ingredient {
        Ingredient {
            name: name.into(),
            quantity: "1".into(),
            category: "Misc".into(),
            checked,
            price: None,
            used_in: used_in.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn signed_in() -> Planner {
        let mut p = Planner::new();
        p.sign_in(Uuid::new_v4(), None);
        p
    }

    fn settings() -> PlannerSettings {
        PlannerSettings {
            dates: vec![date!(2024 - 05 - 06), date!(2024 - 05 - 08)],
            meals: vec![MealSlot::Lunch, MealSlot::Dinner],
        }
    }

    fn planning() -> Planner {
        let mut p = signed_in();
        let (ticket, s) = p.begin_generation(&settings()).unwrap();
        let generated = GeneratedPlan {
            meal_plan: vec![
                meal_day("2024-05-06", Some("Soup"), Some("Curry")),
                meal_day("2024-05-08", Some("Salad"), Some("Stew")),
            ],
            shopping_list: vec![ingredient("stock", false, &["Soup"])],
        };
        p.finish_generation(ticket, &s, Ok(generated)).unwrap();
        p
    }

    fn shopping(list: Vec<Ingredient>) -> Planner {
        let mut p = planning();
        let (ticket, _) = p.begin_finalize().unwrap();
        p.finish_finalize(
            ticket,
            Ok(GeneratedShoppingList {
                shopping_list: list,
                meal_ingredients: BTreeMap::new(),
            }),
        )
        .unwrap();
        p
    }

    #[test]
    fn new_session_waits_for_auth() {
        assert_eq!(Planner::new().view(), View::AuthLoading);
        assert_eq!(signed_in().view(), View::Dashboard);
    }

    #[test]
    fn generation_yields_one_day_per_requested_date() {
        let p = planning();
        assert_eq!(p.view(), View::Planning);
        let plan = &p.plan().meal_plan;
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].day, "2024-05-06");
        assert_eq!(plan[1].day, "2024-05-08");
        for day in plan {
            assert!(day.breakfast.is_none());
            assert!(day.lunch.is_some() && day.dinner.is_some());
            assert!(day.meals().all(|m| m.servings == 2));
        }
        assert!(p.plan().shopping_list.is_empty());
        assert_eq!(p.plan().plan_dates, settings().dates);
    }

    #[test]
    fn generation_requires_dates_and_meals() {
        let mut p = signed_in();
        let err = p
            .begin_generation(&PlannerSettings {
                dates: vec![],
                meals: vec![MealSlot::Lunch],
            })
            .unwrap_err();
        assert!(matches!(err, PlannerError::InvalidInput(_)));
        let err = p
            .begin_generation(&PlannerSettings {
                dates: vec![date!(2024 - 05 - 06)],
                meals: vec![],
            })
            .unwrap_err();
        assert!(matches!(err, PlannerError::InvalidInput(_)));
        assert_eq!(p.view(), View::Dashboard);
    }

    #[test]
    fn failed_generation_returns_to_dashboard_with_error() {
        let mut p = signed_in();
        let (ticket, s) = p.begin_generation(&settings()).unwrap();
        assert_eq!(p.view(), View::Loading);
        p.finish_generation(ticket, &s, Err(anyhow::anyhow!("model down")))
            .unwrap();
        assert_eq!(p.view(), View::Dashboard);
        assert_eq!(p.error(), Some(RemoteOp::GeneratePlan.failure_message()));
    }

    #[test]
    fn second_remote_call_while_loading_is_rejected() {
        let mut p = signed_in();
        p.begin_generation(&settings()).unwrap();
        assert_eq!(p.begin_generation(&settings()).unwrap_err(), PlannerError::Busy);
        assert_eq!(p.edit_meal(0, MealSlot::Lunch, "x").unwrap_err(), PlannerError::Busy);
    }

    #[test]
    fn response_after_navigation_is_discarded() {
        let mut p = signed_in();
        let (ticket, s) = p.begin_generation(&settings()).unwrap();
        p.reset().unwrap();
        let res = p.finish_generation(ticket, &s, Ok(GeneratedPlan::default()));
        assert_eq!(res.unwrap_err(), PlannerError::Stale);
        assert_eq!(p.view(), View::Dashboard);
        assert!(p.plan().meal_plan.is_empty());
    }

    #[test]
    fn edit_meal_renames_or_creates_slot() {
        let mut p = planning();
        p.update_servings(0, MealSlot::Lunch, ServingsChange::Set(4))
            .unwrap();
        p.edit_meal(0, MealSlot::Lunch, "Noodles").unwrap();
        let lunch = p.plan().meal_plan[0].lunch.clone().unwrap();
        assert_eq!(lunch, Meal { name: "Noodles".into(), servings: 4 });

        p.edit_meal(1, MealSlot::Breakfast, "Toast").unwrap();
        assert_eq!(p.plan().meal_plan[1].breakfast, Some(Meal::named("Toast")));

        assert!(matches!(
            p.edit_meal(9, MealSlot::Lunch, "x").unwrap_err(),
            PlannerError::NotFound(_)
        ));
    }

    #[test]
    fn servings_clamp_at_one_and_ignore_missing_slots() {
        let mut p = planning();
        p.update_servings(0, MealSlot::Dinner, ServingsChange::Delta(-5))
            .unwrap();
        assert_eq!(p.plan().meal_plan[0].dinner.as_ref().unwrap().servings, 1);
        p.update_servings(0, MealSlot::Dinner, ServingsChange::Delta(2))
            .unwrap();
        assert_eq!(p.plan().meal_plan[0].dinner.as_ref().unwrap().servings, 3);
        p.update_servings(0, MealSlot::Breakfast, ServingsChange::Set(3))
            .unwrap();
        assert!(p.plan().meal_plan[0].breakfast.is_none());
    }

    #[test]
    fn finalize_drops_orphans_and_resets_prices() {
        let mut stocked = ingredient("rice", true, &["Curry"]);
        stocked.price = Some(9.0);
        let p = shopping(vec![stocked, ingredient("ghost", false, &[])]);
        assert_eq!(p.view(), View::ShoppingList);
        assert_eq!(p.plan().shopping_list.len(), 1);
        let rice = &p.plan().shopping_list[0];
        assert!(!rice.checked);
        assert_eq!(rice.price, Some(0.0));
    }

    #[test]
    fn failed_finalize_returns_to_planning() {
        let mut p = planning();
        let (ticket, plan) = p.begin_finalize().unwrap();
        assert_eq!(plan.len(), 2);
        p.finish_finalize(ticket, Err(anyhow::anyhow!("boom"))).unwrap();
        assert_eq!(p.view(), View::Planning);
        assert!(p.error().is_some());
    }

    #[test]
    fn toggling_twice_restores_state() {
        let mut p = shopping(vec![ingredient("egg", false, &["Soup"])]);
        p.toggle_ingredient("egg").unwrap();
        assert!(p.plan().shopping_list[0].checked);
        p.toggle_ingredient("egg").unwrap();
        assert!(!p.plan().shopping_list[0].checked);
        assert!(matches!(
            p.toggle_ingredient("nope").unwrap_err(),
            PlannerError::NotFound(_)
        ));
    }

    #[test]
    fn toggle_all_checks_everything_unless_all_checked() {
        let mut p = shopping(vec![
            ingredient("egg", false, &["Soup"]),
            ingredient("milk", false, &["Soup"]),
        ]);
        p.toggle_ingredient("milk").unwrap();
        p.toggle_all().unwrap();
        assert!(p.plan().shopping_list.iter().all(|i| i.checked));
        p.toggle_all().unwrap();
        assert!(p.plan().shopping_list.iter().all(|i| !i.checked));
    }

    #[test]
    fn toggle_all_twice_restores_when_all_checked() {
        let mut p = shopping(vec![
            ingredient("egg", false, &["Soup"]),
            ingredient("milk", false, &["Soup"]),
        ]);
        p.toggle_all().unwrap();
        let before: Vec<bool> = p.plan().shopping_list.iter().map(|i| i.checked).collect();
        p.toggle_all().unwrap();
        p.toggle_all().unwrap();
        let after: Vec<bool> = p.plan().shopping_list.iter().map(|i| i.checked).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn price_input_is_coerced() {
        let mut p = shopping(vec![ingredient("egg", false, &["Soup"])]);
        p.update_price("egg", &PriceInput::Text(" 12.5 ".into())).unwrap();
        assert_eq!(p.plan().shopping_list[0].price, Some(12.5));
        p.update_price("egg", &PriceInput::Text("abc".into())).unwrap();
        assert_eq!(p.plan().shopping_list[0].price, None);
        p.update_price("egg", &PriceInput::Number(3.0)).unwrap();
        assert_eq!(p.plan().shopping_list[0].price, Some(3.0));
        assert_eq!(PriceInput::Number(-1.0).coerce(), None);
    }

    #[test]
    fn expenses_are_added_and_removed_by_id() {
        let mut p = shopping(vec![ingredient("egg", false, &["Soup"])]);
        let id = p.add_expense("  Dish soap ", 2.0).unwrap();
        let other = p.add_expense("Bags", 1.0).unwrap();
        assert_ne!(id, other);
        assert_eq!(p.plan().additional_expenses[0].name, "Dish soap");
        p.remove_expense(&id).unwrap();
        assert_eq!(p.plan().additional_expenses.len(), 1);
        assert!(p.remove_expense(&id).is_err());
        assert!(p.add_expense(" ", 1.0).is_err());
        assert!(p.add_expense("x", f64::NAN).is_err());
    }

    #[test]
    fn receipt_results_do_not_touch_the_list() {
        let mut p = shopping(vec![ingredient("egg", false, &["Soup"])]);
        let ticket = p.begin_receipt().unwrap();
        p.finish_receipt(
            ticket,
            Ok(vec![OcrItem { name: "EGGS 10".into(), price: 4.0 }]),
        )
        .unwrap();
        assert_eq!(p.view(), View::ShoppingList);
        assert_eq!(p.snapshot().ocr_results.len(), 1);
        assert!(!p.plan().shopping_list[0].checked);
    }

    #[test]
    fn reconciliation_skips_already_checked_items() {
        let mut p = shopping(vec![
            ingredient("egg", false, &["Soup"]),
            ingredient("milk", false, &["Soup"]),
            ingredient("rice", false, &["Curry"]),
        ]);
        p.toggle_ingredient("milk").unwrap();
        p.update_price("milk", &PriceInput::Number(1.0)).unwrap();

        let selected = vec![
            OcrItem { name: "EGGS".into(), price: 4.0 },
            OcrItem { name: "MILK 1L".into(), price: 2.0 },
        ];
        let (ticket, unchecked) = p.begin_reconcile(&selected).unwrap();
        assert_eq!(
            unchecked.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
            vec!["egg", "rice"]
        );
        let pairs = vec![
            MatchedPair {
                receipt_item_name: "EGGS".into(),
                shopping_list_item_name: "egg".into(),
            },
            MatchedPair {
                receipt_item_name: "MILK 1L".into(),
                shopping_list_item_name: "milk".into(),
            },
        ];
        let outcome = p.finish_reconcile(ticket, &selected, Ok(pairs)).unwrap();
        assert_eq!(outcome, ReconcileOutcome { matched: 1, remaining: 1 });

        let list = &p.plan().shopping_list;
        assert!(list[0].checked);
        assert_eq!(list[0].price, Some(4.0));
        assert!(list[1].checked);
        assert_eq!(list[1].price, Some(1.0));
        assert!(!list[2].checked);
    }

    #[test]
    fn repeated_receipt_line_takes_the_last_price() {
        let mut p = shopping(vec![ingredient("egg", false, &["Soup"])]);
        let selected = vec![
            OcrItem { name: "EGGS".into(), price: 4.0 },
            OcrItem { name: "EGGS".into(), price: 3.5 },
        ];
        let (ticket, _) = p.begin_reconcile(&selected).unwrap();
        let pairs = vec![MatchedPair {
            receipt_item_name: "EGGS".into(),
            shopping_list_item_name: "egg".into(),
        }];
        p.finish_reconcile(ticket, &selected, Ok(pairs)).unwrap();
        assert_eq!(p.plan().shopping_list[0].price, Some(3.5));
    }

    #[test]
    fn reconciliation_requires_a_selection() {
        let mut p = shopping(vec![ingredient("egg", false, &["Soup"])]);
        assert!(matches!(
            p.begin_reconcile(&[]).unwrap_err(),
            PlannerError::InvalidInput(_)
        ));
        assert_eq!(p.view(), View::ShoppingList);
    }

    #[test]
    fn save_clears_working_state_and_prepends() {
        let mut p = shopping(vec![ingredient("egg", false, &["Soup"])]);
        p.navigate(View::WeeklySummary).unwrap();
        assert!(p.draft_snapshot(NOW).is_some());
        let (ticket, plan) = p.begin_save(NOW).unwrap();
        assert_eq!(plan.content.meal_plan.len(), 2);
        p.finish_save(ticket, Ok(plan.clone())).unwrap();

        assert_eq!(p.view(), View::Dashboard);
        assert!(p.plan().is_empty());
        assert!(p.active_plan().is_none());
        assert_eq!(p.saved_plans()[0].id, plan.id);
        assert!(p.draft_snapshot(NOW).is_none());
    }

    #[test]
    fn failed_save_returns_to_weekly_summary_untouched() {
        let mut p = shopping(vec![ingredient("egg", false, &["Soup"])]);
        p.navigate(View::WeeklySummary).unwrap();
        let before = p.plan().clone();
        let (ticket, _) = p.begin_save(NOW).unwrap();
        p.finish_save(ticket, Err(anyhow::anyhow!("store down"))).unwrap();
        assert_eq!(p.view(), View::WeeklySummary);
        assert_eq!(p.plan(), &before);
        assert_eq!(p.error(), Some(RemoteOp::SavePlan.failure_message()));
    }

    #[test]
    fn save_accepted_after_navigation_is_still_recorded() {
        let mut p = shopping(vec![ingredient("egg", false, &["Soup"])]);
        let earlier = SavedPlan::snapshot(
            p.user_id().unwrap(),
            PlanContent::default(),
            NOW - time::Duration::days(1),
        );
        p.set_saved_plans(vec![earlier.clone()]);

        let (ticket, plan) = p.begin_save(NOW).unwrap();
        p.view_saved_plan(&earlier.id).unwrap();
        p.finish_save(ticket, Ok(plan.clone())).unwrap();

        assert_eq!(p.view(), View::ViewSavedPlan);
        assert_eq!(p.saved_plans().len(), 2);
        assert_eq!(p.saved_plans()[0].id, plan.id);
        assert!(p.plan().is_empty());
        assert!(p.active_plan().is_none());
        assert!(p.draft_snapshot(NOW).is_none());
    }

    #[test]
    fn failed_save_after_navigation_is_stale() {
        let mut p = shopping(vec![ingredient("egg", false, &["Soup"])]);
        let earlier = SavedPlan::snapshot(
            p.user_id().unwrap(),
            PlanContent::default(),
            NOW - time::Duration::days(1),
        );
        p.set_saved_plans(vec![earlier.clone()]);

        let (ticket, _) = p.begin_save(NOW).unwrap();
        p.view_saved_plan(&earlier.id).unwrap();
        let err = p
            .finish_save(ticket, Err(anyhow::anyhow!("store down")))
            .unwrap_err();
        assert_eq!(err, PlannerError::Stale);
        assert_eq!(p.view(), View::ViewSavedPlan);
        assert!(p.error().is_none());
        assert!(!p.plan().is_empty());
    }

    #[test]
    fn save_without_user_sets_error() {
        let mut p = Planner::new();
        assert_eq!(p.begin_save(NOW).unwrap_err(), PlannerError::NotSignedIn);
        assert_eq!(p.error(), Some(SAVE_REQUIRES_LOGIN));
    }

    #[test]
    fn continue_routes_by_shopping_list_presence() {
        let mut p = signed_in();
        let content = PlanContent {
            meal_plan: vec![meal_day("2024-05-06", Some("Soup"), None)],
            ..Default::default()
        };
        assert_eq!(p.continue_plan(content.clone(), NOW).unwrap(), View::Planning);

        let mut with_list = content;
        with_list.shopping_list = vec![ingredient("egg", true, &["Soup"])];
        p.reset().unwrap();
        assert_eq!(p.continue_plan(with_list, NOW).unwrap(), View::ShoppingList);
        assert!(p.active_plan().is_some());
    }

    #[test]
    fn saved_plan_side_path_keeps_working_state() {
        let mut p = planning();
        let saved = SavedPlan::snapshot(p.user_id().unwrap(), PlanContent::default(), NOW);
        p.set_saved_plans(vec![saved.clone()]);

        let working = p.plan().clone();
        p.view_saved_plan(&saved.id).unwrap();
        assert_eq!(p.view(), View::ViewSavedPlan);
        assert_eq!(p.snapshot().selected_plan.unwrap().id, saved.id);
        p.back().unwrap();
        assert_eq!(p.view(), View::Dashboard);
        assert_eq!(p.plan(), &working);
        assert!(matches!(p.view_saved_plan("nope").unwrap_err(), PlannerError::NotFound(_)));
    }

    #[test]
    fn only_list_and_summary_are_navigable() {
        let mut p = planning();
        assert!(matches!(
            p.navigate(View::WeeklySummary).unwrap_err(),
            PlannerError::InvalidTransition { .. }
        ));
        let mut p = shopping(vec![ingredient("egg", false, &["Soup"])]);
        p.navigate(View::WeeklySummary).unwrap();
        p.navigate(View::ShoppingList).unwrap();
        assert!(p.navigate(View::Dashboard).is_err());
    }

    #[test]
    fn sign_out_clears_everything() {
        let mut p = shopping(vec![ingredient("egg", false, &["Soup"])]);
        p.sign_out();
        assert_eq!(p.view(), View::Login);
        assert!(p.user_id().is_none());
        assert!(p.plan().is_empty());
        assert!(p.saved_plans().is_empty());
    }

    #[test]
    fn draft_is_only_taken_while_working() {
        let mut p = signed_in();
        assert!(p.draft_snapshot(NOW).is_none());
        let mut p = planning();
        let draft = p.draft_snapshot(NOW).unwrap();
        assert_eq!(draft.content.meal_plan.len(), 2);
        assert_eq!(p.active_plan(), Some(&draft));
    }
}
