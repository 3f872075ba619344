//! Saved-plan persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::planner::model::SavedPlan;

pub mod firestore;
pub mod pg;

pub use firestore::FirestorePlanStore;
pub use pg::PgPlanStore;

#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Newest first.
    async fn list(&self, user_id: Uuid) -> anyhow::Result<Vec<SavedPlan>>;
    async fn create(&self, plan: &SavedPlan, user_id: Uuid) -> anyhow::Result<()>;
}

fn ensure_owner(plan: &SavedPlan, user_id: Uuid) -> anyhow::Result<()> {
    if plan.user_id != user_id {
        anyhow::bail!("plan {} does not belong to user {}", plan.id, user_id);
    }
    Ok(())
}
