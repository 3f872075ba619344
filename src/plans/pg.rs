use anyhow::Context;
use async_trait::async_trait;
use sqlx::{types::Json, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::{ensure_owner, PlanStore};
use crate::planner::model::SavedPlan;

/// Plans stored whole as `jsonb` in `saved_plans`.
#[derive(Clone)]
pub struct PgPlanStore {
    db: PgPool,
}

impl PgPlanStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PlanStore for PgPlanStore {
    async fn list(&self, user_id: Uuid) -> anyhow::Result<Vec<SavedPlan>> {
        let rows = sqlx::query_scalar::<_, Json<SavedPlan>>(
            r#"
            SELECT document
            FROM saved_plans
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("list saved plans")?;
        debug!(user_id = %user_id, count = rows.len(), "saved plans loaded");
        Ok(rows.into_iter().map(|Json(plan)| plan).collect())
    }

    async fn create(&self, plan: &SavedPlan, user_id: Uuid) -> anyhow::Result<()> {
        ensure_owner(plan, user_id)?;
        sqlx::query(
            r#"
            INSERT INTO saved_plans (id, user_id, created_at, document)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&plan.id)
        .bind(user_id)
        .bind(plan.created_at)
        .bind(Json(plan))
        .execute(&self.db)
        .await
        .context("insert saved plan")?;
        Ok(())
    }
}
