use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::dto::FeedbackTopic;

pub async fn insert_feedback(
    db: &PgPool,
    user_id: Uuid,
    topic: FeedbackTopic,
    details: &str,
) -> anyhow::Result<(Uuid, OffsetDateTime)> {
    let row: (Uuid, OffsetDateTime) = sqlx::query_as(
        r#"
        INSERT INTO feedback (user_id, topic, details)
        VALUES ($1, $2, $3)
        RETURNING id, created_at
        "#,
    )
    .bind(user_id)
    .bind(topic.as_str())
    .bind(details)
    .fetch_one(db)
    .await?;
    Ok(row)
}
