use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedbackTopic {
    Bug,
    #[default]
    Suggestion,
    FeatureRequest,
}

impl FeedbackTopic {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedbackTopic::Bug => "BUG",
            FeedbackTopic::Suggestion => "SUGGESTION",
            FeedbackTopic::FeatureRequest => "FEATURE_REQUEST",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    #[serde(default)]
    pub topic: FeedbackTopic,
    pub details: String,
}

impl FeedbackRequest {
    /// Trimmed details, or `None` when there is nothing to send.
    pub fn details(&self) -> Option<&str> {
        Some(self.details.trim()).filter(|d| !d.is_empty())
    }
}

#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    pub id: Uuid,
    pub topic: FeedbackTopic,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
