use axum::http::StatusCode;

use super::state::View;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlannerError {
    #[error("another request is still in progress")]
    Busy,
    #[error("{0}")]
    InvalidInput(String),
    #[error("cannot move from {from:?} to {to:?}")]
    InvalidTransition { from: View, to: View },
    #[error("no plan in progress")]
    NoActivePlan,
    #[error("not signed in")]
    NotSignedIn,
    #[error("{0} not found")]
    NotFound(String),
    #[error("request was superseded by a newer action")]
    Stale,
}

impl PlannerError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PlannerError::Busy | PlannerError::Stale => StatusCode::CONFLICT,
            PlannerError::InvalidTransition { .. } | PlannerError::NoActivePlan => {
                StatusCode::CONFLICT
            }
            PlannerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PlannerError::NotSignedIn => StatusCode::UNAUTHORIZED,
            PlannerError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl From<PlannerError> for (StatusCode, String) {
    fn from(e: PlannerError) -> Self {
        (e.status(), e.to_string())
    }
}
