//! Meal-plan lifecycle: the per-user view state machine, its pure helpers,
//! and the HTTP routes that drive it.

mod dto;
pub mod error;
pub mod fuzzy;
pub mod handlers;
pub mod merge;
pub mod model;
pub mod services;
pub mod state;
pub mod summary;

#[cfg(test)]
pub(crate) mod testing;

use crate::state::AppState;
use axum::Router;

pub use services::{Generators, PlannerService};

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::planner_routes())
        .merge(handlers::receipt_routes())
}
