use axum::{extract::State, Json};

use crate::{
    error::AppResult,
    middleware::auth::require_admin,
    models::auth::AuthenticatedUser,
    services::stats::{DashboardStats, StatsService},
    AppState,
};

pub async fn dashboard(State(state): State<AppState>, user: AuthenticatedUser) -> AppResult<Json<DashboardStats>> {
    require_admin(&user)?;
    StatsService::dashboard(state.store.as_ref()).await.map(Json)
}
