use axum::{extract::State, Json};

use crate::{
    error::AppResult,
    middleware::auth::require_admin,
    models::auth::AuthenticatedUser,
    services::retention::{RetentionReport, RetentionSweep},
    AppState,
};

/// Runs the retention sweep now. A stopped sweep is still a 200; the report
/// carries the error.
pub async fn run_retention(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<RetentionReport>> {
    require_admin(&user)?;
    let report = RetentionSweep::run(state.store.as_ref(), state.config.retention_days).await;
    Ok(Json(report))
}
