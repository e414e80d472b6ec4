use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    error::AppResult,
    middleware::auth::require_admin,
    models::{auth::AuthenticatedUser, settings::SettingsDoc},
    services::{
        export::{DataExport, ExportService},
        settings::SettingsService,
    },
    AppState,
};

pub async fn get_settings(State(state): State<AppState>, user: AuthenticatedUser) -> AppResult<Json<SettingsDoc>> {
    require_admin(&user)?;
    SettingsService::get(state.store.as_ref()).await.map(Json)
}

pub async fn update_settings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(category): Path<String>,
    Json(body): Json<SettingsDoc>,
) -> AppResult<Json<SettingsDoc>> {
    require_admin(&user)?;
    SettingsService::update(state.store.as_ref(), &category, body).await.map(Json)
}

pub async fn export_all(State(state): State<AppState>, user: AuthenticatedUser) -> AppResult<Json<DataExport>> {
    require_admin(&user)?;
    ExportService::export_all(state.store.as_ref()).await.map(Json)
}
