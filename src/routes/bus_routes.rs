use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::AppResult,
    middleware::auth::require_admin,
    models::{
        auth::AuthenticatedUser,
        route::{BusRoute, CreateBusRouteRequest, UpdateBusRouteRequest},
    },
    services::bus_routes::BusRouteService,
    AppState,
};

pub async fn list_routes(State(state): State<AppState>, _user: AuthenticatedUser) -> AppResult<Json<Vec<BusRoute>>> {
    BusRouteService::list(state.store.as_ref()).await.map(Json)
}

pub async fn create_route(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateBusRouteRequest>,
) -> AppResult<(StatusCode, Json<BusRoute>)> {
    require_admin(&user)?;
    let route = BusRouteService::create(state.store.as_ref(), body).await?;
    Ok((StatusCode::CREATED, Json(route)))
}

pub async fn update_route(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateBusRouteRequest>,
) -> AppResult<Json<BusRoute>> {
    require_admin(&user)?;
    BusRouteService::update(state.store.as_ref(), &id, body).await.map(Json)
}

pub async fn delete_route(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    require_admin(&user)?;
    BusRouteService::delete(state.store.as_ref(), &id).await?;
    Ok(Json(json!({ "success": true })))
}
