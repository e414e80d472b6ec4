use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    middleware::auth::require_admin,
    models::{
        auth::AuthenticatedUser,
        bus::{Bus, CreateBusRequest, UpdateBusRequest},
        trip::{Trip, TripQuery},
    },
    services::buses::BusService,
    AppState,
};

pub async fn list_buses(State(state): State<AppState>, _user: AuthenticatedUser) -> AppResult<Json<Vec<Bus>>> {
    BusService::list(state.store.as_ref()).await.map(Json)
}

pub async fn create_bus(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateBusRequest>,
) -> AppResult<(StatusCode, Json<Bus>)> {
    require_admin(&user)?;
    let bus = BusService::create(state.store.as_ref(), body).await?;
    Ok((StatusCode::CREATED, Json(bus)))
}

pub async fn update_bus(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateBusRequest>,
) -> AppResult<Json<Bus>> {
    require_admin(&user)?;
    BusService::update(state.store.as_ref(), &id, body).await.map(Json)
}

pub async fn delete_bus(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<Bus>> {
    require_admin(&user)?;
    BusService::deactivate(state.store.as_ref(), &id).await.map(Json)
}

pub async fn list_trips(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<TripQuery>,
) -> AppResult<Json<Vec<Trip>>> {
    BusService::recent_trips(state.store.as_ref(), query.limit).await.map(Json)
}
