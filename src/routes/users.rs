use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    middleware::auth::require_admin,
    models::{
        auth::AuthenticatedUser,
        student::Student,
        user::{CreateUserRequest, UpdateUserRequest, User, UserType},
    },
    services::users::UserService,
    AppState,
};

async fn list(state: &AppState, user: &AuthenticatedUser, user_type: UserType) -> AppResult<Json<Vec<User>>> {
    require_admin(user)?;
    UserService::list(state.store.as_ref(), user_type).await.map(Json)
}

async fn create(
    state: &AppState,
    user: &AuthenticatedUser,
    user_type: UserType,
    body: CreateUserRequest,
) -> AppResult<(StatusCode, Json<User>)> {
    require_admin(user)?;
    let created = UserService::create(state.store.as_ref(), user_type, body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update(
    state: &AppState,
    user: &AuthenticatedUser,
    user_type: UserType,
    id: &str,
    body: UpdateUserRequest,
) -> AppResult<Json<User>> {
    require_admin(user)?;
    UserService::update(state.store.as_ref(), user_type, id, body).await.map(Json)
}

async fn deactivate(
    state: &AppState,
    user: &AuthenticatedUser,
    user_type: UserType,
    id: &str,
) -> AppResult<Json<User>> {
    require_admin(user)?;
    UserService::deactivate(state.store.as_ref(), user_type, id).await.map(Json)
}

// ── Parents ─────────────────────────────────────────────────────────────────

pub async fn list_parents(State(state): State<AppState>, user: AuthenticatedUser) -> AppResult<Json<Vec<User>>> {
    list(&state, &user, UserType::Parent).await
}

pub async fn create_parent(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    create(&state, &user, UserType::Parent, body).await
}

pub async fn update_parent(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateUserRequest>,
) -> AppResult<Json<User>> {
    update(&state, &user, UserType::Parent, &id, body).await
}

pub async fn delete_parent(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<User>> {
    deactivate(&state, &user, UserType::Parent, &id).await
}

pub async fn list_children(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Student>>> {
    require_admin(&user)?;
    UserService::children(state.store.as_ref(), &id).await.map(Json)
}

// ── Supervisors ─────────────────────────────────────────────────────────────

pub async fn list_supervisors(State(state): State<AppState>, user: AuthenticatedUser) -> AppResult<Json<Vec<User>>> {
    list(&state, &user, UserType::Supervisor).await
}

pub async fn create_supervisor(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    create(&state, &user, UserType::Supervisor, body).await
}

pub async fn update_supervisor(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateUserRequest>,
) -> AppResult<Json<User>> {
    update(&state, &user, UserType::Supervisor, &id, body).await
}

pub async fn delete_supervisor(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<User>> {
    deactivate(&state, &user, UserType::Supervisor, &id).await
}
