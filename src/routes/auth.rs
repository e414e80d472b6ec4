use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    models::{
        auth::AuthenticatedUser,
        user::{LoginRequest, LoginResponse, RegisterPushTokenRequest, User},
    },
    services::{
        auth::{AuthService, SignInScope},
        users::UserService,
    },
    AppState,
};

async fn sign_in(state: &AppState, scope: SignInScope, body: LoginRequest) -> AppResult<Json<LoginResponse>> {
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err(AppError::Validation("Missing required fields: email, password".into()));
    }
    AuthService::login(
        state.store.as_ref(),
        &state.sessions,
        scope,
        body.email.trim(),
        &body.password,
        &state.config.jwt_secret,
        state.config.jwt_expiry_seconds,
    )
    .await
    .map(Json)
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    sign_in(&state, SignInScope::Console, body).await
}

/// Sign-in for the parent and supervisor apps.
pub async fn device_login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    sign_in(&state, SignInScope::Device, body).await
}

pub async fn me(State(state): State<AppState>, user: AuthenticatedUser) -> AppResult<Json<User>> {
    match state.store.get_user(&user.user_id).await?.filter(|u| u.is_active) {
        Some(profile) => Ok(Json(profile)),
        None => {
            state.sessions.sign_out(&user.user_id).await;
            Err(AppError::Unauthenticated("Account no longer active".into()))
        }
    }
}

pub async fn logout(State(state): State<AppState>, user: AuthenticatedUser) -> Json<Value> {
    state.sessions.sign_out(&user.user_id).await;
    Json(json!({ "success": true }))
}

pub async fn register_push_token(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<RegisterPushTokenRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    UserService::register_push_token(state.store.as_ref(), &user.user_id, &body.token).await?;
    Ok((StatusCode::OK, Json(json!({ "success": true }))))
}
