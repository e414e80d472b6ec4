use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::{
    error::AppResult,
    middleware::auth::require_admin,
    models::{
        auth::AuthenticatedUser,
        notification::{PushBatchRequest, PushDataOnlyRequest, PushSendRequest, PushTestRequest},
    },
    services::{dispatcher::MulticastReport, payload::Payload},
    AppState,
};

pub async fn send(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<PushSendRequest>,
) -> AppResult<Json<Value>> {
    require_admin(&user)?;
    let payload = Payload::alert(&body.title, &body.body, body.kind.as_deref(), body.data)?;
    let message_id = state
        .dispatcher
        .send_single(&body.device_token, &payload, &user.user_id)
        .await?;
    Ok(Json(json!({ "success": true, "messageId": message_id })))
}

pub async fn send_batch(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<PushBatchRequest>,
) -> AppResult<Json<MulticastReport>> {
    require_admin(&user)?;
    let payload = Payload::alert(&body.title, &body.body, body.kind.as_deref(), body.data)?;
    state
        .dispatcher
        .send_multicast(&body.device_tokens, &payload, &user.user_id)
        .await
        .map(Json)
        .map_err(Into::into)
}

pub async fn send_test(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<PushTestRequest>,
) -> AppResult<Json<Value>> {
    require_admin(&user)?;
    let message_id = state
        .dispatcher
        .send_single(&body.device_token, &Payload::test(), &user.user_id)
        .await?;
    Ok(Json(json!({ "success": true, "messageId": message_id })))
}

pub async fn send_data_only(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<PushDataOnlyRequest>,
) -> AppResult<Json<Value>> {
    require_admin(&user)?;
    let message_id = state
        .dispatcher
        .send_single(&body.device_token, &Payload::silent(body.data), &user.user_id)
        .await?;
    Ok(Json(json!({ "success": true, "messageId": message_id })))
}
