use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::AppResult,
    middleware::auth::require_admin,
    models::{
        auth::AuthenticatedUser,
        notification::{EmailQueueItem, EnqueueEmailRequest, EnqueuePushRequest, PushQueueItem},
    },
    services::queue::QueueService,
    AppState,
};

/// 202: delivery happens in the trigger worker.
pub async fn enqueue_push(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<EnqueuePushRequest>,
) -> AppResult<(StatusCode, Json<PushQueueItem>)> {
    require_admin(&user)?;
    let item = QueueService::enqueue_push(state.store.as_ref(), &state.triggers, body).await?;
    Ok((StatusCode::ACCEPTED, Json(item)))
}

pub async fn enqueue_email(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<EnqueueEmailRequest>,
) -> AppResult<(StatusCode, Json<EmailQueueItem>)> {
    require_admin(&user)?;
    let item = QueueService::enqueue_email(state.store.as_ref(), &state.triggers, body).await?;
    Ok((StatusCode::ACCEPTED, Json(item)))
}
