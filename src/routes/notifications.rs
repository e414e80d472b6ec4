use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::AppResult,
    middleware::auth::require_admin,
    models::{
        auth::AuthenticatedUser,
        notification::{
            BulkNotificationRequest, NotificationQuery, NotificationRecord, NotificationStats,
            SendNotificationRequest,
        },
        user::UserType,
    },
    services::notifications::NotificationService,
    AppState,
};

/// Admins may list anyone's notifications; everybody else gets their own.
pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<NotificationQuery>,
) -> AppResult<Json<Vec<NotificationRecord>>> {
    let recipient = match user.role {
        UserType::Admin => query.recipient_id,
        _ => Some(user.user_id),
    };
    NotificationService::list(state.store.as_ref(), recipient.as_deref(), query.limit)
        .await
        .map(Json)
}

pub async fn send_notification(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<SendNotificationRequest>,
) -> AppResult<(StatusCode, Json<NotificationRecord>)> {
    require_admin(&user)?;
    let record =
        NotificationService::send(state.store.as_ref(), &state.triggers, body, &user.user_id).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn send_bulk(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<BulkNotificationRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    require_admin(&user)?;
    let records =
        NotificationService::send_bulk(state.store.as_ref(), &state.triggers, body, &user.user_id)
            .await?;
    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    Ok((StatusCode::CREATED, Json(json!({ "count": ids.len(), "ids": ids }))))
}

/// The recipient marks their own notification; admins may mark any.
pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<NotificationRecord>> {
    if user.role != UserType::Admin {
        let record = state.store.get_notification(&id).await?;
        if record.is_some_and(|r| r.recipient_id != user.user_id) {
            require_admin(&user)?;
        }
    }
    NotificationService::mark_read(state.store.as_ref(), &id, &user.user_id)
        .await
        .map(Json)
}

pub async fn get_stats(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(scope): Path<String>,
) -> AppResult<Json<NotificationStats>> {
    if scope != user.user_id {
        require_admin(&user)?;
    }
    NotificationService::stats(state.store.as_ref(), &scope).await.map(Json)
}
