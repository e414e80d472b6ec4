use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::{
    error::AppResult,
    middleware::auth::require_admin,
    models::{
        auth::AuthenticatedUser,
        complaint::{
            Complaint, ComplaintQuery, CreateComplaintRequest, RespondComplaintRequest,
            UpdateComplaintStatusRequest,
        },
    },
    services::complaints::ComplaintService,
    AppState,
};

pub async fn list_complaints(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ComplaintQuery>,
) -> AppResult<Json<Vec<Complaint>>> {
    require_admin(&user)?;
    ComplaintService::list(state.store.as_ref(), &query).await.map(Json)
}

/// Any signed-in user may file a complaint.
pub async fn create_complaint(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Json(body): Json<CreateComplaintRequest>,
) -> AppResult<(StatusCode, Json<Complaint>)> {
    let complaint = ComplaintService::create(state.store.as_ref(), body).await?;
    Ok((StatusCode::CREATED, Json(complaint)))
}

pub async fn start_complaint(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<Complaint>> {
    require_admin(&user)?;
    ComplaintService::start(state.store.as_ref(), &id).await.map(Json)
}

pub async fn respond_complaint(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    Json(body): Json<RespondComplaintRequest>,
) -> AppResult<Json<Complaint>> {
    require_admin(&user)?;
    ComplaintService::respond(state.store.as_ref(), &id, body, &user.user_id)
        .await
        .map(Json)
}

pub async fn update_complaint_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateComplaintStatusRequest>,
) -> AppResult<Json<Complaint>> {
    require_admin(&user)?;
    ComplaintService::update_status(state.store.as_ref(), &id, body).await.map(Json)
}

/// CSV download of the complaints matching the same filters as the list.
pub async fn export_complaints(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ComplaintQuery>,
) -> AppResult<impl IntoResponse> {
    require_admin(&user)?;
    let complaints = ComplaintService::list(state.store.as_ref(), &query).await?;
    // BOM so spreadsheet apps detect UTF-8 Arabic text.
    let csv = format!("\u{feff}{}", ComplaintService::export_csv(&complaints)?);
    let file_name = format!("complaints_{}.csv", chrono::Utc::now().format("%Y-%m-%d"));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{file_name}\"")),
        ],
        csv,
    ))
}
