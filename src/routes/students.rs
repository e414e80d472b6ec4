use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::{AppError, AppResult},
    middleware::auth::require_admin,
    models::{
        auth::AuthenticatedUser,
        student::{
            ApproveStudentRequest, CreateStudentRequest, ImportSummary, Student, StudentQuery,
            UpdateStudentRequest,
        },
        user::UserType,
    },
    services::{
        import::parse_rows,
        students::{StudentService, StudentWrite},
    },
    AppState,
};

/// Parents only ever see their own children.
pub async fn list_students(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(mut query): Query<StudentQuery>,
) -> AppResult<Json<Vec<Student>>> {
    if user.role == UserType::Parent {
        query.parent_id = Some(user.user_id);
    }
    StudentService::list(state.store.as_ref(), &query).await.map(Json)
}

pub async fn get_student(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<Student>> {
    let student = StudentService::get(state.store.as_ref(), &id).await?;
    if user.role == UserType::Parent && student.parent_id != user.user_id {
        return Err(AppError::not_found("student", &id));
    }
    Ok(Json(student))
}

pub async fn create_student(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateStudentRequest>,
) -> AppResult<(StatusCode, Json<StudentWrite>)> {
    require_admin(&user)?;
    let write = StudentService::create(state.store.as_ref(), body).await?;
    Ok((StatusCode::CREATED, Json(write)))
}

pub async fn update_student(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateStudentRequest>,
) -> AppResult<Json<StudentWrite>> {
    require_admin(&user)?;
    StudentService::update(state.store.as_ref(), &id, body).await.map(Json)
}

/// Soft delete.
pub async fn delete_student(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<StudentWrite>> {
    require_admin(&user)?;
    StudentService::deactivate(state.store.as_ref(), &id).await.map(Json)
}

pub async fn relink_student(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<StudentWrite>> {
    require_admin(&user)?;
    StudentService::relink(state.store.as_ref(), &id).await.map(Json)
}

pub async fn approve_student(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    body: Option<Json<ApproveStudentRequest>>,
) -> AppResult<Json<Student>> {
    require_admin(&user)?;
    let req = body.map(|Json(b)| b).unwrap_or_default();
    StudentService::approve(state.store.as_ref(), &id, req).await.map(Json)
}

pub async fn reject_student(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<Student>> {
    require_admin(&user)?;
    StudentService::reject(state.store.as_ref(), &id).await.map(Json)
}

/// Multipart upload with a single `file` field (.xlsx, .xls, .ods or .csv).
pub async fn import_students(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<Json<ImportSummary>> {
    require_admin(&user)?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.to_string()))?
    {
        if field.name() == Some("file") {
            let file_name = field.file_name().unwrap_or("upload.xlsx").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(e.to_string()))?
                .to_vec();
            upload = Some((file_name, bytes));
        }
    }
    let (file_name, bytes) =
        upload.ok_or_else(|| AppError::Validation("Missing required field: file".into()))?;

    let rows = parse_rows(&file_name, bytes).map_err(|e| AppError::Validation(e.to_string()))?;
    StudentService::import(state.store.as_ref(), rows).await.map(Json)
}
