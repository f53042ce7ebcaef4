//! Upload handlers
//!
//! Slot flow: `POST /patients/{id}/uploads` returns a signed PUT URL, the
//! client uploads to storage, then confirms or reports failure. Direct flow
//! streams the bytes through the gateway in one request.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap},
    Json,
};
use medvault_common::{
    domain::UploadRecord,
    errors::{AppError, Result},
    uploads::{DownloadLink, FileDescriptor, UploadSlot},
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{created, done, ok, validate, Reply};
use crate::{extract::CurrentUser, AppState};

#[derive(Debug, Deserialize, Validate)]
pub struct UploadSlotRequest {
    #[validate(length(min = 1, max = 255))]
    pub file_name: String,

    #[validate(length(min = 1, max = 255))]
    pub content_type: String,

    pub size_bytes: u64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DirectUploadQuery {
    #[validate(length(min = 1, max = 255))]
    pub file_name: String,

    /// Overrides the request's Content-Type header
    pub content_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FailRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn issue_upload_slot(
    State(state): State<AppState>,
    CurrentUser(requester): CurrentUser,
    Path(patient_id): Path<Uuid>,
    Json(request): Json<UploadSlotRequest>,
) -> Result<Reply<UploadSlot>> {
    validate(&request)?;
    let slot = state
        .services
        .uploads
        .issue_upload_slot(
            &requester,
            patient_id,
            FileDescriptor {
                file_name: request.file_name,
                content_type: request.content_type,
                size_bytes: request.size_bytes,
            },
        )
        .await?;
    Ok(created("Upload URL issued", slot))
}

pub async fn direct_upload(
    State(state): State<AppState>,
    CurrentUser(requester): CurrentUser,
    Path(patient_id): Path<Uuid>,
    Query(query): Query<DirectUploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Reply<UploadRecord>> {
    validate(&query)?;
    let content_type = match query.content_type {
        Some(content_type) => content_type,
        None => headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| AppError::validation("content_type", "Content type is required"))?,
    };

    let record = state
        .services
        .uploads
        .direct_upload(
            &requester,
            patient_id,
            FileDescriptor {
                file_name: query.file_name,
                content_type,
                size_bytes: body.len() as u64,
            },
            body.to_vec(),
        )
        .await?;
    Ok(created("File uploaded", record))
}

pub async fn list_uploads(
    State(state): State<AppState>,
    CurrentUser(requester): CurrentUser,
    Path(patient_id): Path<Uuid>,
) -> Result<Reply<Vec<UploadRecord>>> {
    let uploads = state
        .services
        .uploads
        .list_for_patient(&requester, patient_id)
        .await?;
    Ok(ok(format!("{} uploads", uploads.len()), uploads))
}

pub async fn confirm_upload(
    State(state): State<AppState>,
    CurrentUser(requester): CurrentUser,
    Path(upload_id): Path<Uuid>,
) -> Result<Reply<UploadRecord>> {
    let record = state.services.uploads.confirm_upload(upload_id, &requester).await?;
    Ok(ok("Upload confirmed", record))
}

pub async fn fail_upload(
    State(state): State<AppState>,
    CurrentUser(requester): CurrentUser,
    Path(upload_id): Path<Uuid>,
    body: Option<Json<FailRequest>>,
) -> Result<Reply<UploadRecord>> {
    let reason = body
        .and_then(|Json(request)| request.reason)
        .unwrap_or_else(|| "Upload failed".to_string());
    let record = state
        .services
        .uploads
        .mark_failed(upload_id, &requester, &reason)
        .await?;
    Ok(ok("Upload marked failed", record))
}

pub async fn download_url(
    State(state): State<AppState>,
    CurrentUser(requester): CurrentUser,
    Path(upload_id): Path<Uuid>,
) -> Result<Reply<DownloadLink>> {
    let link = state.services.uploads.download_url(upload_id, &requester).await?;
    Ok(ok("Download URL issued", link))
}

pub async fn delete_upload(
    State(state): State<AppState>,
    CurrentUser(requester): CurrentUser,
    Path(upload_id): Path<Uuid>,
) -> Result<Reply<()>> {
    state.services.uploads.delete_upload(upload_id, &requester).await?;
    Ok(done("Upload deleted"))
}
