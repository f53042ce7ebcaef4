//! Analysis handlers

use axum::extract::{Path, State};
use medvault_common::{
    domain::{AiAnalysis, AnalysisStatus},
    errors::Result,
};
use uuid::Uuid;

use super::{created, ok, Reply};
use crate::{extract::CurrentUser, AppState};

/// Runs the analysis inline; a provider failure still answers 201 with a
/// `failed` record
pub async fn start_analysis(
    State(state): State<AppState>,
    CurrentUser(requester): CurrentUser,
    Path(upload_id): Path<Uuid>,
) -> Result<Reply<AiAnalysis>> {
    let analysis = state
        .services
        .analyses
        .start_analysis(&requester, upload_id)
        .await?;

    let message = match analysis.status {
        AnalysisStatus::Completed => "Analysis completed",
        _ => "Analysis failed",
    };
    Ok(created(message, analysis))
}

pub async fn get_analysis(
    State(state): State<AppState>,
    CurrentUser(requester): CurrentUser,
    Path(analysis_id): Path<String>,
) -> Result<Reply<AiAnalysis>> {
    let analysis = state
        .services
        .analyses
        .get_analysis(&requester, &analysis_id)
        .await?;
    Ok(ok("Analysis found", analysis))
}

pub async fn list_analyses(
    State(state): State<AppState>,
    CurrentUser(requester): CurrentUser,
    Path(patient_id): Path<Uuid>,
) -> Result<Reply<Vec<AiAnalysis>>> {
    let analyses = state
        .services
        .analyses
        .list_for_patient(&requester, patient_id)
        .await?;
    Ok(ok(format!("{} analyses", analyses.len()), analyses))
}
