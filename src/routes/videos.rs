use axum::extract::{Multipart, Path as UrlPath, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::queries;
use crate::models::analysis::{ProcessingStatus, QrDetection, VideoAnalysis};
use crate::models::job::AnalysisJob;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub id: Uuid,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub id: Uuid,
    pub status: ProcessingStatus,
    pub submitted_at: chrono::DateTime<chrono::Utc>,
}

/// POST /v1/videos — accept one or more video files for analysis.
///
/// Each accepted file gets its own `InQueue` record in both stores and one
/// queued job; the response is 202 with one entry per file.
pub async fn upload_videos(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Vec<UploadResponse>>), StatusCode> {
    let mut responses = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        let Some(file_name) = field.file_name().map(str::to_owned) else {
            continue;
        };

        let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;

        let Some(extension) = file_extension(&file_name) else {
            tracing::warn!(file_name, "upload rejected: no file extension");
            return Err(StatusCode::BAD_REQUEST);
        };
        if !state.allowed_extensions.iter().any(|e| e == &extension) {
            tracing::warn!(file_name, extension, "upload rejected: extension not allowed");
            return Err(StatusCode::BAD_REQUEST);
        }

        let analysis = VideoAnalysis::new(&file_name, &extension);
        let video_path = state
            .video_storage_path
            .join(format!("{}{}", analysis.id, analysis.extension));

        tokio::fs::create_dir_all(&state.video_storage_path)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to create video storage directory");
                StatusCode::INTERNAL_SERVER_ERROR
            })?;
        tokio::fs::write(&video_path, &data).await.map_err(|e| {
            tracing::error!(error = %e, file_name, "failed to save uploaded video");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

        queries::create_analysis(&state.db, &analysis)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, analysis_id = %analysis.id, "failed to create analysis record");
                StatusCode::INTERNAL_SERVER_ERROR
            })?;
        state.documents.create(&analysis).await.map_err(|e| {
            tracing::error!(error = %e, analysis_id = %analysis.id, "failed to create mirror document");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

        let job = AnalysisJob {
            id: analysis.id,
            file_name: file_name.clone(),
            path: video_path.to_string_lossy().into_owned(),
        };
        state.queue.enqueue(&job).await.map_err(|e| {
            tracing::error!(error = %e, analysis_id = %analysis.id, "failed to enqueue analysis job");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

        metrics::counter!("videos_uploaded_total").increment(1);
        tracing::info!(analysis_id = %analysis.id, file_name, "video accepted and queued");

        responses.push(UploadResponse {
            id: analysis.id,
            message: "Video accepted and queued for analysis".to_string(),
        });
    }

    if responses.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    Ok((StatusCode::ACCEPTED, Json(responses)))
}

/// GET /v1/videos/{id}/status — current status from the relational store.
pub async fn get_status(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<Uuid>,
) -> Result<Json<StatusResponse>, StatusCode> {
    let analysis = queries::get_analysis(&state.db, id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, analysis_id = %id, "status lookup failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(StatusResponse {
        id: analysis.id,
        status: analysis.status,
        submitted_at: analysis.submitted_at,
    }))
}

/// GET /v1/videos/{id}/detections — flat detection rows, timeline order.
pub async fn get_detections(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<Uuid>,
) -> Result<Json<Vec<QrDetection>>, StatusCode> {
    let detections = queries::get_detections(&state.db, id).await.map_err(|e| {
        tracing::error!(error = %e, analysis_id = %id, "detection lookup failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    if detections.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(detections))
}

/// GET /v1/videos — list all analyses (relational store).
pub async fn list_videos(
    State(state): State<AppState>,
) -> Result<Json<Vec<VideoAnalysis>>, StatusCode> {
    let analyses = queries::list_analyses(&state.db).await.map_err(|e| {
        tracing::error!(error = %e, "listing analyses failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(analyses))
}

/// GET /v1/videos/{id}/document — whole mirrored document with embedded
/// detections.
pub async fn get_document(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<Uuid>,
) -> Result<Json<VideoAnalysis>, StatusCode> {
    let document = state
        .documents
        .get(id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, analysis_id = %id, "document lookup failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(document))
}

/// GET /v1/documents — list all mirrored documents.
pub async fn list_documents(
    State(state): State<AppState>,
) -> Result<Json<Vec<VideoAnalysis>>, StatusCode> {
    let documents = state.documents.list().await.map_err(|e| {
        tracing::error!(error = %e, "listing documents failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(documents))
}

/// DELETE /v1/videos — administrative bulk purge of both stores.
///
/// Two independent delete calls, no cross-store transaction; either failing
/// yields a 500 after both were attempted.
pub async fn purge_all(State(state): State<AppState>) -> StatusCode {
    tracing::warn!("purging all analysis data from both stores");

    let relational = queries::delete_all(&state.db).await;
    let documents = state.documents.delete_all().await;

    match (relational, documents) {
        (Ok(rows), Ok(docs)) => {
            tracing::warn!(rows, docs, "purge complete");
            StatusCode::NO_CONTENT
        }
        (relational, documents) => {
            if let Err(e) = relational {
                tracing::error!(error = %e, "relational purge failed");
            }
            if let Err(e) = documents {
                tracing::error!(error = %e, "document purge failed");
            }
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn file_extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_lowercased_with_dot() {
        assert_eq!(file_extension("Clip.MP4").as_deref(), Some(".mp4"));
        assert_eq!(file_extension("a.b.webm").as_deref(), Some(".webm"));
        assert_eq!(file_extension("noext"), None);
    }
}
