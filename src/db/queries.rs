use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::analysis::{ProcessingStatus, QrDetection, VideoAnalysis};

fn row_to_analysis(row: &PgRow) -> Result<VideoAnalysis, sqlx::Error> {
    let status_str: String = row.try_get("status")?;
    // Lenient parse: unknown text falls back to the initial state.
    let status = status_str
        .parse::<ProcessingStatus>()
        .unwrap_or(ProcessingStatus::InQueue);

    Ok(VideoAnalysis {
        id: row.try_get("id")?,
        original_file_name: row.try_get("original_file_name")?,
        extension: row.try_get("extension")?,
        status,
        submitted_at: row.try_get("submitted_at")?,
        qr_detections: Vec::new(),
    })
}

fn row_to_detection(row: &PgRow) -> Result<QrDetection, sqlx::Error> {
    Ok(QrDetection {
        id: row.try_get("id")?,
        analysis_id: row.try_get("analysis_id")?,
        content: row.try_get("content")?,
        start_seconds: row.try_get("start_seconds")?,
        duration_seconds: row.try_get("duration_seconds")?,
    })
}

/// Insert a new analysis record (upload path, status `InQueue`)
pub async fn create_analysis(pool: &PgPool, analysis: &VideoAnalysis) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO video_analyses (id, original_file_name, extension, status, submitted_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(analysis.id)
    .bind(&analysis.original_file_name)
    .bind(&analysis.extension)
    .bind(analysis.status.to_string())
    .bind(analysis.submitted_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get an analysis by ID (without its detection rows)
pub async fn get_analysis(pool: &PgPool, id: Uuid) -> Result<Option<VideoAnalysis>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, original_file_name, extension, status, submitted_at
        FROM video_analyses
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_analysis).transpose()
}

/// Update status and submission timestamp of an analysis
pub async fn update_status(pool: &PgPool, analysis: &VideoAnalysis) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE video_analyses
        SET status = $1, submitted_at = $2
        WHERE id = $3
        "#,
    )
    .bind(analysis.status.to_string())
    .bind(analysis.submitted_at)
    .bind(analysis.id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert the detection rows produced by one analysis run
pub async fn insert_detections(pool: &PgPool, rows: &[QrDetection]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    for detection in rows {
        sqlx::query(
            r#"
            INSERT INTO qr_detections (id, analysis_id, content, start_seconds, duration_seconds)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(detection.id)
        .bind(detection.analysis_id)
        .bind(&detection.content)
        .bind(detection.start_seconds)
        .bind(detection.duration_seconds)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await
}

/// Get the detection rows for an analysis, in timeline order
pub async fn get_detections(
    pool: &PgPool,
    analysis_id: Uuid,
) -> Result<Vec<QrDetection>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, analysis_id, content, start_seconds, duration_seconds
        FROM qr_detections
        WHERE analysis_id = $1
        ORDER BY start_seconds ASC
        "#,
    )
    .bind(analysis_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_detection).collect()
}

/// List all analyses, newest first
pub async fn list_analyses(pool: &PgPool) -> Result<Vec<VideoAnalysis>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, original_file_name, extension, status, submitted_at
        FROM video_analyses
        ORDER BY submitted_at DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_analysis).collect()
}

/// Administrative bulk purge; detection rows go with their analyses
pub async fn delete_all(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM video_analyses").execute(pool).await?;
    Ok(result.rows_affected())
}
