use axum::{extract::Path, http::StatusCode, Json};
use contracts::usecases::common::UseCaseError;
use contracts::usecases::u501_sync_to_sheet::SyncReport;

use crate::usecases;

fn status_for(error: &UseCaseError) -> StatusCode {
    match error.code.as_str() {
        "NOT_FOUND" => StatusCode::NOT_FOUND,
        "CONFLICT" => StatusCode::CONFLICT,
        "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// UseCase u501: Sync to Google Sheet
// ============================================================================

/// POST /api/u501/sync/:session_id
///
/// Отвечает только после завершения синхронизации.
pub async fn u501_sync(
    Path(session_id): Path<String>,
) -> Result<Json<SyncReport>, (StatusCode, Json<UseCaseError>)> {
    match usecases::u501_sync_to_sheet::execute(&session_id).await {
        Ok(report) => Ok(Json(report)),
        Err(e) => {
            tracing::error!("Sync for session {} rejected: {}", session_id, e);
            Err((status_for(&e), Json(e)))
        }
    }
}
