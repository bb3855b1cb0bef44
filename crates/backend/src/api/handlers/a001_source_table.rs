use axum::{
    body::Body,
    extract::{Multipart, Path},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use contracts::domain::a001_source_table::SourceTableView;
use contracts::usecases::common::UseCaseError;

use crate::domain::a001_source_table::export::XLSX_MIME;
use crate::domain::a001_source_table::service::{self, SourceTableError, UploadForm};
use crate::domain::a001_source_table::session::SessionError;

pub type ApiError = (StatusCode, Json<UseCaseError>);

fn api_error(e: SourceTableError) -> ApiError {
    let status = match &e {
        SourceTableError::Extract(_) => StatusCode::BAD_REQUEST,
        SourceTableError::Session(SessionError::NotFound(_)) => StatusCode::NOT_FOUND,
        SourceTableError::Session(SessionError::NoTable) => StatusCode::BAD_REQUEST,
        SourceTableError::Session(SessionError::SyncInProgress) => StatusCode::CONFLICT,
        SourceTableError::Export(_) | SourceTableError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let body = match status {
        StatusCode::NOT_FOUND => UseCaseError::not_found(e.to_string()),
        StatusCode::CONFLICT => UseCaseError::conflict(e.to_string()),
        StatusCode::BAD_REQUEST => UseCaseError::validation(e.to_string()),
        _ => {
            tracing::error!("Source table request failed: {:#}", e);
            UseCaseError::internal(e.to_string())
        }
    };
    (status, Json(body))
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(UseCaseError::validation(message)),
    )
}

/// POST /api/a001/source-table/session
pub async fn create_session() -> Result<Json<SourceTableView>, ApiError> {
    service::create_session()
        .map(Json)
        .map_err(|e| api_error(SourceTableError::Internal(e)))
}

/// POST /api/a001/source-table/upload
///
/// multipart: `file`, `sheet_name`, `usecols`, `nrows`, `session_id` (необязательно)
pub async fn upload(mut multipart: Multipart) -> Result<Json<SourceTableView>, ApiError> {
    let mut form = UploadForm::default();
    let mut has_file = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                form.file_name = field.file_name().unwrap_or("upload.xlsx").to_string();
                form.bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("cannot read file: {}", e)))?
                    .to_vec();
                has_file = true;
            }
            "sheet_name" | "usecols" | "nrows" | "session_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("cannot read field {}: {}", name, e)))?;
                let text = text.trim().to_string();
                if text.is_empty() {
                    continue;
                }
                match name.as_str() {
                    "sheet_name" => form.sheet_name = Some(text),
                    "usecols" => form.usecols = Some(text),
                    "nrows" => {
                        let nrows = text
                            .parse::<usize>()
                            .map_err(|_| bad_request(format!("'{}' is not a row count", text)))?;
                        form.nrows = Some(nrows);
                    }
                    _ => form.session_id = Some(text),
                }
            }
            other => tracing::debug!("Ignoring multipart field '{}'", other),
        }
    }

    if !has_file || form.bytes.is_empty() {
        return Err(bad_request("no file uploaded"));
    }

    service::upload(form).map(Json).map_err(api_error)
}

/// GET /api/a001/source-table/:session_id
pub async fn get_by_session(
    Path(session_id): Path<String>,
) -> Result<Json<SourceTableView>, ApiError> {
    service::get_view(&session_id).map(Json).map_err(api_error)
}

/// GET /api/a001/source-table/:session_id/download
pub async fn download(Path(session_id): Path<String>) -> Result<Response, ApiError> {
    let (file_name, bytes) = service::download(&session_id).map_err(api_error)?;
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, XLSX_MIME)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file_name),
        )
        .body(Body::from(bytes))
        .map_err(|e| {
            tracing::error!("Failed to build download response: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(UseCaseError::internal(e.to_string())),
            )
        })
}
