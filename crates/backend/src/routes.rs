use axum::{
    extract::DefaultBodyLimit,
    response::Html,
    routing::{get, post},
    Router,
};

use crate::api::handlers;

/// Страница формы загрузки
const INDEX_HTML: &str = include_str!("../static/index.html");

/// Конфигурация всех роутов приложения
///
/// `max_upload_bytes` ограничивает тело запроса загрузки книги.
pub fn configure_routes(max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(|| async { Html(INDEX_HTML) }))
        .route("/health", get(|| async { "ok" }))
        // ========================================
        // A001 SOURCE TABLE
        // ========================================
        .route(
            "/api/a001/source-table/session",
            post(handlers::a001_source_table::create_session),
        )
        .route(
            "/api/a001/source-table/upload",
            post(handlers::a001_source_table::upload)
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route(
            "/api/a001/source-table/:session_id",
            get(handlers::a001_source_table::get_by_session),
        )
        .route(
            "/api/a001/source-table/:session_id/download",
            get(handlers::a001_source_table::download),
        )
        // ========================================
        // U501 SYNC TO SHEET
        // ========================================
        .route(
            "/api/u501/sync/:session_id",
            post(handlers::usecases::u501_sync),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::a001_source_table::extractor::tests::workbook;
    use crate::shared::config::tests::default_config;
    use crate::shared::config::{GoogleBackend, ServerConfig};
    use crate::shared::google_sheets;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use contracts::domain::a001_source_table::{SessionState, SourceTableView};
    use contracts::usecases::common::UseCaseError;
    use contracts::usecases::u501_sync_to_sheet::{RowStatus, SyncReport};
    use serde::de::DeserializeOwned;
    use std::sync::Once;
    use tower::ServiceExt;

    const BOUNDARY: &str = "XBOUNDARY";

    fn app() -> Router {
        configure_routes(ServerConfig::default().max_upload_bytes())
    }

    /// Глобальная конфигурация по умолчанию с таблицей в памяти
    fn init_memory_backend() {
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            let mut config = default_config();
            config.google.backend = GoogleBackend::Memory;
            google_sheets::initialize(&config.google).unwrap();
            crate::shared::config::initialize(config).unwrap();
        });
    }

    fn multipart(fields: &[(&str, &str)], file: Option<&[u8]>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        if let Some(bytes) = file {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"carga.xlsx\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    BOUNDARY
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    async fn upload(router: Router, body: Vec<u8>) -> Response {
        router
            .oneshot(
                Request::post("/api/a001/source-table/upload")
                    .header(
                        "content-type",
                        format!("multipart/form-data; boundary={}", BOUNDARY),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn json<T: DeserializeOwned>(response: Response) -> T {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_form_page() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let page = String::from_utf8(body.to_vec()).unwrap();
        assert!(page.contains("Load into Google Sheet"));
    }

    #[tokio::test]
    async fn test_unknown_session_is_404() {
        let response = app()
            .oneshot(
                Request::get("/api/a001/source-table/does-not-exist")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upload_without_file_is_rejected() {
        let response = upload(app(), multipart(&[("sheet_name", "backup")], None)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_then_sync() {
        init_memory_backend();
        let mut rows = vec![vec!["NUMERO DE PARTE", "DESCRIPCION", "CANT.", "TICKET"]];
        rows.extend(std::iter::repeat(vec![""; 4]).take(9));
        rows.push(vec!["P1", "", "5", "T1"]);
        let bytes = workbook("backup", &rows);

        let response = upload(app(), multipart(&[("nrows", "28")], Some(&bytes))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let view: SourceTableView = json(response).await;
        assert_eq!(view.state, SessionState::TableLoaded);
        assert_eq!(view.table.len(), 10);

        let response = app()
            .oneshot(
                Request::post(format!("/api/u501/sync/{}", view.session_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let report: SyncReport = json(response).await;
        assert_eq!(report.session_id, view.session_id);
        assert_eq!(report.total_written, 1);
        assert_eq!(report.rows[0].status, RowStatus::Written);

        let response = app()
            .oneshot(
                Request::get(format!("/api/a001/source-table/{}", view.session_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let view: SourceTableView = json(response).await;
        assert_eq!(view.state, SessionState::SyncComplete);
    }

    #[tokio::test]
    async fn test_upload_larger_than_two_megabytes_reaches_extractor() {
        init_memory_backend();
        let payload = vec![b'x'; 3 * 1024 * 1024];

        let response = upload(app(), multipart(&[], Some(&payload))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: UseCaseError = json(response).await;
        assert!(error.message.contains("not a readable .xlsx"), "{}", error.message);
    }

    #[tokio::test]
    async fn test_upload_over_limit_is_rejected() {
        let payload = vec![b'x'; 4096];

        let response = upload(configure_routes(1024), multipart(&[], Some(&payload))).await;
        assert!(matches!(
            response.status(),
            StatusCode::BAD_REQUEST | StatusCode::PAYLOAD_TOO_LARGE
        ));
    }
}
