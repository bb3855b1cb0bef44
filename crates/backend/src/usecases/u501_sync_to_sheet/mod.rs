pub mod executor;
pub mod field_mapping;
pub mod row_writer;

pub use executor::SyncExecutor;

use contracts::usecases::common::UseCaseError;
use contracts::usecases::u501_sync_to_sheet::SyncReport;

use crate::domain::a001_source_table::service::sessions;
use crate::domain::a001_source_table::session::{SessionError, SessionStore};

/// Синхронизирует таблицу сессии и возвращает отчёт после завершения
pub async fn execute(session_id: &str) -> Result<SyncReport, UseCaseError> {
    let executor = SyncExecutor::from_config()?;
    execute_with(sessions(), executor, session_id).await
}

pub(crate) async fn execute_with(
    store: &SessionStore,
    executor: SyncExecutor,
    session_id: &str,
) -> Result<SyncReport, UseCaseError> {
    let table = store.begin_sync(session_id).map_err(|e| match e {
        SessionError::NotFound(_) => UseCaseError::not_found(e.to_string()),
        SessionError::NoTable => UseCaseError::validation(e.to_string()),
        SessionError::SyncInProgress => UseCaseError::conflict(e.to_string()),
    })?;

    // Отдельная задача: обрыв HTTP-запроса не прерывает синхронизацию на полпути
    let id = session_id.to_string();
    let handle = tokio::spawn(async move { executor.run(&id, &table).await });

    match handle.await {
        Ok(report) => {
            store.finish_sync(session_id, Some(report.clone()));
            Ok(report)
        }
        Err(e) => {
            tracing::error!("Sync task for session {} aborted: {}", session_id, e);
            store.finish_sync(session_id, None);
            Err(UseCaseError::internal("sync task aborted").with_details(e.to_string()))
        }
    }
}
