use contracts::domain::a001_source_table::{ExtractOptions, SessionState, SourceTable, SourceTableView};
use contracts::usecases::u501_sync_to_sheet::SyncReport;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Сколько сессий держать в памяти; самая старая вытесняется
const MAX_SESSIONS: usize = 64;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(String),

    #[error("no workbook has been uploaded in this session yet")]
    NoTable,

    #[error("a sync is already running for this session")]
    SyncInProgress,
}

#[derive(Debug, Clone)]
struct UploadSession {
    file_name: String,
    original: Arc<Vec<u8>>,
    options: ExtractOptions,
    table: Arc<SourceTable>,
    state: SessionState,
    last_report: Option<SyncReport>,
    /// Порядковый номер последнего изменения (для вытеснения)
    touched: u64,
}

impl UploadSession {
    fn empty(options: ExtractOptions, touched: u64) -> Self {
        Self {
            file_name: String::new(),
            original: Arc::new(Vec::new()),
            options,
            table: Arc::new(SourceTable::default()),
            state: SessionState::AwaitingUpload,
            last_report: None,
            touched,
        }
    }

    fn view(&self, session_id: &str) -> SourceTableView {
        SourceTableView {
            session_id: session_id.to_string(),
            file_name: self.file_name.clone(),
            state: self.state,
            options: self.options.clone(),
            table: (*self.table).clone(),
        }
    }
}

/// Загруженный файл, нужный для скачивания
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub file_name: String,
    pub original: Arc<Vec<u8>>,
    pub options: ExtractOptions,
    pub table: Arc<SourceTable>,
}

/// Сессии загрузки (in-memory).
///
/// AwaitingUpload -> TableLoaded -> SyncInProgress -> SyncComplete;
/// новая загрузка возвращает сессию в TableLoaded.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, UploadSession>>>,
    clock: Arc<AtomicU64>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    pub fn create(&self, options: ExtractOptions) -> String {
        let session_id = uuid::Uuid::new_v4().to_string();
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        evict_oldest(&mut sessions);
        sessions.insert(session_id.clone(), UploadSession::empty(options, self.tick()));
        session_id
    }

    /// Кладёт таблицу в сессию (создаёт новую, если `session_id` не задан)
    pub fn load_table(
        &self,
        session_id: Option<&str>,
        file_name: String,
        original: Vec<u8>,
        options: ExtractOptions,
        table: SourceTable,
    ) -> Result<SourceTableView, SessionError> {
        let session_id = match session_id {
            Some(id) => id.to_string(),
            None => self.create(options.clone()),
        };
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let session = sessions
            .get_mut(&session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.clone()))?;
        if session.state == SessionState::SyncInProgress {
            return Err(SessionError::SyncInProgress);
        }

        session.file_name = file_name;
        session.original = Arc::new(original);
        session.options = options;
        session.table = Arc::new(table);
        session.state = SessionState::TableLoaded;
        session.last_report = None;
        session.touched = self.tick();
        Ok(session.view(&session_id))
    }

    pub fn view(&self, session_id: &str) -> Result<SourceTableView, SessionError> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(session_id)
            .map(|s| s.view(session_id))
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    pub fn upload(&self, session_id: &str) -> Result<StoredUpload, SessionError> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        let session = sessions
            .get(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        if session.state == SessionState::AwaitingUpload {
            return Err(SessionError::NoTable);
        }
        Ok(StoredUpload {
            file_name: session.file_name.clone(),
            original: session.original.clone(),
            options: session.options.clone(),
            table: session.table.clone(),
        })
    }

    /// Переводит сессию в SyncInProgress и отдаёт таблицу для синхронизации
    pub fn begin_sync(&self, session_id: &str) -> Result<Arc<SourceTable>, SessionError> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        match session.state {
            SessionState::AwaitingUpload => Err(SessionError::NoTable),
            SessionState::SyncInProgress => Err(SessionError::SyncInProgress),
            SessionState::TableLoaded | SessionState::SyncComplete => {
                session.state = SessionState::SyncInProgress;
                session.touched = self.tick();
                Ok(session.table.clone())
            }
        }
    }

    pub fn finish_sync(&self, session_id: &str, report: Option<SyncReport>) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if let Some(session) = sessions.get_mut(session_id) {
            session.state = if report.is_some() {
                SessionState::SyncComplete
            } else {
                SessionState::TableLoaded
            };
            session.last_report = report;
            session.touched = self.tick();
        }
    }

    pub fn last_report(&self, session_id: &str) -> Option<SyncReport> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.get(session_id).and_then(|s| s.last_report.clone())
    }
}

fn evict_oldest(sessions: &mut HashMap<String, UploadSession>) {
    while sessions.len() >= MAX_SESSIONS {
        let Some(oldest) = sessions
            .iter()
            .filter(|(_, s)| s.state != SessionState::SyncInProgress)
            .min_by_key(|(_, s)| s.touched)
            .map(|(id, _)| id.clone())
        else {
            break;
        };
        tracing::debug!("Evicting upload session {}", oldest);
        sessions.remove(&oldest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(store: &SessionStore, id: Option<&str>) -> SourceTableView {
        store
            .load_table(
                id,
                "carga.xlsx".to_string(),
                vec![1, 2, 3],
                ExtractOptions::default(),
                SourceTable::new(vec!["TICKET".to_string()]),
            )
            .unwrap()
    }

    #[test]
    fn test_state_machine() {
        let store = SessionStore::new();
        let id = store.create(ExtractOptions::default());
        assert_eq!(store.view(&id).unwrap().state, SessionState::AwaitingUpload);
        assert_eq!(store.begin_sync(&id), Err(SessionError::NoTable));

        let view = load(&store, Some(&id));
        assert_eq!(view.state, SessionState::TableLoaded);

        store.begin_sync(&id).unwrap();
        assert_eq!(store.begin_sync(&id), Err(SessionError::SyncInProgress));
        assert_eq!(
            store
                .load_table(
                    Some(&id),
                    "x.xlsx".to_string(),
                    Vec::new(),
                    ExtractOptions::default(),
                    SourceTable::default()
                )
                .unwrap_err(),
            SessionError::SyncInProgress
        );

        store.finish_sync(&id, Some(SyncReport::new(id.clone())));
        assert_eq!(store.view(&id).unwrap().state, SessionState::SyncComplete);
        assert!(store.last_report(&id).is_some());

        // повторная синхронизация после завершения разрешена
        store.begin_sync(&id).unwrap();
        store.finish_sync(&id, None);
        assert_eq!(store.view(&id).unwrap().state, SessionState::TableLoaded);
    }

    #[test]
    fn test_new_upload_replaces_table_and_clears_report() {
        let store = SessionStore::new();
        let id = load(&store, None).session_id;
        store.begin_sync(&id).unwrap();
        store.finish_sync(&id, Some(SyncReport::new(id.clone())));

        load(&store, Some(&id));
        assert_eq!(store.view(&id).unwrap().state, SessionState::TableLoaded);
        assert!(store.last_report(&id).is_none());
        assert_eq!(store.upload(&id).unwrap().original.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_unknown_session() {
        let store = SessionStore::new();
        assert_eq!(
            store.view("nope").unwrap_err(),
            SessionError::NotFound("nope".to_string())
        );
        assert!(store.upload("nope").is_err());
    }

    #[test]
    fn test_oldest_sessions_are_evicted() {
        let store = SessionStore::new();
        let first = store.create(ExtractOptions::default());
        for _ in 0..MAX_SESSIONS {
            store.create(ExtractOptions::default());
        }
        assert!(store.view(&first).is_err());
    }
}
