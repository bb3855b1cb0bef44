use super::export;
use super::extractor::{self, ExtractError};
use super::session::{SessionError, SessionStore};
use contracts::domain::a001_source_table::{ExtractOptions, SourceTableView};
use once_cell::sync::Lazy;

use crate::shared::config::{get_config, ExtractionConfig};

/// Сессии загрузки процесса
static SESSIONS: Lazy<SessionStore> = Lazy::new(SessionStore::new);

pub fn sessions() -> &'static SessionStore {
    &SESSIONS
}

#[derive(Debug, thiserror::Error)]
pub enum SourceTableError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("failed to build output workbook: {0}")]
    Export(#[from] rust_xlsxwriter::XlsxError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Параметры формы; пустые поля берутся из `[extraction]`
#[derive(Debug, Default, Clone)]
pub struct UploadForm {
    pub session_id: Option<String>,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub sheet_name: Option<String>,
    pub usecols: Option<String>,
    pub nrows: Option<usize>,
}

pub fn resolve_options(form: &UploadForm, defaults: &ExtractionConfig) -> ExtractOptions {
    let mut options = defaults.default_options();
    if let Some(sheet) = form.sheet_name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        options.sheet_name = sheet.to_string();
    }
    if let Some(cols) = form.usecols.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        options.usecols = cols.to_string();
    }
    if let Some(nrows) = form.nrows {
        options.nrows = nrows;
    }
    options
}

/// Новая пустая сессия (AwaitingUpload)
pub fn create_session() -> anyhow::Result<SourceTableView> {
    let config = get_config()?;
    let session_id = sessions().create(config.extraction.default_options());
    Ok(sessions().view(&session_id)?)
}

/// Извлекает таблицу из загруженного файла и кладёт её в сессию
pub fn upload(form: UploadForm) -> Result<SourceTableView, SourceTableError> {
    let config = get_config()?;
    upload_into(sessions(), &config.extraction, form)
}

pub(crate) fn upload_into(
    store: &SessionStore,
    defaults: &ExtractionConfig,
    form: UploadForm,
) -> Result<SourceTableView, SourceTableError> {
    let options = resolve_options(&form, defaults);
    tracing::info!(
        "Upload '{}' ({} bytes): sheet '{}', columns {}, rows {}",
        form.file_name,
        form.bytes.len(),
        options.sheet_name,
        options.usecols,
        options.nrows
    );

    let table = extractor::extract_table(&form.bytes, &options)?;
    let view = store.load_table(
        form.session_id.as_deref(),
        form.file_name,
        form.bytes,
        options,
        table,
    )?;
    tracing::info!(
        "Session {}: table loaded ({} rows)",
        view.session_id,
        view.table.len()
    );
    Ok(view)
}

pub fn get_view(session_id: &str) -> Result<SourceTableView, SourceTableError> {
    Ok(sessions().view(session_id)?)
}

/// Книга для скачивания: имя файла и содержимое
pub fn download(session_id: &str) -> Result<(String, Vec<u8>), SourceTableError> {
    let config = get_config()?;
    download_from(sessions(), &config.extraction, session_id)
}

pub(crate) fn download_from(
    store: &SessionStore,
    extraction: &ExtractionConfig,
    session_id: &str,
) -> Result<(String, Vec<u8>), SourceTableError> {
    let stored = store.upload(session_id)?;
    let bytes = export::build_output(
        extraction.output_mode,
        &stored.original,
        &stored.options.sheet_name,
        &stored.table,
    )?;
    Ok((export::OUTPUT_FILE_NAME.to_string(), bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::a001_source_table::extractor::tests::workbook;
    use crate::shared::config::OutputMode;
    use contracts::domain::a001_source_table::SessionState;

    fn form(bytes: Vec<u8>) -> UploadForm {
        UploadForm {
            file_name: "carga.xlsx".to_string(),
            bytes,
            ..Default::default()
        }
    }

    #[test]
    fn test_blank_form_fields_fall_back_to_defaults() {
        let mut f = form(Vec::new());
        f.sheet_name = Some("  ".to_string());
        f.usecols = Some("A,C".to_string());
        let options = resolve_options(&f, &ExtractionConfig::default());
        assert_eq!(options.sheet_name, "backup");
        assert_eq!(options.usecols, "A,C");
        assert_eq!(options.nrows, 28);
    }

    #[test]
    fn test_upload_then_download() {
        let store = SessionStore::new();
        let bytes = workbook("backup", &[vec!["TICKET"], vec!["T1"]]);
        let view = upload_into(&store, &ExtractionConfig::default(), form(bytes.clone())).unwrap();
        assert_eq!(view.state, SessionState::TableLoaded);
        assert_eq!(view.table.cell("TICKET", 0), "T1");

        let (name, out) =
            download_from(&store, &ExtractionConfig::default(), &view.session_id).unwrap();
        assert_eq!(name, "archivo_modificado.xlsx");
        assert_eq!(out, bytes);

        let reconstructed = ExtractionConfig {
            output_mode: OutputMode::Reconstructed,
            ..ExtractionConfig::default()
        };
        let (_, rebuilt) = download_from(&store, &reconstructed, &view.session_id).unwrap();
        let table = extractor::extract_table(&rebuilt, &view.options).unwrap();
        assert_eq!(table, view.table);
    }

    #[test]
    fn test_bad_workbook_keeps_previous_table() {
        let store = SessionStore::new();
        let bytes = workbook("backup", &[vec!["TICKET"], vec!["T1"]]);
        let view = upload_into(&store, &ExtractionConfig::default(), form(bytes)).unwrap();

        let mut bad = form(b"garbage".to_vec());
        bad.session_id = Some(view.session_id.clone());
        let err = upload_into(&store, &ExtractionConfig::default(), bad).unwrap_err();
        assert!(matches!(err, SourceTableError::Extract(ExtractError::Workbook(_))));
        assert_eq!(store.view(&view.session_id).unwrap().table, view.table);
    }

    #[test]
    fn test_download_before_upload_is_rejected() {
        let store = SessionStore::new();
        let id = store.create(ExtractOptions::default());
        assert!(matches!(
            download_from(&store, &ExtractionConfig::default(), &id),
            Err(SourceTableError::Session(SessionError::NoTable))
        ));
    }
}
