use contracts::domain::a001_source_table::ExtractOptions;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::shared::google_sheets::a1;
use crate::shared::google_sheets::auth::{CredentialSource, EnvCredentials, FileCredentials};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub google: GoogleConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Предел размера загружаемой книги, МБ
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

fn default_max_upload_mb() -> usize {
    200
}

impl ServerConfig {
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GoogleBackend {
    Sheets,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GoogleConfig {
    pub backend: GoogleBackend,
    pub spreadsheet_id: String,
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_base_url() -> String {
    crate::shared::google_sheets::client::DEFAULT_API_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Источник ключа сервисного аккаунта
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CredentialsConfig {
    Env { var: String },
    File { path: PathBuf },
}

impl CredentialsConfig {
    pub fn to_source(&self) -> Box<dyn CredentialSource> {
        match self {
            CredentialsConfig::Env { var } => Box::new(EnvCredentials { var: var.clone() }),
            CredentialsConfig::File { path } => Box::new(FileCredentials { path: path.clone() }),
        }
    }
}

/// Какой файл отдавать на скачивание после загрузки
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Загруженная книга байт в байт
    #[default]
    Verbatim,
    /// Новая книга из извлечённой таблицы
    Reconstructed,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,
    #[serde(default = "default_usecols")]
    pub usecols: String,
    #[serde(default = "default_nrows")]
    pub nrows: usize,
    #[serde(default)]
    pub output_mode: OutputMode,
}

fn default_sheet_name() -> String {
    ExtractOptions::default().sheet_name
}

fn default_usecols() -> String {
    ExtractOptions::default().usecols
}

fn default_nrows() -> usize {
    ExtractOptions::default().nrows
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        let defaults = ExtractOptions::default();
        Self {
            sheet_name: defaults.sheet_name,
            usecols: defaults.usecols,
            nrows: defaults.nrows,
            output_mode: OutputMode::default(),
        }
    }
}

impl ExtractionConfig {
    pub fn default_options(&self) -> ExtractOptions {
        ExtractOptions {
            sheet_name: self.sheet_name.clone(),
            usecols: self.usecols.clone(),
            nrows: self.nrows,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Одна запись диапазона на строку
    #[default]
    Batched,
    /// Отдельная запись на каждую ячейку
    PerCell,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RowAllocation {
    /// Одна проверка колонки, дальше локальный счётчик
    #[default]
    Reserve,
    /// Проверка колонки перед каждой строкой
    ProbeEachRow,
}

/// Поле, читаемое из каждой строки окна
#[derive(Debug, Deserialize, Clone)]
pub struct RowField {
    pub column: String,
    pub destination: String,
}

/// Поле, читаемое один раз из фиксированной строки таблицы
#[derive(Debug, Deserialize, Clone)]
pub struct SessionField {
    pub column: String,
    pub offset: usize,
    pub destination: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceCell {
    pub column: String,
    pub offset: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MergeCell {
    pub sheet: String,
    pub cell: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DescriptionConfig {
    pub parts: Vec<SourceCell>,
    /// Колонка строки назначения; без неё описание пишется только в merge_cell
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub merge_cell: Option<MergeCell>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FieldMappingConfig {
    pub part_number: RowField,
    pub ticket: RowField,
    pub quantity: RowField,
    pub session_ticket: SessionField,
    pub technician: SessionField,
    pub load_name: SessionField,
    pub description: DescriptionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    pub target_sheet: String,
    pub probe_column: String,
    pub window_start: usize,
    pub window_end: usize,
    #[serde(default)]
    pub write_mode: WriteMode,
    #[serde(default)]
    pub row_allocation: RowAllocation,
    #[serde(default = "default_separator")]
    pub separator: String,
    pub fields: FieldMappingConfig,
}

fn default_separator() -> String {
    " | ".to_string()
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("'{value}' is not a valid column letter ({field})")]
    InvalidColumn { field: String, value: String },

    #[error("destination column {column} is used by both {first} and {second}")]
    DuplicateDestination {
        column: String,
        first: String,
        second: String,
    },

    #[error("'{0}' is not a valid cell reference")]
    InvalidCell(String),

    #[error("sync window {start}..={end} is empty")]
    EmptyWindow { start: usize, end: usize },

    #[error("{0}")]
    Invalid(String),
}

impl Config {
    /// Проверки, без которых запуск бессмысленен
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.google.spreadsheet_id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "google.spreadsheet_id must not be empty".to_string(),
            ));
        }
        if self.extraction.nrows == 0 {
            return Err(ConfigError::Invalid(
                "extraction.nrows must be at least 1".to_string(),
            ));
        }
        a1::parse_column_selection(&self.extraction.usecols).map_err(ConfigError::Invalid)?;

        let sync = &self.sync;
        if sync.window_start > sync.window_end {
            return Err(ConfigError::EmptyWindow {
                start: sync.window_start,
                end: sync.window_end,
            });
        }
        check_column("sync.probe_column", &sync.probe_column)?;

        let mut seen: HashMap<String, String> = HashMap::new();
        for (field, column) in sync.fields.destinations() {
            check_column(&field, column)?;
            let normalized = a1::normalize_column(column).unwrap_or_default();
            if let Some(first) = seen.insert(normalized.clone(), field.clone()) {
                return Err(ConfigError::DuplicateDestination {
                    column: normalized,
                    first,
                    second: field,
                });
            }
        }

        if let Some(merge) = &sync.fields.description.merge_cell {
            a1::parse_cell(&merge.cell).ok_or_else(|| ConfigError::InvalidCell(merge.cell.clone()))?;
        }
        Ok(())
    }
}

impl FieldMappingConfig {
    /// Все колонки назначения одной строки с именами полей
    pub fn destinations(&self) -> Vec<(String, &str)> {
        let mut out = vec![
            ("part_number".to_string(), self.part_number.destination.as_str()),
            ("ticket".to_string(), self.ticket.destination.as_str()),
            ("quantity".to_string(), self.quantity.destination.as_str()),
            ("session_ticket".to_string(), self.session_ticket.destination.as_str()),
            ("technician".to_string(), self.technician.destination.as_str()),
            ("load_name".to_string(), self.load_name.destination.as_str()),
        ];
        if let Some(column) = &self.description.destination {
            out.push(("description".to_string(), column.as_str()));
        }
        out
    }
}

fn check_column(field: &str, value: &str) -> Result<(), ConfigError> {
    match a1::normalize_column(value) {
        Some(_) => Ok(()),
        None => Err(ConfigError::InvalidColumn {
            field: field.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Default configuration embedded in the binary
pub const DEFAULT_CONFIG: &str = r#"
[server]
bind = "127.0.0.1:3000"
max_upload_mb = 200

[google]
backend = "sheets"
spreadsheet_id = "1uC3qyYAmThXMfJ9Pwkompbf9Zs6MWhuTqT8jTVLYdr0"
credentials = { source = "env", var = "GCP_KEY_JSON" }

[extraction]
sheet_name = "backup"
usecols = "A:D"
nrows = 28
output_mode = "verbatim"

[sync]
target_sheet = "Sheet1"
probe_column = "B"
window_start = 9
window_end = 22
write_mode = "batched"
row_allocation = "reserve"
separator = " | "

[sync.fields]
part_number = { column = "NUMERO DE PARTE", destination = "B" }
ticket = { column = "TICKET", destination = "H" }
quantity = { column = "CANT.", destination = "I" }
session_ticket = { column = "TICKET", offset = 2, destination = "G" }
technician = { column = "DESCRIPCION", offset = 5, destination = "E" }
load_name = { column = "CANT.", offset = 1, destination = "L" }

[sync.fields.description]
parts = [
    { column = "DESCRIPCION", offset = 26 },
    { column = "DESCRIPCION", offset = 27 },
]
destination = "K"
merge_cell = { sheet = "backups", cell = "B26" }
"#;

/// Load configuration from config.toml file
///
/// Search order:
/// 1. `SHEET_SYNC_CONFIG` environment variable
/// 2. Next to the executable (for production)
/// 3. Falls back to embedded default config
pub fn load_config() -> anyhow::Result<Config> {
    let config = match find_config_file() {
        Some(path) => {
            tracing::info!("Loading config from: {}", path.display());
            let contents = std::fs::read_to_string(&path)?;
            toml::from_str::<Config>(&contents)?
        }
        None => {
            tracing::info!("Using default embedded configuration");
            toml::from_str::<Config>(DEFAULT_CONFIG)?
        }
    };
    config.validate()?;
    Ok(config)
}

static CONFIG: OnceCell<Config> = OnceCell::new();

/// Сохраняет загруженную конфигурацию для всего процесса
pub fn initialize(config: Config) -> anyhow::Result<()> {
    CONFIG
        .set(config)
        .map_err(|_| anyhow::anyhow!("configuration already initialized"))
}

pub fn get_config() -> anyhow::Result<&'static Config> {
    CONFIG
        .get()
        .ok_or_else(|| anyhow::anyhow!("configuration is not initialized"))
}

fn find_config_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("SHEET_SYNC_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let exe_path = std::env::current_exe().ok()?;
    let config_path = exe_path.parent()?.join("config.toml");
    if config_path.exists() {
        Some(config_path)
    } else {
        tracing::warn!("config.toml not found at: {}", config_path.display());
        None
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn default_config() -> Config {
        toml::from_str(DEFAULT_CONFIG).unwrap()
    }

    #[test]
    fn test_default_config_loads() {
        let config = default_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.max_upload_bytes(), 200 * 1024 * 1024);
        assert_eq!(config.sync.window_start, 9);
        assert_eq!(config.sync.window_end, 22);
        assert_eq!(config.sync.write_mode, WriteMode::Batched);
        assert_eq!(config.sync.row_allocation, RowAllocation::Reserve);
        assert_eq!(config.extraction.output_mode, OutputMode::Verbatim);
        assert!(matches!(
            config.google.credentials,
            CredentialsConfig::Env { ref var } if var == "GCP_KEY_JSON"
        ));
        assert_eq!(config.sync.fields.description.parts.len(), 2);
    }

    #[test]
    fn test_duplicate_destination_is_rejected() {
        let mut config = default_config();
        config.sync.fields.load_name.destination = "b".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateDestination {
                column: "B".to_string(),
                first: "part_number".to_string(),
                second: "load_name".to_string(),
            })
        );
    }

    #[test]
    fn test_invalid_columns_and_cells_are_rejected() {
        let mut config = default_config();
        config.sync.fields.quantity.destination = "I9".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidColumn { .. })
        ));

        let mut config = default_config();
        config.sync.fields.description.merge_cell = Some(MergeCell {
            sheet: "backups".to_string(),
            cell: "B".to_string(),
        });
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidCell("B".to_string()))
        );

        let mut config = default_config();
        config.sync.window_start = 30;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyWindow { .. })
        ));
    }

    #[test]
    fn test_file_credentials_and_memory_backend() {
        let toml_text = DEFAULT_CONFIG
            .replace(
                r#"credentials = { source = "env", var = "GCP_KEY_JSON" }"#,
                r#"credentials = { source = "file", path = "secrets/key.json" }"#,
            )
            .replace(r#"backend = "sheets""#, r#"backend = "memory""#);
        let config: Config = toml::from_str(&toml_text).unwrap();
        assert_eq!(config.google.backend, GoogleBackend::Memory);
        assert!(matches!(
            config.google.credentials,
            CredentialsConfig::File { ref path } if path == &PathBuf::from("secrets/key.json")
        ));
    }
}
