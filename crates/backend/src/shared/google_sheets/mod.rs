//! Удалённая таблица (Google Sheets v4) и её in-memory замена.
//!
//! Весь остальной код видит только трейт [`RemoteTable`]; конкретная реализация
//! выбирается конфигурацией при старте и кладётся в глобальный `OnceCell`.

pub mod a1;
pub mod auth;
pub mod client;
pub mod memory;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use std::sync::Arc;

use crate::shared::config::{GoogleBackend, GoogleConfig};

pub use auth::{CredentialSource, ServiceAccountKey};
pub use client::SheetsApiClient;
pub use memory::InMemoryTable;

#[derive(Debug, thiserror::Error)]
pub enum SheetsError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Google Sheets API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to obtain access token: {0}")]
    Auth(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("invalid range '{0}'")]
    InvalidRange(String),

    #[error("{0}")]
    Rejected(String),
}

/// Подтверждение записи диапазона
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateAck {
    pub updated_range: String,
    pub updated_cells: u32,
}

/// Удалённая таблица, адресуемая диапазонами A1.
///
/// `update_range` пишет значения с семантикой USER_ENTERED; `None` в матрице
/// значений означает «ячейку не трогать».
#[async_trait]
pub trait RemoteTable: Send + Sync {
    async fn read_range(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, SheetsError>;

    async fn update_range(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: Vec<Vec<Option<String>>>,
    ) -> Result<UpdateAck, SheetsError>;
}

static CLIENT: OnceCell<Arc<dyn RemoteTable>> = OnceCell::new();

/// Создаёт клиент по конфигурации. Ошибка здесь фатальна: сервер не стартует.
pub fn initialize(config: &GoogleConfig) -> anyhow::Result<()> {
    let client: Arc<dyn RemoteTable> = match config.backend {
        GoogleBackend::Sheets => {
            let source = config.credentials.to_source();
            Arc::new(SheetsApiClient::connect(source.as_ref(), config)?)
        }
        GoogleBackend::Memory => {
            tracing::warn!("Using in-memory remote table, nothing will reach Google Sheets");
            Arc::new(InMemoryTable::new())
        }
    };
    CLIENT
        .set(client)
        .map_err(|_| anyhow::anyhow!("remote table client already initialized"))?;
    Ok(())
}

pub fn get_client() -> anyhow::Result<Arc<dyn RemoteTable>> {
    CLIENT
        .get()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("remote table client is not initialized"))
}
