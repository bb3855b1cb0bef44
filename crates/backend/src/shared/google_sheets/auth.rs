use anyhow::Context;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::SheetsError;

pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Токен обновляется заранее, чтобы не истечь посреди синхронизации
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Ключ сервисного аккаунта (нужные поля JSON-файла из консоли GCP)
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

/// Откуда брать ключ сервисного аккаунта
pub trait CredentialSource: Send + Sync {
    fn describe(&self) -> String;
    fn load(&self) -> anyhow::Result<ServiceAccountKey>;
}

/// Ключ в переменной окружения: сырой JSON или JSON в base64
pub struct EnvCredentials {
    pub var: String,
}

impl CredentialSource for EnvCredentials {
    fn describe(&self) -> String {
        format!("environment variable {}", self.var)
    }

    fn load(&self) -> anyhow::Result<ServiceAccountKey> {
        let raw = std::env::var(&self.var)
            .with_context(|| format!("environment variable {} is not set", self.var))?;
        parse_key_material(&raw)
    }
}

/// Ключ в локальном файле
pub struct FileCredentials {
    pub path: PathBuf,
}

impl CredentialSource for FileCredentials {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    fn load(&self) -> anyhow::Result<ServiceAccountKey> {
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("cannot read credentials file {}", self.path.display()))?;
        parse_key_material(&raw)
    }
}

pub fn parse_key_material(raw: &str) -> anyhow::Result<ServiceAccountKey> {
    let trimmed = raw.trim();
    let json = if trimmed.starts_with('{') {
        trimmed.to_string()
    } else {
        let bytes = general_purpose::STANDARD
            .decode(trimmed)
            .context("credentials are neither JSON nor base64")?;
        String::from_utf8(bytes).context("base64 credentials are not UTF-8")?
    };
    serde_json::from_str(&json).context("service account JSON is malformed")
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Обмен подписанного JWT сервисного аккаунта на bearer-токен
pub struct ServiceAccountAuth {
    client_email: String,
    token_uri: String,
    encoding_key: EncodingKey,
    http: reqwest::Client,
    cached: tokio::sync::Mutex<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    pub fn new(
        key: &ServiceAccountKey,
        token_uri: Option<&str>,
        http: reqwest::Client,
    ) -> anyhow::Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .context("service account private_key is not a valid RSA PEM")?;
        let token_uri = token_uri
            .map(str::to_string)
            .or_else(|| key.token_uri.clone())
            .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());
        Ok(Self {
            client_email: key.client_email.clone(),
            token_uri,
            encoding_key,
            http,
            cached: tokio::sync::Mutex::new(None),
        })
    }

    pub(crate) fn assertion(&self, now: DateTime<Utc>) -> Result<String, SheetsError> {
        let claims = AssertionClaims {
            iss: self.client_email.clone(),
            scope: SHEETS_SCOPE.to_string(),
            aud: self.token_uri.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };
        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| SheetsError::Auth(format!("cannot sign assertion: {}", e)))
    }

    /// Текущий bearer-токен; запрашивает новый, если кэш пуст или почти истёк
    pub async fn access_token(&self) -> Result<String, SheetsError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref() {
            if token.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) > now {
                return Ok(token.access_token.clone());
            }
        }

        tracing::debug!("Requesting access token for {}", self.client_email);
        let assertion = self.assertion(now)?;
        let response = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Token request failed with {}: {}", status, body);
            return Err(SheetsError::Auth(format!("token endpoint returned {}: {}", status, body)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SheetsError::Auth(format!("malformed token response: {}", e)))?;
        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            expires_at: now + Duration::seconds(token.expires_in),
        });
        Ok(access_token)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    pub(crate) const TEST_PRIVATE_KEY: &str =
        include_str!("../../../testdata/test_service_account_key.pem");
    const TEST_PUBLIC_KEY: &str = include_str!("../../../testdata/test_service_account_pub.pem");

    pub(crate) fn test_key() -> ServiceAccountKey {
        ServiceAccountKey {
            client_email: "sync@test-project.iam.gserviceaccount.com".to_string(),
            private_key: TEST_PRIVATE_KEY.to_string(),
            token_uri: None,
            project_id: Some("test-project".to_string()),
        }
    }

    #[test]
    fn test_parse_key_material_accepts_json_and_base64() {
        let json = r#"{"client_email":"a@b.c","private_key":"pem","token_uri":"https://t"}"#;
        let key = parse_key_material(json).unwrap();
        assert_eq!(key.client_email, "a@b.c");
        assert_eq!(key.token_uri.as_deref(), Some("https://t"));

        let encoded = general_purpose::STANDARD.encode(json);
        let key = parse_key_material(&encoded).unwrap();
        assert_eq!(key.private_key, "pem");

        assert!(parse_key_material("not json at all!").is_err());
    }

    #[test]
    fn test_invalid_private_key_is_rejected() {
        let mut key = test_key();
        key.private_key = "garbage".to_string();
        assert!(ServiceAccountAuth::new(&key, None, reqwest::Client::new()).is_err());
    }

    #[test]
    fn test_assertion_is_signed_for_token_uri() {
        let auth = ServiceAccountAuth::new(&test_key(), None, reqwest::Client::new()).unwrap();
        let token = auth.assertion(Utc::now()).unwrap();

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[DEFAULT_TOKEN_URI]);
        let data = decode::<AssertionClaims>(
            &token,
            &DecodingKey::from_rsa_pem(TEST_PUBLIC_KEY.as_bytes()).unwrap(),
            &validation,
        )
        .unwrap();
        assert_eq!(data.claims.iss, "sync@test-project.iam.gserviceaccount.com");
        assert_eq!(data.claims.scope, SHEETS_SCOPE);
        assert_eq!(data.claims.exp - data.claims.iat, ASSERTION_LIFETIME_SECS);
    }

    #[test]
    fn test_env_credentials_missing_var() {
        let source = EnvCredentials {
            var: "SHEET_SYNC_TEST_UNSET_VARIABLE".to_string(),
        };
        let err = source.load().unwrap_err();
        assert!(err.to_string().contains("SHEET_SYNC_TEST_UNSET_VARIABLE"));
    }
}
