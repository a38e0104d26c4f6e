use anyhow::{Context, Result};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::shared::http_retry::{read_json, ApiError};

const SCOPES: &str =
    "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Токен обновляется заранее, чтобы не истёк посреди запроса
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Ключ сервисного аккаунта (JSON из Google Cloud Console)
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Service account file not found: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid service account JSON: {}", path.display()))
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// OAuth2-доступ от имени сервисного аккаунта (JWT bearer grant)
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    http: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

/// Один экземпляр на файл ключа, чтобы токен переиспользовался между отчётами
static AUTH_REGISTRY: Lazy<Mutex<HashMap<PathBuf, Arc<ServiceAccountAuth>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

impl ServiceAccountAuth {
    pub fn new(key: ServiceAccountKey, http: reqwest::Client) -> Self {
        Self {
            key,
            http,
            token: Mutex::new(None),
        }
    }

    /// Авторизация по пути к JSON-ключу (из кэша или с чтением файла)
    pub async fn for_path(path: &Path, http: &reqwest::Client) -> Result<Arc<Self>> {
        let mut registry = AUTH_REGISTRY.lock().await;
        if let Some(auth) = registry.get(path) {
            return Ok(auth.clone());
        }
        let key = ServiceAccountKey::from_file(path)?;
        tracing::info!("Loaded service account {}", key.client_email);
        let auth = Arc::new(Self::new(key, http.clone()));
        registry.insert(path.to_path_buf(), auth.clone());
        Ok(auth)
    }

    pub fn email(&self) -> &str {
        &self.key.client_email
    }

    /// Действующий access token; при необходимости запрашивает новый
    pub async fn access_token(&self) -> Result<String, ApiError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + REFRESH_MARGIN {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.fetch_token().await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    fn assertion(&self, token_uri: &str) -> Result<String, ApiError> {
        let now = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: SCOPES,
            aud: token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| ApiError::Decode(format!("Bad service account private key: {}", e)))?;
        encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| ApiError::Decode(format!("Failed to sign JWT assertion: {}", e)))
    }

    async fn fetch_token(&self) -> Result<CachedToken, ApiError> {
        let token_uri = self
            .key
            .token_uri
            .as_deref()
            .unwrap_or(DEFAULT_TOKEN_URI);
        let assertion = self.assertion(token_uri)?;

        let response = self
            .http
            .post(token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;
        let token: TokenResponse = read_json(response).await?;

        tracing::debug!(
            "Google token refreshed for {} (expires in {} s)",
            self.key.client_email,
            token.expires_in
        );
        Ok(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }
}
