// ===============================
// src/firebase.rs
// ===============================
//
// Adapter Firebase via REST (reqwest):
// - Firestore     : POST {base}/v1/projects/{project}/databases/(default)/documents/{collection}
// - Realtime DB   : POST {database_url}/{path}.json   (push -> child key baru)
//
// Auth (urutan):
// 1. `access_token` di credentials JSON atau env FIREBASE_ACCESS_TOKEN (token statis)
// 2. FIRESTORE_EMULATOR_HOST=host:port -> emulator lokal, tanpa auth
// 3. service account (`client_email` + `private_key`): JWT RS256 ditukar ke
//    OAuth2 access token di `token_uri`, di-cache dan di-refresh sebelum expired
// Tidak ada satupun -> connect gagal (BackendInit).
//
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::backend::{BackendConnector, ConnectionHandle, DocumentStore, RealtimeStream};
use crate::domain::{FieldValue, Record};
use crate::error::{BoxError, LogError};

const FIRESTORE_BASE: &str = "https://firestore.googleapis.com";
const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const SCOPES: &str = "https://www.googleapis.com/auth/datastore \
                      https://www.googleapis.com/auth/firebase.database \
                      https://www.googleapis.com/auth/userinfo.email";
const ASSERTION_TTL_SECS: i64 = 3600;
// refresh lebih awal supaya token tidak expired di tengah request
const REFRESH_SKEW: Duration = Duration::from_secs(60);

/// Service-account style credentials. Only the fields we need; the rest is ignored.
#[derive(Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    #[serde(default)]
    pub client_email: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

impl ServiceAccount {
    pub fn parse(raw: &str) -> Result<Self, BoxError> {
        let sa: ServiceAccount = serde_json::from_str(raw)?;
        if sa.project_id.trim().is_empty() {
            return Err("credentials: project_id is empty".into());
        }
        Ok(sa)
    }
}

// private_key & access_token jangan pernah masuk log
impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Clone)]
pub struct FirebaseConnector {
    pub request_timeout: Duration,
    /// Override Firestore base URL (emulator / test server).
    pub firestore_base: Option<String>,
    /// Token dipakai jika credentials tidak membawa `access_token`.
    pub access_token: Option<String>,
    /// Emulator lokal: boleh tanpa auth.
    pub emulator: bool,
}

impl FirebaseConnector {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            firestore_base: None,
            access_token: None,
            emulator: false,
        }
    }

    pub fn from_env(request_timeout: Duration) -> Self {
        let firestore_base = std::env::var("FIRESTORE_EMULATOR_HOST")
            .ok()
            .filter(|h| !h.trim().is_empty())
            .map(|h| format!("http://{}", h.trim()));
        let access_token = std::env::var("FIREBASE_ACCESS_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());
        Self {
            request_timeout,
            emulator: firestore_base.is_some(),
            firestore_base,
            access_token,
        }
    }

    async fn auth_for(&self, http: &reqwest::Client, sa: &ServiceAccount) -> Result<TokenSource, BoxError> {
        if let Some(t) = sa.access_token.clone().or_else(|| self.access_token.clone()) {
            return Ok(TokenSource::Static(t));
        }
        if self.emulator {
            return Ok(TokenSource::Anonymous);
        }
        match (&sa.client_email, &sa.private_key) {
            (Some(email), Some(key)) => {
                let minter = TokenMinter::new(
                    http.clone(),
                    email,
                    key,
                    sa.private_key_id.clone(),
                    sa.token_uri.as_deref().unwrap_or(TOKEN_URI),
                )?;
                // credentials ditolak harus ketahuan saat init, bukan saat write pertama
                minter.token().await?;
                info!(client_email = %email, "service account token acquired");
                Ok(TokenSource::Minted(Arc::new(minter)))
            }
            _ => Err("no usable auth: credentials carry neither client_email/private_key nor access_token, \
                      and no emulator is configured"
                .into()),
        }
    }
}

impl std::fmt::Debug for FirebaseConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseConnector")
            .field("request_timeout", &self.request_timeout)
            .field("firestore_base", &self.firestore_base)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("emulator", &self.emulator)
            .finish()
    }
}

#[async_trait]
impl BackendConnector for FirebaseConnector {
    async fn connect(
        &self,
        credentials_path: &Path,
        database_url: Option<&str>,
    ) -> Result<ConnectionHandle, BoxError> {
        let raw = tokio::fs::read_to_string(credentials_path).await?;
        let sa = ServiceAccount::parse(&raw)?;

        let http = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()?;
        let auth = self.auth_for(&http, &sa).await?;

        let base = self
            .firestore_base
            .clone()
            .unwrap_or_else(|| FIRESTORE_BASE.to_string());
        debug!(project = %sa.project_id, client_email = ?sa.client_email, auth = ?auth, %base, "firestore client ready");

        let store = FirestoreClient {
            http: http.clone(),
            base: base.trim_end_matches('/').to_string(),
            project_id: sa.project_id.clone(),
            auth: auth.clone(),
        };

        let realtime: Option<Arc<dyn RealtimeStream>> = match database_url {
            Some(u) => Some(Arc::new(RealtimeDbRef::new(http, u, auth)?)),
            None => None,
        };

        Ok(ConnectionHandle::new(Arc::new(store), realtime))
    }
}

// -------- Auth --------

#[derive(Clone)]
pub(crate) enum TokenSource {
    Anonymous,
    Static(String),
    Minted(Arc<TokenMinter>),
}

impl TokenSource {
    async fn token(&self) -> Result<Option<String>, LogError> {
        match self {
            TokenSource::Anonymous => Ok(None),
            TokenSource::Static(t) => Ok(Some(t.clone())),
            TokenSource::Minted(m) => m.token().await.map(Some),
        }
    }
}

impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TokenSource::Anonymous => "anonymous",
            TokenSource::Static(_) => "static",
            TokenSource::Minted(_) => "service_account",
        })
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    ASSERTION_TTL_SECS as u64
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub(crate) struct TokenMinter {
    http: reqwest::Client,
    client_email: String,
    key: EncodingKey,
    key_id: Option<String>,
    token_uri: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenMinter {
    fn new(
        http: reqwest::Client,
        client_email: &str,
        private_key_pem: &str,
        key_id: Option<String>,
        token_uri: &str,
    ) -> Result<Self, BoxError> {
        let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| format!("credentials: unusable private_key: {e}"))?;
        Ok(Self {
            http,
            client_email: client_email.to_string(),
            key,
            key_id,
            token_uri: token_uri.to_string(),
            cached: Mutex::new(None),
        })
    }

    /// Token aktif; ditukar ulang kalau sisa umurnya < REFRESH_SKEW.
    async fn token(&self) -> Result<String, LogError> {
        // lock ditahan selama exchange: caller lain menunggu token yang sama
        let mut cached = self.cached.lock().await;
        if let Some(t) = cached.as_ref() {
            if t.expires_at > Instant::now() + REFRESH_SKEW {
                return Ok(t.value.clone());
            }
        }
        let fresh = self.exchange().await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    async fn exchange(&self) -> Result<CachedToken, LogError> {
        let iat = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: SCOPES,
            aud: &self.token_uri,
            iat,
            exp: iat + ASSERTION_TTL_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_id.clone();
        let assertion = jsonwebtoken::encode(&header, &claims, &self.key)
            .map_err(|e| LogError::PermanentWrite(format!("sign token assertion: {e}")))?;

        let rsp = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(classify_reqwest)?;
        let code = rsp.status();
        if !code.is_success() {
            let body = rsp.text().await.unwrap_or_default();
            return Err(classify_status(code, &body));
        }
        let tok: TokenResponse = rsp.json().await.map_err(classify_reqwest)?;
        debug!(expires_in = tok.expires_in, "access token refreshed");
        Ok(CachedToken {
            value: tok.access_token,
            expires_at: Instant::now() + Duration::from_secs(tok.expires_in),
        })
    }
}

// -------- Sinks --------

#[derive(Debug, Clone)]
pub struct FirestoreClient {
    http: reqwest::Client,
    base: String,
    project_id: String,
    auth: TokenSource,
}

/// Subcollection boleh pakai '/', encode per segmen.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|seg| urlencoding::encode(seg).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

impl FirestoreClient {
    fn collection_url(&self, collection: &str) -> String {
        format!(
            "{}/v1/projects/{}/databases/(default)/documents/{}",
            self.base,
            self.project_id,
            encode_path(collection)
        )
    }
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    async fn add_document(&self, collection: &str, record: &Record) -> Result<(), LogError> {
        let url = self.collection_url(collection);
        let body = json!({ "fields": encode_fields(record) });

        let mut req = self.http.post(url).json(&body);
        if let Some(t) = self.auth.token().await? {
            req = req.bearer_auth(t);
        }
        let rsp = req.send().await.map_err(classify_reqwest)?;
        check_status(rsp).await
    }
}

#[derive(Debug, Clone)]
pub struct RealtimeDbRef {
    http: reqwest::Client,
    base: Url,
    auth: TokenSource,
}

impl RealtimeDbRef {
    pub(crate) fn new(http: reqwest::Client, database_url: &str, auth: TokenSource) -> Result<Self, BoxError> {
        let mut base = Url::parse(database_url)?;
        match base.scheme() {
            "http" | "https" => {}
            other => return Err(format!("database url: unsupported scheme {other}").into()),
        }
        // Url::join butuh trailing slash agar path tidak terpotong
        if !base.path().ends_with('/') {
            let p = format!("{}/", base.path());
            base.set_path(&p);
        }
        Ok(Self { http, base, auth })
    }

    pub(crate) fn push_url(&self, path: &str, token: Option<&str>) -> Result<Url, LogError> {
        let rel = format!("{}.json", encode_path(path.trim_matches('/')));
        let mut url = self
            .base
            .join(&rel)
            .map_err(|e| LogError::PermanentWrite(format!("bad realtime path {path}: {e}")))?;
        if let Some(t) = token {
            url.query_pairs_mut().append_pair("access_token", t);
        }
        Ok(url)
    }
}

#[async_trait]
impl RealtimeStream for RealtimeDbRef {
    async fn push(&self, path: &str, record: &Record) -> Result<(), LogError> {
        let token = self.auth.token().await?;
        let url = self.push_url(path, token.as_deref())?;
        let rsp = self
            .http
            .post(url)
            .json(&record.to_json())
            .send()
            .await
            .map_err(classify_reqwest)?;
        check_status(rsp).await
    }
}

async fn check_status(rsp: reqwest::Response) -> Result<(), LogError> {
    let code = rsp.status();
    if code.is_success() {
        return Ok(());
    }
    let body = rsp.text().await.unwrap_or_default();
    Err(classify_status(code, &body))
}

/// 408 / 429 / 5xx -> transient; 4xx lainnya (payload rusak, permission) -> permanent.
pub fn classify_status(code: StatusCode, body: &str) -> LogError {
    let msg = format!("{code}: {}", body.trim());
    if code == StatusCode::REQUEST_TIMEOUT
        || code == StatusCode::TOO_MANY_REQUESTS
        || code.is_server_error()
    {
        LogError::TransientWrite(msg)
    } else {
        LogError::PermanentWrite(msg)
    }
}

fn classify_reqwest(e: reqwest::Error) -> LogError {
    // URL RTDB membawa ?access_token=..., jangan sampai ikut ke log
    let e = e.without_url();
    if e.is_timeout() || e.is_connect() {
        LogError::TransientWrite(e.to_string())
    } else if let Some(code) = e.status() {
        classify_status(code, "")
    } else {
        LogError::PermanentWrite(e.to_string())
    }
}

fn encode_fields(record: &Record) -> Value {
    let mut out = Map::new();
    for (k, v) in &record.fields {
        let enc = match v {
            FieldValue::Json(j) => encode_value(j),
            FieldValue::Timestamp(ts) => json!({ "timestampValue": ts.to_rfc3339() }),
        };
        out.insert(k.clone(), enc);
    }
    Value::Object(out)
}

/// JSON biasa -> Firestore typed value.
pub fn encode_value(v: &Value) -> Value {
    match v {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                // integerValue dikirim sebagai string (int64 JSON encoding)
                json!({ "integerValue": i.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64().unwrap_or(0.0) })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => {
            let fields: Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), encode_value(v)))
                .collect();
            json!({ "mapValue": { "fields": fields } })
        }
    }
}
