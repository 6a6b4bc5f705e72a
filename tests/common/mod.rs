#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use trade_journal_rust::backend::{BackendConnector, ConnectionHandle, DocumentStore, RealtimeStream};
use trade_journal_rust::domain::Record;
use trade_journal_rust::error::BoxError;
use trade_journal_rust::LogError;

pub fn creds_file(project_id: &str, access_token: Option<&str>) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    let token = access_token
        .map(|t| format!(r#","access_token":"{t}""#))
        .unwrap_or_default();
    write!(
        f,
        r#"{{"type":"service_account","project_id":"{project_id}","client_email":"bot@{project_id}.iam.gserviceaccount.com"{token}}}"#
    )
    .unwrap();
    f
}

pub const SERVICE_ACCOUNT_KEY: &str = include_str!("../fixtures/service_account_key.pem");
pub const SERVICE_ACCOUNT_PUBLIC_KEY: &str = include_str!("../fixtures/service_account_key.pub.pem");

/// Real-shaped service account: private key + client_email, no `access_token`.
pub fn service_account_file(project_id: &str, token_uri: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    let sa = serde_json::json!({
        "type": "service_account",
        "project_id": project_id,
        "private_key_id": "test-key-1",
        "private_key": SERVICE_ACCOUNT_KEY,
        "client_email": format!("bot@{project_id}.iam.gserviceaccount.com"),
        "token_uri": token_uri,
    });
    write!(f, "{sa}").unwrap();
    f
}

/// In-memory document store; `script` is consumed one entry per attempt, then Ok.
#[derive(Default)]
pub struct MemoryStore {
    pub records: Mutex<Vec<(String, Record)>>,
    pub script: Mutex<Vec<LogError>>,
    pub attempts: AtomicUsize,
}

impl MemoryStore {
    pub fn failing_with(errors: Vec<LogError>) -> Self {
        Self {
            script: Mutex::new(errors),
            ..Default::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn add_document(&self, collection: &str, record: &Record) -> Result<(), LogError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        {
            let mut script = self.script.lock().unwrap();
            if !script.is_empty() {
                return Err(script.remove(0));
            }
        }
        self.records
            .lock()
            .unwrap()
            .push((collection.to_string(), record.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryRealtime {
    pub pushes: Mutex<Vec<(String, Record)>>,
    pub fail: bool,
    pub attempts: AtomicUsize,
}

#[async_trait]
impl RealtimeStream for MemoryRealtime {
    async fn push(&self, path: &str, record: &Record) -> Result<(), LogError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(LogError::TransientWrite("realtime unavailable".into()));
        }
        self.pushes.lock().unwrap().push((path.to_string(), record.clone()));
        Ok(())
    }
}

pub struct MemoryConnector {
    pub store: Arc<MemoryStore>,
    pub realtime: Option<Arc<MemoryRealtime>>,
    pub connects: AtomicUsize,
    /// Widen the race window for concurrent first access.
    pub delay: Duration,
    pub reject: bool,
}

impl MemoryConnector {
    pub fn new(store: Arc<MemoryStore>, realtime: Option<Arc<MemoryRealtime>>) -> Self {
        Self {
            store,
            realtime,
            connects: AtomicUsize::new(0),
            delay: Duration::ZERO,
            reject: false,
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendConnector for MemoryConnector {
    async fn connect(&self, _path: &Path, database_url: Option<&str>) -> Result<ConnectionHandle, BoxError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.reject {
            return Err("service account rejected".into());
        }
        let realtime = match (database_url, &self.realtime) {
            (Some(_), Some(rt)) => Some(rt.clone() as Arc<dyn RealtimeStream>),
            _ => None,
        };
        Ok(ConnectionHandle::new(self.store.clone(), realtime))
    }
}

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub target: String,
    pub authorization: Option<String>,
    pub body: serde_json::Value,
    pub raw_body: String,
}

/// Minimal HTTP/1.1 stub: answers each request with the next scripted status
/// (200 with `ok_body` once the script runs out) and records what it saw.
pub struct StubServer {
    pub base: String,
    pub seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl StubServer {
    pub async fn start(statuses: Vec<u16>) -> Self {
        Self::start_with_body(statuses, r#"{"name":"ok"}"#).await
    }

    pub async fn start_with_body(statuses: Vec<u16>, ok_body: &str) -> Self {
        let ok_body: Arc<str> = Arc::from(ok_body);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let script = Arc::new(Mutex::new(statuses));

        let seen_srv = seen.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else { return };
                let seen = seen_srv.clone();
                let script = script.clone();
                let ok_body = ok_body.clone();
                tokio::spawn(async move {
                    let Some(req) = read_request(&mut sock).await else { return };
                    seen.lock().unwrap().push(req);
                    let status = {
                        let mut s = script.lock().unwrap();
                        if s.is_empty() { 200 } else { s.remove(0) }
                    };
                    let body: &str = if status == 200 { &ok_body } else { r#"{"error":"stub"}"# };
                    let rsp = format!(
                        "HTTP/1.1 {status} STUB\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = sock.write_all(rsp.as_bytes()).await;
                    let _ = sock.shutdown().await;
                });
            }
        });

        Self {
            base: format!("http://{addr}"),
            seen,
        }
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

async fn read_request(sock: &mut tokio::net::TcpStream) -> Option<SeenRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = sock.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut first = lines.next()?.split_whitespace();
    let method = first.next()?.to_string();
    let target = first.next()?.to_string();

    let mut content_length = 0usize;
    let mut authorization = None;
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            match k.trim().to_ascii_lowercase().as_str() {
                "content-length" => content_length = v.trim().parse().unwrap_or(0),
                "authorization" => authorization = Some(v.trim().to_string()),
                _ => {}
            }
        }
    }

    while buf.len() < header_end + content_length {
        let n = sock.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let raw_body = String::from_utf8_lossy(&buf[header_end..]).to_string();
    let body = serde_json::from_slice(&buf[header_end..]).unwrap_or(serde_json::Value::Null);

    Some(SeenRequest {
        method,
        target,
        authorization,
        body,
        raw_body,
    })
}
