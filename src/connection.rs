// ===============================
// src/connection.rs
// ===============================
//
// Satu handle backend per proses, dibuat lazy & single-flight:
// - Caller pertama menjalankan connect, caller lain yang datang bersamaan menunggu
//   hasil yang sama (sukses maupun gagal).
// - Handle yang sudah ada langsung dikembalikan (tanpa re-auth, tanpa lock).
// - Init gagal diingat: panggilan berikutnya langsung dapat BackendInit yang sama,
//   tidak ada connect ulang otomatis. Perbaiki credentials lalu restart.
//
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, error, info};

use crate::backend::{BackendConnector, ConnectionHandle};
use crate::error::LogError;
use crate::metrics::BACKEND_INIT;

struct Initialized {
    handle: Arc<ConnectionHandle>,
    credentials_path: PathBuf,
    database_url: Option<String>,
}

pub struct ConnectionManager {
    connector: Arc<dyn BackendConnector>,
    cell: OnceCell<Initialized>,
    // critical section init; isinya = penyebab init yang gagal
    init_lock: Mutex<Option<String>>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn BackendConnector>) -> Self {
        Self {
            connector,
            cell: OnceCell::new(),
            init_lock: Mutex::new(None),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    /// Return the process connection, creating it on first use.
    ///
    /// Errors: [`LogError::InvalidCredentialsPath`] for a blank path,
    /// [`LogError::CredentialsNotFound`] when the file is missing and
    /// [`LogError::BackendInit`] when the connector rejects the setup. A
    /// rejected setup is sticky for the lifetime of the manager.
    pub async fn get_or_init(
        &self,
        credentials_path: &str,
        database_url: Option<&str>,
    ) -> Result<Arc<ConnectionHandle>, LogError> {
        let credentials_path = credentials_path.trim();
        if credentials_path.is_empty() {
            return Err(LogError::InvalidCredentialsPath);
        }
        let database_url = database_url.map(str::trim).filter(|u| !u.is_empty());

        if let Some(existing) = self.cell.get() {
            self.note_reuse(existing, credentials_path, database_url);
            return Ok(existing.handle.clone());
        }

        let mut failed = self.init_lock.lock().await;

        // menunggu caller lain: pakai hasilnya
        if let Some(existing) = self.cell.get() {
            self.note_reuse(existing, credentials_path, database_url);
            return Ok(existing.handle.clone());
        }
        if let Some(cause) = failed.as_ref() {
            debug!(%cause, "backend initialization failed earlier, not retrying");
            return Err(LogError::BackendInit(cause.clone().into()));
        }

        let path = Path::new(credentials_path);
        if !path.exists() {
            error!(path = %path.display(), "Firebase credentials file not found");
            return Err(LogError::CredentialsNotFound(path.to_path_buf()));
        }

        match self.connector.connect(path, database_url).await {
            Ok(handle) => {
                BACKEND_INIT.with_label_values(&["ok"]).inc();
                info!(
                    path = %path.display(),
                    realtime = handle.has_realtime(),
                    "backend connection initialized"
                );
                let handle = Arc::new(handle);
                let init = Initialized {
                    handle: handle.clone(),
                    credentials_path: path.to_path_buf(),
                    database_url: database_url.map(str::to_string),
                };
                // hanya di-set di bawah init_lock, jadi tidak mungkin sudah terisi
                if self.cell.set(init).is_err() {
                    debug!("backend connection already set");
                }
                Ok(handle)
            }
            Err(e) => {
                BACKEND_INIT.with_label_values(&["failed"]).inc();
                error!(error = %e, path = %path.display(), "backend initialization failed");
                *failed = Some(e.to_string());
                Err(LogError::BackendInit(e))
            }
        }
    }

    fn note_reuse(&self, existing: &Initialized, credentials_path: &str, database_url: Option<&str>) {
        if existing.credentials_path != Path::new(credentials_path)
            || existing.database_url.as_deref() != database_url
        {
            debug!(
                requested = %credentials_path,
                active = %existing.credentials_path.display(),
                "using existing backend connection (arguments differ, ignored)"
            );
        } else {
            debug!("using existing backend connection");
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DocumentStore, RealtimeStream};
    use crate::domain::Record;
    use crate::error::BoxError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullStore;

    #[async_trait]
    impl DocumentStore for NullStore {
        async fn add_document(&self, _c: &str, _r: &Record) -> Result<(), LogError> {
            Ok(())
        }
    }

    #[async_trait]
    impl RealtimeStream for NullStore {
        async fn push(&self, _p: &str, _r: &Record) -> Result<(), LogError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingConnector {
        calls: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl BackendConnector for CountingConnector {
        async fn connect(
            &self,
            _credentials_path: &Path,
            database_url: Option<&str>,
        ) -> Result<ConnectionHandle, BoxError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && n == 0 {
                return Err("invalid service account".into());
            }
            let realtime: Option<Arc<dyn RealtimeStream>> = database_url.map(|_| Arc::new(NullStore) as Arc<dyn RealtimeStream>);
            Ok(ConnectionHandle::new(Arc::new(NullStore), realtime))
        }
    }

    fn creds() -> tempfile::NamedTempFile {
        tempfile::NamedTempFile::new().unwrap()
    }

    #[tokio::test]
    async fn blank_path_fails_fast() {
        let connector = Arc::new(CountingConnector::default());
        let mgr = ConnectionManager::new(connector.clone());
        assert!(matches!(mgr.get_or_init("   ", None).await, Err(LogError::InvalidCredentialsPath)));
        assert_eq!(connector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_file_is_credentials_not_found() {
        let mgr = ConnectionManager::new(Arc::new(CountingConnector::default()));
        match mgr.get_or_init("/no/such/creds.json", None).await {
            Err(LogError::CredentialsNotFound(p)) => assert_eq!(p, PathBuf::from("/no/such/creds.json")),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(!mgr.is_initialized());
    }

    #[tokio::test]
    async fn failed_init_is_remembered() {
        let connector = Arc::new(CountingConnector { fail_first: true, ..Default::default() });
        let mgr = ConnectionManager::new(connector.clone());
        let f = creds();
        let path = f.path().to_str().unwrap();

        assert!(matches!(mgr.get_or_init(path, None).await, Err(LogError::BackendInit(_))));
        assert!(!mgr.is_initialized());

        match mgr.get_or_init(path, Some("https://demo.firebaseio.com")).await {
            Err(LogError::BackendInit(cause)) => assert!(cause.to_string().contains("invalid service account")),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);

        // manager baru (restart) boleh mencoba lagi
        let mgr = ConnectionManager::new(connector.clone());
        assert!(mgr.get_or_init(path, None).await.is_ok());
        assert_eq!(connector.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn later_arguments_do_not_replace_handle() {
        let connector = Arc::new(CountingConnector::default());
        let mgr = ConnectionManager::new(connector.clone());
        let f = creds();
        let path = f.path().to_str().unwrap();

        let a = mgr.get_or_init(path, None).await.unwrap();
        let b = mgr.get_or_init(path, Some("https://other.firebaseio.com")).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!b.has_realtime());
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
    }
}
