// ===============================
// src/backend.rs
// ===============================
//
// Permukaan tulis backend (vendor-neutral):
// - DocumentStore : (collection, record) -> dokumen baru
// - RealtimeStream: (path, record)       -> push notifikasi realtime
// - BackendConnector membangun keduanya dari credentials + database URL opsional.
//
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::Record;
use crate::error::{BoxError, LogError};

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Tulis record sebagai dokumen baru. Error harus `TransientWrite` atau `PermanentWrite`.
    async fn add_document(&self, collection: &str, record: &Record) -> Result<(), LogError>;
}

#[async_trait]
pub trait RealtimeStream: Send + Sync {
    async fn push(&self, path: &str, record: &Record) -> Result<(), LogError>;
}

/// Satu koneksi backend yang sudah terinisialisasi.
pub struct ConnectionHandle {
    pub store: Arc<dyn DocumentStore>,
    pub realtime: Option<Arc<dyn RealtimeStream>>,
}

impl ConnectionHandle {
    pub fn new(store: Arc<dyn DocumentStore>, realtime: Option<Arc<dyn RealtimeStream>>) -> Self {
        Self { store, realtime }
    }

    pub fn has_realtime(&self) -> bool {
        self.realtime.is_some()
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("realtime", &self.has_realtime())
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait BackendConnector: Send + Sync {
    /// Authenticate and open clients. Called at most once per successful
    /// `ConnectionManager` lifetime; the file at `credentials_path` is known to exist.
    async fn connect(
        &self,
        credentials_path: &Path,
        database_url: Option<&str>,
    ) -> Result<ConnectionHandle, BoxError>;
}
