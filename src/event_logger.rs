// ===============================
// src/event_logger.rs
// ===============================
//
// Journal event trading ke Firestore (+ mirror Realtime DB opsional).
// - Timestamp selalu dari clock logger.
// - Write utama: retry dengan exponential backoff + jitter untuk error transient,
//   error permanent langsung dilaporkan.
// - Mirror gagal = warning saja; hasil tetap ditentukan write utama.
// - Error backend tidak pernah di-raise: hasilnya Ok(false).
//
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::backend::ConnectionHandle;
use crate::config::{BackendSettings, RetryPolicy, DEFAULT_COLLECTION};
use crate::connection::ConnectionManager;
use crate::domain::{Payload, Record, TradingEvent};
use crate::error::LogError;
use crate::metrics::{EVENT_MIRROR_FAILURES, EVENT_WRITES, EVENT_WRITE_RETRIES};

pub struct EventLogger {
    connections: Arc<ConnectionManager>,
    settings: BackendSettings,
}

impl EventLogger {
    pub fn new(connections: Arc<ConnectionManager>, settings: BackendSettings) -> Self {
        Self {
            connections,
            settings,
        }
    }

    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    /// Log ke collection default `trading_events`.
    pub async fn log(&self, event_type: &str, payload: Payload) -> Result<bool, LogError> {
        self.log_event(event_type, payload, DEFAULT_COLLECTION).await
    }

    /// Persist one event.
    ///
    /// `Ok(true)` iff the document-store write succeeded. Backend write failures
    /// come back as `Ok(false)`; a blank `event_type`/`collection` or a failed
    /// connection setup is an `Err`.
    pub async fn log_event(
        &self,
        event_type: &str,
        payload: Payload,
        collection: &str,
    ) -> Result<bool, LogError> {
        if event_type.trim().is_empty() {
            return Err(LogError::EmptyEventType);
        }
        if collection.trim().is_empty() {
            return Err(LogError::EmptyCollection);
        }

        let conn = self
            .connections
            .get_or_init(
                &self.settings.credentials_path,
                self.settings.database_url.as_deref(),
            )
            .await?;

        let event = TradingEvent::stamped(event_type, payload, collection);
        let record = event.to_record();

        match write_with_retry(&conn, &event, &record, &self.settings.retry).await {
            Ok(attempts) => {
                EVENT_WRITES.with_label_values(&[collection, "ok"]).inc();
                info!(%event_type, %collection, attempts, "event logged");
            }
            Err(e) => {
                EVENT_WRITES.with_label_values(&[collection, "failed"]).inc();
                error!(%event_type, %collection, kind = e.kind(), error = %e, "event write failed");
                return Ok(false);
            }
        }

        mirror(&conn, &event, &record).await;
        Ok(true)
    }
}

/// Returns the attempt number that succeeded.
async fn write_with_retry(
    conn: &ConnectionHandle,
    event: &TradingEvent,
    record: &Record,
    policy: &RetryPolicy,
) -> Result<u32, LogError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match conn.store.add_document(&event.collection, record).await {
            Ok(()) => return Ok(attempt),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = policy.backoff(attempt) + jitter(policy.max_jitter);
                warn!(
                    event_type = %event.event_type,
                    collection = %event.collection,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient write error, retrying"
                );
                EVENT_WRITE_RETRIES.inc();
                sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

// jangan simpan ThreadRng melewati .await
fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

async fn mirror(conn: &ConnectionHandle, event: &TradingEvent, record: &Record) {
    let Some(rt) = &conn.realtime else {
        return;
    };
    if let Err(e) = rt.push(&event.collection, record).await {
        EVENT_MIRROR_FAILURES.inc();
        warn!(
            event_type = %event.event_type,
            collection = %event.collection,
            error = %e,
            "realtime mirror failed, durable record kept"
        );
    }
}
