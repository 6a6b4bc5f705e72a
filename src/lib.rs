// ===============================
// src/lib.rs
// ===============================
pub mod backend;
pub mod config;
pub mod connection;
pub mod domain;
pub mod error;
pub mod event_logger;
pub mod firebase;
pub mod metrics;
pub mod validate;

use std::sync::Arc;

pub use config::{BackendSettings, RetryPolicy, TradingConfig, DEFAULT_COLLECTION};
pub use connection::ConnectionManager;
pub use domain::{Payload, TradingEvent};
pub use error::LogError;
pub use event_logger::EventLogger;

/// Logger Firebase siap pakai dari config (connector baca FIRESTORE_EMULATOR_HOST / FIREBASE_ACCESS_TOKEN).
pub fn firebase_logger(cfg: &TradingConfig) -> EventLogger {
    let settings = cfg.backend_settings();
    let connector = firebase::FirebaseConnector::from_env(settings.request_timeout);
    let connections = Arc::new(ConnectionManager::new(Arc::new(connector)));
    EventLogger::new(connections, settings)
}
