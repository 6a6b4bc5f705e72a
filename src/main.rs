// ===============================
// src/main.rs
// ===============================
/*
 # jalankan dengan emulator Firestore lokal
 FIRESTORE_EMULATOR_HOST=localhost:8080 cargo run

 # lihat retry & hasil write
 RUST_LOG=trade_journal_rust=debug cargo run

*/
/*
=============================================================================
Project : trade_journal_rust — trading event journal for Firebase in Rust
Module  : main.rs
Version : 0.1.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
WhatsApp: https://wa.me/628129893706
LinkedIn: https://id.linkedin.com/in/kukuhtw
License : MIT (see LICENSE)

Summary : Loads the trading configuration from env/.env, validates risk
          parameters and backend credentials, keeps one lazily-initialized
          Firebase connection per process, and journals timestamped
          trading events to Firestore with an optional Realtime Database
          mirror, retrying transient failures with bounded backoff.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
use std::process::ExitCode;

use serde_json::json;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use trade_journal_rust::{config, firebase_logger, metrics, validate, Payload, DEFAULT_COLLECTION};

fn init_tracing(log_level: &str) {
    // RUST_LOG menang jika di-set; selain itu pakai LOG_LEVEL dari config
    let level = match log_level.trim().to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        "" => "info".to_string(),
        other => other.to_string(),
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // ---- Load config ----
    let cfg = config::load();

    // ---- Logging ----
    init_tracing(&cfg.log_level);

    // ---- Metrics ----
    if let Err(e) = metrics::init() {
        warn!(error = %e, "metrics registration failed");
    }

    info!(
        exchange = %cfg.exchange_name,
        pair = %cfg.trading_pair,
        timeframe = %cfg.timeframe,
        firebase_logging = cfg.enable_firebase_logging,
        realtime_mirror = cfg.database_url().is_some(),
        "startup config"
    );

    // ---- Validate ----
    if let Err(e) = validate::ensure_valid(&cfg) {
        error!(error = %e, "refusing to start");
        return ExitCode::from(2);
    }

    if !cfg.enable_firebase_logging {
        info!("Firebase logging disabled, events stay in local logs only");
        return ExitCode::SUCCESS;
    }

    // ---- Journal ----
    let journal = firebase_logger(&cfg);

    // Hanya field non-rahasia (tanpa API key)
    let mut payload = Payload::new();
    payload.insert("exchange".into(), json!(cfg.exchange_name));
    payload.insert("trading_pair".into(), json!(cfg.trading_pair));
    payload.insert("timeframe".into(), json!(cfg.timeframe));
    payload.insert("initial_capital".into(), json!(cfg.initial_capital));
    payload.insert("max_position_size".into(), json!(cfg.max_position_size));
    payload.insert("stop_loss_percent".into(), json!(cfg.stop_loss_percent));
    payload.insert("take_profit_percent".into(), json!(cfg.take_profit_percent));
    payload.insert("simulation".into(), json!(!cfg.has_exchange_credentials()));
    payload.insert("social_media_enabled".into(), json!(cfg.social_media_enabled));

    match journal.log_event("system_started", payload, DEFAULT_COLLECTION).await {
        Ok(true) => {
            info!("startup event journaled");
            tracing::debug!(metrics = %String::from_utf8_lossy(&metrics::encode_metrics()), "journal counters");
            ExitCode::SUCCESS
        }
        Ok(false) => {
            // backend degradasi: trading tidak diblokir oleh logging
            warn!("startup event not journaled, continuing");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, kind = e.kind(), "no trusted logging path");
            ExitCode::from(3)
        }
    }
}
