// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : trade_journal_rust — trading event journal for Firebase in Rust
Module  : config.rs
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
use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;

pub const DEFAULT_COLLECTION: &str = "trading_events";

/// Snapshot konfigurasi; dibuat sekali saat start, tidak pernah dimutasi.
#[derive(Clone, Debug, PartialEq)]
pub struct TradingConfig {
    // Firebase
    pub firebase_credentials_path: String,
    pub firebase_database_url: String,

    // Exchange
    pub exchange_name: String,
    pub exchange_api_key: String,
    pub exchange_secret_key: String,

    // Trading parameters
    pub trading_pair: String,
    pub timeframe: String,
    pub initial_capital: f64,

    // RL
    pub rl_model_path: String,
    pub rl_learning_rate: f64,
    pub rl_gamma: f64,

    // Sentiment
    pub sentiment_model_path: String,
    pub news_api_key: String,
    pub social_media_enabled: bool,

    // Risk management
    pub max_position_size: f64,
    pub stop_loss_percent: f64,
    pub take_profit_percent: f64,

    // Logging
    pub log_level: String,
    pub enable_firebase_logging: bool,

    // Backend tuning
    pub request_timeout_secs: u64,
    pub event_log_max_attempts: u32,
    pub event_log_backoff_ms: u64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            firebase_credentials_path: "./firebase-credentials.json".to_string(),
            firebase_database_url: String::new(),
            exchange_name: "binance".to_string(),
            exchange_api_key: String::new(),
            exchange_secret_key: String::new(),
            trading_pair: "BTC/USDT".to_string(),
            timeframe: "1h".to_string(),
            initial_capital: 10_000.0,
            rl_model_path: "./models/rl_agent".to_string(),
            rl_learning_rate: 0.001,
            rl_gamma: 0.99,
            sentiment_model_path: "./models/sentiment".to_string(),
            news_api_key: String::new(),
            social_media_enabled: false,
            max_position_size: 0.1,
            stop_loss_percent: 2.0,
            take_profit_percent: 5.0,
            log_level: "INFO".to_string(),
            enable_firebase_logging: true,
            request_timeout_secs: 10,
            event_log_max_attempts: 3,
            event_log_backoff_ms: 200,
        }
    }
}

impl TradingConfig {
    /// `FIREBASE_DATABASE_URL` kosong berarti tanpa mirror realtime.
    pub fn database_url(&self) -> Option<&str> {
        let url = self.firebase_database_url.trim();
        if url.is_empty() {
            None
        } else {
            Some(url)
        }
    }

    pub fn has_exchange_credentials(&self) -> bool {
        !self.exchange_api_key.is_empty() && !self.exchange_secret_key.is_empty()
    }

    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            credentials_path: self.firebase_credentials_path.clone(),
            database_url: self.database_url().map(str::to_string),
            request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
            retry: RetryPolicy {
                max_attempts: self.event_log_max_attempts.max(1),
                base_delay: Duration::from_millis(self.event_log_backoff_ms),
                ..RetryPolicy::default()
            },
        }
    }
}

/// Opsi koneksi backend (pengganti keyword-args ad hoc).
#[derive(Clone, Debug, PartialEq)]
pub struct BackendSettings {
    /// Path ke service-account JSON. Wajib, hanya dicek keberadaannya di sini.
    pub credentials_path: String,
    /// URL Realtime Database; `None` = tanpa mirror.
    pub database_url: Option<String>,
    /// Timeout per HTTP request (default 10s).
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl BackendSettings {
    pub fn new(credentials_path: impl Into<String>) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            database_url: None,
            request_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Bounded exponential backoff untuk write yang gagal sementara.
///
/// Defaults: 3 attempts total, 200ms base, x2 per attempt, max 2s, jitter 0..=50ms.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            max_jitter: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// No sleeping between attempts (tests).
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// Delay sebelum attempt berikutnya; `attempt` mulai dari 1 (attempt yang baru gagal).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << shift);
        delay.min(self.max_delay)
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => v.trim().eq_ignore_ascii_case("true"),
        Err(_) => default,
    }
}

pub fn load() -> TradingConfig {
    // Pastikan .env dibaca (FIREBASE_CREDENTIALS_PATH, EXCHANGE_API_KEY, dll)
    let _ = dotenv();
    let d = TradingConfig::default();

    TradingConfig {
        firebase_credentials_path: env_or("FIREBASE_CREDENTIALS_PATH", &d.firebase_credentials_path),
        firebase_database_url: env_or("FIREBASE_DATABASE_URL", &d.firebase_database_url),

        exchange_name: env_or("EXCHANGE_NAME", &d.exchange_name),
        exchange_api_key: env_or("EXCHANGE_API_KEY", &d.exchange_api_key),
        exchange_secret_key: env_or("EXCHANGE_SECRET_KEY", &d.exchange_secret_key),

        trading_pair: env_or("TRADING_PAIR", &d.trading_pair),
        timeframe: env_or("TIMEFRAME", &d.timeframe),
        initial_capital: env_parse("INITIAL_CAPITAL", d.initial_capital),

        rl_model_path: env_or("RL_MODEL_PATH", &d.rl_model_path),
        rl_learning_rate: env_parse("RL_LEARNING_RATE", d.rl_learning_rate),
        rl_gamma: env_parse("RL_GAMMA", d.rl_gamma),

        sentiment_model_path: env_or("SENTIMENT_MODEL_PATH", &d.sentiment_model_path),
        news_api_key: env_or("NEWS_API_KEY", &d.news_api_key),
        social_media_enabled: env_bool("SOCIAL_MEDIA_ENABLED", d.social_media_enabled),

        max_position_size: env_parse("MAX_POSITION_SIZE", d.max_position_size),
        stop_loss_percent: env_parse("STOP_LOSS_PERCENT", d.stop_loss_percent),
        take_profit_percent: env_parse("TAKE_PROFIT_PERCENT", d.take_profit_percent),

        log_level: env_or("LOG_LEVEL", &d.log_level),
        enable_firebase_logging: env_bool("ENABLE_FIREBASE_LOGGING", d.enable_firebase_logging),

        request_timeout_secs: env_parse("FIREBASE_REQUEST_TIMEOUT_SECS", d.request_timeout_secs),
        event_log_max_attempts: env_parse("EVENT_LOG_MAX_ATTEMPTS", d.event_log_max_attempts),
        event_log_backoff_ms: env_parse("EVENT_LOG_BACKOFF_MS", d.event_log_backoff_ms),
    }
}
