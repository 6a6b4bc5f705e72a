// ===============================
// src/validate.rs
// ===============================
//
// Validasi snapshot konfigurasi sebelum boleh jalan live.
// - Semua rule dievaluasi (tidak short-circuit), semua pelanggaran dikumpulkan.
// - Exchange key kosong hanya warning: bot tetap jalan dalam mode simulasi.
// - Satu-satunya I/O adalah cek keberadaan file credentials.
//
use std::path::Path;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::TradingConfig;
use crate::error::LogError;
use crate::metrics::CONFIG_VALIDATION_ERRORS;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigViolation {
    #[error("FIREBASE_CREDENTIALS_PATH is required when Firebase logging is enabled")]
    CredentialsPathMissing,
    #[error("Firebase credentials file not found: {0}")]
    CredentialsFileNotFound(String),
    #[error("MAX_POSITION_SIZE must be between 0 and 1 (got {0})")]
    MaxPositionSize(f64),
    #[error("STOP_LOSS_PERCENT must be positive (got {0})")]
    StopLossPercent(f64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    SimulationMode,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::SimulationMode => f.write_str(
                "Exchange API credentials not configured - running in simulation mode only",
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub errors: Vec<ConfigViolation>,
    pub warnings: Vec<ConfigWarning>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Kumpulkan pelanggaran tanpa logging.
pub fn check(config: &TradingConfig) -> ValidationReport {
    let mut report = ValidationReport::default();

    // 1) Firebase credentials
    if config.enable_firebase_logging {
        let path = config.firebase_credentials_path.trim();
        if path.is_empty() {
            report.errors.push(ConfigViolation::CredentialsPathMissing);
        } else if !Path::new(path).exists() {
            report
                .errors
                .push(ConfigViolation::CredentialsFileNotFound(path.to_string()));
        }
    }

    // 2) Exchange credentials -> warning saja
    if !config.has_exchange_credentials() {
        report.warnings.push(ConfigWarning::SimulationMode);
    }

    // 3) Risk params (NaN ikut gagal karena perbandingan selalu false)
    let mps = config.max_position_size;
    if !(mps > 0.0 && mps <= 1.0) {
        report.errors.push(ConfigViolation::MaxPositionSize(mps));
    }
    let sl = config.stop_loss_percent;
    if !(sl > 0.0) {
        report.errors.push(ConfigViolation::StopLossPercent(sl));
    }

    report
}

/// Returns true iff no invariant is violated. Errors and warnings go to the log.
pub fn validate(config: &TradingConfig) -> bool {
    log_report(&check(config))
}

/// Like [`validate`], but as a `Result` for startup code that aborts with `?`.
pub fn ensure_valid(config: &TradingConfig) -> Result<(), LogError> {
    let report = check(config);
    if log_report(&report) {
        Ok(())
    } else {
        Err(LogError::Validation {
            violations: report.errors.len(),
        })
    }
}

fn log_report(report: &ValidationReport) -> bool {
    for w in &report.warnings {
        warn!("{w}");
    }

    if !report.is_valid() {
        for e in &report.errors {
            error!(violation = %e, "Configuration error");
            CONFIG_VALIDATION_ERRORS.inc();
        }
        return false;
    }

    info!("Configuration validated successfully");
    true
}
