//! Pathology requisition workflow core.
//!
//! A hospital-histopathology requisition moves through a two-role workflow:
//! a nurse captures the intake form, a doctor records findings and signs the
//! review. Records are stored in SQLite alongside an append-only audit
//! history; attachment files live on disk under a managed upload directory.

pub mod config;
pub mod db;
pub mod lifecycle;
pub mod models;
pub mod storage;

use tracing_subscriber::EnvFilter;

/// Initialize tracing for binaries embedding this crate.
///
/// Honors `RUST_LOG` when set, otherwise falls back to the default filter.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
}
