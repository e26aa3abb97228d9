use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Pathreq";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the application data directory
/// ~/Pathreq/ on all platforms (user-visible, per clinic deployment requirement)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("Pathreq")
}

/// Default on-disk location of the requisition database
pub fn database_path() -> PathBuf {
    app_data_dir().join("pathreq.db")
}

/// Root under which the attachment store keeps its `uploads/` directory
pub fn storage_root() -> PathBuf {
    app_data_dir()
}

/// Default tracing filter when RUST_LOG is not set
pub fn default_log_filter() -> &'static str {
    "info,pathreq=debug"
}
