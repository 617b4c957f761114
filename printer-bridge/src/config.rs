use std::path::PathBuf;

use shared::models::{DEFAULT_BRIDGE_PORT, PrinterConfig};

/// Daemon configuration
///
/// # Environment variables
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | WORK_DIR | ./data | Working directory (database, logs) |
/// | LOG_LEVEL | info | `tracing` filter directive |
/// | LOG_DIR | unset | Write daily log files here instead of stdout |
/// | PRINTER_DB | WORK_DIR/printers.redb | redb database file |
/// | PRINT_TEST_ON_START | false | Print a test page on every connected printer at startup |
/// | BRIDGE_HOST | unset | Default bridge host when storage has no config |
/// | BRIDGE_PORT | 81 | Default bridge port when storage has no config |
///
/// # Example
///
/// ```ignore
/// BRIDGE_HOST=192.168.4.1 LOG_LEVEL=debug cargo run -p printer-bridge
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub work_dir: String,
    pub log_level: String,
    pub log_dir: Option<String>,
    /// Explicit database path; see [`Config::db_path`]
    pub printer_db: Option<String>,
    pub print_test_on_start: bool,
    pub bridge_host: Option<String>,
    pub bridge_port: u16,
}

impl Config {
    /// Load from environment variables, with defaults for anything unset
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "./data".into()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: non_empty_var("LOG_DIR"),
            printer_db: non_empty_var("PRINTER_DB"),
            print_test_on_start: std::env::var("PRINT_TEST_ON_START")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            bridge_host: non_empty_var("BRIDGE_HOST"),
            bridge_port: std::env::var("BRIDGE_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_BRIDGE_PORT),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        match &self.printer_db {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(&self.work_dir).join("printers.redb"),
        }
    }

    /// Bridge settings used when nothing is stored yet
    pub fn seed_printer_config(&self) -> PrinterConfig {
        PrinterConfig {
            bridge_host: self.bridge_host.clone(),
            bridge_port: self.bridge_port,
            ..PrinterConfig::default()
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
