use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sqlpad_core::config::{LoggingSettings, WorkbenchConfig};
use sqlpad_core::session::Session;
use tracing_subscriber::EnvFilter;

fn init_logging(log_path: &Path, settings: &LoggingSettings) -> std::io::Result<()> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.filter));
    // A subscriber may already be installed when embedded in tests.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(())
}

fn run_app(
    config: &WorkbenchConfig,
    export_dir: PathBuf,
    run_tui: impl FnOnce(Session, PathBuf) -> Result<(), sqlpad_tui::TuiError>,
) -> Result<(), Box<dyn std::error::Error>> {
    let _ = sqlpad_core::domain_name();
    let _ = sqlpad_adapters::adapter_name();
    let session = Session::from_config(config)?;
    run_tui(session, export_dir)?;
    tracing::info!("workbench closed");
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = WorkbenchConfig::load_default()?;
    init_logging(&config.log_path(), &config.settings().logging)?;
    let export_dir = std::env::current_dir()?;
    run_app(&config, export_dir, sqlpad_tui::run)
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::path::PathBuf;

    use sqlpad_core::config::{Settings, WorkbenchConfig};
    use tempfile::TempDir;

    use super::{init_logging, run_app};

    fn config(temp_dir: &TempDir) -> WorkbenchConfig {
        WorkbenchConfig::with_settings(temp_dir.path().join("config.toml"), Settings::default())
    }

    #[test]
    fn run_app_hands_session_to_tui() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let result = run_app(&config(&temp_dir), PathBuf::from("."), |session, _| {
            assert_eq!(session.tabs().editor_tabs().len(), 1);
            Ok(())
        });
        assert!(result.is_ok());
    }

    #[test]
    fn run_app_propagates_tui_errors() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let result = run_app(&config(&temp_dir), PathBuf::from("."), |_, _| {
            Err(sqlpad_tui::TuiError::Io(io::Error::other("boom")))
        });
        assert!(result.is_err());
    }

    #[test]
    fn run_app_rejects_invalid_delay_range() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let mut config = config(&temp_dir);
        config.settings_mut().execution.min_delay_ms = 900;
        config.settings_mut().execution.max_delay_ms = 100;
        let result = run_app(&config, PathBuf::from("."), |_, _| Ok(()));
        assert!(result.is_err());
    }

    #[test]
    fn logging_creates_log_file() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let config = config(&temp_dir);
        init_logging(&config.log_path(), &config.settings().logging).expect("logging setup");
        assert!(temp_dir.path().join("sqlpad.log").exists());
    }
}
