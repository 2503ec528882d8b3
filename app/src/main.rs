mod logging;

use std::env;
use std::path::PathBuf;

use doclens_core::connection_manager::ConnectionOptions;
use doclens_core::settings::{default_config_dir, FileSettingsStore, RecentDatabase};
use doclens_tui::{TuiError, TuiOptions};
use tracing::{info, warn};

use crate::logging::LoggingConfig;

fn startup_connection(settings: &FileSettingsStore) -> Option<ConnectionOptions> {
    settings
        .settings()
        .open_last_on_start
        .then(|| settings.last_connection())
        .flatten()
        .map(RecentDatabase::to_options)
}

fn export_dir() -> PathBuf {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map_or_else(|| PathBuf::from("."), PathBuf::from)
}

fn run_app(
    mut settings: FileSettingsStore,
    export_dir: PathBuf,
    run_tui: impl FnOnce(TuiOptions) -> Result<(), TuiError>,
) -> Result<(), Box<dyn std::error::Error>> {
    let dropped = settings.validate_history();
    if dropped > 0 {
        info!(dropped, "removed missing databases from history");
        if let Err(error) = settings.persist() {
            warn!(%error, "failed to save settings");
        }
    }

    let startup = startup_connection(&settings);
    run_tui(TuiOptions {
        settings,
        startup_connection: startup,
        export_dir,
    })?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = default_config_dir()?;
    let _log_guard = logging::init(&LoggingConfig::new(config_dir.join("logs")))?;
    info!(version = env!("CARGO_PKG_VERSION"), "doclens starting");

    let settings = FileSettingsStore::load_default()?;
    run_app(settings, export_dir(), doclens_tui::run)
}
