//! `filenorm` daemon: runs the job manager until interrupted.
//!
//! Usage: `filenorm [config.json]`. Without an argument the path is taken
//! from `FILENORM_CONFIG`; without either, defaults apply. Environment
//! overrides (`FILENORM_*`) are applied last.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use filenorm::{
    load_settings, telemetry, Database, FilenormError, JobManager, LocalStorage, Settings,
    TextRenderer,
};

fn config_path() -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("FILENORM_CONFIG").map(PathBuf::from))
}

fn load() -> Result<Settings, FilenormError> {
    let settings = match config_path() {
        Some(path) => load_settings(&path)?,
        None => Settings::default(),
    };
    Ok(settings.with_env_overrides()?)
}

fn run(settings: Settings) -> Result<(), FilenormError> {
    let db = Database::open(&settings.database_path)?;
    let store = Arc::new(LocalStorage::new(&settings));
    let manager = JobManager::new(settings, db, store, Arc::new(TextRenderer::new()));

    // `stop_tx` stays alive here so a missing handler means "run until killed".
    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    let handler_tx = stop_tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = handler_tx.try_send(());
    }) {
        log::warn!("Could not install Ctrl-C handler: {}", e);
    }

    manager.start()?;
    log::info!(
        "filenorm running; watching {}",
        manager.settings().incoming_path().display()
    );

    let _ = stop_rx.recv();
    log::info!("Shutdown requested");
    manager.stop();
    drop(stop_tx);
    Ok(())
}

fn main() -> ExitCode {
    let settings = match load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("filenorm: {}", e);
            return ExitCode::FAILURE;
        }
    };

    telemetry::init_logging(&settings.logging);

    match run(settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("filenorm: {}", e);
            ExitCode::FAILURE
        }
    }
}
