mod cli;
pub mod db;
pub mod places;
pub mod settings;
pub mod stats;
pub mod store;
pub mod timer;
pub mod utils;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use log::info;

use db::Database;
use places::{FixedPosition, GeolocationProvider};
use settings::SettingsStore;
use store::VisitStore;
use timer::TimerController;

/// Environment variable that overrides where the database and settings live.
pub const DATA_DIR_ENV: &str = "PUBWAIT_DATA_DIR";

pub struct AppState {
    pub store: Arc<dyn VisitStore>,
    pub timer: TimerController,
    pub settings: SettingsStore,
    pub location: Arc<dyn GeolocationProvider>,
}

impl AppState {
    /// Open (or create) the visit database and settings under `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let database = Database::new(data_dir.join("pubwait.sqlite3"))?;
        let settings = SettingsStore::new(data_dir.join("settings.json"))?;
        Ok(Self::with_store(Arc::new(database), settings))
    }

    pub fn with_store(store: Arc<dyn VisitStore>, settings: SettingsStore) -> Self {
        let timer = TimerController::new(store.clone(), settings.session_thresholds());
        let location = Arc::new(FixedPosition::new(settings.nearby().home));
        Self {
            store,
            timer,
            settings,
            location,
        }
    }
}

pub fn data_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir()
        .map(|dir| dir.join("pubwait"))
        .ok_or_else(|| anyhow!("no data directory available; set {DATA_DIR_ENV}"))
}

pub fn run() {
    utils::logging::init();

    info!("pubwait starting up...");

    let result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
        .and_then(|runtime| runtime.block_on(cli::dispatch(std::env::args().skip(1).collect())));

    if let Err(err) = result {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
