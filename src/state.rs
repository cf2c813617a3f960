use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::sync::broadcast;

use wagerline_core::{SettlementConfig, SettlementEvent, SettlementService};
use wagerline_store::WagerStore;

const CONFIG_FILE: &str = "settlement_config.json";
const DATABASE_FILE: &str = "wagerline.db";

pub type AppService = SettlementService<WagerStore>;

// ============================================================================
// App state (sent to the embedding frontend)
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub revision: u64,
    pub initialized: bool,
    pub database_path: String,
    pub config: SettlementConfig,
}

// ============================================================================
// App state manager
// ============================================================================

pub struct AppStateManager {
    app_data_dir: PathBuf,
    config: SettlementConfig,
    service: Option<AppService>,
    revision: u64,
}

impl AppStateManager {
    pub fn new(app_data_dir: PathBuf) -> Self {
        let config = Self::load_config(&app_data_dir).unwrap_or_else(|| {
            log::warn!(
                "no usable {CONFIG_FILE} in {}, using default settlement config",
                app_data_dir.display()
            );
            SettlementConfig::default()
        });
        Self {
            app_data_dir,
            config,
            service: None,
            revision: 0,
        }
    }

    /// Open the database and build the settlement service.
    ///
    /// Returns the receiver for settlement events; hand it to
    /// [`crate::notifications::spawn_notification_forwarder`].
    pub fn initialize(&mut self) -> Result<broadcast::Receiver<SettlementEvent>, String> {
        fs::create_dir_all(&self.app_data_dir)
            .map_err(|e| format!("failed to create app data dir: {e}"))?;
        let path = self.database_path();
        let store = WagerStore::open(&path).map_err(|e| format!("failed to open {path}: {e}"))?;
        let (service, rx) = SettlementService::new(store, self.config.clone());
        self.service = Some(service);
        self.bump_revision();
        log::info!("settlement service ready ({path})");
        Ok(rx)
    }

    pub fn is_first_launch(&self) -> bool {
        !self.app_data_dir.join(CONFIG_FILE).exists()
    }

    pub fn is_initialized(&self) -> bool {
        self.service.is_some()
    }

    pub fn service(&self) -> Result<&AppService, String> {
        self.service
            .as_ref()
            .ok_or_else(|| "Not initialized - call initialize first".to_string())
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Persist a new config. A running service keeps its config until the
    /// next `initialize`.
    pub fn set_config(&mut self, config: SettlementConfig) -> Result<AppState, String> {
        self.save_config(&config)?;
        self.config = config;
        self.bump_revision();
        Ok(self.snapshot())
    }

    pub fn database_path(&self) -> String {
        self.app_data_dir.join(DATABASE_FILE).display().to_string()
    }

    pub fn snapshot(&self) -> AppState {
        AppState {
            revision: self.revision,
            initialized: self.is_initialized(),
            database_path: self.database_path(),
            config: self.config.clone(),
        }
    }

    pub fn bump_revision(&mut self) {
        self.revision += 1;
    }

    // --- Persistence helpers ---

    fn load_config(dir: &Path) -> Option<SettlementConfig> {
        let path = dir.join(CONFIG_FILE);
        let contents = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(config) => Some(config),
            Err(e) => {
                log::warn!("ignoring malformed {}: {e}", path.display());
                None
            }
        }
    }

    fn save_config(&self, config: &SettlementConfig) -> Result<(), String> {
        let path = self.app_data_dir.join(CONFIG_FILE);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("failed to create config dir: {e}"))?;
        }
        let json = serde_json::to_string_pretty(config)
            .map_err(|e| format!("failed to encode config: {e}"))?;
        fs::write(&path, json).map_err(|e| format!("failed to write {}: {e}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wagerline_core::WinnerRule;

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = AppStateManager::new(dir.path().to_path_buf());
        assert!(mgr.is_first_launch());
        assert!(!mgr.is_initialized());
        assert_eq!(mgr.config().winner_rule, WinnerRule::Unanimous);
        assert!(mgr.service().is_err());
    }

    #[test]
    fn config_is_saved_and_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = AppStateManager::new(dir.path().to_path_buf());
        let state = mgr
            .set_config(SettlementConfig {
                winner_rule: WinnerRule::Majority,
                allow_revote: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(state.revision, 1);

        let reloaded = AppStateManager::new(dir.path().to_path_buf());
        assert!(!reloaded.is_first_launch());
        assert_eq!(reloaded.config().winner_rule, WinnerRule::Majority);
        assert!(reloaded.config().allow_revote);
    }

    #[test]
    fn malformed_config_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "{not json").unwrap();
        let mgr = AppStateManager::new(dir.path().to_path_buf());
        assert_eq!(mgr.config().quorum, None);
    }

    #[test]
    fn initialize_opens_the_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = AppStateManager::new(dir.path().join("data"));
        let _rx = mgr.initialize().unwrap();
        assert!(mgr.is_initialized());
        assert!(dir.path().join("data").join(DATABASE_FILE).exists());
        assert!(mgr.snapshot().initialized);
    }
}
