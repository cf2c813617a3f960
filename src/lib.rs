pub mod commands;
pub mod notifications;
mod state;

use std::path::PathBuf;

use tokio::task::JoinHandle;

pub use notifications::{
    LogDispatcher, NotificationDispatcher, NotificationPayload, spawn_notification_forwarder,
};
pub use state::{AppService, AppState, AppStateManager};

/// Open the app data directory, initialize the settlement service and start
/// forwarding its events to `dispatcher`.
///
/// Must be called from within a tokio runtime.
pub fn start<D: NotificationDispatcher>(
    app_data_dir: PathBuf,
    dispatcher: D,
) -> Result<(AppStateManager, JoinHandle<()>), String> {
    let mut manager = AppStateManager::new(app_data_dir);
    let events = manager.initialize()?;
    let forwarder = spawn_notification_forwarder(events, dispatcher);
    log::info!("wagerline started, database at {}", manager.database_path());
    Ok((manager, forwarder))
}
