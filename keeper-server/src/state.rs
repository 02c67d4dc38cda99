use crate::ws::ui::UiBroadcaster;
use save_keeper::BackupStore;
use tokio_util::sync::CancellationToken;

pub struct AppState {
    pub store: BackupStore,
    pub ui: UiBroadcaster,
    /// Cancelled when the server starts shutting down
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(store: BackupStore) -> Self {
        Self {
            store,
            ui: UiBroadcaster::new(),
            shutdown: CancellationToken::new(),
        }
    }
}
