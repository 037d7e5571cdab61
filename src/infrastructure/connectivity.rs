use crate::application::ports::connectivity::ConnectivitySignal;
use tokio::sync::watch;
use tracing::info;

/// Connectivity state pushed by the platform layer.
pub struct WatchConnectivity {
    sender: watch::Sender<bool>,
}

impl WatchConnectivity {
    pub fn new(online: bool) -> Self {
        let (sender, _) = watch::channel(online);
        Self { sender }
    }

    /// Publishes a new state; subscribers only wake on actual changes.
    pub fn set_online(&self, online: bool) {
        let changed = self.sender.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(online, "Connectivity changed");
        }
    }
}

impl Default for WatchConnectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivitySignal for WatchConnectivity {
    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    fn is_online(&self) -> bool {
        *self.sender.borrow()
    }
}
