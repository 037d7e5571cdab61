use tokio::sync::watch;

/// Broadcasts whether the device currently has network access.
pub trait ConnectivitySignal: Send + Sync {
    fn subscribe(&self) -> watch::Receiver<bool>;
    fn is_online(&self) -> bool;
}
