use crate::application::ports::{ConnectivitySignal, EntityStore, ImageStore, RemoteApi};
use crate::application::services::{
    Reconciler, ReconcilerOptions, RecordService, SyncScheduler,
};
use crate::infrastructure::{
    ConnectionPool, FileImageStore, HttpRemoteApi, SqliteEntityStore, WatchConnectivity,
};
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use std::sync::Arc;
use tracing::info;

/// Everything the client needs to work offline and sync, wired from one
/// config.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub pool: ConnectionPool,
    pub store: Arc<SqliteEntityStore>,
    pub connectivity: Arc<WatchConnectivity>,
    pub images: Arc<FileImageStore>,
    pub reconciler: Arc<Reconciler>,
    pub records: Arc<RecordService>,
    /// Present when `sync.auto_sync` is on.
    pub scheduler: Option<Arc<SyncScheduler>>,
}

impl AppState {
    pub async fn initialize(config: AppConfig) -> Result<Self, AppError> {
        config.validate().map_err(AppError::ConfigurationError)?;
        tokio::fs::create_dir_all(&config.storage.data_dir).await?;

        let pool = ConnectionPool::from_config(&config.database).await?;
        pool.migrate().await?;
        let store = Arc::new(SqliteEntityStore::new(pool.clone()));

        let remote: Arc<dyn RemoteApi> = Arc::new(HttpRemoteApi::new(&config.remote)?);
        let images = Arc::new(FileImageStore::new(config.storage.image_dir()).await?);
        let connectivity = Arc::new(WatchConnectivity::default());

        let entity_store: Arc<dyn EntityStore> = store.clone();
        let image_store: Arc<dyn ImageStore> = images.clone();
        let reconciler = Arc::new(
            Reconciler::new(
                entity_store.clone(),
                remote.clone(),
                ReconcilerOptions::from_config(&config),
            )
            .with_image_store(image_store.clone()),
        );
        let records = Arc::new(RecordService::new(entity_store, remote, image_store));

        let scheduler = if config.sync.auto_sync {
            let signal: Arc<dyn ConnectivitySignal> = connectivity.clone();
            Some(Arc::new(SyncScheduler::start(
                reconciler.clone(),
                signal,
                Some(config.sync.interval()),
            )))
        } else {
            None
        };

        info!(
            data_dir = %config.storage.data_dir,
            remote = %config.remote.base_url,
            auto_sync = config.sync.auto_sync,
            "Application state initialized"
        );

        Ok(Self {
            config,
            pool,
            store,
            connectivity,
            images,
            reconciler,
            records,
            scheduler,
        })
    }

    /// Stops background sync and closes the database.
    pub async fn shutdown(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.shutdown().await;
        }
        self.pool.close().await;
        info!("Application state shut down");
    }
}
