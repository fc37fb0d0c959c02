use crate::application::refresh::{DEFAULT_SCAN_INTERVAL, RefreshCoordinator, RefreshError};
use crate::infrastructure::config::{read_entry, ConfigEntry, Configuration};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::notion_client::{NotionClient, ReqwestNotionClient};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Config(#[from] InfraError),
    #[error("initial refresh failed: {0}")]
    Refresh(#[from] RefreshError),
}

/// A running sync: the coordinator plus its polling task. Dropping the handle stops
/// the polling.
pub struct SyncHandle<C>
where
    C: NotionClient + 'static,
{
    coordinator: Arc<RefreshCoordinator<C>>,
    scheduler: Option<JoinHandle<()>>,
}

impl<C> SyncHandle<C>
where
    C: NotionClient + 'static,
{
    pub fn coordinator(&self) -> &Arc<RefreshCoordinator<C>> {
        &self.coordinator
    }

    pub async fn shutdown(mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.abort();
            let _ = scheduler.await;
        }
        tracing::info!("sync stopped");
    }
}

impl<C> Drop for SyncHandle<C>
where
    C: NotionClient + 'static,
{
    fn drop(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.abort();
        }
    }
}

pub async fn start_sync(entry: &ConfigEntry) -> Result<SyncHandle<ReqwestNotionClient>, StartError> {
    let config = Configuration::from_entry(entry)?;
    let client = Arc::new(ReqwestNotionClient::new(config.access_token.clone()));
    start_sync_with(client, config, DEFAULT_SCAN_INTERVAL).await
}

pub async fn start_sync_from_path(path: &Path) -> Result<SyncHandle<ReqwestNotionClient>, StartError> {
    let entry = read_entry(path)?;
    start_sync(&entry).await
}

/// Runs the first refresh and only starts polling if it succeeds.
#[tracing::instrument(level = "info", skip(client, config), fields(database_id = %config.database_id))]
pub async fn start_sync_with<C>(
    client: Arc<C>,
    config: Configuration,
    period: Duration,
) -> Result<SyncHandle<C>, StartError>
where
    C: NotionClient + 'static,
{
    let coordinator = Arc::new(RefreshCoordinator::new(client, config));
    coordinator.refresh().await?;
    let scheduler = coordinator.spawn_scheduler(period);
    tracing::info!(period_secs = period.as_secs(), "sync started");
    Ok(SyncHandle {
        coordinator,
        scheduler: Some(scheduler),
    })
}
