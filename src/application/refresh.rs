use crate::domain::models::{NormalizedTask, RawRecord};
use crate::infrastructure::config::{Configuration, FilterOptions};
use crate::infrastructure::error::ApiError;
use crate::infrastructure::notion_client::NotionClient;
use crate::infrastructure::record_mapper::map_records;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;
pub type TaskList = Arc<Vec<NormalizedTask>>;
pub type Snapshot = Arc<Vec<RawRecord>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
    Succeeded { at: DateTime<Utc> },
    Failed { error: ApiError, at: DateTime<Utc> },
    /// Credentials were rejected; only a reconfiguration clears this.
    AuthenticationRequired { error: ApiError },
    ConfigurationRequired { message: String },
}

impl RefreshState {
    pub fn blocks_scheduled_refresh(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationRequired { .. } | Self::ConfigurationRequired { .. }
        )
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    #[error("Missing data source id; reconfigure integration.")]
    MissingConfiguration,
    #[error("authentication failed: {0}")]
    AuthenticationFailed(ApiError),
    #[error("update failed: {0}")]
    UpdateFailed(ApiError),
}

impl RefreshError {
    /// Whether the next scheduled tick may retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::UpdateFailed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSummary {
    pub records: usize,
    pub visible: usize,
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Ran(Result<RefreshSummary, RefreshError>),
    SkippedInFlight,
    SkippedBlocked,
}

/// Owns the last fetched snapshot of a data source and the task list published from it.
pub struct RefreshCoordinator<C>
where
    C: NotionClient,
{
    client: Arc<C>,
    config: watch::Sender<Arc<Configuration>>,
    snapshot: watch::Sender<Snapshot>,
    tasks: watch::Sender<TaskList>,
    state: watch::Sender<RefreshState>,
    refresh_lock: tokio::sync::Mutex<()>,
    publish_lock: Mutex<()>,
    now_provider: NowProvider,
}

impl<C> RefreshCoordinator<C>
where
    C: NotionClient,
{
    pub fn new(client: Arc<C>, config: Configuration) -> Self {
        let (config, _) = watch::channel(Arc::new(config));
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        let (tasks, _) = watch::channel(Arc::new(Vec::new()));
        let (state, _) = watch::channel(RefreshState::Idle);
        Self {
            client,
            config,
            snapshot,
            tasks,
            state,
            refresh_lock: tokio::sync::Mutex::new(()),
            publish_lock: Mutex::new(()),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn configuration(&self) -> Arc<Configuration> {
        Arc::clone(&self.config.borrow())
    }

    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.snapshot.borrow())
    }

    /// The currently published, filtered task list.
    pub fn tasks(&self) -> TaskList {
        Arc::clone(&self.tasks.borrow())
    }

    pub fn state(&self) -> RefreshState {
        self.state.borrow().clone()
    }

    /// Receives a new value only when a completed cycle or option change alters the list.
    pub fn subscribe(&self) -> watch::Receiver<TaskList> {
        self.tasks.subscribe()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<RefreshState> {
        self.state.subscribe()
    }

    /// On-demand refresh. Waits for an in-flight cycle instead of overlapping it.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn refresh(&self) -> Result<RefreshSummary, RefreshError> {
        let _guard = self.refresh_lock.lock().await;
        self.run_cycle().await
    }

    /// Timer-driven refresh. Never overlaps a running cycle and never runs while an
    /// authentication or configuration problem is pending.
    pub async fn scheduled_tick(&self) -> TickOutcome {
        if self.state.borrow().blocks_scheduled_refresh() {
            return TickOutcome::SkippedBlocked;
        }
        let Ok(_guard) = self.refresh_lock.try_lock() else {
            return TickOutcome::SkippedInFlight;
        };
        TickOutcome::Ran(self.run_cycle().await)
    }

    /// Applies new filter options and republishes from the current snapshot.
    pub fn update_options(&self, options: FilterOptions) -> bool {
        self.config
            .send_modify(|config| *config = Arc::new(config.with_options(options)));
        self.publish()
    }

    /// Replaces the whole configuration and lifts any pending authentication or
    /// configuration block. A different data source invalidates the snapshot.
    /// Waits for an in-flight cycle so its outcome cannot land on the new configuration.
    pub async fn reconfigure(&self, config: Configuration) -> bool {
        let _guard = self.refresh_lock.lock().await;
        let previous = self.configuration();
        if previous.data_source_id != config.data_source_id {
            self.snapshot.send_replace(Arc::new(Vec::new()));
        }
        self.config.send_replace(Arc::new(config));
        self.state.send_if_modified(|state| {
            if state.blocks_scheduled_refresh() {
                *state = RefreshState::Idle;
                return true;
            }
            false
        });
        self.publish()
    }

    async fn run_cycle(&self) -> Result<RefreshSummary, RefreshError> {
        let config = self.configuration();
        let Some(data_source_id) = config.data_source_id.clone() else {
            let error = RefreshError::MissingConfiguration;
            tracing::error!(error = %error, "refresh aborted");
            self.state.send_replace(RefreshState::ConfigurationRequired {
                message: error.to_string(),
            });
            return Err(error);
        };

        self.state.send_replace(RefreshState::Refreshing);
        match self.client.query_data_source(&data_source_id).await {
            Ok(records) => {
                let snapshot: Snapshot = Arc::new(records);
                self.snapshot.send_replace(Arc::clone(&snapshot));
                let changed = self.publish();
                let summary = RefreshSummary {
                    records: snapshot.len(),
                    visible: self.tasks.borrow().len(),
                    changed,
                };
                self.state.send_replace(RefreshState::Succeeded {
                    at: (self.now_provider)(),
                });
                tracing::info!(
                    %data_source_id,
                    records = summary.records,
                    visible = summary.visible,
                    changed,
                    "refresh succeeded"
                );
                Ok(summary)
            }
            Err(error) if error.is_authentication() => {
                tracing::error!(%data_source_id, error = %error, "credentials rejected; refresh blocked until reconfigured");
                self.state.send_replace(RefreshState::AuthenticationRequired {
                    error: error.clone(),
                });
                Err(RefreshError::AuthenticationFailed(error))
            }
            Err(error) => {
                tracing::warn!(%data_source_id, kind = ?error.kind(), error = %error, "refresh failed; keeping previous snapshot");
                self.state.send_replace(RefreshState::Failed {
                    error: error.clone(),
                    at: (self.now_provider)(),
                });
                Err(RefreshError::UpdateFailed(error))
            }
        }
    }

    /// Recomputes the task list from the current snapshot and configuration, both read
    /// under the publish lock.
    fn publish(&self) -> bool {
        let _guard = self
            .publish_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let snapshot = self.snapshot();
        let config = self.configuration();
        let mapped = map_records(&snapshot, &config.properties, config.time_zone);
        let visible = config
            .filter
            .apply(&mapped, (self.now_provider)(), config.time_zone);

        self.tasks.send_if_modified(|current| {
            if current.as_slice() == visible.as_slice() {
                return false;
            }
            *current = Arc::new(visible);
            true
        })
    }
}

impl<C> RefreshCoordinator<C>
where
    C: NotionClient + 'static,
{
    /// Spawns the polling loop. The first tick fires one `period` from now; abort the
    /// handle to stop scheduling.
    pub fn spawn_scheduler(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let period = if period.is_zero() {
            tracing::warn!("zero scan interval; using default");
            DEFAULT_SCAN_INTERVAL
        } else {
            period
        };
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match coordinator.scheduled_tick().await {
                    TickOutcome::Ran(Ok(_)) => {}
                    TickOutcome::Ran(Err(error)) => {
                        tracing::debug!(error = %error, transient = error.is_transient(), "scheduled refresh failed");
                    }
                    TickOutcome::SkippedInFlight => {
                        tracing::debug!("refresh already running; tick skipped");
                    }
                    TickOutcome::SkippedBlocked => {
                        tracing::debug!("refresh blocked; waiting for reconfiguration");
                    }
                }
            }
        })
    }
}
