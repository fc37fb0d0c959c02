pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::bootstrap::{
    start_sync, start_sync_from_path, start_sync_with, StartError, SyncHandle,
};
pub use application::refresh::{
    RefreshCoordinator, RefreshError, RefreshState, RefreshSummary, TickOutcome,
    DEFAULT_SCAN_INTERVAL,
};
pub use application::setup::{DatabaseSetup, SetupError, SetupSettings, SetupStep};
pub use domain::filter::TaskFilter;
pub use domain::models::{Due, NormalizedTask, RawRecord, TodoItemStatus};
pub use infrastructure::config::{ConfigEntry, Configuration, FilterOptions};
pub use infrastructure::error::{ApiError, ApiErrorKind, InfraError, MapError};
pub use infrastructure::notion_client::{NotionClient, ReqwestNotionClient};
