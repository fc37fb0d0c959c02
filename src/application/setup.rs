use crate::domain::models::RichTextSegment;
use crate::infrastructure::config::{
    ConfigEntry, FilterOptions, CONF_DATABASE_ID, CONF_DATA_SOURCE_ID, CONF_DESCRIPTION_PROPERTY,
    CONF_DUE_PROPERTY, CONF_DUE_WITHIN_DAYS, CONF_EXCLUDE_STATUSES, CONF_INCLUDE_STATUSES,
    CONF_STATUS_PROPERTY, CONF_TIME_ZONE, CONF_TITLE_PROPERTY, CONF_TOKEN,
};
use crate::infrastructure::error::ApiError;
use crate::infrastructure::notion_client::{DataSourceRef, DatabaseMetadata, NotionClient};
use crate::infrastructure::record_mapper::PropertyMapping;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use uuid::Uuid;

static DATABASE_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[0-9a-fA-F]{32}|[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .expect("invalid database id regex")
});

/// Field-level setup failures. `key()` is the stable identifier shown to the user.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SetupError {
    #[error("no database id found in input")]
    InvalidId,
    #[error("database has no usable data source")]
    InvalidDatabase,
    #[error("authentication failed: {0}")]
    Authentication(ApiError),
    #[error("connection failed: {0}")]
    Connection(ApiError),
    #[error("unexpected error: {0}")]
    Unknown(ApiError),
}

impl SetupError {
    pub fn key(&self) -> &'static str {
        match self {
            Self::InvalidId => "invalid_id",
            Self::InvalidDatabase => "invalid_database",
            Self::Authentication(_) => "auth",
            Self::Connection(_) => "connection",
            Self::Unknown(_) => "unknown",
        }
    }
}

impl From<ApiError> for SetupError {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::Authentication(_) => {
                tracing::warn!(error = %error, "setup authentication failed");
                Self::Authentication(error)
            }
            ApiError::Communication(_) => {
                tracing::error!(error = %error, "setup connection error");
                Self::Connection(error)
            }
            other => {
                tracing::error!(error = %other, "unexpected setup error");
                Self::Unknown(other)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSourceChoice {
    pub id: String,
    pub name: String,
}

impl DataSourceChoice {
    pub fn label(&self) -> &str {
        if self.name.is_empty() { &self.id } else { &self.name }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseChoice {
    pub id: String,
    pub title: String,
}

impl DatabaseChoice {
    pub fn label(&self) -> &str {
        if self.title.is_empty() { &self.id } else { &self.title }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDatabase {
    pub database_id: String,
    pub data_source_id: String,
    pub title: String,
}

/// A database with several data sources, waiting for the user to pick one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDataSource {
    pub database_id: String,
    pub title: String,
    pub sources: Vec<DataSourceChoice>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupStep {
    Resolved(ResolvedDatabase),
    ChooseDataSource(PendingDataSource),
    ChooseDatabase(Vec<DatabaseChoice>),
}

/// Settings entered alongside the database id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupSettings {
    pub token: String,
    pub properties: PropertyMapping,
    pub options: FilterOptions,
    pub time_zone: Option<String>,
}

impl ConfigEntry {
    pub fn from_setup(resolved: &ResolvedDatabase, settings: &SetupSettings) -> Self {
        let mut data = Map::new();
        let mut put = |key: &str, value: Value| {
            data.insert(key.to_string(), value);
        };
        put(CONF_TOKEN, Value::from(settings.token.as_str()));
        put(CONF_DATABASE_ID, Value::from(resolved.database_id.as_str()));
        put(CONF_DATA_SOURCE_ID, Value::from(resolved.data_source_id.as_str()));
        put(CONF_TITLE_PROPERTY, Value::from(settings.properties.title.as_str()));
        put(CONF_STATUS_PROPERTY, Value::from(settings.properties.status.as_str()));
        put(CONF_DUE_PROPERTY, Value::from(settings.properties.due.as_str()));
        put(
            CONF_DESCRIPTION_PROPERTY,
            Value::from(settings.properties.description.as_str()),
        );
        put(
            CONF_INCLUDE_STATUSES,
            Value::from(settings.options.include_statuses.as_str()),
        );
        put(
            CONF_EXCLUDE_STATUSES,
            Value::from(settings.options.exclude_statuses.as_str()),
        );
        put(CONF_DUE_WITHIN_DAYS, Value::from(settings.options.due_within_days));
        if let Some(time_zone) = settings.time_zone.as_deref() {
            put(CONF_TIME_ZONE, Value::from(time_zone));
        }
        ConfigEntry::new(resolved.title.clone(), data)
    }
}

/// Extracts database ids from a raw id or a pasted URL. Each match is followed by its
/// dashed or undashed alternate; duplicates are dropped, discovery order is kept.
pub fn candidate_database_ids(input: &str) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    let mut push = |candidate: String| {
        if !candidate.is_empty() && !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    };

    for found in DATABASE_ID_PATTERN.find_iter(input) {
        let raw = found.as_str();
        push(raw.to_string());
        if raw.contains('-') {
            push(raw.replace('-', ""));
        } else if let Ok(id) = Uuid::try_parse(raw) {
            push(id.hyphenated().to_string());
        }
    }
    candidates
}

pub fn database_title(title: &[RichTextSegment]) -> Option<String> {
    let joined: String = title
        .iter()
        .map(|segment| segment.plain_text.as_str())
        .collect();
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn data_source_choice(source: &DataSourceRef) -> Option<DataSourceChoice> {
    let id = source.id.as_deref().filter(|id| !id.is_empty())?;
    let name = source
        .name
        .as_deref()
        .filter(|name| !name.is_empty())
        .or(source.title.as_deref())
        .unwrap_or_default();
    Some(DataSourceChoice {
        id: id.to_string(),
        name: name.to_string(),
    })
}

/// Data sources listed by a database, plus the singular `data_source` when it is not
/// already among them.
pub fn data_sources(database: &DatabaseMetadata) -> Vec<DataSourceChoice> {
    let mut sources: Vec<DataSourceChoice> = database
        .data_sources
        .iter()
        .flatten()
        .filter_map(data_source_choice)
        .collect();
    if let Some(single) = database.data_source.as_ref().and_then(data_source_choice) {
        if !sources.iter().any(|source| source.id == single.id) {
            sources.push(single);
        }
    }
    sources
}

/// Databases visible to the token, in search order.
pub async fn list_databases<C>(client: &C) -> Result<Vec<DatabaseChoice>, ApiError>
where
    C: NotionClient + ?Sized,
{
    let results = client.search_databases().await?;
    Ok(results
        .into_iter()
        .filter(|item| item.object == "database" && !item.id.is_empty())
        .map(|item| DatabaseChoice {
            title: database_title(&item.title).unwrap_or_default(),
            id: item.id,
        })
        .collect())
}

/// Completes a pending multi-source choice.
pub fn select_data_source(
    pending: &PendingDataSource,
    data_source_id: &str,
) -> Result<ResolvedDatabase, SetupError> {
    let source = pending
        .sources
        .iter()
        .find(|source| source.id == data_source_id)
        .ok_or(SetupError::InvalidDatabase)?;
    Ok(ResolvedDatabase {
        database_id: pending.database_id.clone(),
        data_source_id: source.id.clone(),
        title: pending.title.clone(),
    })
}

/// Resolves user input into a database and data source, asking for a choice when the
/// input is ambiguous.
pub struct DatabaseSetup<C>
where
    C: NotionClient,
{
    client: Arc<C>,
}

impl<C> DatabaseSetup<C>
where
    C: NotionClient,
{
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn resolve(&self, input: &str) -> Result<SetupStep, SetupError> {
        let candidates = candidate_database_ids(input);
        if candidates.is_empty() {
            return Err(SetupError::InvalidId);
        }

        if let Some((database_id, database)) = self.find_database(&candidates).await? {
            return Self::step_for(database_id, &database);
        }

        let databases = list_databases(self.client.as_ref()).await?;
        if databases.is_empty() {
            return Err(SetupError::InvalidDatabase);
        }
        Ok(SetupStep::ChooseDatabase(databases))
    }

    /// Continues after the user picked one of the listed databases.
    pub async fn select_database(&self, database_id: &str) -> Result<SetupStep, SetupError> {
        let database = self.client.get_database(database_id).await?;
        Self::step_for(database_id.to_string(), &database)
    }

    async fn find_database(
        &self,
        candidates: &[String],
    ) -> Result<Option<(String, DatabaseMetadata)>, SetupError> {
        for candidate in candidates {
            match self.client.get_database(candidate).await {
                Ok(database) => return Ok(Some((candidate.clone(), database))),
                Err(error @ ApiError::NotFound(_)) => {
                    tracing::warn!(candidate = %candidate, error = %error, "database not found");
                }
                Err(error) => return Err(error.into()),
            }
        }
        Ok(None)
    }

    fn step_for(database_id: String, database: &DatabaseMetadata) -> Result<SetupStep, SetupError> {
        let mut sources = data_sources(database);
        let title = database_title(&database.title).unwrap_or_else(|| database_id.clone());
        match sources.len() {
            0 => Err(SetupError::InvalidDatabase),
            1 => {
                let source = sources.remove(0);
                Ok(SetupStep::Resolved(ResolvedDatabase {
                    database_id,
                    data_source_id: source.id,
                    title,
                }))
            }
            _ => Ok(SetupStep::ChooseDataSource(PendingDataSource {
                database_id,
                title,
                sources,
            })),
        }
    }
}
