use crate::domain::filter::TaskFilter;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::record_mapper::PropertyMapping;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

const SCHEMA_VERSION: u8 = 1;

pub const CONF_TOKEN: &str = "token";
pub const CONF_DATABASE_ID: &str = "database_id";
pub const CONF_DATA_SOURCE_ID: &str = "data_source_id";
pub const CONF_TITLE_PROPERTY: &str = "title_property";
pub const CONF_STATUS_PROPERTY: &str = "status_property";
pub const CONF_DUE_PROPERTY: &str = "due_property";
pub const CONF_DESCRIPTION_PROPERTY: &str = "description_property";
pub const CONF_INCLUDE_STATUSES: &str = "include_statuses";
pub const CONF_EXCLUDE_STATUSES: &str = "exclude_statuses";
pub const CONF_DUE_WITHIN_DAYS: &str = "due_within_days";
pub const CONF_TIME_ZONE: &str = "time_zone";

pub const DEFAULT_TITLE_PROPERTY: &str = "Name";
pub const DEFAULT_STATUS_PROPERTY: &str = "Status";
pub const DEFAULT_DUE_PROPERTY: &str = "Due";
pub const DEFAULT_DESCRIPTION_PROPERTY: &str = "Description";
pub const DEFAULT_INCLUDE_STATUSES: &str = "";
pub const DEFAULT_EXCLUDE_STATUSES: &str = "";
pub const DEFAULT_DUE_WITHIN_DAYS: u32 = 0;

impl Default for PropertyMapping {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE_PROPERTY.to_string(),
            status: DEFAULT_STATUS_PROPERTY.to_string(),
            due: DEFAULT_DUE_PROPERTY.to_string(),
            description: DEFAULT_DESCRIPTION_PROPERTY.to_string(),
        }
    }
}

/// Persisted configuration entry: setup data plus user-editable options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub schema: u8,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl ConfigEntry {
    pub fn new(title: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            schema: SCHEMA_VERSION,
            title: title.into(),
            data,
            options: Map::new(),
        }
    }

    fn data_str(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Options win over setup data; `None` means the built-in default applies.
    pub fn layered_value(&self, key: &str) -> Option<&Value> {
        if self.options.contains_key(key) {
            return self.options.get(key);
        }
        self.data.get(key)
    }
}

/// Filter settings that may change after setup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterOptions {
    pub include_statuses: String,
    pub exclude_statuses: String,
    pub due_within_days: u32,
}

impl FilterOptions {
    pub fn to_filter(&self) -> TaskFilter {
        TaskFilter::new(
            &self.include_statuses,
            &self.exclude_statuses,
            self.due_within_days,
        )
    }

    fn from_entry(entry: &ConfigEntry) -> Result<Self, InfraError> {
        Ok(Self {
            include_statuses: layered_string(entry, CONF_INCLUDE_STATUSES, DEFAULT_INCLUDE_STATUSES),
            exclude_statuses: layered_string(entry, CONF_EXCLUDE_STATUSES, DEFAULT_EXCLUDE_STATUSES),
            due_within_days: match entry.layered_value(CONF_DUE_WITHIN_DAYS) {
                Some(value) => parse_days(value)?,
                None => DEFAULT_DUE_WITHIN_DAYS,
            },
        })
    }

    fn to_map(&self) -> Map<String, Value> {
        let mut options = Map::new();
        options.insert(
            CONF_INCLUDE_STATUSES.to_string(),
            Value::String(self.include_statuses.clone()),
        );
        options.insert(
            CONF_EXCLUDE_STATUSES.to_string(),
            Value::String(self.exclude_statuses.clone()),
        );
        options.insert(
            CONF_DUE_WITHIN_DAYS.to_string(),
            Value::from(self.due_within_days),
        );
        options
    }
}

/// Validated, immutable view of a [`ConfigEntry`].
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub access_token: String,
    pub database_id: String,
    pub data_source_id: Option<String>,
    pub properties: PropertyMapping,
    pub options: FilterOptions,
    pub filter: TaskFilter,
    pub time_zone: Tz,
}

impl Configuration {
    pub fn from_entry(entry: &ConfigEntry) -> Result<Self, InfraError> {
        let access_token = entry
            .data_str(CONF_TOKEN)
            .ok_or_else(|| InfraError::InvalidConfig(format!("{CONF_TOKEN} is required")))?
            .to_string();
        let database_id = entry
            .data_str(CONF_DATABASE_ID)
            .ok_or_else(|| InfraError::InvalidConfig(format!("{CONF_DATABASE_ID} is required")))?
            .to_string();
        let data_source_id = entry.data_str(CONF_DATA_SOURCE_ID).map(ToOwned::to_owned);

        let property = |key: &str, default: &str| {
            entry.data_str(key).unwrap_or(default).to_string()
        };
        let properties = PropertyMapping {
            title: property(CONF_TITLE_PROPERTY, DEFAULT_TITLE_PROPERTY),
            status: property(CONF_STATUS_PROPERTY, DEFAULT_STATUS_PROPERTY),
            due: property(CONF_DUE_PROPERTY, DEFAULT_DUE_PROPERTY),
            description: property(CONF_DESCRIPTION_PROPERTY, DEFAULT_DESCRIPTION_PROPERTY),
        };

        let time_zone = match entry.data_str(CONF_TIME_ZONE) {
            Some(name) => name.parse::<Tz>().map_err(|error| {
                InfraError::InvalidConfig(format!("invalid {CONF_TIME_ZONE} '{name}': {error}"))
            })?,
            None => Tz::UTC,
        };

        let options = FilterOptions::from_entry(entry)?;
        Ok(Self {
            access_token,
            database_id,
            data_source_id,
            properties,
            filter: options.to_filter(),
            options,
            time_zone,
        })
    }

    /// Returns a copy with new filter options; every other field is kept.
    pub fn with_options(&self, options: FilterOptions) -> Self {
        Self {
            filter: options.to_filter(),
            options,
            ..self.clone()
        }
    }
}

fn layered_string(entry: &ConfigEntry, key: &str, default: &str) -> String {
    match entry.layered_value(key) {
        Some(Value::String(value)) => value.clone(),
        _ => default.to_string(),
    }
}

fn parse_days(value: &Value) -> Result<u32, InfraError> {
    let invalid = || {
        InfraError::InvalidConfig(format!(
            "{CONF_DUE_WITHIN_DAYS} must be a non-negative integer, got {value}"
        ))
    };
    match value {
        Value::Null => Ok(DEFAULT_DUE_WITHIN_DAYS),
        Value::Number(number) => {
            if let Some(days) = number.as_u64() {
                return u32::try_from(days).map_err(|_| invalid());
            }
            match number.as_f64() {
                Some(days) if days >= 0.0 && days.fract() == 0.0 && days <= f64::from(u32::MAX) => {
                    Ok(days as u32)
                }
                _ => Err(invalid()),
            }
        }
        Value::String(raw) if raw.trim().is_empty() => Ok(DEFAULT_DUE_WITHIN_DAYS),
        Value::String(raw) => raw.trim().parse::<u32>().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

pub fn read_entry(path: &Path) -> Result<ConfigEntry, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != u64::from(SCHEMA_VERSION) {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(serde_json::from_value(parsed)?)
}

pub fn write_entry(path: &Path, entry: &ConfigEntry) -> Result<(), InfraError> {
    let formatted = serde_json::to_string_pretty(entry)?;
    fs::write(path, format!("{formatted}\n"))?;
    Ok(())
}

/// Replaces the options object of the stored entry and returns the updated entry.
pub fn save_options(path: &Path, options: &FilterOptions) -> Result<ConfigEntry, InfraError> {
    let mut entry = read_entry(path)?;
    entry.options = options.to_map();
    write_entry(path, &entry)?;
    Ok(entry)
}
