use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

pub const UNTITLED: &str = "Untitled";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RichTextSegment {
    #[serde(default)]
    pub plain_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SelectOption {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DateValue {
    #[serde(default)]
    pub start: Option<String>,
}

/// A single typed Notion property value, keyed by its declared `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyValue {
    Title {
        #[serde(default)]
        title: Option<Vec<RichTextSegment>>,
    },
    RichText {
        #[serde(default)]
        rich_text: Option<Vec<RichTextSegment>>,
    },
    Select {
        #[serde(default)]
        select: Option<SelectOption>,
    },
    Status {
        #[serde(default)]
        status: Option<SelectOption>,
    },
    Checkbox {
        #[serde(default)]
        checkbox: Option<bool>,
    },
    Date {
        #[serde(default)]
        date: Option<DateValue>,
    },
    #[serde(other)]
    Unknown,
}

impl PropertyValue {
    /// Parses a raw property payload. Payloads without a `type` tag are `Unknown`.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        if value.get("type").and_then(serde_json::Value::as_str).is_none() {
            return Ok(Self::Unknown);
        }
        serde_json::from_value(value.clone())
    }
}

/// A page as returned by a data source query. Properties stay as raw JSON until mapped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RawRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub in_trash: bool,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl RawRecord {
    /// Converts one query result field by field. Values of the wrong JSON type fall back
    /// to their defaults, so a broken record is rejected by the mapper instead of failing
    /// the whole page.
    pub fn from_value(value: &serde_json::Value) -> Self {
        let flag = |key: &str| {
            value
                .get(key)
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false)
        };
        Self {
            id: value
                .get("id")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string(),
            archived: flag("archived"),
            in_trash: flag("in_trash"),
            properties: value
                .get("properties")
                .and_then(serde_json::Value::as_object)
                .cloned()
                .unwrap_or_default(),
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.archived || self.in_trash
    }

    pub fn property(&self, name: &str) -> Option<&serde_json::Value> {
        self.properties.get(name)
    }
}

/// Due value of a task. Date-only values are never promoted to datetimes.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Due {
    Date(NaiveDate),
    DateTime(DateTime<Tz>),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TodoItemStatus {
    NeedsAction,
    Completed,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NormalizedTask {
    pub id: String,
    pub title: String,
    pub completed: bool,
    pub status_name: Option<String>,
    pub due: Option<Due>,
    pub description: Option<String>,
}

impl NormalizedTask {
    pub fn status(&self) -> TodoItemStatus {
        if self.completed {
            TodoItemStatus::Completed
        } else {
            TodoItemStatus::NeedsAction
        }
    }

    /// Case-folded status name used for filter membership checks.
    pub fn folded_status(&self) -> Option<String> {
        self.status_name.as_deref().map(str::to_lowercase)
    }
}
