use crate::domain::models::{
    Due, NormalizedTask, PropertyValue, RawRecord, RichTextSegment, UNTITLED,
};
use crate::infrastructure::error::MapError;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;

const COMPLETED_MARKERS: [&str; 4] = ["done", "complete", "completed", "dropped"];
const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Names of the record properties that feed each task field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyMapping {
    pub title: String,
    pub status: String,
    pub due: String,
    pub description: String,
}

fn plain_text(segments: &[RichTextSegment]) -> String {
    segments
        .iter()
        .map(|segment| segment.plain_text.as_str())
        .collect::<String>()
        .trim()
        .to_string()
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

pub fn extract_text(property: Option<&PropertyValue>) -> Option<String> {
    match property? {
        PropertyValue::Title { title } => non_empty(plain_text(title.as_deref().unwrap_or_default())),
        PropertyValue::RichText { rich_text } => {
            non_empty(plain_text(rich_text.as_deref().unwrap_or_default()))
        }
        PropertyValue::Select { select } => select.as_ref()?.name.clone().and_then(non_empty),
        _ => None,
    }
}

pub fn status_name(property: Option<&PropertyValue>) -> Option<String> {
    match property? {
        PropertyValue::Status { status: option } | PropertyValue::Select { select: option } => {
            option.as_ref()?.name.clone().and_then(non_empty)
        }
        _ => None,
    }
}

/// Checkboxes complete when ticked; status and select options complete when their name
/// contains one of the completion markers, case-insensitively.
pub fn is_completed(property: Option<&PropertyValue>) -> bool {
    match property {
        Some(PropertyValue::Checkbox { checkbox }) => checkbox.unwrap_or(false),
        Some(PropertyValue::Status { status: option })
        | Some(PropertyValue::Select { select: option }) => {
            let name = option
                .as_ref()
                .and_then(|option| option.name.as_deref())
                .unwrap_or_default()
                .to_lowercase();
            COMPLETED_MARKERS.iter().any(|marker| name.contains(marker))
        }
        _ => false,
    }
}

pub fn extract_due(property: Option<&PropertyValue>, time_zone: Tz) -> Option<Due> {
    let Some(PropertyValue::Date { date }) = property else {
        return None;
    };
    let start = date.as_ref()?.start.as_deref()?.trim();
    if start.is_empty() {
        return None;
    }
    parse_due(start, time_zone)
}

/// Values with a time component become datetimes in `time_zone`; offset-less times are
/// read as UTC. Everything else must be a calendar date.
pub fn parse_due(value: &str, time_zone: Tz) -> Option<Due> {
    if value.contains('T') {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
            return Some(Due::DateTime(parsed.with_timezone(&time_zone)));
        }
        return NAIVE_DATETIME_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
            .map(|naive| Due::DateTime(naive.and_utc().with_timezone(&time_zone)));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok().map(Due::Date)
}

fn property(record: &RawRecord, name: &str) -> Result<Option<PropertyValue>, MapError> {
    let Some(raw) = record.property(name) else {
        return Ok(None);
    };
    PropertyValue::from_json(raw)
        .map(Some)
        .map_err(|error| MapError::MalformedProperty {
            property: name.to_string(),
            message: error.to_string(),
        })
}

/// Maps one record into a task. Archived and trashed records map to `None`.
pub fn map_record(
    record: &RawRecord,
    mapping: &PropertyMapping,
    time_zone: Tz,
) -> Result<Option<NormalizedTask>, MapError> {
    if record.is_hidden() {
        return Ok(None);
    }
    let id = record.id.trim();
    if id.is_empty() {
        return Err(MapError::MissingId);
    }

    let title = property(record, &mapping.title)?;
    let status = property(record, &mapping.status)?;
    let due = property(record, &mapping.due)?;
    let description = property(record, &mapping.description)?;

    Ok(Some(NormalizedTask {
        id: id.to_string(),
        title: extract_text(title.as_ref()).unwrap_or_else(|| UNTITLED.to_string()),
        completed: is_completed(status.as_ref()),
        status_name: status_name(status.as_ref()),
        due: extract_due(due.as_ref(), time_zone),
        description: extract_text(description.as_ref()),
    }))
}

/// Maps a whole snapshot in order. A record that fails to map is skipped and logged;
/// the rest of the batch is still processed.
pub fn map_records(
    records: &[RawRecord],
    mapping: &PropertyMapping,
    time_zone: Tz,
) -> Vec<NormalizedTask> {
    let mut tasks = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        match map_record(record, mapping, time_zone) {
            Ok(Some(task)) => tasks.push(task),
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(index, record_id = %record.id, error = %error, "skipping unmappable record");
            }
        }
    }
    tasks
}
