use crate::domain::models::{Due, NormalizedTask};
use chrono::{DateTime, Days, TimeDelta, Utc};
use chrono_tz::Tz;
use std::collections::BTreeSet;

/// Parses a comma-separated status list into trimmed, case-folded names.
pub fn parse_status_list(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskFilter {
    pub include_statuses: BTreeSet<String>,
    pub exclude_statuses: BTreeSet<String>,
    pub due_within_days: u32,
}

impl TaskFilter {
    pub fn new(include: &str, exclude: &str, due_within_days: u32) -> Self {
        Self {
            include_statuses: parse_status_list(include),
            exclude_statuses: parse_status_list(exclude),
            due_within_days,
        }
    }

    fn has_inclusion_rules(&self) -> bool {
        !self.include_statuses.is_empty() || self.due_within_days > 0
    }

    pub fn is_visible(&self, task: &NormalizedTask, now: DateTime<Utc>, time_zone: Tz) -> bool {
        let status = task.folded_status();

        if let Some(status) = status.as_deref() {
            if self.exclude_statuses.contains(status) {
                return false;
            }
        }

        if !self.has_inclusion_rules() {
            return true;
        }

        let include_by_status = status
            .as_deref()
            .map(|status| self.include_statuses.contains(status))
            .unwrap_or(false);
        include_by_status || due_within_window(task.due.as_ref(), self.due_within_days, now, time_zone)
    }

    /// Selects the visible tasks, preserving input order.
    pub fn apply(
        &self,
        tasks: &[NormalizedTask],
        now: DateTime<Utc>,
        time_zone: Tz,
    ) -> Vec<NormalizedTask> {
        tasks
            .iter()
            .filter(|task| self.is_visible(task, now, time_zone))
            .cloned()
            .collect()
    }
}

/// True when `due` is no later than `days` days from `now`. Overdue values count as
/// inside the window; a zero window never matches. A window reaching past the
/// representable date range covers every due value.
pub fn due_within_window(due: Option<&Due>, days: u32, now: DateTime<Utc>, time_zone: Tz) -> bool {
    let Some(due) = due else {
        return false;
    };
    if days == 0 {
        return false;
    }
    match due {
        Due::DateTime(value) => TimeDelta::try_days(i64::from(days))
            .and_then(|window| now.checked_add_signed(window))
            .is_none_or(|limit| value.with_timezone(&Utc) <= limit),
        Due::Date(value) => now
            .with_timezone(&time_zone)
            .date_naive()
            .checked_add_days(Days::new(u64::from(days)))
            .is_none_or(|limit| *value <= limit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use proptest::prelude::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn task(id: &str, status: Option<&str>, due: Option<Due>) -> NormalizedTask {
        NormalizedTask {
            id: id.to_string(),
            title: id.to_string(),
            completed: false,
            status_name: status.map(ToOwned::to_owned),
            due,
            description: None,
        }
    }

    #[test]
    fn parse_status_list_trims_and_folds() {
        let parsed = parse_status_list(" Done, In Progress ,,ARCHIVED ");
        assert_eq!(
            parsed,
            BTreeSet::from([
                "archived".to_string(),
                "done".to_string(),
                "in progress".to_string()
            ])
        );
        assert!(parse_status_list("").is_empty());
        assert!(parse_status_list(" , ").is_empty());
    }

    #[test]
    fn empty_filter_keeps_everything_in_order() {
        let tasks = vec![
            task("a", Some("Done"), None),
            task("b", None, None),
            task("c", Some("Todo"), None),
        ];
        let visible = TaskFilter::default().apply(&tasks, Utc::now(), Tz::UTC);
        let ids: Vec<_> = visible.iter().map(|task| task.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn date_due_window_matches_day_granularity() {
        let due = Due::Date(date("2024-06-10"));
        assert!(due_within_window(
            Some(&due),
            5,
            fixed_time("2024-06-08T12:00:00Z"),
            Tz::UTC
        ));
        assert!(!due_within_window(
            Some(&due),
            5,
            fixed_time("2024-06-01T12:00:00Z"),
            Tz::UTC
        ));
        assert!(!due_within_window(
            Some(&due),
            0,
            fixed_time("2024-06-08T12:00:00Z"),
            Tz::UTC
        ));
    }

    #[test]
    fn date_due_window_uses_local_today() {
        // 2024-06-05T23:30Z is already 2024-06-06 in Tokyo.
        let due = Due::Date(date("2024-06-07"));
        let now = fixed_time("2024-06-05T23:30:00Z");
        assert!(!due_within_window(Some(&due), 1, now, Tz::UTC));
        assert!(due_within_window(Some(&due), 1, now, chrono_tz::Asia::Tokyo));
    }

    #[test]
    fn datetime_due_window_compares_instants() {
        let due = Due::DateTime(
            Tz::UTC
                .with_ymd_and_hms(2024, 6, 10, 9, 0, 0)
                .single()
                .expect("valid datetime"),
        );
        assert!(due_within_window(
            Some(&due),
            2,
            fixed_time("2024-06-08T09:00:00Z"),
            Tz::UTC
        ));
        assert!(!due_within_window(
            Some(&due),
            2,
            fixed_time("2024-06-08T08:59:59Z"),
            Tz::UTC
        ));
    }

    #[test]
    fn overdue_tasks_fall_inside_the_window() {
        let due = Due::Date(date("2024-05-01"));
        assert!(due_within_window(
            Some(&due),
            3,
            fixed_time("2024-06-08T12:00:00Z"),
            Tz::UTC
        ));
    }

    #[test]
    fn oversized_window_covers_every_due_value() {
        let now = fixed_time("2024-06-08T12:00:00Z");
        let by_date = Due::Date(date("2024-06-10"));
        let by_time = Due::DateTime(
            Tz::UTC
                .with_ymd_and_hms(2030, 1, 1, 0, 0, 0)
                .single()
                .expect("valid datetime"),
        );
        assert!(due_within_window(Some(&by_date), 100_000_000, now, Tz::UTC));
        assert!(due_within_window(Some(&by_time), u32::MAX, now, Tz::UTC));

        let filter = TaskFilter::new("", "", u32::MAX);
        let tasks = vec![
            task("dated", Some("Todo"), Some(by_date)),
            task("undated", Some("Todo"), None),
        ];
        let visible = filter.apply(&tasks, now, Tz::UTC);
        let ids: Vec<_> = visible.iter().map(|task| task.id.as_str()).collect();
        assert_eq!(ids, vec!["dated"]);
    }

    #[test]
    fn include_rules_accept_status_or_due() {
        let filter = TaskFilter::new("Doing", "", 3);
        let now = fixed_time("2024-06-08T12:00:00Z");
        let tasks = vec![
            task("by-status", Some("doing"), None),
            task("by-due", Some("Todo"), Some(Due::Date(date("2024-06-09")))),
            task("neither", Some("Todo"), Some(Due::Date(date("2024-07-01")))),
            task("no-status", None, None),
        ];
        let visible = filter.apply(&tasks, now, Tz::UTC);
        let ids: Vec<_> = visible.iter().map(|task| task.id.as_str()).collect();
        assert_eq!(ids, vec!["by-status", "by-due"]);
    }

    #[test]
    fn exclude_without_status_name_keeps_task() {
        let filter = TaskFilter::new("", "done", 0);
        assert!(filter.is_visible(&task("a", None, None), Utc::now(), Tz::UTC));
        assert!(!filter.is_visible(&task("b", Some("DONE"), None), Utc::now(), Tz::UTC));
    }

    fn status_pattern() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z ]{0,15}".prop_map(|value| value.trim().to_string())
    }

    // Exclusion wins over inclusion regardless of the due window.
    proptest! {
        #[test]
        fn exclude_takes_precedence_over_include(status in status_pattern(), days in 0u32..30u32) {
            let filter = TaskFilter::new(&status.to_uppercase(), &status, days);
            let now = fixed_time("2024-06-08T12:00:00Z");
            let candidate = task("p", Some(&status), Some(Due::Date(date("2024-06-08"))));
            prop_assert!(!filter.is_visible(&candidate, now, Tz::UTC));
        }
    }

    proptest! {
        #[test]
        fn filtering_preserves_relative_order(statuses in prop::collection::vec(prop::option::of(status_pattern()), 0..20)) {
            let tasks: Vec<NormalizedTask> = statuses
                .iter()
                .enumerate()
                .map(|(index, status)| task(&format!("t{index}"), status.as_deref(), None))
                .collect();
            let filter = TaskFilter::new("", "a", 0);
            let visible = filter.apply(&tasks, Utc::now(), Tz::UTC);
            let positions: Vec<usize> = visible
                .iter()
                .map(|kept| tasks.iter().position(|task| task.id == kept.id).expect("kept task comes from input"))
                .collect();
            prop_assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }
}
