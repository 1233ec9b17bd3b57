use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;

/// Shown wherever a count or label cannot be computed.
pub const DEFAULT_PLACEHOLDER: &str = "–";

// ============================================================================
// Input Parsing
// ============================================================================

/// Split a `datetime-local` value into its date and optional time part.
pub fn split_date_time(value: &str) -> (&str, Option<&str>) {
    match value.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (value, None),
    }
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

/// Parse the start of a series, e.g. "2024-01-01T14:30" or "2024-01-01".
/// A missing time means midnight.
pub fn parse_start(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let (date_part, time_part) = split_date_time(value);
    let date = parse_date(date_part)?;
    let time = match time_part {
        Some(t) if !t.trim().is_empty() => parse_time(t)?,
        _ => NaiveTime::default(),
    };

    Some(date.and_time(time))
}

/// Parse the inclusive end of a series. The whole end day counts, so the
/// boundary is 23:59:59 on that date.
pub fn parse_until(value: &str) -> Option<NaiveDateTime> {
    parse_date(value)?.and_hms_opt(23, 59, 59)
}

/// Parse the interval input the way a number field is read: leading digits
/// with an optional sign, anything after them ignored.
pub fn parse_interval(value: &str) -> Option<i64> {
    let value = value.trim_start();
    let (sign, digits) = match value.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, value.strip_prefix('+').unwrap_or(value)),
    };

    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());

    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

// ============================================================================
// Occurrences
// ============================================================================

/// Every date of a weekly series, starting with `start` itself.
pub fn occurrence_dates(
    start: NaiveDateTime,
    interval_weeks: i64,
    until: NaiveDateTime,
) -> Vec<NaiveDateTime> {
    let mut dates = vec![start];

    let Some(step) = u64::try_from(interval_weeks)
        .ok()
        .filter(|w| *w > 0)
        .and_then(|w| w.checked_mul(7))
    else {
        return dates;
    };

    let mut current = start;
    while let Some(next) = current.checked_add_days(Days::new(step)) {
        if next > until {
            break;
        }
        dates.push(next);
        current = next;
    }

    dates
}

/// How many trainings a recurring series produces.
///
/// A disabled series is a single training. With recurrence enabled, `None`
/// means the count is undefined: an input is missing or unparseable, or the
/// interval is not positive.
pub fn compute_occurrences(
    repeat_enabled: bool,
    start: Option<&str>,
    interval_weeks: Option<i64>,
    until: Option<&str>,
) -> Option<usize> {
    if !repeat_enabled {
        return Some(1);
    }

    let start = non_empty(start)?;
    let until = non_empty(until)?;
    let interval_weeks = interval_weeks.filter(|w| *w > 0)?;

    let start = parse_start(start)?;
    let until = parse_until(until)?;

    Some(occurrence_dates(start, interval_weeks, until).len())
}

// ============================================================================
// Weekdays
// ============================================================================

/// Weekday index with Monday = 0 through Sunday = 6.
pub fn weekday_index(date: NaiveDate) -> u8 {
    // Shift the Sunday-first index back by one day, wrapping Sunday to the end
    ((date.weekday().num_days_from_sunday() + 6) % 7) as u8
}

/// Localized day names, Monday first.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Vec<String>")]
pub struct WeekdayNames([String; 7]);

impl WeekdayNames {
    pub fn new(names: [String; 7]) -> Self {
        Self(names)
    }

    pub fn label(&self, index: u8) -> &str {
        &self.0[usize::from(index) % 7]
    }
}

impl Default for WeekdayNames {
    fn default() -> Self {
        Self([
            "Poniedziałek".to_string(),
            "Wtorek".to_string(),
            "Środa".to_string(),
            "Czwartek".to_string(),
            "Piątek".to_string(),
            "Sobota".to_string(),
            "Niedziela".to_string(),
        ])
    }
}

impl TryFrom<Vec<String>> for WeekdayNames {
    type Error = String;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        let count = names.len();
        let names: [String; 7] = names
            .try_into()
            .map_err(|_| format!("expected 7 weekday names, got {}", count))?;
        Ok(Self(names))
    }
}

/// Day name for the start of a series, or the placeholder when recurrence is
/// off or the date cannot be read.
pub fn weekday_label(
    repeat_enabled: bool,
    start: Option<&str>,
    names: &WeekdayNames,
    placeholder: &str,
) -> String {
    if !repeat_enabled {
        return placeholder.to_string();
    }

    non_empty(start)
        .map(split_date_time)
        .and_then(|(date, _)| parse_date(date))
        .map(|date| names.label(weekday_index(date)).to_string())
        .unwrap_or_else(|| placeholder.to_string())
}

// ============================================================================
// Repeat Section
// ============================================================================

/// Raw values of the recurrence inputs on the training form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepeatInputs {
    pub repeat_enabled: bool,
    pub date: String,
    pub repeat_interval: String,
    pub repeat_until: String,
}

impl RepeatInputs {
    pub fn occurrences(&self) -> Option<usize> {
        compute_occurrences(
            self.repeat_enabled,
            Some(&self.date),
            parse_interval(&self.repeat_interval),
            Some(&self.repeat_until),
        )
    }
}

/// Inputs whose edits trigger a recount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatField {
    Date,
    Interval,
    Until,
}

/// What the recurrence part of the form shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatView {
    pub repeat_section_visible: bool,
    pub repeat_fields_visible: bool,
    pub schedule_button_visible: bool,
    pub fallback_submit_visible: bool,
    pub occurrence_text: String,
    pub weekday_text: String,
}

/// Controller for the repeat toggle and the fields it reveals.
#[derive(Debug, Clone)]
pub struct RepeatSection {
    inputs: RepeatInputs,
    names: WeekdayNames,
    placeholder: String,
}

impl RepeatSection {
    pub fn new(inputs: RepeatInputs, names: WeekdayNames, placeholder: impl Into<String>) -> Self {
        Self {
            inputs,
            names,
            placeholder: placeholder.into(),
        }
    }

    pub fn inputs(&self) -> &RepeatInputs {
        &self.inputs
    }

    pub fn toggle_repeat_section(&mut self, enabled: bool) -> RepeatView {
        tracing::debug!(enabled, "repeat section toggled");
        self.inputs.repeat_enabled = enabled;
        self.view()
    }

    pub fn on_input(&mut self, field: RepeatField, value: impl Into<String>) -> RepeatView {
        let value = value.into();
        match field {
            RepeatField::Date => self.inputs.date = value,
            RepeatField::Interval => self.inputs.repeat_interval = value,
            RepeatField::Until => self.inputs.repeat_until = value,
        }
        self.view()
    }

    pub fn view(&self) -> RepeatView {
        let enabled = self.inputs.repeat_enabled;

        let occurrence_text = self
            .inputs
            .occurrences()
            .map(|n| n.to_string())
            .unwrap_or_else(|| self.placeholder.clone());

        RepeatView {
            repeat_section_visible: enabled,
            repeat_fields_visible: enabled,
            schedule_button_visible: enabled,
            fallback_submit_visible: !enabled,
            occurrence_text,
            weekday_text: weekday_label(enabled, Some(&self.inputs.date), &self.names, &self.placeholder),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(value: &str) -> NaiveDateTime {
        parse_start(value).unwrap()
    }

    #[test]
    fn test_disabled_is_always_one() {
        assert_eq!(compute_occurrences(false, None, None, None), Some(1));
        assert_eq!(
            compute_occurrences(false, Some("garbage"), Some(-3), Some("")),
            Some(1)
        );
        assert_eq!(
            compute_occurrences(false, Some("2024-01-01"), Some(1), Some("2024-12-31")),
            Some(1)
        );
    }

    #[test]
    fn test_weekly_inclusive_end() {
        // Jan 1, 8 and 15
        assert_eq!(
            compute_occurrences(true, Some("2024-01-01T00:00"), Some(1), Some("2024-01-15")),
            Some(3)
        );
    }

    #[test]
    fn test_end_of_day_boundary_includes_late_start() {
        // 23:30 on the end date is still before 23:59:59
        assert_eq!(
            compute_occurrences(true, Some("2024-01-01T23:30"), Some(1), Some("2024-01-08")),
            Some(2)
        );
    }

    #[test]
    fn test_biweekly_next_past_end() {
        assert_eq!(
            compute_occurrences(true, Some("2024-01-01"), Some(2), Some("2024-01-10")),
            Some(1)
        );
    }

    #[test]
    fn test_missing_or_invalid_inputs_are_undefined() {
        assert_eq!(compute_occurrences(true, None, Some(1), Some("2024-01-15")), None);
        assert_eq!(compute_occurrences(true, Some(""), Some(1), Some("2024-01-15")), None);
        assert_eq!(compute_occurrences(true, Some("2024-01-01"), None, Some("2024-01-15")), None);
        assert_eq!(compute_occurrences(true, Some("2024-01-01"), Some(1), None), None);
        assert_eq!(compute_occurrences(true, Some("2024-01-01"), Some(0), Some("2024-01-15")), None);
        assert_eq!(compute_occurrences(true, Some("2024-01-01"), Some(-2), Some("2024-01-15")), None);
        assert_eq!(compute_occurrences(true, Some("01/01/2024"), Some(1), Some("2024-01-15")), None);
        assert_eq!(compute_occurrences(true, Some("2024-01-01"), Some(1), Some("2024-13-40")), None);
    }

    #[test]
    fn test_start_after_end_still_counts_start() {
        assert_eq!(
            compute_occurrences(true, Some("2024-02-01"), Some(1), Some("2024-01-01")),
            Some(1)
        );
    }

    #[test]
    fn test_occurrence_dates_keep_time() {
        let dates = occurrence_dates(dt("2024-01-01T14:30"), 2, parse_until("2024-02-01").unwrap());
        assert_eq!(
            dates,
            vec![dt("2024-01-01T14:30"), dt("2024-01-15T14:30"), dt("2024-01-29T14:30")]
        );
    }

    #[test]
    fn test_occurrence_dates_huge_interval_stops() {
        let dates = occurrence_dates(dt("2024-01-01"), i64::MAX, parse_until("2024-02-01").unwrap());
        assert_eq!(dates.len(), 1);
    }

    #[test]
    fn test_parse_start_variants() {
        assert_eq!(dt("2024-01-01").to_string(), "2024-01-01 00:00:00");
        assert_eq!(dt("2024-01-01T14:30").to_string(), "2024-01-01 14:30:00");
        assert_eq!(dt("2024-01-01T14:30:15").to_string(), "2024-01-01 14:30:15");
        assert!(parse_start("2024-01-01T25:00").is_none());
        assert!(parse_start("  ").is_none());
    }

    #[test]
    fn test_parse_interval_leading_digits() {
        assert_eq!(parse_interval("2"), Some(2));
        assert_eq!(parse_interval(" 3 weeks"), Some(3));
        assert_eq!(parse_interval("-1"), Some(-1));
        assert_eq!(parse_interval(""), None);
        assert_eq!(parse_interval("abc"), None);
    }

    #[test]
    fn test_weekday_index_monday_first() {
        assert_eq!(weekday_index(parse_date("2024-01-01").unwrap()), 0);
        assert_eq!(weekday_index(parse_date("2024-01-03").unwrap()), 2);
        assert_eq!(weekday_index(parse_date("2024-01-07").unwrap()), 6);
    }

    #[test]
    fn test_weekday_label() {
        let names = WeekdayNames::default();
        assert_eq!(weekday_label(true, Some("2024-01-01"), &names, "–"), "Poniedziałek");
        assert_eq!(weekday_label(true, Some("2024-01-07T10:00"), &names, "–"), "Niedziela");
        assert_eq!(weekday_label(true, Some("not a date"), &names, "–"), "–");
        assert_eq!(weekday_label(true, None, &names, "–"), "–");
        assert_eq!(weekday_label(false, Some("2024-01-01"), &names, "–"), "–");
    }

    #[test]
    fn test_weekday_names_require_seven() {
        let five: Vec<String> = ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect();
        assert!(WeekdayNames::try_from(five).is_err());

        let english: Vec<String> = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let names = WeekdayNames::try_from(english).unwrap();
        assert_eq!(names.label(6), "Sun");
    }

    #[test]
    fn test_toggle_repeat_section() {
        let inputs = RepeatInputs {
            repeat_enabled: false,
            date: "2024-01-01T10:00".to_string(),
            repeat_interval: "1".to_string(),
            repeat_until: "2024-01-15".to_string(),
        };
        let mut section = RepeatSection::new(inputs, WeekdayNames::default(), DEFAULT_PLACEHOLDER);

        let off = section.view();
        assert!(!off.repeat_section_visible);
        assert!(!off.schedule_button_visible);
        assert!(off.fallback_submit_visible);
        assert_eq!(off.occurrence_text, "1");
        assert_eq!(off.weekday_text, DEFAULT_PLACEHOLDER);

        let on = section.toggle_repeat_section(true);
        assert!(on.repeat_section_visible);
        assert!(on.repeat_fields_visible);
        assert!(on.schedule_button_visible);
        assert!(!on.fallback_submit_visible);
        assert_eq!(on.occurrence_text, "3");
        assert_eq!(on.weekday_text, "Poniedziałek");
    }

    #[test]
    fn test_input_recounts() {
        let mut section = RepeatSection::new(
            RepeatInputs {
                repeat_enabled: true,
                ..Default::default()
            },
            WeekdayNames::default(),
            DEFAULT_PLACEHOLDER,
        );

        assert_eq!(section.view().occurrence_text, DEFAULT_PLACEHOLDER);
        section.on_input(RepeatField::Date, "2024-01-01");
        section.on_input(RepeatField::Interval, "1");
        let view = section.on_input(RepeatField::Until, "2024-01-29");
        assert_eq!(view.occurrence_text, "5");

        let view = section.on_input(RepeatField::Interval, "0");
        assert_eq!(view.occurrence_text, DEFAULT_PLACEHOLDER);
    }
}
