use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

use crate::recurrence::{parse_date, split_date_time, weekday_index};

// Unreserved characters plus ':' so times read as "14:30"
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b':');

/// Values of the training form inputs that feed the bulk-schedule link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleFields {
    pub date: String,
    pub repeat_interval: String,
    pub repeat_until: String,
    pub location_id: String,
    pub coach_id: String,
    pub max_volunteers: String,
}

/// Ordered query parameters with `set`/`append` semantics of a search-params list.
struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    fn from_url(url: &Url) -> Self {
        Self(
            url.query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        )
    }

    /// Replace the first `key` in place and drop any later ones, or append.
    fn set(&mut self, key: &str, value: &str) {
        match self.0.iter().position(|(k, _)| k == key) {
            Some(first) => {
                self.0[first].1 = value.to_string();
                let mut index = 0;
                self.0.retain(|(k, _)| {
                    let keep = k != key || index == first;
                    index += 1;
                    keep
                });
            }
            None => self.append(key, value),
        }
    }

    fn append(&mut self, key: &str, value: &str) {
        self.0.push((key.to_string(), value.to_string()));
    }

    fn encode(&self) -> Option<String> {
        if self.0.is_empty() {
            return None;
        }

        Some(
            self.0
                .iter()
                .map(|(k, v)| {
                    format!(
                        "{}={}",
                        utf8_percent_encode(k, QUERY_VALUE),
                        utf8_percent_encode(v, QUERY_VALUE)
                    )
                })
                .collect::<Vec<_>>()
                .join("&"),
        )
    }
}

fn filled(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

/// Build the bulk-schedule target from the button's `data-schedule-url` and the form inputs.
///
/// `origin` may be any URL of the site; only its scheme, host and port are
/// used. Returns `None` when the button carries no URL or it cannot be
/// resolved.
pub fn build_schedule_url(
    data_schedule_url: Option<&str>,
    origin: &Url,
    fields: &ScheduleFields,
) -> Option<Url> {
    let base = data_schedule_url.and_then(filled)?;
    // Relative addresses resolve against the site root, never the page path
    let root = origin.join("/").ok()?;
    let mut url = root.join(base).ok()?;
    let mut params = QueryParams::from_url(&url);

    if let Some(start) = filled(&fields.date) {
        let (date_part, time_part) = split_date_time(start);
        if !date_part.is_empty() {
            params.set("start_date", date_part);
            if let Some(date) = parse_date(date_part) {
                params.append("days", &weekday_index(date).to_string());
            }
        }
        if let Some(time) = time_part.filter(|t| !t.is_empty()) {
            params.set("start_time", time);
        }
    }

    let optional = [
        ("interval_weeks", &fields.repeat_interval),
        ("end_date", &fields.repeat_until),
        ("location_id", &fields.location_id),
        ("coach_id", &fields.coach_id),
        ("max_volunteers", &fields.max_volunteers),
    ];
    for (key, value) in optional {
        if let Some(value) = filled(value) {
            params.set(key, value);
        }
    }

    url.set_query(params.encode().as_deref());
    Some(url)
}

/// Outcome of clicking the schedule button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleClick {
    /// Default navigation is suppressed and the browser goes here instead.
    Navigate(Url),
    /// Nothing to build; the button behaves normally.
    Default,
}

pub fn on_schedule_click(
    data_schedule_url: Option<&str>,
    origin: &Url,
    fields: &ScheduleFields,
) -> ScheduleClick {
    match build_schedule_url(data_schedule_url, origin, fields) {
        Some(url) => {
            tracing::debug!(%url, "redirecting to bulk schedule");
            ScheduleClick::Navigate(url)
        }
        None => ScheduleClick::Default,
    }
}
