use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};

use crate::recurrence::{parse_date, weekday_index};

/// Upper bound on trainings created by one bulk-schedule request.
pub const MAX_OCCURRENCES: usize = 500;

// ============================================================================
// Query
// ============================================================================

/// Raw parameters of a bulk-schedule request, as built by the training form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleQuery {
    pub start_date: Option<String>,
    pub start_time: Option<String>,
    pub days: Vec<String>,
    pub interval_weeks: Option<String>,
    pub end_date: Option<String>,
    pub occurrences: Option<String>,
    pub location_id: Option<String>,
    pub coach_id: Option<String>,
    pub max_volunteers: Option<String>,
}

impl ScheduleQuery {
    /// Parse a query string; `days` may repeat, other keys keep their last value.
    pub fn from_query(raw: &str) -> Self {
        let mut query = Self::default();
        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            let value = value.trim().to_string();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "start_date" => query.start_date = Some(value),
                "start_time" => query.start_time = Some(value),
                "days" => query.days.push(value),
                "interval_weeks" => query.interval_weeks = Some(value),
                "end_date" => query.end_date = Some(value),
                "occurrences" => query.occurrences = Some(value),
                "location_id" => query.location_id = Some(value),
                "coach_id" => query.coach_id = Some(value),
                "max_volunteers" => query.max_volunteers = Some(value),
                _ => {}
            }
        }
        query
    }

    pub fn validate(&self) -> Result<ScheduleRequest, ScheduleErrors> {
        let mut errors = ScheduleErrors::default();

        let start_date = match self.start_date.as_deref().map(parse_date) {
            Some(Some(date)) => Some(date),
            Some(None) => {
                errors.start_date = Some("Nieprawidłowa data początkowa.".to_string());
                None
            }
            None => {
                errors.start_date = Some("Podaj datę początkową.".to_string());
                None
            }
        };

        let start_time = match self
            .start_time
            .as_deref()
            .map(|t| {
                NaiveTime::parse_from_str(t, "%H:%M")
                    .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M:%S"))
            })
        {
            Some(Ok(time)) => Some(time),
            Some(Err(_)) => {
                errors.start_time = Some("Nieprawidłowa godzina startu.".to_string());
                None
            }
            None => {
                errors.start_time = Some("Podaj godzinę startu.".to_string());
                None
            }
        };

        let mut days: Vec<u8> = Vec::new();
        for day in &self.days {
            match day.parse::<u8>() {
                Ok(d) if d <= 6 => days.push(d),
                _ => errors.days = Some(format!("Nieprawidłowy dzień tygodnia: '{}'.", day)),
            }
        }
        days.sort();
        days.dedup();
        if days.is_empty() && errors.days.is_none() {
            errors.days = Some("Wybierz co najmniej jeden dzień.".to_string());
        }

        let interval_weeks = match self.interval_weeks.as_deref() {
            None => Some(1),
            Some(raw) => match raw.parse::<u32>() {
                Ok(w) if (1..=52).contains(&w) => Some(w),
                _ => {
                    errors.interval_weeks = Some("Interwał musi wynosić od 1 do 52 tygodni.".to_string());
                    None
                }
            },
        };

        let end_date = match self.end_date.as_deref().map(parse_date) {
            Some(Some(date)) => Some(date),
            Some(None) => {
                errors.end = Some("Nieprawidłowa data końcowa.".to_string());
                None
            }
            None => None,
        };

        let occurrences = match self.occurrences.as_deref() {
            None => None,
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if (1..=MAX_OCCURRENCES).contains(&n) => Some(n),
                _ => {
                    errors.end = Some(format!(
                        "Liczba powtórzeń musi wynosić od 1 do {}.",
                        MAX_OCCURRENCES
                    ));
                    None
                }
            },
        };

        if errors.end.is_none() && end_date.is_none() && occurrences.is_none() {
            errors.end = Some("Podaj datę końcową lub liczbę powtórzeń.".to_string());
        }
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if end < start {
                errors.end = Some("Data końcowa musi być późniejsza od początkowej.".to_string());
            }
        }

        let location_id = parse_id(self.location_id.as_deref(), "miejsca", &mut errors.location_id);
        let coach_id = parse_id(self.coach_id.as_deref(), "trenera", &mut errors.coach_id);

        let max_volunteers = match self.max_volunteers.as_deref() {
            None => Some(2),
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) if (1..=20).contains(&n) => Some(n),
                _ => {
                    errors.max_volunteers =
                        Some("Limit wolontariuszy musi wynosić od 1 do 20.".to_string());
                    None
                }
            },
        };

        if errors.has_errors() {
            return Err(errors);
        }

        match (start_date, start_time, interval_weeks, max_volunteers) {
            (Some(start_date), Some(start_time), Some(interval_weeks), Some(max_volunteers)) => {
                Ok(ScheduleRequest {
                    start_date,
                    start_time,
                    days,
                    interval_weeks,
                    end_date,
                    occurrences,
                    location_id,
                    coach_id,
                    max_volunteers,
                })
            }
            _ => Err(errors),
        }
    }
}

fn parse_id(raw: Option<&str>, what: &str, error: &mut Option<String>) -> Option<i64> {
    let raw = raw?;
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Some(id),
        _ => {
            *error = Some(format!("Nieprawidłowy identyfikator {}.", what));
            None
        }
    }
}

/// Holds validation errors for the schedule request
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScheduleErrors {
    pub start_date: Option<String>,
    pub start_time: Option<String>,
    pub days: Option<String>,
    pub interval_weeks: Option<String>,
    pub end: Option<String>,
    pub location_id: Option<String>,
    pub coach_id: Option<String>,
    pub max_volunteers: Option<String>,
}

impl ScheduleErrors {
    pub fn has_errors(&self) -> bool {
        !self.messages().is_empty()
    }

    pub fn messages(&self) -> Vec<&str> {
        [
            &self.start_date,
            &self.start_time,
            &self.days,
            &self.interval_weeks,
            &self.end,
            &self.location_id,
            &self.coach_id,
            &self.max_volunteers,
        ]
        .into_iter()
        .filter_map(|m| m.as_deref())
        .collect()
    }
}

// ============================================================================
// Series
// ============================================================================

/// A validated bulk-schedule request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRequest {
    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    /// Weekdays with Monday = 0, sorted
    pub days: Vec<u8>,
    pub interval_weeks: u32,
    pub end_date: Option<NaiveDate>,
    pub occurrences: Option<usize>,
    pub location_id: Option<i64>,
    pub coach_id: Option<i64>,
    pub max_volunteers: u32,
}

impl ScheduleRequest {
    /// Dated trainings of the series, in order.
    ///
    /// Walks weeks from the Monday of the start week, `interval_weeks` at a
    /// time, emitting the selected weekdays that fall on or after the start
    /// date and on or before the end date.
    pub fn generate(&self) -> Vec<NaiveDateTime> {
        let limit = self
            .occurrences
            .unwrap_or(MAX_OCCURRENCES)
            .min(MAX_OCCURRENCES);
        let step = Days::new(u64::from(self.interval_weeks) * 7);

        let mut dates = Vec::new();
        let Some(mut week) = self
            .start_date
            .checked_sub_days(Days::new(u64::from(weekday_index(self.start_date))))
        else {
            return dates;
        };

        loop {
            for &day in &self.days {
                let Some(date) = week.checked_add_days(Days::new(u64::from(day))) else {
                    return dates;
                };
                if date < self.start_date {
                    continue;
                }
                if self.end_date.is_some_and(|end| date > end) {
                    return dates;
                }
                dates.push(date.and_time(self.start_time));
                if dates.len() >= limit {
                    return dates;
                }
            }

            match week.checked_add_days(step) {
                Some(next) => week = next,
                None => return dates,
            }
        }
    }
}
