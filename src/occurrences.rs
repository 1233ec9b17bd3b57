//! Occurrence calculator for recurring trainings.
//!
//! Usage: cargo run --bin occurrences -- --start 2024-01-01T14:30 --interval 1 --until 2024-02-01
//!        cargo run --bin occurrences -- --start 2024-01-01T14:30 --interval 2 --until 2024-03-01 --list
//!        cargo run --bin occurrences -- --start 2024-01-01T14:30 --interval 1 --until 2024-02-01 \
//!            --schedule-url /admin/trainings/schedule --origin http://localhost:3000 --coach-id 3
//!
//! Prints how many trainings the series creates, the weekday it runs on and,
//! when a schedule URL is given, the bulk-schedule link the form would follow.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use url::Url;

use trainings::config::AppConfig;
use trainings::recurrence::{
    compute_occurrences, occurrence_dates, parse_interval, parse_start, parse_until,
    weekday_index, weekday_label,
};
use trainings::schedule_url::{build_schedule_url, ScheduleFields};

#[derive(Parser, Debug)]
#[command(name = "occurrences")]
#[command(about = "Count the trainings a weekly recurrence produces")]
struct Args {
    /// Start of the series, YYYY-MM-DD or YYYY-MM-DDTHH:MM
    #[arg(long)]
    start: Option<String>,

    /// Weeks between trainings
    #[arg(long)]
    interval: Option<String>,

    /// Last day of the series (inclusive), YYYY-MM-DD
    #[arg(long)]
    until: Option<String>,

    /// Treat the training as a one-off
    #[arg(long)]
    no_repeat: bool,

    /// Print every date of the series
    #[arg(long)]
    list: bool,

    /// Bulk-schedule address to build a link for
    #[arg(long)]
    schedule_url: Option<String>,

    /// Origin the schedule address is resolved against
    #[arg(long, default_value = "http://localhost:3000")]
    origin: String,

    #[arg(long)]
    location_id: Option<String>,

    #[arg(long)]
    coach_id: Option<String>,

    #[arg(long)]
    max_volunteers: Option<String>,

    /// Config file for weekday names and placeholder (default: trainings.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref())?;

    let repeat = !args.no_repeat;
    let start = args.start.as_deref();
    let interval = args.interval.as_deref().and_then(parse_interval);

    let count = compute_occurrences(repeat, start, interval, args.until.as_deref())
        .map(|n| n.to_string())
        .unwrap_or_else(|| config.placeholder.clone());
    let weekday = weekday_label(repeat, start, &config.weekday_names, &config.placeholder);

    println!("Occurrences: {}", count);
    println!("Weekday: {}", weekday);

    if args.list {
        let first = start.and_then(parse_start);
        let dates = match (first, repeat, interval, args.until.as_deref().and_then(parse_until)) {
            (Some(first), true, Some(weeks), Some(until)) => occurrence_dates(first, weeks, until),
            (Some(first), false, _, _) => vec![first],
            _ => Vec::new(),
        };
        for date in &dates {
            println!(
                "  {} ({})",
                date.format("%Y-%m-%d %H:%M"),
                config.weekday_names.label(weekday_index(date.date()))
            );
        }
    }

    if let Some(schedule_url) = args.schedule_url.as_deref() {
        let origin = Url::parse(&args.origin)
            .with_context(|| format!("invalid origin '{}'", args.origin))?;
        let fields = ScheduleFields {
            date: args.start.clone().unwrap_or_default(),
            repeat_interval: args.interval.clone().unwrap_or_default(),
            repeat_until: args.until.clone().unwrap_or_default(),
            location_id: args.location_id.clone().unwrap_or_default(),
            coach_id: args.coach_id.clone().unwrap_or_default(),
            max_volunteers: args.max_volunteers.clone().unwrap_or_default(),
        };

        match build_schedule_url(Some(schedule_url), &origin, &fields) {
            Some(url) => println!("Schedule: {}", url),
            None => println!("Schedule: {}", config.placeholder),
        }
    }

    Ok(())
}
