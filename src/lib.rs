pub mod admin;
pub mod config;
pub mod document;
pub mod editor;
pub mod preview;
pub mod recurrence;
pub mod schedule_url;
pub mod series;
pub mod templates;
