use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").expect("placeholder pattern is valid"));

/// Replace `{name}` placeholders with values from `data`.
/// Placeholders without a value are left as they are.
pub fn render_template_string(template: &str, data: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            data.get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Placeholders offered by the insert buttons, with their labels.
pub const TEMPLATE_VARIABLES: &[(&str, &str)] = &[
    ("first_name", "Imię"),
    ("last_name", "Nazwisko"),
    ("training", "Trening"),
    ("date", "Data"),
    ("location", "Miejsce"),
    ("cancel_link", "Link do rezygnacji"),
];

/// Made-up volunteer data used for previews.
pub fn sample_data() -> HashMap<String, String> {
    [
        ("first_name", "Jan"),
        ("last_name", "Kowalski"),
        ("training", "2024-01-01 10:00 w Warszawie"),
        ("cancel_link", "https://example.com/cancel"),
        ("date", "2024-01-01 10:00"),
        ("location", "Warszawa"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    Registration,
    Cancellation,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 2] = [TemplateKind::Registration, TemplateKind::Cancellation];

    pub fn as_str(self) -> &'static str {
        match self {
            TemplateKind::Registration => "registration",
            TemplateKind::Cancellation => "cancellation",
        }
    }

    /// Id of the hidden form field holding this template.
    pub fn field_id(self) -> String {
        format!("{}_template", self.as_str())
    }

    /// Id of the rich-text editor container for this template.
    pub fn editor_id(self) -> String {
        format!("{}_editor", self.as_str())
    }

    pub fn label(self) -> &'static str {
        match self {
            TemplateKind::Registration => "Potwierdzenie zapisu",
            TemplateKind::Cancellation => "Potwierdzenie rezygnacji",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registration" => Ok(TemplateKind::Registration),
            "cancellation" => Ok(TemplateKind::Cancellation),
            other => Err(format!("unknown template '{}'", other)),
        }
    }
}

/// The email templates edited on the settings page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailTemplates {
    pub registration: String,
    pub cancellation: String,
}

impl Default for EmailTemplates {
    fn default() -> Self {
        Self {
            registration: "<p>Cześć {first_name},</p>\
                <p>dziękujemy za zapis na trening {training}.</p>\
                <p>Jeśli nie możesz przyjść, <a href=\"{cancel_link}\">zrezygnuj tutaj</a>.</p>"
                .to_string(),
            cancellation: "<p>Cześć {first_name},</p>\
                <p>Twój zapis na trening {date} ({location}) został anulowany.</p>"
                .to_string(),
        }
    }
}

impl EmailTemplates {
    pub fn get(&self, kind: TemplateKind) -> &str {
        match kind {
            TemplateKind::Registration => &self.registration,
            TemplateKind::Cancellation => &self.cancellation,
        }
    }

    pub fn set(&mut self, kind: TemplateKind, value: String) {
        match kind {
            TemplateKind::Registration => self.registration = value,
            TemplateKind::Cancellation => self.cancellation = value,
        }
    }
}
