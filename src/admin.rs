use axum::{
    extract::{Path, Query, RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use chrono::NaiveDateTime;
use hypertext::{prelude::*, Raw};
use quick_xml::escape::escape;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, info, warn};
use url::{Position, Url};

use crate::config::{today, AppConfig};
use crate::document::HtmlDocument;
use crate::editor::{
    EditorRegistry, FirstActivation, HiddenField, RawControls, RawTextArea, RichEditor,
};
use crate::preview::PreviewDelivery;
use crate::recurrence::{
    occurrence_dates, parse_date, parse_start, parse_until, weekday_index, RepeatInputs,
    RepeatSection, WeekdayNames,
};
use crate::schedule_url::{build_schedule_url, ScheduleFields};
use crate::series::ScheduleQuery;
use crate::templates::{
    render_template_string, sample_data, EmailTemplates, TemplateKind, TEMPLATE_VARIABLES,
};

/// Application state shared across requests
pub struct AppState {
    pub config: AppConfig,
    pub templates: RwLock<EmailTemplates>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: AppConfig) -> SharedState {
        Arc::new(Self {
            config,
            templates: RwLock::new(EmailTemplates::default()),
        })
    }
}

/// The whole admin application: routes, static files and request tracing.
pub fn app(state: SharedState) -> Router {
    let static_dir = ServeDir::new(&state.config.static_dir);

    Router::new()
        .route("/", get(|| async { Redirect::to("/admin") }))
        .nest("/admin", router())
        .with_state(state)
        .nest_service("/static", static_dir)
        .layer(TraceLayer::new_for_http())
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(admin_root))
        .route("/settings", get(settings_page).post(save_settings))
        .route(
            "/settings/preview/{template}",
            get(preview_stored).post(preview_posted),
        )
        .route("/trainings", get(trainings_page).post(create_training))
        .route("/trainings/schedule", get(schedule_page))
}

// GET /admin
async fn admin_root() -> Redirect {
    Redirect::to("/admin/trainings")
}

// ============================================================================
// Layout
// ============================================================================

fn render_page(title: &str, script: Option<&str>, body: &str) -> String {
    let script_tag = script
        .map(|src| format!(r#"<script src="{}"></script>"#, src))
        .unwrap_or_default();

    maud! {
        !DOCTYPE
        html lang="pl" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) " - Panel administratora" }
                link rel="stylesheet" href="/static/app.css";
            }
            body {
                nav .admin-nav {
                    a href="/admin/trainings" { "Treningi" }
                    " "
                    a href="/admin/settings" { "Ustawienia" }
                }
                main .container {
                    h1 { (title) }
                    (Raw::dangerously_create(body))
                }
                (Raw::dangerously_create(&script_tag))
            }
        }
    }
    .render()
    .into_inner()
}

fn hidden_class(visible: bool) -> &'static str {
    if visible { "" } else { "d-none" }
}

fn render_errors(messages: &[&str]) -> String {
    maud! {
        div .alert.alert-danger {
            ul {
                @for message in messages {
                    li { (message) }
                }
            }
        }
    }
    .render()
    .into_inner()
}

// ============================================================================
// Settings: email templates
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct SettingsQuery {
    #[serde(default)]
    saved: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsForm {
    #[serde(default)]
    registration_template: Option<String>,
    #[serde(default)]
    cancellation_template: Option<String>,
}

// GET /admin/settings
async fn settings_page(
    State(state): State<SharedState>,
    Query(query): Query<SettingsQuery>,
) -> Html<String> {
    let templates = state.templates.read().await.clone();

    let mut registry: EditorRegistry<HtmlDocument> =
        EditorRegistry::new(state.config.first_activation);
    for kind in TemplateKind::ALL {
        let value = templates.get(kind);
        registry.initialize(
            Some(HiddenField::new(kind.field_id(), value)),
            &kind.editor_id(),
            HtmlDocument::default(),
            Some(RawControls {
                textarea: RawTextArea::new(value),
                toggle_checked: false,
            }),
        );
    }

    let editors: Vec<String> = TemplateKind::ALL
        .iter()
        .map(|kind| {
            let rich_html = registry
                .get(&kind.editor_id())
                .map(|binding| binding.editor().html())
                .unwrap_or_default();
            render_template_editor(
                *kind,
                templates.get(*kind),
                &rich_html,
                state.config.first_activation,
            )
        })
        .collect();

    let body = maud! {
        @if query.saved.is_some() {
            div .alert.alert-success { "Zapisano ustawienia." }
        }
        form method="post" action="/admin/settings" {
            (Raw::dangerously_create(&editors.join("\n")))
            div .form-group {
                button .btn.btn-primary type="submit" { "Zapisz" }
            }
        }
        (Raw::dangerously_create(&render_preview_modal()))
    }
    .render()
    .into_inner();

    Html(render_page("Ustawienia", Some("/static/js/email_editor.js"), &body))
}

fn render_template_editor(
    kind: TemplateKind,
    value: &str,
    rich_html: &str,
    first_activation: FirstActivation,
) -> String {
    let field_id = kind.field_id();
    let editor_id = kind.editor_id();
    let textarea_id = format!("{}_textarea", editor_id);
    let toggle_id = format!("{}_html_toggle", editor_id);

    let variable_buttons: Vec<String> = TEMPLATE_VARIABLES
        .iter()
        .map(|(name, label)| {
            format!(
                r#"<button type="button" class="btn btn-sm insert-var" data-editor="{}" data-value="{{{}}}">{}</button>"#,
                editor_id, name, label
            )
        })
        .collect();

    let preview_button = format!(
        r#"<button type="button" class="btn btn-sm preview-btn" data-editor="{}" data-template="{}">Podgląd</button>"#,
        editor_id,
        kind.as_str()
    );

    let toggle = format!(
        r#"<input type="checkbox" class="html-toggle-switch" id="{}" data-editor="{}">"#,
        toggle_id, editor_id
    );

    let rich_editor = format!(
        r#"<div class="rich-editor" id="{}" data-first-activation="{}">{}</div>"#,
        editor_id,
        first_activation.as_str(),
        rich_html
    );

    maud! {
        div .form-group.template-editor {
            label for=(editor_id) { (kind.label()) }
            input type="hidden" id=(field_id) name=(field_id) value=(value);
            div .template-toolbar {
                (Raw::dangerously_create(&variable_buttons.join("\n")))
                (Raw::dangerously_create(&preview_button))
            }
            div .field-row {
                (Raw::dangerously_create(&toggle))
                label for=(toggle_id) { "Edytuj HTML" }
            }
            (Raw::dangerously_create(&rich_editor))
            textarea .form-control.d-none id=(textarea_id) rows="10" { (value) }
        }
    }
    .render()
    .into_inner()
}

fn render_preview_modal() -> String {
    maud! {
        div .modal id="previewModal" tabindex="-1" {
            div .modal-dialog.modal-lg {
                div .modal-content {
                    div .modal-header {
                        h5 .modal-title { "Podgląd wiadomości" }
                    }
                    div .modal-body {}
                }
            }
        }
    }
    .render()
    .into_inner()
}

// POST /admin/settings
async fn save_settings(
    State(state): State<SharedState>,
    Form(form): Form<SettingsForm>,
) -> Redirect {
    let mut templates = state.templates.write().await;
    if let Some(value) = form.registration_template {
        templates.set(TemplateKind::Registration, value);
    }
    if let Some(value) = form.cancellation_template {
        templates.set(TemplateKind::Cancellation, value);
    }
    info!("email templates saved");

    Redirect::to("/admin/settings?saved=1")
}

// ============================================================================
// Preview
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct PreviewForm {
    #[serde(default)]
    content: Option<String>,
}

// GET /admin/settings/preview/{template}
async fn preview_stored(
    State(state): State<SharedState>,
    Path(template): Path<String>,
) -> Response {
    render_preview(&state, &template, None).await
}

// POST /admin/settings/preview/{template}
async fn preview_posted(
    State(state): State<SharedState>,
    Path(template): Path<String>,
    Form(form): Form<PreviewForm>,
) -> Response {
    render_preview(&state, &template, form.content).await
}

async fn render_preview(state: &AppState, template: &str, content: Option<String>) -> Response {
    let source = match content {
        Some(content) => content,
        None => match template.parse::<TemplateKind>() {
            Ok(kind) => state.templates.read().await.get(kind).to_string(),
            Err(err) => {
                warn!(template, "preview of {}", err);
                return StatusCode::NOT_FOUND.into_response();
            }
        },
    };
    debug!(template, "rendering preview");

    let rendered = render_template_string(&source, &sample_data());
    let markup = match state.config.preview_delivery {
        PreviewDelivery::Modal => render_preview_fragment(&rendered),
        PreviewDelivery::NewTab => render_preview_document(&rendered),
    };

    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        markup,
    )
        .into_response()
}

fn render_preview_fragment(rendered: &str) -> String {
    maud! {
        div .email-preview {
            (Raw::dangerously_create(rendered))
        }
    }
    .render()
    .into_inner()
}

fn render_preview_document(rendered: &str) -> String {
    maud! {
        !DOCTYPE
        html lang="pl" {
            head {
                meta charset="utf-8";
                title { "Podgląd wiadomości" }
            }
            body {
                div .email-preview {
                    (Raw::dangerously_create(rendered))
                }
            }
        }
    }
    .render()
    .into_inner()
}

// ============================================================================
// Trainings: single training form with recurrence
// ============================================================================

/// Raw values of the training form. Also accepted as a query to prefill it.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingForm {
    pub date: Option<String>,
    pub location_id: Option<String>,
    pub coach_id: Option<String>,
    pub max_volunteers: Option<String>,
    pub repeat: Option<String>,
    pub repeat_interval: Option<String>,
    pub repeat_until: Option<String>,
}

/// Holds validation errors for the training form
#[derive(Debug, Default, Clone)]
pub struct TrainingErrors {
    pub date: Option<String>,
    pub location_id: Option<String>,
    pub coach_id: Option<String>,
    pub max_volunteers: Option<String>,
    pub repeat_interval: Option<String>,
    pub repeat_until: Option<String>,
}

impl TrainingErrors {
    pub fn has_errors(&self) -> bool {
        !self.messages().is_empty()
    }

    pub fn messages(&self) -> Vec<&str> {
        [
            &self.date,
            &self.location_id,
            &self.coach_id,
            &self.max_volunteers,
            &self.repeat_interval,
            &self.repeat_until,
        ]
        .into_iter()
        .filter_map(|m| m.as_deref())
        .collect()
    }
}

fn value(field: &Option<String>) -> &str {
    field.as_deref().map(str::trim).unwrap_or_default()
}

impl TrainingForm {
    pub fn repeat_enabled(&self) -> bool {
        matches!(value(&self.repeat), "y" | "on" | "true" | "1")
    }

    fn repeat_inputs(&self) -> RepeatInputs {
        RepeatInputs {
            repeat_enabled: self.repeat_enabled(),
            date: value(&self.date).to_string(),
            repeat_interval: value(&self.repeat_interval).to_string(),
            repeat_until: value(&self.repeat_until).to_string(),
        }
    }

    fn schedule_fields(&self) -> ScheduleFields {
        ScheduleFields {
            date: value(&self.date).to_string(),
            repeat_interval: value(&self.repeat_interval).to_string(),
            repeat_until: value(&self.repeat_until).to_string(),
            location_id: value(&self.location_id).to_string(),
            coach_id: value(&self.coach_id).to_string(),
            max_volunteers: value(&self.max_volunteers).to_string(),
        }
    }

    pub fn validate(&self) -> TrainingErrors {
        let mut errors = TrainingErrors::default();

        let start = parse_start(value(&self.date));
        if start.is_none() {
            errors.date = Some("Podaj datę i godzinę treningu.".to_string());
        }

        if !value(&self.location_id).parse::<i64>().is_ok_and(|id| id > 0) {
            errors.location_id = Some("Wybierz miejsce.".to_string());
        }
        if !value(&self.coach_id).parse::<i64>().is_ok_and(|id| id > 0) {
            errors.coach_id = Some("Wybierz trenera.".to_string());
        }

        match value(&self.max_volunteers) {
            "" => errors.max_volunteers = Some("Podaj liczbę miejsc.".to_string()),
            n if !n.parse::<u32>().is_ok_and(|count| (1..=20).contains(&count)) => {
                errors.max_volunteers = Some("Liczba miejsc musi wynosić od 1 do 20.".to_string())
            }
            _ => {}
        }

        if self.repeat_enabled() {
            match value(&self.repeat_interval).parse::<u32>() {
                Ok(w) if (1..=52).contains(&w) => {}
                Ok(_) => {
                    errors.repeat_interval =
                        Some("Odstęp musi wynosić od 1 do 52 tygodni.".to_string())
                }
                Err(_) => {
                    errors.repeat_interval = Some("Podaj odstęp między treningami.".to_string())
                }
            }

            match parse_date(value(&self.repeat_until)) {
                None => {
                    errors.repeat_until = Some("Podaj datę zakończenia powtórzeń.".to_string())
                }
                Some(until) => {
                    if start.is_some_and(|s| until < s.date()) {
                        errors.repeat_until =
                            Some("Data zakończenia musi być późniejsza niż początek.".to_string());
                    }
                }
            }
        }

        errors
    }

    /// Dates of the trainings this form creates. Assumes a valid form.
    pub fn occurrences(&self) -> Vec<NaiveDateTime> {
        let Some(start) = parse_start(value(&self.date)) else {
            return Vec::new();
        };
        if !self.repeat_enabled() {
            return vec![start];
        }

        let interval = value(&self.repeat_interval).parse::<i64>().unwrap_or(1);
        match parse_until(value(&self.repeat_until)) {
            Some(until) => occurrence_dates(start, interval, until),
            None => vec![start],
        }
    }
}

fn request_origin(headers: &HeaderMap) -> Option<Url> {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    Url::parse(&format!("http://{}", host)).ok()
}

// GET /admin/trainings
async fn trainings_page(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(form): Query<TrainingForm>,
) -> Html<String> {
    let body = render_training_form(&state.config, request_origin(&headers).as_ref(), &form, None);
    Html(render_page("Treningi", Some("/static/js/trainings_form.js"), &body))
}

// POST /admin/trainings
async fn create_training(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Form(form): Form<TrainingForm>,
) -> Html<String> {
    let errors = form.validate();
    if errors.has_errors() {
        debug!(errors = ?errors.messages(), "training form rejected");
        let body = render_training_form(
            &state.config,
            request_origin(&headers).as_ref(),
            &form,
            Some(&errors),
        );
        return Html(render_page("Treningi", Some("/static/js/trainings_form.js"), &body));
    }

    let dates = form.occurrences();
    info!(count = dates.len(), "training form accepted");

    let body = render_series_summary(
        &format!("Zaplanowano {} treningów.", dates.len()),
        &dates,
        &state.config.weekday_names,
    );
    Html(render_page("Treningi", None, &body))
}

fn render_training_form(
    config: &AppConfig,
    origin: Option<&Url>,
    form: &TrainingForm,
    errors: Option<&TrainingErrors>,
) -> String {
    let section = RepeatSection::new(
        form.repeat_inputs(),
        config.weekday_names.clone(),
        config.placeholder.clone(),
    );
    let view = section.view();

    // Server-built link for when the script does not run
    let schedule_href = origin
        .and_then(|origin| build_schedule_url(Some(&config.schedule_url), origin, &form.schedule_fields()))
        .map(|url| url[Position::BeforePath..].to_string())
        .unwrap_or_else(|| config.schedule_url.clone());

    let min_date = format!("{}T00:00", today().format("%Y-%m-%d"));
    let max_volunteers = form
        .max_volunteers
        .clone()
        .unwrap_or_else(|| "2".to_string());
    let repeat_interval = form
        .repeat_interval
        .clone()
        .unwrap_or_else(|| "1".to_string());

    let schedule_button = format!(
        r#"<a href="{}" id="schedule-button" class="btn btn-secondary {}" data-schedule-url="{}">Zaplanuj serię</a>"#,
        escape(&schedule_href),
        hidden_class(view.schedule_button_visible),
        escape(&config.schedule_url)
    );

    let fallback_class = format!("btn btn-primary {}", hidden_class(view.fallback_submit_visible));

    let error_html = errors
        .filter(|e| e.has_errors())
        .map(|e| render_errors(&e.messages()))
        .unwrap_or_default();

    maud! {
        (Raw::dangerously_create(&error_html))
        form method="post" action="/admin/trainings" {
            div .form-group {
                label for="date" { "Data i godzina treningu" }
                input
                    type="datetime-local"
                    id="date"
                    name="date"
                    min=(min_date)
                    value=(value(&form.date));
            }
            div .form-group {
                label for="location_id" { "Miejsce" }
                input type="number" id="location_id" name="location_id" min="1" value=(value(&form.location_id));
            }
            div .form-group {
                label for="coach_id" { "Trener" }
                input type="number" id="coach_id" name="coach_id" min="1" value=(value(&form.coach_id));
            }
            div .form-group {
                label for="max_volunteers" { "Liczba miejsc" }
                input
                    type="number"
                    id="max_volunteers"
                    name="max_volunteers"
                    min="1"
                    max="20"
                    value=(max_volunteers);
            }
            div .field-row {
                @if section.inputs().repeat_enabled {
                    input type="checkbox" id="repeat-toggle" name="repeat" value="y" checked;
                } @else {
                    input type="checkbox" id="repeat-toggle" name="repeat" value="y";
                }
                label for="repeat-toggle" { "Powtarzaj" }
            }
            div class=(hidden_class(view.repeat_section_visible)) id="repeat-section" {
                div class=(hidden_class(view.repeat_fields_visible)) id="repeat-fields" {
                    div .form-group {
                        label for="repeat_interval" { "Odstęp (tygodnie)" }
                        input
                            type="number"
                            id="repeat_interval"
                            name="repeat_interval"
                            min="1"
                            max="52"
                            value=(repeat_interval);
                    }
                    div .form-group {
                        label for="repeat_until" { "Powtarzaj do" }
                        input type="date" id="repeat_until" name="repeat_until" value=(value(&form.repeat_until));
                    }
                }
                p .repeat-summary {
                    "Liczba treningów: "
                    strong id="occurrence-count" { (view.occurrence_text) }
                    ", dzień tygodnia: "
                    strong id="weekday-label" { (view.weekday_text) }
                }
            }
            div .form-group {
                (Raw::dangerously_create(&schedule_button))
                button
                    class=(fallback_class)
                    type="submit"
                    id="single-submit-fallback"
                { "Zapisz" }
            }
        }
    }
    .render()
    .into_inner()
}

fn render_series_summary(heading: &str, dates: &[NaiveDateTime], names: &WeekdayNames) -> String {
    let rows: Vec<(String, &str)> = dates
        .iter()
        .map(|d| {
            (
                d.format("%Y-%m-%d %H:%M").to_string(),
                names.label(weekday_index(d.date())),
            )
        })
        .collect();

    maud! {
        div .alert.alert-success { (heading) }
        ul .series-list {
            @for row in &rows {
                li { (row.0) " (" (row.1) ")" }
            }
        }
        a href="/admin/trainings" { "Wróć do treningów" }
    }
    .render()
    .into_inner()
}

// ============================================================================
// Bulk schedule
// ============================================================================

// GET /admin/trainings/schedule
async fn schedule_page(
    State(state): State<SharedState>,
    RawQuery(raw): RawQuery,
) -> Html<String> {
    let query = ScheduleQuery::from_query(raw.as_deref().unwrap_or_default());

    let body = match query.validate() {
        Ok(request) => {
            let dates = request.generate();
            info!(count = dates.len(), interval = request.interval_weeks, "series generated");

            let location = request.location_id.map(|id| id.to_string());
            let coach = request.coach_id.map(|id| id.to_string());

            let details = maud! {
                dl .series-details {
                    @if location.is_some() {
                        dt { "Miejsce" } dd { (location.as_deref().unwrap_or_default()) }
                    }
                    @if coach.is_some() {
                        dt { "Trener" } dd { (coach.as_deref().unwrap_or_default()) }
                    }
                    dt { "Liczba miejsc" } dd { (request.max_volunteers) }
                    dt { "Odstęp (tygodnie)" } dd { (request.interval_weeks) }
                }
            }
            .render()
            .into_inner();

            let summary = render_series_summary(
                &format!("Seria obejmuje {} treningów.", dates.len()),
                &dates,
                &state.config.weekday_names,
            );
            format!("{}{}", details, summary)
        }
        Err(errors) => {
            warn!(errors = ?errors.messages(), "bad schedule query");
            let list = render_errors(&errors.messages());
            format!(
                r#"{}<a href="/admin/trainings">Wróć do treningów</a>"#,
                list
            )
        }
    };

    Html(render_page("Zaplanuj serię treningów", None, &body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use crate::preview::{HttpPreviewClient, PreviewPresentation};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app(config: AppConfig) -> Router {
        app(AppState::new(config))
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        read(response).await
    }

    async fn post_form(app: Router, uri: &str, body: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        read(response).await
    }

    async fn read(response: Response) -> (StatusCode, String) {
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_admin_root_redirects() {
        let response = test_app(AppConfig::default())
            .oneshot(Request::builder().uri("/admin").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/admin/trainings");
    }

    #[tokio::test]
    async fn test_settings_page_has_editor_contract() {
        let (status, page) = get(test_app(AppConfig::default()), "/admin/settings").await;
        assert_eq!(status, StatusCode::OK);

        for id in [
            r#"id="registration_template""#,
            r#"id="cancellation_template""#,
            r#"id="registration_editor""#,
            r#"id="cancellation_editor_textarea""#,
            r#"id="previewModal""#,
        ] {
            assert!(page.contains(id), "missing {}", id);
        }
        assert!(page.contains(r#"class="html-toggle-switch""#));
        assert!(page.contains(r#"data-editor="registration_editor" data-value="{first_name}""#));
        assert!(page.contains(r#"data-template="cancellation""#));
        assert!(page.contains("/static/js/email_editor.js"));
        assert!(page.contains(r#"data-first-activation="seed_from_field""#));
    }

    #[tokio::test]
    async fn test_save_settings_then_preview_stored() {
        let app = test_app(AppConfig::default());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/admin/settings")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(
                        "registration_template=%3Cp%3EWitaj+%7Bfirst_name%7D%3C%2Fp%3E&cancellation_template=bye",
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let (status, body) = get(app.clone(), "/admin/settings/preview/registration").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<p>Witaj Jan</p>"));

        let (_, page) = get(app, "/admin/settings?saved=1").await;
        assert!(page.contains("Zapisano ustawienia."));
    }

    #[tokio::test]
    async fn test_preview_posted_content() {
        let (status, body) = post_form(
            test_app(AppConfig::default()),
            "/admin/settings/preview/registration",
            "content=%3Cp%3E%7Bfirst_name%7D+%7Blast_name%7D%3C%2Fp%3E",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            r#"<div class="email-preview"><p>Jan Kowalski</p></div>"#
        );
    }

    #[tokio::test]
    async fn test_preview_unknown_template() {
        let (status, _) = get(test_app(AppConfig::default()), "/admin/settings/preview/reminder").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // Posted content does not need a known template
        let (status, body) = post_form(
            test_app(AppConfig::default()),
            "/admin/settings/preview/reminder",
            "content=%7Bdate%7D",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("2024-01-01 10:00"));
    }

    #[tokio::test]
    async fn test_preview_new_tab_is_full_document() {
        let config = AppConfig {
            preview_delivery: PreviewDelivery::NewTab,
            ..AppConfig::default()
        };
        let (_, body) = post_form(test_app(config), "/admin/settings/preview/cancellation", "content=x").await;
        assert!(body.starts_with("<!DOCTYPE html>"));
        assert!(body.contains("<title>Podgląd wiadomości</title>"));
    }

    #[tokio::test]
    async fn test_trainings_form_without_repeat() {
        let (status, page) = get(test_app(AppConfig::default()), "/admin/trainings").await;
        assert_eq!(status, StatusCode::OK);
        assert!(page.contains(r#"class="d-none" id="repeat-section""#));
        assert!(page.contains(r#"<strong id="occurrence-count">1</strong>"#));
        assert!(page.contains(r#"<strong id="weekday-label">–</strong>"#));
        assert!(page.contains(r#"data-schedule-url="/admin/trainings/schedule""#));
        assert!(page.contains(r#"value="2""#));
    }

    #[tokio::test]
    async fn test_trainings_form_prefilled_with_repeat() {
        let (_, page) = get(
            test_app(AppConfig::default()),
            "/admin/trainings?date=2024-01-01T14:30&repeat=y&repeat_interval=1&repeat_until=2024-01-15&location_id=3",
        )
        .await;
        assert!(page.contains(r#"class="" id="repeat-section""#));
        assert!(page.contains(r#"<strong id="occurrence-count">3</strong>"#));
        assert!(page.contains(r#"<strong id="weekday-label">Poniedziałek</strong>"#));
        assert!(page.contains(
            "/admin/trainings/schedule?start_date=2024-01-01&amp;days=0&amp;start_time=14:30&amp;interval_weeks=1&amp;end_date=2024-01-15&amp;location_id=3"
        ));
    }

    #[tokio::test]
    async fn test_schedule_url_escaped_in_button() {
        let config = AppConfig {
            schedule_url: r#"/admin/trainings/schedule?source=form&label="x""#.to_string(),
            ..AppConfig::default()
        };
        let (_, page) = get(test_app(config), "/admin/trainings").await;
        assert!(page.contains(
            r#"data-schedule-url="/admin/trainings/schedule?source=form&amp;label=&quot;x&quot;""#
        ));
        assert!(!page.contains(r#"label="x""#));
        assert!(!page.contains("source=form&label"));
    }

    #[tokio::test]
    async fn test_browser_scripts_served() {
        let config = AppConfig {
            static_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("static"),
            ..AppConfig::default()
        };
        for script in ["email_editor.js", "trainings_form.js"] {
            let (status, body) = get(test_app(config.clone()), &format!("/static/js/{}", script)).await;
            assert_eq!(status, StatusCode::OK, "{}", script);
            assert!(body.contains("DOMContentLoaded"), "{}", script);
        }

        let (_, settings) = get(test_app(config.clone()), "/admin/settings").await;
        assert!(settings.contains("/static/js/email_editor.js"));
        let (_, trainings) = get(test_app(config), "/admin/trainings").await;
        assert!(trainings.contains("/static/js/trainings_form.js"));
    }

    #[tokio::test]
    async fn test_create_training_validation() {
        let (_, page) = post_form(
            test_app(AppConfig::default()),
            "/admin/trainings",
            "date=2024-01-10T18:00&location_id=1&coach_id=2&repeat=y&repeat_interval=1&repeat_until=2024-01-01",
        )
        .await;
        assert!(page.contains("Data zakończenia musi być późniejsza niż początek."));

        let (_, page) = post_form(
            test_app(AppConfig::default()),
            "/admin/trainings",
            "date=2024-01-10T18:00&repeat=y&repeat_interval=",
        )
        .await;
        assert!(page.contains("Wybierz miejsce."));
        assert!(page.contains("Podaj odstęp między treningami."));
        assert!(page.contains("Podaj datę zakończenia powtórzeń."));
    }

    #[tokio::test]
    async fn test_create_training_lists_dates() {
        let (_, page) = post_form(
            test_app(AppConfig::default()),
            "/admin/trainings",
            "date=2024-01-01T18:00&location_id=1&coach_id=2&max_volunteers=4&repeat=y&repeat_interval=2&repeat_until=2024-01-31",
        )
        .await;
        assert!(page.contains("Zaplanowano 3 treningów."));
        assert!(page.contains("2024-01-15 18:00 (Poniedziałek)"));
        assert!(page.contains("2024-01-29 18:00"));
    }

    #[test]
    fn test_max_volunteers_required_and_bounded() {
        let mut form = TrainingForm {
            date: Some("2024-01-01T10:00".to_string()),
            location_id: Some("1".to_string()),
            coach_id: Some("1".to_string()),
            max_volunteers: Some(String::new()),
            ..TrainingForm::default()
        };
        let errors = form.validate();
        assert!(errors.has_errors());
        assert_eq!(errors.max_volunteers.as_deref(), Some("Podaj liczbę miejsc."));

        form.max_volunteers = None;
        assert!(form.validate().max_volunteers.is_some());

        form.max_volunteers = Some("21".to_string());
        assert_eq!(
            form.validate().max_volunteers.as_deref(),
            Some("Liczba miejsc musi wynosić od 1 do 20.")
        );

        form.max_volunteers = Some("2".to_string());
        assert!(!form.validate().has_errors());
    }

    #[test]
    fn test_single_training_occurrences() {
        let form = TrainingForm {
            date: Some("2024-01-05T18:00".to_string()),
            repeat_interval: Some("1".to_string()),
            repeat_until: Some("2024-03-01".to_string()),
            ..TrainingForm::default()
        };
        assert!(!form.repeat_enabled());
        assert_eq!(form.occurrences().len(), 1);
    }

    #[tokio::test]
    async fn test_schedule_page_generates_series() {
        let (status, page) = get(
            test_app(AppConfig::default()),
            "/admin/trainings/schedule?start_date=2024-01-01&days=0&days=2&start_time=14:30&interval_weeks=1&end_date=2024-01-10&coach_id=7",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(page.contains("Seria obejmuje 4 treningów."));
        assert!(page.contains("2024-01-03 14:30 (Środa)"));
        assert!(page.contains("<dt>Trener</dt><dd>7</dd>"));
    }

    #[tokio::test]
    async fn test_schedule_page_reports_errors() {
        let (_, page) = get(
            test_app(AppConfig::default()),
            "/admin/trainings/schedule?start_date=2024-01-01&days=0&interval_weeks=99",
        )
        .await;
        assert!(page.contains("Podaj godzinę startu."));
        assert!(page.contains("Interwał musi wynosić od 1 do 52 tygodni."));
        assert!(page.contains("Podaj datę końcową lub liczbę powtórzeń."));
    }

    #[tokio::test]
    async fn test_editor_preview_against_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = test_app(AppConfig::default());
        tokio::spawn(async move {
            axum::serve(listener, server).await.unwrap();
        });
        let client = HttpPreviewClient::new(&format!("http://{}", addr)).unwrap();

        let mut registry = EditorRegistry::new(FirstActivation::SeedFromField);
        registry.initialize(
            Some(HiddenField::new("registration_template", "<p>Cześć </p>")),
            "registration_editor",
            HtmlDocument::default(),
            None,
        );
        registry.insert_variable("registration_editor", "{first_name}");

        let shown = registry
            .request_preview("registration_editor", "registration", &client, PreviewDelivery::Modal)
            .await;
        match shown {
            Some(PreviewPresentation::Modal { body }) => assert!(body.contains("Jan"), "{}", body),
            other => panic!("unexpected presentation: {:?}", other),
        }
    }
}
