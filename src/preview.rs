use std::future::Future;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Prefix of the preview endpoint; the template name is the last segment.
pub const PREVIEW_PATH: &str = "/admin/settings/preview/";

const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Content to render with a template's sample data. Posted as `content=<html>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewRequest {
    #[serde(skip)]
    pub template: String,
    pub content: String,
}

impl PreviewRequest {
    pub fn new(template: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            content: content.into(),
        }
    }

    pub fn path(&self) -> String {
        format!("{}{}", PREVIEW_PATH, utf8_percent_encode(&self.template, PATH_SEGMENT))
    }
}

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("invalid preview address: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("preview request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("preview returned HTTP {0}")]
    Status(u16),
    #[error("preview returned {0} instead of text")]
    NotText(String),
}

/// Renders previews of template content.
pub trait PreviewClient {
    fn render_preview(
        &self,
        request: &PreviewRequest,
    ) -> impl Future<Output = Result<String, PreviewError>> + Send;
}

/// Preview client talking to the admin server over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPreviewClient {
    http: reqwest::Client,
    base: Url,
}

impl HttpPreviewClient {
    pub fn new(base: &str) -> Result<Self, PreviewError> {
        Ok(Self::with_client(reqwest::Client::new(), Url::parse(base)?))
    }

    pub fn with_client(http: reqwest::Client, base: Url) -> Self {
        Self { http, base }
    }
}

impl PreviewClient for HttpPreviewClient {
    async fn render_preview(&self, request: &PreviewRequest) -> Result<String, PreviewError> {
        let url = self.base.join(&request.path())?;
        tracing::debug!(%url, "posting preview");

        let response = self.http.post(url).form(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PreviewError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.is_empty() && !content_type.starts_with("text/") {
            return Err(PreviewError::NotText(content_type));
        }

        Ok(response.text().await?)
    }
}

/// How rendered previews reach the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewDelivery {
    /// Fragment injected into the preview modal's body.
    #[default]
    Modal,
    /// Full document opened in a new tab.
    NewTab,
}

impl PreviewDelivery {
    pub fn present(self, markup: String) -> PreviewPresentation {
        match self {
            PreviewDelivery::Modal => PreviewPresentation::Modal { body: markup },
            PreviewDelivery::NewTab => PreviewPresentation::NewTab { document: markup },
        }
    }
}

/// What the page does with a finished preview request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewPresentation {
    Modal { body: String },
    NewTab { document: String },
    /// Shown inline next to the preview button.
    Error { message: String },
}

impl PreviewPresentation {
    pub fn failed(error: &PreviewError) -> Self {
        PreviewPresentation::Error {
            message: format!("Podgląd niedostępny: {}", error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{header, StatusCode},
        response::IntoResponse,
        routing::post,
        Form, Router,
    };

    #[derive(serde::Deserialize)]
    struct Posted {
        content: String,
    }

    async fn spawn(app: Router) -> HttpPreviewClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        HttpPreviewClient::new(&format!("http://{}", addr)).unwrap()
    }

    #[test]
    fn test_path_encodes_template() {
        assert_eq!(
            PreviewRequest::new("registration", "").path(),
            "/admin/settings/preview/registration"
        );
        assert_eq!(
            PreviewRequest::new("a b/c", "").path(),
            "/admin/settings/preview/a%20b%2Fc"
        );
    }

    #[test]
    fn test_delivery_presents() {
        assert_eq!(
            PreviewDelivery::Modal.present("<p>x</p>".to_string()),
            PreviewPresentation::Modal {
                body: "<p>x</p>".to_string()
            }
        );
        assert_eq!(
            PreviewDelivery::NewTab.present("<html></html>".to_string()),
            PreviewPresentation::NewTab {
                document: "<html></html>".to_string()
            }
        );
    }

    #[test]
    fn test_failed_message_names_cause() {
        let shown = PreviewPresentation::failed(&PreviewError::NotText("application/json".to_string()));
        match shown {
            PreviewPresentation::Error { message } => assert!(message.contains("application/json")),
            other => panic!("unexpected presentation: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_client_posts_form() {
        let app = Router::new().route(
            "/admin/settings/preview/{template}",
            post(
                |axum::extract::Path(template): axum::extract::Path<String>, Form(posted): Form<Posted>| async move {
                    format!("{}:{}", template, posted.content)
                },
            ),
        );
        let client = spawn(app).await;

        let markup = client
            .render_preview(&PreviewRequest::new("registration", "<p>Hi & bye</p>"))
            .await
            .unwrap();
        assert_eq!(markup, "registration:<p>Hi & bye</p>");
    }

    #[tokio::test]
    async fn test_http_client_status_error() {
        let app = Router::new().route(
            "/admin/settings/preview/{template}",
            post(|| async { StatusCode::NOT_FOUND }),
        );
        let client = spawn(app).await;

        let err = client
            .render_preview(&PreviewRequest::new("unknown", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, PreviewError::Status(404)));
    }

    #[tokio::test]
    async fn test_http_client_rejects_non_text() {
        let app = Router::new().route(
            "/admin/settings/preview/{template}",
            post(|| async { ([(header::CONTENT_TYPE, "application/json")], "{}").into_response() }),
        );
        let client = spawn(app).await;

        let err = client
            .render_preview(&PreviewRequest::new("registration", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, PreviewError::NotText(ct) if ct == "application/json"));
    }

    #[tokio::test]
    async fn test_http_client_unreachable() {
        // Port 9 on localhost is discard; nothing listens there in test environments
        let client = HttpPreviewClient::new("http://127.0.0.1:9").unwrap();
        let err = client
            .render_preview(&PreviewRequest::new("registration", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, PreviewError::Transport(_)));
    }
}
