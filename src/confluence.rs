//! Confluence REST client for creating or updating the results page.
//!
//! One [`Client`] is one authenticated session. It looks the target page up by
//! space and title, then issues exactly one write: a `PUT` with the next version
//! number when the page exists, a `POST` otherwise. Nothing is retried.

use std::time::Duration;

use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{Instrument, Span, debug, info, info_span};

use crate::error::PublishError;
use crate::render::PageBody;
use crate::settings::Settings;

/// Remote error bodies are cut to this many characters in [`PublishError::Remote`].
const MAX_ERROR_MESSAGE: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Created { id: String },
    Updated { id: String, version: u64 },
}

// --- REST payloads ---

#[derive(Debug, Deserialize)]
struct ContentSearch {
    #[serde(default)]
    results: Vec<ContentRef>,
}

#[derive(Debug, Deserialize)]
struct ContentRef {
    id: String,
    #[serde(default)]
    version: Option<VersionRef>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VersionRef {
    number: u64,
}

#[derive(Debug, Serialize)]
struct ContentWrite<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(rename = "type")]
    kind: &'static str,
    title: &'a str,
    space: SpaceKey<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ancestors: Vec<Ancestor<'a>>,
    body: ContentBody<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<VersionRef>,
}

#[derive(Debug, Serialize)]
struct SpaceKey<'a> {
    key: &'a str,
}

#[derive(Debug, Serialize)]
struct Ancestor<'a> {
    id: &'a str,
}

#[derive(Debug, Serialize)]
struct ContentBody<'a> {
    storage: Storage<'a>,
}

#[derive(Debug, Serialize)]
struct Storage<'a> {
    value: &'a str,
    representation: &'static str,
}

#[derive(Debug, Deserialize)]
struct CreatedContent {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RemoteMessage {
    message: String,
}

// --- Client ---

/// An open, authenticated session against one Confluence site.
pub struct Client {
    http: reqwest::Client,
    settings: Settings,
    span: Span,
}

impl Client {
    /// Build the HTTP session. No request is made until [`Client::publish`].
    pub fn open(settings: &Settings) -> Result<Self, PublishError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(PublishError::Client)?;
        let span = info_span!(
            "confluence",
            site = %settings.url,
            space = %settings.space,
            title = %settings.page.title
        );
        span.in_scope(|| debug!(timeout_secs = settings.timeout_secs, "session opened"));
        Ok(Self {
            http,
            settings: settings.clone(),
            span,
        })
    }

    /// Create the configured page, or update it when it already exists.
    pub async fn publish(&self, body: &PageBody) -> Result<PublishOutcome, PublishError> {
        self.publish_inner(body).instrument(self.span.clone()).await
    }

    /// Release the session and its pooled connections.
    pub fn close(self) {
        self.span.in_scope(|| debug!("session closed"));
    }

    async fn publish_inner(&self, body: &PageBody) -> Result<PublishOutcome, PublishError> {
        let title = &self.settings.page.title;
        match self.find_page(title).await? {
            Some(existing) => {
                let current = existing.version.map(|v| v.number).unwrap_or(0);
                let version = self.update_page(&existing.id, current + 1, body).await?;
                info!(id = %existing.id, version, "page updated");
                Ok(PublishOutcome::Updated {
                    id: existing.id,
                    version,
                })
            }
            None => {
                let parent_id = match &self.settings.page.parent {
                    Some(parent) => match self.find_page(parent).await? {
                        Some(page) => Some(page.id),
                        None => {
                            return Err(PublishError::ParentNotFound {
                                space: self.settings.space.clone(),
                                title: parent.clone(),
                            });
                        }
                    },
                    None => None,
                };
                let id = self.create_page(parent_id.as_deref(), body).await?;
                info!(%id, "page created");
                Ok(PublishOutcome::Created { id })
            }
        }
    }

    fn content_url(&self) -> String {
        format!("{}/rest/api/content", self.settings.url)
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.basic_auth(
            &self.settings.credential.username,
            Some(&self.settings.credential.token),
        )
    }

    async fn find_page(&self, title: &str) -> Result<Option<ContentRef>, PublishError> {
        let url = self.content_url();
        debug!(%title, "looking up page");
        let response = self
            .authed(self.http.get(&url))
            .query(&[
                ("spaceKey", self.settings.space.as_str()),
                ("title", title),
                ("expand", "version"),
            ])
            .send()
            .await
            .map_err(|source| PublishError::Transport {
                method: "GET",
                url: url.clone(),
                source,
            })?;
        let response = check_status("GET", &url, response).await?;
        let search: ContentSearch = decode(&url, response).await?;
        Ok(search.results.into_iter().next())
    }

    async fn create_page(
        &self,
        parent_id: Option<&str>,
        body: &PageBody,
    ) -> Result<String, PublishError> {
        let url = self.content_url();
        let payload = ContentWrite {
            id: None,
            kind: "page",
            title: &self.settings.page.title,
            space: SpaceKey {
                key: &self.settings.space,
            },
            ancestors: parent_id.map(|id| Ancestor { id }).into_iter().collect(),
            body: storage(body),
            version: None,
        };
        debug!(parent = ?parent_id, bytes = body.as_str().len(), "creating page");
        let response = self
            .authed(self.http.post(&url))
            .json(&payload)
            .send()
            .await
            .map_err(|source| PublishError::Transport {
                method: "POST",
                url: url.clone(),
                source,
            })?;
        let response = check_status("POST", &url, response).await?;
        let created: CreatedContent = decode(&url, response).await?;
        Ok(created.id)
    }

    async fn update_page(
        &self,
        id: &str,
        version: u64,
        body: &PageBody,
    ) -> Result<u64, PublishError> {
        let url = format!("{}/{}", self.content_url(), id);
        let payload = ContentWrite {
            id: Some(id),
            kind: "page",
            title: &self.settings.page.title,
            space: SpaceKey {
                key: &self.settings.space,
            },
            ancestors: Vec::new(),
            body: storage(body),
            version: Some(VersionRef { number: version }),
        };
        debug!(%id, version, bytes = body.as_str().len(), "updating page");
        let response = self
            .authed(self.http.put(&url))
            .json(&payload)
            .send()
            .await
            .map_err(|source| PublishError::Transport {
                method: "PUT",
                url: url.clone(),
                source,
            })?;
        check_status("PUT", &url, response).await?;
        Ok(version)
    }
}

/// Open a session, publish once, and close the session whatever the outcome.
pub async fn publish_page(
    settings: &Settings,
    body: &PageBody,
) -> Result<PublishOutcome, PublishError> {
    let client = Client::open(settings)?;
    let result = client.publish(body).await;
    client.close();
    result
}

fn storage(body: &PageBody) -> ContentBody<'_> {
    ContentBody {
        storage: Storage {
            value: body.as_str(),
            representation: "storage",
        },
    }
}

async fn check_status(
    method: &'static str,
    url: &str,
    response: Response,
) -> Result<Response, PublishError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(PublishError::Auth {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<RemoteMessage>(&text)
        .map(|m| m.message)
        .unwrap_or(text);
    Err(PublishError::Remote {
        method,
        url: url.to_string(),
        status: status.as_u16(),
        message: message.chars().take(MAX_ERROR_MESSAGE).collect(),
    })
}

async fn decode<T: serde::de::DeserializeOwned>(
    url: &str,
    response: Response,
) -> Result<T, PublishError> {
    response.json::<T>().await.map_err(|e| PublishError::Response {
        url: url.to_string(),
        message: e.to_string(),
    })
}
