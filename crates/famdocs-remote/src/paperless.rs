//! Paperless-ngx document archive.
//!
//! Authenticates with a username and password once, caches the API token,
//! and drops it again whenever the server answers 401.

use std::time::Duration;

use famdocs_core::{
  document::ArchiveRef,
  services::{ArchiveUpload, DocumentArchive},
};
use reqwest::{
  Client, RequestBuilder, StatusCode,
  multipart::{Form, Part},
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{RemoteError, Result, join};

const SERVICE: &str = "paperless";

const TAG_COLOR: &str = "#3498db";

#[derive(Debug, Clone, Deserialize)]
pub struct PaperlessConfig {
  pub url:      String,
  pub username: String,
  pub password: String,
}

pub struct PaperlessArchive {
  client: Client,
  config: PaperlessConfig,
  token:  RwLock<Option<String>>,
}

#[derive(Deserialize)]
struct TokenResponse {
  token: String,
}

#[derive(Deserialize)]
struct TagPage {
  #[serde(default)]
  results: Vec<Tag>,
}

#[derive(Deserialize)]
struct Tag {
  id:   i64,
  name: String,
}

#[derive(Deserialize)]
struct Created {
  id: i64,
}

impl PaperlessArchive {
  pub fn new(config: PaperlessConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(60))
      .build()
      .map_err(RemoteError::http(SERVICE))?;
    Ok(Self {
      client,
      config,
      token: RwLock::new(None),
    })
  }

  fn url(&self, path: &str) -> String { join(&self.config.url, path) }

  async fn token(&self) -> Result<String> {
    if let Some(token) = self.token.read().await.as_ref() {
      return Ok(token.clone());
    }

    let mut slot = self.token.write().await;
    if let Some(token) = slot.as_ref() {
      return Ok(token.clone());
    }

    let resp = self
      .client
      .post(self.url("/api/token/"))
      .json(&json!({
        "username": self.config.username,
        "password": self.config.password,
      }))
      .send()
      .await
      .map_err(RemoteError::http(SERVICE))?;
    let TokenResponse { token } = RemoteError::check(SERVICE, resp)
      .await?
      .json()
      .await
      .map_err(RemoteError::http(SERVICE))?;

    debug!("obtained paperless api token");
    *slot = Some(token.clone());
    Ok(token)
  }

  /// Send an authenticated request. A 401 clears the cached token.
  async fn send(&self, req: RequestBuilder) -> Result<reqwest::Response> {
    let token = self.token().await?;
    let resp = req
      .header(reqwest::header::AUTHORIZATION, format!("Token {token}"))
      .send()
      .await
      .map_err(RemoteError::http(SERVICE))?;
    if resp.status() == StatusCode::UNAUTHORIZED {
      self.token.write().await.take();
    }
    RemoteError::check(SERVICE, resp).await
  }

  /// Id of the tag called `name`, creating it when missing.
  async fn tag_id(&self, name: &str) -> Result<i64> {
    let page: TagPage = self
      .send(self.client.get(self.url("/api/tags/")).query(&[("name", name)]))
      .await?
      .json()
      .await
      .map_err(RemoteError::http(SERVICE))?;
    if let Some(tag) = page.results.into_iter().find(|t| t.name == name) {
      return Ok(tag.id);
    }

    let created: Created = self
      .send(
        self
          .client
          .post(self.url("/api/tags/"))
          .json(&json!({ "name": name, "color": TAG_COLOR })),
      )
      .await?
      .json()
      .await
      .map_err(RemoteError::http(SERVICE))?;
    info!(tag = name, id = created.id, "created paperless tag");
    Ok(created.id)
  }
}

impl DocumentArchive for PaperlessArchive {
  type Error = RemoteError;

  async fn upload(&self, upload: ArchiveUpload) -> Result<ArchiveRef> {
    // A tag that cannot be resolved is left off; the document still goes in.
    let mut tag_ids = Vec::with_capacity(upload.tags.len());
    for tag in &upload.tags {
      match self.tag_id(tag).await {
        Ok(id) => tag_ids.push(id),
        Err(e) => warn!(tag = %tag, error = %e, "skipping paperless tag"),
      }
    }

    let document = Part::bytes(upload.bytes)
      .file_name(upload.filename)
      .mime_str("application/pdf")
      .map_err(RemoteError::http(SERVICE))?;
    let mut form = Form::new()
      .part("document", document)
      .text("title", upload.title);
    for id in tag_ids {
      form = form.text("tags", id.to_string());
    }

    let body: serde_json::Value = self
      .send(
        self
          .client
          .post(self.url("/api/documents/post_document/"))
          .multipart(form),
      )
      .await?
      .json()
      .await
      .map_err(RemoteError::http(SERVICE))?;

    let id = body
      .get("id")
      .and_then(serde_json::Value::as_i64)
      .ok_or_else(|| RemoteError::Response {
        service: SERVICE,
        detail:  format!("no document id in {body}"),
      })?;

    Ok(ArchiveRef {
      id,
      url: format!("{}/documents/{id}/", self.config.url.trim_end_matches('/')),
    })
  }
}
