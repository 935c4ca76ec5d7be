//! Ollama text generator.
//!
//! Calls `/api/generate` with streaming disabled, and `/api/tags` to report
//! whether the configured model is present.

use std::time::Duration;

use famdocs_core::services::{ModelStatus, TextGenerator};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{RemoteError, Result, join};

const SERVICE: &str = "ollama";

fn default_model() -> String { "mistral".to_owned() }

fn default_timeout_secs() -> u64 { 60 }

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaConfig {
  pub url:          String,
  #[serde(default = "default_model")]
  pub model:        String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

#[derive(Clone)]
pub struct OllamaGenerator {
  client: Client,
  config: OllamaConfig,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
  model:   &'a str,
  prompt:  &'a str,
  stream:  bool,
  options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
  num_predict: u32,
  temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
  #[serde(default)]
  response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
  #[serde(default)]
  models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
  name: String,
}

impl OllamaGenerator {
  pub fn new(config: OllamaConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(RemoteError::http(SERVICE))?;
    Ok(Self { client, config })
  }

  pub fn model(&self) -> &str { &self.config.model }
}

impl TextGenerator for OllamaGenerator {
  type Error = RemoteError;

  async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String> {
    let resp = self
      .client
      .post(join(&self.config.url, "/api/generate"))
      .json(&GenerateRequest {
        model: &self.config.model,
        prompt,
        stream: false,
        options: GenerateOptions {
          num_predict: max_tokens,
          temperature: 0.7,
        },
      })
      .send()
      .await
      .map_err(RemoteError::http(SERVICE))?;

    let data: GenerateResponse = RemoteError::check(SERVICE, resp)
      .await?
      .json()
      .await
      .map_err(RemoteError::http(SERVICE))?;

    debug!(model = %self.config.model, chars = data.response.len(), "generation finished");
    Ok(data.response.trim().to_owned())
  }

  async fn model_status(&self) -> Result<ModelStatus> {
    let resp = self
      .client
      .get(join(&self.config.url, "/api/tags"))
      .send()
      .await
      .map_err(RemoteError::http(SERVICE))?;
    let tags: TagsResponse = RemoteError::check(SERVICE, resp)
      .await?
      .json()
      .await
      .map_err(RemoteError::http(SERVICE))?;

    // Installed names carry a tag suffix, e.g. `mistral:latest`.
    let available = tags
      .models
      .iter()
      .any(|m| m.name.starts_with(&self.config.model));

    Ok(ModelStatus {
      name: self.config.model.clone(),
      available,
    })
  }
}
