//! Keycloak identity backend over the OpenID Connect token endpoints.

use std::time::Duration;

use famdocs_core::{
  claims::{Credential, Role, VerifiedIdentity},
  services::IdentityProvider,
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::{RemoteError, Result, join};

const SERVICE: &str = "keycloak";

#[derive(Debug, Clone, Deserialize)]
pub struct KeycloakConfig {
  pub url:           String,
  pub realm:         String,
  pub client_id:     String,
  #[serde(default)]
  pub client_secret: String,
}

#[derive(Clone)]
pub struct KeycloakIdentity {
  client: Client,
  config: KeycloakConfig,
}

#[derive(Deserialize)]
struct TokenResponse {
  access_token:  String,
  token_type:    Option<String>,
  refresh_token: Option<String>,
  expires_in:    Option<u64>,
}

#[derive(Deserialize)]
struct Introspection {
  active:             bool,
  sub:                Option<String>,
  preferred_username: Option<String>,
  name:               Option<String>,
  email:              Option<String>,
  #[serde(default)]
  realm_access:       RealmAccess,
}

#[derive(Default, Deserialize)]
struct RealmAccess {
  #[serde(default)]
  roles: Vec<String>,
}

impl KeycloakIdentity {
  pub fn new(config: KeycloakConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .map_err(RemoteError::http(SERVICE))?;
    Ok(Self { client, config })
  }

  fn token_url(&self, suffix: &str) -> String {
    join(
      &self.config.url,
      &format!(
        "/realms/{}/protocol/openid-connect/token{suffix}",
        self.config.realm
      ),
    )
  }

  /// Client credentials sent with every form post.
  fn client_params(&self) -> Vec<(&'static str, &str)> {
    let mut params = vec![("client_id", self.config.client_id.as_str())];
    if !self.config.client_secret.is_empty() {
      params.push(("client_secret", self.config.client_secret.as_str()));
    }
    params
  }
}

impl IdentityProvider for KeycloakIdentity {
  type Error = RemoteError;

  async fn authenticate(&self, username: &str, password: &str) -> Result<Option<Credential>> {
    let mut form = self.client_params();
    form.extend([
      ("grant_type", "password"),
      ("username", username),
      ("password", password),
    ]);

    let resp = self
      .client
      .post(self.token_url(""))
      .form(&form)
      .send()
      .await
      .map_err(RemoteError::http(SERVICE))?;

    // Keycloak answers bad credentials with 401 (or 400 `invalid_grant`).
    if matches!(resp.status(), StatusCode::UNAUTHORIZED | StatusCode::BAD_REQUEST) {
      debug!(username, status = %resp.status(), "keycloak rejected login");
      return Ok(None);
    }
    let tokens: TokenResponse = RemoteError::check(SERVICE, resp)
      .await?
      .json()
      .await
      .map_err(RemoteError::http(SERVICE))?;

    Ok(Some(Credential {
      access_token:  tokens.access_token,
      token_type:    tokens
        .token_type
        .map(|t| t.to_ascii_lowercase())
        .unwrap_or_else(|| "bearer".to_owned()),
      refresh_token: tokens.refresh_token,
      expires_in:    tokens.expires_in,
    }))
  }

  async fn verify_token(&self, token: &str) -> Result<Option<VerifiedIdentity>> {
    let mut form = self.client_params();
    form.push(("token", token));

    let resp = self
      .client
      .post(self.token_url("/introspect"))
      .form(&form)
      .send()
      .await
      .map_err(RemoteError::http(SERVICE))?;
    let info: Introspection = RemoteError::check(SERVICE, resp)
      .await?
      .json()
      .await
      .map_err(RemoteError::http(SERVICE))?;

    if !info.active {
      return Ok(None);
    }
    let identity_id = info.sub.ok_or_else(|| RemoteError::Response {
      service: SERVICE,
      detail:  "active token without a subject".to_owned(),
    })?;
    let username = info
      .preferred_username
      .unwrap_or_else(|| identity_id.clone());

    Ok(Some(VerifiedIdentity {
      display_name: info.name.unwrap_or_else(|| username.clone()),
      identity_id,
      username,
      email: info.email,
      roles: Role::from_identity_roles(&info.realm_access.roles),
    }))
  }
}
