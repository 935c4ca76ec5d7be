use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
  #[error("{service} request failed: {source}")]
  Http {
    service: &'static str,
    #[source]
    source:  reqwest::Error,
  },

  #[error("{service} returned {status}: {body}")]
  Status {
    service: &'static str,
    status:  reqwest::StatusCode,
    body:    String,
  },

  #[error("{service} sent an unexpected response: {detail}")]
  Response {
    service: &'static str,
    detail:  String,
  },
}

pub type Result<T, E = RemoteError> = std::result::Result<T, E>;

impl RemoteError {
  pub(crate) fn http(service: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
    move |source| Self::Http { service, source }
  }

  /// Turn a non-success response into [`RemoteError::Status`], keeping the
  /// body for the log.
  pub(crate) async fn check(
    service: &'static str,
    resp: reqwest::Response,
  ) -> Result<reqwest::Response> {
    if resp.status().is_success() {
      return Ok(resp);
    }
    let status = resp.status();
    let body = resp
      .text()
      .await
      .unwrap_or_else(|_| "<no body>".to_owned());
    Err(Self::Status {
      service,
      status,
      body,
    })
  }
}
