//! Router tests driving the full HTTP surface over the in-process fakes.

use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
  response::Response,
};
use famdocs_core::{
  claims::Role,
  family::{FamilyId, MemberId, NewFamily},
  store::FamilyStore,
  subscription::{Plan, QuotaKind, ReservationToken, ReserveOutcome},
};
use famdocs_workflow::{
  Services,
  fakes::{self, FakeBackend},
};
use serde_json::{Value, json};
use tower::ServiceExt as _;

use crate::{AppState, router};

const ADMIN_TOKEN: &str = "admin-token";
const MEMBER_TOKEN: &str = "member-token";
const OUTSIDER_TOKEN: &str = "outsider-token";
const PLATFORM_TOKEN: &str = "platform-token";

struct Fixture {
  services:  Services<FakeBackend>,
  family_id: FamilyId,
  member_id: MemberId,
}

/// Two free-plan families. The first has an admin (linked to `ADMIN_TOKEN`)
/// and a plain member; the second has one admin (`OUTSIDER_TOKEN`).
async fn fixture() -> Fixture {
  let services = fakes::services().await;
  let store = &services.store;

  let (family, _) = store
    .create_family(NewFamily {
      name:        "Almeida".into(),
      description: None,
      plan:        Plan::Free,
    })
    .await
    .unwrap();
  let (other, _) = store
    .create_family(NewFamily {
      name:        "Souza".into(),
      description: None,
      plan:        Plan::Free,
    })
    .await
    .unwrap();

  let mut admin = fakes::new_member(family.family_id, "Carlos Almeida", "carlos@example.com");
  admin.identity_id = Some("kc-carlos".into());
  store.add_member(admin).await.unwrap();

  let mut joana = fakes::new_member(family.family_id, "Joana Almeida", "joana@example.com");
  joana.identity_id = Some("kc-joana".into());
  let joana = store.add_member(joana).await.unwrap();

  let mut outsider = fakes::new_member(other.family_id, "Rita Souza", "rita@example.com");
  outsider.identity_id = Some("kc-rita".into());
  store.add_member(outsider).await.unwrap();

  let identity = &services.identity;
  identity.register_token(ADMIN_TOKEN, fakes::identity("kc-carlos", &[Role::FamilyAdmin]));
  identity.register_token(MEMBER_TOKEN, fakes::identity("kc-joana", &[Role::FamilyMember]));
  identity.register_token(OUTSIDER_TOKEN, fakes::identity("kc-rita", &[Role::FamilyAdmin]));
  identity.register_token(PLATFORM_TOKEN, fakes::identity("kc-root", &[Role::PlatformAdmin]));

  Fixture {
    services,
    family_id: family.family_id,
    member_id: joana.member_id,
  }
}

impl Fixture {
  fn app(&self) -> Router { router(AppState::new(self.services.clone())) }

  async fn send(
    &self,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
  ) -> (StatusCode, Value) {
    read_json(send_raw(self.app(), method, uri, token, body).await).await
  }

  async fn usage(&self) -> (i64, i64) {
    let sub = self
      .services
      .store
      .get_subscription(self.family_id)
      .await
      .unwrap()
      .unwrap();
    (sub.usage.current_ai_requests_this_month, sub.usage.current_documents)
  }

  fn generate_body(&self) -> Value {
    json!({
      "memberId": self.member_id,
      "documentKind": "declaration",
      "additionalInfo": "school enrolment",
      "title": "Proof of Residency",
    })
  }
}

async fn send_raw(
  app: Router,
  method: &str,
  uri: &str,
  token: Option<&str>,
  body: Option<Value>,
) -> Response {
  let mut builder = Request::builder().method(method).uri(uri);
  if let Some(token) = token {
    builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
  }
  let req = match body {
    Some(body) => builder
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(body.to_string()))
      .unwrap(),
    None => builder.body(Body::empty()).unwrap(),
  };
  app.oneshot(req).await.unwrap()
}

async fn read_json(res: Response) -> (StatusCode, Value) {
  let status = res.status();
  let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
  let value = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap()
  };
  (status, value)
}

// ─── Health ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_and_root() {
  let f = fixture().await;
  let (status, body) = f.send("GET", "/health", None, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body, json!({ "status": "healthy" }));

  let (status, body) = f.send("GET", "/", None, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["name"], "famdocs-server");
}

// ─── Auth ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_token_is_401_with_challenge() {
  let f = fixture().await;
  let res = send_raw(f.app(), "GET", "/api/v1/auth/me", None, None).await;
  assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
  assert_eq!(res.headers()[header::WWW_AUTHENTICATE], "Bearer");

  let (_, body) = read_json(res).await;
  assert_eq!(body["success"], false);
  assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn unknown_token_is_401() {
  let f = fixture().await;
  let (status, _) = f.send("GET", "/api/v1/auth/me", Some("forged"), None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn identity_backend_outage_is_500() {
  let f = fixture().await;
  f.services.identity.set_failing(true);
  let (status, body) = f.send("GET", "/api/v1/auth/me", Some(ADMIN_TOKEN), None).await;
  assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
  assert_eq!(body["error"], "internal");
}

#[tokio::test]
async fn login_issues_bearer_token() {
  let f = fixture().await;
  f.services.identity.register_account("carlos", "hunter2", ADMIN_TOKEN);

  let (status, body) = f
    .send(
      "POST",
      "/api/v1/auth/login",
      None,
      Some(json!({ "username": "carlos", "password": "hunter2" })),
    )
    .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["accessToken"], ADMIN_TOKEN);
  assert_eq!(body["tokenType"], "bearer");

  let (status, _) = f
    .send(
      "POST",
      "/api/v1/auth/login",
      None,
      Some(json!({ "username": "carlos", "password": "wrong" })),
    )
    .await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_reports_family_scope() {
  let f = fixture().await;
  let (status, body) = f.send("GET", "/api/v1/auth/me", Some(ADMIN_TOKEN), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["identityId"], "kc-carlos");
  assert_eq!(body["familyId"], f.family_id);
  assert_eq!(body["roles"], json!(["family_admin"]));

  let (status, body) = f.send("POST", "/api/v1/auth/logout", Some(ADMIN_TOKEN), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["success"], true);
}

// ─── Generation ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn generate_document_end_to_end() {
  let f = fixture().await;
  let (status, body) = f
    .send("POST", "/api/v1/chat/generate-document", Some(ADMIN_TOKEN), Some(f.generate_body()))
    .await;
  assert_eq!(status, StatusCode::OK, "{body}");
  assert_eq!(body["success"], true);
  assert_eq!(body["archiveUrl"], "http://archive.test/documents/42/");
  let document_id = body["documentId"].as_i64().unwrap();
  assert_eq!(f.usage().await, (1, 1));

  let (status, docs) = f
    .send(
      "GET",
      &format!("/api/v1/members/{}/documents", f.member_id),
      Some(MEMBER_TOKEN),
      None,
    )
    .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(docs[0]["document_id"], document_id);
  assert_eq!(docs[0]["archive"]["id"], 42);
}

#[tokio::test]
async fn exhausted_ai_quota_is_429() {
  let f = fixture().await;
  for _ in 0..10 {
    match f.services.store.reserve_quota(f.family_id, QuotaKind::AiRequest, ReservationToken::new()).await.unwrap() {
      ReserveOutcome::Reserved(token) => {
        f.services.store.commit_reservation(token).await.unwrap();
      }
      other => panic!("unexpected outcome: {other:?}"),
    }
  }

  let (status, body) = f
    .send("POST", "/api/v1/chat/generate-document", Some(ADMIN_TOKEN), Some(f.generate_body()))
    .await;
  assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
  assert_eq!(body["error"], "ai_quota_exhausted");
  assert!(body["message"].as_str().unwrap().contains("monthly AI request"));
  assert!(f.services.archive.uploads().is_empty());
  assert_eq!(f.usage().await, (10, 0));
}

#[tokio::test]
async fn archive_failure_is_502_and_rolls_back() {
  let f = fixture().await;
  f.services.archive.set_failing(true);

  let (status, body) = f
    .send("POST", "/api/v1/chat/generate-document", Some(ADMIN_TOKEN), Some(f.generate_body()))
    .await;
  assert_eq!(status, StatusCode::BAD_GATEWAY);
  assert_eq!(body["error"], "archive_failed");
  assert_eq!(f.usage().await, (0, 0));
}

#[tokio::test]
async fn generate_for_other_family_member_is_404() {
  let f = fixture().await;
  let (status, body) = f
    .send("POST", "/api/v1/chat/generate-document", Some(OUTSIDER_TOKEN), Some(f.generate_body()))
    .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body["error"], "not_found");
  assert_eq!(f.usage().await, (0, 0));
}

#[tokio::test]
async fn blank_title_is_400() {
  let f = fixture().await;
  let mut body = f.generate_body();
  body["title"] = json!("   ");
  let (status, body) = f
    .send("POST", "/api/v1/chat/generate-document", Some(ADMIN_TOKEN), Some(body))
    .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"], "invalid_request");
}

// ─── Query and models ────────────────────────────────────────────────────────

#[tokio::test]
async fn query_with_member_context() {
  let f = fixture().await;
  f.services.generator.set_reply("Joana has no documents on file.");

  let (status, body) = f
    .send(
      "POST",
      "/api/v1/chat/query",
      Some(MEMBER_TOKEN),
      Some(json!({ "message": "Which documents expire soon?", "contextMemberId": f.member_id })),
    )
    .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["response"], "Joana has no documents on file.");
  assert_eq!(body["contextUsed"], true);
  assert_eq!(f.usage().await, (0, 0));

  let (status, body) = f
    .send(
      "POST",
      "/api/v1/chat/query",
      Some(MEMBER_TOKEN),
      Some(json!({ "message": "What is an apostille?" })),
    )
    .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["contextUsed"], false);
}

#[tokio::test]
async fn models_reports_readiness() {
  let f = fixture().await;
  let (status, body) = f.send("GET", "/api/v1/chat/models", Some(MEMBER_TOKEN), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["models"][0]["name"], "fake-model");
  assert_eq!(body["models"][0]["status"], "ready");

  f.services.generator.set_available(false);
  let (_, body) = f.send("GET", "/api/v1/chat/models", Some(MEMBER_TOKEN), None).await;
  assert_eq!(body["models"][0]["available"], false);
  assert_eq!(body["models"][0]["status"], "downloading");
}

// ─── Families ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn family_scope_is_enforced() {
  let f = fixture().await;
  let uri = format!("/api/v1/families/{}/members", f.family_id);

  let (status, body) = f.send("GET", &uri, Some(OUTSIDER_TOKEN), None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  assert_eq!(body["error"], "forbidden");

  let (status, body) = f.send("GET", &uri, Some(MEMBER_TOKEN), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body.as_array().unwrap().len(), 2);

  let (status, _) = f.send("GET", &uri, Some(PLATFORM_TOKEN), None).await;
  assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn subscription_endpoint() {
  let f = fixture().await;
  let (status, body) = f
    .send(
      "GET",
      &format!("/api/v1/families/{}/subscription", f.family_id),
      Some(MEMBER_TOKEN),
      None,
    )
    .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["plan"], "free");
  assert_eq!(body["limits"]["max_ai_requests_per_month"], 10);
  assert_eq!(body["usage"]["current_members"], 2);
}

#[tokio::test]
async fn member_add_and_remove() {
  let f = fixture().await;
  let uri = format!("/api/v1/families/{}/members", f.family_id);
  let new_member = json!({
    "full_name": "Pedro Almeida",
    "birth_date": "2015-03-09",
    "gender": "male",
    "nationality": "Brazilian",
    "email": "pedro@example.com",
  });

  let (status, _) = f
    .send("POST", &uri, Some(MEMBER_TOKEN), Some(new_member.clone()))
    .await;
  assert_eq!(status, StatusCode::FORBIDDEN);

  let (status, body) = f
    .send("POST", &uri, Some(ADMIN_TOKEN), Some(new_member.clone()))
    .await;
  assert_eq!(status, StatusCode::CREATED, "{body}");
  assert_eq!(body["family_id"], f.family_id);
  let pedro = body["member_id"].as_i64().unwrap();

  let (status, body) = f.send("POST", &uri, Some(ADMIN_TOKEN), Some(new_member)).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["error"], "conflict");

  let (status, _) = f
    .send("DELETE", &format!("{uri}/{pedro}"), Some(ADMIN_TOKEN), None)
    .await;
  assert_eq!(status, StatusCode::NO_CONTENT);

  let (status, _) = f
    .send("DELETE", &format!("{uri}/{pedro}"), Some(ADMIN_TOKEN), None)
    .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn only_platform_admin_creates_families() {
  let f = fixture().await;
  let body = json!({ "name": "Pereira", "plan": "premium" });

  let (status, _) = f
    .send("POST", "/api/v1/families", Some(ADMIN_TOKEN), Some(body.clone()))
    .await;
  assert_eq!(status, StatusCode::FORBIDDEN);

  let (status, created) = f
    .send("POST", "/api/v1/families", Some(PLATFORM_TOKEN), Some(body))
    .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(created["family"]["name"], "Pereira");
  assert_eq!(created["subscription"]["limits"]["max_members"], 50);
}
