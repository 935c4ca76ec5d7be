//! Workflow tests against the in-process fakes.

use std::time::Duration;

use famdocs_core::{
  claims::Role,
  document::{DocumentRequest, DocumentType, GENERATED_DOCUMENT_NUMBER, GENERATED_TAG},
  family::{FamilyId, MemberId, NewFamily},
  store::FamilyStore,
  subscription::{Plan, QuotaKind, QuotaUsage, ReservationToken, ReserveOutcome, SubscriptionStatus},
};

use crate::{
  ChatQuery, Services, WorkflowError,
  fakes::{self, FakeBackend},
};

struct Fixture {
  services:  Services<FakeBackend>,
  family_id: FamilyId,
  member_id: MemberId,
}

/// A free-plan family with one member, its counters moved to `ai` AI requests
/// and `docs` documents through committed reservations.
async fn fixture(ai: i64, docs: i64) -> Fixture {
  let services = fakes::services().await;
  let store = &services.store;
  let (family, _) = store
    .create_family(NewFamily {
      name: "Almeida".into(),
      description: None,
      plan: Plan::Free,
    })
    .await
    .unwrap();
  let member = store
    .add_member(fakes::new_member(family.family_id, "Joana Almeida", "joana@example.com"))
    .await
    .unwrap();

  for (kind, n) in [(QuotaKind::AiRequest, ai), (QuotaKind::Document, docs)] {
    for _ in 0..n {
      match store.reserve_quota(family.family_id, kind, ReservationToken::new()).await.unwrap() {
        ReserveOutcome::Reserved(token) => {
          store.commit_reservation(token).await.unwrap();
        }
        other => panic!("fixture reservation failed: {other:?}"),
      }
    }
  }

  Fixture {
    services,
    family_id: family.family_id,
    member_id: member.member_id,
  }
}

impl Fixture {
  async fn usage(&self) -> QuotaUsage {
    self
      .services
      .store
      .get_subscription(self.family_id)
      .await
      .unwrap()
      .unwrap()
      .usage
  }

  fn admin(&self) -> famdocs_core::claims::ClaimSet {
    fakes::claims(&[Role::FamilyAdmin], Some(self.family_id))
  }

  fn request(&self, kind: &str) -> DocumentRequest {
    DocumentRequest {
      member_id:       self.member_id,
      document_kind:   kind.into(),
      additional_info: "registration at the municipal school".into(),
      title:           "Proof of Residency".into(),
    }
  }

  async fn member_documents(&self) -> usize {
    self
      .services
      .store
      .list_member_documents(self.member_id)
      .await
      .unwrap()
      .len()
  }
}

// ─── Generation ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn end_to_end_generation_commits_both_counters() {
  let f = fixture(3, 5).await;

  let generated = f
    .services
    .orchestrator()
    .generate(&f.admin(), f.request("declaration"))
    .await
    .unwrap();

  assert_eq!(generated.archive.id, 42);
  assert!(generated.archive.url.ends_with("/42/"));

  let usage = f.usage().await;
  assert_eq!(usage.current_ai_requests_this_month, 4);
  assert_eq!(usage.current_documents, 6);

  let doc = f
    .services
    .store
    .get_document(generated.document.document_id)
    .await
    .unwrap()
    .unwrap();
  assert!(doc.is_generated());
  assert_eq!(doc.document_number, GENERATED_DOCUMENT_NUMBER);
  assert_eq!(doc.document_type, DocumentType::Other);
  assert_eq!(doc.issuing_country, "Brazilian");
  assert_eq!(doc.archive.map(|a| a.id), Some(42));
  assert_eq!(
    doc.tags,
    vec!["Joana Almeida".to_string(), "declaration".into(), GENERATED_TAG.into()]
  );

  let uploads = f.services.archive.uploads();
  assert_eq!(uploads.len(), 1);
  assert_eq!(uploads[0].filename, "Proof of Residency.pdf");
  assert!(uploads[0].bytes.starts_with(b"%PDF-1.4"));

  let calls = f.services.generator.calls();
  assert_eq!(calls.len(), 1);
  assert_eq!(calls[0].1, 1500);
  assert!(calls[0].0.contains("Joana Almeida"));
}

#[tokio::test]
async fn archive_failure_rolls_back_counters() {
  let f = fixture(3, 5).await;
  f.services.archive.set_failing(true);

  let err = f
    .services
    .orchestrator()
    .generate(&f.admin(), f.request("declaration"))
    .await
    .unwrap_err();
  assert!(matches!(err, WorkflowError::ArchiveFailed(_)));

  let usage = f.usage().await;
  assert_eq!(usage.current_ai_requests_this_month, 3);
  assert_eq!(usage.current_documents, 5);
  assert_eq!(f.member_documents().await, 0);
}

#[tokio::test]
async fn persistence_failure_after_upload_rolls_back_counters() {
  let f = fixture(3, 5).await;
  f.services.archive.set_holding(true);

  // The member disappears while the upload is in flight, so the document row
  // can no longer reference it.
  let orchestrator = f.services.orchestrator();
  let admin = f.admin();
  let (result, ()) = tokio::join!(
    orchestrator.generate(&admin, f.request("declaration")),
    async {
      f.services.archive.upload_arrived().await;
      assert!(f.services.store.delete_member(f.member_id).await.unwrap());
      f.services.archive.resume();
    },
  );

  let err = result.unwrap_err();
  assert!(matches!(err, WorkflowError::PersistenceFailed(_)), "{err:?}");

  let usage = f.usage().await;
  assert_eq!(usage.current_ai_requests_this_month, 3);
  assert_eq!(usage.current_documents, 5);
  assert_eq!(f.member_documents().await, 0);
  assert_eq!(f.services.archive.uploads().len(), 1);
}

#[tokio::test]
async fn generation_failure_rolls_back_counters() {
  let f = fixture(1, 1).await;
  f.services.generator.set_failure("model not loaded");

  let err = f
    .services
    .orchestrator()
    .generate(&f.admin(), f.request("certificate"))
    .await
    .unwrap_err();
  assert!(matches!(err, WorkflowError::GenerationFailed(ref m) if m.contains("model not loaded")));

  let usage = f.usage().await;
  assert_eq!(usage.current_ai_requests_this_month, 1);
  assert_eq!(usage.current_documents, 1);
  assert_eq!(f.services.renderer.renders(), 0);
}

#[tokio::test]
async fn blank_generation_is_a_failure() {
  let f = fixture(0, 0).await;
  f.services.generator.set_reply("   \n ");

  let err = f
    .services
    .orchestrator()
    .generate(&f.admin(), f.request("declaration"))
    .await
    .unwrap_err();
  assert!(matches!(err, WorkflowError::GenerationFailed(_)));
  assert_eq!(f.usage().await, QuotaUsage { current_members: 1, ..Default::default() });
}

#[tokio::test]
async fn render_failure_rolls_back_counters() {
  let f = fixture(2, 2).await;
  f.services.renderer.set_failing(true);

  let err = f
    .services
    .orchestrator()
    .generate(&f.admin(), f.request("declaration"))
    .await
    .unwrap_err();
  assert!(matches!(err, WorkflowError::RenderFailed(_)));

  let usage = f.usage().await;
  assert_eq!(usage.current_ai_requests_this_month, 2);
  assert_eq!(usage.current_documents, 2);
  assert!(f.services.archive.uploads().is_empty());
}

#[tokio::test]
async fn exhausted_ai_quota_has_no_side_effects() {
  let f = fixture(10, 5).await;

  let err = f
    .services
    .orchestrator()
    .generate(&f.admin(), f.request("declaration"))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    WorkflowError::QuotaExhausted { kind: QuotaKind::AiRequest, ceiling: 10 }
  ));

  assert!(f.services.generator.calls().is_empty());
  assert!(f.services.archive.uploads().is_empty());
  let usage = f.usage().await;
  assert_eq!(usage.current_ai_requests_this_month, 10);
  assert_eq!(usage.current_documents, 5);
}

#[tokio::test]
async fn document_slot_failure_releases_ai_reservation() {
  let f = fixture(4, 100).await;

  let err = f
    .services
    .orchestrator()
    .generate(&f.admin(), f.request("declaration"))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    WorkflowError::QuotaExhausted { kind: QuotaKind::Document, ceiling: 100 }
  ));

  let usage = f.usage().await;
  assert_eq!(usage.current_ai_requests_this_month, 4);
  assert_eq!(usage.current_documents, 100);
  assert!(f.services.generator.calls().is_empty());
}

#[tokio::test]
async fn double_exhaustion_reports_ai_quota_first() {
  let f = fixture(10, 100).await;
  let err = f
    .services
    .orchestrator()
    .generate(&f.admin(), f.request("declaration"))
    .await
    .unwrap_err();
  assert!(matches!(err, WorkflowError::QuotaExhausted { kind: QuotaKind::AiRequest, .. }));
}

#[tokio::test]
async fn inactive_subscription_is_rejected_before_generation() {
  let f = fixture(0, 0).await;
  f.services
    .store
    .set_subscription_status(f.family_id, SubscriptionStatus::Pending)
    .await
    .unwrap();

  let err = f
    .services
    .orchestrator()
    .generate(&f.admin(), f.request("declaration"))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    WorkflowError::SubscriptionInactive(SubscriptionStatus::Pending)
  ));
  assert!(f.services.generator.calls().is_empty());
}

#[tokio::test]
async fn unknown_kind_uses_declaration_template() {
  let f = fixture(0, 0).await;

  let generated = f
    .services
    .orchestrator()
    .generate(&f.admin(), f.request("unknown_kind"))
    .await
    .unwrap();

  let calls = f.services.generator.calls();
  assert!(calls[0].0.starts_with("Write a formal declaration"));
  assert!(generated.document.tags.contains(&"unknown_kind".to_string()));
  assert_eq!(
    generated.document.description.as_deref(),
    Some("AI-generated document - unknown_kind")
  );
}

#[tokio::test]
async fn other_family_cannot_generate_for_member() {
  let f = fixture(0, 0).await;
  let outsider = fakes::claims(&[Role::FamilyAdmin], Some(f.family_id + 1));

  let err = f
    .services
    .orchestrator()
    .generate(&outsider, f.request("declaration"))
    .await
    .unwrap_err();
  assert!(matches!(err, WorkflowError::NotFound(_)));
  assert_eq!(f.usage().await.current_ai_requests_this_month, 0);
}

#[tokio::test]
async fn role_check_precedes_quota() {
  let f = fixture(0, 0).await;
  let no_roles = fakes::claims(&[], Some(f.family_id));

  let err = f
    .services
    .orchestrator()
    .generate(&no_roles, f.request("declaration"))
    .await
    .unwrap_err();
  assert!(matches!(err, WorkflowError::Forbidden(_)));
  assert_eq!(f.usage().await.current_ai_requests_this_month, 0);
}

#[tokio::test]
async fn invalid_request_is_rejected() {
  let f = fixture(0, 0).await;
  let mut request = f.request("declaration");
  request.title = " ".into();

  let err = f
    .services
    .orchestrator()
    .generate(&f.admin(), request)
    .await
    .unwrap_err();
  assert!(matches!(err, WorkflowError::InvalidRequest(_)));
}

#[tokio::test]
async fn platform_admin_charges_the_members_family() {
  let f = fixture(0, 0).await;
  let platform = fakes::claims(&[Role::PlatformAdmin], None);

  f.services
    .orchestrator()
    .generate(&platform, f.request("authorization"))
    .await
    .unwrap();

  let usage = f.usage().await;
  assert_eq!(usage.current_ai_requests_this_month, 1);
  assert_eq!(usage.current_documents, 1);
}

#[tokio::test]
async fn cancelled_generation_releases_reservations() {
  let f = fixture(3, 5).await;
  f.services.generator.set_hanging(true);

  let orchestrator = f.services.orchestrator();
  let claims = f.admin();
  let outcome = tokio::time::timeout(
    Duration::from_millis(100),
    orchestrator.generate(&claims, f.request("declaration")),
  )
  .await;
  assert!(outcome.is_err(), "generation should still be pending");

  // The dropped future released its reservations from spawned tasks.
  let mut usage = f.usage().await;
  for _ in 0..100 {
    if usage.current_ai_requests_this_month == 3 && usage.current_documents == 5 {
      break;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    usage = f.usage().await;
  }
  assert_eq!(usage.current_ai_requests_this_month, 3);
  assert_eq!(usage.current_documents, 5);
}

#[tokio::test]
async fn concurrent_generations_respect_the_ceiling() {
  let f = fixture(7, 0).await;

  let orchestrator = f.services.orchestrator();
  let claims = f.admin();
  let results = generate_six(&orchestrator, &claims, &f).await;

  let succeeded = results.iter().filter(|r| r.is_ok()).count();
  assert_eq!(succeeded, 3);
  assert!(results.iter().filter_map(|r| r.as_ref().err()).all(|e| matches!(
    e,
    WorkflowError::QuotaExhausted { kind: QuotaKind::AiRequest, .. }
  )));
  assert_eq!(f.usage().await.current_ai_requests_this_month, 10);
}

async fn generate_six(
  orchestrator: &crate::GenerationOrchestrator<FakeBackend>,
  claims: &famdocs_core::claims::ClaimSet,
  f: &Fixture,
) -> Vec<crate::Result<crate::GeneratedDocument>> {
  let (a, b, c, d, e, g) = tokio::join!(
    orchestrator.generate(claims, f.request("declaration")),
    orchestrator.generate(claims, f.request("declaration")),
    orchestrator.generate(claims, f.request("declaration")),
    orchestrator.generate(claims, f.request("declaration")),
    orchestrator.generate(claims, f.request("declaration")),
    orchestrator.generate(claims, f.request("declaration")),
  );
  vec![a, b, c, d, e, g]
}

// ─── Chat ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn query_with_member_context() {
  let f = fixture(0, 0).await;
  f.services.generator.set_reply("Your passport expires in 2030.");

  let answer = f
    .services
    .query_handler()
    .answer(&f.admin(), ChatQuery {
      message:           "When does my passport expire?".into(),
      context_member_id: Some(f.member_id),
    })
    .await
    .unwrap();
  assert!(answer.context_used);
  assert_eq!(answer.response, "Your passport expires in 2030.");

  let calls = f.services.generator.calls();
  assert_eq!(calls[0].1, 1000);
  assert!(calls[0].0.contains("Member: Joana Almeida"));

  // No quota is consumed by queries.
  assert_eq!(f.usage().await.current_ai_requests_this_month, 0);
}

#[tokio::test]
async fn query_without_member_is_unscoped() {
  let f = fixture(0, 0).await;
  let answer = f
    .services
    .query_handler()
    .answer(&f.admin(), ChatQuery {
      message:           "Which documents does a minor need to travel?".into(),
      context_member_id: None,
    })
    .await
    .unwrap();
  assert!(!answer.context_used);
}

#[tokio::test]
async fn query_for_other_familys_member_is_not_found() {
  let f = fixture(0, 0).await;
  let outsider = fakes::claims(&[Role::FamilyMember], Some(f.family_id + 1));
  let err = f
    .services
    .query_handler()
    .answer(&outsider, ChatQuery {
      message:           "Tell me about this member".into(),
      context_member_id: Some(f.member_id),
    })
    .await
    .unwrap_err();
  assert!(matches!(err, WorkflowError::NotFound(_)));
  assert!(f.services.generator.calls().is_empty());
}

#[tokio::test]
async fn query_generator_failure_is_internal() {
  let f = fixture(0, 0).await;
  f.services.generator.set_failure("timeout");
  let err = f
    .services
    .query_handler()
    .answer(&f.admin(), ChatQuery {
      message:           "Hello".into(),
      context_member_id: None,
    })
    .await
    .unwrap_err();
  assert!(matches!(err, WorkflowError::Internal(_)));
}

#[tokio::test]
async fn models_report_generator_status() {
  let f = fixture(0, 0).await;
  f.services.generator.set_available(false);
  let status = f.services.query_handler().models(&f.admin()).await.unwrap();
  assert_eq!(status.name, "fake-model");
  assert!(!status.available);
}

// ─── Guard ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn resolve_links_identity_to_family() {
  let services = fakes::services().await;
  let (family, _) = services
    .store
    .create_family(NewFamily {
      name: "Rocha".into(),
      description: None,
      plan: Plan::Free,
    })
    .await
    .unwrap();
  let mut input = fakes::new_member(family.family_id, "Rui Rocha", "rui@example.com");
  input.identity_id = Some("kc-rui".into());
  services.store.add_member(input).await.unwrap();

  services.identity.register_token(
    "tok-rui",
    fakes::identity("kc-rui", &[Role::FamilyAdmin]),
  );
  services
    .identity
    .register_token("tok-stranger", fakes::identity("kc-x", &[Role::FamilyMember]));

  let guard = services.guard();
  let claims = guard.resolve(Some("Bearer tok-rui")).await.unwrap();
  assert_eq!(claims.family_id, Some(family.family_id));
  assert!(claims.roles.contains(&Role::FamilyAdmin));

  let stranger = guard.resolve(Some("Bearer tok-stranger")).await.unwrap();
  assert_eq!(stranger.family_id, None);

  assert!(matches!(guard.resolve(None).await, Err(WorkflowError::Unauthorized)));
  assert!(matches!(
    guard.resolve(Some("Bearer nope")).await,
    Err(WorkflowError::Unauthorized)
  ));
  assert!(matches!(
    guard.resolve(Some("Token tok-rui")).await,
    Err(WorkflowError::Unauthorized)
  ));
}

#[tokio::test]
async fn authenticate_exchanges_credentials() {
  let services = fakes::services().await;
  services.identity.register_account("rui", "s3cret", "tok-rui");
  let guard = services.guard();

  let credential = guard.authenticate("rui", "s3cret").await.unwrap();
  assert_eq!(credential.access_token, "tok-rui");
  assert_eq!(credential.token_type, "bearer");

  assert!(matches!(
    guard.authenticate("rui", "wrong").await,
    Err(WorkflowError::Unauthorized)
  ));
  assert!(matches!(guard.authenticate("", "x").await, Err(WorkflowError::Unauthorized)));

  services.identity.set_failing(true);
  assert!(matches!(
    guard.authenticate("rui", "s3cret").await,
    Err(WorkflowError::Internal(_))
  ));
}

// ─── Administration ──────────────────────────────────────────────────────────

#[tokio::test]
async fn family_admin_scope_and_roles() {
  let f = fixture(0, 0).await;
  let admin = f.services.family_admin();
  let member_claims = fakes::claims(&[Role::FamilyMember], Some(f.family_id));

  assert_eq!(admin.list_members(&member_claims, f.family_id).await.unwrap().len(), 1);
  assert!(matches!(
    admin
      .add_member(&member_claims, f.family_id, fakes::new_member(0, "X", "x@example.com"))
      .await,
    Err(WorkflowError::Forbidden(_))
  ));

  let added = admin
    .add_member(&f.admin(), f.family_id, fakes::new_member(0, "Pedro", "pedro@example.com"))
    .await
    .unwrap();
  assert_eq!(added.family_id, f.family_id);

  let dup = admin
    .add_member(&f.admin(), f.family_id, fakes::new_member(0, "Pedro", "pedro@example.com"))
    .await
    .unwrap_err();
  assert!(matches!(dup, WorkflowError::Conflict(_)));

  let outsider = fakes::claims(&[Role::FamilyAdmin], Some(f.family_id + 1));
  assert!(matches!(
    admin.subscription(&outsider, f.family_id).await,
    Err(WorkflowError::Forbidden(_))
  ));
  assert!(matches!(
    admin.member_documents(&outsider, f.member_id).await,
    Err(WorkflowError::Forbidden(_))
  ));

  admin
    .remove_member(&f.admin(), f.family_id, added.member_id)
    .await
    .unwrap();
  assert!(matches!(
    admin.remove_member(&f.admin(), f.family_id, added.member_id).await,
    Err(WorkflowError::NotFound(_))
  ));
}

#[tokio::test]
async fn only_platform_admin_creates_families() {
  let services = fakes::services().await;
  let admin = services.family_admin();
  let input = NewFamily {
    name: "Nunes".into(),
    description: None,
    plan: Plan::Premium,
  };

  let family_admin = fakes::claims(&[Role::FamilyAdmin], Some(1));
  assert!(matches!(
    admin.create_family(&family_admin, input.clone()).await,
    Err(WorkflowError::Forbidden(_))
  ));

  let platform = fakes::claims(&[Role::PlatformAdmin], None);
  let (family, subscription) = admin.create_family(&platform, input).await.unwrap();
  assert_eq!(subscription.family_id, family.family_id);
  assert_eq!(subscription.limits.max_members, 50);
}
