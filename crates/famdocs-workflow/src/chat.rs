//! Conversational Query Handler: answer free-text questions with an optional
//! read-only member context. Consumes no quota and writes nothing.

use famdocs_core::{
  claims::{ClaimSet, Role},
  family::MemberId,
  services::{ModelStatus, TextGenerator},
  store::FamilyStore,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::{Backend, Result, Services, WorkflowError, authorize, prompt};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatQuery {
  pub message:           String,
  #[serde(default, alias = "context_member_id")]
  pub context_member_id: Option<MemberId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatAnswer {
  pub response:     String,
  pub context_used: bool,
}

pub struct QueryHandler<B: Backend> {
  services: Services<B>,
}

impl<B: Backend> QueryHandler<B> {
  pub fn new(services: Services<B>) -> Self { Self { services } }

  #[instrument(skip_all, fields(identity = %claims.identity_id, member_id = ?query.context_member_id))]
  pub async fn answer(&self, claims: &ClaimSet, query: ChatQuery) -> Result<ChatAnswer> {
    authorize(claims, &[Role::FamilyMember, Role::FamilyAdmin])?;
    if query.message.trim().is_empty() {
      return Err(WorkflowError::InvalidRequest("message must not be empty".to_owned()));
    }

    let store = &self.services.store;
    let (member, documents) = match query.context_member_id {
      None => (None, Vec::new()),
      Some(member_id) => {
        let member = store
          .get_member(member_id)
          .await
          .map_err(WorkflowError::from_store)?
          .filter(|m| claims.is_platform_admin() || claims.family_id == Some(m.family_id))
          .ok_or_else(|| WorkflowError::NotFound(format!("member {member_id}")))?;
        let documents = store
          .list_member_documents(member_id)
          .await
          .map_err(WorkflowError::from_store)?;
        (Some(member), documents)
      }
    };
    let context_used = member.is_some();
    debug!(documents = documents.len(), context_used, "assembled query context");

    let prompt = prompt::query_prompt(member.as_ref(), &documents, query.message.trim());
    let response = self
      .services
      .generator
      .generate(&prompt, self.services.budget.query)
      .await
      .map_err(|e| {
        warn!(error = %e, "query generation failed");
        WorkflowError::internal(e)
      })?;

    let response = response.trim();
    if response.is_empty() {
      return Err(WorkflowError::internal("the generator returned no text"));
    }

    Ok(ChatAnswer {
      response: response.to_owned(),
      context_used,
    })
  }

  /// The configured generation model and whether the backend has it.
  pub async fn models(&self, claims: &ClaimSet) -> Result<ModelStatus> {
    authorize(claims, &[Role::FamilyMember, Role::FamilyAdmin])?;
    self
      .services
      .generator
      .model_status()
      .await
      .map_err(WorkflowError::internal)
  }
}
