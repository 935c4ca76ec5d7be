//! Generation Orchestrator: the quota-enforced document workflow.
//!
//! Steps run strictly in order and the first failure is terminal:
//!
//! 1. authorize the caller and resolve the member inside the caller's family
//! 2. reserve one AI request
//! 3. reserve one document slot
//! 4. generate the text
//! 5. render the artifact
//! 6. upload it to the archive
//! 7. record the document and commit both reservations in one transaction
//!
//! Every failure after step 2 releases whatever was reserved before the error
//! is returned. Step 7 failing leaves the uploaded artifact orphaned in the
//! archive; that is logged and reported, never repaired here.

use chrono::Utc;
use famdocs_core::{
  claims::{ClaimSet, Role},
  document::{
    ArchiveRef, Document, DocumentRequest, DocumentType, GENERATED_DOCUMENT_NUMBER,
    GENERATED_TAG, NewDocument,
  },
  family::FamilyMember,
  services::{ArchiveUpload, DocumentArchive, DocumentRenderer, TextGenerator},
  store::FamilyStore,
};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::{
  Backend, Result, Services, WorkflowError, authorize,
  ledger::Reservation,
  prompt,
};

/// A successfully generated, archived and recorded document.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedDocument {
  pub document: Document,
  pub archive:  ArchiveRef,
}

pub struct GenerationOrchestrator<B: Backend> {
  services: Services<B>,
}

impl<B: Backend> GenerationOrchestrator<B> {
  pub fn new(services: Services<B>) -> Self { Self { services } }

  #[instrument(
    skip_all,
    fields(identity = %claims.identity_id, member_id = request.member_id, kind = %request.document_kind)
  )]
  pub async fn generate(
    &self,
    claims: &ClaimSet,
    request: DocumentRequest,
  ) -> Result<GeneratedDocument> {
    // Step 1.
    authorize(claims, &[Role::FamilyMember, Role::FamilyAdmin])?;
    request.validate()?;
    let member = self.resolve_member(claims, &request).await?;
    let family_id = member.family_id;

    // Steps 2 and 3, always in this order.
    let ledger = self.services.ledger();
    let ai = ledger.reserve_ai_request(family_id).await?;
    let slot = match ledger.reserve_document_slot(family_id).await {
      Ok(slot) => slot,
      Err(e) => {
        warn!(family_id, error = %e, "document slot unavailable");
        unwind([ai]).await;
        return Err(e);
      }
    };

    // Step 4.
    let kind = request.kind();
    let prompt = prompt::document_prompt(kind, &member, &request.additional_info);
    let text = match self
      .services
      .generator
      .generate(&prompt, self.services.budget.document)
      .await
    {
      Ok(text) if !text.trim().is_empty() => text,
      Ok(_) => {
        warn!(family_id, "generator returned no text");
        unwind([ai, slot]).await;
        return Err(WorkflowError::GenerationFailed(
          "the generator returned no text".to_owned(),
        ));
      }
      Err(e) => {
        warn!(family_id, error = %e, "generation failed");
        unwind([ai, slot]).await;
        return Err(WorkflowError::GenerationFailed(e.to_string()));
      }
    };

    // Step 5.
    let bytes = match self.services.renderer.render(
      &request.title,
      text.trim(),
      Utc::now().date_naive(),
    ) {
      Ok(bytes) => bytes,
      Err(e) => {
        warn!(family_id, error = %e, "rendering failed");
        unwind([ai, slot]).await;
        return Err(WorkflowError::RenderFailed(e));
      }
    };

    // Step 6. The raw requested kind is what gets tagged, not the template
    // it resolved to.
    let upload = ArchiveUpload {
      bytes,
      filename: format!("{}.pdf", request.title),
      title: request.title.clone(),
      tags: vec![
        member.full_name.clone(),
        request.document_kind.clone(),
        GENERATED_TAG.to_owned(),
      ],
    };
    let archive = match self.services.archive.upload(upload).await {
      Ok(archive) => archive,
      Err(e) => {
        warn!(family_id, error = %e, "archive upload failed");
        unwind([ai, slot]).await;
        return Err(WorkflowError::ArchiveFailed(Box::new(e)));
      }
    };

    // Step 7.
    let record = NewDocument {
      family_id,
      member_id: member.member_id,
      document_type: DocumentType::Other,
      document_number: GENERATED_DOCUMENT_NUMBER.to_owned(),
      issuing_country: member.nationality.clone(),
      issuing_authority: None,
      issue_date: None,
      expiration_date: None,
      archive: Some(archive.clone()),
      title: request.title.clone(),
      description: Some(format!("AI-generated document - {}", request.document_kind)),
      tags: vec![
        member.full_name.clone(),
        request.document_kind.clone(),
        GENERATED_TAG.to_owned(),
      ],
    };
    let tokens = [ai.token(), slot.token()];
    match self
      .services
      .store
      .record_generated_document(record, &tokens)
      .await
    {
      Ok(document) => {
        ai.settled_by_store();
        slot.settled_by_store();
        info!(
          family_id,
          document_id = document.document_id,
          archive_id = archive.id,
          "generated document recorded"
        );
        Ok(GeneratedDocument { document, archive })
      }
      Err(e) => {
        error!(
          family_id,
          archive_id = archive.id,
          archive_url = %archive.url,
          error = %e,
          "document recorded in archive but not in the database; artifact is orphaned"
        );
        unwind([ai, slot]).await;
        Err(WorkflowError::PersistenceFailed(Box::new(e)))
      }
    }
  }

  /// Look up the requested member. Members outside the caller's family are
  /// reported as missing.
  async fn resolve_member(
    &self,
    claims: &ClaimSet,
    request: &DocumentRequest,
  ) -> Result<FamilyMember> {
    let member = self
      .services
      .store
      .get_member(request.member_id)
      .await
      .map_err(WorkflowError::from_store)?
      .ok_or_else(|| WorkflowError::NotFound(format!("member {}", request.member_id)))?;

    if !claims.is_platform_admin() && claims.family_id != Some(member.family_id) {
      return Err(WorkflowError::NotFound(format!("member {}", request.member_id)));
    }
    Ok(member)
  }
}

/// Release every reservation made so far. A release that fails at the store
/// leaves its handle armed, so `Drop` retries it in the background.
async fn unwind<S, const N: usize>(reservations: [Reservation<S>; N])
where
  S: FamilyStore + 'static,
{
  for reservation in reservations {
    let token = reservation.token();
    if let Err(e) = reservation.release().await {
      warn!(%token, error = %e, "release failed; retrying in the background");
    }
  }
}
