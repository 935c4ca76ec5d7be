//! Family administration: the guarded CRUD around families, members and
//! their documents.

use std::sync::Arc;

use famdocs_core::{
  claims::{ClaimSet, Role},
  document::Document,
  family::{Family, FamilyId, FamilyMember, MemberId, NewFamily, NewMember},
  store::FamilyStore,
  subscription::Subscription,
};
use tracing::info;

use crate::{Result, WorkflowError, authorize, authorize_family_scope};

pub struct FamilyAdmin<S> {
  store: Arc<S>,
}

impl<S: FamilyStore> FamilyAdmin<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  pub async fn create_family(
    &self,
    claims: &ClaimSet,
    input: NewFamily,
  ) -> Result<(Family, Subscription)> {
    authorize(claims, &[Role::PlatformAdmin])?;
    let created = self
      .store
      .create_family(input)
      .await
      .map_err(WorkflowError::from_store)?;
    info!(family_id = created.0.family_id, plan = %created.1.plan, "family created");
    Ok(created)
  }

  pub async fn subscription(&self, claims: &ClaimSet, family_id: FamilyId) -> Result<Subscription> {
    authorize_family_scope(claims, family_id)?;
    self
      .store
      .get_subscription(family_id)
      .await
      .map_err(WorkflowError::from_store)?
      .ok_or(WorkflowError::SubscriptionNotFound(family_id))
  }

  pub async fn list_members(
    &self,
    claims: &ClaimSet,
    family_id: FamilyId,
  ) -> Result<Vec<FamilyMember>> {
    authorize(claims, &[Role::FamilyMember, Role::FamilyAdmin])?;
    authorize_family_scope(claims, family_id)?;
    self
      .store
      .list_members(family_id)
      .await
      .map_err(WorkflowError::from_store)
  }

  /// Add a member to `family_id`. The family in the path wins over any
  /// family id in the body.
  pub async fn add_member(
    &self,
    claims: &ClaimSet,
    family_id: FamilyId,
    mut input: NewMember,
  ) -> Result<FamilyMember> {
    authorize(claims, &[Role::FamilyAdmin])?;
    authorize_family_scope(claims, family_id)?;
    input.family_id = family_id;
    let member = self
      .store
      .add_member(input)
      .await
      .map_err(WorkflowError::from_store)?;
    info!(family_id, member_id = member.member_id, "member added");
    Ok(member)
  }

  pub async fn remove_member(
    &self,
    claims: &ClaimSet,
    family_id: FamilyId,
    member_id: MemberId,
  ) -> Result<()> {
    authorize(claims, &[Role::FamilyAdmin])?;
    authorize_family_scope(claims, family_id)?;
    self.member_in_family(family_id, member_id).await?;

    let deleted = self
      .store
      .delete_member(member_id)
      .await
      .map_err(WorkflowError::from_store)?;
    if !deleted {
      return Err(WorkflowError::NotFound(format!("member {member_id}")));
    }
    info!(family_id, member_id, "member removed");
    Ok(())
  }

  /// Documents of one member, scoped by the member's family.
  pub async fn member_documents(
    &self,
    claims: &ClaimSet,
    member_id: MemberId,
  ) -> Result<Vec<Document>> {
    let member = self
      .store
      .get_member(member_id)
      .await
      .map_err(WorkflowError::from_store)?
      .ok_or_else(|| WorkflowError::NotFound(format!("member {member_id}")))?;
    authorize_family_scope(claims, member.family_id)?;

    self
      .store
      .list_member_documents(member_id)
      .await
      .map_err(WorkflowError::from_store)
  }

  async fn member_in_family(&self, family_id: FamilyId, member_id: MemberId) -> Result<()> {
    match self
      .store
      .get_member(member_id)
      .await
      .map_err(WorkflowError::from_store)?
    {
      Some(m) if m.family_id == family_id => Ok(()),
      _ => Err(WorkflowError::NotFound(format!("member {member_id}"))),
    }
  }
}
