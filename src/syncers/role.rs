use std::sync::Arc;

use async_trait::async_trait;

use crate::catalog::Catalog;
use crate::cursor::{Page, Pager};
use crate::entitlements::{
    membership_entitlements, Entitlement, Grant, Resource, UserProfile, ADMIN_SLUG, MEMBER_SLUG,
};
use crate::error::{AccessError, AccessResult};
use crate::identity::{EntitlementId, GrantId, ResourceId, ResourceType};
use crate::models::RoleModel;
use crate::pool::DatabaseSource;
use crate::resolve::RoleDirectory;
use crate::statements::{grant_role, revoke_role};

use super::{principal_role, reject_parent, ResourceSyncer};

/// Roles, with membership as their entitlements.
pub struct RoleSyncer<S> {
    source: Arc<S>,
}

impl<S: DatabaseSource> RoleSyncer<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }

    async fn make_resource(&self, client: &S::Client, role: &RoleModel) -> AccessResult<Resource> {
        let mut resource = Resource::new(ResourceId::role(role.id), role.name.clone());
        resource.is_group = client.role_has_members(role.id).await?;
        resource.user = Some(UserProfile::from_role(role));
        Ok(resource)
    }

    /// The role an entitlement id refers to and whether it is the admin
    /// entitlement.
    async fn target_role(&self, client: &S::Client, entitlement: &EntitlementId) -> AccessResult<(RoleModel, bool)> {
        let role_id = entitlement.resource.expect_type(ResourceType::Role)?;
        let admin = match entitlement.slug.as_str() {
            MEMBER_SLUG => false,
            ADMIN_SLUG => true,
            other => {
                return Err(AccessError::unsupported(format!(
                    "unknown role entitlement {other:?}"
                )))
            }
        };
        Ok((client.get_role(role_id).await?, admin))
    }
}

#[async_trait]
impl<S: DatabaseSource + 'static> ResourceSyncer for RoleSyncer<S> {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Role
    }

    async fn list(&self, parent: Option<&ResourceId>, pager: &Pager) -> AccessResult<Page<Resource>> {
        reject_parent(parent, ResourceType::Role)?;

        let client = self.source.default_client();
        let roles = client.list_roles(pager).await?;

        let mut items = Vec::with_capacity(roles.items.len());
        for role in &roles.items {
            items.push(self.make_resource(&client, role).await?);
        }
        Ok(Page::new(items, roles.next_cursor))
    }

    async fn get(&self, id: &ResourceId) -> AccessResult<Resource> {
        let role_id = id.expect_type(ResourceType::Role)?;
        let client = self.source.default_client();
        let role = client.get_role(role_id).await?;
        self.make_resource(&client, &role).await
    }

    async fn entitlements(&self, resource: &Resource) -> AccessResult<Vec<Entitlement>> {
        if !resource.is_group {
            return Ok(Vec::new());
        }
        Ok(membership_entitlements(resource))
    }

    async fn grants(&self, resource: &Resource, pager: &Pager) -> AccessResult<Page<Grant>> {
        if !resource.is_group {
            return Ok(Page::last(Vec::new()));
        }

        let role_id = resource.id.expect_type(ResourceType::Role)?;
        let client = self.source.default_client();
        let members = client.list_role_members(role_id, pager).await?;

        Ok(members.map(|member| {
            let slug = if member.is_role_admin() {
                ADMIN_SLUG
            } else {
                MEMBER_SLUG
            };
            Grant::new(
                EntitlementId::new(resource.id.clone(), slug, false),
                ResourceId::role(member.id),
            )
        }))
    }

    async fn grant(&self, principal: &ResourceId, entitlement: &EntitlementId) -> AccessResult<()> {
        let client = self.source.default_client();
        let (role, admin) = self.target_role(&client, entitlement).await?;
        let member = principal_role(client.as_ref(), principal).await?;

        client
            .execute(&grant_role(&role.name, &member.name, admin))
            .await
    }

    async fn revoke(&self, grant: &GrantId) -> AccessResult<()> {
        let client = self.source.default_client();
        let (role, admin) = self.target_role(&client, &grant.entitlement).await?;
        let member = principal_role(client.as_ref(), &grant.principal).await?;

        client
            .execute(&revoke_role(&role.name, &member.name, admin))
            .await
    }
}
