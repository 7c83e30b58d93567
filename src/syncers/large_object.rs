//! Large objects, listed per database.
//!
//! Large object OIDs are only unique within one database, so their ids carry
//! the database tag (`large_object:db<tag>:<oid>`) and their parent is the
//! database resource.

use std::sync::Arc;

use async_trait::async_trait;

use crate::catalog::Catalog;
use crate::cursor::{Page, Pager};
use crate::entitlements::{entitlements_for_privileges, Entitlement, Grant, Resource};
use crate::error::AccessResult;
use crate::identity::{EntitlementId, GrantId, ResourceId, ResourceType};
use crate::models::LargeObjectModel;
use crate::pool::DatabaseSource;
use crate::statements::GrantTarget;

use super::{
    acl_grants, check_parent, database_parent, database_tag, grant_on, revoke_on, ResourceSyncer,
};

/// Large objects of a database, when large object sync is enabled.
pub struct LargeObjectSyncer<S> {
    source: Arc<S>,
}

impl<S: DatabaseSource> LargeObjectSyncer<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }

    fn make_resource(tag: &str, large_object: &LargeObjectModel) -> Resource {
        let mut resource = Resource::new(
            ResourceId::scoped(ResourceType::LargeObject, tag, large_object.id),
            large_object.id.to_string(),
        );
        resource.parent = database_parent(tag);
        resource
    }

    async fn lookup(&self, id: &ResourceId) -> AccessResult<(Arc<S::Client>, LargeObjectModel)> {
        let oid = id.expect_type(ResourceType::LargeObject)?;
        let client = self.source.get(database_tag(id)?).await?;
        let large_object = client.get_large_object(oid).await?;
        Ok((client, large_object))
    }
}

#[async_trait]
impl<S: DatabaseSource + 'static> ResourceSyncer for LargeObjectSyncer<S> {
    fn resource_type(&self) -> ResourceType {
        ResourceType::LargeObject
    }

    async fn list(&self, parent: Option<&ResourceId>, pager: &Pager) -> AccessResult<Page<Resource>> {
        let Some(parent) = check_parent(parent, ResourceType::Database)? else {
            return Ok(Page::last(Vec::new()));
        };

        let tag = parent.oid().to_string();
        let client = self.source.get(&tag).await?;
        let large_objects = client.list_large_objects(pager).await?;

        Ok(large_objects.map(|lo| Self::make_resource(&tag, &lo)))
    }

    async fn get(&self, id: &ResourceId) -> AccessResult<Resource> {
        let (_, large_object) = self.lookup(id).await?;
        Ok(Self::make_resource(database_tag(id)?, &large_object))
    }

    async fn entitlements(&self, resource: &Resource) -> AccessResult<Vec<Entitlement>> {
        Ok(entitlements_for_privileges(resource, LargeObjectModel::PRIVILEGES))
    }

    async fn grants(&self, resource: &Resource, pager: &Pager) -> AccessResult<Page<Grant>> {
        let (client, large_object) = self.lookup(&resource.id).await?;
        acl_grants(client.as_ref(), &resource.id, &large_object, pager).await
    }

    async fn grant(&self, principal: &ResourceId, entitlement: &EntitlementId) -> AccessResult<()> {
        let (client, large_object) = self.lookup(&entitlement.resource).await?;
        grant_on(client.as_ref(), &GrantTarget::from(&large_object), principal, entitlement).await
    }

    async fn revoke(&self, grant: &GrantId) -> AccessResult<()> {
        let (client, large_object) = self.lookup(&grant.entitlement.resource).await?;
        revoke_on(client.as_ref(), &GrantTarget::from(&large_object), grant).await
    }
}
