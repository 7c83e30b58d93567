use std::sync::Arc;

use async_trait::async_trait;

use crate::catalog::Catalog;
use crate::cursor::{Page, Pager};
use crate::entitlements::{entitlements_for_privileges, Entitlement, Grant, Resource};
use crate::error::AccessResult;
use crate::identity::{EntitlementId, GrantId, ResourceId, ResourceType};
use crate::models::SchemaModel;
use crate::pool::DatabaseSource;
use crate::statements::GrantTarget;

use super::{
    acl_grants, check_parent, database_parent, database_tag, grant_on, revoke_on, ResourceSyncer,
};

const SCHEMA_CHILDREN: [ResourceType; 5] = [
    ResourceType::Table,
    ResourceType::View,
    ResourceType::Function,
    ResourceType::Procedure,
    ResourceType::Sequence,
];

pub struct SchemaSyncer<S> {
    source: Arc<S>,
}

impl<S: DatabaseSource> SchemaSyncer<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }

    fn make_resource(database: &str, tag: &str, schema: &SchemaModel) -> Resource {
        let mut resource = Resource::new(
            ResourceId::scoped(ResourceType::Schema, tag, schema.id),
            format!("{database} - {}", schema.name),
        )
        .with_children(&SCHEMA_CHILDREN);
        resource.parent = database_parent(tag);
        resource
    }

    async fn lookup(&self, id: &ResourceId) -> AccessResult<(Arc<S::Client>, SchemaModel)> {
        let schema_id = id.expect_type(ResourceType::Schema)?;
        let client = self.source.get(database_tag(id)?).await?;
        let schema = client.get_schema(schema_id).await?;
        Ok((client, schema))
    }
}

#[async_trait]
impl<S: DatabaseSource + 'static> ResourceSyncer for SchemaSyncer<S> {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Schema
    }

    async fn list(&self, parent: Option<&ResourceId>, pager: &Pager) -> AccessResult<Page<Resource>> {
        let Some(parent) = check_parent(parent, ResourceType::Database)? else {
            return Ok(Page::last(Vec::new()));
        };

        let tag = parent.oid().to_string();
        let client = self.source.get(&tag).await?;
        let schemas = client.list_schemas(pager).await?;

        let database = client.database_name().to_string();
        Ok(schemas.map(|schema| Self::make_resource(&database, &tag, &schema)))
    }

    async fn get(&self, id: &ResourceId) -> AccessResult<Resource> {
        let (client, schema) = self.lookup(id).await?;
        Ok(Self::make_resource(
            client.database_name(),
            database_tag(id)?,
            &schema,
        ))
    }

    async fn entitlements(&self, resource: &Resource) -> AccessResult<Vec<Entitlement>> {
        Ok(entitlements_for_privileges(resource, SchemaModel::PRIVILEGES))
    }

    async fn grants(&self, resource: &Resource, pager: &Pager) -> AccessResult<Page<Grant>> {
        let (client, schema) = self.lookup(&resource.id).await?;
        acl_grants(client.as_ref(), &resource.id, &schema, pager).await
    }

    async fn grant(&self, principal: &ResourceId, entitlement: &EntitlementId) -> AccessResult<()> {
        let (client, schema) = self.lookup(&entitlement.resource).await?;
        grant_on(client.as_ref(), &GrantTarget::from(&schema), principal, entitlement).await
    }

    async fn revoke(&self, grant: &GrantId) -> AccessResult<()> {
        let (client, schema) = self.lookup(&grant.entitlement.resource).await?;
        revoke_on(client.as_ref(), &GrantTarget::from(&schema), grant).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MemoryCatalog, MemoryCluster};
    use crate::error::AccessError;
    use crate::models::RoleModel;

    fn cluster() -> Arc<MemoryCluster> {
        let roles = vec![
            RoleModel {
                id: 10,
                name: "owner".into(),
                inherit: true,
                ..Default::default()
            },
            RoleModel {
                id: 20,
                name: "analyst".into(),
                inherit: true,
                can_login: true,
                ..Default::default()
            },
        ];
        let app = MemoryCatalog::new("app")
            .with_roles(roles.clone())
            .with_schema(SchemaModel {
                id: 2200,
                name: "public".into(),
                owner_id: 10,
                acl: vec!["owner=UC/owner".into(), "analyst=U/owner".into()],
            })
            .with_schema(SchemaModel {
                id: 3000,
                name: "billing".into(),
                owner_id: 10,
                acl: vec![],
            });
        Arc::new(
            MemoryCluster::new(MemoryCatalog::new("postgres").with_roles(roles))
                .with_database(16384, app),
        )
    }

    #[tokio::test]
    async fn test_list_needs_database_parent() {
        let syncer = SchemaSyncer::new(cluster());
        let empty = syncer.list(None, &Pager::first(10)).await.unwrap();
        assert!(empty.items.is_empty() && empty.is_last());

        let wrong = ResourceId::role(10);
        assert!(matches!(
            syncer.list(Some(&wrong), &Pager::first(10)).await,
            Err(AccessError::InvalidIdentity { .. })
        ));

        let missing = ResourceId::database(99);
        assert!(matches!(
            syncer.list(Some(&missing), &Pager::first(10)).await,
            Err(AccessError::DatabaseNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_pages_schemas() {
        let syncer = SchemaSyncer::new(cluster());
        let parent = ResourceId::database(16384);

        let first = syncer.list(Some(&parent), &Pager::first(1)).await.unwrap();
        assert_eq!(first.items[0].display_name, "app - billing");
        assert_eq!(first.items[0].id.to_string(), "schema:db16384:3000");
        assert_eq!(first.items[0].parent, Some(parent.clone()));
        assert_eq!(first.next_cursor, "1");

        let second = syncer
            .list(Some(&parent), &Pager::new(first.next_cursor, 1))
            .await
            .unwrap();
        assert_eq!(second.items[0].display_name, "app - public");
        assert!(second.is_last());
    }

    #[tokio::test]
    async fn test_grants_and_provisioning() {
        let source = cluster();
        let syncer = SchemaSyncer::new(Arc::clone(&source));
        let public = syncer
            .get(&"schema:db16384:2200".parse().unwrap())
            .await
            .unwrap();

        let page = syncer.grants(&public, &Pager::first(10)).await.unwrap();
        let ids: Vec<String> = page.items.iter().map(|g| g.id.to_string()).collect();
        assert!(ids.contains(&"grant:entitlement:schema:db16384:2200:usage:role:20".to_string()));
        assert!(!ids.contains(&"grant:entitlement:schema:db16384:2200:create:role:20".to_string()));
        assert!(ids.contains(&"grant:entitlement:schema:db16384:2200:create:grant:role:10".to_string()));

        let create = EntitlementId::new(public.id.clone(), "create", false);
        syncer.grant(&ResourceId::role(20), &create).await.unwrap();
        let app = source.catalog("16384").unwrap();
        assert_eq!(
            app.executed(),
            vec!["GRANT CREATE ON SCHEMA \"public\" TO \"analyst\""]
        );
    }
}
