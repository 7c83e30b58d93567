use std::sync::Arc;

use async_trait::async_trait;

use crate::catalog::Catalog;
use crate::cursor::{Page, Pager};
use crate::entitlements::{entitlements_for_privileges, Entitlement, Grant, Resource};
use crate::error::{AccessError, AccessResult};
use crate::identity::{EntitlementId, GrantId, ResourceId, ResourceType};
use crate::models::ColumnModel;
use crate::pool::DatabaseSource;
use crate::statements::GrantTarget;

use super::{acl_grants, check_parent, database_tag, grant_on, revoke_on, ResourceSyncer};

/// Columns of a table, when column sync is enabled.
pub struct ColumnSyncer<S> {
    source: Arc<S>,
}

impl<S: DatabaseSource> ColumnSyncer<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }

    fn make_resource(tag: &str, column: &ColumnModel) -> Resource {
        Resource::new(
            ResourceId::column(tag, column.table_id, column.id),
            format!("{}.{}", column.table_name, column.name),
        )
        .with_parent(ResourceId::scoped(ResourceType::Table, tag, column.table_id))
    }

    async fn lookup(&self, id: &ResourceId) -> AccessResult<(Arc<S::Client>, ColumnModel)> {
        let ResourceId::Column {
            database,
            table_id,
            column_id,
        } = id
        else {
            return Err(AccessError::invalid_identity(
                id.to_string(),
                "expected a column id",
            ));
        };
        let client = self.source.get(database).await?;
        let column = client.get_column(*table_id, *column_id).await?;
        Ok((client, column))
    }
}

#[async_trait]
impl<S: DatabaseSource + 'static> ResourceSyncer for ColumnSyncer<S> {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Column
    }

    async fn list(&self, parent: Option<&ResourceId>, pager: &Pager) -> AccessResult<Page<Resource>> {
        let Some(parent) = check_parent(parent, ResourceType::Table)? else {
            return Ok(Page::last(Vec::new()));
        };

        let tag = database_tag(parent)?;
        let client = self.source.get(tag).await?;
        let columns = client.list_columns(parent.oid(), pager).await?;

        Ok(columns.map(|column| Self::make_resource(tag, &column)))
    }

    async fn get(&self, id: &ResourceId) -> AccessResult<Resource> {
        let (_, column) = self.lookup(id).await?;
        Ok(Self::make_resource(database_tag(id)?, &column))
    }

    async fn entitlements(&self, resource: &Resource) -> AccessResult<Vec<Entitlement>> {
        Ok(entitlements_for_privileges(resource, ColumnModel::PRIVILEGES))
    }

    async fn grants(&self, resource: &Resource, pager: &Pager) -> AccessResult<Page<Grant>> {
        let (client, column) = self.lookup(&resource.id).await?;
        acl_grants(client.as_ref(), &resource.id, &column, pager).await
    }

    async fn grant(&self, principal: &ResourceId, entitlement: &EntitlementId) -> AccessResult<()> {
        let (client, column) = self.lookup(&entitlement.resource).await?;
        grant_on(client.as_ref(), &GrantTarget::from(&column), principal, entitlement).await
    }

    async fn revoke(&self, grant: &GrantId) -> AccessResult<()> {
        let (client, column) = self.lookup(&grant.entitlement.resource).await?;
        revoke_on(client.as_ref(), &GrantTarget::from(&column), grant).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MemoryCatalog, MemoryCluster};
    use crate::models::RoleModel;

    fn column(id: i64, name: &str, acl: &[&str]) -> ColumnModel {
        ColumnModel {
            id,
            name: name.to_string(),
            table_id: 500,
            table_name: "users".into(),
            schema: "public".into(),
            owner_id: 10,
            acl: acl.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn cluster() -> Arc<MemoryCluster> {
        let app = MemoryCatalog::new("app")
            .with_role(RoleModel {
                id: 10,
                name: "owner".into(),
                ..Default::default()
            })
            .with_role(RoleModel {
                id: 20,
                name: "support".into(),
                can_login: true,
                ..Default::default()
            })
            .with_column(column(2, "email", &["support=r/owner"]))
            .with_column(column(1, "id", &[]));
        Arc::new(MemoryCluster::new(MemoryCatalog::new("postgres")).with_database(1, app))
    }

    #[tokio::test]
    async fn test_list_orders_by_attnum() {
        let syncer = ColumnSyncer::new(cluster());
        let table = ResourceId::scoped(ResourceType::Table, "1", 500);
        let page = syncer.list(Some(&table), &Pager::first(10)).await.unwrap();

        let ids: Vec<String> = page.items.iter().map(|r| r.id.to_string()).collect();
        assert_eq!(ids, vec!["1:column:500:1", "1:column:500:2"]);
        assert_eq!(page.items[1].display_name, "users.email");
        assert_eq!(page.items[1].parent, Some(table));
    }

    #[tokio::test]
    async fn test_column_grants_and_statements() {
        let source = cluster();
        let syncer = ColumnSyncer::new(Arc::clone(&source));
        let email = syncer
            .get(&ResourceId::column("1", 500, 2))
            .await
            .unwrap();

        let page = syncer.grants(&email, &Pager::first(10)).await.unwrap();
        let support: Vec<String> = page
            .items
            .iter()
            .filter(|g| g.principal == ResourceId::role(20))
            .map(|g| g.entitlement.slug.clone())
            .collect();
        assert_eq!(support, vec!["select"]);

        let update = EntitlementId::new(email.id.clone(), "update", false);
        syncer.grant(&ResourceId::role(20), &update).await.unwrap();
        syncer
            .revoke(&GrantId::new(update, ResourceId::role(20)))
            .await
            .unwrap();
        assert_eq!(
            source.catalog("1").unwrap().executed(),
            vec![
                "GRANT UPDATE (\"email\") ON TABLE \"public\".\"users\" TO \"support\"",
                "REVOKE UPDATE (\"email\") ON TABLE \"public\".\"users\" FROM \"support\"",
            ]
        );
    }

    #[tokio::test]
    async fn test_entitlements_cover_column_privileges() {
        let syncer = ColumnSyncer::new(cluster());
        let email = syncer
            .get(&ResourceId::column("1", 500, 2))
            .await
            .unwrap();
        let slugs: Vec<String> = syncer
            .entitlements(&email)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| !e.id.grant)
            .map(|e| e.id.slug)
            .collect();
        assert_eq!(slugs, vec!["insert", "select", "update", "references"]);
    }
}
