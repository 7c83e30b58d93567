use std::sync::Arc;

use async_trait::async_trait;
use tokio_postgres::error::SqlState;

use crate::catalog::Catalog;
use crate::cursor::{Page, Pager};
use crate::entitlements::{
    attribute_grants, entitlements_for_privileges, Entitlement, Grant, Resource, RoleAttribute,
};
use crate::error::{AccessError, AccessResult};
use crate::identity::{EntitlementId, GrantId, ResourceId, ResourceType};
use crate::models::DatabaseModel;
use crate::pool::DatabaseSource;
use crate::statements::GrantTarget;

use super::{grant_on, grants_for_roles, reject_parent, revoke_on, ResourceSyncer, SyncSettings};

/// Databases of the cluster, with role attributes as extra entitlements.
pub struct DatabaseSyncer<S> {
    source: Arc<S>,
    settings: SyncSettings,
}

impl<S: DatabaseSource> DatabaseSyncer<S> {
    pub fn new(source: Arc<S>, settings: SyncSettings) -> Self {
        Self { source, settings }
    }

    fn make_resource(&self, database: &DatabaseModel) -> Resource {
        let mut children = vec![ResourceType::Schema];
        if self.settings.include_large_objects {
            children.push(ResourceType::LargeObject);
        }
        Resource::new(ResourceId::database(database.id), database.name.clone())
            .with_children(&children)
    }

    /// Whether `database` should be listed: it passes the default-database
    /// filter and accepts connections.
    async fn is_listed(&self, database: &DatabaseModel) -> AccessResult<bool> {
        if !self.settings.sync_all_databases {
            if let Some(name) = self.source.default_database() {
                if name != database.name {
                    return Ok(false);
                }
            }
        }

        match self.source.get(&database.id.to_string()).await {
            Ok(_) => Ok(true),
            Err(err @ (AccessError::Connection { .. } | AccessError::Pool(_))) => {
                if err.sql_state() == Some(&SqlState::OBJECT_NOT_IN_PREREQUISITE_STATE) {
                    log::info!(
                        "skipping database {} that does not accept connections",
                        database.name
                    );
                } else {
                    log::warn!("skipping database {}: {err}", database.name);
                }
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Refuses role attribute entitlements, which no statement on the
    /// database can change.
    fn check_privilege_entitlement(entitlement: &EntitlementId) -> AccessResult<i64> {
        let database_id = entitlement.resource.expect_type(ResourceType::Database)?;
        if let Some(attribute) = RoleAttribute::from_slug(&entitlement.slug) {
            return Err(AccessError::unsupported(format!(
                "the {} attribute cannot be granted or revoked on a database",
                attribute.display_name()
            )));
        }
        Ok(database_id)
    }
}

#[async_trait]
impl<S: DatabaseSource + 'static> ResourceSyncer for DatabaseSyncer<S> {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Database
    }

    async fn list(&self, parent: Option<&ResourceId>, pager: &Pager) -> AccessResult<Page<Resource>> {
        reject_parent(parent, ResourceType::Database)?;

        let databases = self.source.default_client().list_databases(pager).await?;

        let mut items = Vec::new();
        for database in &databases.items {
            if self.is_listed(database).await? {
                items.push(self.make_resource(database));
            }
        }
        Ok(Page::new(items, databases.next_cursor))
    }

    async fn get(&self, id: &ResourceId) -> AccessResult<Resource> {
        let database_id = id.expect_type(ResourceType::Database)?;
        let database = self.source.default_client().get_database(database_id).await?;
        Ok(self.make_resource(&database))
    }

    async fn entitlements(&self, resource: &Resource) -> AccessResult<Vec<Entitlement>> {
        let mut entitlements = entitlements_for_privileges(resource, DatabaseModel::PRIVILEGES);
        entitlements.extend(
            RoleAttribute::ALL
                .into_iter()
                .map(|attribute| attribute.entitlement(resource)),
        );
        Ok(entitlements)
    }

    async fn grants(&self, resource: &Resource, pager: &Pager) -> AccessResult<Page<Grant>> {
        let database_id = resource.id.expect_type(ResourceType::Database)?;
        let client = self.source.default_client();
        let database = client.get_database(database_id).await?;

        let roles = client.list_roles(pager).await?;
        let mut grants =
            grants_for_roles(client.as_ref(), &resource.id, &database, &roles.items).await?;
        grants.extend(attribute_grants(&resource.id, &roles.items));
        Ok(Page::new(grants, roles.next_cursor))
    }

    async fn grant(&self, principal: &ResourceId, entitlement: &EntitlementId) -> AccessResult<()> {
        let database_id = Self::check_privilege_entitlement(entitlement)?;
        let client = self.source.default_client();
        let database = client.get_database(database_id).await?;
        grant_on(client.as_ref(), &GrantTarget::from(&database), principal, entitlement).await
    }

    async fn revoke(&self, grant: &GrantId) -> AccessResult<()> {
        let database_id = Self::check_privilege_entitlement(&grant.entitlement)?;
        let client = self.source.default_client();
        let database = client.get_database(database_id).await?;
        revoke_on(client.as_ref(), &GrantTarget::from(&database), grant).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MemoryCatalog, MemoryCluster};
    use crate::models::RoleModel;

    fn database(id: i64, name: &str, acl: &[&str]) -> DatabaseModel {
        DatabaseModel {
            id,
            name: name.to_string(),
            owner_id: 10,
            acl: acl.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn cluster() -> MemoryCluster {
        let catalog = MemoryCatalog::new("app")
            .with_role(RoleModel {
                id: 10,
                name: "postgres".into(),
                superuser: true,
                create_db: true,
                inherit: true,
                ..Default::default()
            })
            .with_role(RoleModel {
                id: 20,
                name: "app_user".into(),
                inherit: true,
                can_login: true,
                ..Default::default()
            })
            .with_database(database(1, "app", &["=Tc/postgres", "app_user=C/postgres"]))
            .with_database(database(2, "reports", &[]))
            .with_database(database(3, "template0", &["=c/postgres"]));

        MemoryCluster::new(catalog)
            .with_database(1, MemoryCatalog::new("app"))
            .with_database(2, MemoryCatalog::new("reports"))
            .with_unreachable(3)
    }

    fn all_databases() -> SyncSettings {
        SyncSettings {
            sync_all_databases: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_list_skips_unreachable() {
        let syncer = DatabaseSyncer::new(Arc::new(cluster()), all_databases());
        let page = syncer.list(None, &Pager::first(10)).await.unwrap();

        let names: Vec<&str> = page.items.iter().map(|r| r.display_name.as_str()).collect();
        assert_eq!(names, vec!["app", "reports"]);
        assert_eq!(page.items[0].child_types, vec![ResourceType::Schema]);
    }

    #[tokio::test]
    async fn test_list_defaults_to_dsn_database() {
        let source = Arc::new(cluster().with_default_database("reports"));
        let syncer = DatabaseSyncer::new(Arc::clone(&source), SyncSettings::default());
        let page = syncer.list(None, &Pager::first(10)).await.unwrap();
        let names: Vec<&str> = page.items.iter().map(|r| r.display_name.as_str()).collect();
        assert_eq!(names, vec!["reports"]);

        let syncer = DatabaseSyncer::new(source, all_databases());
        let page = syncer.list(None, &Pager::first(10)).await.unwrap();
        assert_eq!(page.items.len(), 2);
    }

    #[tokio::test]
    async fn test_entitlements_include_attributes() {
        let syncer = DatabaseSyncer::new(Arc::new(cluster()), all_databases());
        let app = syncer.get(&ResourceId::database(1)).await.unwrap();
        let ents = syncer.entitlements(&app).await.unwrap();

        let ids: Vec<String> = ents.iter().map(|e| e.id.to_string()).collect();
        assert_eq!(ids.len(), 6 + 5);
        assert!(ids.contains(&"entitlement:database:1:connect:grant".to_string()));
        assert!(ids.contains(&"entitlement:database:1:create-db".to_string()));

        let replication = ents.iter().find(|e| e.id.slug == "replication").unwrap();
        assert_eq!(replication.slug, "replication");
    }

    #[tokio::test]
    async fn test_grants_combine_acl_and_attributes() {
        let syncer = DatabaseSyncer::new(Arc::new(cluster()), all_databases());
        let app = syncer.get(&ResourceId::database(1)).await.unwrap();
        let page = syncer.grants(&app, &Pager::first(10)).await.unwrap();

        let ids: Vec<String> = page.items.iter().map(|g| g.id.to_string()).collect();
        assert!(ids.contains(&"grant:entitlement:database:1:create:role:20".to_string()));
        assert!(ids.contains(&"grant:entitlement:database:1:temporary:role:20".to_string()));
        assert!(ids.contains(&"grant:entitlement:database:1:create:grant:role:10".to_string()));
        assert!(ids.contains(&"grant:entitlement:database:1:superuser:role:10".to_string()));
        assert!(ids.contains(&"grant:entitlement:database:1:create-db:role:10".to_string()));
        assert!(!ids.contains(&"grant:entitlement:database:1:superuser:role:20".to_string()));
    }

    #[tokio::test]
    async fn test_grant_privilege_and_refuse_attribute() {
        let source = Arc::new(cluster());
        let syncer = DatabaseSyncer::new(Arc::clone(&source), all_databases());

        let connect = EntitlementId::new(ResourceId::database(2), "connect", true);
        syncer.grant(&ResourceId::role(20), &connect).await.unwrap();
        syncer
            .revoke(&GrantId::new(connect, ResourceId::role(20)))
            .await
            .unwrap();
        assert_eq!(
            source.default_client().executed(),
            vec![
                "GRANT CONNECT ON DATABASE \"reports\" TO \"app_user\" WITH GRANT OPTION",
                "REVOKE GRANT OPTION FOR CONNECT ON DATABASE \"reports\" FROM \"app_user\"",
            ]
        );

        let superuser = EntitlementId::new(ResourceId::database(2), "superuser", false);
        let err = syncer
            .grant(&ResourceId::role(20), &superuser)
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::UnsupportedOperation(_)));
    }
}
