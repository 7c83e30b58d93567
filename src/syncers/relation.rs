use std::sync::Arc;

use async_trait::async_trait;

use crate::catalog::Catalog;
use crate::cursor::{Page, Pager};
use crate::entitlements::{entitlements_for_privileges, Entitlement, Grant, Resource};
use crate::error::AccessResult;
use crate::identity::{EntitlementId, GrantId, ResourceId, ResourceType};
use crate::models::{RelationKind, RelationModel};
use crate::pool::DatabaseSource;
use crate::statements::GrantTarget;

use super::{
    acl_grants, check_parent, database_tag, grant_on, revoke_on, ResourceSyncer, SyncSettings,
};

fn resource_type_of(kind: RelationKind) -> ResourceType {
    match kind {
        RelationKind::Table => ResourceType::Table,
        RelationKind::View => ResourceType::View,
        RelationKind::Sequence => ResourceType::Sequence,
    }
}

/// Tables, views or sequences of a schema.
pub struct RelationSyncer<S> {
    source: Arc<S>,
    kind: RelationKind,
    include_columns: bool,
}

impl<S: DatabaseSource> RelationSyncer<S> {
    pub fn new(source: Arc<S>, kind: RelationKind, settings: SyncSettings) -> Self {
        Self {
            source,
            kind,
            include_columns: settings.include_columns,
        }
    }

    fn make_resource(&self, tag: &str, relation: &RelationModel) -> Resource {
        let mut resource = Resource::new(
            ResourceId::scoped(resource_type_of(self.kind), tag, relation.id),
            format!("{}.{}", relation.schema, relation.name),
        )
        .with_parent(ResourceId::scoped(
            ResourceType::Schema,
            tag,
            relation.schema_id,
        ));
        if self.kind == RelationKind::Table && self.include_columns {
            resource = resource.with_children(&[ResourceType::Column]);
        }
        resource
    }

    async fn lookup(&self, id: &ResourceId) -> AccessResult<(Arc<S::Client>, RelationModel)> {
        let relation_id = id.expect_type(resource_type_of(self.kind))?;
        let client = self.source.get(database_tag(id)?).await?;
        let relation = client.get_relation(self.kind, relation_id).await?;
        Ok((client, relation))
    }
}

#[async_trait]
impl<S: DatabaseSource + 'static> ResourceSyncer for RelationSyncer<S> {
    fn resource_type(&self) -> ResourceType {
        resource_type_of(self.kind)
    }

    async fn list(&self, parent: Option<&ResourceId>, pager: &Pager) -> AccessResult<Page<Resource>> {
        let Some(parent) = check_parent(parent, ResourceType::Schema)? else {
            return Ok(Page::last(Vec::new()));
        };

        let tag = database_tag(parent)?;
        let client = self.source.get(tag).await?;
        let relations = client.list_relations(self.kind, parent.oid(), pager).await?;

        Ok(relations.map(|relation| self.make_resource(tag, &relation)))
    }

    async fn get(&self, id: &ResourceId) -> AccessResult<Resource> {
        let (_, relation) = self.lookup(id).await?;
        Ok(self.make_resource(database_tag(id)?, &relation))
    }

    async fn entitlements(&self, resource: &Resource) -> AccessResult<Vec<Entitlement>> {
        Ok(entitlements_for_privileges(resource, self.kind.privileges()))
    }

    async fn grants(&self, resource: &Resource, pager: &Pager) -> AccessResult<Page<Grant>> {
        let (client, relation) = self.lookup(&resource.id).await?;
        acl_grants(client.as_ref(), &resource.id, &relation, pager).await
    }

    async fn grant(&self, principal: &ResourceId, entitlement: &EntitlementId) -> AccessResult<()> {
        let (client, relation) = self.lookup(&entitlement.resource).await?;
        grant_on(client.as_ref(), &GrantTarget::from(&relation), principal, entitlement).await
    }

    async fn revoke(&self, grant: &GrantId) -> AccessResult<()> {
        let (client, relation) = self.lookup(&grant.entitlement.resource).await?;
        revoke_on(client.as_ref(), &GrantTarget::from(&relation), grant).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MemoryCatalog, MemoryCluster};
    use crate::error::AccessError;
    use crate::models::RoleModel;

    fn relation(id: i64, name: &str, kind: RelationKind, acl: &[&str]) -> RelationModel {
        RelationModel {
            id,
            name: name.to_string(),
            schema_id: 2200,
            schema: "public".into(),
            owner_id: 10,
            kind,
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
                name: "readers".into(),
                ..Default::default()
            })
            .with_role(RoleModel {
                id: 30,
                name: "carol".into(),
                inherit: true,
                can_login: true,
                member_of: vec![20],
                ..Default::default()
            })
            .with_relation(relation(
                500,
                "users",
                RelationKind::Table,
                &["owner=arwdDxt/owner", "readers=r/owner"],
            ))
            .with_relation(relation(501, "active_users", RelationKind::View, &[]))
            .with_relation(relation(502, "users_id_seq", RelationKind::Sequence, &[]));
        Arc::new(MemoryCluster::new(MemoryCatalog::new("postgres")).with_database(1, app))
    }

    fn settings(include_columns: bool) -> SyncSettings {
        SyncSettings {
            include_columns,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_list_filters_by_kind() {
        let source = cluster();
        let schema = ResourceId::scoped(ResourceType::Schema, "1", 2200);

        let tables = RelationSyncer::new(Arc::clone(&source), RelationKind::Table, settings(true));
        let page = tables.list(Some(&schema), &Pager::first(10)).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id.to_string(), "table:db1:500");
        assert_eq!(page.items[0].display_name, "public.users");
        assert_eq!(page.items[0].child_types, vec![ResourceType::Column]);

        let views = RelationSyncer::new(Arc::clone(&source), RelationKind::View, settings(true));
        let page = views.list(Some(&schema), &Pager::first(10)).await.unwrap();
        assert_eq!(page.items[0].id.to_string(), "view:db1:501");
        assert!(page.items[0].child_types.is_empty());
    }

    #[tokio::test]
    async fn test_table_grants_follow_membership() {
        let syncer = RelationSyncer::new(cluster(), RelationKind::Table, settings(false));
        let users = syncer
            .get(&ResourceId::scoped(ResourceType::Table, "1", 500))
            .await
            .unwrap();
        assert!(users.child_types.is_empty());

        let page = syncer.grants(&users, &Pager::first(10)).await.unwrap();
        let carol: Vec<String> = page
            .items
            .iter()
            .filter(|g| g.principal == ResourceId::role(30))
            .map(|g| g.entitlement.to_string())
            .collect();
        assert_eq!(carol, vec!["entitlement:table:db1:500:select"]);

        let owner = page
            .items
            .iter()
            .filter(|g| g.principal == ResourceId::role(10))
            .count();
        assert_eq!(owner, 14);
    }

    #[tokio::test]
    async fn test_sequence_provisioning() {
        let source = cluster();
        let syncer = RelationSyncer::new(Arc::clone(&source), RelationKind::Sequence, settings(false));
        let seq = ResourceId::scoped(ResourceType::Sequence, "1", 502);

        let usage = EntitlementId::new(seq.clone(), "usage", false);
        syncer.grant(&ResourceId::role(30), &usage).await.unwrap();

        let delete = EntitlementId::new(seq, "delete", false);
        assert!(matches!(
            syncer.grant(&ResourceId::role(30), &delete).await,
            Err(AccessError::UnsupportedOperation(_))
        ));

        assert_eq!(
            source.catalog("1").unwrap().executed(),
            vec!["GRANT USAGE ON SEQUENCE \"public\".\"users_id_seq\" TO \"carol\""]
        );
    }

    #[tokio::test]
    async fn test_wrong_kind_id_is_rejected() {
        let syncer = RelationSyncer::new(cluster(), RelationKind::Table, settings(false));
        let view = ResourceId::scoped(ResourceType::View, "1", 501);
        assert!(matches!(
            syncer.get(&view).await,
            Err(AccessError::InvalidIdentity { .. })
        ));
    }
}
