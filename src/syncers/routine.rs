use std::sync::Arc;

use async_trait::async_trait;

use crate::catalog::Catalog;
use crate::cursor::{Page, Pager};
use crate::entitlements::{entitlements_for_privileges, Entitlement, Grant, Resource};
use crate::error::AccessResult;
use crate::identity::{EntitlementId, GrantId, ResourceId, ResourceType};
use crate::models::{RoutineKind, RoutineModel};
use crate::pool::DatabaseSource;
use crate::privileges::PrivilegeSet;
use crate::statements::GrantTarget;

use super::{acl_grants, check_parent, database_tag, grant_on, revoke_on, ResourceSyncer};

fn resource_type_of(kind: RoutineKind) -> ResourceType {
    match kind {
        RoutineKind::Function => ResourceType::Function,
        RoutineKind::Procedure => ResourceType::Procedure,
    }
}

/// Functions or procedures of a schema.
pub struct RoutineSyncer<S> {
    source: Arc<S>,
    kind: RoutineKind,
}

impl<S: DatabaseSource> RoutineSyncer<S> {
    pub fn new(source: Arc<S>, kind: RoutineKind) -> Self {
        Self { source, kind }
    }

    fn make_resource(&self, tag: &str, routine: &RoutineModel) -> Resource {
        Resource::new(
            ResourceId::scoped(resource_type_of(self.kind), tag, routine.id),
            format!("{}.{}", routine.schema, routine.signature()),
        )
        .with_parent(ResourceId::scoped(ResourceType::Schema, tag, routine.schema_id))
    }

    async fn lookup(&self, id: &ResourceId) -> AccessResult<(Arc<S::Client>, RoutineModel)> {
        let routine_id = id.expect_type(resource_type_of(self.kind))?;
        let client = self.source.get(database_tag(id)?).await?;
        let routine = client.get_routine(self.kind, routine_id).await?;
        Ok((client, routine))
    }
}

#[async_trait]
impl<S: DatabaseSource + 'static> ResourceSyncer for RoutineSyncer<S> {
    fn resource_type(&self) -> ResourceType {
        resource_type_of(self.kind)
    }

    async fn list(&self, parent: Option<&ResourceId>, pager: &Pager) -> AccessResult<Page<Resource>> {
        let Some(parent) = check_parent(parent, ResourceType::Schema)? else {
            return Ok(Page::last(Vec::new()));
        };

        let tag = database_tag(parent)?;
        let client = self.source.get(tag).await?;
        let routines = client.list_routines(self.kind, parent.oid(), pager).await?;

        Ok(routines.map(|routine| self.make_resource(tag, &routine)))
    }

    async fn get(&self, id: &ResourceId) -> AccessResult<Resource> {
        let (_, routine) = self.lookup(id).await?;
        Ok(self.make_resource(database_tag(id)?, &routine))
    }

    async fn entitlements(&self, resource: &Resource) -> AccessResult<Vec<Entitlement>> {
        Ok(entitlements_for_privileges(resource, PrivilegeSet::EXECUTE))
    }

    async fn grants(&self, resource: &Resource, pager: &Pager) -> AccessResult<Page<Grant>> {
        let (client, routine) = self.lookup(&resource.id).await?;
        acl_grants(client.as_ref(), &resource.id, &routine, pager).await
    }

    async fn grant(&self, principal: &ResourceId, entitlement: &EntitlementId) -> AccessResult<()> {
        let (client, routine) = self.lookup(&entitlement.resource).await?;
        grant_on(client.as_ref(), &GrantTarget::from(&routine), principal, entitlement).await
    }

    async fn revoke(&self, grant: &GrantId) -> AccessResult<()> {
        let (client, routine) = self.lookup(&grant.entitlement.resource).await?;
        revoke_on(client.as_ref(), &GrantTarget::from(&routine), grant).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MemoryCatalog, MemoryCluster};
    use crate::models::RoleModel;

    fn routine(id: i64, name: &str, kind: RoutineKind, acl: &[&str]) -> RoutineModel {
        RoutineModel {
            id,
            name: name.to_string(),
            schema_id: 2200,
            schema: "public".into(),
            owner_id: 10,
            kind,
            arguments: "user_id integer".into(),
            return_type: (kind == RoutineKind::Function).then(|| "boolean".to_string()),
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
                name: "web".into(),
                can_login: true,
                ..Default::default()
            })
            .with_routine(routine(700, "is_admin", RoutineKind::Function, &[]))
            .with_routine(routine(
                701,
                "purge",
                RoutineKind::Procedure,
                &["owner=X/owner"],
            ));
        Arc::new(MemoryCluster::new(MemoryCatalog::new("postgres")).with_database(1, app))
    }

    #[tokio::test]
    async fn test_functions_default_to_public_execute() {
        let syncer = RoutineSyncer::new(cluster(), RoutineKind::Function);
        let schema = ResourceId::scoped(ResourceType::Schema, "1", 2200);
        let page = syncer.list(Some(&schema), &Pager::first(10)).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].display_name, "public.is_admin(user_id integer)");

        let grants = syncer.grants(&page.items[0], &Pager::first(10)).await.unwrap();
        let web: Vec<String> = grants
            .items
            .iter()
            .filter(|g| g.principal == ResourceId::role(20))
            .map(|g| g.id.to_string())
            .collect();
        assert_eq!(web, vec!["grant:entitlement:function:db1:700:execute:role:20"]);
    }

    #[tokio::test]
    async fn test_procedure_grants_and_grant_option() {
        let source = cluster();
        let syncer = RoutineSyncer::new(Arc::clone(&source), RoutineKind::Procedure);
        let purge = syncer
            .get(&ResourceId::scoped(ResourceType::Procedure, "1", 701))
            .await
            .unwrap();

        let grants = syncer.grants(&purge, &Pager::first(10)).await.unwrap();
        let ids: Vec<String> = grants.items.iter().map(|g| g.id.to_string()).collect();
        assert_eq!(
            ids,
            vec![
                "grant:entitlement:procedure:db1:701:execute:role:10",
                "grant:entitlement:procedure:db1:701:execute:grant:role:10",
                "grant:entitlement:procedure:db1:701:execute:role:20",
            ]
        );

        let execute = EntitlementId::new(purge.id.clone(), "execute", true);
        syncer.grant(&ResourceId::role(20), &execute).await.unwrap();
        assert_eq!(
            source.catalog("1").unwrap().executed(),
            vec![
                "GRANT EXECUTE ON PROCEDURE \"public\".\"purge\"(user_id integer) TO \"web\" WITH GRANT OPTION"
            ]
        );
    }
}
