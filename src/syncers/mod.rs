//! Per-kind resource syncers.
//!
//! A [`ResourceSyncer`] lists one kind of resource, describes its
//! entitlements, resolves who holds them and provisions changes. The
//! [`Connector`] owns one syncer per enabled kind and routes identifiers to
//! the right one.

mod column;
mod database;
mod large_object;
mod relation;
mod role;
mod routine;
mod schema;

pub use column::ColumnSyncer;
pub use database::DatabaseSyncer;
pub use large_object::LargeObjectSyncer;
pub use relation::RelationSyncer;
pub use role::RoleSyncer;
pub use routine::RoutineSyncer;
pub use schema::SchemaSyncer;

use std::sync::Arc;

use async_trait::async_trait;

use crate::acl::AclResource;
use crate::catalog::Catalog;
use crate::config::Config;
use crate::cursor::{Page, Pager};
use crate::entitlements::{Entitlement, Grant, Resource};
use crate::error::{AccessError, AccessResult};
use crate::identity::{EntitlementId, GrantId, ResourceId, ResourceType};
use crate::models::{RelationKind, RoleModel, RoutineKind};
use crate::pool::{ClientPool, DatabaseSource};
use crate::resolve::resolve_grants;
use crate::statements::{grant_privilege, normalize_privilege, revoke_privilege, GrantTarget};

/// Lists, describes and provisions one kind of resource.
#[async_trait]
pub trait ResourceSyncer: Send + Sync {
    fn resource_type(&self) -> ResourceType;

    /// One page of resources under `parent`. Kinds that need a parent return
    /// an empty page when there is none.
    async fn list(&self, parent: Option<&ResourceId>, pager: &Pager) -> AccessResult<Page<Resource>>;

    async fn get(&self, id: &ResourceId) -> AccessResult<Resource>;

    async fn entitlements(&self, resource: &Resource) -> AccessResult<Vec<Entitlement>>;

    /// One page of grants on `resource`, paged over candidate roles.
    async fn grants(&self, resource: &Resource, pager: &Pager) -> AccessResult<Page<Grant>>;

    async fn grant(&self, principal: &ResourceId, entitlement: &EntitlementId) -> AccessResult<()>;

    async fn revoke(&self, grant: &GrantId) -> AccessResult<()>;
}

/// Which optional kinds are synced and how databases are filtered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSettings {
    pub include_columns: bool,
    pub include_large_objects: bool,
    pub sync_all_databases: bool,
}

impl From<&Config> for SyncSettings {
    fn from(config: &Config) -> Self {
        Self {
            include_columns: config.include_columns,
            include_large_objects: config.include_large_objects,
            sync_all_databases: config.sync_all_databases,
        }
    }
}

/// Every enabled syncer over one [`DatabaseSource`].
pub struct Connector<S> {
    source: Arc<S>,
    syncers: Vec<Box<dyn ResourceSyncer>>,
}

impl Connector<ClientPool> {
    /// Opens the client pool described by `config`.
    pub async fn connect(config: &Config) -> AccessResult<Self> {
        let pool = ClientPool::connect(&config.dsn, config.pool_options()).await?;
        Ok(Self::new(Arc::new(pool), SyncSettings::from(config)))
    }

    pub fn close(&self) {
        self.source.close();
    }
}

impl<S: DatabaseSource + 'static> Connector<S> {
    pub fn new(source: Arc<S>, settings: SyncSettings) -> Self {
        let mut syncers: Vec<Box<dyn ResourceSyncer>> = vec![
            Box::new(RoleSyncer::new(Arc::clone(&source))),
            Box::new(DatabaseSyncer::new(Arc::clone(&source), settings)),
            Box::new(SchemaSyncer::new(Arc::clone(&source))),
            Box::new(RelationSyncer::new(Arc::clone(&source), RelationKind::Table, settings)),
            Box::new(RelationSyncer::new(Arc::clone(&source), RelationKind::View, settings)),
            Box::new(RelationSyncer::new(Arc::clone(&source), RelationKind::Sequence, settings)),
            Box::new(RoutineSyncer::new(Arc::clone(&source), RoutineKind::Function)),
            Box::new(RoutineSyncer::new(Arc::clone(&source), RoutineKind::Procedure)),
        ];
        if settings.include_columns {
            syncers.push(Box::new(ColumnSyncer::new(Arc::clone(&source))));
        }
        if settings.include_large_objects {
            syncers.push(Box::new(LargeObjectSyncer::new(Arc::clone(&source))));
        }

        Self { source, syncers }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn resource_types(&self) -> Vec<ResourceType> {
        self.syncers.iter().map(|s| s.resource_type()).collect()
    }

    /// The syncer for `resource_type`, if that kind is enabled.
    pub fn syncer(&self, resource_type: ResourceType) -> AccessResult<&dyn ResourceSyncer> {
        self.syncers
            .iter()
            .find(|s| s.resource_type() == resource_type)
            .map(|s| s.as_ref())
            .ok_or_else(|| {
                AccessError::unsupported(format!("{resource_type} resources are not synced"))
            })
    }

    pub async fn list(
        &self,
        resource_type: ResourceType,
        parent: Option<&ResourceId>,
        pager: &Pager,
    ) -> AccessResult<Page<Resource>> {
        self.syncer(resource_type)?.list(parent, pager).await
    }

    pub async fn get(&self, id: &ResourceId) -> AccessResult<Resource> {
        self.syncer(id.resource_type())?.get(id).await
    }

    pub async fn entitlements(&self, id: &ResourceId) -> AccessResult<Vec<Entitlement>> {
        let syncer = self.syncer(id.resource_type())?;
        let resource = syncer.get(id).await?;
        syncer.entitlements(&resource).await
    }

    pub async fn grants(&self, id: &ResourceId, pager: &Pager) -> AccessResult<Page<Grant>> {
        let syncer = self.syncer(id.resource_type())?;
        let resource = syncer.get(id).await?;
        syncer.grants(&resource, pager).await
    }

    pub async fn grant(&self, principal: &ResourceId, entitlement: &EntitlementId) -> AccessResult<()> {
        self.syncer(entitlement.resource.resource_type())?
            .grant(principal, entitlement)
            .await
    }

    pub async fn revoke(&self, grant: &GrantId) -> AccessResult<()> {
        self.syncer(grant.entitlement.resource.resource_type())?
            .revoke(grant)
            .await
    }
}

/// Accepts no parent or a parent of type `expected`.
pub(crate) fn check_parent(
    parent: Option<&ResourceId>,
    expected: ResourceType,
) -> AccessResult<Option<&ResourceId>> {
    match parent {
        None => Ok(None),
        Some(id) if id.resource_type() == expected => Ok(Some(id)),
        Some(id) => Err(AccessError::invalid_identity(
            id.to_string(),
            format!("expected a {expected} parent"),
        )),
    }
}

/// Rejects any parent for top-level kinds.
pub(crate) fn reject_parent(parent: Option<&ResourceId>, resource_type: ResourceType) -> AccessResult<()> {
    match parent {
        None => Ok(()),
        Some(id) => Err(AccessError::invalid_identity(
            id.to_string(),
            format!("{resource_type} resources have no parent"),
        )),
    }
}

/// The database tag of a scoped id.
pub(crate) fn database_tag(id: &ResourceId) -> AccessResult<&str> {
    id.database_tag()
        .ok_or_else(|| AccessError::invalid_identity(id.to_string(), "missing database tag"))
}

/// The role a grant is for. Only roles can receive entitlements.
pub(crate) async fn principal_role<C>(client: &C, principal: &ResourceId) -> AccessResult<RoleModel>
where
    C: Catalog + ?Sized,
{
    if principal.resource_type() != ResourceType::Role {
        return Err(AccessError::unsupported(format!(
            "only roles can be granted entitlements, got {principal}"
        )));
    }
    client.get_role(principal.oid()).await
}

/// Resolves the ACL grants on `object` for one page of roles.
pub(crate) async fn acl_grants<C, R>(
    client: &C,
    resource_id: &ResourceId,
    object: &R,
    pager: &Pager,
) -> AccessResult<Page<Grant>>
where
    C: Catalog + ?Sized,
    R: AclResource + Sync,
{
    let roles = client.list_roles(pager).await?;
    let grants = grants_for_roles(client, resource_id, object, &roles.items).await?;
    Ok(Page::new(grants, roles.next_cursor))
}

/// Resolves the ACL grants on `object` for `roles`.
pub(crate) async fn grants_for_roles<C, R>(
    client: &C,
    resource_id: &ResourceId,
    object: &R,
    roles: &[RoleModel],
) -> AccessResult<Vec<Grant>>
where
    C: Catalog + ?Sized,
    R: AclResource + Sync,
{
    let grants = resolve_grants(resource_id, object, roles, client).await?;
    Ok(grants.into_iter().map(Grant::from).collect())
}

/// Issues the GRANT for a privilege entitlement.
pub(crate) async fn grant_on<C>(
    client: &C,
    target: &GrantTarget,
    principal: &ResourceId,
    entitlement: &EntitlementId,
) -> AccessResult<()>
where
    C: Catalog + ?Sized,
{
    let privilege = normalize_privilege(&entitlement.slug)?;
    let role = principal_role(client, principal).await?;
    let statement = grant_privilege(target, privilege, &role.name, entitlement.grant)?;
    client.execute(&statement).await
}

/// Issues the REVOKE for a privilege grant. The grant-option variant only
/// removes the grant option.
pub(crate) async fn revoke_on<C>(client: &C, target: &GrantTarget, grant: &GrantId) -> AccessResult<()>
where
    C: Catalog + ?Sized,
{
    let privilege = normalize_privilege(&grant.entitlement.slug)?;
    let role = principal_role(client, &grant.principal).await?;
    let statement = revoke_privilege(target, privilege, &role.name, grant.entitlement.grant)?;
    client.execute(&statement).await
}

/// The database resource a tag names, when the tag is an OID.
pub(crate) fn database_parent(tag: &str) -> Option<ResourceId> {
    tag.parse().ok().map(ResourceId::database)
}
