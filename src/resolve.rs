//! Effective grant resolution.
//!
//! Combines an object's owner, its ACL entries, the PUBLIC defaults and the
//! role membership graph into the set of privileges each candidate role
//! actually holds, and whether it may pass each one on.

use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;

use async_trait::async_trait;
use serde::Serialize;

use crate::acl::{AclEntry, AclResource};
use crate::error::AccessResult;
use crate::identity::{EntitlementId, GrantId, ResourceId};
use crate::models::RoleModel;
use crate::privileges::{Privilege, PrivilegeSet};

/// Source of role records for membership lookups.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    /// Fetches one role by OID.
    async fn get_role(&self, id: i64) -> AccessResult<RoleModel>;
}

/// One privilege held by one role on one resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EffectiveGrant {
    pub principal_id: i64,
    pub resource_id: ResourceId,
    pub privilege: Privilege,
    /// Whether this is the grant-option variant.
    pub grantable: bool,
}

impl EffectiveGrant {
    pub fn principal(&self) -> ResourceId {
        ResourceId::role(self.principal_id)
    }

    pub fn entitlement_id(&self) -> EntitlementId {
        EntitlementId::new(self.resource_id.clone(), self.privilege.slug(), self.grantable)
    }

    pub fn grant_id(&self) -> GrantId {
        GrantId::new(self.entitlement_id(), self.principal())
    }
}

/// ACL entries of one object, split into the PUBLIC defaults and per-grantee
/// entries.
#[derive(Debug, Clone)]
pub struct ParsedAcl {
    default: AclEntry,
    by_grantee: HashMap<String, Vec<AclEntry>>,
}

impl ParsedAcl {
    /// Parses every ACL entry of `object`. When no PUBLIC entry exists the
    /// defaults come from [`AclResource::default_privileges`], without grant
    /// option.
    pub fn from_resource<R: AclResource + ?Sized>(object: &R) -> AccessResult<Self> {
        let mut default = None;
        let mut by_grantee: HashMap<String, Vec<AclEntry>> = HashMap::new();

        for entry in object.parse_acl_entries()? {
            if entry.is_public() {
                default = Some(entry);
                continue;
            }
            by_grantee
                .entry(entry.grantee().to_string())
                .or_default()
                .push(entry);
        }

        let default = default.unwrap_or_else(|| {
            AclEntry::from_privilege_sets(object.default_privileges(), PrivilegeSet::NONE)
        });

        Ok(Self {
            default,
            by_grantee,
        })
    }

    pub fn default_entry(&self) -> &AclEntry {
        &self.default
    }

    /// Union of the entries naming `grantee` directly.
    pub fn direct(&self, grantee: &str) -> (PrivilegeSet, PrivilegeSet) {
        self.by_grantee
            .get(grantee)
            .into_iter()
            .flatten()
            .fold((PrivilegeSet::NONE, PrivilegeSet::NONE), |(privs, grants), entry| {
                (
                    privs | entry.privileges(),
                    grants | entry.grant_privileges(),
                )
            })
    }
}

/// Computes which privileges each role in `roles` holds on `object`.
///
/// Per role the result starts from the PUBLIC defaults. Owners and superusers
/// then receive every privilege of the object's kind with grant option. Entries
/// naming the role are added, and when the role inherits, so are the entries of
/// every role reachable through `member_of`. A parent whose `inherit` flag is
/// off contributes its own entries but not those of its parents.
///
/// # Arguments
///
/// * `resource_id` - Identity the produced grants refer to
/// * `object` - Owner and ACL source
/// * `roles` - Candidate principals, usually one page of the role listing
/// * `directory` - Lookup for parents that are not in `roles`
///
/// # Returns
///
/// For each role, in input order, one grant per held privilege followed by
/// its grant-option variant when grantable, in privilege declaration order.
///
/// # Errors
///
/// A malformed ACL entry or a failed directory lookup aborts the whole call.
pub async fn resolve_grants<R, D>(
    resource_id: &ResourceId,
    object: &R,
    roles: &[RoleModel],
    directory: &D,
) -> AccessResult<Vec<EffectiveGrant>>
where
    R: AclResource + Sync + ?Sized,
    D: RoleDirectory + ?Sized,
{
    let acl = ParsedAcl::from_resource(object)?;

    let mut known: HashMap<i64, RoleModel> =
        roles.iter().map(|role| (role.id, role.clone())).collect();

    let mut grants = Vec::new();
    for role in roles {
        let (privileges, grant_privileges) =
            effective_privileges(object, &acl, role, directory, &mut known).await?;
        emit_grants(
            &mut grants,
            resource_id,
            role.id,
            privileges,
            grant_privileges,
        );
    }

    log::debug!(
        "resolved {} grants on {} for {} roles",
        grants.len(),
        resource_id,
        roles.len()
    );
    Ok(grants)
}

/// The (held, grantable) privilege sets of `role` on `object`.
pub async fn effective_privileges<R, D>(
    object: &R,
    acl: &ParsedAcl,
    role: &RoleModel,
    directory: &D,
    known: &mut HashMap<i64, RoleModel>,
) -> AccessResult<(PrivilegeSet, PrivilegeSet)>
where
    R: AclResource + Sync + ?Sized,
    D: RoleDirectory + ?Sized,
{
    let mut privileges = acl.default_entry().privileges();
    let mut grant_privileges = acl.default_entry().grant_privileges();

    if role.superuser || role.id == object.owner_id() {
        privileges = object.all_privileges();
        grant_privileges = object.all_privileges();
    }

    let (direct, direct_grants) = acl.direct(&role.name);
    privileges |= direct;
    grant_privileges |= direct_grants;

    if !role.inherit {
        return Ok((privileges, grant_privileges));
    }

    let mut visited: HashSet<i64> = HashSet::from([role.id]);
    let mut stack: Vec<i64> = role.member_of.clone();

    while let Some(parent_id) = stack.pop() {
        if !visited.insert(parent_id) {
            continue;
        }

        let parent = match known.get(&parent_id) {
            Some(parent) => parent.clone(),
            None => {
                let parent = directory.get_role(parent_id).await?;
                known.insert(parent_id, parent.clone());
                parent
            }
        };

        let (inherited, inherited_grants) = acl.direct(&parent.name);
        privileges |= inherited;
        grant_privileges |= inherited_grants;

        if parent.inherit {
            stack.extend(
                parent
                    .member_of
                    .iter()
                    .copied()
                    .filter(|id| !visited.contains(id)),
            );
        }
    }

    Ok((privileges, grant_privileges))
}

fn emit_grants(
    out: &mut Vec<EffectiveGrant>,
    resource_id: &ResourceId,
    principal_id: i64,
    privileges: PrivilegeSet,
    grant_privileges: PrivilegeSet,
) {
    let _: ControlFlow<()> = (privileges | grant_privileges).range(|privilege| {
        if privileges.has(privilege) {
            out.push(EffectiveGrant {
                principal_id,
                resource_id: resource_id.clone(),
                privilege,
                grantable: false,
            });
        }
        if grant_privileges.has(privilege) {
            out.push(EffectiveGrant {
                principal_id,
                resource_id: resource_id.clone(),
                privilege,
                grantable: true,
            });
        }
        ControlFlow::Continue(())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::error::AccessError;
    use crate::identity::ResourceType;

    fn directory(roles: Vec<RoleModel>) -> MemoryCatalog {
        MemoryCatalog::new("app").with_roles(roles)
    }

    struct TestObject {
        owner: i64,
        acl: Vec<String>,
        all: PrivilegeSet,
        default: PrivilegeSet,
    }

    impl TestObject {
        fn new(owner: i64, acl: &[&str], all: PrivilegeSet) -> Self {
            Self {
                owner,
                acl: acl.iter().map(|s| s.to_string()).collect(),
                all,
                default: PrivilegeSet::NONE,
            }
        }
    }

    impl AclResource for TestObject {
        fn owner_id(&self) -> i64 {
            self.owner
        }

        fn acl_entries(&self) -> &[String] {
            &self.acl
        }

        fn all_privileges(&self) -> PrivilegeSet {
            self.all
        }

        fn default_privileges(&self) -> PrivilegeSet {
            self.default
        }
    }

    fn role(id: i64, name: &str) -> RoleModel {
        RoleModel {
            id,
            name: name.to_string(),
            inherit: true,
            ..Default::default()
        }
    }

    fn table_id() -> ResourceId {
        ResourceId::scoped(ResourceType::Table, "1", 100)
    }

    fn held(grants: &[EffectiveGrant], principal: i64) -> Vec<(Privilege, bool)> {
        grants
            .iter()
            .filter(|g| g.principal_id == principal)
            .map(|g| (g.privilege, g.grantable))
            .collect()
    }

    #[tokio::test]
    async fn test_owner_and_carol() {
        let object = TestObject::new(
            7,
            &["carol=r/dave"],
            PrivilegeSet::SELECT | PrivilegeSet::INSERT,
        );
        let roles = vec![role(7, "owner"), role(9, "carol")];
        let directory = directory(roles.clone());

        let grants = resolve_grants(&table_id(), &object, &roles, &directory)
            .await
            .unwrap();

        assert_eq!(
            held(&grants, 7),
            vec![
                (Privilege::Insert, false),
                (Privilege::Insert, true),
                (Privilege::Select, false),
                (Privilege::Select, true),
            ]
        );
        assert_eq!(held(&grants, 9), vec![(Privilege::Select, false)]);
    }

    #[tokio::test]
    async fn test_superuser_gets_everything() {
        let all = PrivilegeSet::USAGE | PrivilegeSet::CREATE;
        let object = TestObject::new(1, &[], all);
        let mut admin = role(2, "admin");
        admin.superuser = true;
        let roles = vec![admin];

        let grants = resolve_grants(&table_id(), &object, &roles, &MemoryCatalog::default())
            .await
            .unwrap();
        assert_eq!(grants.len(), 4);
        assert!(grants.iter().all(|g| all.has(g.privilege)));
    }

    #[tokio::test]
    async fn test_default_privileges_without_public_entry() {
        let mut object = TestObject::new(
            1,
            &[],
            PrivilegeSet::CREATE | PrivilegeSet::TEMPORARY | PrivilegeSet::CONNECT,
        );
        object.default = PrivilegeSet::TEMPORARY | PrivilegeSet::CONNECT;
        let roles = vec![role(5, "app")];

        let grants = resolve_grants(&table_id(), &object, &roles, &MemoryCatalog::default())
            .await
            .unwrap();
        assert_eq!(
            held(&grants, 5),
            vec![(Privilege::Temporary, false), (Privilege::Connect, false)]
        );
    }

    #[tokio::test]
    async fn test_public_entry_replaces_defaults() {
        let mut object = TestObject::new(1, &["=c/postgres"], PrivilegeSet::all());
        object.default = PrivilegeSet::TEMPORARY | PrivilegeSet::CONNECT;
        let roles = vec![role(5, "app")];

        let grants = resolve_grants(&table_id(), &object, &roles, &MemoryCatalog::default())
            .await
            .unwrap();
        assert_eq!(held(&grants, 5), vec![(Privilege::Connect, false)]);
    }

    #[tokio::test]
    async fn test_inheritance_through_chain() {
        let object = TestObject::new(
            1,
            &["readers=r/postgres", "writers=w*/postgres"],
            PrivilegeSet::all(),
        );
        let mut readers = role(10, "readers");
        readers.member_of = vec![11];
        let writers = role(11, "writers");
        let mut alice = role(20, "alice");
        alice.member_of = vec![10];

        let directory = directory(vec![readers, writers]);
        let grants = resolve_grants(&table_id(), &object, &[alice.clone()], &directory)
            .await
            .unwrap();
        assert_eq!(
            held(&grants, 20),
            vec![
                (Privilege::Select, false),
                (Privilege::Update, false),
                (Privilege::Update, true),
            ]
        );

        alice.inherit = false;
        let grants = resolve_grants(&table_id(), &object, &[alice], &directory)
            .await
            .unwrap();
        assert!(grants.is_empty());
    }

    #[tokio::test]
    async fn test_non_inheriting_parent_stops_the_walk() {
        let object = TestObject::new(
            1,
            &["readers=r/postgres", "writers=w/postgres"],
            PrivilegeSet::all(),
        );
        let mut readers = role(10, "readers");
        readers.inherit = false;
        readers.member_of = vec![11];
        let writers = role(11, "writers");
        let mut alice = role(20, "alice");
        alice.member_of = vec![10];

        let directory = directory(vec![readers, writers]);
        let grants = resolve_grants(&table_id(), &object, &[alice], &directory)
            .await
            .unwrap();
        assert_eq!(held(&grants, 20), vec![(Privilege::Select, false)]);
    }

    #[tokio::test]
    async fn test_membership_cycle_terminates() {
        let object = TestObject::new(1, &["a=r/postgres", "b=d/postgres"], PrivilegeSet::all());
        let mut a = role(1_000, "a");
        a.member_of = vec![1_001];
        let mut b = role(1_001, "b");
        b.member_of = vec![1_000];
        let mut c = role(1_002, "c");
        c.member_of = vec![1_000];

        let directory = directory(vec![a, b]);
        let grants = resolve_grants(&table_id(), &object, &[c], &directory)
            .await
            .unwrap();
        assert_eq!(
            held(&grants, 1_002),
            vec![(Privilege::Select, false), (Privilege::Delete, false)]
        );
    }

    #[tokio::test]
    async fn test_malformed_acl_aborts() {
        let object = TestObject::new(1, &["ok=r/postgres", "broken"], PrivilegeSet::all());
        let result = resolve_grants(
            &table_id(),
            &object,
            &[role(2, "ok")],
            &MemoryCatalog::default(),
        )
        .await;
        assert!(matches!(result, Err(AccessError::MalformedAcl(raw)) if raw == "broken"));
    }

    #[tokio::test]
    async fn test_missing_parent_aborts() {
        let object = TestObject::new(1, &[], PrivilegeSet::all());
        let mut orphan = role(2, "orphan");
        orphan.member_of = vec![404];
        let result = resolve_grants(&table_id(), &object, &[orphan], &MemoryCatalog::default()).await;
        assert!(matches!(result, Err(AccessError::NotFound { kind: "role", .. })));
    }

    #[test]
    fn test_grant_ids() {
        let grant = EffectiveGrant {
            principal_id: 9,
            resource_id: table_id(),
            privilege: Privilege::Select,
            grantable: true,
        };
        assert_eq!(
            grant.grant_id().to_string(),
            "grant:entitlement:table:db1:100:select:grant:role:9"
        );
    }
}
