//! Resource, entitlement and grant records produced for callers.

use std::ops::ControlFlow;

use serde::Serialize;

use crate::identity::{EntitlementId, GrantId, ResourceId, ResourceType};
use crate::models::RoleModel;
use crate::privileges::PrivilegeSet;
use crate::resolve::EffectiveGrant;

/// How a role is used, derived from its flags and name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    /// The bootstrap superuser.
    System,
    /// A role that can log in.
    Human,
    /// A role that cannot log in.
    Service,
}

/// Login details of a role resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub login: String,
    pub email: Option<String>,
    pub account_type: AccountType,
}

impl UserProfile {
    pub fn from_role(role: &RoleModel) -> Self {
        let account_type = if role.name == "postgres" {
            AccountType::System
        } else if role.can_login {
            AccountType::Human
        } else {
            AccountType::Service
        };
        let email = role.name.contains('@').then(|| role.name.clone());

        Self {
            login: role.name.clone(),
            email,
            account_type,
        }
    }
}

/// A listed resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resource {
    pub id: ResourceId,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<ResourceId>,
    /// Kinds that can be listed with this resource as parent.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub child_types: Vec<ResourceType>,
    /// Set on roles that have members.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_group: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

impl Resource {
    pub fn new(id: ResourceId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            parent: None,
            child_types: Vec::new(),
            is_group: false,
            user: None,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent: ResourceId) -> Self {
        self.parent = Some(parent);
        self
    }

    #[must_use]
    pub fn with_children(mut self, child_types: &[ResourceType]) -> Self {
        self.child_types = child_types.to_vec();
        self
    }

    pub fn resource_type(&self) -> ResourceType {
        self.id.resource_type()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    /// Holding a privilege.
    Permission,
    /// Being a member of a role.
    Assignment,
}

/// Something a principal can hold on a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entitlement {
    pub id: EntitlementId,
    pub display_name: String,
    pub description: String,
    pub slug: String,
    pub purpose: Purpose,
    pub grantable_to: Vec<ResourceType>,
}

impl Entitlement {
    pub fn resource(&self) -> &ResourceId {
        &self.id.resource
    }
}

/// An entitlement held by a principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grant {
    pub id: GrantId,
    pub entitlement: EntitlementId,
    pub principal: ResourceId,
}

impl Grant {
    pub fn new(entitlement: EntitlementId, principal: ResourceId) -> Self {
        Self {
            id: GrantId::new(entitlement.clone(), principal.clone()),
            entitlement,
            principal,
        }
    }
}

impl From<EffectiveGrant> for Grant {
    fn from(grant: EffectiveGrant) -> Self {
        Grant::new(grant.entitlement_id(), grant.principal())
    }
}

/// One entitlement per privilege in `privileges`, each followed by its
/// grant-option variant, in privilege declaration order.
pub fn entitlements_for_privileges(resource: &Resource, privileges: PrivilegeSet) -> Vec<Entitlement> {
    let mut out = Vec::new();
    let _: ControlFlow<()> = privileges.range(|privilege| {
        let slug = privilege.slug();
        out.push(Entitlement {
            id: EntitlementId::new(resource.id.clone(), slug.clone(), false),
            display_name: privilege.name().to_string(),
            description: format!(
                "Has {} privileges on {}",
                privilege.name(),
                resource.display_name
            ),
            slug: slug.clone(),
            purpose: Purpose::Permission,
            grantable_to: vec![ResourceType::Role],
        });
        out.push(Entitlement {
            id: EntitlementId::new(resource.id.clone(), slug.clone(), true),
            display_name: format!("Can grant {}", privilege.name()),
            description: format!(
                "Can grant {} privileges on {}",
                privilege.name(),
                resource.display_name
            ),
            slug: format!("grant {slug}"),
            purpose: Purpose::Permission,
            grantable_to: vec![ResourceType::Role],
        });
        ControlFlow::Continue(())
    });
    out
}

pub const MEMBER_SLUG: &str = "member";
pub const ADMIN_SLUG: &str = "admin";

/// `member` and `admin` entitlements of a role that has members.
pub fn membership_entitlements(role: &Resource) -> Vec<Entitlement> {
    vec![
        Entitlement {
            id: EntitlementId::new(role.id.clone(), MEMBER_SLUG, false),
            display_name: "Member".to_string(),
            description: format!("Is assigned the {} role", role.display_name),
            slug: MEMBER_SLUG.to_string(),
            purpose: Purpose::Assignment,
            grantable_to: vec![ResourceType::Role],
        },
        Entitlement {
            id: EntitlementId::new(role.id.clone(), ADMIN_SLUG, false),
            display_name: "Admin".to_string(),
            description: format!("Can grant the {} role to other roles", role.display_name),
            slug: ADMIN_SLUG.to_string(),
            purpose: Purpose::Assignment,
            grantable_to: vec![ResourceType::Role],
        },
    ]
}

/// Cluster-wide role flags exposed as entitlements on each database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleAttribute {
    Superuser,
    CreateDb,
    CreateRole,
    BypassRls,
    Replication,
}

impl RoleAttribute {
    pub const ALL: [RoleAttribute; 5] = [
        RoleAttribute::Superuser,
        RoleAttribute::CreateDb,
        RoleAttribute::CreateRole,
        RoleAttribute::BypassRls,
        RoleAttribute::Replication,
    ];

    /// Slug used in entitlement ids.
    pub fn slug(self) -> &'static str {
        match self {
            RoleAttribute::Superuser => "superuser",
            RoleAttribute::CreateDb => "create-db",
            RoleAttribute::CreateRole => "create-role",
            RoleAttribute::BypassRls => "bypass-rls",
            RoleAttribute::Replication => "replication",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        RoleAttribute::ALL.into_iter().find(|a| a.slug() == slug)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            RoleAttribute::Superuser => "Superuser",
            RoleAttribute::CreateDb => "Create Database",
            RoleAttribute::CreateRole => "Create Role",
            RoleAttribute::BypassRls => "Bypass RLS",
            RoleAttribute::Replication => "Replication",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            RoleAttribute::Superuser => "Has Superuser access",
            RoleAttribute::CreateDb => "Can create new databases",
            RoleAttribute::CreateRole => "Can create new roles",
            RoleAttribute::BypassRls => "Can bypass row level security options",
            RoleAttribute::Replication => {
                "Can initiate replication connections, and create and drop replication slots"
            }
        }
    }

    pub fn held_by(self, role: &RoleModel) -> bool {
        match self {
            RoleAttribute::Superuser => role.superuser,
            RoleAttribute::CreateDb => role.create_db,
            RoleAttribute::CreateRole => role.create_role,
            RoleAttribute::BypassRls => role.bypass_rls,
            RoleAttribute::Replication => role.replication,
        }
    }

    pub fn entitlement(self, database: &Resource) -> Entitlement {
        Entitlement {
            id: EntitlementId::new(database.id.clone(), self.slug(), false),
            display_name: self.display_name().to_string(),
            description: self.description().to_string(),
            slug: self.slug().replace('-', " "),
            purpose: Purpose::Permission,
            grantable_to: vec![ResourceType::Role],
        }
    }
}

/// Attribute grants on `database` for every role in `roles` holding the flag.
pub fn attribute_grants(database: &ResourceId, roles: &[RoleModel]) -> Vec<Grant> {
    roles
        .iter()
        .flat_map(|role| {
            RoleAttribute::ALL
                .into_iter()
                .filter(move |attribute| attribute.held_by(role))
                .map(move |attribute| {
                    Grant::new(
                        EntitlementId::new(database.clone(), attribute.slug(), false),
                        ResourceId::role(role.id),
                    )
                })
        })
        .collect()
}
