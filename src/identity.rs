//! Opaque identifiers for resources, entitlements and grants.
//!
//! Shapes:
//!
//! ```text
//! <type>:<oid>                             role, database
//! <type>:db<tag>:<oid>                     objects living inside one database
//! <tag>:column:<table oid>:<attnum>        columns
//! entitlement:<resource id>:<slug>[:grant]
//! grant:<entitlement id>:<principal id>
//! ```
//!
//! The database tag is carried verbatim. Decoding is the strict inverse of
//! encoding and reports [`AccessError::InvalidIdentity`] with the offending
//! input.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{AccessError, AccessResult};

const ENTITLEMENT_PREFIX: &str = "entitlement:";
const GRANT_PREFIX: &str = "grant:";
const GRANT_SUFFIX: &str = ":grant";
const COLUMN_SEGMENT: &str = "column";

/// Kinds of resource exposed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Role,
    Database,
    Schema,
    Table,
    View,
    Column,
    Function,
    Procedure,
    Sequence,
    LargeObject,
}

impl ResourceType {
    pub const ALL: [ResourceType; 10] = [
        ResourceType::Role,
        ResourceType::Database,
        ResourceType::Schema,
        ResourceType::Table,
        ResourceType::View,
        ResourceType::Column,
        ResourceType::Function,
        ResourceType::Procedure,
        ResourceType::Sequence,
        ResourceType::LargeObject,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Role => "role",
            ResourceType::Database => "database",
            ResourceType::Schema => "schema",
            ResourceType::Table => "table",
            ResourceType::View => "view",
            ResourceType::Column => "column",
            ResourceType::Function => "function",
            ResourceType::Procedure => "procedure",
            ResourceType::Sequence => "sequence",
            ResourceType::LargeObject => "large_object",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ResourceType::Role => "Role",
            ResourceType::Database => "Database",
            ResourceType::Schema => "Schema",
            ResourceType::Table => "Table",
            ResourceType::View => "View",
            ResourceType::Column => "Column",
            ResourceType::Function => "Function",
            ResourceType::Procedure => "Procedure",
            ResourceType::Sequence => "Sequence",
            ResourceType::LargeObject => "Large Object",
        }
    }

    /// Whether ids of this kind carry a database tag.
    pub fn is_database_scoped(self) -> bool {
        !matches!(self, ResourceType::Role | ResourceType::Database)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AccessError::invalid_identity(s, "unknown resource type"))
    }
}

/// Identifier of a single resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceId {
    /// `<type>:<oid>`
    Object { resource_type: ResourceType, id: i64 },
    /// `<type>:db<tag>:<oid>`
    Scoped {
        resource_type: ResourceType,
        database: String,
        id: i64,
    },
    /// `<tag>:column:<table oid>:<attnum>`
    Column {
        database: String,
        table_id: i64,
        column_id: i64,
    },
}

impl ResourceId {
    pub fn object(resource_type: ResourceType, id: i64) -> Self {
        ResourceId::Object { resource_type, id }
    }

    pub fn role(id: i64) -> Self {
        ResourceId::object(ResourceType::Role, id)
    }

    pub fn database(id: i64) -> Self {
        ResourceId::object(ResourceType::Database, id)
    }

    pub fn scoped(resource_type: ResourceType, database: impl Into<String>, id: i64) -> Self {
        ResourceId::Scoped {
            resource_type,
            database: database.into(),
            id,
        }
    }

    pub fn column(database: impl Into<String>, table_id: i64, column_id: i64) -> Self {
        ResourceId::Column {
            database: database.into(),
            table_id,
            column_id,
        }
    }

    pub fn parse(s: &str) -> AccessResult<Self> {
        s.parse()
    }

    pub fn resource_type(&self) -> ResourceType {
        match self {
            ResourceId::Object { resource_type, .. } | ResourceId::Scoped { resource_type, .. } => {
                *resource_type
            }
            ResourceId::Column { .. } => ResourceType::Column,
        }
    }

    /// The database tag, for ids that carry one.
    pub fn database_tag(&self) -> Option<&str> {
        match self {
            ResourceId::Object { .. } => None,
            ResourceId::Scoped { database, .. } | ResourceId::Column { database, .. } => {
                Some(database)
            }
        }
    }

    /// The catalog OID of the object. For columns this is the table's OID.
    pub fn oid(&self) -> i64 {
        match self {
            ResourceId::Object { id, .. } | ResourceId::Scoped { id, .. } => *id,
            ResourceId::Column { table_id, .. } => *table_id,
        }
    }

    /// Returns the OID when this id names a resource of `expected` type.
    pub fn expect_type(&self, expected: ResourceType) -> AccessResult<i64> {
        if self.resource_type() != expected {
            return Err(AccessError::invalid_identity(
                self.to_string(),
                format!("expected a {expected} id"),
            ));
        }
        Ok(self.oid())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Object { resource_type, id } => write!(f, "{resource_type}:{id}"),
            ResourceId::Scoped {
                resource_type,
                database,
                id,
            } => write!(f, "{resource_type}:db{database}:{id}"),
            ResourceId::Column {
                database,
                table_id,
                column_id,
            } => write!(f, "{database}:{COLUMN_SEGMENT}:{table_id}:{column_id}"),
        }
    }
}

impl FromStr for ResourceId {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();

        if parts.len() == 4 && parts[1] == COLUMN_SEGMENT {
            return Ok(ResourceId::Column {
                database: parts[0].to_string(),
                table_id: parse_number(s, parts[2])?,
                column_id: parse_number(s, parts[3])?,
            });
        }

        let resource_type: ResourceType = parts[0]
            .parse()
            .map_err(|_| AccessError::invalid_identity(s, "unknown resource type"))?;

        match (resource_type, parts.len()) {
            (ResourceType::Column, _) => Err(AccessError::invalid_identity(
                s,
                "column ids have the form <tag>:column:<table>:<column>",
            )),
            (t, 2) if !t.is_database_scoped() => Ok(ResourceId::Object {
                resource_type: t,
                id: parse_number(s, parts[1])?,
            }),
            (t, 3) if t.is_database_scoped() => {
                let database = parts[1]
                    .strip_prefix("db")
                    .ok_or_else(|| AccessError::invalid_identity(s, "expected db prefix"))?;
                Ok(ResourceId::Scoped {
                    resource_type: t,
                    database: database.to_string(),
                    id: parse_number(s, parts[2])?,
                })
            }
            (t, n) => Err(AccessError::invalid_identity(
                s,
                format!("unexpected segment count {n} for {t} id"),
            )),
        }
    }
}

fn parse_number(input: &str, segment: &str) -> AccessResult<i64> {
    segment
        .parse()
        .map_err(|_| AccessError::invalid_identity(input, format!("{segment:?} is not numeric")))
}

/// Identifier of one entitlement: a privilege (or membership/attribute slug)
/// on a resource, optionally its grant-option variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntitlementId {
    pub resource: ResourceId,
    pub slug: String,
    pub grant: bool,
}

impl EntitlementId {
    pub fn new(resource: ResourceId, slug: impl Into<String>, grant: bool) -> Self {
        Self {
            resource,
            slug: slug.into(),
            grant,
        }
    }

    pub fn parse(s: &str) -> AccessResult<Self> {
        s.parse()
    }
}

impl fmt::Display for EntitlementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ENTITLEMENT_PREFIX}{}:{}", self.resource, self.slug)?;
        if self.grant {
            f.write_str(GRANT_SUFFIX)?;
        }
        Ok(())
    }
}

impl FromStr for EntitlementId {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix(ENTITLEMENT_PREFIX)
            .ok_or_else(|| AccessError::invalid_identity(s, "expected entitlement: prefix"))?;

        let (body, grant) = match body.strip_suffix(GRANT_SUFFIX) {
            Some(rest) => (rest, true),
            None => (body, false),
        };

        let (resource, slug) = body
            .rsplit_once(':')
            .ok_or_else(|| AccessError::invalid_identity(s, "missing slug"))?;
        if slug.is_empty() {
            return Err(AccessError::invalid_identity(s, "empty slug"));
        }

        let resource = resource
            .parse()
            .map_err(|err| AccessError::invalid_identity(s, reason_of(err)))?;

        Ok(EntitlementId {
            resource,
            slug: slug.to_string(),
            grant,
        })
    }
}

/// Identifier of one grant: an entitlement held by a principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GrantId {
    pub entitlement: EntitlementId,
    pub principal: ResourceId,
}

impl GrantId {
    pub fn new(entitlement: EntitlementId, principal: ResourceId) -> Self {
        Self {
            entitlement,
            principal,
        }
    }

    pub fn parse(s: &str) -> AccessResult<Self> {
        s.parse()
    }
}

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{GRANT_PREFIX}{}:{}", self.entitlement, self.principal)
    }
}

impl FromStr for GrantId {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix(GRANT_PREFIX)
            .ok_or_else(|| AccessError::invalid_identity(s, "expected grant: prefix"))?;

        // Principals are always two-segment ids.
        let mut split = body.rsplitn(3, ':');
        let (principal_id, principal_type, entitlement) =
            match (split.next(), split.next(), split.next()) {
                (Some(id), Some(kind), Some(rest)) => (id, kind, rest),
                _ => return Err(AccessError::invalid_identity(s, "missing principal")),
            };

        let principal = format!("{principal_type}:{principal_id}")
            .parse()
            .map_err(|err| AccessError::invalid_identity(s, reason_of(err)))?;
        let entitlement = entitlement
            .parse()
            .map_err(|err| AccessError::invalid_identity(s, reason_of(err)))?;

        Ok(GrantId {
            entitlement,
            principal,
        })
    }
}

fn reason_of(err: AccessError) -> String {
    match err {
        AccessError::InvalidIdentity { value, reason } => format!("{value:?}: {reason}"),
        other => other.to_string(),
    }
}

macro_rules! string_serde {
    ($($ty:ty),*) => {$(
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    )*};
}

string_serde!(ResourceId, EntitlementId, GrantId);
