//! Catalog rows for every resource kind.
//!
//! Each model is decoded from a `tokio_postgres::Row` whose column names match
//! the field names used by the queries in [`crate::client`]. ACL columns are
//! selected as `text[]`; a NULL ACL (the object has never been granted on)
//! decodes to an empty list, so resolution falls back to the kind's defaults.

use serde::Serialize;
use tokio_postgres::Row;

use crate::acl::AclResource;
use crate::error::AccessError;
use crate::privileges::PrivilegeSet;

fn acl_column(row: &Row, column: &str) -> Result<Vec<String>, tokio_postgres::Error> {
    Ok(row.try_get::<_, Option<Vec<String>>>(column)?.unwrap_or_default())
}

/// A role from `pg_roles`. Users are roles that can log in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleModel {
    pub id: i64,
    pub name: String,
    pub superuser: bool,
    pub inherit: bool,
    pub create_role: bool,
    pub create_db: bool,
    pub can_login: bool,
    pub replication: bool,
    pub connection_limit: i32,
    pub bypass_rls: bool,
    /// Set only when the role was listed as a member of another role.
    pub admin_option: Option<bool>,
    /// Ids of the roles this role is a direct member of.
    pub member_of: Vec<i64>,
}

impl RoleModel {
    pub fn is_role_admin(&self) -> bool {
        self.admin_option.unwrap_or(false)
    }
}

impl TryFrom<&Row> for RoleModel {
    type Error = AccessError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(RoleModel {
            id: row.try_get("oid")?,
            name: row.try_get("rolname")?,
            superuser: row.try_get("rolsuper")?,
            inherit: row.try_get("rolinherit")?,
            create_role: row.try_get("rolcreaterole")?,
            create_db: row.try_get("rolcreatedb")?,
            can_login: row.try_get("rolcanlogin")?,
            replication: row.try_get("rolreplication")?,
            connection_limit: row.try_get("rolconnlimit")?,
            bypass_rls: row.try_get("rolbypassrls")?,
            admin_option: row.try_get("admin_option")?,
            member_of: row.try_get::<_, Option<Vec<i64>>>("member_of")?.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseModel {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    pub acl: Vec<String>,
}

impl TryFrom<&Row> for DatabaseModel {
    type Error = AccessError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(DatabaseModel {
            id: row.try_get("oid")?,
            name: row.try_get("datname")?,
            owner_id: row.try_get("datdba")?,
            acl: acl_column(row, "datacl")?,
        })
    }
}

impl DatabaseModel {
    pub const PRIVILEGES: PrivilegeSet = PrivilegeSet::CREATE
        .union(PrivilegeSet::TEMPORARY)
        .union(PrivilegeSet::CONNECT);
}

impl AclResource for DatabaseModel {
    fn owner_id(&self) -> i64 {
        self.owner_id
    }

    fn acl_entries(&self) -> &[String] {
        &self.acl
    }

    fn all_privileges(&self) -> PrivilegeSet {
        Self::PRIVILEGES
    }

    fn default_privileges(&self) -> PrivilegeSet {
        PrivilegeSet::TEMPORARY | PrivilegeSet::CONNECT
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaModel {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    pub acl: Vec<String>,
}

impl TryFrom<&Row> for SchemaModel {
    type Error = AccessError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(SchemaModel {
            id: row.try_get("oid")?,
            name: row.try_get("nspname")?,
            owner_id: row.try_get("nspowner")?,
            acl: acl_column(row, "nspacl")?,
        })
    }
}

impl SchemaModel {
    pub const PRIVILEGES: PrivilegeSet = PrivilegeSet::USAGE.union(PrivilegeSet::CREATE);
}

impl AclResource for SchemaModel {
    fn owner_id(&self) -> i64 {
        self.owner_id
    }

    fn acl_entries(&self) -> &[String] {
        &self.acl
    }

    fn all_privileges(&self) -> PrivilegeSet {
        Self::PRIVILEGES
    }

    fn default_privileges(&self) -> PrivilegeSet {
        PrivilegeSet::NONE
    }
}

/// `pg_class` kinds exposed as resources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Ordinary and partitioned tables (`r`, `p`).
    #[default]
    Table,
    /// Views and materialized views (`v`, `m`).
    View,
    /// `S`
    Sequence,
}

impl RelationKind {
    /// `relkind` codes selected for this kind.
    pub fn relkinds(self) -> &'static [&'static str] {
        match self {
            RelationKind::Table => &["r", "p"],
            RelationKind::View => &["v", "m"],
            RelationKind::Sequence => &["S"],
        }
    }

    /// Privileges that apply to relations of this kind.
    pub fn privileges(self) -> PrivilegeSet {
        match self {
            RelationKind::Table | RelationKind::View => {
                PrivilegeSet::INSERT
                    | PrivilegeSet::SELECT
                    | PrivilegeSet::UPDATE
                    | PrivilegeSet::DELETE
                    | PrivilegeSet::TRUNCATE
                    | PrivilegeSet::REFERENCES
                    | PrivilegeSet::TRIGGER
            }
            RelationKind::Sequence => {
                PrivilegeSet::SELECT | PrivilegeSet::UPDATE | PrivilegeSet::USAGE
            }
        }
    }
}

/// A table, view or sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelationModel {
    pub id: i64,
    pub name: String,
    pub schema_id: i64,
    pub schema: String,
    pub owner_id: i64,
    pub kind: RelationKind,
    pub acl: Vec<String>,
}

impl RelationModel {
    pub fn from_row(row: &Row, kind: RelationKind) -> Result<Self, AccessError> {
        Ok(RelationModel {
            id: row.try_get("oid")?,
            name: row.try_get("relname")?,
            schema_id: row.try_get("relnamespace")?,
            schema: row.try_get("nspname")?,
            owner_id: row.try_get("relowner")?,
            kind,
            acl: acl_column(row, "relacl")?,
        })
    }
}

impl AclResource for RelationModel {
    fn owner_id(&self) -> i64 {
        self.owner_id
    }

    fn acl_entries(&self) -> &[String] {
        &self.acl
    }

    fn all_privileges(&self) -> PrivilegeSet {
        self.kind.privileges()
    }

    fn default_privileges(&self) -> PrivilegeSet {
        PrivilegeSet::NONE
    }
}

/// A table column. Its owner is the owner of the table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnModel {
    pub id: i64,
    pub name: String,
    pub table_id: i64,
    pub table_name: String,
    pub schema: String,
    pub owner_id: i64,
    pub acl: Vec<String>,
}

impl TryFrom<&Row> for ColumnModel {
    type Error = AccessError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(ColumnModel {
            id: row.try_get("attnum")?,
            name: row.try_get("attname")?,
            table_id: row.try_get("attrelid")?,
            table_name: row.try_get("relname")?,
            schema: row.try_get("nspname")?,
            owner_id: row.try_get("relowner")?,
            acl: acl_column(row, "attacl")?,
        })
    }
}

impl ColumnModel {
    pub const PRIVILEGES: PrivilegeSet = PrivilegeSet::INSERT
        .union(PrivilegeSet::SELECT)
        .union(PrivilegeSet::UPDATE)
        .union(PrivilegeSet::REFERENCES);
}

impl AclResource for ColumnModel {
    fn owner_id(&self) -> i64 {
        self.owner_id
    }

    fn acl_entries(&self) -> &[String] {
        &self.acl
    }

    fn all_privileges(&self) -> PrivilegeSet {
        Self::PRIVILEGES
    }

    fn default_privileges(&self) -> PrivilegeSet {
        PrivilegeSet::NONE
    }
}

/// `pg_proc.prokind` values exposed as resources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutineKind {
    #[default]
    Function,
    Procedure,
}

impl RoutineKind {
    pub fn prokind(self) -> &'static str {
        match self {
            RoutineKind::Function => "f",
            RoutineKind::Procedure => "p",
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            RoutineKind::Function => "FUNCTION",
            RoutineKind::Procedure => "PROCEDURE",
        }
    }
}

/// A function or procedure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoutineModel {
    pub id: i64,
    pub name: String,
    pub schema_id: i64,
    pub schema: String,
    pub owner_id: i64,
    pub kind: RoutineKind,
    /// Identity argument list, e.g. `a integer, b text`.
    pub arguments: String,
    /// `None` for procedures.
    pub return_type: Option<String>,
    pub acl: Vec<String>,
}

impl RoutineModel {
    pub fn from_row(row: &Row, kind: RoutineKind) -> Result<Self, AccessError> {
        Ok(RoutineModel {
            id: row.try_get("oid")?,
            name: row.try_get("proname")?,
            schema_id: row.try_get("pronamespace")?,
            schema: row.try_get("nspname")?,
            owner_id: row.try_get("proowner")?,
            kind,
            arguments: row.try_get::<_, Option<String>>("arguments")?.unwrap_or_default(),
            return_type: row.try_get("return_type")?,
            acl: acl_column(row, "proacl")?,
        })
    }

    /// `name(arguments)` as shown to people.
    pub fn signature(&self) -> String {
        format!("{}({})", self.name, self.arguments)
    }
}

impl AclResource for RoutineModel {
    fn owner_id(&self) -> i64 {
        self.owner_id
    }

    fn acl_entries(&self) -> &[String] {
        &self.acl
    }

    fn all_privileges(&self) -> PrivilegeSet {
        PrivilegeSet::EXECUTE
    }

    fn default_privileges(&self) -> PrivilegeSet {
        PrivilegeSet::EXECUTE
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LargeObjectModel {
    pub id: i64,
    pub owner_id: i64,
    pub acl: Vec<String>,
}

impl TryFrom<&Row> for LargeObjectModel {
    type Error = AccessError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(LargeObjectModel {
            id: row.try_get("oid")?,
            owner_id: row.try_get("lomowner")?,
            acl: acl_column(row, "lomacl")?,
        })
    }
}

impl LargeObjectModel {
    pub const PRIVILEGES: PrivilegeSet = PrivilegeSet::SELECT.union(PrivilegeSet::UPDATE);
}

impl AclResource for LargeObjectModel {
    fn owner_id(&self) -> i64 {
        self.owner_id
    }

    fn acl_entries(&self) -> &[String] {
        &self.acl
    }

    fn all_privileges(&self) -> PrivilegeSet {
        Self::PRIVILEGES
    }

    fn default_privileges(&self) -> PrivilegeSet {
        PrivilegeSet::NONE
    }
}
