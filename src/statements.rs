//! GRANT and REVOKE statement builders.
//!
//! Every identifier is quoted with [`escape_identifier`]; privilege keywords
//! only ever come from the [`Privilege`] vocabulary.

use postgres_protocol::escape::escape_identifier;

use crate::error::{AccessError, AccessResult};
use crate::models::{
    ColumnModel, DatabaseModel, LargeObjectModel, RelationKind, RelationModel, RoutineKind,
    RoutineModel, SchemaModel,
};
use crate::privileges::{Privilege, PrivilegeSet};

/// Quotes `name` as a PostgreSQL identifier.
pub fn quote_identifier(name: &str) -> String {
    escape_identifier(name)
}

/// Maps a privilege slug or name (`select`, `alter-system`, `"TEMPORARY"`) to
/// its kind.
pub fn normalize_privilege(name: &str) -> AccessResult<Privilege> {
    Privilege::from_slug(name)
        .ok_or_else(|| AccessError::unsupported(format!("unknown privilege {name:?}")))
}

/// The object a privilege statement applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantTarget {
    Database {
        name: String,
    },
    Schema {
        name: String,
    },
    /// Tables and views.
    Table {
        schema: String,
        name: String,
    },
    Sequence {
        schema: String,
        name: String,
    },
    Routine {
        kind: RoutineKind,
        schema: String,
        name: String,
        arguments: String,
    },
    LargeObject {
        oid: i64,
    },
    Column {
        schema: String,
        table: String,
        column: String,
    },
}

impl GrantTarget {
    /// Privileges that can be granted on this kind of object.
    pub fn privileges(&self) -> PrivilegeSet {
        match self {
            GrantTarget::Database { .. } => DatabaseModel::PRIVILEGES,
            GrantTarget::Schema { .. } => SchemaModel::PRIVILEGES,
            GrantTarget::Table { .. } => RelationKind::Table.privileges(),
            GrantTarget::Sequence { .. } => RelationKind::Sequence.privileges(),
            GrantTarget::Routine { .. } => PrivilegeSet::EXECUTE,
            GrantTarget::LargeObject { .. } => LargeObjectModel::PRIVILEGES,
            GrantTarget::Column { .. } => ColumnModel::PRIVILEGES,
        }
    }

    /// `<privilege> ON <object>` for this target.
    fn clause(&self, privilege: Privilege) -> String {
        let keyword = privilege.name();
        match self {
            GrantTarget::Database { name } => {
                format!("{keyword} ON DATABASE {}", quote_identifier(name))
            }
            GrantTarget::Schema { name } => {
                format!("{keyword} ON SCHEMA {}", quote_identifier(name))
            }
            GrantTarget::Table { schema, name } => format!(
                "{keyword} ON TABLE {}.{}",
                quote_identifier(schema),
                quote_identifier(name)
            ),
            GrantTarget::Sequence { schema, name } => format!(
                "{keyword} ON SEQUENCE {}.{}",
                quote_identifier(schema),
                quote_identifier(name)
            ),
            GrantTarget::Routine {
                kind,
                schema,
                name,
                arguments,
            } => format!(
                "{keyword} ON {} {}.{}({arguments})",
                kind.keyword(),
                quote_identifier(schema),
                quote_identifier(name)
            ),
            GrantTarget::LargeObject { oid } => format!("{keyword} ON LARGE OBJECT {oid}"),
            GrantTarget::Column {
                schema,
                table,
                column,
            } => format!(
                "{keyword} ({}) ON TABLE {}.{}",
                quote_identifier(column),
                quote_identifier(schema),
                quote_identifier(table)
            ),
        }
    }

    fn check(&self, privilege: Privilege) -> AccessResult<()> {
        if self.privileges().has(privilege) {
            Ok(())
        } else {
            Err(AccessError::unsupported(format!(
                "{privilege} cannot be granted on {self:?}"
            )))
        }
    }
}

impl From<&DatabaseModel> for GrantTarget {
    fn from(db: &DatabaseModel) -> Self {
        GrantTarget::Database {
            name: db.name.clone(),
        }
    }
}

impl From<&SchemaModel> for GrantTarget {
    fn from(schema: &SchemaModel) -> Self {
        GrantTarget::Schema {
            name: schema.name.clone(),
        }
    }
}

impl From<&RelationModel> for GrantTarget {
    fn from(relation: &RelationModel) -> Self {
        let schema = relation.schema.clone();
        let name = relation.name.clone();
        match relation.kind {
            RelationKind::Table | RelationKind::View => GrantTarget::Table { schema, name },
            RelationKind::Sequence => GrantTarget::Sequence { schema, name },
        }
    }
}

impl From<&RoutineModel> for GrantTarget {
    fn from(routine: &RoutineModel) -> Self {
        GrantTarget::Routine {
            kind: routine.kind,
            schema: routine.schema.clone(),
            name: routine.name.clone(),
            arguments: routine.arguments.clone(),
        }
    }
}

impl From<&LargeObjectModel> for GrantTarget {
    fn from(lo: &LargeObjectModel) -> Self {
        GrantTarget::LargeObject { oid: lo.id }
    }
}

impl From<&ColumnModel> for GrantTarget {
    fn from(column: &ColumnModel) -> Self {
        GrantTarget::Column {
            schema: column.schema.clone(),
            table: column.table_name.clone(),
            column: column.name.clone(),
        }
    }
}

/// `GRANT <privilege> ON <target> TO <role> [WITH GRANT OPTION]`
pub fn grant_privilege(
    target: &GrantTarget,
    privilege: Privilege,
    role: &str,
    with_grant_option: bool,
) -> AccessResult<String> {
    target.check(privilege)?;
    let mut statement = format!(
        "GRANT {} TO {}",
        target.clause(privilege),
        quote_identifier(role)
    );
    if with_grant_option {
        statement.push_str(" WITH GRANT OPTION");
    }
    Ok(statement)
}

/// `REVOKE <privilege> ON <target> FROM <role>`, or only the grant option.
pub fn revoke_privilege(
    target: &GrantTarget,
    privilege: Privilege,
    role: &str,
    grant_option_only: bool,
) -> AccessResult<String> {
    target.check(privilege)?;
    let prefix = if grant_option_only {
        "REVOKE GRANT OPTION FOR"
    } else {
        "REVOKE"
    };
    Ok(format!(
        "{prefix} {} FROM {}",
        target.clause(privilege),
        quote_identifier(role)
    ))
}

/// `GRANT <role> TO <member> [WITH ADMIN OPTION]`
pub fn grant_role(role: &str, member: &str, with_admin_option: bool) -> String {
    let mut statement = format!("GRANT {} TO {}", quote_identifier(role), quote_identifier(member));
    if with_admin_option {
        statement.push_str(" WITH ADMIN OPTION");
    }
    statement
}

/// `REVOKE <role> FROM <member>`, or only the admin option.
pub fn revoke_role(role: &str, member: &str, admin_option_only: bool) -> String {
    let prefix = if admin_option_only {
        "REVOKE ADMIN OPTION FOR"
    } else {
        "REVOKE"
    };
    format!(
        "{prefix} {} FROM {}",
        quote_identifier(role),
        quote_identifier(member)
    )
}
