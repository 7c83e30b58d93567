//! Catalog access behind a trait.
//!
//! [`Catalog`] is what syncers need from one database: paged listings, point
//! lookups and statement execution. [`DatabaseClient`](crate::client::DatabaseClient)
//! implements it over a live connection; [`MemoryCatalog`] implements it over
//! plain vectors for offline resolution and tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::cursor::{Page, Pager};
use crate::error::{AccessError, AccessResult};
use crate::models::{
    ColumnModel, DatabaseModel, LargeObjectModel, RelationKind, RelationModel, RoleModel,
    RoutineKind, RoutineModel, SchemaModel,
};
use crate::pool::DatabaseSource;
use crate::resolve::RoleDirectory;

/// Queries against one database's catalogs.
#[async_trait]
pub trait Catalog: RoleDirectory {
    /// Name of the database this catalog reads.
    fn database_name(&self) -> &str;

    async fn list_roles(&self, pager: &Pager) -> AccessResult<Page<RoleModel>>;

    /// Direct members of `role_id`, each with `admin_option` set.
    async fn list_role_members(&self, role_id: i64, pager: &Pager) -> AccessResult<Page<RoleModel>>;

    async fn get_role_by_name(&self, name: &str) -> AccessResult<RoleModel>;

    async fn role_has_members(&self, role_id: i64) -> AccessResult<bool>;

    async fn list_databases(&self, pager: &Pager) -> AccessResult<Page<DatabaseModel>>;

    async fn get_database(&self, id: i64) -> AccessResult<DatabaseModel>;

    /// Schemas matching the configured schema filter.
    async fn list_schemas(&self, pager: &Pager) -> AccessResult<Page<SchemaModel>>;

    async fn get_schema(&self, id: i64) -> AccessResult<SchemaModel>;

    async fn list_relations(
        &self,
        kind: RelationKind,
        schema_id: i64,
        pager: &Pager,
    ) -> AccessResult<Page<RelationModel>>;

    async fn get_relation(&self, kind: RelationKind, id: i64) -> AccessResult<RelationModel>;

    async fn list_columns(&self, table_id: i64, pager: &Pager) -> AccessResult<Page<ColumnModel>>;

    async fn get_column(&self, table_id: i64, column_id: i64) -> AccessResult<ColumnModel>;

    async fn list_routines(
        &self,
        kind: RoutineKind,
        schema_id: i64,
        pager: &Pager,
    ) -> AccessResult<Page<RoutineModel>>;

    async fn get_routine(&self, kind: RoutineKind, id: i64) -> AccessResult<RoutineModel>;

    async fn list_large_objects(&self, pager: &Pager) -> AccessResult<Page<LargeObjectModel>>;

    async fn get_large_object(&self, id: i64) -> AccessResult<LargeObjectModel>;

    /// Runs one GRANT or REVOKE statement.
    async fn execute(&self, statement: &str) -> AccessResult<()>;
}

/// An in-memory [`Catalog`].
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    database: String,
    roles: HashMap<i64, RoleModel>,
    admins: HashSet<(i64, i64)>,
    databases: Vec<DatabaseModel>,
    schemas: Vec<SchemaModel>,
    relations: Vec<RelationModel>,
    columns: Vec<ColumnModel>,
    routines: Vec<RoutineModel>,
    large_objects: Vec<LargeObjectModel>,
    executed: Mutex<Vec<String>>,
}

impl MemoryCatalog {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: RoleModel) -> Self {
        self.roles.insert(role.id, role);
        self
    }

    #[must_use]
    pub fn with_roles(mut self, roles: impl IntoIterator<Item = RoleModel>) -> Self {
        self.roles.extend(roles.into_iter().map(|role| (role.id, role)));
        self
    }

    /// Marks `member`'s membership in `role` as holding the admin option.
    #[must_use]
    pub fn with_admin(mut self, role: i64, member: i64) -> Self {
        self.admins.insert((role, member));
        self
    }

    #[must_use]
    pub fn with_database(mut self, database: DatabaseModel) -> Self {
        self.databases.push(database);
        self
    }

    #[must_use]
    pub fn with_schema(mut self, schema: SchemaModel) -> Self {
        self.schemas.push(schema);
        self
    }

    #[must_use]
    pub fn with_relation(mut self, relation: RelationModel) -> Self {
        self.relations.push(relation);
        self
    }

    #[must_use]
    pub fn with_column(mut self, column: ColumnModel) -> Self {
        self.columns.push(column);
        self
    }

    #[must_use]
    pub fn with_routine(mut self, routine: RoutineModel) -> Self {
        self.routines.push(routine);
        self
    }

    #[must_use]
    pub fn with_large_object(mut self, large_object: LargeObjectModel) -> Self {
        self.large_objects.push(large_object);
        self
    }

    /// Statements passed to [`Catalog::execute`], in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn sorted_roles(&self) -> Vec<RoleModel> {
        let mut roles: Vec<RoleModel> = self.roles.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        roles
    }
}

fn find<T: Clone>(items: &[T], kind: &'static str, id: i64, matches: impl Fn(&T) -> bool) -> AccessResult<T> {
    items
        .iter()
        .find(|item| matches(item))
        .cloned()
        .ok_or_else(|| AccessError::not_found(kind, id))
}

#[async_trait]
impl RoleDirectory for MemoryCatalog {
    async fn get_role(&self, id: i64) -> AccessResult<RoleModel> {
        self.roles
            .get(&id)
            .cloned()
            .ok_or_else(|| AccessError::not_found("role", id))
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    fn database_name(&self) -> &str {
        &self.database
    }

    async fn list_roles(&self, pager: &Pager) -> AccessResult<Page<RoleModel>> {
        pager.apply(self.sorted_roles())
    }

    async fn list_role_members(&self, role_id: i64, pager: &Pager) -> AccessResult<Page<RoleModel>> {
        let members = self
            .sorted_roles()
            .into_iter()
            .filter(|role| role.member_of.contains(&role_id))
            .map(|mut role| {
                role.admin_option = Some(self.admins.contains(&(role_id, role.id)));
                role
            })
            .collect();
        pager.apply(members)
    }

    async fn get_role_by_name(&self, name: &str) -> AccessResult<RoleModel> {
        self.roles
            .values()
            .find(|role| role.name == name)
            .cloned()
            .ok_or_else(|| AccessError::not_found("role", name))
    }

    async fn role_has_members(&self, role_id: i64) -> AccessResult<bool> {
        Ok(self.roles.values().any(|role| role.member_of.contains(&role_id)))
    }

    async fn list_databases(&self, pager: &Pager) -> AccessResult<Page<DatabaseModel>> {
        let mut databases = self.databases.clone();
        databases.sort_by(|a, b| a.name.cmp(&b.name));
        pager.apply(databases)
    }

    async fn get_database(&self, id: i64) -> AccessResult<DatabaseModel> {
        find(&self.databases, "database", id, |db| db.id == id)
    }

    async fn list_schemas(&self, pager: &Pager) -> AccessResult<Page<SchemaModel>> {
        let mut schemas = self.schemas.clone();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        pager.apply(schemas)
    }

    async fn get_schema(&self, id: i64) -> AccessResult<SchemaModel> {
        find(&self.schemas, "schema", id, |schema| schema.id == id)
    }

    async fn list_relations(
        &self,
        kind: RelationKind,
        schema_id: i64,
        pager: &Pager,
    ) -> AccessResult<Page<RelationModel>> {
        let mut relations: Vec<RelationModel> = self
            .relations
            .iter()
            .filter(|rel| rel.kind == kind && rel.schema_id == schema_id)
            .cloned()
            .collect();
        relations.sort_by(|a, b| a.name.cmp(&b.name));
        pager.apply(relations)
    }

    async fn get_relation(&self, kind: RelationKind, id: i64) -> AccessResult<RelationModel> {
        find(&self.relations, "relation", id, |rel| rel.id == id && rel.kind == kind)
    }

    async fn list_columns(&self, table_id: i64, pager: &Pager) -> AccessResult<Page<ColumnModel>> {
        let mut columns: Vec<ColumnModel> = self
            .columns
            .iter()
            .filter(|col| col.table_id == table_id)
            .cloned()
            .collect();
        columns.sort_by_key(|col| col.id);
        pager.apply(columns)
    }

    async fn get_column(&self, table_id: i64, column_id: i64) -> AccessResult<ColumnModel> {
        find(&self.columns, "column", column_id, |col| {
            col.table_id == table_id && col.id == column_id
        })
    }

    async fn list_routines(
        &self,
        kind: RoutineKind,
        schema_id: i64,
        pager: &Pager,
    ) -> AccessResult<Page<RoutineModel>> {
        let mut routines: Vec<RoutineModel> = self
            .routines
            .iter()
            .filter(|routine| routine.kind == kind && routine.schema_id == schema_id)
            .cloned()
            .collect();
        routines.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        pager.apply(routines)
    }

    async fn get_routine(&self, kind: RoutineKind, id: i64) -> AccessResult<RoutineModel> {
        find(&self.routines, "routine", id, |routine| {
            routine.id == id && routine.kind == kind
        })
    }

    async fn list_large_objects(&self, pager: &Pager) -> AccessResult<Page<LargeObjectModel>> {
        let mut large_objects = self.large_objects.clone();
        large_objects.sort_by_key(|lo| lo.id);
        pager.apply(large_objects)
    }

    async fn get_large_object(&self, id: i64) -> AccessResult<LargeObjectModel> {
        find(&self.large_objects, "large object", id, |lo| lo.id == id)
    }

    async fn execute(&self, statement: &str) -> AccessResult<()> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(statement.to_string());
        Ok(())
    }
}

/// A [`DatabaseSource`] over in-memory catalogs, keyed by database OID.
#[derive(Debug, Default)]
pub struct MemoryCluster {
    default: Arc<MemoryCatalog>,
    default_database: Option<String>,
    databases: HashMap<String, Arc<MemoryCatalog>>,
    unreachable: HashSet<String>,
}

impl MemoryCluster {
    /// `default` serves cluster-wide queries and the empty database tag.
    pub fn new(default: MemoryCatalog) -> Self {
        Self {
            default: Arc::new(default),
            ..Default::default()
        }
    }

    /// Restricts listings to the database the connection string names.
    #[must_use]
    pub fn with_default_database(mut self, name: impl Into<String>) -> Self {
        self.default_database = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_database(mut self, oid: i64, catalog: MemoryCatalog) -> Self {
        self.databases.insert(oid.to_string(), Arc::new(catalog));
        self
    }

    /// Databases whose connection attempts fail.
    #[must_use]
    pub fn with_unreachable(mut self, oid: i64) -> Self {
        self.unreachable.insert(oid.to_string());
        self
    }

    pub fn catalog(&self, tag: &str) -> Option<Arc<MemoryCatalog>> {
        if tag.is_empty() {
            return Some(Arc::clone(&self.default));
        }
        self.databases.get(tag).cloned()
    }
}

#[async_trait]
impl DatabaseSource for MemoryCluster {
    type Client = MemoryCatalog;

    fn default_client(&self) -> Arc<MemoryCatalog> {
        Arc::clone(&self.default)
    }

    fn default_database(&self) -> Option<&str> {
        self.default_database.as_deref()
    }

    async fn get(&self, tag: &str) -> AccessResult<Arc<MemoryCatalog>> {
        if self.unreachable.contains(tag) {
            return Err(AccessError::connection(
                tag,
                "database does not accept connections",
            ));
        }
        match tag.parse::<i64>() {
            Ok(_) => self
                .databases
                .get(tag)
                .cloned()
                .ok_or_else(|| AccessError::DatabaseNotFound(tag.to_string())),
            Err(_) => Ok(Arc::clone(&self.default)),
        }
    }
}
