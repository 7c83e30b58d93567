//! Catalog queries over a pooled connection to one database.

use std::fmt::Display;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, PoolError, RecyclingMethod};
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

use crate::catalog::Catalog;
use crate::cursor::{paginate, Page, Pager};
use crate::error::{AccessError, AccessResult};
use crate::models::{
    ColumnModel, DatabaseModel, LargeObjectModel, RelationKind, RelationModel, RoleModel,
    RoutineKind, RoutineModel, SchemaModel,
};
use crate::resolve::RoleDirectory;

const ROLE_COLUMNS: &str = r#"r.oid::int8 AS oid,
       r.rolname,
       r.rolsuper,
       r.rolinherit,
       r.rolcreaterole,
       r.rolcreatedb,
       r.rolcanlogin,
       r.rolreplication,
       r.rolconnlimit,
       r.rolbypassrls,
       ARRAY(SELECT m.roleid::int8
             FROM pg_catalog.pg_auth_members m
             WHERE m.member = r.oid) AS member_of"#;

const DATABASE_COLUMNS: &str =
    "d.oid::int8 AS oid, d.datname, d.datdba::int8 AS datdba, d.datacl::text[] AS datacl";

const SCHEMA_COLUMNS: &str =
    "n.oid::int8 AS oid, n.nspname, n.nspowner::int8 AS nspowner, n.nspacl::text[] AS nspacl";

const RELATION_COLUMNS: &str = r#"c.oid::int8 AS oid,
       c.relname,
       c.relnamespace::int8 AS relnamespace,
       n.nspname,
       c.relowner::int8 AS relowner,
       c.relacl::text[] AS relacl"#;

const COLUMN_COLUMNS: &str = r#"a.attnum::int8 AS attnum,
       a.attname,
       a.attrelid::int8 AS attrelid,
       c.relname,
       n.nspname,
       c.relowner::int8 AS relowner,
       a.attacl::text[] AS attacl"#;

const ROUTINE_COLUMNS: &str = r#"p.oid::int8 AS oid,
       p.proname,
       p.pronamespace::int8 AS pronamespace,
       n.nspname,
       p.proowner::int8 AS proowner,
       pg_catalog.pg_get_function_identity_arguments(p.oid) AS arguments,
       CASE WHEN p.prokind = 'p' THEN NULL
            ELSE pg_catalog.pg_get_function_result(p.oid) END AS return_type,
       p.proacl::text[] AS proacl"#;

const LARGE_OBJECT_COLUMNS: &str =
    "l.oid::int8 AS oid, l.lomowner::int8 AS lomowner, l.lomacl::text[] AS lomacl";

/// Per-client query options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientOptions {
    /// Schema names to list. Empty lists every schema.
    pub schemas: Vec<String>,
    /// Leave out functions in `pg_catalog` and `information_schema`.
    pub skip_builtin_functions: bool,
    /// Upper bound of pooled connections per database.
    pub max_connections: usize,
}

/// Maps a failed checkout to a connection error, keeping the server error as
/// the source when there is one.
pub(crate) fn connection_error(database: &str, err: PoolError) -> AccessError {
    match err {
        PoolError::Backend(source) => AccessError::connection(database, source),
        other => AccessError::connection(database, other.to_string()),
    }
}

/// Queries against one database through a connection pool.
pub struct DatabaseClient {
    pool: Pool,
    database: String,
    options: ClientOptions,
}

impl std::fmt::Debug for DatabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseClient")
            .field("database", &self.database)
            .field("options", &self.options)
            .finish()
    }
}

impl DatabaseClient {
    /// Builds the pool without opening a connection.
    pub fn new(config: tokio_postgres::Config, options: ClientOptions) -> AccessResult<Self> {
        let database = config
            .get_dbname()
            .or_else(|| config.get_user())
            .unwrap_or_default()
            .to_string();

        let manager = Manager::from_config(
            config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(options.max_connections.max(1))
            .build()
            .map_err(|err| AccessError::connection(database.clone(), err.to_string()))?;

        Ok(Self {
            pool,
            database,
            options,
        })
    }

    /// Builds the pool and checks that the database accepts connections.
    pub async fn connect(config: tokio_postgres::Config, options: ClientOptions) -> AccessResult<Self> {
        let client = Self::new(config, options)?;
        client.validate().await?;
        log::info!("connected to database {}", client.database);
        Ok(client)
    }

    /// Round-trips `SELECT 1`.
    pub async fn validate(&self) -> AccessResult<()> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|err| connection_error(&self.database, err))?;
        conn.batch_execute("SELECT 1")
            .await
            .map_err(|err| AccessError::connection(self.database.clone(), err))
    }

    /// Closes the pool. Checked-out connections are dropped when returned.
    pub fn close(&self) {
        self.pool.close();
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    async fn query_page<T>(
        &self,
        what: &str,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
        pager: &Pager,
        decode: fn(&Row) -> AccessResult<T>,
    ) -> AccessResult<Page<T>> {
        let (offset, limit) = pager.parse()?;
        let fetch = limit + 1;

        let sql = format!(
            "{sql}\nLIMIT ${} OFFSET ${}",
            params.len() + 1,
            params.len() + 2
        );
        let mut args: Vec<&(dyn ToSql + Sync)> = params.to_vec();
        args.push(&fetch);
        args.push(&offset);

        log::debug!(
            "listing {what} in {} (offset {offset}, limit {limit})",
            self.database
        );
        let conn = self.pool.get().await?;
        let rows = conn.query(sql.as_str(), &args).await?;
        let items = rows.iter().map(decode).collect::<AccessResult<Vec<T>>>()?;

        Ok(paginate(items, offset, limit))
    }

    async fn query_one<T>(
        &self,
        kind: &'static str,
        id: impl Display + Send,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
        decode: fn(&Row) -> AccessResult<T>,
    ) -> AccessResult<T> {
        let conn = self.pool.get().await?;
        match conn.query_opt(sql, params).await? {
            Some(row) => decode(&row),
            None => Err(AccessError::not_found(kind, id)),
        }
    }
}

fn role_row(row: &Row) -> AccessResult<RoleModel> {
    RoleModel::try_from(row)
}

fn database_row(row: &Row) -> AccessResult<DatabaseModel> {
    DatabaseModel::try_from(row)
}

fn schema_row(row: &Row) -> AccessResult<SchemaModel> {
    SchemaModel::try_from(row)
}

fn column_row(row: &Row) -> AccessResult<ColumnModel> {
    ColumnModel::try_from(row)
}

fn large_object_row(row: &Row) -> AccessResult<LargeObjectModel> {
    LargeObjectModel::try_from(row)
}

fn table_row(row: &Row) -> AccessResult<RelationModel> {
    RelationModel::from_row(row, RelationKind::Table)
}

fn view_row(row: &Row) -> AccessResult<RelationModel> {
    RelationModel::from_row(row, RelationKind::View)
}

fn sequence_row(row: &Row) -> AccessResult<RelationModel> {
    RelationModel::from_row(row, RelationKind::Sequence)
}

fn relation_decoder(kind: RelationKind) -> fn(&Row) -> AccessResult<RelationModel> {
    match kind {
        RelationKind::Table => table_row,
        RelationKind::View => view_row,
        RelationKind::Sequence => sequence_row,
    }
}

fn function_row(row: &Row) -> AccessResult<RoutineModel> {
    RoutineModel::from_row(row, RoutineKind::Function)
}

fn procedure_row(row: &Row) -> AccessResult<RoutineModel> {
    RoutineModel::from_row(row, RoutineKind::Procedure)
}

fn routine_decoder(kind: RoutineKind) -> fn(&Row) -> AccessResult<RoutineModel> {
    match kind {
        RoutineKind::Function => function_row,
        RoutineKind::Procedure => procedure_row,
    }
}

#[async_trait]
impl RoleDirectory for DatabaseClient {
    async fn get_role(&self, id: i64) -> AccessResult<RoleModel> {
        let sql = format!(
            "SELECT {ROLE_COLUMNS},\n       NULL::bool AS admin_option\n\
             FROM pg_catalog.pg_roles r\nWHERE r.oid = $1::int8::oid"
        );
        self.query_one("role", id, &sql, &[&id], role_row).await
    }
}

#[async_trait]
impl Catalog for DatabaseClient {
    fn database_name(&self) -> &str {
        &self.database
    }

    async fn list_roles(&self, pager: &Pager) -> AccessResult<Page<RoleModel>> {
        let sql = format!(
            "SELECT {ROLE_COLUMNS},\n       NULL::bool AS admin_option\n\
             FROM pg_catalog.pg_roles r\nORDER BY r.rolname, r.oid"
        );
        self.query_page("roles", &sql, &[], pager, role_row).await
    }

    async fn list_role_members(&self, role_id: i64, pager: &Pager) -> AccessResult<Page<RoleModel>> {
        let sql = format!(
            "SELECT {ROLE_COLUMNS},\n       \
             (SELECT bool_or(m.admin_option)\n        \
              FROM pg_catalog.pg_auth_members m\n        \
              WHERE m.member = r.oid AND m.roleid = $1::int8::oid) AS admin_option\n\
             FROM pg_catalog.pg_roles r\n\
             WHERE r.oid IN (SELECT m.member\n                \
                             FROM pg_catalog.pg_auth_members m\n                \
                             WHERE m.roleid = $1::int8::oid)\n\
             ORDER BY r.rolname, r.oid"
        );
        self.query_page("role members", &sql, &[&role_id], pager, role_row)
            .await
    }

    async fn get_role_by_name(&self, name: &str) -> AccessResult<RoleModel> {
        let sql = format!(
            "SELECT {ROLE_COLUMNS},\n       NULL::bool AS admin_option\n\
             FROM pg_catalog.pg_roles r\nWHERE r.rolname = $1"
        );
        self.query_one("role", name, &sql, &[&name], role_row).await
    }

    async fn role_has_members(&self, role_id: i64) -> AccessResult<bool> {
        let conn = self.pool.get().await?;
        let row = conn
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM pg_catalog.pg_auth_members WHERE roleid = $1::int8::oid)",
                &[&role_id],
            )
            .await?;
        Ok(row.try_get(0)?)
    }

    async fn list_databases(&self, pager: &Pager) -> AccessResult<Page<DatabaseModel>> {
        let sql = format!(
            "SELECT {DATABASE_COLUMNS}\nFROM pg_catalog.pg_database d\nORDER BY d.datname"
        );
        self.query_page("databases", &sql, &[], pager, database_row)
            .await
    }

    async fn get_database(&self, id: i64) -> AccessResult<DatabaseModel> {
        let sql = format!(
            "SELECT {DATABASE_COLUMNS}\nFROM pg_catalog.pg_database d\nWHERE d.oid = $1::int8::oid"
        );
        self.query_one("database", id, &sql, &[&id], database_row)
            .await
    }

    async fn list_schemas(&self, pager: &Pager) -> AccessResult<Page<SchemaModel>> {
        let schemas = &self.options.schemas;
        if schemas.is_empty() {
            let sql = format!(
                "SELECT {SCHEMA_COLUMNS}\nFROM pg_catalog.pg_namespace n\nORDER BY n.nspname"
            );
            return self.query_page("schemas", &sql, &[], pager, schema_row).await;
        }
        let sql = format!(
            "SELECT {SCHEMA_COLUMNS}\nFROM pg_catalog.pg_namespace n\n\
             WHERE n.nspname = ANY($1)\nORDER BY n.nspname"
        );
        self.query_page("schemas", &sql, &[schemas], pager, schema_row)
            .await
    }

    async fn get_schema(&self, id: i64) -> AccessResult<SchemaModel> {
        let sql = format!(
            "SELECT {SCHEMA_COLUMNS}\nFROM pg_catalog.pg_namespace n\nWHERE n.oid = $1::int8::oid"
        );
        self.query_one("schema", id, &sql, &[&id], schema_row).await
    }

    async fn list_relations(
        &self,
        kind: RelationKind,
        schema_id: i64,
        pager: &Pager,
    ) -> AccessResult<Page<RelationModel>> {
        let relkinds = kind.relkinds();
        let sql = format!(
            "SELECT {RELATION_COLUMNS}\n\
             FROM pg_catalog.pg_class c\n\
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace\n\
             WHERE c.relnamespace = $1::int8::oid\n  \
               AND c.relkind::text = ANY($2)\n\
             ORDER BY c.relname"
        );
        self.query_page(
            "relations",
            &sql,
            &[&schema_id, &relkinds],
            pager,
            relation_decoder(kind),
        )
        .await
    }

    async fn get_relation(&self, kind: RelationKind, id: i64) -> AccessResult<RelationModel> {
        let relkinds = kind.relkinds();
        let sql = format!(
            "SELECT {RELATION_COLUMNS}\n\
             FROM pg_catalog.pg_class c\n\
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace\n\
             WHERE c.oid = $1::int8::oid\n  \
               AND c.relkind::text = ANY($2)"
        );
        let kind_name = match kind {
            RelationKind::Table => "table",
            RelationKind::View => "view",
            RelationKind::Sequence => "sequence",
        };
        self.query_one(kind_name, id, &sql, &[&id, &relkinds], relation_decoder(kind))
            .await
    }

    async fn list_columns(&self, table_id: i64, pager: &Pager) -> AccessResult<Page<ColumnModel>> {
        let sql = format!(
            "SELECT {COLUMN_COLUMNS}\n\
             FROM pg_catalog.pg_attribute a\n\
             JOIN pg_catalog.pg_class c ON c.oid = a.attrelid\n\
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace\n\
             WHERE a.attrelid = $1::int8::oid\n  \
               AND a.attnum > 0\n  \
               AND NOT a.attisdropped\n\
             ORDER BY a.attnum"
        );
        self.query_page("columns", &sql, &[&table_id], pager, column_row)
            .await
    }

    async fn get_column(&self, table_id: i64, column_id: i64) -> AccessResult<ColumnModel> {
        let sql = format!(
            "SELECT {COLUMN_COLUMNS}\n\
             FROM pg_catalog.pg_attribute a\n\
             JOIN pg_catalog.pg_class c ON c.oid = a.attrelid\n\
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace\n\
             WHERE a.attrelid = $1::int8::oid\n  \
               AND a.attnum = $2::int8\n  \
               AND NOT a.attisdropped"
        );
        let id = format!("{table_id}:{column_id}");
        self.query_one("column", id, &sql, &[&table_id, &column_id], column_row)
            .await
    }

    async fn list_routines(
        &self,
        kind: RoutineKind,
        schema_id: i64,
        pager: &Pager,
    ) -> AccessResult<Page<RoutineModel>> {
        let prokind = kind.prokind();
        let builtin_filter = if self.options.skip_builtin_functions {
            "\n  AND n.nspname NOT IN ('pg_catalog', 'information_schema')"
        } else {
            ""
        };
        let sql = format!(
            "SELECT {ROUTINE_COLUMNS}\n\
             FROM pg_catalog.pg_proc p\n\
             JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace\n\
             WHERE p.pronamespace = $1::int8::oid\n  \
               AND p.prokind::text = $2{builtin_filter}\n\
             ORDER BY p.proname, p.oid"
        );
        self.query_page(
            "routines",
            &sql,
            &[&schema_id, &prokind],
            pager,
            routine_decoder(kind),
        )
        .await
    }

    async fn get_routine(&self, kind: RoutineKind, id: i64) -> AccessResult<RoutineModel> {
        let prokind = kind.prokind();
        let sql = format!(
            "SELECT {ROUTINE_COLUMNS}\n\
             FROM pg_catalog.pg_proc p\n\
             JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace\n\
             WHERE p.oid = $1::int8::oid\n  \
               AND p.prokind::text = $2"
        );
        let kind_name = match kind {
            RoutineKind::Function => "function",
            RoutineKind::Procedure => "procedure",
        };
        self.query_one(kind_name, id, &sql, &[&id, &prokind], routine_decoder(kind))
            .await
    }

    async fn list_large_objects(&self, pager: &Pager) -> AccessResult<Page<LargeObjectModel>> {
        let sql = format!(
            "SELECT {LARGE_OBJECT_COLUMNS}\nFROM pg_catalog.pg_largeobject_metadata l\nORDER BY l.oid"
        );
        self.query_page("large objects", &sql, &[], pager, large_object_row)
            .await
    }

    async fn get_large_object(&self, id: i64) -> AccessResult<LargeObjectModel> {
        let sql = format!(
            "SELECT {LARGE_OBJECT_COLUMNS}\nFROM pg_catalog.pg_largeobject_metadata l\n\
             WHERE l.oid = $1::int8::oid"
        );
        self.query_one("large object", id, &sql, &[&id], large_object_row)
            .await
    }

    async fn execute(&self, statement: &str) -> AccessResult<()> {
        log::debug!("executing on {}: {statement}", self.database);
        let conn = self.pool.get().await?;
        conn.batch_execute(statement).await?;
        Ok(())
    }
}
