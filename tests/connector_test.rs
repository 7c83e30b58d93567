//! Walks the resource tree of an in-memory cluster through the public
//! connector API: listing, grant resolution and provisioning.

use std::sync::Arc;

use pg_entitlements::models::{DatabaseModel, RelationKind, RelationModel, RoleModel, SchemaModel};
use pg_entitlements::{
    AccessError, Connector, EntitlementId, GrantId, MemoryCatalog, MemoryCluster, Pager,
    ResourceId, ResourceType, SyncSettings,
};

const APP: i64 = 16384;

fn role(id: i64, name: &str, inherit: bool, member_of: &[i64]) -> RoleModel {
    RoleModel {
        id,
        name: name.to_string(),
        inherit,
        can_login: id != 20,
        member_of: member_of.to_vec(),
        ..Default::default()
    }
}

fn roles() -> Vec<RoleModel> {
    vec![
        role(10, "owner", true, &[]),
        role(20, "readers", true, &[]),
        role(30, "alice", true, &[20]),
        role(40, "bob", false, &[20]),
    ]
}

fn database(id: i64, name: &str) -> DatabaseModel {
    DatabaseModel {
        id,
        name: name.to_string(),
        owner_id: 10,
        acl: vec![],
    }
}

fn postgres() -> MemoryCatalog {
    MemoryCatalog::new("postgres")
        .with_roles(roles())
        .with_database(database(APP, "app"))
        .with_database(database(5, "postgres"))
        .with_database(database(16400, "legacy"))
}

fn cluster() -> MemoryCluster {
    let app = MemoryCatalog::new("app")
        .with_roles(roles())
        .with_schema(SchemaModel {
            id: 2200,
            name: "public".into(),
            owner_id: 10,
            acl: vec!["owner=UC/owner".into(), "readers=U/owner".into()],
        })
        .with_relation(RelationModel {
            id: 500,
            name: "orders".into(),
            schema_id: 2200,
            schema: "public".into(),
            owner_id: 10,
            kind: RelationKind::Table,
            acl: vec!["owner=arwdDxt/owner".into(), "readers=r/owner".into()],
        });

    MemoryCluster::new(postgres())
        .with_database(5, postgres())
        .with_database(APP, app)
        .with_unreachable(16400)
}

fn all_databases() -> SyncSettings {
    SyncSettings {
        sync_all_databases: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_walk_from_database_to_table_grants() {
    let connector = Connector::new(Arc::new(cluster()), all_databases());

    let databases = connector
        .list(ResourceType::Database, None, &Pager::first(10))
        .await
        .unwrap();
    let names: Vec<&str> = databases
        .items
        .iter()
        .map(|r| r.display_name.as_str())
        .collect();
    assert_eq!(names, vec!["app", "postgres"]);
    assert!(databases.is_last());

    let app = ResourceId::database(APP);
    let schemas = connector
        .list(ResourceType::Schema, Some(&app), &Pager::first(10))
        .await
        .unwrap();
    assert_eq!(schemas.items.len(), 1);
    assert_eq!(schemas.items[0].display_name, "app - public");

    let tables = connector
        .list(ResourceType::Table, Some(&schemas.items[0].id), &Pager::first(10))
        .await
        .unwrap();
    assert_eq!(tables.items.len(), 1);
    let orders = &tables.items[0];
    assert_eq!(orders.id.to_string(), "table:db16384:500");
    assert_eq!(orders.display_name, "public.orders");

    let grants = connector.grants(&orders.id, &Pager::first(10)).await.unwrap();
    let held_by = |id: i64| -> Vec<String> {
        grants
            .items
            .iter()
            .filter(|g| g.principal == ResourceId::role(id))
            .map(|g| g.entitlement.slug.clone())
            .collect()
    };
    assert_eq!(held_by(20), vec!["select"]);
    assert_eq!(held_by(30), vec!["select"]);
    assert!(held_by(40).is_empty());
}

#[tokio::test]
async fn test_default_database_filter() {
    let source = Arc::new(cluster().with_default_database("app"));
    let connector = Connector::new(source, SyncSettings::default());

    let databases = connector
        .list(ResourceType::Database, None, &Pager::first(10))
        .await
        .unwrap();
    let ids: Vec<String> = databases.items.iter().map(|r| r.id.to_string()).collect();
    assert_eq!(ids, vec!["database:16384"]);
}

#[tokio::test]
async fn test_ids_from_strings_reach_the_same_resources() {
    let connector = Connector::new(Arc::new(cluster()), all_databases());

    let table: ResourceId = "table:db16384:500".parse().unwrap();
    let resource = connector.get(&table).await.unwrap();
    assert_eq!(resource.parent, Some("schema:db16384:2200".parse().unwrap()));

    let entitlements = connector.entitlements(&table).await.unwrap();
    assert!(entitlements
        .iter()
        .any(|e| e.id.to_string() == "entitlement:table:db16384:500:truncate:grant"));

    let missing: ResourceId = "table:db16384:999".parse().unwrap();
    assert!(matches!(
        connector.get(&missing).await,
        Err(AccessError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_provisioning_issues_statements() {
    let source = Arc::new(cluster());
    let connector = Connector::new(Arc::clone(&source), all_databases());

    let insert: EntitlementId = "entitlement:table:db16384:500:insert".parse().unwrap();
    connector.grant(&ResourceId::role(40), &insert).await.unwrap();

    let select_option: GrantId = "grant:entitlement:table:db16384:500:select:grant:role:20"
        .parse()
        .unwrap();
    connector.revoke(&select_option).await.unwrap();

    assert_eq!(
        source.catalog("16384").unwrap().executed(),
        vec![
            "GRANT INSERT ON TABLE \"public\".\"orders\" TO \"bob\"",
            "REVOKE GRANT OPTION FOR SELECT ON TABLE \"public\".\"orders\" FROM \"readers\"",
        ]
    );

    let membership = EntitlementId::new(ResourceId::role(20), "member", false);
    connector.grant(&ResourceId::role(40), &membership).await.unwrap();
    assert_eq!(
        source.catalog("").unwrap().executed(),
        vec!["GRANT \"readers\" TO \"bob\""]
    );
}

#[tokio::test]
async fn test_role_groups_expose_membership() {
    let connector = Connector::new(Arc::new(cluster()), all_databases());

    let roles = connector
        .list(ResourceType::Role, None, &Pager::first(10))
        .await
        .unwrap();
    let groups: Vec<&str> = roles
        .items
        .iter()
        .filter(|r| r.is_group)
        .map(|r| r.display_name.as_str())
        .collect();
    assert_eq!(groups, vec!["readers"]);

    let members = connector
        .grants(&ResourceId::role(20), &Pager::first(10))
        .await
        .unwrap();
    let ids: Vec<String> = members.items.iter().map(|g| g.id.to_string()).collect();
    assert_eq!(
        ids,
        vec![
            "grant:entitlement:role:20:member:role:30",
            "grant:entitlement:role:20:member:role:40",
        ]
    );
}

#[tokio::test]
async fn test_disabled_kinds_and_bad_parents() {
    let connector = Connector::new(Arc::new(cluster()), all_databases());
    assert!(!connector.resource_types().contains(&ResourceType::Column));

    let table = ResourceId::scoped(ResourceType::Table, APP.to_string(), 500);
    assert!(matches!(
        connector.list(ResourceType::Column, Some(&table), &Pager::first(10)).await,
        Err(AccessError::UnsupportedOperation(_))
    ));

    assert!(matches!(
        connector
            .list(ResourceType::Table, Some(&ResourceId::database(APP)), &Pager::first(10))
            .await,
        Err(AccessError::InvalidIdentity { .. })
    ));

    assert!(matches!(
        connector.list(ResourceType::Table, None, &Pager::new("x", 10)).await,
        Ok(page) if page.items.is_empty()
    ));
}
