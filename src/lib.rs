//! # pg_entitlements
//!
//! Resolves PostgreSQL ownership, role membership and ACLs into an
//! enumerable set of resources, entitlements and grants, and turns
//! entitlement changes back into `GRANT`/`REVOKE` statements.
//!
//! ## Core Components
//!
//! * `acl` - parsing of `aclitem` strings
//! * `resolve` - effective privileges through ownership, inheritance and PUBLIC
//! * `identity` - stable resource, entitlement and grant identifiers
//! * `catalog` / `client` - catalog access, in memory or over `tokio-postgres`
//! * `pool` - one connection pool per database
//! * `syncers` - per-kind listing, grant resolution and provisioning
//! * `config` - TOML and environment configuration

pub mod acl;
pub mod catalog;
pub mod client;
pub mod config;
pub mod cursor;
pub mod entitlements;
pub mod error;
pub mod identity;
pub mod models;
pub mod pool;
pub mod privileges;
pub mod resolve;
pub mod statements;
pub mod syncers;

pub use acl::{AclEntry, AclResource};
pub use catalog::{Catalog, MemoryCatalog, MemoryCluster};
pub use client::{ClientOptions, DatabaseClient};
pub use config::Config;
pub use cursor::{Page, Pager};
pub use entitlements::{Entitlement, Grant, Resource, RoleAttribute, UserProfile};
pub use error::{AccessError, AccessResult};
pub use identity::{EntitlementId, GrantId, ResourceId, ResourceType};
pub use pool::{ClientPool, DatabaseSource, PoolOptions};
pub use privileges::{Privilege, PrivilegeSet};
pub use resolve::{effective_privileges, resolve_grants, EffectiveGrant, RoleDirectory};
pub use syncers::{Connector, ResourceSyncer, SyncSettings};
