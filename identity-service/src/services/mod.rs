//! Services layer for identity-service.
//!
//! Credential authority, tenant provisioning and federated login, over the
//! persistence contracts in [`store`].

mod auth;
mod database;
pub mod error;
mod jwt;
mod memory;
pub mod metrics;
pub mod providers;
mod provisioner;
pub mod redis;
pub mod schema;
mod sso;
pub mod store;
pub mod tenant_db;

pub use auth::{AuthService, LoginResponse, ADMIN_ROLE};
pub use database::Database;
pub use error::ServiceError;
pub use jwt::{AccessTokenClaims, JwtService};
pub use memory::InMemoryStore;
pub use providers::{build_providers, GithubProvider, GoogleProvider, IdentityProvider, ProviderMap};
pub use provisioner::{BaselineReport, TenantProvisioner};
pub use self::redis::{InMemoryStateCache, RedisService, StateCache};
pub use schema::schema_name;
pub use sso::SsoService;
pub use store::{AuditSink, CredentialStore, SessionLedger, TenantRegistry};
pub use tenant_db::{InMemoryTenantDatabase, PgTenantDatabase, TenantConnection, TenantDatabase};
