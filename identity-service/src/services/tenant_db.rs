//! Access to tenant data stores.
//!
//! Each organization's schema lives on whatever database its registry entry
//! points at, so connections are opened per operation from the endpoint.

use async_trait::async_trait;
use sqlx::{Connection, PgConnection};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::services::schema::{create_schema_statement, drop_schema_statement};
use crate::services::ServiceError;

/// Opens connections to tenant databases.
#[async_trait]
pub trait TenantDatabase: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn TenantConnection>, ServiceError>;
}

/// One open connection to a tenant database.
#[async_trait]
pub trait TenantConnection: Send {
    async fn create_schema(&mut self, schema: &str) -> Result<(), ServiceError>;

    async fn execute(&mut self, statement: &str) -> Result<(), ServiceError>;

    async fn drop_schema(&mut self, schema: &str) -> Result<(), ServiceError>;

    async fn close(self: Box<Self>) -> Result<(), ServiceError>;
}

// ==================== PostgreSQL ====================

#[derive(Clone, Default)]
pub struct PgTenantDatabase;

impl PgTenantDatabase {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TenantDatabase for PgTenantDatabase {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn TenantConnection>, ServiceError> {
        let conn = PgConnection::connect(endpoint).await?;
        Ok(Box::new(PgTenantConnection { conn }))
    }
}

struct PgTenantConnection {
    conn: PgConnection,
}

#[async_trait]
impl TenantConnection for PgTenantConnection {
    async fn create_schema(&mut self, schema: &str) -> Result<(), ServiceError> {
        self.execute(&create_schema_statement(schema)).await
    }

    async fn execute(&mut self, statement: &str) -> Result<(), ServiceError> {
        sqlx::query(statement).execute(&mut self.conn).await?;
        Ok(())
    }

    async fn drop_schema(&mut self, schema: &str) -> Result<(), ServiceError> {
        self.execute(&drop_schema_statement(schema)).await
    }

    async fn close(self: Box<Self>) -> Result<(), ServiceError> {
        self.conn.close().await?;
        Ok(())
    }
}

// ==================== In-memory ====================

#[derive(Default)]
struct TenantState {
    schemas: HashMap<String, HashSet<String>>,
    executed: Vec<String>,
    unreachable: HashSet<String>,
    fail_create_schema: bool,
    fail_drop_schema: bool,
    failing_fragments: Vec<String>,
}

/// Records schemas and statements per endpoint, with switchable faults.
#[derive(Clone, Default)]
pub struct InMemoryTenantDatabase {
    state: Arc<Mutex<TenantState>>,
}

impl InMemoryTenantDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, TenantState>, ServiceError> {
        lock_state(&self.state)
    }

    pub fn has_schema(&self, endpoint: &str, schema: &str) -> bool {
        self.lock()
            .map(|s| s.schemas.get(endpoint).is_some_and(|set| set.contains(schema)))
            .unwrap_or(false)
    }

    pub fn executed_statements(&self) -> Vec<String> {
        self.lock().map(|s| s.executed.clone()).unwrap_or_default()
    }

    pub fn set_unreachable(&self, endpoint: &str) {
        if let Ok(mut state) = self.lock() {
            state.unreachable.insert(endpoint.to_string());
        }
    }

    pub fn fail_create_schema(&self, fail: bool) {
        if let Ok(mut state) = self.lock() {
            state.fail_create_schema = fail;
        }
    }

    pub fn fail_drop_schema(&self, fail: bool) {
        if let Ok(mut state) = self.lock() {
            state.fail_drop_schema = fail;
        }
    }

    /// Any executed statement containing `fragment` fails.
    pub fn fail_statements_containing(&self, fragment: &str) {
        if let Ok(mut state) = self.lock() {
            state.failing_fragments.push(fragment.to_string());
        }
    }
}

fn lock_state(state: &Mutex<TenantState>) -> Result<MutexGuard<'_, TenantState>, ServiceError> {
    state.lock().map_err(|e| {
        ServiceError::Internal(anyhow::anyhow!("Tenant database mutex poisoned: {}", e))
    })
}

#[async_trait]
impl TenantDatabase for InMemoryTenantDatabase {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn TenantConnection>, ServiceError> {
        if self.lock()?.unreachable.contains(endpoint) {
            return Err(ServiceError::Internal(anyhow::anyhow!(
                "connection refused: {}",
                endpoint
            )));
        }
        Ok(Box::new(InMemoryTenantConnection {
            endpoint: endpoint.to_string(),
            state: self.state.clone(),
        }))
    }
}

struct InMemoryTenantConnection {
    endpoint: String,
    state: Arc<Mutex<TenantState>>,
}

#[async_trait]
impl TenantConnection for InMemoryTenantConnection {
    async fn create_schema(&mut self, schema: &str) -> Result<(), ServiceError> {
        let mut state = lock_state(&self.state)?;
        if state.fail_create_schema {
            return Err(ServiceError::Internal(anyhow::anyhow!(
                "permission denied to create schema {}",
                schema
            )));
        }
        state
            .schemas
            .entry(self.endpoint.clone())
            .or_default()
            .insert(schema.to_string());
        Ok(())
    }

    async fn execute(&mut self, statement: &str) -> Result<(), ServiceError> {
        let mut state = lock_state(&self.state)?;
        if state
            .failing_fragments
            .iter()
            .any(|fragment| statement.contains(fragment.as_str()))
        {
            return Err(ServiceError::Internal(anyhow::anyhow!(
                "statement rejected: {}",
                statement
            )));
        }
        state.executed.push(statement.to_string());
        Ok(())
    }

    async fn drop_schema(&mut self, schema: &str) -> Result<(), ServiceError> {
        let mut state = lock_state(&self.state)?;
        if state.fail_drop_schema {
            return Err(ServiceError::Internal(anyhow::anyhow!(
                "cannot drop schema {}",
                schema
            )));
        }
        if let Some(schemas) = state.schemas.get_mut(&self.endpoint) {
            schemas.remove(schema);
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), ServiceError> {
        Ok(())
    }
}
