//! Organization lifecycle: registry rows plus their isolated tenant schemas.

use std::sync::Arc;
use uuid::Uuid;

use crate::config::TenancyConfig;
use crate::models::{Organization, OrganizationPatch};
use crate::services::schema::{baseline_statements, schema_name};
use crate::services::tenant_db::{TenantConnection, TenantDatabase};
use crate::services::{metrics, ServiceError, TenantRegistry};

/// Outcome of applying the baseline statement set to a new schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BaselineReport {
    pub applied: usize,
    pub skipped: usize,
}

#[derive(Clone)]
pub struct TenantProvisioner {
    registry: Arc<dyn TenantRegistry>,
    tenants: Arc<dyn TenantDatabase>,
    defaults: TenancyConfig,
}

impl TenantProvisioner {
    pub fn new(
        registry: Arc<dyn TenantRegistry>,
        tenants: Arc<dyn TenantDatabase>,
        defaults: TenancyConfig,
    ) -> Self {
        Self {
            registry,
            tenants,
            defaults,
        }
    }

    /// Register an organization and create its schema.
    ///
    /// If the schema cannot be created the registry row is removed again.
    /// Individual baseline statements that fail are skipped.
    #[tracing::instrument(skip(self, write_endpoint, read_endpoint))]
    pub async fn create_organization(
        &self,
        display_name: &str,
        write_endpoint: Option<String>,
        read_endpoint: Option<String>,
    ) -> Result<Organization, ServiceError> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(ServiceError::Validation(
                "Organization name must not be empty".to_string(),
            ));
        }

        let (write_endpoint, read_endpoint) =
            match write_endpoint.filter(|e| !e.trim().is_empty()) {
                Some(write) => (write, read_endpoint),
                None => (
                    self.defaults.default_write_endpoint.clone(),
                    read_endpoint.or_else(|| self.defaults.default_read_endpoint.clone()),
                ),
            };
        let read_endpoint = read_endpoint.filter(|e| !e.trim().is_empty());

        let org = Organization::new(display_name.to_string(), write_endpoint, read_endpoint);
        self.registry.insert_organization(&org).await?;

        let schema = schema_name(org.tenant_id);
        tracing::info!(tenant_id = %org.tenant_id, schema = %schema, "Provisioning tenant schema");

        let conn = match self.open_and_create_schema(&org.write_endpoint, &schema).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(
                    tenant_id = %org.tenant_id,
                    schema = %schema,
                    error = %e,
                    "Schema creation failed, rolling back registry entry"
                );
                if let Err(rollback) = self.registry.delete_organization(org.tenant_id).await {
                    tracing::error!(
                        tenant_id = %org.tenant_id,
                        error = %rollback,
                        "Failed to roll back registry entry"
                    );
                }
                metrics::record_provisioning("create", "failure");
                return Err(ServiceError::ProvisioningFailure(
                    "tenant schema could not be created".to_string(),
                ));
            }
        };

        let report = apply_baseline(conn, &schema).await;
        tracing::info!(
            tenant_id = %org.tenant_id,
            schema = %schema,
            applied = report.applied,
            skipped = report.skipped,
            "Tenant provisioned"
        );
        metrics::record_provisioning("create", "success");

        Ok(org)
    }

    async fn open_and_create_schema(
        &self,
        endpoint: &str,
        schema: &str,
    ) -> Result<Box<dyn TenantConnection>, ServiceError> {
        let mut conn = self.tenants.connect(endpoint).await?;
        conn.create_schema(schema).await?;
        Ok(conn)
    }

    /// Drop the tenant schema (best effort) and remove the registry row.
    #[tracing::instrument(skip(self))]
    pub async fn delete_organization(&self, tenant_id: Uuid) -> Result<(), ServiceError> {
        let org = self
            .registry
            .find_organization(tenant_id)
            .await?
            .ok_or(ServiceError::OrganizationNotFound)?;

        let schema = schema_name(org.tenant_id);
        if let Err(e) = self.drop_schema(&org.write_endpoint, &schema).await {
            tracing::warn!(
                tenant_id = %tenant_id,
                schema = %schema,
                error = %e,
                "Failed to drop tenant schema, removing registry entry anyway"
            );
            metrics::record_provisioning("drop_schema", "failure");
        }

        if !self.registry.delete_organization(tenant_id).await? {
            return Err(ServiceError::OrganizationNotFound);
        }

        metrics::record_provisioning("delete", "success");
        tracing::info!(tenant_id = %tenant_id, "Organization deleted");
        Ok(())
    }

    async fn drop_schema(&self, endpoint: &str, schema: &str) -> Result<(), ServiceError> {
        let mut conn = self.tenants.connect(endpoint).await?;
        conn.drop_schema(schema).await?;
        conn.close().await
    }

    #[tracing::instrument(skip(self, patch))]
    pub async fn update_organization(
        &self,
        tenant_id: Uuid,
        patch: OrganizationPatch,
    ) -> Result<Organization, ServiceError> {
        if let Some(name) = patch.display_name.as_deref() {
            if name.trim().is_empty() {
                return Err(ServiceError::Validation(
                    "Organization name must not be empty".to_string(),
                ));
            }
        }
        if patch.write_endpoint.as_deref().is_some_and(|e| e.trim().is_empty()) {
            return Err(ServiceError::Validation(
                "Write endpoint must not be empty".to_string(),
            ));
        }

        let mut org = self
            .registry
            .find_organization(tenant_id)
            .await?
            .ok_or(ServiceError::OrganizationNotFound)?;

        org.apply(OrganizationPatch {
            display_name: patch.display_name.map(|n| n.trim().to_string()),
            ..patch
        });
        self.registry.update_organization(&org).await?;

        metrics::record_provisioning("update", "success");
        tracing::info!(tenant_id = %tenant_id, "Organization updated");
        Ok(org)
    }

    pub async fn get_organization(&self, tenant_id: Uuid) -> Result<Organization, ServiceError> {
        self.registry
            .find_organization(tenant_id)
            .await?
            .ok_or(ServiceError::OrganizationNotFound)
    }

    pub async fn list_organizations(&self) -> Result<Vec<Organization>, ServiceError> {
        self.registry.list_organizations().await
    }
}

/// Run every baseline statement in order, continuing past failures.
async fn apply_baseline(mut conn: Box<dyn TenantConnection>, schema: &str) -> BaselineReport {
    let mut report = BaselineReport::default();

    for statement in baseline_statements(schema) {
        match conn.execute(&statement).await {
            Ok(()) => {
                report.applied += 1;
                metrics::record_baseline_statement("applied");
            }
            Err(e) => {
                report.skipped += 1;
                metrics::record_baseline_statement("skipped");
                tracing::warn!(schema = %schema, error = %e, "Baseline statement failed, skipping");
            }
        }
    }

    if let Err(e) = conn.close().await {
        tracing::warn!(schema = %schema, error = %e, "Failed to close tenant connection");
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::tenant_db::InMemoryTenantDatabase;

    #[tokio::test]
    async fn test_baseline_continues_past_failures() {
        let tenants = InMemoryTenantDatabase::new();
        tenants.fail_statements_containing("TABLE IF NOT EXISTS \"tenant_x\".documents");
        let conn = tenants.connect("postgres://tenant").await.unwrap();

        let report = apply_baseline(conn, "tenant_x").await;

        let total = baseline_statements("tenant_x").len();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.applied, total - 1);
        assert_eq!(tenants.executed_statements().len(), total - 1);
    }
}
