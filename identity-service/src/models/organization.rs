//! Organization model - the tenant registry entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Organization entity.
///
/// `write_endpoint`/`read_endpoint` are connection strings for the tenant's
/// physical data store.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Organization {
    pub tenant_id: Uuid,
    pub display_name: String,
    pub sso_enabled: bool,
    #[serde(skip_serializing)]
    pub write_endpoint: String,
    #[serde(skip_serializing)]
    pub read_endpoint: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    /// Create a new organization with a fresh tenant id.
    /// The read endpoint mirrors the write endpoint unless given.
    pub fn new(display_name: String, write_endpoint: String, read_endpoint: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            tenant_id: Uuid::new_v4(),
            display_name,
            sso_enabled: false,
            read_endpoint: read_endpoint.unwrap_or_else(|| write_endpoint.clone()),
            write_endpoint,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update.
    ///
    /// A new `write_endpoint` without an explicit `read_endpoint` resets the
    /// read endpoint to the new write endpoint.
    pub fn apply(&mut self, patch: OrganizationPatch) {
        if let Some(name) = patch.display_name {
            self.display_name = name;
        }
        if let Some(sso_enabled) = patch.sso_enabled {
            self.sso_enabled = sso_enabled;
        }
        match (patch.write_endpoint, patch.read_endpoint) {
            (Some(write), Some(read)) => {
                self.write_endpoint = write;
                self.read_endpoint = read;
            }
            (Some(write), None) => {
                if write != self.write_endpoint {
                    self.read_endpoint = write.clone();
                }
                self.write_endpoint = write;
            }
            (None, Some(read)) => self.read_endpoint = read,
            (None, None) => {}
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update for an organization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrganizationPatch {
    pub display_name: Option<String>,
    pub sso_enabled: Option<bool>,
    pub write_endpoint: Option<String>,
    pub read_endpoint: Option<String>,
}
