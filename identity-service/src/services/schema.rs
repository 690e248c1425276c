//! Per-tenant schema naming and the baseline table set.

use uuid::Uuid;

pub const SCHEMA_PREFIX: &str = "tenant_";

/// Schema name for a tenant. Output only contains `[A-Za-z0-9_]`.
pub fn schema_name(tenant_id: Uuid) -> String {
    let normalized: String = tenant_id
        .to_string()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}{}", SCHEMA_PREFIX, normalized)
}

/// Double-quote an identifier for use in DDL.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub fn create_schema_statement(schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema))
}

pub fn drop_schema_statement(schema: &str) -> String {
    format!("DROP SCHEMA IF EXISTS {} CASCADE", quote_ident(schema))
}

/// Baseline tables and indexes for a fresh tenant schema, in execution order.
///
/// Every table reference is qualified with the schema so nothing depends on
/// the connection's `search_path`.
pub fn baseline_statements(schema: &str) -> Vec<String> {
    let s = quote_ident(schema);
    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {s}.users (
                id UUID PRIMARY KEY,
                account_id UUID NOT NULL,
                email TEXT NOT NULL,
                name TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'member',
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"
        ),
        format!("CREATE UNIQUE INDEX IF NOT EXISTS users_account_id_key ON {s}.users (account_id)"),
        format!("CREATE INDEX IF NOT EXISTS users_email_idx ON {s}.users (LOWER(email))"),
        format!(
            "CREATE TABLE IF NOT EXISTS {s}.teams (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"
        ),
        format!("CREATE UNIQUE INDEX IF NOT EXISTS teams_name_key ON {s}.teams (name)"),
        format!(
            "CREATE TABLE IF NOT EXISTS {s}.team_members (
                team_id UUID NOT NULL REFERENCES {s}.teams (id) ON DELETE CASCADE,
                user_id UUID NOT NULL REFERENCES {s}.users (id) ON DELETE CASCADE,
                role TEXT NOT NULL DEFAULT 'member',
                PRIMARY KEY (team_id, user_id)
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {s}.services (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                owner_team_id UUID REFERENCES {s}.teams (id) ON DELETE SET NULL,
                repository_url TEXT,
                tier TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"
        ),
        format!("CREATE UNIQUE INDEX IF NOT EXISTS services_name_key ON {s}.services (name)"),
        format!(
            "CREATE INDEX IF NOT EXISTS services_owner_team_idx ON {s}.services (owner_team_id)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {s}.service_dependencies (
                service_id UUID NOT NULL REFERENCES {s}.services (id) ON DELETE CASCADE,
                depends_on_id UUID NOT NULL REFERENCES {s}.services (id) ON DELETE CASCADE,
                PRIMARY KEY (service_id, depends_on_id),
                CHECK (service_id <> depends_on_id)
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {s}.documents (
                id UUID PRIMARY KEY,
                service_id UUID REFERENCES {s}.services (id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                body TEXT NOT NULL DEFAULT '',
                created_by UUID REFERENCES {s}.users (id) ON DELETE SET NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"
        ),
        format!("CREATE INDEX IF NOT EXISTS documents_service_idx ON {s}.documents (service_id)"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_name_is_identifier_safe() {
        let tenant_id = Uuid::parse_str("6f1c2e9a-0b3d-4e5f-8a7b-9c0d1e2f3a4b").unwrap();
        let name = schema_name(tenant_id);
        assert_eq!(name, "tenant_6f1c2e9a_0b3d_4e5f_8a7b_9c0d1e2f3a4b");
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }

    #[test]
    fn test_schema_name_is_deterministic() {
        let tenant_id = Uuid::new_v4();
        assert_eq!(schema_name(tenant_id), schema_name(tenant_id));
        assert_ne!(schema_name(tenant_id), schema_name(Uuid::new_v4()));
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("tenant_a"), "\"tenant_a\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_baseline_is_fully_qualified() {
        let statements = baseline_statements("tenant_x");
        assert!(statements.iter().any(|s| s.contains("\"tenant_x\".users (")));
        for statement in &statements {
            assert!(
                statement.contains("\"tenant_x\"."),
                "unqualified statement: {}",
                statement
            );
        }
    }

    #[test]
    fn test_drop_statement_cascades() {
        assert_eq!(
            drop_schema_statement("tenant_x"),
            "DROP SCHEMA IF EXISTS \"tenant_x\" CASCADE"
        );
    }
}
