use crate::postgres::PostgresClient;
use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;
use tracing::{debug, info};

const GOOSE_UP: &str = "-- +goose Up";
const GOOSE_DOWN: &str = "-- +goose Down";

/// A goose-format SQL migration compiled into the binary
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

impl Migration {
    /// Statements between `-- +goose Up` and `-- +goose Down` (or end of file)
    pub fn up_sql(&self) -> Result<&'static str> {
        let Some(start) = self.sql.find(GOOSE_UP) else {
            bail!("migration {} ({}) has no '{}' section", self.version, self.name, GOOSE_UP);
        };
        let body = &self.sql[start + GOOSE_UP.len()..];
        let end = body.find(GOOSE_DOWN).unwrap_or(body.len());
        Ok(body[..end].trim())
    }
}

/// Schema of the fleet telemetry store, in apply order
pub const FLEET_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_fleet_schema",
        sql: include_str!("../../migrations/postgres/00001_create_fleet_schema.sql"),
    },
    Migration {
        version: 2,
        name: "create_devices_alert_view",
        sql: include_str!("../../migrations/postgres/00002_create_devices_alert_view.sql"),
    },
];

/// Applies embedded migrations, recording versions in goose's bookkeeping
/// table so the schema can also be managed with the goose CLI.
pub struct MigrationRunner {
    client: PostgresClient,
    migrations: &'static [Migration],
}

impl MigrationRunner {
    pub fn new(client: PostgresClient) -> Self {
        Self::with_migrations(client, FLEET_MIGRATIONS)
    }

    pub fn with_migrations(client: PostgresClient, migrations: &'static [Migration]) -> Self {
        Self { client, migrations }
    }

    /// Runs all pending migrations, each in its own transaction
    pub async fn run_migrations(&self) -> Result<()> {
        let mut conn = self.client.get_connection().await?;

        conn.batch_execute(
            "CREATE TABLE IF NOT EXISTS goose_db_version (
                 id SERIAL PRIMARY KEY,
                 version_id BIGINT NOT NULL,
                 is_applied BOOLEAN NOT NULL,
                 tstamp TIMESTAMP DEFAULT now()
             )",
        )
        .await?;

        let applied = Self::applied_versions(&conn).await?;
        let mut pending: Vec<&Migration> = self
            .migrations
            .iter()
            .filter(|m| !applied.get(&m.version).copied().unwrap_or(false))
            .collect();
        pending.sort_by_key(|m| m.version);

        for migration in pending {
            let up = migration.up_sql()?;
            let tx = conn.transaction().await?;
            tx.batch_execute(up)
                .await
                .with_context(|| format!("migration {} ({}) failed", migration.version, migration.name))?;
            tx.execute(
                "INSERT INTO goose_db_version (version_id, is_applied) VALUES ($1, TRUE)",
                &[&migration.version],
            )
            .await?;
            tx.commit().await?;
            info!(version = migration.version, name = migration.name, "applied migration");
        }

        debug!("migrations up to date");
        Ok(())
    }

    /// Versions with their latest applied flag
    pub async fn migration_status(&self) -> Result<BTreeMap<i64, bool>> {
        let conn = self.client.get_connection().await?;
        Self::applied_versions(&conn).await
    }

    async fn applied_versions(conn: &deadpool_postgres::Client) -> Result<BTreeMap<i64, bool>> {
        let rows = conn
            .query(
                "SELECT version_id, is_applied FROM goose_db_version ORDER BY id",
                &[],
            )
            .await?;

        let mut versions = BTreeMap::new();
        for row in rows {
            versions.insert(row.get::<_, i64>(0), row.get::<_, bool>(1));
        }
        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_up_section_stops_at_down_marker() {
        let migration = Migration {
            version: 9,
            name: "sample",
            sql: "-- +goose Up\nCREATE TABLE t (id INT);\n\n-- +goose Down\nDROP TABLE t;\n",
        };

        assert_eq!(migration.up_sql().unwrap(), "CREATE TABLE t (id INT);");
    }

    #[test]
    fn test_missing_up_marker_is_an_error() {
        let migration = Migration {
            version: 3,
            name: "broken",
            sql: "CREATE TABLE t (id INT);",
        };

        assert!(migration.up_sql().is_err());
    }

    #[test]
    fn test_embedded_migrations_are_ordered_and_parse() {
        let versions: Vec<i64> = FLEET_MIGRATIONS.iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![1, 2]);

        for migration in FLEET_MIGRATIONS {
            let up = migration.up_sql().unwrap();
            assert!(!up.is_empty());
            assert!(!up.contains("DROP TABLE"));
        }
        assert!(FLEET_MIGRATIONS[0].up_sql().unwrap().contains("device_current_state"));
        assert!(FLEET_MIGRATIONS[1].up_sql().unwrap().contains("devices_alert_view"));
    }
}
