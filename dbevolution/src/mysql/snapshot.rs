use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::{Connection, MySqlConnection};

use super::{command::ExternalCommand, database::MySqlDatabase};
use crate::{
    config::DatabaseDetails,
    database::SnapshotStore,
    error::{Error, Result},
    snapshot::Snapshot,
};

const PASSWORD_ENV: &str = "MYSQL_PWD";

#[derive(Debug, sqlx::FromRow)]
struct GrantRow {
    user: String,
    host: String,
    table_name: String,
    table_priv: String,
}

/// Restores snapshots with the `mysql` client and captures them with
/// `mysqldump`, both run as the admin user.
#[derive(Debug, Clone)]
pub struct MySqlSnapshotStore {
    database: MySqlDatabase,
    mysql: String,
    mysqldump: String,
    work_dir: PathBuf,
}

impl MySqlSnapshotStore {
    pub fn new(details: DatabaseDetails) -> Self {
        Self {
            database: MySqlDatabase::new(details),
            mysql: "mysql".to_owned(),
            mysqldump: "mysqldump".to_owned(),
            work_dir: std::env::temp_dir(),
        }
    }

    pub fn mysql_program(mut self, program: impl Into<String>) -> Self {
        self.mysql = program.into();
        self
    }

    pub fn mysqldump_program(mut self, program: impl Into<String>) -> Self {
        self.mysqldump = program.into();
        self
    }

    /// Where embedded snapshots are written before restoring them.
    pub fn work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    fn details(&self) -> &DatabaseDetails {
        self.database.details()
    }

    fn client(&self, program: &str) -> ExternalCommand {
        let details = self.details();

        ExternalCommand::new(program)
            .arg(format!("--host={}", details.host))
            .arg(format!("--port={}", details.port))
            .arg(format!("--user={}", details.admin_user()))
            .secret_env(PASSWORD_ENV, details.admin_password())
    }

    async fn recreate_schema(&self) -> Result<()> {
        let schema = &self.details().schema_name;
        let mut conn = self.database.connect_admin().await?;

        let res = async {
            sqlx::query(&format!("DROP DATABASE IF EXISTS `{schema}`"))
                .execute(&mut conn)
                .await?;
            sqlx::query(&format!("CREATE DATABASE `{schema}`"))
                .execute(&mut conn)
                .await?;

            Ok::<_, Error>(())
        }
        .await;

        conn.close().await?;
        res
    }

    /// Table grants on the schema, as statements appended to a dump.
    async fn dump_grants(&self, conn: &mut MySqlConnection) -> Result<String> {
        let schema = &self.details().schema_name;

        let grants = sqlx::query_as::<_, GrantRow>(
            "SELECT CAST(User AS CHAR) AS user, CAST(Host AS CHAR) AS host,
                CAST(Table_name AS CHAR) AS table_name, CAST(Table_priv AS CHAR) AS table_priv
            FROM mysql.tables_priv WHERE Db = ? ORDER BY User, Host, Table_name",
        )
        .bind(schema)
        .fetch_all(&mut *conn)
        .await?;

        let statements = grants
            .into_iter()
            .filter(|g| !g.table_priv.is_empty())
            .map(|g| {
                format!(
                    "GRANT {} ON `{schema}`.`{}` TO '{}'@'{}';",
                    g.table_priv.replace(',', ", ").to_uppercase(),
                    g.table_name,
                    g.user,
                    g.host
                )
            })
            .collect::<Vec<_>>();

        Ok(statements.join("\n"))
    }
}

#[async_trait]
impl SnapshotStore for MySqlSnapshotStore {
    async fn restore(&self, snapshot: &Snapshot) -> Result<()> {
        let materialized = snapshot.materialize(&self.work_dir).await?;

        let restored = async {
            self.recreate_schema().await?;
            self.client(&self.mysql)
                .arg(&self.details().schema_name)
                .stdin(materialized.path())
                .output()
                .await?;

            Ok::<_, Error>(())
        }
        .await;

        if let Err(e) = materialized.cleanup().await {
            tracing::warn!("unable to remove materialized snapshot: {e}");
        }

        if restored.is_ok() {
            tracing::debug!("restored {} into {}", snapshot.name(), self.details().schema_name);
        }

        restored
    }

    async fn capture(&self, target: &Path, include_data: bool) -> Result<Snapshot> {
        let mut command = self
            .client(&self.mysqldump)
            .args(["--routines", "--triggers", "--skip-comments", "--single-transaction"]);

        if !include_data {
            command = command.arg("--no-data");
        }

        let mut dump = command.arg(&self.details().schema_name).output().await?;

        let mut conn = self.database.connect_admin().await?;
        let grants = self.dump_grants(&mut conn).await;
        conn.close().await?;
        let grants = grants?;

        if !grants.is_empty() {
            dump.extend_from_slice(b"\n");
            dump.extend_from_slice(grants.as_bytes());
            dump.extend_from_slice(b"\n");
        }

        tokio::fs::write(target, dump).await?;

        Ok(Snapshot::file(target))
    }
}
