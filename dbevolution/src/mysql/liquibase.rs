use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::MySqlConnection;

use super::command::ExternalCommand;
use crate::{
    changelog::{ChangeLog, ChangeSetRecord},
    config::DatabaseDetails,
    database::MigrationRunner,
    error::{Error, Result},
};

/// Runs changelogs with the Liquibase command line and reads its
/// bookkeeping from `DATABASECHANGELOG`.
#[derive(Debug, Clone)]
pub struct LiquibaseCli {
    program: String,
    search_path: PathBuf,
    details: DatabaseDetails,
}

impl LiquibaseCli {
    pub fn new(details: DatabaseDetails, search_path: impl Into<PathBuf>) -> Self {
        Self {
            program: "liquibase".to_owned(),
            search_path: search_path.into(),
            details,
        }
    }

    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn jdbc_url(&self) -> String {
        format!(
            "jdbc:mysql://{}:{}/{}",
            self.details.host, self.details.port, self.details.schema_name
        )
    }

    fn command(&self, file: &str, contexts: &str) -> ExternalCommand {
        ExternalCommand::new(&self.program)
            .arg(format!("--search-path={}", self.search_path.display()))
            .arg("update")
            .arg(format!("--changelog-file={file}"))
            .arg(format!("--url={}", self.jdbc_url()))
            .arg(format!("--username={}", self.details.migration_user))
            .arg(format!("--password={}", self.details.migration_password))
            .arg(format!("--contexts={contexts}"))
    }
}

#[async_trait]
impl MigrationRunner<MySqlConnection> for LiquibaseCli {
    async fn change_log(&self, file: &str) -> Result<ChangeLog> {
        ChangeLog::load(&self.search_path, file).await
    }

    async fn update(
        &self,
        conn: &mut MySqlConnection,
        file: &str,
        contexts: &str,
    ) -> Result<Vec<ChangeSetRecord>> {
        let before = self.ran_change_sets(conn).await?;

        self.command(file, contexts)
            .output()
            .await
            .map_err(|e| match e {
                Error::Command { stderr, .. } => Error::script(file, stderr),
                other => other,
            })?;

        let after = self.ran_change_sets(conn).await?;

        Ok(after.into_iter().filter(|r| !before.contains(r)).collect())
    }

    async fn ran_change_sets(&self, conn: &mut MySqlConnection) -> Result<Vec<ChangeSetRecord>> {
        let exists = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = 'DATABASECHANGELOG'",
        )
        .bind(&self.details.schema_name)
        .fetch_one(&mut *conn)
        .await?;

        if exists == 0 {
            return Ok(Vec::new());
        }

        let records = sqlx::query_as::<_, ChangeSetRecord>(
            "SELECT ID AS id, AUTHOR AS author, FILENAME AS file_name,
                DATEEXECUTED AS date_executed, ORDEREXECUTED AS order_executed, COMMENTS AS comments
            FROM DATABASECHANGELOG ORDER BY ORDEREXECUTED",
        )
        .fetch_all(&mut *conn)
        .await?;

        Ok(records)
    }
}
