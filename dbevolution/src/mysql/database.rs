use async_trait::async_trait;
use sqlx::{
    mysql::{MySqlConnectOptions, MySqlConnection},
    ConnectOptions, Connection,
};

use crate::{config::DatabaseDetails, database::Database, error::Result};

/// Hands out one fresh connection per engine phase, logged in as the
/// migration user on the schema under test.
#[derive(Debug, Clone)]
pub struct MySqlDatabase {
    details: DatabaseDetails,
}

impl MySqlDatabase {
    pub fn new(details: DatabaseDetails) -> Self {
        Self { details }
    }

    pub fn details(&self) -> &DatabaseDetails {
        &self.details
    }

    pub fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.details.host)
            .port(self.details.port)
            .username(&self.details.migration_user)
            .password(&self.details.migration_password)
            .database(&self.details.schema_name)
    }

    /// Options for the admin user, without a default schema so the schema
    /// under test can be dropped.
    pub fn admin_connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.details.host)
            .port(self.details.port)
            .username(self.details.admin_user())
            .password(self.details.admin_password())
    }

    pub async fn connect_admin(&self) -> Result<MySqlConnection> {
        Ok(self.admin_connect_options().connect().await?)
    }
}

#[async_trait]
impl Database<MySqlConnection> for MySqlDatabase {
    async fn connect(&self) -> Result<MySqlConnection> {
        Ok(self.connect_options().connect().await?)
    }

    async fn release(&self, conn: MySqlConnection) -> Result<()> {
        Ok(conn.close().await?)
    }

    async fn commit(&self, conn: &mut MySqlConnection) -> Result<()> {
        sqlx::query("COMMIT").execute(&mut *conn).await?;

        Ok(())
    }

    async fn set_referential_integrity(&self, conn: &mut MySqlConnection, enabled: bool) -> Result<()> {
        let value = if enabled { 1 } else { 0 };

        sqlx::query(&format!("SET FOREIGN_KEY_CHECKS = {value}"))
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}
