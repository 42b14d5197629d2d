use std::collections::BTreeSet;

use dbevolution_schema::{reconcile_privileges, TablePrivilege};
use sqlx::MySqlConnection;

use crate::error::{Error, Result};

#[derive(Debug, sqlx::FromRow)]
struct SchemaPrivilegeRow {
    select_priv: String,
    insert_priv: String,
    update_priv: String,
    delete_priv: String,
}

impl SchemaPrivilegeRow {
    fn privileges(&self) -> Vec<TablePrivilege> {
        [
            (&self.select_priv, TablePrivilege::Select),
            (&self.insert_priv, TablePrivilege::Insert),
            (&self.update_priv, TablePrivilege::Update),
            (&self.delete_priv, TablePrivilege::Delete),
        ]
        .into_iter()
        .filter(|(granted, _)| granted.as_str() == "Y")
        .map(|(_, privilege)| privilege)
        .collect()
    }
}

/// Checks the grants of one `user@host` account.
pub struct PrivilegeAssert<'c> {
    user: String,
    host: String,
    conn: &'c mut MySqlConnection,
}

pub fn assert_that_user(
    user: impl Into<String>,
    host: impl Into<String>,
    conn: &mut MySqlConnection,
) -> PrivilegeAssert<'_> {
    PrivilegeAssert {
        user: user.into(),
        host: host.into(),
        conn,
    }
}

impl<'c> PrivilegeAssert<'c> {
    /// The account holds exactly `expected` on `schema.table`, counting
    /// schema-level and table-level grants.
    pub async fn has_privilege(
        &mut self,
        schema: &str,
        table: &str,
        expected: impl IntoIterator<Item = TablePrivilege>,
    ) -> Result<&mut Self> {
        let expected = expected.into_iter().collect::<BTreeSet<_>>();
        let schema_level = self.schema_privileges(schema).await?;
        let table_level = self.table_privileges(schema, table).await?;

        reconcile_privileges(&self.user, table, &expected, &schema_level, &table_level)?;

        Ok(self)
    }

    async fn schema_privileges(&mut self, schema: &str) -> Result<Vec<TablePrivilege>> {
        let rows = sqlx::query_as::<_, SchemaPrivilegeRow>(
            "SELECT CAST(Select_priv AS CHAR) AS select_priv, CAST(Insert_priv AS CHAR) AS insert_priv,
                CAST(Update_priv AS CHAR) AS update_priv, CAST(Delete_priv AS CHAR) AS delete_priv
            FROM mysql.db WHERE Db = ? AND User = ? AND Host = ?",
        )
        .bind(schema)
        .bind(&self.user)
        .bind(&self.host)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|e| {
            Error::assertion(format!(
                "Unable to retrieve database level table permissions for user: {}. Error message: {e}",
                self.user
            ))
        })?;

        Ok(rows.iter().flat_map(SchemaPrivilegeRow::privileges).collect())
    }

    async fn table_privileges(&mut self, schema: &str, table: &str) -> Result<Vec<TablePrivilege>> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT CAST(Table_priv AS CHAR) FROM mysql.tables_priv
            WHERE Db = ? AND User = ? AND Host = ? AND Table_name = ?",
        )
        .bind(schema)
        .bind(&self.user)
        .bind(&self.host)
        .bind(table)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|e| {
            Error::assertion(format!(
                "Unable to retrieve table permissions for user: {} and table: {table}. Error message: {e}",
                self.user
            ))
        })?;

        Ok(rows
            .iter()
            .flat_map(|raw| TablePrivilege::parse_list(raw))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_level_flags_map_to_privileges() {
        let row = SchemaPrivilegeRow {
            select_priv: "Y".to_owned(),
            insert_priv: "N".to_owned(),
            update_priv: "Y".to_owned(),
            delete_priv: "N".to_owned(),
        };

        assert_eq!(
            row.privileges(),
            vec![TablePrivilege::Select, TablePrivilege::Update]
        );
    }
}
