use sqlx::{mysql::MySqlRow, MySqlConnection, Row};

use crate::error::{Error, Result};

/// Assertions over the rows of one table. Values are compared as text,
/// `None` stands for SQL `NULL`.
pub struct DataAssert<'c> {
    table: String,
    conn: &'c mut MySqlConnection,
}

pub fn assert_that_table(table: impl Into<String>, conn: &mut MySqlConnection) -> DataAssert<'_> {
    DataAssert {
        table: table.into(),
        conn,
    }
}

fn ident(name: &str) -> Result<String> {
    if name.is_empty() || name.contains('`') {
        return Err(Error::configuration(format!("invalid identifier `{name}`")));
    }

    Ok(format!("`{name}`"))
}

/// `WHERE` clause matching every pair, `IS NULL` for `None`.
fn where_clause<'v>(values: &[(&str, Option<&'v str>)]) -> Result<(String, Vec<&'v str>)> {
    let mut conditions = Vec::new();
    let mut binds = Vec::new();

    for (column, value) in values {
        match value {
            Some(value) => {
                conditions.push(format!("{} = ?", ident(column)?));
                binds.push(*value);
            }
            None => conditions.push(format!("{} IS NULL", ident(column)?)),
        }
    }

    if conditions.is_empty() {
        return Err(Error::configuration("at least one column value is required"));
    }

    Ok((conditions.join(" AND "), binds))
}

fn text_values(row: &MySqlRow, len: usize) -> Result<Vec<Option<String>>> {
    (0..len)
        .map(|i| Ok(row.try_get::<Option<String>, _>(i)?))
        .collect()
}

impl<'c> DataAssert<'c> {
    async fn count(&mut self) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", ident(&self.table)?);

        let count = sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&mut *self.conn)
            .await?;

        Ok(count)
    }

    async fn matches(&mut self, values: &[(&str, Option<&str>)]) -> Result<bool> {
        let (clause, binds) = where_clause(values)?;
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {clause}",
            ident(&self.table)?
        );

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for bind in binds {
            query = query.bind(bind);
        }

        let count = query.fetch_one(&mut *self.conn).await?;

        Ok(count > 0)
    }

    async fn text_rows(&mut self, table: &str, columns: &[&str]) -> Result<Vec<Vec<Option<String>>>> {
        let select = columns
            .iter()
            .map(|c| Ok(format!("CAST({0} AS CHAR) AS {0}", ident(c)?)))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let sql = format!("SELECT {select} FROM {} ORDER BY `id` DESC", ident(table)?);

        let rows = sqlx::query(&sql).fetch_all(&mut *self.conn).await?;

        rows.iter()
            .map(|row| text_values(row, columns.len()))
            .collect()
    }

    pub async fn is_empty(&mut self) -> Result<&mut Self> {
        self.has_row_count(0).await
    }

    pub async fn has_row_count(&mut self, expected: i64) -> Result<&mut Self> {
        let actual = self.count().await?;

        if actual != expected {
            return Err(Error::assertion(format!(
                "# of rows in {}: expected {expected} but was {actual}.",
                self.table
            )));
        }

        Ok(self)
    }

    pub async fn has_row<'v>(
        &mut self,
        column: &str,
        value: impl Into<Option<&'v str>>,
    ) -> Result<&mut Self> {
        let value = value.into();

        if !self.matches(&[(column, value)]).await? {
            return Err(Error::assertion(format!(
                "{} has no row where {column} is {}.",
                self.table,
                value.unwrap_or("NULL")
            )));
        }

        Ok(self)
    }

    pub async fn does_not_have_row_with_value<'v>(
        &mut self,
        column: &str,
        value: impl Into<Option<&'v str>>,
    ) -> Result<&mut Self> {
        let value = value.into();

        if self.matches(&[(column, value)]).await? {
            return Err(Error::assertion(format!(
                "{} has a row where {column} is {}.",
                self.table,
                value.unwrap_or("NULL")
            )));
        }

        Ok(self)
    }

    pub async fn has_row_with_values(&mut self, values: &[(&str, Option<&str>)]) -> Result<&mut Self> {
        if !self.matches(values).await? {
            return Err(Error::assertion(format!(
                "{} has no row matching {}.",
                self.table,
                describe(values)
            )));
        }

        Ok(self)
    }

    pub async fn does_not_have_row_with_values(
        &mut self,
        values: &[(&str, Option<&str>)],
    ) -> Result<&mut Self> {
        if self.matches(values).await? {
            return Err(Error::assertion(format!(
                "{} has a row matching {}.",
                self.table,
                describe(values)
            )));
        }

        Ok(self)
    }

    /// Both tables hold the same `columns` values, row by row, ordered by
    /// descending `id`.
    pub async fn has_rows_matching(
        &mut self,
        table_a: &str,
        table_b: &str,
        columns: &[&str],
    ) -> Result<&mut Self> {
        let rows_a = self.text_rows(table_a, columns).await?;
        let rows_b = self.text_rows(table_b, columns).await?;

        if rows_a.len() != rows_b.len() {
            return Err(Error::assertion(format!(
                "{table_a} does not have the same number of rows as {table_b}: {} vs {}.",
                rows_a.len(),
                rows_b.len()
            )));
        }

        if let Some((a, b)) = rows_a.iter().zip(&rows_b).find(|(a, b)| a != b) {
            return Err(Error::assertion(format!(
                "Rows of {table_a} and {table_b} differ: {a:?} vs {b:?}."
            )));
        }

        Ok(self)
    }

    /// Every row of the table has `columns_a[i] = columns_b[i]`.
    pub async fn has_columns_matching(
        &mut self,
        columns_a: &[&str],
        columns_b: &[&str],
    ) -> Result<&mut Self> {
        if columns_a.len() != columns_b.len() || columns_a.is_empty() {
            return Err(Error::configuration(
                "column lists to compare must be non-empty and of the same length",
            ));
        }

        let select = columns_a
            .iter()
            .zip(columns_b)
            .map(|(a, b)| Ok(format!("{} = {}", ident(a)?, ident(b)?)))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let sql = format!("SELECT {select} FROM {}", ident(&self.table)?);

        let rows = sqlx::query(&sql).fetch_all(&mut *self.conn).await?;

        if rows.is_empty() {
            return Err(Error::assertion(format!("{} has no rows to compare.", self.table)));
        }

        for row in rows {
            for (i, (a, b)) in columns_a.iter().zip(columns_b).enumerate() {
                if row.try_get::<Option<i64>, _>(i)? != Some(1) {
                    return Err(Error::assertion(format!("column {a} didn't match {b}")));
                }
            }
        }

        Ok(self)
    }
}

fn describe(values: &[(&str, Option<&str>)]) -> String {
    values
        .iter()
        .map(|(column, value)| format!("{column}={}", value.unwrap_or("NULL")))
        .collect::<Vec<_>>()
        .join(", ")
}
