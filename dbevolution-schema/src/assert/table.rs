use std::collections::BTreeSet;

use super::{ColumnAssert, SchemaAssert};
use crate::{
    error::{ensure, Result, SchemaError},
    model::{Index, Table},
};

/// Assertions over one table. Cheap to copy: chains hand the value along
/// rather than mutating a shared builder.
#[derive(Debug, Clone, Copy)]
pub struct TableAssert<'a> {
    schema: SchemaAssert<'a>,
    table: &'a Table,
    new_table: bool,
}

impl<'a> TableAssert<'a> {
    pub(crate) fn new(schema: SchemaAssert<'a>, table: &'a Table) -> Self {
        Self {
            schema,
            table,
            new_table: false,
        }
    }

    pub fn name(&self) -> &'a str {
        &self.table.name
    }

    pub fn table(&self) -> &'a Table {
        self.table
    }

    pub fn schema(&self) -> SchemaAssert<'a> {
        self.schema
    }

    pub fn is_new_table(&self) -> bool {
        self.new_table
    }

    pub fn and_schema(self) -> SchemaAssert<'a> {
        self.schema
    }

    /// Marks the table as created by the script under test, which lifts the
    /// NOT NULL safety rule for its columns.
    pub fn enter_new_table_assertion_mode(mut self) -> Self {
        self.new_table = true;
        self
    }

    pub fn has_column(self, name: &str) -> Result<ColumnAssert<'a>> {
        let column = self.table.find_column(name).ok_or_else(|| {
            SchemaError::assertion(format!(
                "Column '{name}' not present in '{}.{}'.",
                self.schema.model().name,
                self.table.name
            ))
        })?;

        Ok(ColumnAssert::new(self, column))
    }

    pub fn does_not_have_column(self, name: &str) -> Result<Self> {
        ensure(self.table.find_column(name).is_none(), || {
            format!("Column {}.{name} should not exist.", self.table.name)
        })?;

        Ok(self)
    }

    fn index_on(&self, columns: &[&str]) -> Option<&'a Index> {
        self.table.indexes.iter().find(|index| {
            index.columns.len() == columns.len()
                && index.columns.iter().zip(columns).all(|(a, b)| a == b)
        })
    }

    /// Requires an index whose ordered column list is exactly `columns`.
    pub fn has_index_on(self, columns: &[&str]) -> Result<Self> {
        ensure(self.index_on(columns).is_some(), || {
            format!(
                "No matching index found on {}({}).",
                self.table.name,
                columns.join(",")
            )
        })?;

        Ok(self)
    }

    pub fn has_no_index_on(self, columns: &[&str]) -> Result<Self> {
        ensure(self.index_on(columns).is_none(), || {
            format!(
                "Matching index found on {}({}).",
                self.table.name,
                columns.join(",")
            )
        })?;

        Ok(self)
    }

    pub fn has_unique_index_on(self, columns: &[&str]) -> Result<Self> {
        self.has_index_with_uniqueness(columns, true)
    }

    pub fn has_non_unique_index_on(self, columns: &[&str]) -> Result<Self> {
        self.has_index_with_uniqueness(columns, false)
    }

    fn has_index_with_uniqueness(self, columns: &[&str], unique: bool) -> Result<Self> {
        let index = self.has_index_on(columns)?.index_on(columns);

        ensure(index.is_some_and(|i| i.unique == unique), || {
            let expected = if unique { "unique" } else { "non-unique" };
            format!(
                "Matching index found on {}({}) but it is not {expected}.",
                self.table.name,
                columns.join(",")
            )
        })?;

        Ok(self)
    }

    pub fn has_no_indexes(self) -> Result<Self> {
        ensure(self.table.indexes.is_empty(), || {
            format!(
                "Index count of {}: expected 0 but was {}.",
                self.table.name,
                self.table.indexes.len()
            )
        })?;

        Ok(self)
    }

    pub fn has_index_named(self, name: &str) -> Result<Self> {
        ensure(self.table.find_index(name).is_some(), || {
            format!("Index '{name}' not found on {}.", self.table.name)
        })?;

        Ok(self)
    }

    pub fn has_no_index_named(self, name: &str) -> Result<Self> {
        ensure(self.table.find_index(name).is_none(), || {
            format!("Index '{name}' found on {}.", self.table.name)
        })?;

        Ok(self)
    }

    /// Exact set match against the table's primary key columns.
    pub fn has_primary_key_on(self, columns: &[&str]) -> Result<Self> {
        let expected = columns.iter().copied().collect::<BTreeSet<_>>();
        let actual = self
            .table
            .primary_key_columns()
            .map(|c| c.name.as_str())
            .collect::<BTreeSet<_>>();

        ensure(expected == actual, || {
            format!(
                "Primary key of {}: expected {expected:?} but was {actual:?}.",
                self.table.name
            )
        })?;

        Ok(self)
    }

    pub fn has_foreign_key_on(
        self,
        foreign_table: &str,
        local_column: &str,
        foreign_column: &str,
    ) -> Result<Self> {
        let found = self
            .table
            .foreign_keys
            .iter()
            .filter(|fk| fk.foreign_table == foreign_table)
            .flat_map(|fk| fk.references.iter())
            .any(|r| r.local_column == local_column && r.foreign_column == foreign_column);

        ensure(found, || {
            format!(
                "Foreign key from {}.{local_column} to {foreign_table}.{foreign_column} does not exist.",
                self.table.name
            )
        })?;

        Ok(self)
    }
}
