use super::{ColumnAssert, TableAssert};
use crate::{
    error::{ensure, Result},
    model::ForeignKey,
};

/// A single-column foreign key from the asserted column to
/// `target_table.target_column`. Composite keys never match.
#[derive(Debug, Clone)]
pub struct ForeignKeyAssert<'a> {
    column: ColumnAssert<'a>,
    foreign_key: Option<&'a ForeignKey>,
    description: String,
}

impl<'a> ForeignKeyAssert<'a> {
    pub(crate) fn new(column: ColumnAssert<'a>, target_table: &str, target_column: &str) -> Self {
        let foreign_key = column.and_table().table().foreign_keys.iter().find(|fk| {
            fk.references.len() == 1
                && fk.foreign_table == target_table
                && fk.first_reference().is_some_and(|r| {
                    r.local_column == column.name() && r.foreign_column == target_column
                })
        });

        Self {
            description: format!(
                "{}.{} -> {target_table}.{target_column}",
                column.table_name(),
                column.name()
            ),
            column,
            foreign_key,
        }
    }

    pub fn foreign_key(&self) -> Option<&'a ForeignKey> {
        self.foreign_key
    }

    pub fn is_present(self) -> Result<Self> {
        ensure(self.foreign_key.is_some(), || {
            format!("Foreign key not found for {}.", self.description)
        })?;

        Ok(self)
    }

    pub fn is_not_present(self) -> Result<Self> {
        ensure(self.foreign_key.is_none(), || {
            format!("Foreign key exists for {}.", self.description)
        })?;

        Ok(self)
    }

    pub fn with_name(self, name: &str) -> Result<Self> {
        let this = self.is_present()?;
        let actual = this.foreign_key.map(|fk| fk.name.as_str());

        ensure(actual == Some(name), || {
            format!(
                "Name of foreign key {}: expected {name} but was {}.",
                this.description,
                actual.unwrap_or_default()
            )
        })?;

        Ok(this)
    }

    pub fn and_column(self) -> ColumnAssert<'a> {
        self.column
    }

    pub fn and_table(self) -> TableAssert<'a> {
        self.column.and_table()
    }

    pub fn has_column(self, name: &str) -> Result<ColumnAssert<'a>> {
        self.column.has_column(name)
    }
}
