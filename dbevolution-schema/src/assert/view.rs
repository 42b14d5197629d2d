use super::SchemaAssert;
use crate::{
    error::{ensure, Result, SchemaError},
    model::{View, ViewColumn},
};

#[derive(Debug, Clone, Copy)]
pub struct ViewAssert<'a> {
    schema: SchemaAssert<'a>,
    view: &'a View,
}

impl<'a> ViewAssert<'a> {
    pub(crate) fn new(schema: SchemaAssert<'a>, view: &'a View) -> Self {
        Self { schema, view }
    }

    pub fn view(&self) -> &'a View {
        self.view
    }

    pub fn and_schema(self) -> SchemaAssert<'a> {
        self.schema
    }

    pub fn has_column(self, name: &str) -> Result<ViewColumnAssert<'a>> {
        let column = self.view.find_column(name).ok_or_else(|| {
            SchemaError::assertion(format!(
                "Column '{name}' does not exist in view '{}'.",
                self.view.name
            ))
        })?;

        Ok(ViewColumnAssert { view: self, column })
    }

    pub fn does_not_have_column(self, name: &str) -> Result<Self> {
        ensure(self.view.find_column(name).is_none(), || {
            format!(
                "Column '{name}' should not exist in view '{}'.",
                self.view.name
            )
        })?;

        Ok(self)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ViewColumnAssert<'a> {
    view: ViewAssert<'a>,
    column: &'a ViewColumn,
}

impl<'a> ViewColumnAssert<'a> {
    pub fn column(&self) -> &'a ViewColumn {
        self.column
    }

    pub fn and_view(self) -> ViewAssert<'a> {
        self.view
    }

    pub fn has_column(self, name: &str) -> Result<ViewColumnAssert<'a>> {
        self.view.has_column(name)
    }

    pub fn does_not_have_column(self, name: &str) -> Result<ViewAssert<'a>> {
        self.view.does_not_have_column(name)
    }
}
