use super::{Phase, TableAssert, ViewAssert};
use crate::{
    error::{ensure, Result, SchemaError},
    model::SchemaModel,
    types::TypeRegistry,
};

/// Entry point of the assertion chain, bound to one schema snapshot.
#[derive(Debug, Clone, Copy)]
pub struct SchemaAssert<'a> {
    model: &'a SchemaModel,
    registry: &'a TypeRegistry,
    phase: Phase,
}

impl<'a> SchemaAssert<'a> {
    pub fn new(model: &'a SchemaModel, registry: &'a TypeRegistry, phase: Phase) -> Self {
        Self {
            model,
            registry,
            phase,
        }
    }

    pub fn model(&self) -> &'a SchemaModel {
        self.model
    }

    pub fn registry(&self) -> &'a TypeRegistry {
        self.registry
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn has_table(&self, name: &str) -> Result<TableAssert<'a>> {
        let table = self.model.find_table(name).ok_or_else(|| {
            SchemaError::assertion(format!(
                "Table '{name}' does not exist in '{}' ({}).",
                self.model.name, self.phase
            ))
        })?;

        Ok(TableAssert::new(*self, table))
    }

    pub fn does_not_have_table(&self, name: &str) -> Result<&Self> {
        ensure(self.model.find_table(name).is_none(), || {
            format!(
                "Table '{name}' should not exist in '{}' ({}).",
                self.model.name, self.phase
            )
        })?;

        Ok(self)
    }

    pub fn has_view(&self, name: &str) -> Result<ViewAssert<'a>> {
        let view = self.model.find_view(name).ok_or_else(|| {
            SchemaError::assertion(format!(
                "View '{name}' does not exist in '{}' ({}).",
                self.model.name, self.phase
            ))
        })?;

        Ok(ViewAssert::new(*self, view))
    }

    pub fn does_not_have_view(&self, name: &str) -> Result<&Self> {
        ensure(self.model.find_view(name).is_none(), || {
            format!(
                "View '{name}' should not exist in '{}' ({}).",
                self.model.name, self.phase
            )
        })?;

        Ok(self)
    }
}
