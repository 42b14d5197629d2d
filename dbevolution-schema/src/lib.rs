mod assert;
mod error;
mod model;
mod types;

#[cfg(feature = "mysql")]
pub mod mysql;

pub use assert::*;
pub use error::{Result, SchemaError};
pub use model::{
    Column, DefaultValue, ForeignKey, Index, NativeType, Reference, SchemaModel, Table, View,
    ViewColumn,
};
pub use types::{SemanticType, SizeCheck, TextualAssertionBuilder, TypeAssertion, TypeRegistry};

/// Starts an assertion chain over `model`.
pub fn assert_that_schema<'a>(
    model: &'a SchemaModel,
    registry: &'a TypeRegistry,
    phase: Phase,
) -> SchemaAssert<'a> {
    SchemaAssert::new(model, registry, phase)
}
