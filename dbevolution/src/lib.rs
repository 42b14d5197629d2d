mod changelog;
mod config;
mod database;
mod definition;
mod engine;
mod error;
mod snapshot;
mod suite;
mod verifier;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "mysql")]
pub mod mysql;

pub use changelog::{
    ChangeLog, ChangeSet, ChangeSetRecord, ErrorOption, FailOption, Preconditions,
};
pub use config::{DatabaseDetails, SuiteConfig, DEFAULT_CONTEXTS, DEFAULT_PORT};
pub use database::{Backend, Database, MigrationRunner, SchemaReader, SnapshotStore};
pub use definition::{
    location_from_module_path, MigrationTest, MigrationTestDefinition, DEFAULT_EXTENSION,
};
pub use engine::{MigrationEngine, MigrationFailure, MigrationState};
pub use error::{Error, Result};
pub use snapshot::{MaterializedSnapshot, Snapshot};
pub use suite::{MigrationOutcome, MigrationTestSuite, MigrationTestSuiteBuilder, SuiteReport};
pub use verifier::{
    is_extra_release, CoverageReport, CoverageState, CoverageVerifier, CoverageViolation,
    EXTRA_RELEASE_PREFIX,
};

pub use async_trait::async_trait;
pub use dbevolution_schema as schema;
pub use dbevolution_schema::{
    assert_that_schema, Column, ColumnAssert, DefaultValue, DisableNullCheckReason, ForeignKey,
    Index, NativeType, NullCheckColumnType, Phase, SchemaAssert, SchemaModel, SemanticType, Table,
    TablePrivilege, TypeAssertion, TypeRegistry, View,
};
