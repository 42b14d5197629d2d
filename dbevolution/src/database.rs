use std::path::Path;

use async_trait::async_trait;
use dbevolution_schema::SchemaModel;

use crate::{
    changelog::{ChangeLog, ChangeSetRecord},
    error::Result,
    snapshot::Snapshot,
};

/// Connections to the schema under test.
#[async_trait]
pub trait Database<C: Send + 'static>: Send + Sync {
    async fn connect(&self) -> Result<C>;

    async fn release(&self, conn: C) -> Result<()>;

    async fn commit(&self, conn: &mut C) -> Result<()>;

    async fn set_referential_integrity(&self, conn: &mut C, enabled: bool) -> Result<()>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Drops the schema and recreates it from a snapshot, or captures the
/// current schema into a new one.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn restore(&self, snapshot: &Snapshot) -> Result<()>;

    async fn capture(&self, target: &Path, include_data: bool) -> Result<Snapshot>;
}

#[async_trait]
pub trait SchemaReader<C: Send + 'static>: Send + Sync {
    async fn read(&self, conn: &mut C) -> Result<SchemaModel>;
}

/// Applies changelogs and reports the runner's bookkeeping.
#[async_trait]
pub trait MigrationRunner<C: Send + 'static>: Send + Sync {
    async fn change_log(&self, file: &str) -> Result<ChangeLog>;

    /// Applies `file` with the given contexts and returns the changesets
    /// recorded by this run.
    async fn update(&self, conn: &mut C, file: &str, contexts: &str) -> Result<Vec<ChangeSetRecord>>;

    async fn ran_change_sets(&self, conn: &mut C) -> Result<Vec<ChangeSetRecord>>;
}

/// The collaborators a suite drives, owned together.
pub struct Backend<C: Send + 'static> {
    pub database: Box<dyn Database<C>>,
    pub snapshots: Box<dyn SnapshotStore>,
    pub schema_reader: Box<dyn SchemaReader<C>>,
    pub runner: Box<dyn MigrationRunner<C>>,
}

impl<C: Send + 'static> Backend<C> {
    pub fn new<D, S, R, M>(database: D, snapshots: S, schema_reader: R, runner: M) -> Self
    where
        D: Database<C> + 'static,
        S: SnapshotStore + 'static,
        R: SchemaReader<C> + 'static,
        M: MigrationRunner<C> + 'static,
    {
        Self {
            database: Box::new(database),
            snapshots: Box::new(snapshots),
            schema_reader: Box::new(schema_reader),
            runner: Box::new(runner),
        }
    }
}
