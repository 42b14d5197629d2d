use std::{collections::HashMap, path::Path, sync::Arc};

use async_trait::async_trait;
use dbevolution_schema::SchemaModel;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::{
    changelog::{ChangeLog, ChangeSet, ChangeSetRecord},
    database::{Backend, Database, MigrationRunner, SchemaReader, SnapshotStore},
    error::{Error, Result},
    snapshot::Snapshot,
};

pub type Row = Map<String, Value>;

/// Schema, rows and changelog bookkeeping of an in-memory database.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryState {
    pub schema: SchemaModel,
    pub rows: HashMap<String, Vec<Row>>,
    pub change_log: Vec<ChangeSetRecord>,
}

impl MemoryState {
    pub fn new(schema: SchemaModel) -> Self {
        Self {
            schema,
            ..Default::default()
        }
    }

    pub fn rows(&self, table: &str) -> &[Row] {
        self.rows.get(table).map(Vec::as_slice).unwrap_or_default()
    }

    /// Inserts `row` (a JSON object) into `table`, enforcing NOT NULL and,
    /// when `referential_integrity` is on, every foreign key of the table.
    pub fn insert(&mut self, table: &str, row: Value, referential_integrity: bool) -> Result<()> {
        let Value::Object(row) = row else {
            return Err(Error::configuration(format!("rows of {table} must be JSON objects")));
        };

        let definition = self
            .schema
            .find_table(table)
            .ok_or_else(|| anyhow::anyhow!("Table '{}.{table}' doesn't exist", self.schema.name))?;

        for name in row.keys() {
            if definition.find_column(name).is_none() {
                return Err(anyhow::anyhow!("Unknown column '{name}' in '{table}'").into());
            }
        }

        for column in &definition.columns {
            let missing = row.get(&column.name).map_or(true, Value::is_null);
            if missing && column.required && column.default_value.is_none() && !column.auto_increment {
                return Err(anyhow::anyhow!("Column '{}' cannot be null", column.name).into());
            }
        }

        if referential_integrity {
            for foreign_key in &definition.foreign_keys {
                for reference in &foreign_key.references {
                    let Some(value) = row.get(&reference.local_column).filter(|v| !v.is_null()) else {
                        continue;
                    };

                    let exists = self
                        .rows(&foreign_key.foreign_table)
                        .iter()
                        .any(|r| r.get(&reference.foreign_column) == Some(value));

                    if !exists {
                        return Err(anyhow::anyhow!(
                            "Cannot add or update a child row: a foreign key constraint fails ({})",
                            foreign_key.name
                        )
                        .into());
                    }
                }
            }
        }

        self.rows.entry(table.to_owned()).or_default().push(row);

        Ok(())
    }
}

pub type ApplyFn = Arc<dyn Fn(&mut MemoryState) -> Result<()> + Send + Sync>;

/// A migration script: the changesets it records and what applying it
/// does to the state.
#[derive(Clone)]
pub struct MemoryScript {
    file: String,
    change_sets: Vec<ChangeSet>,
    apply: ApplyFn,
}

impl MemoryScript {
    pub fn new<F>(file: impl Into<String>, apply: F) -> Self
    where
        F: Fn(&mut MemoryState) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            file: file.into(),
            change_sets: Vec::new(),
            apply: Arc::new(apply),
        }
    }

    /// Declares a changeset; its `file_path` is forced to the script file.
    pub fn change_set(mut self, mut change_set: ChangeSet) -> Self {
        change_set.file_path = self.file.to_owned();
        self.change_sets.push(change_set);
        self
    }
}

#[derive(Default)]
struct Inner {
    state: MemoryState,
    snapshots: HashMap<String, MemoryState>,
    scripts: HashMap<String, MemoryScript>,
    change_logs: HashMap<String, Vec<String>>,
    journal: Vec<String>,
    open_connections: usize,
}

impl Inner {
    fn files_of(&self, file: &str) -> Result<Vec<String>> {
        if let Some(files) = self.change_logs.get(file) {
            return Ok(files.to_owned());
        }

        if self.scripts.contains_key(file) {
            return Ok(vec![file.to_owned()]);
        }

        Err(Error::configuration(format!("no changelog or script named {file}")))
    }
}

/// An in-memory backend; every clone shares the same database.
#[derive(Clone, Default)]
pub struct MemoryDatabase(Arc<RwLock<Inner>>);

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `snapshot` restorable, with `state` as its contents.
    pub fn register_snapshot(&self, snapshot: &Snapshot, state: MemoryState) {
        self.0.write().snapshots.insert(snapshot.name(), state);
    }

    pub fn register_script(&self, script: MemoryScript) {
        self.0.write().scripts.insert(script.file.to_owned(), script);
    }

    /// Registers a master changelog including `files` in order.
    pub fn register_change_log<I, F>(&self, name: impl Into<String>, files: I)
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        let files = files.into_iter().map(Into::into).collect();
        self.0.write().change_logs.insert(name.into(), files);
    }

    pub fn state(&self) -> MemoryState {
        self.0.read().state.clone()
    }

    /// Every backend call so far, oldest first.
    pub fn journal(&self) -> Vec<String> {
        self.0.read().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.0.write().journal.clear();
    }

    pub fn open_connections(&self) -> usize {
        self.0.read().open_connections
    }

    pub fn backend(&self) -> Backend<MemoryConnection> {
        Backend::new(self.clone(), self.clone(), self.clone(), self.clone())
    }

    fn record(&self, entry: impl Into<String>) {
        self.0.write().journal.push(entry.into());
    }
}

pub struct MemoryConnection {
    database: MemoryDatabase,
    referential_integrity: bool,
}

impl MemoryConnection {
    pub fn insert(&mut self, table: &str, row: Value) -> Result<()> {
        let mut inner = self.database.0.write();
        inner.journal.push(format!("insert {table}"));
        inner.state.insert(table, row, self.referential_integrity)
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.database.0.read().state.rows(table).to_vec()
    }

    pub fn count(&self, table: &str) -> usize {
        self.database.0.read().state.rows(table).len()
    }

    pub fn is_referential_integrity_enabled(&self) -> bool {
        self.referential_integrity
    }
}

#[async_trait]
impl Database<MemoryConnection> for MemoryDatabase {
    async fn connect(&self) -> Result<MemoryConnection> {
        let mut inner = self.0.write();
        inner.open_connections += 1;
        inner.journal.push("connect".to_owned());

        Ok(MemoryConnection {
            database: self.clone(),
            referential_integrity: true,
        })
    }

    async fn release(&self, _conn: MemoryConnection) -> Result<()> {
        let mut inner = self.0.write();
        inner.open_connections = inner.open_connections.saturating_sub(1);
        inner.journal.push("release".to_owned());

        Ok(())
    }

    async fn commit(&self, _conn: &mut MemoryConnection) -> Result<()> {
        self.record("commit");

        Ok(())
    }

    async fn set_referential_integrity(&self, conn: &mut MemoryConnection, enabled: bool) -> Result<()> {
        conn.referential_integrity = enabled;
        self.record(if enabled { "fk_checks on" } else { "fk_checks off" });

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let inner = self.0.read();

        if inner.open_connections > 0 {
            tracing::warn!("closing with {} open connections", inner.open_connections);
        }

        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for MemoryDatabase {
    async fn restore(&self, snapshot: &Snapshot) -> Result<()> {
        let name = snapshot.name();
        let mut inner = self.0.write();

        let state = inner
            .snapshots
            .get(&name)
            .cloned()
            .ok_or_else(|| Error::configuration(format!("snapshot `{name}` does not exist")))?;

        inner.state = state;
        inner.journal.push(format!("restore {name}"));

        Ok(())
    }

    async fn capture(&self, target: &Path, include_data: bool) -> Result<Snapshot> {
        let snapshot = Snapshot::file(target);
        let mut inner = self.0.write();

        let mut state = inner.state.clone();
        if !include_data {
            state.rows.clear();
        }

        inner.snapshots.insert(snapshot.name(), state);
        inner.journal.push("capture".to_owned());

        Ok(snapshot)
    }
}

#[async_trait]
impl SchemaReader<MemoryConnection> for MemoryDatabase {
    async fn read(&self, _conn: &mut MemoryConnection) -> Result<SchemaModel> {
        let mut inner = self.0.write();
        inner.journal.push("read_schema".to_owned());

        Ok(inner.state.schema.clone())
    }
}

#[async_trait]
impl MigrationRunner<MemoryConnection> for MemoryDatabase {
    async fn change_log(&self, file: &str) -> Result<ChangeLog> {
        let inner = self.0.read();
        let mut change_sets = Vec::new();

        for script in inner.files_of(file)? {
            let script = inner
                .scripts
                .get(&script)
                .ok_or_else(|| Error::configuration(format!("{file} includes unknown script {script}")))?;
            change_sets.extend(script.change_sets.iter().cloned());
        }

        Ok(ChangeLog::new(file, change_sets))
    }

    async fn update(
        &self,
        _conn: &mut MemoryConnection,
        file: &str,
        contexts: &str,
    ) -> Result<Vec<ChangeSetRecord>> {
        let mut inner = self.0.write();
        inner.journal.push(format!("update {file}"));

        let mut applied = Vec::new();

        for name in inner.files_of(file)? {
            let script = inner
                .scripts
                .get(&name)
                .cloned()
                .ok_or_else(|| Error::script(&name, "script is not registered"))?;

            let pending = script
                .change_sets
                .iter()
                .filter(|c| in_contexts(c, contexts))
                .filter(|c| {
                    !inner.state.change_log.iter().any(|r| {
                        r.id == c.id && r.author == c.author && r.file_name == c.file_path
                    })
                })
                .cloned()
                .collect::<Vec<_>>();

            if pending.is_empty() {
                continue;
            }

            (script.apply)(&mut inner.state).map_err(|e| Error::script(&name, e))?;

            for change_set in pending {
                let record = ChangeSetRecord {
                    id: change_set.id,
                    author: change_set.author,
                    file_name: change_set.file_path,
                    date_executed: chrono::Utc::now().naive_utc(),
                    order_executed: inner.state.change_log.len() as i32 + 1,
                    comments: change_set.comment,
                };

                inner.state.change_log.push(record.clone());
                applied.push(record);
            }
        }

        Ok(applied)
    }

    async fn ran_change_sets(&self, _conn: &mut MemoryConnection) -> Result<Vec<ChangeSetRecord>> {
        Ok(self.0.read().state.change_log.clone())
    }
}

fn in_contexts(change_set: &ChangeSet, contexts: &str) -> bool {
    match change_set.context.as_deref() {
        None => true,
        Some(context) => contexts.split(',').any(|c| c.trim() == context.trim()),
    }
}
