use dbevolution_schema::{Phase, SchemaAssert, SchemaModel, TypeRegistry};
use parse_display::Display;
use tracing::Instrument;

use crate::{
    database::Backend,
    definition::{MigrationTest, MigrationTestDefinition},
    error::{Error, Result},
    snapshot::Snapshot,
};

/// Steps of a single migration test, in execution order. The two
/// referential-integrity steps only run when the definition asks for it;
/// `ReleaseConnection` tags a failure to hand a connection back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display(style = "SNAKE_CASE")]
pub enum MigrationState {
    RestoreSnapshot,
    AssertPreSchema,
    DisableFkChecks,
    InsertPreData,
    RestoreFkChecks,
    AssertPreData,
    ApplyScript,
    AssertPostSchema,
    AssertPostData,
    ReplayFromSnapshotWithoutPreData,
    ApplyScriptReplay,
    ReleaseConnection,
}

#[derive(Debug, thiserror::Error)]
#[error("{migration} failed in {state}: {error}")]
pub struct MigrationFailure {
    pub migration: String,
    pub state: MigrationState,
    #[source]
    pub error: Error,
}

trait InState<T> {
    fn in_state(self, migration: &str, state: MigrationState) -> std::result::Result<T, MigrationFailure>;
}

impl<T, E: Into<Error>> InState<T> for std::result::Result<T, E> {
    fn in_state(self, migration: &str, state: MigrationState) -> std::result::Result<T, MigrationFailure> {
        self.map_err(|e| MigrationFailure {
            migration: migration.to_owned(),
            state,
            error: e.into(),
        })
    }
}

fn enter(state: MigrationState) -> MigrationState {
    tracing::debug!("state {state}");
    state
}

/// Drives one migration test through its states against a backend.
pub struct MigrationEngine<'a, C: Send + 'static> {
    backend: &'a Backend<C>,
    registry: &'a TypeRegistry,
    contexts: &'a str,
}

impl<'a, C: Send + 'static> MigrationEngine<'a, C> {
    pub fn new(backend: &'a Backend<C>, registry: &'a TypeRegistry, contexts: &'a str) -> Self {
        Self {
            backend,
            registry,
            contexts,
        }
    }

    /// Runs `test` starting from `baseline` and returns the schema after the
    /// script was applied. On success the database is left at
    /// "baseline + script" without the test's pre-migration data.
    pub async fn run(
        &self,
        test: &dyn MigrationTest<C>,
        baseline: &Snapshot,
    ) -> std::result::Result<SchemaModel, MigrationFailure> {
        let definition = test.definition();
        let span = tracing::info_span!("dbevolution.migration", migration = definition.name());

        async move {
            let name = definition.name();

            let state = enter(MigrationState::RestoreSnapshot);
            self.backend
                .snapshots
                .restore(baseline)
                .await
                .in_state(name, state)?;

            let mut conn = self.backend.database.connect().await.in_state(name, state)?;
            let res = self.run_with_connection(test, &mut conn).await;
            let released = self.backend.database.release(conn).await;
            let post = res?;
            released.in_state(name, enter(MigrationState::ReleaseConnection))?;

            self.replay(definition, baseline, &post).await?;

            tracing::info!("{} passed", definition.script_file());

            Ok::<_, MigrationFailure>(post)
        }
        .instrument(span)
        .await
    }

    async fn run_with_connection(
        &self,
        test: &dyn MigrationTest<C>,
        conn: &mut C,
    ) -> std::result::Result<SchemaModel, MigrationFailure> {
        let definition = test.definition();
        let name = definition.name();

        let state = enter(MigrationState::AssertPreSchema);
        let pre = self
            .backend
            .schema_reader
            .read(conn)
            .await
            .in_state(name, state)?;
        test.assert_pre_migration_schema(
            SchemaAssert::new(&pre, self.registry, Phase::PreMigration),
            conn,
        )
        .await
        .in_state(name, state)?;

        self.insert_pre_migration_data(test, conn).await?;

        let state = enter(MigrationState::AssertPreData);
        test.assert_pre_migration_data(conn)
            .await
            .in_state(name, state)?;

        let state = enter(MigrationState::ApplyScript);
        self.apply_script(definition, conn)
            .await
            .in_state(name, state)?;

        let state = enter(MigrationState::AssertPostSchema);
        let post = self
            .backend
            .schema_reader
            .read(conn)
            .await
            .in_state(name, state)?;
        test.assert_post_migration_schema(
            SchemaAssert::new(&post, self.registry, Phase::PostMigration),
            conn,
        )
        .await
        .in_state(name, state)?;

        let state = enter(MigrationState::AssertPostData);
        test.assert_post_migration_data(conn)
            .await
            .in_state(name, state)?;

        Ok(post)
    }

    async fn insert_pre_migration_data(
        &self,
        test: &dyn MigrationTest<C>,
        conn: &mut C,
    ) -> std::result::Result<(), MigrationFailure> {
        let definition = test.definition();
        let name = definition.name();
        let database = &self.backend.database;

        if !definition.is_referential_integrity_disabled() {
            let state = enter(MigrationState::InsertPreData);
            test.insert_pre_migration_data(conn)
                .await
                .in_state(name, state)?;
            return database.commit(conn).await.in_state(name, state);
        }

        let disabled = database
            .set_referential_integrity(conn, false)
            .await
            .in_state(name, enter(MigrationState::DisableFkChecks));

        let inserted = match disabled {
            Ok(_) => {
                let state = enter(MigrationState::InsertPreData);
                let res = match test.insert_pre_migration_data(conn).await {
                    Ok(_) => database.commit(conn).await,
                    Err(e) => Err(e),
                };
                res.in_state(name, state)
            }
            Err(failure) => Err(failure),
        };

        let state = enter(MigrationState::RestoreFkChecks);
        let restored = database.set_referential_integrity(conn, true).await;

        match (inserted, restored) {
            (Err(failure), Err(e)) => {
                tracing::warn!("failed to restore referential integrity after {failure}: {e}");
                Err(failure)
            }
            (Err(failure), Ok(_)) => Err(failure),
            (Ok(_), restored) => restored.in_state(name, state),
        }
    }

    /// Applies the definition's script, commits, then checks that every
    /// changeset recorded for the script carries the location as comment.
    async fn apply_script(&self, definition: &MigrationTestDefinition, conn: &mut C) -> Result<()> {
        let script = definition.script_file();
        let runner = &self.backend.runner;

        runner
            .update(conn, &script, self.contexts)
            .await
            .map_err(|e| match e {
                Error::ScriptApplication { .. } => e,
                other => Error::script(&script, other),
            })?;

        self.backend.database.commit(conn).await?;

        let records = runner
            .ran_change_sets(conn)
            .await?
            .into_iter()
            .filter(|r| r.file_name == script)
            .collect::<Vec<_>>();

        if records.is_empty() {
            return Err(Error::assertion(format!(
                "{script} did not record any changeset; it is empty or was already applied before the snapshot"
            )));
        }

        for record in records {
            match record.comments.as_deref() {
                None | Some("") => {
                    return Err(Error::assertion(format!(
                        "The {script} change log requires a comment tag (changeset {})",
                        record.id
                    )));
                }
                Some(comments) if comments != definition.location() => {
                    return Err(Error::assertion(format!(
                        "Comments tag should match release (migration script location) in {script}: expected {} but was {comments}",
                        definition.location()
                    )));
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    /// Applies the script once more on the untouched baseline. The result
    /// must not depend on the data the test inserted.
    async fn replay(
        &self,
        definition: &MigrationTestDefinition,
        baseline: &Snapshot,
        post: &SchemaModel,
    ) -> std::result::Result<(), MigrationFailure> {
        let name = definition.name();
        let script = definition.script_file();

        let state = enter(MigrationState::ReplayFromSnapshotWithoutPreData);
        self.backend
            .snapshots
            .restore(baseline)
            .await
            .in_state(name, state)?;
        let mut conn = self.backend.database.connect().await.in_state(name, state)?;

        let state = enter(MigrationState::ApplyScriptReplay);
        let res = self.replay_script(&mut conn, &script).await;
        let released = self.backend.database.release(conn).await;
        let replayed = res.in_state(name, state)?;
        released.in_state(name, enter(MigrationState::ReleaseConnection))?;

        if &replayed != post {
            return Err(MigrationFailure {
                migration: name.to_owned(),
                state,
                error: Error::assertion(format!(
                    "replaying {script} without pre-migration data produced a different schema: {}",
                    describe_divergence(post, &replayed)
                )),
            });
        }

        Ok(())
    }

    async fn replay_script(&self, conn: &mut C, script: &str) -> Result<SchemaModel> {
        self.backend
            .runner
            .update(conn, script, self.contexts)
            .await
            .map_err(|e| match e {
                Error::ScriptApplication { .. } => e,
                other => Error::script(script, other),
            })?;
        self.backend.database.commit(conn).await?;
        self.backend.schema_reader.read(conn).await
    }
}

fn describe_divergence(expected: &SchemaModel, actual: &SchemaModel) -> String {
    let mut differences = Vec::new();

    for table in &expected.tables {
        match actual.find_table(&table.name) {
            None => differences.push(format!("table {} is missing", table.name)),
            Some(other) if other != table => {
                differences.push(format!("table {} differs", table.name))
            }
            Some(_) => {}
        }
    }

    for table in &actual.tables {
        if expected.find_table(&table.name).is_none() {
            differences.push(format!("table {} is unexpected", table.name));
        }
    }

    for view in &expected.views {
        if actual.find_view(&view.name) != Some(view) {
            differences.push(format!("view {} differs", view.name));
        }
    }

    for view in &actual.views {
        if expected.find_view(&view.name).is_none() {
            differences.push(format!("view {} is unexpected", view.name));
        }
    }

    if differences.is_empty() {
        "schema metadata differs".to_owned()
    } else {
        differences.join(", ")
    }
}
