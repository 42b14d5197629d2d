use std::{collections::HashSet, path::PathBuf};

use dbevolution_schema::TypeRegistry;
use validator::Validate;

use crate::{
    config::{SuiteConfig, DEFAULT_CONTEXTS},
    database::Backend,
    definition::MigrationTest,
    engine::{MigrationEngine, MigrationFailure, MigrationState},
    error::{Error, Result},
    snapshot::Snapshot,
    verifier::{CoverageReport, CoverageVerifier},
};

#[derive(Debug)]
pub struct MigrationOutcome {
    pub migration: String,
    pub script: String,
    pub result: std::result::Result<(), MigrationFailure>,
}

impl MigrationOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug)]
pub struct SuiteReport {
    pub migrations: Vec<MigrationOutcome>,
    pub coverage: CoverageReport,
}

impl SuiteReport {
    pub fn is_ok(&self) -> bool {
        self.migrations.iter().all(MigrationOutcome::is_ok) && self.coverage.is_ok()
    }

    pub fn failures(&self) -> impl Iterator<Item = &MigrationFailure> {
        self.migrations.iter().filter_map(|m| m.result.as_ref().err())
    }

    /// Collapses the report into one error: migration failures first, then
    /// coverage violations.
    pub fn into_result(self) -> Result<()> {
        let failures = self
            .migrations
            .iter()
            .filter_map(|m| m.result.as_ref().err())
            .map(ToString::to_string)
            .collect::<Vec<_>>();

        if !failures.is_empty() {
            return Err(anyhow::anyhow!(
                "{} of {} migration tests failed:\n{}",
                failures.len(),
                self.migrations.len(),
                failures.join("\n")
            )
            .into());
        }

        self.coverage.into_result().map(|_| ())
    }
}

pub struct MigrationTestSuiteBuilder<C: Send + 'static> {
    backend: Backend<C>,
    snapshot: Snapshot,
    change_log: String,
    contexts: String,
    registry: TypeRegistry,
    work_dir: PathBuf,
    tests: Vec<Box<dyn MigrationTest<C>>>,
}

impl<C: Send + 'static> MigrationTestSuiteBuilder<C> {
    pub fn registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn contexts(mut self, contexts: impl Into<String>) -> Self {
        self.contexts = contexts.into();
        self
    }

    /// Directory for captured baselines, the system temp dir by default.
    pub fn work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    /// Adds a migration test. Tests run in the order they are added, which
    /// must be the changelog order.
    pub fn test<T: MigrationTest<C> + 'static>(mut self, test: T) -> Self {
        self.tests.push(Box::new(test));
        self
    }

    pub fn build(self) -> Result<MigrationTestSuite<C>> {
        if self.change_log.trim().is_empty() {
            return Err(Error::configuration("a changelog is required"));
        }

        if self.tests.is_empty() {
            return Err(Error::configuration("at least one migration test is required"));
        }

        let mut scripts = HashSet::new();
        for test in &self.tests {
            let script = test.definition().script_file();
            if !scripts.insert(script.clone()) {
                return Err(Error::configuration(format!(
                    "{script} is tested by more than one definition"
                )));
            }
        }

        Ok(MigrationTestSuite {
            backend: self.backend,
            snapshot: self.snapshot,
            change_log: self.change_log,
            contexts: self.contexts,
            registry: self.registry,
            work_dir: self.work_dir,
            tests: self.tests,
            captured: Vec::new(),
        })
    }
}

/// Owns the backend and the migration tests of one changelog; create it
/// at suite start and [`close`](Self::close) it at the end.
pub struct MigrationTestSuite<C: Send + 'static> {
    backend: Backend<C>,
    snapshot: Snapshot,
    change_log: String,
    contexts: String,
    registry: TypeRegistry,
    work_dir: PathBuf,
    tests: Vec<Box<dyn MigrationTest<C>>>,
    captured: Vec<PathBuf>,
}

impl<C: Send + 'static> MigrationTestSuite<C> {
    pub fn builder(
        backend: Backend<C>,
        snapshot: Snapshot,
        change_log: impl Into<String>,
    ) -> MigrationTestSuiteBuilder<C> {
        MigrationTestSuiteBuilder {
            backend,
            snapshot,
            change_log: change_log.into(),
            contexts: DEFAULT_CONTEXTS.to_owned(),
            registry: TypeRegistry::standard(),
            work_dir: std::env::temp_dir(),
            tests: Vec::new(),
        }
    }

    pub fn from_config(config: SuiteConfig, backend: Backend<C>) -> Result<MigrationTestSuiteBuilder<C>> {
        config.validate()?;

        Ok(Self::builder(backend, config.snapshot, config.change_log).contexts(config.contexts))
    }

    pub fn backend(&self) -> &Backend<C> {
        &self.backend
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Runs every migration test on top of the previous one, then verifies
    /// changelog coverage from the configured snapshot.
    pub async fn run(&mut self) -> Result<SuiteReport> {
        self.backend.snapshots.restore(&self.snapshot).await?;

        let mut migrations = Vec::new();

        for test in &self.tests {
            let definition = test.definition();
            let target = self
                .work_dir
                .join(format!("dbevolution-baseline-{}.sql", uuid::Uuid::new_v4()));

            let baseline = match self.backend.snapshots.capture(&target, true).await {
                Ok(baseline) => {
                    self.captured.push(target);
                    baseline
                }
                Err(error) => {
                    tracing::error!("unable to capture baseline before {}: {error}", definition.name());
                    migrations.push(MigrationOutcome {
                        migration: definition.name().to_owned(),
                        script: definition.script_file(),
                        result: Err(MigrationFailure {
                            migration: definition.name().to_owned(),
                            state: MigrationState::RestoreSnapshot,
                            error,
                        }),
                    });
                    continue;
                }
            };

            let engine = MigrationEngine::new(&self.backend, &self.registry, &self.contexts);
            let result = engine.run(test.as_ref(), &baseline).await.map(|_| ());

            if let Err(failure) = &result {
                tracing::error!("{failure}");
                self.recover(&baseline, &definition.script_file()).await;
            }

            migrations.push(MigrationOutcome {
                migration: definition.name().to_owned(),
                script: definition.script_file(),
                result,
            });
        }

        let coverage = self.verify_coverage().await?;

        Ok(SuiteReport {
            migrations,
            coverage,
        })
    }

    /// Runs a single migration test directly on the configured snapshot.
    pub async fn run_migration(&self, name: &str) -> Result<MigrationOutcome> {
        let test = self
            .tests
            .iter()
            .find(|t| t.definition().name() == name)
            .ok_or_else(|| Error::configuration(format!("no migration test named {name}")))?;

        let engine = MigrationEngine::new(&self.backend, &self.registry, &self.contexts);
        let result = engine.run(test.as_ref(), &self.snapshot).await.map(|_| ());

        Ok(MigrationOutcome {
            migration: name.to_owned(),
            script: test.definition().script_file(),
            result,
        })
    }

    pub async fn verify_coverage(&self) -> Result<CoverageReport> {
        CoverageVerifier::new(&self.backend, &self.change_log, &self.contexts)
            .run(&self.snapshot, self.tests.iter().map(|t| t.definition()))
            .await
    }

    /// Brings the database to "baseline + script" after a failed migration
    /// so the next test starts from the state production would have.
    async fn recover(&self, baseline: &Snapshot, script: &str) {
        let res = async {
            self.backend.snapshots.restore(baseline).await?;
            let mut conn = self.backend.database.connect().await?;
            let applied = self
                .backend
                .runner
                .update(&mut conn, script, &self.contexts)
                .await;
            let committed = match applied {
                Ok(_) => self.backend.database.commit(&mut conn).await,
                Err(e) => Err(e),
            };
            self.backend.database.release(conn).await?;
            committed
        }
        .await;

        if let Err(e) = res {
            tracing::warn!("unable to recover after {script} failed: {e}");
        }
    }

    /// Removes captured baselines and closes the backend.
    pub async fn close(self) -> Result<()> {
        for path in &self.captured {
            match tokio::fs::remove_file(path).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("unable to remove {}: {e}", path.display()),
            }
        }

        self.backend.database.close().await
    }
}
