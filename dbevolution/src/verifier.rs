use std::collections::HashSet;

use parse_display::Display;

use crate::{
    changelog::{ChangeLog, ChangeSetRecord, ErrorOption, FailOption},
    database::Backend,
    definition::MigrationTestDefinition,
    error::{Error, Result},
    snapshot::Snapshot,
};

/// Scripts under this path prefix are run by hand and must never be picked
/// up by the production changelog.
pub const EXTRA_RELEASE_PREFIX: &str = "extra-release";

pub fn is_extra_release(script: &str) -> bool {
    script.starts_with(EXTRA_RELEASE_PREFIX)
}

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum CoverageViolation {
    #[display("{0} has no migration test")]
    Untested(String),

    #[display("{0} was tested but not executed by the changelog")]
    NotExecuted(String),

    #[display("{0} is an extra-release script and must not be executed by the changelog")]
    ExtraReleaseExecuted(String),

    #[display("{file_path}::{id} has no preconditions")]
    MissingPreconditions { file_path: String, id: String },

    #[display("{file_path}::{id} should HALT on error, but was {on_error}")]
    OnErrorNotHalt {
        file_path: String,
        id: String,
        on_error: ErrorOption,
    },

    #[display("{file_path}::{id} should HALT on fail, but was {on_fail}")]
    OnFailNotHalt {
        file_path: String,
        id: String,
        on_fail: FailOption,
    },
}

/// What ran against what was declared, for one verification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageState {
    /// Script files that gained changesets during the pass, in run order.
    pub newly_applied: Vec<String>,
    pub under_test: Vec<String>,
    pub precondition_exclusions: HashSet<String>,
}

impl CoverageState {
    pub fn compute<'a>(
        baseline: &[ChangeSetRecord],
        post: &[ChangeSetRecord],
        definitions: impl IntoIterator<Item = &'a MigrationTestDefinition>,
    ) -> Self {
        let mut remaining = post.iter().map(|r| r.file_name.as_str()).collect::<Vec<_>>();

        for record in baseline {
            if let Some(pos) = remaining.iter().position(|f| *f == record.file_name) {
                remaining.remove(pos);
            }
        }

        let mut seen = HashSet::new();
        let newly_applied = remaining
            .into_iter()
            .filter(|f| seen.insert(*f))
            .map(ToOwned::to_owned)
            .collect();

        let mut under_test = Vec::new();
        let mut precondition_exclusions = HashSet::new();

        for definition in definitions {
            let script = definition.script_file();

            if definition.is_allow_any_precondition_on_fail_handling() {
                precondition_exclusions.insert(script.clone());
            }

            under_test.push(script);
        }

        Self {
            newly_applied,
            under_test,
            precondition_exclusions,
        }
    }

    /// Checks executed-implies-tested, tested-implies-executed (with the
    /// extra-release carve-out) and the precondition policy of every
    /// changeset in `change_log`.
    pub fn verify(&self, change_log: &ChangeLog) -> Vec<CoverageViolation> {
        let mut violations = Vec::new();

        for script in &self.newly_applied {
            if !self.under_test.contains(script) {
                violations.push(CoverageViolation::Untested(script.to_owned()));
            }
        }

        for script in &self.under_test {
            let executed = self.newly_applied.contains(script);

            if is_extra_release(script) {
                if executed {
                    violations.push(CoverageViolation::ExtraReleaseExecuted(script.to_owned()));
                }
            } else if !executed {
                violations.push(CoverageViolation::NotExecuted(script.to_owned()));
            }
        }

        for change_set in &change_log.change_sets {
            let Some(preconditions) = change_set.preconditions else {
                violations.push(CoverageViolation::MissingPreconditions {
                    file_path: change_set.file_path.to_owned(),
                    id: change_set.id.to_owned(),
                });
                continue;
            };

            if preconditions.on_error != ErrorOption::Halt {
                violations.push(CoverageViolation::OnErrorNotHalt {
                    file_path: change_set.file_path.to_owned(),
                    id: change_set.id.to_owned(),
                    on_error: preconditions.on_error,
                });
            }

            if self.precondition_exclusions.contains(&change_set.file_path) {
                tracing::info!("Skipping precondition check for {}", change_set.file_path);
            } else if preconditions.on_fail != FailOption::Halt {
                violations.push(CoverageViolation::OnFailNotHalt {
                    file_path: change_set.file_path.to_owned(),
                    id: change_set.id.to_owned(),
                    on_fail: preconditions.on_fail,
                });
            }
        }

        violations
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageReport {
    pub state: CoverageState,
    pub violations: Vec<CoverageViolation>,
}

impl CoverageReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn into_result(self) -> Result<CoverageState> {
        if self.violations.is_empty() {
            Ok(self.state)
        } else {
            Err(Error::Coverage(self.violations))
        }
    }
}

/// Applies the whole changelog on top of the base snapshot and compares
/// what ran with what is under test.
pub struct CoverageVerifier<'a, C: Send + 'static> {
    backend: &'a Backend<C>,
    change_log: &'a str,
    contexts: &'a str,
}

impl<'a, C: Send + 'static> CoverageVerifier<'a, C> {
    pub fn new(backend: &'a Backend<C>, change_log: &'a str, contexts: &'a str) -> Self {
        Self {
            backend,
            change_log,
            contexts,
        }
    }

    pub async fn run<'d>(
        &self,
        base: &Snapshot,
        definitions: impl IntoIterator<Item = &'d MigrationTestDefinition>,
    ) -> Result<CoverageReport> {
        let change_log = self.backend.runner.change_log(self.change_log).await?;

        self.backend.snapshots.restore(base).await?;

        let mut conn = self.backend.database.connect().await?;
        let res = self.apply_change_log(&mut conn).await;
        self.backend.database.release(conn).await?;
        let (baseline, post) = res?;

        let state = CoverageState::compute(&baseline, &post, definitions);
        let violations = state.verify(&change_log);

        tracing::debug!(
            "{} newly applied, {} under test, {} violations",
            state.newly_applied.len(),
            state.under_test.len(),
            violations.len()
        );

        Ok(CoverageReport { state, violations })
    }

    async fn apply_change_log(&self, conn: &mut C) -> Result<(Vec<ChangeSetRecord>, Vec<ChangeSetRecord>)> {
        let runner = &self.backend.runner;

        let baseline = runner.ran_change_sets(conn).await?;
        runner
            .update(conn, self.change_log, self.contexts)
            .await
            .map_err(|e| match e {
                Error::ScriptApplication { .. } => e,
                other => Error::script(self.change_log, other),
            })?;
        self.backend.database.commit(conn).await?;
        let post = runner.ran_change_sets(conn).await?;

        Ok((baseline, post))
    }
}
