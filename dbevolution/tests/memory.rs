mod common;

use common::*;
use dbevolution::{
    async_trait,
    memory::{MemoryConnection, MemoryDatabase, MemoryScript, MemoryState},
    Backend, CoverageVerifier, CoverageViolation, Database, DatabaseDetails, Error, ErrorOption,
    FailOption, Index, MigrationEngine, MigrationState, MigrationTest, MigrationTestDefinition,
    MigrationTestSuite, Result, SchemaAssert, SchemaModel, Snapshot, SuiteConfig, TypeRegistry,
    DEFAULT_CONTEXTS,
};
use serde_json::json;
use tracing_test::traced_test;

/// Inserts an `Example` row pointing at a customer that does not exist.
struct OrphanedExamples {
    definition: MigrationTestDefinition,
}

#[async_trait]
impl MigrationTest<MemoryConnection> for OrphanedExamples {
    fn definition(&self) -> &MigrationTestDefinition {
        &self.definition
    }

    async fn assert_pre_migration_schema(
        &self,
        schema: SchemaAssert<'_>,
        _conn: &mut MemoryConnection,
    ) -> Result<()> {
        schema.has_table("Example")?;

        Ok(())
    }

    async fn assert_post_migration_schema(
        &self,
        schema: SchemaAssert<'_>,
        _conn: &mut MemoryConnection,
    ) -> Result<()> {
        schema.has_table("Example")?.has_column("currency")?;

        Ok(())
    }

    async fn insert_pre_migration_data(&self, conn: &mut MemoryConnection) -> Result<()> {
        conn.insert("Example", json!({ "name": "orphan", "customer_id": 42 }))
    }
}

/// Only checks that the `Customer` table survives.
struct KeepsCustomers {
    definition: MigrationTestDefinition,
}

#[async_trait]
impl MigrationTest<MemoryConnection> for KeepsCustomers {
    fn definition(&self) -> &MigrationTestDefinition {
        &self.definition
    }

    async fn assert_pre_migration_schema(
        &self,
        schema: SchemaAssert<'_>,
        _conn: &mut MemoryConnection,
    ) -> Result<()> {
        schema.has_table("Customer")?;

        Ok(())
    }

    async fn assert_post_migration_schema(
        &self,
        schema: SchemaAssert<'_>,
        _conn: &mut MemoryConnection,
    ) -> Result<()> {
        schema.has_table("Customer")?;

        Ok(())
    }

    async fn insert_pre_migration_data(&self, conn: &mut MemoryConnection) -> Result<()> {
        conn.insert("Customer", json!({ "id": 1, "name": "Jane" }))
    }
}

/// Inserts a customer without its required name.
struct NamelessCustomer {
    definition: MigrationTestDefinition,
}

#[async_trait]
impl MigrationTest<MemoryConnection> for NamelessCustomer {
    fn definition(&self) -> &MigrationTestDefinition {
        &self.definition
    }

    async fn assert_pre_migration_schema(
        &self,
        schema: SchemaAssert<'_>,
        _conn: &mut MemoryConnection,
    ) -> Result<()> {
        schema.has_table("Customer")?;

        Ok(())
    }

    async fn assert_post_migration_schema(
        &self,
        schema: SchemaAssert<'_>,
        _conn: &mut MemoryConnection,
    ) -> Result<()> {
        schema.has_table("Customer")?;

        Ok(())
    }

    async fn insert_pre_migration_data(&self, conn: &mut MemoryConnection) -> Result<()> {
        conn.insert("Customer", json!({ "id": 1 }))
    }
}

/// Hands connections back to the memory database, then reports a failure.
struct FailingRelease(MemoryDatabase);

#[async_trait]
impl Database<MemoryConnection> for FailingRelease {
    async fn connect(&self) -> Result<MemoryConnection> {
        self.0.connect().await
    }

    async fn release(&self, conn: MemoryConnection) -> Result<()> {
        self.0.release(conn).await?;

        Err(Error::configuration("connection pool is closed"))
    }

    async fn commit(&self, conn: &mut MemoryConnection) -> Result<()> {
        self.0.commit(conn).await
    }

    async fn set_referential_integrity(&self, conn: &mut MemoryConnection, enabled: bool) -> Result<()> {
        self.0.set_referential_integrity(conn, enabled).await
    }
}

fn with_example_table() -> (Snapshot, MemoryState) {
    let mut state = base_state();
    state.schema.tables.push(example_table());

    (Snapshot::file("with-example.sql"), state)
}

#[tokio_shared_rt::test]
#[traced_test]
async fn migration_walks_every_state() -> anyhow::Result<()> {
    let database = database();
    let backend = database.backend();
    let registry = TypeRegistry::standard();
    let engine = MigrationEngine::new(&backend, &registry, DEFAULT_CONTEXTS);

    let post = engine
        .run(&CreateExampleTable::new(), &base_snapshot())
        .await?;

    assert!(post.find_table("Example").is_some());
    assert_eq!(
        database.journal(),
        vec![
            "restore base.sql",
            "connect",
            "read_schema",
            "insert Customer",
            "commit",
            "update 01.00.00/CreateExampleTable.json",
            "commit",
            "read_schema",
            "release",
            "restore base.sql",
            "connect",
            "update 01.00.00/CreateExampleTable.json",
            "commit",
            "read_schema",
            "release",
        ]
    );
    assert_eq!(database.open_connections(), 0);
    assert!(database.state().rows("Customer").is_empty());

    assert!(logs_contain("state ASSERT_PRE_SCHEMA"));
    assert!(logs_contain("state APPLY_SCRIPT_REPLAY"));
    assert!(logs_contain("01.00.00/CreateExampleTable.json passed"));

    Ok(())
}

#[tokio_shared_rt::test]
async fn referential_integrity_is_suspended_around_pre_migration_data() -> anyhow::Result<()> {
    let database = database();
    let (snapshot, state) = with_example_table();
    database.register_snapshot(&snapshot, state);

    let backend = database.backend();
    let registry = TypeRegistry::standard();
    let engine = MigrationEngine::new(&backend, &registry, DEFAULT_CONTEXTS);

    let test = OrphanedExamples {
        definition: MigrationTestDefinition::new("AddCurrency", "01.00.00")
            .disable_referential_integrity_for_pre_migration_data(),
    };
    engine.run(&test, &snapshot).await?;

    let journal = database.journal();
    let position = |entry: &str| journal.iter().position(|e| e == entry);

    assert!(position("fk_checks off") < position("insert Example"));
    assert!(position("insert Example") < position("fk_checks on"));
    assert!(position("fk_checks on") < position("update 01.00.00/AddCurrency.json"));

    Ok(())
}

#[tokio_shared_rt::test]
async fn referential_integrity_is_restored_when_pre_migration_data_fails() {
    let database = database();
    let backend = database.backend();
    let registry = TypeRegistry::standard();
    let engine = MigrationEngine::new(&backend, &registry, DEFAULT_CONTEXTS);

    let test = NamelessCustomer {
        definition: MigrationTestDefinition::new("CreateExampleTable", "01.00.00")
            .disable_referential_integrity_for_pre_migration_data(),
    };
    let failure = engine.run(&test, &base_snapshot()).await.unwrap_err();

    assert_eq!(failure.state, MigrationState::InsertPreData);
    assert!(failure.to_string().contains("Column 'name' cannot be null"));

    let journal = database.journal();
    let position = |entry: &str| journal.iter().position(|e| e == entry);

    assert!(position("fk_checks off").is_some());
    assert!(position("fk_checks off") < position("insert Customer"));
    assert!(position("insert Customer") < position("fk_checks on"));
    assert!(position("fk_checks on") < position("release"));
    assert_eq!(position("commit"), None);
    assert_eq!(database.open_connections(), 0);
}

#[tokio_shared_rt::test]
async fn pre_migration_schema_checks_are_repeatable() {
    let database = database();
    let backend = database.backend();
    let registry = TypeRegistry::standard();
    let engine = MigrationEngine::new(&backend, &registry, DEFAULT_CONTEXTS);

    let mut journals = Vec::new();
    let mut models = Vec::new();

    for _ in 0..2 {
        database.clear_journal();
        models.push(engine.run(&CreateExampleTable::new(), &base_snapshot()).await.unwrap());
        journals.push(database.journal());
    }

    assert_eq!(models[0], models[1]);
    assert_eq!(journals[0], journals[1]);
    assert_eq!(journals[0][..3], ["restore base.sql", "connect", "read_schema"]);

    let mut failures = Vec::new();

    for _ in 0..2 {
        database.clear_journal();
        let failure = engine.run(&AddCurrency::new(), &base_snapshot()).await.unwrap_err();
        failures.push((failure.state, failure.to_string()));
        assert_eq!(database.journal(), ["restore base.sql", "connect", "read_schema", "release"]);
    }

    assert_eq!(failures[0], failures[1]);
    assert_eq!(failures[0].0, MigrationState::AssertPreSchema);
}

#[tokio_shared_rt::test]
async fn release_failures_are_not_blamed_on_assertions() {
    let database = database();
    let backend = Backend::new(
        FailingRelease(database.clone()),
        database.clone(),
        database.clone(),
        database.clone(),
    );
    let registry = TypeRegistry::standard();
    let engine = MigrationEngine::new(&backend, &registry, DEFAULT_CONTEXTS);

    let failure = engine
        .run(&CreateExampleTable::new(), &base_snapshot())
        .await
        .unwrap_err();

    assert_eq!(failure.state, MigrationState::ReleaseConnection);
    assert!(failure.to_string().contains("connection pool is closed"));
    assert_eq!(database.open_connections(), 0);
}

#[tokio_shared_rt::test]
async fn orphaned_rows_fail_while_referential_integrity_is_on() {
    let database = database();
    let (snapshot, state) = with_example_table();
    database.register_snapshot(&snapshot, state);

    let backend = database.backend();
    let registry = TypeRegistry::standard();
    let engine = MigrationEngine::new(&backend, &registry, DEFAULT_CONTEXTS);

    let test = OrphanedExamples {
        definition: MigrationTestDefinition::new("AddCurrency", "01.00.00"),
    };
    let failure = engine.run(&test, &snapshot).await.unwrap_err();

    assert_eq!(failure.state, MigrationState::InsertPreData);
    assert!(failure.to_string().contains("fk_example_customer"));
    assert!(!database.journal().contains(&"fk_checks off".to_owned()));
    assert_eq!(database.open_connections(), 0);
}

#[tokio_shared_rt::test]
async fn replay_catches_scripts_depending_on_test_data() {
    let database = database();
    database.register_script(
        MemoryScript::new("01.00.01/IndexCustomerNames.json", |state| {
            if !state.rows("Customer").is_empty() {
                if let Some(table) = state.schema.find_table_mut("Customer") {
                    table.indexes.push(Index::new("idx_customer_name", &["name"]));
                }
            }

            Ok(())
        })
        .change_set(halting("1", "01.00.01")),
    );

    let backend = database.backend();
    let registry = TypeRegistry::standard();
    let engine = MigrationEngine::new(&backend, &registry, DEFAULT_CONTEXTS);

    let test = KeepsCustomers {
        definition: MigrationTestDefinition::new("IndexCustomerNames", "01.00.01"),
    };
    let failure = engine.run(&test, &base_snapshot()).await.unwrap_err();

    assert_eq!(failure.state, MigrationState::ApplyScriptReplay);
    assert!(failure
        .to_string()
        .contains("produced a different schema: table Customer differs"));
}

#[tokio_shared_rt::test]
async fn comment_tag_must_match_the_location() {
    let registry = TypeRegistry::standard();

    for (comment, expected) in [
        ("01.00.01", "Comments tag should match release"),
        ("", "requires a comment tag"),
    ] {
        let database = database();
        database.register_script(create_example_table(comment));

        let backend = database.backend();
        let engine = MigrationEngine::new(&backend, &registry, DEFAULT_CONTEXTS);
        let failure = engine
            .run(&CreateExampleTable::new(), &base_snapshot())
            .await
            .unwrap_err();

        assert_eq!(failure.state, MigrationState::ApplyScript);
        assert!(
            failure.to_string().contains(expected),
            "{failure} should mention {expected}"
        );
    }
}

#[tokio_shared_rt::test]
async fn untested_scripts_are_reported() -> anyhow::Result<()> {
    let database = database();
    let backend = database.backend();
    let create = CreateExampleTable::new();

    let report = CoverageVerifier::new(&backend, MASTER, DEFAULT_CONTEXTS)
        .run(&base_snapshot(), [create.definition()])
        .await?;

    assert_eq!(
        report.violations,
        vec![CoverageViolation::Untested(ADD_CURRENCY.to_owned())]
    );
    assert_eq!(
        report.state.newly_applied,
        vec![CREATE_EXAMPLE_TABLE, ADD_CURRENCY]
    );
    assert!(matches!(report.into_result(), Err(Error::Coverage(_))));

    Ok(())
}

#[tokio_shared_rt::test]
async fn extra_release_scripts_must_stay_out_of_the_changelog() -> anyhow::Result<()> {
    let database = database();
    database.register_script(
        MemoryScript::new("extra-release/FixNames.json", |_| Ok(()))
            .change_set(halting("1", "extra-release")),
    );

    let create = CreateExampleTable::new();
    let currency = AddCurrency::new();
    let fix = MigrationTestDefinition::new("FixNames", "extra-release");
    let definitions = [create.definition(), currency.definition(), &fix];

    let backend = database.backend();
    let report = CoverageVerifier::new(&backend, MASTER, DEFAULT_CONTEXTS)
        .run(&base_snapshot(), definitions)
        .await?;
    assert!(report.is_ok(), "{:?}", report.violations);

    database.register_change_log(
        MASTER,
        [CREATE_EXAMPLE_TABLE, ADD_CURRENCY, "extra-release/FixNames.json"],
    );
    let report = CoverageVerifier::new(&backend, MASTER, DEFAULT_CONTEXTS)
        .run(&base_snapshot(), definitions)
        .await?;
    assert_eq!(
        report.violations,
        vec![CoverageViolation::ExtraReleaseExecuted(
            "extra-release/FixNames.json".to_owned()
        )]
    );

    Ok(())
}

#[tokio_shared_rt::test]
#[traced_test]
async fn lenient_scripts_skip_the_on_fail_check() -> anyhow::Result<()> {
    let database = database();
    database.register_script(
        add_currency().change_set(
            dbevolution::ChangeSet::new("2", "jane", "")
                .comment("01.00.00")
                .preconditions(FailOption::MarkRan, ErrorOption::Halt),
        ),
    );

    let create = CreateExampleTable::new();
    let strict = AddCurrency::new();
    let lenient = MigrationTestDefinition::new("AddCurrency", "01.00.00")
        .allow_any_precondition_on_fail_handling();

    let backend = database.backend();
    let verifier = CoverageVerifier::new(&backend, MASTER, DEFAULT_CONTEXTS);

    let report = verifier
        .run(&base_snapshot(), [create.definition(), strict.definition()])
        .await?;
    assert_eq!(
        report
            .violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>(),
        vec!["01.00.00/AddCurrency.json::2 should HALT on fail, but was MARK_RAN"]
    );

    let report = verifier
        .run(&base_snapshot(), [create.definition(), &lenient])
        .await?;
    assert!(report.is_ok());
    assert!(logs_contain("Skipping precondition check for 01.00.00/AddCurrency.json"));

    Ok(())
}

#[tokio_shared_rt::test]
async fn suite_runs_migrations_on_cumulative_baselines() -> anyhow::Result<()> {
    let database = database();

    let mut suite = MigrationTestSuite::builder(database.backend(), base_snapshot(), MASTER)
        .test(CreateExampleTable::new())
        .test(AddCurrency::new())
        .build()?;

    let report = suite.run().await?;

    assert!(report.is_ok(), "{:?}", report.failures().collect::<Vec<_>>());
    assert_eq!(
        database
            .journal()
            .iter()
            .filter(|e| e.as_str() == "capture")
            .count(),
        2
    );

    suite.close().await?;
    report.into_result()?;

    Ok(())
}

#[tokio_shared_rt::test]
async fn suite_recovers_after_a_failed_migration() -> anyhow::Result<()> {
    let database = database();
    database.register_script(create_example_table("01.00.01"));

    let mut suite = MigrationTestSuite::builder(database.backend(), base_snapshot(), MASTER)
        .test(CreateExampleTable::new())
        .test(AddCurrency::new())
        .build()?;

    let report = suite.run().await?;

    assert_eq!(
        report
            .migrations
            .iter()
            .map(|m| (m.migration.as_str(), m.is_ok()))
            .collect::<Vec<_>>(),
        vec![("CreateExampleTable", false), ("AddCurrency", true)]
    );
    assert_eq!(
        report.failures().next().map(|f| f.state),
        Some(MigrationState::ApplyScript)
    );

    let err = report.into_result().unwrap_err();
    assert!(err.to_string().starts_with("1 of 2 migration tests failed"));

    suite.close().await?;

    Ok(())
}

#[tokio_shared_rt::test]
async fn suite_rejects_duplicate_definitions() {
    let res = MigrationTestSuite::builder(database().backend(), base_snapshot(), MASTER)
        .test(CreateExampleTable::new())
        .test(CreateExampleTable::with_definition(MigrationTestDefinition::new(
            "CreateExampleTable",
            "01.00.00",
        )))
        .build();

    assert!(matches!(res, Err(Error::Configuration(_))));

    let res = MigrationTestSuite::<MemoryConnection>::builder(database().backend(), base_snapshot(), MASTER)
        .build();

    assert!(matches!(res, Err(Error::Configuration(_))));
}

#[tokio_shared_rt::test]
async fn invalid_suite_configuration_is_a_configuration_error() {
    for details in [
        DatabaseDetails::new("", "shop", "app", "app"),
        DatabaseDetails::new("localhost", "shop", "app", "app").port(0),
    ] {
        let config = SuiteConfig::new(details, base_snapshot(), MASTER);
        let res = MigrationTestSuite::from_config(config, database().backend());

        assert!(matches!(res, Err(Error::Configuration(_))));
    }
}

#[tokio_shared_rt::test]
async fn missing_snapshots_fail_before_connecting() {
    let database = database();
    let backend = database.backend();
    let registry = TypeRegistry::standard();
    let engine = MigrationEngine::new(&backend, &registry, DEFAULT_CONTEXTS);

    let failure = engine
        .run(&CreateExampleTable::new(), &Snapshot::file("missing.sql"))
        .await
        .unwrap_err();

    assert_eq!(failure.state, MigrationState::RestoreSnapshot);
    assert!(matches!(failure.error, Error::Configuration(_)));
    assert!(!database.journal().contains(&"connect".to_owned()));

    let model: SchemaModel = database.state().schema;
    assert!(model.tables.is_empty());
}
