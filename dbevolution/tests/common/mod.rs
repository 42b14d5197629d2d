#![allow(dead_code)]

use dbevolution::{
    async_trait,
    memory::{MemoryConnection, MemoryDatabase, MemoryScript, MemoryState},
    ChangeSet, Column, Error, ErrorOption, FailOption, ForeignKey, MigrationTest,
    MigrationTestDefinition, NativeType, Result, SchemaAssert, SchemaModel, SemanticType, Snapshot,
    Table,
};
use serde_json::json;

pub const MASTER: &str = "migration-scripts.json";
pub const CREATE_EXAMPLE_TABLE: &str = "01.00.00/CreateExampleTable.json";
pub const ADD_CURRENCY: &str = "01.00.00/AddCurrency.json";

pub fn base_snapshot() -> Snapshot {
    Snapshot::embedded("base.sql", b"-- shop at 00.09.00")
}

fn id() -> Column {
    Column::new("id", NativeType::BigInt)
        .size(19)
        .primary_key()
        .auto_increment()
}

pub fn base_state() -> MemoryState {
    MemoryState::new(
        SchemaModel::new("shop").table(
            Table::new("Customer")
                .column(id())
                .column(Column::new("name", NativeType::Varchar).size(255).not_null()),
        ),
    )
}

pub fn example_table() -> Table {
    Table::new("Example")
        .column(id())
        .column(Column::new("name", NativeType::Varchar).size(255).not_null())
        .column(Column::new("customer_id", NativeType::BigInt).size(19).not_null())
        .foreign_key(ForeignKey::new("fk_example_customer", "Customer").reference("customer_id", "id"))
}

pub fn halting(id: &str, comment: &str) -> ChangeSet {
    ChangeSet::new(id, "jane", "")
        .comment(comment)
        .preconditions(FailOption::Halt, ErrorOption::Halt)
}

pub fn create_example_table(comment: &str) -> MemoryScript {
    MemoryScript::new(CREATE_EXAMPLE_TABLE, |state| {
        state.schema.tables.push(example_table());

        Ok(())
    })
    .change_set(halting("1", comment))
}

pub fn add_currency() -> MemoryScript {
    MemoryScript::new(ADD_CURRENCY, |state| {
        let table = state
            .schema
            .find_table_mut("Example")
            .ok_or_else(|| Error::assertion("Example does not exist"))?;

        table.columns.push(
            Column::new("currency", NativeType::Char)
                .size(3)
                .not_null()
                .default_value("AUD"),
        );

        Ok(())
    })
    .change_set(halting("1", "01.00.00"))
}

/// A database at `base.sql` with both scripts registered in `MASTER`.
pub fn database() -> MemoryDatabase {
    let database = MemoryDatabase::new();
    database.register_snapshot(&base_snapshot(), base_state());
    database.register_script(create_example_table("01.00.00"));
    database.register_script(add_currency());
    database.register_change_log(MASTER, [CREATE_EXAMPLE_TABLE, ADD_CURRENCY]);

    database
}

pub struct CreateExampleTable {
    definition: MigrationTestDefinition,
}

impl CreateExampleTable {
    pub fn new() -> Self {
        Self {
            definition: MigrationTestDefinition::new("CreateExampleTable", "01.00.00"),
        }
    }

    pub fn with_definition(definition: MigrationTestDefinition) -> Self {
        Self { definition }
    }
}

#[async_trait]
impl MigrationTest<MemoryConnection> for CreateExampleTable {
    fn definition(&self) -> &MigrationTestDefinition {
        &self.definition
    }

    async fn assert_pre_migration_schema(
        &self,
        schema: SchemaAssert<'_>,
        _conn: &mut MemoryConnection,
    ) -> Result<()> {
        schema.does_not_have_table("Example")?;

        Ok(())
    }

    async fn assert_post_migration_schema(
        &self,
        schema: SchemaAssert<'_>,
        _conn: &mut MemoryConnection,
    ) -> Result<()> {
        schema
            .has_table("Example")?
            .enter_new_table_assertion_mode()
            .has_column("id")?
            .is_primary_key_id_column()?
            .has_column("name")?
            .supports_type(SemanticType::String)?
            .is_not_nullable()?
            .has_column("customer_id")?
            .supports_id_type()?
            .is_not_nullable()?
            .has_foreign_key_to("Customer")?
            .with_name("fk_example_customer")?;

        Ok(())
    }

    async fn insert_pre_migration_data(&self, conn: &mut MemoryConnection) -> Result<()> {
        conn.insert("Customer", json!({ "id": 1, "name": "Jane" }))
    }

    async fn assert_post_migration_data(&self, conn: &mut MemoryConnection) -> Result<()> {
        if conn.count("Customer") != 1 {
            return Err(Error::assertion("Customer should keep its row"));
        }

        Ok(())
    }
}

pub struct AddCurrency {
    definition: MigrationTestDefinition,
}

impl AddCurrency {
    pub fn new() -> Self {
        Self {
            definition: MigrationTestDefinition::new("AddCurrency", "01.00.00"),
        }
    }
}

#[async_trait]
impl MigrationTest<MemoryConnection> for AddCurrency {
    fn definition(&self) -> &MigrationTestDefinition {
        &self.definition
    }

    async fn assert_pre_migration_schema(
        &self,
        schema: SchemaAssert<'_>,
        _conn: &mut MemoryConnection,
    ) -> Result<()> {
        schema.has_table("Example")?.does_not_have_column("currency")?;

        Ok(())
    }

    async fn assert_post_migration_schema(
        &self,
        schema: SchemaAssert<'_>,
        _conn: &mut MemoryConnection,
    ) -> Result<()> {
        schema
            .has_table("Example")?
            .has_column("currency")?
            .supports_fixed_width_character(3)?
            .is_not_nullable()?
            .with_default_value_of("AUD")?;

        Ok(())
    }
}
