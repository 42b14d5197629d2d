mod command;
mod database;
mod liquibase;
mod reader;
mod snapshot;

pub mod assertions;

pub use database::MySqlDatabase;
pub use liquibase::LiquibaseCli;
pub use reader::MySqlSchemaReader;
pub use snapshot::MySqlSnapshotStore;
pub use sqlx::MySqlConnection;

use crate::{config::SuiteConfig, database::Backend};

/// MySQL collaborators for `config`: sqlx connections, `mysql`/`mysqldump`
/// snapshots and the Liquibase command line.
pub fn backend(config: &SuiteConfig) -> Backend<MySqlConnection> {
    let details = &config.database;

    Backend::new(
        MySqlDatabase::new(details.clone()),
        MySqlSnapshotStore::new(details.clone()),
        MySqlSchemaReader::new(&details.schema_name),
        LiquibaseCli::new(details.clone(), &config.search_path),
    )
}
