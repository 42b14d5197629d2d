use async_trait::async_trait;
use dbevolution_schema::SchemaAssert;

use crate::error::Result;

pub const DEFAULT_EXTENSION: &str = "json";
const RELEASE_PREFIX: &str = "release_";

/// Identity of one migration script under test.
///
/// Two definitions are equal when every field is equal; the suite rejects
/// two definitions naming the same script file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MigrationTestDefinition {
    name: String,
    location: String,
    extension: String,
    allow_any_precondition_on_fail_handling: bool,
    disable_referential_integrity: bool,
}

impl MigrationTestDefinition {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            extension: DEFAULT_EXTENSION.to_owned(),
            allow_any_precondition_on_fail_handling: false,
            disable_referential_integrity: false,
        }
    }

    /// Uses the last segment of `module_path` as location, see
    /// [`location_from_module_path`].
    ///
    /// ```
    /// use dbevolution::MigrationTestDefinition;
    ///
    /// let definition = MigrationTestDefinition::from_module_path(
    ///     "CreateExampleTable",
    ///     "migrations::release_01_02_03",
    /// );
    /// assert_eq!(definition.script_file(), "01.02.03/CreateExampleTable.json");
    /// ```
    pub fn from_module_path(name: impl Into<String>, module_path: &str) -> Self {
        Self::new(name, location_from_module_path(module_path))
    }

    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn allow_any_precondition_on_fail_handling(mut self) -> Self {
        self.allow_any_precondition_on_fail_handling = true;
        self
    }

    pub fn disable_referential_integrity_for_pre_migration_data(mut self) -> Self {
        self.disable_referential_integrity = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn is_allow_any_precondition_on_fail_handling(&self) -> bool {
        self.allow_any_precondition_on_fail_handling
    }

    pub fn is_referential_integrity_disabled(&self) -> bool {
        self.disable_referential_integrity
    }

    pub fn script_file(&self) -> String {
        format!("{}/{}.{}", self.location, self.name, self.extension)
    }
}

/// `release_NN_NN_NN` becomes `NN.NN.NN`; any other segment is returned
/// as is.
pub fn location_from_module_path(module_path: &str) -> String {
    let segment = module_path.rsplit("::").next().unwrap_or(module_path);

    match segment.strip_prefix(RELEASE_PREFIX) {
        Some(version) if is_release_version(version) => version.replace('_', "."),
        _ => segment.to_owned(),
    }
}

fn is_release_version(version: &str) -> bool {
    let parts = version.split('_').collect::<Vec<_>>();

    parts.len() == 3
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.bytes().all(|b| b.is_ascii_digit()))
}

/// Test author's side of a migration test: the script identity plus the
/// schema and data checks around it.
///
/// `C` is the connection type of the database backend.
#[async_trait]
pub trait MigrationTest<C: Send + 'static>: Send + Sync {
    fn definition(&self) -> &MigrationTestDefinition;

    async fn assert_pre_migration_schema(&self, schema: SchemaAssert<'_>, conn: &mut C) -> Result<()>;

    async fn assert_post_migration_schema(&self, schema: SchemaAssert<'_>, conn: &mut C)
        -> Result<()>;

    async fn insert_pre_migration_data(&self, _conn: &mut C) -> Result<()> {
        Ok(())
    }

    async fn assert_pre_migration_data(&self, _conn: &mut C) -> Result<()> {
        Ok(())
    }

    async fn assert_post_migration_data(&self, _conn: &mut C) -> Result<()> {
        Ok(())
    }
}
