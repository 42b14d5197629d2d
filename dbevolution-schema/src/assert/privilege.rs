use std::collections::BTreeSet;

use parse_display::{Display, FromStr};

use crate::error::{Result, SchemaError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, FromStr)]
#[display(style = "UPPERCASE")]
pub enum TablePrivilege {
    Select,
    Insert,
    Update,
    Delete,
}

impl TablePrivilege {
    /// Parses a comma separated privilege list such as MySQL's
    /// `tables_priv.Table_priv`. Privileges outside the data set
    /// (`Alter`, `Index`, ...) are skipped.
    pub fn parse_list(raw: &str) -> Vec<TablePrivilege> {
        raw.split(',')
            .map(|p| p.trim().to_ascii_uppercase())
            .filter(|p| !p.is_empty())
            .filter_map(|p| match p.parse::<TablePrivilege>() {
                Ok(privilege) => Some(privilege),
                Err(_) => {
                    tracing::debug!("ignoring table privilege {p}");
                    None
                }
            })
            .collect()
    }
}

/// Compares expected privileges against the union of schema-level and
/// table-level grants. Missing and unexpected privileges are reported as
/// separate lines of the same failure.
pub fn reconcile_privileges(
    user: &str,
    table: &str,
    expected: &BTreeSet<TablePrivilege>,
    schema_level: &[TablePrivilege],
    table_level: &[TablePrivilege],
) -> Result<()> {
    let actual = schema_level
        .iter()
        .chain(table_level)
        .copied()
        .collect::<BTreeSet<_>>();

    let mut failures = Vec::new();

    let missing = expected.difference(&actual).collect::<Vec<_>>();
    if !missing.is_empty() {
        failures.push(format!(
            "These privileges: {} should be granted to user: {user} for table: {table}.",
            join(&missing)
        ));
    }

    let unexpected = actual.difference(expected).collect::<Vec<_>>();
    if !unexpected.is_empty() {
        failures.push(format!(
            "These privileges: {} should not be granted to user: {user} for table: {table}.",
            join(&unexpected)
        ));
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::Assertion(failures.join("\n")))
    }
}

fn join(privileges: &[&TablePrivilege]) -> String {
    let names = privileges
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();

    format!("[{}]", names.join(", "))
}
