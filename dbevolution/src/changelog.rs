use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use chrono::NaiveDateTime;
use futures_util::{future::BoxFuture, FutureExt};
use parse_display::{Display, FromStr};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromStr, Serialize, Deserialize)]
#[display(style = "SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailOption {
    Halt,
    Continue,
    MarkRan,
    Warn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromStr, Serialize, Deserialize)]
#[display(style = "SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorOption {
    Halt,
    Continue,
    MarkRan,
    Warn,
}

/// Precondition container of a changeset. Only the failure policies are
/// kept; the conditions themselves are the runner's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preconditions {
    pub on_fail: FailOption,
    pub on_error: ErrorOption,
}

impl Default for Preconditions {
    fn default() -> Self {
        Self {
            on_fail: FailOption::Halt,
            on_error: ErrorOption::Halt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub id: String,
    pub author: String,
    /// File the changeset is declared in, as the runner records it.
    pub file_path: String,
    pub comment: Option<String>,
    pub context: Option<String>,
    pub preconditions: Option<Preconditions>,
}

impl ChangeSet {
    pub fn new(id: impl Into<String>, author: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            file_path: file_path.into(),
            comment: None,
            context: None,
            preconditions: None,
        }
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn preconditions(mut self, on_fail: FailOption, on_error: ErrorOption) -> Self {
        self.preconditions = Some(Preconditions { on_fail, on_error });
        self
    }
}

/// The flattened, ordered list of changesets reachable from a master
/// changelog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLog {
    pub file_path: String,
    pub change_sets: Vec<ChangeSet>,
}

impl ChangeLog {
    pub fn new(file_path: impl Into<String>, change_sets: Vec<ChangeSet>) -> Self {
        Self {
            file_path: file_path.into(),
            change_sets,
        }
    }

    pub fn files(&self) -> Vec<&str> {
        let mut seen = HashSet::new();

        self.change_sets
            .iter()
            .map(|c| c.file_path.as_str())
            .filter(|f| seen.insert(*f))
            .collect()
    }

    /// Reads a JSON changelog and every changelog it includes, resolved
    /// against `search_path`.
    pub async fn load(search_path: &Path, file: &str) -> Result<Self> {
        let mut change_sets = Vec::new();
        let mut visiting = Vec::new();

        load_file(search_path, file.to_owned(), &mut visiting, &mut change_sets).await?;

        Ok(Self {
            file_path: file.to_owned(),
            change_sets,
        })
    }

    /// Parses a single changelog file without following its includes, which
    /// are returned separately.
    pub fn parse(file: &str, contents: &str) -> Result<(Self, Vec<String>)> {
        let mut change_sets = Vec::new();
        let mut includes = Vec::new();

        for entry in parse_entries(file, contents)? {
            match entry {
                Entry::Include(include) => includes.push(include),
                Entry::ChangeSet(change_set) => change_sets.push(change_set),
            }
        }

        Ok((
            Self {
                file_path: file.to_owned(),
                change_sets,
            },
            includes,
        ))
    }
}

fn load_file<'a>(
    search_path: &'a Path,
    file: String,
    visiting: &'a mut Vec<String>,
    change_sets: &'a mut Vec<ChangeSet>,
) -> BoxFuture<'a, Result<()>> {
    async move {
        if visiting.contains(&file) {
            return Err(Error::configuration(format!(
                "changelog `{file}` includes itself through {}",
                visiting.join(" -> ")
            )));
        }

        let path = search_path.join(&file);
        let contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
            Error::configuration(format!("unable to read changelog `{}`: {e}", path.display()))
        })?;

        tracing::debug!("parsing changelog {file}");

        let entries = parse_entries(&file, &contents)?;

        visiting.push(file);
        for entry in entries {
            match entry {
                Entry::Include(include) => {
                    load_file(search_path, include, visiting, change_sets).await?
                }
                Entry::ChangeSet(change_set) => change_sets.push(change_set),
            }
        }
        visiting.pop();

        Ok(())
    }
    .boxed()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChangeLog {
    database_change_log: Vec<Map<String, Value>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInclude {
    file: String,
    #[serde(default)]
    relative_to_changelog_file: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChangeSet {
    id: Value,
    author: String,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default, alias = "contextFilter")]
    context: Option<String>,
    #[serde(default)]
    pre_conditions: Option<Value>,
}

enum Entry {
    Include(String),
    ChangeSet(ChangeSet),
}

/// Changesets and includes of one file, in declaration order.
fn parse_entries(file: &str, contents: &str) -> Result<Vec<Entry>> {
    let raw = serde_json::from_str::<RawChangeLog>(contents)?;
    let mut entries = Vec::new();

    for entry in raw.database_change_log {
        for (key, value) in entry {
            match key.as_str() {
                "include" => {
                    let include = serde_json::from_value::<RawInclude>(value)?;
                    entries.push(Entry::Include(resolve_include(file, include)));
                }
                "includeAll" => {
                    return Err(Error::configuration(format!(
                        "`includeAll` in {file} is not supported; list the scripts explicitly"
                    )));
                }
                "changeSet" => {
                    let raw = serde_json::from_value::<RawChangeSet>(value)?;
                    entries.push(Entry::ChangeSet(to_change_set(file, raw)?));
                }
                _ => {}
            }
        }
    }

    Ok(entries)
}

fn resolve_include(parent: &str, include: RawInclude) -> String {
    if !include.relative_to_changelog_file {
        return include.file;
    }

    let base = Path::new(parent).parent().unwrap_or_else(|| Path::new(""));
    let joined: PathBuf = base.join(&include.file);

    joined.to_string_lossy().into_owned()
}

fn to_change_set(file: &str, raw: RawChangeSet) -> Result<ChangeSet> {
    let id = match raw.id {
        Value::String(id) => id,
        other => other.to_string(),
    };

    let preconditions = raw
        .pre_conditions
        .as_ref()
        .map(|v| parse_preconditions(file, &id, v))
        .transpose()?;

    Ok(ChangeSet {
        id,
        author: raw.author,
        file_path: file.to_owned(),
        comment: raw.comment,
        context: raw.context,
        preconditions,
    })
}

fn parse_preconditions(file: &str, id: &str, value: &Value) -> Result<Preconditions> {
    let attributes: Vec<&Map<String, Value>> = match value {
        Value::Object(map) => vec![map],
        Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
        _ => Vec::new(),
    };

    let mut preconditions = Preconditions::default();

    for map in attributes {
        if let Some(on_fail) = map.get("onFail").and_then(Value::as_str) {
            preconditions.on_fail = on_fail.parse().map_err(|_| {
                Error::configuration(format!("{file}::{id} has an unknown onFail `{on_fail}`"))
            })?;
        }

        if let Some(on_error) = map.get("onError").and_then(Value::as_str) {
            preconditions.on_error = on_error.parse().map_err(|_| {
                Error::configuration(format!("{file}::{id} has an unknown onError `{on_error}`"))
            })?;
        }
    }

    Ok(preconditions)
}

/// One row of the runner's bookkeeping table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "mysql", derive(sqlx::FromRow))]
pub struct ChangeSetRecord {
    pub id: String,
    pub author: String,
    pub file_name: String,
    pub date_executed: NaiveDateTime,
    pub order_executed: i32,
    pub comments: Option<String>,
}
