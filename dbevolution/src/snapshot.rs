use std::{
    borrow::Cow,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A restorable database state: schema, data and grants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Snapshot {
    File(PathBuf),
    Embedded {
        name: String,
        contents: Cow<'static, [u8]>,
    },
}

impl Snapshot {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Wraps a packaged resource, typically `include_bytes!("schema.sql")`.
    pub fn embedded(name: impl Into<String>, contents: &'static [u8]) -> Self {
        Self::Embedded {
            name: name.into(),
            contents: Cow::Borrowed(contents),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Snapshot::File(path) => path.to_string_lossy().into_owned(),
            Snapshot::Embedded { name, .. } => name.to_owned(),
        }
    }

    /// Makes the snapshot readable as a plain file. Embedded snapshots are
    /// written to a uuid-named file under `dir`.
    pub async fn materialize(&self, dir: &Path) -> Result<MaterializedSnapshot> {
        match self {
            Snapshot::File(path) => {
                if !tokio::fs::try_exists(path).await? {
                    return Err(Error::configuration(format!(
                        "snapshot `{}` does not exist",
                        path.display()
                    )));
                }

                Ok(MaterializedSnapshot {
                    path: path.to_owned(),
                    temporary: false,
                })
            }
            Snapshot::Embedded { name, contents } => {
                let file_name = Path::new(name)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let path = dir.join(format!("{}-{file_name}", uuid::Uuid::new_v4()));

                tokio::fs::write(&path, contents).await?;
                tracing::debug!("materialized snapshot {name} to {}", path.display());

                Ok(MaterializedSnapshot {
                    path,
                    temporary: true,
                })
            }
        }
    }
}

#[derive(Debug)]
pub struct MaterializedSnapshot {
    path: PathBuf,
    temporary: bool,
}

impl MaterializedSnapshot {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the file if it was created by [`Snapshot::materialize`].
    pub async fn cleanup(self) -> Result<()> {
        if self.temporary {
            tokio::fs::remove_file(&self.path).await?;
        }

        Ok(())
    }
}
