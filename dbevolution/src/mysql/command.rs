use std::{path::PathBuf, process::Stdio};

use tokio::process::Command;

use crate::error::{Error, Result};

/// An external program run to completion, stdout captured.
#[derive(Debug, Clone)]
pub(crate) struct ExternalCommand {
    program: String,
    args: Vec<String>,
    secrets: Vec<(String, String)>,
    stdin: Option<PathBuf>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            secrets: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Passes a value through the environment, never logged.
    pub fn secret_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    pub fn display(&self) -> String {
        let args = self.args.iter().map(|arg| match arg.split_once('=') {
            Some((key, _)) if key.ends_with("password") => format!("{key}=****"),
            _ => arg.to_owned(),
        });

        std::iter::once(self.program.to_owned())
            .chain(args)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub async fn output(self) -> Result<Vec<u8>> {
        tracing::debug!("running {}", self.display());

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.secrets.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match &self.stdin {
            Some(path) => {
                let file = tokio::fs::File::open(path).await?.into_std().await;
                command.stdin(Stdio::from(file));
            }
            None => {
                command.stdin(Stdio::null());
            }
        }

        let output = command.output().await.map_err(|e| {
            Error::configuration(format!("unable to run `{}`: {e}", self.program))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            tracing::error!("{} exited with {}: {stderr}", self.display(), output.status);

            return Err(Error::Command {
                program: self.program,
                status: output.status.to_string(),
                stderr,
            });
        }

        Ok(output.stdout)
    }
}
