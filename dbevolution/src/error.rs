use dbevolution_schema::SchemaError;
use validator::ValidationErrors;

use crate::verifier::CoverageViolation;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration: {0}")]
    Configuration(String),

    #[error("{0}")]
    Assertion(String),

    #[error("failed to apply `{script}`: {message}")]
    ScriptApplication { script: String, message: String },

    #[error("{}", display_violations(.0))]
    Coverage(Vec<CoverageViolation>),

    #[error("`{program}` exited with {status}: {stderr}")]
    Command {
        program: String,
        status: String,
        stderr: String,
    },

    #[cfg(feature = "mysql")]
    #[error("sqlx `{0}`")]
    Sqlx(#[from] sqlx::Error),

    #[error("io `{0}`")]
    Io(#[from] std::io::Error),

    #[error("serde_json `{0}`")]
    SerdeJson(#[from] serde_json::Error),

    #[error("{0}")]
    Any(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion(message.into())
    }

    pub fn script(script: impl Into<String>, message: impl ToString) -> Self {
        Self::ScriptApplication {
            script: script.into(),
            message: message.to_string(),
        }
    }
}

impl From<SchemaError> for Error {
    fn from(e: SchemaError) -> Self {
        match e {
            SchemaError::Assertion(message) => Error::Assertion(message),
            SchemaError::Configuration(message) => Error::Configuration(message),
            #[cfg(feature = "mysql")]
            SchemaError::Sqlx(e) => Error::Sqlx(e),
        }
    }
}

impl From<ValidationErrors> for Error {
    fn from(e: ValidationErrors) -> Self {
        Error::Configuration(format!("invalid configuration: {e}"))
    }
}

fn display_violations(violations: &[CoverageViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
