#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("{0}")]
    Assertion(String),

    #[error("configuration: {0}")]
    Configuration(String),

    #[cfg(feature = "mysql")]
    #[error("sqlx: {0}")]
    Sqlx(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, SchemaError>;

impl SchemaError {
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

pub(crate) fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(SchemaError::Assertion(message()))
    }
}
