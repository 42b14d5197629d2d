use async_trait::async_trait;
use dbevolution_schema::SchemaModel;
use sqlx::MySqlConnection;

use crate::{database::SchemaReader, error::Result};

#[derive(Debug, Clone)]
pub struct MySqlSchemaReader {
    schema_name: String,
}

impl MySqlSchemaReader {
    pub fn new(schema_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
        }
    }
}

#[async_trait]
impl SchemaReader<MySqlConnection> for MySqlSchemaReader {
    async fn read(&self, conn: &mut MySqlConnection) -> Result<SchemaModel> {
        Ok(dbevolution_schema::mysql::read_schema(conn, &self.schema_name).await?)
    }
}
