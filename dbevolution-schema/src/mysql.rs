use std::collections::BTreeMap;

use sqlx::{MySqlConnection, Row};

use crate::{
    error::Result,
    model::{
        Column, DefaultValue, ForeignKey, Index, NativeType, Reference, SchemaModel, Table, View,
        ViewColumn,
    },
};

#[derive(Debug, sqlx::FromRow)]
struct ColumnRow {
    table_name: String,
    column_name: String,
    data_type: String,
    column_type: String,
    character_maximum_length: Option<i64>,
    numeric_precision: Option<i64>,
    numeric_scale: Option<i64>,
    is_nullable: String,
    column_default: Option<String>,
    extra: String,
    column_key: String,
}

#[derive(Debug, sqlx::FromRow)]
struct IndexRow {
    table_name: String,
    index_name: String,
    non_unique: i64,
    column_name: String,
}

#[derive(Debug, sqlx::FromRow)]
struct ForeignKeyRow {
    table_name: String,
    constraint_name: String,
    column_name: String,
    referenced_table_name: String,
    referenced_column_name: String,
}

/// Reads tables, views, indexes and foreign keys of `schema_name` from
/// `information_schema`.
pub async fn read_schema(conn: &mut MySqlConnection, schema_name: &str) -> Result<SchemaModel> {
    let relations = sqlx::query(
        "SELECT CAST(TABLE_NAME AS CHAR) AS table_name, CAST(TABLE_TYPE AS CHAR) AS table_type
        FROM information_schema.TABLES WHERE TABLE_SCHEMA = ? ORDER BY TABLE_NAME",
    )
    .bind(schema_name)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|row| {
        Ok((
            row.try_get::<String, _>("table_name")?,
            row.try_get::<String, _>("table_type")?,
        ))
    })
    .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;

    let columns = sqlx::query_as::<_, ColumnRow>(
        "SELECT CAST(TABLE_NAME AS CHAR) AS table_name, CAST(COLUMN_NAME AS CHAR) AS column_name,
            CAST(DATA_TYPE AS CHAR) AS data_type, CAST(COLUMN_TYPE AS CHAR) AS column_type,
            CAST(CHARACTER_MAXIMUM_LENGTH AS SIGNED) AS character_maximum_length,
            CAST(NUMERIC_PRECISION AS SIGNED) AS numeric_precision,
            CAST(NUMERIC_SCALE AS SIGNED) AS numeric_scale,
            CAST(IS_NULLABLE AS CHAR) AS is_nullable, CAST(COLUMN_DEFAULT AS CHAR) AS column_default,
            CAST(EXTRA AS CHAR) AS extra, CAST(COLUMN_KEY AS CHAR) AS column_key
        FROM information_schema.COLUMNS WHERE TABLE_SCHEMA = ?
        ORDER BY TABLE_NAME, ORDINAL_POSITION",
    )
    .bind(schema_name)
    .fetch_all(&mut *conn)
    .await?;

    let indexes = sqlx::query_as::<_, IndexRow>(
        "SELECT CAST(TABLE_NAME AS CHAR) AS table_name, CAST(INDEX_NAME AS CHAR) AS index_name,
            CAST(NON_UNIQUE AS SIGNED) AS non_unique, CAST(COLUMN_NAME AS CHAR) AS column_name
        FROM information_schema.STATISTICS WHERE TABLE_SCHEMA = ? AND INDEX_NAME <> 'PRIMARY'
        ORDER BY TABLE_NAME, INDEX_NAME, SEQ_IN_INDEX",
    )
    .bind(schema_name)
    .fetch_all(&mut *conn)
    .await?;

    let foreign_keys = sqlx::query_as::<_, ForeignKeyRow>(
        "SELECT CAST(TABLE_NAME AS CHAR) AS table_name, CAST(CONSTRAINT_NAME AS CHAR) AS constraint_name,
            CAST(COLUMN_NAME AS CHAR) AS column_name,
            CAST(REFERENCED_TABLE_NAME AS CHAR) AS referenced_table_name,
            CAST(REFERENCED_COLUMN_NAME AS CHAR) AS referenced_column_name
        FROM information_schema.KEY_COLUMN_USAGE
        WHERE TABLE_SCHEMA = ? AND REFERENCED_TABLE_NAME IS NOT NULL
        ORDER BY TABLE_NAME, CONSTRAINT_NAME, ORDINAL_POSITION",
    )
    .bind(schema_name)
    .fetch_all(&mut *conn)
    .await?;

    tracing::debug!(
        "read {} relations, {} columns from schema {schema_name}",
        relations.len(),
        columns.len()
    );

    Ok(assemble(schema_name, relations, columns, indexes, foreign_keys))
}

fn assemble(
    schema_name: &str,
    relations: Vec<(String, String)>,
    columns: Vec<ColumnRow>,
    indexes: Vec<IndexRow>,
    foreign_keys: Vec<ForeignKeyRow>,
) -> SchemaModel {
    let mut model = SchemaModel::new(schema_name);
    let mut tables = BTreeMap::new();
    let mut views = BTreeMap::new();

    for (name, kind) in relations {
        if kind == "VIEW" {
            views.insert(name.clone(), View::new(name));
        } else if kind == "BASE TABLE" {
            tables.insert(name.clone(), Table::new(name));
        }
    }

    for row in columns {
        let column = to_column(&row);

        if let Some(table) = tables.get_mut(&row.table_name) {
            table.columns.push(column);
        } else if let Some(view) = views.get_mut(&row.table_name) {
            view.columns.push(ViewColumn {
                name: column.name,
                native_type: column.native_type,
                size: column.size,
                scale: column.scale,
            });
        }
    }

    for row in foreign_keys {
        let Some(table) = tables.get_mut(&row.table_name) else {
            continue;
        };

        let reference = Reference {
            local_column: row.column_name,
            foreign_column: row.referenced_column_name,
        };

        match table
            .foreign_keys
            .iter_mut()
            .find(|fk| fk.name == row.constraint_name)
        {
            Some(fk) => fk.references.push(reference),
            None => table.foreign_keys.push(ForeignKey {
                name: row.constraint_name,
                foreign_table: row.referenced_table_name,
                references: vec![reference],
            }),
        }
    }

    for row in indexes {
        let Some(table) = tables.get_mut(&row.table_name) else {
            continue;
        };

        match table.indexes.iter_mut().find(|i| i.name == row.index_name) {
            Some(index) => index.columns.push(row.column_name),
            None => table.indexes.push(Index {
                name: row.index_name,
                unique: row.non_unique == 0,
                columns: vec![row.column_name],
            }),
        }
    }

    // InnoDB creates a backing index for every foreign key; it is not a
    // user-declared index.
    for table in tables.values_mut() {
        let foreign_keys = &table.foreign_keys;
        table.indexes.retain(|index| {
            !foreign_keys.iter().any(|fk| {
                fk.name == index.name
                    && fk
                        .references
                        .iter()
                        .map(|r| &r.local_column)
                        .eq(index.columns.iter())
            })
        });
    }

    model.tables = tables.into_values().collect();
    model.views = views.into_values().collect();
    model
}

fn to_column(row: &ColumnRow) -> Column {
    let native_type = NativeType::from_mysql(&row.data_type, &row.column_type);
    let size = if native_type.is_textual()
        || matches!(
            native_type,
            NativeType::Binary | NativeType::VarBinary | NativeType::LongVarBinary
        ) {
        row.character_maximum_length
    } else {
        row.numeric_precision
    }
    .and_then(|s| u32::try_from(s).ok());

    let scale = match native_type {
        NativeType::Decimal | NativeType::Real | NativeType::Double => row
            .numeric_scale
            .and_then(|s| u32::try_from(s).ok()),
        _ => None,
    };

    let size = match native_type {
        NativeType::Bit if row.data_type.eq_ignore_ascii_case("tinyint") => Some(1),
        NativeType::Date | NativeType::Time | NativeType::Timestamp => None,
        _ => size,
    };

    let default_value = row
        .column_default
        .as_deref()
        .filter(|raw| !raw.eq_ignore_ascii_case("NULL"))
        .map(|raw| DefaultValue::parse(native_type, unquote(raw)));

    Column {
        name: row.column_name.clone(),
        native_type,
        size,
        scale,
        required: row.is_nullable.eq_ignore_ascii_case("NO"),
        default_value,
        auto_increment: row.extra.to_ascii_lowercase().contains("auto_increment"),
        primary_key: row.column_key == "PRI",
    }
}

fn unquote(raw: &str) -> &str {
    raw.strip_prefix('\'')
        .and_then(|r| r.strip_suffix('\''))
        .unwrap_or(raw)
}
