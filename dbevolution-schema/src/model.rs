use parse_display::{Display, FromStr};
use serde::{Deserialize, Serialize};

/// Normalized column type code.
///
/// Vendor catalogs spell the same storage class many ways (`int`, `integer`,
/// `int unsigned`, ...). Readers fold them onto this closed set so assertions
/// compare codes, not spellings.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromStr, Serialize, Deserialize,
)]
#[display(style = "UPPERCASE")]
pub enum NativeType {
    Bit,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Decimal,
    Real,
    Double,
    Char,
    Varchar,
    NVarchar,
    LongVarchar,
    LongNVarchar,
    Clob,
    NClob,
    Date,
    Time,
    Timestamp,
    Binary,
    VarBinary,
    LongVarBinary,
    Blob,
    Other,
}

impl NativeType {
    /// Maps a MySQL `information_schema.COLUMNS.DATA_TYPE` onto a native type.
    ///
    /// `column_type` is the full declaration (`tinyint(1)`, `varchar(255)`)
    /// and is only consulted where the data type alone is ambiguous.
    pub fn from_mysql(data_type: &str, column_type: &str) -> Self {
        match data_type.to_ascii_lowercase().as_str() {
            "bit" | "bool" | "boolean" => Self::Bit,
            "tinyint" if column_type.eq_ignore_ascii_case("tinyint(1)") => Self::Bit,
            "tinyint" => Self::TinyInt,
            "smallint" => Self::SmallInt,
            "mediumint" | "int" | "integer" => Self::Integer,
            "bigint" => Self::BigInt,
            "decimal" | "numeric" => Self::Decimal,
            "float" => Self::Real,
            "double" | "real" | "double precision" => Self::Double,
            "char" | "enum" | "set" => Self::Char,
            "varchar" => Self::Varchar,
            "nvarchar" | "national varchar" => Self::NVarchar,
            "tinytext" | "text" | "mediumtext" | "longtext" | "json" => Self::LongVarchar,
            "date" | "year" => Self::Date,
            "time" => Self::Time,
            "datetime" | "timestamp" => Self::Timestamp,
            "binary" => Self::Binary,
            "varbinary" => Self::VarBinary,
            "tinyblob" | "blob" | "mediumblob" | "longblob" => Self::LongVarBinary,
            _ => Self::Other,
        }
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            Self::TinyInt | Self::SmallInt | Self::Integer | Self::BigInt
        )
    }

    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            Self::Char
                | Self::Varchar
                | Self::NVarchar
                | Self::LongVarchar
                | Self::LongNVarchar
                | Self::Clob
                | Self::NClob
        )
    }
}

/// A column default, parsed according to the column's native type.
///
/// Two defaults are equal only when both the value and its kind match, so
/// `Integer(1)` and `Text("1")` are different defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefaultValue {
    Boolean(bool),
    Integer(i64),
    Decimal(String),
    Text(String),
    Expression(String),
}

impl DefaultValue {
    pub fn parse(native_type: NativeType, raw: &str) -> Self {
        let raw = raw.trim();

        match native_type {
            NativeType::Bit => match raw {
                "b'1'" | "1" | "true" | "TRUE" => Self::Boolean(true),
                "b'0'" | "0" | "false" | "FALSE" => Self::Boolean(false),
                _ => Self::Text(raw.to_owned()),
            },
            t if t.is_integral() => raw
                .parse::<i64>()
                .map(Self::Integer)
                .unwrap_or_else(|_| Self::Text(raw.to_owned())),
            NativeType::Decimal | NativeType::Real | NativeType::Double => {
                Self::Decimal(raw.to_owned())
            }
            NativeType::Date | NativeType::Time | NativeType::Timestamp
                if raw.to_ascii_uppercase().starts_with("CURRENT_") || raw.contains('(') =>
            {
                Self::Expression(raw.to_owned())
            }
            _ => Self::Text(raw.to_owned()),
        }
    }
}

impl From<bool> for DefaultValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for DefaultValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for DefaultValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<&str> for DefaultValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for DefaultValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub native_type: NativeType,
    pub size: Option<u32>,
    pub scale: Option<u32>,
    pub required: bool,
    pub default_value: Option<DefaultValue>,
    pub auto_increment: bool,
    pub primary_key: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, native_type: NativeType) -> Self {
        Self {
            name: name.into(),
            native_type,
            size: None,
            scale: None,
            required: false,
            default_value: None,
            auto_increment: false,
            primary_key: false,
        }
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn scale(mut self, scale: u32) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<DefaultValue>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.required = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub unique: bool,
    pub columns: Vec<String>,
}

impl Index {
    pub fn new<C: AsRef<str>>(name: impl Into<String>, columns: &[C]) -> Self {
        Self {
            name: name.into(),
            unique: false,
            columns: columns.iter().map(|c| c.as_ref().to_owned()).collect(),
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub local_column: String,
    pub foreign_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub name: String,
    pub foreign_table: String,
    pub references: Vec<Reference>,
}

impl ForeignKey {
    pub fn new(name: impl Into<String>, foreign_table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            foreign_table: foreign_table.into(),
            references: Vec::new(),
        }
    }

    pub fn reference(
        mut self,
        local_column: impl Into<String>,
        foreign_column: impl Into<String>,
    ) -> Self {
        self.references.push(Reference {
            local_column: local_column.into(),
            foreign_column: foreign_column.into(),
        });
        self
    }

    pub fn first_reference(&self) -> Option<&Reference> {
        self.references.first()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub indexes: Vec<Index>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn foreign_key(mut self, foreign_key: ForeignKey) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn find_index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }

    pub fn primary_key_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.primary_key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewColumn {
    pub name: String,
    pub native_type: NativeType,
    pub size: Option<u32>,
    pub scale: Option<u32>,
}

/// A view as reported by the catalog's view metadata, not by the table
/// structure reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    pub name: String,
    pub columns: Vec<ViewColumn>,
}

impl View {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, name: impl Into<String>, native_type: NativeType) -> Self {
        self.columns.push(ViewColumn {
            name: name.into(),
            native_type,
            size: None,
            scale: None,
        });
        self
    }

    pub fn find_column(&self, name: &str) -> Option<&ViewColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Point-in-time snapshot of a live schema. Lookups are exact and
/// case-sensitive; an absent object is a legitimate answer, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaModel {
    pub name: String,
    pub tables: Vec<Table>,
    pub views: Vec<View>,
}

impl SchemaModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Vec::new(),
            views: Vec::new(),
        }
    }

    pub fn table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    pub fn view(mut self, view: View) -> Self {
        self.views.push(view);
        self
    }

    pub fn find_table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn find_table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.iter_mut().find(|t| t.name == name)
    }

    pub fn find_view(&self, name: &str) -> Option<&View> {
        self.views.iter().find(|v| v.name == name)
    }
}
