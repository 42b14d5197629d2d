use std::{borrow::Cow, collections::HashMap};

use parse_display::Display;

use crate::{
    error::{ensure, Result, SchemaError},
    model::{Column, NativeType},
};

/// The closed set of application-level data types a column can be asked to
/// support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum SemanticType {
    Boolean,
    Character,
    Enum,
    Integer,
    Double,
    Long,
    YearMonth,
    LocalDate,
    LocalTime,
    LocalDateTime,
    ZoneId,
    String,
    Binary,
    TinyInt,
    Blob,
    Clob,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeCheck {
    Exact(u32),
    Minimum(u32),
}

/// Acceptance rule for a column: allowed native types plus optional size
/// and scale constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAssertion {
    native_types: Cow<'static, [NativeType]>,
    size: Option<SizeCheck>,
    scale: Option<u32>,
}

const VARCHARS: &[NativeType] = &[NativeType::Varchar, NativeType::NVarchar];
const TEXTUALS: &[NativeType] = &[
    NativeType::Varchar,
    NativeType::NVarchar,
    NativeType::LongVarchar,
    NativeType::LongNVarchar,
    NativeType::Clob,
    NativeType::NClob,
];

const fn rule(
    native_types: &'static [NativeType],
    size: Option<SizeCheck>,
    scale: Option<u32>,
) -> TypeAssertion {
    TypeAssertion {
        native_types: Cow::Borrowed(native_types),
        size,
        scale,
    }
}

const STANDARD: &[(SemanticType, TypeAssertion)] = &[
    (
        SemanticType::Boolean,
        rule(&[NativeType::Bit], Some(SizeCheck::Exact(1)), None),
    ),
    (
        SemanticType::Character,
        rule(&[NativeType::Char], Some(SizeCheck::Exact(1)), None),
    ),
    (SemanticType::Enum, rule(&[NativeType::Char], None, None)),
    (
        SemanticType::Integer,
        rule(&[NativeType::Integer], Some(SizeCheck::Exact(10)), None),
    ),
    (
        SemanticType::Double,
        rule(&[NativeType::Double], Some(SizeCheck::Exact(16)), Some(10)),
    ),
    (
        SemanticType::Long,
        rule(&[NativeType::BigInt], Some(SizeCheck::Exact(19)), None),
    ),
    (
        SemanticType::YearMonth,
        rule(&[NativeType::Char], Some(SizeCheck::Exact(4)), None),
    ),
    (SemanticType::LocalDate, rule(&[NativeType::Date], None, None)),
    (SemanticType::LocalTime, rule(&[NativeType::Time], None, None)),
    (
        SemanticType::LocalDateTime,
        rule(&[NativeType::Timestamp], None, None),
    ),
    (
        SemanticType::ZoneId,
        rule(&[NativeType::Varchar], Some(SizeCheck::Exact(255)), None),
    ),
    (
        SemanticType::String,
        rule(&[NativeType::Varchar], Some(SizeCheck::Exact(255)), None),
    ),
    (SemanticType::Binary, rule(&[NativeType::Binary], None, None)),
    (
        SemanticType::TinyInt,
        rule(&[NativeType::TinyInt], Some(SizeCheck::Exact(3)), None),
    ),
    (
        SemanticType::Blob,
        rule(&[NativeType::LongVarBinary], None, None),
    ),
    (SemanticType::Clob, rule(&[NativeType::LongVarchar], None, None)),
];

const MAX_FIXED_WIDTH_CHARACTER: u32 = 255;
const DEFAULT_STRING_SIZE: u32 = 255;

impl TypeAssertion {
    pub fn new(native_types: impl Into<Vec<NativeType>>) -> Self {
        Self {
            native_types: Cow::Owned(native_types.into()),
            size: None,
            scale: None,
        }
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(SizeCheck::Exact(size));
        self
    }

    pub fn with_minimum_size(mut self, size: u32) -> Self {
        self.size = Some(SizeCheck::Minimum(size));
        self
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn decimal(size: u32, scale: u32) -> Self {
        rule(&[NativeType::Decimal], Some(SizeCheck::Exact(size)), Some(scale))
    }

    pub fn data_type(native_type: NativeType, size: u32, scale: u32) -> Self {
        Self::new(vec![native_type]).with_size(size).with_scale(scale)
    }

    pub fn fixed_width_character(size: u32) -> Result<Self> {
        if size == 0 {
            return Err(SchemaError::configuration(
                "a fixed width character column must hold at least one character",
            ));
        }

        if size >= MAX_FIXED_WIDTH_CHARACTER {
            return Err(SchemaError::configuration(format!(
                "a fixed width character column must be shorter than {MAX_FIXED_WIDTH_CHARACTER}; use a string type instead"
            )));
        }

        Ok(rule(&[NativeType::Char], Some(SizeCheck::Exact(size)), None))
    }

    pub fn string(size: u32) -> Self {
        rule(&[NativeType::Varchar], Some(SizeCheck::Exact(size)), None)
    }

    pub fn string_of_at_least(size: u32) -> Self {
        rule(&[NativeType::Varchar], Some(SizeCheck::Minimum(size)), None)
    }

    pub fn long_string(size: u32) -> Result<Self> {
        if size <= DEFAULT_STRING_SIZE {
            return Err(SchemaError::configuration(format!(
                "a long string must be longer than {DEFAULT_STRING_SIZE}, but was {size}"
            )));
        }

        Ok(Self::string_of_at_least(size))
    }

    pub fn textual() -> TextualAssertionBuilder {
        TextualAssertionBuilder::default()
    }

    pub fn native_types(&self) -> &[NativeType] {
        &self.native_types
    }

    pub fn size(&self) -> Option<SizeCheck> {
        self.size
    }

    pub fn scale(&self) -> Option<u32> {
        self.scale
    }

    /// Checks a column against this rule. `table` only appears in messages.
    pub fn verify(&self, table: &str, column: &Column) -> Result<()> {
        let name = &column.name;
        let actual = column.native_type;

        if self.native_types.len() == 1 {
            let expected = self.native_types[0];
            ensure(actual == expected, || {
                format!("Type of {table}.{name}: expected {expected} but was {actual}.")
            })?;
        } else {
            ensure(self.native_types.contains(&actual), || {
                let allowed = self
                    .native_types
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("Type of {table}.{name} should be one of [{allowed}], but was {actual}.")
            })?;
        }

        match self.size {
            Some(SizeCheck::Exact(expected)) => {
                ensure(column.size == Some(expected), || {
                    format!(
                        "Size of {table}.{name}: expected {expected} but was {}.",
                        display_size(column.size)
                    )
                })?;
            }
            Some(SizeCheck::Minimum(minimum)) => {
                ensure(column.size.is_some_and(|s| s >= minimum), || {
                    format!(
                        "Size of {table}.{name} should be at least {minimum}, but was {}.",
                        display_size(column.size)
                    )
                })?;
            }
            None => {}
        }

        if let Some(expected) = self.scale {
            ensure(column.scale == Some(expected), || {
                format!(
                    "Scale of {table}.{name}: expected {expected} but was {}.",
                    display_size(column.scale)
                )
            })?;
        }

        Ok(())
    }
}

fn display_size(size: Option<u32>) -> String {
    size.map(|s| s.to_string())
        .unwrap_or_else(|| "unspecified".to_owned())
}

/// Builder for textual rules: varchar by default, optionally widened to
/// character large objects.
#[derive(Debug, Clone)]
pub struct TextualAssertionBuilder {
    size: SizeCheck,
    allow_clobs: bool,
}

impl Default for TextualAssertionBuilder {
    fn default() -> Self {
        Self {
            size: SizeCheck::Exact(DEFAULT_STRING_SIZE),
            allow_clobs: false,
        }
    }
}

impl TextualAssertionBuilder {
    pub fn with_size(mut self, size: u32) -> Self {
        self.size = SizeCheck::Exact(size);
        self
    }

    pub fn with_minimal_size(mut self, size: u32) -> Self {
        self.size = SizeCheck::Minimum(size);
        self
    }

    pub fn allow_clobs(mut self) -> Self {
        self.allow_clobs = true;
        self
    }

    pub fn restrict_to_varchar(mut self) -> Self {
        self.allow_clobs = false;
        self
    }

    pub fn build(self) -> TypeAssertion {
        let native_types = if self.allow_clobs { TEXTUALS } else { VARCHARS };
        rule(native_types, Some(self.size), None)
    }
}

/// Fixed lookup from semantic type to its acceptance rule.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    entries: HashMap<SemanticType, TypeAssertion>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl TypeRegistry {
    pub fn standard() -> Self {
        Self {
            entries: STANDARD.iter().cloned().collect(),
        }
    }

    /// Builds a registry from explicit entries, rejecting a type registered
    /// twice.
    pub fn new(entries: impl IntoIterator<Item = (SemanticType, TypeAssertion)>) -> Result<Self> {
        let mut registry = HashMap::new();

        for (ty, assertion) in entries {
            if registry.insert(ty, assertion).is_some() {
                return Err(SchemaError::configuration(format!(
                    "type {ty} is registered more than once"
                )));
            }
        }

        Ok(Self { entries: registry })
    }

    pub fn lookup(&self, ty: SemanticType) -> Result<&TypeAssertion> {
        self.entries.get(&ty).ok_or_else(|| {
            SchemaError::configuration(format!("no assertions registered for type {ty}"))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
