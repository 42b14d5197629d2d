use super::{
    DisableNullCheckExplanation, ForeignKeyAssert, NullCheckColumnType, Phase, TableAssert,
};
use crate::{
    error::{ensure, Result, SchemaError},
    model::{Column, DefaultValue, NativeType},
    types::{SemanticType, TypeAssertion},
};

const ID_COLUMN: &str = "id";
const MIN_TEXT_SIZE: u32 = 255;

#[derive(Debug, Clone, Copy)]
pub struct ColumnAssert<'a> {
    table: TableAssert<'a>,
    column: &'a Column,
    null_check_disabled: bool,
}

impl<'a> ColumnAssert<'a> {
    pub(crate) fn new(table: TableAssert<'a>, column: &'a Column) -> Self {
        Self {
            table,
            column,
            null_check_disabled: false,
        }
    }

    pub fn name(&self) -> &'a str {
        &self.column.name
    }

    pub fn table_name(&self) -> &'a str {
        self.table.name()
    }

    pub fn column(&self) -> &'a Column {
        self.column
    }

    pub fn and_table(self) -> TableAssert<'a> {
        self.table
    }

    pub fn has_column(self, name: &str) -> Result<ColumnAssert<'a>> {
        self.table.has_column(name)
    }

    pub(crate) fn with_null_check_disabled(mut self) -> Self {
        self.null_check_disabled = true;
        self
    }

    pub fn supports(self, assertion: &TypeAssertion) -> Result<Self> {
        assertion.verify(self.table.name(), self.column)?;
        Ok(self)
    }

    pub fn supports_type(self, ty: SemanticType) -> Result<Self> {
        let assertion = self.table.schema().registry().lookup(ty)?;
        self.supports(assertion)
    }

    pub fn supports_id_type(self) -> Result<Self> {
        self.supports_type(SemanticType::Long)
    }

    pub fn supports_decimal(self, size: u32, scale: u32) -> Result<Self> {
        self.supports(&TypeAssertion::decimal(size, scale))
    }

    pub fn supports_data_type_with_size_and_scale(
        self,
        native_type: NativeType,
        size: u32,
        scale: u32,
    ) -> Result<Self> {
        self.supports(&TypeAssertion::data_type(native_type, size, scale))
    }

    pub fn supports_fixed_width_character(self, size: u32) -> Result<Self> {
        self.supports(&TypeAssertion::fixed_width_character(size)?)
    }

    pub fn supports_long_string(self, size: u32) -> Result<Self> {
        self.supports(&TypeAssertion::long_string(size)?)
    }

    pub fn supports_string_of_at_least(self, size: u32) -> Result<Self> {
        self.supports(&TypeAssertion::string_of_at_least(size))
    }

    /// Any textual storage, large objects included, of at least `minimum`
    /// characters.
    pub fn supports_text(self, minimum: u32) -> Result<Self> {
        if minimum < MIN_TEXT_SIZE {
            return Err(SchemaError::configuration(format!(
                "there is no storage saving in a text column shorter than {MIN_TEXT_SIZE}, but {minimum} was requested"
            )));
        }

        let assertion = TypeAssertion::textual()
            .with_minimal_size(minimum)
            .allow_clobs()
            .build();

        self.supports(&assertion)
    }

    pub fn is_nullable(self) -> Result<Self> {
        ensure(!self.column.required, || {
            format!("{}.{} should be nullable.", self.table.name(), self.name())
        })?;

        Ok(self)
    }

    /// Requires NOT NULL, and on an existing table also requires a default,
    /// auto-increment, or an explicitly disabled null check. Pre-migration
    /// snapshots and tables in new-table mode are exempt.
    pub fn is_not_nullable(self) -> Result<Self> {
        ensure(self.column.required, || {
            format!("{}.{} should be NOT NULL.", self.table.name(), self.name())
        })?;

        let check_required = self.table.schema().phase() != Phase::PreMigration
            && !self.table.is_new_table()
            && !self.null_check_disabled;

        ensure(
            !check_required
                || self.column.default_value.is_some()
                || self.column.auto_increment,
            || {
                format!(
                    "Problem with column \"{}.{}\": columns added to an existing table must be nullable, \
                     have a default value or be auto-increment. If this is a new table, use \
                     enter_new_table_assertion_mode(); otherwise use disable_null_check().",
                    self.table.name(),
                    self.name()
                )
            },
        )?;

        Ok(self)
    }

    pub fn with_default_value_of(self, expected: impl Into<DefaultValue>) -> Result<Self> {
        let expected = expected.into();

        ensure(self.column.default_value.as_ref() == Some(&expected), || {
            format!(
                "Default value of {}.{}: expected {expected:?} but was {:?}.",
                self.table.name(),
                self.name(),
                self.column.default_value
            )
        })?;

        Ok(self)
    }

    pub fn without_default_value(self) -> Result<Self> {
        ensure(self.column.default_value.is_none(), || {
            format!(
                "{}.{} should not have a default value, but was {:?}.",
                self.table.name(),
                self.name(),
                self.column.default_value
            )
        })?;

        Ok(self)
    }

    pub fn is_auto_incrementing(self) -> Result<Self> {
        ensure(self.column.auto_increment, || {
            format!(
                "{}.{} should be auto-increment.",
                self.table.name(),
                self.name()
            )
        })?;

        Ok(self)
    }

    pub fn is_not_auto_incrementing(self) -> Result<Self> {
        ensure(!self.column.auto_increment, || {
            format!(
                "{}.{} should not be auto-increment.",
                self.table.name(),
                self.name()
            )
        })?;

        Ok(self)
    }

    /// Membership only; use [`TableAssert::has_primary_key_on`] for the exact
    /// key.
    pub fn is_primary_key(self) -> Result<Self> {
        ensure(self.column.primary_key, || {
            format!(
                "{}.{} should be a primary key member.",
                self.table.name(),
                self.name()
            )
        })?;

        Ok(self)
    }

    pub fn is_primary_key_id_column(self) -> Result<Self> {
        self.supports_id_type()?
            .is_not_nullable()?
            .is_auto_incrementing()?
            .is_primary_key()
    }

    pub fn is_non_auto_incrementing_primary_key(self) -> Result<Self> {
        self.supports_id_type()?
            .is_not_nullable()?
            .is_not_auto_incrementing()?
            .is_primary_key()
    }

    /// Foreign key to `table.id`.
    pub fn has_foreign_key_to(self, table: &str) -> Result<ForeignKeyAssert<'a>> {
        ForeignKeyAssert::new(self, table, ID_COLUMN).is_present()
    }

    pub fn has_foreign_key_to_column(self, table: &str, column: &str) -> Result<ForeignKeyAssert<'a>> {
        reject_id_target(column, "has_foreign_key_to")?;
        ForeignKeyAssert::new(self, table, column).is_present()
    }

    pub fn does_not_have_foreign_key_to(self, table: &str) -> Result<Self> {
        Ok(ForeignKeyAssert::new(self, table, ID_COLUMN)
            .is_not_present()?
            .and_column())
    }

    pub fn does_not_have_foreign_key_to_column(self, table: &str, column: &str) -> Result<Self> {
        reject_id_target(column, "does_not_have_foreign_key_to")?;
        Ok(ForeignKeyAssert::new(self, table, column)
            .is_not_present()?
            .and_column())
    }

    pub fn disable_null_check(self, kind: NullCheckColumnType) -> DisableNullCheckExplanation<'a> {
        DisableNullCheckExplanation::new(self, kind)
    }
}

fn reject_id_target(column: &str, shorthand: &str) -> Result<()> {
    if column == ID_COLUMN {
        return Err(SchemaError::assertion(format!(
            "use {shorthand}(table) when the target column is \"{ID_COLUMN}\""
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{
        assert::{
            fixtures, DisableNullCheckReason, NullCheckColumnType, Phase, SchemaAssert,
        },
        error::SchemaError,
        model::{DefaultValue, NativeType},
        types::{SemanticType, TypeRegistry},
    };

    #[test]
    fn not_null_without_default_fails_on_existing_table() -> anyhow::Result<()> {
        let model = fixtures::shop();
        let registry = TypeRegistry::standard();
        let schema = SchemaAssert::new(&model, &registry, Phase::PostMigration);

        let err = schema
            .has_table("Orders")?
            .has_column("customer_id")?
            .is_not_nullable()
            .unwrap_err();

        assert!(err
            .to_string()
            .starts_with("Problem with column \"Orders.customer_id\""));
        assert!(err.to_string().contains("enter_new_table_assertion_mode()"));

        Ok(())
    }

    #[test]
    fn not_null_passes_in_new_table_mode() -> anyhow::Result<()> {
        let model = fixtures::shop();
        let registry = TypeRegistry::standard();
        let schema = SchemaAssert::new(&model, &registry, Phase::PostMigration);

        schema
            .has_table("Orders")?
            .enter_new_table_assertion_mode()
            .has_column("customer_id")?
            .is_not_nullable()?
            .has_column("amount")?
            .is_not_nullable()?;

        Ok(())
    }

    #[test]
    fn not_null_passes_before_migration() -> anyhow::Result<()> {
        let model = fixtures::shop();
        let registry = TypeRegistry::standard();
        let schema = SchemaAssert::new(&model, &registry, Phase::PreMigration);

        schema
            .has_table("Orders")?
            .has_column("customer_id")?
            .is_not_nullable()?;

        Ok(())
    }

    #[test]
    fn not_null_passes_with_default_or_auto_increment() -> anyhow::Result<()> {
        let model = fixtures::shop();
        let registry = TypeRegistry::standard();
        let schema = SchemaAssert::new(&model, &registry, Phase::PostMigration);
        let customer = schema.has_table("Customer")?;

        customer
            .has_column("active")?
            .is_not_nullable()?
            .with_default_value_of(true)?;
        customer.has_column("id")?.is_primary_key_id_column()?;

        Ok(())
    }

    #[test]
    fn not_null_fails_when_column_is_nullable() -> anyhow::Result<()> {
        let model = fixtures::shop();
        let registry = TypeRegistry::standard();
        let schema = SchemaAssert::new(&model, &registry, Phase::PreMigration);

        let err = schema
            .has_table("Customer")?
            .has_column("nickname")?
            .is_not_nullable()
            .unwrap_err();
        assert_eq!(err.to_string(), "Customer.nickname should be NOT NULL.");

        Ok(())
    }

    #[test]
    fn disabled_null_check_needs_reason_and_approver() -> anyhow::Result<()> {
        let model = fixtures::shop();
        let registry = TypeRegistry::standard();
        let schema = SchemaAssert::new(&model, &registry, Phase::PostMigration);
        let column = schema.has_table("Orders")?.has_column("customer_id")?;

        column
            .disable_null_check(NullCheckColumnType::ExistingColumn)
            .reason(DisableNullCheckReason::CodeCurrentlyInProductionDoesNotWriteNullAndColumnContainsNoNullValues)?
            .checked_by(&["alice"])?
            .is_not_nullable()?;

        let res = column
            .disable_null_check(NullCheckColumnType::ExistingColumn)
            .reason(DisableNullCheckReason::ColumnIsNotNullAndShouldStayThatWay)?
            .checked_by(&[" "]);
        assert!(matches!(res, Err(SchemaError::Configuration(_))));

        // the original value is untouched by a disabled copy
        assert!(column.is_not_nullable().is_err());

        Ok(())
    }

    #[test]
    fn new_column_only_accepts_empty_table_reasons() -> anyhow::Result<()> {
        let model = fixtures::shop();
        let registry = TypeRegistry::standard();
        let schema = SchemaAssert::new(&model, &registry, Phase::PostMigration);
        let column = schema.has_table("Orders")?.has_column("customer_id")?;

        let res = column
            .disable_null_check(NullCheckColumnType::NewColumn)
            .reason(DisableNullCheckReason::ColumnIsNotNullAndShouldStayThatWay);
        assert!(matches!(res, Err(SchemaError::Assertion(_))));

        column
            .disable_null_check(NullCheckColumnType::NewColumn)
            .reason(DisableNullCheckReason::TableNotInProduction)?
            .checked_by(&["bob", "carol"])?
            .is_not_nullable()?;

        Ok(())
    }

    #[test]
    fn foreign_key_shorthand_targets_id() -> anyhow::Result<()> {
        let model = fixtures::shop();
        let registry = TypeRegistry::standard();
        let schema = SchemaAssert::new(&model, &registry, Phase::PostMigration);
        let orders = schema.has_table("Orders")?;

        orders
            .has_column("customer_id")?
            .has_foreign_key_to("Customer")?
            .with_name("fk_orders_customer")?;

        orders
            .has_column("customer_name")?
            .has_foreign_key_to_column("Customer", "name")?
            .and_column()
            .does_not_have_foreign_key_to("Customer")?;

        let err = orders
            .has_column("customer_name")?
            .has_foreign_key_to("Customer")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Foreign key not found for Orders.customer_name -> Customer.id."
        );

        let err = orders
            .has_column("customer_id")?
            .has_foreign_key_to_column("Customer", "id")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "use has_foreign_key_to(table) when the target column is \"id\""
        );

        let err = orders
            .has_column("customer_id")?
            .does_not_have_foreign_key_to_column("Customer", "id")
            .unwrap_err();
        assert!(err.to_string().starts_with("use does_not_have_foreign_key_to"));

        Ok(())
    }

    #[test]
    fn type_support() -> anyhow::Result<()> {
        let model = fixtures::shop();
        let registry = TypeRegistry::standard();
        let schema = SchemaAssert::new(&model, &registry, Phase::PostMigration);
        let orders = schema.has_table("Orders")?;

        orders
            .has_column("amount")?
            .supports_decimal(19, 2)?
            .supports_data_type_with_size_and_scale(NativeType::Decimal, 19, 2)?
            .has_column("customer_name")?
            .supports_type(SemanticType::String)?
            .supports_string_of_at_least(100)?
            .supports_text(255)?;

        assert!(orders
            .has_column("customer_name")?
            .supports_long_string(1000)
            .is_err());
        assert!(matches!(
            orders.has_column("customer_name")?.supports_text(100),
            Err(SchemaError::Configuration(_))
        ));
        assert!(orders
            .has_column("amount")?
            .supports_type(SemanticType::Double)
            .is_err());

        Ok(())
    }

    #[test]
    fn default_value_type_must_match() -> anyhow::Result<()> {
        let model = fixtures::shop();
        let registry = TypeRegistry::standard();
        let schema = SchemaAssert::new(&model, &registry, Phase::PostMigration);
        let active = schema.has_table("Customer")?.has_column("active")?;

        assert!(active.with_default_value_of(1).is_err());
        assert!(active
            .with_default_value_of(DefaultValue::Text("true".to_owned()))
            .is_err());
        assert!(active.without_default_value().is_err());
        schema
            .has_table("Customer")?
            .has_column("nickname")?
            .without_default_value()?
            .is_nullable()?;

        Ok(())
    }
}
