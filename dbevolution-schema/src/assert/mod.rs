mod column;
mod foreign_key;
mod null_check;
mod privilege;
mod schema;
mod table;
mod view;

pub use column::ColumnAssert;
pub use foreign_key::ForeignKeyAssert;
pub use null_check::{
    DisableNullCheckAuthorisation, DisableNullCheckExplanation, DisableNullCheckReason,
    NullCheckColumnType,
};
pub use privilege::{reconcile_privileges, TablePrivilege};
pub use schema::SchemaAssert;
pub use table::TableAssert;
pub use view::{ViewAssert, ViewColumnAssert};

use parse_display::Display;

/// Which side of the migration script a schema snapshot was taken on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display(style = "kebab-case")]
pub enum Phase {
    PreMigration,
    PostMigration,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::model::{Column, ForeignKey, Index, NativeType, SchemaModel, Table, View};

    pub fn shop() -> SchemaModel {
        SchemaModel::new("shop")
            .table(
                Table::new("Customer")
                    .column(
                        Column::new("id", NativeType::BigInt)
                            .size(19)
                            .primary_key()
                            .auto_increment(),
                    )
                    .column(Column::new("name", NativeType::Varchar).size(255).not_null())
                    .column(Column::new("nickname", NativeType::Varchar).size(255))
                    .column(
                        Column::new("active", NativeType::Bit)
                            .size(1)
                            .not_null()
                            .default_value(true),
                    )
                    .index(Index::new("idx_customer_name", &["name"]).unique()),
            )
            .table(
                Table::new("Orders")
                    .column(
                        Column::new("id", NativeType::BigInt)
                            .size(19)
                            .primary_key()
                            .auto_increment(),
                    )
                    .column(Column::new("customer_id", NativeType::BigInt).size(19).not_null())
                    .column(Column::new("customer_name", NativeType::Varchar).size(255))
                    .column(
                        Column::new("amount", NativeType::Decimal)
                            .size(19)
                            .scale(2)
                            .not_null(),
                    )
                    .index(Index::new("idx_orders_customer", &["customer_id", "amount"]))
                    .foreign_key(
                        ForeignKey::new("fk_orders_customer", "Customer")
                            .reference("customer_id", "id"),
                    )
                    .foreign_key(
                        ForeignKey::new("fk_orders_customer_name", "Customer")
                            .reference("customer_name", "name"),
                    ),
            )
            .table(
                Table::new("OrderLine")
                    .column(Column::new("order_id", NativeType::BigInt).size(19).primary_key())
                    .column(Column::new("line", NativeType::Integer).size(10).primary_key()),
            )
            .view(
                View::new("CustomerOrders")
                    .column("customer", NativeType::Varchar)
                    .column("total", NativeType::Decimal),
            )
    }
}
