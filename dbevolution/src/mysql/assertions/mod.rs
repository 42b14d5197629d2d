mod data;
mod privilege;

pub use data::{assert_that_table, DataAssert};
pub use privilege::{assert_that_user, PrivilegeAssert};
