use parse_display::Display;

use super::ColumnAssert;
use crate::error::{Result, SchemaError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display(style = "SNAKE_CASE")]
pub enum NullCheckColumnType {
    ExistingColumn,
    NewColumn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display(style = "SNAKE_CASE")]
pub enum DisableNullCheckReason {
    CodeCurrentlyInProductionDoesNotWriteNullAndColumnContainsNoNullValues,
    CodeCurrentlyInProductionDoesNotWriteNullAndScriptEliminatesExistingNulls,
    TableIsEmptyInProductionAndWillRemainEmptyUntilThisIsDeployed,
    ColumnIsNotNullAndShouldStayThatWay,
    TableNotInProduction,
}

impl DisableNullCheckReason {
    fn allowed_for_new_column(&self) -> bool {
        matches!(
            self,
            Self::TableIsEmptyInProductionAndWillRemainEmptyUntilThisIsDeployed
                | Self::TableNotInProduction
        )
    }
}

/// First step of disabling the NOT NULL safety rule: a reason is required.
#[derive(Debug, Clone, Copy)]
#[must_use = "the null check stays enabled until a reason and an approver are given"]
pub struct DisableNullCheckExplanation<'a> {
    column: ColumnAssert<'a>,
    kind: NullCheckColumnType,
}

impl<'a> DisableNullCheckExplanation<'a> {
    pub(crate) fn new(column: ColumnAssert<'a>, kind: NullCheckColumnType) -> Self {
        Self { column, kind }
    }

    pub fn reason(self, reason: DisableNullCheckReason) -> Result<DisableNullCheckAuthorisation<'a>> {
        if self.kind == NullCheckColumnType::NewColumn && !reason.allowed_for_new_column() {
            return Err(SchemaError::assertion(format!(
                "The null check cannot be disabled for new column {}.{} with reason {reason}: a NOT NULL column \
                 without a default in a populated table breaks when the code is rolled back. Make it nullable \
                 or give it a sensible default.",
                self.column.table_name(),
                self.column.name()
            )));
        }

        Ok(DisableNullCheckAuthorisation {
            column: self.column,
            reason,
        })
    }
}

/// Second step: at least one named approver.
#[derive(Debug, Clone, Copy)]
#[must_use = "the null check stays enabled until an approver is given"]
pub struct DisableNullCheckAuthorisation<'a> {
    column: ColumnAssert<'a>,
    reason: DisableNullCheckReason,
}

impl<'a> DisableNullCheckAuthorisation<'a> {
    pub fn reason(&self) -> DisableNullCheckReason {
        self.reason
    }

    pub fn checked_by(self, approvers: &[&str]) -> Result<ColumnAssert<'a>> {
        if approvers.iter().all(|a| a.trim().is_empty()) {
            return Err(SchemaError::configuration(format!(
                "disabling the null check on {}.{} needs at least one named approver",
                self.column.table_name(),
                self.column.name()
            )));
        }

        tracing::debug!(
            "null check disabled on {}.{} ({}), checked by {}",
            self.column.table_name(),
            self.column.name(),
            self.reason,
            approvers.join(", ")
        );

        Ok(self.column.with_null_check_disabled())
    }
}
