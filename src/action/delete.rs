use serde::{Deserialize, Serialize};

use crate::{
    db::Collection,
    error::{ChangeValidationError, Result},
    fingerprint::fingerprint_document,
    types::Document,
};

use super::{
    ChangeAction, ExecutionResult, InsertOne, ResolvedPayload, ValidatedChange, process_filter,
    require_filter,
};

/// Deletes the first document matching `filter`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOne {
    /// Selects the document to delete; must not be empty.
    pub filter: Document,
    /// Reject when nothing matched; `None` means `true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_without_delete: Option<bool>,
}

impl DeleteOne {
    pub(super) fn validate(&self) -> std::result::Result<ValidatedChange, ChangeValidationError> {
        require_filter(&self.filter, "deleteOne")?;
        Ok(ValidatedChange {
            hash: fingerprint_document(&self.filter),
            payload: ResolvedPayload::DeleteOne {
                filter: self.filter.clone(),
                fail_without_delete: self.fail_without_delete.unwrap_or(true),
            },
        })
    }
}

pub(super) fn delete_one(
    collection: &dyn Collection,
    filter: &Document,
    fail_without_delete: bool,
) -> Result<ExecutionResult> {
    match collection.find_one_and_delete(&process_filter(filter))? {
        Some(original) => Ok(ExecutionResult {
            rollback: Some(ChangeAction::InsertOne(InsertOne::of(original))),
        }),
        None if fail_without_delete => Err(ChangeValidationError::new(
            "no document matched the filter and change.failWithoutDelete is true (default is true)",
        )
        .into()),
        None => Ok(ExecutionResult::default()),
    }
}
