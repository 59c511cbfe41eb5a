use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    changelog::resolver::{ChangelogLocation, DocumentResolver},
    db::{Collection, query},
    error::{ChangeValidationError, Result},
    fingerprint::fingerprint_documents,
    types::Document,
};

use super::{
    ChangeAction, ExecutionResult, ResolvedPayload, ValidatedChange, process_filter, require_filter,
    source,
};

const NO_MATCH: &str =
    "no document matched the filter and change.failWithoutUpdate is true (default is true)";

/// Updates (or replaces) the first document matching `filter`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOne {
    /// Inline operator or replacement document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Document>,
    /// Path of a JSON file holding the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_document_path: Option<String>,
    /// Selects the document to update.
    pub filter: Document,
    /// Reject when nothing matched; `None` means `true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_without_update: Option<bool>,
    /// Resolve `external_document_path` against the changelog's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_to_changelog: Option<bool>,
}

impl UpdateOne {
    pub(super) fn validate(
        &self,
        resolver: &DocumentResolver,
        location: &ChangelogLocation,
    ) -> std::result::Result<ValidatedChange, ChangeValidationError> {
        require_filter(&self.filter, "updateOne")?;
        let document = source::single_document(
            self.document.as_ref(),
            self.external_document_path.as_deref(),
            self.relative_to_changelog,
            resolver,
            location,
        )?;
        Ok(ValidatedChange {
            hash: fingerprint_documents([&document, &self.filter]),
            payload: ResolvedPayload::UpdateOne {
                document,
                filter: self.filter.clone(),
                fail_without_update: self.fail_without_update.unwrap_or(true),
            },
        })
    }
}

/// Updates every document matching `filter`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMany {
    /// Inline operator document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Document>,
    /// Path of a JSON file holding the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_document_path: Option<String>,
    /// Selects the documents to update.
    pub filter: Document,
    /// Reject when nothing was modified; `None` means `true`.
    ///
    /// "Matched" is measured by the modified count: documents that match but
    /// already hold the new values count as no match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_without_update: Option<bool>,
    /// Reject when the modified count differs. `None` or `-1` disables the check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_modified_count: Option<i64>,
    /// Resolve `external_document_path` against the changelog's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_to_changelog: Option<bool>,
}

impl UpdateMany {
    pub(super) fn validate(
        &self,
        resolver: &DocumentResolver,
        location: &ChangelogLocation,
    ) -> std::result::Result<ValidatedChange, ChangeValidationError> {
        require_filter(&self.filter, "updateMany")?;
        let document = source::single_document(
            self.document.as_ref(),
            self.external_document_path.as_deref(),
            self.relative_to_changelog,
            resolver,
            location,
        )?;
        Ok(ValidatedChange {
            hash: fingerprint_documents([&document, &self.filter]),
            payload: ResolvedPayload::UpdateMany {
                document,
                filter: self.filter.clone(),
                fail_without_update: self.fail_without_update.unwrap_or(true),
                expected_modified_count: self.expected_modified_count.filter(|count| *count != -1),
            },
        })
    }
}

pub(super) fn update_one(
    collection: &dyn Collection,
    document: &Document,
    filter: &Document,
    fail_without_update: bool,
) -> Result<ExecutionResult> {
    let original = collection.find_one_and_update(&process_filter(filter), document)?;
    let Some(original) = original else {
        if fail_without_update {
            return Err(ChangeValidationError::new(NO_MATCH).into());
        }
        return Ok(ExecutionResult::default());
    };
    let rollback = ChangeAction::UpdateOne(UpdateOne {
        document: Some(original),
        filter: filter.clone(),
        ..UpdateOne::default()
    });
    Ok(ExecutionResult {
        rollback: Some(rollback),
    })
}

/// Multi-document updates record no inverse.
pub(super) fn update_many(
    collection: &dyn Collection,
    document: &Document,
    filter: &Document,
    fail_without_update: bool,
    expected_modified_count: Option<i64>,
) -> Result<ExecutionResult> {
    let update = if query::is_operator_update(document) {
        document.clone()
    } else {
        let mut set = Document::new();
        set.insert("$set".to_string(), Value::Object(document.clone()));
        set
    };
    let result = collection.update_many(&process_filter(filter), &update)?;
    if fail_without_update && result.modified == 0 {
        return Err(ChangeValidationError::new(NO_MATCH).into());
    }
    if let Some(expected) = expected_modified_count {
        if i64::try_from(result.modified).ok() != Some(expected) {
            return Err(ChangeValidationError::new(format!(
                "expected modified count {expected} but actual modified count {}",
                result.modified
            ))
            .into());
        }
    }
    Ok(ExecutionResult::default())
}
