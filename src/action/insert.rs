use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    changelog::resolver::{ChangelogLocation, DocumentResolver},
    db::Collection,
    error::{ChangeValidationError, Result},
    fingerprint::{fingerprint_document, fingerprint_documents},
    types::{Document, ID_FIELD},
};

use super::{ChangeAction, DeleteOne, ExecutionResult, ResolvedPayload, ValidatedChange, source};

/// Inserts one inline or external document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOne {
    /// Inline document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Document>,
    /// Path of a JSON file holding the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_document_path: Option<String>,
    /// Resolve `external_document_path` against the changelog's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_to_changelog: Option<bool>,
}

impl InsertOne {
    /// Inline insert of `document`.
    pub fn of(document: Document) -> Self {
        Self {
            document: Some(document),
            ..Self::default()
        }
    }

    pub(super) fn validate(
        &self,
        resolver: &DocumentResolver,
        location: &ChangelogLocation,
    ) -> std::result::Result<ValidatedChange, ChangeValidationError> {
        let document = source::single_document(
            self.document.as_ref(),
            self.external_document_path.as_deref(),
            self.relative_to_changelog,
            resolver,
            location,
        )?;
        Ok(ValidatedChange {
            hash: fingerprint_document(&document),
            payload: ResolvedPayload::InsertOne { document },
        })
    }
}

/// Inserts a non-empty list of inline or external documents.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertMany {
    /// Inline documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<Document>>,
    /// Path of a JSON file holding an array of documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_documents_path: Option<String>,
    /// Resolve `external_documents_path` against the changelog's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_to_changelog: Option<bool>,
}

impl InsertMany {
    pub(super) fn validate(
        &self,
        resolver: &DocumentResolver,
        location: &ChangelogLocation,
    ) -> std::result::Result<ValidatedChange, ChangeValidationError> {
        let documents = source::multiple_documents(
            self.documents.as_ref(),
            self.external_documents_path.as_deref(),
            self.relative_to_changelog,
            resolver,
            location,
        )?;
        if documents.is_empty() {
            return Err(ChangeValidationError::new("insertMany documents must not be empty"));
        }
        Ok(ValidatedChange {
            hash: fingerprint_documents(&documents),
            payload: ResolvedPayload::InsertMany { documents },
        })
    }
}

pub(super) fn insert_one(collection: &dyn Collection, document: &Document) -> Result<ExecutionResult> {
    let id = collection.insert_one(document.clone())?;
    let rollback = (!id.is_null()).then(|| {
        // String ids are matched literally, never coerced to object ids.
        let id = match id {
            Value::String(_) => json!({ "$eq": id }),
            other => other,
        };
        let mut filter = Document::new();
        filter.insert(ID_FIELD.to_string(), id);
        ChangeAction::DeleteOne(DeleteOne {
            filter,
            fail_without_delete: Some(true),
        })
    });
    Ok(ExecutionResult { rollback })
}

/// Bulk inserts record no inverse.
pub(super) fn insert_many(collection: &dyn Collection, documents: &[Document]) -> Result<ExecutionResult> {
    let ids = collection.insert_many(documents.to_vec())?;
    log::debug!("inserted {} documents into {}", ids.len(), collection.name());
    Ok(ExecutionResult::default())
}
