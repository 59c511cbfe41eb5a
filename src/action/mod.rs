//! Change actions: the closed set of mutations a change set can carry.
//!
//! Every action goes through two phases. [`ChangeAction::validate`] checks
//! the action's own rules, resolves external documents and fingerprints the
//! result, producing a [`ValidatedChange`]. [`ValidatedChange::execute`] then
//! runs the resolved payload against a collection and returns the inverse
//! action when one can be derived.

mod delete;
mod index;
mod insert;
mod source;
mod update;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    changelog::resolver::{ChangelogLocation, DocumentResolver},
    db::{Collection, IndexOptions},
    error::{ChangeValidationError, Result},
    fingerprint::Hash,
    object_id::ObjectId,
    types::{Document, ID_FIELD},
};

pub use delete::DeleteOne;
pub use index::{CreateIndex, DropIndex};
pub use insert::{InsertMany, InsertOne};
pub use update::{UpdateMany, UpdateOne};

/// One declarative mutation, tagged by `"action"` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ChangeAction {
    /// Insert one document.
    InsertOne(InsertOne),
    /// Insert a non-empty list of documents.
    InsertMany(InsertMany),
    /// Update the first document matching a filter.
    UpdateOne(UpdateOne),
    /// Update every document matching a filter.
    UpdateMany(UpdateMany),
    /// Delete the first document matching a filter.
    DeleteOne(DeleteOne),
    /// Create an index.
    CreateIndex(CreateIndex),
    /// Drop an index by name or by key specification.
    DropIndex(DropIndex),
}

/// Wire discriminators, in declaration order.
pub const ACTION_NAMES: [&str; 7] = [
    "insertOne",
    "insertMany",
    "updateOne",
    "updateMany",
    "deleteOne",
    "createIndex",
    "dropIndex",
];

impl ChangeAction {
    /// Wire discriminator of this action.
    pub fn name(&self) -> &'static str {
        match self {
            Self::InsertOne(_) => ACTION_NAMES[0],
            Self::InsertMany(_) => ACTION_NAMES[1],
            Self::UpdateOne(_) => ACTION_NAMES[2],
            Self::UpdateMany(_) => ACTION_NAMES[3],
            Self::DeleteOne(_) => ACTION_NAMES[4],
            Self::CreateIndex(_) => ACTION_NAMES[5],
            Self::DropIndex(_) => ACTION_NAMES[6],
        }
    }

    /// Checks the action's rules, resolves external documents relative to
    /// `location` where requested and fingerprints the resolved payload.
    pub fn validate(
        &self,
        resolver: &DocumentResolver,
        location: &ChangelogLocation,
    ) -> std::result::Result<ValidatedChange, ChangeValidationError> {
        match self {
            Self::InsertOne(a) => a.validate(resolver, location),
            Self::InsertMany(a) => a.validate(resolver, location),
            Self::UpdateOne(a) => a.validate(resolver, location),
            Self::UpdateMany(a) => a.validate(resolver, location),
            Self::DeleteOne(a) => a.validate(),
            Self::CreateIndex(a) => a.validate(),
            Self::DropIndex(a) => a.validate(),
        }
    }
}

/// Result of validation: the fingerprint plus everything execution needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedChange {
    /// Fingerprint recorded in the audit record.
    pub hash: Hash,
    /// Resolved payload, independent of the raw action.
    pub payload: ResolvedPayload,
}

/// Execution input with external references already resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedPayload {
    /// See [`InsertOne`].
    InsertOne {
        /// Document to insert.
        document: Document,
    },
    /// See [`InsertMany`].
    InsertMany {
        /// Documents to insert, in order.
        documents: Vec<Document>,
    },
    /// See [`UpdateOne`].
    UpdateOne {
        /// Replacement or operator document.
        document: Document,
        /// Raw filter as written in the changelog.
        filter: Document,
        /// Reject when nothing matched.
        fail_without_update: bool,
    },
    /// See [`UpdateMany`].
    UpdateMany {
        /// Operator document; plain fields are applied as `$set`.
        document: Document,
        /// Raw filter as written in the changelog.
        filter: Document,
        /// Reject when nothing was modified.
        fail_without_update: bool,
        /// Reject when the modified count differs; `None` disables the check.
        expected_modified_count: Option<i64>,
    },
    /// See [`DeleteOne`].
    DeleteOne {
        /// Raw filter as written in the changelog.
        filter: Document,
        /// Reject when nothing matched.
        fail_without_delete: bool,
    },
    /// See [`CreateIndex`].
    CreateIndex {
        /// Index key specification.
        keys: Document,
        /// Parsed options, when given.
        options: Option<IndexOptions>,
    },
    /// See [`DropIndex`].
    DropIndex(IndexTarget),
}

/// How [`DropIndex`] identifies its index.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexTarget {
    /// By index name.
    Name(String),
    /// By key specification.
    Keys(Document),
}

/// Outcome of executing an action.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutionResult {
    /// Inverse action, when one can be derived.
    pub rollback: Option<ChangeAction>,
}

impl ValidatedChange {
    /// Runs the resolved payload against `collection`.
    pub fn execute(&self, collection: &dyn Collection) -> Result<ExecutionResult> {
        match &self.payload {
            ResolvedPayload::InsertOne { document } => insert::insert_one(collection, document),
            ResolvedPayload::InsertMany { documents } => insert::insert_many(collection, documents),
            ResolvedPayload::UpdateOne {
                document,
                filter,
                fail_without_update,
            } => update::update_one(collection, document, filter, *fail_without_update),
            ResolvedPayload::UpdateMany {
                document,
                filter,
                fail_without_update,
                expected_modified_count,
            } => update::update_many(
                collection,
                document,
                filter,
                *fail_without_update,
                *expected_modified_count,
            ),
            ResolvedPayload::DeleteOne {
                filter,
                fail_without_delete,
            } => delete::delete_one(collection, filter, *fail_without_delete),
            ResolvedPayload::CreateIndex { keys, options } => {
                index::create_index(collection, keys, options.as_ref())
            }
            ResolvedPayload::DropIndex(target) => index::drop_index(collection, target),
        }
    }
}

/// Coerces a string `_id` that is a valid object-id literal into the native
/// identifier, so authors can write ids as plain strings.
pub fn process_filter(filter: &Document) -> Document {
    let mut out = filter.clone();
    if let Some(Value::String(literal)) = filter.get(ID_FIELD) {
        if let Ok(oid) = literal.parse::<ObjectId>() {
            out.insert(ID_FIELD.to_string(), oid.to_value());
        }
    }
    out
}

fn require_filter(filter: &Document, action: &str) -> std::result::Result<(), ChangeValidationError> {
    if filter.is_empty() {
        return Err(ChangeValidationError::new(format!(
            "filter is required for {action} action"
        )));
    }
    Ok(())
}
