use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    db::{Collection, IndexOptions},
    error::{ChangeValidationError, Result},
    fingerprint::{fingerprint_bytes, fingerprint_document, fingerprint_documents},
    types::Document,
};

use super::{ChangeAction, ExecutionResult, IndexTarget, ResolvedPayload, ValidatedChange};

/// Creates an index on the target collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIndex {
    /// Key specification, e.g. `{"email": 1}`.
    pub keys: Document,
    /// Subset of `{unique, name, sparse, hidden}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Document>,
}

impl CreateIndex {
    pub(super) fn validate(&self) -> std::result::Result<ValidatedChange, ChangeValidationError> {
        if self.keys.is_empty() {
            return Err(ChangeValidationError::new("keys is required for createIndex action"));
        }
        let (hash, options) = match &self.options {
            Some(options) => (
                fingerprint_documents([&self.keys, options]),
                Some(parse_options(options)?),
            ),
            None => (fingerprint_document(&self.keys), None),
        };
        Ok(ValidatedChange {
            hash,
            payload: ResolvedPayload::CreateIndex {
                keys: self.keys.clone(),
                options,
            },
        })
    }
}

fn parse_options(options: &Document) -> std::result::Result<IndexOptions, ChangeValidationError> {
    let flag = |key: &str| match options.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(ChangeValidationError::new(format!(
            "change.options.{key} must be a boolean"
        ))),
    };
    let name = match options.get("name") {
        None | Some(Value::Null) => None,
        Some(Value::String(name)) if !name.trim().is_empty() => Some(name.clone()),
        Some(_) => {
            return Err(ChangeValidationError::new(
                "change.options.name must be a non-blank string",
            ));
        }
    };
    Ok(IndexOptions {
        name,
        unique: flag("unique")?,
        sparse: flag("sparse")?,
        hidden: flag("hidden")?,
    })
}

/// Drops an index by name or by key specification (exactly one).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropIndex {
    /// Index name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Key specification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Document>,
}

impl DropIndex {
    pub(super) fn validate(&self) -> std::result::Result<ValidatedChange, ChangeValidationError> {
        let target = match (&self.name, &self.keys) {
            (Some(_), Some(_)) => {
                return Err(ChangeValidationError::new(
                    "only the change.name or the change.keys can be specified (not both)",
                ));
            }
            (None, None) => {
                return Err(ChangeValidationError::new(
                    "either change.name or change.keys must be provided",
                ));
            }
            (None, Some(keys)) if keys.is_empty() => {
                return Err(ChangeValidationError::new("change.keys must not be empty"));
            }
            (None, Some(keys)) => IndexTarget::Keys(keys.clone()),
            (Some(name), None) => IndexTarget::Name(name.clone()),
        };
        let hash = match &target {
            IndexTarget::Name(name) => fingerprint_bytes(name.as_bytes()),
            IndexTarget::Keys(keys) => fingerprint_document(keys),
        };
        Ok(ValidatedChange {
            hash,
            payload: ResolvedPayload::DropIndex(target),
        })
    }
}

pub(super) fn create_index(
    collection: &dyn Collection,
    keys: &Document,
    options: Option<&IndexOptions>,
) -> Result<ExecutionResult> {
    let name = collection.create_index(keys, &options.cloned().unwrap_or_default())?;
    log::debug!("created index {name} on {}", collection.name());
    Ok(ExecutionResult {
        rollback: Some(ChangeAction::DropIndex(DropIndex {
            name: Some(name),
            keys: None,
        })),
    })
}

/// Dropping by name cannot be inverted: the key specification is unknown.
pub(super) fn drop_index(collection: &dyn Collection, target: &IndexTarget) -> Result<ExecutionResult> {
    match target {
        IndexTarget::Name(name) => {
            collection.drop_index(name)?;
            Ok(ExecutionResult::default())
        }
        IndexTarget::Keys(keys) => {
            collection.drop_index_by_keys(keys)?;
            Ok(ExecutionResult {
                rollback: Some(ChangeAction::CreateIndex(CreateIndex {
                    keys: keys.clone(),
                    options: None,
                })),
            })
        }
    }
}
