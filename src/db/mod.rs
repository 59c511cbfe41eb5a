//! Document database interface the change actions run against.

/// Connection targets and the connect handshake.
pub mod connection;
/// Filter matching and update application.
pub mod query;
/// SQLite-backed store.
pub mod sqlite;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Document;

/// Document store failure.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// SQLite failed.
    #[error("storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored body is not valid JSON.
    #[error("document encoding error: {0}")]
    Serde(#[from] serde_json::Error),
    /// A unique index or the identity was violated.
    #[error("duplicate key error collection: {collection} index: {index} dup key: {key}")]
    DuplicateKey {
        /// Collection written to.
        collection: String,
        /// Violated index.
        index: String,
        /// Clashing key.
        key: String,
    },
    /// No index with that name.
    #[error("index not found with name [{0}]")]
    IndexNotFound(String),
    /// No index with that key specification.
    #[error("can't find index with key: {0}")]
    IndexKeysNotFound(String),
    /// Same name, different definition.
    #[error("index conflict: {0}")]
    IndexConflict(String),
    /// Malformed filter.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    /// Malformed or illegal update.
    #[error("invalid update: {0}")]
    InvalidUpdate(String),
    /// Anything else.
    #[error("{0}")]
    Message(String),
}

/// Result alias for the document store.
pub type DbResult<T> = Result<T, DbError>;

/// Index creation options, the subset of `{unique, name, sparse, hidden}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOptions {
    /// Explicit name; generated from the keys when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Reject duplicate keys.
    #[serde(default)]
    pub unique: bool,
    /// Skip documents lacking every indexed field.
    #[serde(default)]
    pub sparse: bool,
    /// Recorded only.
    #[serde(default)]
    pub hidden: bool,
}

/// A persisted index definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,
    /// Key specification.
    pub keys: Document,
    /// Options it was created with.
    pub options: IndexOptions,
}

/// Outcome of a multi-document update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateResult {
    /// Documents matching the filter.
    pub matched: u64,
    /// Documents whose body changed.
    pub modified: u64,
}

/// Conventional document-collection API the change actions run against.
pub trait Collection {
    /// Collection name.
    fn name(&self) -> &str;

    /// Inserts `document`, generating an `_id` when absent. Returns the id.
    fn insert_one(&self, document: Document) -> DbResult<Value>;

    /// Inserts all documents in order; all or none are stored.
    fn insert_many(&self, documents: Vec<Document>) -> DbResult<Vec<Value>>;

    /// All matches in insertion order.
    fn find(&self, filter: &Document) -> DbResult<Vec<Document>>;

    /// Number of matches.
    fn count(&self, filter: &Document) -> DbResult<u64> {
        Ok(self.find(filter)?.len() as u64)
    }

    /// Applies `update` to the first match and returns its pre-update image.
    fn find_one_and_update(&self, filter: &Document, update: &Document) -> DbResult<Option<Document>>;

    /// Applies `update` to every match.
    fn update_many(&self, filter: &Document, update: &Document) -> DbResult<UpdateResult>;

    /// Deletes the first match and returns it.
    fn find_one_and_delete(&self, filter: &Document) -> DbResult<Option<Document>>;

    /// Creates an index and returns its (possibly generated) name.
    fn create_index(&self, keys: &Document, options: &IndexOptions) -> DbResult<String>;

    /// Drops the index called `name`.
    fn drop_index(&self, name: &str) -> DbResult<()>;

    /// Drops the index with exactly these keys.
    fn drop_index_by_keys(&self, keys: &Document) -> DbResult<()>;

    /// Indexes in creation order.
    fn list_indexes(&self) -> DbResult<Vec<IndexInfo>>;
}

/// A database: a namespace of collections sharing one connection.
pub trait DocumentStore {
    /// Database name.
    fn name(&self) -> &str;

    /// Handle to collection `name`; it need not exist yet.
    fn collection<'a>(&'a self, name: &str) -> Box<dyn Collection + 'a>;
}

/// Default index name, e.g. `{"a": 1, "b": -1}` → `a_1_b_-1`.
pub fn default_index_name(keys: &Document) -> String {
    keys.iter()
        .map(|(field, direction)| {
            let direction = match direction {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("{field}_{direction}")
        })
        .collect::<Vec<_>>()
        .join("_")
}
