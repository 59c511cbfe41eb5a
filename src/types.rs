//! Shared primitive aliases and reserved names.

use serde_json::{Map, Value};

/// A document: an ordered JSON object.
pub type Document = Map<String, Value>;

/// Name of the reserved collection holding the audit records.
pub const CHANGELOG_COLLECTION_NAME: &str = "database_changelog";

/// Identity field of every stored document.
pub const ID_FIELD: &str = "_id";

/// Source sentinel meaning "read the single changelog from standard input".
pub const STDIN_SOURCE: &str = "-";
