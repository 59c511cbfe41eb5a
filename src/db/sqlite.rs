//! SQLite-backed document store.
//!
//! Every collection lives in one `documents` table keyed by
//! `(collection, doc_id)`, where `doc_id` is the canonical JSON of the
//! document's `_id`. The autoincrement `seq` column gives insertion order.

use std::{path::Path, time::Duration};

use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use crate::{
    fingerprint::canonical_json,
    object_id::ObjectId,
    types::{Document, ID_FIELD},
};

use super::{
    Collection, DbError, DbResult, DocumentStore, IndexInfo, IndexOptions, UpdateResult,
    default_index_name,
    query::{apply_update, lookup, matches, values_equal},
};

/// A database backed by one SQLite file (or memory).
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    name: String,
}

impl SqliteStore {
    /// Opens or creates the database file at `path`.
    ///
    /// `busy_timeout` bounds how long any statement waits for a lock held by
    /// another connection.
    pub fn open(path: impl AsRef<Path>, name: &str, busy_timeout: Duration) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        Self::init_connection(conn, name)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory(name: &str) -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn, name)
    }

    fn init_connection(conn: Connection, name: &str) -> DbResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self {
            conn,
            name: name.to_string(),
        })
    }

    /// Takes and releases the write lock once, proving the database is writable.
    pub fn handshake(&self) -> DbResult<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE; COMMIT;")?;
        Ok(())
    }

    /// Names of the collections holding at least one document or index.
    pub fn collection_names(&self) -> DbResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT collection FROM documents UNION SELECT collection FROM indexes ORDER BY 1",
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

impl DocumentStore for SqliteStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn collection<'a>(&'a self, name: &str) -> Box<dyn Collection + 'a> {
        Box::new(SqliteCollection {
            conn: &self.conn,
            name: name.to_string(),
        })
    }
}

/// Handle to one collection of a [`SqliteStore`].
pub struct SqliteCollection<'a> {
    conn: &'a Connection,
    name: String,
}

impl SqliteCollection<'_> {
    fn rows(&self) -> DbResult<Vec<(i64, Document)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT seq, body FROM documents WHERE collection = ?1 ORDER BY seq ASC")?;
        let rows = stmt.query_map(params![self.name], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (seq, body) = row?;
            out.push((seq, serde_json::from_str(&body)?));
        }
        Ok(out)
    }

    fn matching(&self, filter: &Document) -> DbResult<Vec<(i64, Document)>> {
        let mut out = Vec::new();
        for (seq, doc) in self.rows()? {
            if matches(&doc, filter)? {
                out.push((seq, doc));
            }
        }
        Ok(out)
    }

    fn first_match(&self, filter: &Document) -> DbResult<Option<(i64, Document)>> {
        for (seq, doc) in self.rows()? {
            if matches(&doc, filter)? {
                return Ok(Some((seq, doc)));
            }
        }
        Ok(None)
    }

    fn insert_row(&self, document: Document, indexes: &[IndexInfo]) -> DbResult<Value> {
        let (id, document) = with_id(document);
        let doc_id = canonical_json(&id);
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT seq FROM documents WHERE collection = ?1 AND doc_id = ?2",
                params![self.name, doc_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(DbError::DuplicateKey {
                collection: self.name.clone(),
                index: "_id_".to_string(),
                key: doc_id,
            });
        }
        self.check_unique(&document, None, indexes)?;

        self.conn.execute(
            "INSERT INTO documents(collection, doc_id, body) VALUES (?1, ?2, ?3)",
            params![self.name, doc_id, serde_json::to_string(&document)?],
        )?;
        Ok(id)
    }

    fn replace_row(&self, seq: i64, document: &Document, indexes: &[IndexInfo]) -> DbResult<()> {
        self.check_unique(document, Some(seq), indexes)?;
        self.conn.execute(
            "UPDATE documents SET body = ?1 WHERE seq = ?2",
            params![serde_json::to_string(document)?, seq],
        )?;
        Ok(())
    }

    fn check_unique(&self, document: &Document, skip_seq: Option<i64>, indexes: &[IndexInfo]) -> DbResult<()> {
        let unique: Vec<&IndexInfo> = indexes.iter().filter(|i| i.options.unique).collect();
        if unique.is_empty() {
            return Ok(());
        }
        let rows = self.rows()?;
        for index in unique {
            let Some(key) = index_key(document, index) else {
                continue;
            };
            let clash = rows
                .iter()
                .filter(|(seq, _)| Some(*seq) != skip_seq)
                .filter_map(|(_, other)| index_key(other, index))
                .any(|other| keys_equal(&key, &other));
            if clash {
                return Err(DbError::DuplicateKey {
                    collection: self.name.clone(),
                    index: index.name.clone(),
                    key: Value::Array(key).to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Collection for SqliteCollection<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn insert_one(&self, document: Document) -> DbResult<Value> {
        let indexes = self.list_indexes()?;
        self.insert_row(document, &indexes)
    }

    fn insert_many(&self, documents: Vec<Document>) -> DbResult<Vec<Value>> {
        let indexes = self.list_indexes()?;
        let tx = self.conn.unchecked_transaction()?;
        let mut ids = Vec::with_capacity(documents.len());
        for document in documents {
            ids.push(self.insert_row(document, &indexes)?);
        }
        tx.commit()?;
        Ok(ids)
    }

    fn find(&self, filter: &Document) -> DbResult<Vec<Document>> {
        Ok(self.matching(filter)?.into_iter().map(|(_, doc)| doc).collect())
    }

    fn find_one_and_update(&self, filter: &Document, update: &Document) -> DbResult<Option<Document>> {
        let indexes = self.list_indexes()?;
        let tx = self.conn.unchecked_transaction()?;
        let Some((seq, original)) = self.first_match(filter)? else {
            return Ok(None);
        };
        let updated = apply_update(&original, update)?;
        self.replace_row(seq, &updated, &indexes)?;
        tx.commit()?;
        Ok(Some(original))
    }

    fn update_many(&self, filter: &Document, update: &Document) -> DbResult<UpdateResult> {
        let indexes = self.list_indexes()?;
        let tx = self.conn.unchecked_transaction()?;
        let mut result = UpdateResult::default();
        for (seq, original) in self.matching(filter)? {
            result.matched += 1;
            let updated = apply_update(&original, update)?;
            if updated != original {
                self.replace_row(seq, &updated, &indexes)?;
                result.modified += 1;
            }
        }
        tx.commit()?;
        Ok(result)
    }

    fn find_one_and_delete(&self, filter: &Document) -> DbResult<Option<Document>> {
        let tx = self.conn.unchecked_transaction()?;
        let Some((seq, original)) = self.first_match(filter)? else {
            return Ok(None);
        };
        self.conn
            .execute("DELETE FROM documents WHERE seq = ?1", params![seq])?;
        tx.commit()?;
        Ok(Some(original))
    }

    fn create_index(&self, keys: &Document, options: &IndexOptions) -> DbResult<String> {
        if keys.is_empty() {
            return Err(DbError::IndexConflict("index keys must not be empty".to_string()));
        }
        let name = options
            .name
            .clone()
            .unwrap_or_else(|| default_index_name(keys));
        let keys_json = serde_json::to_string(keys)?;

        for existing in self.list_indexes()? {
            let same_keys = serde_json::to_string(&existing.keys)? == keys_json;
            if existing.name == name {
                let stored = IndexOptions {
                    name: Some(name.clone()),
                    ..options.clone()
                };
                let existing_opts = IndexOptions {
                    name: Some(existing.name.clone()),
                    ..existing.options.clone()
                };
                if same_keys && stored == existing_opts {
                    return Ok(name);
                }
                return Err(DbError::IndexConflict(format!(
                    "an index named '{name}' already exists with different keys or options"
                )));
            }
            if same_keys {
                return Err(DbError::IndexConflict(format!(
                    "index with keys {keys_json} already exists with a different name: {}",
                    existing.name
                )));
            }
        }

        let info = IndexInfo {
            name: name.clone(),
            keys: keys.clone(),
            options: IndexOptions {
                name: Some(name.clone()),
                ..options.clone()
            },
        };
        if info.options.unique {
            let mut seen: Vec<Vec<Value>> = Vec::new();
            for (_, doc) in self.rows()? {
                let Some(key) = index_key(&doc, &info) else {
                    continue;
                };
                if seen.iter().any(|other| keys_equal(other, &key)) {
                    return Err(DbError::DuplicateKey {
                        collection: self.name.clone(),
                        index: name,
                        key: Value::Array(key).to_string(),
                    });
                }
                seen.push(key);
            }
        }

        self.conn.execute(
            "INSERT INTO indexes(collection, name, keys, options) VALUES (?1, ?2, ?3, ?4)",
            params![self.name, name, keys_json, serde_json::to_string(&info.options)?],
        )?;
        Ok(name)
    }

    fn drop_index(&self, name: &str) -> DbResult<()> {
        let removed = self.conn.execute(
            "DELETE FROM indexes WHERE collection = ?1 AND name = ?2",
            params![self.name, name],
        )?;
        if removed == 0 {
            return Err(DbError::IndexNotFound(name.to_string()));
        }
        Ok(())
    }

    fn drop_index_by_keys(&self, keys: &Document) -> DbResult<()> {
        let keys_json = serde_json::to_string(keys)?;
        for existing in self.list_indexes()? {
            if serde_json::to_string(&existing.keys)? == keys_json {
                return self.drop_index(&existing.name);
            }
        }
        Err(DbError::IndexKeysNotFound(keys_json))
    }

    fn list_indexes(&self) -> DbResult<Vec<IndexInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, keys, options FROM indexes WHERE collection = ?1 ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map(params![self.name], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (name, keys, options) = row?;
            out.push(IndexInfo {
                name,
                keys: serde_json::from_str(&keys)?,
                options: serde_json::from_str(&options)?,
            });
        }
        Ok(out)
    }
}

/// Puts an `_id` first, generating an object id when the document has none.
fn with_id(document: Document) -> (Value, Document) {
    if let Some(id) = document.get(ID_FIELD) {
        return (id.clone(), document);
    }
    let id = ObjectId::new().to_value();
    let mut out = Document::with_capacity(document.len() + 1);
    out.insert(ID_FIELD.to_string(), id.clone());
    out.extend(document);
    (id, out)
}

/// Index key tuple; `None` when a sparse index does not cover the document.
fn index_key(document: &Document, index: &IndexInfo) -> Option<Vec<Value>> {
    let values: Vec<Option<&Value>> = index.keys.keys().map(|path| lookup(document, path)).collect();
    if index.options.sparse && values.iter().all(Option::is_none) {
        return None;
    }
    Some(
        values
            .into_iter()
            .map(|v| v.cloned().unwrap_or(Value::Null))
            .collect(),
    )
}

fn keys_equal(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
}
