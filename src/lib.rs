//! Versioned, audited change sets for document databases.
//!
//! A changelog is a JSON array of change sets. Each change set is applied
//! at most once per content fingerprint; every execution is recorded in the
//! `database_changelog` collection of the target database together with the
//! inverse action used by rollback.
//!
//! # Examples
//!
//! Fingerprints ignore key order and formatting:
//! ```
//! use docway::{fingerprint::fingerprint_document, types::Document};
//!
//! let a: Document = serde_json::from_str(r#"{"x": 1, "y": {"b": 2, "a": 1}}"#).expect("json");
//! let b: Document = serde_json::from_str(r#"{"y":{"a":1,"b":2},"x":1}"#).expect("json");
//! assert_eq!(fingerprint_document(&a), fingerprint_document(&b));
//! ```
//!
//! Applying changelogs to a database file:
//! ```no_run
//! use docway::engine::{Engine, EngineConfig};
//!
//! let engine = Engine::new(EngineConfig::from_env());
//! let report = engine
//!     .update("file://data/app", &["changelog.json".to_string()])
//!     .expect("update");
//! println!("{}", report.summary());
//! ```
#![warn(missing_docs)]

/// Change actions: validation, execution and inverse synthesis.
pub mod action;
/// Changelog streaming, decoding and pre-validation.
pub mod changelog;
/// Change sets as authored.
pub mod changeset;
/// Document database interface and its SQLite implementation.
pub mod db;
/// Update, validate, query and rollback entry points.
pub mod engine;
/// Error taxonomy.
pub mod error;
/// Content fingerprints.
pub mod fingerprint;
/// Object identifiers.
pub mod object_id;
/// Audit records and their store.
pub mod persist;
/// Shared aliases and reserved names.
pub mod types;
