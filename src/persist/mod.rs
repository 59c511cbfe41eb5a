//! Audit records and the store that persists them.

pub mod collection;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    action::ChangeAction, changeset::ChangeSet, db::DbError, fingerprint::Hash, object_id::ObjectId,
};

/// Audit-store failure.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// The backing collection failed.
    #[error(transparent)]
    Db(#[from] DbError),
    /// A stored record could not be (de)serialized.
    #[error("audit record encoding error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Anything else.
    #[error("{0}")]
    Message(String),
}

/// Result alias for the audit store.
pub type PersistResult<T> = Result<T, PersistError>;

/// Persisted proof that a change set (or its rollback) was executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseChangelog {
    /// Generated on save.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Who, when, from where.
    pub executed: Executed,
    /// The executed change set.
    pub change_set: ChangeSet,
    /// Fingerprint of the validated change.
    pub hash: Hash,
    /// Version of the tool that executed it.
    pub app_version: String,
    /// Inverse action and rollback links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<Rollback>,
}

impl DatabaseChangelog {
    /// Id of the record this one rolled back, if it is a rollback record.
    pub fn rolled_back_changelog_id(&self) -> Option<ObjectId> {
        self.rollback.as_ref().and_then(|r| r.rolled_back_changelog_id)
    }

    /// Id of the rollback record that undid this one, once linked.
    pub fn rollback_changelog_id(&self) -> Option<ObjectId> {
        self.rollback.as_ref().and_then(|r| r.changelog_id)
    }

    /// Neither a rollback nor rolled back.
    pub fn is_active(&self) -> bool {
        self.rolled_back_changelog_id().is_none() && self.rollback_changelog_id().is_none()
    }
}

/// Execution metadata of an audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Executed {
    /// User that ran the tool.
    pub by: String,
    /// Start of the run; shared by every record written in it.
    pub at: DateTime<Utc>,
    /// Changelog the change set came from.
    pub path: String,
    /// Host the tool ran on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_host: Option<String>,
}

/// Rollback part of an audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rollback {
    /// Action that undoes the record's change.
    pub change: ChangeAction,
    /// Set on a rollback record: the record it rolled back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolled_back_changelog_id: Option<ObjectId>,
    /// Set on a rolled-back record: the rollback record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changelog_id: Option<ObjectId>,
}

impl Rollback {
    /// Inverse action of a fresh execution.
    pub fn of(change: ChangeAction) -> Self {
        Self {
            change,
            rolled_back_changelog_id: None,
            changelog_id: None,
        }
    }
}

/// Storage seam for audit records.
pub trait ChangelogRepository {
    /// Most recent record for `global_unique_change_id`, of any kind.
    fn find_latest(&self, global_unique_change_id: &str) -> PersistResult<Option<DatabaseChangelog>>;

    /// Most recent record that is neither a rollback nor rolled back.
    fn find_active(&self, global_unique_change_id: &str) -> PersistResult<Option<DatabaseChangelog>>;

    /// Appends `record` and returns it with its generated id.
    fn save(&self, record: DatabaseChangelog) -> PersistResult<DatabaseChangelog>;

    /// Sets `rollback.changelogId` of `original` to `rollback`.
    fn link_rollback(&self, original: ObjectId, rollback: ObjectId) -> PersistResult<()>;
}
