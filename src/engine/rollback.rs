//! Replaying the stored inverse of a prior execution.

use chrono::Utc;

use crate::{
    changelog::resolver::ChangelogLocation,
    changeset::ChangeSet,
    db::DocumentStore,
    error::{ChangeValidationError, Result},
    object_id::ObjectId,
    persist::{
        ChangelogRepository, DatabaseChangelog, Executed, PersistError, Rollback,
        collection::CollectionChangelogRepository,
    },
};

use super::{Engine, update::formatted};

/// What a rollback request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// No audit record exists for the id.
    NotFound,
    /// The latest record carries no inverse action.
    NoRollbackAction,
    /// The inverse was executed and recorded.
    RolledBack {
        /// The record that was rolled back.
        original: ObjectId,
        /// The new rollback record.
        rollback: ObjectId,
    },
}

/// Description of the synthetic rollback change set.
pub fn rollback_description(original: &DatabaseChangelog) -> String {
    let id = original.id.map(|id| id.to_hex()).unwrap_or_default();
    let mut description = format!("Rollback change set for database changelog '{id}'.");
    if let Some(previous) = &original.change_set.description {
        description.push_str(&format!("\nOriginal description: '{previous}'"));
    }
    description
}

impl Engine {
    /// Rolls back the latest execution of `global_unique_change_id`.
    ///
    /// The new rollback record and the back-link on the original are two
    /// separate writes; a crash between them leaves the rollback record
    /// unlinked.
    pub fn rollback(&self, target: &str, global_unique_change_id: &str) -> Result<RollbackOutcome> {
        self.use_database(target, |store| self.rollback_in(store, global_unique_change_id))
    }

    /// [`Engine::rollback`] against an open store.
    pub fn rollback_in(
        &self,
        store: &dyn DocumentStore,
        global_unique_change_id: &str,
    ) -> Result<RollbackOutcome> {
        let now = Utc::now();
        let repository = CollectionChangelogRepository::new(store);
        let Some(original) = repository.find_latest(global_unique_change_id)? else {
            log::warn!("Change set with globalUniqueChangeId '{global_unique_change_id}' not found.");
            return Ok(RollbackOutcome::NotFound);
        };
        if original.rolled_back_changelog_id().is_some() {
            return Err(ChangeValidationError::new(format!(
                "changeSet[globalUniqueChangeId={global_unique_change_id}] already rolled back at {} by {}.",
                formatted(&original.executed.at),
                original.executed.by
            ))
            .into());
        }
        let Some(inverse) = original.rollback.as_ref().map(|r| r.change.clone()) else {
            log::warn!("No rollback change set found for globalUniqueChangeId '{global_unique_change_id}'.");
            return Ok(RollbackOutcome::NoRollbackAction);
        };
        let original_id = original.id.ok_or_else(|| {
            PersistError::Message(format!(
                "database changelog for globalUniqueChangeId '{global_unique_change_id}' has no _id"
            ))
        })?;

        let change_set = ChangeSet {
            global_unique_change_id: original.change_set.global_unique_change_id.clone(),
            author: original.change_set.author.clone(),
            target_collection: original.change_set.target_collection.clone(),
            change: inverse,
            rollback_change: None,
            description: Some(rollback_description(&original)),
            run: None,
        };
        let location = ChangelogLocation::from_recorded(&original.executed.path);
        let validated = self.processor().pre_validate(&change_set, &location)?;

        log::info!("changeSet[globalUniqueChangeId={global_unique_change_id}] is executing...");
        let collection = store.collection(&change_set.target_collection);
        validated.execute(collection.as_ref())?;

        let record = repository.save(DatabaseChangelog {
            id: None,
            executed: Executed {
                by: self.config().username.clone(),
                at: now,
                path: original.executed.path.clone(),
                on_host: self.config().hostname.clone(),
            },
            change_set,
            hash: validated.hash,
            app_version: self.config().app_version.clone(),
            rollback: Some(Rollback {
                change: original.change_set.change.clone(),
                rolled_back_changelog_id: Some(original_id),
                changelog_id: None,
            }),
        })?;
        let rollback_id = record
            .id
            .ok_or_else(|| PersistError::Message("rollback record saved without _id".to_string()))?;
        repository.link_rollback(original_id, rollback_id)?;

        log::info!(
            "Rollback change set with globalUniqueChangeId '{global_unique_change_id}' executed successfully."
        );
        Ok(RollbackOutcome::RolledBack {
            original: original_id,
            rollback: rollback_id,
        })
    }
}
