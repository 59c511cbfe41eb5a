//! The update run: per change set, execute, skip or reject.

use chrono::{DateTime, Utc};
use hashbrown::HashSet;

use crate::{
    action::ValidatedChange,
    changelog::resolver::ChangelogLocation,
    changeset::ChangeSet,
    db::DocumentStore,
    error::{ChangeValidationError, Result, changelog_error, duplicate_id_error},
    fingerprint::Hash,
    persist::{
        ChangelogRepository, DatabaseChangelog, Executed, Rollback,
        collection::CollectionChangelogRepository,
    },
};

use super::Engine;

/// How many skipped ids the run summary lists.
const SKIPPED_SHOWN: usize = 5;

/// What to do with one change set given its prior active record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Never applied.
    ExecuteNew,
    /// Applied with different content and `run.onChange` is set.
    ExecuteChanged,
    /// Applied with the same content and `run.always` is set.
    ExecuteAlways,
    /// Applied with the same content; nothing to do.
    Skip,
    /// Applied with different content and not re-runnable.
    Reject(String),
}

impl Decision {
    /// True for the three execute outcomes.
    pub fn executes(&self) -> bool {
        matches!(self, Self::ExecuteNew | Self::ExecuteChanged | Self::ExecuteAlways)
    }
}

/// Decides the fate of `change_set`, fingerprinted as `hash`, against the
/// most recent active audit record with the same id.
pub fn decide(change_set: &ChangeSet, hash: &Hash, prior: Option<&DatabaseChangelog>) -> Decision {
    let Some(prior) = prior else {
        return Decision::ExecuteNew;
    };
    if prior.hash != *hash {
        if change_set.run_on_change() {
            return Decision::ExecuteChanged;
        }
        return Decision::Reject(format!(
            "Change detected for globalUniqueChangeId='{}' which is already executed at {} by {} with different content but this change set is not re-runnable (change.run.onChange property is unset or false).",
            change_set.global_unique_change_id,
            formatted(&prior.executed.at),
            prior.executed.by
        ));
    }
    if change_set.run_always() {
        Decision::ExecuteAlways
    } else {
        Decision::Skip
    }
}

pub(crate) fn formatted(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Outcome of a successful update run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Ids executed in this run, in order.
    pub executed: Vec<String>,
    /// Ids skipped as already applied, in order.
    pub skipped: Vec<String>,
}

impl UpdateReport {
    /// Executed plus skipped.
    pub fn processed(&self) -> usize {
        self.executed.len() + self.skipped.len()
    }

    /// `Successfully processed N change sets.` plus the first skipped ids.
    pub fn summary(&self) -> String {
        let mut summary = format!("Successfully processed {} change sets.", self.processed());
        if !self.skipped.is_empty() {
            let shown: Vec<&str> = self
                .skipped
                .iter()
                .take(SKIPPED_SHOWN)
                .map(String::as_str)
                .collect();
            summary.push_str(&format!(
                "\nSkipped {} change sets, including {}",
                self.skipped.len(),
                shown.join(", ")
            ));
        }
        summary
    }
}

impl Engine {
    /// Applies every change set of `sources` to the database at `target`.
    ///
    /// Fail-fast: the first error aborts the run. Change sets executed
    /// before it stay committed together with their audit records.
    pub fn update(&self, target: &str, sources: &[String]) -> Result<UpdateReport> {
        self.use_database(target, |store| self.update_in(store, sources))
    }

    /// [`Engine::update`] against an open store.
    pub fn update_in(&self, store: &dyn DocumentStore, sources: &[String]) -> Result<UpdateReport> {
        let now = Utc::now();
        let repository = CollectionChangelogRepository::new(store);
        let mut seen: HashSet<String> = HashSet::new();
        let mut report = UpdateReport::default();

        for item in self.processor().process(sources, true) {
            let item = item?;
            let change_set = item.result?;
            let id = change_set.global_unique_change_id.clone();
            if !seen.insert(id.clone()) {
                return Err(ChangeValidationError::new(duplicate_id_error(&item.path, &id)).into());
            }
            let validated = self
                .processor()
                .pre_validate(&change_set, &item.location)
                .map_err(|err| {
                    let message = changelog_error(&item.path, err.message());
                    err.wrap(message)
                })?;

            log::debug!(
                "changeSet[globalUniqueChangeId={id}] find in {}.",
                change_set.target_collection
            );
            let prior = repository.find_active(&id)?;
            match decide(&change_set, &validated.hash, prior.as_ref()) {
                Decision::Reject(message) => return Err(ChangeValidationError::new(message).into()),
                Decision::Skip => {
                    if let Some(prior) = &prior {
                        log::info!(
                            "changeSet[globalUniqueChangeId={id}] already executed at {} by {}. Skipping.",
                            formatted(&prior.executed.at),
                            prior.executed.by
                        );
                    }
                    report.skipped.push(id);
                }
                decision => {
                    if decision == Decision::ExecuteAlways {
                        log::info!(
                            "changeSet[globalUniqueChangeId={id}] will be executed again because change.run.always property is true."
                        );
                    }
                    self.execute(store, &repository, change_set, validated, &item.location, now)?;
                    report.executed.push(id);
                }
            }
        }
        log::info!("{}", report.summary());
        Ok(report)
    }

    fn execute(
        &self,
        store: &dyn DocumentStore,
        repository: &dyn ChangelogRepository,
        change_set: ChangeSet,
        validated: ValidatedChange,
        location: &ChangelogLocation,
        now: DateTime<Utc>,
    ) -> Result<DatabaseChangelog> {
        log::info!(
            "changeSet[globalUniqueChangeId={}] is executing...",
            change_set.global_unique_change_id
        );
        let collection = store.collection(&change_set.target_collection);
        let result = validated.execute(collection.as_ref())?;
        let rollback = change_set
            .rollback_change
            .clone()
            .or(result.rollback)
            .map(Rollback::of);
        let record = DatabaseChangelog {
            id: None,
            executed: Executed {
                by: self.config().username.clone(),
                at: now,
                path: location.path().display().to_string(),
                on_host: self.config().hostname.clone(),
            },
            change_set,
            hash: validated.hash,
            app_version: self.config().app_version.clone(),
            rollback,
        };
        Ok(repository.save(record)?)
    }
}
