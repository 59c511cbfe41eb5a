//! Engine entry points: update, validate, query and rollback.
//!
//! Every database-backed entry point comes in two forms: one taking a
//! connection target, which opens the database for the duration of the
//! call, and an `*_in` form running against an already open store.

mod config;
pub mod rollback;
pub mod update;
pub mod validate;

use crate::{
    changelog::{ChangelogProcessor, StdinFactory, resolver::DocumentResolver},
    db::{DocumentStore, connection::ConnectionTarget},
    error::Result,
    persist::{ChangelogRepository, DatabaseChangelog, collection::CollectionChangelogRepository},
};

pub use config::EngineConfig;
pub use rollback::RollbackOutcome;
pub use update::{Decision, UpdateReport, decide};
pub use validate::ValidationReport;

/// Applies, checks, inspects and rolls back changelogs.
pub struct Engine {
    config: EngineConfig,
    processor: ChangelogProcessor,
}

impl Engine {
    /// Engine resolving paths against `config.base_dir`.
    pub fn new(config: EngineConfig) -> Self {
        let processor = ChangelogProcessor::new(DocumentResolver::new(config.base_dir.clone()));
        Self { config, processor }
    }

    /// Replaces the reader used for the `-` source.
    pub fn with_stdin(mut self, stdin: StdinFactory) -> Self {
        self.processor = self.processor.with_stdin(stdin);
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The changelog processor.
    pub fn processor(&self) -> &ChangelogProcessor {
        &self.processor
    }

    /// Connects to `target`, runs `block` and closes the connection on
    /// every exit path.
    pub fn use_database<T>(
        &self,
        target: &str,
        block: impl FnOnce(&dyn DocumentStore) -> Result<T>,
    ) -> Result<T> {
        let target = ConnectionTarget::parse(target, &self.config.base_dir)?;
        let store = target.connect(self.config.connect_timeout())?;
        log::debug!("Using database {target}");
        block(&store)
    }

    /// The active audit record for `global_unique_change_id`, if any.
    pub fn query(&self, target: &str, global_unique_change_id: &str) -> Result<Option<DatabaseChangelog>> {
        self.use_database(target, |store| self.query_in(store, global_unique_change_id))
    }

    /// [`Engine::query`] against an open store.
    pub fn query_in(
        &self,
        store: &dyn DocumentStore,
        global_unique_change_id: &str,
    ) -> Result<Option<DatabaseChangelog>> {
        let repository = CollectionChangelogRepository::new(store);
        let found = repository.find_active(global_unique_change_id)?;
        if found.is_none() {
            log::info!("Change set with globalUniqueChangeId '{global_unique_change_id}' not found.");
        }
        Ok(found)
    }
}
