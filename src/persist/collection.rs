//! Audit store on the reserved collection of the target database.

use serde_json::{Value, json};

use crate::{
    db::{Collection, DocumentStore},
    object_id::ObjectId,
    types::{CHANGELOG_COLLECTION_NAME, Document, ID_FIELD},
};

use super::{ChangelogRepository, DatabaseChangelog, PersistError, PersistResult};

const GLOBAL_UNIQUE_CHANGE_ID_PATH: &str = "changeSet.globalUniqueChangeId";

/// [`ChangelogRepository`] over the `database_changelog` collection.
///
/// Records are ordered by insertion; "latest" is the last one written.
pub struct CollectionChangelogRepository<'a> {
    collection: Box<dyn Collection + 'a>,
}

impl<'a> CollectionChangelogRepository<'a> {
    /// Repository on `store`'s audit collection.
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self {
            collection: store.collection(CHANGELOG_COLLECTION_NAME),
        }
    }

    fn find_last(&self, filter: Document) -> PersistResult<Option<DatabaseChangelog>> {
        let Some(document) = self.collection.find(&filter)?.pop() else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_value(Value::Object(document))?))
    }
}

fn by_change_id(global_unique_change_id: &str) -> Document {
    let mut filter = Document::new();
    filter.insert(
        GLOBAL_UNIQUE_CHANGE_ID_PATH.to_string(),
        Value::String(global_unique_change_id.to_string()),
    );
    filter
}

impl ChangelogRepository for CollectionChangelogRepository<'_> {
    fn find_latest(&self, global_unique_change_id: &str) -> PersistResult<Option<DatabaseChangelog>> {
        self.find_last(by_change_id(global_unique_change_id))
    }

    fn find_active(&self, global_unique_change_id: &str) -> PersistResult<Option<DatabaseChangelog>> {
        let mut filter = by_change_id(global_unique_change_id);
        filter.insert("rollback.rolledBackChangelogId".to_string(), Value::Null);
        filter.insert("rollback.changelogId".to_string(), Value::Null);
        self.find_last(filter)
    }

    fn save(&self, mut record: DatabaseChangelog) -> PersistResult<DatabaseChangelog> {
        let Value::Object(document) = serde_json::to_value(&record)? else {
            return Err(PersistError::Message(
                "audit record did not serialize to a document".to_string(),
            ));
        };
        let id = self.collection.insert_one(document)?;
        let id = ObjectId::from_value(&id).ok_or_else(|| {
            PersistError::Message(format!("audit record saved with a non-object id {id}"))
        })?;
        record.id = Some(id);
        log::debug!("Database changelog with _id '{id}' saved successfully.");
        Ok(record)
    }

    fn link_rollback(&self, original: ObjectId, rollback: ObjectId) -> PersistResult<()> {
        let mut filter = Document::new();
        filter.insert(ID_FIELD.to_string(), original.to_value());
        let update = json!({ "$set": { "rollback.changelogId": rollback.to_value() } });
        let Value::Object(update) = update else {
            return Err(PersistError::Message("malformed link update".to_string()));
        };
        match self.collection.find_one_and_update(&filter, &update)? {
            Some(_) => Ok(()),
            None => Err(PersistError::Message(format!(
                "database changelog with _id '{original}' not found"
            ))),
        }
    }
}
