use std::{
    fs,
    io::{self, Read},
    path::Path,
};

use chrono::{TimeZone, Utc};
use serde_json::{Value, json};
use tempfile::TempDir;

use docway::{
    changeset::ChangeSet,
    db::{Collection, DocumentStore, connection::ConnectionTarget},
    engine::{Decision, Engine, EngineConfig, decide},
    error::Error,
    fingerprint::{Hash, fingerprint_bytes},
    persist::{ChangelogRepository, DatabaseChangelog, Executed, collection::CollectionChangelogRepository},
    types::{CHANGELOG_COLLECTION_NAME, Document},
};

fn change_set(run: Value) -> ChangeSet {
    serde_json::from_value(json!({
        "globalUniqueChangeId": "a", "author": "u", "targetCollection": "c",
        "change": {"action": "insertOne", "document": {"x": 1}},
        "run": run
    }))
    .expect("change set")
}

fn prior(hash: Hash) -> DatabaseChangelog {
    DatabaseChangelog {
        id: None,
        executed: Executed {
            by: "alice".to_string(),
            at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).single().expect("date"),
            path: "/tmp/changelog.json".to_string(),
            on_host: None,
        },
        change_set: change_set(Value::Null),
        hash,
        app_version: "0.1.0".to_string(),
        rollback: None,
    }
}

#[test]
fn decision_table() {
    let same = fingerprint_bytes(b"same");
    let other = fingerprint_bytes(b"other");
    let plain = change_set(Value::Null);

    assert_eq!(decide(&plain, &same, None), Decision::ExecuteNew);
    assert_eq!(decide(&plain, &same, Some(&prior(same.clone()))), Decision::Skip);
    assert_eq!(
        decide(&change_set(json!({"always": true})), &same, Some(&prior(same.clone()))),
        Decision::ExecuteAlways
    );
    assert_eq!(
        decide(&change_set(json!({"onChange": true})), &other, Some(&prior(same.clone()))),
        Decision::ExecuteChanged
    );
    assert_eq!(
        decide(&change_set(json!({"onChange": true})), &same, Some(&prior(same.clone()))),
        Decision::Skip
    );

    let Decision::Reject(message) = decide(&change_set(json!({"always": true})), &other, Some(&prior(same)))
    else {
        panic!("drift without onChange must reject");
    };
    assert_eq!(
        message,
        "Change detected for globalUniqueChangeId='a' which is already executed at 2024-05-01 12:30:00 UTC by alice with different content but this change set is not re-runnable (change.run.onChange property is unset or false)."
    );
    assert!(!Decision::Skip.executes());
    assert!(Decision::ExecuteNew.executes());
}

struct Harness {
    tmp: TempDir,
    engine: Engine,
}

impl Harness {
    fn new() -> Self {
        let tmp = TempDir::new().expect("tmp");
        let engine = Engine::new(EngineConfig {
            username: "tester".to_string(),
            hostname: Some("box".to_string()),
            base_dir: tmp.path().to_path_buf(),
            ..EngineConfig::default()
        })
        .with_stdin(Box::new(|| Box::new(io::empty()) as Box<dyn Read>));
        Self { tmp, engine }
    }

    fn target(&self) -> String {
        format!("file://{}/app", self.tmp.path().display())
    }

    fn changelog(&self, name: &str, value: Value) -> String {
        fs::write(self.tmp.path().join(name), value.to_string()).expect("write");
        name.to_string()
    }

    fn update(&self, sources: &[String]) -> Result<docway::engine::UpdateReport, Error> {
        self.engine.update(&self.target(), sources)
    }

    fn with_store<T>(&self, f: impl FnOnce(&dyn DocumentStore) -> T) -> T {
        let store = ConnectionTarget::parse(&self.target(), Path::new("/"))
            .expect("target")
            .connect(std::time::Duration::from_secs(5))
            .expect("connect");
        f(&store)
    }

    fn documents(&self, collection: &str) -> Vec<Document> {
        self.with_store(|store| store.collection(collection).find(&Document::new()).expect("find"))
    }
}

fn insert_one(id: &str, document: Value, run: Value) -> Value {
    json!({
        "globalUniqueChangeId": id, "author": "u", "targetCollection": "c",
        "change": {"action": "insertOne", "document": document},
        "run": run
    })
}

fn message(err: Error) -> String {
    match err {
        Error::ChangeValidation(err) => err.message().to_string(),
        other => panic!("expected a change validation error, got {other:?}"),
    }
}

#[test]
fn applying_twice_executes_once() {
    let h = Harness::new();
    let path = h.changelog("changelog.json", json!([insert_one("a", json!({"x": 1}), Value::Null)]));

    let first = h.update(&[path.clone()]).expect("first run");
    assert_eq!(first.executed, vec!["a".to_string()]);
    let second = h.update(&[path]).expect("second run");
    assert!(second.executed.is_empty());
    assert_eq!(second.skipped, vec!["a".to_string()]);
    assert_eq!(second.summary(), "Successfully processed 1 change sets.\nSkipped 1 change sets, including a");

    let docs = h.documents("c");
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["x"], json!(1));
    assert_eq!(h.documents(CHANGELOG_COLLECTION_NAME).len(), 1);
}

#[test]
fn audit_record_carries_execution_metadata() {
    let h = Harness::new();
    let path = h.changelog("changelog.json", json!([insert_one("a", json!({"x": 1}), Value::Null)]));
    h.update(&[path]).expect("run");

    let record = h
        .engine
        .query(&h.target(), "a")
        .expect("query")
        .expect("record");
    assert!(record.id.is_some());
    assert_eq!(record.executed.by, "tester");
    assert_eq!(record.executed.on_host.as_deref(), Some("box"));
    assert_eq!(
        Path::new(&record.executed.path),
        std::path::absolute(h.tmp.path().join("changelog.json")).expect("abs")
    );
    assert_eq!(record.app_version, env!("CARGO_PKG_VERSION"));
    let rollback = record.rollback.expect("rollback");
    assert_eq!(rollback.change.name(), "deleteOne");
    assert_eq!(rollback.rolled_back_changelog_id, None);
    assert_eq!(rollback.changelog_id, None);

    let stored = &h.documents(CHANGELOG_COLLECTION_NAME)[0];
    assert!(stored["hash"]["sha512"].is_string());
    assert_eq!(stored["changeSet"]["change"]["action"], json!("insertOne"));
}

#[test]
fn run_always_re_executes_every_time() {
    let h = Harness::new();
    let path = h.changelog(
        "changelog.json",
        json!([
            insert_one("once", json!({"k": "once"}), Value::Null),
            insert_one("every", json!({"k": "every"}), json!({"always": true})),
        ]),
    );
    h.update(&[path.clone()]).expect("first");
    let second = h.update(&[path.clone()]).expect("second");
    h.update(&[path]).expect("third");

    assert_eq!(second.executed, vec!["every".to_string()]);
    assert_eq!(second.skipped, vec!["once".to_string()]);
    let docs = h.documents("c");
    assert_eq!(docs.iter().filter(|d| d["k"] == json!("every")).count(), 3);
    assert_eq!(docs.iter().filter(|d| d["k"] == json!("once")).count(), 1);
}

#[test]
fn drift_without_on_change_rejects_the_run() {
    let h = Harness::new();
    let v1 = h.changelog("v1.json", json!([insert_one("a", json!({"x": 1}), Value::Null)]));
    let v2 = h.changelog("v2.json", json!([insert_one("a", json!({"x": 2}), Value::Null)]));
    h.update(&[v1]).expect("v1");

    let err = message(h.update(&[v2]).expect_err("drift"));
    assert!(err.starts_with("Change detected for globalUniqueChangeId='a' which is already executed at "), "{err}");
    assert!(err.contains(" by tester with different content"), "{err}");
    assert_eq!(h.documents("c").len(), 1);
}

#[test]
fn drift_with_on_change_executes_again() {
    let h = Harness::new();
    let v1 = h.changelog("v1.json", json!([insert_one("a", json!({"x": 1}), json!({"onChange": true}))]));
    let v2 = h.changelog("v2.json", json!([insert_one("a", json!({"x": 2}), json!({"onChange": true}))]));
    h.update(&[v1]).expect("v1");
    let report = h.update(&[v2.clone()]).expect("v2");
    assert_eq!(report.executed, vec!["a".to_string()]);

    let again = h.update(&[v2]).expect("v2 again");
    assert_eq!(again.skipped, vec!["a".to_string()]);
    assert_eq!(h.documents("c").len(), 2);
    assert_eq!(h.documents(CHANGELOG_COLLECTION_NAME).len(), 2);
}

#[test]
fn duplicate_id_in_one_run_is_fatal_after_the_first_commits() {
    let h = Harness::new();
    let path = h.changelog(
        "changelog.json",
        json!([
            insert_one("dup", json!({"n": 1}), Value::Null),
            insert_one("dup", json!({"n": 2}), Value::Null),
        ]),
    );
    let err = message(h.update(&[path]).expect_err("duplicate"));
    assert_eq!(
        err,
        "Error while processing change log [changelog.json]: globalUniqueChangeId 'dup' is found multiple times, but globalUniqueChangeId should be unique across change sets."
    );
    assert_eq!(h.documents("c").len(), 1);
}

#[test]
fn duplicate_ids_across_sources_are_rejected_too() {
    let h = Harness::new();
    let a = h.changelog("a.json", json!([insert_one("x", json!({"n": 1}), Value::Null)]));
    let b = h.changelog("b.json", json!([insert_one("x", json!({"n": 1}), Value::Null)]));
    let err = message(h.update(&[a, b]).expect_err("duplicate"));
    assert!(err.starts_with("Error while processing change log [b.json]"), "{err}");
}

#[test]
fn explicit_rollback_change_overrides_the_synthesized_one() {
    let h = Harness::new();
    let path = h.changelog(
        "changelog.json",
        json!([{
            "globalUniqueChangeId": "a", "author": "u", "targetCollection": "c",
            "change": {"action": "insertOne", "document": {"x": 1}},
            "rollbackChange": {"action": "deleteOne", "filter": {"x": 1}}
        }]),
    );
    h.update(&[path]).expect("run");
    let record = h.engine.query(&h.target(), "a").expect("query").expect("record");
    assert_eq!(
        record.rollback.expect("rollback").change,
        serde_json::from_value(json!({"action": "deleteOne", "filter": {"x": 1}})).expect("action")
    );
}

#[test]
fn one_timestamp_is_shared_by_a_run() {
    let h = Harness::new();
    let path = h.changelog(
        "changelog.json",
        json!([
            insert_one("a", json!({"n": 1}), Value::Null),
            insert_one("b", json!({"n": 2}), Value::Null),
        ]),
    );
    h.update(&[path]).expect("run");
    let a = h.engine.query(&h.target(), "a").expect("a").expect("a");
    let b = h.engine.query(&h.target(), "b").expect("b").expect("b");
    assert_eq!(a.executed.at, b.executed.at);
}

#[test]
fn failing_execution_keeps_earlier_change_sets_committed() {
    let h = Harness::new();
    let path = h.changelog(
        "changelog.json",
        json!([
            insert_one("a", json!({"n": 1}), Value::Null),
            {"globalUniqueChangeId": "b", "author": "u", "targetCollection": "c",
             "change": {"action": "deleteOne", "filter": {"n": 99}}},
            insert_one("c", json!({"n": 3}), Value::Null),
        ]),
    );
    let err = message(h.update(&[path]).expect_err("no match"));
    assert_eq!(
        err,
        "no document matched the filter and change.failWithoutDelete is true (default is true)"
    );
    assert_eq!(h.documents("c").len(), 1);
    h.with_store(|store| {
        let repo = CollectionChangelogRepository::new(store);
        assert!(repo.find_active("a").expect("a").is_some());
        assert!(repo.find_active("b").expect("b").is_none());
    });
}

#[test]
fn connection_target_must_name_a_database() {
    let h = Harness::new();
    let err = h.engine.update("file:///tmp/", &["x.json".to_string()]).expect_err("no name");
    assert_eq!(err.to_string(), "Database name is required in the connection string.");
}

#[test]
fn standard_input_mixed_with_files_is_rejected_before_anything_runs() {
    let h = Harness::new();
    let a = h.changelog("a.json", json!([insert_one("a", json!({"n": 1}), Value::Null)]));
    let err = message(h.update(&[a, "-".to_string()]).expect_err("mixed sources"));
    assert_eq!(
        err,
        "Error while processing change log [-]: standard input ('-') cannot be combined with other change logs at index 2."
    );
    assert!(h.documents("c").is_empty());
    assert!(h.documents(CHANGELOG_COLLECTION_NAME).is_empty());
}

#[test]
fn pre_validation_failures_name_their_changelog() {
    let h = Harness::new();
    let path = h.changelog(
        "changelog.json",
        json!([
            insert_one("a", json!({"n": 1}), Value::Null),
            {"globalUniqueChangeId": "b", "author": "u", "targetCollection": "c",
             "change": {"action": "insertOne", "externalDocumentPath": "nowhere.json"}},
        ]),
    );
    let err = message(h.update(&[path]).expect_err("missing document"));
    assert!(
        err.starts_with(
            "Error while processing change log [changelog.json]: changeSet[globalUniqueChangeId=b] validation error: external document ["
        ),
        "{err}"
    );
    assert_eq!(h.documents("c").len(), 1);
}
