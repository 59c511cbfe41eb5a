use std::{
    fs,
    io::{Cursor, Read},
    path::Path,
};

use serde_json::json;
use tempfile::TempDir;

use docway::{
    action::{ChangeAction, ResolvedPayload},
    changelog::{
        ChangelogProcessor, ProcessedChangeSet,
        reader::ArrayElements,
        resolver::{ChangelogLocation, DocumentResolver},
    },
    error::ChangeValidationError,
};

fn processor(dir: &Path) -> ChangelogProcessor {
    ChangelogProcessor::new(DocumentResolver::new(dir))
}

fn write(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(&path, contents).expect("write");
    name.to_string()
}

fn drain(processor: &ChangelogProcessor, paths: &[String]) -> Vec<ProcessedChangeSet> {
    processor
        .process(paths, false)
        .map(|item| item.expect("collect-all never fails the stream"))
        .collect()
}

fn error_of(item: &ProcessedChangeSet) -> String {
    match &item.result {
        Ok(change_set) => panic!("expected failure, got {change_set:?}"),
        Err(err) => err.message().to_string(),
    }
}

const TWO_CHANGE_SETS: &str = r#"[
  {"globalUniqueChangeId": "a", "author": "u", "targetCollection": "c",
   "change": {"action": "insertOne", "document": {"x": 1}}},
  {"globalUniqueChangeId": "b", "author": "u", "targetCollection": "c",
   "change": {"action": "deleteOne", "filter": {"x": 1}, "failWithoutDelete": false},
   "description": "cleanup", "run": {"always": true}}
]"#;

#[test]
fn array_elements_are_yielded_one_by_one() {
    let raw = r#" [ {"a": "x,]}"}, [1, 2], "s\"]", 3 , null ] "#;
    let values: Vec<_> = ArrayElements::new(Cursor::new(raw))
        .map(|v| v.expect("element"))
        .collect();
    assert_eq!(values, vec![json!({"a": "x,]}"}), json!([1, 2]), json!("s\"]"), json!(3), json!(null)]);
}

#[test]
fn content_after_the_closing_bracket_is_rejected() {
    let mut elements = ArrayElements::new(Cursor::new(r#"[{"a": 1}] }{ garbage"#));
    assert_eq!(elements.next().expect("first").expect("element"), json!({"a": 1}));
    let err = elements.next().expect("trailing").expect_err("trailing content");
    assert_eq!(err.message(), "Change log is not valid JSON: trailing content after ']'.");
    assert!(elements.next().is_none());

    let mut empty = ArrayElements::new(Cursor::new("[] x"));
    assert!(empty.next().expect("trailing").is_err());
    assert!(empty.next().is_none());
}

#[test]
fn trailing_whitespace_is_fine() {
    assert_eq!(ArrayElements::new(Cursor::new("[1, 2]  \n\t")).count(), 2);
}

#[test]
fn empty_array_yields_nothing() {
    assert_eq!(ArrayElements::new(Cursor::new("  []")).count(), 0);
}

#[test]
fn non_array_source_is_rejected() {
    let mut elements = ArrayElements::new(Cursor::new(r#"{"a": 1}"#));
    let err = elements.next().expect("one item").expect_err("not an array");
    assert_eq!(err.message(), "Change log should be a JSON array.");
    assert!(elements.next().is_none());
}

#[test]
fn malformed_element_ends_the_source() {
    let mut elements = ArrayElements::new(Cursor::new(r#"[{"a": 1}, {"b": }, {"c": 3}]"#));
    assert!(elements.next().expect("first").is_ok());
    let err = elements.next().expect("second").expect_err("malformed");
    assert!(err.message().starts_with("changeSet[1] is not valid JSON"), "{}", err.message());
    assert!(elements.next().is_none());
}

#[test]
fn unterminated_array_is_reported() {
    let mut elements = ArrayElements::new(Cursor::new(r#"[{"a": 1}"#));
    let err = elements.next().expect("item").expect_err("truncated");
    assert!(err.message().contains("unexpected end of input"), "{}", err.message());
}

#[test]
fn change_sets_decode_in_document_order() {
    let tmp = TempDir::new().expect("tmp");
    let path = write(tmp.path(), "changelog.json", TWO_CHANGE_SETS);
    let items = drain(&processor(tmp.path()), &[path.clone()]);

    assert_eq!(items.len(), 2);
    let first = items[0].result.as_ref().expect("first");
    let second = items[1].result.as_ref().expect("second");
    assert_eq!(first.global_unique_change_id, "a");
    assert!(matches!(first.change, ChangeAction::InsertOne(_)));
    assert_eq!(second.description.as_deref(), Some("cleanup"));
    assert!(second.run_always());
    assert!(!second.run_on_change());
    assert!(items.iter().all(|item| item.path == path));
    assert_eq!(
        items[0].location.path(),
        std::path::absolute(tmp.path().join("changelog.json")).expect("abs")
    );
}

#[test]
fn missing_required_property_names_its_path() {
    let tmp = TempDir::new().expect("tmp");
    let path = write(
        tmp.path(),
        "changelog.json",
        r#"[{"globalUniqueChangeId": "a", "author": "u", "targetCollection": "c",
             "change": {"action": "updateOne", "document": {"$set": {"x": 2}}, "filter": null}}]"#,
    );
    let items = drain(&processor(tmp.path()), &[path]);
    assert_eq!(
        error_of(&items[0]),
        "changeSet[0].change.filter property is required but it is missing or null."
    );
}

#[test]
fn invalid_property_type_names_expected_and_actual() {
    let tmp = TempDir::new().expect("tmp");
    let path = write(
        tmp.path(),
        "changelog.json",
        r#"[{"globalUniqueChangeId": "a", "author": "u", "targetCollection": "c",
             "change": {"action": "insertOne", "document": {"x": 1}}},
            {"globalUniqueChangeId": "b", "author": "u", "targetCollection": "c",
             "change": {"action": "updateMany", "document": {"$set": {"x": 2}}, "filter": {"x": 1},
                        "expectedModifiedCount": "two"}}]"#,
    );
    let items = drain(&processor(tmp.path()), &[path]);
    assert!(items[0].result.is_ok());
    assert_eq!(
        error_of(&items[1]),
        "changeSet[1].change.expectedModifiedCount property has invalid type: expected 'int64', got 'string'."
    );
}

#[test]
fn top_level_and_run_properties_are_checked() {
    let tmp = TempDir::new().expect("tmp");
    let path = write(
        tmp.path(),
        "changelog.json",
        r#"[{"globalUniqueChangeId": "a", "targetCollection": "c",
             "change": {"action": "insertOne", "document": {}}},
            {"globalUniqueChangeId": "b", "author": "u", "targetCollection": "c",
             "change": {"action": "insertOne", "document": {}}, "run": {"onChange": "yes"}},
            {"globalUniqueChangeId": "c", "author": "u", "targetCollection": "c",
             "change": {"action": "renameCollection"}}]"#,
    );
    let items = drain(&processor(tmp.path()), &[path]);
    assert_eq!(
        error_of(&items[0]),
        "changeSet[0].author property is required but it is missing or null."
    );
    assert_eq!(
        error_of(&items[1]),
        "changeSet[1].run.onChange property has invalid type: expected 'boolean', got 'string'."
    );
    assert!(error_of(&items[2]).starts_with("changeSet[2].change.action property has unknown value 'renameCollection'"));
}

#[test]
fn fail_fast_wraps_the_first_failure_and_stops() {
    let tmp = TempDir::new().expect("tmp");
    let path = write(
        tmp.path(),
        "changelog.json",
        r#"[{"globalUniqueChangeId": "a", "author": "u", "targetCollection": "c",
             "change": {"action": "insertOne", "document": {"x": 1}}},
            {"globalUniqueChangeId": "b", "author": "u", "targetCollection": "c",
             "change": {"action": "deleteOne"}},
            {"globalUniqueChangeId": "c", "author": "u", "targetCollection": "c",
             "change": {"action": "insertOne", "document": {"x": 3}}}]"#,
    );
    let processor = processor(tmp.path());
    let mut stream = processor.process(&[path], true);

    assert!(stream.next().expect("first").is_ok());
    let err = stream.next().expect("second").expect_err("fail fast");
    assert_eq!(
        err.to_string(),
        "Error while processing change log [changelog.json]: changeSet[1].change.filter property is required but it is missing or null."
    );
    assert!(stream.next().is_none());
}

#[test]
fn source_level_failures_are_reported_per_source() {
    let tmp = TempDir::new().expect("tmp");
    let good = write(tmp.path(), "good.json", TWO_CHANGE_SETS);
    let not_array = write(tmp.path(), "object.json", r#"{"globalUniqueChangeId": "a"}"#);
    let paths = vec![
        good,
        "  ".to_string(),
        "missing.json".to_string(),
        not_array,
    ];
    let items = drain(&processor(tmp.path()), &paths);

    assert_eq!(items.len(), 5);
    assert_eq!(items[2].source_index, 1);
    assert_eq!(error_of(&items[2]), "Path must not be blank at index 2.");
    let unreadable = error_of(&items[3]);
    assert!(unreadable.starts_with("file ["), "{unreadable}");
    assert!(unreadable.ends_with("missing.json] is not readable. Ensure the resource exists."));
    assert_eq!(error_of(&items[4]), "Change log should be a JSON array.");
}

fn stdin_of(text: &'static str) -> docway::changelog::StdinFactory {
    Box::new(move || Box::new(Cursor::new(text.as_bytes().to_vec())) as Box<dyn Read>)
}

#[test]
fn single_dash_reads_standard_input() {
    let tmp = TempDir::new().expect("tmp");
    let processor = processor(tmp.path()).with_stdin(stdin_of(TWO_CHANGE_SETS));
    let items = drain(&processor, &["-".to_string()]);

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].path, tmp.path().display().to_string());
    assert_eq!(items[0].location.dir(), tmp.path());
}

#[test]
fn dash_cannot_be_combined_with_other_sources() {
    let tmp = TempDir::new().expect("tmp");
    let good = write(tmp.path(), "good.json", TWO_CHANGE_SETS);
    let processor = processor(tmp.path()).with_stdin(stdin_of(TWO_CHANGE_SETS));
    let items = drain(&processor, &[good, "-".to_string()]);

    assert_eq!(items.len(), 3);
    assert_eq!(
        error_of(&items[0]),
        "Standard input ('-') cannot be combined with other change logs at index 2."
    );
    assert_eq!(items[0].source_index, 1);
    assert!(items[1].result.is_ok());
    assert!(items[2].result.is_ok());
}

#[test]
fn dash_conflict_ends_a_fail_fast_stream_before_any_source_is_read() {
    let tmp = TempDir::new().expect("tmp");
    let good = write(tmp.path(), "good.json", TWO_CHANGE_SETS);
    let processor = processor(tmp.path()).with_stdin(stdin_of(TWO_CHANGE_SETS));
    let mut stream = processor.process(&[good, "-".to_string()], true);

    let err = stream.next().expect("one item").expect_err("conflict");
    assert_eq!(
        err.message(),
        "Error while processing change log [-]: standard input ('-') cannot be combined with other change logs at index 2."
    );
    assert!(stream.next().is_none());
}

fn change_set(value: serde_json::Value) -> docway::changeset::ChangeSet {
    serde_json::from_value(value).expect("change set")
}

#[test]
fn pre_validate_rejects_the_audit_collection() {
    let tmp = TempDir::new().expect("tmp");
    let set = change_set(json!({
        "globalUniqueChangeId": "a", "author": "u", "targetCollection": "database_changelog",
        "change": {"action": "insertOne", "document": {"x": 1}}
    }));
    let err = processor(tmp.path())
        .pre_validate(&set, &ChangelogLocation::file(tmp.path().join("c.json")))
        .expect_err("reserved");
    assert_eq!(
        err.message(),
        "changeSet[globalUniqueChangeId=a].targetCollection must not be 'database_changelog'."
    );
}

#[test]
fn pre_validate_wraps_action_errors_with_the_id() {
    let tmp = TempDir::new().expect("tmp");
    let set = change_set(json!({
        "globalUniqueChangeId": "a", "author": "u", "targetCollection": "c",
        "change": {"action": "deleteOne", "filter": {}}
    }));
    let err: ChangeValidationError = processor(tmp.path())
        .pre_validate(&set, &ChangelogLocation::file(tmp.path().join("c.json")))
        .expect_err("empty filter");
    assert_eq!(
        err.message(),
        "changeSet[globalUniqueChangeId=a] validation error: filter is required for deleteOne action."
    );
}

#[test]
fn external_documents_resolve_relative_to_changelog_or_base_dir() {
    let tmp = TempDir::new().expect("tmp");
    write(tmp.path(), "nested/doc.json", r#"{"from": "nested"}"#);
    write(tmp.path(), "doc.json", r#"{"from": "base"}"#);
    let location = ChangelogLocation::file(tmp.path().join("nested/changelog.json"));
    let processor = processor(tmp.path());

    let relative = change_set(json!({
        "globalUniqueChangeId": "a", "author": "u", "targetCollection": "c",
        "change": {"action": "insertOne", "externalDocumentPath": "doc.json", "relativeToChangelog": true}
    }));
    let validated = processor.pre_validate(&relative, &location).expect("relative");
    assert_eq!(
        validated.payload,
        ResolvedPayload::InsertOne {
            document: serde_json::from_value(json!({"from": "nested"})).expect("doc")
        }
    );

    let plain = change_set(json!({
        "globalUniqueChangeId": "b", "author": "u", "targetCollection": "c",
        "change": {"action": "insertOne", "externalDocumentPath": "doc.json"}
    }));
    let validated = processor.pre_validate(&plain, &location).expect("base dir");
    assert_eq!(
        validated.payload,
        ResolvedPayload::InsertOne {
            document: serde_json::from_value(json!({"from": "base"})).expect("doc")
        }
    );
}

#[test]
fn missing_external_document_is_a_validation_error() {
    let tmp = TempDir::new().expect("tmp");
    let set = change_set(json!({
        "globalUniqueChangeId": "a", "author": "u", "targetCollection": "c",
        "change": {"action": "insertMany", "externalDocumentsPath": "nowhere.json"}
    }));
    let err = processor(tmp.path())
        .pre_validate(&set, &ChangelogLocation::file(tmp.path().join("c.json")))
        .expect_err("missing");
    assert!(err.message().contains("nowhere.json] is not readable"), "{}", err.message());
}
