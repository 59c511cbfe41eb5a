//! Shape check of raw change set elements.
//!
//! Runs before typed decoding so a bad element is reported with the path
//! of the offending property, e.g. `changeSet[0].change.filter`.

use serde_json::Value;

use crate::{action::ACTION_NAMES, changeset::ChangeSet, error::ChangeValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    String,
    Bool,
    Int64,
    Object,
    ObjectList,
    Action,
    Run,
}

impl Kind {
    fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Bool => "boolean",
            Self::Int64 => "int64",
            Self::Object | Self::Action | Self::Run => "object",
            Self::ObjectList => "array",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Bool => value.is_boolean(),
            Self::Int64 => value.is_i64(),
            Self::Object | Self::Action | Self::Run => value.is_object(),
            Self::ObjectList => value.is_array(),
        }
    }
}

struct Field {
    name: &'static str,
    kind: Kind,
    required: bool,
}

const fn required(name: &'static str, kind: Kind) -> Field {
    Field {
        name,
        kind,
        required: true,
    }
}

const fn optional(name: &'static str, kind: Kind) -> Field {
    Field {
        name,
        kind,
        required: false,
    }
}

const CHANGE_SET: &[Field] = &[
    required("globalUniqueChangeId", Kind::String),
    required("author", Kind::String),
    required("targetCollection", Kind::String),
    required("change", Kind::Action),
    optional("rollbackChange", Kind::Action),
    optional("description", Kind::String),
    optional("run", Kind::Run),
];

const RUN: &[Field] = &[optional("onChange", Kind::Bool), optional("always", Kind::Bool)];

const INSERT_ONE: &[Field] = &[
    optional("document", Kind::Object),
    optional("externalDocumentPath", Kind::String),
    optional("relativeToChangelog", Kind::Bool),
];

const INSERT_MANY: &[Field] = &[
    optional("documents", Kind::ObjectList),
    optional("externalDocumentsPath", Kind::String),
    optional("relativeToChangelog", Kind::Bool),
];

const UPDATE_ONE: &[Field] = &[
    optional("document", Kind::Object),
    optional("externalDocumentPath", Kind::String),
    required("filter", Kind::Object),
    optional("failWithoutUpdate", Kind::Bool),
    optional("relativeToChangelog", Kind::Bool),
];

const UPDATE_MANY: &[Field] = &[
    optional("document", Kind::Object),
    optional("externalDocumentPath", Kind::String),
    required("filter", Kind::Object),
    optional("failWithoutUpdate", Kind::Bool),
    optional("expectedModifiedCount", Kind::Int64),
    optional("relativeToChangelog", Kind::Bool),
];

const DELETE_ONE: &[Field] = &[
    required("filter", Kind::Object),
    optional("failWithoutDelete", Kind::Bool),
];

const CREATE_INDEX: &[Field] = &[required("keys", Kind::Object), optional("options", Kind::Object)];

const DROP_INDEX: &[Field] = &[optional("name", Kind::String), optional("keys", Kind::Object)];

fn action_fields(action: &str) -> Option<&'static [Field]> {
    let fields = match action {
        "insertOne" => INSERT_ONE,
        "insertMany" => INSERT_MANY,
        "updateOne" => UPDATE_ONE,
        "updateMany" => UPDATE_MANY,
        "deleteOne" => DELETE_ONE,
        "createIndex" => CREATE_INDEX,
        "dropIndex" => DROP_INDEX,
        _ => return None,
    };
    Some(fields)
}

/// Decodes element `index` of a changelog into a [`ChangeSet`].
pub(crate) fn decode_change_set(value: Value, index: usize) -> Result<ChangeSet, ChangeValidationError> {
    let prefix = format!("changeSet[{index}]");
    if !value.is_object() {
        return Err(ChangeValidationError::new(format!(
            "{prefix} should be a JSON object, got '{}'.",
            json_type(&value)
        )));
    }
    check_fields(&value, CHANGE_SET, &prefix)?;
    serde_json::from_value(value)
        .map_err(|err| ChangeValidationError::with_cause(format!("{prefix} could not be decoded: {err}."), err))
}

fn check_fields(object: &Value, fields: &[Field], prefix: &str) -> Result<(), ChangeValidationError> {
    for field in fields {
        let path = format!("{prefix}.{}", field.name);
        match object.get(field.name) {
            None | Some(Value::Null) if field.required => {
                return Err(ChangeValidationError::new(format!(
                    "{path} property is required but it is missing or null."
                )));
            }
            None | Some(Value::Null) => {}
            Some(value) if !field.kind.accepts(value) => {
                return Err(ChangeValidationError::new(format!(
                    "{path} property has invalid type: expected '{}', got '{}'.",
                    field.kind.name(),
                    json_type(value)
                )));
            }
            Some(value) => match field.kind {
                Kind::Action => check_action(value, &path)?,
                Kind::Run => check_fields(value, RUN, &path)?,
                Kind::ObjectList => check_object_list(value, &path)?,
                _ => {}
            },
        }
    }
    Ok(())
}

fn check_action(action: &Value, path: &str) -> Result<(), ChangeValidationError> {
    let discriminator = format!("{path}.action");
    let name = match action.get("action") {
        None | Some(Value::Null) => {
            return Err(ChangeValidationError::new(format!(
                "{discriminator} property is required but it is missing or null."
            )));
        }
        Some(Value::String(name)) => name,
        Some(other) => {
            return Err(ChangeValidationError::new(format!(
                "{discriminator} property has invalid type: expected 'string', got '{}'.",
                json_type(other)
            )));
        }
    };
    let fields = action_fields(name).ok_or_else(|| {
        ChangeValidationError::new(format!(
            "{discriminator} property has unknown value '{name}', expected one of: {}.",
            ACTION_NAMES.join(", ")
        ))
    })?;
    check_fields(action, fields, path)
}

fn check_object_list(list: &Value, path: &str) -> Result<(), ChangeValidationError> {
    let items = list.as_array().map(Vec::as_slice).unwrap_or_default();
    for (idx, item) in items.iter().enumerate() {
        if !item.is_object() {
            return Err(ChangeValidationError::new(format!(
                "{path}[{idx}] property has invalid type: expected 'object', got '{}'.",
                json_type(item)
            )));
        }
    }
    Ok(())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "double",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
