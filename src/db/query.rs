//! Filter matching and update application over JSON documents.

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

use crate::types::{Document, ID_FIELD};

use super::{DbError, DbResult};

/// Resolves a dotted path such as `changeSet.globalUniqueChangeId`.
pub fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = document.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(obj) => obj.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Sets a dotted path, creating intermediate objects as needed.
pub fn set_path(document: &mut Document, path: &str, value: Value) -> DbResult<()> {
    let (parents, leaf) = match path.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, path),
    };
    let mut target = document;
    if let Some(parents) = parents {
        for part in parents.split('.') {
            let slot = target
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if slot.is_null() {
                *slot = Value::Object(Map::new());
            }
            target = slot.as_object_mut().ok_or_else(|| {
                DbError::InvalidUpdate(format!("cannot create field '{part}' of path '{path}'"))
            })?;
        }
    }
    target.insert(leaf.to_string(), value);
    Ok(())
}

/// Removes a dotted path if present.
pub fn remove_path(document: &mut Document, path: &str) {
    let Some((parents, leaf)) = path.rsplit_once('.') else {
        document.shift_remove(path);
        return;
    };
    let mut target = document;
    for part in parents.split('.') {
        match target.get_mut(part).and_then(Value::as_object_mut) {
            Some(next) => target = next,
            None => return,
        }
    }
    target.shift_remove(leaf);
}

/// True when `document` satisfies every clause of `filter`.
pub fn matches(document: &Document, filter: &Document) -> DbResult<bool> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" => clauses(key, condition)?
                .iter()
                .try_fold(true, |acc, clause| Ok::<_, DbError>(acc && matches(document, clause)?))?,
            "$or" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    if matches(document, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            op if op.starts_with('$') => {
                return Err(DbError::InvalidFilter(format!("unknown top level operator: {op}")));
            }
            path => field_matches(lookup(document, path), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(op: &str, condition: &'a Value) -> DbResult<Vec<&'a Document>> {
    let items = condition
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| DbError::InvalidFilter(format!("{op} must be a nonempty array")))?;
    items
        .iter()
        .map(|item| {
            item.as_object()
                .ok_or_else(|| DbError::InvalidFilter(format!("{op} entries must be objects")))
        })
        .collect()
}

fn is_operator_object(value: &Value) -> Option<&Document> {
    let obj = value.as_object()?;
    (!obj.is_empty() && obj.keys().all(|k| k.starts_with('$'))).then_some(obj)
}

fn field_matches(actual: Option<&Value>, condition: &Value) -> DbResult<bool> {
    let Some(ops) = is_operator_object(condition) else {
        return Ok(equals_or_contains(actual, condition));
    };
    // {"$oid": ...} is a value, not an operator clause.
    if ops.contains_key(crate::object_id::OID_KEY) {
        return Ok(equals_or_contains(actual, condition));
    }
    for (op, operand) in ops {
        let ok = match op.as_str() {
            "$eq" => equals_or_contains(actual, operand),
            "$ne" => !equals_or_contains(actual, operand),
            "$in" => in_list(actual, operand, "$in")?,
            "$nin" => !in_list(actual, operand, "$nin")?,
            "$exists" => actual.is_some() == operand.as_bool().unwrap_or(true),
            "$gt" => compare(actual, operand).is_some_and(|o| o == Ordering::Greater),
            "$gte" => compare(actual, operand).is_some_and(|o| o != Ordering::Less),
            "$lt" => compare(actual, operand).is_some_and(|o| o == Ordering::Less),
            "$lte" => compare(actual, operand).is_some_and(|o| o != Ordering::Greater),
            other => return Err(DbError::InvalidFilter(format!("unknown operator: {other}"))),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn in_list(actual: Option<&Value>, operand: &Value, op: &str) -> DbResult<bool> {
    let candidates = operand
        .as_array()
        .ok_or_else(|| DbError::InvalidFilter(format!("{op} needs an array")))?;
    Ok(candidates.iter().any(|c| equals_or_contains(actual, c)))
}

/// Equality with document-database semantics: `null` matches a missing
/// field, and an array field matches any of its elements.
fn equals_or_contains(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(value) if values_equal(value, expected) => true,
        Some(Value::Array(items)) => items.iter().any(|item| values_equal(item, expected)),
        Some(_) => false,
    }
}

/// Structural equality where numbers compare by value (`1 == 1.0`).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

fn numbers_equal(x: &Number, y: &Number) -> bool {
    match (x.as_i64(), y.as_i64()) {
        (Some(a), Some(b)) => a == b,
        _ => x.as_f64() == y.as_f64(),
    }
}

fn compare(actual: Option<&Value>, operand: &Value) -> Option<Ordering> {
    match (actual?, operand) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// True when every top-level key is an update operator.
pub fn is_operator_update(update: &Document) -> bool {
    !update.is_empty() && update.keys().all(|k| k.starts_with('$'))
}

/// Produces the post-update image of `original`.
///
/// Operator documents (`$set`, `$unset`, `$inc`) modify fields in place; any
/// other document replaces the whole body while keeping the identity.
pub fn apply_update(original: &Document, update: &Document) -> DbResult<Document> {
    if update.is_empty() {
        return Err(DbError::InvalidUpdate("update document must not be empty".to_string()));
    }
    if update.keys().any(|k| k.starts_with('$')) && !is_operator_update(update) {
        return Err(DbError::InvalidUpdate(
            "update document cannot mix operators and plain fields".to_string(),
        ));
    }
    if is_operator_update(update) {
        apply_operators(original, update)
    } else {
        replace(original, update)
    }
}

fn replace(original: &Document, replacement: &Document) -> DbResult<Document> {
    let id = original.get(ID_FIELD);
    if let (Some(old), Some(new)) = (id, replacement.get(ID_FIELD)) {
        if !values_equal(old, new) {
            return Err(DbError::InvalidUpdate(format!(
                "the {ID_FIELD} field cannot be changed"
            )));
        }
    }
    let mut out = Document::new();
    if let Some(id) = id {
        out.insert(ID_FIELD.to_string(), id.clone());
    }
    for (k, v) in replacement {
        if k != ID_FIELD {
            out.insert(k.clone(), v.clone());
        }
    }
    Ok(out)
}

fn apply_operators(original: &Document, update: &Document) -> DbResult<Document> {
    let mut out = original.clone();
    for (op, fields) in update {
        let fields = fields
            .as_object()
            .ok_or_else(|| DbError::InvalidUpdate(format!("{op} needs a document")))?;
        for (path, value) in fields {
            if path == ID_FIELD || path.starts_with("_id.") {
                return Err(DbError::InvalidUpdate(format!(
                    "the {ID_FIELD} field cannot be changed"
                )));
            }
            match op.as_str() {
                "$set" => set_path(&mut out, path, value.clone())?,
                "$unset" => remove_path(&mut out, path),
                "$inc" => {
                    let current = lookup(&out, path).cloned().unwrap_or(Value::from(0));
                    set_path(&mut out, path, increment(&current, value, path)?)?;
                }
                other => {
                    return Err(DbError::InvalidUpdate(format!("unknown update operator: {other}")));
                }
            }
        }
    }
    Ok(out)
}

fn increment(current: &Value, by: &Value, path: &str) -> DbResult<Value> {
    let not_numeric = || DbError::InvalidUpdate(format!("cannot increment non-numeric field '{path}'"));
    let (Value::Number(a), Value::Number(b)) = (current, by) else {
        return Err(not_numeric());
    };
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return Ok(Value::from(x.checked_add(y).ok_or_else(not_numeric)?));
    }
    let sum = a.as_f64().zip(b.as_f64()).map(|(x, y)| x + y).ok_or_else(not_numeric)?;
    Number::from_f64(sum).map(Value::Number).ok_or_else(not_numeric)
}
