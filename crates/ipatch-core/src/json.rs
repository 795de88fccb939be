//! Structural diff over JSON trees.
//!
//! A [`JsonDiff`] is an ordered list of path operations. Objects are diffed key
//! by key, arrays index-wise with a trailing append or truncate, and any other
//! change replaces the value at its path. Equal subtrees produce no operations,
//! so the diff stays proportional to what actually changed.

use crate::model::{DiffError, DocumentModel};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A segment in a document path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Array index.
    Index(usize),
    /// Object key.
    Key(String),
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathSegment::Key(k) => write!(f, "{}", k),
            PathSegment::Index(i) => write!(f, "{}", i),
        }
    }
}

fn format_path(path: &[PathSegment]) -> String {
    let s: Vec<String> = path.iter().map(|s| s.to_string()).collect();
    format!("/{}", s.join("/"))
}

/// One step of a JSON diff.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum JsonDiffOp {
    /// Write `value` at `path`. Inserts a missing object key, appends when the
    /// index equals the array length, replaces otherwise. An empty path
    /// replaces the whole document.
    Set { path: Vec<PathSegment>, value: Value },
    /// Remove an object key or array element.
    Remove { path: Vec<PathSegment> },
    /// Shorten the array at `path` to `len` elements.
    Truncate { path: Vec<PathSegment>, len: usize },
}

/// Ordered list of operations turning one JSON tree into another.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonDiff(Vec<JsonDiffOp>);

impl JsonDiff {
    pub fn new(ops: Vec<JsonDiffOp>) -> Self {
        Self(ops)
    }

    pub fn ops(&self) -> &[JsonDiffOp] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Diff capability over `serde_json::Value`. The empty document is `{}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JsonModel;

impl DocumentModel for JsonModel {
    type State = Value;
    type Diff = JsonDiff;

    fn empty() -> Value {
        Value::Object(Map::new())
    }

    fn diff(from: &Value, to: &Value) -> JsonDiff {
        let mut ops = Vec::new();
        let mut path = Vec::new();
        diff_into(&mut path, from, to, &mut ops);
        JsonDiff(ops)
    }

    fn apply_diff(state: &Value, diff: &JsonDiff) -> Result<Value, DiffError> {
        let mut next = state.clone();
        for op in diff.ops() {
            apply_op(&mut next, op)?;
        }
        Ok(next)
    }

    fn is_identity(diff: &JsonDiff) -> bool {
        diff.is_empty()
    }
}

fn diff_into(path: &mut Vec<PathSegment>, from: &Value, to: &Value, ops: &mut Vec<JsonDiffOp>) {
    if from == to {
        return;
    }

    match (from, to) {
        (Value::Object(a), Value::Object(b)) => {
            for key in a.keys().filter(|k| !b.contains_key(*k)) {
                path.push(PathSegment::Key(key.clone()));
                ops.push(JsonDiffOp::Remove { path: path.clone() });
                path.pop();
            }
            for (key, new_value) in b {
                path.push(PathSegment::Key(key.clone()));
                match a.get(key) {
                    Some(old_value) => diff_into(path, old_value, new_value, ops),
                    None => ops.push(JsonDiffOp::Set {
                        path: path.clone(),
                        value: new_value.clone(),
                    }),
                }
                path.pop();
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            let common = a.len().min(b.len());
            for i in 0..common {
                path.push(PathSegment::Index(i));
                diff_into(path, &a[i], &b[i], ops);
                path.pop();
            }
            if b.len() < a.len() {
                ops.push(JsonDiffOp::Truncate {
                    path: path.clone(),
                    len: b.len(),
                });
            }
            for (i, value) in b.iter().enumerate().skip(common) {
                path.push(PathSegment::Index(i));
                ops.push(JsonDiffOp::Set {
                    path: path.clone(),
                    value: value.clone(),
                });
                path.pop();
            }
        }
        _ => ops.push(JsonDiffOp::Set {
            path: path.clone(),
            value: to.clone(),
        }),
    }
}

fn navigate_mut<'a>(root: &'a mut Value, path: &[PathSegment]) -> Result<&'a mut Value, DiffError> {
    let mut current = root;
    for (depth, segment) in path.iter().enumerate() {
        current = match (current, segment) {
            (Value::Object(map), PathSegment::Key(key)) => map
                .get_mut(key)
                .ok_or_else(|| DiffError::PathNotFound(format_path(&path[..=depth])))?,
            (Value::Array(items), PathSegment::Index(index)) => {
                let length = items.len();
                items.get_mut(*index).ok_or_else(|| DiffError::IndexOutOfBounds {
                    path: format_path(&path[..depth]),
                    index: *index,
                    length,
                })?
            }
            (_, PathSegment::Key(_)) => {
                return Err(DiffError::TypeMismatch {
                    path: format_path(&path[..depth]),
                    expected: "object".to_string(),
                })
            }
            (_, PathSegment::Index(_)) => {
                return Err(DiffError::TypeMismatch {
                    path: format_path(&path[..depth]),
                    expected: "array".to_string(),
                })
            }
        };
    }
    Ok(current)
}

fn apply_op(root: &mut Value, op: &JsonDiffOp) -> Result<(), DiffError> {
    match op {
        JsonDiffOp::Set { path, value } => {
            let Some((last, parent)) = path.split_last() else {
                *root = value.clone();
                return Ok(());
            };
            let parent_path = format_path(parent);
            match (navigate_mut(root, parent)?, last) {
                (Value::Object(map), PathSegment::Key(key)) => {
                    map.insert(key.clone(), value.clone());
                }
                (Value::Array(items), PathSegment::Index(index)) => {
                    if *index < items.len() {
                        items[*index] = value.clone();
                    } else if *index == items.len() {
                        items.push(value.clone());
                    } else {
                        return Err(DiffError::IndexOutOfBounds {
                            path: parent_path,
                            index: *index,
                            length: items.len(),
                        });
                    }
                }
                (_, PathSegment::Key(_)) => {
                    return Err(DiffError::TypeMismatch {
                        path: parent_path,
                        expected: "object".to_string(),
                    })
                }
                (_, PathSegment::Index(_)) => {
                    return Err(DiffError::TypeMismatch {
                        path: parent_path,
                        expected: "array".to_string(),
                    })
                }
            }
        }
        JsonDiffOp::Remove { path } => {
            let (last, parent) = path.split_last().ok_or(DiffError::RootRemoval)?;
            let parent_path = format_path(parent);
            match (navigate_mut(root, parent)?, last) {
                (Value::Object(map), PathSegment::Key(key)) => {
                    if map.remove(key).is_none() {
                        return Err(DiffError::PathNotFound(format_path(path)));
                    }
                }
                (Value::Array(items), PathSegment::Index(index)) => {
                    if *index >= items.len() {
                        return Err(DiffError::IndexOutOfBounds {
                            path: parent_path,
                            index: *index,
                            length: items.len(),
                        });
                    }
                    items.remove(*index);
                }
                _ => {
                    return Err(DiffError::TypeMismatch {
                        path: parent_path,
                        expected: "object or array".to_string(),
                    })
                }
            }
        }
        JsonDiffOp::Truncate { path, len } => match navigate_mut(root, path)? {
            Value::Array(items) => {
                if *len > items.len() {
                    return Err(DiffError::IndexOutOfBounds {
                        path: format_path(path),
                        index: *len,
                        length: items.len(),
                    });
                }
                items.truncate(*len);
            }
            _ => {
                return Err(DiffError::TypeMismatch {
                    path: format_path(path),
                    expected: "array".to_string(),
                })
            }
        },
    }
    Ok(())
}
