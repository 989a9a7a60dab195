//! Structural comparison of two documents.
//!
//! Paths are dotted key sequences from the root (`judgeCounts.perfect`). Lists are compared as
//! multisets keyed by their canonical (sorted-key) serialization, so reordering a list yields
//! nothing and replacing an element yields one `ListRemove` plus one `ListAppend`.

use crate::value::DcValue;
use indexmap::IndexMap;
use std::collections::HashMap;

const FLOAT_EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Added {
        path: String,
        value: DcValue,
    },
    Removed {
        path: String,
    },
    Scalar {
        path: String,
        old: DcValue,
        new: DcValue,
    },
    /// Same numeric magnitude, different number type (`7` vs `7.0`).
    TypeChange {
        path: String,
        old: DcValue,
        old_type: &'static str,
        new: DcValue,
        new_type: &'static str,
    },
    ListAppend {
        path: String,
        item: DcValue,
    },
    ListRemove {
        path: String,
        item: DcValue,
    },
}

impl Change {
    pub fn path(&self) -> &str {
        match self {
            Change::Added { path, .. }
            | Change::Removed { path }
            | Change::Scalar { path, .. }
            | Change::TypeChange { path, .. }
            | Change::ListAppend { path, .. }
            | Change::ListRemove { path, .. } => path,
        }
    }
}

/// Paths whose subtrees the diff never reports on.
///
/// An entry hides itself and everything below it: `record` hides `record.foo.bar` but not
/// `records_total`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreSet {
    paths: Vec<String>,
}

impl IgnoreSet {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn matches(&self, path: &str) -> bool {
        self.paths.iter().any(|p| {
            path == p
                || (path.len() > p.len()
                    && path.starts_with(p.as_str())
                    && path.as_bytes()[p.len()] == b'.')
        })
    }
}

/// Compare `old` against `new`, skipping ignored subtrees.
pub fn diff(old: &DcValue, new: &DcValue, ignore: &IgnoreSet) -> Vec<Change> {
    let mut out = Vec::new();
    diff_at("", old, new, ignore, &mut out);
    out
}

/// The equality the diff uses to decide whether a leaf changed.
pub fn semantically_equal(a: &DcValue, b: &DcValue) -> bool {
    match (a, b) {
        (DcValue::Null, DcValue::Null) => true,
        (DcValue::Bool(x), DcValue::Bool(y)) => x == y,
        (DcValue::Number(x), DcValue::Number(y)) => {
            if let (Some(x), Some(y)) = (x.integral(), y.integral()) {
                return x == y;
            }
            (x.as_f64() - y.as_f64()).abs() < FLOAT_EPSILON
        }
        (DcValue::String(x), DcValue::String(y)) => x.trim() == y.trim(),
        _ => a == b,
    }
}

fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn diff_at(path: &str, old: &DcValue, new: &DcValue, ignore: &IgnoreSet, out: &mut Vec<Change>) {
    match (old, new) {
        (DcValue::Object(a), DcValue::Object(b)) => diff_objects(path, a, b, ignore, out),
        (DcValue::Array(a), DcValue::Array(b)) => diff_lists(path, a, b, out),
        (DcValue::Number(x), DcValue::Number(y))
            if x.is_integer() != y.is_integer() && semantically_equal(old, new) =>
        {
            out.push(Change::TypeChange {
                path: path.to_string(),
                old: old.clone(),
                old_type: old.type_name(),
                new: new.clone(),
                new_type: new.type_name(),
            });
        }
        _ => {
            if !semantically_equal(old, new) {
                out.push(Change::Scalar {
                    path: path.to_string(),
                    old: old.clone(),
                    new: new.clone(),
                });
            }
        }
    }
}

fn diff_objects(
    path: &str,
    old: &IndexMap<String, DcValue>,
    new: &IndexMap<String, DcValue>,
    ignore: &IgnoreSet,
    out: &mut Vec<Change>,
) {
    for (key, old_value) in old {
        let child = join(path, key);
        if ignore.matches(&child) {
            continue;
        }
        match new.get(key) {
            Some(new_value) => diff_at(&child, old_value, new_value, ignore, out),
            None => out.push(Change::Removed { path: child }),
        }
    }
    for (key, new_value) in new {
        if old.contains_key(key) {
            continue;
        }
        let child = join(path, key);
        if ignore.matches(&child) {
            continue;
        }
        out.push(Change::Added {
            path: child,
            value: new_value.clone(),
        });
    }
}

fn diff_lists(path: &str, old: &[DcValue], new: &[DcValue], out: &mut Vec<Change>) {
    let mut remaining_new: HashMap<String, usize> = HashMap::new();
    for item in new {
        *remaining_new.entry(item.to_json_canonical()).or_default() += 1;
    }
    let mut remaining_old: HashMap<String, usize> = HashMap::new();
    for item in old {
        *remaining_old.entry(item.to_json_canonical()).or_default() += 1;
    }

    for item in old {
        let key = item.to_json_canonical();
        match remaining_new.get_mut(&key) {
            Some(n) if *n > 0 => *n -= 1,
            _ => out.push(Change::ListRemove {
                path: path.to_string(),
                item: item.clone(),
            }),
        }
    }
    for item in new {
        let key = item.to_json_canonical();
        match remaining_old.get_mut(&key) {
            Some(n) if *n > 0 => *n -= 1,
            _ => out.push(Change::ListAppend {
                path: path.to_string(),
                item: item.clone(),
            }),
        }
    }
}

/// Replay a change list onto a document.
///
/// `diff(&apply(old, &diff(old, new, ig)), new, ig)` is empty for every pair of documents.
pub fn apply(document: &DcValue, changes: &[Change]) -> DcValue {
    let mut out = document.clone();
    for change in changes {
        match change {
            Change::Added { path, value: new }
            | Change::Scalar { path, new, .. }
            | Change::TypeChange { path, new, .. } => set_path(&mut out, path, new.clone()),
            Change::Removed { path } => remove_path(&mut out, path),
            Change::ListAppend { path, item } => {
                if let Some(list) = lookup_mut(&mut out, path).and_then(DcValue::as_array_mut) {
                    list.push(item.clone());
                }
            }
            Change::ListRemove { path, item } => {
                if let Some(list) = lookup_mut(&mut out, path).and_then(DcValue::as_array_mut) {
                    let key = item.to_json_canonical();
                    if let Some(pos) = list.iter().position(|v| v.to_json_canonical() == key) {
                        list.remove(pos);
                    }
                }
            }
        }
    }
    out
}

fn lookup_mut<'a>(root: &'a mut DcValue, path: &str) -> Option<&'a mut DcValue> {
    if path.is_empty() {
        return Some(root);
    }
    path.split('.').try_fold(root, |cur, key| cur.get_mut(key))
}

fn set_path(root: &mut DcValue, path: &str, value: DcValue) {
    if path.is_empty() {
        *root = value;
        return;
    }
    let mut cur = root;
    let mut keys = path.split('.').peekable();
    while let Some(key) = keys.next() {
        if !cur.is_object() {
            *cur = DcValue::empty_object();
        }
        let Some(map) = cur.as_object_mut() else {
            return;
        };
        if keys.peek().is_none() {
            map.insert(key.to_string(), value);
            return;
        }
        cur = map
            .entry(key.to_string())
            .or_insert_with(DcValue::empty_object);
    }
}

fn remove_path(root: &mut DcValue, path: &str) {
    let (parent, key) = match path.rsplit_once('.') {
        Some((parent, key)) => (parent, key),
        None => ("", path),
    };
    if let Some(map) = lookup_mut(root, parent).and_then(DcValue::as_object_mut) {
        map.shift_remove(key);
    }
}
