//! Layered merge of configuration fragments.
//!
//! Layers are folded left to right as JSON merge patches (RFC 7396), so scalar and singular
//! object fields take the value of the last layer that sets them and an explicit `null` clears a
//! field. Fields listed in a type's [`Conf::SCHEMA`] are handled afterwards:
//!
//! - [`Strategy::Append`] lists are the concatenation of every layer's list, in layer order.
//! - [`Strategy::MergeByKey`] lists are concatenated and then entries sharing a key are folded
//!   together, the merged entry taking the position of the key's last appearance.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};


/// A configuration type that can be layered with [`merge_confs`].
pub trait Conf: Serialize + DeserializeOwned {
    /// Fields that are not simply overridden by later layers.
    const SCHEMA: &'static [Field] = &[];
}

/// A field of a configuration's JSON encoding and how its values combine across layers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Field {
    /// JSON object keys leading from the configuration root to the field.
    pub path: &'static [&'static str],
    pub strategy: Strategy,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Strategy {
    Append,

    /// Entries are objects identified by `key`. The `value` objects of entries with equal keys are
    /// merged as configuration layers, applying `fields` within them.
    MergeByKey {
        key: &'static str,
        value: &'static str,
        fields: &'static [Field],
    },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no configurations to merge")]
    Empty,

    #[error("failed to encode configuration")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode merged configuration")]
    Decode(#[source] serde_json::Error),

    #[error("configuration layer {index} is not an object")]
    NotAnObject { index: usize },

    #[error("{path} must be a list, found {found}")]
    NotAList { path: String, found: &'static str },

    #[error("an entry of {path} has no {field:?}")]
    MissingField { path: String, field: &'static str },
}

/// Merges configuration layers, later layers taking precedence.
pub fn merge_confs<'c, C>(confs: impl IntoIterator<Item = &'c C>) -> Result<C, Error>
where
    C: Conf + 'c,
{
    let layers = confs
        .into_iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(Error::Encode)?;
    let merged = merge_values(&layers, C::SCHEMA)?;
    serde_json::from_value(merged).map_err(Error::Decode)
}

/// Merges JSON objects according to `schema`.
pub fn merge_values(layers: &[Value], schema: &[Field]) -> Result<Value, Error> {
    if let Some(index) = layers.iter().position(|l| !l.is_object()) {
        return Err(Error::NotAnObject { index });
    }

    let (first, rest) = layers.split_first().ok_or(Error::Empty)?;
    let mut merged = first.clone();
    for layer in rest {
        json_patch::merge(&mut merged, layer);
    }

    for field in schema {
        merge_field(&mut merged, layers, field)?;
    }

    Ok(merged)
}

fn merge_field(merged: &mut Value, layers: &[Value], field: &Field) -> Result<(), Error> {
    let (name, parents) = match field.path.split_last() {
        Some(split) => split,
        None => return Ok(()),
    };

    // A field whose parent was cleared by a later layer has nothing to hold the merged list.
    let parent = match lookup_mut(merged, parents) {
        Some(Value::Object(parent)) => parent,
        _ => return Ok(()),
    };

    let mut entries = Vec::new();
    let mut found = false;
    for layer in layers {
        match lookup(layer, field.path) {
            Some(Value::Array(values)) => {
                found = true;
                entries.extend(values.iter().cloned());
            }
            None | Some(Value::Null) => {}
            Some(other) => {
                return Err(Error::NotAList {
                    path: field.path.join("."),
                    found: kind(other),
                })
            }
        }
    }

    if !found {
        parent.remove(*name);
        return Ok(());
    }

    if let Strategy::MergeByKey { key, value, fields } = field.strategy {
        entries = merge_by_key(entries, field.path, key, value, fields)?;
    }
    parent.insert(name.to_string(), Value::Array(entries));
    Ok(())
}

fn merge_by_key(
    entries: Vec<Value>,
    path: &[&str],
    key: &'static str,
    value: &'static str,
    fields: &[Field],
) -> Result<Vec<Value>, Error> {
    let missing = |field| Error::MissingField {
        path: path.join("."),
        field,
    };

    // Groups are ordered by the last appearance of their key.
    let mut groups = Vec::<(Value, Vec<Value>)>::new();
    for mut entry in entries {
        let entry = entry.as_object_mut().ok_or_else(|| missing(key))?;
        let k = entry.remove(key).ok_or_else(|| missing(key))?;
        let v = entry.remove(value).ok_or_else(|| missing(value))?;

        let mut values = match groups.iter().position(|(gk, _)| *gk == k) {
            Some(i) => groups.remove(i).1,
            None => Vec::new(),
        };
        values.push(v);
        groups.push((k, values));
    }

    groups
        .into_iter()
        .map(|(k, values)| -> Result<Value, Error> {
            let merged = merge_values(&values, fields)?;
            let mut entry = Map::with_capacity(2);
            entry.insert(key.to_string(), k);
            entry.insert(value.to_string(), merged);
            Ok(Value::Object(entry))
        })
        .collect()
}

fn lookup<'v>(value: &'v Value, path: &[&str]) -> Option<&'v Value> {
    path.iter().try_fold(value, |v, name| v.as_object()?.get(*name))
}

fn lookup_mut<'v>(value: &'v mut Value, path: &[&str]) -> Option<&'v mut Value> {
    path.iter()
        .try_fold(value, |v, name| v.as_object_mut()?.get_mut(*name))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
