//! Write-once, read-checked symbol tables.
//!
//! A [`Namespace`] maps logical keys (portlet ids, state field names,
//! dependency keys) to generated values. Reading an undeclared key is an
//! error, and so is declaring a key twice. Numeric keys are also reachable
//! with a `$` prefix (`"$0"` and `"0"` are the same key), so that generated
//! code can refer to them in languages that forbid identifiers starting with
//! a digit.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Keys that generic object-inspection utilities probe for. Reading them
/// through [`Namespace::lookup`] yields `None` instead of an error.
const PROBE_KEYS: &[&str] = &["toJSON", "then", "$$typeof"];

/// Symbol table misuse.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NamespaceError {
    /// Read of a key that was never declared.
    #[error("namespace '{namespace}': key '{key}' is not declared")]
    UnknownKey {
        /// Namespace path.
        namespace: String,
        /// The missing key.
        key: String,
    },

    /// Second declaration of a key.
    #[error("namespace '{namespace}': key '{key}' is already assigned")]
    AlreadyAssigned {
        /// Namespace path.
        namespace: String,
        /// The duplicated key.
        key: String,
    },

    /// A name fragment with characters outside `[A-Za-z0-9_]`.
    #[error("invalid name part '{part}': only [A-Za-z0-9_] is allowed")]
    InvalidNamePart {
        /// The rejected fragment.
        part: String,
    },
}

/// Maps `"$<digits>"` to `"<digits>"`; every other key is returned as is.
pub fn normalize_key(key: &str) -> &str {
    match key.strip_prefix('$') {
        Some(rest) if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) => rest,
        _ => key,
    }
}

/// Checks that `part` can be embedded in a generated identifier.
pub fn assert_valid_name_part(part: &str) -> Result<(), NamespaceError> {
    if !part.is_empty() && part.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        Ok(())
    } else {
        Err(NamespaceError::InvalidNamePart {
            part: part.to_owned(),
        })
    }
}

/// Named, write-once map from key to `T`.
///
/// Keys are anything [`Display`](fmt::Display)-able (`&str`, `PortletId`,
/// `NodeId`, integers) and are normalized with [`normalize_key`].
/// Iteration order is the key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace<T> {
    name: String,
    entries: BTreeMap<String, T>,
}

impl<T> Namespace<T> {
    /// Creates an empty namespace. `name` is the dotted path used in errors.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: BTreeMap::new(),
        }
    }

    /// The dotted path of this namespace.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Assigns `value` to `key`. Fails if the key already has a value.
    pub fn declare(&mut self, key: impl fmt::Display, value: T) -> Result<&mut T, NamespaceError> {
        let key = key.to_string();
        let key = normalize_key(&key);
        if self.entries.contains_key(key) {
            return Err(NamespaceError::AlreadyAssigned {
                namespace: self.name.clone(),
                key: key.to_owned(),
            });
        }
        Ok(self.entries.entry(key.to_owned()).or_insert(value))
    }

    /// Reads `key`. Fails if the key was never declared.
    pub fn get(&self, key: impl fmt::Display) -> Result<&T, NamespaceError> {
        let key = key.to_string();
        self.entries
            .get(normalize_key(&key))
            .ok_or_else(|| self.unknown(&key))
    }

    /// Mutable access to a declared key.
    pub fn get_mut(&mut self, key: impl fmt::Display) -> Result<&mut T, NamespaceError> {
        let key = key.to_string();
        let namespace = &self.name;
        self.entries
            .get_mut(normalize_key(&key))
            .ok_or_else(|| NamespaceError::UnknownKey {
                namespace: namespace.clone(),
                key: key.clone(),
            })
    }

    /// Like [`get()`](Self::get), but reflection probe keys (`toJSON`,
    /// `then`, `$$typeof`) resolve to `None` instead of failing.
    pub fn lookup(&self, key: impl fmt::Display) -> Result<Option<&T>, NamespaceError> {
        let key = key.to_string();
        if PROBE_KEYS.contains(&key.as_str()) && !self.entries.contains_key(&key) {
            return Ok(None);
        }
        self.get(key).map(Some)
    }

    /// Returns the value of `key`, declaring it with `init()` first if absent.
    pub fn get_or_declare_with(&mut self, key: impl fmt::Display, init: impl FnOnce() -> T) -> &mut T {
        let key = key.to_string();
        self.entries
            .entry(normalize_key(&key).to_owned())
            .or_insert_with(init)
    }

    /// Whether `key` has been declared.
    pub fn contains(&self, key: impl fmt::Display) -> bool {
        let key = key.to_string();
        self.entries.contains_key(normalize_key(&key))
    }

    /// Iterates over declared entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of declared keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been declared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn unknown(&self, key: &str) -> NamespaceError {
        NamespaceError::UnknownKey {
            namespace: self.name.clone(),
            key: key.to_owned(),
        }
    }
}

impl<T: Serialize> Serialize for Namespace<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}
