use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Raw task attributes as an ordered string map.
///
/// Insertion order is preserved: it drives column order when a task is
/// written to a backend and line order in the edit buffer. Setting an
/// existing key replaces the value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<String, String>,
}

impl Record {
    pub fn new() -> Self {
        Record::default()
    }

    /// Set `key` to `value`. Empty keys are ignored.
    pub fn set(&mut self, key: &str, value: &str) {
        if key.is_empty() {
            return;
        }
        match self.fields.get_mut(key) {
            Some(existing) => {
                if existing != value {
                    *existing = value.to_string();
                }
            }
            None => {
                self.fields.insert(key.to_string(), value.to_string());
            }
        }
    }

    /// Builder form of [`Record::set`]
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|v| v.as_str())
    }

    /// Value for `key`, or `""` when absent
    pub fn value(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copy every field of `other` into this record, in `other`'s order.
    pub fn merge(&mut self, other: &Record) {
        for (key, value) in other.iter() {
            self.set(key, value);
        }
    }

    /// The first of `required` that this record lacks, if any.
    pub fn missing<'a>(&self, required: &[&'a str]) -> Option<&'a str> {
        required.iter().copied().find(|key| !self.contains(key))
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.set(k.as_ref(), v.as_ref());
        }
        record
    }
}
