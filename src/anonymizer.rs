use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::config::AnonymizerConfig;

/// Field names anonymized out of the box. The config may extend this list.
const DEFAULT_FIELDS: &[&str] = &[
    "PatientIDx",
    "PatientID",
    "TreatmentName",
    "FirstName",
    "LastName",
];

/// SHA-256 hex digest of a value's string form.
pub fn hash_value(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Accumulated hash-to-original correspondence for one run.
///
/// Insertion is first-write-wins: once a digest is recorded, later values for
/// the same digest are ignored. A collision between distinct originals would
/// therefore go undetected; the mapping keeps whichever value came first.
#[derive(Debug, Default)]
pub struct MappingTable {
    entries: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct MappingDocument<'a> {
    hash_to_original: &'a BTreeMap<String, String>,
    original_to_hash: BTreeMap<&'a str, &'a str>,
    total_mappings: usize,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, hash: String, original: String) {
        self.entries.entry(hash).or_insert(original);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, hash: &str) -> Option<&str> {
        self.entries.get(hash).map(String::as_str)
    }

    /// Renders the persisted document: both mapping directions plus the count.
    pub fn to_document(&self) -> impl Serialize + '_ {
        let original_to_hash = self
            .entries
            .iter()
            .map(|(hash, original)| (original.as_str(), hash.as_str()))
            .collect();
        MappingDocument {
            hash_to_original: &self.entries,
            original_to_hash,
            total_mappings: self.entries.len(),
        }
    }
}

pub struct Anonymizer {
    fields: HashSet<String>,
}

impl Anonymizer {
    pub fn new(config: AnonymizerConfig) -> Self {
        let mut fields: HashSet<String> = DEFAULT_FIELDS.iter().map(|s| s.to_string()).collect();
        for entry in config.fields {
            if entry.trim().is_empty() {
                continue;
            }
            fields.insert(entry);
        }
        Self { fields }
    }

    /// Returns a copy of `value` with every sensitive field replaced by its
    /// digest, recording each (digest, original) pair into `mapping`.
    ///
    /// The field-name check takes precedence over recursion: a sensitive key
    /// holding an object or array is hashed as a leaf, not descended into.
    /// Array elements recurse only when they are objects; scalars and nested
    /// arrays pass through unchanged. Null values are never hashed.
    pub fn anonymize(&self, value: &Value, mapping: &mut MappingTable) -> Value {
        match value {
            Value::Object(entries) => {
                let mut anonymized = Map::new();
                for (key, val) in entries {
                    if self.fields.contains(key) && !val.is_null() {
                        let original = string_form(val);
                        let hashed = hash_value(&original);
                        mapping.record(hashed.clone(), original);
                        anonymized.insert(key.clone(), Value::String(hashed));
                    } else {
                        anonymized.insert(key.clone(), self.anonymize(val, mapping));
                    }
                }
                Value::Object(anonymized)
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| {
                        if item.is_object() {
                            self.anonymize(item, mapping)
                        } else {
                            item.clone()
                        }
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

/// The string form a value is hashed over: raw contents for strings, compact
/// JSON for everything else.
fn string_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
