//! Cross-highlighting map between files and the observations made on them

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Composite key of a heuristic observation
pub fn heuristic_key(heur_id: &str) -> String {
    format!("heuristic__{}", heur_id)
}

/// Composite key of an attack pattern observation
pub fn attack_key(attack_id: &str) -> String {
    format!("attack_pattern__{}", attack_id)
}

/// Composite key of a tag observation
pub fn tag_key(tag_type: &str, value: &str) -> String {
    format!("{}__{}", tag_type, value)
}

/// Bidirectional, additive cross-reference.
///
/// A file hash maps to the composite keys observed on it, and each composite
/// key maps back to the file hashes exhibiting it. Entries are never pruned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagMap(BTreeMap<String, Vec<String>>);

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link a file hash and a composite key in both directions.
    /// Returns true if either direction was new.
    pub fn link(&mut self, file: &str, composite: &str) -> bool {
        let forward = push_unique(self.0.entry(file.to_string()).or_default(), composite);
        let backward = push_unique(self.0.entry(composite.to_string()).or_default(), file);
        forward || backward
    }

    pub fn get(&self, key: &str) -> &[String] {
        self.0.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) -> bool {
    if list.iter().any(|v| v == value) {
        false
    } else {
        list.push(value.to_string());
        true
    }
}
