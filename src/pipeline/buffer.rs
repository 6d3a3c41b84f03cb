//! Key buffers fed by the live channel
//!
//! Result and error keys arrive one message at a time; they are buffered here
//! until the reconciler fetches them. The processed set records what has
//! already been fetched and merged.

use std::collections::HashSet;

/// Ordered, duplicate-free buffer of result or error keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyBuffer {
    keys: Vec<String>,
    seen: HashSet<String>,
}

impl KeyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an update: `None` clears the buffer, otherwise keys not yet
    /// buffered are appended in order.
    pub fn apply(&mut self, update: Option<&[String]>) {
        match update {
            None => self.clear(),
            Some(keys) => {
                for key in keys {
                    self.push(key);
                }
            }
        }
    }

    /// Append a single key. Returns false if it was already buffered.
    pub fn push(&mut self, key: &str) -> bool {
        if !self.seen.insert(key.to_string()) {
            return false;
        }
        self.keys.push(key.to_string());
        true
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.seen.clear();
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Buffered keys that have not been processed yet, in arrival order
    pub fn unprocessed(&self, processed: &ProcessedKeySet) -> Vec<String> {
        self.keys
            .iter()
            .filter(|k| !processed.contains(k))
            .cloned()
            .collect()
    }
}

/// Keys already fetched and merged. Only grows until a full reset.
#[derive(Debug, Clone, Default)]
pub struct ProcessedKeySet {
    keys: HashSet<String>,
}

impl ProcessedKeySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn extend<'a>(&mut self, keys: impl IntoIterator<Item = &'a String>) {
        self.keys.extend(keys.into_iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_null_update_resets_buffer() {
        let mut buffer = KeyBuffer::new();
        buffer.apply(Some(&keys(&["a", "b"])));
        buffer.apply(None);
        assert!(buffer.is_empty());

        // Resetting an empty buffer stays empty
        buffer.apply(None);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_update_appends_only_new_keys() {
        let mut buffer = KeyBuffer::new();
        buffer.apply(Some(&keys(&["a", "b"])));
        buffer.apply(Some(&keys(&["b", "c", "a", "c"])));
        assert_eq!(buffer.keys(), keys(&["a", "b", "c"]).as_slice());
    }

    #[test]
    fn test_key_is_accepted_again_after_reset() {
        let mut buffer = KeyBuffer::new();
        buffer.apply(Some(&keys(&["a"])));
        buffer.apply(None);
        buffer.apply(Some(&keys(&["a"])));
        assert_eq!(buffer.keys(), keys(&["a"]).as_slice());
    }

    #[test]
    fn test_large_buffer_stays_duplicate_free() {
        let mut buffer = KeyBuffer::new();
        let many: Vec<String> = (0..20_000).map(|i| format!("k{}", i % 10_000)).collect();
        buffer.apply(Some(&many));
        assert_eq!(buffer.len(), 10_000);
        assert_eq!(buffer.keys()[9_999], "k9999");
    }

    #[test]
    fn test_push_reports_duplicates() {
        let mut buffer = KeyBuffer::new();
        assert!(buffer.push("k"));
        assert!(!buffer.push("k"));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_unprocessed_filters_and_keeps_order() {
        let mut buffer = KeyBuffer::new();
        buffer.apply(Some(&keys(&["c", "a", "b"])));

        let mut processed = ProcessedKeySet::new();
        processed.extend(&keys(&["a"]));

        assert_eq!(buffer.unprocessed(&processed), keys(&["c", "b"]));
    }

    #[test]
    fn test_processed_set_grows() {
        let mut processed = ProcessedKeySet::new();
        processed.extend(&keys(&["a", "b"]));
        processed.extend(&keys(&["b"]));
        assert_eq!(processed.len(), 2);
        processed.clear();
        assert!(processed.is_empty());
    }
}
