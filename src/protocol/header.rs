//! Request header map.
//!
//! Header names are matched case-insensitively but stored with the spelling
//! of their first occurrence, and iteration yields entries in first-seen
//! order. Re-inserting an existing name replaces the value in place.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
    // lowercased name -> position of the first occurrence
    index: HashMap<String, usize>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        let lower = name.to_ascii_lowercase();
        match self.index.get(&lower) {
            Some(&at) => self.entries[at].1 = value.to_string(),
            None => {
                self.index.insert(lower, self.entries.len());
                self.entries.push((name.to_string(), value.to_string()));
            }
        }
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.index.get(&name.to_ascii_lowercase()).map(|&at| self.entries[at].1.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_ascii_lowercase())
    }

    /// Iterate entries in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Length", "42");

        assert_eq!(headers.get("content-length"), Some("42"));
        assert_eq!(headers.get("CONTENT-LENGTH"), Some("42"));
        assert_eq!(headers.get("Content-Length"), Some("42"));
        assert_eq!(headers.get("Content-Type"), None);
    }

    #[test]
    fn iteration_preserves_first_seen_order() {
        let mut headers = HeaderMap::new();
        headers.insert("Host", "localhost");
        headers.insert("Accept", "*/*");
        headers.insert("User-Agent", "test");

        let names: Vec<&str> = headers.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["Host", "Accept", "User-Agent"]);
    }

    #[test]
    fn reinsert_replaces_value_in_place() {
        let mut headers = HeaderMap::new();
        headers.insert("Host", "a");
        headers.insert("Accept", "*/*");
        headers.insert("HOST", "b");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("host"), Some("b"));
        // position and stored spelling keep the first occurrence
        let first = headers.iter().next().unwrap();
        assert_eq!(first, ("Host", "b"));
    }
}
