//! Separator-delimited key paths.

use keytree_common::{Error, Result};

/// Path arithmetic for one separator.
///
/// Levels count raw `split` segments, so a leading separator contributes an
/// empty first segment: with `/`, `"/"` is level 1 (the root), `"/foo"` is
/// level 2 and `"/foo/bar"` level 3.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPath {
    separator: String,
}

impl KeyPath {
    /// Create path helpers for a separator
    pub fn new(separator: impl Into<String>) -> Result<Self> {
        let separator = separator.into();
        if separator.is_empty() {
            return Err(Error::invalid_argument("separator must not be empty"));
        }
        Ok(Self { separator })
    }

    /// The separator
    #[must_use]
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Whether `key` is the root (the bare separator)
    #[must_use]
    pub fn is_root(&self, key: &str) -> bool {
        key == self.separator
    }

    /// Nesting level of `key`
    #[must_use]
    pub fn level(&self, key: &str) -> usize {
        if self.is_root(key) {
            1
        } else {
            key.split(self.separator.as_str()).count()
        }
    }

    /// Range prefix covering every descendant of `key`
    #[must_use]
    pub fn descendant_prefix(&self, key: &str) -> String {
        if self.is_root(key) {
            self.separator.clone()
        } else {
            format!("{key}{}", self.separator)
        }
    }

    /// The parent path of `key`, or `None` for the root and single-segment keys.
    ///
    /// `"/foo/bar"` -> `"/foo"`, `"/foo"` -> `"/"`.
    #[must_use]
    pub fn parent<'a>(&'a self, key: &'a str) -> Option<&'a str> {
        if self.is_root(key) {
            return None;
        }
        match key.rfind(self.separator.as_str()) {
            Some(0) => Some(self.separator.as_str()),
            Some(idx) => Some(&key[..idx]),
            None => None,
        }
    }

    /// Reject query keys that cannot anchor a tree
    pub fn validate_query_key(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(Error::malformed_key(key, "key must not be empty"));
        }
        if !self.is_root(key) && key.ends_with(self.separator.as_str()) {
            return Err(Error::malformed_key(key, "key ends with the separator"));
        }
        Ok(())
    }
}
