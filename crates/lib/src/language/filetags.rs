//! File tags.
//!
//! Inputs and outputs are typed by abstract tag sets, never by file
//! extensions. Tags are short interned strings; tag sets are ordered so
//! that canonical renderings and serialized forms are stable.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single file tag, e.g. `cpp` or `obj`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileTag(String);

impl FileTag {
  pub fn new(name: impl Into<String>) -> Self {
    Self(name.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for FileTag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for FileTag {
  fn from(name: &str) -> Self {
    Self(name.to_string())
  }
}

impl From<String> for FileTag {
  fn from(name: String) -> Self {
    Self(name)
  }
}

/// An ordered set of file tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileTags(BTreeSet<FileTag>);

impl FileTags {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_names<I, S>(names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self(names.into_iter().map(|name| FileTag(name.into())).collect())
  }

  pub fn insert(&mut self, tag: FileTag) -> bool {
    self.0.insert(tag)
  }

  pub fn contains(&self, tag: &FileTag) -> bool {
    self.0.contains(tag)
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn iter(&self) -> impl Iterator<Item = &FileTag> {
    self.0.iter()
  }

  pub fn intersects(&self, other: &FileTags) -> bool {
    self.0.intersection(&other.0).next().is_some()
  }

  pub fn unite(&mut self, other: &FileTags) {
    self.0.extend(other.0.iter().cloned());
  }

  pub fn union(&self, other: &FileTags) -> FileTags {
    let mut result = self.clone();
    result.unite(other);
    result
  }

  /// Tag names in sorted order.
  pub fn to_sorted_names(&self) -> Vec<&str> {
    self.0.iter().map(FileTag::as_str).collect()
  }
}

impl fmt::Display for FileTags {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.to_sorted_names().join(", "))
  }
}

impl FromIterator<FileTag> for FileTags {
  fn from_iter<I: IntoIterator<Item = FileTag>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}

impl<'a> IntoIterator for &'a FileTags {
  type Item = &'a FileTag;
  type IntoIter = std::collections::btree_set::Iter<'a, FileTag>;

  fn into_iter(self) -> Self::IntoIter {
    self.0.iter()
  }
}
