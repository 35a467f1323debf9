//! Source groups and source artifacts.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::language::filetags::FileTags;
use crate::language::location::CodeLocation;
use crate::language::properties::PropertyMap;
use crate::language::wildcards::SourceWildCards;

/// A source file on disk. Everything but the file path is inherited from
/// the surrounding group, which may override the tags the taggers derived.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceArtifact {
  pub absolute_file_path: String,
  pub file_tags: FileTags,
  pub override_file_tags: bool,
  pub properties: PropertyMap,
}

impl PartialEq for SourceArtifact {
  fn eq(&self, other: &Self) -> bool {
    self.absolute_file_path == other.absolute_file_path
      && self.file_tags == other.file_tags
      && self.override_file_tags == other.override_file_tags
      && self.properties == other.properties
  }
}

/// A group of source files within a product. `files` are the literally
/// listed files; `wildcards` holds the pattern elements and their expansion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedGroup {
  pub name: String,
  pub enabled: bool,
  pub location: CodeLocation,
  pub prefix: String,
  pub files: Vec<Arc<SourceArtifact>>,
  pub wildcards: Option<SourceWildCards>,
  pub properties: PropertyMap,
  pub file_tags: FileTags,
  pub override_tags: bool,
}

impl ResolvedGroup {
  /// All files of the group, including the expanded wildcard matches.
  pub fn all_files(&self) -> Vec<Arc<SourceArtifact>> {
    let mut files = self.files.clone();
    if let Some(wildcards) = &self.wildcards {
      files.extend(wildcards.files.iter().cloned());
    }
    files
  }
}
