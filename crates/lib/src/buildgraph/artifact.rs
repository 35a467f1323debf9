//! Artifacts: the file nodes of the build graph.

use std::collections::BTreeSet;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::buildgraph::transformer::TransformerId;
use crate::language::filetags::{FileTag, FileTags};
use crate::language::properties::PropertyMap;
use crate::util::paths::file_name;

/// Index of an artifact in the project graph's arena. Ids are assigned in
/// creation order and are stable for the lifetime of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(pub u32);

/// An ordered set of artifact ids; iterates in creation order.
pub type ArtifactSet = BTreeSet<ArtifactId>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
  Generated,
  SourceFile,
}

/// A file known to the build graph. `children` are the artifacts this one
/// depends on; `parents` the artifacts depending on it. A generated
/// artifact points at the transformer producing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
  pub file_path: String,
  pub file_tags: FileTags,
  pub properties: PropertyMap,
  pub kind: ArtifactKind,
  pub always_updated: bool,
  /// Marked on artifacts that a module (rather than the product itself)
  /// declares as its targets; they count as dependency artifacts when
  /// additional inputs are collected.
  pub target_of_module: bool,
  pub transformer: Option<TransformerId>,
  /// Not persisted; rebuilt from the child edges after a load.
  #[serde(skip)]
  pub parents: ArtifactSet,
  pub children: ArtifactSet,
  pub timestamp: Option<SystemTime>,
  /// Unique name of the owning product.
  pub product: String,
}

impl Artifact {
  pub fn new_generated(file_path: impl Into<String>, product: impl Into<String>) -> Self {
    Self::new(file_path, product, ArtifactKind::Generated)
  }

  pub fn new_source(file_path: impl Into<String>, product: impl Into<String>) -> Self {
    Self::new(file_path, product, ArtifactKind::SourceFile)
  }

  fn new(file_path: impl Into<String>, product: impl Into<String>, kind: ArtifactKind) -> Self {
    Self {
      file_path: file_path.into(),
      file_tags: FileTags::new(),
      properties: PropertyMap::new(),
      kind,
      always_updated: false,
      target_of_module: false,
      transformer: None,
      parents: ArtifactSet::new(),
      children: ArtifactSet::new(),
      timestamp: None,
      product: product.into(),
    }
  }

  pub fn file_name(&self) -> &str {
    file_name(&self.file_path)
  }

  pub fn add_file_tag(&mut self, tag: FileTag) {
    self.file_tags.insert(tag);
  }

  pub fn clear_timestamp(&mut self) {
    self.timestamp = None;
  }
}
