//! Build data: the node arenas and per-product indices.
//!
//! The project-wide [`ProjectBuildData`] owns every artifact and
//! transformer in slot arenas; products reference their nodes through
//! [`ProductBuildData`], which keeps the path index, the tag index, and the
//! changed-inputs registry. The tag index is maintained transactionally
//! with every insertion, removal and retagging.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::buildgraph::artifact::{Artifact, ArtifactId, ArtifactKind, ArtifactSet};
use crate::buildgraph::transformer::{Transformer, TransformerId};
use crate::language::filetags::{FileTag, FileTags};
use crate::language::product::ResolvedProduct;
use crate::language::rule::Rule;

/// Per-product view of the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductBuildData {
  pub nodes: ArtifactSet,
  pub roots: ArtifactSet,
  pub artifacts_by_path: BTreeMap<String, ArtifactId>,
  pub artifacts_by_file_tag: BTreeMap<FileTag, ArtifactSet>,
  /// Keyed by rule identity; see [`Rule::identity`].
  pub artifacts_with_changed_inputs_per_rule: BTreeMap<String, ArtifactSet>,
}

/// The whole graph of one top-level project.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectBuildData {
  artifacts: Vec<Option<Artifact>>,
  transformers: Vec<Option<Transformer>>,
  products: BTreeMap<String, ProductBuildData>,
  dirty: bool,
}

impl ProjectBuildData {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_dirty(&self) -> bool {
    self.dirty
  }

  pub fn set_dirty(&mut self) {
    self.dirty = true;
  }

  pub fn set_clean(&mut self) {
    self.dirty = false;
  }

  pub fn artifact(&self, id: ArtifactId) -> &Artifact {
    self.artifacts[id.0 as usize].as_ref().expect("stale artifact id")
  }

  pub fn artifact_mut(&mut self, id: ArtifactId) -> &mut Artifact {
    self.artifacts[id.0 as usize].as_mut().expect("stale artifact id")
  }

  pub fn is_alive(&self, id: ArtifactId) -> bool {
    self
      .artifacts
      .get(id.0 as usize)
      .map(Option::is_some)
      .unwrap_or(false)
  }

  /// Ids of all live artifacts, in creation order.
  pub fn artifact_ids(&self) -> impl Iterator<Item = ArtifactId> + '_ {
    self
      .artifacts
      .iter()
      .enumerate()
      .filter(|(_, slot)| slot.is_some())
      .map(|(index, _)| ArtifactId(index as u32))
  }

  pub fn transformer(&self, id: TransformerId) -> &Transformer {
    self.transformers[id.0 as usize].as_ref().expect("stale transformer id")
  }

  pub fn transformer_mut(&mut self, id: TransformerId) -> &mut Transformer {
    self.transformers[id.0 as usize].as_mut().expect("stale transformer id")
  }

  pub fn add_transformer(&mut self, transformer: Transformer) -> TransformerId {
    let id = TransformerId(self.transformers.len() as u32);
    self.transformers.push(Some(transformer));
    id
  }

  pub fn product_data(&self, product: &str) -> Option<&ProductBuildData> {
    self.products.get(product)
  }

  pub fn product_data_mut(&mut self, product: &str) -> &mut ProductBuildData {
    self.products.entry(product.to_string()).or_default()
  }

  /// Insert an artifact and index it: node set, path index, tag index, and
  /// the root set (a fresh artifact has no parents).
  pub fn insert_artifact(&mut self, artifact: Artifact) -> ArtifactId {
    let id = ArtifactId(self.artifacts.len() as u32);
    let product = artifact.product.clone();
    let path = artifact.file_path.clone();
    let tags = artifact.file_tags.clone();
    self.artifacts.push(Some(artifact));

    let data = self.product_data_mut(&product);
    data.nodes.insert(id);
    data.roots.insert(id);
    data.artifacts_by_path.insert(path, id);
    for tag in &tags {
      data.artifacts_by_file_tag.entry(tag.clone()).or_default().insert(id);
    }
    id
  }

  /// Replace an artifact's tag set, keeping the tag index in step.
  pub fn set_artifact_tags(&mut self, id: ArtifactId, tags: FileTags) {
    let product = self.artifact(id).product.clone();
    let old_tags = std::mem::replace(&mut self.artifact_mut(id).file_tags, tags.clone());

    let data = self.product_data_mut(&product);
    for tag in &old_tags {
      if let Some(set) = data.artifacts_by_file_tag.get_mut(tag) {
        set.remove(&id);
        if set.is_empty() {
          data.artifacts_by_file_tag.remove(tag);
        }
      }
    }
    for tag in &tags {
      data.artifacts_by_file_tag.entry(tag.clone()).or_default().insert(id);
    }
  }

  pub fn add_artifact_tag(&mut self, id: ArtifactId, tag: FileTag) {
    let product = self.artifact(id).product.clone();
    if self.artifact_mut(id).file_tags.insert(tag.clone()) {
      self
        .product_data_mut(&product)
        .artifacts_by_file_tag
        .entry(tag)
        .or_default()
        .insert(id);
    }
  }

  /// Create the dependency edge `parent -> child` (parent depends on
  /// child). A child with a parent is no longer a root.
  pub fn connect(&mut self, parent: ArtifactId, child: ArtifactId) {
    assert!(parent != child);
    if self.artifact_mut(parent).children.insert(child) {
      self.artifact_mut(child).parents.insert(parent);
      let product = self.artifact(child).product.clone();
      self.product_data_mut(&product).roots.remove(&child);
    }
  }

  pub fn lookup_artifact(&self, product: &str, path: &str) -> Option<ArtifactId> {
    self.products.get(product)?.artifacts_by_path.get(path).copied()
  }

  pub fn artifacts_by_file_tag(&self, product: &str, tag: &FileTag) -> ArtifactSet {
    self
      .products
      .get(product)
      .and_then(|data| data.artifacts_by_file_tag.get(tag))
      .cloned()
      .unwrap_or_default()
  }

  /// A product's target artifacts: its parent-less artifacts whose tags
  /// intersect the product's type.
  pub fn target_artifacts(&self, product: &ResolvedProduct) -> ArtifactSet {
    let Some(data) = self.products.get(&product.unique_name()) else {
      return ArtifactSet::new();
    };
    data
      .roots
      .iter()
      .copied()
      .filter(|&id| self.artifact(id).file_tags.intersects(&product.file_tags))
      .collect()
  }

  /// Remove one artifact: unlink its edges, drop it from every index, and
  /// free its slot. Children left without parents become roots again.
  pub fn remove_artifact(&mut self, id: ArtifactId) -> Artifact {
    let artifact = self.artifacts[id.0 as usize].take().expect("stale artifact id");
    debug!(path = %artifact.file_path, "removing artifact");

    for &child in &artifact.children {
      if self.is_alive(child) {
        self.artifact_mut(child).parents.remove(&id);
        if self.artifact(child).parents.is_empty() {
          let product = self.artifact(child).product.clone();
          self.product_data_mut(&product).roots.insert(child);
        }
      }
    }
    for &parent in &artifact.parents {
      if self.is_alive(parent) {
        self.artifact_mut(parent).children.remove(&id);
      }
    }

    let data = self.product_data_mut(&artifact.product);
    data.nodes.remove(&id);
    data.roots.remove(&id);
    data.artifacts_by_path.remove(&artifact.file_path);
    for tag in &artifact.file_tags {
      if let Some(set) = data.artifacts_by_file_tag.get_mut(tag) {
        set.remove(&id);
        if set.is_empty() {
          data.artifacts_by_file_tag.remove(tag);
        }
      }
    }
    for set in data.artifacts_with_changed_inputs_per_rule.values_mut() {
      set.remove(&id);
    }

    artifact
  }

  /// Remove an artifact and, recursively, every generated parent left with
  /// no dependencies at all. Removed `(id, file_path)` pairs are appended
  /// to `removed`.
  pub fn remove_artifact_and_exclusive_dependents(&mut self, id: ArtifactId, removed: &mut Vec<(ArtifactId, String)>) {
    let parents: Vec<ArtifactId> = self.artifact(id).parents.iter().copied().collect();
    let artifact = self.remove_artifact(id);
    removed.push((id, artifact.file_path));

    for parent in parents {
      if self.is_alive(parent)
        && self.artifact(parent).kind == ArtifactKind::Generated
        && self.artifact(parent).children.is_empty()
      {
        self.remove_artifact_and_exclusive_dependents(parent, removed);
      }
    }
  }

  /// Record an artifact whose inputs changed. Only multiplex rules are
  /// re-applied over their full input set, so others are not registered.
  pub fn register_artifact_with_changed_inputs(&mut self, id: ArtifactId) {
    let artifact = self.artifact(id);
    let transformer_id = artifact.transformer.expect("artifact has no transformer");
    let product = artifact.product.clone();
    let rule = self.transformer(transformer_id).rule.clone();
    if rule.multiplex {
      self
        .product_data_mut(&product)
        .artifacts_with_changed_inputs_per_rule
        .entry(rule.identity())
        .or_default()
        .insert(id);
    }
  }

  pub fn unregister_artifact_with_changed_inputs(&mut self, id: ArtifactId) {
    let artifact = self.artifact(id);
    let transformer_id = artifact.transformer.expect("artifact has no transformer");
    let product = artifact.product.clone();
    let rule = self.transformer(transformer_id).rule.clone();
    if let Some(set) = self
      .product_data_mut(&product)
      .artifacts_with_changed_inputs_per_rule
      .get_mut(&rule.identity())
    {
      set.remove(&id);
    }
  }

  pub fn unmark_for_reapplication(&mut self, product: &str, rule: &Rule) {
    self
      .product_data_mut(product)
      .artifacts_with_changed_inputs_per_rule
      .remove(&rule.identity());
  }

  pub fn is_marked_for_reapplication(&self, product: &str, rule: &Rule) -> bool {
    self
      .products
      .get(product)
      .and_then(|data| data.artifacts_with_changed_inputs_per_rule.get(&rule.identity()))
      .map(|set| !set.is_empty())
      .unwrap_or(false)
  }

  /// Rebuild parent edges and root sets from the child edges. Run after a
  /// graph is loaded: only children are authoritative on the wire.
  pub fn rebuild_parent_edges(&mut self) {
    let ids: Vec<ArtifactId> = self.artifact_ids().collect();
    for &id in &ids {
      self.artifact_mut(id).parents.clear();
    }
    for &id in &ids {
      let children: Vec<ArtifactId> = self.artifact(id).children.iter().copied().collect();
      for child in children {
        self.artifact_mut(child).parents.insert(id);
      }
    }
    for data in self.products.values_mut() {
      data.roots.clear();
    }
    for &id in &ids {
      if self.artifact(id).parents.is_empty() {
        let product = self.artifact(id).product.clone();
        self.product_data_mut(&product).roots.insert(id);
      }
    }
  }

  /// The artifacts generated (transitively, if `recursive`) from the file
  /// at `base_file`, filtered by tags unless the filter is empty.
  pub fn generated_files(&self, base_file: &str, recursive: bool, tags: &FileTags) -> Vec<String> {
    for id in self.artifact_ids() {
      if self.artifact(id).file_path == base_file {
        let mut result = Vec::new();
        self.find_generated_files(id, recursive, tags, &mut result);
        return result;
      }
    }
    Vec::new()
  }

  fn find_generated_files(&self, id: ArtifactId, recursive: bool, tags: &FileTags, result: &mut Vec<String>) {
    for &parent in &self.artifact(id).parents {
      if tags.is_empty() || self.artifact(parent).file_tags.intersects(tags) {
        result.push(self.artifact(parent).file_path.clone());
      }
      if recursive {
        self.find_generated_files(parent, recursive, tags, result);
      }
    }
  }
}
