//! Rules and their output templates.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::language::filetags::FileTags;
use crate::language::location::CodeLocation;
use crate::language::module::ResolvedModule;
use crate::language::script::ScriptFunction;
use crate::util::arc_equals;

/// One property binding of a rule artifact: a dotted module-property path
/// and the expression evaluated per output artifact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Binding {
  pub name: Vec<String>,
  pub code: String,
  pub location: CodeLocation,
}

impl Binding {
  pub fn dotted_name(&self) -> String {
    self.name.join(".")
  }
}

/// The template for one output of a static rule. `file_path` is a script
/// expression evaluated when the rule is applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleArtifact {
  pub file_path: String,
  pub file_tags: FileTags,
  pub always_updated: bool,
  pub location: CodeLocation,
  pub file_path_location: CodeLocation,
  pub bindings: Vec<Binding>,
}

impl PartialEq for RuleArtifact {
  fn eq(&self, other: &Self) -> bool {
    // Binding declaration order is irrelevant for identity.
    let bindings: BTreeSet<&Binding> = self.bindings.iter().collect();
    let other_bindings: BTreeSet<&Binding> = other.bindings.iter().collect();
    self.file_path == other.file_path
      && self.file_tags == other.file_tags
      && self.always_updated == other.always_updated
      && bindings == other_bindings
  }
}

/// Argument names passed to prepare scripts, in order.
pub const PREPARE_ARGUMENTS: [&str; 7] = [
  "project",
  "product",
  "inputs",
  "outputs",
  "input",
  "output",
  "explicitlyDependsOn",
];

/// Argument names passed to output-artifacts scripts, in order.
pub const OUTPUT_ARTIFACTS_ARGUMENTS: [&str; 5] = ["project", "product", "inputs", "input", "explicitlyDependsOn"];

/// A rule: consumes artifacts matching `inputs`, produces artifacts
/// described either by template `artifacts` (static) or by
/// `output_artifacts_script` (dynamic).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rule {
  pub name: String,
  pub prepare_script: ScriptFunction,
  pub output_artifacts_script: ScriptFunction,
  pub module: Option<Arc<ResolvedModule>>,
  pub inputs: FileTags,
  pub output_file_tags: FileTags,
  pub auxiliary_inputs: FileTags,
  pub excluded_auxiliary_inputs: FileTags,
  pub inputs_from_dependencies: FileTags,
  pub explicitly_depends_on: FileTags,
  pub explicitly_depends_on_from_dependencies: FileTags,
  pub multiplex: bool,
  pub always_run: bool,
  pub artifacts: Vec<Arc<RuleArtifact>>,
  pub requires_inputs: bool,
}

impl Rule {
  /// A dynamic rule derives its outputs from a script instead of templates.
  pub fn is_dynamic(&self) -> bool {
    self.output_artifacts_script.is_valid()
  }

  pub fn accepts_as_input(&self, artifact_tags: &FileTags) -> bool {
    artifact_tags.intersects(&self.inputs)
  }

  pub fn declares_inputs(&self) -> bool {
    !self.inputs.is_empty() || !self.inputs_from_dependencies.is_empty()
  }

  /// The union of the template artifacts' tags.
  pub fn static_output_file_tags(&self) -> FileTags {
    let mut result = FileTags::new();
    for artifact in &self.artifacts {
      result.unite(&artifact.file_tags);
    }
    result
  }

  pub fn collected_output_file_tags(&self) -> FileTags {
    if self.output_file_tags.is_empty() {
      self.static_output_file_tags()
    } else {
      self.output_file_tags.clone()
    }
  }

  /// A stable identity string usable as a map key across store/load cycles.
  pub fn identity(&self) -> String {
    format!("{}{}", self.name, self)
  }
}

impl fmt::Display for Rule {
  /// Canonical representation: `[sorted output tags][sorted input tags]`.
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let output_tags = self.collected_output_file_tags();
    let input_tags = self.inputs.union(&self.inputs_from_dependencies);
    write!(
      f,
      "[{}][{}]",
      output_tags.to_sorted_names().join(","),
      input_tags.to_sorted_names().join(",")
    )
  }
}

impl PartialEq for Rule {
  fn eq(&self, other: &Self) -> bool {
    if self.artifacts.len() != other.artifacts.len() {
      return false;
    }
    for (a, b) in self.artifacts.iter().zip(&other.artifacts) {
      if !(Arc::ptr_eq(a, b) || **a == **b) {
        return false;
      }
    }
    self.name == other.name
      && self.prepare_script == other.prepare_script
      && self.output_artifacts_script == other.output_artifacts_script
      && arc_equals(&self.module, &other.module)
      && self.inputs == other.inputs
      && self.output_file_tags == other.output_file_tags
      && self.auxiliary_inputs == other.auxiliary_inputs
      && self.excluded_auxiliary_inputs == other.excluded_auxiliary_inputs
      && self.inputs_from_dependencies == other.inputs_from_dependencies
      && self.explicitly_depends_on == other.explicitly_depends_on
      && self.explicitly_depends_on_from_dependencies == other.explicitly_depends_on_from_dependencies
      && self.multiplex == other.multiplex
      && self.always_run == other.always_run
      && self.requires_inputs == other.requires_inputs
  }
}
