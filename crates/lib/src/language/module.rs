//! Resolved modules.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::language::script::ScriptFunction;

/// A module attached to a product: a name, the names of the modules it
/// depends on, and its environment-setup scripts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolvedModule {
  pub name: String,
  pub module_dependencies: Vec<String>,
  pub setup_build_environment_script: ScriptFunction,
  pub setup_run_environment_script: ScriptFunction,
}

impl PartialEq for ResolvedModule {
  fn eq(&self, other: &Self) -> bool {
    // Dependency order is irrelevant for identity.
    let deps: BTreeSet<&String> = self.module_dependencies.iter().collect();
    let other_deps: BTreeSet<&String> = other.module_dependencies.iter().collect();
    self.name == other.name
      && deps == other_deps
      && self.setup_build_environment_script == other.setup_build_environment_script
      && self.setup_run_environment_script == other.setup_run_environment_script
  }
}
