//! Resolved dependency scanners.
//!
//! Scanners are declared next to rules and later drive dependency
//! discovery in the scheduler; the engine only models and persists them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::language::filetags::FileTags;
use crate::language::module::ResolvedModule;
use crate::language::script::ScriptFunction;
use crate::util::arc_equals;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolvedScanner {
  pub module: Option<Arc<ResolvedModule>>,
  pub inputs: FileTags,
  pub recursive: bool,
  pub search_paths_script: ScriptFunction,
  pub scan_script: ScriptFunction,
}

impl PartialEq for ResolvedScanner {
  fn eq(&self, other: &Self) -> bool {
    arc_equals(&self.module, &other.module)
      && self.inputs == other.inputs
      && self.recursive == other.recursive
      && self.search_paths_script == other.search_paths_script
      && self.scan_script == other.scan_script
  }
}
