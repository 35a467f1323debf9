//! User-authored scripts attached to resolved entities.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::language::location::CodeLocation;
use crate::util::arc_equals;

/// The file a script was written in, with the named Lua chunks it imports.
/// Imports are evaluated into the evaluation scope before any script from
/// this file runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileContext {
  pub file_path: String,
  pub imports: BTreeMap<String, String>,
}

/// A script taken verbatim from a build description file.
///
/// `source_code` is a Lua expression; for scripts that are functions it is a
/// function expression invoked with the values named by `argument_names`.
/// A script with an invalid location marks an absent binding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptFunction {
  pub source_code: String,
  pub argument_names: Vec<String>,
  pub location: CodeLocation,
  pub file_context: Option<Arc<FileContext>>,
}

impl ScriptFunction {
  pub fn new(source_code: impl Into<String>, location: CodeLocation) -> Self {
    Self {
      source_code: source_code.into(),
      argument_names: Vec::new(),
      location,
      file_context: None,
    }
  }

  pub fn is_valid(&self) -> bool {
    self.location.line != -1
  }
}

impl PartialEq for ScriptFunction {
  fn eq(&self, other: &Self) -> bool {
    self.source_code == other.source_code
      && self.argument_names == other.argument_names
      && self.location == other.location
      && arc_equals(&self.file_context, &other.file_context)
  }
}
