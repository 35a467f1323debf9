//! Source locations for diagnostics.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A position in a build description file. A location with `line == -1` is
/// invalid and marks an absent script.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CodeLocation {
  pub file_path: String,
  pub line: i32,
  pub column: i32,
}

impl CodeLocation {
  pub fn new(file_path: impl Into<String>, line: i32, column: i32) -> Self {
    Self {
      file_path: file_path.into(),
      line,
      column,
    }
  }

  pub fn invalid() -> Self {
    Self {
      file_path: String::new(),
      line: -1,
      column: -1,
    }
  }

  pub fn is_valid(&self) -> bool {
    self.line != -1
  }
}

impl Default for CodeLocation {
  fn default() -> Self {
    Self::invalid()
  }
}

impl fmt::Display for CodeLocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}:{}", self.file_path, self.line, self.column)
  }
}
