//! Process environment assembled by user scripts.
//!
//! Environment-setup scripts never touch the real process environment.
//! They mutate a [`ProcessEnvironment`] value that the engine installs on
//! the runtime before running them and takes back afterwards. The map is
//! ordered so that two assemblies over the same module graph produce
//! byte-identical results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An ordered name/value environment map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEnvironment {
  vars: BTreeMap<String, String>,
}

impl ProcessEnvironment {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    self.vars.get(name).map(String::as_str)
  }

  pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
    self.vars.insert(name.into(), value.into());
  }

  pub fn remove(&mut self, name: &str) {
    self.vars.remove(name);
  }

  pub fn is_empty(&self) -> bool {
    self.vars.is_empty()
  }

  pub fn len(&self) -> usize {
    self.vars.len()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
    self.vars.iter()
  }
}

impl FromIterator<(String, String)> for ProcessEnvironment {
  fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
    Self {
      vars: iter.into_iter().collect(),
    }
  }
}
