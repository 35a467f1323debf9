//! Property maps.
//!
//! A [`PropertyMap`] is a copy-on-write mapping from names to script
//! values. Module properties live under the top-level `modules` key as
//! nested objects (`modules.cpp.optimization`), matching what the
//! resolver produces and what environment-setup scripts expect to see.
//! Cloning a map is cheap; the first mutation after a clone detaches it.

use std::collections::BTreeMap;
use std::sync::Arc;

use forge_lua::ScriptValue;
use serde::{Deserialize, Serialize};

/// Top-level key holding per-module property objects.
pub const MODULES_KEY: &str = "modules";

/// The engine's own module namespace. `forge.install` being truthy marks an
/// artifact as installable.
pub const ENGINE_MODULE: &str = "forge";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyMap {
  value: Arc<BTreeMap<String, ScriptValue>>,
}

impl PropertyMap {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_value(value: BTreeMap<String, ScriptValue>) -> Self {
    Self { value: Arc::new(value) }
  }

  pub fn value(&self) -> &BTreeMap<String, ScriptValue> {
    &self.value
  }

  pub fn get(&self, key: &str) -> Option<&ScriptValue> {
    self.value.get(key)
  }

  /// Look up a value along a path of object keys.
  pub fn value_at(&self, path: &[&str]) -> Option<&ScriptValue> {
    let (first, rest) = path.split_first()?;
    let mut current = self.value.get(*first)?;
    for key in rest {
      current = current.as_object()?.get(*key)?;
    }
    Some(current)
  }

  /// A module property: `modules.<module>.<key>`. Dotted module names
  /// address modules nested inside other modules.
  pub fn module_property(&self, module: &str, key: &str) -> Option<&ScriptValue> {
    let mut path = vec![MODULES_KEY];
    path.extend(module.split('.'));
    path.push(key);
    self.value_at(&path)
  }

  /// Convenience lookup into the engine's own module namespace.
  pub fn forge_property_value(&self, key: &str) -> Option<&ScriptValue> {
    self.module_property(ENGINE_MODULE, key)
  }

  /// Set a top-level value.
  pub fn set(&mut self, key: impl Into<String>, value: ScriptValue) {
    Arc::make_mut(&mut self.value).insert(key.into(), value);
  }

  /// Set a value at a dotted path, creating intermediate objects as needed.
  /// Non-object values along the way are replaced.
  pub fn set_value(&mut self, path: &[&str], value: ScriptValue) {
    let Some((first, rest)) = path.split_first() else {
      return;
    };
    let map = Arc::make_mut(&mut self.value);
    if rest.is_empty() {
      map.insert(first.to_string(), value);
      return;
    }
    let entry = map
      .entry(first.to_string())
      .or_insert_with(|| ScriptValue::Object(BTreeMap::new()));
    set_nested(entry, rest, value);
  }

  /// Set a module property along its dotted module path, e.g.
  /// `["cpp", "defines"]` lands at `modules.cpp.defines`.
  pub fn set_module_property(&mut self, name: &[String], value: ScriptValue) {
    let mut path: Vec<&str> = Vec::with_capacity(name.len() + 1);
    path.push(MODULES_KEY);
    path.extend(name.iter().map(String::as_str));
    self.set_value(&path, value);
  }
}

fn set_nested(target: &mut ScriptValue, path: &[&str], value: ScriptValue) {
  let Some((first, rest)) = path.split_first() else {
    return;
  };
  if !matches!(target, ScriptValue::Object(_)) {
    *target = ScriptValue::Object(BTreeMap::new());
  }
  let ScriptValue::Object(map) = target else {
    unreachable!();
  };
  if rest.is_empty() {
    map.insert(first.to_string(), value);
    return;
  }
  let entry = map
    .entry(first.to_string())
    .or_insert_with(|| ScriptValue::Object(BTreeMap::new()));
  set_nested(entry, rest, value);
}

/// Search a modules map recursively for a module's property object; modules
/// nested inside other modules live under their own `modules` submap.
pub fn find_module_map_recursively<'a>(
  modules: &'a BTreeMap<String, ScriptValue>,
  module_name: &str,
) -> Option<&'a BTreeMap<String, ScriptValue>> {
  for (name, value) in modules {
    let Some(object) = value.as_object() else {
      continue;
    };
    if name == module_name {
      return Some(object);
    }
    if let Some(nested) = object.get(MODULES_KEY).and_then(ScriptValue::as_object)
      && let Some(found) = find_module_map_recursively(nested, module_name)
    {
      return Some(found);
    }
  }
  None
}
