//! Property extraction from script-returned artifact objects.
//!
//! Dynamic rules describe outputs as plain objects. Beyond the built-in
//! artifact properties, any other key is a module property patch: nested
//! objects extend the module path, leaves become `(module, name, value)`
//! entries assigned into the artifact's property map.

use std::collections::BTreeMap;

use forge_lua::ScriptValue;

use crate::language::properties::{PropertyMap, MODULES_KEY};

/// Property names that belong to the artifact object itself and are never
/// treated as module property patches.
const ARTIFACT_ITEM_PROPERTIES: [&str; 5] = ["condition", "filePath", "fileTags", "alwaysUpdated", "explicitlyDependsOn"];

struct Entry {
  module: String,
  name: String,
  value: ScriptValue,
}

fn extract_property_values(object: &BTreeMap<String, ScriptValue>, module_name: &str, entries: &mut Vec<Entry>) {
  for (name, value) in object {
    if module_name.is_empty() && ARTIFACT_ITEM_PROPERTIES.contains(&name.as_str()) {
      continue;
    }
    match value {
      ScriptValue::Object(nested) => {
        let nested_module = if module_name.is_empty() {
          name.clone()
        } else {
          format!("{module_name}.{name}")
        };
        extract_property_values(nested, &nested_module, entries);
      }
      other => entries.push(Entry {
        module: module_name.to_string(),
        name: name.clone(),
        value: other.clone(),
      }),
    }
  }
}

/// Apply the module property patches found in `object` to a clone of
/// `properties`, returning whether anything was assigned.
pub fn apply_artifact_bindings(properties: &mut PropertyMap, object: &BTreeMap<String, ScriptValue>) -> bool {
  let mut entries = Vec::new();
  extract_property_values(object, "", &mut entries);
  if entries.is_empty() {
    return false;
  }

  for entry in entries {
    if entry.module.is_empty() {
      properties.set_value(&[entry.name.as_str()], entry.value);
    } else {
      let mut path: Vec<&str> = vec![MODULES_KEY];
      path.extend(entry.module.split('.'));
      path.push(entry.name.as_str());
      properties.set_value(&path, entry.value);
    }
  }
  true
}
