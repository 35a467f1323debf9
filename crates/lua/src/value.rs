//! Host-side representation of script values.
//!
//! [`ScriptValue`] is the serializable bridge between Lua and the engine's
//! property maps. Tables are discriminated into arrays (contiguous integer
//! keys from 1) and objects (everything else); an empty table reads as an
//! empty array, which is what output-artifact scripts return when a rule
//! produces nothing.

use std::collections::BTreeMap;

use mlua::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScriptValue {
  Null,
  Bool(bool),
  Number(f64),
  String(String),
  Array(Vec<ScriptValue>),
  Object(BTreeMap<String, ScriptValue>),
}

impl Default for ScriptValue {
  fn default() -> Self {
    ScriptValue::Null
  }
}

impl ScriptValue {
  /// Convert a Lua value into a `ScriptValue`.
  ///
  /// Functions, userdata and threads have no host representation and are
  /// rejected.
  pub fn from_lua(value: LuaValue) -> Result<Self> {
    match value {
      LuaValue::Nil => Ok(ScriptValue::Null),
      LuaValue::Boolean(b) => Ok(ScriptValue::Bool(b)),
      LuaValue::Integer(n) => Ok(ScriptValue::Number(n as f64)),
      LuaValue::Number(n) => Ok(ScriptValue::Number(n)),
      LuaValue::String(s) => Ok(ScriptValue::String(s.to_str()?.to_string())),
      LuaValue::Table(t) => Self::from_lua_table(&t),
      other => Err(Error::Convert(format!(
        "cannot convert a {} to a script value",
        other.type_name()
      ))),
    }
  }

  fn from_lua_table(table: &LuaTable) -> Result<Self> {
    let len = table.raw_len();
    let mut total = 0usize;
    let mut has_non_sequence_key = false;
    for pair in table.clone().pairs::<LuaValue, LuaValue>() {
      let (key, _) = pair?;
      total += 1;
      match key {
        LuaValue::Integer(i) if i >= 1 && (i as usize) <= len => {}
        _ => has_non_sequence_key = true,
      }
    }

    if !has_non_sequence_key && total == len {
      // Sequence (possibly empty): array.
      let mut items = Vec::with_capacity(len);
      for value in table.clone().sequence_values::<LuaValue>() {
        items.push(Self::from_lua(value?)?);
      }
      return Ok(ScriptValue::Array(items));
    }

    let mut map = BTreeMap::new();
    for pair in table.clone().pairs::<LuaValue, LuaValue>() {
      let (key, value) = pair?;
      let key = match key {
        LuaValue::String(s) => s.to_str()?.to_string(),
        LuaValue::Integer(i) => i.to_string(),
        LuaValue::Number(n) => n.to_string(),
        other => {
          return Err(Error::Convert(format!(
            "table key of type {} is not representable",
            other.type_name()
          )));
        }
      };
      map.insert(key, Self::from_lua(value)?);
    }
    Ok(ScriptValue::Object(map))
  }

  /// Convert back into a Lua value within the given state.
  pub fn to_lua(&self, lua: &Lua) -> LuaResult<LuaValue> {
    Ok(match self {
      ScriptValue::Null => LuaValue::Nil,
      ScriptValue::Bool(b) => LuaValue::Boolean(*b),
      ScriptValue::Number(n) => LuaValue::Number(*n),
      ScriptValue::String(s) => LuaValue::String(lua.create_string(s)?),
      ScriptValue::Array(items) => {
        let table = lua.create_table()?;
        for (index, item) in items.iter().enumerate() {
          table.set(index + 1, item.to_lua(lua)?)?;
        }
        LuaValue::Table(table)
      }
      ScriptValue::Object(map) => {
        let table = lua.create_table()?;
        for (key, item) in map {
          table.set(key.as_str(), item.to_lua(lua)?)?;
        }
        LuaValue::Table(table)
      }
    })
  }

  /// Truthiness with Lua semantics: only `Null` and `false` are falsy.
  pub fn truthy(&self) -> bool {
    !matches!(self, ScriptValue::Null | ScriptValue::Bool(false))
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      ScriptValue::String(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      ScriptValue::Bool(b) => Some(*b),
      _ => None,
    }
  }

  pub fn as_object(&self) -> Option<&BTreeMap<String, ScriptValue>> {
    match self {
      ScriptValue::Object(map) => Some(map),
      _ => None,
    }
  }

  /// Coerce to a display string the way scripts expect path expressions to
  /// coerce. Returns `None` for values with no string rendering.
  pub fn coerce_string(&self) -> Option<String> {
    match self {
      ScriptValue::String(s) => Some(s.clone()),
      ScriptValue::Number(n) => Some(if n.fract() == 0.0 {
        format!("{}", *n as i64)
      } else {
        format!("{n}")
      }),
      ScriptValue::Bool(b) => Some(b.to_string()),
      _ => None,
    }
  }

  /// Interpret as a list of strings: a string becomes a one-element list,
  /// `Null` an empty one, and arrays contribute their string elements.
  /// Anything else yields an empty list.
  pub fn string_list(&self) -> Vec<String> {
    match self {
      ScriptValue::Null => Vec::new(),
      ScriptValue::String(s) => vec![s.clone()],
      ScriptValue::Array(items) => items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
      _ => Vec::new(),
    }
  }
}
