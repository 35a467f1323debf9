//! Transformers: instantiated rules.
//!
//! A transformer records the concrete inputs, outputs, commands, and
//! change-tracking state of one rule application. Its command list is
//! produced by the rule's prepare script.

use std::collections::BTreeMap;
use std::sync::Arc;

use forge_lua::{ScriptRuntime, ScriptValue};
use mlua::prelude::*;
use serde::{Deserialize, Serialize};

use crate::buildgraph::artifact::{ArtifactId, ArtifactSet};
use crate::buildgraph::builddata::ProjectBuildData;
use crate::language::rule::Rule;
use crate::util::paths::{base_name, complete_base_name};

/// Index of a transformer in the project graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransformerId(pub u32);

/// One build command produced by a prepare script: either a process
/// invocation or a script executed by the scheduler's host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RuleCommand {
  Process {
    program: String,
    arguments: Vec<String>,
    description: String,
  },
  Script {
    source_code: String,
    description: String,
  },
}

impl RuleCommand {
  /// Parse one command table. A table with a `program` is a process
  /// command; one with a `sourceCode` is a script command.
  pub fn from_script_value(value: &ScriptValue) -> Result<Self, String> {
    let Some(object) = value.as_object() else {
      return Err("a command must be an object".to_string());
    };
    let description = object
      .get("description")
      .and_then(ScriptValue::as_str)
      .unwrap_or_default()
      .to_string();
    if let Some(program) = object.get("program").and_then(ScriptValue::as_str) {
      let arguments = object
        .get("arguments")
        .map(ScriptValue::string_list)
        .unwrap_or_default();
      return Ok(RuleCommand::Process {
        program: program.to_string(),
        arguments,
        description,
      });
    }
    if let Some(source_code) = object.get("sourceCode").and_then(ScriptValue::as_str) {
      return Ok(RuleCommand::Script {
        source_code: source_code.to_string(),
        description,
      });
    }
    Err("a command needs either a 'program' or a 'sourceCode' property".to_string())
  }

  /// Parse what a prepare script returned: nothing, one command, or an
  /// array of commands.
  pub fn list_from_script_value(value: &ScriptValue) -> Result<Vec<Self>, String> {
    match value {
      ScriptValue::Null => Ok(Vec::new()),
      ScriptValue::Array(items) => items.iter().map(Self::from_script_value).collect(),
      ScriptValue::Object(_) => Ok(vec![Self::from_script_value(value)?]),
      other => Err(format!("a prepare script must return commands, not {other:?}")),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformer {
  pub rule: Arc<Rule>,
  pub inputs: ArtifactSet,
  pub outputs: ArtifactSet,
  pub explicitly_depends_on: ArtifactSet,
  pub commands: Vec<RuleCommand>,
  pub always_run: bool,
  pub commands_need_change_tracking: bool,
  /// Environment variables the prepare script read while the commands were
  /// created, with the values it observed.
  pub requested_env_reads: BTreeMap<String, Option<String>>,
  /// Fingerprints of the project property maps the prepare script could
  /// observe while the commands were created, keyed by project name.
  pub project_property_reads: BTreeMap<String, String>,
}

impl Transformer {
  pub fn new(rule: Arc<Rule>, inputs: ArtifactSet, explicitly_depends_on: ArtifactSet, always_run: bool) -> Self {
    Self {
      rule,
      inputs,
      outputs: ArtifactSet::new(),
      explicitly_depends_on,
      commands: Vec::new(),
      always_run,
      commands_need_change_tracking: false,
      requested_env_reads: BTreeMap::new(),
      project_property_reads: BTreeMap::new(),
    }
  }

  /// Carry the change-tracking state of the transformer previously
  /// producing the same outputs onto this one.
  pub fn rescue_change_tracking_data(&mut self, old: &Transformer) {
    self.commands_need_change_tracking = old.commands_need_change_tracking;
    self.requested_env_reads = old.requested_env_reads.clone();
    self.project_property_reads = old.project_property_reads.clone();
  }
}

/// Build the Lua table for one artifact, as scripts see it.
pub fn artifact_table(runtime: &ScriptRuntime, graph: &ProjectBuildData, id: ArtifactId) -> LuaResult<LuaTable> {
  let artifact = graph.artifact(id);
  let lua = runtime.lua();
  let table = lua.create_table()?;
  table.set("filePath", artifact.file_path.as_str())?;
  table.set("fileName", artifact.file_name())?;
  table.set("baseName", base_name(artifact.file_name()))?;
  table.set("completeBaseName", complete_base_name(artifact.file_name()))?;
  table.set("alwaysUpdated", artifact.always_updated)?;
  let tags = lua.create_table()?;
  for (index, tag) in artifact.file_tags.iter().enumerate() {
    tags.set(index + 1, tag.as_str())?;
  }
  table.set("fileTags", tags)?;
  Ok(table)
}

/// Expose a set of artifacts into a scope: a tag-keyed table under
/// `plural_name`, plus the single artifact under `singular_name` when the
/// set has exactly one element.
pub fn expose_artifacts(
  runtime: &ScriptRuntime,
  graph: &ProjectBuildData,
  scope: &LuaTable,
  plural_name: &str,
  singular_name: Option<&str>,
  artifacts: &ArtifactSet,
) -> LuaResult<()> {
  let lua = runtime.lua();
  let by_tag = lua.create_table()?;
  for &id in artifacts {
    let table = artifact_table(runtime, graph, id)?;
    for tag in graph.artifact(id).file_tags.iter() {
      let list: LuaTable = match by_tag.get::<Option<LuaTable>>(tag.as_str())? {
        Some(list) => list,
        None => {
          let list = lua.create_table()?;
          by_tag.set(tag.as_str(), &list)?;
          list
        }
      };
      list.set(list.raw_len() + 1, &table)?;
    }
  }
  scope.set(plural_name, by_tag)?;

  if let Some(singular_name) = singular_name {
    if artifacts.len() == 1 {
      let id = *artifacts.iter().next().unwrap();
      scope.set(singular_name, artifact_table(runtime, graph, id)?)?;
    } else {
      scope.set(singular_name, LuaValue::Nil)?;
    }
  }
  Ok(())
}
