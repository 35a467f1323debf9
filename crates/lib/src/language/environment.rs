//! Environment assembly.
//!
//! A product's build and run environments are put together by the
//! environment-setup scripts of its modules, executed in dependency order:
//! a post-order walk from the root modules (those no other module depends
//! on), deepest first, each module name at most once. Scripts mutate a
//! process environment through `forge.putEnv`/`forge.getEnv`; the mutated
//! environment is the result.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use forge_lua::{ProcessEnvironment, ScriptRuntime, ScriptValue};
use mlua::prelude::*;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use tracing::debug;

use crate::error::{ErrorInfo, Result};
use crate::language::module::ResolvedModule;
use crate::language::properties::{self, PropertyMap, MODULES_KEY};
use crate::language::script::FileContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvType {
  Build,
  Run,
}

impl fmt::Display for EnvType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      EnvType::Build => "build",
      EnvType::Run => "run",
    })
  }
}

/// Run the modules' setup scripts over a copy of `base_environment` and
/// return the mutated environment.
pub fn assemble_environment(
  runtime: &ScriptRuntime,
  env_type: EnvType,
  modules: &[Arc<ResolvedModule>],
  product_configuration: &PropertyMap,
  base_environment: &ProcessEnvironment,
) -> Result<ProcessEnvironment> {
  let mut module_map: BTreeMap<&str, &ResolvedModule> = BTreeMap::new();
  for module in modules {
    module_map.insert(module.name.as_str(), module.as_ref());
  }

  let mut children: BTreeMap<&str, Vec<&ResolvedModule>> = BTreeMap::new();
  let mut parent_counts: BTreeMap<&str, usize> = BTreeMap::new();
  for module in modules {
    for dependency_name in &module.module_dependencies {
      let Some(&dependency) = module_map.get(dependency_name.as_str()) else {
        return Err(ErrorInfo::internal(format!(
          "module '{}' depends on unknown module '{}'",
          module.name, dependency_name
        )));
      };
      children.entry(module.name.as_str()).or_default().push(dependency);
      *parent_counts.entry(dependency_name.as_str()).or_default() += 1;
    }
  }

  verify_acyclic(modules)?;

  let root_modules: Vec<&ResolvedModule> = modules
    .iter()
    .map(|module| module.as_ref())
    .filter(|module| parent_counts.get(module.name.as_str()).copied().unwrap_or(0) == 0)
    .collect();

  let mut seen = BTreeSet::new();
  let mut ordered = Vec::new();
  top_sort_modules(&children, &root_modules, &mut seen, &mut ordered);
  debug!(env = %env_type, modules = ordered.len(), "assembling environment");

  runtime.install_env_handle(base_environment.clone());
  let result = run_setup_scripts(runtime, env_type, &ordered, &children, product_configuration);
  let environment = runtime
    .take_env_handle()
    .unwrap_or_else(|| base_environment.clone());
  result.map(|()| environment)
}

/// Post-order walk emitting each module name once, children before their
/// dependents, preserving the left-to-right order of `modules`.
fn top_sort_modules<'a>(
  children: &BTreeMap<&str, Vec<&'a ResolvedModule>>,
  modules: &[&'a ResolvedModule],
  seen: &mut BTreeSet<String>,
  result: &mut Vec<&'a ResolvedModule>,
) {
  for module in modules {
    if module.name.is_empty() {
      continue;
    }
    let dependencies = children.get(module.name.as_str()).map(Vec::as_slice).unwrap_or(&[]);
    top_sort_modules(children, dependencies, seen, result);
    if seen.insert(module.name.clone()) {
      result.push(module);
    }
  }
}

fn verify_acyclic(modules: &[Arc<ResolvedModule>]) -> Result<()> {
  let mut graph = DiGraph::<&str, ()>::new();
  let mut nodes = BTreeMap::new();
  for module in modules {
    let index = graph.add_node(module.name.as_str());
    nodes.insert(module.name.as_str(), index);
  }
  for module in modules {
    for dependency in &module.module_dependencies {
      if let (Some(&from), Some(&to)) = (nodes.get(dependency.as_str()), nodes.get(module.name.as_str())) {
        graph.add_edge(from, to, ());
      }
    }
  }
  toposort(&graph, None).map_err(|_| ErrorInfo::internal("cycle in module dependency graph"))?;
  Ok(())
}

fn run_setup_scripts(
  runtime: &ScriptRuntime,
  env_type: EnvType,
  ordered: &[&ResolvedModule],
  children: &BTreeMap<&str, Vec<&ResolvedModule>>,
  product_configuration: &PropertyMap,
) -> Result<()> {
  static EMPTY: BTreeMap<String, ScriptValue> = BTreeMap::new();
  let product_modules = product_configuration
    .get(MODULES_KEY)
    .and_then(ScriptValue::as_object)
    .unwrap_or(&EMPTY);

  for module in ordered {
    let build_empty = module.setup_build_environment_script.source_code.is_empty();
    let run_empty = module.setup_run_environment_script.source_code.is_empty();
    let skip = match env_type {
      EnvType::Build => build_empty,
      EnvType::Run => build_empty && run_empty,
    };
    if skip {
      continue;
    }

    let setup_script = match env_type {
      EnvType::Build => &module.setup_build_environment_script,
      EnvType::Run => {
        if module.setup_run_environment_script.is_valid() {
          &module.setup_run_environment_script
        } else {
          &module.setup_build_environment_script
        }
      }
    };

    let scope = runtime.create_scope()?;
    if let Some(context) = &setup_script.file_context {
      install_file_context(runtime, context, &scope)?;
    }

    // Expose the property maps of the module's direct dependencies by name.
    for dependency in children.get(module.name.as_str()).map(Vec::as_slice).unwrap_or(&[]) {
      let configuration = product_modules
        .get(&dependency.name)
        .cloned()
        .unwrap_or(ScriptValue::Object(BTreeMap::new()));
      scope.set(dependency.name.as_str(), configuration.to_lua(runtime.lua())?)?;
    }

    // Expose the module's own properties directly in the scope.
    if let Some(own) = properties::find_module_map_recursively(product_modules, &module.name) {
      for (key, value) in own {
        scope.set(key.as_str(), value.to_lua(runtime.lua())?)?;
      }
    }

    debug!(module = %module.name, env = %env_type, "running environment setup script");
    runtime
      .eval_expression(
        &format!("({})()", setup_script.source_code),
        &format!("{}.setup{}Environment", module.name, capitalized(env_type)),
        &scope,
      )
      .map_err(|error| {
        ErrorInfo::script(
          format!("Error while setting up {env_type} environment: {error}"),
          setup_script.location.clone(),
        )
      })?;
  }
  Ok(())
}

/// Evaluate a file context's imports into the scope under their names.
pub fn install_file_context(runtime: &ScriptRuntime, context: &FileContext, scope: &LuaTable) -> Result<()> {
  for (name, chunk) in &context.imports {
    let value = runtime.eval_expression(chunk, &format!("{}:{}", context.file_path, name), scope)?;
    scope.set(name.as_str(), value)?;
  }
  Ok(())
}

fn capitalized(env_type: EnvType) -> &'static str {
  match env_type {
    EnvType::Build => "Build",
    EnvType::Run => "Run",
  }
}
