//! The rule applicator.
//!
//! `apply_rule` materializes one rule over a set of tagged input artifacts:
//! it allocates a transformer, derives the output artifacts (from templates
//! or from the rule's output script), wires dependency edges, evaluates
//! per-artifact property bindings, runs the prepare script to obtain the
//! command list, and tracks which outputs are newly created or newly
//! invalidated. Conflicting claims on an output artifact are rejected.
//!
//! The applicator runs single-threaded per product; the script runtime is
//! not reentrant. Cancellation is cooperative and checked before every
//! rule instantiation.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use forge_lua::{ScriptRuntime, ScriptValue};
use mlua::prelude::*;
use tracing::debug;

use crate::buildgraph::artifact::{Artifact, ArtifactId, ArtifactSet};
use crate::buildgraph::bindings::apply_artifact_bindings;
use crate::buildgraph::builddata::ProjectBuildData;
use crate::buildgraph::tracking::commands_need_rerun;
use crate::buildgraph::transformer::{RuleCommand, Transformer, TransformerId, expose_artifacts};
use crate::error::{ErrorInfo, ErrorKind, Result};
use crate::language::environment::install_file_context;
use crate::language::filetags::{FileTag, FileTags};
use crate::language::product::{ResolvedProduct, ResolvedProject, TopLevelProject};
use crate::language::properties::MODULES_KEY;
use crate::language::rule::{OUTPUT_ARTIFACTS_ARGUMENTS, PREPARE_ARGUMENTS, Rule, RuleArtifact};
use crate::util::hash::{fingerprint, sha1_hex};
use crate::util::paths::{clean_path, file_name, neutralize_dotdot, resolve_path};

/// Cooperative cancellation shared between the caller and the applicator.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_canceled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }

  pub fn check(&self) -> Result<()> {
    if self.is_canceled() {
      Err(ErrorInfo::new(ErrorKind::Cancel, "Build canceled."))
    } else {
      Ok(())
    }
  }
}

/// Where additional inputs may come from.
#[derive(Debug, Clone, Copy)]
pub struct InputSources {
  pub current_product: bool,
  pub dependencies: bool,
}

impl InputSources {
  pub const CURRENT_PRODUCT: Self = Self {
    current_product: true,
    dependencies: false,
  };
  pub const DEPENDENCIES: Self = Self {
    current_product: false,
    dependencies: true,
  };
  pub const ALL: Self = Self {
    current_product: true,
    dependencies: true,
  };
}

/// Collect artifacts carrying any of `tags` from the product and/or its
/// dependency products, skipping artifacts the rule excludes.
///
/// Within the current product two cases count: ordinary product artifacts,
/// and artifacts a module declared as its targets, which conceptually
/// belong to the dependency side even though they live in this product's
/// tag index.
pub fn collect_additional_inputs(
  graph: &ProjectBuildData,
  tags: &FileTags,
  rule: &Rule,
  product: &ResolvedProduct,
  products_by_name: &BTreeMap<String, Arc<ResolvedProduct>>,
  sources: InputSources,
) -> ArtifactSet {
  let mut artifacts = ArtifactSet::new();
  for tag in tags {
    for id in graph.artifacts_by_file_tag(&product.unique_name(), tag) {
      let artifact = graph.artifact(id);
      if artifact.file_tags.intersects(&rule.excluded_auxiliary_inputs) {
        continue;
      }
      if (sources.current_product && !artifact.target_of_module)
        || (sources.dependencies && artifact.target_of_module)
      {
        artifacts.insert(id);
      }
    }

    if sources.dependencies {
      for dependency_name in &product.dependencies {
        let Some(dependency) = products_by_name.get(dependency_name) else {
          continue;
        };
        for id in graph.target_artifacts(dependency) {
          let artifact = graph.artifact(id);
          if artifact.file_tags.contains(tag) && !artifact.file_tags.intersects(&rule.excluded_auxiliary_inputs) {
            artifacts.insert(id);
          }
        }
      }
    }
  }
  artifacts
}

pub struct RulesApplicator<'a> {
  product: &'a ResolvedProduct,
  project: &'a TopLevelProject,
  products_by_name: &'a BTreeMap<String, Arc<ResolvedProduct>>,
  projects_by_name: BTreeMap<String, &'a ResolvedProject>,
  runtime: &'a ScriptRuntime,
  cancel: CancelToken,
  rule: Option<Arc<Rule>>,
  complete_input_set: ArtifactSet,
  transformer: Option<TransformerId>,
  old_transformer: Option<Transformer>,
  created_artifacts: Vec<ArtifactId>,
  invalidated_artifacts: Vec<ArtifactId>,
}

impl<'a> RulesApplicator<'a> {
  pub fn new(
    product: &'a ResolvedProduct,
    project: &'a TopLevelProject,
    products_by_name: &'a BTreeMap<String, Arc<ResolvedProduct>>,
    runtime: &'a ScriptRuntime,
    cancel: CancelToken,
  ) -> Self {
    Self {
      product,
      project,
      products_by_name,
      projects_by_name: project.projects_by_name(),
      runtime,
      cancel,
      rule: None,
      complete_input_set: ArtifactSet::new(),
      transformer: None,
      old_transformer: None,
      created_artifacts: Vec::new(),
      invalidated_artifacts: Vec::new(),
    }
  }

  /// Artifacts created by the most recent `apply_rule` call.
  pub fn created_artifacts(&self) -> &[ArtifactId] {
    &self.created_artifacts
  }

  /// Artifacts whose timestamps the most recent `apply_rule` call cleared.
  pub fn invalidated_artifacts(&self) -> &[ArtifactId] {
    &self.invalidated_artifacts
  }

  /// Apply one rule over the artifacts matching its input tags, mutating
  /// the product's build data. A multiplex rule consumes the whole set in
  /// one instantiation; otherwise the rule is instantiated once per input.
  pub fn apply_rule(&mut self, rule: &Arc<Rule>, input_artifacts: &ArtifactSet) -> Result<()> {
    if input_artifacts.is_empty() && rule.declares_inputs() && rule.requires_inputs {
      return Ok(());
    }

    let mut guard = self.project.lock_build_data();
    let graph = &mut *guard;
    graph.set_dirty();
    self.created_artifacts.clear();
    self.invalidated_artifacts.clear();
    self.rule = Some(rule.clone());
    self.complete_input_set = input_artifacts.clone();

    let _eval_scope = EvalScope::enter(self.runtime);
    let prepare_context = self.runtime.create_scope()?;
    if let Some(context) = &rule.prepare_script.file_context {
      install_file_context(self.runtime, context, &prepare_context)?;
    }
    self.setup_product_scope(&prepare_context)?;

    if rule.multiplex {
      self.do_apply(graph, input_artifacts, &prepare_context)
    } else {
      for &input in input_artifacts {
        let single: ArtifactSet = std::iter::once(input).collect();
        self.do_apply(graph, &single, &prepare_context)?;
      }
      Ok(())
    }
  }

  fn do_apply(&mut self, graph: &mut ProjectBuildData, inputs: &ArtifactSet, prepare_context: &LuaTable) -> Result<()> {
    self.cancel.check()?;
    let rule = self.rule.clone().expect("rule application in progress");
    debug!(rule = %rule, inputs = inputs.len(), "applying rule");

    let explicitly_depends_on = self.collect_explicitly_depends_on(graph, &rule);
    let transformer = Transformer::new(rule.clone(), inputs.clone(), explicitly_depends_on.clone(), rule.always_run);
    let transformer_id = graph.add_transformer(transformer);
    self.transformer = Some(transformer_id);
    self.old_transformer = None;
    self.runtime.clear_requested_env();

    expose_artifacts(self.runtime, graph, prepare_context, "inputs", Some("input"), inputs)?;
    expose_artifacts(
      self.runtime,
      graph,
      prepare_context,
      "explicitlyDependsOn",
      None,
      &explicitly_depends_on,
    )?;

    let mut rule_artifact_map: Vec<(Arc<RuleArtifact>, ArtifactId)> = Vec::new();
    let mut outputs: Vec<ArtifactId> = Vec::new();

    if rule.is_dynamic() {
      outputs = self.run_output_artifacts_script(graph, &rule, inputs, prepare_context)?;
    } else {
      let mut seen_paths = BTreeSet::new();
      for template in &rule.artifacts {
        let output =
          self.create_output_artifact_from_rule_artifact(graph, &rule, Some(template), inputs, &mut seen_paths, prepare_context)?;
        outputs.push(output);
        rule_artifact_map.push((template.clone(), output));
      }
      if rule.artifacts.is_empty() {
        outputs
          .push(self.create_output_artifact_from_rule_artifact(graph, &rule, None, inputs, &mut seen_paths, prepare_context)?);
      }
    }

    let new_outputs: ArtifactSet = outputs.iter().copied().collect();
    let old_outputs = self.collect_old_output_artifacts(graph, &rule, inputs);
    let removed: ArtifactSet = old_outputs.difference(&new_outputs).copied().collect();
    self.handle_removed_rule_outputs(graph, &removed);

    if outputs.is_empty() {
      return Ok(());
    }

    for &output in &outputs {
      for &dependency in &explicitly_depends_on {
        graph.connect(output, dependency);
      }
    }

    if graph.transformer(transformer_id).inputs != *inputs {
      let current = graph.transformer(transformer_id).inputs.clone();
      expose_artifacts(self.runtime, graph, prepare_context, "inputs", Some("input"), &current)?;
    }

    // Evaluate per-artifact bindings, later-declared artifacts first. The
    // reverse order is observable to scripts reading sibling outputs and
    // is part of the contract.
    for (template, output) in rule_artifact_map.iter().rev() {
      if template.bindings.is_empty() {
        continue;
      }
      let mut properties = graph.artifact(*output).properties.clone();
      prepare_context.set("fileName", graph.artifact(*output).file_path.as_str())?;
      prepare_context.set("fileTags", tags_to_lua(self.runtime, &graph.artifact(*output).file_tags)?)?;
      for binding in &template.bindings {
        let binding_error = |message: String| {
          ErrorInfo::script(
            format!("evaluating rule binding '{}': {}", binding.dotted_name(), message),
            binding.location.clone(),
          )
        };
        let value = self
          .runtime
          .eval_expression(&binding.code, &binding.location.to_string(), prepare_context)
          .map_err(|error| binding_error(error.to_string()))?;
        let value = ScriptValue::from_lua(value).map_err(|error| binding_error(error.to_string()))?;
        properties.set_module_property(&binding.name, value);
      }
      graph.artifact_mut(*output).properties = properties;
    }
    if !rule_artifact_map.is_empty() {
      prepare_context.set("fileName", LuaValue::Nil)?;
      prepare_context.set("fileTags", LuaValue::Nil)?;
    }

    expose_artifacts(self.runtime, graph, prepare_context, "outputs", Some("output"), &new_outputs)?;
    let commands = self.create_commands(&rule, prepare_context)?;
    if commands.is_empty() {
      return Err(ErrorInfo::with_location(
        ErrorKind::EmptyCommands,
        format!("There is a rule without commands: {rule}."),
        rule.prepare_script.location.clone(),
      ));
    }
    graph.transformer_mut(transformer_id).commands = commands;

    // The rerun check below still sees the rescued reads of the prior
    // transformer; only afterwards are this application's own recordings
    // stored.
    let needs_invalidation = match &self.old_transformer {
      None => true,
      Some(old) => {
        let current = graph.transformer(transformer_id);
        old.outputs != current.outputs
          || old.inputs != current.inputs
          || old.explicitly_depends_on != current.explicitly_depends_on
          || old.commands != current.commands
          || commands_need_rerun(current, self.product, self.products_by_name, &self.projects_by_name)
      }
    };

    graph.transformer_mut(transformer_id).requested_env_reads = self.runtime.requested_env();
    let project_fingerprint = fingerprint(&self.project.project.project_properties)
      .map_err(|error| ErrorInfo::internal(format!("fingerprinting project properties: {error}")))?;
    graph.transformer_mut(transformer_id).project_property_reads =
      BTreeMap::from([(self.project.project.name.clone(), project_fingerprint)]);

    if needs_invalidation {
      for &output in &outputs {
        graph.artifact_mut(output).clear_timestamp();
        self.invalidated_artifacts.push(output);
      }
    }
    graph.transformer_mut(transformer_id).commands_need_change_tracking = false;
    Ok(())
  }

  /// Outputs previously produced from these inputs by the current rule.
  fn collect_old_output_artifacts(&self, graph: &ProjectBuildData, rule: &Rule, inputs: &ArtifactSet) -> ArtifactSet {
    let mut result = ArtifactSet::new();
    for &input in inputs {
      for &parent in &graph.artifact(input).parents {
        let Some(transformer_id) = graph.artifact(parent).transformer else {
          continue;
        };
        let transformer = graph.transformer(transformer_id);
        if *transformer.rule == *rule && transformer.inputs.contains(&input) {
          result.insert(parent);
        }
      }
    }
    result
  }

  /// Remove outputs the rule no longer produces, along with artifacts
  /// depending exclusively on them, and prune now-empty directories.
  fn handle_removed_rule_outputs(&mut self, graph: &mut ProjectBuildData, outputs_to_remove: &ArtifactSet) {
    if outputs_to_remove.is_empty() {
      return;
    }
    let mut removed: Vec<(ArtifactId, String)> = Vec::new();
    for &artifact in outputs_to_remove {
      if !graph.is_alive(artifact) {
        continue;
      }
      debug!(path = %graph.artifact(artifact).file_path, "rule no longer produces output artifact");
      graph.remove_artifact_and_exclusive_dependents(artifact, &mut removed);
    }
    for (id, _) in &removed {
      assert!(!self.complete_input_set.contains(id));
    }
    remove_empty_parent_directories(removed.iter().map(|(_, path)| path.as_str()), &self.project.build_directory);
  }

  pub fn collect_auxiliary_inputs(&self, graph: &ProjectBuildData, rule: &Rule) -> ArtifactSet {
    collect_additional_inputs(
      graph,
      &rule.auxiliary_inputs,
      rule,
      self.product,
      self.products_by_name,
      InputSources::ALL,
    )
  }

  fn collect_explicitly_depends_on(&self, graph: &ProjectBuildData, rule: &Rule) -> ArtifactSet {
    let mut result = collect_additional_inputs(
      graph,
      &rule.explicitly_depends_on,
      rule,
      self.product,
      self.products_by_name,
      InputSources::CURRENT_PRODUCT,
    );
    result.extend(collect_additional_inputs(
      graph,
      &rule.explicitly_depends_on_from_dependencies,
      rule,
      self.product,
      self.products_by_name,
      InputSources::DEPENDENCIES,
    ));
    result
  }

  fn create_output_artifact_from_rule_artifact(
    &mut self,
    graph: &mut ProjectBuildData,
    rule: &Arc<Rule>,
    template: Option<&Arc<RuleArtifact>>,
    inputs: &ArtifactSet,
    seen_paths: &mut BTreeSet<String>,
    prepare_context: &LuaTable,
  ) -> Result<ArtifactId> {
    let (output_path, file_tags, always_updated) = match template {
      Some(template) => {
        let path_error = |message: String| ErrorInfo::script(message, template.file_path_location.clone());
        let value = self
          .runtime
          .eval_expression(&template.file_path, &template.file_path_location.to_string(), prepare_context)
          .map_err(|error| path_error(error.to_string()))?;
        let value = ScriptValue::from_lua(value).map_err(|error| path_error(error.to_string()))?;
        let Some(path) = value.coerce_string() else {
          return Err(path_error(format!(
            "file path expression of rule {rule} did not evaluate to a string"
          )));
        };
        (path, template.file_tags.clone(), template.always_updated)
      }
      None => {
        let mut hash_input = rule.to_string();
        for &input in inputs {
          hash_input.push_str(&graph.artifact(input).file_path);
        }
        let path = format!("__dummyoutput__{}", &sha1_hex(hash_input.as_bytes())[..16]);
        (path, rule.output_file_tags.clone(), false)
      }
    };

    let output_path = resolve_path(&self.product.build_directory(), &output_path);
    if !seen_paths.insert(output_path.clone()) {
      return Err(ErrorInfo::new(
        ErrorKind::DuplicateOutput,
        format!("Rule {rule} already created '{output_path}'."),
      ));
    }
    self.create_output_artifact(graph, rule, &output_path, file_tags, always_updated, inputs)
  }

  fn create_output_artifact(
    &mut self,
    graph: &mut ProjectBuildData,
    rule: &Arc<Rule>,
    file_path: &str,
    file_tags: FileTags,
    always_updated: bool,
    inputs: &ArtifactSet,
  ) -> Result<ArtifactId> {
    // Neutralize `..` components and canonicalize: an output artifact
    // never escapes the build directory.
    let output_path = clean_path(&resolve_path(&self.project.build_directory, &neutralize_dotdot(file_path)));
    let transformer_id = self.transformer.expect("transformer allocated");
    let product_name = self.product.unique_name();

    let output = match graph.lookup_artifact(&product_name, &output_path) {
      Some(existing) => {
        if let Some(old_transformer_id) = graph.artifact(existing).transformer {
          let old_transformer = graph.transformer(old_transformer_id).clone();
          if *old_transformer.rule != **rule {
            return Err(self.rule_conflict_error(graph, rule, existing, &old_transformer));
          }
          if !rule.multiplex && old_transformer.inputs != *inputs {
            assert_eq!(inputs.len(), 1);
            assert_eq!(old_transformer.inputs.len(), 1);
            let previous_input = graph
              .artifact(*old_transformer.inputs.iter().next().unwrap())
              .file_path
              .clone();
            let new_input = graph.artifact(*inputs.iter().next().unwrap()).file_path.clone();
            let mut error = ErrorInfo::with_location(
              ErrorKind::MultiplexConflict,
              format!("Conflicting instances of rule '{rule}':"),
              rule.prepare_script.location.clone(),
            );
            error.append(
              format!(
                "Output artifact '{}' is to be produced from input artifacts '{}' and '{}', but the rule is not a multiplex rule.",
                graph.artifact(existing).file_path,
                previous_input,
                new_input
              ),
              None,
            );
            return Err(error);
          }
          graph.transformer_mut(transformer_id).rescue_change_tracking_data(&old_transformer);
          self.old_transformer = Some(old_transformer);
        }
        existing
      }
      None => {
        let id = graph.insert_artifact(Artifact::new_generated(output_path.clone(), product_name.clone()));
        self.created_artifacts.push(id);
        id
      }
    };

    graph.artifact_mut(output).always_updated = always_updated;
    graph.artifact_mut(output).properties = self.product.module_properties.clone();

    let mut output_tags = if file_tags.is_empty() {
      let name = file_name(&output_path).to_string();
      self.product.file_tags_for_file_name(&name)
    } else {
      file_tags
    };
    for artifact_properties in &self.product.artifact_properties {
      if output_tags.intersects(&artifact_properties.file_tags_filter) {
        graph.artifact_mut(output).properties = artifact_properties.property_map.clone();
        output_tags.unite(&artifact_properties.extra_file_tags);
        break;
      }
    }
    graph.set_artifact_tags(output, output_tags);

    // A truthy forge.install implies the synthetic tag "installable".
    let installable = graph
      .artifact(output)
      .properties
      .forge_property_value("install")
      .map(ScriptValue::truthy)
      .unwrap_or(false);
    if installable {
      graph.add_artifact_tag(output, FileTag::new("installable"));
    }

    for &input in inputs {
      assert!(output != input);
      graph.connect(output, input);
    }

    graph.artifact_mut(output).transformer = Some(transformer_id);
    graph.transformer_mut(transformer_id).outputs.insert(output);
    assert!(rule.multiplex || graph.transformer(transformer_id).inputs.len() == 1);

    Ok(output)
  }

  fn rule_conflict_error(
    &self,
    graph: &ProjectBuildData,
    rule: &Rule,
    existing: ArtifactId,
    old_transformer: &Transformer,
  ) -> ErrorInfo {
    let artifact = graph.artifact(existing);
    let signature = format!(
      "[{}] -> [{}]",
      rule.inputs.to_sorted_names().join(", "),
      artifact.file_tags.to_sorted_names().join(", ")
    );
    let mut error = ErrorInfo::new(
      ErrorKind::RuleConflict,
      format!("Conflicting rules for producing {} [{}]", artifact.file_path, artifact.file_tags),
    );
    error.append(
      format!("while trying to apply:  {}  {}", rule.prepare_script.location, signature),
      Some(rule.prepare_script.location.clone()),
    );
    error.append(
      format!(
        "was already defined in:  {}  {}",
        old_transformer.rule.prepare_script.location, signature
      ),
      Some(old_transformer.rule.prepare_script.location.clone()),
    );
    error
  }

  fn run_output_artifacts_script(
    &mut self,
    graph: &mut ProjectBuildData,
    rule: &Arc<Rule>,
    inputs: &ArtifactSet,
    prepare_context: &LuaTable,
  ) -> Result<Vec<ArtifactId>> {
    let script = rule.output_artifacts_script.clone();
    let script_error = |message: String| ErrorInfo::script(message, script.location.clone());
    let function = self
      .runtime
      .eval_function(&script.source_code, "Rule.outputArtifacts", prepare_context)
      .map_err(|error| script_error(error.to_string()))?;
    let args = gather_arguments(prepare_context, &OUTPUT_ARTIFACTS_ARGUMENTS)?;
    let result = self
      .runtime
      .call_function(&function, args)
      .map_err(|error| script_error(error.to_string()))?;
    let result = ScriptValue::from_lua(result).map_err(|error| script_error(error.to_string()))?;
    let ScriptValue::Array(elements) = result else {
      return Err(ErrorInfo::with_location(
        ErrorKind::Shape,
        "Rule.outputArtifacts must return an array of objects.",
        script.location.clone(),
      ));
    };

    let mut outputs = Vec::new();
    for (index, element) in elements.iter().enumerate() {
      let output = self
        .create_output_artifact_from_script_value(graph, rule, element, inputs)
        .map_err(|error| error.prepend(format!("Error in Rule.outputArtifacts[{index}]"), Some(script.location.clone())))?;
      outputs.push(output);
    }
    Ok(outputs)
  }

  fn create_output_artifact_from_script_value(
    &mut self,
    graph: &mut ProjectBuildData,
    rule: &Arc<Rule>,
    value: &ScriptValue,
    inputs: &ArtifactSet,
  ) -> Result<ArtifactId> {
    let Some(object) = value.as_object() else {
      return Err(ErrorInfo::with_location(
        ErrorKind::Shape,
        "Elements of the Rule.outputArtifacts array must be of Object type.",
        rule.output_artifacts_script.location.clone(),
      ));
    };

    let unresolved_path = object
      .get("filePath")
      .and_then(ScriptValue::coerce_string)
      .unwrap_or_default();
    if unresolved_path.is_empty() {
      return Err(ErrorInfo::new(
        ErrorKind::MissingProperty,
        "Property filePath must be a non-empty string.",
      ));
    }
    let file_path = resolve_path(&self.product.build_directory(), &unresolved_path);
    let file_tags = FileTags::from_names(object.get("fileTags").map(ScriptValue::string_list).unwrap_or_default());
    let always_updated = object.get("alwaysUpdated").and_then(ScriptValue::as_bool).unwrap_or(true);

    let output = self.create_output_artifact(graph, rule, &file_path, file_tags, always_updated, inputs)?;

    // Check the tags after the file taggers ran.
    if graph.artifact(output).file_tags.is_empty() {
      return Err(ErrorInfo::new(
        ErrorKind::MissingProperty,
        format!(
          "Property fileTags for artifact '{unresolved_path}' must be a non-empty string list. Alternatively, a FileTagger can be provided."
        ),
      ));
    }

    for tag_name in object.get("explicitlyDependsOn").map(ScriptValue::string_list).unwrap_or_default() {
      for dependency in graph.artifacts_by_file_tag(&self.product.unique_name(), &FileTag::new(tag_name.clone())) {
        if dependency != output {
          graph.connect(output, dependency);
        }
      }
    }

    let mut properties = graph.artifact(output).properties.clone();
    if apply_artifact_bindings(&mut properties, object) {
      graph.artifact_mut(output).properties = properties;
    }
    Ok(output)
  }

  fn create_commands(&self, rule: &Rule, prepare_context: &LuaTable) -> Result<Vec<RuleCommand>> {
    let script = &rule.prepare_script;
    let script_error = |message: String| ErrorInfo::script(message, script.location.clone());
    let function = self
      .runtime
      .eval_function(&script.source_code, "Rule.prepare", prepare_context)
      .map_err(|error| script_error(error.to_string()))?;
    let args = gather_arguments(prepare_context, &PREPARE_ARGUMENTS)?;
    let result = self
      .runtime
      .call_function(&function, args)
      .map_err(|error| script_error(error.to_string()))?;
    let result = ScriptValue::from_lua(result).map_err(|error| script_error(error.to_string()))?;
    RuleCommand::list_from_script_value(&result)
      .map_err(|message| ErrorInfo::with_location(ErrorKind::Shape, message, script.location.clone()))
  }

  fn setup_product_scope(&self, prepare_context: &LuaTable) -> Result<()> {
    let lua = self.runtime.lua();

    let product_table = lua.create_table()?;
    for (key, value) in self.product.product_properties.value() {
      product_table.set(key.as_str(), value.to_lua(lua)?)?;
    }
    if let Some(modules) = self.product.module_properties.get(MODULES_KEY).and_then(ScriptValue::as_object) {
      for (name, configuration) in modules {
        product_table.set(name.as_str(), configuration.to_lua(lua)?)?;
      }
    }
    product_table.set("name", self.product.name.as_str())?;
    product_table.set("buildDirectory", self.product.build_directory())?;
    prepare_context.set("product", product_table)?;

    let project_table = lua.create_table()?;
    for (key, value) in self.project.project.project_properties.value() {
      project_table.set(key.as_str(), value.to_lua(lua)?)?;
    }
    project_table.set("name", self.project.project.name.as_str())?;
    project_table.set("buildDirectory", self.project.build_directory.as_str())?;
    prepare_context.set("project", project_table)?;
    Ok(())
  }
}

/// Scoped use of the script runtime: clears script-observed state on entry
/// and on every exit path.
struct EvalScope<'r> {
  runtime: &'r ScriptRuntime,
}

impl<'r> EvalScope<'r> {
  fn enter(runtime: &'r ScriptRuntime) -> Self {
    runtime.clear_requested_env();
    Self { runtime }
  }
}

impl Drop for EvalScope<'_> {
  fn drop(&mut self) {
    self.runtime.clear_requested_env();
    self.runtime.take_env_handle();
  }
}

fn gather_arguments(scope: &LuaTable, names: &[&str]) -> Result<Vec<LuaValue>> {
  names.iter().map(|name| Ok(scope.get::<LuaValue>(*name)?)).collect()
}

fn tags_to_lua(runtime: &ScriptRuntime, tags: &FileTags) -> Result<LuaValue> {
  let table = runtime.lua().create_table()?;
  for (index, tag) in tags.iter().enumerate() {
    table.set(index + 1, tag.as_str())?;
  }
  Ok(LuaValue::Table(table))
}

/// Delete directories of removed artifacts that became empty, walking up
/// to (but never including) the build directory.
fn remove_empty_parent_directories<'p>(paths: impl Iterator<Item = &'p str>, build_directory: &str) {
  for path in paths {
    let mut directory = Path::new(path).parent();
    while let Some(current) = directory {
      let current_path = current.to_string_lossy();
      if !current_path.starts_with(build_directory) || current_path.as_ref() == build_directory {
        break;
      }
      if fs::remove_dir(current).is_err() {
        break;
      }
      directory = current.parent();
    }
  }
}
