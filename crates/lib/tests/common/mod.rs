//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use forge_lua::{ScriptRuntime, ScriptValue};
use forgelua_lib::buildgraph::{Artifact, ArtifactId, ArtifactSet};
use forgelua_lib::language::{
  CodeLocation, FileTags, PropertyMap, ResolvedProduct, ResolvedProject, Rule, RuleArtifact, ScriptFunction,
  TopLevelProject,
};

pub fn runtime() -> ScriptRuntime {
  let _ = tracing_subscriber::fmt().with_test_writer().try_init();
  ScriptRuntime::new().expect("script runtime")
}

pub fn script(source: &str, file: &str, line: i32) -> ScriptFunction {
  ScriptFunction::new(source, CodeLocation::new(file, line, 1))
}

/// A prepare script producing one process command.
pub fn trivial_prepare() -> ScriptFunction {
  script(
    "function(project, product, inputs, outputs, input, output, explicitlyDependsOn) \
       return { program = 'true', arguments = {}, description = 'running a rule' } \
     end",
    "rules.lua",
    1,
  )
}

pub fn template(path_expression: &str, tags: &[&str]) -> Arc<RuleArtifact> {
  Arc::new(RuleArtifact {
    file_path: path_expression.to_string(),
    file_tags: FileTags::from_names(tags.iter().copied()),
    always_updated: true,
    location: CodeLocation::new("rules.lua", 10, 1),
    file_path_location: CodeLocation::new("rules.lua", 11, 5),
    bindings: Vec::new(),
  })
}

/// A static rule with one output template.
pub fn static_rule(name: &str, input_tags: &[&str], path_expression: &str, output_tags: &[&str]) -> Arc<Rule> {
  Arc::new(Rule {
    name: name.to_string(),
    prepare_script: trivial_prepare(),
    inputs: FileTags::from_names(input_tags.iter().copied()),
    artifacts: vec![template(path_expression, output_tags)],
    requires_inputs: true,
    ..Default::default()
  })
}

/// A product whose build directory lives under `<project build dir>`.
pub fn make_product(name: &str, project_build_dir: &str) -> ResolvedProduct {
  let mut product_properties = PropertyMap::new();
  product_properties.set(
    "buildDirectory",
    ScriptValue::String(format!(
      "{project_build_dir}/{}",
      ResolvedProduct::derive_build_directory_name(name, "default")
    )),
  );
  ResolvedProduct {
    name: name.to_string(),
    profile: "default".to_string(),
    enabled: true,
    product_properties,
    ..Default::default()
  }
}

pub fn make_project(products: Vec<ResolvedProduct>, build_root: &str) -> TopLevelProject {
  let mut configuration = PropertyMap::new();
  configuration.set_value(
    &["forge", "configurationName"],
    ScriptValue::String("default".to_string()),
  );
  let project = ResolvedProject {
    name: "testproject".to_string(),
    enabled: true,
    products: products.into_iter().map(Arc::new).collect(),
    ..Default::default()
  };
  TopLevelProject::new(project, build_root, configuration)
}

/// The build directory products of `make_project` should be created under.
pub fn project_build_dir(build_root: &str) -> String {
  format!("{build_root}/default")
}

pub fn add_source(project: &TopLevelProject, product: &ResolvedProduct, path: &str, tags: &[&str]) -> ArtifactId {
  let mut artifact = Artifact::new_source(path, product.unique_name());
  artifact.file_tags = FileTags::from_names(tags.iter().copied());
  project.lock_build_data().insert_artifact(artifact)
}

pub fn set_of(ids: &[ArtifactId]) -> ArtifactSet {
  ids.iter().copied().collect()
}
