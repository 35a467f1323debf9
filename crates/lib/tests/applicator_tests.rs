//! Rule application scenarios against a full product fixture.

mod common;

use std::sync::Arc;

use anyhow::Result;
use forgelua_lib::ErrorKind;
use forgelua_lib::buildgraph::{CancelToken, RulesApplicator};
use forgelua_lib::language::{Binding, CodeLocation, FileTagger, FileTags, Rule};

const BUILD_ROOT: &str = "/virtual/buildroot";

fn fixture() -> (forgelua_lib::language::TopLevelProject, forge_lua::ScriptRuntime) {
  let product = common::make_product("app", &common::project_build_dir(BUILD_ROOT));
  (common::make_project(vec![product], BUILD_ROOT), common::runtime())
}

fn fixture_with(product: forgelua_lib::language::ResolvedProduct) -> (forgelua_lib::language::TopLevelProject, forge_lua::ScriptRuntime) {
  (common::make_project(vec![product], BUILD_ROOT), common::runtime())
}

#[test]
fn static_one_to_one_rule_produces_one_output_per_input() -> Result<()> {
  let (project, runtime) = fixture();
  let products = project.products_by_name();
  let product = products.get("app.default").unwrap();

  let input = common::add_source(&project, product, "/p/foo.cpp", &["cpp"]);
  let rule = common::static_rule("compiler", &["cpp"], "input.completeBaseName .. '.o'", &["obj"]);

  let mut applicator = RulesApplicator::new(product, &project, &products, &runtime, CancelToken::new());
  applicator.apply_rule(&rule, &common::set_of(&[input]))?;

  let created = applicator.created_artifacts().to_vec();
  let invalidated = applicator.invalidated_artifacts().to_vec();

  let graph = project.lock_build_data();
  let output_path = format!("{}/foo.o", product.build_directory());
  let output = graph.lookup_artifact("app.default", &output_path).expect("output artifact");

  assert_eq!(graph.artifact(output).file_tags, FileTags::from_names(["obj"]));
  assert!(graph.artifact(output).children.contains(&input));
  assert!(graph.artifact(input).parents.contains(&output));

  let transformer = graph.transformer(graph.artifact(output).transformer.unwrap());
  assert_eq!(transformer.inputs, common::set_of(&[input]));
  assert_eq!(transformer.outputs, common::set_of(&[output]));
  assert_eq!(transformer.commands.len(), 1);

  assert_eq!(created, vec![output]);
  assert_eq!(invalidated, vec![output]);
  assert!(graph.is_dirty());
  Ok(())
}

#[test]
fn multiplex_rule_consumes_all_inputs_in_one_instantiation() -> Result<()> {
  let (project, runtime) = fixture();
  let products = project.products_by_name();
  let product = products.get("app.default").unwrap();

  let a = common::add_source(&project, product, "/p/a.o", &["obj"]);
  let b = common::add_source(&project, product, "/p/b.o", &["obj"]);

  let mut rule = (*common::static_rule("linker", &["obj"], "'app'", &["application"])).clone();
  rule.multiplex = true;
  let rule = Arc::new(rule);

  let mut applicator = RulesApplicator::new(product, &project, &products, &runtime, CancelToken::new());
  applicator.apply_rule(&rule, &common::set_of(&[a, b]))?;

  let graph = project.lock_build_data();
  let output_path = format!("{}/app", product.build_directory());
  let output = graph.lookup_artifact("app.default", &output_path).expect("linked application");
  let transformer = graph.transformer(graph.artifact(output).transformer.unwrap());
  assert_eq!(transformer.inputs, common::set_of(&[a, b]));
  assert_eq!(transformer.outputs, common::set_of(&[output]));
  Ok(())
}

#[test]
fn conflicting_rules_for_one_output_are_rejected() -> Result<()> {
  let (project, runtime) = fixture();
  let products = project.products_by_name();
  let product = products.get("app.default").unwrap();

  let input = common::add_source(&project, product, "/p/widget.h", &["hdr"]);
  let first = common::static_rule("mocA", &["hdr"], "'foo.moc'", &["moc"]);
  let second = Arc::new(Rule {
    name: "mocB".to_string(),
    prepare_script: common::script(
      "function(project, product, inputs, outputs, input, output, explicitlyDependsOn) \
         return { program = 'true', arguments = {}, description = '' } end",
      "other.lua",
      42,
    ),
    inputs: FileTags::from_names(["hdr"]),
    artifacts: vec![common::template("'foo.moc'", &["moc"])],
    requires_inputs: true,
    ..Default::default()
  });

  let mut applicator = RulesApplicator::new(product, &project, &products, &runtime, CancelToken::new());
  applicator.apply_rule(&first, &common::set_of(&[input]))?;
  let error = applicator.apply_rule(&second, &common::set_of(&[input])).unwrap_err();

  assert_eq!(error.kind(), ErrorKind::RuleConflict);
  let rendered = error.to_string();
  assert!(rendered.contains("Conflicting rules for producing"));
  assert!(rendered.contains("other.lua:42"), "new rule location: {rendered}");
  assert!(rendered.contains("rules.lua:1"), "prior rule location: {rendered}");
  Ok(())
}

#[test]
fn dynamic_rule_creates_outputs_from_the_script() -> Result<()> {
  let (project, runtime) = fixture();
  let products = project.products_by_name();
  let product = products.get("app.default").unwrap();

  let input = common::add_source(&project, product, "/p/api.idl", &["idl"]);
  let rule = Arc::new(Rule {
    name: "generator".to_string(),
    prepare_script: common::trivial_prepare(),
    output_artifacts_script: common::script(
      "function(project, product, inputs, input, explicitlyDependsOn) \
         return { \
           { filePath = 'x.h', fileTags = { 'hpp' } }, \
           { filePath = 'x.cpp', fileTags = { 'cpp' } }, \
         } end",
      "rules.lua",
      20,
    ),
    inputs: FileTags::from_names(["idl"]),
    requires_inputs: true,
    ..Default::default()
  });

  let mut applicator = RulesApplicator::new(product, &project, &products, &runtime, CancelToken::new());
  applicator.apply_rule(&rule, &common::set_of(&[input]))?;

  let graph = project.lock_build_data();
  let header = graph
    .lookup_artifact("app.default", &format!("{}/x.h", product.build_directory()))
    .expect("generated header");
  let source = graph
    .lookup_artifact("app.default", &format!("{}/x.cpp", product.build_directory()))
    .expect("generated source");

  assert_eq!(graph.artifact(header).file_tags, FileTags::from_names(["hpp"]));
  assert_eq!(graph.artifact(source).file_tags, FileTags::from_names(["cpp"]));
  // alwaysUpdated defaults to true when the script leaves it out.
  assert!(graph.artifact(header).always_updated);
  Ok(())
}

#[test]
fn dynamic_rule_returning_no_outputs_is_not_an_error() -> Result<()> {
  let (project, runtime) = fixture();
  let products = project.products_by_name();
  let product = products.get("app.default").unwrap();

  let input = common::add_source(&project, product, "/p/api.idl", &["idl"]);
  let rule = Arc::new(Rule {
    name: "generator".to_string(),
    prepare_script: common::trivial_prepare(),
    output_artifacts_script: common::script(
      "function(project, product, inputs, input, explicitlyDependsOn) return {} end",
      "rules.lua",
      20,
    ),
    inputs: FileTags::from_names(["idl"]),
    requires_inputs: true,
    ..Default::default()
  });

  let mut applicator = RulesApplicator::new(product, &project, &products, &runtime, CancelToken::new());
  applicator.apply_rule(&rule, &common::set_of(&[input]))?;
  assert!(applicator.created_artifacts().is_empty());
  Ok(())
}

#[test]
fn rule_requiring_inputs_is_a_no_op_without_them() -> Result<()> {
  let (project, runtime) = fixture();
  let products = project.products_by_name();
  let product = products.get("app.default").unwrap();

  let rule = common::static_rule("compiler", &["cpp"], "'never.o'", &["obj"]);
  let mut applicator = RulesApplicator::new(product, &project, &products, &runtime, CancelToken::new());
  applicator.apply_rule(&rule, &common::set_of(&[]))?;

  let graph = project.lock_build_data();
  assert!(!graph.is_dirty());
  assert!(graph.lookup_artifact("app.default", &format!("{}/never.o", product.build_directory())).is_none());
  Ok(())
}

#[test]
fn dotdot_components_cannot_escape_the_build_directory() -> Result<()> {
  let (project, runtime) = fixture();
  let products = project.products_by_name();
  let product = products.get("app.default").unwrap();

  let input = common::add_source(&project, product, "/p/foo.cpp", &["cpp"]);
  let rule = common::static_rule("escaper", &["cpp"], "'../outside.o'", &["obj"]);

  let mut applicator = RulesApplicator::new(product, &project, &products, &runtime, CancelToken::new());
  applicator.apply_rule(&rule, &common::set_of(&[input]))?;

  let graph = project.lock_build_data();
  let expected = format!("{}/dotdot/outside.o", product.build_directory());
  assert!(graph.lookup_artifact("app.default", &expected).is_some());
  for id in graph.artifact_ids() {
    assert!(
      graph.artifact(id).kind != forgelua_lib::buildgraph::ArtifactKind::Generated
        || graph.artifact(id).file_path.starts_with(&project.build_directory)
    );
  }
  Ok(())
}

#[test]
fn non_multiplex_rule_with_inconsistent_inputs_is_rejected() -> Result<()> {
  let (project, runtime) = fixture();
  let products = project.products_by_name();
  let product = products.get("app.default").unwrap();

  let a = common::add_source(&project, product, "/p/a.cpp", &["cpp"]);
  let b = common::add_source(&project, product, "/p/b.cpp", &["cpp"]);
  // The path expression ignores the input, so both instances claim the
  // same output.
  let rule = common::static_rule("collider", &["cpp"], "'same.o'", &["obj"]);

  let mut applicator = RulesApplicator::new(product, &project, &products, &runtime, CancelToken::new());
  let error = applicator.apply_rule(&rule, &common::set_of(&[a, b])).unwrap_err();

  assert_eq!(error.kind(), ErrorKind::MultiplexConflict);
  let rendered = error.to_string();
  assert!(rendered.contains("Conflicting instances of rule"));
  assert!(rendered.contains("/p/a.cpp") && rendered.contains("/p/b.cpp"), "{rendered}");
  Ok(())
}

#[test]
fn one_application_may_not_claim_the_same_path_twice() -> Result<()> {
  let (project, runtime) = fixture();
  let products = project.products_by_name();
  let product = products.get("app.default").unwrap();

  let input = common::add_source(&project, product, "/p/foo.cpp", &["cpp"]);
  let mut rule = (*common::static_rule("duplicator", &["cpp"], "'dup.o'", &["obj"])).clone();
  rule.artifacts.push(common::template("'dup.o'", &["obj"]));
  let rule = Arc::new(rule);

  let mut applicator = RulesApplicator::new(product, &project, &products, &runtime, CancelToken::new());
  let error = applicator.apply_rule(&rule, &common::set_of(&[input])).unwrap_err();

  assert_eq!(error.kind(), ErrorKind::DuplicateOutput);
  assert!(error.to_string().contains("already created"));
  Ok(())
}

#[test]
fn a_rule_without_commands_is_an_error() -> Result<()> {
  let (project, runtime) = fixture();
  let products = project.products_by_name();
  let product = products.get("app.default").unwrap();

  let input = common::add_source(&project, product, "/p/foo.cpp", &["cpp"]);
  let mut rule = (*common::static_rule("lazy", &["cpp"], "'foo.o'", &["obj"])).clone();
  rule.prepare_script = common::script(
    "function(project, product, inputs, outputs, input, output, explicitlyDependsOn) return {} end",
    "rules.lua",
    7,
  );
  let rule = Arc::new(rule);

  let mut applicator = RulesApplicator::new(product, &project, &products, &runtime, CancelToken::new());
  let error = applicator.apply_rule(&rule, &common::set_of(&[input])).unwrap_err();

  assert_eq!(error.kind(), ErrorKind::EmptyCommands);
  assert!(error.to_string().contains("There is a rule without commands"));
  Ok(())
}

#[test]
fn rule_without_templates_creates_a_single_dummy_output() -> Result<()> {
  let (project, runtime) = fixture();
  let products = project.products_by_name();
  let product = products.get("app.default").unwrap();

  let input = common::add_source(&project, product, "/p/foo.cpp", &["cpp"]);
  let rule = Arc::new(Rule {
    name: "checker".to_string(),
    prepare_script: common::trivial_prepare(),
    inputs: FileTags::from_names(["cpp"]),
    output_file_tags: FileTags::from_names(["checked"]),
    requires_inputs: true,
    ..Default::default()
  });

  let mut applicator = RulesApplicator::new(product, &project, &products, &runtime, CancelToken::new());
  applicator.apply_rule(&rule, &common::set_of(&[input]))?;

  assert_eq!(applicator.created_artifacts().len(), 1);
  let output = applicator.created_artifacts()[0];
  let graph = project.lock_build_data();
  let artifact = graph.artifact(output);

  let name = artifact.file_name();
  assert!(name.starts_with("__dummyoutput__"), "{name}");
  let suffix = &name["__dummyoutput__".len()..];
  assert_eq!(suffix.len(), 16);
  assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
  assert_eq!(artifact.file_tags, FileTags::from_names(["checked"]));
  assert!(!artifact.always_updated);
  Ok(())
}

#[test]
fn empty_template_tags_fall_back_to_the_file_taggers() -> Result<()> {
  let mut product = common::make_product("app", &common::project_build_dir(BUILD_ROOT));
  product.file_taggers = vec![FileTagger::new(vec!["*.o".to_string()], FileTags::from_names(["obj"])).unwrap()];
  let (project, runtime) = fixture_with(product);
  let products = project.products_by_name();
  let product = products.get("app.default").unwrap();

  let input = common::add_source(&project, product, "/p/foo.cpp", &["cpp"]);
  let rule = common::static_rule("compiler", &["cpp"], "'foo.o'", &[]);

  let mut applicator = RulesApplicator::new(product, &project, &products, &runtime, CancelToken::new());
  applicator.apply_rule(&rule, &common::set_of(&[input]))?;

  let graph = project.lock_build_data();
  let output = graph
    .lookup_artifact("app.default", &format!("{}/foo.o", product.build_directory()))
    .unwrap();
  assert_eq!(graph.artifact(output).file_tags, FileTags::from_names(["obj"]));
  Ok(())
}

#[test]
fn truthy_install_property_adds_the_installable_tag() -> Result<()> {
  let mut product = common::make_product("app", &common::project_build_dir(BUILD_ROOT));
  product
    .module_properties
    .set_value(&["modules", "forge", "install"], forge_lua::ScriptValue::Bool(true));
  let (project, runtime) = fixture_with(product);
  let products = project.products_by_name();
  let product = products.get("app.default").unwrap();

  let input = common::add_source(&project, product, "/p/foo.cpp", &["cpp"]);
  let rule = common::static_rule("compiler", &["cpp"], "'foo.o'", &["obj"]);

  let mut applicator = RulesApplicator::new(product, &project, &products, &runtime, CancelToken::new());
  applicator.apply_rule(&rule, &common::set_of(&[input]))?;

  let graph = project.lock_build_data();
  let output = graph
    .lookup_artifact("app.default", &format!("{}/foo.o", product.build_directory()))
    .unwrap();
  assert_eq!(
    graph.artifact(output).file_tags,
    FileTags::from_names(["installable", "obj"])
  );
  Ok(())
}

#[test]
fn bindings_patch_the_output_artifacts_properties() -> Result<()> {
  let (project, runtime) = fixture();
  let products = project.products_by_name();
  let product = products.get("app.default").unwrap();

  let input = common::add_source(&project, product, "/p/foo.cpp", &["cpp"]);
  let mut rule = (*common::static_rule("compiler", &["cpp"], "'foo.o'", &["obj"])).clone();
  {
    let template = Arc::make_mut(&mut rule.artifacts[0]);
    template.bindings = vec![
      Binding {
        name: vec!["cpp".to_string(), "flags".to_string()],
        code: "'-O2'".to_string(),
        location: CodeLocation::new("rules.lua", 12, 9),
      },
      Binding {
        name: vec!["cpp".to_string(), "sourcePath".to_string()],
        code: "fileName".to_string(),
        location: CodeLocation::new("rules.lua", 13, 9),
      },
    ];
  }
  let rule = Arc::new(rule);

  let mut applicator = RulesApplicator::new(product, &project, &products, &runtime, CancelToken::new());
  applicator.apply_rule(&rule, &common::set_of(&[input]))?;

  let graph = project.lock_build_data();
  let output_path = format!("{}/foo.o", product.build_directory());
  let output = graph.lookup_artifact("app.default", &output_path).unwrap();
  let properties = &graph.artifact(output).properties;

  assert_eq!(
    properties.module_property("cpp", "flags").and_then(forge_lua::ScriptValue::as_str),
    Some("-O2")
  );
  // During binding evaluation, fileName is the output's file path.
  assert_eq!(
    properties
      .module_property("cpp", "sourcePath")
      .and_then(forge_lua::ScriptValue::as_str),
    Some(output_path.as_str())
  );
  Ok(())
}

#[test]
fn binding_failures_name_the_binding_and_its_location() -> Result<()> {
  let (project, runtime) = fixture();
  let products = project.products_by_name();
  let product = products.get("app.default").unwrap();

  let input = common::add_source(&project, product, "/p/foo.cpp", &["cpp"]);
  let mut rule = (*common::static_rule("compiler", &["cpp"], "'foo.o'", &["obj"])).clone();
  Arc::make_mut(&mut rule.artifacts[0]).bindings = vec![Binding {
    name: vec!["cpp".to_string(), "flags".to_string()],
    code: "error('no flags today')".to_string(),
    location: CodeLocation::new("rules.lua", 12, 9),
  }];
  let rule = Arc::new(rule);

  let mut applicator = RulesApplicator::new(product, &project, &products, &runtime, CancelToken::new());
  let error = applicator.apply_rule(&rule, &common::set_of(&[input])).unwrap_err();

  assert_eq!(error.kind(), ErrorKind::ScriptEvaluation);
  let rendered = error.to_string();
  assert!(rendered.contains("evaluating rule binding 'cpp.flags':"), "{rendered}");
  assert!(rendered.contains("rules.lua:12"), "{rendered}");
  Ok(())
}

#[test]
fn explicit_dependencies_are_connected_to_every_output() -> Result<()> {
  let (project, runtime) = fixture();
  let products = project.products_by_name();
  let product = products.get("app.default").unwrap();

  let header = common::add_source(&project, product, "/p/config.hpp", &["hpp"]);
  let input = common::add_source(&project, product, "/p/foo.cpp", &["cpp"]);

  let mut rule = (*common::static_rule("compiler", &["cpp"], "'foo.o'", &["obj"])).clone();
  rule.explicitly_depends_on = FileTags::from_names(["hpp"]);
  let rule = Arc::new(rule);

  let mut applicator = RulesApplicator::new(product, &project, &products, &runtime, CancelToken::new());
  applicator.apply_rule(&rule, &common::set_of(&[input]))?;

  let graph = project.lock_build_data();
  let output = graph
    .lookup_artifact("app.default", &format!("{}/foo.o", product.build_directory()))
    .unwrap();
  assert!(graph.artifact(output).children.contains(&header));
  let transformer = graph.transformer(graph.artifact(output).transformer.unwrap());
  assert!(transformer.explicitly_depends_on.contains(&header));
  Ok(())
}

#[test]
fn reapplying_an_unchanged_rule_invalidates_nothing() -> Result<()> {
  let (project, runtime) = fixture();
  let products = project.products_by_name();
  let product = products.get("app.default").unwrap();

  let input = common::add_source(&project, product, "/p/foo.cpp", &["cpp"]);
  let rule = common::static_rule("compiler", &["cpp"], "input.completeBaseName .. '.o'", &["obj"]);

  let mut applicator = RulesApplicator::new(product, &project, &products, &runtime, CancelToken::new());
  applicator.apply_rule(&rule, &common::set_of(&[input]))?;
  let first_output = applicator.created_artifacts()[0];

  applicator.apply_rule(&rule, &common::set_of(&[input]))?;
  assert!(applicator.created_artifacts().is_empty());
  assert!(applicator.invalidated_artifacts().is_empty());

  let graph = project.lock_build_data();
  let output = graph
    .lookup_artifact("app.default", &format!("{}/foo.o", product.build_directory()))
    .unwrap();
  assert_eq!(output, first_output);
  Ok(())
}

#[test]
fn cancellation_unwinds_cleanly() -> Result<()> {
  let (project, runtime) = fixture();
  let products = project.products_by_name();
  let product = products.get("app.default").unwrap();

  let input = common::add_source(&project, product, "/p/foo.cpp", &["cpp"]);
  let rule = common::static_rule("compiler", &["cpp"], "'foo.o'", &["obj"]);

  let cancel = CancelToken::new();
  cancel.cancel();
  let mut applicator = RulesApplicator::new(product, &project, &products, &runtime, cancel);
  let error = applicator.apply_rule(&rule, &common::set_of(&[input])).unwrap_err();
  assert_eq!(error.kind(), ErrorKind::Cancel);
  Ok(())
}

#[test]
fn environment_reads_are_recorded_for_change_tracking() -> Result<()> {
  let (project, runtime) = fixture();
  let products = project.products_by_name();
  let product = products.get("app.default").unwrap();

  let input = common::add_source(&project, product, "/p/foo.cpp", &["cpp"]);
  let mut rule = (*common::static_rule("compiler", &["cpp"], "'foo.o'", &["obj"])).clone();
  rule.prepare_script = common::script(
    "function(project, product, inputs, outputs, input, output, explicitlyDependsOn) \
       local cc = forge.getEnv('CC') \
       return { program = cc or 'cc', arguments = {}, description = '' } end",
    "rules.lua",
    3,
  );
  let rule = Arc::new(rule);

  let mut applicator = RulesApplicator::new(product, &project, &products, &runtime, CancelToken::new());
  applicator.apply_rule(&rule, &common::set_of(&[input]))?;

  let graph = project.lock_build_data();
  let output = graph
    .lookup_artifact("app.default", &format!("{}/foo.o", product.build_directory()))
    .unwrap();
  let transformer = graph.transformer(graph.artifact(output).transformer.unwrap());
  assert!(transformer.requested_env_reads.contains_key("CC"));
  assert!(transformer.project_property_reads.contains_key("testproject"));
  assert!(!transformer.commands_need_change_tracking);
  Ok(())
}

#[test]
fn stale_project_properties_invalidate_reapplied_commands() -> Result<()> {
  let product = common::make_product("app", &common::project_build_dir(BUILD_ROOT));
  let mut project = common::make_project(vec![product], BUILD_ROOT);
  let runtime = common::runtime();
  let products = project.products_by_name();
  let product = products.get("app.default").unwrap().clone();

  let input = common::add_source(&project, &product, "/p/foo.cpp", &["cpp"]);
  let rule = common::static_rule("compiler", &["cpp"], "'foo.o'", &["obj"]);

  {
    let mut applicator = RulesApplicator::new(&product, &project, &products, &runtime, CancelToken::new());
    applicator.apply_rule(&rule, &common::set_of(&[input]))?;
  }

  let output = {
    let graph = project.lock_build_data();
    graph
      .lookup_artifact("app.default", &format!("{}/foo.o", product.build_directory()))
      .expect("output artifact")
  };

  // Simulate a freshly loaded graph whose commands still need tracking,
  // then change a project property the prepare scope exposes.
  {
    let mut graph = project.lock_build_data();
    let transformer_id = graph.artifact(output).transformer.unwrap();
    graph.transformer_mut(transformer_id).commands_need_change_tracking = true;
  }
  project
    .project
    .project_properties
    .set("version", forge_lua::ScriptValue::String("2".to_string()));

  let mut applicator = RulesApplicator::new(&product, &project, &products, &runtime, CancelToken::new());
  applicator.apply_rule(&rule, &common::set_of(&[input]))?;

  // Inputs, outputs and commands are unchanged, but the recorded project
  // properties no longer match.
  assert!(applicator.created_artifacts().is_empty());
  assert_eq!(applicator.invalidated_artifacts().to_vec(), vec![output]);
  Ok(())
}
