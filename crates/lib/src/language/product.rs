//! Products and the project tree.
//!
//! A product is a buildable unit: groups of tagged sources, rules, modules,
//! file taggers, and the properties the resolver computed for it. Products
//! hang off a tree of projects whose top level owns the build graph and the
//! build-wide caches. Everything here is immutable after resolution except
//! the build data, the environment memos and the executable path cache.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use forge_lua::{ProcessEnvironment, ScriptRuntime, ScriptValue};
use serde::{Deserialize, Serialize};

use crate::buildgraph::builddata::ProjectBuildData;
use crate::error::Result;
use crate::language::environment::{self, EnvType};
use crate::language::filetagger::FileTagger;
use crate::language::filetags::FileTags;
use crate::language::group::{ResolvedGroup, SourceArtifact};
use crate::language::location::CodeLocation;
use crate::language::module::ResolvedModule;
use crate::language::properties::PropertyMap;
use crate::language::rule::Rule;
use crate::language::scanner::ResolvedScanner;
use crate::language::script::ScriptFunction;
use crate::util::hash::{rfc1034_identifier, sha1_hex};

/// Per-tag-filter property overrides: artifacts whose tags intersect
/// `file_tags_filter` get `property_map` instead of the product's module
/// properties, plus `extra_file_tags`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactProperties {
  pub file_tags_filter: FileTags,
  pub extra_file_tags: FileTags,
  pub property_map: PropertyMap,
}

/// A probe run at resolve time; carried for persistence only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Probe {
  pub global_id: String,
  pub location: CodeLocation,
  pub condition: bool,
  pub configure_script: ScriptFunction,
  pub properties: PropertyMap,
  pub initial_properties: PropertyMap,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ResolvedProduct {
  pub name: String,
  pub profile: String,
  pub enabled: bool,
  pub file_tags: FileTags,
  /// Unique names of the products this product depends on, resolved
  /// through the project's product map.
  pub dependencies: Vec<String>,
  pub groups: Vec<ResolvedGroup>,
  pub rules: Vec<Arc<Rule>>,
  pub modules: Vec<Arc<ResolvedModule>>,
  pub file_taggers: Vec<FileTagger>,
  pub artifact_properties: Vec<ArtifactProperties>,
  pub scanners: Vec<ResolvedScanner>,
  pub product_properties: PropertyMap,
  pub module_properties: PropertyMap,
  pub probes: Vec<Probe>,
  #[serde(skip)]
  pub build_environment: Mutex<Option<ProcessEnvironment>>,
  #[serde(skip)]
  pub run_environment: Mutex<Option<ProcessEnvironment>>,
  #[serde(skip)]
  pub executable_path_cache: Mutex<BTreeMap<String, String>>,
}

impl ResolvedProduct {
  /// `name.profile`; the profile must not be empty.
  pub fn unique_name_of(name: &str, profile: &str) -> String {
    assert!(!profile.is_empty());
    format!("{name}.{profile}")
  }

  pub fn unique_name(&self) -> String {
    Self::unique_name_of(&self.name, &self.profile)
  }

  /// The directory name a product builds into, unique per product:
  /// an RFC 1034 rendering of the unique name plus a hash suffix.
  pub fn derive_build_directory_name(name: &str, profile: &str) -> String {
    let unique = Self::unique_name_of(name, profile);
    let hash = sha1_hex(unique.as_bytes());
    format!("{}.{}", rfc1034_identifier(&unique), &hash[..8])
  }

  /// The absolute build directory, as resolved into the product properties.
  pub fn build_directory(&self) -> String {
    self
      .product_properties
      .get("buildDirectory")
      .and_then(ScriptValue::as_str)
      .unwrap_or_default()
      .to_string()
  }

  pub fn built_by_default(&self) -> bool {
    self
      .product_properties
      .get("builtByDefault")
      .map(ScriptValue::truthy)
      .unwrap_or(true)
  }

  /// All files of all groups, including expanded wildcards.
  pub fn all_files(&self) -> Vec<Arc<SourceArtifact>> {
    self.groups.iter().flat_map(ResolvedGroup::all_files).collect()
  }

  /// All files of all enabled groups.
  pub fn all_enabled_files(&self) -> Vec<Arc<SourceArtifact>> {
    self
      .groups
      .iter()
      .filter(|group| group.enabled)
      .flat_map(ResolvedGroup::all_files)
      .collect()
  }

  /// The union of the tags of all taggers matching the file name.
  pub fn file_tags_for_file_name(&self, file_name: &str) -> FileTags {
    let mut result = FileTags::new();
    for tagger in &self.file_taggers {
      if tagger.matches(file_name) {
        result.unite(tagger.file_tags());
      }
    }
    result
  }

  /// Assemble (and memoize) the build environment.
  pub fn setup_build_environment(
    &self,
    runtime: &ScriptRuntime,
    base_environment: &ProcessEnvironment,
  ) -> Result<ProcessEnvironment> {
    if let Some(environment) = self.build_environment.lock().unwrap().as_ref() {
      return Ok(environment.clone());
    }
    let environment = environment::assemble_environment(
      runtime,
      EnvType::Build,
      &self.modules,
      &self.module_properties,
      base_environment,
    )?;
    *self.build_environment.lock().unwrap() = Some(environment.clone());
    Ok(environment)
  }

  /// Assemble (and memoize) the run environment.
  pub fn setup_run_environment(
    &self,
    runtime: &ScriptRuntime,
    base_environment: &ProcessEnvironment,
  ) -> Result<ProcessEnvironment> {
    if let Some(environment) = self.run_environment.lock().unwrap().as_ref() {
      return Ok(environment.clone());
    }
    let environment = environment::assemble_environment(
      runtime,
      EnvType::Run,
      &self.modules,
      &self.module_properties,
      base_environment,
    )?;
    *self.run_environment.lock().unwrap() = Some(environment.clone());
    Ok(environment)
  }

  /// Cache a resolved executable path. Read by concurrent scheduler
  /// threads, hence the lock.
  pub fn cache_executable_path(&self, original: impl Into<String>, resolved: impl Into<String>) {
    self
      .executable_path_cache
      .lock()
      .unwrap()
      .insert(original.into(), resolved.into());
  }

  pub fn cached_executable_path(&self, original: &str) -> Option<String> {
    self.executable_path_cache.lock().unwrap().get(original).cloned()
  }
}

impl PartialEq for ResolvedProduct {
  fn eq(&self, other: &Self) -> bool {
    self.name == other.name
      && self.profile == other.profile
      && self.enabled == other.enabled
      && self.file_tags == other.file_tags
      && self.dependencies == other.dependencies
      && self.groups == other.groups
      && self.rules == other.rules
      && self.modules == other.modules
      && self.file_taggers == other.file_taggers
      && self.artifact_properties == other.artifact_properties
      && self.scanners == other.scanners
      && self.product_properties == other.product_properties
      && self.module_properties == other.module_properties
      && self.probes == other.probes
  }
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedProject {
  pub name: String,
  pub location: CodeLocation,
  pub enabled: bool,
  pub products: Vec<Arc<ResolvedProduct>>,
  pub sub_projects: Vec<ResolvedProject>,
  pub project_properties: PropertyMap,
}

impl ResolvedProject {
  /// This project's products plus those of all subprojects.
  pub fn all_products(&self) -> Vec<Arc<ResolvedProduct>> {
    let mut products = self.products.clone();
    for sub_project in &self.sub_projects {
      products.extend(sub_project.all_products());
    }
    products
  }

  pub fn all_sub_projects(&self) -> Vec<&ResolvedProject> {
    let mut projects = Vec::new();
    for sub_project in &self.sub_projects {
      projects.push(sub_project);
      projects.extend(sub_project.all_sub_projects());
    }
    projects
  }
}

/// The root of the project tree. Owns the build graph and the resolve-time
/// caches shared across the whole build.
#[derive(Debug, Serialize, Deserialize)]
pub struct TopLevelProject {
  pub project: ResolvedProject,
  pub build_configuration: PropertyMap,
  pub id: String,
  pub build_directory: String,
  pub environment: ProcessEnvironment,
  pub canonical_file_path_results: BTreeMap<String, String>,
  pub file_exists_results: BTreeMap<String, bool>,
  pub directory_entries_results: BTreeMap<String, Vec<String>>,
  pub file_last_modified_results: BTreeMap<String, SystemTime>,
  pub overridden_values: PropertyMap,
  pub build_system_files: BTreeSet<String>,
  pub last_resolve_time: Option<SystemTime>,
  #[serde(with = "crate::util::mutex_serde")]
  build_data: Mutex<ProjectBuildData>,
}

impl TopLevelProject {
  pub fn new(project: ResolvedProject, build_root: &str, build_configuration: PropertyMap) -> Self {
    let id = Self::derive_id(&build_configuration);
    let build_directory = Self::derive_build_directory(build_root, &id);
    Self {
      project,
      build_configuration,
      id,
      build_directory,
      environment: ProcessEnvironment::new(),
      canonical_file_path_results: BTreeMap::new(),
      file_exists_results: BTreeMap::new(),
      directory_entries_results: BTreeMap::new(),
      file_last_modified_results: BTreeMap::new(),
      overridden_values: PropertyMap::new(),
      build_system_files: BTreeSet::new(),
      last_resolve_time: None,
      build_data: Mutex::new(ProjectBuildData::new()),
    }
  }

  /// The configuration name is the graph's identity within the build root.
  pub fn derive_id(build_configuration: &PropertyMap) -> String {
    build_configuration
      .value_at(&["forge", "configurationName"])
      .and_then(ScriptValue::as_str)
      .unwrap_or_default()
      .to_string()
  }

  pub fn derive_build_directory(build_root: &str, id: &str) -> String {
    format!("{build_root}/{id}")
  }

  /// Where the persisted build graph for this configuration lives.
  pub fn build_graph_file_path(&self) -> String {
    format!("{}/{}.bg.json", self.build_directory, self.id)
  }

  pub fn lock_build_data(&self) -> MutexGuard<'_, ProjectBuildData> {
    self.build_data.lock().unwrap()
  }

  /// All products of the tree, keyed by unique name.
  pub fn products_by_name(&self) -> BTreeMap<String, Arc<ResolvedProduct>> {
    self
      .project
      .all_products()
      .into_iter()
      .map(|product| (product.unique_name(), product))
      .collect()
  }

  /// All projects of the tree, keyed by name, the root included.
  pub fn projects_by_name(&self) -> BTreeMap<String, &ResolvedProject> {
    let mut projects = BTreeMap::new();
    projects.insert(self.project.name.clone(), &self.project);
    for sub_project in self.project.all_sub_projects() {
      projects.insert(sub_project.name.clone(), sub_project);
    }
    projects
  }
}

impl PartialEq for TopLevelProject {
  fn eq(&self, other: &Self) -> bool {
    self.project == other.project
      && self.build_configuration == other.build_configuration
      && self.id == other.id
      && self.build_directory == other.build_directory
      && self.environment == other.environment
      && self.canonical_file_path_results == other.canonical_file_path_results
      && self.file_exists_results == other.file_exists_results
      && self.directory_entries_results == other.directory_entries_results
      && self.file_last_modified_results == other.file_last_modified_results
      && self.overridden_values == other.overridden_values
      && self.build_system_files == other.build_system_files
      && self.last_resolve_time == other.last_resolve_time
      && *self.lock_build_data() == *other.lock_build_data()
  }
}
