//! Wildcard expansion against a real directory tree.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use forgelua_lib::language::{ResolvedGroup, SourceArtifact, SourceWildCards};
use tempfile::TempDir;

fn touch(path: &Path) {
  fs::create_dir_all(path.parent().unwrap()).unwrap();
  fs::File::create(path).unwrap();
}

fn wildcards(prefix: &str, patterns: &[&str], excludes: &[&str]) -> SourceWildCards {
  SourceWildCards {
    prefix: prefix.to_string(),
    patterns: patterns.iter().map(|p| p.to_string()).collect(),
    exclude_patterns: excludes.iter().map(|p| p.to_string()).collect(),
    ..Default::default()
  }
}

#[test]
fn recursive_pattern_matches_every_depth_outside_the_build_dir() -> Result<()> {
  let temp = TempDir::new()?;
  let root = temp.path();
  touch(&root.join("src/main.cpp"));
  touch(&root.join("src/core/graph.cpp"));
  touch(&root.join("src/core/detail/edge.cpp"));
  touch(&root.join("src/core/detail/edge.h"));
  // Building directly inside the source directory: generated files must
  // not be picked up as sources.
  touch(&root.join("src/build/generated.cpp"));

  // An absolute group prefix, as the resolver produces it.
  let prefix = format!("{}/", root.to_string_lossy());
  let mut wildcards = wildcards(&prefix, &["src/**/*.cpp"], &[]);
  let files = wildcards.expand(&root.to_string_lossy(), &root.join("src/build").to_string_lossy());

  assert_eq!(files.len(), 3);
  assert!(files.iter().all(|f| f.ends_with(".cpp")));
  assert!(files.iter().all(|f| !f.contains("/build/")));
  Ok(())
}

#[test]
fn exclude_patterns_subtract_from_the_expansion() -> Result<()> {
  let temp = TempDir::new()?;
  let root = temp.path();
  touch(&root.join("src/app.cpp"));
  touch(&root.join("src/gen_bindings.cpp"));
  touch(&root.join("src/nested/gen_stubs.cpp"));
  touch(&root.join("src/nested/util.cpp"));

  let prefix = format!("{}/src/", root.to_string_lossy());
  let mut wildcards = wildcards(&prefix, &["**/*.cpp"], &["**/gen_*.cpp"]);
  let files = wildcards.expand(&root.to_string_lossy(), &root.join("build").to_string_lossy());

  let names: Vec<&str> = files
    .iter()
    .map(|f| Path::new(f).file_name().unwrap().to_str().unwrap())
    .collect();
  assert_eq!(names, vec!["app.cpp", "util.cpp"]);
  Ok(())
}

#[test]
fn expanded_files_join_the_groups_file_list() -> Result<()> {
  let temp = TempDir::new()?;
  let root = temp.path();
  touch(&root.join("src/a.cpp"));
  touch(&root.join("src/b.cpp"));

  let mut wildcards = wildcards("", &["src/*.cpp"], &[]);
  let expanded = wildcards.expand(&root.to_string_lossy(), &root.join("build").to_string_lossy());
  wildcards.files = expanded
    .iter()
    .map(|path| {
      Arc::new(SourceArtifact {
        absolute_file_path: path.clone(),
        ..Default::default()
      })
    })
    .collect();

  let group = ResolvedGroup {
    name: "sources".to_string(),
    enabled: true,
    files: vec![Arc::new(SourceArtifact {
      absolute_file_path: "/p/listed.cpp".to_string(),
      ..Default::default()
    })],
    wildcards: Some(wildcards),
    ..Default::default()
  };

  let all = group.all_files();
  assert_eq!(all.len(), 3);
  assert_eq!(all[0].absolute_file_path, "/p/listed.cpp");
  assert!(all[1..].iter().all(|f| f.absolute_file_path.ends_with(".cpp")));
  Ok(())
}
