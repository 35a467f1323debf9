//! Wildcard expansion for source groups.
//!
//! Patterns are expanded segment by segment against the file system.
//! Nothing under the top-level build directory is ever matched, so building
//! inside the source directory cannot pull generated files back in as
//! sources. Visited directories are recorded with their modification time
//! for incremental rescans.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::language::group::SourceArtifact;
use crate::util::paths::{clean_path, home_dir, is_pattern, normalize_separators};

/// The wildcard elements of a group's file list, together with their
/// expansion and the directory time stamps observed while expanding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceWildCards {
  pub prefix: String,
  pub patterns: Vec<String>,
  pub exclude_patterns: Vec<String>,
  pub dir_time_stamps: Vec<(String, Option<SystemTime>)>,
  pub files: Vec<Arc<SourceArtifact>>,
}

impl SourceWildCards {
  /// Expand the patterns, subtract the exclude patterns.
  pub fn expand(&mut self, base_dir: &str, build_dir: &str) -> BTreeSet<String> {
    let included = self.expand_pattern_list(&self.patterns.clone(), base_dir, build_dir);
    let excluded = self.expand_pattern_list(&self.exclude_patterns.clone(), base_dir, build_dir);
    debug!(
      matched = included.len(),
      excluded = excluded.len(),
      "expanded source wildcards"
    );
    included.difference(&excluded).cloned().collect()
  }

  fn expand_pattern_list(&mut self, patterns: &[String], base_dir: &str, build_dir: &str) -> BTreeSet<String> {
    let mut expanded_prefix = self.prefix.clone();
    if expanded_prefix.starts_with("~/")
      && let Some(home) = home_dir()
    {
      expanded_prefix = format!("{}/{}", home.to_string_lossy(), &expanded_prefix[2..]);
    }

    let mut result = BTreeSet::new();
    for pattern in patterns {
      let pattern = normalize_separators(&format!("{expanded_prefix}{pattern}"));
      let parts: Vec<String> = pattern.split('/').filter(|p| !p.is_empty()).map(str::to_string).collect();
      let root = if pattern.starts_with('/') { "/" } else { base_dir };
      self.expand_into(&mut result, &parts, root, build_dir);
    }
    result
  }

  fn expand_into(&mut self, result: &mut BTreeSet<String>, parts: &[String], base_dir: &str, build_dir: &str) {
    // The build data lives in a container directory; never descend into it.
    if base_dir.starts_with(build_dir) {
      return;
    }

    let modified = fs::metadata(base_dir).and_then(|m| m.modified()).ok();
    self.dir_time_stamps.push((base_dir.to_string(), modified));

    let mut remaining = parts;
    let mut recursive = false;
    let mut part: &str = match remaining.split_first() {
      Some((first, rest)) => {
        remaining = rest;
        first.as_str()
      }
      None => return,
    };
    while part == "**" {
      recursive = true;
      match remaining.split_first() {
        Some((first, rest)) => {
          part = first.as_str();
          remaining = rest;
        }
        None => {
          part = "*";
          break;
        }
      }
    }

    let matches_directories = !remaining.is_empty();
    let include_hidden = matches_directories && !is_pattern(part);

    if part == "." || part == ".." {
      let candidate = clean_path(&format!("{base_dir}/{part}"));
      if matches_directories {
        self.expand_into(result, remaining, &candidate, build_dir);
      } else if Path::new(&candidate).is_file() {
        result.insert(candidate);
      }
      return;
    }

    let matcher = match globset::GlobBuilder::new(part)
      .case_insensitive(false)
      .build()
      .map(|g| g.compile_matcher())
    {
      Ok(matcher) => matcher,
      Err(_) => return,
    };

    if recursive {
      let pruned_dir = build_dir.to_string();
      let walker = WalkDir::new(base_dir)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(move |entry| {
          let path = normalize_separators(&entry.path().to_string_lossy());
          if path.starts_with(&pruned_dir) {
            return false;
          }
          include_hidden || !entry.file_name().to_string_lossy().starts_with('.')
        });
      for entry in walker.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if !matcher.is_match(&name) {
          continue;
        }
        let path = normalize_separators(&entry.path().to_string_lossy());
        self.handle_match(result, remaining, &path, build_dir, matches_directories, entry.path());
      }
    } else {
      let Ok(entries) = fs::read_dir(base_dir) else {
        return;
      };
      for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if !include_hidden && name.starts_with('.') {
          continue;
        }
        if !matcher.is_match(&name) {
          continue;
        }
        let path = normalize_separators(&entry.path().to_string_lossy());
        if path.starts_with(build_dir) {
          continue;
        }
        self.handle_match(result, remaining, &path, build_dir, matches_directories, &entry.path());
      }
    }
  }

  fn handle_match(
    &mut self,
    result: &mut BTreeSet<String>,
    remaining: &[String],
    path: &str,
    build_dir: &str,
    matches_directories: bool,
    fs_path: &Path,
  ) {
    let symlink_meta = fs::symlink_metadata(fs_path);
    let is_symlink = symlink_meta.as_ref().map(|m| m.file_type().is_symlink()).unwrap_or(false);
    let is_dir = fs_path.is_dir();

    if matches_directories {
      if is_dir {
        self.expand_into(result, remaining, path, build_dir);
      }
      return;
    }

    // Real directories are not files, but symlinks to directories are
    // candidates.
    if is_dir && !is_symlink {
      return;
    }
    result.insert(clean_path(path));
  }
}
