//! Build graph persistence.
//!
//! The whole project tree, build data included, is written as one
//! versioned JSON document. Writes are atomic (temp file + rename). On
//! load the format version is checked first; parent edges and root sets
//! are then rebuilt from the child edges, which are the only edges on the
//! wire.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ErrorInfo, ErrorKind, Result};
use crate::language::product::TopLevelProject;

/// Bumped whenever the wire format changes incompatibly.
pub const BUILD_GRAPH_FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct BuildGraphDocument {
  version: u32,
  project: TopLevelProject,
}

pub struct BuildGraphStore;

impl BuildGraphStore {
  /// Persist the project's build graph unless it is unchanged.
  pub fn store(project: &TopLevelProject) -> Result<()> {
    if !project.lock_build_data().is_dirty() {
      debug!(id = %project.id, "build graph is unchanged, not storing");
      return Ok(());
    }

    let path = project.build_graph_file_path();
    info!(path = %path, "storing build graph");
    if let Some(parent) = Path::new(&path).parent() {
      fs::create_dir_all(parent).map_err(|error| storage_error("creating build directory", error))?;
    }

    let document = StoredDocument {
      version: BUILD_GRAPH_FORMAT_VERSION,
      project,
    };
    let content = serde_json::to_string(&document)
      .map_err(|error| ErrorInfo::new(ErrorKind::Storage, format!("serializing build graph: {error}")))?;

    let temp_path = format!("{path}.tmp");
    fs::write(&temp_path, &content).map_err(|error| storage_error("writing build graph", error))?;
    fs::rename(&temp_path, &path).map_err(|error| storage_error("writing build graph", error))?;

    project.lock_build_data().set_clean();
    Ok(())
  }

  /// Load a build graph. Fails cleanly when the document's format version
  /// disagrees. Parent edges are rebuilt and the graph starts out clean.
  pub fn load(path: &str) -> Result<TopLevelProject> {
    let content = fs::read_to_string(path).map_err(|error| storage_error("reading build graph", error))?;
    let document: BuildGraphDocument = serde_json::from_str(&content)
      .map_err(|error| ErrorInfo::new(ErrorKind::Storage, format!("parsing build graph: {error}")))?;

    if document.version != BUILD_GRAPH_FORMAT_VERSION {
      return Err(ErrorInfo::new(
        ErrorKind::Storage,
        format!(
          "unsupported build graph format version {} (expected {})",
          document.version, BUILD_GRAPH_FORMAT_VERSION
        ),
      ));
    }

    let project = document.project;
    {
      let mut graph = project.lock_build_data();
      graph.rebuild_parent_edges();
      graph.set_clean();
    }
    debug!(id = %project.id, "loaded build graph");
    Ok(project)
  }
}

/// Serialization wrapper writing the current format version.
#[derive(Serialize)]
struct StoredDocument<'p> {
  version: u32,
  project: &'p TopLevelProject,
}

fn storage_error(action: &str, error: io::Error) -> ErrorInfo {
  ErrorInfo::new(ErrorKind::Storage, format!("{action}: {error}"))
}
