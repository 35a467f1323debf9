//! Command change tracking.
//!
//! When a graph is loaded, transformers whose commands may depend on state
//! outside the graph carry `commands_need_change_tracking`. Re-applying a
//! rule then re-checks the observable dependencies of its commands: the
//! environment variables the prepare script read, the project property
//! maps the prepare scope exposed, and the existence of the products the
//! transformer drew dependency artifacts from.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::buildgraph::transformer::Transformer;
use crate::language::product::{ResolvedProduct, ResolvedProject};
use crate::util::hash::fingerprint;

/// Whether the transformer's commands must be considered changed even
/// though inputs, outputs and the command list itself compare equal.
pub fn commands_need_rerun(
  transformer: &Transformer,
  product: &ResolvedProduct,
  products_by_name: &BTreeMap<String, Arc<ResolvedProduct>>,
  projects_by_name: &BTreeMap<String, &ResolvedProject>,
) -> bool {
  if !transformer.commands_need_change_tracking {
    return false;
  }

  // A dependency product that vanished invalidates anything created from
  // its artifacts.
  for dependency in &product.dependencies {
    if !products_by_name.contains_key(dependency) {
      return true;
    }
  }

  // Re-check the project property maps the prepare scope exposed while
  // the commands were created. A vanished project counts as changed.
  for (name, recorded) in &transformer.project_property_reads {
    let Some(project) = projects_by_name.get(name) else {
      return true;
    };
    match fingerprint(&project.project_properties) {
      Ok(current) if &current == recorded => {}
      _ => return true,
    }
  }

  // Re-check every environment variable the prepare script observed.
  for (name, recorded) in &transformer.requested_env_reads {
    let current = std::env::var(name).ok();
    if &current != recorded {
      return true;
    }
  }

  false
}
