//! The build graph: artifacts, transformers, and the rule applicator that
//! materializes rules into them.
//!
//! Nodes live in slot arenas owned by [`builddata::ProjectBuildData`];
//! edges are id sets, never owning pointers, so the artifact/transformer/
//! rule triangle stays acyclic for ownership purposes.

pub mod applicator;
pub mod artifact;
pub mod bindings;
pub mod builddata;
pub mod storage;
pub mod tracking;
pub mod transformer;

pub use applicator::{CancelToken, RulesApplicator};
pub use artifact::{Artifact, ArtifactId, ArtifactKind, ArtifactSet};
pub use builddata::{ProductBuildData, ProjectBuildData};
pub use storage::BuildGraphStore;
pub use transformer::{RuleCommand, Transformer, TransformerId};
