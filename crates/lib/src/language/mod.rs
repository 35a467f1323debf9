//! The resolved data model.
//!
//! These entities are produced by the front-end resolver and are immutable
//! afterwards, apart from the build data the rule applicator maintains.
//! They serialize through the build-graph store; field declaration order is
//! the wire order.

pub mod environment;
pub mod filetagger;
pub mod filetags;
pub mod group;
pub mod location;
pub mod module;
pub mod product;
pub mod properties;
pub mod rule;
pub mod scanner;
pub mod script;
pub mod wildcards;

pub use environment::EnvType;
pub use filetagger::FileTagger;
pub use filetags::{FileTag, FileTags};
pub use group::{ResolvedGroup, SourceArtifact};
pub use location::CodeLocation;
pub use module::ResolvedModule;
pub use product::{ArtifactProperties, Probe, ResolvedProduct, ResolvedProject, TopLevelProject};
pub use properties::PropertyMap;
pub use rule::{Binding, Rule, RuleArtifact};
pub use scanner::ResolvedScanner;
pub use script::{FileContext, ScriptFunction};
pub use wildcards::SourceWildCards;
