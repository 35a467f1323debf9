//! forgelua-lib: the rule application engine of a declarative build system.
//!
//! Products declare tagged source files and rules that transform inputs of
//! certain tags into outputs of other tags. This crate materializes those
//! rules into a concrete build graph: a bipartite graph of artifacts and
//! transformers with producer/consumer edges.
//!
//! The crate is organized like the system it models:
//! - [`language`]: the resolved data model produced by the front-end
//!   resolver (products, groups, rules, modules, taggers), plus wildcard
//!   expansion and environment assembly
//! - [`buildgraph`]: artifacts, transformers, per-product build data, the
//!   rule applicator, and build-graph persistence
//!
//! Out of scope, referenced only through their interfaces: the front-end
//! parser, the command scheduler, and the concrete scripting engine (see
//! the `forge-lua` crate).

pub mod buildgraph;
pub mod error;
pub mod language;
pub mod util;

pub use error::{ErrorInfo, ErrorKind, Result};
