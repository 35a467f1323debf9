//! forge-lua: the embedded scripting host for the forgelua build engine.
//!
//! This crate wraps an `mlua` Lua state behind the small surface the engine
//! needs: evaluate a source string in a scope, chain scopes to the globals
//! the way prototypes chain in the build description language, convert
//! between host and script values, and expose a hidden mutable process
//! environment that user scripts reach through `forge.getEnv` and
//! `forge.putEnv`.
//!
//! The engine crate (`forgelua-lib`) never talks to `mlua` types other than
//! `Table`, `Value` and `Function` handed out by [`ScriptRuntime`].

pub mod env;
pub mod error;
pub mod runtime;
pub mod value;

pub use env::ProcessEnvironment;
pub use error::{Error, Result};
pub use runtime::ScriptRuntime;
pub use value::ScriptValue;
