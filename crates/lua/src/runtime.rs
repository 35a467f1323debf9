//! The shared Lua runtime.
//!
//! One [`ScriptRuntime`] backs one evaluation context. It is not reentrant
//! and must not be shared across threads; callers that fan out across
//! products give each product its own runtime.
//!
//! Scopes are plain tables whose metatable `__index` chains to a parent
//! scope (ultimately the Lua globals), which is how the build language's
//! prototype chain is realized. Every chunk is loaded with the scope as its
//! environment, so assignments land in the scope and lookups fall through
//! the chain.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use mlua::prelude::*;
use tracing::trace;

use crate::env::ProcessEnvironment;
use crate::error::{Error, Result};

pub struct ScriptRuntime {
  lua: Lua,
  env_handle: Rc<RefCell<Option<ProcessEnvironment>>>,
  requested_env: Rc<RefCell<BTreeMap<String, Option<String>>>>,
}

impl ScriptRuntime {
  /// Create a runtime with the `forge` global table registered.
  pub fn new() -> Result<Self> {
    let lua = Lua::new();
    let env_handle: Rc<RefCell<Option<ProcessEnvironment>>> = Rc::new(RefCell::new(None));
    let requested_env: Rc<RefCell<BTreeMap<String, Option<String>>>> = Rc::new(RefCell::new(BTreeMap::new()));
    register_forge_globals(&lua, env_handle.clone(), requested_env.clone())?;
    Ok(Self {
      lua,
      env_handle,
      requested_env,
    })
  }

  pub fn lua(&self) -> &Lua {
    &self.lua
  }

  /// Install the environment that `forge.putEnv` mutates. Replaces any
  /// previously installed handle.
  pub fn install_env_handle(&self, env: ProcessEnvironment) {
    *self.env_handle.borrow_mut() = Some(env);
  }

  /// Take the (possibly mutated) environment back from the runtime.
  pub fn take_env_handle(&self) -> Option<ProcessEnvironment> {
    self.env_handle.borrow_mut().take()
  }

  /// Forget which environment variables scripts have read so far.
  pub fn clear_requested_env(&self) {
    self.requested_env.borrow_mut().clear();
  }

  /// The environment variables scripts read since the last clear, with the
  /// values they observed. Feeds command change tracking.
  pub fn requested_env(&self) -> BTreeMap<String, Option<String>> {
    self.requested_env.borrow().clone()
  }

  /// A fresh scope whose prototype is the Lua globals.
  pub fn create_scope(&self) -> Result<LuaTable> {
    self.create_child_scope(&self.lua.globals())
  }

  /// A fresh scope chaining to an arbitrary parent scope.
  pub fn create_child_scope(&self, parent: &LuaTable) -> Result<LuaTable> {
    let scope = self.lua.create_table()?;
    let metatable = self.lua.create_table()?;
    metatable.set("__index", parent.clone())?;
    scope.set_metatable(Some(metatable));
    Ok(scope)
  }

  /// Evaluate a Lua expression with the scope as chunk environment.
  pub fn eval_expression(&self, source: &str, chunk_name: &str, scope: &LuaTable) -> Result<LuaValue> {
    trace!(chunk = chunk_name, "evaluating expression");
    let value = self
      .lua
      .load(format!("return {source}"))
      .set_name(chunk_name)
      .set_environment(scope.clone())
      .eval::<LuaValue>()?;
    Ok(value)
  }

  /// Evaluate a source string that must yield a function.
  pub fn eval_function(&self, source: &str, chunk_name: &str, scope: &LuaTable) -> Result<LuaFunction> {
    match self.eval_expression(source, chunk_name, scope)? {
      LuaValue::Function(function) => Ok(function),
      other => Err(Error::Eval(format!(
        "Function expected, {} evaluated to a {}",
        chunk_name,
        other.type_name()
      ))),
    }
  }

  /// Call a function with raw Lua arguments.
  pub fn call_function(&self, function: &LuaFunction, args: Vec<LuaValue>) -> Result<LuaValue> {
    Ok(function.call::<LuaValue>(LuaMultiValue::from_vec(args))?)
  }
}

fn register_forge_globals(
  lua: &Lua,
  env_handle: Rc<RefCell<Option<ProcessEnvironment>>>,
  requested_env: Rc<RefCell<BTreeMap<String, Option<String>>>>,
) -> Result<()> {
  let forge = lua.create_table()?;

  let handle = env_handle.clone();
  let requested = requested_env.clone();
  let get_env = lua.create_function(move |_, name: String| {
    let value = handle.borrow().as_ref().and_then(|env| env.get(&name).map(str::to_string));
    requested.borrow_mut().insert(name, value.clone());
    Ok(value)
  })?;
  forge.set("getEnv", get_env)?;

  let handle = env_handle;
  let put_env = lua.create_function(move |_, (name, value): (String, Option<String>)| {
    let mut guard = handle.borrow_mut();
    let Some(env) = guard.as_mut() else {
      return Err(LuaError::external("no process environment is active"));
    };
    match value {
      Some(value) => env.set(name, value),
      None => env.remove(&name),
    }
    Ok(())
  })?;
  forge.set("putEnv", put_env)?;

  lua.globals().set("forge", forge)?;
  Ok(())
}
