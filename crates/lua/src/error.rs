//! Error types for forge-lua

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
  #[error("Lua error: {0}")]
  Lua(#[from] mlua::Error),

  #[error("Evaluation error: {0}")]
  Eval(String),

  #[error("Value conversion error: {0}")]
  Convert(String),
}

pub type Result<T> = std::result::Result<T, Error>;
