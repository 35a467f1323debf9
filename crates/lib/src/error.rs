//! Structured diagnostics.
//!
//! Every error the engine reports is an [`ErrorInfo`]: a kind for callers to
//! dispatch on, and a chain of messages, each optionally anchored to a
//! location in the original build description. Nothing is recovered locally
//! except cancellation, which unwinds cleanly through the same type.

use std::fmt;

use crate::language::location::CodeLocation;

/// Classification of engine errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// A user-script expression threw or yielded a non-value.
  ScriptEvaluation,
  /// A script returned a value of the wrong shape.
  Shape,
  /// A required property is missing or empty.
  MissingProperty,
  /// The same output path was claimed twice within one rule application.
  DuplicateOutput,
  /// Two distinct rules target the same artifact.
  RuleConflict,
  /// A non-multiplex rule was applied with inconsistent inputs.
  MultiplexConflict,
  /// A prepare script produced no commands.
  EmptyCommands,
  /// The caller requested cancellation.
  Cancel,
  /// Build graph persistence failed.
  Storage,
  /// A broken internal invariant.
  Internal,
}

/// One message of an error chain, optionally anchored to a source location.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorItem {
  message: String,
  location: Option<CodeLocation>,
}

impl ErrorItem {
  pub fn message(&self) -> &str {
    &self.message
  }

  pub fn location(&self) -> Option<&CodeLocation> {
    self.location.as_ref()
  }
}

/// A structured diagnostic: kind plus one or more located messages.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorInfo {
  kind: ErrorKind,
  items: Vec<ErrorItem>,
}

impl ErrorInfo {
  pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      items: vec![ErrorItem {
        message: message.into(),
        location: None,
      }],
    }
  }

  pub fn with_location(kind: ErrorKind, message: impl Into<String>, location: CodeLocation) -> Self {
    let location = location.is_valid().then_some(location);
    Self {
      kind,
      items: vec![ErrorItem {
        message: message.into(),
        location,
      }],
    }
  }

  pub fn script(message: impl Into<String>, location: CodeLocation) -> Self {
    Self::with_location(ErrorKind::ScriptEvaluation, message, location)
  }

  pub fn internal(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Internal, message)
  }

  pub fn append(&mut self, message: impl Into<String>, location: Option<CodeLocation>) {
    self.items.push(ErrorItem {
      message: message.into(),
      location,
    });
  }

  pub fn prepend(mut self, message: impl Into<String>, location: Option<CodeLocation>) -> Self {
    self.items.insert(
      0,
      ErrorItem {
        message: message.into(),
        location,
      },
    );
    self
  }

  pub fn kind(&self) -> ErrorKind {
    self.kind
  }

  pub fn items(&self) -> &[ErrorItem] {
    &self.items
  }
}

impl fmt::Display for ErrorInfo {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (index, item) in self.items.iter().enumerate() {
      if index > 0 {
        writeln!(f)?;
      }
      match &item.location {
        Some(location) => write!(f, "{} [{}]", item.message, location)?,
        None => write!(f, "{}", item.message)?,
      }
    }
    Ok(())
  }
}

impl std::error::Error for ErrorInfo {}

impl From<forge_lua::Error> for ErrorInfo {
  fn from(error: forge_lua::Error) -> Self {
    ErrorInfo::new(ErrorKind::ScriptEvaluation, error.to_string())
  }
}

impl From<mlua::Error> for ErrorInfo {
  fn from(error: mlua::Error) -> Self {
    ErrorInfo::from(forge_lua::Error::from(error))
  }
}

pub type Result<T> = std::result::Result<T, ErrorInfo>;
