//! Shared error type used across the compilation pipeline.
//!
//! Every diagnostic is fatal: the first error produced by any stage is
//! propagated to the caller unchanged. Messages follow the classic KXI
//! format of a line number followed by the complaint.

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CompileError {
  #[snafu(display("Cannot open the file: {path}"))]
  Io {
    path: String,
    source: std::io::Error,
  },

  #[snafu(display("{line}: Unknown token {lexeme}"))]
  Lexical { line: usize, lexeme: String },

  #[snafu(display("{line}: Found {found} expecting {expected}"))]
  Syntax {
    line: usize,
    found: String,
    expected: String,
  },

  #[snafu(display("{line}: {message}"))]
  Semantic { line: usize, message: String },

  #[snafu(display("internal compiler error: {message}"))]
  Internal { message: String },
}

impl CompileError {
  pub fn syntax(line: usize, found: impl Into<String>, expected: impl Into<String>) -> Self {
    Self::Syntax {
      line,
      found: found.into(),
      expected: expected.into(),
    }
  }

  pub fn semantic(line: usize, message: impl Into<String>) -> Self {
    Self::Semantic {
      line,
      message: message.into(),
    }
  }

  /// An invariant of the compiler itself was broken; never caused by input.
  pub fn internal(message: impl Into<String>) -> Self {
    Self::Internal {
      message: message.into(),
    }
  }

  /// Process exit status for this class of failure.
  pub fn exit_code(&self) -> i32 {
    match self {
      Self::Io { .. } => 1,
      Self::Lexical { .. } | Self::Syntax { .. } | Self::Semantic { .. } => 2,
      Self::Internal { .. } => 4,
    }
  }

  /// Source line the diagnostic points at, if any.
  pub fn line(&self) -> Option<usize> {
    match self {
      Self::Lexical { line, .. } | Self::Syntax { line, .. } | Self::Semantic { line, .. } => {
        Some(*line)
      }
      Self::Io { .. } | Self::Internal { .. } => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn syntax_message_format() {
    let err = CompileError::syntax(7, "}", ";");
    assert_eq!(err.to_string(), "7: Found } expecting ;");
    assert_eq!(err.exit_code(), 2);
    assert_eq!(err.line(), Some(7));
  }

  #[test]
  fn internal_errors_use_distinct_exit_code() {
    let err = CompileError::internal("operand stack empty");
    assert_eq!(err.exit_code(), 4);
    assert_eq!(err.line(), None);
  }
}
