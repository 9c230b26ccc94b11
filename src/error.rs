// error.rs
// Copyright 2025 Matti Hänninen
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License. You may obtain a copy of
// the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied. See the
// License for the specific language governing permissions and limitations under
// the License.

use std::rc::Rc;

use thiserror::Error as ThisError;

use crate::value::Value;

/// Semantic error classes of the runtime.  Every error the reader, the
/// expander, the analyzer, or the evaluator signals belongs to exactly one
/// of these; user code observes them through the catch-by-class-symbol
/// machinery of `try`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
  /// Malformed source text.
  Reader,
  /// Analyzer rejection: `recur` outside tail position, bad binding vector,
  /// unknown special form, and friends.
  Syntax,
  /// Wrong argument count.
  Arity,
  /// Wrong argument type.
  Type,
  /// Division by zero or integer overflow under the unprimed operators.
  Arithmetic,
  /// Unresolvable symbol, unbound var, or a `case` with no matching clause
  /// and no default.
  Lookup,
  /// `(assert ...)` failure.
  Assertion,
  IllegalArgument,
  UnsupportedOperation,
  /// Macro expansion failed to reach a fixed point within the depth limit.
  ExpansionDepth,
  /// Anything raised through `(throw (ex-info ...))` or by throwing a map
  /// or reified record.
  User,
}

impl ErrorKind {
  /// The class symbol under which this kind reports itself.
  pub fn class_name(&self) -> &'static str {
    use ErrorKind as K;
    match self {
      K::Reader => "ReaderException",
      K::Syntax => "SyntaxException",
      K::Arity => "ArityException",
      K::Type => "ClassCastException",
      K::Arithmetic => "ArithmeticException",
      K::Lookup => "IllegalStateException",
      K::Assertion => "AssertionError",
      K::IllegalArgument => "IllegalArgumentException",
      K::UnsupportedOperation => "UnsupportedOperationException",
      K::ExpansionDepth => "StackOverflowError",
      K::User => "ExceptionInfo",
    }
  }
}

/// 1-indexed source position carried by reader errors and by forms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourcePos {
  pub line: u32,
  pub col: u32,
}

/// The runtime error value.
///
/// An error is itself a value: `catch` binds it, `ex-message`, `ex-data`,
/// and `ex-cause` pick it apart, and the REPL boundary renders it.  The
/// `class` field carries the tag of a thrown reified record, when there is
/// one; otherwise the class is derived from `kind`.
#[derive(Clone, Debug, ThisError)]
#[error("{message}")]
pub struct Error {
  pub kind: ErrorKind,
  pub message: String,
  pub data: Option<Value>,
  pub cause: Option<Rc<Error>>,
  pub class: Option<Rc<str>>,
  pub pos: Option<SourcePos>,
}

impl Error {
  pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
      data: None,
      cause: None,
      class: None,
      pos: None,
    }
  }

  pub fn reader(message: impl Into<String>, line: u32, col: u32) -> Self {
    Self {
      pos: Some(SourcePos { line, col }),
      ..Self::new(ErrorKind::Reader, message)
    }
  }

  pub fn syntax(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Syntax, message)
  }

  pub fn arity(n_args: usize, context: &str) -> Self {
    Self::new(
      ErrorKind::Arity,
      format!("wrong number of args ({}) passed to: {}", n_args, context),
    )
  }

  pub fn type_error(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Type, message)
  }

  pub fn arithmetic(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Arithmetic, message)
  }

  pub fn lookup(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Lookup, message)
  }

  pub fn illegal_argument(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::IllegalArgument, message)
  }

  pub fn unsupported(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::UnsupportedOperation, message)
  }

  pub fn with_data(mut self, data: Value) -> Self {
    self.data = Some(data);
    self
  }

  pub fn with_cause(mut self, cause: Error) -> Self {
    self.cause = Some(Rc::new(cause));
    self
  }

  /// The class symbol this error answers to.
  pub fn class(&self) -> &str {
    self.class.as_deref().unwrap_or_else(|| self.kind.class_name())
  }

  /// Whether a `(catch class-sym ...)` clause with the given class symbol
  /// catches this error.  `Throwable` catches everything, `Exception`
  /// everything except assertion failures and expansion blowups, `Error`
  /// exactly those two, and a concrete name catches its own kind.  A few
  /// historical aliases are accepted because the embedded libraries use
  /// them interchangeably.
  pub fn is_caught_by(&self, class_sym: &str) -> bool {
    use ErrorKind as K;
    match class_sym {
      "Throwable" => true,
      "Exception" | "RuntimeException" => {
        !matches!(self.kind, K::Assertion | K::ExpansionDepth)
      }
      "Error" => matches!(self.kind, K::Assertion | K::ExpansionDepth),
      "ArithmeticException" | "ArithmeticError" => {
        self.kind == K::Arithmetic
      }
      "AssertionError" => self.kind == K::Assertion,
      "IllegalArgumentException" => self.kind == K::IllegalArgument,
      "UnsupportedOperationException" => {
        self.kind == K::UnsupportedOperation
      }
      "ClassCastException" | "TypeError" => self.kind == K::Type,
      "IllegalStateException" | "LookupError" => self.kind == K::Lookup,
      "ExceptionInfo" => self.kind == K::User && self.class.is_none(),
      other => self.class.as_deref() == Some(other),
    }
  }

  /// Root cause, for REPL-boundary triage.
  pub fn root_cause(&self) -> &Error {
    let mut e = self;
    while let Some(cause) = e.cause.as_deref() {
      e = cause;
    }
    e
  }

  /// The REPL-boundary report: phase, class, message, position, and the
  /// root-cause message, as a map value the host renders to `*err*`.
  pub fn triage(&self) -> Value {
    use ErrorKind as K;
    let phase = match self.kind {
      K::Reader => "read-source",
      K::Syntax | K::ExpansionDepth => "macroexpansion",
      _ => "execution",
    };
    let mut pairs = vec![
      (Value::kw("phase"), Value::kw(phase)),
      (Value::kw("class"), Value::string(self.class())),
      (Value::kw("message"), Value::string(self.message.clone())),
    ];
    if let Some(pos) = self.pos {
      pairs.push((Value::kw("line"), Value::Int(pos.line as i64)));
      pairs.push((Value::kw("column"), Value::Int(pos.col as i64)));
    }
    let root = self.root_cause();
    if !std::ptr::eq(root, self) {
      pairs.push((
        Value::kw("cause"),
        Value::string(root.message.clone()),
      ));
    }
    Value::map_from_pairs(pairs)
  }
}

pub type Result<T> = std::result::Result<T, Error>;
