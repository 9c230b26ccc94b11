// reader/form.rs
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

//! The immutable syntax tree the reader produces and the macro expander
//! rewrites.  A form is a tagged node plus optional metadata; metadata never
//! takes part in equality.

use std::rc::Rc;

use num_bigint::BigInt;

use crate::error::SourcePos;

#[derive(Clone, Debug)]
pub struct Form {
  pub kind: FormKind,
  pub meta: Option<Rc<Form>>,
  pub pos: Option<SourcePos>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FormKind {
  Nil,
  Boolean {
    value: bool,
  },
  Int {
    value: i64,
  },
  BigInt {
    value: BigInt,
  },
  BigDecimal {
    unscaled: BigInt,
    scale: i32,
  },
  Ratio {
    numerator: BigInt,
    denominator: BigInt,
  },
  Float {
    value: f64,
  },
  Char {
    value: char,
  },
  String {
    value: Rc<str>,
  },
  Regex {
    pattern: Rc<str>,
  },
  Symbol {
    namespace: Option<Rc<str>>,
    name: Rc<str>,
  },
  Keyword {
    namespace: Option<Rc<str>>,
    name: Rc<str>,
  },
  List {
    forms: Vec<Form>,
  },
  Vector {
    forms: Vec<Form>,
  },
  /// Alternating key/value forms in the order they were read.
  Map {
    forms: Vec<Form>,
  },
  Set {
    forms: Vec<Form>,
  },
}

impl PartialEq for Form {
  fn eq(&self, other: &Self) -> bool {
    self.kind == other.kind
  }
}

impl Form {
  pub fn new(kind: FormKind) -> Self {
    Self {
      kind,
      meta: None,
      pos: None,
    }
  }

  pub fn at(kind: FormKind, pos: Option<SourcePos>) -> Self {
    Self {
      kind,
      meta: None,
      pos,
    }
  }

  pub fn nil() -> Self {
    Self::new(FormKind::Nil)
  }

  pub fn boolean(value: bool) -> Self {
    Self::new(FormKind::Boolean { value })
  }

  pub fn int(value: i64) -> Self {
    Self::new(FormKind::Int { value })
  }

  pub fn float(value: f64) -> Self {
    Self::new(FormKind::Float { value })
  }

  pub fn string(value: impl Into<Rc<str>>) -> Self {
    Self::new(FormKind::String {
      value: value.into(),
    })
  }

  pub fn symbol(
    namespace: Option<Rc<str>>,
    name: impl Into<Rc<str>>,
  ) -> Self {
    Self::new(FormKind::Symbol {
      namespace,
      name: name.into(),
    })
  }

  /// An unqualified symbol.
  pub fn sym(name: &str) -> Self {
    Self::symbol(None, name)
  }

  /// A `clojure.core`-qualified symbol, as syntax-quote resolution emits
  /// them.
  pub fn core_sym(name: &str) -> Self {
    Self::symbol(Some("clojure.core".into()), name)
  }

  pub fn keyword(
    namespace: Option<Rc<str>>,
    name: impl Into<Rc<str>>,
  ) -> Self {
    Self::new(FormKind::Keyword {
      namespace,
      name: name.into(),
    })
  }

  pub fn kw(name: &str) -> Self {
    Self::keyword(None, name)
  }

  pub fn list(forms: Vec<Form>) -> Self {
    Self::new(FormKind::List { forms })
  }

  pub fn vector(forms: Vec<Form>) -> Self {
    Self::new(FormKind::Vector { forms })
  }

  pub fn map(forms: Vec<Form>) -> Self {
    Self::new(FormKind::Map { forms })
  }

  pub fn set(forms: Vec<Form>) -> Self {
    Self::new(FormKind::Set { forms })
  }

  /// A two-element list `(head x)`, the shape every reader sugar expands
  /// into.
  pub fn tagged(head: Form, form: Form) -> Self {
    let pos = form.pos;
    Self::at(
      FormKind::List {
        forms: vec![head, form],
      },
      pos,
    )
  }

  pub fn with_meta(mut self, meta: Form) -> Self {
    self.meta = Some(Rc::new(meta));
    self
  }

  /// Carries `pos` and `meta` of `original` over to this form.  The macro
  /// expander uses this so that rewritten calls keep pointing at their
  /// source.
  pub fn inheriting(mut self, original: &Form) -> Self {
    self.pos = original.pos;
    if self.meta.is_none() {
      self.meta = original.meta.clone();
    }
    self
  }

  pub fn meta(&self) -> Option<&Form> {
    self.meta.as_deref()
  }

  //
  // Accessors
  //

  pub fn is_nil(&self) -> bool {
    matches!(self.kind, FormKind::Nil)
  }

  pub fn is_list(&self) -> bool {
    matches!(self.kind, FormKind::List { .. })
  }

  pub fn is_symbol(&self) -> bool {
    matches!(self.kind, FormKind::Symbol { .. })
  }

  pub fn is_keyword(&self) -> bool {
    matches!(self.kind, FormKind::Keyword { .. })
  }

  pub fn as_list(&self) -> Option<&[Form]> {
    match &self.kind {
      FormKind::List { forms } => Some(forms),
      _ => None,
    }
  }

  pub fn as_vector(&self) -> Option<&[Form]> {
    match &self.kind {
      FormKind::Vector { forms } => Some(forms),
      _ => None,
    }
  }

  /// The `(namespace, name)` pair of a symbol form.
  pub fn as_symbol(&self) -> Option<(Option<&str>, &str)> {
    match &self.kind {
      FormKind::Symbol { namespace, name } => {
        Some((namespace.as_deref(), name.as_ref()))
      }
      _ => None,
    }
  }

  pub fn as_keyword(&self) -> Option<(Option<&str>, &str)> {
    match &self.kind {
      FormKind::Keyword { namespace, name } => {
        Some((namespace.as_deref(), name.as_ref()))
      }
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match &self.kind {
      FormKind::String { value } => Some(value.as_ref()),
      _ => None,
    }
  }

  /// True for an unqualified symbol with exactly this name.
  pub fn is_sym_named(&self, expected: &str) -> bool {
    matches!(
      &self.kind,
      FormKind::Symbol { namespace: None, name } if name.as_ref() == expected
    )
  }

  /// True for a keyword `:expected` without a namespace.
  pub fn is_kw_named(&self, expected: &str) -> bool {
    matches!(
      &self.kind,
      FormKind::Keyword { namespace: None, name } if name.as_ref() == expected
    )
  }

  /// The head symbol name of a list form, when the head is an unqualified
  /// symbol.  This is what native-transform and special-form lookup key on.
  pub fn head_symbol(&self) -> Option<&str> {
    let forms = self.as_list()?;
    let (namespace, name) = forms.first()?.as_symbol()?;
    match namespace {
      None | Some("clojure.core") => Some(name),
      _ => None,
    }
  }

  /// Splits a call form into head symbol name and argument forms.
  pub fn as_call(&self) -> Option<(&str, &[Form])> {
    let forms = self.as_list()?;
    let (namespace, name) = forms.first()?.as_symbol()?;
    match namespace {
      None | Some("clojure.core") => Some((name, &forms[1..])),
      _ => None,
    }
  }
}

/// Renders a form back to reader syntax.  Good enough for error messages
/// and expansion traces; the value printer is the authoritative one.
impl std::fmt::Display for Form {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    use FormKind as K;
    match &self.kind {
      K::Nil => write!(f, "nil"),
      K::Boolean { value } => write!(f, "{}", value),
      K::Int { value } => write!(f, "{}", value),
      K::BigInt { value } => write!(f, "{}N", value),
      K::BigDecimal { unscaled, scale } => {
        write!(f, "{}e{}M", unscaled, -(*scale as i64))
      }
      K::Ratio {
        numerator,
        denominator,
      } => write!(f, "{}/{}", numerator, denominator),
      K::Float { value } => write!(f, "{}", value),
      K::Char { value } => write!(f, "\\{}", value),
      K::String { value } => write!(f, "{:?}", value),
      K::Regex { pattern } => write!(f, "#\"{}\"", pattern),
      K::Symbol { namespace, name } => match namespace {
        Some(ns) => write!(f, "{}/{}", ns, name),
        None => write!(f, "{}", name),
      },
      K::Keyword { namespace, name } => match namespace {
        Some(ns) => write!(f, ":{}/{}", ns, name),
        None => write!(f, ":{}", name),
      },
      K::List { forms } => write_seq(f, "(", forms, ")"),
      K::Vector { forms } => write_seq(f, "[", forms, "]"),
      K::Map { forms } => write_seq(f, "{", forms, "}"),
      K::Set { forms } => write_seq(f, "#{", forms, "}"),
    }
  }
}

fn write_seq(
  f: &mut std::fmt::Formatter<'_>,
  open: &str,
  forms: &[Form],
  close: &str,
) -> std::fmt::Result {
  write!(f, "{}", open)?;
  for (i, form) in forms.iter().enumerate() {
    if i > 0 {
      write!(f, " ")?;
    }
    write!(f, "{}", form)?;
  }
  write!(f, "{}", close)
}
