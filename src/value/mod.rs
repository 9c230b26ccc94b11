// value/mod.rs
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

//! The runtime value.
//!
//! Everything the evaluator touches is a `Value`.  Compound values hang
//! off `Rc`s so clones are cheap and `identical?` is pointer identity;
//! structural equality and hashing follow the collection semantics: any
//! two sequential collections with equal elements are equal, maps and
//! sets compare by content, and metadata never participates.

pub mod hash;
pub mod list;
pub mod map;
pub mod num;
pub mod seq;
pub mod vector;

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use num_bigint::BigInt;

use crate::{
  analyzer::FnArity,
  env::{Env, Namespace, Var},
  error::{Error, Result},
  reader::form::{Form, FormKind},
};

use list::PList;
use map::{PMap, PSet};
use num::{BigDec, Ratio};
use seq::{ChunkedCons, ConsCell, LazySeqCell};
use vector::PVector;

#[derive(Clone, Debug)]
pub enum Value {
  Nil,
  Boolean(bool),
  Int(i64),
  Float(f64),
  Char(char),
  Str(Rc<str>),
  BigInt(Rc<BigInt>),
  BigDecimal(Rc<BigDec>),
  Ratio(Rc<Ratio>),
  Symbol(Rc<SymbolData>),
  Keyword(Rc<KeywordData>),
  List(Rc<PList>),
  Vector(Rc<PVector>),
  Map(Rc<PMap>),
  Set(Rc<PSet>),
  Cons(Rc<ConsCell>),
  Chunked(Rc<ChunkedCons>),
  LazySeq(Rc<LazySeqCell>),
  Fn(Rc<Closure>),
  Builtin(Rc<Builtin>),
  NativeFn(Rc<NativeClosure>),
  MultiFn(Rc<MultiFn>),
  Var(Rc<Var>),
  Namespace(Rc<Namespace>),
  Atom(Rc<AtomCell>),
  Volatile(Rc<RefCell<Value>>),
  Delay(Rc<DelayCell>),
  Reduced(Rc<Value>),
  Regex(Rc<RegexVal>),
  StringBuilder(Rc<RefCell<String>>),
  Exception(Rc<Error>),
}

#[derive(Clone, Debug)]
pub struct SymbolData {
  pub namespace: Option<Rc<str>>,
  pub name: Rc<str>,
  pub meta: Option<Rc<Value>>,
}

#[derive(Clone, Debug)]
pub struct KeywordData {
  pub namespace: Option<Rc<str>>,
  pub name: Rc<str>,
}

/// A closure: the analyzed arities plus the captured lexical scope.
#[derive(Clone, Debug)]
pub struct Closure {
  pub name: Option<Rc<str>>,
  pub arities: Vec<Rc<FnArity>>,
  pub variadic: Option<Rc<FnArity>>,
  pub captured: Option<Rc<crate::eval::Scope>>,
  pub meta: Option<Rc<Value>>,
}

pub type BuiltinFn = fn(&Rc<Env>, Vec<Value>) -> Result<Value>;

#[derive(Clone)]
pub struct Builtin {
  pub name: &'static str,
  pub f: BuiltinFn,
}

impl std::fmt::Debug for Builtin {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "Builtin({})", self.name)
  }
}

/// A native function that closes over Rust state: composed functions,
/// partials, memoization tables, transducer steps.
pub struct NativeClosure {
  pub name: &'static str,
  pub f: Box<dyn Fn(&Rc<Env>, Vec<Value>) -> Result<Value>>,
}

impl NativeClosure {
  pub fn new(
    name: &'static str,
    f: impl Fn(&Rc<Env>, Vec<Value>) -> Result<Value> + 'static,
  ) -> Value {
    Value::NativeFn(Rc::new(Self {
      name,
      f: Box::new(f),
    }))
  }
}

impl std::fmt::Debug for NativeClosure {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "NativeClosure({})", self.name)
  }
}

/// Runtime dispatch table of `defmulti`/`defmethod`.
#[derive(Debug)]
pub struct MultiFn {
  pub name: Rc<str>,
  pub dispatch: Value,
  pub methods: RefCell<im::HashMap<Value, Value>>,
}

#[derive(Debug)]
pub struct AtomCell {
  pub value: RefCell<Value>,
  pub meta: RefCell<Option<Value>>,
}

#[derive(Debug)]
pub struct DelayCell {
  state: RefCell<DelayState>,
}

enum DelayState {
  Pending { env: Rc<Env>, f: Value },
  Running,
  Done(Result<Value>),
}

impl std::fmt::Debug for DelayState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let label = match self {
      DelayState::Pending { .. } => "pending",
      DelayState::Running => "running",
      DelayState::Done(_) => "done",
    };
    f.write_str(label)
  }
}

impl DelayCell {
  pub fn new(env: Rc<Env>, f: Value) -> Self {
    Self {
      state: RefCell::new(DelayState::Pending { env, f }),
    }
  }

  pub fn is_realized(&self) -> bool {
    matches!(&*self.state.borrow(), DelayState::Done(_))
  }

  /// Runs the body once; both the value and a failure are cached.
  pub fn force(&self) -> Result<Value> {
    {
      let state = self.state.borrow();
      match &*state {
        DelayState::Done(result) => return result.clone(),
        DelayState::Running => {
          return Err(Error::illegal_argument(
            "delay forces itself recursively",
          ));
        }
        DelayState::Pending { .. } => (),
      }
    }
    let taken =
      std::mem::replace(&mut *self.state.borrow_mut(), DelayState::Running);
    let result = match taken {
      DelayState::Pending { env, f } => {
        crate::eval::apply(&env, &f, Vec::new())
      }
      DelayState::Running | DelayState::Done(_) => unreachable!(),
    };
    *self.state.borrow_mut() = DelayState::Done(result.clone());
    result
  }
}

#[derive(Debug)]
pub struct RegexVal {
  pub pattern: Rc<str>,
  pub regex: regex::Regex,
}

/// Key under which reified records carry their type tag; the walker and
/// the pretty printer treat it as an implementation detail.
pub const REIFY_TYPE_KEY: &str = "__reify_type";

impl Value {
  pub fn empty_list() -> Value {
    Value::List(Rc::new(PList::empty()))
  }

  pub fn list_from_vec(values: Vec<Value>) -> Value {
    Value::List(Rc::new(PList::from_vec(values)))
  }

  pub fn vector(values: Vec<Value>) -> Value {
    Value::Vector(Rc::new(PVector::from_vec(values)))
  }

  pub fn map_from_pairs(pairs: Vec<(Value, Value)>) -> Value {
    Value::Map(Rc::new(PMap::from_pairs(pairs)))
  }

  pub fn set_from_vec(values: Vec<Value>) -> Value {
    Value::Set(Rc::new(PSet::from_vec(values)))
  }

  pub fn string(s: impl Into<Rc<str>>) -> Value {
    Value::Str(s.into())
  }

  pub fn symbol(
    namespace: Option<Rc<str>>,
    name: impl Into<Rc<str>>,
  ) -> Value {
    Value::Symbol(Rc::new(SymbolData {
      namespace,
      name: name.into(),
      meta: None,
    }))
  }

  pub fn simple_symbol(name: impl Into<Rc<str>>) -> Value {
    Value::symbol(None, name)
  }

  pub fn keyword(
    namespace: Option<Rc<str>>,
    name: impl Into<Rc<str>>,
  ) -> Value {
    Value::Keyword(Rc::new(KeywordData {
      namespace,
      name: name.into(),
    }))
  }

  pub fn kw(name: &str) -> Value {
    Value::keyword(None, name)
  }

  pub fn big_int(value: BigInt) -> Value {
    Value::BigInt(Rc::new(value))
  }

  /// Logical truth: everything except `nil` and `false`.
  pub fn is_truthy(&self) -> bool {
    !matches!(self, Value::Nil | Value::Boolean(false))
  }

  pub fn type_name(&self) -> &'static str {
    match self {
      Value::Nil => "nil",
      Value::Boolean(_) => "Boolean",
      Value::Int(_) => "Long",
      Value::Float(_) => "Double",
      Value::Char(_) => "Character",
      Value::Str(_) => "String",
      Value::BigInt(_) => "BigInt",
      Value::BigDecimal(_) => "BigDecimal",
      Value::Ratio(_) => "Ratio",
      Value::Symbol(_) => "Symbol",
      Value::Keyword(_) => "Keyword",
      Value::List(_) => "PersistentList",
      Value::Vector(_) => "PersistentVector",
      Value::Map(_) => "PersistentMap",
      Value::Set(_) => "PersistentHashSet",
      Value::Cons(_) => "Cons",
      Value::Chunked(_) => "ChunkedCons",
      Value::LazySeq(_) => "LazySeq",
      Value::Fn(_) => "Fn",
      Value::Builtin(_) => "Fn",
      Value::NativeFn(_) => "Fn",
      Value::MultiFn(_) => "MultiFn",
      Value::Var(_) => "Var",
      Value::Namespace(_) => "Namespace",
      Value::Atom(_) => "Atom",
      Value::Volatile(_) => "Volatile",
      Value::Delay(_) => "Delay",
      Value::Reduced(_) => "Reduced",
      Value::Regex(_) => "Pattern",
      Value::StringBuilder(_) => "StringBuilder",
      Value::Exception(_) => "Exception",
    }
  }

  /// The reified record tag of a map value, when it carries one.
  pub fn reify_type(&self) -> Option<Rc<str>> {
    match self {
      Value::Map(m) => {
        match m.get(&Value::kw(REIFY_TYPE_KEY)) {
          Some(Value::Str(tag)) => Some(tag.clone()),
          _ => None,
        }
      }
      _ => None,
    }
  }

  pub fn is_sequential(&self) -> bool {
    matches!(
      self,
      Value::List(_)
        | Value::Vector(_)
        | Value::Cons(_)
        | Value::Chunked(_)
        | Value::LazySeq(_)
    )
  }

  pub fn is_seq(&self) -> bool {
    matches!(
      self,
      Value::List(_)
        | Value::Cons(_)
        | Value::Chunked(_)
        | Value::LazySeq(_)
    )
  }

  pub fn is_coll(&self) -> bool {
    self.is_sequential()
      || matches!(self, Value::Map(_) | Value::Set(_))
  }

  /// Anything invokable in function position.
  pub fn is_ifn(&self) -> bool {
    matches!(
      self,
      Value::Fn(_)
        | Value::Builtin(_)
        | Value::NativeFn(_)
        | Value::MultiFn(_)
        | Value::Keyword(_)
        | Value::Symbol(_)
        | Value::Map(_)
        | Value::Set(_)
        | Value::Vector(_)
        | Value::Var(_)
    )
  }

  /// Pointer/bit identity.  Keywords are compared by value because they
  /// behave as interned.
  pub fn identical(&self, other: &Value) -> bool {
    use Value as V;
    match (self, other) {
      (V::Nil, V::Nil) => true,
      (V::Boolean(a), V::Boolean(b)) => a == b,
      (V::Int(a), V::Int(b)) => a == b,
      (V::Char(a), V::Char(b)) => a == b,
      (V::Float(a), V::Float(b)) => a.to_bits() == b.to_bits(),
      (V::Keyword(a), V::Keyword(b)) => {
        a.namespace == b.namespace && a.name == b.name
      }
      (V::Str(a), V::Str(b)) => Rc::ptr_eq(a, b),
      (V::Symbol(a), V::Symbol(b)) => Rc::ptr_eq(a, b),
      (V::BigInt(a), V::BigInt(b)) => Rc::ptr_eq(a, b),
      (V::BigDecimal(a), V::BigDecimal(b)) => Rc::ptr_eq(a, b),
      (V::Ratio(a), V::Ratio(b)) => Rc::ptr_eq(a, b),
      (V::List(a), V::List(b)) => Rc::ptr_eq(a, b),
      (V::Vector(a), V::Vector(b)) => Rc::ptr_eq(a, b),
      (V::Map(a), V::Map(b)) => Rc::ptr_eq(a, b),
      (V::Set(a), V::Set(b)) => Rc::ptr_eq(a, b),
      (V::Cons(a), V::Cons(b)) => Rc::ptr_eq(a, b),
      (V::Chunked(a), V::Chunked(b)) => Rc::ptr_eq(a, b),
      (V::LazySeq(a), V::LazySeq(b)) => Rc::ptr_eq(a, b),
      (V::Fn(a), V::Fn(b)) => Rc::ptr_eq(a, b),
      (V::Builtin(a), V::Builtin(b)) => Rc::ptr_eq(a, b),
      (V::NativeFn(a), V::NativeFn(b)) => Rc::ptr_eq(a, b),
      (V::MultiFn(a), V::MultiFn(b)) => Rc::ptr_eq(a, b),
      (V::Var(a), V::Var(b)) => Rc::ptr_eq(a, b),
      (V::Namespace(a), V::Namespace(b)) => Rc::ptr_eq(a, b),
      (V::Atom(a), V::Atom(b)) => Rc::ptr_eq(a, b),
      (V::Volatile(a), V::Volatile(b)) => Rc::ptr_eq(a, b),
      (V::Delay(a), V::Delay(b)) => Rc::ptr_eq(a, b),
      (V::Reduced(a), V::Reduced(b)) => Rc::ptr_eq(a, b),
      (V::Regex(a), V::Regex(b)) => Rc::ptr_eq(a, b),
      (V::StringBuilder(a), V::StringBuilder(b)) => Rc::ptr_eq(a, b),
      (V::Exception(a), V::Exception(b)) => Rc::ptr_eq(a, b),
      _ => false,
    }
  }

  pub fn meta(&self) -> Option<Value> {
    match self {
      Value::Symbol(s) => s.meta.as_deref().cloned(),
      Value::List(l) => l.meta().cloned(),
      Value::Vector(v) => v.meta().cloned(),
      Value::Map(m) => m.meta().cloned(),
      Value::Set(s) => s.meta().cloned(),
      Value::Cons(c) => c.meta.as_deref().cloned(),
      Value::Fn(f) => f.meta.as_deref().cloned(),
      Value::Var(v) => Some(v.meta_value()),
      Value::Atom(a) => a.meta.borrow().clone(),
      _ => None,
    }
  }

  pub fn with_meta(&self, meta: Option<Value>) -> Result<Value> {
    match self {
      Value::Symbol(s) => Ok(Value::Symbol(Rc::new(SymbolData {
        namespace: s.namespace.clone(),
        name: s.name.clone(),
        meta: meta.map(Rc::new),
      }))),
      Value::List(l) => {
        Ok(Value::List(Rc::new(l.with_meta(meta))))
      }
      Value::Vector(v) => {
        Ok(Value::Vector(Rc::new(v.with_meta(meta))))
      }
      Value::Map(m) => Ok(Value::Map(Rc::new(m.with_meta(meta)))),
      Value::Set(s) => Ok(Value::Set(Rc::new(s.with_meta(meta)))),
      Value::Cons(c) => Ok(Value::Cons(Rc::new(ConsCell {
        first: c.first.clone(),
        rest: c.rest.clone(),
        meta: meta.map(Rc::new),
      }))),
      Value::Fn(f) => Ok(Value::Fn(Rc::new(Closure {
        name: f.name.clone(),
        arities: f.arities.clone(),
        variadic: f.variadic.clone(),
        captured: f.captured.clone(),
        meta: meta.map(Rc::new),
      }))),
      other => Err(Error::type_error(format!(
        "{} does not support metadata",
        other.type_name()
      ))),
    }
  }

  /// O(1) where the collection counts itself, a seq walk otherwise.
  pub fn count_value(&self) -> Result<usize> {
    match self {
      Value::Nil => Ok(0),
      Value::Str(s) => Ok(s.chars().count()),
      Value::List(l) => Ok(l.len()),
      Value::Vector(v) => Ok(v.len()),
      Value::Map(m) => Ok(m.len()),
      Value::Set(s) => Ok(s.len()),
      Value::Cons(_) | Value::Chunked(_) | Value::LazySeq(_) => {
        seq::count(self)
      }
      other => Err(Error::type_error(format!(
        "count not supported on {}",
        other.type_name()
      ))),
    }
  }

  /// Associative/indexed lookup: maps by key, vectors and strings by
  /// index, sets by membership.  `None` when absent.
  pub fn lookup(&self, key: &Value) -> Result<Option<Value>> {
    match self {
      Value::Nil => Ok(None),
      Value::Map(m) => Ok(m.get(key).cloned()),
      Value::Set(s) => {
        Ok(if s.contains(key) { Some(key.clone()) } else { None })
      }
      Value::Vector(v) => match key {
        Value::Int(i) => Ok(
          usize::try_from(*i)
            .ok()
            .and_then(|ix| v.get(ix))
            .cloned(),
        ),
        _ => Ok(None),
      },
      Value::Str(s) => match key {
        Value::Int(i) => Ok(
          usize::try_from(*i)
            .ok()
            .and_then(|ix| s.chars().nth(ix))
            .map(Value::Char),
        ),
        _ => Ok(None),
      },
      _ => Ok(None),
    }
  }

  /// The hash that `=`-equal values share; collections cache it.
  pub fn hash_value(&self) -> i32 {
    use Value as V;
    match self {
      V::Nil => 0,
      V::Boolean(true) => hash::BOOL_TRUE_HASH,
      V::Boolean(false) => hash::BOOL_FALSE_HASH,
      V::Int(_)
      | V::BigInt(_)
      | V::Ratio(_)
      | V::BigDecimal(_)
      | V::Float(_) => num::hash_num(self),
      V::Char(c) => hash::hash_int(*c as i64),
      V::Str(s) => hash::hash_string(s),
      V::Symbol(s) => hash::hash_named(
        hash::SYMBOL_SEED,
        s.namespace.as_deref(),
        &s.name,
      ),
      V::Keyword(k) => hash::hash_named(
        hash::KEYWORD_SEED,
        k.namespace.as_deref(),
        &k.name,
      ),
      V::List(l) => {
        if let Some(h) = l.cached_hash() {
          return h;
        }
        let h = hash::hash_ordered(l.iter().map(|v| v.hash_value()));
        l.cache_hash(h);
        h
      }
      V::Vector(v) => {
        if let Some(h) = v.cached_hash() {
          return h;
        }
        let h = hash::hash_ordered(v.iter().map(|x| x.hash_value()));
        v.cache_hash(h);
        h
      }
      V::Map(m) => {
        if let Some(h) = m.cached_hash() {
          return h;
        }
        let h = hash::hash_unordered(m.entries().map(|(k, v)| {
          k.hash_value() ^ v.hash_value()
        }));
        m.cache_hash(h);
        h
      }
      V::Set(s) => {
        if let Some(h) = s.cached_hash() {
          return h;
        }
        let h = hash::hash_unordered(s.iter().map(|v| v.hash_value()));
        s.cache_hash(h);
        h
      }
      V::Cons(_) | V::Chunked(_) | V::LazySeq(_) => {
        let hashes: Vec<i32> = seq::iter(self)
          .map(|item| item.map(|v| v.hash_value()).unwrap_or(0))
          .collect();
        hash::hash_ordered(hashes.into_iter())
      }
      V::Var(v) => hash::hash_named(
        hash::SYMBOL_SEED,
        Some(&v.ns_name()),
        &v.name(),
      ),
      // Reference types hash by identity-ish address bits.
      other => hash::hash_int(reference_address(other)),
    }
  }
}

fn reference_address(v: &Value) -> i64 {
  use Value as V;
  let addr = match v {
    V::Fn(rc) => Rc::as_ptr(rc) as usize,
    V::Builtin(rc) => Rc::as_ptr(rc) as usize,
    V::NativeFn(rc) => Rc::as_ptr(rc) as usize,
    V::MultiFn(rc) => Rc::as_ptr(rc) as usize,
    V::Namespace(rc) => Rc::as_ptr(rc) as usize,
    V::Atom(rc) => Rc::as_ptr(rc) as usize,
    V::Volatile(rc) => Rc::as_ptr(rc) as usize,
    V::Delay(rc) => Rc::as_ptr(rc) as usize,
    V::Reduced(rc) => Rc::as_ptr(rc) as usize,
    V::Regex(rc) => Rc::as_ptr(rc) as usize,
    V::StringBuilder(rc) => Rc::as_ptr(rc) as usize,
    V::Exception(rc) => Rc::as_ptr(rc) as usize,
    _ => 0,
  };
  addr as i64
}

impl PartialEq for Value {
  fn eq(&self, other: &Self) -> bool {
    use Value as V;
    // The numeric tower first: categories equal by value.
    if num::is_number(self) && num::is_number(other) {
      return num::equiv(self, other);
    }
    // Any two sequential collections compare as seqs.
    if self.is_sequential() && other.is_sequential() {
      return seq_equals(self, other);
    }
    match (self, other) {
      (V::Nil, V::Nil) => true,
      (V::Boolean(a), V::Boolean(b)) => a == b,
      (V::Char(a), V::Char(b)) => a == b,
      (V::Str(a), V::Str(b)) => a == b,
      (V::Symbol(a), V::Symbol(b)) => {
        a.namespace == b.namespace && a.name == b.name
      }
      (V::Keyword(a), V::Keyword(b)) => {
        a.namespace == b.namespace && a.name == b.name
      }
      (V::Map(a), V::Map(b)) => a == b,
      (V::Set(a), V::Set(b)) => a == b,
      (V::Regex(a), V::Regex(b)) => a.pattern == b.pattern,
      _ => self.identical(other),
    }
  }
}

impl Eq for Value {}

fn seq_equals(a: &Value, b: &Value) -> bool {
  let mut xs = seq::iter(a);
  let mut ys = seq::iter(b);
  loop {
    match (xs.next(), ys.next()) {
      (None, None) => return true,
      (Some(Ok(x)), Some(Ok(y))) => {
        if x != y {
          return false;
        }
      }
      _ => return false,
    }
  }
}

impl std::hash::Hash for Value {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
    state.write_i32(self.hash_value());
  }
}

/// Total order used by `sort` and `compare`.  `nil` sorts first, numbers
/// by the tower, everything else within its own kind.
pub fn compare_values(a: &Value, b: &Value) -> Result<Ordering> {
  use Value as V;
  if a == b {
    return Ok(Ordering::Equal);
  }
  match (a, b) {
    (V::Nil, _) => Ok(Ordering::Less),
    (_, V::Nil) => Ok(Ordering::Greater),
    _ if num::is_number(a) && num::is_number(b) => num::compare(a, b),
    (V::Str(x), V::Str(y)) => Ok(x.cmp(y)),
    (V::Char(x), V::Char(y)) => Ok(x.cmp(y)),
    (V::Boolean(x), V::Boolean(y)) => Ok(x.cmp(y)),
    (V::Keyword(x), V::Keyword(y)) => Ok(
      (x.namespace.as_deref(), x.name.as_ref())
        .cmp(&(y.namespace.as_deref(), y.name.as_ref())),
    ),
    (V::Symbol(x), V::Symbol(y)) => Ok(
      (x.namespace.as_deref(), x.name.as_ref())
        .cmp(&(y.namespace.as_deref(), y.name.as_ref())),
    ),
    (V::Vector(x), V::Vector(y)) => {
      match x.len().cmp(&y.len()) {
        Ordering::Equal => {
          for (xi, yi) in x.iter().zip(y.iter()) {
            match compare_values(xi, yi)? {
              Ordering::Equal => continue,
              other => return Ok(other),
            }
          }
          Ok(Ordering::Equal)
        }
        other => Ok(other),
      }
    }
    _ => Err(Error::type_error(format!(
      "cannot compare {} with {}",
      a.type_name(),
      b.type_name()
    ))),
  }
}

//
// Form conversions: reader output → values, macro results → forms.
//

pub fn form_to_value(form: &Form) -> Result<Value> {
  use FormKind as K;
  let value = match &form.kind {
    K::Nil => Value::Nil,
    K::Boolean { value } => Value::Boolean(*value),
    K::Int { value } => Value::Int(*value),
    K::BigInt { value } => Value::big_int(value.clone()),
    K::BigDecimal { unscaled, scale } => Value::BigDecimal(Rc::new(
      BigDec::new(unscaled.clone(), *scale),
    )),
    K::Ratio {
      numerator,
      denominator,
    } => Value::Ratio(Rc::new(Ratio {
      numerator: numerator.clone(),
      denominator: denominator.clone(),
    })),
    K::Float { value } => Value::Float(*value),
    K::Char { value } => Value::Char(*value),
    K::String { value } => Value::Str(value.clone()),
    K::Regex { pattern } => compile_regex(pattern)?,
    K::Symbol { namespace, name } => {
      Value::symbol(namespace.clone(), name.clone())
    }
    K::Keyword { namespace, name } => {
      Value::keyword(namespace.clone(), name.clone())
    }
    K::List { forms } => Value::list_from_vec(
      forms.iter().map(form_to_value).collect::<Result<_>>()?,
    ),
    K::Vector { forms } => Value::vector(
      forms.iter().map(form_to_value).collect::<Result<_>>()?,
    ),
    K::Map { forms } => {
      let mut pairs = Vec::with_capacity(forms.len() / 2);
      for pair in forms.chunks(2) {
        pairs.push((form_to_value(&pair[0])?, form_to_value(&pair[1])?));
      }
      Value::Map(Rc::new(PMap::from_pairs_checked(pairs)?))
    }
    K::Set { forms } => Value::Set(Rc::new(PSet::from_vec_checked(
      forms.iter().map(form_to_value).collect::<Result<_>>()?,
    )?)),
  };
  match &form.meta {
    Some(meta) => {
      let meta_value = form_to_value(meta)?;
      match value.with_meta(Some(meta_value)) {
        Ok(v) => Ok(v),
        // Scalars shrug metadata off rather than failing the read.
        Err(_) => Ok(value),
      }
    }
    None => Ok(value),
  }
}

pub fn compile_regex(pattern: &str) -> Result<Value> {
  let regex = regex::Regex::new(pattern).map_err(|e| {
    Error::illegal_argument(format!("invalid regex: {}", e))
  })?;
  Ok(Value::Regex(Rc::new(RegexVal {
    pattern: pattern.into(),
    regex,
  })))
}

/// The inverse direction, used when a user macro hands code back to the
/// expander.  Only readable values convert; a closure or an atom inside a
/// macro result has no syntactic form.
pub fn value_to_form(v: &Value) -> Result<Form> {
  use Value as V;
  let form = match v {
    V::Nil => Form::nil(),
    V::Boolean(b) => Form::boolean(*b),
    V::Int(i) => Form::int(*i),
    V::BigInt(b) => Form::new(FormKind::BigInt {
      value: b.as_ref().clone(),
    }),
    V::BigDecimal(d) => Form::new(FormKind::BigDecimal {
      unscaled: d.unscaled.clone(),
      scale: d.scale,
    }),
    V::Ratio(r) => Form::new(FormKind::Ratio {
      numerator: r.numerator.clone(),
      denominator: r.denominator.clone(),
    }),
    V::Float(f) => Form::float(*f),
    V::Char(c) => Form::new(FormKind::Char { value: *c }),
    V::Str(s) => Form::string(s.clone()),
    V::Regex(r) => Form::new(FormKind::Regex {
      pattern: r.pattern.clone(),
    }),
    V::Symbol(s) => Form::symbol(s.namespace.clone(), s.name.clone()),
    V::Keyword(k) => Form::keyword(k.namespace.clone(), k.name.clone()),
    V::List(_) | V::Cons(_) | V::Chunked(_) | V::LazySeq(_) => {
      let mut forms = Vec::new();
      for item in seq::iter(v) {
        forms.push(value_to_form(&item?)?);
      }
      Form::list(forms)
    }
    V::Vector(items) => Form::vector(
      items.iter().map(value_to_form).collect::<Result<_>>()?,
    ),
    V::Map(m) => {
      let mut forms = Vec::with_capacity(m.len() * 2);
      for (k, val) in m.entries() {
        forms.push(value_to_form(k)?);
        forms.push(value_to_form(val)?);
      }
      Form::map(forms)
    }
    V::Set(s) => Form::set(
      s.iter().map(value_to_form).collect::<Result<_>>()?,
    ),
    other => {
      return Err(Error::syntax(format!(
        "macro expansion produced an unreadable {} value",
        other.type_name()
      )));
    }
  };
  match v.meta() {
    Some(meta) => Ok(form.with_meta(value_to_form(&meta)?)),
    None => Ok(form),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sequential_collections_compare_as_seqs() {
    let list =
      Value::list_from_vec(vec![Value::Int(1), Value::Int(2)]);
    let vector = Value::vector(vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(list, vector);
    assert_eq!(list.hash_value(), {
      // Both fold the same element hashes in order.
      vector.hash_value()
    });
  }

  #[test]
  fn metadata_does_not_affect_equality_or_hash() {
    let plain = Value::vector(vec![Value::Int(1)]);
    let tagged = plain
      .with_meta(Some(Value::map_from_pairs(vec![(
        Value::kw("tag"),
        Value::Boolean(true),
      )])))
      .unwrap();
    assert_eq!(plain, tagged);
    assert_eq!(plain.hash_value(), tagged.hash_value());
  }

  #[test]
  fn keywords_are_identical_by_value() {
    assert!(Value::kw("a").identical(&Value::kw("a")));
    assert!(!Value::kw("a").identical(&Value::kw("b")));
  }

  #[test]
  fn equal_values_hash_equal_across_kinds() {
    let a = Value::map_from_pairs(vec![(
      Value::kw("k"),
      Value::vector(vec![Value::Int(1)]),
    )]);
    let b = Value::map_from_pairs(vec![(
      Value::kw("k"),
      Value::list_from_vec(vec![Value::Int(1)]),
    )]);
    assert_eq!(a, b);
    assert_eq!(a.hash_value(), b.hash_value());
  }
}
