// env/var.rs
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

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::{
  error::{Error, Result},
  value::Value,
};

/// A named, rebindable slot owned by a namespace.
///
/// The root holds the global value.  Dynamic vars additionally carry a
/// per-var binding stack; dereferencing sees the top of that stack when
/// it is non-empty, and `set!` mutates only that top, never the root.
#[derive(Debug)]
pub struct Var {
  ns: Rc<str>,
  name: Rc<str>,
  root: RefCell<Option<Value>>,
  dynamic: Cell<bool>,
  macro_flag: Cell<bool>,
  meta: RefCell<Value>,
  bindings: RefCell<Vec<Value>>,
}

impl Var {
  pub fn new(ns: Rc<str>, name: Rc<str>) -> Self {
    Self {
      ns,
      name,
      root: RefCell::new(None),
      dynamic: Cell::new(false),
      macro_flag: Cell::new(false),
      meta: RefCell::new(Value::Nil),
      bindings: RefCell::new(Vec::new()),
    }
  }

  pub fn ns_name(&self) -> Rc<str> {
    self.ns.clone()
  }

  pub fn name(&self) -> Rc<str> {
    self.name.clone()
  }

  pub fn qualified_name(&self) -> String {
    format!("{}/{}", self.ns, self.name)
  }

  /// A var with a root slot value (or a live thread binding) is bound.
  pub fn is_bound(&self) -> bool {
    !self.bindings.borrow().is_empty() || self.root.borrow().is_some()
  }

  pub fn deref(&self) -> Result<Value> {
    if let Some(top) = self.bindings.borrow().last() {
      return Ok(top.clone());
    }
    self.root.borrow().clone().ok_or_else(|| {
      Error::lookup(format!(
        "unable to resolve var: {} is unbound",
        self.qualified_name()
      ))
    })
  }

  pub fn root(&self) -> Option<Value> {
    self.root.borrow().clone()
  }

  pub fn set_root(&self, value: Value) {
    *self.root.borrow_mut() = Some(value);
  }

  pub fn unbind_root(&self) {
    *self.root.borrow_mut() = None;
  }

  pub fn is_dynamic(&self) -> bool {
    self.dynamic.get()
  }

  pub fn set_dynamic(&self, dynamic: bool) {
    self.dynamic.set(dynamic);
  }

  pub fn is_macro(&self) -> bool {
    self.macro_flag.get()
  }

  pub fn set_macro(&self, is_macro: bool) {
    self.macro_flag.set(is_macro);
  }

  pub fn meta_value(&self) -> Value {
    self.meta.borrow().clone()
  }

  pub fn set_meta(&self, meta: Value) {
    *self.meta.borrow_mut() = meta;
  }

  //
  // The dynamic binding stack
  //

  pub fn push_binding(&self, value: Value) -> Result<()> {
    if !self.is_dynamic() {
      return Err(Error::illegal_argument(format!(
        "can't dynamically bind non-dynamic var: {}",
        self.qualified_name()
      )));
    }
    self.bindings.borrow_mut().push(value);
    Ok(())
  }

  pub fn pop_binding(&self) -> Result<()> {
    self.bindings.borrow_mut().pop().map(|_| ()).ok_or_else(|| {
      Error::illegal_argument(format!(
        "pop without matching push on {}",
        self.qualified_name()
      ))
    })
  }

  pub fn has_binding(&self) -> bool {
    !self.bindings.borrow().is_empty()
  }

  /// `set!`: mutates the top binding frame, never the root.
  pub fn set_binding(&self, value: Value) -> Result<()> {
    let mut bindings = self.bindings.borrow_mut();
    match bindings.last_mut() {
      Some(top) => {
        *top = value;
        Ok(())
      }
      None => Err(Error::illegal_argument(format!(
        "can't change/establish root binding of {} with set",
        self.qualified_name()
      ))),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn var() -> Var {
    Var::new("user".into(), "x".into())
  }

  #[test]
  fn unbound_var_errors_on_deref() {
    assert!(var().deref().is_err());
  }

  #[test]
  fn binding_shadows_root_and_pops_back() {
    let v = var();
    v.set_dynamic(true);
    v.set_root(Value::Int(1));
    v.push_binding(Value::Int(2)).unwrap();
    assert_eq!(v.deref().unwrap(), Value::Int(2));
    v.set_binding(Value::Int(3)).unwrap();
    assert_eq!(v.deref().unwrap(), Value::Int(3));
    v.pop_binding().unwrap();
    assert_eq!(v.deref().unwrap(), Value::Int(1));
  }

  #[test]
  fn set_without_binding_frame_is_rejected() {
    let v = var();
    v.set_root(Value::Int(1));
    assert!(v.set_binding(Value::Int(2)).is_err());
  }

  #[test]
  fn non_dynamic_vars_refuse_bindings() {
    let v = var();
    assert!(v.push_binding(Value::Int(1)).is_err());
  }
}
