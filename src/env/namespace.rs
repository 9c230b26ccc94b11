// env/namespace.rs
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

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::value::Value;

use super::var::Var;

/// A named mapping from simple names to vars, plus aliases and referred
/// namespaces.  Mappings keep insertion order.
#[derive(Debug)]
pub struct Namespace {
  name: Rc<str>,
  mappings: RefCell<IndexMap<Rc<str>, Rc<Var>>>,
  aliases: RefCell<IndexMap<Rc<str>, Rc<str>>>,
  refers: RefCell<Vec<Rc<Namespace>>>,
}

impl Namespace {
  pub fn new(name: Rc<str>) -> Self {
    Self {
      name,
      mappings: RefCell::new(IndexMap::new()),
      aliases: RefCell::new(IndexMap::new()),
      refers: RefCell::new(Vec::new()),
    }
  }

  pub fn name(&self) -> Rc<str> {
    self.name.clone()
  }

  /// Returns the existing var under `name` or interns a fresh unbound
  /// one.
  pub fn intern(&self, name: Rc<str>) -> Rc<Var> {
    if let Some(var) = self.mappings.borrow().get(&name) {
      return var.clone();
    }
    let var = Rc::new(Var::new(self.name.clone(), name.clone()));
    self.mappings.borrow_mut().insert(name, var.clone());
    var
  }

  /// A var interned directly in this namespace, not through refers.
  pub fn mapping(&self, name: &str) -> Option<Rc<Var>> {
    self.mappings.borrow().get(name).cloned()
  }

  /// Unqualified resolution: own mappings first, then each referred
  /// namespace's public vars in refer order.
  pub fn resolve(&self, name: &str) -> Option<Rc<Var>> {
    if let Some(var) = self.mapping(name) {
      return Some(var);
    }
    for referred in self.refers.borrow().iter() {
      if let Some(var) = referred.mapping(name) {
        if is_public(&var) {
          return Some(var);
        }
      }
    }
    None
  }

  pub fn add_refer(&self, ns: Rc<Namespace>) {
    let mut refers = self.refers.borrow_mut();
    if !refers.iter().any(|r| Rc::ptr_eq(r, &ns)) {
      refers.push(ns);
    }
  }

  /// Drops every namespace-level refer; `(:refer-clojure :only [...])`
  /// uses this before mapping the selected vars one by one.
  pub fn clear_refers(&self) {
    self.refers.borrow_mut().clear();
  }

  /// Maps an existing (foreign) var directly under a simple name.
  pub fn add_mapping(&self, name: Rc<str>, var: Rc<Var>) {
    self.mappings.borrow_mut().insert(name, var);
  }

  pub fn add_alias(&self, alias: Rc<str>, ns_name: Rc<str>) {
    self.aliases.borrow_mut().insert(alias, ns_name);
  }

  pub fn alias(&self, alias: &str) -> Option<Rc<str>> {
    self.aliases.borrow().get(alias).cloned()
  }

  pub fn aliases(&self) -> Vec<(Rc<str>, Rc<str>)> {
    self
      .aliases
      .borrow()
      .iter()
      .map(|(a, n)| (a.clone(), n.clone()))
      .collect()
  }

  /// All interned vars in insertion order.
  pub fn interns(&self) -> Vec<(Rc<str>, Rc<Var>)> {
    self
      .mappings
      .borrow()
      .iter()
      .map(|(name, var)| (name.clone(), var.clone()))
      .collect()
  }

  /// The non-private subset of [`Self::interns`].
  pub fn publics(&self) -> Vec<(Rc<str>, Rc<Var>)> {
    self
      .interns()
      .into_iter()
      .filter(|(_, var)| is_public(var))
      .collect()
  }

  pub fn unmap(&self, name: &str) {
    self.mappings.borrow_mut().shift_remove(name);
  }
}

fn is_public(var: &Var) -> bool {
  match var.meta_value() {
    Value::Map(meta) => !meta
      .get(&Value::kw("private"))
      .map(Value::is_truthy)
      .unwrap_or(false),
    _ => true,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn intern_returns_the_same_var() {
    let ns = Namespace::new("user".into());
    let a = ns.intern("x".into());
    let b = ns.intern("x".into());
    assert!(Rc::ptr_eq(&a, &b));
  }

  #[test]
  fn resolution_falls_through_to_refers() {
    let core = Rc::new(Namespace::new("clojure.core".into()));
    let var = core.intern("inc".into());
    var.set_root(Value::Int(0));
    let user = Namespace::new("user".into());
    user.add_refer(core);
    assert!(user.resolve("inc").is_some());
    assert!(user.mapping("inc").is_none());
  }

  #[test]
  fn private_vars_do_not_leak_through_refers() {
    let core = Rc::new(Namespace::new("clojure.core".into()));
    let var = core.intern("secret".into());
    var.set_meta(Value::map_from_pairs(vec![(
      Value::kw("private"),
      Value::Boolean(true),
    )]));
    let user = Namespace::new("user".into());
    user.add_refer(core);
    assert!(user.resolve("secret").is_none());
  }
}
