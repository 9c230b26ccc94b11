// env/mod.rs
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

//! The process-wide runtime environment: the namespace registry, the
//! current namespace, the gensym counter, thread-binding frames, and the
//! standard output plumbing.  One `Env` lives for the whole session; tests
//! build fresh ones.

mod namespace;
mod var;

use std::cell::{Cell, RefCell};
use std::io::Write;
use std::rc::Rc;

use indexmap::IndexMap;
use log::debug;

use crate::{
  error::{Error, Result},
  value::Value,
};

pub use namespace::Namespace;
pub use var::Var;

pub const CORE_NS: &str = "clojure.core";
pub const USER_NS: &str = "user";

#[derive(Debug)]
pub struct Env {
  namespaces: RefCell<IndexMap<Rc<str>, Rc<Namespace>>>,
  current_ns: RefCell<Rc<Namespace>>,
  gensym_counter: Cell<u64>,
  /// Vars pushed per `push-thread-bindings` frame, so the matching pop
  /// unwinds exactly its own frame.
  binding_frames: RefCell<Vec<Vec<Rc<Var>>>>,
  rng_state: Cell<u64>,
}

impl Env {
  /// A bare environment: namespaces exist, the core vars do not.  Use
  /// [`Env::bootstrap`] for a runnable runtime.
  pub fn new() -> Rc<Self> {
    let core: Rc<Namespace> = Rc::new(Namespace::new(CORE_NS.into()));
    let user: Rc<Namespace> = Rc::new(Namespace::new(USER_NS.into()));
    user.add_refer(core.clone());
    let mut namespaces = IndexMap::new();
    namespaces.insert(core.name(), core);
    namespaces.insert(user.name(), user.clone());
    Rc::new(Self {
      namespaces: RefCell::new(namespaces),
      current_ns: RefCell::new(user),
      gensym_counter: Cell::new(0),
      binding_frames: RefCell::new(Vec::new()),
      rng_state: Cell::new(0x9E37_79B9_7F4A_7C15),
    })
  }

  /// A full runtime with `clojure.core` installed and `user` current.
  pub fn bootstrap() -> Rc<Self> {
    let env = Self::new();
    crate::core::install(&env);
    env
  }

  //
  // Namespaces
  //

  pub fn current_ns(&self) -> Rc<Namespace> {
    self.current_ns.borrow().clone()
  }

  pub fn set_current_ns(&self, ns: Rc<Namespace>) {
    *self.current_ns.borrow_mut() = ns;
  }

  pub fn core_ns(&self) -> Rc<Namespace> {
    self.find_ns(CORE_NS).expect("clojure.core always exists")
  }

  pub fn find_ns(&self, name: &str) -> Option<Rc<Namespace>> {
    self.namespaces.borrow().get(name).cloned()
  }

  /// Finds or creates; new namespaces refer `clojure.core` so its public
  /// vars resolve unqualified.
  pub fn create_ns(&self, name: Rc<str>) -> Rc<Namespace> {
    if let Some(ns) = self.find_ns(&name) {
      return ns;
    }
    debug!("creating namespace {}", name);
    let ns = Rc::new(Namespace::new(name.clone()));
    if name.as_ref() != CORE_NS {
      ns.add_refer(self.core_ns());
    }
    self.namespaces.borrow_mut().insert(name, ns.clone());
    ns
  }

  pub fn remove_ns(&self, name: &str) -> Option<Rc<Namespace>> {
    if name == CORE_NS {
      return None;
    }
    self.namespaces.borrow_mut().shift_remove(name)
  }

  pub fn all_ns(&self) -> Vec<Rc<Namespace>> {
    self.namespaces.borrow().values().cloned().collect()
  }

  /// `in-ns`: switch, creating on demand.
  pub fn in_ns(&self, name: Rc<str>) -> Rc<Namespace> {
    let ns = self.create_ns(name);
    self.set_current_ns(ns.clone());
    ns
  }

  /// Resolves an alias of the current namespace, falling back to a full
  /// namespace name.
  pub fn resolve_ns_alias(&self, alias: &str) -> Option<Rc<str>> {
    if let Some(target) = self.current_ns().alias(alias) {
      return Some(target);
    }
    self.find_ns(alias).map(|ns| ns.name())
  }

  //
  // Var resolution
  //

  /// Symbol resolution: a qualified symbol goes through its namespace (or
  /// a current-namespace alias of it), an unqualified one walks the
  /// current namespace's mappings then its refers.
  pub fn resolve(
    &self,
    namespace: Option<&str>,
    name: &str,
  ) -> Option<Rc<Var>> {
    match namespace {
      Some(ns_name) => {
        let ns = self
          .find_ns(ns_name)
          .or_else(|| {
            self
              .current_ns()
              .alias(ns_name)
              .and_then(|target| self.find_ns(&target))
          })?;
        ns.mapping(name)
      }
      None => self.current_ns().resolve(name),
    }
  }

  pub fn resolve_or_err(
    &self,
    namespace: Option<&str>,
    name: &str,
  ) -> Result<Rc<Var>> {
    self.resolve(namespace, name).ok_or_else(|| {
      Error::lookup(format!(
        "unable to resolve symbol: {} in this context",
        match namespace {
          Some(ns) => format!("{}/{}", ns, name),
          None => name.to_string(),
        }
      ))
    })
  }

  /// Interns into the current namespace.
  pub fn intern(&self, name: Rc<str>) -> Rc<Var> {
    self.current_ns().intern(name)
  }

  pub fn core_var(&self, name: &str) -> Option<Rc<Var>> {
    self.core_ns().mapping(name)
  }

  /// The value of a core dynamic var, or `nil` when absent/unbound.
  pub fn core_value(&self, name: &str) -> Value {
    self
      .core_var(name)
      .and_then(|var| var.deref().ok())
      .unwrap_or(Value::Nil)
  }

  pub fn core_flag(&self, name: &str) -> bool {
    self.core_value(name).is_truthy()
  }

  //
  // Thread-binding frames
  //

  /// Pushes one frame binding every var in `bindings` atomically: if any
  /// var refuses (not dynamic), the ones already pushed roll back.
  pub fn push_bindings(
    &self,
    bindings: Vec<(Rc<Var>, Value)>,
  ) -> Result<()> {
    let mut pushed: Vec<Rc<Var>> = Vec::with_capacity(bindings.len());
    for (var, value) in bindings {
      if let Err(e) = var.push_binding(value) {
        for var in pushed.iter().rev() {
          let _ = var.pop_binding();
        }
        return Err(e);
      }
      pushed.push(var);
    }
    self.binding_frames.borrow_mut().push(pushed);
    Ok(())
  }

  pub fn pop_bindings(&self) -> Result<()> {
    let frame = self.binding_frames.borrow_mut().pop().ok_or_else(|| {
      Error::illegal_argument("pop-thread-bindings without matching push")
    })?;
    for var in frame.iter().rev() {
      var.pop_binding()?;
    }
    Ok(())
  }

  /// Snapshot of the currently bound dynamic vars, innermost frame wins.
  pub fn current_bindings(&self) -> Vec<(Rc<Var>, Value)> {
    let mut out: Vec<(Rc<Var>, Value)> = Vec::new();
    for frame in self.binding_frames.borrow().iter() {
      for var in frame {
        if let Ok(value) = var.deref() {
          if let Some(slot) =
            out.iter_mut().find(|(v, _)| Rc::ptr_eq(v, var))
          {
            slot.1 = value;
          } else {
            out.push((var.clone(), value));
          }
        }
      }
    }
    out
  }

  //
  // Gensym
  //

  pub fn next_gensym_id(&self) -> u64 {
    let id = self.gensym_counter.get() + 1;
    self.gensym_counter.set(id);
    id
  }

  pub fn gensym(&self, prefix: &str) -> Rc<str> {
    format!("{}{}", prefix, self.next_gensym_id()).into()
  }

  /// Auto-gensym names used by syntax quote and the native transforms:
  /// globally unique by the env-owned counter.
  pub fn auto_gensym(&self, base: &str) -> Rc<str> {
    format!("{}__{}__auto__", base, self.next_gensym_id()).into()
  }

  //
  // Tagged-literal readers
  //

  pub fn data_reader(
    &self,
    tag_ns: Option<&str>,
    tag_name: &str,
  ) -> Option<Value> {
    let readers = self.core_value("*data-readers*");
    let key = Value::symbol(
      tag_ns.map(|ns| ns.into()),
      tag_name,
    );
    match readers {
      Value::Map(m) => m.get(&key).cloned(),
      _ => None,
    }
  }

  pub fn default_data_reader_fn(&self) -> Option<Value> {
    match self.core_value("*default-data-reader-fn*") {
      Value::Nil => None,
      f => Some(f),
    }
  }

  //
  // Output
  //

  /// Writes through `*out*`: a string builder bound there captures, any
  /// other binding falls through to process stdout.
  pub fn write_out(&self, text: &str) -> Result<()> {
    match self.core_value("*out*") {
      Value::StringBuilder(buffer) => {
        buffer.borrow_mut().push_str(text);
        Ok(())
      }
      _ => {
        let mut stdout = std::io::stdout();
        stdout.write_all(text.as_bytes()).and_then(|_| stdout.flush()).map_err(
          |e| Error::illegal_argument(format!("cannot write output: {}", e)),
        )
      }
    }
  }

  pub fn write_err(&self, text: &str) -> Result<()> {
    match self.core_value("*err*") {
      Value::StringBuilder(buffer) => {
        buffer.borrow_mut().push_str(text);
        Ok(())
      }
      _ => {
        let mut stderr = std::io::stderr();
        stderr.write_all(text.as_bytes()).map_err(|e| {
          Error::illegal_argument(format!("cannot write output: {}", e))
        })
      }
    }
  }

  //
  // REPL affordances
  //

  /// Rolls `*1 *2 *3` after a successful evaluation.
  pub fn note_result(&self, value: &Value) {
    let core = self.core_ns();
    if let Some(two) = core.mapping("*2").and_then(|v| v.root()) {
      if let Some(three) = core.mapping("*3") {
        three.set_root(two);
      }
    }
    if let Some(one) = core.mapping("*1").and_then(|v| v.root()) {
      if let Some(two) = core.mapping("*2") {
        two.set_root(one);
      }
    }
    if let Some(one) = core.mapping("*1") {
      one.set_root(value.clone());
    }
  }

  /// Parks the error in `*e`.
  pub fn note_error(&self, error: &Error) {
    if let Some(var) = self.core_ns().mapping("*e") {
      var.set_root(Value::Exception(Rc::new(error.clone())));
    }
  }

  //
  // A small deterministic-seedable generator for rand and friends.
  //

  pub fn next_random(&self) -> u64 {
    // splitmix64 step
    let mut z = self
      .rng_state
      .get()
      .wrapping_add(0x9E37_79B9_7F4A_7C15);
    self.rng_state.set(z);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn new_namespaces_refer_core() {
    let env = Env::new();
    let inc = env.core_ns().intern("inc".into());
    inc.set_root(Value::Int(0));
    let ns = env.create_ns("scratch".into());
    assert!(ns.resolve("inc").is_some());
  }

  #[test]
  fn binding_frames_roll_back_on_failure() {
    let env = Env::new();
    let a = env.core_ns().intern("*a*".into());
    a.set_dynamic(true);
    let b = env.core_ns().intern("b".into());
    // b is not dynamic: the whole frame must fail and a must unwind.
    let result = env.push_bindings(vec![
      (a.clone(), Value::Int(1)),
      (b, Value::Int(2)),
    ]);
    assert!(result.is_err());
    assert!(!a.has_binding());
  }

  #[test]
  fn gensym_ids_are_unique() {
    let env = Env::new();
    assert_ne!(env.auto_gensym("x"), env.auto_gensym("x"));
  }
}
