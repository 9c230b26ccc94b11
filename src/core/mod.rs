// core/mod.rs
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

//! The native `clojure.core`: every builtin var the macro layer and the
//! embedded libraries expect, plus the dynamic vars of the runtime.
//! This module holds registration, state cells, vars/namespaces, and
//! runtime plumbing; arithmetic, collections, seqs, and strings live in
//! their own submodules.

mod arith;
mod colls;
mod seqs;
mod strings;

use std::cell::RefCell;
use std::rc::Rc;

use crate::{
  analyzer,
  env::{Env, Namespace, Var, CORE_NS},
  error::{Error, ErrorKind, Result},
  expand, printer, reader,
  value::{
    map::PMap, num, seq, AtomCell, Builtin, BuiltinFn, DelayCell,
    MultiFn, NativeClosure, Value,
  },
};

pub fn install(env: &Rc<Env>) {
  let core = env.core_ns();
  install_dynamic_vars(env, &core);
  install_class_tokens(&core);
  install_state(&core);
  arith::install(&core);
  colls::install(&core);
  seqs::install(&core);
  strings::install(&core);
  crate::pprint::install(env);
}

pub(crate) fn def_builtin(
  ns: &Namespace,
  name: &'static str,
  f: BuiltinFn,
) {
  let var = ns.intern(name.into());
  var.set_root(Value::Builtin(Rc::new(Builtin { name, f })));
}

fn def_dynamic(ns: &Namespace, name: &str, value: Value) {
  let var = ns.intern(name.into());
  var.set_dynamic(true);
  var.set_root(value);
}

pub(crate) fn exact(
  name: &str,
  args: &[Value],
  n: usize,
) -> Result<()> {
  if args.len() == n {
    Ok(())
  } else {
    Err(Error::arity(args.len(), name))
  }
}

pub(crate) fn at_least(
  name: &str,
  args: &[Value],
  n: usize,
) -> Result<()> {
  if args.len() >= n {
    Ok(())
  } else {
    Err(Error::arity(args.len(), name))
  }
}

pub(crate) fn between(
  name: &str,
  args: &[Value],
  min: usize,
  max: usize,
) -> Result<()> {
  if (min..=max).contains(&args.len()) {
    Ok(())
  } else {
    Err(Error::arity(args.len(), name))
  }
}

fn install_dynamic_vars(env: &Rc<Env>, core: &Namespace) {
  def_dynamic(
    core,
    "*ns*",
    Value::Namespace(env.current_ns()),
  );
  def_dynamic(core, "*in*", Value::Nil);
  def_dynamic(core, "*out*", Value::Nil);
  def_dynamic(core, "*err*", Value::Nil);
  def_dynamic(core, "*print-meta*", Value::Boolean(false));
  def_dynamic(core, "*print-length*", Value::Nil);
  def_dynamic(core, "*print-level*", Value::Nil);
  def_dynamic(core, "*print-readably*", Value::Boolean(true));
  def_dynamic(core, "*print-pretty*", Value::Boolean(true));
  def_dynamic(core, "*print-right-margin*", Value::Int(72));
  def_dynamic(core, "*print-miser-width*", Value::Int(40));
  def_dynamic(core, "*print-base*", Value::Int(10));
  def_dynamic(core, "*print-radix*", Value::Boolean(false));
  def_dynamic(
    core,
    "*print-suppress-namespaces*",
    Value::Boolean(false),
  );
  def_dynamic(core, "*print-pprint-dispatch*", Value::Nil);
  def_dynamic(core, "*command-line-args*", Value::Nil);
  def_dynamic(
    core,
    "*data-readers*",
    Value::Map(Rc::new(PMap::empty())),
  );
  def_dynamic(core, "*default-data-reader-fn*", Value::Nil);
  def_dynamic(core, "*math-context*", Value::Nil);
  def_dynamic(core, "*assert*", Value::Boolean(true));
  def_dynamic(core, "*warn-on-reflection*", Value::Boolean(false));
  def_dynamic(core, "*1", Value::Nil);
  def_dynamic(core, "*2", Value::Nil);
  def_dynamic(core, "*3", Value::Nil);
  def_dynamic(core, "*e", Value::Nil);
  def_dynamic(core, "*file*", Value::Nil);
  def_dynamic(core, "*source-path*", Value::Nil);
  def_dynamic(core, "*repl*", Value::Boolean(false));
  def_dynamic(core, "*flush-on-newline*", Value::Boolean(true));
}

/// Class tokens used by `instance?`, `type`, and catch-by-class.
fn install_class_tokens(core: &Namespace) {
  for class in [
    "Object",
    "String",
    "Character",
    "Boolean",
    "Number",
    "Long",
    "Integer",
    "Double",
    "Float",
    "BigDecimal",
    "BigInteger",
    "Keyword",
    "Symbol",
    "Var",
    "Atom",
    "Ratio",
    "Pattern",
    "StringBuilder",
    "Exception",
    "Throwable",
    "Error",
    "RuntimeException",
    "ExceptionInfo",
    "IllegalArgumentException",
    "UnsupportedOperationException",
    "IllegalStateException",
    "ArithmeticException",
    "AssertionError",
    "ClassCastException",
  ] {
    let var = core.intern(class.into());
    var.set_root(Value::string(class));
  }
}

fn install_state(core: &Namespace) {
  // Cells
  def_builtin(core, "atom", atom);
  def_builtin(core, "deref", deref);
  def_builtin(core, "reset!", reset_bang);
  def_builtin(core, "swap!", swap_bang);
  def_builtin(core, "compare-and-set!", compare_and_set);
  def_builtin(core, "volatile!", volatile);
  def_builtin(core, "vreset!", vreset);
  def_builtin(core, "volatile?", volatile_p);
  def_builtin(core, "force", force);
  def_builtin(core, "delay?", delay_p);
  def_builtin(core, "realized?", realized_p);
  // Errors
  def_builtin(core, "ex-info", ex_info);
  def_builtin(core, "ex-message", ex_message);
  def_builtin(core, "ex-data", ex_data);
  def_builtin(core, "ex-cause", ex_cause);
  // Metadata
  def_builtin(core, "meta", meta);
  def_builtin(core, "with-meta", with_meta);
  def_builtin(core, "vary-meta", vary_meta);
  def_builtin(core, "alter-meta!", alter_meta);
  // Vars and namespaces
  def_builtin(core, "var-get", var_get);
  def_builtin(core, "var-set", var_set);
  def_builtin(core, "var?", var_p);
  def_builtin(core, "find-var", find_var);
  def_builtin(core, "resolve", resolve_sym);
  def_builtin(core, "ns-resolve", ns_resolve);
  def_builtin(core, "intern", intern);
  def_builtin(core, "alter-var-root", alter_var_root);
  def_builtin(core, "bound?", bound_p);
  def_builtin(core, "in-ns", in_ns);
  def_builtin(core, "create-ns", create_ns);
  def_builtin(core, "find-ns", find_ns);
  def_builtin(core, "remove-ns", remove_ns);
  def_builtin(core, "all-ns", all_ns);
  def_builtin(core, "the-ns", the_ns);
  def_builtin(core, "ns-name", ns_name);
  def_builtin(core, "ns-interns", ns_interns);
  def_builtin(core, "ns-publics", ns_publics);
  def_builtin(core, "ns-map", ns_map);
  def_builtin(core, "ns-aliases", ns_aliases);
  def_builtin(core, "alias", alias);
  def_builtin(core, "refer", refer);
  def_builtin(core, "require", require);
  def_builtin(core, "use", require);
  // Thread-binding frames
  def_builtin(core, "push-thread-bindings", push_thread_bindings);
  def_builtin(core, "pop-thread-bindings", pop_thread_bindings);
  def_builtin(core, "get-thread-bindings", get_thread_bindings);
  def_builtin(core, "bound-fn*", bound_fn_star);
  def_builtin(core, "with-bindings*", with_bindings_star);
  def_builtin(core, "with-redefs-fn", with_redefs_fn);
  // Reader and evaluator surface
  def_builtin(core, "read-string", read_string);
  def_builtin(core, "eval", eval_form);
  def_builtin(core, "load-string", load_string_builtin);
  def_builtin(core, "macroexpand", macroexpand_builtin);
  def_builtin(core, "macroexpand-1", macroexpand_1_builtin);
  def_builtin(core, "gensym", gensym);
  def_builtin(core, "special-symbol?", special_symbol_p);
  def_builtin(core, "read-line", read_line);
  // Types
  def_builtin(core, "instance?", instance_p);
  def_builtin(core, "type", type_of);
  def_builtin(core, "class", type_of);
  def_builtin(core, "record?", record_p);
  // Multimethods and hierarchies
  def_builtin(core, "make-hierarchy", make_hierarchy);
  def_builtin(core, "methods", methods);
  def_builtin(core, "get-method", get_method);
  def_builtin(core, "remove-method", remove_method);
  def_builtin(core, "prefer-method", prefer_method);
  // Randomness
  def_builtin(core, "rand", rand);
  def_builtin(core, "rand-int", rand_int);
  // Private plumbing for the native transforms
  def_builtin(core, "__assert-fail", assert_fail);
  def_builtin(core, "__delay-create", delay_create);
  def_builtin(core, "__lazy-seq", lazy_seq_create);
  def_builtin(core, "__set-macro!", set_macro);
  def_builtin(core, "__defonce-bound?", defonce_bound_p);
  def_builtin(core, "__local-var", local_var);
  def_builtin(core, "__case-fallthrough", case_fallthrough);
  def_builtin(core, "__make-multi", make_multi);
  def_builtin(core, "__add-method", add_method);
  def_builtin(core, "__protocol-method", protocol_method);
  def_builtin(core, "__extend-method", extend_method);
  def_builtin(core, "__refer-clojure", refer_clojure);
  def_builtin(core, "__ns-reference", ns_reference);
  def_builtin(core, "__nano-time", nano_time);
  def_builtin(core, "__future-call", future_call);
  def_builtin(core, "future-call", future_call);
  def_builtin(core, "pcalls", pcalls);
}

//
// Cells
//

fn atom(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("atom", &args, 1)?;
  Ok(Value::Atom(Rc::new(AtomCell {
    value: RefCell::new(args[0].clone()),
    meta: RefCell::new(None),
  })))
}

fn deref(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("deref", &args, 1)?;
  match &args[0] {
    Value::Atom(cell) => Ok(cell.value.borrow().clone()),
    Value::Volatile(cell) => Ok(cell.borrow().clone()),
    Value::Delay(cell) => cell.force(),
    Value::Var(var) => var.deref(),
    Value::Reduced(inner) => Ok(inner.as_ref().clone()),
    other => Err(Error::type_error(format!(
      "{} cannot be dereferenced",
      other.type_name()
    ))),
  }
}

fn reset_bang(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("reset!", &args, 2)?;
  match &args[0] {
    Value::Atom(cell) => {
      *cell.value.borrow_mut() = args[1].clone();
      Ok(args[1].clone())
    }
    other => Err(Error::type_error(format!(
      "reset! needs an atom, got {}",
      other.type_name()
    ))),
  }
}

fn swap_bang(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("swap!", &args, 2)?;
  match &args[0] {
    Value::Atom(cell) => {
      let current = cell.value.borrow().clone();
      let mut call_args = vec![current];
      call_args.extend(args[2..].iter().cloned());
      let next = crate::eval::apply(env, &args[1], call_args)?;
      *cell.value.borrow_mut() = next.clone();
      Ok(next)
    }
    other => Err(Error::type_error(format!(
      "swap! needs an atom, got {}",
      other.type_name()
    ))),
  }
}

fn compare_and_set(
  _env: &Rc<Env>,
  args: Vec<Value>,
) -> Result<Value> {
  exact("compare-and-set!", &args, 3)?;
  match &args[0] {
    Value::Atom(cell) => {
      let matches = *cell.value.borrow() == args[1];
      if matches {
        *cell.value.borrow_mut() = args[2].clone();
      }
      Ok(Value::Boolean(matches))
    }
    other => Err(Error::type_error(format!(
      "compare-and-set! needs an atom, got {}",
      other.type_name()
    ))),
  }
}

fn volatile(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("volatile!", &args, 1)?;
  Ok(Value::Volatile(Rc::new(RefCell::new(args[0].clone()))))
}

fn vreset(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("vreset!", &args, 2)?;
  match &args[0] {
    Value::Volatile(cell) => {
      *cell.borrow_mut() = args[1].clone();
      Ok(args[1].clone())
    }
    other => Err(Error::type_error(format!(
      "vreset! needs a volatile, got {}",
      other.type_name()
    ))),
  }
}

fn volatile_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("volatile?", &args, 1)?;
  Ok(Value::Boolean(matches!(args[0], Value::Volatile(_))))
}

fn force(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("force", &args, 1)?;
  match &args[0] {
    Value::Delay(cell) => cell.force(),
    other => Ok(other.clone()),
  }
}

fn delay_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("delay?", &args, 1)?;
  Ok(Value::Boolean(matches!(args[0], Value::Delay(_))))
}

fn realized_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("realized?", &args, 1)?;
  match &args[0] {
    Value::Delay(cell) => Ok(Value::Boolean(cell.is_realized())),
    Value::LazySeq(cell) => Ok(Value::Boolean(cell.is_realized())),
    other => Err(Error::type_error(format!(
      "realized? not supported on {}",
      other.type_name()
    ))),
  }
}

//
// Errors as values
//

fn ex_info(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("ex-info", &args, 2, 3)?;
  let message = match &args[0] {
    Value::Str(s) => s.to_string(),
    other => printer::print_str_basic(other),
  };
  let mut error =
    Error::new(ErrorKind::User, message).with_data(args[1].clone());
  if let Some(Value::Exception(cause)) = args.get(2) {
    error.cause = Some(cause.clone());
  }
  Ok(Value::Exception(Rc::new(error)))
}

fn ex_message(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("ex-message", &args, 1)?;
  match &args[0] {
    Value::Exception(e) if !e.message.is_empty() => {
      Ok(Value::string(e.message.clone()))
    }
    _ => Ok(Value::Nil),
  }
}

fn ex_data(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("ex-data", &args, 1)?;
  match &args[0] {
    Value::Exception(e) => {
      Ok(e.data.clone().unwrap_or(Value::Nil))
    }
    _ => Ok(Value::Nil),
  }
}

fn ex_cause(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("ex-cause", &args, 1)?;
  match &args[0] {
    Value::Exception(e) => Ok(match &e.cause {
      Some(cause) => Value::Exception(cause.clone()),
      None => Value::Nil,
    }),
    _ => Ok(Value::Nil),
  }
}

//
// Metadata
//

fn meta(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("meta", &args, 1)?;
  Ok(args[0].meta().unwrap_or(Value::Nil))
}

fn with_meta(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("with-meta", &args, 2)?;
  let meta = match &args[1] {
    Value::Nil => None,
    m => Some(m.clone()),
  };
  args[0].with_meta(meta)
}

fn vary_meta(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("vary-meta", &args, 2)?;
  let current = args[0].meta().unwrap_or(Value::Nil);
  let mut call_args = vec![current];
  call_args.extend(args[2..].iter().cloned());
  let next = crate::eval::apply(env, &args[1], call_args)?;
  args[0].with_meta(Some(next))
}

fn alter_meta(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("alter-meta!", &args, 2)?;
  let current = match &args[0] {
    Value::Var(var) => var.meta_value(),
    Value::Atom(cell) => {
      cell.meta.borrow().clone().unwrap_or(Value::Nil)
    }
    other => {
      return Err(Error::type_error(format!(
        "alter-meta! not supported on {}",
        other.type_name()
      )));
    }
  };
  let mut call_args = vec![current];
  call_args.extend(args[2..].iter().cloned());
  let next = crate::eval::apply(env, &args[1], call_args)?;
  match &args[0] {
    Value::Var(var) => var.set_meta(next.clone()),
    Value::Atom(cell) => {
      *cell.meta.borrow_mut() = Some(next.clone())
    }
    _ => unreachable!(),
  }
  Ok(next)
}

//
// Vars and namespaces
//

fn as_var(value: &Value, what: &str) -> Result<Rc<Var>> {
  match value {
    Value::Var(var) => Ok(var.clone()),
    other => Err(Error::type_error(format!(
      "{} needs a var, got {}",
      what,
      other.type_name()
    ))),
  }
}

fn sym_parts(value: &Value) -> Result<(Option<Rc<str>>, Rc<str>)> {
  match value {
    Value::Symbol(s) => Ok((s.namespace.clone(), s.name.clone())),
    other => Err(Error::type_error(format!(
      "expected a symbol, got {}",
      other.type_name()
    ))),
  }
}

fn var_get(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("var-get", &args, 1)?;
  as_var(&args[0], "var-get")?.deref()
}

fn var_set(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("var-set", &args, 2)?;
  as_var(&args[0], "var-set")?.set_binding(args[1].clone())?;
  Ok(args[1].clone())
}

fn var_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("var?", &args, 1)?;
  Ok(Value::Boolean(matches!(args[0], Value::Var(_))))
}

fn find_var(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("find-var", &args, 1)?;
  let (ns, name) = sym_parts(&args[0])?;
  if ns.is_none() {
    return Err(Error::illegal_argument(
      "find-var needs a namespace-qualified symbol",
    ));
  }
  Ok(match env.resolve(ns.as_deref(), &name) {
    Some(var) => Value::Var(var),
    None => Value::Nil,
  })
}

fn resolve_sym(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("resolve", &args, 1)?;
  let (ns, name) = sym_parts(&args[0])?;
  Ok(match env.resolve(ns.as_deref(), &name) {
    Some(var) => Value::Var(var),
    None => Value::Nil,
  })
}

fn ns_resolve(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("ns-resolve", &args, 2)?;
  let ns = ns_of(env, &args[0])?;
  let (_, name) = sym_parts(&args[1])?;
  Ok(match ns.resolve(&name) {
    Some(var) => Value::Var(var),
    None => Value::Nil,
  })
}

fn intern(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("intern", &args, 2, 3)?;
  let ns = ns_of(env, &args[0])?;
  let (_, name) = sym_parts(&args[1])?;
  let var = ns.intern(name);
  if let Some(value) = args.get(2) {
    var.set_root(value.clone());
  }
  Ok(Value::Var(var))
}

fn alter_var_root(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("alter-var-root", &args, 2)?;
  let var = as_var(&args[0], "alter-var-root")?;
  let current = var.root().unwrap_or(Value::Nil);
  let mut call_args = vec![current];
  call_args.extend(args[2..].iter().cloned());
  let next = crate::eval::apply(env, &args[1], call_args)?;
  var.set_root(next.clone());
  Ok(next)
}

/// `bound?` answers both for var values and quoted symbols; either way
/// the question is whether a var exists with a root slot value.
fn bound_p(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("bound?", &args, 1)?;
  for arg in &args {
    let bound = match arg {
      Value::Var(var) => var.is_bound(),
      Value::Symbol(s) => env
        .resolve(s.namespace.as_deref(), &s.name)
        .map(|var| var.is_bound())
        .unwrap_or(false),
      other => {
        return Err(Error::type_error(format!(
          "bound? needs vars or symbols, got {}",
          other.type_name()
        )));
      }
    };
    if !bound {
      return Ok(Value::Boolean(false));
    }
  }
  Ok(Value::Boolean(true))
}

fn ns_of(env: &Rc<Env>, value: &Value) -> Result<Rc<Namespace>> {
  match value {
    Value::Namespace(ns) => Ok(ns.clone()),
    Value::Symbol(s) => {
      env.find_ns(&s.name).ok_or_else(|| {
        Error::lookup(format!("no namespace: {}", s.name))
      })
    }
    other => Err(Error::type_error(format!(
      "expected a namespace, got {}",
      other.type_name()
    ))),
  }
}

fn in_ns(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("in-ns", &args, 1)?;
  let (_, name) = sym_parts(&args[0])?;
  let ns = env.in_ns(name);
  if let Some(var) = env.core_var("*ns*") {
    var.set_root(Value::Namespace(ns.clone()));
  }
  Ok(Value::Namespace(ns))
}

fn create_ns(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("create-ns", &args, 1)?;
  let (_, name) = sym_parts(&args[0])?;
  Ok(Value::Namespace(env.create_ns(name)))
}

fn find_ns(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("find-ns", &args, 1)?;
  let (_, name) = sym_parts(&args[0])?;
  Ok(match env.find_ns(&name) {
    Some(ns) => Value::Namespace(ns),
    None => Value::Nil,
  })
}

fn remove_ns(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("remove-ns", &args, 1)?;
  let (_, name) = sym_parts(&args[0])?;
  Ok(match env.remove_ns(&name) {
    Some(ns) => Value::Namespace(ns),
    None => Value::Nil,
  })
}

fn all_ns(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("all-ns", &args, 0)?;
  Ok(Value::list_from_vec(
    env.all_ns().into_iter().map(Value::Namespace).collect(),
  ))
}

fn the_ns(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("the-ns", &args, 1)?;
  Ok(Value::Namespace(ns_of(env, &args[0])?))
}

fn ns_name(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("ns-name", &args, 1)?;
  let ns = ns_of(env, &args[0])?;
  Ok(Value::simple_symbol(ns.name()))
}

fn var_map(entries: Vec<(Rc<str>, Rc<Var>)>) -> Value {
  Value::map_from_pairs(
    entries
      .into_iter()
      .map(|(name, var)| {
        (Value::simple_symbol(name), Value::Var(var))
      })
      .collect(),
  )
}

fn ns_interns(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("ns-interns", &args, 1)?;
  Ok(var_map(ns_of(env, &args[0])?.interns()))
}

fn ns_publics(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("ns-publics", &args, 1)?;
  Ok(var_map(ns_of(env, &args[0])?.publics()))
}

fn ns_map(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("ns-map", &args, 1)?;
  let ns = ns_of(env, &args[0])?;
  let mut entries = ns.interns();
  if ns.name().as_ref() != CORE_NS {
    if let Some(core) = env.find_ns(CORE_NS) {
      entries.extend(core.publics());
    }
  }
  Ok(var_map(entries))
}

fn ns_aliases(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("ns-aliases", &args, 1)?;
  let ns = ns_of(env, &args[0])?;
  Ok(Value::map_from_pairs(
    ns.aliases()
      .into_iter()
      .filter_map(|(alias, target)| {
        env.find_ns(&target).map(|target_ns| {
          (
            Value::simple_symbol(alias),
            Value::Namespace(target_ns),
          )
        })
      })
      .collect(),
  ))
}

fn alias(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("alias", &args, 2)?;
  let (_, alias_name) = sym_parts(&args[0])?;
  let (_, target) = sym_parts(&args[1])?;
  env.current_ns().add_alias(alias_name, target);
  Ok(Value::Nil)
}

/// `refer` walks the source namespace's publics into the current
/// namespace; `:only` and `:exclude` filter the set.
fn refer(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("refer", &args, 1)?;
  let (_, source_name) = sym_parts(&args[0])?;
  let Some(source) = env.find_ns(&source_name) else {
    // Library loading belongs to the host; referring a namespace that
    // has not been created is a quiet no-op.
    return Ok(Value::Nil);
  };
  let mut only: Option<Vec<Rc<str>>> = None;
  let mut exclude: Vec<Rc<str>> = Vec::new();
  let mut filters = args[1..].chunks(2);
  for filter in &mut filters {
    if filter.len() != 2 {
      break;
    }
    let names = || -> Result<Vec<Rc<str>>> {
      seq::to_vec(&filter[1])?
        .iter()
        .map(|v| sym_parts(v).map(|(_, n)| n))
        .collect()
    };
    match &filter[0] {
      Value::Keyword(k) if k.name.as_ref() == "only" => {
        only = Some(names()?);
      }
      Value::Keyword(k) if k.name.as_ref() == "exclude" => {
        exclude = names()?;
      }
      _ => (),
    }
  }
  let target = env.current_ns();
  for (name, var) in source.publics() {
    if exclude.iter().any(|n| *n == name) {
      continue;
    }
    if let Some(only) = &only {
      if !only.iter().any(|n| *n == name) {
        continue;
      }
    }
    target.add_mapping(name, var);
  }
  Ok(Value::Nil)
}

/// `(require 'lib)` and friends: loading is the host's concern; the
/// core recognizes `:as` aliases on namespaces that already exist.
fn require(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  for spec in &args {
    require_one(env, spec)?;
  }
  Ok(Value::Nil)
}

fn require_one(env: &Rc<Env>, spec: &Value) -> Result<()> {
  match spec {
    Value::Symbol(_) => Ok(()),
    Value::Vector(items) => {
      let parts: Vec<Value> = items.iter().cloned().collect();
      if parts.is_empty() {
        return Ok(());
      }
      let (_, lib) = sym_parts(&parts[0])?;
      let mut rest = parts[1..].chunks(2);
      for pair in &mut rest {
        if pair.len() != 2 {
          break;
        }
        match &pair[0] {
          Value::Keyword(k) if k.name.as_ref() == "as" => {
            let (_, alias_name) = sym_parts(&pair[1])?;
            env.current_ns().add_alias(alias_name, lib.clone());
          }
          Value::Keyword(k) if k.name.as_ref() == "refer" => {
            if env.find_ns(&lib).is_some() {
              refer(
                env,
                vec![
                  Value::simple_symbol(lib.clone()),
                  Value::kw("only"),
                  pair[1].clone(),
                ],
              )?;
            }
          }
          _ => (),
        }
      }
      Ok(())
    }
    Value::Keyword(_) => Ok(()),
    other => Err(Error::illegal_argument(format!(
      "unsupported require spec: {}",
      printer::pr_str_basic(other)
    ))),
  }
}

fn ns_reference(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("__ns-reference", &args, 1)?;
  require_one(env, &args[0])?;
  Ok(Value::Nil)
}

fn refer_clojure(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  let current = env.current_ns();
  let mut filters = args.chunks(2);
  let mut any = false;
  for filter in &mut filters {
    if filter.len() != 2 {
      break;
    }
    any = true;
    match &filter[0] {
      Value::Keyword(k) if k.name.as_ref() == "only" => {
        current.clear_refers();
        refer(
          env,
          vec![
            Value::simple_symbol(CORE_NS),
            Value::kw("only"),
            filter[1].clone(),
          ],
        )?;
      }
      Value::Keyword(k) if k.name.as_ref() == "exclude" => {
        current.clear_refers();
        refer(
          env,
          vec![
            Value::simple_symbol(CORE_NS),
            Value::kw("exclude"),
            filter[1].clone(),
          ],
        )?;
      }
      _ => (),
    }
  }
  if !any {
    // Bare (refer-clojure) restores the default refer.
    if let Some(core) = env.find_ns(CORE_NS) {
      current.add_refer(core);
    }
  }
  Ok(Value::Nil)
}

//
// Thread-binding frames
//

fn bindings_of(map: &Value) -> Result<Vec<(Rc<Var>, Value)>> {
  match map {
    Value::Map(m) => {
      let mut out = Vec::with_capacity(m.len());
      for (k, v) in m.entries() {
        out.push((as_var(k, "push-thread-bindings")?, v.clone()));
      }
      Ok(out)
    }
    other => Err(Error::type_error(format!(
      "expected a map of vars, got {}",
      other.type_name()
    ))),
  }
}

fn push_thread_bindings(
  env: &Rc<Env>,
  args: Vec<Value>,
) -> Result<Value> {
  exact("push-thread-bindings", &args, 1)?;
  env.push_bindings(bindings_of(&args[0])?)?;
  Ok(Value::Nil)
}

fn pop_thread_bindings(
  env: &Rc<Env>,
  args: Vec<Value>,
) -> Result<Value> {
  exact("pop-thread-bindings", &args, 0)?;
  env.pop_bindings()?;
  Ok(Value::Nil)
}

fn get_thread_bindings(
  env: &Rc<Env>,
  args: Vec<Value>,
) -> Result<Value> {
  exact("get-thread-bindings", &args, 0)?;
  Ok(Value::map_from_pairs(
    env
      .current_bindings()
      .into_iter()
      .map(|(var, value)| (Value::Var(var), value))
      .collect(),
  ))
}

/// Snapshots the current dynamic bindings into a wrapper that reinstates
/// them around every call.
fn bound_fn_star(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("bound-fn*", &args, 1)?;
  let f = args[0].clone();
  let snapshot = env.current_bindings();
  Ok(NativeClosure::new("bound-fn", move |env, call_args| {
    env.push_bindings(snapshot.clone())?;
    let result = crate::eval::apply(env, &f, call_args);
    env.pop_bindings()?;
    result
  }))
}

fn with_bindings_star(
  env: &Rc<Env>,
  args: Vec<Value>,
) -> Result<Value> {
  at_least("with-bindings*", &args, 2)?;
  env.push_bindings(bindings_of(&args[0])?)?;
  let result =
    crate::eval::apply(env, &args[1], args[2..].to_vec());
  env.pop_bindings()?;
  result
}

/// Swaps var roots for the duration of the call and restores them on
/// every exit path.
fn with_redefs_fn(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("with-redefs-fn", &args, 2)?;
  let bindings = bindings_of(&args[0])?;
  let mut saved: Vec<(Rc<Var>, Option<Value>)> =
    Vec::with_capacity(bindings.len());
  for (var, value) in bindings {
    saved.push((var.clone(), var.root()));
    var.set_root(value);
  }
  let result = crate::eval::apply(env, &args[1], Vec::new());
  for (var, old) in saved.into_iter().rev() {
    match old {
      Some(value) => var.set_root(value),
      None => var.unbind_root(),
    }
  }
  result
}

//
// Reader and evaluator surface
//

fn read_string(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("read-string", &args, 1, 2)?;
  // (read-string s) or (read-string opts s)
  let (opts, source) = match args.len() {
    1 => (reader::ReadOpts::default(), &args[0]),
    _ => {
      let mut opts = reader::ReadOpts::default();
      if let Value::Map(m) = &args[0] {
        if let Some(eof) = m.get(&Value::kw("eof")) {
          if !matches!(eof, Value::Keyword(k) if k.name.as_ref() == "eofthrow")
          {
            opts.eof = reader::EofPolicy::Sentinel;
          }
        }
        if m.get(&Value::kw("read-cond")).is_some() {
          opts.read_cond = true;
        }
      }
      (opts, &args[1])
    }
  };
  let Value::Str(source) = source else {
    return Err(Error::type_error("read-string needs a string"));
  };
  match reader::read_one(env, source, opts)? {
    Some(form) => crate::value::form_to_value(&form),
    None => {
      // The sentinel supplied by the options map, or nil.
      if let Value::Map(m) = &args[0] {
        Ok(m.get(&Value::kw("eof")).cloned().unwrap_or(Value::Nil))
      } else {
        Ok(Value::Nil)
      }
    }
  }
}

fn eval_form(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("eval", &args, 1)?;
  let form = crate::value::value_to_form(&args[0])?;
  let expanded = expand::macroexpand_all(env, &form)?;
  let ast = analyzer::analyze(env, &expanded)?;
  crate::eval::eval(env, &ast)
}

fn load_string_builtin(
  env: &Rc<Env>,
  args: Vec<Value>,
) -> Result<Value> {
  exact("load-string", &args, 1)?;
  match &args[0] {
    Value::Str(s) => crate::load_string(env, s),
    other => Err(Error::type_error(format!(
      "load-string needs a string, got {}",
      other.type_name()
    ))),
  }
}

fn macroexpand_builtin(
  env: &Rc<Env>,
  args: Vec<Value>,
) -> Result<Value> {
  exact("macroexpand", &args, 1)?;
  let form = crate::value::value_to_form(&args[0])?;
  let expanded = expand::macroexpand(env, &form)?;
  crate::value::form_to_value(&expanded)
}

fn macroexpand_1_builtin(
  env: &Rc<Env>,
  args: Vec<Value>,
) -> Result<Value> {
  exact("macroexpand-1", &args, 1)?;
  let form = crate::value::value_to_form(&args[0])?;
  match expand::macroexpand_1(env, &form)? {
    Some(expanded) => crate::value::form_to_value(&expanded),
    None => Ok(args[0].clone()),
  }
}

fn gensym(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("gensym", &args, 0, 1)?;
  let prefix = match args.first() {
    Some(Value::Str(s)) => s.to_string(),
    Some(other) => printer::print_str_basic(other),
    None => "G__".to_string(),
  };
  Ok(Value::simple_symbol(env.gensym(&prefix)))
}

fn special_symbol_p(
  _env: &Rc<Env>,
  args: Vec<Value>,
) -> Result<Value> {
  exact("special-symbol?", &args, 1)?;
  Ok(Value::Boolean(match &args[0] {
    Value::Symbol(s) => {
      s.namespace.is_none() && analyzer::is_special(&s.name)
    }
    _ => false,
  }))
}

/// Reads one line from `*in*`, which `with-in-str` binds to a string
/// builder; nil at end of input.
fn read_line(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("read-line", &args, 0)?;
  match env.core_value("*in*") {
    Value::StringBuilder(buffer) => {
      let mut b = buffer.borrow_mut();
      if b.is_empty() {
        return Ok(Value::Nil);
      }
      let line = match b.find('\n') {
        Some(ix) => {
          let line = b[..ix].to_string();
          *b = b[ix + 1..].to_string();
          line
        }
        None => std::mem::take(&mut *b),
      };
      Ok(Value::string(line))
    }
    _ => Ok(Value::Nil),
  }
}

//
// Types
//

/// Matches a value against a class token: the strings the class vars
/// hold, reified tags, and the exception taxonomy.
fn instance_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("instance?", &args, 2)?;
  let class = match &args[0] {
    Value::Str(s) => s.as_ref().to_string(),
    Value::Symbol(s) => s.name.to_string(),
    other => {
      return Err(Error::type_error(format!(
        "instance? needs a class, got {}",
        other.type_name()
      )));
    }
  };
  Ok(Value::Boolean(value_is_instance(&class, &args[1])))
}

fn value_is_instance(class: &str, value: &Value) -> bool {
  if class == "Object" {
    return !matches!(value, Value::Nil);
  }
  if class == "Number" {
    return num::is_number(value);
  }
  if let Value::Exception(e) = value {
    return e.is_caught_by(class);
  }
  if let Some(tag) = value.reify_type() {
    if tag.split_whitespace().any(|t| t == class) {
      return true;
    }
  }
  let type_name = value.type_name();
  if class == type_name {
    return true;
  }
  matches!(
    (class, value),
    ("Long" | "Integer", Value::Int(_))
      | ("Double" | "Float", Value::Float(_))
      | ("BigInteger", Value::BigInt(_))
      | ("BigDecimal", Value::BigDecimal(_))
  )
}

fn type_of(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("type", &args, 1)?;
  if let Some(tag) = args[0].reify_type() {
    return Ok(Value::Str(tag));
  }
  match &args[0] {
    Value::Nil => Ok(Value::Nil),
    other => Ok(Value::string(other.type_name())),
  }
}

fn record_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("record?", &args, 1)?;
  Ok(Value::Boolean(args[0].reify_type().is_some()))
}

//
// Multimethods and hierarchies
//

fn make_hierarchy(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("make-hierarchy", &args, 0)?;
  Ok(Value::map_from_pairs(vec![
    (Value::kw("parents"), Value::map_from_pairs(vec![])),
    (Value::kw("descendants"), Value::map_from_pairs(vec![])),
    (Value::kw("ancestors"), Value::map_from_pairs(vec![])),
  ]))
}

fn as_multi(value: &Value, what: &str) -> Result<Rc<MultiFn>> {
  match value {
    Value::MultiFn(m) => Ok(m.clone()),
    other => Err(Error::type_error(format!(
      "{} needs a multimethod, got {}",
      what,
      other.type_name()
    ))),
  }
}

fn methods(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("methods", &args, 1)?;
  let multi = as_multi(&args[0], "methods")?;
  let table = multi.methods.borrow();
  Ok(Value::map_from_pairs(
    table.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
  ))
}

fn get_method(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("get-method", &args, 2)?;
  let multi = as_multi(&args[0], "get-method")?;
  let table = multi.methods.borrow();
  Ok(
    table
      .get(&args[1])
      .cloned()
      .or_else(|| table.get(&Value::kw("default")).cloned())
      .unwrap_or(Value::Nil),
  )
}

fn remove_method(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("remove-method", &args, 2)?;
  let multi = as_multi(&args[0], "remove-method")?;
  multi.methods.borrow_mut().remove(&args[1]);
  Ok(args[0].clone())
}

fn prefer_method(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("prefer-method", &args, 3)?;
  // Dispatch values here are flat (no hierarchy), so preferences never
  // arbitrate; accepting them keeps the surface complete.
  as_multi(&args[0], "prefer-method")?;
  Ok(args[0].clone())
}

fn make_multi(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("__make-multi", &args, 2)?;
  let Value::Str(name) = &args[0] else {
    return Err(Error::type_error("multimethod name must be a string"));
  };
  Ok(Value::MultiFn(Rc::new(MultiFn {
    name: name.clone(),
    dispatch: args[1].clone(),
    methods: RefCell::new(im::HashMap::new()),
  })))
}

fn add_method(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("__add-method", &args, 3)?;
  let multi = as_multi(&args[0], "__add-method")?;
  multi
    .methods
    .borrow_mut()
    .insert(args[1].clone(), args[2].clone());
  Ok(args[0].clone())
}

/// A protocol method is a multimethod dispatching on the concrete type
/// tag of its first argument.
fn protocol_method(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("__protocol-method", &args, 2)?;
  let (Value::Str(protocol), Value::Symbol(method)) =
    (&args[0], &args[1])
  else {
    return Err(Error::type_error("malformed protocol method"));
  };
  let dispatch =
    Value::Builtin(Rc::new(Builtin {
      name: "protocol-dispatch",
      f: protocol_dispatch,
    }));
  Ok(Value::MultiFn(Rc::new(MultiFn {
    name: format!("{}/{}", protocol, method.name).into(),
    dispatch,
    methods: RefCell::new(im::HashMap::new()),
  })))
}

fn protocol_dispatch(
  _env: &Rc<Env>,
  args: Vec<Value>,
) -> Result<Value> {
  at_least("protocol-dispatch", &args, 1)?;
  if let Some(tag) = args[0].reify_type() {
    return Ok(Value::Str(tag));
  }
  Ok(Value::string(args[0].type_name()))
}

fn extend_method(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("__extend-method", &args, 3)?;
  let multi = as_multi(&args[0], "__extend-method")?;
  let key = match &args[1] {
    Value::Nil => Value::string("nil"),
    Value::Symbol(s) if s.name.as_ref() == "Object" => {
      Value::kw("default")
    }
    Value::Symbol(s) => Value::string(s.name.clone()),
    other => other.clone(),
  };
  multi.methods.borrow_mut().insert(key, args[2].clone());
  Ok(args[0].clone())
}

//
// Randomness
//

fn rand_f64(env: &Rc<Env>) -> f64 {
  (env.next_random() >> 11) as f64 / (1_u64 << 53) as f64
}

fn rand(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("rand", &args, 0, 1)?;
  let scale = match args.first() {
    Some(n) => num::as_f64(n)?,
    None => 1.0,
  };
  Ok(Value::Float(rand_f64(env) * scale))
}

fn rand_int(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("rand-int", &args, 1)?;
  let n = num::as_i64(&args[0])?;
  if n <= 0 {
    return Ok(Value::Int(0));
  }
  Ok(Value::Int((rand_f64(env) * n as f64) as i64))
}

//
// Private plumbing
//

fn assert_fail(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  let rendered = match args.first() {
    Some(Value::Str(s)) => s.to_string(),
    _ => String::new(),
  };
  let message = match args.get(1) {
    Some(m) => format!(
      "Assert failed: {}\n{}",
      printer::print_str_basic(m),
      rendered
    ),
    None => format!("Assert failed: {}", rendered),
  };
  Err(Error::new(ErrorKind::Assertion, message))
}

fn delay_create(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("__delay-create", &args, 1)?;
  Ok(Value::Delay(Rc::new(DelayCell::new(
    env.clone(),
    args[0].clone(),
  ))))
}

fn lazy_seq_create(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("__lazy-seq", &args, 1)?;
  Ok(Value::LazySeq(Rc::new(
    crate::value::seq::LazySeqCell::from_fn(
      env.clone(),
      args[0].clone(),
    ),
  )))
}

fn set_macro(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("__set-macro!", &args, 1)?;
  as_var(&args[0], "__set-macro!")?.set_macro(true);
  Ok(args[0].clone())
}

fn defonce_bound_p(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("__defonce-bound?", &args, 1)?;
  let (ns, name) = sym_parts(&args[0])?;
  Ok(Value::Boolean(
    env
      .resolve(ns.as_deref(), &name)
      .map(|var| var.is_bound())
      .unwrap_or(false),
  ))
}

/// An anonymous dynamic var with one binding frame, for
/// `with-local-vars`.
fn local_var(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("__local-var", &args, 1)?;
  let var = Rc::new(Var::new(
    "local".into(),
    env.gensym("var__"),
  ));
  var.set_dynamic(true);
  var.push_binding(args[0].clone())?;
  Ok(Value::Var(var))
}

fn case_fallthrough(
  _env: &Rc<Env>,
  args: Vec<Value>,
) -> Result<Value> {
  let rendered = args
    .first()
    .map(printer::pr_str_basic)
    .unwrap_or_default();
  Err(Error::lookup(format!(
    "no matching clause: {}",
    rendered
  )))
}

fn nano_time(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("__nano-time", &args, 0)?;
  let nanos = std::time::SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .map(|d| d.as_nanos() as i64)
    .unwrap_or(0);
  Ok(Value::Int(nanos))
}

/// Same-thread future: the body runs immediately; the result is an
/// already-realized delay so deref and realized? behave.
fn future_call(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("future-call", &args, 1)?;
  let value = crate::eval::apply(env, &args[0], Vec::new())?;
  let done = DelayCell::new(
    env.clone(),
    NativeClosure::new("future-value", move |_, _| {
      Ok(value.clone())
    }),
  );
  done.force()?;
  Ok(Value::Delay(Rc::new(done)))
}

fn pcalls(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  let mut results = Vec::with_capacity(args.len());
  for f in &args {
    results.push(crate::eval::apply(env, f, Vec::new())?);
  }
  Ok(Value::list_from_vec(results))
}
