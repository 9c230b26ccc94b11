// eval/mod.rs
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

//! The tree-walking evaluator.
//!
//! `recur` never grows the Rust stack: loop heads and function bodies
//! evaluate through [`Flow`], and a `Flow::Recur` rebinds the targets and
//! jumps back iteratively.  Dynamic-binding frames pop through the
//! `try`/`finally` machinery the macro layer emits, so unwinding restores
//! them on every exit path.

mod host;

use std::cell::RefCell;
use std::rc::Rc;

use crate::{
  analyzer::{Ast, CaseTestKind, FnArity},
  env::Env,
  error::{Error, ErrorKind, Result},
  value::{map::PMap, num, Closure, MultiFn, Value},
};

/// One lexical frame.  Frames form a parent chain; `letfn` patches its
/// own frame after the closures capture it.
#[derive(Debug)]
pub struct Scope {
  bindings: RefCell<Vec<(Rc<str>, Value)>>,
  parent: Option<Rc<Scope>>,
}

impl Scope {
  fn child(parent: Option<&Rc<Scope>>) -> Rc<Scope> {
    Rc::new(Scope {
      bindings: RefCell::new(Vec::new()),
      parent: parent.cloned(),
    })
  }

  fn bind(&self, name: Rc<str>, value: Value) {
    self.bindings.borrow_mut().push((name, value));
  }

  /// Replaces the latest binding under `name` in this frame only.
  fn rebind(&self, name: &str, value: Value) {
    let mut bindings = self.bindings.borrow_mut();
    if let Some(slot) =
      bindings.iter_mut().rev().find(|(n, _)| n.as_ref() == name)
    {
      slot.1 = value;
    } else {
      bindings.push((name.into(), value));
    }
  }

  fn lookup(&self, name: &str) -> Option<Value> {
    if let Some((_, v)) = self
      .bindings
      .borrow()
      .iter()
      .rev()
      .find(|(n, _)| n.as_ref() == name)
    {
      return Some(v.clone());
    }
    self.parent.as_ref().and_then(|p| p.lookup(name))
  }
}

enum Flow {
  Value(Value),
  Recur(Vec<Value>),
}

pub fn eval(env: &Rc<Env>, ast: &Ast) -> Result<Value> {
  eval_value(env, None, ast)
}

fn eval_value(
  env: &Rc<Env>,
  scope: Option<&Rc<Scope>>,
  ast: &Ast,
) -> Result<Value> {
  match eval_flow(env, scope, ast)? {
    Flow::Value(v) => Ok(v),
    Flow::Recur(_) => Err(Error::syntax(
      "recur escaped its loop head",
    )),
  }
}

fn eval_flow(
  env: &Rc<Env>,
  scope: Option<&Rc<Scope>>,
  ast: &Ast,
) -> Result<Flow> {
  match ast {
    Ast::Const(v) => Ok(Flow::Value(v.clone())),
    Ast::LocalRef { name } => scope
      .and_then(|s| s.lookup(name))
      .map(Flow::Value)
      .ok_or_else(|| {
        Error::lookup(format!("unable to resolve local: {}", name))
      }),
    Ast::VarRef { var } => Ok(Flow::Value(var.deref()?)),
    Ast::TheVar { var } => Ok(Flow::Value(Value::Var(var.clone()))),
    Ast::If { test, then, els } => {
      if eval_value(env, scope, test)?.is_truthy() {
        eval_flow(env, scope, then)
      } else {
        match els {
          Some(e) => eval_flow(env, scope, e),
          None => Ok(Flow::Value(Value::Nil)),
        }
      }
    }
    Ast::Do { body } => eval_body(env, scope, body),
    Ast::Let { bindings, body } => {
      let frame = Scope::child(scope);
      for (name, init) in bindings {
        let value = eval_value(env, Some(&frame), init)?;
        frame.bind(name.clone(), value);
      }
      eval_body(env, Some(&frame), body)
    }
    Ast::Loop { bindings, body } => {
      let frame = Scope::child(scope);
      for (name, init) in bindings {
        let value = eval_value(env, Some(&frame), init)?;
        frame.bind(name.clone(), value);
      }
      loop {
        match eval_body(env, Some(&frame), body)? {
          Flow::Value(v) => return Ok(Flow::Value(v)),
          Flow::Recur(new_values) => {
            for ((name, _), value) in
              bindings.iter().zip(new_values.into_iter())
            {
              frame.rebind(name, value);
            }
          }
        }
      }
    }
    Ast::Recur { args } => {
      let mut values = Vec::with_capacity(args.len());
      for arg in args {
        values.push(eval_value(env, scope, arg)?);
      }
      Ok(Flow::Recur(values))
    }
    Ast::LetFn { bindings, body } => {
      let frame = Scope::child(scope);
      for (name, _) in bindings {
        frame.bind(name.clone(), Value::Nil);
      }
      for (name, f) in bindings {
        let value = eval_value(env, Some(&frame), f)?;
        frame.rebind(name, value);
      }
      eval_body(env, Some(&frame), body)
    }
    Ast::Fn {
      name,
      arities,
      variadic,
    } => Ok(Flow::Value(Value::Fn(Rc::new(Closure {
      name: name.clone(),
      arities: arities.clone(),
      variadic: variadic.clone(),
      captured: scope.cloned(),
      meta: None,
    })))),
    Ast::Def {
      var,
      init,
      meta,
      dynamic,
    } => {
      if *dynamic {
        var.set_dynamic(true);
      }
      if let Some(init) = init {
        let value = eval_value(env, scope, init)?;
        var.set_root(value);
      }
      let mut meta_map = PMap::from_pairs(vec![
        (
          Value::kw("name"),
          Value::simple_symbol(var.name()),
        ),
        (Value::kw("ns"), Value::string(var.ns_name())),
      ]);
      if let Some(meta) = meta {
        if let Value::Map(user_meta) =
          eval_value(env, scope, meta)?
        {
          for (k, v) in user_meta.entries() {
            meta_map = meta_map.assoc(k.clone(), v.clone());
          }
        }
      }
      var.set_meta(Value::Map(Rc::new(meta_map)));
      Ok(Flow::Value(Value::Var(var.clone())))
    }
    Ast::Throw { expr } => {
      let value = eval_value(env, scope, expr)?;
      Err(value_to_error(&value))
    }
    Ast::Try {
      body,
      catches,
      finally,
    } => {
      let outcome = eval_body_protected(env, scope, body);
      let outcome = match outcome {
        Err(error) => {
          let mut handled = None;
          for clause in catches {
            if error.is_caught_by(&clause.class) {
              let frame = Scope::child(scope);
              frame.bind(
                clause.binding.clone(),
                Value::Exception(Rc::new(error.clone())),
              );
              handled = Some(eval_body_protected(
                env,
                Some(&frame),
                &clause.body,
              ));
              break;
            }
          }
          handled.unwrap_or(Err(error))
        }
        ok => ok,
      };
      if let Some(finally_body) = finally {
        // finally runs on every exit path; its own failure wins only
        // over a successful body.
        let finally_result =
          eval_body_protected(env, scope, finally_body);
        if let Err(fin_err) = finally_result {
          if outcome.is_ok() {
            return Err(fin_err);
          }
        }
      }
      outcome.map(Flow::Value)
    }
    Ast::SetBang { var, expr } => {
      let value = eval_value(env, scope, expr)?;
      var.set_binding(value.clone())?;
      Ok(Flow::Value(value))
    }
    Ast::Case {
      expr,
      shift,
      mask,
      test_kind,
      buckets,
      default,
    } => {
      let candidate = eval_value(env, scope, expr)?;
      let key = case_key(&candidate, *shift, *mask, *test_kind);
      if let Some(key) = key {
        if let Some(bucket) = buckets.get(&key) {
          for (test, then) in bucket {
            if case_matches(test, &candidate, *test_kind) {
              return eval_flow(env, scope, then);
            }
          }
        }
      }
      eval_flow(env, scope, default)
    }
    Ast::Invoke { f, args } => {
      let callee = eval_value(env, scope, f)?;
      let mut values = Vec::with_capacity(args.len());
      for arg in args {
        values.push(eval_value(env, scope, arg)?);
      }
      apply(env, &callee, values).map(Flow::Value)
    }
    Ast::New { class, args } => {
      let mut values = Vec::with_capacity(args.len());
      for arg in args {
        values.push(eval_value(env, scope, arg)?);
      }
      host::construct(class, values).map(Flow::Value)
    }
    Ast::HostCall {
      target,
      method,
      args,
    } => {
      let target = eval_value(env, scope, target)?;
      let mut values = Vec::with_capacity(args.len());
      for arg in args {
        values.push(eval_value(env, scope, arg)?);
      }
      host::invoke_method(env, &target, method, values).map(Flow::Value)
    }
    Ast::Reify { tag, methods } => {
      let mut pairs: Vec<(Value, Value)> = vec![(
        Value::kw(crate::value::REIFY_TYPE_KEY),
        Value::string(tag.clone()),
      )];
      for (name, f) in methods {
        let method = eval_value(env, scope, f)?;
        pairs.push((Value::kw(name), method));
      }
      Ok(Flow::Value(Value::map_from_pairs(pairs)))
    }
    Ast::VectorLit { items } => {
      let mut values = Vec::with_capacity(items.len());
      for item in items {
        values.push(eval_value(env, scope, item)?);
      }
      Ok(Flow::Value(Value::vector(values)))
    }
    Ast::MapLit { pairs } => {
      let mut entries = Vec::with_capacity(pairs.len());
      for (k, v) in pairs {
        entries.push((
          eval_value(env, scope, k)?,
          eval_value(env, scope, v)?,
        ));
      }
      Ok(Flow::Value(Value::map_from_pairs(entries)))
    }
    Ast::SetLit { items } => {
      let mut values = Vec::with_capacity(items.len());
      for item in items {
        values.push(eval_value(env, scope, item)?);
      }
      Ok(Flow::Value(Value::set_from_vec(values)))
    }
  }
}

fn eval_body(
  env: &Rc<Env>,
  scope: Option<&Rc<Scope>>,
  body: &[Ast],
) -> Result<Flow> {
  let (last, init) = body.split_last().expect("body is never empty");
  for ast in init {
    eval_value(env, scope, ast)?;
  }
  eval_flow(env, scope, last)
}

/// Body evaluation in non-tail contexts (try, catch, finally).
fn eval_body_protected(
  env: &Rc<Env>,
  scope: Option<&Rc<Scope>>,
  body: &[Ast],
) -> Result<Value> {
  match eval_body(env, scope, body)? {
    Flow::Value(v) => Ok(v),
    Flow::Recur(_) => {
      Err(Error::syntax("recur escaped across a try boundary"))
    }
  }
}

fn case_key(
  candidate: &Value,
  shift: u32,
  mask: i64,
  kind: CaseTestKind,
) -> Option<i64> {
  let h = match kind {
    CaseTestKind::Int => match candidate {
      Value::Int(i) => i32::try_from(*i).ok()? as i64,
      _ => return None,
    },
    CaseTestKind::Identity | CaseTestKind::Equiv => {
      candidate.hash_value() as i64
    }
  };
  if mask == 0 {
    Some(h)
  } else {
    Some((h >> shift) & mask)
  }
}

fn case_matches(
  test: &Value,
  candidate: &Value,
  kind: CaseTestKind,
) -> bool {
  match kind {
    CaseTestKind::Int => num::equiv(test, candidate),
    CaseTestKind::Identity => test.identical(candidate),
    CaseTestKind::Equiv => test == candidate,
  }
}

/// Converts a thrown value into the error that unwinds.
fn value_to_error(value: &Value) -> Error {
  match value {
    Value::Exception(e) => e.as_ref().clone(),
    Value::Map(map) => {
      let message = match map.get(&Value::kw("message")) {
        Some(Value::Str(s)) => s.to_string(),
        _ => String::new(),
      };
      let mut error = Error::new(ErrorKind::User, message)
        .with_data(value.clone());
      error.class = value.reify_type();
      error
    }
    Value::Str(s) => Error::new(ErrorKind::User, s.to_string()),
    other => Error::new(
      ErrorKind::User,
      crate::printer::pr_str_basic(other),
    ),
  }
}

/// Applies any invokable value per the application rules: closures by
/// arity, keywords/maps/sets/symbols as lookups, vectors as `nth`, vars
/// through their value.
pub fn apply(
  env: &Rc<Env>,
  callee: &Value,
  args: Vec<Value>,
) -> Result<Value> {
  match callee {
    Value::Fn(closure) => apply_closure(env, callee, closure, args),
    Value::Builtin(builtin) => (builtin.f)(env, args),
    Value::NativeFn(closure) => (closure.f)(env, args),
    Value::MultiFn(multi) => apply_multi(env, multi, args),
    Value::Keyword(_) | Value::Symbol(_) => {
      expect_arity(&args, 1..=2, callee)?;
      let found = args[0].lookup(callee)?;
      Ok(found.unwrap_or_else(|| {
        args.get(1).cloned().unwrap_or(Value::Nil)
      }))
    }
    Value::Map(_) | Value::Set(_) => {
      expect_arity(&args, 1..=2, callee)?;
      let found = callee.lookup(&args[0])?;
      Ok(found.unwrap_or_else(|| {
        args.get(1).cloned().unwrap_or(Value::Nil)
      }))
    }
    Value::Vector(v) => {
      expect_arity(&args, 1..=1, callee)?;
      let ix = num::as_i64(&args[0])?;
      v.nth(ix).map(Clone::clone)
    }
    Value::Var(var) => {
      let value = var.deref()?;
      apply(env, &value, args)
    }
    other => Err(Error::type_error(format!(
      "{} cannot be cast to a function",
      other.type_name()
    ))),
  }
}

fn expect_arity(
  args: &[Value],
  range: std::ops::RangeInclusive<usize>,
  callee: &Value,
) -> Result<()> {
  if range.contains(&args.len()) {
    Ok(())
  } else {
    Err(Error::arity(args.len(), callee.type_name()))
  }
}

fn apply_closure(
  env: &Rc<Env>,
  callee: &Value,
  closure: &Closure,
  args: Vec<Value>,
) -> Result<Value> {
  let arity: &Rc<FnArity> = match closure
    .arities
    .iter()
    .find(|a| a.params.len() == args.len())
  {
    Some(a) => a,
    None => match &closure.variadic {
      Some(v) if args.len() >= v.params.len() => v,
      _ => {
        return Err(Error::arity(
          args.len(),
          closure.name.as_deref().unwrap_or("fn"),
        ));
      }
    },
  };
  // Split once into the fixed arguments plus the rest seq; a recur
  // rebinds exactly this shape (the analyzer enforces the arity).
  let mut fixed_args = args;
  let mut rest_arg = Value::Nil;
  if arity.rest.is_some() {
    let extras: Vec<Value> =
      fixed_args.split_off(arity.params.len());
    if !extras.is_empty() {
      rest_arg = Value::list_from_vec(extras);
    }
  }
  loop {
    let frame = Scope::child(closure.captured.as_ref());
    if let Some(name) = &closure.name {
      frame.bind(name.clone(), callee.clone());
    }
    for (name, value) in
      arity.params.iter().zip(fixed_args.iter())
    {
      frame.bind(name.clone(), value.clone());
    }
    if let Some(rest_name) = &arity.rest {
      frame.bind(rest_name.clone(), rest_arg.clone());
    }
    match eval_body(env, Some(&frame), &arity.body)? {
      Flow::Value(v) => return Ok(v),
      Flow::Recur(mut new_args) => {
        if arity.rest.is_some() {
          rest_arg = new_args.pop().unwrap_or(Value::Nil);
        }
        fixed_args = new_args;
      }
    }
  }
}

fn apply_multi(
  env: &Rc<Env>,
  multi: &MultiFn,
  args: Vec<Value>,
) -> Result<Value> {
  let dispatch_value = apply(env, &multi.dispatch, args.clone())?;
  let method = {
    let methods = multi.methods.borrow();
    methods
      .get(&dispatch_value)
      .cloned()
      .or_else(|| methods.get(&Value::kw("default")).cloned())
  };
  match method {
    Some(f) => apply(env, &f, args),
    None => Err(Error::illegal_argument(format!(
      "no method in multimethod '{}' for dispatch value: {}",
      multi.name,
      crate::printer::pr_str_basic(&dispatch_value)
    ))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::load_string;

  fn run(source: &str) -> Result<Value> {
    let env = Env::bootstrap();
    load_string(&env, source)
  }

  #[test]
  fn loop_recur_runs_in_constant_stack() {
    let result = run(
      "(loop* [i 0 acc 0] (if (< i 100000) (recur (inc i) (+ acc 1)) acc))",
    )
    .unwrap();
    assert_eq!(result, Value::Int(100000));
  }

  #[test]
  fn closures_capture_their_scope() {
    let result = run(
      "(def adder (let* [n 3] (fn* [x] (+ x n)))) (adder 4)",
    )
    .unwrap();
    assert_eq!(result, Value::Int(7));
  }

  #[test]
  fn variadic_arity_collects_the_tail() {
    let result =
      run("((fn* [a & more] (count more)) 1 2 3 4)").unwrap();
    assert_eq!(result, Value::Int(3));
  }

  #[test]
  fn arity_mismatch_is_an_error() {
    let e = run("((fn* [a] a) 1 2)").unwrap_err();
    assert_eq!(e.kind, ErrorKind::Arity);
  }

  #[test]
  fn finally_runs_on_throw() {
    let result = run(
      "(def a (atom 0))
       (try (throw (ex-info \"boom\" {})) (catch Exception _ nil)
            (finally (reset! a 1)))
       (deref a)",
    )
    .unwrap();
    assert_eq!(result, Value::Int(1));
  }

  #[test]
  fn keywords_and_maps_invoke_as_lookups() {
    assert_eq!(run("(:a {:a 1})").unwrap(), Value::Int(1));
    assert_eq!(run("({:a 1} :b 2)").unwrap(), Value::Int(2));
    assert_eq!(run("(#{3} 3)").unwrap(), Value::Int(3));
  }
}
