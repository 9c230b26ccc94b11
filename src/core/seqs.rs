// core/seqs.rs
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

//! The sequence library: lazy constructors, folds, the transducer
//! protocol, and the function combinators.
//!
//! A transducer is a function of a reducing function returning a reducing
//! function; arity 0 is init, arity 1 completion, arity 2 the step.
//! `reduced` wraps a value to stop a fold early, and every fold here
//! honors it.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::{
  env::{Env, Namespace},
  error::{Error, Result},
  eval::apply,
  value::{
    compare_values, num, num::Overflow, seq, NativeClosure, Value,
  },
};

use super::{at_least, between, def_builtin, exact};

pub fn install(core: &Namespace) {
  def_builtin(core, "map", map);
  def_builtin(core, "mapv", mapv);
  def_builtin(core, "filter", filter);
  def_builtin(core, "filterv", filterv);
  def_builtin(core, "remove", remove);
  def_builtin(core, "keep", keep);
  def_builtin(core, "keep-indexed", keep_indexed);
  def_builtin(core, "map-indexed", map_indexed);
  def_builtin(core, "mapcat", mapcat);
  def_builtin(core, "reduce", reduce);
  def_builtin(core, "reduce-kv", reduce_kv);
  def_builtin(core, "transduce", transduce);
  def_builtin(core, "into", into);
  def_builtin(core, "sequence", sequence);
  def_builtin(core, "completing", completing);
  def_builtin(core, "iterate", iterate);
  def_builtin(core, "range", range);
  def_builtin(core, "repeat", repeat);
  def_builtin(core, "repeatedly", repeatedly);
  def_builtin(core, "cycle", cycle);
  def_builtin(core, "concat", concat);
  def_builtin(core, "take", take);
  def_builtin(core, "drop", drop_);
  def_builtin(core, "take-while", take_while);
  def_builtin(core, "drop-while", drop_while);
  def_builtin(core, "take-last", take_last);
  def_builtin(core, "drop-last", drop_last);
  def_builtin(core, "take-nth", take_nth);
  def_builtin(core, "partition", partition);
  def_builtin(core, "partition-all", partition_all);
  def_builtin(core, "partition-by", partition_by);
  def_builtin(core, "split-at", split_at);
  def_builtin(core, "split-with", split_with);
  def_builtin(core, "group-by", group_by);
  def_builtin(core, "frequencies", frequencies);
  def_builtin(core, "distinct", distinct);
  def_builtin(core, "distinct?", distinct_p);
  def_builtin(core, "dedupe", dedupe);
  def_builtin(core, "flatten", flatten);
  def_builtin(core, "interleave", interleave);
  def_builtin(core, "interpose", interpose);
  def_builtin(core, "doall", doall);
  def_builtin(core, "dorun", dorun);
  def_builtin(core, "every?", every_p);
  def_builtin(core, "not-every?", not_every_p);
  def_builtin(core, "some", some);
  def_builtin(core, "not-any?", not_any_p);
  def_builtin(core, "sort", sort);
  def_builtin(core, "sort-by", sort_by);
  def_builtin(core, "shuffle", shuffle);
  def_builtin(core, "rand-nth", rand_nth);
  def_builtin(core, "reduced", reduced_fn);
  def_builtin(core, "reduced?", reduced_p);
  def_builtin(core, "unreduced", unreduced);
  def_builtin(core, "ensure-reduced", ensure_reduced);
  // Combinators
  def_builtin(core, "apply", apply_builtin);
  def_builtin(core, "identity", identity);
  def_builtin(core, "constantly", constantly);
  def_builtin(core, "comp", comp);
  def_builtin(core, "partial", partial);
  def_builtin(core, "complement", complement);
  def_builtin(core, "juxt", juxt);
  def_builtin(core, "memoize", memoize);
  def_builtin(core, "trampoline", trampoline);
  def_builtin(core, "fnil", fnil);
  def_builtin(core, "every-pred", every_pred);
  def_builtin(core, "some-fn", some_fn);
  def_builtin(core, "max-key", max_key);
  def_builtin(core, "min-key", min_key);
}

fn lazy(
  thunk: impl FnOnce() -> Result<Value> + 'static,
) -> Value {
  Value::LazySeq(Rc::new(seq::LazySeqCell::native(thunk)))
}

fn make_reduced(v: Value) -> Value {
  Value::Reduced(Rc::new(v))
}

fn unwrap_reduced(v: Value) -> Value {
  match v {
    Value::Reduced(inner) => inner.as_ref().clone(),
    other => other,
  }
}

//
// map and friends
//

fn map(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("map", &args, 1)?;
  let f = args[0].clone();
  if args.len() == 1 {
    return Ok(map_transducer(f));
  }
  Ok(lazy_map(env.clone(), f, args[1..].to_vec()))
}

fn lazy_map(env: Rc<Env>, f: Value, colls: Vec<Value>) -> Value {
  lazy(move || {
    let mut heads = Vec::with_capacity(colls.len());
    let mut tails = Vec::with_capacity(colls.len());
    for coll in &colls {
      match seq::seq_of(coll)? {
        Some(s) => {
          heads.push(seq::first(&s)?);
          tails.push(seq::rest(&s)?);
        }
        None => return Ok(Value::Nil),
      }
    }
    let mapped = apply(&env, &f, heads)?;
    Ok(seq::cons(mapped, lazy_map(env.clone(), f.clone(), tails)))
  })
}

fn map_transducer(f: Value) -> Value {
  NativeClosure::new("map-xf", move |_, xf_args| {
    let rf = xf_args
      .first()
      .cloned()
      .ok_or_else(|| Error::arity(0, "map transducer"))?;
    let f = f.clone();
    Ok(NativeClosure::new("map-rf", move |env, step_args| {
      match step_args.len() {
        0 => apply(env, &rf, vec![]),
        1 => apply(env, &rf, step_args),
        _ => {
          let mut iter = step_args.into_iter();
          let acc = iter.next().unwrap();
          let mapped = apply(env, &f, iter.collect())?;
          apply(env, &rf, vec![acc, mapped])
        }
      }
    }))
  })
}

fn mapv(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("mapv", &args, 2)?;
  let mapped = map(env, args)?;
  Ok(Value::vector(seq::to_vec(&mapped)?))
}

fn filter_impl(
  env: &Rc<Env>,
  args: Vec<Value>,
  keep_matching: bool,
  name: &'static str,
) -> Result<Value> {
  at_least(name, &args, 1)?;
  let pred = args[0].clone();
  if args.len() == 1 {
    return Ok(filter_transducer(pred, keep_matching));
  }
  exact(name, &args, 2)?;
  Ok(lazy_filter(
    env.clone(),
    pred,
    args[1].clone(),
    keep_matching,
  ))
}

fn lazy_filter(
  env: Rc<Env>,
  pred: Value,
  coll: Value,
  keep_matching: bool,
) -> Value {
  lazy(move || {
    let mut current = coll;
    loop {
      match seq::seq_of(&current)? {
        None => return Ok(Value::Nil),
        Some(s) => {
          let head = seq::first(&s)?;
          let tail = seq::rest(&s)?;
          let verdict =
            apply(&env, &pred, vec![head.clone()])?.is_truthy();
          if verdict == keep_matching {
            return Ok(seq::cons(
              head,
              lazy_filter(
                env.clone(),
                pred.clone(),
                tail,
                keep_matching,
              ),
            ));
          }
          current = tail;
        }
      }
    }
  })
}

fn filter_transducer(pred: Value, keep_matching: bool) -> Value {
  NativeClosure::new("filter-xf", move |_, xf_args| {
    let rf = xf_args
      .first()
      .cloned()
      .ok_or_else(|| Error::arity(0, "filter transducer"))?;
    let pred = pred.clone();
    Ok(NativeClosure::new("filter-rf", move |env, step_args| {
      match step_args.len() {
        0 => apply(env, &rf, vec![]),
        1 => apply(env, &rf, step_args),
        2 => {
          let mut iter = step_args.into_iter();
          let acc = iter.next().unwrap();
          let item = iter.next().unwrap();
          let verdict =
            apply(env, &pred, vec![item.clone()])?.is_truthy();
          if verdict == keep_matching {
            apply(env, &rf, vec![acc, item])
          } else {
            Ok(acc)
          }
        }
        n => Err(Error::arity(n, "filter step")),
      }
    }))
  })
}

fn filter(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  filter_impl(env, args, true, "filter")
}

fn remove(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  filter_impl(env, args, false, "remove")
}

fn filterv(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("filterv", &args, 2)?;
  let filtered = filter(env, args)?;
  Ok(Value::vector(seq::to_vec(&filtered)?))
}

fn keep(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("keep", &args, 1)?;
  let f = args[0].clone();
  if args.len() == 1 {
    return Ok(keep_transducer(f));
  }
  Ok(lazy_keep(env.clone(), f, args[1].clone()))
}

fn lazy_keep(env: Rc<Env>, f: Value, coll: Value) -> Value {
  lazy(move || {
    let mut current = coll;
    loop {
      match seq::seq_of(&current)? {
        None => return Ok(Value::Nil),
        Some(s) => {
          let head = seq::first(&s)?;
          let tail = seq::rest(&s)?;
          let kept = apply(&env, &f, vec![head])?;
          if !matches!(kept, Value::Nil) {
            return Ok(seq::cons(
              kept,
              lazy_keep(env.clone(), f.clone(), tail),
            ));
          }
          current = tail;
        }
      }
    }
  })
}

fn keep_transducer(f: Value) -> Value {
  NativeClosure::new("keep-xf", move |_, xf_args| {
    let rf = xf_args
      .first()
      .cloned()
      .ok_or_else(|| Error::arity(0, "keep transducer"))?;
    let f = f.clone();
    Ok(NativeClosure::new("keep-rf", move |env, step_args| {
      match step_args.len() {
        0 => apply(env, &rf, vec![]),
        1 => apply(env, &rf, step_args),
        2 => {
          let mut iter = step_args.into_iter();
          let acc = iter.next().unwrap();
          let item = iter.next().unwrap();
          let kept = apply(env, &f, vec![item])?;
          if matches!(kept, Value::Nil) {
            Ok(acc)
          } else {
            apply(env, &rf, vec![acc, kept])
          }
        }
        n => Err(Error::arity(n, "keep step")),
      }
    }))
  })
}

fn keep_indexed(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("keep-indexed", &args, 1)?;
  let f = args[0].clone();
  if args.len() == 1 {
    let counter = Cell::new(0_i64);
    let inner = NativeClosure::new("keep-indexed-f", {
      let f = f.clone();
      move |env, mut call_args| {
        let ix = counter.get();
        counter.set(ix + 1);
        let item = call_args.pop().unwrap_or(Value::Nil);
        apply(env, &f, vec![Value::Int(ix), item])
      }
    });
    return Ok(keep_transducer(inner));
  }
  Ok(lazy_keep_indexed(env.clone(), f, args[1].clone(), 0))
}

fn lazy_keep_indexed(
  env: Rc<Env>,
  f: Value,
  coll: Value,
  index: i64,
) -> Value {
  lazy(move || {
    let mut current = coll;
    let mut index = index;
    loop {
      match seq::seq_of(&current)? {
        None => return Ok(Value::Nil),
        Some(s) => {
          let head = seq::first(&s)?;
          let tail = seq::rest(&s)?;
          let kept =
            apply(&env, &f, vec![Value::Int(index), head])?;
          index += 1;
          if !matches!(kept, Value::Nil) {
            return Ok(seq::cons(
              kept,
              lazy_keep_indexed(
                env.clone(),
                f.clone(),
                tail,
                index,
              ),
            ));
          }
          current = tail;
        }
      }
    }
  })
}

fn map_indexed(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("map-indexed", &args, 1)?;
  let f = args[0].clone();
  if args.len() == 1 {
    let counter = Cell::new(0_i64);
    let inner = NativeClosure::new("map-indexed-f", {
      let f = f.clone();
      move |env, mut call_args| {
        let ix = counter.get();
        counter.set(ix + 1);
        let item = call_args.pop().unwrap_or(Value::Nil);
        apply(env, &f, vec![Value::Int(ix), item])
      }
    });
    return Ok(map_transducer(inner));
  }
  Ok(lazy_map_indexed(env.clone(), f, args[1].clone(), 0))
}

fn lazy_map_indexed(
  env: Rc<Env>,
  f: Value,
  coll: Value,
  index: i64,
) -> Value {
  lazy(move || match seq::seq_of(&coll)? {
    None => Ok(Value::Nil),
    Some(s) => {
      let head = seq::first(&s)?;
      let tail = seq::rest(&s)?;
      let mapped = apply(&env, &f, vec![Value::Int(index), head])?;
      Ok(seq::cons(
        mapped,
        lazy_map_indexed(env.clone(), f.clone(), tail, index + 1),
      ))
    }
  })
}

fn mapcat(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("mapcat", &args, 2)?;
  let mapped = map(env, args)?;
  Ok(lazy_concat_of_seqs(mapped))
}

/// Concatenation over a seq of seqs, realized one element at a time.
fn lazy_concat_of_seqs(seqs: Value) -> Value {
  lazy(move || {
    let mut outer = seqs;
    loop {
      match seq::seq_of(&outer)? {
        None => return Ok(Value::Nil),
        Some(s) => {
          let inner = seq::first(&s)?;
          let rest_outer = seq::rest(&s)?;
          match seq::seq_of(&inner)? {
            Some(inner_seq) => {
              let head = seq::first(&inner_seq)?;
              let inner_rest = seq::rest(&inner_seq)?;
              // (cons head (concat inner-rest outer-rest...))
              let rebuilt = seq::cons(inner_rest, rest_outer);
              return Ok(seq::cons(
                head,
                lazy_concat_of_seqs(rebuilt),
              ));
            }
            None => outer = rest_outer,
          }
        }
      }
    }
  })
}

fn concat(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  Ok(lazy_concat_of_seqs(Value::list_from_vec(args)))
}

//
// Folds
//

pub(crate) fn fold_seq(
  env: &Rc<Env>,
  f: &Value,
  init: Value,
  coll: &Value,
) -> Result<Value> {
  let mut acc = init;
  let mut current = coll.clone();
  loop {
    match seq::seq_of(&current)? {
      None => return Ok(acc),
      Some(s) => {
        let head = seq::first(&s)?;
        current = seq::rest(&s)?;
        acc = apply(env, f, vec![acc, head])?;
        if let Value::Reduced(inner) = &acc {
          return Ok(inner.as_ref().clone());
        }
      }
    }
  }
}

fn reduce(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("reduce", &args, 2, 3)?;
  let f = &args[0];
  match args.len() {
    2 => match seq::seq_of(&args[1])? {
      None => apply(env, f, vec![]),
      Some(s) => {
        let init = seq::first(&s)?;
        let rest = seq::rest(&s)?;
        fold_seq(env, f, init, &rest)
      }
    },
    _ => fold_seq(env, f, args[1].clone(), &args[2]),
  }
}

fn reduce_kv(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("reduce-kv", &args, 3)?;
  let f = &args[0];
  let mut acc = args[1].clone();
  match &args[2] {
    Value::Nil => Ok(acc),
    Value::Map(m) => {
      for (k, v) in m.entries() {
        acc =
          apply(env, f, vec![acc, k.clone(), v.clone()])?;
        if let Value::Reduced(inner) = &acc {
          return Ok(inner.as_ref().clone());
        }
      }
      Ok(acc)
    }
    Value::Vector(v) => {
      for (ix, item) in v.iter().enumerate() {
        acc = apply(
          env,
          f,
          vec![acc, Value::Int(ix as i64), item.clone()],
        )?;
        if let Value::Reduced(inner) = &acc {
          return Ok(inner.as_ref().clone());
        }
      }
      Ok(acc)
    }
    other => Err(Error::type_error(format!(
      "reduce-kv not supported on {}",
      other.type_name()
    ))),
  }
}

fn transduce(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("transduce", &args, 3, 4)?;
  let xform = &args[0];
  let f = &args[1];
  let (init, coll) = match args.len() {
    3 => (apply(env, f, vec![])?, &args[2]),
    _ => (args[2].clone(), &args[3]),
  };
  let rf = apply(env, xform, vec![f.clone()])?;
  let result = fold_seq(env, &rf, init, coll)?;
  apply(env, &rf, vec![result])
}

fn into(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("into", &args, 2, 3)?;
  let conj_fn = env
    .core_var("conj")
    .and_then(|v| v.root())
    .ok_or_else(|| Error::lookup("conj is not defined"))?;
  match args.len() {
    2 => fold_seq(env, &conj_fn, args[0].clone(), &args[1]),
    _ => {
      let rf = apply(env, &args[1], vec![conj_fn])?;
      let result =
        fold_seq(env, &rf, args[0].clone(), &args[2])?;
      apply(env, &rf, vec![result])
    }
  }
}

/// Incremental transducer application: items pull through the transform
/// one step at a time into a buffer the lazy seq drains.
struct XfPull {
  env: Rc<Env>,
  rf: Value,
  source: RefCell<Value>,
  buffer: Rc<RefCell<VecDeque<Value>>>,
  done: Cell<bool>,
}

impl XfPull {
  fn spawn(
    env: Rc<Env>,
    xform: Value,
    coll: Value,
  ) -> Result<Rc<Self>> {
    let buffer: Rc<RefCell<VecDeque<Value>>> =
      Rc::new(RefCell::new(VecDeque::new()));
    let sink = {
      let buffer = buffer.clone();
      NativeClosure::new("sequence-sink", move |_, step_args| {
        let mut iter = step_args.into_iter();
        let acc = iter.next().unwrap_or(Value::Nil);
        if let Some(item) = iter.next() {
          buffer.borrow_mut().push_back(item);
        }
        Ok(acc)
      })
    };
    let rf = apply(&env, &xform, vec![sink])?;
    Ok(Rc::new(Self {
      env,
      rf,
      source: RefCell::new(coll),
      buffer,
      done: Cell::new(false),
    }))
  }

  fn pull(&self) -> Result<Option<Value>> {
    loop {
      if let Some(item) = self.buffer.borrow_mut().pop_front() {
        return Ok(Some(item));
      }
      if self.done.get() {
        return Ok(None);
      }
      let current = self.source.borrow().clone();
      match seq::seq_of(&current)? {
        None => {
          self.done.set(true);
          // Completion may flush pending output into the buffer.
          apply(&self.env, &self.rf, vec![Value::Nil])?;
        }
        Some(s) => {
          let head = seq::first(&s)?;
          *self.source.borrow_mut() = seq::rest(&s)?;
          let step = apply(
            &self.env,
            &self.rf,
            vec![Value::Nil, head],
          )?;
          if matches!(step, Value::Reduced(_)) {
            self.done.set(true);
            apply(&self.env, &self.rf, vec![Value::Nil])?;
          }
        }
      }
    }
  }
}

fn xf_lazy(state: Rc<XfPull>) -> Value {
  lazy(move || match state.pull()? {
    Some(item) => Ok(seq::cons(item, xf_lazy(state.clone()))),
    None => Ok(Value::Nil),
  })
}

fn sequence(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("sequence", &args, 1, 2)?;
  match args.len() {
    1 => Ok(seq::seq_of(&args[0])?.unwrap_or(Value::empty_list())),
    _ => {
      let state = XfPull::spawn(
        env.clone(),
        args[0].clone(),
        args[1].clone(),
      )?;
      Ok(xf_lazy(state))
    }
  }
}

fn completing(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("completing", &args, 1, 2)?;
  let f = args[0].clone();
  let cf = args.get(1).cloned();
  Ok(NativeClosure::new("completing", move |env, step_args| {
    match (step_args.len(), &cf) {
      (1, Some(cf)) => apply(env, cf, step_args),
      (1, None) => Ok(step_args.into_iter().next().unwrap()),
      _ => apply(env, &f, step_args),
    }
  }))
}

//
// Generators
//

fn iterate(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("iterate", &args, 2)?;
  Ok(lazy_iterate(
    env.clone(),
    args[0].clone(),
    args[1].clone(),
  ))
}

fn lazy_iterate(env: Rc<Env>, f: Value, x: Value) -> Value {
  lazy(move || {
    let next = apply(&env, &f, vec![x.clone()])?;
    Ok(seq::cons(x, lazy_iterate(env.clone(), f, next)))
  })
}

fn range(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("range", &args, 0, 3)?;
  let (start, end, step) = match args.len() {
    0 => (Value::Int(0), None, Value::Int(1)),
    1 => (Value::Int(0), Some(args[0].clone()), Value::Int(1)),
    2 => (args[0].clone(), Some(args[1].clone()), Value::Int(1)),
    _ => {
      (args[0].clone(), Some(args[1].clone()), args[2].clone())
    }
  };
  Ok(lazy_range(start, end, step))
}

fn lazy_range(
  current: Value,
  end: Option<Value>,
  step: Value,
) -> Value {
  lazy(move || {
    if let Some(end) = &end {
      let descending = num::is_neg(&step)?;
      let stop = if descending {
        num::compare(&current, end)? != Ordering::Greater
      } else {
        num::compare(&current, end)? != Ordering::Less
      };
      if stop {
        return Ok(Value::Nil);
      }
    }
    let next = num::add(&current, &step, Overflow::Promote)?;
    Ok(seq::cons(
      current.clone(),
      lazy_range(next, end.clone(), step.clone()),
    ))
  })
}

fn repeat(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("repeat", &args, 1, 2)?;
  match args.len() {
    1 => Ok(lazy_repeat(args[0].clone(), None)),
    _ => {
      let n = num::as_i64(&args[0])?;
      Ok(lazy_repeat(args[1].clone(), Some(n)))
    }
  }
}

fn lazy_repeat(x: Value, remaining: Option<i64>) -> Value {
  lazy(move || {
    if let Some(n) = remaining {
      if n <= 0 {
        return Ok(Value::Nil);
      }
    }
    Ok(seq::cons(
      x.clone(),
      lazy_repeat(x, remaining.map(|n| n - 1)),
    ))
  })
}

fn repeatedly(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("repeatedly", &args, 1, 2)?;
  match args.len() {
    1 => Ok(lazy_repeatedly(env.clone(), args[0].clone(), None)),
    _ => {
      let n = num::as_i64(&args[0])?;
      Ok(lazy_repeatedly(
        env.clone(),
        args[1].clone(),
        Some(n),
      ))
    }
  }
}

fn lazy_repeatedly(
  env: Rc<Env>,
  f: Value,
  remaining: Option<i64>,
) -> Value {
  lazy(move || {
    if let Some(n) = remaining {
      if n <= 0 {
        return Ok(Value::Nil);
      }
    }
    let head = apply(&env, &f, vec![])?;
    Ok(seq::cons(
      head,
      lazy_repeatedly(env.clone(), f, remaining.map(|n| n - 1)),
    ))
  })
}

fn cycle(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("cycle", &args, 1)?;
  let items = seq::to_vec(&args[0])?;
  if items.is_empty() {
    return Ok(Value::empty_list());
  }
  Ok(lazy_cycle(Rc::new(items), 0))
}

fn lazy_cycle(items: Rc<Vec<Value>>, index: usize) -> Value {
  lazy(move || {
    let head = items[index % items.len()].clone();
    Ok(seq::cons(
      head,
      lazy_cycle(items.clone(), (index + 1) % items.len()),
    ))
  })
}

//
// take / drop family
//

fn take(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("take", &args, 1, 2)?;
  let n = num::as_i64(&args[0])?;
  if args.len() == 1 {
    return Ok(take_transducer(n));
  }
  Ok(lazy_take(n, args[1].clone()))
}

fn lazy_take(n: i64, coll: Value) -> Value {
  lazy(move || {
    if n <= 0 {
      return Ok(Value::Nil);
    }
    match seq::seq_of(&coll)? {
      None => Ok(Value::Nil),
      Some(s) => {
        let head = seq::first(&s)?;
        let tail = seq::rest(&s)?;
        Ok(seq::cons(head, lazy_take(n - 1, tail)))
      }
    }
  })
}

/// The early-terminating transducer: the step that consumes the last
/// wanted item wraps the result in `reduced`.
fn take_transducer(n: i64) -> Value {
  NativeClosure::new("take-xf", move |_, xf_args| {
    let rf = xf_args
      .first()
      .cloned()
      .ok_or_else(|| Error::arity(0, "take transducer"))?;
    let remaining = Cell::new(n);
    Ok(NativeClosure::new("take-rf", move |env, step_args| {
      match step_args.len() {
        0 => apply(env, &rf, vec![]),
        1 => apply(env, &rf, step_args),
        2 => {
          let before = remaining.get();
          remaining.set(before - 1);
          let mut iter = step_args.into_iter();
          let acc = iter.next().unwrap();
          let item = iter.next().unwrap();
          let result = if before > 0 {
            apply(env, &rf, vec![acc, item])?
          } else {
            acc
          };
          if remaining.get() <= 0
            && !matches!(result, Value::Reduced(_))
          {
            Ok(make_reduced(result))
          } else {
            Ok(result)
          }
        }
        k => Err(Error::arity(k, "take step")),
      }
    }))
  })
}

fn drop_(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("drop", &args, 1, 2)?;
  let n = num::as_i64(&args[0])?;
  if args.len() == 1 {
    let remaining = Cell::new(n);
    return Ok(stateful_filter_transducer("drop-xf", move |_, _| {
      let before = remaining.get();
      if before > 0 {
        remaining.set(before - 1);
        Ok(false)
      } else {
        Ok(true)
      }
    }));
  }
  let coll = args[1].clone();
  Ok(lazy(move || {
    let mut current = coll;
    let mut remaining = n;
    while remaining > 0 {
      match seq::seq_of(&current)? {
        None => return Ok(Value::Nil),
        Some(s) => {
          current = seq::rest(&s)?;
          remaining -= 1;
        }
      }
    }
    Ok(seq::seq_of(&current)?.unwrap_or(Value::Nil))
  }))
}

/// Builds a transducer whose step keeps an item iff `pred` says so;
/// `pred` may consult interior state.
fn stateful_filter_transducer(
  name: &'static str,
  pred: impl Fn(&Rc<Env>, &Value) -> Result<bool> + 'static,
) -> Value {
  let pred = Rc::new(pred);
  NativeClosure::new(name, move |_, xf_args| {
    let rf = xf_args
      .first()
      .cloned()
      .ok_or_else(|| Error::arity(0, name))?;
    let pred = pred.clone();
    Ok(NativeClosure::new(name, move |env, step_args| {
      match step_args.len() {
        0 => apply(env, &rf, vec![]),
        1 => apply(env, &rf, step_args),
        2 => {
          let mut iter = step_args.into_iter();
          let acc = iter.next().unwrap();
          let item = iter.next().unwrap();
          if pred(env, &item)? {
            apply(env, &rf, vec![acc, item])
          } else {
            Ok(acc)
          }
        }
        k => Err(Error::arity(k, name)),
      }
    }))
  })
}

fn take_while(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("take-while", &args, 1, 2)?;
  let pred = args[0].clone();
  if args.len() == 1 {
    return Ok(NativeClosure::new("take-while-xf", move |_, xf_args| {
      let rf = xf_args
        .first()
        .cloned()
        .ok_or_else(|| Error::arity(0, "take-while"))?;
      let pred = pred.clone();
      Ok(NativeClosure::new(
        "take-while-rf",
        move |env, step_args| match step_args.len() {
          0 => apply(env, &rf, vec![]),
          1 => apply(env, &rf, step_args),
          2 => {
            let mut iter = step_args.into_iter();
            let acc = iter.next().unwrap();
            let item = iter.next().unwrap();
            if apply(env, &pred, vec![item.clone()])?.is_truthy() {
              apply(env, &rf, vec![acc, item])
            } else {
              Ok(make_reduced(acc))
            }
          }
          k => Err(Error::arity(k, "take-while step")),
        },
      ))
    }));
  }
  Ok(lazy_take_while(
    env.clone(),
    pred,
    args[1].clone(),
  ))
}

fn lazy_take_while(env: Rc<Env>, pred: Value, coll: Value) -> Value {
  lazy(move || match seq::seq_of(&coll)? {
    None => Ok(Value::Nil),
    Some(s) => {
      let head = seq::first(&s)?;
      if apply(&env, &pred, vec![head.clone()])?.is_truthy() {
        let tail = seq::rest(&s)?;
        Ok(seq::cons(
          head,
          lazy_take_while(env.clone(), pred, tail),
        ))
      } else {
        Ok(Value::Nil)
      }
    }
  })
}

fn drop_while(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("drop-while", &args, 1, 2)?;
  let pred = args[0].clone();
  if args.len() == 1 {
    let dropping = Cell::new(true);
    return Ok(stateful_filter_transducer(
      "drop-while-xf",
      move |env, item| {
        if !dropping.get() {
          return Ok(true);
        }
        if apply(env, &pred, vec![item.clone()])?.is_truthy() {
          Ok(false)
        } else {
          dropping.set(false);
          Ok(true)
        }
      },
    ));
  }
  let env = env.clone();
  let coll = args[1].clone();
  Ok(lazy(move || {
    let mut current = coll;
    loop {
      match seq::seq_of(&current)? {
        None => return Ok(Value::Nil),
        Some(s) => {
          let head = seq::first(&s)?;
          if apply(&env, &pred, vec![head])?.is_truthy() {
            current = seq::rest(&s)?;
          } else {
            return Ok(s);
          }
        }
      }
    }
  }))
}

fn take_last(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("take-last", &args, 2)?;
  let n = num::as_i64(&args[0])?.max(0) as usize;
  let items = seq::to_vec(&args[1])?;
  if n == 0 || items.is_empty() {
    return Ok(Value::Nil);
  }
  let start = items.len().saturating_sub(n);
  Ok(Value::list_from_vec(items[start..].to_vec()))
}

fn drop_last(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("drop-last", &args, 1, 2)?;
  let (n, coll) = match args.len() {
    1 => (1, &args[0]),
    _ => (num::as_i64(&args[0])?.max(0), &args[1]),
  };
  let items = seq::to_vec(coll)?;
  let keep = items.len().saturating_sub(n as usize);
  Ok(Value::list_from_vec(items[..keep].to_vec()))
}

fn take_nth(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("take-nth", &args, 2)?;
  let n = num::as_i64(&args[0])?;
  if n <= 0 {
    return Err(Error::illegal_argument(
      "take-nth needs a positive step",
    ));
  }
  Ok(lazy_take_nth(n, args[1].clone()))
}

fn lazy_take_nth(n: i64, coll: Value) -> Value {
  lazy(move || match seq::seq_of(&coll)? {
    None => Ok(Value::Nil),
    Some(s) => {
      let head = seq::first(&s)?;
      let mut tail = seq::rest(&s)?;
      for _ in 1..n {
        match seq::seq_of(&tail)? {
          Some(t) => tail = seq::rest(&t)?,
          None => break,
        }
      }
      Ok(seq::cons(head, lazy_take_nth(n, tail)))
    }
  })
}

//
// Partitioning
//

fn partition(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("partition", &args, 2, 4)?;
  let n = num::as_i64(&args[0])?;
  let (step, pad, coll) = match args.len() {
    2 => (n, None, args[1].clone()),
    3 => (num::as_i64(&args[1])?, None, args[2].clone()),
    _ => (
      num::as_i64(&args[1])?,
      Some(args[2].clone()),
      args[3].clone(),
    ),
  };
  if n <= 0 || step <= 0 {
    return Err(Error::illegal_argument(
      "partition needs positive sizes",
    ));
  }
  Ok(lazy_partition(n, step, pad, coll))
}

fn lazy_partition(
  n: i64,
  step: i64,
  pad: Option<Value>,
  coll: Value,
) -> Value {
  lazy(move || {
    let mut window = Vec::with_capacity(n as usize);
    let mut current = coll.clone();
    for _ in 0..n {
      match seq::seq_of(&current)? {
        Some(s) => {
          window.push(seq::first(&s)?);
          current = seq::rest(&s)?;
        }
        None => break,
      }
    }
    if window.is_empty() {
      return Ok(Value::Nil);
    }
    if (window.len() as i64) < n {
      return match &pad {
        Some(padding) => {
          let mut padded = window;
          for extra in seq::iter(padding) {
            if padded.len() as i64 >= n {
              break;
            }
            padded.push(extra?);
          }
          Ok(seq::cons(
            Value::list_from_vec(padded),
            Value::empty_list(),
          ))
        }
        None => Ok(Value::Nil),
      };
    }
    // Advance the source by `step` for the next window.
    let mut next = coll.clone();
    for _ in 0..step {
      match seq::seq_of(&next)? {
        Some(s) => next = seq::rest(&s)?,
        None => {
          return Ok(seq::cons(
            Value::list_from_vec(window),
            Value::empty_list(),
          ));
        }
      }
    }
    Ok(seq::cons(
      Value::list_from_vec(window),
      lazy_partition(n, step, pad.clone(), next),
    ))
  })
}

fn partition_all(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("partition-all", &args, 1, 3)?;
  let n = num::as_i64(&args[0])?;
  if n <= 0 {
    return Err(Error::illegal_argument(
      "partition-all needs a positive size",
    ));
  }
  match args.len() {
    1 => Ok(partition_all_transducer(n)),
    2 => Ok(lazy_partition_all(n, n, args[1].clone())),
    _ => {
      let step = num::as_i64(&args[1])?;
      Ok(lazy_partition_all(n, step, args[2].clone()))
    }
  }
}

fn lazy_partition_all(n: i64, step: i64, coll: Value) -> Value {
  lazy(move || {
    let mut window = Vec::with_capacity(n as usize);
    let mut current = coll.clone();
    for _ in 0..n {
      match seq::seq_of(&current)? {
        Some(s) => {
          window.push(seq::first(&s)?);
          current = seq::rest(&s)?;
        }
        None => break,
      }
    }
    if window.is_empty() {
      return Ok(Value::Nil);
    }
    let mut next = coll.clone();
    for _ in 0..step {
      match seq::seq_of(&next)? {
        Some(s) => next = seq::rest(&s)?,
        None => {
          return Ok(seq::cons(
            Value::list_from_vec(window),
            Value::empty_list(),
          ));
        }
      }
    }
    Ok(seq::cons(
      Value::list_from_vec(window),
      lazy_partition_all(n, step, next),
    ))
  })
}

fn partition_all_transducer(n: i64) -> Value {
  NativeClosure::new("partition-all-xf", move |_, xf_args| {
    let rf = xf_args
      .first()
      .cloned()
      .ok_or_else(|| Error::arity(0, "partition-all"))?;
    let window: Rc<RefCell<Vec<Value>>> =
      Rc::new(RefCell::new(Vec::new()));
    Ok(NativeClosure::new(
      "partition-all-rf",
      move |env, step_args| match step_args.len() {
        0 => apply(env, &rf, vec![]),
        1 => {
          let acc = step_args.into_iter().next().unwrap();
          let leftover: Vec<Value> =
            window.borrow_mut().drain(..).collect();
          let acc = if leftover.is_empty() {
            acc
          } else {
            unwrap_reduced(apply(
              env,
              &rf,
              vec![acc, Value::list_from_vec(leftover)],
            )?)
          };
          apply(env, &rf, vec![acc])
        }
        2 => {
          let mut iter = step_args.into_iter();
          let acc = iter.next().unwrap();
          let item = iter.next().unwrap();
          window.borrow_mut().push(item);
          if window.borrow().len() as i64 >= n {
            let full: Vec<Value> =
              window.borrow_mut().drain(..).collect();
            apply(
              env,
              &rf,
              vec![acc, Value::list_from_vec(full)],
            )
          } else {
            Ok(acc)
          }
        }
        k => Err(Error::arity(k, "partition-all step")),
      },
    ))
  })
}

fn partition_by(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("partition-by", &args, 1, 2)?;
  let f = args[0].clone();
  if args.len() == 1 {
    return Ok(partition_by_transducer(f));
  }
  Ok(lazy_partition_by(env.clone(), f, args[1].clone()))
}

fn lazy_partition_by(env: Rc<Env>, f: Value, coll: Value) -> Value {
  lazy(move || match seq::seq_of(&coll)? {
    None => Ok(Value::Nil),
    Some(s) => {
      let head = seq::first(&s)?;
      let tag = apply(&env, &f, vec![head.clone()])?;
      let mut run = vec![head];
      let mut current = seq::rest(&s)?;
      loop {
        match seq::seq_of(&current)? {
          None => break,
          Some(t) => {
            let item = seq::first(&t)?;
            let item_tag =
              apply(&env, &f, vec![item.clone()])?;
            if item_tag == tag {
              run.push(item);
              current = seq::rest(&t)?;
            } else {
              break;
            }
          }
        }
      }
      Ok(seq::cons(
        Value::list_from_vec(run),
        lazy_partition_by(env.clone(), f.clone(), current),
      ))
    }
  })
}

fn partition_by_transducer(f: Value) -> Value {
  NativeClosure::new("partition-by-xf", move |_, xf_args| {
    let rf = xf_args
      .first()
      .cloned()
      .ok_or_else(|| Error::arity(0, "partition-by"))?;
    let f = f.clone();
    let run: Rc<RefCell<Vec<Value>>> =
      Rc::new(RefCell::new(Vec::new()));
    let mark: Rc<RefCell<Option<Value>>> =
      Rc::new(RefCell::new(None));
    Ok(NativeClosure::new(
      "partition-by-rf",
      move |env, step_args| match step_args.len() {
        0 => apply(env, &rf, vec![]),
        1 => {
          let acc = step_args.into_iter().next().unwrap();
          let leftover: Vec<Value> =
            run.borrow_mut().drain(..).collect();
          let acc = if leftover.is_empty() {
            acc
          } else {
            unwrap_reduced(apply(
              env,
              &rf,
              vec![acc, Value::list_from_vec(leftover)],
            )?)
          };
          apply(env, &rf, vec![acc])
        }
        2 => {
          let mut iter = step_args.into_iter();
          let acc = iter.next().unwrap();
          let item = iter.next().unwrap();
          let tag = apply(env, &f, vec![item.clone()])?;
          let same = mark
            .borrow()
            .as_ref()
            .map(|m| *m == tag)
            .unwrap_or(true);
          *mark.borrow_mut() = Some(tag);
          if same {
            run.borrow_mut().push(item);
            Ok(acc)
          } else {
            let finished: Vec<Value> =
              run.borrow_mut().drain(..).collect();
            run.borrow_mut().push(item);
            apply(
              env,
              &rf,
              vec![acc, Value::list_from_vec(finished)],
            )
          }
        }
        k => Err(Error::arity(k, "partition-by step")),
      },
    ))
  })
}

fn split_at(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("split-at", &args, 2)?;
  let n = num::as_i64(&args[0])?.max(0) as usize;
  let items = seq::to_vec(&args[1])?;
  let split = n.min(items.len());
  Ok(Value::vector(vec![
    Value::list_from_vec(items[..split].to_vec()),
    Value::list_from_vec(items[split..].to_vec()),
  ]))
}

fn split_with(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("split-with", &args, 2)?;
  let items = seq::to_vec(&args[1])?;
  let mut split = items.len();
  for (ix, item) in items.iter().enumerate() {
    if !apply(env, &args[0], vec![item.clone()])?.is_truthy() {
      split = ix;
      break;
    }
  }
  Ok(Value::vector(vec![
    Value::list_from_vec(items[..split].to_vec()),
    Value::list_from_vec(items[split..].to_vec()),
  ]))
}

fn group_by(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("group-by", &args, 2)?;
  let mut grouped = crate::value::map::PMap::empty();
  for item in seq::iter(&args[1]) {
    let item = item?;
    let k = apply(env, &args[0], vec![item.clone()])?;
    let bucket = match grouped.get(&k) {
      Some(Value::Vector(v)) => {
        Value::Vector(Rc::new(v.conj(item)))
      }
      _ => Value::vector(vec![item]),
    };
    grouped = grouped.assoc(k, bucket);
  }
  Ok(Value::Map(Rc::new(grouped)))
}

fn frequencies(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("frequencies", &args, 1)?;
  let mut counts = crate::value::map::PMap::empty();
  for item in seq::iter(&args[0]) {
    let item = item?;
    let next = match counts.get(&item) {
      Some(Value::Int(n)) => Value::Int(n + 1),
      _ => Value::Int(1),
    };
    counts = counts.assoc(item, next);
  }
  Ok(Value::Map(Rc::new(counts)))
}

fn distinct(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("distinct", &args, 0, 1)?;
  if args.is_empty() {
    let seen: Rc<RefCell<im::HashSet<Value>>> =
      Rc::new(RefCell::new(im::HashSet::new()));
    return Ok(stateful_filter_transducer(
      "distinct-xf",
      move |_, item| {
        if seen.borrow().contains(item) {
          Ok(false)
        } else {
          seen.borrow_mut().insert(item.clone());
          Ok(true)
        }
      },
    ));
  }
  Ok(lazy_distinct(args[0].clone(), im::HashSet::new()))
}

fn lazy_distinct(coll: Value, seen: im::HashSet<Value>) -> Value {
  lazy(move || {
    let mut current = coll;
    let mut seen = seen;
    loop {
      match seq::seq_of(&current)? {
        None => return Ok(Value::Nil),
        Some(s) => {
          let head = seq::first(&s)?;
          let tail = seq::rest(&s)?;
          if seen.contains(&head) {
            current = tail;
          } else {
            seen.insert(head.clone());
            return Ok(seq::cons(
              head,
              lazy_distinct(tail, seen),
            ));
          }
        }
      }
    }
  })
}

fn distinct_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("distinct?", &args, 1)?;
  let mut seen = im::HashSet::new();
  for item in &args {
    if seen.contains(item) {
      return Ok(Value::Boolean(false));
    }
    seen.insert(item.clone());
  }
  Ok(Value::Boolean(true))
}

fn dedupe(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("dedupe", &args, 0, 1)?;
  if args.is_empty() {
    let prev: Rc<RefCell<Option<Value>>> =
      Rc::new(RefCell::new(None));
    return Ok(stateful_filter_transducer(
      "dedupe-xf",
      move |_, item| {
        let same = prev
          .borrow()
          .as_ref()
          .map(|p| p == item)
          .unwrap_or(false);
        *prev.borrow_mut() = Some(item.clone());
        Ok(!same)
      },
    ));
  }
  let items = seq::to_vec(&args[0])?;
  let mut out: Vec<Value> = Vec::with_capacity(items.len());
  for item in items {
    if out.last() != Some(&item) {
      out.push(item);
    }
  }
  Ok(Value::list_from_vec(out))
}

fn flatten(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("flatten", &args, 1)?;
  let mut out = Vec::new();
  flatten_into(&args[0], &mut out)?;
  Ok(Value::list_from_vec(out))
}

fn flatten_into(v: &Value, out: &mut Vec<Value>) -> Result<()> {
  if v.is_sequential() {
    for item in seq::iter(v) {
      flatten_into(&item?, out)?;
    }
  } else if !matches!(v, Value::Nil) {
    out.push(v.clone());
  }
  Ok(())
}

fn interleave(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  if args.is_empty() {
    return Ok(Value::empty_list());
  }
  Ok(lazy_interleave(args))
}

fn lazy_interleave(colls: Vec<Value>) -> Value {
  lazy(move || {
    let mut heads = Vec::with_capacity(colls.len());
    let mut tails = Vec::with_capacity(colls.len());
    for coll in &colls {
      match seq::seq_of(coll)? {
        Some(s) => {
          heads.push(seq::first(&s)?);
          tails.push(seq::rest(&s)?);
        }
        None => return Ok(Value::Nil),
      }
    }
    let mut result = lazy_interleave(tails);
    for head in heads.into_iter().rev() {
      result = seq::cons(head, result);
    }
    Ok(result)
  })
}

fn interpose(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("interpose", &args, 1, 2)?;
  let sep = args[0].clone();
  if args.len() == 1 {
    let first = Cell::new(true);
    let sep_for_xf = sep;
    return Ok(NativeClosure::new(
      "interpose-xf",
      move |_, xf_args| {
        let rf = xf_args
          .first()
          .cloned()
          .ok_or_else(|| Error::arity(0, "interpose"))?;
        let sep = sep_for_xf.clone();
        let first = Cell::new(first.get());
        Ok(NativeClosure::new(
          "interpose-rf",
          move |env, step_args| match step_args.len() {
            0 => apply(env, &rf, vec![]),
            1 => apply(env, &rf, step_args),
            2 => {
              let mut iter = step_args.into_iter();
              let acc = iter.next().unwrap();
              let item = iter.next().unwrap();
              if first.get() {
                first.set(false);
                apply(env, &rf, vec![acc, item])
              } else {
                let acc = apply(
                  env,
                  &rf,
                  vec![acc, sep.clone()],
                )?;
                if matches!(acc, Value::Reduced(_)) {
                  return Ok(acc);
                }
                apply(env, &rf, vec![acc, item])
              }
            }
            k => Err(Error::arity(k, "interpose step")),
          },
        ))
      },
    ));
  }
  Ok(lazy_interpose(sep, args[1].clone(), true))
}

fn lazy_interpose(sep: Value, coll: Value, first: bool) -> Value {
  lazy(move || match seq::seq_of(&coll)? {
    None => Ok(Value::Nil),
    Some(s) => {
      let head = seq::first(&s)?;
      let tail = seq::rest(&s)?;
      if first {
        Ok(seq::cons(
          head,
          lazy_interpose(sep.clone(), tail, false),
        ))
      } else {
        Ok(seq::cons(
          sep.clone(),
          seq::cons(
            head,
            lazy_interpose(sep.clone(), tail, false),
          ),
        ))
      }
    }
  })
}

//
// Realization and search
//

fn doall(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("doall", &args, 1, 2)?;
  let coll = args.last().unwrap();
  for item in seq::iter(coll) {
    item?;
  }
  Ok(coll.clone())
}

fn dorun(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("dorun", &args, 1, 2)?;
  for item in seq::iter(args.last().unwrap()) {
    item?;
  }
  Ok(Value::Nil)
}

fn every_p(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("every?", &args, 2)?;
  for item in seq::iter(&args[1]) {
    if !apply(env, &args[0], vec![item?])?.is_truthy() {
      return Ok(Value::Boolean(false));
    }
  }
  Ok(Value::Boolean(true))
}

fn not_every_p(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  let every = every_p(env, args)?;
  Ok(Value::Boolean(!every.is_truthy()))
}

fn some(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("some", &args, 2)?;
  for item in seq::iter(&args[1]) {
    let verdict = apply(env, &args[0], vec![item?])?;
    if verdict.is_truthy() {
      return Ok(verdict);
    }
  }
  Ok(Value::Nil)
}

fn not_any_p(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  let found = some(env, args)?;
  Ok(Value::Boolean(!found.is_truthy()))
}

//
// Sorting
//

fn comparator_order(
  env: &Rc<Env>,
  comparator: Option<&Value>,
  a: &Value,
  b: &Value,
) -> Result<Ordering> {
  match comparator {
    None => compare_values(a, b),
    Some(f) => {
      let verdict =
        apply(env, f, vec![a.clone(), b.clone()])?;
      match verdict {
        Value::Boolean(true) => Ok(Ordering::Less),
        Value::Boolean(false) => {
          let reverse =
            apply(env, f, vec![b.clone(), a.clone()])?;
          if reverse.is_truthy() {
            Ok(Ordering::Greater)
          } else {
            Ok(Ordering::Equal)
          }
        }
        n => {
          let sign = num::as_i64(&n)?;
          Ok(sign.cmp(&0))
        }
      }
    }
  }
}

fn sort_items(
  env: &Rc<Env>,
  comparator: Option<&Value>,
  mut items: Vec<Value>,
) -> Result<Vec<Value>> {
  let mut failure: Option<Error> = None;
  items.sort_by(|a, b| {
    if failure.is_some() {
      return Ordering::Equal;
    }
    match comparator_order(env, comparator, a, b) {
      Ok(order) => order,
      Err(e) => {
        failure = Some(e);
        Ordering::Equal
      }
    }
  });
  match failure {
    Some(e) => Err(e),
    None => Ok(items),
  }
}

fn sort(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("sort", &args, 1, 2)?;
  let (comparator, coll) = match args.len() {
    1 => (None, &args[0]),
    _ => (Some(&args[0]), &args[1]),
  };
  let items = seq::to_vec(coll)?;
  Ok(Value::list_from_vec(sort_items(
    env, comparator, items,
  )?))
}

fn sort_by(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("sort-by", &args, 2, 3)?;
  let keyfn = &args[0];
  let (comparator, coll) = match args.len() {
    2 => (None, &args[1]),
    _ => (Some(&args[1]), &args[2]),
  };
  let items = seq::to_vec(coll)?;
  let mut keyed: Vec<(Value, Value)> =
    Vec::with_capacity(items.len());
  for item in items {
    let k = apply(env, keyfn, vec![item.clone()])?;
    keyed.push((k, item));
  }
  let mut failure: Option<Error> = None;
  keyed.sort_by(|(ka, _), (kb, _)| {
    if failure.is_some() {
      return Ordering::Equal;
    }
    match comparator_order(env, comparator, ka, kb) {
      Ok(order) => order,
      Err(e) => {
        failure = Some(e);
        Ordering::Equal
      }
    }
  });
  match failure {
    Some(e) => Err(e),
    None => Ok(Value::list_from_vec(
      keyed.into_iter().map(|(_, v)| v).collect(),
    )),
  }
}

fn shuffle(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("shuffle", &args, 1)?;
  let mut items = seq::to_vec(&args[0])?;
  // Fisher–Yates with the env generator.
  for i in (1..items.len()).rev() {
    let j = (env.next_random() % (i as u64 + 1)) as usize;
    items.swap(i, j);
  }
  Ok(Value::vector(items))
}

fn rand_nth(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("rand-nth", &args, 1)?;
  let items = seq::to_vec(&args[0])?;
  if items.is_empty() {
    return Err(Error::lookup("rand-nth on an empty collection"));
  }
  let ix = (env.next_random() % items.len() as u64) as usize;
  Ok(items[ix].clone())
}

//
// reduced
//

fn reduced_fn(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("reduced", &args, 1)?;
  Ok(make_reduced(args[0].clone()))
}

fn reduced_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("reduced?", &args, 1)?;
  Ok(Value::Boolean(matches!(args[0], Value::Reduced(_))))
}

fn unreduced(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("unreduced", &args, 1)?;
  Ok(unwrap_reduced(args.into_iter().next().unwrap()))
}

fn ensure_reduced(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("ensure-reduced", &args, 1)?;
  let v = args.into_iter().next().unwrap();
  Ok(match v {
    Value::Reduced(_) => v,
    other => make_reduced(other),
  })
}

//
// Combinators
//

fn apply_builtin(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("apply", &args, 2)?;
  let f = args[0].clone();
  let (spread, middle) = args[1..].split_last().unwrap();
  let mut call_args = middle.to_vec();
  call_args.extend(seq::to_vec(spread)?);
  apply(env, &f, call_args)
}

fn identity(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("identity", &args, 1)?;
  Ok(args.into_iter().next().unwrap())
}

fn constantly(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("constantly", &args, 1)?;
  let v = args.into_iter().next().unwrap();
  Ok(NativeClosure::new("constantly", move |_, _| Ok(v.clone())))
}

fn comp(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  if args.is_empty() {
    return Ok(NativeClosure::new("identity", |_, call_args| {
      Ok(call_args.into_iter().next().unwrap_or(Value::Nil))
    }));
  }
  if args.len() == 1 {
    return Ok(args.into_iter().next().unwrap());
  }
  Ok(NativeClosure::new("comp", move |env, call_args| {
    let (innermost, outer) = args.split_last().unwrap();
    let mut result = apply(env, innermost, call_args)?;
    for f in outer.iter().rev() {
      result = apply(env, f, vec![result])?;
    }
    Ok(result)
  }))
}

fn partial(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("partial", &args, 1)?;
  Ok(NativeClosure::new("partial", move |env, call_args| {
    let mut full = args[1..].to_vec();
    full.extend(call_args);
    apply(env, &args[0], full)
  }))
}

fn complement(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("complement", &args, 1)?;
  let f = args.into_iter().next().unwrap();
  Ok(NativeClosure::new("complement", move |env, call_args| {
    let verdict = apply(env, &f, call_args)?;
    Ok(Value::Boolean(!verdict.is_truthy()))
  }))
}

fn juxt(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("juxt", &args, 1)?;
  Ok(NativeClosure::new("juxt", move |env, call_args| {
    let mut results = Vec::with_capacity(args.len());
    for f in &args {
      results.push(apply(env, f, call_args.clone())?);
    }
    Ok(Value::vector(results))
  }))
}

fn memoize(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("memoize", &args, 1)?;
  let f = args.into_iter().next().unwrap();
  let table: Rc<RefCell<im::HashMap<Value, Value>>> =
    Rc::new(RefCell::new(im::HashMap::new()));
  Ok(NativeClosure::new("memoize", move |env, call_args| {
    let key = Value::vector(call_args.clone());
    if let Some(cached) = table.borrow().get(&key) {
      return Ok(cached.clone());
    }
    let result = apply(env, &f, call_args)?;
    table.borrow_mut().insert(key, result.clone());
    Ok(result)
  }))
}

/// Calls f; while the result is itself a function, calls it with no
/// arguments.  Mutual recursion in constant stack.
fn trampoline(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("trampoline", &args, 1)?;
  let mut result =
    apply(env, &args[0], args[1..].to_vec())?;
  loop {
    match &result {
      Value::Fn(_) | Value::Builtin(_) | Value::NativeFn(_) => {
        result = apply(env, &result.clone(), vec![])?;
      }
      _ => return Ok(result),
    }
  }
}

fn fnil(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("fnil", &args, 2, 4)?;
  let f = args[0].clone();
  let defaults = args[1..].to_vec();
  Ok(NativeClosure::new("fnil", move |env, mut call_args| {
    for (ix, default) in defaults.iter().enumerate() {
      if let Some(slot) = call_args.get_mut(ix) {
        if matches!(slot, Value::Nil) {
          *slot = default.clone();
        }
      }
    }
    apply(env, &f, call_args)
  }))
}

fn every_pred(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("every-pred", &args, 1)?;
  Ok(NativeClosure::new("every-pred", move |env, call_args| {
    for pred in &args {
      for arg in &call_args {
        if !apply(env, pred, vec![arg.clone()])?.is_truthy() {
          return Ok(Value::Boolean(false));
        }
      }
    }
    Ok(Value::Boolean(true))
  }))
}

fn some_fn(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("some-fn", &args, 1)?;
  Ok(NativeClosure::new("some-fn", move |env, call_args| {
    for pred in &args {
      for arg in &call_args {
        let verdict = apply(env, pred, vec![arg.clone()])?;
        if verdict.is_truthy() {
          return Ok(verdict);
        }
      }
    }
    Ok(Value::Nil)
  }))
}

fn extreme_key(
  env: &Rc<Env>,
  args: Vec<Value>,
  keep: Ordering,
  name: &str,
) -> Result<Value> {
  at_least(name, &args, 2)?;
  let keyfn = &args[0];
  let mut best = args[1].clone();
  let mut best_key = apply(env, keyfn, vec![best.clone()])?;
  for candidate in &args[2..] {
    let k = apply(env, keyfn, vec![candidate.clone()])?;
    // Ties keep the later argument.
    let order = num::compare(&k, &best_key)?;
    if order == keep || order == Ordering::Equal {
      best = candidate.clone();
      best_key = k;
    }
  }
  Ok(best)
}

fn max_key(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  extreme_key(env, args, Ordering::Greater, "max-key")
}

fn min_key(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  extreme_key(env, args, Ordering::Less, "min-key")
}
