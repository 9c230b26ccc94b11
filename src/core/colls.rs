// core/colls.rs
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

//! Collection builtins: constructors, lookup, update, and predicates.

use std::rc::Rc;

use crate::{
  env::{Env, Namespace},
  error::{Error, Result},
  value::{
    list::PList,
    map::{PMap, PSet},
    num, seq, Value,
  },
};

use super::{at_least, between, def_builtin, exact};

pub fn install(core: &Namespace) {
  def_builtin(core, "list", list);
  def_builtin(core, "vector", vector);
  def_builtin(core, "vec", vec_of);
  def_builtin(core, "hash-map", hash_map);
  def_builtin(core, "array-map", hash_map);
  def_builtin(core, "hash-set", hash_set);
  def_builtin(core, "set", set_of);
  def_builtin(core, "first", first);
  def_builtin(core, "rest", rest);
  def_builtin(core, "next", next);
  def_builtin(core, "seq", seq_builtin);
  def_builtin(core, "cons", cons);
  def_builtin(core, "conj", conj);
  def_builtin(core, "disj", disj);
  def_builtin(core, "peek", peek);
  def_builtin(core, "pop", pop);
  def_builtin(core, "nth", nth);
  def_builtin(core, "count", count);
  def_builtin(core, "empty?", empty_p);
  def_builtin(core, "empty", empty);
  def_builtin(core, "not-empty", not_empty);
  def_builtin(core, "counted?", counted_p);
  def_builtin(core, "get", get);
  def_builtin(core, "get-in", get_in);
  def_builtin(core, "assoc", assoc);
  def_builtin(core, "assoc-in", assoc_in);
  def_builtin(core, "update", update);
  def_builtin(core, "update-in", update_in);
  def_builtin(core, "dissoc", dissoc);
  def_builtin(core, "select-keys", select_keys);
  def_builtin(core, "find", find);
  def_builtin(core, "key", key);
  def_builtin(core, "val", val);
  def_builtin(core, "keys", keys);
  def_builtin(core, "vals", vals);
  def_builtin(core, "merge", merge);
  def_builtin(core, "merge-with", merge_with);
  def_builtin(core, "zipmap", zipmap);
  def_builtin(core, "contains?", contains_p);
  def_builtin(core, "second", second);
  def_builtin(core, "ffirst", ffirst);
  def_builtin(core, "last", last);
  def_builtin(core, "butlast", butlast);
  def_builtin(core, "nthrest", nthrest);
  def_builtin(core, "nthnext", nthnext);
  def_builtin(core, "reverse", reverse);
  def_builtin(core, "list*", list_star);
  def_builtin(core, "chunk-first", chunk_first);
  def_builtin(core, "chunk-rest", chunk_rest);
  def_builtin(core, "chunk-next", chunk_next);
  def_builtin(core, "chunked-seq?", chunked_seq_p);
  // Predicates
  def_builtin(core, "not", not);
  def_builtin(core, "boolean", boolean);
  def_builtin(core, "nil?", nil_p);
  def_builtin(core, "some?", some_p);
  def_builtin(core, "any?", any_p);
  def_builtin(core, "true?", true_p);
  def_builtin(core, "false?", false_p);
  def_builtin(core, "string?", string_p);
  def_builtin(core, "char?", char_p);
  def_builtin(core, "boolean?", boolean_p);
  def_builtin(core, "symbol?", symbol_p);
  def_builtin(core, "keyword?", keyword_p);
  def_builtin(core, "list?", list_p);
  def_builtin(core, "vector?", vector_p);
  def_builtin(core, "map?", map_p);
  def_builtin(core, "set?", set_p);
  def_builtin(core, "seq?", seq_p);
  def_builtin(core, "sequential?", sequential_p);
  def_builtin(core, "coll?", coll_p);
  def_builtin(core, "associative?", associative_p);
  def_builtin(core, "indexed?", indexed_p);
  def_builtin(core, "fn?", fn_p);
  def_builtin(core, "ifn?", ifn_p);
  def_builtin(core, "inst?", inst_p);
}

fn list(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  Ok(Value::list_from_vec(args))
}

fn vector(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  Ok(Value::vector(args))
}

fn vec_of(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("vec", &args, 1)?;
  match &args[0] {
    Value::Vector(_) => Ok(args[0].clone()),
    other => Ok(Value::vector(seq::to_vec(other)?)),
  }
}

fn hash_map(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  if args.len() % 2 != 0 {
    return Err(Error::illegal_argument(
      "hash-map needs an even number of arguments",
    ));
  }
  let pairs = args
    .chunks(2)
    .map(|pair| (pair[0].clone(), pair[1].clone()))
    .collect();
  Ok(Value::map_from_pairs(pairs))
}

fn hash_set(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  Ok(Value::set_from_vec(args))
}

fn set_of(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("set", &args, 1)?;
  match &args[0] {
    Value::Set(_) => Ok(args[0].clone()),
    other => Ok(Value::set_from_vec(seq::to_vec(other)?)),
  }
}

fn first(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("first", &args, 1)?;
  seq::first(&args[0])
}

fn rest(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("rest", &args, 1)?;
  seq::rest(&args[0])
}

fn next(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("next", &args, 1)?;
  Ok(seq::next_of(&args[0])?.unwrap_or(Value::Nil))
}

fn seq_builtin(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("seq", &args, 1)?;
  Ok(seq::seq_of(&args[0])?.unwrap_or(Value::Nil))
}

fn cons(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("cons", &args, 2)?;
  Ok(seq::cons(args[0].clone(), args[1].clone()))
}

fn conj_one(coll: &Value, item: Value) -> Result<Value> {
  match coll {
    Value::Nil => Ok(Value::list_from_vec(vec![item])),
    Value::List(l) => {
      Ok(Value::List(Rc::new(PList::cons(item, l.clone()))))
    }
    Value::Vector(v) => Ok(Value::Vector(Rc::new(v.conj(item)))),
    Value::Set(s) => Ok(Value::Set(Rc::new(s.conj(item)))),
    Value::Map(m) => match &item {
      Value::Vector(entry) if entry.len() == 2 => {
        Ok(Value::Map(Rc::new(m.assoc(
          entry.get(0).unwrap().clone(),
          entry.get(1).unwrap().clone(),
        ))))
      }
      Value::Map(other) => {
        let mut merged = m.as_ref().clone();
        for (k, v) in other.entries() {
          merged = merged.assoc(k.clone(), v.clone());
        }
        Ok(Value::Map(Rc::new(merged)))
      }
      _ => Err(Error::illegal_argument(
        "conj on a map needs a map entry or a map",
      )),
    },
    Value::Cons(_) | Value::Chunked(_) | Value::LazySeq(_) => {
      Ok(seq::cons(item, coll.clone()))
    }
    other => Err(Error::type_error(format!(
      "conj not supported on {}",
      other.type_name()
    ))),
  }
}

fn conj(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  if args.is_empty() {
    return Ok(Value::vector(vec![]));
  }
  let mut iter = args.into_iter();
  let mut coll = iter.next().unwrap();
  for item in iter {
    coll = conj_one(&coll, item)?;
  }
  Ok(coll)
}

fn disj(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("disj", &args, 1)?;
  match &args[0] {
    Value::Set(s) => {
      let mut set = s.as_ref().clone();
      for item in &args[1..] {
        set = set.disj(item);
      }
      Ok(Value::Set(Rc::new(set)))
    }
    Value::Nil => Ok(Value::Nil),
    other => Err(Error::type_error(format!(
      "disj needs a set, got {}",
      other.type_name()
    ))),
  }
}

fn peek(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("peek", &args, 1)?;
  match &args[0] {
    Value::Nil => Ok(Value::Nil),
    Value::List(l) => Ok(l.first().cloned().unwrap_or(Value::Nil)),
    Value::Vector(v) => Ok(v.peek().cloned().unwrap_or(Value::Nil)),
    other => Err(Error::type_error(format!(
      "peek not supported on {}",
      other.type_name()
    ))),
  }
}

fn pop(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("pop", &args, 1)?;
  match &args[0] {
    Value::List(l) => match l.rest() {
      Some(tail) => Ok(Value::List(tail.clone())),
      None => Err(Error::lookup("cannot pop an empty list")),
    },
    Value::Vector(v) => Ok(Value::Vector(Rc::new(v.pop()?))),
    other => Err(Error::type_error(format!(
      "pop not supported on {}",
      other.type_name()
    ))),
  }
}

fn nth(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("nth", &args, 2, 3)?;
  let ix = num::as_i64(&args[1])?;
  match &args[0] {
    Value::Vector(v) => match v.nth(ix) {
      Ok(value) => Ok(value.clone()),
      Err(e) => args.get(2).cloned().ok_or(e),
    },
    Value::Str(s) => {
      match usize::try_from(ix)
        .ok()
        .and_then(|ix| s.chars().nth(ix))
      {
        Some(c) => Ok(Value::Char(c)),
        None => args.get(2).cloned().ok_or_else(|| {
          Error::lookup(format!("index {} out of bounds", ix))
        }),
      }
    }
    Value::Nil => {
      Ok(args.get(2).cloned().unwrap_or(Value::Nil))
    }
    seqish => {
      if ix < 0 {
        return args.get(2).cloned().ok_or_else(|| {
          Error::lookup(format!("index {} out of bounds", ix))
        });
      }
      let mut remaining = ix;
      for item in seq::iter(seqish) {
        let item = item?;
        if remaining == 0 {
          return Ok(item);
        }
        remaining -= 1;
      }
      args.get(2).cloned().ok_or_else(|| {
        Error::lookup(format!("index {} out of bounds", ix))
      })
    }
  }
}

fn count(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("count", &args, 1)?;
  Ok(Value::Int(args[0].count_value()? as i64))
}

fn empty_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("empty?", &args, 1)?;
  Ok(Value::Boolean(seq::seq_of(&args[0])?.is_none()))
}

fn empty(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("empty", &args, 1)?;
  Ok(match &args[0] {
    Value::List(_) | Value::Cons(_) | Value::Chunked(_)
    | Value::LazySeq(_) => Value::empty_list(),
    Value::Vector(_) => Value::vector(vec![]),
    Value::Map(_) => Value::Map(Rc::new(PMap::empty())),
    Value::Set(_) => Value::Set(Rc::new(PSet::empty())),
    _ => Value::Nil,
  })
}

fn not_empty(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("not-empty", &args, 1)?;
  if seq::seq_of(&args[0])?.is_none() {
    Ok(Value::Nil)
  } else {
    Ok(args[0].clone())
  }
}

fn counted_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("counted?", &args, 1)?;
  Ok(Value::Boolean(matches!(
    args[0],
    Value::List(_) | Value::Vector(_) | Value::Map(_) | Value::Set(_)
  )))
}

fn get(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("get", &args, 2, 3)?;
  Ok(
    args[0]
      .lookup(&args[1])?
      .or_else(|| args.get(2).cloned())
      .unwrap_or(Value::Nil),
  )
}

fn get_in(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("get-in", &args, 2, 3)?;
  let mut current = args[0].clone();
  for k in seq::iter(&args[1]) {
    let k = k?;
    match current.lookup(&k)? {
      Some(next) => current = next,
      None => {
        return Ok(args.get(2).cloned().unwrap_or(Value::Nil));
      }
    }
  }
  Ok(current)
}

fn assoc_one(coll: &Value, k: Value, v: Value) -> Result<Value> {
  match coll {
    Value::Nil => Ok(Value::map_from_pairs(vec![(k, v)])),
    Value::Map(m) => Ok(Value::Map(Rc::new(m.assoc(k, v)))),
    Value::Vector(vec) => {
      let ix = num::as_i64(&k)?;
      Ok(Value::Vector(Rc::new(vec.assoc(ix, v)?)))
    }
    other => Err(Error::type_error(format!(
      "assoc not supported on {}",
      other.type_name()
    ))),
  }
}

fn assoc(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("assoc", &args, 3)?;
  if (args.len() - 1) % 2 != 0 {
    return Err(Error::illegal_argument(
      "assoc needs key/value pairs",
    ));
  }
  let mut coll = args[0].clone();
  for pair in args[1..].chunks(2) {
    coll = assoc_one(&coll, pair[0].clone(), pair[1].clone())?;
  }
  Ok(coll)
}

fn assoc_in(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("assoc-in", &args, 3)?;
  let path = seq::to_vec(&args[1])?;
  assoc_in_path(env, &args[0], &path, args[2].clone())
}

fn assoc_in_path(
  env: &Rc<Env>,
  coll: &Value,
  path: &[Value],
  value: Value,
) -> Result<Value> {
  match path {
    [] => Ok(value),
    [k] => assoc_one(coll, k.clone(), value),
    [k, rest @ ..] => {
      let inner = coll.lookup(k)?.unwrap_or(Value::Nil);
      let updated = assoc_in_path(env, &inner, rest, value)?;
      assoc_one(coll, k.clone(), updated)
    }
  }
}

fn update(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("update", &args, 3)?;
  let current = args[0].lookup(&args[1])?.unwrap_or(Value::Nil);
  let mut call_args = vec![current];
  call_args.extend(args[3..].iter().cloned());
  let next = crate::eval::apply(env, &args[2], call_args)?;
  assoc_one(&args[0], args[1].clone(), next)
}

fn update_in(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("update-in", &args, 3)?;
  let path = seq::to_vec(&args[1])?;
  if path.is_empty() {
    return Err(Error::illegal_argument(
      "update-in needs a non-empty path",
    ));
  }
  update_in_path(env, &args[0], &path, &args[2], &args[3..])
}

fn update_in_path(
  env: &Rc<Env>,
  coll: &Value,
  path: &[Value],
  f: &Value,
  extra: &[Value],
) -> Result<Value> {
  match path {
    [k] => {
      let current = coll.lookup(k)?.unwrap_or(Value::Nil);
      let mut call_args = vec![current];
      call_args.extend(extra.iter().cloned());
      let next = crate::eval::apply(env, f, call_args)?;
      assoc_one(coll, k.clone(), next)
    }
    [k, rest @ ..] => {
      let inner = coll.lookup(k)?.unwrap_or(Value::Nil);
      let updated = update_in_path(env, &inner, rest, f, extra)?;
      assoc_one(coll, k.clone(), updated)
    }
    [] => unreachable!("checked above"),
  }
}

fn dissoc(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("dissoc", &args, 1)?;
  match &args[0] {
    Value::Nil => Ok(Value::Nil),
    Value::Map(m) => {
      let mut map = m.as_ref().clone();
      for k in &args[1..] {
        map = map.dissoc(k);
      }
      Ok(Value::Map(Rc::new(map)))
    }
    other => Err(Error::type_error(format!(
      "dissoc needs a map, got {}",
      other.type_name()
    ))),
  }
}

fn select_keys(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("select-keys", &args, 2)?;
  let mut pairs = Vec::new();
  for k in seq::iter(&args[1]) {
    let k = k?;
    if let Some(v) = args[0].lookup(&k)? {
      pairs.push((k, v));
    }
  }
  Ok(Value::map_from_pairs(pairs))
}

fn find(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("find", &args, 2)?;
  Ok(match args[0].lookup(&args[1])? {
    Some(v) => Value::vector(vec![args[1].clone(), v]),
    None => Value::Nil,
  })
}

fn key(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("key", &args, 1)?;
  seq::first(&args[0])
}

fn val(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("val", &args, 1)?;
  match &args[0] {
    Value::Vector(v) if v.len() == 2 => {
      Ok(v.get(1).cloned().unwrap_or(Value::Nil))
    }
    other => seq::first(&seq::rest(other)?),
  }
}

fn keys(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("keys", &args, 1)?;
  match &args[0] {
    Value::Nil => Ok(Value::Nil),
    Value::Map(m) => {
      if m.is_empty() {
        return Ok(Value::Nil);
      }
      Ok(Value::list_from_vec(
        m.entries().map(|(k, _)| k.clone()).collect(),
      ))
    }
    other => Err(Error::type_error(format!(
      "keys needs a map, got {}",
      other.type_name()
    ))),
  }
}

fn vals(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("vals", &args, 1)?;
  match &args[0] {
    Value::Nil => Ok(Value::Nil),
    Value::Map(m) => {
      if m.is_empty() {
        return Ok(Value::Nil);
      }
      Ok(Value::list_from_vec(
        m.entries().map(|(_, v)| v.clone()).collect(),
      ))
    }
    other => Err(Error::type_error(format!(
      "vals needs a map, got {}",
      other.type_name()
    ))),
  }
}

fn merge(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  if args.iter().all(|a| matches!(a, Value::Nil)) {
    return Ok(Value::Nil);
  }
  let mut merged = PMap::empty();
  for arg in &args {
    match arg {
      Value::Nil => (),
      Value::Map(m) => {
        for (k, v) in m.entries() {
          merged = merged.assoc(k.clone(), v.clone());
        }
      }
      other => {
        return Err(Error::type_error(format!(
          "merge needs maps, got {}",
          other.type_name()
        )));
      }
    }
  }
  Ok(Value::Map(Rc::new(merged)))
}

fn merge_with(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("merge-with", &args, 1)?;
  if args[1..].iter().all(|a| matches!(a, Value::Nil)) {
    return Ok(Value::Nil);
  }
  let f = &args[0];
  let mut merged = PMap::empty();
  for arg in &args[1..] {
    match arg {
      Value::Nil => (),
      Value::Map(m) => {
        for (k, v) in m.entries() {
          let next = match merged.get(k) {
            Some(existing) => crate::eval::apply(
              env,
              f,
              vec![existing.clone(), v.clone()],
            )?,
            None => v.clone(),
          };
          merged = merged.assoc(k.clone(), next);
        }
      }
      other => {
        return Err(Error::type_error(format!(
          "merge-with needs maps, got {}",
          other.type_name()
        )));
      }
    }
  }
  Ok(Value::Map(Rc::new(merged)))
}

fn zipmap(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("zipmap", &args, 2)?;
  let keys = seq::to_vec(&args[0])?;
  let vals = seq::to_vec(&args[1])?;
  Ok(Value::map_from_pairs(
    keys.into_iter().zip(vals).collect(),
  ))
}

fn contains_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("contains?", &args, 2)?;
  Ok(Value::Boolean(match &args[0] {
    Value::Nil => false,
    Value::Map(m) => m.contains_key(&args[1]),
    Value::Set(s) => s.contains(&args[1]),
    Value::Vector(v) => match &args[1] {
      Value::Int(i) => {
        *i >= 0 && (*i as usize) < v.len()
      }
      _ => false,
    },
    Value::Str(s) => match &args[1] {
      Value::Int(i) => {
        *i >= 0 && (*i as usize) < s.chars().count()
      }
      _ => false,
    },
    other => {
      return Err(Error::illegal_argument(format!(
        "contains? not supported on {}",
        other.type_name()
      )));
    }
  }))
}

fn second(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("second", &args, 1)?;
  seq::first(&seq::rest(&args[0])?)
}

fn ffirst(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("ffirst", &args, 1)?;
  seq::first(&seq::first(&args[0])?)
}

fn last(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("last", &args, 1)?;
  let mut result = Value::Nil;
  for item in seq::iter(&args[0]) {
    result = item?;
  }
  Ok(result)
}

fn butlast(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("butlast", &args, 1)?;
  let mut items = seq::to_vec(&args[0])?;
  if items.len() <= 1 {
    return Ok(Value::Nil);
  }
  items.pop();
  Ok(Value::list_from_vec(items))
}

fn nthrest(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("nthrest", &args, 2)?;
  let n = num::as_i64(&args[1])?;
  let mut current = args[0].clone();
  for _ in 0..n {
    match seq::seq_of(&current)? {
      Some(s) => current = seq::rest(&s)?,
      None => return Ok(current),
    }
  }
  Ok(current)
}

fn nthnext(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("nthnext", &args, 2)?;
  let n = num::as_i64(&args[1])?;
  let mut current = seq::seq_of(&args[0])?;
  for _ in 0..n {
    current = match current {
      Some(s) => seq::next_of(&s)?,
      None => return Ok(Value::Nil),
    };
  }
  Ok(current.unwrap_or(Value::Nil))
}

fn reverse(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("reverse", &args, 1)?;
  let mut items = seq::to_vec(&args[0])?;
  items.reverse();
  Ok(Value::list_from_vec(items))
}

fn list_star(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("list*", &args, 1)?;
  let (tail, heads) = args.split_last().unwrap();
  let mut items = seq::to_vec(tail)?;
  let mut all = heads.to_vec();
  all.append(&mut items);
  if all.is_empty() {
    return Ok(Value::Nil);
  }
  Ok(Value::list_from_vec(all))
}

fn chunk_first(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("chunk-first", &args, 1)?;
  seq::chunk_first(&args[0])
}

fn chunk_rest(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("chunk-rest", &args, 1)?;
  seq::chunk_rest(&args[0])
}

fn chunk_next(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("chunk-next", &args, 1)?;
  let rest = seq::chunk_rest(&args[0])?;
  Ok(seq::seq_of(&rest)?.unwrap_or(Value::Nil))
}

fn chunked_seq_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("chunked-seq?", &args, 1)?;
  Ok(Value::Boolean(seq::is_chunked(&args[0])))
}

//
// Predicates
//

fn not(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("not", &args, 1)?;
  Ok(Value::Boolean(!args[0].is_truthy()))
}

fn boolean(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("boolean", &args, 1)?;
  Ok(Value::Boolean(args[0].is_truthy()))
}

fn nil_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("nil?", &args, 1)?;
  Ok(Value::Boolean(matches!(args[0], Value::Nil)))
}

fn some_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("some?", &args, 1)?;
  Ok(Value::Boolean(!matches!(args[0], Value::Nil)))
}

fn any_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("any?", &args, 1)?;
  Ok(Value::Boolean(true))
}

fn true_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("true?", &args, 1)?;
  Ok(Value::Boolean(matches!(args[0], Value::Boolean(true))))
}

fn false_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("false?", &args, 1)?;
  Ok(Value::Boolean(matches!(args[0], Value::Boolean(false))))
}

fn string_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("string?", &args, 1)?;
  Ok(Value::Boolean(matches!(args[0], Value::Str(_))))
}

fn char_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("char?", &args, 1)?;
  Ok(Value::Boolean(matches!(args[0], Value::Char(_))))
}

fn boolean_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("boolean?", &args, 1)?;
  Ok(Value::Boolean(matches!(args[0], Value::Boolean(_))))
}

fn symbol_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("symbol?", &args, 1)?;
  Ok(Value::Boolean(matches!(args[0], Value::Symbol(_))))
}

fn keyword_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("keyword?", &args, 1)?;
  Ok(Value::Boolean(matches!(args[0], Value::Keyword(_))))
}

fn list_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("list?", &args, 1)?;
  Ok(Value::Boolean(matches!(args[0], Value::List(_))))
}

fn vector_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("vector?", &args, 1)?;
  Ok(Value::Boolean(matches!(args[0], Value::Vector(_))))
}

fn map_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("map?", &args, 1)?;
  Ok(Value::Boolean(matches!(args[0], Value::Map(_))))
}

fn set_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("set?", &args, 1)?;
  Ok(Value::Boolean(matches!(args[0], Value::Set(_))))
}

fn seq_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("seq?", &args, 1)?;
  Ok(Value::Boolean(args[0].is_seq()))
}

fn sequential_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("sequential?", &args, 1)?;
  Ok(Value::Boolean(args[0].is_sequential()))
}

fn coll_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("coll?", &args, 1)?;
  Ok(Value::Boolean(args[0].is_coll()))
}

fn associative_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("associative?", &args, 1)?;
  Ok(Value::Boolean(matches!(
    args[0],
    Value::Map(_) | Value::Vector(_)
  )))
}

fn indexed_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("indexed?", &args, 1)?;
  Ok(Value::Boolean(matches!(args[0], Value::Vector(_))))
}

fn fn_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("fn?", &args, 1)?;
  Ok(Value::Boolean(matches!(
    args[0],
    Value::Fn(_)
      | Value::Builtin(_)
      | Value::NativeFn(_)
      | Value::MultiFn(_)
  )))
}

fn ifn_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("ifn?", &args, 1)?;
  Ok(Value::Boolean(args[0].is_ifn()))
}

fn inst_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("inst?", &args, 1)?;
  // No host date type in the core.
  Ok(Value::Boolean(false))
}
