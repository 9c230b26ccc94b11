// value/seq.rs
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

//! The seq abstraction: `first`/`rest`/`next`/`seq` over every collection,
//! cons cells, chunked conses, and lazy seqs that realize at most once.

use std::cell::RefCell;
use std::rc::Rc;

use crate::{
  env::Env,
  error::{Error, Result},
  value::{list::PList, Value},
};

/// Chunk granularity of chunked seqs over indexed collections.
pub const CHUNK_SIZE: usize = 32;

#[derive(Clone, Debug)]
pub struct ConsCell {
  pub first: Value,
  pub rest: Value,
  pub meta: Option<Rc<Value>>,
}

/// A seq view over a block of up to [`CHUNK_SIZE`] items plus the rest of
/// the sequence.  `doseq` walks the chunk by index before touching `more`.
#[derive(Clone, Debug)]
pub struct ChunkedCons {
  pub chunk: Rc<Vec<Value>>,
  pub offset: usize,
  pub more: Value,
  pub meta: Option<Rc<Value>>,
}

pub struct LazySeqCell {
  state: RefCell<LazyState>,
}

enum LazyState {
  /// Thunk implemented in Rust.
  Native(Option<Box<dyn FnOnce() -> Result<Value>>>),
  /// Thunk written in the language itself; carries the environment it
  /// needs to run under.
  Thunk { env: Rc<Env>, f: Value },
  /// Realization underway; hit again only on a self-referential seq.
  InProgress,
  /// The settled seq (or nil); all later queries forward here.
  Realized(Value),
}

impl std::fmt::Debug for LazySeqCell {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = match &*self.state.borrow() {
      LazyState::Native(_) => "native-pending",
      LazyState::Thunk { .. } => "pending",
      LazyState::InProgress => "in-progress",
      LazyState::Realized(_) => "realized",
    };
    write!(f, "LazySeqCell({})", state)
  }
}

impl LazySeqCell {
  pub fn native(
    thunk: impl FnOnce() -> Result<Value> + 'static,
  ) -> Self {
    Self {
      state: RefCell::new(LazyState::Native(Some(Box::new(thunk)))),
    }
  }

  pub fn from_fn(env: Rc<Env>, f: Value) -> Self {
    Self {
      state: RefCell::new(LazyState::Thunk { env, f }),
    }
  }

  pub fn is_realized(&self) -> bool {
    matches!(&*self.state.borrow(), LazyState::Realized(_))
  }

  /// Runs the thunk if it has not run yet and returns the settled seq
  /// value (or nil).  Nested unrealized lazy seqs are walked through.
  pub fn force(&self) -> Result<Value> {
    {
      let state = self.state.borrow();
      if let LazyState::Realized(v) = &*state {
        return Ok(v.clone());
      }
      if let LazyState::InProgress = &*state {
        return Err(Error::illegal_argument(
          "lazy seq realizes itself recursively",
        ));
      }
    }
    let taken =
      std::mem::replace(&mut *self.state.borrow_mut(), LazyState::InProgress);
    let produced = match taken {
      LazyState::Native(thunk) => match thunk {
        Some(thunk) => thunk(),
        None => Err(Error::illegal_argument("lazy seq thunk vanished")),
      },
      LazyState::Thunk { env, f } => {
        crate::eval::apply(&env, &f, Vec::new())
      }
      // Both handled above while the borrow was alive.
      LazyState::InProgress | LazyState::Realized(_) => unreachable!(),
    };
    let produced = match produced {
      Ok(v) => v,
      Err(e) => {
        // Leave the cell poisoned as in-progress; the error propagates.
        return Err(e);
      }
    };
    let settled = match seq_of(&produced)? {
      Some(s) => s,
      None => Value::Nil,
    };
    *self.state.borrow_mut() = LazyState::Realized(settled.clone());
    Ok(settled)
  }
}

/// The seq view of any seq-able value: the seq itself, or `None` when the
/// collection is empty.
pub fn seq_of(v: &Value) -> Result<Option<Value>> {
  match v {
    Value::Nil => Ok(None),
    Value::List(list) => {
      if list.is_empty() {
        Ok(None)
      } else {
        Ok(Some(v.clone()))
      }
    }
    Value::Cons(_) => Ok(Some(v.clone())),
    Value::Chunked(_) => Ok(Some(v.clone())),
    Value::LazySeq(cell) => {
      let settled = cell.force()?;
      match settled {
        Value::Nil => Ok(None),
        other => Ok(Some(other)),
      }
    }
    Value::Vector(vector) => {
      if vector.is_empty() {
        Ok(None)
      } else {
        Ok(Some(chunked_over(vector.items().clone(), 0)))
      }
    }
    Value::Map(map) => {
      if map.is_empty() {
        Ok(None)
      } else {
        let entries: Vec<Value> = map
          .entries()
          .map(|(k, v)| Value::vector(vec![k.clone(), v.clone()]))
          .collect();
        Ok(Some(Value::List(Rc::new(PList::from_vec(entries)))))
      }
    }
    Value::Set(set) => {
      if set.is_empty() {
        Ok(None)
      } else {
        let items: Vec<Value> = set.iter().cloned().collect();
        Ok(Some(Value::List(Rc::new(PList::from_vec(items)))))
      }
    }
    Value::Str(s) => {
      if s.is_empty() {
        Ok(None)
      } else {
        let chars: im::Vector<Value> =
          s.chars().map(Value::Char).collect();
        Ok(Some(chunked_over(chars, 0)))
      }
    }
    other => Err(Error::illegal_argument(format!(
      "don't know how to create a seq from {}",
      other.type_name()
    ))),
  }
}

/// Chunked seq over an indexed source starting at `from`.
fn chunked_over(items: im::Vector<Value>, from: usize) -> Value {
  let upto = (from + CHUNK_SIZE).min(items.len());
  let chunk: Vec<Value> =
    items.iter().skip(from).take(upto - from).cloned().collect();
  let more = if upto < items.len() {
    let rest_items = items.clone();
    Value::LazySeq(Rc::new(LazySeqCell::native(move || {
      Ok(chunked_over(rest_items, upto))
    })))
  } else {
    Value::empty_list()
  };
  Value::Chunked(Rc::new(ChunkedCons {
    chunk: Rc::new(chunk),
    offset: 0,
    more,
    meta: None,
  }))
}

pub fn first(v: &Value) -> Result<Value> {
  match seq_of(v)? {
    None => Ok(Value::Nil),
    Some(s) => match &s {
      Value::List(list) => {
        Ok(list.first().cloned().unwrap_or(Value::Nil))
      }
      Value::Cons(cell) => Ok(cell.first.clone()),
      Value::Chunked(cc) => {
        Ok(cc.chunk.get(cc.offset).cloned().unwrap_or(Value::Nil))
      }
      _ => unreachable!("seq_of returned a non-seq"),
    },
  }
}

/// Always a seq-able value, possibly the empty list.
pub fn rest(v: &Value) -> Result<Value> {
  match seq_of(v)? {
    None => Ok(Value::empty_list()),
    Some(s) => match &s {
      Value::List(list) => match list.rest() {
        Some(tail) => Ok(Value::List(tail.clone())),
        None => Ok(Value::empty_list()),
      },
      Value::Cons(cell) => {
        // The stored rest may be any seq-able collection; the view
        // handed out is always a seq.
        if cell.rest.is_seq() {
          Ok(cell.rest.clone())
        } else {
          Ok(seq_of(&cell.rest)?.unwrap_or_else(Value::empty_list))
        }
      }
      Value::Chunked(cc) => {
        if cc.offset + 1 < cc.chunk.len() {
          Ok(Value::Chunked(Rc::new(ChunkedCons {
            chunk: cc.chunk.clone(),
            offset: cc.offset + 1,
            more: cc.more.clone(),
            meta: None,
          })))
        } else {
          Ok(cc.more.clone())
        }
      }
      _ => unreachable!("seq_of returned a non-seq"),
    },
  }
}

/// `rest` then `seq`: the tail seq or `None` when exhausted.
pub fn next_of(v: &Value) -> Result<Option<Value>> {
  let r = rest(v)?;
  seq_of(&r)
}

pub fn cons(first: Value, rest: Value) -> Value {
  Value::Cons(Rc::new(ConsCell {
    first,
    rest,
    meta: None,
  }))
}

//
// Chunk access, for the chunk-aware loops.
//

pub fn is_chunked(v: &Value) -> bool {
  matches!(v, Value::Chunked(_))
}

/// The remaining items of the current chunk, as an indexed collection.
pub fn chunk_first(v: &Value) -> Result<Value> {
  match v {
    Value::Chunked(cc) => {
      Ok(Value::vector(cc.chunk[cc.offset..].to_vec()))
    }
    _ => Err(Error::type_error("chunk-first needs a chunked seq")),
  }
}

pub fn chunk_rest(v: &Value) -> Result<Value> {
  match v {
    Value::Chunked(cc) => Ok(cc.more.clone()),
    _ => Err(Error::type_error("chunk-rest needs a chunked seq")),
  }
}

/// An iterator that walks any seq-able value, realizing lazily as it
/// goes.  Infinite seqs yield forever; callers bound their consumption.
pub struct SeqIter {
  current: Option<Value>,
  failed: bool,
}

impl std::fmt::Debug for SeqIter {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("SeqIter")
  }
}

pub fn iter(v: &Value) -> SeqIter {
  SeqIter {
    current: Some(v.clone()),
    failed: false,
  }
}

impl Iterator for SeqIter {
  type Item = Result<Value>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.failed {
      return None;
    }
    let current = self.current.take()?;
    match seq_of(&current) {
      Ok(None) => None,
      Ok(Some(s)) => {
        let head = match first(&s) {
          Ok(head) => head,
          Err(e) => {
            self.failed = true;
            return Some(Err(e));
          }
        };
        match rest(&s) {
          Ok(tail) => self.current = Some(tail),
          Err(e) => {
            self.failed = true;
            return Some(Err(e));
          }
        }
        Some(Ok(head))
      }
      Err(e) => {
        self.failed = true;
        Some(Err(e))
      }
    }
  }
}

/// Realizes a whole (finite) seq into a vec.
pub fn to_vec(v: &Value) -> Result<Vec<Value>> {
  iter(v).collect()
}

/// Counts by walking; the caller handles the O(1) collection cases.
pub fn count(v: &Value) -> Result<usize> {
  let mut n = 0;
  for item in iter(v) {
    item?;
    n += 1;
  }
  Ok(n)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cons_then_first_and_rest() {
    let s = cons(Value::Int(1), Value::empty_list());
    assert_eq!(first(&s).unwrap(), Value::Int(1));
    assert_eq!(seq_of(&rest(&s).unwrap()).unwrap(), None);
  }

  #[test]
  fn vector_seq_is_chunked() {
    let items: Vec<Value> = (0..40).map(Value::Int).collect();
    let v = Value::vector(items);
    let s = seq_of(&v).unwrap().unwrap();
    assert!(is_chunked(&s));
    let chunk = chunk_first(&s).unwrap();
    match &chunk {
      Value::Vector(pv) => assert_eq!(pv.len(), CHUNK_SIZE),
      _ => panic!("chunk-first should give a vector"),
    }
    let collected = to_vec(&v).unwrap();
    assert_eq!(collected.len(), 40);
    assert_eq!(collected[39], Value::Int(39));
  }

  #[test]
  fn lazy_seq_realizes_once() {
    use std::cell::Cell;
    let runs = Rc::new(Cell::new(0));
    let counter = runs.clone();
    let cell = Rc::new(LazySeqCell::native(move || {
      counter.set(counter.get() + 1);
      Ok(cons(Value::Int(42), Value::empty_list()))
    }));
    let lazy = Value::LazySeq(cell);
    assert_eq!(first(&lazy).unwrap(), Value::Int(42));
    assert_eq!(first(&lazy).unwrap(), Value::Int(42));
    assert_eq!(runs.get(), 1);
  }
}
