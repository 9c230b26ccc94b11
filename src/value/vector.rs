// value/vector.rs
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

//! The persistent vector: an RRB tree underneath, so `nth`, `conj`, and
//! `assoc` at an index are all effectively logarithmic and clones share
//! structure.

use std::cell::Cell;
use std::rc::Rc;

use crate::{
  error::{Error, Result},
  value::Value,
};

#[derive(Clone, Debug)]
pub struct PVector {
  items: im::Vector<Value>,
  meta: Option<Rc<Value>>,
  hash: Cell<Option<i32>>,
}

impl PVector {
  pub fn new(items: im::Vector<Value>) -> Self {
    Self {
      items,
      meta: None,
      hash: Cell::new(None),
    }
  }

  pub fn empty() -> Self {
    Self::new(im::Vector::new())
  }

  pub fn from_vec(values: Vec<Value>) -> Self {
    Self::new(values.into_iter().collect())
  }

  pub fn items(&self) -> &im::Vector<Value> {
    &self.items
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&Value> {
    self.items.get(index)
  }

  pub fn nth(&self, index: i64) -> Result<&Value> {
    usize::try_from(index)
      .ok()
      .and_then(|ix| self.items.get(ix))
      .ok_or_else(|| {
        Error::new(
          crate::error::ErrorKind::Lookup,
          format!("index {} out of bounds for vector", index),
        )
      })
  }

  pub fn conj(&self, value: Value) -> Self {
    let mut items = self.items.clone();
    items.push_back(value);
    Self {
      items,
      meta: self.meta.clone(),
      hash: Cell::new(None),
    }
  }

  /// Replace at an existing index, or append at `len` exactly.
  pub fn assoc(&self, index: i64, value: Value) -> Result<Self> {
    let ix = usize::try_from(index).map_err(|_| {
      Error::illegal_argument(format!("index {} out of bounds", index))
    })?;
    let mut items = self.items.clone();
    if ix == items.len() {
      items.push_back(value);
    } else if ix < items.len() {
      items.set(ix, value);
    } else {
      return Err(Error::illegal_argument(format!(
        "index {} out of bounds",
        index
      )));
    }
    Ok(Self {
      items,
      meta: self.meta.clone(),
      hash: Cell::new(None),
    })
  }

  pub fn pop(&self) -> Result<Self> {
    if self.items.is_empty() {
      return Err(Error::new(
        crate::error::ErrorKind::Lookup,
        "cannot pop an empty vector",
      ));
    }
    let mut items = self.items.clone();
    items.pop_back();
    Ok(Self {
      items,
      meta: self.meta.clone(),
      hash: Cell::new(None),
    })
  }

  pub fn peek(&self) -> Option<&Value> {
    self.items.last()
  }

  pub fn iter(&self) -> im::vector::Iter<'_, Value> {
    self.items.iter()
  }

  pub fn meta(&self) -> Option<&Value> {
    self.meta.as_deref()
  }

  pub fn with_meta(&self, meta: Option<Value>) -> Self {
    Self {
      items: self.items.clone(),
      meta: meta.map(Rc::new),
      hash: Cell::new(None),
    }
  }

  pub fn cached_hash(&self) -> Option<i32> {
    self.hash.get()
  }

  pub fn cache_hash(&self, hash: i32) {
    self.hash.set(Some(hash));
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn conj_appends_without_touching_the_original() {
    let v = PVector::from_vec(vec![Value::Int(1)]);
    let w = v.conj(Value::Int(2));
    assert_eq!(v.len(), 1);
    assert_eq!(w.len(), 2);
    assert_eq!(w.get(1), Some(&Value::Int(2)));
  }

  #[test]
  fn assoc_replaces_or_appends() {
    let v = PVector::from_vec(vec![Value::Int(1), Value::Int(2)]);
    let w = v.assoc(0, Value::Int(9)).unwrap();
    assert_eq!(w.get(0), Some(&Value::Int(9)));
    let x = v.assoc(2, Value::Int(3)).unwrap();
    assert_eq!(x.len(), 3);
    assert!(v.assoc(5, Value::Int(0)).is_err());
  }
}
