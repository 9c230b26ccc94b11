// value/list.rs
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

//! The persistent singly-linked list.  `conj` prepends, `peek`/`pop` work
//! at the front, and the count rides along so `count` is O(1).

use std::cell::Cell;
use std::rc::Rc;

use crate::value::Value;

#[derive(Clone, Debug)]
pub struct PList {
  node: Option<ListNode>,
  meta: Option<Rc<Value>>,
  hash: Cell<Option<i32>>,
}

#[derive(Clone, Debug)]
struct ListNode {
  first: Value,
  rest: Rc<PList>,
  count: usize,
}

impl PList {
  pub fn empty() -> Self {
    Self {
      node: None,
      meta: None,
      hash: Cell::new(None),
    }
  }

  pub fn cons(first: Value, rest: Rc<PList>) -> Self {
    let count = rest.len() + 1;
    Self {
      node: Some(ListNode { first, rest, count }),
      meta: None,
      hash: Cell::new(None),
    }
  }

  pub fn from_vec(values: Vec<Value>) -> Self {
    let mut list = Self::empty();
    for value in values.into_iter().rev() {
      list = Self::cons(value, Rc::new(list));
    }
    list
  }

  pub fn is_empty(&self) -> bool {
    self.node.is_none()
  }

  pub fn len(&self) -> usize {
    self.node.as_ref().map(|n| n.count).unwrap_or(0)
  }

  pub fn first(&self) -> Option<&Value> {
    self.node.as_ref().map(|n| &n.first)
  }

  pub fn rest(&self) -> Option<&Rc<PList>> {
    self.node.as_ref().map(|n| &n.rest)
  }

  pub fn iter(&self) -> ListIter<'_> {
    ListIter { list: self }
  }

  pub fn meta(&self) -> Option<&Value> {
    self.meta.as_deref()
  }

  pub fn with_meta(&self, meta: Option<Value>) -> Self {
    Self {
      node: self.node.clone(),
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

pub struct ListIter<'a> {
  list: &'a PList,
}

impl<'a> Iterator for ListIter<'a> {
  type Item = &'a Value;

  fn next(&mut self) -> Option<Self::Item> {
    let node = self.list.node.as_ref()?;
    self.list = &node.rest;
    Some(&node.first)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn conj_prepends_and_counts() {
    let l = PList::from_vec(vec![Value::Int(2), Value::Int(3)]);
    let l = PList::cons(Value::Int(1), Rc::new(l));
    assert_eq!(l.len(), 3);
    let collected: Vec<_> = l.iter().cloned().collect();
    assert_eq!(
      collected,
      vec![Value::Int(1), Value::Int(2), Value::Int(3)]
    );
  }

  #[test]
  fn sharing_survives_cons() {
    let tail = Rc::new(PList::from_vec(vec![Value::Int(9)]));
    let a = PList::cons(Value::Int(1), tail.clone());
    let b = PList::cons(Value::Int(2), tail);
    assert_eq!(a.rest().unwrap().len(), 1);
    assert_eq!(b.rest().unwrap().len(), 1);
  }
}
