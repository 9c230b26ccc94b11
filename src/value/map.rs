// value/map.rs
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

//! Maps and sets.
//!
//! Small maps are a flat entry array that remembers insertion order; past
//! the threshold they promote to a hash-array-mapped trie.  Sets wrap the
//! trie directly.  Both cache their collection hash lazily.

use std::cell::Cell;
use std::rc::Rc;

use crate::{
  error::{Error, Result},
  value::Value,
};

/// Entry count past which an array map promotes.
pub const ARRAY_MAP_THRESHOLD: usize = 8;

#[derive(Clone, Debug)]
pub enum MapRepr {
  Array(Rc<Vec<(Value, Value)>>),
  Hash(im::HashMap<Value, Value>),
}

#[derive(Clone, Debug)]
pub struct PMap {
  repr: MapRepr,
  meta: Option<Rc<Value>>,
  hash: Cell<Option<i32>>,
}

impl PMap {
  pub fn empty() -> Self {
    Self::from_repr(MapRepr::Array(Rc::new(Vec::new())))
  }

  fn from_repr(repr: MapRepr) -> Self {
    Self {
      repr,
      meta: None,
      hash: Cell::new(None),
    }
  }

  /// Builds from entries, later duplicates replacing earlier ones.
  pub fn from_pairs(pairs: Vec<(Value, Value)>) -> Self {
    let mut map = Self::empty();
    for (k, v) in pairs {
      map = map.assoc(k, v);
    }
    map
  }

  /// Builds from literal entries; duplicate keys are an error.
  pub fn from_pairs_checked(
    pairs: Vec<(Value, Value)>,
  ) -> Result<Self> {
    let mut map = Self::empty();
    for (k, v) in pairs {
      if map.contains_key(&k) {
        return Err(Error::illegal_argument(format!(
          "duplicate key: {}",
          crate::printer::pr_str_basic(&k)
        )));
      }
      map = map.assoc(k, v);
    }
    Ok(map)
  }

  pub fn len(&self) -> usize {
    match &self.repr {
      MapRepr::Array(entries) => entries.len(),
      MapRepr::Hash(map) => map.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn get(&self, key: &Value) -> Option<&Value> {
    match &self.repr {
      MapRepr::Array(entries) => {
        entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
      }
      MapRepr::Hash(map) => map.get(key),
    }
  }

  pub fn contains_key(&self, key: &Value) -> bool {
    self.get(key).is_some()
  }

  pub fn assoc(&self, key: Value, value: Value) -> Self {
    let repr = match &self.repr {
      MapRepr::Array(entries) => {
        if let Some(ix) = entries.iter().position(|(k, _)| *k == key) {
          let mut entries = entries.as_ref().clone();
          entries[ix].1 = value;
          MapRepr::Array(Rc::new(entries))
        } else if entries.len() < ARRAY_MAP_THRESHOLD {
          let mut entries = entries.as_ref().clone();
          entries.push((key, value));
          MapRepr::Array(Rc::new(entries))
        } else {
          let mut map: im::HashMap<Value, Value> =
            entries.iter().cloned().collect();
          map.insert(key, value);
          MapRepr::Hash(map)
        }
      }
      MapRepr::Hash(map) => {
        let mut map = map.clone();
        map.insert(key, value);
        MapRepr::Hash(map)
      }
    };
    Self {
      repr,
      meta: self.meta.clone(),
      hash: Cell::new(None),
    }
  }

  pub fn dissoc(&self, key: &Value) -> Self {
    let repr = match &self.repr {
      MapRepr::Array(entries) => {
        match entries.iter().position(|(k, _)| k == key) {
          Some(ix) => {
            let mut entries = entries.as_ref().clone();
            entries.remove(ix);
            MapRepr::Array(Rc::new(entries))
          }
          None => return self.clone(),
        }
      }
      MapRepr::Hash(map) => {
        let mut map = map.clone();
        map.remove(key);
        MapRepr::Hash(map)
      }
    };
    Self {
      repr,
      meta: self.meta.clone(),
      hash: Cell::new(None),
    }
  }

  pub fn entries(&self) -> MapIter<'_> {
    match &self.repr {
      MapRepr::Array(entries) => MapIter::Array(entries.iter()),
      MapRepr::Hash(map) => MapIter::Hash(map.iter()),
    }
  }

  pub fn meta(&self) -> Option<&Value> {
    self.meta.as_deref()
  }

  pub fn with_meta(&self, meta: Option<Value>) -> Self {
    Self {
      repr: self.repr.clone(),
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

impl PartialEq for PMap {
  fn eq(&self, other: &Self) -> bool {
    if self.len() != other.len() {
      return false;
    }
    self
      .entries()
      .all(|(k, v)| other.get(k).map(|w| w == v).unwrap_or(false))
  }
}

pub enum MapIter<'a> {
  Array(std::slice::Iter<'a, (Value, Value)>),
  Hash(im::hashmap::Iter<'a, Value, Value>),
}

impl<'a> Iterator for MapIter<'a> {
  type Item = (&'a Value, &'a Value);

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      MapIter::Array(it) => it.next().map(|(k, v)| (k, v)),
      MapIter::Hash(it) => it.next(),
    }
  }
}

impl std::fmt::Debug for MapIter<'_> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("MapIter")
  }
}

#[derive(Clone, Debug)]
pub struct PSet {
  items: im::HashSet<Value>,
  meta: Option<Rc<Value>>,
  hash: Cell<Option<i32>>,
}

impl PSet {
  pub fn empty() -> Self {
    Self::new(im::HashSet::new())
  }

  pub fn new(items: im::HashSet<Value>) -> Self {
    Self {
      items,
      meta: None,
      hash: Cell::new(None),
    }
  }

  pub fn from_vec(values: Vec<Value>) -> Self {
    Self::new(values.into_iter().collect())
  }

  /// Literal construction; duplicates are an error.
  pub fn from_vec_checked(values: Vec<Value>) -> Result<Self> {
    let mut items = im::HashSet::new();
    for value in values {
      if items.contains(&value) {
        return Err(Error::illegal_argument(format!(
          "duplicate key: {}",
          crate::printer::pr_str_basic(&value)
        )));
      }
      items.insert(value);
    }
    Ok(Self::new(items))
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn contains(&self, value: &Value) -> bool {
    self.items.contains(value)
  }

  pub fn conj(&self, value: Value) -> Self {
    let mut items = self.items.clone();
    items.insert(value);
    Self {
      items,
      meta: self.meta.clone(),
      hash: Cell::new(None),
    }
  }

  pub fn disj(&self, value: &Value) -> Self {
    let mut items = self.items.clone();
    items.remove(value);
    Self {
      items,
      meta: self.meta.clone(),
      hash: Cell::new(None),
    }
  }

  pub fn iter(&self) -> im::hashset::Iter<'_, Value> {
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

impl PartialEq for PSet {
  fn eq(&self, other: &Self) -> bool {
    self.len() == other.len()
      && self.iter().all(|v| other.contains(v))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn array_map_promotes_past_the_threshold() {
    let mut m = PMap::empty();
    for i in 0..=ARRAY_MAP_THRESHOLD as i64 {
      m = m.assoc(Value::Int(i), Value::Int(i * 10));
    }
    assert!(matches!(m.repr, MapRepr::Hash(_)));
    for i in 0..=ARRAY_MAP_THRESHOLD as i64 {
      assert_eq!(m.get(&Value::Int(i)), Some(&Value::Int(i * 10)));
    }
  }

  #[test]
  fn array_map_keeps_insertion_order() {
    let m = PMap::from_pairs(vec![
      (Value::Int(3), Value::Int(30)),
      (Value::Int(1), Value::Int(10)),
      (Value::Int(2), Value::Int(20)),
    ]);
    let keys: Vec<_> = m.entries().map(|(k, _)| k.clone()).collect();
    assert_eq!(keys, vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
  }

  #[test]
  fn dissoc_then_assoc_round_trips() {
    let m = PMap::from_pairs(vec![(Value::Int(1), Value::Int(10))]);
    let m2 = m.assoc(Value::Int(2), Value::Int(20));
    let m3 = m2.dissoc(&Value::Int(2));
    assert!(m3 == m);
  }

  #[test]
  fn set_membership() {
    let s = PSet::from_vec(vec![Value::Int(1), Value::Int(2)]);
    assert!(s.contains(&Value::Int(1)));
    assert!(!s.disj(&Value::Int(1)).contains(&Value::Int(1)));
  }
}
