// value/hash.rs
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

//! Murmur3-style hashing.
//!
//! Equal values hash equal across the whole numeric tower and across
//! collection kinds, and `case*` builds its dispatch tables from exactly
//! these routines, so every hash here must be stable within a process run
//! and consistent with `=`.

const SEED: u32 = 0;
const C1: u32 = 0xcc9e_2d51;
const C2: u32 = 0x1b87_3593;

fn mix_k1(mut k1: u32) -> u32 {
  k1 = k1.wrapping_mul(C1);
  k1 = k1.rotate_left(15);
  k1.wrapping_mul(C2)
}

fn mix_h1(mut h1: u32, k1: u32) -> u32 {
  h1 ^= k1;
  h1 = h1.rotate_left(13);
  h1.wrapping_mul(5).wrapping_add(0xe654_6b64)
}

fn fmix(mut h1: u32, len: u32) -> u32 {
  h1 ^= len;
  h1 ^= h1 >> 16;
  h1 = h1.wrapping_mul(0x85eb_ca6b);
  h1 ^= h1 >> 13;
  h1 = h1.wrapping_mul(0xc2b2_ae35);
  h1 ^ (h1 >> 16)
}

pub fn hash_int(input: i64) -> i32 {
  if input == 0 {
    return 0;
  }
  let low = input as u32;
  let high = (input >> 32) as u32;
  let mut k1 = mix_k1(low);
  let mut h1 = mix_h1(SEED, k1);
  k1 = mix_k1(high);
  h1 = mix_h1(h1, k1);
  fmix(h1, 8) as i32
}

pub fn hash_bytes(bytes: &[u8]) -> i32 {
  let mut h1 = SEED;
  let mut chunks = bytes.chunks_exact(4);
  let mut len = 0_u32;
  for chunk in &mut chunks {
    let k1 = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    h1 = mix_h1(h1, mix_k1(k1));
    len += 4;
  }
  let mut k1 = 0_u32;
  for (i, b) in chunks.remainder().iter().enumerate() {
    k1 |= (*b as u32) << (8 * i);
    len += 1;
  }
  if k1 != 0 {
    h1 ^= mix_k1(k1);
  }
  fmix(h1, len) as i32
}

pub fn hash_string(s: &str) -> i32 {
  hash_bytes(s.as_bytes())
}

/// Finishing mix applied to every collection hash; the count feeds in so
/// that e.g. `[1 1]` and `[1 1 1]` disperse.
pub fn mix_coll_hash(hash: i32, count: usize) -> i32 {
  let k1 = mix_k1(hash as u32);
  let h1 = mix_h1(SEED, k1);
  fmix(h1, count as u32) as i32
}

/// Ordered fold: lists, vectors, and seqs.
pub fn hash_ordered(element_hashes: impl Iterator<Item = i32>) -> i32 {
  let mut n = 0_usize;
  let mut hash = 1_i32;
  for eh in element_hashes {
    hash = hash.wrapping_mul(31).wrapping_add(eh);
    n += 1;
  }
  mix_coll_hash(hash, n)
}

/// Unordered fold: maps and sets.  Entry hashes just sum, so the fold is
/// insensitive to iteration order.
pub fn hash_unordered(element_hashes: impl Iterator<Item = i32>) -> i32 {
  let mut n = 0_usize;
  let mut hash = 0_i32;
  for eh in element_hashes {
    hash = hash.wrapping_add(eh);
    n += 1;
  }
  mix_coll_hash(hash, n)
}

/// Symbols and keywords mix the namespace hash into the name hash with
/// distinct seeds so `:a/b`, `a/b`, and `ab` all land apart.
pub fn hash_named(
  kind_seed: i32,
  namespace: Option<&str>,
  name: &str,
) -> i32 {
  let ns_hash = namespace.map(hash_string).unwrap_or(0);
  let name_hash = hash_string(name);
  kind_seed
    .wrapping_mul(31)
    .wrapping_add(ns_hash)
    .wrapping_mul(31)
    .wrapping_add(name_hash)
}

pub const BOOL_TRUE_HASH: i32 = 1231;
pub const BOOL_FALSE_HASH: i32 = 1237;
pub const SYMBOL_SEED: i32 = 0x5358_1DA5_u32 as i32;
pub const KEYWORD_SEED: i32 = 0x7B9A_632F_u32 as i32;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn zero_int_hashes_to_zero() {
    assert_eq!(hash_int(0), 0);
  }

  #[test]
  fn ordered_hash_depends_on_order() {
    let a = hash_ordered([1, 2, 3].into_iter());
    let b = hash_ordered([3, 2, 1].into_iter());
    assert_ne!(a, b);
  }

  #[test]
  fn unordered_hash_ignores_order() {
    let a = hash_unordered([1, 2, 3].into_iter());
    let b = hash_unordered([3, 2, 1].into_iter());
    assert_eq!(a, b);
  }

  #[test]
  fn symbol_and_keyword_hashes_differ() {
    let s = hash_named(SYMBOL_SEED, None, "foo");
    let k = hash_named(KEYWORD_SEED, None, "foo");
    assert_ne!(s, k);
  }
}
