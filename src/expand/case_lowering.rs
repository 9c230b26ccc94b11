// expand/case_lowering.rs
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

//! `case` → `case*` lowering.
//!
//! Tests are compile-time constants.  The lowering hashes every test with
//! the runtime's own hash routine, then looks for the densest dispatch:
//! a compact table straight off the hashes when they span less than 2^13,
//! otherwise a shift/mask pair that separates them, otherwise a sparse
//! table on the full hash.  Tests whose full hashes collide share a
//! bucket and land in the skip-check set, which forces the dispatch to
//! verify equality before trusting the bucket.

use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::{
  env::Env,
  error::{Error, Result},
  reader::form::{Form, FormKind},
  value,
};

pub fn expand(env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = form.as_list().map(|f| &f[1..]).unwrap_or(&[]);
  let expr = args
    .first()
    .cloned()
    .ok_or_else(|| Error::syntax("case needs an expression"))?;
  let clauses = &args[1..];
  let g = Form::symbol(None, env.auto_gensym("case"));

  let (pairs, default) = collect_clauses(clauses)?;
  let default = default.unwrap_or_else(|| {
    Form::list(vec![
      Form::core_sym("__case-fallthrough"),
      g.clone(),
    ])
  });

  let mode = detect_mode(&pairs)?;
  // Hash each test with the same routine the runtime uses at dispatch.
  let mut hashed: Vec<(i64, Form, Form)> =
    Vec::with_capacity(pairs.len());
  for (test, then) in pairs {
    let h = match mode {
      Mode::Int => int_test_value(&test)?,
      Mode::Identity | Mode::Equiv => {
        value::form_to_value(&test)?.hash_value() as i64
      }
    };
    hashed.push((h, test, then));
  }

  // Full-hash collisions merge into shared buckets; those buckets are
  // flagged so the dispatch re-checks equality.
  let mut groups: Vec<(i64, Vec<(Form, Form)>)> = Vec::new();
  for (h, test, then) in hashed {
    match groups.iter_mut().find(|(gh, _)| *gh == h) {
      Some((_, bucket)) => bucket.push((test, then)),
      None => groups.push((h, vec![(test, then)])),
    }
  }

  let layout = choose_layout(&groups);
  debug!(
    "case over {} tests: {:?} mode {:?}",
    groups.len(),
    layout,
    mode
  );
  let (shift, mask, switch_type) = match layout {
    Layout::Compact => (0_u32, 0_i64, "compact"),
    Layout::Masked { shift, mask } => (shift, mask, "compact"),
    Layout::Sparse => (0, 0, "sparse"),
  };

  let mut table_entries: Vec<Form> = Vec::new();
  let mut skip_check: Vec<Form> = Vec::new();
  let mut seen_keys: HashMap<i64, usize> = HashMap::new();
  for (h, bucket) in groups {
    let key = if mask == 0 { h } else { (h >> shift) & mask };
    if bucket.len() > 1 {
      skip_check.push(Form::int(key));
    }
    match seen_keys.get(&key) {
      Some(ix) => {
        // Only possible in sparse/compact fallback when two distinct
        // full hashes reduce to one key; keep correctness by merging.
        let entry_ix = *ix;
        if let FormKind::Vector { forms } =
          &mut table_entries[entry_ix * 2 + 1].kind
        {
          for (test, then) in bucket {
            forms.push(test);
            forms.push(then);
          }
        }
        if !skip_check.iter().any(|f| matches!(f.kind, FormKind::Int { value } if value == key)) {
          skip_check.push(Form::int(key));
        }
      }
      None => {
        seen_keys.insert(key, table_entries.len() / 2);
        let mut pair_forms = Vec::with_capacity(bucket.len() * 2);
        for (test, then) in bucket {
          pair_forms.push(test);
          pair_forms.push(then);
        }
        table_entries.push(Form::int(key));
        table_entries.push(Form::vector(pair_forms));
      }
    }
  }

  let test_type = match mode {
    Mode::Int => "int",
    Mode::Identity => "hash-identity",
    Mode::Equiv => "hash-equiv",
  };

  let case_star = Form::list(vec![
    Form::sym("case*"),
    g.clone(),
    Form::int(shift as i64),
    Form::int(mask),
    default,
    Form::map(table_entries),
    Form::kw(switch_type),
    Form::kw(test_type),
    Form::set(skip_check),
  ]);
  Ok(Form::list(vec![
    Form::sym("let*"),
    Form::vector(vec![g, expr]),
    case_star,
  ]))
}

/// Splits clauses into (test, then) pairs and the trailing default; a
/// list test is disjunctive and fans out into one pair per constant.
fn collect_clauses(
  clauses: &[Form],
) -> Result<(Vec<(Form, Form)>, Option<Form>)> {
  let mut pairs = Vec::new();
  let mut chunks = clauses.chunks_exact(2);
  for chunk in &mut chunks {
    let test = &chunk[0];
    let then = &chunk[1];
    match &test.kind {
      FormKind::List { forms } => {
        if forms.is_empty() {
          return Err(Error::syntax(
            "case test lists cannot be empty",
          ));
        }
        for sub in forms {
          pairs.push((sub.clone(), then.clone()));
        }
      }
      _ => pairs.push((test.clone(), then.clone())),
    }
  }
  let default = chunks.remainder().first().cloned();
  if pairs.is_empty() && default.is_none() {
    return Err(Error::syntax("case needs at least one clause"));
  }
  Ok((pairs, default))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
  Int,
  Identity,
  Equiv,
}

fn detect_mode(pairs: &[(Form, Form)]) -> Result<Mode> {
  let all_ints = pairs.iter().all(|(test, _)| {
    matches!(
      test.kind,
      FormKind::Int { value } if i32::try_from(value).is_ok()
    )
  });
  if all_ints && !pairs.is_empty() {
    return Ok(Mode::Int);
  }
  let all_keywords = pairs
    .iter()
    .all(|(test, _)| test.is_keyword());
  if all_keywords && !pairs.is_empty() {
    return Ok(Mode::Identity);
  }
  Ok(Mode::Equiv)
}

fn int_test_value(test: &Form) -> Result<i64> {
  match test.kind {
    FormKind::Int { value } => Ok(value),
    _ => Err(Error::syntax("int-mode case test must be an integer")),
  }
}

#[derive(Clone, Copy, Debug)]
enum Layout {
  Compact,
  Masked { shift: u32, mask: i64 },
  Sparse,
}

fn choose_layout(groups: &[(i64, Vec<(Form, Form)>)]) -> Layout {
  let hashes: Vec<i64> = groups.iter().map(|(h, _)| *h).collect();
  if hashes.is_empty() {
    return Layout::Compact;
  }
  let min = hashes.iter().min().unwrap();
  let max = hashes.iter().max().unwrap();
  if max - min < (1 << 13) {
    return Layout::Compact;
  }
  // Search for the smallest mask with a shift that keeps every reduced
  // hash distinct.
  for k in 1..=13_u32 {
    let mask = (1_i64 << k) - 1;
    'shifts: for shift in 0..=30_u32 {
      let mut seen = std::collections::HashSet::new();
      for h in &hashes {
        if !seen.insert((h >> shift) & mask) {
          continue 'shifts;
        }
      }
      return Layout::Masked { shift, mask };
    }
  }
  Layout::Sparse
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn masked_layout_separates_spread_hashes() {
    let groups: Vec<(i64, Vec<(Form, Form)>)> = vec![
      (0x10000, vec![]),
      (0x20001, vec![]),
      (0x40002, vec![]),
    ];
    match choose_layout(&groups) {
      Layout::Masked { shift, mask } => {
        let mut seen = std::collections::HashSet::new();
        for (h, _) in &groups {
          assert!(seen.insert((h >> shift) & mask));
        }
      }
      Layout::Compact => panic!("span is too wide for compact"),
      Layout::Sparse => {
        panic!("a separating mask exists for these hashes")
      }
    }
  }

  #[test]
  fn narrow_hash_span_stays_compact() {
    let groups: Vec<(i64, Vec<(Form, Form)>)> =
      vec![(1, vec![]), (2, vec![]), (100, vec![])];
    assert!(matches!(choose_layout(&groups), Layout::Compact));
  }
}
