// expand/syntax_quote.rs
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

//! Syntax quote.
//!
//! `` `form `` rewrites at read time into code that rebuilds the form:
//! `~x` splices the expression in place, `~@xs` splices a sequence into
//! the surrounding `concat`, free symbols resolve against the current
//! namespace, and `sym#` names gensym consistently within one syntax
//! quote.

use std::collections::HashMap;
use std::rc::Rc;

use crate::{
  analyzer,
  env::Env,
  error::{Error, Result},
  reader::form::{Form, FormKind},
};

use FormKind as K;

pub fn syntax_quote(env: &Rc<Env>, form: &Form) -> Result<Form> {
  let mut ctx = Ctx {
    env,
    gensyms: HashMap::new(),
  };
  ctx.quote(form)
}

struct Ctx<'e> {
  env: &'e Rc<Env>,
  /// One scope of `sym#` names: the same base maps to the same gensym
  /// within a single syntax quote, never across two.
  gensyms: HashMap<Rc<str>, Rc<str>>,
}

impl<'e> Ctx<'e> {
  fn quote(&mut self, form: &Form) -> Result<Form> {
    if let Some(inner) = unquote_of(form) {
      return Ok(inner.clone());
    }
    if unquote_splicing_of(form).is_some() {
      return Err(Error::syntax("splice not in list"));
    }
    let quoted = match &form.kind {
      K::Symbol { .. } => self.quote_symbol(form)?,
      K::List { forms } => {
        if forms.is_empty() {
          Form::list(vec![Form::core_sym("list")])
        } else {
          Form::list(vec![
            Form::core_sym("seq"),
            self.concat_of(forms)?,
          ])
        }
      }
      K::Vector { forms } => Form::list(vec![
        Form::core_sym("vec"),
        self.concat_of(forms)?,
      ]),
      K::Map { forms } => Form::list(vec![
        Form::core_sym("apply"),
        Form::core_sym("hash-map"),
        self.concat_of(forms)?,
      ]),
      K::Set { forms } => Form::list(vec![
        Form::core_sym("set"),
        self.concat_of(forms)?,
      ]),
      // Self-evaluating atoms reconstruct as themselves.
      _ => form.clone(),
    };
    match &form.meta {
      Some(meta) => {
        let quoted_meta = self.quote(meta)?;
        Ok(Form::list(vec![
          Form::core_sym("with-meta"),
          quoted,
          quoted_meta,
        ]))
      }
      None => Ok(quoted),
    }
  }

  /// The `(concat part...)` backbone of a quoted collection.
  fn concat_of(&mut self, forms: &[Form]) -> Result<Form> {
    let mut parts = vec![Form::core_sym("concat")];
    for sub in forms {
      if let Some(inner) = unquote_of(sub) {
        parts.push(Form::list(vec![
          Form::core_sym("list"),
          inner.clone(),
        ]));
      } else if let Some(inner) = unquote_splicing_of(sub) {
        parts.push(inner.clone());
      } else {
        parts.push(Form::list(vec![
          Form::core_sym("list"),
          self.quote(sub)?,
        ]));
      }
    }
    Ok(Form::list(parts))
  }

  fn quote_symbol(&mut self, form: &Form) -> Result<Form> {
    let (namespace, name) = form.as_symbol().expect("symbol form");
    let resolved = if let Some(ns) = namespace {
      // A qualified symbol keeps its namespace, aliases expanding to
      // their full names.
      let full = self
        .env
        .resolve_ns_alias(ns)
        .unwrap_or_else(|| ns.into());
      Form::symbol(Some(full), name)
    } else if let Some(base) = name.strip_suffix('#') {
      let generated = self
        .gensyms
        .entry(name.into())
        .or_insert_with(|| self.env.auto_gensym(base))
        .clone();
      Form::symbol(None, generated)
    } else if analyzer::is_special(name) || name == "&" {
      Form::sym(name)
    } else if super::transforms::native_transform(name).is_some() {
      // Native macros have no var to resolve through, but their names
      // still belong to the core.
      Form::symbol(Some("clojure.core".into()), name)
    } else if let Some(var) = self.env.resolve(None, name) {
      Form::symbol(Some(var.ns_name()), var.name())
    } else {
      // Unresolvable names qualify into the current namespace.
      Form::symbol(Some(self.env.current_ns().name()), name)
    };
    Ok(Form::tagged(Form::sym("quote"), resolved))
  }
}

fn unquote_of(form: &Form) -> Option<&Form> {
  head_tagged(form, "unquote")
}

fn unquote_splicing_of(form: &Form) -> Option<&Form> {
  head_tagged(form, "unquote-splicing")
}

fn head_tagged<'a>(form: &'a Form, tag: &str) -> Option<&'a Form> {
  let forms = form.as_list()?;
  if forms.len() == 2 {
    let (ns, name) = forms[0].as_symbol()?;
    if name == tag && matches!(ns, None | Some("clojure.core")) {
      return Some(&forms[1]);
    }
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;

  fn read_expanded(source: &str) -> String {
    let env = Env::bootstrap();
    crate::reader::read_string(&env, source)
      .unwrap()
      .to_string()
  }

  #[test]
  fn plain_symbols_qualify() {
    // inc resolves into clojure.core; zork is free and lands in the
    // current namespace.
    assert_eq!(
      read_expanded("`inc"),
      "(quote clojure.core/inc)"
    );
    assert_eq!(read_expanded("`zork"), "(quote user/zork)");
  }

  #[test]
  fn unquote_leaves_the_expression() {
    assert_eq!(
      read_expanded("`(inc ~x)"),
      "(clojure.core/seq (clojure.core/concat \
       (clojure.core/list (quote clojure.core/inc)) \
       (clojure.core/list x)))"
    );
  }

  #[test]
  fn splicing_goes_straight_into_concat() {
    assert_eq!(
      read_expanded("`(f ~@xs)"),
      "(clojure.core/seq (clojure.core/concat \
       (clojure.core/list (quote user/f)) xs))"
    );
  }

  #[test]
  fn auto_gensyms_are_stable_within_one_quote() {
    let env = Env::bootstrap();
    let form =
      crate::reader::read_string(&env, "`(let* [x# 1] x#)").unwrap();
    let text = form.to_string();
    // Both occurrences of x# expanded to the same generated name.
    let first = text
      .match_indices("x__")
      .map(|(i, _)| {
        text[i..].split_whitespace().next().unwrap().to_string()
      })
      .collect::<Vec<_>>();
    assert!(first.len() >= 2);
    assert!(first.windows(2).all(|w| {
      w[0].trim_end_matches([')', ']'])
        == w[1].trim_end_matches([')', ']'])
    }));
  }
}
