// expand/destructure.rs
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

//! Destructuring.
//!
//! A binding target that is not a plain symbol flattens into primitive
//! symbol binds: sequential patterns pull with `nth`/`nthrest`,
//! associative patterns pull with `get`, `:or` supplies defaults, `:as`
//! names the whole value.  The analyzer runs every `let*`, `loop*`, and
//! `fn*` binding through here before evaluation.

use std::rc::Rc;

use crate::{
  env::Env,
  error::{Error, Result},
  reader::form::{Form, FormKind},
};

use FormKind as K;

/// Appends `(name, init)` pairs for one binding target to `out`.
pub fn flatten_binding(
  env: &Rc<Env>,
  target: &Form,
  init: &Form,
  out: &mut Vec<(Form, Form)>,
) -> Result<()> {
  match &target.kind {
    K::Symbol {
      namespace: None, ..
    } => {
      out.push((target.clone(), init.clone()));
      Ok(())
    }
    K::Vector { forms } => {
      flatten_sequential(env, forms, init, out)
    }
    K::Map { forms } => flatten_associative(env, forms, init, out),
    _ => Err(Error::syntax(format!(
      "unsupported binding form: {}",
      target
    ))),
  }
}

fn core(name: &str, rest: Vec<Form>) -> Form {
  let mut forms = vec![Form::core_sym(name)];
  forms.extend(rest);
  Form::list(forms)
}

fn fresh(env: &Rc<Env>, base: &str) -> Form {
  Form::symbol(None, env.auto_gensym(base))
}

/// `[a b & r :as all]`
fn flatten_sequential(
  env: &Rc<Env>,
  pattern: &[Form],
  init: &Form,
  out: &mut Vec<(Form, Form)>,
) -> Result<()> {
  let whole = fresh(env, "vec");
  out.push((whole.clone(), init.clone()));

  let mut index = 0_i64;
  let mut items = pattern.iter().peekable();
  while let Some(item) = items.next() {
    if item.is_sym_named("&") {
      let rest_target = items.next().ok_or_else(|| {
        Error::syntax("missing binding after & in destructuring")
      })?;
      let rest_init = core(
        "nthrest",
        vec![whole.clone(), Form::int(index)],
      );
      flatten_binding(env, rest_target, &rest_init, out)?;
      continue;
    }
    if item.is_kw_named("as") {
      let as_target = items.next().ok_or_else(|| {
        Error::syntax("missing binding after :as in destructuring")
      })?;
      out.push((as_target.clone(), whole.clone()));
      continue;
    }
    let element_init = core(
      "nth",
      vec![whole.clone(), Form::int(index), Form::nil()],
    );
    flatten_binding(env, item, &element_init, out)?;
    index += 1;
  }
  Ok(())
}

/// `{a :a, [x y] :pair, :keys [k], :strs [s], :syms [y], :or {...},
/// :as m}`
fn flatten_associative(
  env: &Rc<Env>,
  pattern: &[Form],
  init: &Form,
  out: &mut Vec<(Form, Form)>,
) -> Result<()> {
  let whole = fresh(env, "map");
  out.push((whole.clone(), init.clone()));

  // Collect :or defaults up front; they apply to every shorthand and
  // explicit symbol target.
  let mut defaults: Vec<(Form, Form)> = Vec::new();
  for pair in pattern.chunks(2) {
    if pair.len() == 2 && pair[0].is_kw_named("or") {
      let K::Map { forms } = &pair[1].kind else {
        return Err(Error::syntax(":or needs a map of defaults"));
      };
      for default in forms.chunks(2) {
        defaults.push((default[0].clone(), default[1].clone()));
      }
    }
  }
  let default_for = |name: &str| -> Option<Form> {
    defaults
      .iter()
      .find(|(sym, _)| sym.is_sym_named(name))
      .map(|(_, v)| v.clone())
  };
  let getter = |key: Form, default: Option<Form>| -> Form {
    match default {
      Some(d) => core("get", vec![whole.clone(), key, d]),
      None => core("get", vec![whole.clone(), key]),
    }
  };

  for pair in pattern.chunks(2) {
    if pair.len() != 2 {
      return Err(Error::syntax(
        "map destructuring needs an even number of forms",
      ));
    }
    let (target, key) = (&pair[0], &pair[1]);
    match &target.kind {
      K::Keyword {
        namespace: None,
        name,
      } => match name.as_ref() {
        "keys" | "strs" | "syms" => {
          let names = key.as_vector().ok_or_else(|| {
            Error::syntax(format!(":{} needs a vector", name))
          })?;
          for sym in names {
            let (_, sym_name) =
              sym.as_symbol().ok_or_else(|| {
                Error::syntax(format!(
                  ":{} entries must be symbols",
                  name
                ))
              })?;
            let lookup_key = match name.as_ref() {
              "keys" => Form::kw(sym_name),
              "strs" => Form::string(sym_name),
              _ => Form::tagged(
                Form::sym("quote"),
                Form::sym(sym_name),
              ),
            };
            out.push((
              Form::sym(sym_name),
              getter(lookup_key, default_for(sym_name)),
            ));
          }
        }
        "or" => (),
        "as" => out.push((key.clone(), whole.clone())),
        other => {
          return Err(Error::syntax(format!(
            "unsupported map destructuring directive :{}",
            other
          )));
        }
      },
      K::Symbol {
        namespace: None,
        name,
      } => {
        out.push((
          target.clone(),
          getter(key.clone(), default_for(name)),
        ));
      }
      K::Vector { .. } | K::Map { .. } => {
        let nested_init = getter(key.clone(), None);
        flatten_binding(env, target, &nested_init, out)?;
      }
      _ => {
        return Err(Error::syntax(format!(
          "unsupported binding form: {}",
          target
        )));
      }
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn flatten(pattern: &str, init: &str) -> Vec<(String, String)> {
    let env = Env::bootstrap();
    let target = crate::reader::read_string(&env, pattern).unwrap();
    let init = crate::reader::read_string(&env, init).unwrap();
    let mut out = Vec::new();
    flatten_binding(&env, &target, &init, &mut out).unwrap();
    out
      .into_iter()
      .map(|(t, i)| (t.to_string(), i.to_string()))
      .collect()
  }

  #[test]
  fn vector_pattern_pulls_by_index() {
    let binds = flatten("[a b & r :as all]", "xs");
    assert_eq!(binds[1].0, "a");
    assert!(binds[1].1.contains("nth"));
    assert_eq!(binds[3].0, "r");
    assert!(binds[3].1.contains("nthrest"));
    assert_eq!(binds[4].0, "all");
  }

  #[test]
  fn map_pattern_supports_keys_and_or() {
    let binds = flatten("{:keys [x y] :or {y 7} :as m}", "m0");
    let x = binds.iter().find(|(t, _)| t == "x").unwrap();
    assert!(x.1.contains("(clojure.core/get"));
    let y = binds.iter().find(|(t, _)| t == "y").unwrap();
    assert!(y.1.ends_with("7)"));
    assert!(binds.iter().any(|(t, _)| t == "m"));
  }

  #[test]
  fn nested_patterns_recurse() {
    let binds = flatten("[[a] b]", "xs");
    assert!(binds.iter().any(|(t, _)| t == "a"));
    assert!(binds.iter().any(|(t, _)| t == "b"));
  }
}
