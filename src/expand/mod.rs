// expand/mod.rs
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

//! Macro expansion: a Form→Form fixed point.
//!
//! Head-of-list symbols go first through the native transform table, then
//! through macro vars; host-interop sugar (`.method`, `Classname.`)
//! rewrites on the way.  Quoted forms are never re-expanded, and every
//! expansion step keeps the original form's source metadata.

pub mod case_lowering;
pub mod destructure;
pub mod doseq;
pub mod syntax_quote;
mod transforms;

use std::rc::Rc;

use log::trace;

use crate::{
  analyzer,
  env::Env,
  error::{Error, ErrorKind, Result},
  reader::form::{Form, FormKind},
  value,
};

/// Iteration guard: an expansion chain this long is a runaway macro.
const EXPANSION_LIMIT: usize = 1024;

/// One expansion step.  `None` means the form is not a macro call.
pub fn macroexpand_1(
  env: &Rc<Env>,
  form: &Form,
) -> Result<Option<Form>> {
  let Some(forms) = form.as_list() else {
    return Ok(None);
  };
  let Some(head) = forms.first() else {
    return Ok(None);
  };
  let Some((head_ns, head_name)) = head.as_symbol() else {
    return Ok(None);
  };

  // Host sugar first: (.m x a) → (. x m a) and (C. a) → (new C a).
  if head_ns.is_none() {
    if let Some(method) = head_name.strip_prefix('.') {
      if !method.is_empty() && head_name != ".." {
        let target = forms.get(1).ok_or_else(|| {
          Error::syntax(format!("malformed member call: {}", form))
        })?;
        let mut rewritten = vec![
          Form::sym("."),
          target.clone(),
          Form::sym(method),
        ];
        rewritten.extend(forms[2..].iter().cloned());
        return Ok(Some(Form::list(rewritten).inheriting(form)));
      }
    }
    if let Some(class) = head_name.strip_suffix('.') {
      if !class.is_empty() && head_name != ".." {
        let mut rewritten =
          vec![Form::sym("new"), Form::sym(class)];
        rewritten.extend(forms[1..].iter().cloned());
        return Ok(Some(Form::list(rewritten).inheriting(form)));
      }
    }
  }

  if matches!(head_ns, None | Some("clojure.core")) {
    if analyzer::is_special(head_name) {
      return Ok(None);
    }
    if let Some(transform) = transforms::native_transform(head_name) {
      trace!("native transform: {}", head_name);
      let expanded = transform(env, form)?;
      return Ok(Some(expanded.inheriting(form)));
    }
  }

  // A user macro var.
  let Some(var) = env.resolve(head_ns, head_name) else {
    return Ok(None);
  };
  if !var.is_macro() {
    return Ok(None);
  }
  trace!("macro var: {}", var.qualified_name());
  let macro_fn = var.deref()?;
  let mut args = Vec::with_capacity(forms.len() - 1);
  for arg in &forms[1..] {
    args.push(value::form_to_value(arg)?);
  }
  let result = crate::eval::apply(env, &macro_fn, args)?;
  Ok(Some(value::value_to_form(&result)?.inheriting(form)))
}

/// Expands the head position to a fixed point.
pub fn macroexpand(env: &Rc<Env>, form: &Form) -> Result<Form> {
  let mut current = form.clone();
  for _ in 0..EXPANSION_LIMIT {
    match macroexpand_1(env, &current)? {
      Some(next) => current = next,
      None => return Ok(current),
    }
  }
  Err(Error::new(
    ErrorKind::ExpansionDepth,
    format!("macro expansion did not terminate: {}", form),
  ))
}

/// Full expansion: the head fixed point, then recursion into subforms.
/// Quoted subtrees stay untouched.
pub fn macroexpand_all(env: &Rc<Env>, form: &Form) -> Result<Form> {
  let expanded = macroexpand(env, form)?;
  match &expanded.kind {
    FormKind::List { forms } => {
      if let Some((None, "quote")) =
        forms.first().and_then(|f| f.as_symbol())
      {
        return Ok(expanded);
      }
      let mut out = Vec::with_capacity(forms.len());
      for sub in forms {
        out.push(macroexpand_all(env, sub)?);
      }
      Ok(
        Form::at(FormKind::List { forms: out }, expanded.pos)
          .inheriting(&expanded),
      )
    }
    FormKind::Vector { forms } => {
      let mut out = Vec::with_capacity(forms.len());
      for sub in forms {
        out.push(macroexpand_all(env, sub)?);
      }
      Ok(
        Form::at(FormKind::Vector { forms: out }, expanded.pos)
          .inheriting(&expanded),
      )
    }
    FormKind::Map { forms } => {
      let mut out = Vec::with_capacity(forms.len());
      for sub in forms {
        out.push(macroexpand_all(env, sub)?);
      }
      Ok(
        Form::at(FormKind::Map { forms: out }, expanded.pos)
          .inheriting(&expanded),
      )
    }
    FormKind::Set { forms } => {
      let mut out = Vec::with_capacity(forms.len());
      for sub in forms {
        out.push(macroexpand_all(env, sub)?);
      }
      Ok(
        Form::at(FormKind::Set { forms: out }, expanded.pos)
          .inheriting(&expanded),
      )
    }
    _ => Ok(expanded),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn expand(source: &str) -> String {
    let env = Env::bootstrap();
    let form = crate::reader::read_string(&env, source).unwrap();
    macroexpand(&env, &form).unwrap().to_string()
  }

  #[test]
  fn when_becomes_if_do() {
    assert_eq!(expand("(when a b c)"), "(if a (do b c) nil)");
  }

  #[test]
  fn member_sugar_rewrites() {
    assert_eq!(expand("(.length \"x\")"), "(. \"x\" length)");
    assert_eq!(
      expand("(StringBuilder. \"x\")"),
      "(new StringBuilder \"x\")"
    );
  }

  #[test]
  fn thread_first_threads_into_call_position() {
    assert_eq!(expand("(-> x (f a) g)"), "(g (f x a))");
  }

  #[test]
  fn quoted_forms_do_not_expand() {
    let env = Env::bootstrap();
    let form =
      crate::reader::read_string(&env, "'(when a b)").unwrap();
    let expanded = macroexpand_all(&env, &form).unwrap();
    assert_eq!(expanded.to_string(), "(quote (when a b))");
  }

  #[test]
  fn runaway_macros_hit_the_depth_limit() {
    let env = Env::bootstrap();
    crate::load_string(
      &env,
      "(defmacro loopy [] '(loopy))",
    )
    .unwrap();
    let form = crate::reader::read_string(&env, "(loopy)").unwrap();
    let err = macroexpand(&env, &form).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ExpansionDepth);
  }
}
