// expand/doseq.rs
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

//! Chunk-aware `doseq` lowering.
//!
//! Every binding pair becomes two nested loops: the outer one walks the
//! seq with `seq`/`next`, and whenever the head is chunked an inner loop
//! walks the chunk by index before the outer loop advances by
//! `chunk-rest`.  `:let` opens a plain `let` inside the loop, `:when`
//! skips and keeps going, `:while` stops the iteration of its binding
//! level.

use std::rc::Rc;

use crate::{
  env::Env,
  error::{Error, Result},
  reader::form::{Form, FormKind},
};

struct BindingGroup {
  binder: Form,
  coll: Form,
  lets: Vec<Form>,
  whens: Vec<Form>,
  whiles: Vec<Form>,
}

pub fn expand(env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = form.as_list().map(|f| &f[1..]).unwrap_or(&[]);
  let seq_exprs = args
    .first()
    .and_then(|f| f.as_vector())
    .ok_or_else(|| Error::syntax("doseq needs a binding vector"))?;
  if seq_exprs.len() % 2 != 0 {
    return Err(Error::syntax("doseq bindings must be pairs"));
  }
  let body = do_body(&args[1..]);

  let groups = collect_groups(seq_exprs)?;
  if groups.is_empty() {
    return Ok(body);
  }
  let mut result = body;
  for group in groups.into_iter().rev() {
    result = build_level(env, group, result);
  }
  Ok(result)
}

fn do_body(forms: &[Form]) -> Form {
  match forms.len() {
    0 => Form::nil(),
    1 => forms[0].clone(),
    _ => {
      let mut out = vec![Form::sym("do")];
      out.extend(forms.iter().cloned());
      Form::list(out)
    }
  }
}

fn collect_groups(seq_exprs: &[Form]) -> Result<Vec<BindingGroup>> {
  let mut groups: Vec<BindingGroup> = Vec::new();
  for pair in seq_exprs.chunks(2) {
    match &pair[0].kind {
      FormKind::Keyword {
        namespace: None,
        name,
      } => {
        let group = groups.last_mut().ok_or_else(|| {
          Error::syntax(
            "doseq modifiers must follow a binding pair",
          )
        })?;
        match name.as_ref() {
          "let" => {
            let let_vec =
              pair[1].as_vector().ok_or_else(|| {
                Error::syntax(":let needs a binding vector")
              })?;
            group.lets.extend(let_vec.iter().cloned());
          }
          "when" => group.whens.push(pair[1].clone()),
          "while" => group.whiles.push(pair[1].clone()),
          other => {
            return Err(Error::syntax(format!(
              "unsupported doseq modifier :{}",
              other
            )));
          }
        }
      }
      _ => groups.push(BindingGroup {
        binder: pair[0].clone(),
        coll: pair[1].clone(),
        lets: Vec::new(),
        whens: Vec::new(),
        whiles: Vec::new(),
      }),
    }
  }
  Ok(groups)
}

fn special(name: &str, rest: Vec<Form>) -> Form {
  let mut forms = vec![Form::sym(name)];
  forms.extend(rest);
  Form::list(forms)
}

fn core(name: &str, rest: Vec<Form>) -> Form {
  let mut forms = vec![Form::core_sym(name)];
  forms.extend(rest);
  Form::list(forms)
}

fn conjoin(tests: &[Form]) -> Form {
  match tests.len() {
    0 => Form::boolean(true),
    1 => tests[0].clone(),
    _ => {
      let mut forms = vec![Form::core_sym("and")];
      forms.extend(tests.iter().cloned());
      Form::list(forms)
    }
  }
}

/// One binding level.  The generated shape, with `s`, `c`, `n`, `i`, and
/// `ok` fresh:
///
/// ```clojure
/// (loop* [s (seq coll)]
///   (if s
///     (if (chunked-seq? s)
///       (let* [c (chunk-first s)
///              n (count c)
///              ok (loop* [i 0]
///                   (if (< i n)
///                     (let* [binder (nth c i) :lets...]
///                       (if whiles
///                         (do (if whens inner nil)
///                             (recur (inc i)))
///                         false))
///                     true))]
///         (if ok (recur (chunk-rest s)) nil))
///       (let* [binder (first s) :lets...]
///         (if whiles
///           (do (if whens inner nil)
///               (recur (next s)))
///           nil)))
///     nil))
/// ```
fn build_level(
  env: &Rc<Env>,
  group: BindingGroup,
  inner: Form,
) -> Form {
  let s = Form::symbol(None, env.auto_gensym("seq"));
  let c = Form::symbol(None, env.auto_gensym("chunk"));
  let n = Form::symbol(None, env.auto_gensym("n"));
  let i = Form::symbol(None, env.auto_gensym("i"));
  let ok = Form::symbol(None, env.auto_gensym("ok"));

  let mut chunk_bindings = vec![
    group.binder.clone(),
    core("nth", vec![c.clone(), i.clone()]),
  ];
  chunk_bindings.extend(group.lets.iter().cloned());
  let chunk_step =
    special("recur", vec![core("inc", vec![i.clone()])]);
  let chunk_walk = special(
    "loop*",
    vec![
      Form::vector(vec![i.clone(), Form::int(0)]),
      special(
        "if",
        vec![
          core("<", vec![i, n.clone()]),
          special(
            "let*",
            vec![
              Form::vector(chunk_bindings),
              guarded(&group, &inner, chunk_step, Form::boolean(false)),
            ],
          ),
          Form::boolean(true),
        ],
      ),
    ],
  );
  let chunked_branch = special(
    "let*",
    vec![
      Form::vector(vec![
        c.clone(),
        core("chunk-first", vec![s.clone()]),
        n,
        core("count", vec![c]),
        ok.clone(),
        chunk_walk,
      ]),
      special(
        "if",
        vec![
          ok,
          special(
            "recur",
            vec![core("chunk-rest", vec![s.clone()])],
          ),
          Form::nil(),
        ],
      ),
    ],
  );

  let mut item_bindings = vec![
    group.binder.clone(),
    core("first", vec![s.clone()]),
  ];
  item_bindings.extend(group.lets.iter().cloned());
  let item_step =
    special("recur", vec![core("next", vec![s.clone()])]);
  let plain_branch = special(
    "let*",
    vec![
      Form::vector(item_bindings),
      guarded(&group, &inner, item_step, Form::nil()),
    ],
  );

  special(
    "loop*",
    vec![
      Form::vector(vec![
        s.clone(),
        core("seq", vec![group.coll.clone()]),
      ]),
      special(
        "if",
        vec![
          s.clone(),
          special(
            "if",
            vec![
              core("chunked-seq?", vec![s]),
              chunked_branch,
              plain_branch,
            ],
          ),
          Form::nil(),
        ],
      ),
    ],
  )
}

/// The per-item guard: `:while` failing stops the level with `stop`,
/// `:when` failing skips the body but still steps.
fn guarded(
  group: &BindingGroup,
  inner: &Form,
  step: Form,
  stop: Form,
) -> Form {
  special(
    "if",
    vec![
      conjoin(&group.whiles),
      special(
        "do",
        vec![
          special(
            "if",
            vec![conjoin(&group.whens), inner.clone(), Form::nil()],
          ),
          step,
        ],
      ),
      stop,
    ],
  )
}
