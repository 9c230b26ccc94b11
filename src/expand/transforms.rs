// expand/transforms.rs
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

//! The native macro table.
//!
//! These Form→Form transforms are indexed by simple name and preempt any
//! user macro var of the same name.  Generated calls to core functions
//! are namespace-qualified so user shadowing cannot divert them; special
//! operators stay bare because the analyzer matches them unqualified.

use std::collections::HashMap;
use std::rc::Rc;

use once_cell::sync::Lazy;

use crate::{
  env::Env,
  error::{Error, Result},
  reader::form::{Form, FormKind},
};

use super::{case_lowering, doseq};

pub type Transform = fn(&Rc<Env>, &Form) -> Result<Form>;

pub fn native_transform(name: &str) -> Option<Transform> {
  TABLE.get(name).copied()
}

static TABLE: Lazy<HashMap<&'static str, Transform>> = Lazy::new(|| {
  let mut t: HashMap<&'static str, Transform> = HashMap::new();
  t.insert("when", when);
  t.insert("when-not", when_not);
  t.insert("if-not", if_not);
  t.insert("comment", comment);
  t.insert("while", while_);
  t.insert("assert", assert_);
  t.insert("and", and);
  t.insert("or", or);
  t.insert("->", thread_first);
  t.insert("->>", thread_last);
  t.insert("as->", as_thread);
  t.insert("some->", some_thread_first);
  t.insert("some->>", some_thread_last);
  t.insert("cond->", cond_thread_first);
  t.insert("cond->>", cond_thread_last);
  t.insert("doto", doto);
  t.insert("if-let", if_let);
  t.insert("when-let", when_let);
  t.insert("if-some", if_some);
  t.insert("when-some", when_some);
  t.insert("when-first", when_first);
  t.insert("assert-args", assert_args);
  t.insert("binding", binding);
  t.insert("with-bindings", with_bindings);
  t.insert("bound-fn", bound_fn);
  t.insert("with-local-vars", with_local_vars);
  t.insert("with-redefs", with_redefs);
  t.insert("defn", defn);
  t.insert("defn-", defn_private);
  t.insert("defmacro", defmacro);
  t.insert("declare", declare);
  t.insert("defonce", defonce);
  t.insert("definline", defn);
  t.insert("vswap!", vswap);
  t.insert("cond", cond);
  t.insert("dotimes", dotimes);
  t.insert("delay", delay);
  t.insert("lazy-seq", lazy_seq);
  t.insert("lazy-cat", lazy_cat);
  t.insert("time", time);
  t.insert("locking", locking);
  t.insert("dosync", implicit_do);
  t.insert("sync", sync_);
  t.insert("io!", io_bang);
  t.insert("with-precision", with_precision);
  t.insert("with-open", with_open);
  t.insert("with-out-str", with_out_str);
  t.insert("with-in-str", with_in_str);
  t.insert("condp", condp);
  t.insert("doseq", doseq::expand);
  t.insert("amap", amap);
  t.insert("areduce", areduce);
  t.insert("future", future);
  t.insert("pvalues", pvalues);
  t.insert("defstruct", defstruct);
  t.insert("letfn", letfn);
  t.insert("refer-clojure", refer_clojure);
  t.insert("defprotocol", defprotocol);
  t.insert("extend-type", extend_type);
  t.insert("extend-protocol", extend_protocol);
  t.insert("defmulti", defmulti);
  t.insert("defmethod", defmethod);
  t.insert("ns", ns);
  t.insert("with-pprint-dispatch", with_pprint_dispatch);
  t.insert("case", case_lowering::expand);
  t.insert("let", rename_let);
  t.insert("loop", loop_);
  t.insert("fn", rename_fn);
  t
});

fn args_of(form: &Form) -> &[Form] {
  form.as_list().map(|forms| &forms[1..]).unwrap_or(&[])
}

fn call(head: Form, mut rest: Vec<Form>) -> Form {
  let mut forms = vec![head];
  forms.append(&mut rest);
  Form::list(forms)
}

fn special(name: &str, rest: Vec<Form>) -> Form {
  call(Form::sym(name), rest)
}

fn core(name: &str, rest: Vec<Form>) -> Form {
  call(Form::core_sym(name), rest)
}

fn do_block(mut body: Vec<Form>) -> Form {
  if body.len() == 1 {
    body.pop().unwrap()
  } else {
    special("do", body)
  }
}

fn quote(form: Form) -> Form {
  Form::tagged(Form::sym("quote"), form)
}

fn gensym(env: &Rc<Env>, base: &str) -> Form {
  Form::symbol(None, env.auto_gensym(base))
}

//
// Flow macros
//

fn when(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let test = args
    .first()
    .ok_or_else(|| Error::syntax("when needs a test"))?;
  Ok(special(
    "if",
    vec![
      test.clone(),
      do_block(args[1..].to_vec()),
      Form::nil(),
    ],
  ))
}

fn when_not(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let test = args
    .first()
    .ok_or_else(|| Error::syntax("when-not needs a test"))?;
  Ok(special(
    "if",
    vec![
      test.clone(),
      Form::nil(),
      do_block(args[1..].to_vec()),
    ],
  ))
}

fn if_not(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  if args.len() < 2 || args.len() > 3 {
    return Err(Error::syntax("if-not takes a test, a then, an else?"));
  }
  let mut out = vec![
    core("not", vec![args[0].clone()]),
    args[1].clone(),
  ];
  if let Some(els) = args.get(2) {
    out.push(els.clone());
  }
  Ok(special("if", out))
}

fn comment(_env: &Rc<Env>, _form: &Form) -> Result<Form> {
  Ok(Form::nil())
}

fn while_(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let test = args
    .first()
    .ok_or_else(|| Error::syntax("while needs a test"))?;
  let mut body = args[1..].to_vec();
  body.push(special("recur", vec![]));
  Ok(special(
    "loop*",
    vec![
      Form::vector(vec![]),
      special(
        "if",
        vec![test.clone(), do_block(body), Form::nil()],
      ),
    ],
  ))
}

fn assert_(env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let test = args
    .first()
    .ok_or_else(|| Error::syntax("assert needs an expression"))?;
  if !env.core_flag("*assert*") {
    return Ok(Form::nil());
  }
  let mut fail_args = vec![Form::string(format!("{}", test))];
  if let Some(message) = args.get(1) {
    fail_args.push(message.clone());
  }
  Ok(special(
    "if",
    vec![
      test.clone(),
      Form::nil(),
      core("__assert-fail", fail_args),
    ],
  ))
}

fn and(env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  match args {
    [] => Ok(Form::boolean(true)),
    [only] => Ok(only.clone()),
    [first, rest @ ..] => {
      let g = gensym(env, "and");
      let mut tail = vec![Form::core_sym("and")];
      tail.extend(rest.iter().cloned());
      Ok(special(
        "let*",
        vec![
          Form::vector(vec![g.clone(), first.clone()]),
          special(
            "if",
            vec![g.clone(), Form::list(tail), g],
          ),
        ],
      ))
    }
  }
}

fn or(env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  match args {
    [] => Ok(Form::nil()),
    [only] => Ok(only.clone()),
    [first, rest @ ..] => {
      let g = gensym(env, "or");
      let mut tail = vec![Form::core_sym("or")];
      tail.extend(rest.iter().cloned());
      Ok(special(
        "let*",
        vec![
          Form::vector(vec![g.clone(), first.clone()]),
          special(
            "if",
            vec![g.clone(), g, Form::list(tail)],
          ),
        ],
      ))
    }
  }
}

fn cond(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  if args.is_empty() {
    return Ok(Form::nil());
  }
  if args.len() == 1 {
    return Err(Error::syntax("cond requires an even number of forms"));
  }
  let mut tail = vec![Form::core_sym("cond")];
  tail.extend(args[2..].iter().cloned());
  Ok(special(
    "if",
    vec![args[0].clone(), args[1].clone(), Form::list(tail)],
  ))
}

//
// Threading macros
//

/// Threads `x` into `form` at the given argument position, keeping the
/// original call's metadata on the rebuilt list.
fn thread_into(x: Form, form: &Form, first: bool) -> Form {
  match &form.kind {
    FormKind::List { forms } if !forms.is_empty() => {
      let mut out = Vec::with_capacity(forms.len() + 1);
      if first {
        out.push(forms[0].clone());
        out.push(x);
        out.extend(forms[1..].iter().cloned());
      } else {
        out.extend(forms.iter().cloned());
        out.push(x);
      }
      Form::list(out).inheriting(form)
    }
    _ => Form::list(vec![form.clone(), x]).inheriting(form),
  }
}

fn thread_first(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let mut threaded = args
    .first()
    .ok_or_else(|| Error::syntax("-> needs an expression"))?
    .clone();
  for step in &args[1..] {
    threaded = thread_into(threaded, step, true);
  }
  Ok(threaded)
}

fn thread_last(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let mut threaded = args
    .first()
    .ok_or_else(|| Error::syntax("->> needs an expression"))?
    .clone();
  for step in &args[1..] {
    threaded = thread_into(threaded, step, false);
  }
  Ok(threaded)
}

fn as_thread(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  if args.len() < 2 {
    return Err(Error::syntax("as-> needs an expression and a name"));
  }
  let name = args[1].clone();
  let mut bindings = vec![name.clone(), args[0].clone()];
  for step in &args[2..] {
    bindings.push(name.clone());
    bindings.push(step.clone());
  }
  Ok(special(
    "let*",
    vec![Form::vector(bindings), name],
  ))
}

fn some_thread(
  env: &Rc<Env>,
  form: &Form,
  first: bool,
) -> Result<Form> {
  let args = args_of(form);
  let expr = args
    .first()
    .ok_or_else(|| Error::syntax("some-> needs an expression"))?;
  let mut threaded = expr.clone();
  for step in &args[1..] {
    let g = gensym(env, "g");
    threaded = special(
      "let*",
      vec![
        Form::vector(vec![g.clone(), threaded]),
        special(
          "if",
          vec![
            core("nil?", vec![g.clone()]),
            Form::nil(),
            thread_into(g, step, first),
          ],
        ),
      ],
    );
  }
  Ok(threaded)
}

fn some_thread_first(env: &Rc<Env>, form: &Form) -> Result<Form> {
  some_thread(env, form, true)
}

fn some_thread_last(env: &Rc<Env>, form: &Form) -> Result<Form> {
  some_thread(env, form, false)
}

fn cond_thread(
  env: &Rc<Env>,
  form: &Form,
  first: bool,
) -> Result<Form> {
  let args = args_of(form);
  let expr = args
    .first()
    .ok_or_else(|| Error::syntax("cond-> needs an expression"))?;
  if args[1..].len() % 2 != 0 {
    return Err(Error::syntax(
      "cond-> requires test/form pairs",
    ));
  }
  let g = gensym(env, "g");
  let mut bindings = vec![g.clone(), expr.clone()];
  for pair in args[1..].chunks(2) {
    bindings.push(g.clone());
    bindings.push(special(
      "if",
      vec![
        pair[0].clone(),
        thread_into(g.clone(), &pair[1], first),
        g.clone(),
      ],
    ));
  }
  Ok(special(
    "let*",
    vec![Form::vector(bindings), g],
  ))
}

fn cond_thread_first(env: &Rc<Env>, form: &Form) -> Result<Form> {
  cond_thread(env, form, true)
}

fn cond_thread_last(env: &Rc<Env>, form: &Form) -> Result<Form> {
  cond_thread(env, form, false)
}

fn doto(env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let expr = args
    .first()
    .ok_or_else(|| Error::syntax("doto needs an expression"))?;
  let g = gensym(env, "g");
  let mut body = vec![Form::vector(vec![g.clone(), expr.clone()])];
  for step in &args[1..] {
    body.push(thread_into(g.clone(), step, true));
  }
  body.push(g);
  Ok(special("let*", body))
}

//
// Binding conditionals
//

fn let_bound_if(
  env: &Rc<Env>,
  form: &Form,
  macro_name: &str,
  nil_test: bool,
  keep_else: bool,
) -> Result<Form> {
  let args = args_of(form);
  let binding_forms = args
    .first()
    .and_then(|f| f.as_vector())
    .filter(|v| v.len() == 2)
    .ok_or_else(|| {
      Error::syntax(format!(
        "{} requires a binding vector of two forms",
        macro_name
      ))
    })?;
  let pattern = binding_forms[0].clone();
  let test_expr = binding_forms[1].clone();
  let then = args
    .get(1)
    .cloned()
    .ok_or_else(|| Error::syntax(format!("{} needs a then branch", macro_name)))?;
  let els = if keep_else {
    args.get(2).cloned().unwrap_or_else(Form::nil)
  } else {
    Form::nil()
  };
  let temp = gensym(env, "temp");
  let condition = if nil_test {
    core("some?", vec![temp.clone()])
  } else {
    temp.clone()
  };
  Ok(special(
    "let*",
    vec![
      Form::vector(vec![temp.clone(), test_expr]),
      special(
        "if",
        vec![
          condition,
          special(
            "let*",
            vec![Form::vector(vec![pattern, temp]), then],
          ),
          els,
        ],
      ),
    ],
  ))
}

fn if_let(env: &Rc<Env>, form: &Form) -> Result<Form> {
  let_bound_if(env, form, "if-let", false, true)
}

fn when_let(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let binding = args
    .first()
    .cloned()
    .ok_or_else(|| Error::syntax("when-let needs bindings"))?;
  let body = do_block(args[1..].to_vec());
  let rewritten = call(
    Form::core_sym("if-let"),
    vec![binding, body],
  );
  Ok(rewritten)
}

fn if_some(env: &Rc<Env>, form: &Form) -> Result<Form> {
  let_bound_if(env, form, "if-some", true, true)
}

fn when_some(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let binding = args
    .first()
    .cloned()
    .ok_or_else(|| Error::syntax("when-some needs bindings"))?;
  let body = do_block(args[1..].to_vec());
  Ok(call(
    Form::core_sym("if-some"),
    vec![binding, body],
  ))
}

fn when_first(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let binding_forms = args
    .first()
    .and_then(|f| f.as_vector())
    .filter(|v| v.len() == 2)
    .ok_or_else(|| {
      Error::syntax("when-first requires [binding coll]")
    })?;
  let pattern = binding_forms[0].clone();
  let coll = binding_forms[1].clone();
  let mut body =
    vec![Form::vector(vec![
      pattern,
      core("first", vec![Form::sym("when_first__seq")]),
    ])];
  body.extend(args[1..].iter().cloned());
  Ok(call(
    Form::core_sym("when-let"),
    vec![
      Form::vector(vec![
        Form::sym("when_first__seq"),
        core("seq", vec![coll]),
      ]),
      special("let*", body),
    ],
  ))
}

fn assert_args(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let mut checks = Vec::new();
  for pair in args.chunks(2) {
    if pair.len() < 2 {
      break;
    }
    checks.push(special(
      "if",
      vec![
        pair[0].clone(),
        Form::nil(),
        special(
          "throw",
          vec![special(
            "new",
            vec![
              Form::sym("IllegalArgumentException"),
              pair[1].clone(),
            ],
          )],
        ),
      ],
    ));
  }
  checks.push(Form::nil());
  Ok(do_block(checks))
}

//
// Dynamic binding family
//

fn binding(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let binding_forms = args
    .first()
    .and_then(|f| f.as_vector())
    .ok_or_else(|| Error::syntax("binding needs a vector"))?;
  if binding_forms.len() % 2 != 0 {
    return Err(Error::syntax("binding pairs must be even"));
  }
  let mut map_args = Vec::with_capacity(binding_forms.len());
  for pair in binding_forms.chunks(2) {
    map_args.push(special("var", vec![pair[0].clone()]));
    map_args.push(pair[1].clone());
  }
  Ok(do_block(vec![
    core(
      "push-thread-bindings",
      vec![core("hash-map", map_args)],
    ),
    special(
      "try",
      {
        let mut try_forms = args[1..].to_vec();
        try_forms.push(Form::list(vec![
          Form::sym("finally"),
          core("pop-thread-bindings", vec![]),
        ]));
        try_forms
      },
    ),
  ]))
}

fn with_bindings(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let map_expr = args
    .first()
    .cloned()
    .ok_or_else(|| Error::syntax("with-bindings needs a map"))?;
  Ok(do_block(vec![
    core("push-thread-bindings", vec![map_expr]),
    special("try", {
      let mut try_forms = args[1..].to_vec();
      try_forms.push(Form::list(vec![
        Form::sym("finally"),
        core("pop-thread-bindings", vec![]),
      ]));
      try_forms
    }),
  ]))
}

fn bound_fn(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let mut fn_forms = vec![Form::sym("fn*")];
  fn_forms.extend(args.iter().cloned());
  Ok(core("bound-fn*", vec![Form::list(fn_forms)]))
}

fn with_local_vars(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let binding_forms = args
    .first()
    .and_then(|f| f.as_vector())
    .ok_or_else(|| Error::syntax("with-local-vars needs a vector"))?;
  let mut bindings = Vec::with_capacity(binding_forms.len());
  for pair in binding_forms.chunks(2) {
    if pair.len() < 2 {
      return Err(Error::syntax("with-local-vars pairs must be even"));
    }
    bindings.push(pair[0].clone());
    bindings.push(core("__local-var", vec![pair[1].clone()]));
  }
  let mut body = vec![Form::vector(bindings)];
  body.extend(args[1..].iter().cloned());
  Ok(special("let*", body))
}

fn with_redefs(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let binding_forms = args
    .first()
    .and_then(|f| f.as_vector())
    .ok_or_else(|| Error::syntax("with-redefs needs a vector"))?;
  let mut map_args = Vec::with_capacity(binding_forms.len());
  for pair in binding_forms.chunks(2) {
    if pair.len() < 2 {
      return Err(Error::syntax("with-redefs pairs must be even"));
    }
    map_args.push(special("var", vec![pair[0].clone()]));
    map_args.push(pair[1].clone());
  }
  let mut fn_forms = vec![Form::sym("fn*"), Form::vector(vec![])];
  fn_forms.extend(args[1..].iter().cloned());
  Ok(core(
    "with-redefs-fn",
    vec![core("hash-map", map_args), Form::list(fn_forms)],
  ))
}

//
// defn and friends
//

struct DefnParts {
  name: Form,
  meta_entries: Vec<Form>,
  arities: Vec<Form>,
}

fn parse_defn(form: &Form, what: &str) -> Result<DefnParts> {
  let args = args_of(form);
  let name = args
    .first()
    .cloned()
    .filter(|f| f.is_symbol())
    .ok_or_else(|| {
      Error::syntax(format!("{} needs a symbol name", what))
    })?;
  let mut rest = &args[1..];
  let mut meta_entries: Vec<Form> = Vec::new();
  if let Some(doc) = rest.first().and_then(|f| f.as_str()) {
    meta_entries.push(Form::kw("doc"));
    meta_entries.push(Form::string(doc));
    rest = &rest[1..];
  }
  if let Some(FormKind::Map { forms }) =
    rest.first().map(|f| &f.kind)
  {
    meta_entries.extend(forms.iter().cloned());
    rest = &rest[1..];
  }
  // Single-arity [params] body... normalizes to ([params] body...).
  let mut arities: Vec<Form> = Vec::new();
  match rest.first().map(|f| &f.kind) {
    Some(FormKind::Vector { .. }) => {
      arities.push(Form::list(rest.to_vec()));
    }
    Some(FormKind::List { .. }) => {
      let mut tail = rest;
      // A trailing attr-map in the legacy position gets folded in.
      if let Some(FormKind::Map { forms }) =
        tail.last().map(|f| &f.kind)
      {
        meta_entries.extend(forms.iter().cloned());
        tail = &tail[..tail.len() - 1];
      }
      for arity in tail {
        if !arity.is_list() {
          return Err(Error::syntax(format!(
            "{} arities must be lists",
            what
          )));
        }
        arities.push(arity.clone());
      }
    }
    _ => {
      return Err(Error::syntax(format!(
        "{} needs a params vector or arity lists",
        what
      )));
    }
  }
  Ok(DefnParts {
    name,
    meta_entries,
    arities,
  })
}

fn defn_with(
  form: &Form,
  what: &str,
  private: bool,
) -> Result<Form> {
  let mut parts = parse_defn(form, what)?;
  if private {
    parts.meta_entries.push(Form::kw("private"));
    parts.meta_entries.push(Form::boolean(true));
  }
  let mut fn_forms = vec![Form::sym("fn*"), parts.name.clone()];
  fn_forms.extend(parts.arities);
  // All collected metadata rides on the defined name.
  let mut name = parts.name;
  if !parts.meta_entries.is_empty() {
    let mut merged: Vec<Form> = match name.meta() {
      Some(Form {
        kind: FormKind::Map { forms },
        ..
      }) => forms.clone(),
      _ => Vec::new(),
    };
    merged.extend(parts.meta_entries);
    name = name.with_meta(Form::map(merged));
  }
  Ok(special(
    "def",
    vec![name, Form::list(fn_forms)],
  ))
}

fn defn(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  defn_with(form, "defn", false)
}

fn defn_private(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  defn_with(form, "defn-", true)
}

fn defmacro(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let defined = defn_with(form, "defmacro", false)?;
  let name = args_of(form)[0].clone();
  Ok(do_block(vec![
    defined,
    core(
      "__set-macro!",
      vec![special("var", vec![name.clone()])],
    ),
    special("var", vec![name]),
  ]))
}

fn declare(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let mut defs: Vec<Form> = Vec::new();
  for name in args_of(form) {
    defs.push(special("def", vec![name.clone()]));
  }
  defs.push(Form::nil());
  Ok(do_block(defs))
}

fn defonce(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  if args.len() != 2 {
    return Err(Error::syntax("defonce takes a name and an init"));
  }
  Ok(special(
    "if",
    vec![
      core("__defonce-bound?", vec![quote(args[0].clone())]),
      Form::nil(),
      special("def", vec![args[0].clone(), args[1].clone()]),
    ],
  ))
}

//
// Cells and laziness
//

fn vswap(env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  if args.len() < 2 {
    return Err(Error::syntax("vswap! takes a volatile and a function"));
  }
  let g = gensym(env, "vol");
  let mut apply_args =
    vec![args[1].clone(), core("deref", vec![g.clone()])];
  apply_args.extend(args[2..].iter().cloned());
  Ok(special(
    "let*",
    vec![
      Form::vector(vec![g.clone(), args[0].clone()]),
      core(
        "vreset!",
        vec![g, Form::list(apply_args)],
      ),
    ],
  ))
}

fn delay(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let mut fn_forms = vec![Form::sym("fn*"), Form::vector(vec![])];
  fn_forms.extend(args_of(form).iter().cloned());
  Ok(core("__delay-create", vec![Form::list(fn_forms)]))
}

fn lazy_seq(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let mut fn_forms = vec![Form::sym("fn*"), Form::vector(vec![])];
  fn_forms.extend(args_of(form).iter().cloned());
  Ok(core("__lazy-seq", vec![Form::list(fn_forms)]))
}

fn lazy_cat(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let mut cat_args = Vec::new();
  for arg in args_of(form) {
    cat_args.push(call(
      Form::core_sym("lazy-seq"),
      vec![arg.clone()],
    ));
  }
  Ok(core("concat", cat_args))
}

fn dotimes(env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let binding_forms = args
    .first()
    .and_then(|f| f.as_vector())
    .filter(|v| v.len() == 2)
    .ok_or_else(|| Error::syntax("dotimes requires [name count]"))?;
  let i = binding_forms[0].clone();
  let n = gensym(env, "n");
  let mut body = args[1..].to_vec();
  body.push(special(
    "recur",
    vec![core("inc", vec![i.clone()])],
  ));
  Ok(special(
    "let*",
    vec![
      Form::vector(vec![
        n.clone(),
        core("long", vec![binding_forms[1].clone()]),
      ]),
      special(
        "loop*",
        vec![
          Form::vector(vec![i.clone(), Form::int(0)]),
          special(
            "if",
            vec![
              core("<", vec![i, n]),
              do_block(body),
              Form::nil(),
            ],
          ),
        ],
      ),
    ],
  ))
}

//
// Timing, locking, sync shims
//

fn time(env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let expr = args
    .first()
    .cloned()
    .ok_or_else(|| Error::syntax("time needs an expression"))?;
  let start = gensym(env, "start");
  let ret = gensym(env, "ret");
  Ok(special(
    "let*",
    vec![
      Form::vector(vec![
        start.clone(),
        core("__nano-time", vec![]),
        ret.clone(),
        expr,
      ]),
      core(
        "println",
        vec![core(
          "str",
          vec![
            Form::string("Elapsed time: "),
            core(
              "/",
              vec![
                core(
                  "-",
                  vec![core("__nano-time", vec![]), start],
                ),
                Form::float(1.0e6),
              ],
            ),
            Form::string(" msecs"),
          ],
        )],
      ),
      ret,
    ],
  ))
}

fn locking(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  // One cooperative thread: evaluate the monitor expression for its
  // effects, then the body.
  let args = args_of(form);
  let monitor = args
    .first()
    .cloned()
    .ok_or_else(|| Error::syntax("locking needs an object"))?;
  let mut body = vec![monitor];
  body.extend(args[1..].iter().cloned());
  Ok(do_block(body))
}

fn implicit_do(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  Ok(do_block(args_of(form).to_vec()))
}

fn sync_(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  // (sync flags-ignored body...): the flags expression is never
  // evaluated.
  let args = args_of(form);
  Ok(do_block(args[1..].to_vec()))
}

fn io_bang(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let mut args = args_of(form);
  if args.first().map(|f| f.as_str().is_some()).unwrap_or(false) {
    args = &args[1..];
  }
  Ok(do_block(args.to_vec()))
}

fn with_precision(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let precision = args
    .first()
    .cloned()
    .ok_or_else(|| Error::syntax("with-precision needs a precision"))?;
  let mut body = &args[1..];
  if body.first().map(|f| f.is_kw_named("rounding")).unwrap_or(false)
  {
    body = &body[2..];
  }
  let mut binding_body =
    vec![Form::vector(vec![
      Form::sym("*math-context*"),
      precision,
    ])];
  binding_body.extend(body.iter().cloned());
  Ok(call(Form::core_sym("binding"), binding_body))
}

fn with_open(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let binding_forms = args
    .first()
    .and_then(|f| f.as_vector())
    .ok_or_else(|| Error::syntax("with-open needs a binding vector"))?;
  if binding_forms.len() % 2 != 0 {
    return Err(Error::syntax("with-open pairs must be even"));
  }
  if binding_forms.is_empty() {
    return Ok(do_block(args[1..].to_vec()));
  }
  let name = binding_forms[0].clone();
  let init = binding_forms[1].clone();
  let mut inner = vec![Form::vector(binding_forms[2..].to_vec())];
  inner.extend(args[1..].iter().cloned());
  Ok(special(
    "let*",
    vec![
      Form::vector(vec![name.clone(), init]),
      special(
        "try",
        vec![
          call(Form::core_sym("with-open"), inner),
          Form::list(vec![
            Form::sym("finally"),
            special(
              ".",
              vec![name, Form::sym("close")],
            ),
          ]),
        ],
      ),
    ],
  ))
}

fn with_out_str(env: &Rc<Env>, form: &Form) -> Result<Form> {
  let sb = gensym(env, "s");
  let mut binding_body = vec![Form::vector(vec![
    Form::sym("*out*"),
    sb.clone(),
  ])];
  binding_body.extend(args_of(form).iter().cloned());
  Ok(special(
    "let*",
    vec![
      Form::vector(vec![
        sb.clone(),
        special("new", vec![Form::sym("StringBuilder")]),
      ]),
      call(Form::core_sym("binding"), binding_body),
      special(".", vec![sb, Form::sym("toString")]),
    ],
  ))
}

fn with_in_str(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let input = args
    .first()
    .cloned()
    .ok_or_else(|| Error::syntax("with-in-str needs a string"))?;
  let mut binding_body = vec![Form::vector(vec![
    Form::sym("*in*"),
    special("new", vec![Form::sym("StringBuilder"), input]),
  ])];
  binding_body.extend(args[1..].iter().cloned());
  Ok(call(Form::core_sym("binding"), binding_body))
}

fn condp(env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  if args.len() < 2 {
    return Err(Error::syntax("condp needs a predicate and an expression"));
  }
  let pred = gensym(env, "pred");
  let expr = gensym(env, "expr");
  let clauses = &args[2..];
  let body = condp_clauses(env, &pred, &expr, clauses)?;
  Ok(special(
    "let*",
    vec![
      Form::vector(vec![
        pred.clone(),
        args[0].clone(),
        expr.clone(),
        args[1].clone(),
      ]),
      body,
    ],
  ))
}

fn condp_clauses(
  env: &Rc<Env>,
  pred: &Form,
  expr: &Form,
  clauses: &[Form],
) -> Result<Form> {
  match clauses {
    [] => Ok(special(
      "throw",
      vec![special(
        "new",
        vec![
          Form::sym("IllegalArgumentException"),
          core(
            "str",
            vec![
              Form::string("no matching clause: "),
              expr.clone(),
            ],
          ),
        ],
      )],
    )),
    [default] => Ok(default.clone()),
    [test, arrow, result, rest @ ..]
      if arrow.is_kw_named(">>") =>
    {
      let matched = gensym(env, "match");
      Ok(special(
        "let*",
        vec![
          Form::vector(vec![
            matched.clone(),
            Form::list(vec![
              pred.clone(),
              test.clone(),
              expr.clone(),
            ]),
          ]),
          special(
            "if",
            vec![
              matched.clone(),
              Form::list(vec![result.clone(), matched]),
              condp_clauses(env, pred, expr, rest)?,
            ],
          ),
        ],
      ))
    }
    [test, result, rest @ ..] => Ok(special(
      "if",
      vec![
        Form::list(vec![
          pred.clone(),
          test.clone(),
          expr.clone(),
        ]),
        result.clone(),
        condp_clauses(env, pred, expr, rest)?,
      ],
    )),
  }
}

//
// Array-style loops over vectors
//

fn amap(env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  if args.len() != 4 {
    return Err(Error::syntax("amap takes [array idx ret expr]"));
  }
  let arr = gensym(env, "arr");
  let idx = args[1].clone();
  let ret = args[2].clone();
  Ok(special(
    "let*",
    vec![
      Form::vector(vec![
        arr.clone(),
        core("vec", vec![args[0].clone()]),
      ]),
      special(
        "loop*",
        vec![
          Form::vector(vec![
            idx.clone(),
            Form::int(0),
            ret.clone(),
            arr.clone(),
          ]),
          special(
            "if",
            vec![
              core(
                "<",
                vec![idx.clone(), core("count", vec![arr])],
              ),
              special(
                "recur",
                vec![
                  core("inc", vec![idx.clone()]),
                  core(
                    "assoc",
                    vec![ret.clone(), idx, args[3].clone()],
                  ),
                ],
              ),
              ret,
            ],
          ),
        ],
      ),
    ],
  ))
}

fn areduce(env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  if args.len() != 5 {
    return Err(Error::syntax(
      "areduce takes [array idx ret init expr]",
    ));
  }
  let arr = gensym(env, "arr");
  let idx = args[1].clone();
  let ret = args[2].clone();
  Ok(special(
    "let*",
    vec![
      Form::vector(vec![
        arr.clone(),
        core("vec", vec![args[0].clone()]),
      ]),
      special(
        "loop*",
        vec![
          Form::vector(vec![
            idx.clone(),
            Form::int(0),
            ret.clone(),
            args[3].clone(),
          ]),
          special(
            "if",
            vec![
              core(
                "<",
                vec![idx.clone(), core("count", vec![arr])],
              ),
              special(
                "recur",
                vec![core("inc", vec![idx]), args[4].clone()],
              ),
              ret,
            ],
          ),
        ],
      ),
    ],
  ))
}

//
// Same-thread concurrency shims
//

fn future(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let mut fn_forms = vec![Form::sym("fn*"), Form::vector(vec![])];
  fn_forms.extend(args_of(form).iter().cloned());
  Ok(core("__future-call", vec![Form::list(fn_forms)]))
}

fn pvalues(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  Ok(core("list", args_of(form).to_vec()))
}

fn defstruct(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let name = args
    .first()
    .cloned()
    .ok_or_else(|| Error::syntax("defstruct needs a name"))?;
  let keys: Vec<Form> = args[1..].to_vec();
  Ok(special(
    "def",
    vec![name, quote(Form::vector(keys))],
  ))
}

//
// letfn, protocols, multimethods
//

fn letfn(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let fn_specs = args
    .first()
    .and_then(|f| f.as_vector())
    .ok_or_else(|| Error::syntax("letfn needs a vector of fn specs"))?;
  let mut bindings = Vec::with_capacity(fn_specs.len() * 2);
  for spec in fn_specs {
    let spec_forms = spec.as_list().ok_or_else(|| {
      Error::syntax("letfn specs must be (name [params] body...)")
    })?;
    let name = spec_forms
      .first()
      .cloned()
      .filter(|f| f.is_symbol())
      .ok_or_else(|| Error::syntax("letfn spec needs a name"))?;
    let mut fn_forms = vec![Form::sym("fn*"), name.clone()];
    fn_forms.extend(spec_forms[1..].iter().cloned());
    bindings.push(name);
    bindings.push(Form::list(fn_forms));
  }
  let mut out = vec![Form::vector(bindings)];
  out.extend(args[1..].iter().cloned());
  Ok(special("letfn*", out))
}

fn defprotocol(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let name = args
    .first()
    .and_then(|f| f.as_symbol())
    .map(|(_, n)| n.to_string())
    .ok_or_else(|| Error::syntax("defprotocol needs a name"))?;
  let mut defs: Vec<Form> = vec![special(
    "def",
    vec![
      args[0].clone(),
      Form::string(name.clone()),
    ],
  )];
  for sig in &args[1..] {
    // Either (method [args]*) or a docstring we ignore.
    let Some(sig_forms) = sig.as_list() else {
      continue;
    };
    let Some(method) = sig_forms.first().filter(|f| f.is_symbol())
    else {
      continue;
    };
    defs.push(special(
      "def",
      vec![
        method.clone(),
        core(
          "__protocol-method",
          vec![
            Form::string(name.clone()),
            quote(method.clone()),
          ],
        ),
      ],
    ));
  }
  defs.push(Form::nil());
  Ok(do_block(defs))
}

fn extend_type(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let type_sym = args
    .first()
    .cloned()
    .filter(|f| f.is_symbol() || f.is_nil())
    .ok_or_else(|| Error::syntax("extend-type needs a type symbol"))?;
  let mut out: Vec<Form> = Vec::new();
  for item in &args[1..] {
    match &item.kind {
      // Protocol names punctuate the method groups; nothing to emit.
      FormKind::Symbol { .. } => (),
      FormKind::List { forms } if !forms.is_empty() => {
        let method = forms[0].clone();
        let mut fn_forms = vec![Form::sym("fn*")];
        fn_forms.extend(forms[1..].iter().cloned());
        out.push(core(
          "__extend-method",
          vec![
            method,
            quote(type_sym.clone()),
            Form::list(fn_forms),
          ],
        ));
      }
      _ => {
        return Err(Error::syntax("malformed extend-type body"));
      }
    }
  }
  out.push(Form::nil());
  Ok(do_block(out))
}

fn extend_protocol(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let protocol = args
    .first()
    .cloned()
    .ok_or_else(|| Error::syntax("extend-protocol needs a protocol"))?;
  let mut out: Vec<Form> = Vec::new();
  let mut current: Option<(Form, Vec<Form>)> = None;
  for item in &args[1..] {
    match &item.kind {
      FormKind::Symbol { .. } | FormKind::Nil => {
        if let Some((type_sym, methods)) = current.take() {
          out.push(extend_type_call(&protocol, type_sym, methods));
        }
        current = Some((item.clone(), Vec::new()));
      }
      FormKind::List { .. } => match &mut current {
        Some((_, methods)) => methods.push(item.clone()),
        None => {
          return Err(Error::syntax(
            "extend-protocol methods must follow a type symbol",
          ));
        }
      },
      _ => {
        return Err(Error::syntax("malformed extend-protocol body"));
      }
    }
  }
  if let Some((type_sym, methods)) = current.take() {
    out.push(extend_type_call(&protocol, type_sym, methods));
  }
  out.push(Form::nil());
  Ok(do_block(out))
}

fn extend_type_call(
  protocol: &Form,
  type_sym: Form,
  methods: Vec<Form>,
) -> Form {
  let mut forms = vec![
    Form::core_sym("extend-type"),
    type_sym,
    protocol.clone(),
  ];
  forms.extend(methods);
  Form::list(forms)
}

fn defmulti(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let name = args
    .first()
    .cloned()
    .filter(|f| f.is_symbol())
    .ok_or_else(|| Error::syntax("defmulti needs a name"))?;
  // Skip an optional docstring before the dispatch function.
  let mut rest = &args[1..];
  if rest.first().map(|f| f.as_str().is_some()).unwrap_or(false) {
    rest = &rest[1..];
  }
  let dispatch = rest
    .first()
    .cloned()
    .ok_or_else(|| Error::syntax("defmulti needs a dispatch fn"))?;
  let (_, name_str) = name.as_symbol().unwrap();
  Ok(special(
    "def",
    vec![
      name.clone(),
      core(
        "__make-multi",
        vec![Form::string(name_str), dispatch],
      ),
    ],
  ))
}

fn defmethod(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  if args.len() < 3 {
    return Err(Error::syntax(
      "defmethod takes a multifn, a dispatch value, and a fn tail",
    ));
  }
  let mut fn_forms = vec![Form::sym("fn*")];
  fn_forms.extend(args[2..].iter().cloned());
  Ok(core(
    "__add-method",
    vec![
      args[0].clone(),
      quote(args[1].clone()),
      Form::list(fn_forms),
    ],
  ))
}

//
// Namespace forms
//

fn refer_clojure(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let mut quoted = Vec::new();
  for arg in args_of(form) {
    quoted.push(quote(arg.clone()));
  }
  Ok(core("__refer-clojure", quoted))
}

fn ns(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let name = args
    .first()
    .cloned()
    .filter(|f| f.is_symbol())
    .ok_or_else(|| Error::syntax("ns needs a name symbol"))?;
  let mut out: Vec<Form> =
    vec![core("in-ns", vec![quote(name)])];
  for clause in &args[1..] {
    let Some(clause_forms) = clause.as_list() else {
      // Docstrings and attr-maps in the header are skipped.
      continue;
    };
    let Some((None, kind)) =
      clause_forms.first().and_then(|f| f.as_keyword())
    else {
      continue;
    };
    match kind {
      "refer-clojure" => {
        let mut quoted = Vec::new();
        for arg in &clause_forms[1..] {
          quoted.push(quote(arg.clone()));
        }
        out.push(core("__refer-clojure", quoted));
      }
      "require" | "use" => {
        for spec in &clause_forms[1..] {
          out.push(core("__ns-reference", vec![quote(spec.clone())]));
        }
      }
      // No class loading in this core.
      "import" | "gen-class" | "load" => (),
      _ => (),
    }
  }
  out.push(Form::nil());
  Ok(do_block(out))
}

fn with_pprint_dispatch(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let dispatch = args
    .first()
    .cloned()
    .ok_or_else(|| Error::syntax("with-pprint-dispatch needs a function"))?;
  let mut fn_forms = vec![Form::sym("fn*"), Form::vector(vec![])];
  fn_forms.extend(args[1..].iter().cloned());
  Ok(core(
    "with-pprint-dispatch*",
    vec![dispatch, Form::list(fn_forms)],
  ))
}

//
// let / loop / fn surface forms
//

fn rename_let(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  Ok(special("let*", args_of(form).to_vec()))
}

fn rename_fn(_env: &Rc<Env>, form: &Form) -> Result<Form> {
  Ok(special("fn*", args_of(form).to_vec()))
}

/// `loop` peels destructuring out of the loop head so `recur` keeps the
/// user's arity: destructured targets loop on hidden gensyms and rebind
/// inside the body.
fn loop_(env: &Rc<Env>, form: &Form) -> Result<Form> {
  let args = args_of(form);
  let binding_forms = args
    .first()
    .and_then(|f| f.as_vector())
    .ok_or_else(|| Error::syntax("loop needs a binding vector"))?;
  if binding_forms.len() % 2 != 0 {
    return Err(Error::syntax("loop bindings must be pairs"));
  }
  let all_symbols = binding_forms
    .chunks(2)
    .all(|pair| matches!(pair[0].as_symbol(), Some((None, _))));
  if all_symbols {
    return Ok(special("loop*", args_of(form).to_vec()));
  }
  let mut outer = Vec::new();
  let mut loop_head = Vec::new();
  let mut inner = Vec::new();
  for pair in binding_forms.chunks(2) {
    match pair[0].as_symbol() {
      Some((None, _)) => {
        outer.push(pair[0].clone());
        outer.push(pair[1].clone());
        loop_head.push(pair[0].clone());
        loop_head.push(pair[0].clone());
      }
      _ => {
        let g = gensym(env, "loop");
        outer.push(g.clone());
        outer.push(pair[1].clone());
        loop_head.push(g.clone());
        loop_head.push(g.clone());
        inner.push(pair[0].clone());
        inner.push(g);
      }
    }
  }
  let mut body = vec![Form::vector(inner)];
  body.extend(args[1..].iter().cloned());
  Ok(special(
    "let*",
    vec![
      Form::vector(outer),
      special(
        "loop*",
        vec![Form::vector(loop_head), special("let*", body)],
      ),
    ],
  ))
}
