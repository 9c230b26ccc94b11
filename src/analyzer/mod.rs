// analyzer/mod.rs
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

//! Lowers macro-expanded forms to the small special-operator tree the
//! evaluator interprets.  Anything that is not one of the special
//! operators is an ordinary call.  Destructuring in `let*`, `loop*`, and
//! `fn*` parameter vectors is rewritten away here, and `recur` is checked
//! for tail position with the matching arity.

use std::collections::HashMap;
use std::rc::Rc;

use crate::{
  env::{Env, Var},
  error::{Error, Result},
  expand::destructure,
  reader::form::{Form, FormKind},
  value::{self, Value},
};

use FormKind as K;

#[derive(Clone, Debug)]
pub enum Ast {
  Const(Value),
  LocalRef {
    name: Rc<str>,
  },
  VarRef {
    var: Rc<Var>,
  },
  TheVar {
    var: Rc<Var>,
  },
  If {
    test: Box<Ast>,
    then: Box<Ast>,
    els: Option<Box<Ast>>,
  },
  Do {
    body: Vec<Ast>,
  },
  Let {
    bindings: Vec<(Rc<str>, Ast)>,
    body: Vec<Ast>,
  },
  Loop {
    bindings: Vec<(Rc<str>, Ast)>,
    body: Vec<Ast>,
  },
  Recur {
    args: Vec<Ast>,
  },
  LetFn {
    bindings: Vec<(Rc<str>, Ast)>,
    body: Vec<Ast>,
  },
  Fn {
    name: Option<Rc<str>>,
    arities: Vec<Rc<FnArity>>,
    variadic: Option<Rc<FnArity>>,
  },
  Def {
    var: Rc<Var>,
    init: Option<Box<Ast>>,
    meta: Option<Box<Ast>>,
    dynamic: bool,
  },
  Throw {
    expr: Box<Ast>,
  },
  Try {
    body: Vec<Ast>,
    catches: Vec<CatchClause>,
    finally: Option<Vec<Ast>>,
  },
  SetBang {
    var: Rc<Var>,
    expr: Box<Ast>,
  },
  Case {
    expr: Box<Ast>,
    shift: u32,
    mask: i64,
    test_kind: CaseTestKind,
    buckets: HashMap<i64, Vec<(Value, Ast)>>,
    default: Box<Ast>,
  },
  Invoke {
    f: Box<Ast>,
    args: Vec<Ast>,
  },
  New {
    class: Rc<str>,
    args: Vec<Ast>,
  },
  HostCall {
    target: Box<Ast>,
    method: Rc<str>,
    args: Vec<Ast>,
  },
  Reify {
    tag: Rc<str>,
    methods: Vec<(Rc<str>, Box<Ast>)>,
  },
  VectorLit {
    items: Vec<Ast>,
  },
  MapLit {
    pairs: Vec<(Ast, Ast)>,
  },
  SetLit {
    items: Vec<Ast>,
  },
}

#[derive(Clone, Debug)]
pub struct CatchClause {
  pub class: Rc<str>,
  pub binding: Rc<str>,
  pub body: Vec<Ast>,
}

/// How `case*` compares a candidate against bucket tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaseTestKind {
  Int,
  Identity,
  Equiv,
}

/// One analyzed `fn*` arity.
#[derive(Clone, Debug)]
pub struct FnArity {
  pub params: Vec<Rc<str>>,
  pub rest: Option<Rc<str>>,
  pub body: Vec<Ast>,
}

/// Names the evaluator treats as operators rather than functions.
pub const SPECIAL_FORMS: &[&str] = &[
  "def",
  "if",
  "do",
  "let*",
  "loop*",
  "recur",
  "fn*",
  "quote",
  "var",
  "try",
  "catch",
  "finally",
  "throw",
  "new",
  ".",
  "set!",
  "monitor-enter",
  "monitor-exit",
  "case*",
  "reify",
  "letfn*",
  "deftype*",
];

pub fn is_special(name: &str) -> bool {
  SPECIAL_FORMS.contains(&name)
}

pub fn analyze(env: &Rc<Env>, form: &Form) -> Result<Ast> {
  let mut analyzer = Analyzer {
    env,
    locals: Vec::new(),
  };
  analyzer.form(form, Tail::No)
}

/// Tail context: `Tail::Of(n)` marks positions where a `recur` with `n`
/// targets may appear.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Tail {
  No,
  Of(usize),
}

struct Analyzer<'e> {
  env: &'e Rc<Env>,
  /// Lexically visible local names, innermost last.
  locals: Vec<Rc<str>>,
}

impl<'e> Analyzer<'e> {
  fn form(&mut self, form: &Form, tail: Tail) -> Result<Ast> {
    match &form.kind {
      K::Symbol { namespace, name } => {
        self.symbol(namespace.as_deref(), name)
      }
      K::List { forms } => {
        if forms.is_empty() {
          return Ok(Ast::Const(Value::empty_list()));
        }
        self.list(form, forms, tail)
      }
      K::Vector { forms } => {
        if is_constant_coll(forms) {
          return Ok(Ast::Const(value::form_to_value(form)?));
        }
        Ok(Ast::VectorLit {
          items: self.all(forms)?,
        })
      }
      K::Map { forms } => {
        if is_constant_coll(forms) {
          return Ok(Ast::Const(value::form_to_value(form)?));
        }
        let mut pairs = Vec::with_capacity(forms.len() / 2);
        for pair in forms.chunks(2) {
          pairs.push((
            self.form(&pair[0], Tail::No)?,
            self.form(&pair[1], Tail::No)?,
          ));
        }
        Ok(Ast::MapLit { pairs })
      }
      K::Set { forms } => {
        if is_constant_coll(forms) {
          return Ok(Ast::Const(value::form_to_value(form)?));
        }
        Ok(Ast::SetLit {
          items: self.all(forms)?,
        })
      }
      _ => Ok(Ast::Const(value::form_to_value(form)?)),
    }
  }

  fn all(&mut self, forms: &[Form]) -> Result<Vec<Ast>> {
    forms.iter().map(|f| self.form(f, Tail::No)).collect()
  }

  fn symbol(
    &mut self,
    namespace: Option<&str>,
    name: &str,
  ) -> Result<Ast> {
    if namespace.is_none() && self.is_local(name) {
      return Ok(Ast::LocalRef { name: name.into() });
    }
    let var = self.env.resolve_or_err(namespace, name)?;
    if var.is_macro() {
      return Err(Error::syntax(format!(
        "can't take value of a macro: {}",
        var.qualified_name()
      )));
    }
    Ok(Ast::VarRef { var })
  }

  fn is_local(&self, name: &str) -> bool {
    self.locals.iter().any(|l| l.as_ref() == name)
  }

  fn list(
    &mut self,
    whole: &Form,
    forms: &[Form],
    tail: Tail,
  ) -> Result<Ast> {
    let head = &forms[0];
    let args = &forms[1..];
    if let Some((None, name)) = head.as_symbol() {
      // A local shadows any special form except the unforgeable core.
      if !self.is_local(name) {
        match name {
          "def" => return self.def(args),
          "if" => return self.if_(args, tail),
          "do" => return Ok(Ast::Do { body: self.body(args, tail)? }),
          "let*" => return self.let_(args, tail),
          "loop*" => return self.loop_(args),
          "recur" => return self.recur(whole, args, tail),
          "fn*" => return self.fn_(args),
          "quote" => {
            let quoted = args.first().cloned().unwrap_or_else(Form::nil);
            return Ok(Ast::Const(value::form_to_value(&quoted)?));
          }
          "var" => return self.the_var(args),
          "try" => return self.try_(args),
          "throw" => {
            let expr = one_arg(args, "throw")?;
            return Ok(Ast::Throw {
              expr: Box::new(self.form(expr, Tail::No)?),
            });
          }
          "new" => return self.new_(args),
          "." => return self.host(args),
          "set!" => return self.set_bang(args),
          "monitor-enter" | "monitor-exit" => {
            // Single-threaded core: evaluate for effect, yield nil.
            let expr = one_arg(args, name)?;
            let inner = self.form(expr, Tail::No)?;
            return Ok(Ast::Do {
              body: vec![inner, Ast::Const(Value::Nil)],
            });
          }
          "case*" => return self.case_(args, tail),
          "reify" => return self.reify(args),
          "letfn*" => return self.letfn(args, tail),
          "deftype*" => return self.deftype(args),
          "catch" | "finally" => {
            return Err(Error::syntax(format!(
              "{} used outside try",
              name
            )));
          }
          _ => (),
        }
      }
    }
    let f = self.form(head, Tail::No)?;
    let mut call_args = Vec::with_capacity(args.len());
    for arg in args {
      call_args.push(self.form(arg, Tail::No)?);
    }
    Ok(Ast::Invoke {
      f: Box::new(f),
      args: call_args,
    })
  }

  /// Body sequence; only the last expression keeps the tail context.
  fn body(&mut self, forms: &[Form], tail: Tail) -> Result<Vec<Ast>> {
    if forms.is_empty() {
      return Ok(vec![Ast::Const(Value::Nil)]);
    }
    let mut out = Vec::with_capacity(forms.len());
    for form in &forms[..forms.len() - 1] {
      out.push(self.form(form, Tail::No)?);
    }
    out.push(self.form(&forms[forms.len() - 1], tail)?);
    Ok(out)
  }

  fn def(&mut self, args: &[Form]) -> Result<Ast> {
    let name_form = args
      .first()
      .ok_or_else(|| Error::syntax("def needs a symbol"))?;
    let (ns, name) = name_form
      .as_symbol()
      .ok_or_else(|| Error::syntax("first argument to def must be a symbol"))?;
    if let Some(ns) = ns {
      if ns != self.env.current_ns().name().as_ref() {
        return Err(Error::syntax(format!(
          "can't def {}/{} outside its namespace",
          ns, name
        )));
      }
    }
    if args.len() > 3 {
      return Err(Error::syntax("too many arguments to def"));
    }
    // A docstring slot: (def sym "doc" init).
    let (doc, init_form) = match args.len() {
      3 => (args[1].as_str(), Some(&args[2])),
      2 => (None, Some(&args[1])),
      _ => (None, None),
    };
    let var = self.env.current_ns().intern(name.into());
    let mut dynamic = false;
    let meta = match name_form.meta() {
      Some(meta_form) => {
        if let K::Map { forms } = &meta_form.kind {
          for pair in forms.chunks(2) {
            if pair[0].is_kw_named("dynamic")
              && matches!(pair[1].kind, K::Boolean { value: true })
            {
              dynamic = true;
            }
          }
        }
        let mut meta_form = meta_form.clone();
        if let (Some(doc), K::Map { forms }) =
          (doc, &mut meta_form.kind)
        {
          forms.push(Form::kw("doc"));
          forms.push(Form::string(doc));
        }
        Some(Box::new(self.form(&meta_form, Tail::No)?))
      }
      None => doc.map(|doc| {
        Box::new(Ast::Const(Value::map_from_pairs(vec![(
          Value::kw("doc"),
          Value::string(doc),
        )])))
      }),
    };
    // Names like *out* follow the earmuffs convention only through
    // explicit ^:dynamic; the analyzer does not guess.
    let init = match init_form {
      Some(form) => Some(Box::new(self.form(form, Tail::No)?)),
      None => None,
    };
    Ok(Ast::Def {
      var,
      init,
      meta,
      dynamic,
    })
  }

  fn if_(&mut self, args: &[Form], tail: Tail) -> Result<Ast> {
    if args.len() < 2 || args.len() > 3 {
      return Err(Error::syntax("if takes a test, a then, and an optional else"));
    }
    Ok(Ast::If {
      test: Box::new(self.form(&args[0], Tail::No)?),
      then: Box::new(self.form(&args[1], tail)?),
      els: match args.get(2) {
        Some(e) => Some(Box::new(self.form(e, tail)?)),
        None => None,
      },
    })
  }

  /// Shared by `let*` and the binding half of `loop*`.  Destructuring
  /// binding forms are flattened to primitive symbol binds first.
  fn binding_pairs(
    &mut self,
    binding_form: &Form,
  ) -> Result<Vec<(Rc<str>, Ast)>> {
    let binding_forms = binding_form.as_vector().ok_or_else(|| {
      Error::syntax("bindings must be a vector")
    })?;
    if binding_forms.len() % 2 != 0 {
      return Err(Error::syntax(
        "bindings must come in name/value pairs",
      ));
    }
    let mut flat: Vec<(Form, Form)> = Vec::new();
    for pair in binding_forms.chunks(2) {
      destructure::flatten_binding(
        self.env,
        &pair[0],
        &pair[1],
        &mut flat,
      )?;
    }
    let mut out = Vec::with_capacity(flat.len());
    for (name_form, init_form) in flat {
      let (_, name) = name_form.as_symbol().ok_or_else(|| {
        Error::syntax("binding target must be a symbol")
      })?;
      let init = self.form(&init_form, Tail::No)?;
      // Bind after analyzing the init so the init sees the outer scope.
      self.locals.push(name.into());
      out.push((name.into(), init));
    }
    Ok(out)
  }

  fn let_(&mut self, args: &[Form], tail: Tail) -> Result<Ast> {
    let depth = self.locals.len();
    let binding_form = args
      .first()
      .ok_or_else(|| Error::syntax("let* needs a binding vector"))?;
    let bindings = self.binding_pairs(binding_form)?;
    let body = self.body(&args[1..], tail)?;
    self.locals.truncate(depth);
    Ok(Ast::Let { bindings, body })
  }

  fn loop_(&mut self, args: &[Form]) -> Result<Ast> {
    let depth = self.locals.len();
    let binding_form = args
      .first()
      .ok_or_else(|| Error::syntax("loop* needs a binding vector"))?;
    let bindings = self.binding_pairs(binding_form)?;
    let body = self.body(&args[1..], Tail::Of(bindings.len()))?;
    self.locals.truncate(depth);
    Ok(Ast::Loop { bindings, body })
  }

  fn recur(
    &mut self,
    whole: &Form,
    args: &[Form],
    tail: Tail,
  ) -> Result<Ast> {
    match tail {
      Tail::No => Err(Error::syntax(format!(
        "can only recur from tail position: {}",
        whole
      ))),
      Tail::Of(arity) => {
        if args.len() != arity {
          return Err(Error::syntax(format!(
            "recur with {} args, expected {}",
            args.len(),
            arity
          )));
        }
        Ok(Ast::Recur {
          args: self.all(args)?,
        })
      }
    }
  }

  fn fn_(&mut self, args: &[Form]) -> Result<Ast> {
    let mut rest = args;
    let mut name: Option<Rc<str>> = None;
    if let Some((None, n)) = rest.first().and_then(|f| f.as_symbol()) {
      name = Some(n.into());
      rest = &rest[1..];
    }
    // Either ([params] body...) directly or a series of arity lists.
    let arity_forms: Vec<&[Form]> = if rest
      .first()
      .map(|f| f.as_vector().is_some())
      .unwrap_or(false)
    {
      vec![rest]
    } else {
      let mut out = Vec::new();
      for form in rest {
        let forms = form.as_list().ok_or_else(|| {
          Error::syntax("fn* arity must be a list of params and body")
        })?;
        out.push(forms);
      }
      out
    };

    let depth = self.locals.len();
    if let Some(n) = &name {
      self.locals.push(n.clone());
    }
    let mut arities: Vec<Rc<FnArity>> = Vec::new();
    let mut variadic: Option<Rc<FnArity>> = None;
    for arity_form in arity_forms {
      let arity = self.fn_arity(arity_form)?;
      if arity.rest.is_some() {
        if variadic.is_some() {
          return Err(Error::syntax(
            "can't have more than one variadic overload",
          ));
        }
        variadic = Some(Rc::new(arity));
      } else {
        if arities
          .iter()
          .any(|a| a.params.len() == arity.params.len())
        {
          return Err(Error::syntax(
            "can't have two overloads with the same arity",
          ));
        }
        arities.push(Rc::new(arity));
      }
    }
    if let Some(v) = &variadic {
      if arities
        .iter()
        .any(|a| a.params.len() > v.params.len())
      {
        return Err(Error::syntax(
          "can't have a fixed arity with more params than the variadic one",
        ));
      }
    }
    self.locals.truncate(depth);
    if arities.is_empty() && variadic.is_none() {
      return Err(Error::syntax("fn* needs at least one arity"));
    }
    Ok(Ast::Fn {
      name,
      arities,
      variadic,
    })
  }

  fn fn_arity(&mut self, forms: &[Form]) -> Result<FnArity> {
    let params_form = forms
      .first()
      .ok_or_else(|| Error::syntax("fn* arity needs a param vector"))?;
    let param_forms = params_form.as_vector().ok_or_else(|| {
      Error::syntax("fn* params must be a vector")
    })?;

    let depth = self.locals.len();
    let mut params: Vec<Rc<str>> = Vec::new();
    let mut rest: Option<Rc<str>> = None;
    // Destructuring params land in a generated prelude let.
    let mut prelude: Vec<(Form, Form)> = Vec::new();
    let mut after_amp = false;
    for param in param_forms {
      if param.is_sym_named("&") {
        if after_amp {
          return Err(Error::syntax("only one & allowed in params"));
        }
        after_amp = true;
        continue;
      }
      let bound_name: Rc<str> = match param.as_symbol() {
        Some((None, name)) if name != "&" => name.into(),
        Some(_) => {
          return Err(Error::syntax(
            "fn* params must be unqualified symbols",
          ));
        }
        None => {
          // A destructuring pattern: bind a fresh name, flatten below.
          let fresh = self.env.auto_gensym("p");
          prelude.push((
            param.clone(),
            Form::symbol(None, fresh.clone()),
          ));
          fresh
        }
      };
      self.locals.push(bound_name.clone());
      if after_amp {
        if rest.is_some() {
          return Err(Error::syntax("only one rest param allowed"));
        }
        rest = Some(bound_name);
      } else {
        params.push(bound_name);
      }
    }
    if after_amp && rest.is_none() {
      return Err(Error::syntax("missing rest param after &"));
    }

    let body_forms = &forms[1..];
    let target_arity = params.len() + usize::from(rest.is_some());
    let body = if prelude.is_empty() {
      self.body(body_forms, Tail::Of(target_arity))?
    } else {
      // (fn* [[a b]] body) ≡ (fn* [p] (let* [[a b] p] body))
      let mut let_vec = Vec::with_capacity(prelude.len() * 2);
      for (pattern, source) in prelude {
        let_vec.push(pattern);
        let_vec.push(source);
      }
      let mut let_form = vec![
        Form::sym("let*"),
        Form::vector(let_vec),
      ];
      let_form.extend(body_forms.iter().cloned());
      let wrapped = Form::list(let_form);
      vec![self.form(&wrapped, Tail::Of(target_arity))?]
    };
    self.locals.truncate(depth);
    Ok(FnArity { params, rest, body })
  }

  fn the_var(&mut self, args: &[Form]) -> Result<Ast> {
    let sym = one_arg(args, "var")?;
    let (ns, name) = sym
      .as_symbol()
      .ok_or_else(|| Error::syntax("var needs a symbol"))?;
    let var = self.env.resolve_or_err(ns, name)?;
    Ok(Ast::TheVar { var })
  }

  fn try_(&mut self, args: &[Form]) -> Result<Ast> {
    let mut body_forms: Vec<Form> = Vec::new();
    let mut catches: Vec<CatchClause> = Vec::new();
    let mut finally: Option<Vec<Ast>> = None;
    for form in args {
      match form.as_call() {
        Some(("catch", catch_args)) => {
          if finally.is_some() {
            return Err(Error::syntax("finally must come last in try"));
          }
          let class_form = catch_args.first().ok_or_else(|| {
            Error::syntax("catch needs a class symbol")
          })?;
          let (_, class) = class_form.as_symbol().ok_or_else(|| {
            Error::syntax("catch class must be a symbol")
          })?;
          let binding_form = catch_args.get(1).ok_or_else(|| {
            Error::syntax("catch needs a binding symbol")
          })?;
          let (_, binding) =
            binding_form.as_symbol().ok_or_else(|| {
              Error::syntax("catch binding must be a symbol")
            })?;
          let depth = self.locals.len();
          self.locals.push(binding.into());
          let body = self.body(&catch_args[2..], Tail::No)?;
          self.locals.truncate(depth);
          catches.push(CatchClause {
            class: class.into(),
            binding: binding.into(),
            body,
          });
        }
        Some(("finally", finally_args)) => {
          if finally.is_some() {
            return Err(Error::syntax("only one finally allowed in try"));
          }
          finally = Some(self.body(finally_args, Tail::No)?);
        }
        _ => {
          if !catches.is_empty() || finally.is_some() {
            return Err(Error::syntax(
              "try body expressions must precede catch/finally",
            ));
          }
          body_forms.push(form.clone());
        }
      }
    }
    Ok(Ast::Try {
      body: self.body(&body_forms, Tail::No)?,
      catches,
      finally,
    })
  }

  fn new_(&mut self, args: &[Form]) -> Result<Ast> {
    let class_form = args
      .first()
      .ok_or_else(|| Error::syntax("new needs a class symbol"))?;
    let (_, class) = class_form
      .as_symbol()
      .ok_or_else(|| Error::syntax("new needs a class symbol"))?;
    Ok(Ast::New {
      class: class.into(),
      args: self.all(&args[1..])?,
    })
  }

  /// `(. target method args*)` and `(. target (method args*))`.
  fn host(&mut self, args: &[Form]) -> Result<Ast> {
    let target_form = args
      .first()
      .ok_or_else(|| Error::syntax(". needs a target"))?;
    let member = args
      .get(1)
      .ok_or_else(|| Error::syntax(". needs a member"))?;
    let (method, method_args): (Rc<str>, &[Form]) = match &member.kind {
      K::Symbol {
        namespace: None,
        name,
      } => (name.clone(), &args[2..]),
      K::List { forms } if !forms.is_empty() => {
        let (_, name) = forms[0].as_symbol().ok_or_else(|| {
          Error::syntax("method name must be a symbol")
        })?;
        (name.into(), &forms[1..])
      }
      _ => return Err(Error::syntax("malformed member expression")),
    };
    Ok(Ast::HostCall {
      target: Box::new(self.form(target_form, Tail::No)?),
      method,
      args: self.all(method_args)?,
    })
  }

  fn set_bang(&mut self, args: &[Form]) -> Result<Ast> {
    if args.len() != 2 {
      return Err(Error::syntax("set! takes a target and a value"));
    }
    let (ns, name) = args[0]
      .as_symbol()
      .ok_or_else(|| Error::syntax("set! target must be a symbol"))?;
    if ns.is_none() && self.is_local(name) {
      return Err(Error::syntax("can't set! a local binding"));
    }
    let var = self.env.resolve_or_err(ns, name)?;
    Ok(Ast::SetBang {
      var,
      expr: Box::new(self.form(&args[1], Tail::No)?),
    })
  }

  /// `(case* expr shift mask default case-map switch-type test-type
  /// skip-check?)`, the shape the case lowering emits.
  fn case_(&mut self, args: &[Form], tail: Tail) -> Result<Ast> {
    if args.len() < 7 {
      return Err(Error::syntax("malformed case*"));
    }
    let expr = self.form(&args[0], Tail::No)?;
    let shift = int_arg(&args[1], "case* shift")? as u32;
    let mask = int_arg(&args[2], "case* mask")?;
    let default = self.form(&args[3], tail)?;
    let K::Map { forms: entries } = &args[4].kind else {
      return Err(Error::syntax("case* table must be a map"));
    };
    let test_kind = match args[6].as_keyword() {
      Some((None, "int")) => CaseTestKind::Int,
      Some((None, "hash-identity")) => CaseTestKind::Identity,
      _ => CaseTestKind::Equiv,
    };
    let mut buckets: HashMap<i64, Vec<(Value, Ast)>> = HashMap::new();
    for entry in entries.chunks(2) {
      let key = int_arg(&entry[0], "case* bucket key")?;
      let pair_forms = entry[1].as_vector().ok_or_else(|| {
        Error::syntax("case* bucket must be a vector of test/then pairs")
      })?;
      let mut bucket = Vec::with_capacity(pair_forms.len() / 2);
      for pair in pair_forms.chunks(2) {
        let test = value::form_to_value(&pair[0])?;
        let then = self.form(&pair[1], tail)?;
        bucket.push((test, then));
      }
      buckets.insert(key, bucket);
    }
    Ok(Ast::Case {
      expr: Box::new(expr),
      shift,
      mask,
      test_kind,
      buckets,
      default: Box::new(default),
    })
  }

  /// `(reify tag-sym* (method [this args*] body*)*)`.  Tags become the
  /// instance's reified type string.
  fn reify(&mut self, args: &[Form]) -> Result<Ast> {
    let mut tags: Vec<&str> = Vec::new();
    let mut methods: Vec<(Rc<str>, Box<Ast>)> = Vec::new();
    for form in args {
      match &form.kind {
        K::Symbol {
          namespace: None,
          name,
        } => tags.push(name.as_ref()),
        K::List { forms } if !forms.is_empty() => {
          let (_, method_name) =
            forms[0].as_symbol().ok_or_else(|| {
              Error::syntax("reify method name must be a symbol")
            })?;
          let mut fn_forms = vec![Form::sym("fn*")];
          fn_forms.extend(forms[1..].iter().cloned());
          let f = self.fn_(&fn_forms[1..])?;
          methods.push((method_name.into(), Box::new(f)));
        }
        _ => {
          return Err(Error::syntax("malformed reify body"));
        }
      }
    }
    let tag: Rc<str> = if tags.is_empty() {
      format!("reify__{}", self.env.next_gensym_id()).into()
    } else {
      tags.join(" ").into()
    };
    Ok(Ast::Reify { tag, methods })
  }

  fn letfn(&mut self, args: &[Form], tail: Tail) -> Result<Ast> {
    let binding_forms = args
      .first()
      .and_then(|f| f.as_vector())
      .ok_or_else(|| Error::syntax("letfn* needs a binding vector"))?;
    if binding_forms.len() % 2 != 0 {
      return Err(Error::syntax("letfn* bindings must be pairs"));
    }
    let depth = self.locals.len();
    // All names are in scope inside every fn, including their own.
    for pair in binding_forms.chunks(2) {
      let (_, name) = pair[0].as_symbol().ok_or_else(|| {
        Error::syntax("letfn* binding target must be a symbol")
      })?;
      self.locals.push(name.into());
    }
    let mut bindings = Vec::with_capacity(binding_forms.len() / 2);
    for pair in binding_forms.chunks(2) {
      let (_, name) = pair[0].as_symbol().unwrap();
      let f = self.form(&pair[1], Tail::No)?;
      bindings.push((Rc::from(name), f));
    }
    let body = self.body(&args[1..], tail)?;
    self.locals.truncate(depth);
    Ok(Ast::LetFn { bindings, body })
  }

  /// The stylized `deftype*`: `(deftype* Name [field*])` makes a
  /// positional constructor var `->Name` building a tagged map.
  fn deftype(&mut self, args: &[Form]) -> Result<Ast> {
    let (_, name) = args
      .first()
      .and_then(|f| f.as_symbol())
      .ok_or_else(|| Error::syntax("deftype* needs a name"))?;
    let field_forms = args
      .get(1)
      .and_then(|f| f.as_vector())
      .ok_or_else(|| Error::syntax("deftype* needs a field vector"))?;
    let mut fields: Vec<Rc<str>> = Vec::new();
    for field in field_forms {
      let (_, field_name) = field.as_symbol().ok_or_else(|| {
        Error::syntax("deftype* fields must be symbols")
      })?;
      fields.push(field_name.into());
    }
    // (fn* [field*] {:__reify_type "Name" :field field ...}) bound to
    // ->Name, plus a class-token var under the bare name.
    let params: Vec<Form> = fields
      .iter()
      .map(|f| Form::symbol(None, f.clone()))
      .collect();
    let mut map_forms =
      vec![Form::kw(value::REIFY_TYPE_KEY), Form::string(name)];
    for field in &fields {
      map_forms.push(Form::kw(field));
      map_forms.push(Form::symbol(None, field.clone()));
    }
    let ctor = Form::list(vec![
      Form::sym("fn*"),
      Form::vector(params),
      Form::map(map_forms),
    ]);
    let ctor_def = Form::list(vec![
      Form::sym("def"),
      Form::sym(&format!("->{}", name)),
      ctor,
    ]);
    let class_def = Form::list(vec![
      Form::sym("def"),
      Form::sym(name),
      Form::string(name),
    ]);
    let wrapped =
      Form::list(vec![Form::sym("do"), class_def, ctor_def]);
    self.form(&wrapped, Tail::No)
  }
}

fn one_arg<'a>(args: &'a [Form], what: &str) -> Result<&'a Form> {
  if args.len() != 1 {
    return Err(Error::syntax(format!(
      "{} takes exactly one argument",
      what
    )));
  }
  Ok(&args[0])
}

fn int_arg(form: &Form, what: &str) -> Result<i64> {
  match form.kind {
    K::Int { value } => Ok(value),
    _ => Err(Error::syntax(format!("{} must be an integer", what))),
  }
}

/// A collection literal made only of self-evaluating forms can become a
/// compile-time constant.
fn is_constant_coll(forms: &[Form]) -> bool {
  forms.iter().all(|form| match &form.kind {
    K::Symbol { .. } | K::List { .. } => false,
    K::Vector { forms }
    | K::Map { forms }
    | K::Set { forms } => is_constant_coll(forms),
    _ => true,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::reader;

  fn analyze_str(source: &str) -> Result<Ast> {
    let env = Env::bootstrap();
    let form = reader::read_string(&env, source)?;
    let expanded = crate::expand::macroexpand_all(&env, &form)?;
    analyze(&env, &expanded)
  }

  #[test]
  fn recur_outside_tail_position_is_rejected() {
    assert!(analyze_str("(loop* [x 1] (inc (recur 2)))").is_err());
    assert!(analyze_str("(loop* [x 1] (recur (inc x)))").is_ok());
  }

  #[test]
  fn recur_arity_must_match() {
    assert!(analyze_str("(loop* [x 1 y 2] (recur 1))").is_err());
  }

  #[test]
  fn unresolved_symbols_fail_analysis() {
    assert!(analyze_str("(no-such-fn-anywhere 1)").is_err());
  }

  #[test]
  fn fixed_arities_must_be_distinct() {
    assert!(analyze_str("(fn* ([x] x) ([y] y))").is_err());
  }
}
