// reader/mod.rs
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

//! UTF-8 source text to `Form` trees.
//!
//! The grammar lives in `clojure.pest`; this module walks the resulting
//! pairs and assembles forms, expanding the reader sugar on the way: quote
//! family prefixes, metadata, `#_` discards, `#(...)` positional functions,
//! syntax quote, namespaced maps, tagged literals, and reader conditionals.

pub mod form;
mod pest_grammar;

use std::rc::Rc;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::{
  env::Env,
  error::{Error, Result, SourcePos},
  expand,
  value,
};

pub use form::{Form, FormKind};

use pest_grammar::{Grammar, Pair, Parser, Rule};

use FormKind as K;
use Rule as R;

/// What the reader does when the input runs out before a form appears.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EofPolicy {
  /// Signal a reader error.
  Error,
  /// Report end of input to the caller, who supplies the sentinel.
  Sentinel,
}

#[derive(Clone, Copy, Debug)]
pub struct ReadOpts {
  pub eof: EofPolicy,
  /// Recognize `#?`/`#?@` reader conditionals.
  pub read_cond: bool,
  /// Evaluate `#=(...)` at read time.  Off unless the caller is trusted.
  pub read_eval: bool,
}

impl Default for ReadOpts {
  fn default() -> Self {
    Self {
      eof: EofPolicy::Error,
      read_cond: false,
      read_eval: false,
    }
  }
}

/// Reads every top-level form of `input`.
pub fn read_source(env: &Rc<Env>, input: &str) -> Result<Vec<Form>> {
  read_source_opts(env, input, ReadOpts::default())
}

pub fn read_source_opts(
  env: &Rc<Env>,
  input: &str,
  opts: ReadOpts,
) -> Result<Vec<Form>> {
  let mut pairs = Grammar::parse(R::top_level, input)
    .map_err(pest_to_reader_error)?;
  let Some(top_level) = pairs.next() else {
    return Ok(Vec::new());
  };
  let mut walker = Walker { env, opts, fn_depth: 0 };
  let mut forms = Vec::new();
  for child in top_level.into_inner() {
    match child.as_rule() {
      R::form => walker.form(child, &mut forms)?,
      R::EOI => (),
      _ => {
        return Err(residual(&child, "top level"));
      }
    }
  }
  Ok(forms)
}

/// Reads the first form of `input`; error on empty input.
pub fn read_string(env: &Rc<Env>, input: &str) -> Result<Form> {
  match read_one(env, input, ReadOpts::default())? {
    Some(form) => Ok(form),
    None => Err(Error::reader("EOF while reading", 1, 1)),
  }
}

/// Reads the first form of `input`, honoring the EOF policy: `None` means
/// the input held no form and the caller's sentinel applies.
pub fn read_one(
  env: &Rc<Env>,
  input: &str,
  opts: ReadOpts,
) -> Result<Option<Form>> {
  let mut forms = read_source_opts(env, input, opts)?;
  if forms.is_empty() {
    match opts.eof {
      EofPolicy::Error => Err(Error::reader("EOF while reading", 1, 1)),
      EofPolicy::Sentinel => Ok(None),
    }
  } else {
    Ok(Some(forms.remove(0)))
  }
}

fn pest_to_reader_error(e: pest::error::Error<Rule>) -> Error {
  let (line, col) = match e.line_col {
    pest::error::LineColLocation::Pos((l, c)) => (l as u32, c as u32),
    pest::error::LineColLocation::Span((l, c), _) => (l as u32, c as u32),
  };
  Error::reader(e.variant.message().to_string(), line, col)
}

fn residual(pair: &Pair, context: &str) -> Error {
  let (line, col) = pair.line_col();
  Error::reader(
    format!("unexpected {:?} in {}", pair.as_rule(), context),
    line as u32,
    col as u32,
  )
}

fn pos_of(pair: &Pair) -> Option<SourcePos> {
  let (line, col) = pair.line_col();
  Some(SourcePos {
    line: line as u32,
    col: col as u32,
  })
}

fn reader_error(pair: &Pair, message: impl Into<String>) -> Error {
  let (line, col) = pair.line_col();
  Error::reader(message, line as u32, col as u32)
}

struct Walker<'e> {
  env: &'e Rc<Env>,
  opts: ReadOpts,
  /// Depth of `#(...)` nesting; they do not nest.
  fn_depth: u32,
}

impl<'e> Walker<'e> {
  /// Reads one `form` pair, pushing zero or more forms into `out`.  Zero
  /// when the form is discarded or a conditional selects no branch, more
  /// than one when a splicing conditional unrolls.
  fn form(&mut self, parent: Pair, out: &mut Vec<Form>) -> Result<()> {
    let mut metas: Vec<Form> = Vec::new();
    for child in parent.into_inner() {
      match child.as_rule() {
        R::preform => self.preform(child, &mut metas)?,
        R::quote_unquote_form => {
          let form = self.quote_unquote_form(child)?;
          out.push(attach_meta(form, metas)?);
          return Ok(());
        }
        R::expr => {
          let before = out.len();
          self.expr(child, out)?;
          // Splices and discards cannot own metadata.
          if !metas.is_empty() {
            if out.len() != before + 1 {
              return Err(Error::syntax(
                "metadata can only be applied to a single form",
              ));
            }
            let form = out.pop().unwrap();
            out.push(attach_meta(form, metas)?);
          }
          return Ok(());
        }
        other => {
          return Err(Error::reader(
            format!("unexpected {:?} in form", other),
            0,
            0,
          ));
        }
      }
    }
    Ok(())
  }

  /// Like `form` but requires exactly one resulting form.
  fn single_form(&mut self, parent: Pair) -> Result<Form> {
    let err = reader_error(&parent, "expected exactly one form here");
    let mut out = Vec::with_capacity(1);
    self.form(parent, &mut out)?;
    if out.len() == 1 {
      Ok(out.pop().unwrap())
    } else {
      Err(err)
    }
  }

  fn preform(&mut self, parent: Pair, metas: &mut Vec<Form>) -> Result<()> {
    for child in parent.into_inner() {
      match child.as_rule() {
        R::discarded_form => {
          // The discarded form must still read cleanly; its value is
          // dropped.
          for sub in child.into_inner() {
            match sub.as_rule() {
              R::discard_prefix => (),
              R::form => {
                let mut ignored = Vec::new();
                self.form(sub, &mut ignored)?;
              }
              _ => return Err(residual(&sub, "discarded form")),
            }
          }
        }
        R::meta_form => {
          for sub in child.into_inner() {
            match sub.as_rule() {
              R::meta_prefix => (),
              R::form => metas.push(self.single_form(sub)?),
              _ => return Err(residual(&sub, "meta form")),
            }
          }
        }
        _ => return Err(residual(&child, "preform")),
      }
    }
    Ok(())
  }

  fn quote_unquote_form(&mut self, parent: Pair) -> Result<Form> {
    let pos = pos_of(&parent);
    let mut prefix = "";
    for child in parent.into_inner() {
      match child.as_rule() {
        R::quote_unquote_prefix => prefix = match child.as_str() {
          "'" => "quote",
          "#'" => "var",
          "`" => "`",
          "~@" => "unquote-splicing",
          "~" => "unquote",
          "@" => "deref",
          _ => unreachable!("quote-unquote prefix case analysis"),
        },
        R::form => {
          let inner = self.single_form(child)?;
          let mut form = if prefix == "`" {
            expand::syntax_quote::syntax_quote(self.env, &inner)?
          } else {
            Form::tagged(Form::sym(prefix), inner)
          };
          form.pos = pos;
          return Ok(form);
        }
        _ => return Err(residual(&child, "quoting form")),
      }
    }
    Err(Error::reader("EOF after quoting prefix", 0, 0))
  }

  fn expr(&mut self, parent: Pair, out: &mut Vec<Form>) -> Result<()> {
    for child in parent.into_inner() {
      let pos = pos_of(&child);
      let form = match child.as_rule() {
        R::nil => Form::at(K::Nil, pos),
        R::boolean => Form::at(
          K::Boolean {
            value: child.as_str() == "true",
          },
          pos,
        ),
        R::number => self.number(child)?,
        R::char => self.char(child)?,
        R::string => self.string(child)?,
        R::regex => self.regex(child)?,
        R::symbolic_value => self.symbolic_value(child)?,
        R::symbol => self.symbol(child)?,
        R::keyword => self.keyword(child)?,
        R::list => self.delimited(child, pos, |forms| K::List { forms })?,
        R::vector => {
          self.delimited(child, pos, |forms| K::Vector { forms })?
        }
        R::set => self.delimited(child, pos, |forms| K::Set { forms })?,
        R::map => self.map(child)?,
        R::anonymous_fn => self.anonymous_fn(child)?,
        R::tagged_literal => self.tagged_literal(child)?,
        R::read_eval => self.read_eval(child)?,
        R::reader_conditional => {
          self.reader_conditional(child, out)?;
          continue;
        }
        _ => return Err(residual(&child, "expression")),
      };
      out.push(form);
    }
    Ok(())
  }

  fn delimited(
    &mut self,
    parent: Pair,
    pos: Option<SourcePos>,
    build: impl FnOnce(Vec<Form>) -> FormKind,
  ) -> Result<Form> {
    let mut forms = Vec::new();
    for child in parent.into_inner() {
      match child.as_rule() {
        R::form => self.form(child, &mut forms)?,
        _ => return Err(residual(&child, "collection body")),
      }
    }
    Ok(Form::at(build(forms), pos))
  }

  fn number(&mut self, parent: Pair) -> Result<Form> {
    let pos = pos_of(&parent);
    let literal = parent.as_str().to_string();
    let mut positive = true;
    for child in parent.into_inner() {
      match child.as_rule() {
        R::sign => positive = child.as_str() == "+",
        R::unsigned_ratio => {
          return self.unsigned_ratio(child, pos, positive)
        }
        R::unsigned_radix_int => {
          return self.unsigned_radix_int(child, pos, positive)
        }
        R::unsigned_bigfloat => {
          return big_decimal_form(&child, pos, &literal)
        }
        R::unsigned_float => {
          let value: f64 = literal.parse().map_err(|_| {
            reader_error(&child, format!("invalid number: {}", literal))
          })?;
          return Ok(Form::at(K::Float { value }, pos));
        }
        R::unsigned_int => return self.unsigned_int(child, pos, positive),
        _ => return Err(residual(&child, "number")),
      }
    }
    Err(Error::reader(format!("invalid number: {}", literal), 0, 0))
  }

  fn unsigned_ratio(
    &mut self,
    parent: Pair,
    pos: Option<SourcePos>,
    positive: bool,
  ) -> Result<Form> {
    let mut numerator = BigInt::zero();
    let mut denominator = BigInt::zero();
    for child in parent.into_inner() {
      match child.as_rule() {
        R::numerator => numerator = parse_bigint(&child, 10)?,
        R::denominator => denominator = parse_bigint(&child, 10)?,
        _ => return Err(residual(&child, "ratio")),
      }
    }
    if denominator.is_zero() {
      return Err(Error::arithmetic("divide by zero"));
    }
    if !positive {
      numerator = -numerator;
    }
    Ok(Form::at(normalized_ratio(numerator, denominator), pos))
  }

  fn unsigned_radix_int(
    &mut self,
    parent: Pair,
    pos: Option<SourcePos>,
    positive: bool,
  ) -> Result<Form> {
    let mut radix = 10_u32;
    for child in parent.into_inner() {
      match child.as_rule() {
        R::radix => {
          radix = child.as_str().parse().unwrap_or(0);
          if !(2..=36).contains(&radix) {
            return Err(reader_error(
              &child,
              format!("radix out of range: {}", radix),
            ));
          }
        }
        R::radix_digits => {
          return int_form(&child, pos, radix, positive, false);
        }
        _ => return Err(residual(&child, "radix integer")),
      }
    }
    Err(Error::reader("incomplete radix integer", 0, 0))
  }

  fn unsigned_int(
    &mut self,
    parent: Pair,
    pos: Option<SourcePos>,
    positive: bool,
  ) -> Result<Form> {
    let mut big = false;
    let mut digits: Option<(Pair, u32)> = None;
    for child in parent.into_inner() {
      match child.as_rule() {
        R::bigint_suffix => big = true,
        R::hex_int => {
          for sub in child.into_inner() {
            if sub.as_rule() == R::hex_digits {
              digits = Some((sub, 16));
            }
          }
        }
        R::oct_int => {
          for sub in child.into_inner() {
            if sub.as_rule() == R::oct_digits {
              digits = Some((sub, 8));
            }
          }
        }
        R::unsigned_dec => digits = Some((child, 10)),
        _ => return Err(residual(&child, "integer")),
      }
    }
    match digits {
      Some((pair, radix)) => int_form(&pair, pos, radix, positive, big),
      None => Err(Error::reader("incomplete integer", 0, 0)),
    }
  }

  fn char(&mut self, parent: Pair) -> Result<Form> {
    let pos = pos_of(&parent);
    for child in parent.into_inner() {
      let value = match child.as_rule() {
        R::char_name => match child.as_str() {
          "newline" => '\n',
          "space" => ' ',
          "tab" => '\t',
          "formfeed" => '\u{0C}',
          "backspace" => '\u{08}',
          "return" => '\r',
          _ => unreachable!("char name case analysis"),
        },
        R::char_octal => {
          char_from_code(&child, u32::from_str_radix(child.as_str(), 8))?
        }
        R::char_code_point => {
          char_from_code(&child, u32::from_str_radix(child.as_str(), 16))?
        }
        R::char_simple => {
          let mut chars = child.as_str().chars();
          match chars.next() {
            Some(c) => c,
            None => return Err(reader_error(&child, "EOF reading character")),
          }
        }
        _ => return Err(residual(&child, "character")),
      };
      return Ok(Form::at(K::Char { value }, pos));
    }
    Err(Error::reader("EOF reading character", 0, 0))
  }

  fn string(&mut self, parent: Pair) -> Result<Form> {
    let pos = pos_of(&parent);
    let mut value = String::new();
    for child in parent.into_inner() {
      match child.as_rule() {
        R::unescaped => value.push_str(child.as_str()),
        R::esc_char => {
          let c = match &child.as_str()[1..] {
            "b" => '\u{08}',
            "t" => '\t',
            "n" => '\n',
            "f" => '\u{0C}',
            "r" => '\r',
            "\"" => '"',
            "\\" => '\\',
            "'" => '\'',
            e => unreachable!("inexhaustive escape: {}", e),
          };
          value.push(c);
        }
        R::esc_octet => {
          let code = u32::from_str_radix(&child.as_str()[1..], 8);
          value.push(char_from_code(&child, code)?);
        }
        R::esc_code_point => {
          let code = u32::from_str_radix(&child.as_str()[2..], 16);
          value.push(char_from_code(&child, code)?);
        }
        _ => return Err(residual(&child, "string")),
      }
    }
    Ok(Form::at(
      K::String {
        value: value.into(),
      },
      pos,
    ))
  }

  fn regex(&mut self, parent: Pair) -> Result<Form> {
    let pos = pos_of(&parent);
    for child in parent.into_inner() {
      match child.as_rule() {
        R::regex_content => {
          return Ok(Form::at(
            K::Regex {
              pattern: child.as_str().into(),
            },
            pos,
          ));
        }
        _ => return Err(residual(&child, "regex")),
      }
    }
    Err(Error::reader("EOF reading regex", 0, 0))
  }

  fn symbolic_value(&mut self, parent: Pair) -> Result<Form> {
    let pos = pos_of(&parent);
    for child in parent.into_inner() {
      match child.as_rule() {
        R::symbolic_value_prefix => (),
        R::unqualified_symbol => {
          let value = match child.as_str() {
            "Inf" => f64::INFINITY,
            "-Inf" => f64::NEG_INFINITY,
            "NaN" => f64::NAN,
            other => {
              return Err(reader_error(
                &child,
                format!("unknown symbolic value: ##{}", other),
              ));
            }
          };
          return Ok(Form::at(K::Float { value }, pos));
        }
        _ => return Err(residual(&child, "symbolic value")),
      }
    }
    Err(Error::reader("EOF reading symbolic value", 0, 0))
  }

  fn symbol(&mut self, parent: Pair) -> Result<Form> {
    let pos = pos_of(&parent);
    let mut namespace: Option<Rc<str>> = None;
    for child in parent.into_inner() {
      match child.as_rule() {
        R::namespace => namespace = Some(child.as_str().into()),
        R::qualified_symbol
        | R::unqualified_symbol
        | R::slash_symbol => {
          return Ok(Form::at(
            K::Symbol {
              namespace,
              name: child.as_str().into(),
            },
            pos,
          ));
        }
        _ => return Err(residual(&child, "symbol")),
      }
    }
    Err(Error::reader("EOF reading symbol", 0, 0))
  }

  fn keyword(&mut self, parent: Pair) -> Result<Form> {
    let pos = pos_of(&parent);
    let mut alias = false;
    let mut namespace: Option<Rc<str>> = None;
    for child in parent.into_inner() {
      match child.as_rule() {
        R::keyword_prefix => alias = child.as_str() == "::",
        R::namespace => namespace = Some(child.as_str().into()),
        R::unqualified_keyword => {
          let namespace = if alias {
            Some(self.resolve_keyword_namespace(&child, namespace)?)
          } else {
            namespace
          };
          return Ok(Form::at(
            K::Keyword {
              namespace,
              name: child.as_str().into(),
            },
            pos,
          ));
        }
        _ => return Err(residual(&child, "keyword")),
      }
    }
    Err(Error::reader("EOF reading keyword", 0, 0))
  }

  /// `::k` takes the current namespace; `::a/k` resolves the alias `a`
  /// there.
  fn resolve_keyword_namespace(
    &self,
    pair: &Pair,
    alias: Option<Rc<str>>,
  ) -> Result<Rc<str>> {
    match alias {
      None => Ok(self.env.current_ns().name()),
      Some(a) => {
        self.env.resolve_ns_alias(a.as_ref()).ok_or_else(|| {
          reader_error(
            pair,
            format!("invalid token: no namespace alias {}", a),
          )
        })
      }
    }
  }

  fn map(&mut self, parent: Pair) -> Result<Form> {
    let pos = pos_of(&parent);
    let mut qualifier: Option<Rc<str>> = None;
    for child in parent.into_inner() {
      match child.as_rule() {
        R::map_qualifier => {
          let mut alias = false;
          let mut namespace: Option<Rc<str>> = None;
          for sub in child.into_inner() {
            match sub.as_rule() {
              R::map_qualifier_prefix => alias = sub.as_str() == "#::",
              R::namespace => namespace = Some(sub.as_str().into()),
              _ => return Err(residual(&sub, "map qualifier")),
            }
          }
          qualifier = Some(if alias {
            self.resolve_keyword_namespace_of_map(namespace)?
          } else {
            namespace.ok_or_else(|| {
              Error::reader("namespaced map needs a namespace", 0, 0)
            })?
          });
        }
        R::unqualified_map => {
          let mut forms = Vec::new();
          for sub in child.into_inner() {
            match sub.as_rule() {
              R::form => self.form(sub, &mut forms)?,
              _ => return Err(residual(&sub, "map body")),
            }
          }
          if forms.len() % 2 != 0 {
            return Err(Error::reader(
              "map literal must contain an even number of forms",
              pos.map(|p| p.line).unwrap_or(0),
              pos.map(|p| p.col).unwrap_or(0),
            ));
          }
          if let Some(ns) = qualifier {
            forms = qualify_map_keys(forms, &ns);
          }
          return Ok(Form::at(K::Map { forms }, pos));
        }
        _ => return Err(residual(&child, "map")),
      }
    }
    Err(Error::reader("EOF reading map", 0, 0))
  }

  fn resolve_keyword_namespace_of_map(
    &self,
    alias: Option<Rc<str>>,
  ) -> Result<Rc<str>> {
    match alias {
      None => Ok(self.env.current_ns().name()),
      Some(a) => self.env.resolve_ns_alias(a.as_ref()).ok_or_else(|| {
        Error::reader(format!("no namespace alias {}", a), 0, 0)
      }),
    }
  }

  /// `#(...)` becomes `(fn* [p...] (...))`.  The positional parameters in
  /// the body are renamed to gensyms so that the wrapper cannot capture
  /// user symbols.  These functions do not nest.
  fn anonymous_fn(&mut self, parent: Pair) -> Result<Form> {
    let pos = pos_of(&parent);
    if self.fn_depth > 0 {
      return Err(reader_error(
        &parent,
        "nested #()s are not allowed",
      ));
    }
    self.fn_depth += 1;
    let result = self.delimited(parent, pos, |forms| K::List { forms });
    self.fn_depth -= 1;
    let body = result?;

    let mut max_arg = 0_u32;
    let mut has_rest = false;
    scan_fn_args(&body, &mut max_arg, &mut has_rest)?;

    let id = self.env.next_gensym_id();
    let param_name =
      |i: u32| -> Rc<str> { format!("p{}__{}#", i, id).into() };
    let rest_name: Rc<str> = format!("rest__{}#", id).into();

    let mut params: Vec<Form> = (1..=max_arg)
      .map(|i| Form::symbol(None, param_name(i)))
      .collect();
    if has_rest {
      params.push(Form::sym("&"));
      params.push(Form::symbol(None, rest_name.clone()));
    }

    let body = rename_fn_args(body, &|name: &str| -> Option<Rc<str>> {
      match name {
        "%" => Some(param_name(1)),
        "%&" => Some(rest_name.clone()),
        _ => name
          .strip_prefix('%')
          .and_then(|digits| digits.parse::<u32>().ok())
          .map(param_name),
      }
    });

    let mut form = Form::list(vec![
      Form::sym("fn*"),
      Form::vector(params),
      body,
    ]);
    form.pos = pos;
    Ok(form)
  }

  fn tagged_literal(&mut self, parent: Pair) -> Result<Form> {
    let pos = pos_of(&parent);
    let mut tag: Option<Form> = None;
    for child in parent.into_inner() {
      match child.as_rule() {
        R::tagged_literal_tag => {
          for sub in child.into_inner() {
            if sub.as_rule() == R::symbol {
              tag = Some(self.symbol(sub)?);
            }
          }
        }
        R::form => {
          let arg = self.single_form(child)?;
          let tag = tag.take().ok_or_else(|| {
            Error::reader("tagged literal without a tag", 0, 0)
          })?;
          let value = self.apply_data_reader(&tag, arg)?;
          let mut form = value;
          form.pos = pos;
          return Ok(form);
        }
        _ => return Err(residual(&child, "tagged literal")),
      }
    }
    Err(Error::reader("EOF reading tagged literal", 0, 0))
  }

  fn apply_data_reader(&mut self, tag: &Form, arg: Form) -> Result<Form> {
    let (tag_ns, tag_name) = tag
      .as_symbol()
      .ok_or_else(|| Error::reader("tagged literal tag must be a symbol", 0, 0))?;
    let arg_value = value::form_to_value(&arg)?;
    if let Some(reader_fn) = self.env.data_reader(tag_ns, tag_name) {
      let result =
        crate::eval::apply(self.env, &reader_fn, vec![arg_value])?;
      return value::value_to_form(&result);
    }
    if let Some(fallback) = self.env.default_data_reader_fn() {
      let tag_value = value::form_to_value(tag)?;
      let result = crate::eval::apply(
        self.env,
        &fallback,
        vec![tag_value, arg_value],
      )?;
      return value::value_to_form(&result);
    }
    Err(Error::reader(
      format!(
        "no reader function for tag {}",
        match tag_ns {
          Some(ns) => format!("{}/{}", ns, tag_name),
          None => tag_name.to_string(),
        }
      ),
      0,
      0,
    ))
  }

  /// `#=(...)` evaluates at read time; only trusted callers enable it.
  fn read_eval(&mut self, parent: Pair) -> Result<Form> {
    if !self.opts.read_eval {
      return Err(reader_error(&parent, "read-eval is not allowed"));
    }
    for child in parent.into_inner() {
      if child.as_rule() == R::form {
        let form = self.single_form(child)?;
        let expanded = expand::macroexpand_all(self.env, &form)?;
        let ast = crate::analyzer::analyze(self.env, &expanded)?;
        let result = crate::eval::eval(self.env, &ast)?;
        return value::value_to_form(&result);
      }
    }
    Err(Error::reader("EOF reading #=", 0, 0))
  }

  /// `#?(...)`/`#?@(...)`.  The core carries a single platform feature
  /// set, so only the `:default` branch can be selected; the other
  /// branches are read and dropped unevaluated.
  fn reader_conditional(
    &mut self,
    parent: Pair,
    out: &mut Vec<Form>,
  ) -> Result<()> {
    if !self.opts.read_cond {
      return Err(reader_error(
        &parent,
        "conditional read not allowed",
      ));
    }
    let mut splicing = false;
    for child in parent.into_inner() {
      match child.as_rule() {
        R::reader_conditional_prefix => {
          splicing = child.as_str() == "#?@";
        }
        R::reader_conditional_body => {
          let mut forms = Vec::new();
          for sub in child.into_inner() {
            match sub.as_rule() {
              R::form => self.form(sub, &mut forms)?,
              _ => return Err(residual(&sub, "reader conditional")),
            }
          }
          if forms.len() % 2 != 0 {
            return Err(Error::reader(
              "reader conditional requires an even number of forms",
              0,
              0,
            ));
          }
          for pair in forms.chunks(2) {
            if pair[0].is_kw_named("default") {
              let selected = pair[1].clone();
              if splicing {
                match selected.kind {
                  K::List { forms } | K::Vector { forms } => {
                    out.extend(forms)
                  }
                  _ => {
                    return Err(Error::reader(
                      "spliced reader conditional value must be sequential",
                      0,
                      0,
                    ));
                  }
                }
              } else {
                out.push(selected);
              }
              return Ok(());
            }
          }
          return Ok(());
        }
        _ => return Err(residual(&child, "reader conditional")),
      }
    }
    Ok(())
  }
}

/// Merges `^a ^b x` right-to-left the way the reader macro stacks: a bare
/// keyword contributes `{:kw true}`, a bare symbol or string `{:tag v}`,
/// and a map contributes itself.
fn attach_meta(form: Form, metas: Vec<Form>) -> Result<Form> {
  if metas.is_empty() {
    return Ok(form);
  }
  let mut merged: Vec<Form> = Vec::new();
  for meta in metas {
    match meta.kind {
      K::Map { forms } => {
        for pair in forms.chunks(2) {
          upsert_meta(&mut merged, pair[0].clone(), pair[1].clone());
        }
      }
      K::Keyword { .. } => {
        upsert_meta(&mut merged, meta, Form::boolean(true));
      }
      K::Symbol { .. } | K::String { .. } => {
        upsert_meta(&mut merged, Form::kw("tag"), meta);
      }
      _ => {
        return Err(Error::reader(
          "metadata must be a symbol, keyword, string or map",
          0,
          0,
        ));
      }
    }
  }
  Ok(form.with_meta(Form::map(merged)))
}

fn upsert_meta(entries: &mut Vec<Form>, key: Form, value: Form) {
  for pair in entries.chunks_mut(2) {
    if pair[0] == key {
      pair[1] = value;
      return;
    }
  }
  entries.push(key);
  entries.push(value);
}

/// In a `#:ns{...}` literal every unqualified keyword or symbol key gains
/// the namespace; a `_` namespace strips instead.
fn qualify_map_keys(forms: Vec<Form>, ns: &Rc<str>) -> Vec<Form> {
  let mut out = Vec::with_capacity(forms.len());
  let mut is_key = true;
  for form in forms {
    if is_key {
      out.push(match form.kind {
        K::Keyword {
          namespace: None,
          name,
        } => Form::keyword(Some(ns.clone()), name),
        K::Keyword {
          namespace: Some(marker),
          name,
        } if marker.as_ref() == "_" => Form::keyword(None, name),
        K::Symbol {
          namespace: None,
          name,
        } => Form::symbol(Some(ns.clone()), name),
        other => Form::new(other),
      });
    } else {
      out.push(form);
    }
    is_key = !is_key;
  }
  out
}

fn scan_fn_args(
  form: &Form,
  max_arg: &mut u32,
  has_rest: &mut bool,
) -> Result<()> {
  match &form.kind {
    K::Symbol {
      namespace: None,
      name,
    } => {
      if name.as_ref() == "%" {
        *max_arg = (*max_arg).max(1);
      } else if name.as_ref() == "%&" {
        *has_rest = true;
      } else if let Some(digits) = name.strip_prefix('%') {
        if let Ok(n) = digits.parse::<u32>() {
          if n == 0 {
            return Err(Error::reader("%0 is not a valid arg literal", 0, 0));
          }
          *max_arg = (*max_arg).max(n);
        }
      }
    }
    K::List { forms }
    | K::Vector { forms }
    | K::Map { forms }
    | K::Set { forms } => {
      for sub in forms {
        scan_fn_args(sub, max_arg, has_rest)?;
      }
    }
    _ => (),
  }
  Ok(())
}

fn rename_fn_args(
  form: Form,
  rename: &impl Fn(&str) -> Option<Rc<str>>,
) -> Form {
  let Form { kind, meta, pos } = form;
  let kind = match kind {
    K::Symbol {
      namespace: None,
      name,
    } => match rename(name.as_ref()) {
      Some(new_name) => K::Symbol {
        namespace: None,
        name: new_name,
      },
      None => K::Symbol {
        namespace: None,
        name,
      },
    },
    K::List { forms } => K::List {
      forms: forms
        .into_iter()
        .map(|f| rename_fn_args(f, rename))
        .collect(),
    },
    K::Vector { forms } => K::Vector {
      forms: forms
        .into_iter()
        .map(|f| rename_fn_args(f, rename))
        .collect(),
    },
    K::Map { forms } => K::Map {
      forms: forms
        .into_iter()
        .map(|f| rename_fn_args(f, rename))
        .collect(),
    },
    K::Set { forms } => K::Set {
      forms: forms
        .into_iter()
        .map(|f| rename_fn_args(f, rename))
        .collect(),
    },
    other => other,
  };
  Form { kind, meta, pos }
}

fn char_from_code(
  pair: &Pair,
  code: std::result::Result<u32, std::num::ParseIntError>,
) -> Result<char> {
  code
    .ok()
    .and_then(char::from_u32)
    .ok_or_else(|| reader_error(pair, "invalid character code"))
}

fn parse_bigint(pair: &Pair, radix: u32) -> Result<BigInt> {
  BigInt::parse_bytes(pair.as_str().as_bytes(), radix).ok_or_else(|| {
    reader_error(pair, format!("invalid digits: {}", pair.as_str()))
  })
}

fn int_form(
  pair: &Pair,
  pos: Option<SourcePos>,
  radix: u32,
  positive: bool,
  force_big: bool,
) -> Result<Form> {
  let mut value = parse_bigint(pair, radix)?;
  if !positive {
    value = -value;
  }
  if force_big {
    return Ok(Form::at(K::BigInt { value }, pos));
  }
  // Literals wider than an i64 promote to big integers on their own.
  match value.to_i64() {
    Some(small) => Ok(Form::at(K::Int { value: small }, pos)),
    None => Ok(Form::at(K::BigInt { value }, pos)),
  }
}

/// Reduces and sign-normalizes; a whole result collapses to an integer.
fn normalized_ratio(numerator: BigInt, denominator: BigInt) -> FormKind {
  let gcd = numerator.gcd(&denominator);
  let (mut n, mut d) = (numerator / &gcd, denominator / gcd);
  if d.is_negative() {
    n = -n;
    d = -d;
  }
  if d == BigInt::from(1) {
    match n.to_i64() {
      Some(small) => K::Int { value: small },
      None => K::BigInt { value: n },
    }
  } else {
    K::Ratio {
      numerator: n,
      denominator: d,
    }
  }
}

fn big_decimal_form(
  pair: &Pair,
  pos: Option<SourcePos>,
  literal: &str,
) -> Result<Form> {
  // Strip the M suffix, split mantissa and exponent, then fold the
  // fractional digits into the scale.
  let body = &literal[..literal.len() - 1];
  let (mantissa, exp) = match body.find(['e', 'E']) {
    Some(ix) => {
      let exp: i64 = body[ix + 1..].parse().map_err(|_| {
        reader_error(pair, format!("invalid number: {}", literal))
      })?;
      (&body[..ix], exp)
    }
    None => (body, 0),
  };
  let (digits, frac_len) = match mantissa.find('.') {
    Some(ix) => {
      let mut digits = String::with_capacity(mantissa.len());
      digits.push_str(&mantissa[..ix]);
      digits.push_str(&mantissa[ix + 1..]);
      (digits, (mantissa.len() - ix - 1) as i64)
    }
    None => (mantissa.to_string(), 0),
  };
  let unscaled = BigInt::parse_bytes(digits.as_bytes(), 10)
    .ok_or_else(|| {
      reader_error(pair, format!("invalid number: {}", literal))
    })?;
  let scale = frac_len - exp;
  let scale = i32::try_from(scale).map_err(|_| {
    reader_error(pair, format!("exponent out of range: {}", literal))
  })?;
  Ok(Form::at(K::BigDecimal { unscaled, scale }, pos))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn read(source: &str) -> Form {
    let env = Env::bootstrap();
    read_string(&env, source)
      .unwrap_or_else(|e| panic!("failed to read {:?}: {}", source, e))
  }

  fn read_err(source: &str) -> Error {
    let env = Env::bootstrap();
    match read_string(&env, source) {
      Ok(form) => panic!("expected {:?} to fail, got {}", source, form),
      Err(e) => e,
    }
  }

  #[test]
  fn commas_are_whitespace() {
    assert_eq!(read("[1,2, 3]").to_string(), "[1 2 3]");
  }

  #[test]
  fn numeric_literal_classes() {
    assert_eq!(read("42").to_string(), "42");
    assert_eq!(read("-0x1f").to_string(), "-31");
    assert_eq!(read("017").to_string(), "15");
    assert_eq!(read("2r1010").to_string(), "10");
    assert_eq!(read("7N").to_string(), "7N");
    assert_eq!(read("6/8").to_string(), "3/4");
    assert!(matches!(read("1.5").kind, FormKind::Float { .. }));
    assert!(matches!(
      read("1.5M").kind,
      FormKind::BigDecimal { .. }
    ));
    assert!(matches!(read("##NaN").kind, FormKind::Float { .. }));
  }

  #[test]
  fn big_literals_promote_on_their_own() {
    assert!(matches!(
      read("123456789012345678901234567890").kind,
      FormKind::BigInt { .. }
    ));
  }

  #[test]
  fn quote_sugar_wraps() {
    assert_eq!(read("'x").to_string(), "(quote x)");
    assert_eq!(read("#'x").to_string(), "(var x)");
    assert_eq!(read("@x").to_string(), "(deref x)");
  }

  #[test]
  fn metadata_attaches_and_merges() {
    let form = read("^:k ^{:a 1} x");
    let meta = form.meta().expect("metadata expected");
    let FormKind::Map { forms } = &meta.kind else {
      panic!("metadata should be a map, got {}", meta);
    };
    assert_eq!(forms.len(), 4);
  }

  #[test]
  fn discard_skips_the_next_form() {
    assert_eq!(read("[1 #_2 3]").to_string(), "[1 3]");
  }

  #[test]
  fn anonymous_fn_counts_positional_args() {
    let form = read("#(+ % %2)");
    let text = form.to_string();
    assert!(text.starts_with("(fn* ["), "got {}", text);
    let FormKind::List { forms } = &form.kind else {
      panic!("expected a list");
    };
    let params = forms[1].as_vector().unwrap();
    assert_eq!(params.len(), 2);
  }

  #[test]
  fn nested_anonymous_fns_are_rejected() {
    read_err("#(map #(inc %) %)");
  }

  #[test]
  fn namespaced_map_qualifies_keys() {
    assert_eq!(
      read("#:ns{:a 1 :b 2}").to_string(),
      "{:ns/a 1 :ns/b 2}"
    );
  }

  #[test]
  fn unbalanced_input_reports_position() {
    let e = read_err("(foo [1 2");
    assert!(e.pos.is_some());
  }

  #[test]
  fn read_eval_is_off_by_default() {
    read_err("#=(+ 1 2)");
  }

  #[test]
  fn reader_conditionals_need_the_option() {
    read_err("#?(:clj 1 :default 2)");
    let env = Env::bootstrap();
    let opts = ReadOpts {
      read_cond: true,
      ..ReadOpts::default()
    };
    let form = read_one(&env, "#?(:clj 1 :default 2)", opts)
      .unwrap()
      .unwrap();
    assert_eq!(form.to_string(), "2");
  }

  #[test]
  fn strings_unescape() {
    assert_eq!(
      read(r#""a\nbA""#).as_str(),
      Some("a\nbA")
    );
  }
}
