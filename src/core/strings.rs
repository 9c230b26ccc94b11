// core/strings.rs
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

//! Strings, names, printing, and regex builtins.

use std::rc::Rc;

use crate::{
  env::{Env, Namespace},
  error::{Error, Result},
  printer,
  value::{num, Value},
};

use super::{at_least, between, def_builtin, exact};

pub fn install(core: &Namespace) {
  def_builtin(core, "str", str_builtin);
  def_builtin(core, "subs", subs);
  def_builtin(core, "name", name);
  def_builtin(core, "namespace", namespace);
  def_builtin(core, "symbol", symbol);
  def_builtin(core, "keyword", keyword);
  def_builtin(core, "pr-str", pr_str);
  def_builtin(core, "prn-str", prn_str);
  def_builtin(core, "print-str", print_str);
  def_builtin(core, "println-str", println_str);
  def_builtin(core, "pr", pr);
  def_builtin(core, "prn", prn);
  def_builtin(core, "print", print);
  def_builtin(core, "println", println);
  def_builtin(core, "newline", newline);
  def_builtin(core, "flush", flush);
  def_builtin(core, "printf", printf);
  def_builtin(core, "format", format_builtin);
  def_builtin(core, "re-pattern", re_pattern);
  def_builtin(core, "re-matches", re_matches);
  def_builtin(core, "re-find", re_find);
  def_builtin(core, "re-seq", re_seq);
}

fn str_builtin(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  let mut out = String::new();
  for arg in &args {
    if !matches!(arg, Value::Nil) {
      out.push_str(&printer::print_str(env, arg));
    }
  }
  Ok(Value::string(out))
}

fn subs(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("subs", &args, 2, 3)?;
  let Value::Str(s) = &args[0] else {
    return Err(Error::type_error("subs needs a string"));
  };
  let chars: Vec<char> = s.chars().collect();
  let start = usize::try_from(num::as_i64(&args[1])?)
    .map_err(|_| Error::lookup("negative start index"))?;
  let end = match args.get(2) {
    Some(e) => usize::try_from(num::as_i64(e)?)
      .map_err(|_| Error::lookup("negative end index"))?,
    None => chars.len(),
  };
  if start > end || end > chars.len() {
    return Err(Error::lookup(format!(
      "string index out of range: {}..{}",
      start, end
    )));
  }
  Ok(Value::string(
    chars[start..end].iter().collect::<String>(),
  ))
}

fn name(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("name", &args, 1)?;
  match &args[0] {
    Value::Str(s) => Ok(Value::Str(s.clone())),
    Value::Symbol(s) => Ok(Value::string(s.name.clone())),
    Value::Keyword(k) => Ok(Value::string(k.name.clone())),
    other => Err(Error::type_error(format!(
      "name not supported on {}",
      other.type_name()
    ))),
  }
}

fn namespace(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("namespace", &args, 1)?;
  let ns = match &args[0] {
    Value::Symbol(s) => s.namespace.clone(),
    Value::Keyword(k) => k.namespace.clone(),
    other => {
      return Err(Error::type_error(format!(
        "namespace not supported on {}",
        other.type_name()
      )));
    }
  };
  Ok(match ns {
    Some(ns) => Value::string(ns),
    None => Value::Nil,
  })
}

fn symbol(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("symbol", &args, 1, 2)?;
  if args.len() == 2 {
    let ns = match &args[0] {
      Value::Nil => None,
      Value::Str(s) => Some(s.clone()),
      other => {
        return Err(Error::type_error(format!(
          "symbol namespace must be a string, got {}",
          other.type_name()
        )));
      }
    };
    let Value::Str(n) = &args[1] else {
      return Err(Error::type_error("symbol name must be a string"));
    };
    return Ok(Value::symbol(ns, n.clone()));
  }
  match &args[0] {
    Value::Symbol(_) => Ok(args[0].clone()),
    Value::Str(s) => match s.split_once('/') {
      Some((ns, n)) if !ns.is_empty() && !n.is_empty() => {
        Ok(Value::symbol(Some(ns.into()), n))
      }
      _ => Ok(Value::simple_symbol(s.clone())),
    },
    Value::Keyword(k) => {
      Ok(Value::symbol(k.namespace.clone(), k.name.clone()))
    }
    Value::Var(var) => Ok(Value::symbol(
      Some(var.ns_name()),
      var.name(),
    )),
    other => Err(Error::type_error(format!(
      "cannot make a symbol from {}",
      other.type_name()
    ))),
  }
}

fn keyword(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("keyword", &args, 1, 2)?;
  if args.len() == 2 {
    let ns = match &args[0] {
      Value::Nil => None,
      Value::Str(s) => Some(s.clone()),
      other => {
        return Err(Error::type_error(format!(
          "keyword namespace must be a string, got {}",
          other.type_name()
        )));
      }
    };
    let Value::Str(n) = &args[1] else {
      return Err(Error::type_error("keyword name must be a string"));
    };
    return Ok(Value::keyword(ns, n.clone()));
  }
  match &args[0] {
    Value::Keyword(_) => Ok(args[0].clone()),
    Value::Symbol(s) => {
      Ok(Value::keyword(s.namespace.clone(), s.name.clone()))
    }
    Value::Str(s) => match s.split_once('/') {
      Some((ns, n)) if !ns.is_empty() && !n.is_empty() => {
        Ok(Value::keyword(Some(ns.into()), n))
      }
      _ => Ok(Value::kw(s)),
    },
    _ => Ok(Value::Nil),
  }
}

//
// Printing
//

fn joined(
  env: &Rc<Env>,
  args: &[Value],
  readably: bool,
) -> String {
  let mut out = String::new();
  for (ix, arg) in args.iter().enumerate() {
    if ix > 0 {
      out.push(' ');
    }
    if readably {
      out.push_str(&printer::pr_str(env, arg));
    } else {
      out.push_str(&printer::print_str(env, arg));
    }
  }
  out
}

fn pr_str(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  Ok(Value::string(joined(env, &args, true)))
}

fn prn_str(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  let mut out = joined(env, &args, true);
  out.push('\n');
  Ok(Value::string(out))
}

fn print_str(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  Ok(Value::string(joined(env, &args, false)))
}

fn println_str(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  let mut out = joined(env, &args, false);
  out.push('\n');
  Ok(Value::string(out))
}

fn pr(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  env.write_out(&joined(env, &args, true))?;
  Ok(Value::Nil)
}

fn prn(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  let mut out = joined(env, &args, true);
  out.push('\n');
  env.write_out(&out)?;
  Ok(Value::Nil)
}

fn print(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  env.write_out(&joined(env, &args, false))?;
  Ok(Value::Nil)
}

fn println(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  let mut out = joined(env, &args, false);
  out.push('\n');
  env.write_out(&out)?;
  Ok(Value::Nil)
}

fn newline(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("newline", &args, 0)?;
  env.write_out("\n")?;
  Ok(Value::Nil)
}

fn flush(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("flush", &args, 0)?;
  Ok(Value::Nil)
}

fn printf(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("printf", &args, 1)?;
  let formatted = format_builtin(env, args)?;
  if let Value::Str(s) = &formatted {
    env.write_out(s)?;
  }
  Ok(Value::Nil)
}

/// `%`-style formatting: the `%s %d %f %x %o %e %c %b %%  %n` subset the
/// embedded libraries use.
fn format_builtin(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("format", &args, 1)?;
  let Value::Str(fmt) = &args[0] else {
    return Err(Error::type_error("format needs a string"));
  };
  let mut out = String::new();
  let mut chars = fmt.chars().peekable();
  let mut next_arg = 1_usize;
  while let Some(c) = chars.next() {
    if c != '%' {
      out.push(c);
      continue;
    }
    // Width/precision flags pass through to a best-effort pad.
    let mut spec = String::new();
    while matches!(
      chars.peek(),
      Some(c) if c.is_ascii_digit() || *c == '.' || *c == '-' || *c == '+'
    ) {
      spec.push(chars.next().unwrap());
    }
    let Some(kind) = chars.next() else {
      return Err(Error::illegal_argument(
        "format string ends inside a directive",
      ));
    };
    match kind {
      '%' => out.push('%'),
      'n' => out.push('\n'),
      _ => {
        let arg = args.get(next_arg).cloned().ok_or_else(|| {
          Error::illegal_argument("missing argument for format")
        })?;
        next_arg += 1;
        let rendered = match kind {
          's' => printer::print_str(env, &arg),
          'd' => format!("{}", num::as_i64(&arg)?),
          'f' => {
            let precision = spec
              .split_once('.')
              .and_then(|(_, p)| p.parse::<usize>().ok())
              .unwrap_or(6);
            format!("{:.*}", precision, num::as_f64(&arg)?)
          }
          'e' => format!("{:e}", num::as_f64(&arg)?),
          'x' => format!("{:x}", num::as_i64(&arg)?),
          'X' => format!("{:X}", num::as_i64(&arg)?),
          'o' => format!("{:o}", num::as_i64(&arg)?),
          'b' => format!("{}", arg.is_truthy()),
          'c' => match &arg {
            Value::Char(c) => c.to_string(),
            other => printer::print_str(env, other),
          },
          other => {
            return Err(Error::illegal_argument(format!(
              "unsupported format directive %{}",
              other
            )));
          }
        };
        let width: usize = spec
          .trim_start_matches('-')
          .split('.')
          .next()
          .and_then(|w| w.parse().ok())
          .unwrap_or(0);
        if rendered.len() < width {
          let pad = " ".repeat(width - rendered.len());
          if spec.starts_with('-') {
            out.push_str(&rendered);
            out.push_str(&pad);
          } else {
            out.push_str(&pad);
            out.push_str(&rendered);
          }
        } else {
          out.push_str(&rendered);
        }
      }
    }
  }
  Ok(Value::string(out))
}

//
// Regex
//

fn as_regex(value: &Value) -> Result<Rc<crate::value::RegexVal>> {
  match value {
    Value::Regex(r) => Ok(r.clone()),
    Value::Str(s) => match crate::value::compile_regex(s)? {
      Value::Regex(r) => Ok(r),
      _ => unreachable!(),
    },
    other => Err(Error::type_error(format!(
      "expected a regex, got {}",
      other.type_name()
    ))),
  }
}

fn re_pattern(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("re-pattern", &args, 1)?;
  match &args[0] {
    Value::Regex(_) => Ok(args[0].clone()),
    Value::Str(s) => crate::value::compile_regex(s),
    other => Err(Error::type_error(format!(
      "re-pattern needs a string, got {}",
      other.type_name()
    ))),
  }
}

/// A match with groups comes back as a vector, without groups as the
/// matched string.
fn match_value(
  captures: regex::Captures<'_>,
) -> Value {
  if captures.len() == 1 {
    return Value::string(
      captures.get(0).map(|m| m.as_str()).unwrap_or(""),
    );
  }
  let groups: Vec<Value> = captures
    .iter()
    .map(|group| match group {
      Some(m) => Value::string(m.as_str()),
      None => Value::Nil,
    })
    .collect();
  Value::vector(groups)
}

fn re_matches(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("re-matches", &args, 2)?;
  let re = as_regex(&args[0])?;
  let Value::Str(s) = &args[1] else {
    return Err(Error::type_error("re-matches needs a string"));
  };
  match re.regex.captures(s) {
    Some(captures)
      if captures.get(0).map(|m| m.as_str() == s.as_ref())
        == Some(true) =>
    {
      Ok(match_value(captures))
    }
    _ => Ok(Value::Nil),
  }
}

fn re_find(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("re-find", &args, 2)?;
  let re = as_regex(&args[0])?;
  let Value::Str(s) = &args[1] else {
    return Err(Error::type_error("re-find needs a string"));
  };
  Ok(match re.regex.captures(s) {
    Some(captures) => match_value(captures),
    None => Value::Nil,
  })
}

fn re_seq(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("re-seq", &args, 2)?;
  let re = as_regex(&args[0])?;
  let Value::Str(s) = &args[1] else {
    return Err(Error::type_error("re-seq needs a string"));
  };
  let matches: Vec<Value> = re
    .regex
    .captures_iter(s)
    .map(match_value)
    .collect();
  if matches.is_empty() {
    Ok(Value::Nil)
  } else {
    Ok(Value::list_from_vec(matches))
  }
}
