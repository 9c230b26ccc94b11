// printer.rs
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

//! The flat printer behind `pr-str`, `print`, and friends.
//!
//! Readable output round-trips through the reader for every literal kind;
//! display output leaves strings and characters bare.  `*print-length*`,
//! `*print-level*`, `*print-readably*`, and `*print-meta*` all apply.
//! The pretty printer reuses these leaf renderings.

use std::rc::Rc;

use crate::{
  env::Env,
  value::{seq, Value, REIFY_TYPE_KEY},
};

#[derive(Clone, Copy, Debug)]
pub struct PrintOpts {
  pub readably: bool,
  pub print_length: Option<usize>,
  pub print_level: Option<usize>,
  pub print_meta: bool,
}

impl Default for PrintOpts {
  fn default() -> Self {
    Self {
      readably: true,
      print_length: None,
      print_level: None,
      print_meta: false,
    }
  }
}

impl PrintOpts {
  /// Reads the print configuration from the dynamic vars.
  pub fn from_env(env: &Rc<Env>) -> Self {
    let length = match env.core_value("*print-length*") {
      Value::Int(n) if n >= 0 => Some(n as usize),
      _ => None,
    };
    let level = match env.core_value("*print-level*") {
      Value::Int(n) if n >= 0 => Some(n as usize),
      _ => None,
    };
    Self {
      readably: env.core_value("*print-readably*").is_truthy(),
      print_length: length,
      print_level: level,
      print_meta: env.core_flag("*print-meta*"),
    }
  }

  pub fn display(mut self) -> Self {
    self.readably = false;
    self
  }
}

/// Readable print with default options; error messages use this.
pub fn pr_str_basic(v: &Value) -> String {
  let mut out = String::new();
  print_value(&mut out, v, &PrintOpts::default(), 0);
  out
}

/// Display print with default options.
pub fn print_str_basic(v: &Value) -> String {
  let mut out = String::new();
  print_value(&mut out, v, &PrintOpts::default().display(), 0);
  out
}

pub fn pr_str(env: &Rc<Env>, v: &Value) -> String {
  let mut out = String::new();
  print_value(&mut out, v, &PrintOpts::from_env(env), 0);
  out
}

pub fn print_str(env: &Rc<Env>, v: &Value) -> String {
  let mut out = String::new();
  print_value(&mut out, v, &PrintOpts::from_env(env).display(), 0);
  out
}

pub fn print_value(
  out: &mut String,
  v: &Value,
  opts: &PrintOpts,
  level: usize,
) {
  if let Some(max_level) = opts.print_level {
    if level > max_level {
      out.push('#');
      return;
    }
  }
  if opts.print_meta {
    if let Some(meta) = v.meta() {
      out.push('^');
      let inner = PrintOpts {
        print_meta: false,
        ..*opts
      };
      print_value(out, &meta, &inner, level);
      out.push(' ');
    }
  }
  match v {
    Value::Nil => out.push_str("nil"),
    Value::Boolean(b) => {
      out.push_str(if *b { "true" } else { "false" })
    }
    Value::Int(i) => out.push_str(&i.to_string()),
    Value::Float(f) => out.push_str(&format_double(*f)),
    Value::BigInt(b) => {
      out.push_str(&b.to_string());
      out.push('N');
    }
    Value::BigDecimal(d) => {
      out.push_str(&d.to_string());
      out.push('M');
    }
    Value::Ratio(r) => out.push_str(&r.to_string()),
    Value::Char(c) => {
      if opts.readably {
        out.push_str(&readable_char(*c));
      } else {
        out.push(*c);
      }
    }
    Value::Str(s) => {
      if opts.readably {
        out.push('"');
        for c in s.chars() {
          match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\u{0C}' => out.push_str("\\f"),
            '\u{08}' => out.push_str("\\b"),
            c => out.push(c),
          }
        }
        out.push('"');
      } else {
        out.push_str(s);
      }
    }
    Value::Symbol(s) => {
      if let Some(ns) = &s.namespace {
        out.push_str(ns);
        out.push('/');
      }
      out.push_str(&s.name);
    }
    Value::Keyword(k) => {
      out.push(':');
      if let Some(ns) = &k.namespace {
        out.push_str(ns);
        out.push('/');
      }
      out.push_str(&k.name);
    }
    Value::List(_)
    | Value::Cons(_)
    | Value::Chunked(_)
    | Value::LazySeq(_) => {
      print_seq(out, v, opts, level, "(", ")");
    }
    Value::Vector(items) => {
      out.push('[');
      let mut first = true;
      for (ix, item) in items.iter().enumerate() {
        if over_length(opts, ix) {
          push_ellipsis(out, &mut first);
          break;
        }
        if !first {
          out.push(' ');
        }
        first = false;
        print_value(out, item, opts, level + 1);
      }
      out.push(']');
    }
    Value::Map(map) => {
      out.push('{');
      let mut first = true;
      let mut ix = 0;
      for (k, val) in map.entries() {
        if is_reify_tag(k) {
          continue;
        }
        if over_length(opts, ix) {
          push_ellipsis(out, &mut first);
          break;
        }
        if !first {
          out.push_str(", ");
        }
        first = false;
        print_value(out, k, opts, level + 1);
        out.push(' ');
        print_value(out, val, opts, level + 1);
        ix += 1;
      }
      out.push('}');
    }
    Value::Set(set) => {
      out.push_str("#{");
      let mut first = true;
      for (ix, item) in set.iter().enumerate() {
        if over_length(opts, ix) {
          push_ellipsis(out, &mut first);
          break;
        }
        if !first {
          out.push(' ');
        }
        first = false;
        print_value(out, item, opts, level + 1);
      }
      out.push('}');
    }
    Value::Fn(f) => {
      out.push_str("#function[");
      out.push_str(f.name.as_deref().unwrap_or("fn"));
      out.push(']');
    }
    Value::Builtin(b) => {
      out.push_str("#function[");
      out.push_str(b.name);
      out.push(']');
    }
    Value::NativeFn(f) => {
      out.push_str("#function[");
      out.push_str(f.name);
      out.push(']');
    }
    Value::MultiFn(m) => {
      out.push_str("#multifn[");
      out.push_str(&m.name);
      out.push(']');
    }
    Value::Var(var) => {
      out.push_str("#'");
      out.push_str(&var.qualified_name());
    }
    Value::Namespace(ns) => {
      out.push_str("#namespace[");
      out.push_str(&ns.name());
      out.push(']');
    }
    Value::Atom(cell) => {
      out.push_str("#atom[");
      print_value(out, &cell.value.borrow(), opts, level + 1);
      out.push(']');
    }
    Value::Volatile(cell) => {
      out.push_str("#volatile[");
      print_value(out, &cell.borrow(), opts, level + 1);
      out.push(']');
    }
    Value::Delay(cell) => {
      if cell.is_realized() {
        out.push_str("#delay[realized]");
      } else {
        out.push_str("#delay[pending]");
      }
    }
    Value::Reduced(inner) => {
      out.push_str("#reduced[");
      print_value(out, inner, opts, level + 1);
      out.push(']');
    }
    Value::Regex(r) => {
      out.push_str("#\"");
      out.push_str(&r.pattern);
      out.push('"');
    }
    Value::StringBuilder(buffer) => {
      if opts.readably {
        print_value(
          out,
          &Value::string(buffer.borrow().clone()),
          opts,
          level,
        );
      } else {
        out.push_str(&buffer.borrow());
      }
    }
    Value::Exception(e) => {
      out.push_str("#error[");
      out.push_str(e.class());
      out.push_str(" \"");
      out.push_str(&e.message);
      out.push_str("\"]");
    }
  }
}

fn print_seq(
  out: &mut String,
  v: &Value,
  opts: &PrintOpts,
  level: usize,
  open: &str,
  close: &str,
) {
  out.push_str(open);
  let mut first = true;
  for (ix, item) in seq::iter(v).enumerate() {
    if over_length(opts, ix) {
      push_ellipsis(out, &mut first);
      break;
    }
    match item {
      Ok(item) => {
        if !first {
          out.push(' ');
        }
        first = false;
        print_value(out, &item, opts, level + 1);
      }
      Err(_) => {
        push_ellipsis(out, &mut first);
        break;
      }
    }
  }
  out.push_str(close);
}

fn over_length(opts: &PrintOpts, ix: usize) -> bool {
  opts.print_length.map(|max| ix >= max).unwrap_or(false)
}

fn push_ellipsis(out: &mut String, first: &mut bool) {
  if !*first {
    out.push(' ');
  }
  *first = false;
  out.push_str("...");
}

fn is_reify_tag(key: &Value) -> bool {
  matches!(
    key,
    Value::Keyword(k)
      if k.namespace.is_none() && k.name.as_ref() == REIFY_TYPE_KEY
  )
}

/// Doubles keep a decimal point so they re-read as doubles.
pub fn format_double(f: f64) -> String {
  if f.is_nan() {
    return "##NaN".to_string();
  }
  if f.is_infinite() {
    return if f > 0.0 { "##Inf" } else { "##-Inf" }.to_string();
  }
  if f == f.trunc() && f.abs() < 1e16 {
    format!("{:.1}", f)
  } else {
    let plain = format!("{}", f);
    // Rust renders exponents as 1e20; the reader accepts both forms.
    plain
  }
}

fn readable_char(c: char) -> String {
  match c {
    '\n' => "\\newline".to_string(),
    ' ' => "\\space".to_string(),
    '\t' => "\\tab".to_string(),
    '\r' => "\\return".to_string(),
    '\u{0C}' => "\\formfeed".to_string(),
    '\u{08}' => "\\backspace".to_string(),
    c if (c as u32) < 0x20 => format!("\\u{:04x}", c as u32),
    c => format!("\\{}", c),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn readable_scalars_round_trip_shapes() {
    assert_eq!(pr_str_basic(&Value::Nil), "nil");
    assert_eq!(pr_str_basic(&Value::Int(42)), "42");
    assert_eq!(pr_str_basic(&Value::Float(1.0)), "1.0");
    assert_eq!(pr_str_basic(&Value::string("a\"b")), "\"a\\\"b\"");
    assert_eq!(pr_str_basic(&Value::Char('\n')), "\\newline");
    assert_eq!(pr_str_basic(&Value::kw("a")), ":a");
  }

  #[test]
  fn display_mode_leaves_strings_bare() {
    assert_eq!(print_str_basic(&Value::string("hi")), "hi");
    assert_eq!(print_str_basic(&Value::Char('x')), "x");
  }

  #[test]
  fn collections_print_with_commas_in_maps() {
    let m = Value::map_from_pairs(vec![
      (Value::kw("a"), Value::Int(1)),
      (Value::kw("b"), Value::Int(2)),
    ]);
    assert_eq!(pr_str_basic(&m), "{:a 1, :b 2}");
  }

  #[test]
  fn print_length_truncates() {
    let v =
      Value::vector((0..10).map(Value::Int).collect::<Vec<_>>());
    let opts = PrintOpts {
      print_length: Some(3),
      ..PrintOpts::default()
    };
    let mut out = String::new();
    print_value(&mut out, &v, &opts, 0);
    assert_eq!(out, "[0 1 2 ...]");
  }
}
