// pprint/dispatch.rs
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

//! Dispatch functions: how values become logical blocks.
//!
//! `simple-dispatch` lays out plain data; `code-dispatch` knows the
//! shapes of `def`, `defn`, `let`, `if`, `cond`, `condp`, `fn*`, and
//! `ns` forms and indents their bodies the way source files do.

use std::rc::Rc;

use crate::{
  env::Env,
  error::Result,
  printer::{self, PrintOpts},
  value::{seq, Value, REIFY_TYPE_KEY},
};

use super::{IndentRelativeTo, NewlineKind, PrettyWriter};

/// Leaves print exactly as the flat printer would.
fn leaf(env: &Rc<Env>, writer: &mut PrettyWriter, value: &Value) {
  let opts = PrintOpts::from_env(env);
  let mut text = String::new();
  printer::print_value(&mut text, value, &opts, 0);
  writer.write(&text);
}

fn print_level(env: &Rc<Env>) -> Option<usize> {
  match env.core_value("*print-level*") {
    Value::Int(n) if n >= 0 => Some(n as usize),
    _ => None,
  }
}

fn print_length(env: &Rc<Env>) -> Option<usize> {
  match env.core_value("*print-length*") {
    Value::Int(n) if n >= 0 => Some(n as usize),
    _ => None,
  }
}

pub fn simple_dispatch(
  env: &Rc<Env>,
  writer: &mut PrettyWriter,
  value: &Value,
  depth: usize,
) -> Result<()> {
  if let Some(max) = print_level(env) {
    if depth > max {
      writer.write("#");
      return Ok(());
    }
  }
  match value {
    Value::List(_) | Value::Cons(_) | Value::Chunked(_)
    | Value::LazySeq(_) => {
      seq_block(env, writer, value, depth, "(", ")", NewlineKind::Linear)
    }
    Value::Vector(_) => {
      seq_block(env, writer, value, depth, "[", "]", NewlineKind::Fill)
    }
    Value::Set(_) => {
      seq_block(env, writer, value, depth, "#{", "}", NewlineKind::Fill)
    }
    Value::Map(m) => {
      writer.start_block("{", "}", None);
      let mut first = true;
      let mut shown = 0_usize;
      for (k, v) in m.entries() {
        if matches!(
          k,
          Value::Keyword(kw)
            if kw.namespace.is_none()
              && kw.name.as_ref() == REIFY_TYPE_KEY
        ) {
          continue;
        }
        if let Some(max) = print_length(env) {
          if shown >= max {
            if !first {
              writer.write(" ");
            }
            writer.write("...");
            break;
          }
        }
        if !first {
          writer.write(",");
          writer.write(" ");
          writer.newline(NewlineKind::Linear);
        }
        first = false;
        shown += 1;
        simple_dispatch(env, writer, k, depth + 1)?;
        writer.write(" ");
        simple_dispatch(env, writer, v, depth + 1)?;
      }
      writer.end_block();
      Ok(())
    }
    other => {
      leaf(env, writer, other);
      Ok(())
    }
  }
}

fn seq_block(
  env: &Rc<Env>,
  writer: &mut PrettyWriter,
  value: &Value,
  depth: usize,
  open: &str,
  close: &str,
  separator: NewlineKind,
) -> Result<()> {
  writer.start_block(open, close, None);
  let mut first = true;
  for (ix, item) in seq::iter(value).enumerate() {
    let item = item?;
    if let Some(max) = print_length(env) {
      if ix >= max {
        if !first {
          writer.write(" ");
        }
        writer.write("...");
        break;
      }
    }
    if !first {
      writer.write(" ");
      writer.newline(separator);
    }
    first = false;
    simple_dispatch(env, writer, &item, depth + 1)?;
  }
  writer.end_block();
  Ok(())
}

pub fn code_dispatch(
  env: &Rc<Env>,
  writer: &mut PrettyWriter,
  value: &Value,
  depth: usize,
) -> Result<()> {
  let head = match value {
    Value::List(_) | Value::Cons(_) => {
      match seq::first(value)? {
        Value::Symbol(s) if s.namespace.is_none() => {
          Some(s.name.to_string())
        }
        _ => None,
      }
    }
    _ => None,
  };
  match head.as_deref() {
    Some(
      "def" | "defn" | "defn-" | "defmacro" | "defonce"
      | "defmulti",
    ) => defn_layout(env, writer, value, depth),
    Some(
      "let" | "let*" | "loop" | "loop*" | "binding" | "doseq"
      | "dotimes" | "when-let" | "if-let" | "with-open",
    ) => binding_layout(env, writer, value, depth),
    Some("if" | "if-not" | "when" | "when-not" | "while") => {
      head_body_layout(env, writer, value, depth, 2)
    }
    Some("cond" | "condp" | "case") => {
      pair_layout(env, writer, value, depth)
    }
    Some("fn" | "fn*") => {
      head_body_layout(env, writer, value, depth, 2)
    }
    Some("ns") => head_body_layout(env, writer, value, depth, 2),
    _ => simple_dispatch(env, writer, value, depth),
  }
}

/// `(def name ...)`: the head and the name share the first line, each
/// following form gets its own.
fn defn_layout(
  env: &Rc<Env>,
  writer: &mut PrettyWriter,
  value: &Value,
  depth: usize,
) -> Result<()> {
  let items = seq::to_vec(value)?;
  writer.start_block("(", ")", None);
  writer.indent(IndentRelativeTo::Block, 1);
  for (ix, item) in items.iter().enumerate() {
    if ix == 1 {
      writer.write(" ");
    } else if ix > 1 {
      writer.write(" ");
      writer.newline(NewlineKind::Linear);
    }
    code_dispatch(env, writer, item, depth + 1)?;
  }
  writer.end_block();
  Ok(())
}

/// `(let [bindings] body...)`: the binding vector rides with the head,
/// the body indents under it.
fn binding_layout(
  env: &Rc<Env>,
  writer: &mut PrettyWriter,
  value: &Value,
  depth: usize,
) -> Result<()> {
  let items = seq::to_vec(value)?;
  writer.start_block("(", ")", None);
  writer.indent(IndentRelativeTo::Block, 1);
  for (ix, item) in items.iter().enumerate() {
    if ix == 1 {
      writer.write(" ");
    } else if ix > 1 {
      writer.write(" ");
      writer.newline(NewlineKind::Linear);
    }
    if ix == 1 {
      binding_vector(env, writer, item, depth + 1)?;
    } else {
      code_dispatch(env, writer, item, depth + 1)?;
    }
  }
  writer.end_block();
  Ok(())
}

/// Binding vectors keep name/value pairs together, one pair per line.
fn binding_vector(
  env: &Rc<Env>,
  writer: &mut PrettyWriter,
  value: &Value,
  depth: usize,
) -> Result<()> {
  let Value::Vector(_) = value else {
    return code_dispatch(env, writer, value, depth);
  };
  let items = seq::to_vec(value)?;
  writer.start_block("[", "]", None);
  for (ix, pair) in items.chunks(2).enumerate() {
    if ix > 0 {
      writer.write(" ");
      writer.newline(NewlineKind::Linear);
    }
    code_dispatch(env, writer, &pair[0], depth + 1)?;
    if let Some(init) = pair.get(1) {
      writer.write(" ");
      code_dispatch(env, writer, init, depth + 1)?;
    }
  }
  writer.end_block();
  Ok(())
}

/// Head keeps `lead` forms on its line; the rest is the indented body.
fn head_body_layout(
  env: &Rc<Env>,
  writer: &mut PrettyWriter,
  value: &Value,
  depth: usize,
  lead: usize,
) -> Result<()> {
  let items = seq::to_vec(value)?;
  writer.start_block("(", ")", None);
  writer.indent(IndentRelativeTo::Block, 1);
  for (ix, item) in items.iter().enumerate() {
    if ix > 0 {
      writer.write(" ");
      if ix >= lead {
        writer.newline(NewlineKind::Linear);
      }
    }
    code_dispatch(env, writer, item, depth + 1)?;
  }
  writer.end_block();
  Ok(())
}

/// `cond`-family: clause pairs, one per line.
fn pair_layout(
  env: &Rc<Env>,
  writer: &mut PrettyWriter,
  value: &Value,
  depth: usize,
) -> Result<()> {
  let items = seq::to_vec(value)?;
  writer.start_block("(", ")", None);
  writer.indent(IndentRelativeTo::Block, 1);
  if let Some(head) = items.first() {
    code_dispatch(env, writer, head, depth + 1)?;
  }
  for pair in items[1..].chunks(2) {
    writer.write(" ");
    writer.newline(NewlineKind::Linear);
    code_dispatch(env, writer, &pair[0], depth + 1)?;
    if let Some(then) = pair.get(1) {
      writer.write(" ");
      code_dispatch(env, writer, then, depth + 1)?;
    }
  }
  writer.end_block();
  Ok(())
}

//
// The dispatch fns as vars
//

pub fn simple_dispatch_builtin(
  env: &Rc<Env>,
  args: Vec<Value>,
) -> Result<Value> {
  crate::core::exact("simple-dispatch", &args, 1)?;
  let mut writer = PrettyWriter::from_env(env);
  simple_dispatch(env, &mut writer, &args[0], 0)?;
  env.write_out(&writer.finish())?;
  Ok(Value::Nil)
}

pub fn code_dispatch_builtin(
  env: &Rc<Env>,
  args: Vec<Value>,
) -> Result<Value> {
  crate::core::exact("code-dispatch", &args, 1)?;
  let mut writer = PrettyWriter::from_env(env);
  code_dispatch(env, &mut writer, &args[0], 0)?;
  env.write_out(&writer.finish())?;
  Ok(Value::Nil)
}
