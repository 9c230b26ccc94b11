// pprint/mod.rs
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

//! The column-aware pretty printer.
//!
//! Dispatch functions build a tree of logical blocks holding text blobs,
//! conditional newlines, and indents; the layout pass then walks the
//! tree deciding each newline by its kind.  Mandatory always breaks,
//! linear breaks when its block cannot lay out on one line, miser
//! additionally requires the block to start near the right margin, and
//! fill breaks only when the coming section would overflow.
//! `cl-format`'s `~<~:>` logical blocks drive this same engine.

pub mod cl_format;
mod dispatch;

use std::rc::Rc;

use crate::{
  env::Env,
  error::Result,
  value::Value,
};

/// Conditional newline kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NewlineKind {
  Linear,
  Miser,
  Fill,
  Mandatory,
}

/// What an indent is measured against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndentRelativeTo {
  /// The column where the block's content started.
  Block,
  /// The current output column.
  Current,
}

#[derive(Debug)]
enum Node {
  Text(String),
  Newline(NewlineKind),
  Indent(IndentRelativeTo, isize),
  Block(LogicalBlock),
}

#[derive(Debug, Default)]
struct LogicalBlock {
  prefix: String,
  suffix: String,
  per_line_prefix: Option<String>,
  children: Vec<Node>,
}

/// The writer the dispatch functions target.  Tokens buffer into a block
/// tree; `finish` runs the layout decisions and yields the final text.
#[derive(Debug)]
pub struct PrettyWriter {
  margin: usize,
  miser_width: usize,
  root: LogicalBlock,
  /// Path of open nested blocks, as child indices from the root.
  open: Vec<usize>,
}

impl PrettyWriter {
  pub fn new(margin: usize, miser_width: usize) -> Self {
    Self {
      margin,
      miser_width,
      root: LogicalBlock::default(),
      open: Vec::new(),
    }
  }

  /// Reads `*print-right-margin*` and `*print-miser-width*`.
  pub fn from_env(env: &Rc<Env>) -> Self {
    let margin = match env.core_value("*print-right-margin*") {
      Value::Int(n) if n > 0 => n as usize,
      _ => 72,
    };
    let miser = match env.core_value("*print-miser-width*") {
      Value::Int(n) if n >= 0 => n as usize,
      _ => 40,
    };
    Self::new(margin, miser)
  }

  fn current(&mut self) -> &mut LogicalBlock {
    let mut block = &mut self.root;
    for ix in &self.open {
      match &mut block.children[*ix] {
        Node::Block(inner) => block = inner,
        _ => unreachable!("open path always points at blocks"),
      }
    }
    block
  }

  pub fn start_block(
    &mut self,
    prefix: &str,
    suffix: &str,
    per_line_prefix: Option<String>,
  ) {
    let block = LogicalBlock {
      prefix: prefix.to_string(),
      suffix: suffix.to_string(),
      per_line_prefix,
      children: Vec::new(),
    };
    let parent = self.current();
    parent.children.push(Node::Block(block));
    let ix = parent.children.len() - 1;
    self.open.push(ix);
  }

  pub fn end_block(&mut self) {
    self.open.pop();
  }

  pub fn write(&mut self, text: &str) {
    if text.is_empty() {
      return;
    }
    let block = self.current();
    if let Some(Node::Text(last)) = block.children.last_mut() {
      last.push_str(text);
    } else {
      block.children.push(Node::Text(text.to_string()));
    }
  }

  pub fn newline(&mut self, kind: NewlineKind) {
    let block = self.current();
    block.children.push(Node::Newline(kind));
  }

  pub fn indent(&mut self, relative_to: IndentRelativeTo, offset: isize) {
    let block = self.current();
    block.children.push(Node::Indent(relative_to, offset));
  }

  /// Runs the newline decisions and returns the laid-out text.
  pub fn finish(mut self) -> String {
    while !self.open.is_empty() {
      self.end_block();
    }
    let mut out = String::new();
    let margin = self.margin;
    let miser = self.miser_width;
    let mut layout = Layout {
      margin,
      miser_width: miser,
      out: &mut out,
      col: 0,
      line_prefixes: Vec::new(),
    };
    layout.block(&self.root, 0);
    out
  }
}

struct Layout<'a> {
  margin: usize,
  miser_width: usize,
  out: &'a mut String,
  col: usize,
  /// Per-line prefixes of the open blocks, re-emitted after breaks.
  line_prefixes: Vec<String>,
}

impl<'a> Layout<'a> {
  fn push(&mut self, text: &str) {
    self.out.push_str(text);
    match text.rfind('\n') {
      Some(ix) => self.col = text.len() - ix - 1,
      None => self.col += text.chars().count(),
    }
  }

  /// Renders one block; returns whether it emitted any newline.
  fn block(&mut self, block: &LogicalBlock, _depth: usize) -> bool {
    self.push(&block.prefix);
    let start_col = self.col;
    if let Some(plp) = &block.per_line_prefix {
      self.line_prefixes.push(plp.clone());
    }

    // One-line test for the whole block, suffix included.
    let flat = flat_width(&block.children) + block.suffix.chars().count();
    let fits = start_col + flat <= self.margin;
    let miser_mode =
      self.margin.saturating_sub(self.miser_width) <= start_col;

    let mut indent = start_col;
    let mut done_nl = false;
    let mut intra_nl = false;
    let mut broke_any = false;

    for (ix, child) in block.children.iter().enumerate() {
      match child {
        Node::Text(text) => self.push(text),
        Node::Indent(relative_to, offset) => {
          let base = match relative_to {
            IndentRelativeTo::Block => start_col,
            IndentRelativeTo::Current => self.col,
          };
          indent = offset_col(base, *offset);
        }
        Node::Newline(kind) => {
          let linear_break = !fits || done_nl;
          let should_break = match kind {
            NewlineKind::Mandatory => true,
            NewlineKind::Linear => linear_break,
            NewlineKind::Miser => miser_mode && linear_break,
            NewlineKind::Fill => {
              intra_nl
                || !self.section_fits(&block.children[ix + 1..])
                || (miser_mode && linear_break)
            }
          };
          if should_break {
            self.break_line(indent);
            done_nl = true;
            broke_any = true;
          }
        }
        Node::Block(inner) => {
          let inner_broke = self.block(inner, _depth + 1);
          if inner_broke {
            // A break inside marks this block and feeds the fill
            // decisions of the siblings that follow.
            done_nl = true;
            intra_nl = true;
            broke_any = true;
          }
        }
      }
    }

    if block.per_line_prefix.is_some() {
      self.line_prefixes.pop();
    }
    self.push(&block.suffix);
    broke_any
  }

  fn break_line(&mut self, indent: usize) {
    // Trailing spaces before a break would survive as dangling
    // whitespace.
    while self.out.ends_with(' ') {
      self.out.pop();
    }
    self.out.push('\n');
    self.col = 0;
    let prefixes: Vec<String> = self.line_prefixes.clone();
    for prefix in &prefixes {
      self.push(prefix);
    }
    let spaces = indent.saturating_sub(self.col);
    for _ in 0..spaces {
      self.out.push(' ');
    }
    self.col += spaces;
  }

  /// Whether the section from here to the next newline of this block
  /// fits on the current line.
  fn section_fits(&self, following: &[Node]) -> bool {
    let mut width = 0;
    for node in following {
      match node {
        Node::Newline(_) => break,
        Node::Text(text) => width += text.chars().count(),
        Node::Block(inner) => width += block_flat_width(inner),
        Node::Indent(..) => (),
      }
    }
    self.col + width <= self.margin
  }
}

fn offset_col(base: usize, offset: isize) -> usize {
  if offset < 0 {
    base.saturating_sub(offset.unsigned_abs())
  } else {
    base + offset as usize
  }
}

fn flat_width(nodes: &[Node]) -> usize {
  nodes.iter().fold(0_usize, |acc, node| {
    acc.saturating_add(match node {
      Node::Text(text) => text.chars().count(),
      Node::Block(inner) => block_flat_width(inner),
      // A mandatory newline can never lay out flat; an effectively
      // infinite width fails every enclosing one-line test.
      Node::Newline(NewlineKind::Mandatory) => usize::MAX / 4,
      Node::Newline(_) => 0,
      Node::Indent(..) => 0,
    })
  })
}

fn block_flat_width(block: &LogicalBlock) -> usize {
  block
    .prefix
    .chars()
    .count()
    .saturating_add(flat_width(&block.children))
    .saturating_add(block.suffix.chars().count())
}

//
// Entry points and vars
//

/// Installs `pprint`, `cl-format`, and the dispatch vars into
/// `clojure.core`, mirrored into a `clojure.pprint` namespace.
pub fn install(env: &Rc<Env>) {
  let core = env.core_ns();
  crate::core::def_builtin(&core, "pprint", pprint_builtin);
  crate::core::def_builtin(&core, "cl-format", cl_format_builtin);
  crate::core::def_builtin(
    &core,
    "simple-dispatch",
    dispatch::simple_dispatch_builtin,
  );
  crate::core::def_builtin(
    &core,
    "code-dispatch",
    dispatch::code_dispatch_builtin,
  );
  crate::core::def_builtin(
    &core,
    "with-pprint-dispatch*",
    with_pprint_dispatch_star,
  );
  if let Some(var) = core.mapping("*print-pprint-dispatch*") {
    var.set_root(
      core
        .mapping("simple-dispatch")
        .and_then(|v| v.root())
        .unwrap_or(Value::Nil),
    );
  }
  let pprint_ns = env.create_ns("clojure.pprint".into());
  for name in [
    "pprint",
    "cl-format",
    "simple-dispatch",
    "code-dispatch",
    "with-pprint-dispatch*",
    "*print-pprint-dispatch*",
    "*print-right-margin*",
    "*print-miser-width*",
  ] {
    if let Some(var) = core.mapping(name) {
      pprint_ns.add_mapping(name.into(), var);
    }
  }
}

/// Pretty-prints to a string, honoring margin and dispatch.
pub fn pprint_str(env: &Rc<Env>, value: &Value) -> Result<String> {
  let mut writer = PrettyWriter::from_env(env);
  let dispatch_fn = env.core_value("*print-pprint-dispatch*");
  let use_code = matches!(
    &dispatch_fn,
    Value::Builtin(b) if b.name == "code-dispatch"
  );
  if use_code {
    dispatch::code_dispatch(env, &mut writer, value, 0)?;
  } else {
    dispatch::simple_dispatch(env, &mut writer, value, 0)?;
  }
  Ok(writer.finish())
}

fn pprint_builtin(
  env: &Rc<Env>,
  args: Vec<Value>,
) -> Result<Value> {
  crate::core::between("pprint", &args, 1, 2)?;
  let text = pprint_str(env, &args[0])?;
  env.write_out(&text)?;
  env.write_out("\n")?;
  Ok(Value::Nil)
}

fn cl_format_builtin(
  env: &Rc<Env>,
  args: Vec<Value>,
) -> Result<Value> {
  crate::core::at_least("cl-format", &args, 2)?;
  let Value::Str(control) = &args[1] else {
    return Err(crate::error::Error::type_error(
      "cl-format needs a control string",
    ));
  };
  let rendered =
    cl_format::format(env, control, args[2..].to_vec())?;
  match &args[0] {
    // nil destination returns the string.
    Value::Nil => Ok(Value::string(rendered)),
    // true (or any writer stand-in) means *out*.
    _ => {
      env.write_out(&rendered)?;
      Ok(Value::Nil)
    }
  }
}

fn with_pprint_dispatch_star(
  env: &Rc<Env>,
  args: Vec<Value>,
) -> Result<Value> {
  crate::core::exact("with-pprint-dispatch*", &args, 2)?;
  let var = env
    .core_var("*print-pprint-dispatch*")
    .ok_or_else(|| {
      crate::error::Error::lookup("*print-pprint-dispatch* missing")
    })?;
  env.push_bindings(vec![(var, args[0].clone())])?;
  let result = crate::eval::apply(env, &args[1], Vec::new());
  env.pop_bindings()?;
  result
}

#[cfg(test)]
mod tests {
  use super::*;

  fn layout(
    margin: usize,
    build: impl FnOnce(&mut PrettyWriter),
  ) -> String {
    let mut w = PrettyWriter::new(margin, 40);
    build(&mut w);
    w.finish()
  }

  #[test]
  fn short_blocks_stay_on_one_line() {
    let text = layout(40, |w| {
      w.start_block("[", "]", None);
      w.write("1");
      w.newline(NewlineKind::Fill);
      w.write("2");
      w.end_block();
    });
    assert_eq!(text, "[12]");
  }

  #[test]
  fn linear_newlines_all_break_when_the_block_overflows() {
    let text = layout(8, |w| {
      w.start_block("(", ")", None);
      w.write("aaaa");
      w.newline(NewlineKind::Linear);
      w.write("bbbb");
      w.newline(NewlineKind::Linear);
      w.write("cc");
      w.end_block();
    });
    assert_eq!(text, "(aaaa\n bbbb\n cc)");
  }

  #[test]
  fn fill_breaks_only_at_the_margin() {
    let text = layout(10, |w| {
      w.start_block("[", "]", None);
      for (ix, word) in ["aaa", "bbb", "ccc", "ddd"]
        .iter()
        .enumerate()
      {
        if ix > 0 {
          w.write(" ");
          w.newline(NewlineKind::Fill);
        }
        w.write(word);
      }
      w.end_block();
    });
    // Two words per line fit within ten columns; continuation lines
    // align after the opening bracket.
    assert_eq!(text, "[aaa bbb\n ccc ddd]");
  }

  #[test]
  fn mandatory_always_breaks() {
    let text = layout(80, |w| {
      w.start_block("", "", None);
      w.write("a");
      w.newline(NewlineKind::Mandatory);
      w.write("b");
      w.end_block();
    });
    assert_eq!(text, "a\nb");
  }

  #[test]
  fn indent_applies_after_breaks() {
    let text = layout(8, |w| {
      w.start_block("(", ")", None);
      w.write("head");
      w.indent(IndentRelativeTo::Block, 2);
      w.newline(NewlineKind::Linear);
      w.write("body");
      w.end_block();
    });
    assert_eq!(text, "(head\n   body)");
  }
}
