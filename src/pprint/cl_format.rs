// pprint/cl_format.rs
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

//! The Common-Lisp-compatible format compiler.
//!
//! A control string compiles once into a directive sequence; running it
//! consumes arguments and writes through the pretty writer, so `~<~:>`
//! logical blocks share the newline decisions with `pprint`.

use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::Signed;

use crate::{
  env::Env,
  error::{Error, Result},
  printer,
  value::{num, seq, Value},
};

use super::{IndentRelativeTo, NewlineKind, PrettyWriter};

pub fn format(
  env: &Rc<Env>,
  control: &str,
  args: Vec<Value>,
) -> Result<String> {
  let directives = compile(control)?;
  let mut writer = PrettyWriter::from_env(env);
  let mut state = RunState {
    env: env.clone(),
    args,
    pos: 0,
    line_start: true,
  };
  run(&directives, &mut state, &mut writer)?;
  Ok(writer.finish())
}

//
// Compiled representation
//

#[derive(Clone, Debug)]
enum Param {
  Int(i64),
  Char(char),
  /// `v`: consume the parameter from the arguments.
  FromArgs,
  /// `#`: the count of remaining arguments.
  Remaining,
}

#[derive(Clone, Debug)]
struct Directive {
  kind: Kind,
  params: Vec<Option<Param>>,
  colon: bool,
  at: bool,
}

#[derive(Clone, Debug)]
enum Kind {
  Literal(String),
  Ascii,
  Sexpr,
  Decimal,
  Binary,
  Octal,
  Hex,
  Radix,
  FixedFloat,
  ExpFloat,
  GeneralFloat,
  Dollar,
  Character,
  Plural,
  Newline,
  FreshLine,
  Page,
  Tilde,
  Goto,
  Indirection,
  EarlyExit,
  ConditionalNewline,
  Indent,
  Iteration {
    body: Vec<Directive>,
    force_once: bool,
  },
  Conditional {
    clauses: Vec<Vec<Directive>>,
    default_last: bool,
  },
  CaseConversion {
    body: Vec<Directive>,
  },
  Justify {
    segments: Vec<Vec<Directive>>,
  },
  LogicalBlock {
    prefix: String,
    suffix: String,
    body: Vec<Directive>,
  },
}

//
// Compilation
//

pub fn compile(control: &str) -> Result<Vec<Directive>> {
  let chars: Vec<char> = control.chars().collect();
  let mut parser = Parser { chars, pos: 0 };
  let (directives, terminator) = parser.parse_until(&[])?;
  if terminator.is_some() {
    return Err(Error::illegal_argument(
      "unmatched closing directive in format string",
    ));
  }
  Ok(directives)
}

struct Terminator {
  ch: char,
  colon: bool,
  #[allow(dead_code)]
  at: bool,
}

struct Parser {
  chars: Vec<char>,
  pos: usize,
}

impl Parser {
  fn peek(&self) -> Option<char> {
    self.chars.get(self.pos).copied()
  }

  fn bump(&mut self) -> Option<char> {
    let c = self.peek();
    if c.is_some() {
      self.pos += 1;
    }
    c
  }

  /// Parses until one of `closers` appears as a `~x` directive (or the
  /// separator `~;`, which is also returned to the caller).
  fn parse_until(
    &mut self,
    closers: &[char],
  ) -> Result<(Vec<Directive>, Option<Terminator>)> {
    let mut out: Vec<Directive> = Vec::new();
    let mut literal = String::new();
    while let Some(c) = self.bump() {
      if c != '~' {
        literal.push(c);
        continue;
      }
      if !literal.is_empty() {
        out.push(plain(Kind::Literal(std::mem::take(
          &mut literal,
        ))));
      }
      let params = self.parse_params()?;
      let (mut colon, mut at) = (false, false);
      loop {
        match self.peek() {
          Some(':') => {
            colon = true;
            self.pos += 1;
          }
          Some('@') => {
            at = true;
            self.pos += 1;
          }
          _ => break,
        }
      }
      let Some(d) = self.bump() else {
        return Err(Error::illegal_argument(
          "format string ends inside a directive",
        ));
      };
      if closers.contains(&d) || d == ';' {
        if !literal.is_empty() {
          out.push(plain(Kind::Literal(literal)));
        }
        return Ok((out, Some(Terminator { ch: d, colon, at })));
      }
      let kind = match d.to_ascii_lowercase() {
        'a' => Kind::Ascii,
        's' => Kind::Sexpr,
        'd' => Kind::Decimal,
        'b' => Kind::Binary,
        'o' => Kind::Octal,
        'x' => Kind::Hex,
        'r' => Kind::Radix,
        'f' => Kind::FixedFloat,
        'e' => Kind::ExpFloat,
        'g' => Kind::GeneralFloat,
        '$' => Kind::Dollar,
        'c' => Kind::Character,
        'p' => Kind::Plural,
        '%' => Kind::Newline,
        '&' => Kind::FreshLine,
        '|' => Kind::Page,
        '~' => Kind::Tilde,
        '*' => Kind::Goto,
        '?' => Kind::Indirection,
        '^' => Kind::EarlyExit,
        '_' => Kind::ConditionalNewline,
        'i' => Kind::Indent,
        '\n' => {
          // ~<newline> elides the newline and following whitespace.
          while matches!(self.peek(), Some(c) if c == ' ' || c == '\t')
          {
            self.pos += 1;
          }
          continue;
        }
        '{' => {
          let (body, term) = self.parse_until(&['}'])?;
          let term = term.ok_or_else(|| {
            Error::illegal_argument("unterminated ~{ directive")
          })?;
          Kind::Iteration {
            body,
            force_once: term.colon,
          }
        }
        '[' => self.parse_conditional()?,
        '(' => {
          let (body, term) = self.parse_until(&[')'])?;
          if term.is_none() {
            return Err(Error::illegal_argument(
              "unterminated ~( directive",
            ));
          }
          Kind::CaseConversion { body }
        }
        '<' => self.parse_bracket(colon)?,
        other => {
          return Err(Error::illegal_argument(format!(
            "unsupported format directive ~{}",
            other
          )));
        }
      };
      out.push(Directive {
        kind,
        params,
        colon,
        at,
      });
    }
    if !literal.is_empty() {
      out.push(plain(Kind::Literal(literal)));
    }
    Ok((out, None))
  }

  fn parse_params(&mut self) -> Result<Vec<Option<Param>>> {
    let mut params = Vec::new();
    loop {
      match self.peek() {
        Some(c) if c.is_ascii_digit() || c == '-' || c == '+' => {
          let mut text = String::new();
          if c == '-' || c == '+' {
            text.push(c);
            self.pos += 1;
          }
          while matches!(self.peek(), Some(d) if d.is_ascii_digit())
          {
            text.push(self.bump().unwrap());
          }
          let n: i64 = text.parse().map_err(|_| {
            Error::illegal_argument("bad numeric format parameter")
          })?;
          params.push(Some(Param::Int(n)));
        }
        Some('\'') => {
          self.pos += 1;
          let c = self.bump().ok_or_else(|| {
            Error::illegal_argument("missing character parameter")
          })?;
          params.push(Some(Param::Char(c)));
        }
        Some('v') | Some('V') => {
          self.pos += 1;
          params.push(Some(Param::FromArgs));
        }
        Some('#') => {
          self.pos += 1;
          params.push(Some(Param::Remaining));
        }
        _ => {
          // A bare comma stands for an omitted parameter.
          if self.peek() == Some(',') {
            params.push(None);
          } else {
            break;
          }
        }
      }
      if self.peek() == Some(',') {
        self.pos += 1;
      } else {
        break;
      }
    }
    Ok(params)
  }

  fn parse_conditional(&mut self) -> Result<Kind> {
    let mut clauses: Vec<Vec<Directive>> = Vec::new();
    let mut default_last = false;
    loop {
      let (clause, term) = self.parse_until(&[']'])?;
      let term = term.ok_or_else(|| {
        Error::illegal_argument("unterminated ~[ directive")
      })?;
      clauses.push(clause);
      match term.ch {
        ']' => break,
        ';' => {
          if term.colon {
            default_last = true;
          }
        }
        _ => unreachable!(),
      }
    }
    Ok(Kind::Conditional {
      clauses,
      default_last,
    })
  }

  /// `~<...~>` is justification; a `:` on either bracket makes it a
  /// logical block whose segments are prefix, body, and suffix.
  fn parse_bracket(&mut self, open_colon: bool) -> Result<Kind> {
    let mut segments: Vec<Vec<Directive>> = Vec::new();
    let close_colon;
    loop {
      let (segment, term) = self.parse_until(&['>'])?;
      let term = term.ok_or_else(|| {
        Error::illegal_argument("unterminated ~< directive")
      })?;
      segments.push(segment);
      match term.ch {
        '>' => {
          close_colon = term.colon;
          break;
        }
        ';' => (),
        _ => unreachable!(),
      }
    }
    if !(open_colon || close_colon) {
      return Ok(Kind::Justify { segments });
    }
    let (prefix, body, suffix) = match segments.len() {
      1 => {
        let body = segments.into_iter().next().unwrap();
        (
          if open_colon { "(".to_string() } else { String::new() },
          body,
          if open_colon { ")".to_string() } else { String::new() },
        )
      }
      2 => {
        let mut it = segments.into_iter();
        let prefix = literal_text(&it.next().unwrap())?;
        let body = it.next().unwrap();
        (prefix, body, String::new())
      }
      3 => {
        let mut it = segments.into_iter();
        let prefix = literal_text(&it.next().unwrap())?;
        let body = it.next().unwrap();
        let suffix = literal_text(&it.next().unwrap())?;
        (prefix, body, suffix)
      }
      n => {
        return Err(Error::illegal_argument(format!(
          "logical block with {} segments",
          n
        )));
      }
    };
    Ok(Kind::LogicalBlock {
      prefix,
      suffix,
      body,
    })
  }
}

fn literal_text(directives: &[Directive]) -> Result<String> {
  let mut out = String::new();
  for d in directives {
    match &d.kind {
      Kind::Literal(text) => out.push_str(text),
      _ => {
        return Err(Error::illegal_argument(
          "logical block prefix/suffix must be literal text",
        ));
      }
    }
  }
  Ok(out)
}

fn plain(kind: Kind) -> Directive {
  Directive {
    kind,
    params: Vec::new(),
    colon: false,
    at: false,
  }
}

//
// Running
//

struct RunState {
  env: Rc<Env>,
  args: Vec<Value>,
  pos: usize,
  line_start: bool,
}

impl RunState {
  fn next_arg(&mut self) -> Result<Value> {
    let arg = self.args.get(self.pos).cloned().ok_or_else(|| {
      Error::illegal_argument("not enough arguments for format")
    })?;
    self.pos += 1;
    Ok(arg)
  }

  fn remaining(&self) -> usize {
    self.args.len().saturating_sub(self.pos)
  }

  fn previous_arg(&mut self) -> Result<Value> {
    if self.pos == 0 {
      return Err(Error::illegal_argument(
        "no previous argument for format",
      ));
    }
    Ok(self.args[self.pos - 1].clone())
  }
}

/// Signals whether `~^` asked to leave the enclosing iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
  Done,
  Exit,
}

fn write_text(
  writer: &mut PrettyWriter,
  state: &mut RunState,
  text: &str,
) {
  if text.is_empty() {
    return;
  }
  writer.write(text);
  state.line_start = text.ends_with('\n');
}

fn run(
  directives: &[Directive],
  state: &mut RunState,
  writer: &mut PrettyWriter,
) -> Result<Flow> {
  for directive in directives {
    match run_one(directive, state, writer)? {
      Flow::Done => (),
      Flow::Exit => return Ok(Flow::Exit),
    }
  }
  Ok(Flow::Done)
}

fn int_param(
  directive: &Directive,
  ix: usize,
  state: &mut RunState,
  default: i64,
) -> Result<i64> {
  match directive.params.get(ix) {
    Some(Some(Param::Int(n))) => Ok(*n),
    Some(Some(Param::Char(c))) => Ok(*c as i64),
    Some(Some(Param::FromArgs)) => num::as_i64(&state.next_arg()?),
    Some(Some(Param::Remaining)) => Ok(state.remaining() as i64),
    _ => Ok(default),
  }
}

fn char_param(
  directive: &Directive,
  ix: usize,
  state: &mut RunState,
  default: char,
) -> Result<char> {
  match directive.params.get(ix) {
    Some(Some(Param::Char(c))) => Ok(*c),
    Some(Some(Param::Int(n))) => Ok(
      u32::try_from(*n)
        .ok()
        .and_then(char::from_u32)
        .unwrap_or(default),
    ),
    Some(Some(Param::FromArgs)) => {
      match state.next_arg()? {
        Value::Char(c) => Ok(c),
        _ => Ok(default),
      }
    }
    _ => Ok(default),
  }
}

fn run_one(
  directive: &Directive,
  state: &mut RunState,
  writer: &mut PrettyWriter,
) -> Result<Flow> {
  match &directive.kind {
    Kind::Literal(text) => {
      write_text(writer, state, text);
    }
    Kind::Ascii | Kind::Sexpr => {
      let arg = state.next_arg()?;
      let readable = matches!(directive.kind, Kind::Sexpr);
      let rendered = if matches!(arg, Value::Nil) && directive.colon
      {
        "()".to_string()
      } else if readable {
        printer::pr_str(&state.env, &arg)
      } else {
        printer::print_str(&state.env, &arg)
      };
      let mincol = int_param(directive, 0, state, 0)?.max(0) as usize;
      let padchar = char_param(directive, 1, state, ' ')?;
      let padded =
        pad(rendered, mincol, padchar, directive.at);
      write_text(writer, state, &padded);
    }
    Kind::Decimal => radix_directive(directive, state, writer, 10)?,
    Kind::Binary => radix_directive(directive, state, writer, 2)?,
    Kind::Octal => radix_directive(directive, state, writer, 8)?,
    Kind::Hex => radix_directive(directive, state, writer, 16)?,
    Kind::Radix => {
      if directive.params.is_empty() {
        let n = num::as_i64(&state.next_arg()?)?;
        let rendered = match (directive.at, directive.colon) {
          (true, false) => roman(n, true)?,
          (true, true) => roman(n, false)?,
          (false, true) => english_ordinal(n),
          (false, false) => english_cardinal(n),
        };
        write_text(writer, state, &rendered);
      } else {
        let radix =
          int_param(directive, 0, state, 10)?.clamp(2, 36) as u32;
        // The remaining params shift down one slot against ~D.
        let shifted = Directive {
          kind: Kind::Decimal,
          params: directive.params[1..].to_vec(),
          colon: directive.colon,
          at: directive.at,
        };
        radix_directive(&shifted, state, writer, radix)?;
      }
    }
    Kind::FixedFloat => {
      let arg = num::as_f64(&state.next_arg()?)?;
      let w = int_param(directive, 0, state, 0)?.max(0) as usize;
      let d = match directive.params.get(1) {
        Some(Some(_)) => {
          Some(int_param(directive, 1, state, 6)?.max(0) as usize)
        }
        _ => None,
      };
      let k = int_param(directive, 2, state, 0)?;
      let scaled = arg * 10f64.powi(k as i32);
      let body = match d {
        Some(d) => format!("{:.*}", d, scaled),
        None => printer::format_double(scaled),
      };
      let padchar = char_param(directive, 4, state, ' ')?;
      let signed = if directive.at && scaled >= 0.0 {
        format!("+{}", body)
      } else {
        body
      };
      write_text(writer, state, &pad(signed, w, padchar, false));
    }
    Kind::ExpFloat => {
      let arg = num::as_f64(&state.next_arg()?)?;
      let d = int_param(directive, 1, state, 6)?.max(0) as usize;
      let rendered = exp_notation(arg, d);
      let w = int_param(directive, 0, state, 0)?.max(0) as usize;
      write_text(writer, state, &pad(rendered, w, ' ', false));
    }
    Kind::GeneralFloat => {
      let arg = num::as_f64(&state.next_arg()?)?;
      let magnitude = arg.abs();
      let rendered = if magnitude == 0.0
        || (1e-3..1e7).contains(&magnitude)
      {
        printer::format_double(arg)
      } else {
        exp_notation(arg, 6)
      };
      write_text(writer, state, &rendered);
    }
    Kind::Dollar => {
      let arg = num::as_f64(&state.next_arg()?)?;
      let d = int_param(directive, 0, state, 2)?.max(0) as usize;
      let n = int_param(directive, 1, state, 1)?.max(0) as usize;
      let body = format!("{:.*}", d, arg.abs());
      let (int_part, frac_part) =
        body.split_once('.').unwrap_or((body.as_str(), ""));
      let mut int_digits = int_part.to_string();
      while int_digits.len() < n {
        int_digits.insert(0, '0');
      }
      let sign = if arg < 0.0 {
        "-"
      } else if directive.at {
        "+"
      } else {
        ""
      };
      let rendered = if frac_part.is_empty() {
        format!("{}{}", sign, int_digits)
      } else {
        format!("{}{}.{}", sign, int_digits, frac_part)
      };
      let w = int_param(directive, 2, state, 0)?.max(0) as usize;
      write_text(writer, state, &pad(rendered, w, ' ', false));
    }
    Kind::Character => {
      let arg = state.next_arg()?;
      let Value::Char(c) = arg else {
        return Err(Error::type_error("~C needs a character"));
      };
      let rendered = if directive.colon {
        char_name(c)
      } else if directive.at {
        printer::pr_str_basic(&Value::Char(c))
      } else {
        c.to_string()
      };
      write_text(writer, state, &rendered);
    }
    Kind::Plural => {
      let arg = if directive.colon {
        state.previous_arg()?
      } else {
        state.next_arg()?
      };
      let singular = num::equiv(&arg, &Value::Int(1));
      let rendered = match (directive.at, singular) {
        (false, true) => "",
        (false, false) => "s",
        (true, true) => "y",
        (true, false) => "ies",
      };
      write_text(writer, state, rendered);
    }
    Kind::Newline => {
      let n = int_param(directive, 0, state, 1)?.max(0);
      for _ in 0..n {
        write_text(writer, state, "\n");
      }
    }
    Kind::FreshLine => {
      if !state.line_start {
        write_text(writer, state, "\n");
      }
    }
    Kind::Page => write_text(writer, state, "\u{0C}"),
    Kind::Tilde => {
      let n = int_param(directive, 0, state, 1)?.max(0);
      let text: String =
        std::iter::repeat('~').take(n as usize).collect();
      write_text(writer, state, &text);
    }
    Kind::Goto => {
      let n = int_param(directive, 0, state, 1)?.max(0) as usize;
      if directive.at {
        let target = int_param(directive, 0, state, 0)?.max(0);
        state.pos = (target as usize).min(state.args.len());
      } else if directive.colon {
        state.pos = state.pos.saturating_sub(n);
      } else {
        state.pos = (state.pos + n).min(state.args.len());
      }
    }
    Kind::Indirection => {
      let control = state.next_arg()?;
      let Value::Str(control) = control else {
        return Err(Error::type_error(
          "~? needs a format string argument",
        ));
      };
      let inner = compile(&control)?;
      if directive.at {
        // Consume directly from the remaining arguments.
        let flow = run(&inner, state, writer)?;
        if flow == Flow::Exit {
          return Ok(Flow::Exit);
        }
      } else {
        let sub_args = seq::to_vec(&state.next_arg()?)?;
        let mut sub_state = RunState {
          env: state.env.clone(),
          args: sub_args,
          pos: 0,
          line_start: state.line_start,
        };
        run(&inner, &mut sub_state, writer)?;
        state.line_start = sub_state.line_start;
      }
    }
    Kind::EarlyExit => {
      let exit = match directive.params.len() {
        0 => state.remaining() == 0,
        1 => int_param(directive, 0, state, 0)? == 0,
        2 => {
          int_param(directive, 0, state, 0)?
            == int_param(directive, 1, state, 0)?
        }
        _ => {
          let a = int_param(directive, 0, state, 0)?;
          let b = int_param(directive, 1, state, 0)?;
          let c = int_param(directive, 2, state, 0)?;
          a <= b && b <= c
        }
      };
      if exit {
        return Ok(Flow::Exit);
      }
    }
    Kind::ConditionalNewline => {
      let kind = match (directive.colon, directive.at) {
        (false, false) => NewlineKind::Linear,
        (true, false) => NewlineKind::Fill,
        (false, true) => NewlineKind::Miser,
        (true, true) => NewlineKind::Mandatory,
      };
      writer.newline(kind);
      state.line_start = false;
    }
    Kind::Indent => {
      let n = int_param(directive, 0, state, 0)? as isize;
      let relative = if directive.at {
        IndentRelativeTo::Current
      } else {
        IndentRelativeTo::Block
      };
      writer.indent(relative, n);
    }
    Kind::Iteration { body, force_once } => {
      let max = match directive.params.first() {
        Some(Some(_)) => {
          Some(int_param(directive, 0, state, 0)?.max(0))
        }
        _ => None,
      };
      iteration(
        directive, body, *force_once, max, state, writer,
      )?;
    }
    Kind::Conditional {
      clauses,
      default_last,
    } => {
      let chosen: Option<&Vec<Directive>> = if directive.colon {
        // ~:[false-clause~;true-clause~]
        let arg = state.next_arg()?;
        let ix = usize::from(arg.is_truthy());
        clauses.get(ix)
      } else if directive.at {
        // ~@[...~]: print the single clause when the arg is true,
        // leaving the arg for the clause body.
        let arg =
          state.args.get(state.pos).cloned().unwrap_or(Value::Nil);
        if arg.is_truthy() {
          clauses.first()
        } else {
          state.pos += 1;
          None
        }
      } else {
        let selector = match directive.params.first() {
          Some(Some(_)) => int_param(directive, 0, state, 0)?,
          _ => num::as_i64(&state.next_arg()?)?,
        };
        match usize::try_from(selector)
          .ok()
          .and_then(|ix| clauses.get(ix))
        {
          Some(clause) => Some(clause),
          None if *default_last => clauses.last(),
          None => None,
        }
      };
      if let Some(clause) = chosen {
        let flow = run(clause, state, writer)?;
        if flow == Flow::Exit {
          return Ok(Flow::Exit);
        }
      }
    }
    Kind::CaseConversion { body } => {
      let mut sub_writer = PrettyWriter::new(usize::MAX / 4, 0);
      let flow = run(body, state, &mut sub_writer)?;
      let text = sub_writer.finish();
      let converted = match (directive.colon, directive.at) {
        (true, true) => text.to_uppercase(),
        (true, false) => capitalize_words(&text),
        (false, true) => capitalize_first(&text),
        (false, false) => text.to_lowercase(),
      };
      write_text(writer, state, &converted);
      if flow == Flow::Exit {
        return Ok(Flow::Exit);
      }
    }
    Kind::Justify { segments } => {
      let mincol = int_param(directive, 0, state, 0)?.max(0) as usize;
      let padchar = char_param(directive, 3, state, ' ')?;
      let mut rendered: Vec<String> = Vec::new();
      for segment in segments {
        let mut sub_writer = PrettyWriter::new(usize::MAX / 4, 0);
        run(segment, state, &mut sub_writer)?;
        rendered.push(sub_writer.finish());
      }
      let joined = justify(rendered, mincol, padchar);
      write_text(writer, state, &joined);
    }
    Kind::LogicalBlock {
      prefix,
      suffix,
      body,
    } => {
      let block_args = if directive.at {
        let remaining = state.args[state.pos..].to_vec();
        state.pos = state.args.len();
        remaining
      } else {
        seq::to_vec(&state.next_arg()?)?
      };
      writer.start_block(prefix, suffix, None);
      let mut sub_state = RunState {
        env: state.env.clone(),
        args: block_args,
        pos: 0,
        line_start: false,
      };
      run(body, &mut sub_state, writer)?;
      writer.end_block();
      state.line_start = false;
    }
  }
  Ok(Flow::Done)
}

fn iteration(
  directive: &Directive,
  body: &[Directive],
  force_once: bool,
  max: Option<i64>,
  state: &mut RunState,
  writer: &mut PrettyWriter,
) -> Result<()> {
  let sublists = directive.colon;
  let use_remaining = directive.at;

  // Gather the iteration source.
  let source: Vec<Value> = if use_remaining {
    let items = state.args[state.pos..].to_vec();
    state.pos = state.args.len();
    items
  } else {
    seq::to_vec(&state.next_arg()?)?
  };

  if sublists {
    let mut count = 0;
    for sublist in source {
      if let Some(max) = max {
        if count >= max {
          break;
        }
      }
      count += 1;
      let mut sub_state = RunState {
        env: state.env.clone(),
        args: seq::to_vec(&sublist)?,
        pos: 0,
        line_start: state.line_start,
      };
      let flow = run(body, &mut sub_state, writer)?;
      state.line_start = sub_state.line_start;
      if flow == Flow::Exit {
        break;
      }
    }
    return Ok(());
  }

  let mut sub_state = RunState {
    env: state.env.clone(),
    args: source,
    pos: 0,
    line_start: state.line_start,
  };
  let mut passes = 0;
  loop {
    if let Some(max) = max {
      if passes >= max {
        break;
      }
    }
    if sub_state.remaining() == 0 && !(force_once && passes == 0) {
      break;
    }
    passes += 1;
    let flow = run(body, &mut sub_state, writer)?;
    if flow == Flow::Exit {
      break;
    }
  }
  state.line_start = sub_state.line_start;
  Ok(())
}

//
// Rendering helpers
//

fn radix_directive(
  directive: &Directive,
  state: &mut RunState,
  writer: &mut PrettyWriter,
  radix: u32,
) -> Result<()> {
  let arg = state.next_arg()?;
  let big = match &arg {
    Value::Int(i) => BigInt::from(*i),
    Value::BigInt(b) => b.as_ref().clone(),
    other => {
      // Non-integers fall back to ~A display.
      let rendered = printer::print_str(&state.env, other);
      write_text(writer, state, &rendered);
      return Ok(());
    }
  };
  let negative = big.is_negative();
  let digits = big.abs().to_str_radix(radix);
  let grouped = if directive.colon {
    let comma = char_param(directive, 2, state, ',')?;
    let interval =
      int_param(directive, 3, state, 3)?.max(1) as usize;
    group_digits(&digits, comma, interval)
  } else {
    digits
  };
  let body = if negative {
    format!("-{}", grouped)
  } else if directive.at {
    format!("+{}", grouped)
  } else {
    grouped
  };
  let mincol = int_param(directive, 0, state, 0)?.max(0) as usize;
  let padchar = char_param(directive, 1, state, ' ')?;
  write_text(writer, state, &pad(body, mincol, padchar, false));
  Ok(())
}

fn group_digits(digits: &str, comma: char, interval: usize) -> String {
  let chars: Vec<char> = digits.chars().collect();
  let mut out = String::new();
  for (ix, c) in chars.iter().enumerate() {
    if ix > 0 && (chars.len() - ix) % interval == 0 {
      out.push(comma);
    }
    out.push(*c);
  }
  out
}

/// Left- or right-pads to `mincol`.
fn pad(
  text: String,
  mincol: usize,
  padchar: char,
  pad_right: bool,
) -> String {
  let len = text.chars().count();
  if len >= mincol {
    return text;
  }
  let padding: String =
    std::iter::repeat(padchar).take(mincol - len).collect();
  if pad_right {
    // ~@A pads on the left (right-justifies); plain pads on the right.
    format!("{}{}", padding, text)
  } else {
    format!("{}{}", text, padding)
  }
}

fn exp_notation(x: f64, digits: usize) -> String {
  if !x.is_finite() {
    return printer::format_double(x);
  }
  if x == 0.0 {
    return format!("{:.*}E+0", digits, 0.0);
  }
  let negative = x < 0.0;
  let mut mantissa = x.abs();
  let mut exponent = 0_i32;
  while mantissa >= 10.0 {
    mantissa /= 10.0;
    exponent += 1;
  }
  while mantissa < 1.0 {
    mantissa *= 10.0;
    exponent -= 1;
  }
  let sign = if negative { "-" } else { "" };
  let exp_sign = if exponent < 0 { "-" } else { "+" };
  format!(
    "{}{:.*}E{}{}",
    sign,
    digits,
    mantissa,
    exp_sign,
    exponent.abs()
  )
}

fn capitalize_words(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  let mut at_word_start = true;
  for c in text.chars() {
    if c.is_alphanumeric() {
      if at_word_start {
        out.extend(c.to_uppercase());
      } else {
        out.extend(c.to_lowercase());
      }
      at_word_start = false;
    } else {
      out.push(c);
      at_word_start = true;
    }
  }
  out
}

fn capitalize_first(text: &str) -> String {
  let mut chars = text.chars();
  match chars.next() {
    Some(first) => {
      let mut out: String = first.to_uppercase().collect();
      out.extend(chars.flat_map(|c| c.to_lowercase()));
      out
    }
    None => String::new(),
  }
}

fn justify(
  segments: Vec<String>,
  mincol: usize,
  padchar: char,
) -> String {
  let content: usize =
    segments.iter().map(|s| s.chars().count()).sum();
  if segments.len() <= 1 {
    let text = segments.into_iter().next().unwrap_or_default();
    return pad(text, mincol, padchar, true);
  }
  let gaps = segments.len() - 1;
  let needed = mincol.saturating_sub(content);
  let per_gap = needed / gaps;
  let mut extra = needed % gaps;
  let mut out = String::new();
  for (ix, segment) in segments.iter().enumerate() {
    if ix > 0 {
      let mut width = per_gap;
      if extra > 0 {
        width += 1;
        extra -= 1;
      }
      for _ in 0..width {
        out.push(padchar);
      }
    }
    out.push_str(segment);
  }
  out
}

fn char_name(c: char) -> String {
  match c {
    '\n' => "Newline".to_string(),
    ' ' => "Space".to_string(),
    '\t' => "Tab".to_string(),
    '\r' => "Return".to_string(),
    '\u{08}' => "Backspace".to_string(),
    '\u{0C}' => "Page".to_string(),
    c => c.to_string(),
  }
}

//
// English and Roman numerals for ~R
//

const ONES: [&str; 20] = [
  "zero",
  "one",
  "two",
  "three",
  "four",
  "five",
  "six",
  "seven",
  "eight",
  "nine",
  "ten",
  "eleven",
  "twelve",
  "thirteen",
  "fourteen",
  "fifteen",
  "sixteen",
  "seventeen",
  "eighteen",
  "nineteen",
];

const TENS: [&str; 10] = [
  "", "", "twenty", "thirty", "forty", "fifty", "sixty",
  "seventy", "eighty", "ninety",
];

const SCALES: [(i64, &str); 6] = [
  (1_000_000_000_000_000_000, "quintillion"),
  (1_000_000_000_000_000, "quadrillion"),
  (1_000_000_000_000, "trillion"),
  (1_000_000_000, "billion"),
  (1_000_000, "million"),
  (1_000, "thousand"),
];

fn english_cardinal(n: i64) -> String {
  if n < 0 {
    return format!("negative {}", english_cardinal(-n));
  }
  if n < 20 {
    return ONES[n as usize].to_string();
  }
  if n < 100 {
    let tens = TENS[(n / 10) as usize];
    return if n % 10 == 0 {
      tens.to_string()
    } else {
      format!("{}-{}", tens, ONES[(n % 10) as usize])
    };
  }
  if n < 1_000 {
    let hundreds = format!("{} hundred", ONES[(n / 100) as usize]);
    return if n % 100 == 0 {
      hundreds
    } else {
      format!("{} {}", hundreds, english_cardinal(n % 100))
    };
  }
  for (scale, scale_name) in SCALES {
    if n >= scale {
      let leading = english_cardinal(n / scale);
      let rest = n % scale;
      return if rest == 0 {
        format!("{} {}", leading, scale_name)
      } else {
        format!(
          "{} {} {}",
          leading,
          scale_name,
          english_cardinal(rest)
        )
      };
    }
  }
  unreachable!("scale table covers every magnitude");
}

fn english_ordinal(n: i64) -> String {
  if n < 0 {
    return format!("negative {}", english_ordinal(-n));
  }
  const IRREGULAR: [(i64, &str); 10] = [
    (0, "zeroth"),
    (1, "first"),
    (2, "second"),
    (3, "third"),
    (5, "fifth"),
    (8, "eighth"),
    (9, "ninth"),
    (12, "twelfth"),
    (20, "twentieth"),
    (1000, "thousandth"),
  ];
  for (value, word) in IRREGULAR {
    if n == value {
      return word.to_string();
    }
  }
  if n < 20 {
    return format!("{}th", english_cardinal(n));
  }
  if n < 100 && n % 10 == 0 {
    let cardinal = english_cardinal(n);
    return format!("{}ieth", &cardinal[..cardinal.len() - 1]);
  }
  if n < 100 {
    return format!(
      "{}-{}",
      TENS[(n / 10) as usize],
      english_ordinal(n % 10)
    );
  }
  let remainder = if n < 1000 { n % 100 } else { n % 1000 };
  if remainder == 0 {
    return format!("{}th", english_cardinal(n));
  }
  let leading = n - remainder;
  format!(
    "{} {}",
    english_cardinal(leading),
    english_ordinal(remainder)
  )
}

fn roman(n: i64, subtractive: bool) -> Result<String> {
  if !(1..4000).contains(&n) {
    return Err(Error::illegal_argument(
      "roman numerals cover 1 to 3999",
    ));
  }
  let table: &[(i64, &str)] = if subtractive {
    &[
      (1000, "M"),
      (900, "CM"),
      (500, "D"),
      (400, "CD"),
      (100, "C"),
      (90, "XC"),
      (50, "L"),
      (40, "XL"),
      (10, "X"),
      (9, "IX"),
      (5, "V"),
      (4, "IV"),
      (1, "I"),
    ]
  } else {
    &[
      (1000, "M"),
      (500, "D"),
      (100, "C"),
      (50, "L"),
      (10, "X"),
      (5, "V"),
      (1, "I"),
    ]
  };
  let mut n = n;
  let mut out = String::new();
  for (value, numeral) in table {
    while n >= *value {
      out.push_str(numeral);
      n -= value;
    }
  }
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::env::Env;

  fn fmt(control: &str, args: Vec<Value>) -> String {
    let env = Env::bootstrap();
    format(&env, control, args).unwrap()
  }

  #[test]
  fn plain_text_and_tilde() {
    assert_eq!(fmt("a~~b", vec![]), "a~b");
  }

  #[test]
  fn decimal_with_commas() {
    assert_eq!(
      fmt("~:D", vec![Value::Int(1234567)]),
      "1,234,567"
    );
  }

  #[test]
  fn radix_sixteen() {
    assert_eq!(fmt("~16R", vec![Value::Int(255)]), "ff");
  }

  #[test]
  fn cardinal_and_roman() {
    assert_eq!(fmt("~R", vec![Value::Int(21)]), "twenty-one");
    assert_eq!(fmt("~@R", vec![Value::Int(1944)]), "MCMXLIV");
    assert_eq!(fmt("~:R", vec![Value::Int(3)]), "third");
  }

  #[test]
  fn iteration_and_early_exit() {
    let items = Value::vector(vec![
      Value::Int(1),
      Value::Int(2),
      Value::Int(3),
    ]);
    assert_eq!(fmt("~{~a~^, ~}", vec![items]), "1, 2, 3");
  }

  #[test]
  fn conditional_selects_by_index() {
    assert_eq!(
      fmt("~[zero~;one~;many~]", vec![Value::Int(1)]),
      "one"
    );
    assert_eq!(
      fmt("~[zero~;one~:;many~]", vec![Value::Int(9)]),
      "many"
    );
  }

  #[test]
  fn plural_and_fresh_line() {
    assert_eq!(
      fmt("~D item~:P", vec![Value::Int(2)]),
      "2 items"
    );
    assert_eq!(fmt("a~&b", vec![]), "a\nb");
  }

  #[test]
  fn case_conversion() {
    assert_eq!(
      fmt("~:(~a~)", vec![Value::string("hello world")]),
      "Hello World"
    );
  }
}
