// eval/host.rs
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

//! The stylized host-interop surface: `(new Classname ...)` construction
//! and `(. target method ...)` dispatch by method name over the core
//! value kinds.  This covers exactly what the embedded libraries reach
//! for: strings, string builders, exceptions, and the named accessors of
//! keywords and symbols.

use std::cell::RefCell;
use std::rc::Rc;

use crate::{
  env::Env,
  error::{Error, ErrorKind, Result},
  value::{num, Value},
};

pub fn construct(class: &str, args: Vec<Value>) -> Result<Value> {
  match class {
    "StringBuilder" => {
      let initial = match args.first() {
        Some(Value::Str(s)) => s.to_string(),
        Some(other) => crate::printer::print_str_basic(other),
        None => String::new(),
      };
      Ok(Value::StringBuilder(Rc::new(RefCell::new(initial))))
    }
    "String" => match args.first() {
      Some(Value::Str(s)) => Ok(Value::Str(s.clone())),
      Some(other) => {
        Ok(Value::string(crate::printer::print_str_basic(other)))
      }
      None => Ok(Value::string("")),
    },
    "Exception"
    | "RuntimeException"
    | "Error"
    | "Throwable"
    | "IllegalArgumentException"
    | "UnsupportedOperationException"
    | "IllegalStateException"
    | "ArithmeticException"
    | "AssertionError" => {
      let message = match args.first() {
        Some(Value::Str(s)) => s.to_string(),
        Some(other) => crate::printer::print_str_basic(other),
        None => String::new(),
      };
      let kind = match class {
        "IllegalArgumentException" => ErrorKind::IllegalArgument,
        "UnsupportedOperationException" => {
          ErrorKind::UnsupportedOperation
        }
        "IllegalStateException" => ErrorKind::Lookup,
        "ArithmeticException" => ErrorKind::Arithmetic,
        "AssertionError" => ErrorKind::Assertion,
        _ => ErrorKind::User,
      };
      Ok(Value::Exception(Rc::new(Error::new(kind, message))))
    }
    other => Err(Error::unsupported(format!(
      "cannot construct {}",
      other
    ))),
  }
}

pub fn invoke_method(
  env: &Rc<Env>,
  target: &Value,
  method: &str,
  args: Vec<Value>,
) -> Result<Value> {
  match target {
    Value::Str(s) => string_method(s, method, &args),
    Value::StringBuilder(buffer) => {
      builder_method(target, buffer, method, &args)
    }
    Value::Exception(e) => exception_method(e, method),
    Value::Keyword(k) => {
      named_method(k.namespace.as_deref(), &k.name, method)
    }
    Value::Symbol(s) => {
      named_method(s.namespace.as_deref(), &s.name, method)
    }
    Value::Char(c) => char_method(*c, method, &args),
    _ if num::is_number(target) => {
      number_method(target, method)
    }
    Value::Var(var) => match method {
      "setMacro" => {
        var.set_macro(true);
        Ok(Value::Nil)
      }
      _ => no_such_method(target, method),
    },
    // A reified instance answers its methods out of its map.
    Value::Map(map) => {
      match map.get(&Value::kw(method)) {
        Some(f) => {
          let mut call_args = vec![target.clone()];
          call_args.extend(args);
          crate::eval::apply(env, &f.clone(), call_args)
        }
        None => match method {
          "toString" => {
            Ok(Value::string(crate::printer::print_str_basic(target)))
          }
          _ => no_such_method(target, method),
        },
      }
    }
    _ => match method {
      "toString" => {
        Ok(Value::string(crate::printer::print_str_basic(target)))
      }
      "equals" => Ok(Value::Boolean(
        args.first().map(|a| a == target).unwrap_or(false),
      )),
      "hashCode" => Ok(Value::Int(target.hash_value() as i64)),
      _ => no_such_method(target, method),
    },
  }
}

fn no_such_method(target: &Value, method: &str) -> Result<Value> {
  Err(Error::unsupported(format!(
    "no method {} on {}",
    method,
    target.type_name()
  )))
}

fn arg_str<'a>(args: &'a [Value], ix: usize) -> Result<&'a str> {
  match args.get(ix) {
    Some(Value::Str(s)) => Ok(s.as_ref()),
    _ => Err(Error::illegal_argument("expected a string argument")),
  }
}

fn arg_int(args: &[Value], ix: usize) -> Result<i64> {
  args
    .get(ix)
    .ok_or_else(|| Error::illegal_argument("missing argument"))
    .and_then(num::as_i64)
}

fn string_method(
  s: &Rc<str>,
  method: &str,
  args: &[Value],
) -> Result<Value> {
  let chars: Vec<char> = s.chars().collect();
  match method {
    "length" => Ok(Value::Int(chars.len() as i64)),
    "isEmpty" => Ok(Value::Boolean(s.is_empty())),
    "charAt" => {
      let ix = arg_int(args, 0)?;
      usize::try_from(ix)
        .ok()
        .and_then(|ix| chars.get(ix).copied())
        .map(Value::Char)
        .ok_or_else(|| {
          Error::lookup(format!("string index out of range: {}", ix))
        })
    }
    "indexOf" => {
      let found = match args.first() {
        Some(Value::Str(needle)) => {
          char_index_of(&chars, needle, 0)
        }
        Some(Value::Char(c)) => {
          chars.iter().position(|x| x == c).map(|i| i as i64)
        }
        Some(other) if num::is_number(other) => {
          let code = num::as_i64(other)?;
          char::from_u32(code as u32)
            .and_then(|c| chars.iter().position(|x| *x == c))
            .map(|i| i as i64)
        }
        _ => None,
      };
      Ok(Value::Int(found.unwrap_or(-1)))
    }
    "lastIndexOf" => {
      let found = match args.first() {
        Some(Value::Str(needle)) => {
          char_last_index_of(&chars, needle)
        }
        Some(Value::Char(c)) => chars
          .iter()
          .rposition(|x| x == c)
          .map(|i| i as i64),
        _ => None,
      };
      Ok(Value::Int(found.unwrap_or(-1)))
    }
    "substring" => {
      let from = usize::try_from(arg_int(args, 0)?).map_err(|_| {
        Error::lookup("negative substring index")
      })?;
      let to = match args.get(1) {
        Some(v) => usize::try_from(num::as_i64(v)?)
          .map_err(|_| Error::lookup("negative substring index"))?,
        None => chars.len(),
      };
      if from > to || to > chars.len() {
        return Err(Error::lookup(format!(
          "substring range {}..{} out of bounds",
          from, to
        )));
      }
      Ok(Value::string(
        chars[from..to].iter().collect::<String>(),
      ))
    }
    "toUpperCase" => Ok(Value::string(s.to_uppercase())),
    "toLowerCase" => Ok(Value::string(s.to_lowercase())),
    "startsWith" => {
      Ok(Value::Boolean(s.starts_with(arg_str(args, 0)?)))
    }
    "endsWith" => Ok(Value::Boolean(s.ends_with(arg_str(args, 0)?))),
    "contains" => Ok(Value::Boolean(s.contains(arg_str(args, 0)?))),
    "trim" => Ok(Value::string(s.trim())),
    "replace" => {
      let from = match args.first() {
        Some(Value::Char(c)) => c.to_string(),
        Some(Value::Str(x)) => x.to_string(),
        _ => {
          return Err(Error::illegal_argument(
            "replace expects char or string arguments",
          ));
        }
      };
      let to = match args.get(1) {
        Some(Value::Char(c)) => c.to_string(),
        Some(Value::Str(x)) => x.to_string(),
        _ => {
          return Err(Error::illegal_argument(
            "replace expects char or string arguments",
          ));
        }
      };
      Ok(Value::string(s.replace(&from, &to)))
    }
    "split" => {
      let pattern = arg_str(args, 0)?;
      let re = regex::Regex::new(pattern).map_err(|e| {
        Error::illegal_argument(format!("invalid regex: {}", e))
      })?;
      let parts: Vec<Value> = re
        .split(s)
        .map(|p| Value::string(p.to_string()))
        .collect();
      Ok(Value::vector(parts))
    }
    "compareTo" => {
      let other = arg_str(args, 0)?;
      Ok(Value::Int(match s.as_ref().cmp(other) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
      }))
    }
    "equals" => Ok(Value::Boolean(
      args
        .first()
        .map(|a| matches!(a, Value::Str(o) if o == s))
        .unwrap_or(false),
    )),
    "concat" => {
      let mut out = s.to_string();
      out.push_str(arg_str(args, 0)?);
      Ok(Value::string(out))
    }
    "toString" => Ok(Value::Str(s.clone())),
    "hashCode" => {
      Ok(Value::Int(crate::value::hash::hash_string(s) as i64))
    }
    _ => no_such_method(&Value::Str(s.clone()), method),
  }
}

fn char_index_of(
  haystack: &[char],
  needle: &str,
  from: usize,
) -> Option<i64> {
  let needle: Vec<char> = needle.chars().collect();
  if needle.is_empty() {
    return Some(from as i64);
  }
  haystack
    .windows(needle.len())
    .skip(from)
    .position(|w| w == needle.as_slice())
    .map(|i| (i + from) as i64)
}

fn char_last_index_of(haystack: &[char], needle: &str) -> Option<i64> {
  let needle: Vec<char> = needle.chars().collect();
  if needle.is_empty() {
    return Some(haystack.len() as i64);
  }
  if needle.len() > haystack.len() {
    return None;
  }
  (0..=haystack.len() - needle.len())
    .rev()
    .find(|&i| haystack[i..i + needle.len()] == needle[..])
    .map(|i| i as i64)
}

fn builder_method(
  target: &Value,
  buffer: &Rc<RefCell<String>>,
  method: &str,
  args: &[Value],
) -> Result<Value> {
  match method {
    "append" => {
      let text = match args.first() {
        Some(Value::Str(s)) => s.to_string(),
        Some(Value::Char(c)) => c.to_string(),
        Some(other) => crate::printer::print_str_basic(other),
        None => String::new(),
      };
      buffer.borrow_mut().push_str(&text);
      Ok(target.clone())
    }
    "toString" => Ok(Value::string(buffer.borrow().clone())),
    "length" => {
      Ok(Value::Int(buffer.borrow().chars().count() as i64))
    }
    "charAt" => {
      let ix = arg_int(args, 0)?;
      usize::try_from(ix)
        .ok()
        .and_then(|ix| buffer.borrow().chars().nth(ix))
        .map(Value::Char)
        .ok_or_else(|| {
          Error::lookup(format!("builder index out of range: {}", ix))
        })
    }
    "deleteCharAt" => {
      let ix = usize::try_from(arg_int(args, 0)?).map_err(|_| {
        Error::lookup("negative builder index")
      })?;
      let mut b = buffer.borrow_mut();
      let chars: Vec<char> = b.chars().collect();
      if ix >= chars.len() {
        return Err(Error::lookup(format!(
          "builder index out of range: {}",
          ix
        )));
      }
      *b = chars
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != ix)
        .map(|(_, c)| c)
        .collect();
      drop(b);
      Ok(target.clone())
    }
    "setLength" => {
      let len = usize::try_from(arg_int(args, 0)?).map_err(|_| {
        Error::lookup("negative builder length")
      })?;
      let mut b = buffer.borrow_mut();
      let truncated: String = b.chars().take(len).collect();
      *b = truncated;
      drop(b);
      Ok(target.clone())
    }
    "reverse" => {
      let mut b = buffer.borrow_mut();
      *b = b.chars().rev().collect();
      drop(b);
      Ok(target.clone())
    }
    _ => no_such_method(target, method),
  }
}

fn exception_method(
  e: &Rc<crate::error::Error>,
  method: &str,
) -> Result<Value> {
  match method {
    "getMessage" => {
      if e.message.is_empty() {
        Ok(Value::Nil)
      } else {
        Ok(Value::string(e.message.clone()))
      }
    }
    "getCause" => Ok(match &e.cause {
      Some(cause) => Value::Exception(cause.clone()),
      None => Value::Nil,
    }),
    "toString" => {
      Ok(Value::string(format!("{}: {}", e.class(), e.message)))
    }
    _ => no_such_method(&Value::Exception(e.clone()), method),
  }
}

fn named_method(
  namespace: Option<&str>,
  name: &str,
  method: &str,
) -> Result<Value> {
  match method {
    "getName" | "name" => Ok(Value::string(name)),
    "getNamespace" | "namespace" => Ok(match namespace {
      Some(ns) => Value::string(ns),
      None => Value::Nil,
    }),
    _ => Err(Error::unsupported(format!(
      "no method {} on named values",
      method
    ))),
  }
}

fn char_method(c: char, method: &str, args: &[Value]) -> Result<Value> {
  match method {
    "charValue" => Ok(Value::Char(c)),
    "toString" => Ok(Value::string(c.to_string())),
    "equals" => Ok(Value::Boolean(
      matches!(args.first(), Some(Value::Char(o)) if *o == c),
    )),
    _ => no_such_method(&Value::Char(c), method),
  }
}

fn number_method(target: &Value, method: &str) -> Result<Value> {
  match method {
    "intValue" | "longValue" => {
      Ok(Value::Int(num::as_f64(target)? as i64))
    }
    "doubleValue" | "floatValue" => {
      Ok(Value::Float(num::as_f64(target)?))
    }
    "toString" => {
      Ok(Value::string(crate::printer::print_str_basic(target)))
    }
    _ => no_such_method(target, method),
  }
}
