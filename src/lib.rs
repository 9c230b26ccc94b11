// lib.rs
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

#![deny(
  future_incompatible,
  nonstandard_style,
  rust_2021_compatibility
)]

pub mod analyzer;
pub mod core;
pub mod env;
pub mod error;
pub mod eval;
pub mod expand;
pub mod pprint;
pub mod printer;
pub mod reader;
pub mod value;

use std::rc::Rc;

use crate::{env::Env, error::Error, value::Value};

/// Reads and evaluates every top-level form of `input` in order, returning
/// the value of the last one.  This is the whole front end in one call: the
/// host's load-file, load-string, and REPL line handling all bottom out
/// here.
pub fn load_string(env: &Rc<Env>, input: &str) -> Result<Value, Error> {
  let forms = reader::read_source(env, input)?;
  let mut result = Value::Nil;
  for form in &forms {
    let expanded = expand::macroexpand_all(env, form)?;
    let ast = analyzer::analyze(env, &expanded)?;
    result = eval::eval(env, &ast)?;
  }
  Ok(result)
}
