// core/arith.rs
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

//! Arithmetic and comparison builtins over the numeric tower.

use std::cmp::Ordering;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::{
  env::{Env, Namespace},
  error::{Error, Result},
  value::{
    compare_values,
    num::{self, BigDec, Overflow},
    Value,
  },
};

use super::{at_least, between, def_builtin, exact};

pub fn install(core: &Namespace) {
  def_builtin(core, "+", add);
  def_builtin(core, "-", sub);
  def_builtin(core, "*", mul);
  def_builtin(core, "/", div);
  def_builtin(core, "+'", add_promoting);
  def_builtin(core, "-'", sub_promoting);
  def_builtin(core, "*'", mul_promoting);
  def_builtin(core, "inc", inc);
  def_builtin(core, "dec", dec);
  def_builtin(core, "inc'", inc_promoting);
  def_builtin(core, "dec'", dec_promoting);
  def_builtin(core, "quot", quot);
  def_builtin(core, "rem", rem);
  def_builtin(core, "mod", modulo);
  def_builtin(core, "abs", abs);
  def_builtin(core, "min", min);
  def_builtin(core, "max", max);
  def_builtin(core, "=", eq);
  def_builtin(core, "not=", not_eq);
  def_builtin(core, "==", num_eq);
  def_builtin(core, "<", lt);
  def_builtin(core, "<=", le);
  def_builtin(core, ">", gt);
  def_builtin(core, ">=", ge);
  def_builtin(core, "compare", compare);
  def_builtin(core, "zero?", zero_p);
  def_builtin(core, "pos?", pos_p);
  def_builtin(core, "neg?", neg_p);
  def_builtin(core, "even?", even_p);
  def_builtin(core, "odd?", odd_p);
  def_builtin(core, "number?", number_p);
  def_builtin(core, "integer?", integer_p);
  def_builtin(core, "int?", int_p);
  def_builtin(core, "pos-int?", pos_int_p);
  def_builtin(core, "neg-int?", neg_int_p);
  def_builtin(core, "nat-int?", nat_int_p);
  def_builtin(core, "float?", float_p);
  def_builtin(core, "double?", float_p);
  def_builtin(core, "ratio?", ratio_p);
  def_builtin(core, "rational?", rational_p);
  def_builtin(core, "decimal?", decimal_p);
  def_builtin(core, "nan?", nan_p);
  def_builtin(core, "infinite?", infinite_p);
  def_builtin(core, "numerator", numerator);
  def_builtin(core, "denominator", denominator);
  def_builtin(core, "bigint", bigint);
  def_builtin(core, "bigdec", bigdec);
  def_builtin(core, "double", double);
  def_builtin(core, "float", double);
  def_builtin(core, "long", long);
  def_builtin(core, "int", int_cast);
  def_builtin(core, "short", long);
  def_builtin(core, "byte", long);
  def_builtin(core, "num", identity_num);
  def_builtin(core, "char", char_cast);
  def_builtin(core, "hash", hash);
  def_builtin(core, "hash-ordered-coll", hash_ordered_coll);
  def_builtin(core, "hash-unordered-coll", hash_unordered_coll);
  def_builtin(core, "mix-collection-hash", mix_collection_hash);
  def_builtin(core, "identical?", identical_p);
}

fn fold(
  args: Vec<Value>,
  identity: Value,
  ov: Overflow,
  op: fn(&Value, &Value, Overflow) -> Result<Value>,
) -> Result<Value> {
  let mut iter = args.into_iter();
  let mut acc = match iter.next() {
    Some(first) => first,
    None => return Ok(identity),
  };
  // A unary call still checks that its argument is numeric.
  num::num_of(&acc)?;
  for next in iter {
    acc = op(&acc, &next, ov)?;
  }
  Ok(acc)
}

fn add(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  fold(args, Value::Int(0), Overflow::Error, num::add)
}

fn add_promoting(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  fold(args, Value::Int(0), Overflow::Promote, num::add)
}

fn mul(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  fold(args, Value::Int(1), Overflow::Error, num::mul)
}

fn mul_promoting(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  fold(args, Value::Int(1), Overflow::Promote, num::mul)
}

fn sub_with(ov: Overflow, args: Vec<Value>) -> Result<Value> {
  at_least("-", &args, 1)?;
  if args.len() == 1 {
    return num::neg(&args[0], ov);
  }
  let mut iter = args.into_iter();
  let mut acc = iter.next().unwrap();
  for next in iter {
    acc = num::sub(&acc, &next, ov)?;
  }
  Ok(acc)
}

fn sub(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  sub_with(Overflow::Error, args)
}

fn sub_promoting(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  sub_with(Overflow::Promote, args)
}

fn div(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("/", &args, 1)?;
  if args.len() == 1 {
    return num::div(&Value::Int(1), &args[0]);
  }
  let mut iter = args.into_iter();
  let mut acc = iter.next().unwrap();
  for next in iter {
    acc = num::div(&acc, &next)?;
  }
  Ok(acc)
}

fn inc(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("inc", &args, 1)?;
  num::inc(&args[0], Overflow::Error)
}

fn dec(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("dec", &args, 1)?;
  num::dec(&args[0], Overflow::Error)
}

fn inc_promoting(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("inc'", &args, 1)?;
  num::inc(&args[0], Overflow::Promote)
}

fn dec_promoting(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("dec'", &args, 1)?;
  num::dec(&args[0], Overflow::Promote)
}

fn quot(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("quot", &args, 2)?;
  num::quot(&args[0], &args[1])
}

fn rem(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("rem", &args, 2)?;
  num::rem(&args[0], &args[1])
}

fn modulo(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("mod", &args, 2)?;
  num::modulo(&args[0], &args[1])
}

fn abs(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("abs", &args, 1)?;
  if num::is_neg(&args[0])? {
    num::neg(&args[0], Overflow::Promote)
  } else {
    Ok(args[0].clone())
  }
}

fn extreme(
  name: &str,
  args: Vec<Value>,
  keep: Ordering,
) -> Result<Value> {
  at_least(name, &args, 1)?;
  let mut iter = args.into_iter();
  let mut acc = iter.next().unwrap();
  for next in iter {
    if num::compare(&next, &acc)? == keep {
      acc = next;
    }
  }
  Ok(acc)
}

fn min(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  extreme("min", args, Ordering::Less)
}

fn max(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  extreme("max", args, Ordering::Greater)
}

fn eq(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("=", &args, 1)?;
  Ok(Value::Boolean(args.windows(2).all(|w| w[0] == w[1])))
}

fn not_eq(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("not=", &args, 1)?;
  Ok(Value::Boolean(!args.windows(2).all(|w| w[0] == w[1])))
}

/// `==`: numeric value equality across categories.
fn num_eq(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  at_least("==", &args, 1)?;
  for w in args.windows(2) {
    if num::compare(&w[0], &w[1])? != Ordering::Equal {
      return Ok(Value::Boolean(false));
    }
  }
  Ok(Value::Boolean(true))
}

fn ordered(
  name: &str,
  args: Vec<Value>,
  accept: fn(Ordering) -> bool,
) -> Result<Value> {
  at_least(name, &args, 1)?;
  for w in args.windows(2) {
    if !accept(num::compare(&w[0], &w[1])?) {
      return Ok(Value::Boolean(false));
    }
  }
  Ok(Value::Boolean(true))
}

fn lt(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  ordered("<", args, |o| o == Ordering::Less)
}

fn le(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  ordered("<=", args, |o| o != Ordering::Greater)
}

fn gt(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  ordered(">", args, |o| o == Ordering::Greater)
}

fn ge(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  ordered(">=", args, |o| o != Ordering::Less)
}

fn compare(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("compare", &args, 2)?;
  Ok(Value::Int(match compare_values(&args[0], &args[1])? {
    Ordering::Less => -1,
    Ordering::Equal => 0,
    Ordering::Greater => 1,
  }))
}

fn zero_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("zero?", &args, 1)?;
  Ok(Value::Boolean(num::is_zero(&args[0])?))
}

fn pos_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("pos?", &args, 1)?;
  Ok(Value::Boolean(num::is_pos(&args[0])?))
}

fn neg_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("neg?", &args, 1)?;
  Ok(Value::Boolean(num::is_neg(&args[0])?))
}

fn even_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("even?", &args, 1)?;
  Ok(Value::Boolean(num::as_i64(&args[0])? % 2 == 0))
}

fn odd_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("odd?", &args, 1)?;
  Ok(Value::Boolean(num::as_i64(&args[0])? % 2 != 0))
}

fn number_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("number?", &args, 1)?;
  Ok(Value::Boolean(num::is_number(&args[0])))
}

fn integer_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("integer?", &args, 1)?;
  Ok(Value::Boolean(matches!(
    args[0],
    Value::Int(_) | Value::BigInt(_)
  )))
}

fn int_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("int?", &args, 1)?;
  Ok(Value::Boolean(matches!(args[0], Value::Int(_))))
}

fn pos_int_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("pos-int?", &args, 1)?;
  Ok(Value::Boolean(matches!(args[0], Value::Int(i) if i > 0)))
}

fn neg_int_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("neg-int?", &args, 1)?;
  Ok(Value::Boolean(matches!(args[0], Value::Int(i) if i < 0)))
}

fn nat_int_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("nat-int?", &args, 1)?;
  Ok(Value::Boolean(matches!(args[0], Value::Int(i) if i >= 0)))
}

fn float_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("float?", &args, 1)?;
  Ok(Value::Boolean(matches!(args[0], Value::Float(_))))
}

fn ratio_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("ratio?", &args, 1)?;
  Ok(Value::Boolean(matches!(args[0], Value::Ratio(_))))
}

fn rational_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("rational?", &args, 1)?;
  Ok(Value::Boolean(matches!(
    args[0],
    Value::Int(_)
      | Value::BigInt(_)
      | Value::Ratio(_)
      | Value::BigDecimal(_)
  )))
}

fn decimal_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("decimal?", &args, 1)?;
  Ok(Value::Boolean(matches!(args[0], Value::BigDecimal(_))))
}

fn nan_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("nan?", &args, 1)?;
  Ok(Value::Boolean(
    matches!(args[0], Value::Float(f) if f.is_nan()),
  ))
}

fn infinite_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("infinite?", &args, 1)?;
  Ok(Value::Boolean(
    matches!(args[0], Value::Float(f) if f.is_infinite()),
  ))
}

fn numerator(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("numerator", &args, 1)?;
  match &args[0] {
    Value::Ratio(r) => Ok(Value::big_int(r.numerator.clone())),
    other => Err(Error::type_error(format!(
      "numerator needs a ratio, got {}",
      other.type_name()
    ))),
  }
}

fn denominator(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("denominator", &args, 1)?;
  match &args[0] {
    Value::Ratio(r) => Ok(Value::big_int(r.denominator.clone())),
    other => Err(Error::type_error(format!(
      "denominator needs a ratio, got {}",
      other.type_name()
    ))),
  }
}

fn bigint(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("bigint", &args, 1)?;
  match &args[0] {
    Value::Int(i) => Ok(Value::big_int(BigInt::from(*i))),
    Value::BigInt(_) => Ok(args[0].clone()),
    Value::Float(f) => Ok(Value::big_int(BigInt::from(*f as i64))),
    Value::Ratio(r) => {
      Ok(Value::big_int(&r.numerator / &r.denominator))
    }
    Value::BigDecimal(d) => {
      let as_f = d.to_f64();
      Ok(Value::big_int(BigInt::from(as_f as i64)))
    }
    Value::Str(s) => BigInt::parse_bytes(s.as_bytes(), 10)
      .map(Value::big_int)
      .ok_or_else(|| {
        Error::illegal_argument(format!("invalid number: {}", s))
      }),
    other => Err(Error::type_error(format!(
      "cannot coerce {} to bigint",
      other.type_name()
    ))),
  }
}

fn bigdec(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("bigdec", &args, 1)?;
  match &args[0] {
    Value::Int(i) => Ok(Value::BigDecimal(Rc::new(BigDec::new(
      BigInt::from(*i),
      0,
    )))),
    Value::BigInt(b) => Ok(Value::BigDecimal(Rc::new(
      BigDec::new(b.as_ref().clone(), 0),
    ))),
    Value::BigDecimal(_) => Ok(args[0].clone()),
    Value::Float(f) => {
      let text = format!("{}", f);
      parse_bigdec(&text)
    }
    Value::Str(s) => parse_bigdec(s),
    Value::Ratio(_) => Err(Error::arithmetic(
      "cannot represent a ratio exactly as a decimal; divide first",
    )),
    other => Err(Error::type_error(format!(
      "cannot coerce {} to bigdec",
      other.type_name()
    ))),
  }
}

fn parse_bigdec(text: &str) -> Result<Value> {
  let (mantissa, exp) = match text.find(['e', 'E']) {
    Some(ix) => {
      let exp: i64 = text[ix + 1..].parse().map_err(|_| {
        Error::illegal_argument(format!("invalid number: {}", text))
      })?;
      (&text[..ix], exp)
    }
    None => (text, 0),
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
  let unscaled =
    BigInt::parse_bytes(digits.as_bytes(), 10).ok_or_else(|| {
      Error::illegal_argument(format!("invalid number: {}", text))
    })?;
  let scale = i32::try_from(frac_len - exp).map_err(|_| {
    Error::illegal_argument(format!("exponent out of range: {}", text))
  })?;
  Ok(Value::BigDecimal(Rc::new(BigDec::new(unscaled, scale))))
}

fn double(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("double", &args, 1)?;
  Ok(Value::Float(num::as_f64(&args[0])?))
}

fn long(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("long", &args, 1)?;
  match &args[0] {
    Value::Char(c) => Ok(Value::Int(*c as i64)),
    Value::Float(f) => Ok(Value::Int(*f as i64)),
    Value::BigInt(b) => b.to_i64().map(Value::Int).ok_or_else(|| {
      Error::illegal_argument("value out of range for a long")
    }),
    Value::Ratio(r) => {
      let whole = &r.numerator / &r.denominator;
      whole.to_i64().map(Value::Int).ok_or_else(|| {
        Error::illegal_argument("value out of range for a long")
      })
    }
    other => num::as_i64(other).map(Value::Int),
  }
}

fn int_cast(env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  long(env, args)
}

fn identity_num(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("num", &args, 1)?;
  num::num_of(&args[0])?;
  Ok(args[0].clone())
}

fn char_cast(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("char", &args, 1)?;
  match &args[0] {
    Value::Char(_) => Ok(args[0].clone()),
    other => {
      let code = num::as_i64(other)?;
      u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(Value::Char)
        .ok_or_else(|| {
          Error::illegal_argument(format!(
            "invalid character code: {}",
            code
          ))
        })
    }
  }
}

fn hash(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  exact("hash", &args, 1)?;
  Ok(Value::Int(args[0].hash_value() as i64))
}

fn hash_ordered_coll(
  _env: &Rc<Env>,
  args: Vec<Value>,
) -> Result<Value> {
  exact("hash-ordered-coll", &args, 1)?;
  let mut hashes = Vec::new();
  for item in crate::value::seq::iter(&args[0]) {
    hashes.push(item?.hash_value());
  }
  Ok(Value::Int(
    crate::value::hash::hash_ordered(hashes.into_iter()) as i64,
  ))
}

fn hash_unordered_coll(
  _env: &Rc<Env>,
  args: Vec<Value>,
) -> Result<Value> {
  exact("hash-unordered-coll", &args, 1)?;
  let mut hashes = Vec::new();
  for item in crate::value::seq::iter(&args[0]) {
    hashes.push(item?.hash_value());
  }
  Ok(Value::Int(
    crate::value::hash::hash_unordered(hashes.into_iter()) as i64,
  ))
}

fn mix_collection_hash(
  _env: &Rc<Env>,
  args: Vec<Value>,
) -> Result<Value> {
  exact("mix-collection-hash", &args, 2)?;
  let hash = num::as_i64(&args[0])? as i32;
  let count = num::as_i64(&args[1])? as usize;
  Ok(Value::Int(
    crate::value::hash::mix_coll_hash(hash, count) as i64,
  ))
}

fn identical_p(_env: &Rc<Env>, args: Vec<Value>) -> Result<Value> {
  between("identical?", &args, 2, 2)?;
  Ok(Value::Boolean(args[0].identical(&args[1])))
}
