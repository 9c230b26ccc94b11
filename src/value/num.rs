// value/num.rs
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

//! The numeric tower: i64, big integer, ratio, big decimal, and double.
//!
//! Promotion travels up the lattice int → big-int → ratio → big-decimal →
//! float.  The unprimed operators reject i64 overflow, the primed ones
//! promote to big integers instead.

use std::cmp::Ordering;
use std::rc::Rc;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Pow, Signed, ToPrimitive, Zero};

use crate::{
  error::{Error, Result},
  value::hash,
  value::Value,
};

/// Overflow policy of the i64 lane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Overflow {
  /// Unprimed operators: overflow is an arithmetic error.
  Error,
  /// Primed operators: overflow promotes to a big integer.
  Promote,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ratio {
  pub numerator: BigInt,
  pub denominator: BigInt,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BigDec {
  pub unscaled: BigInt,
  pub scale: i32,
}

impl BigDec {
  pub fn new(unscaled: BigInt, scale: i32) -> Self {
    Self { unscaled, scale }
  }

  fn aligned_with(&self, other: &BigDec) -> (BigInt, BigInt, i32) {
    let scale = self.scale.max(other.scale);
    let a = rescale(&self.unscaled, scale - self.scale);
    let b = rescale(&other.unscaled, scale - other.scale);
    (a, b, scale)
  }

  pub fn to_f64(&self) -> f64 {
    let unscaled = self.unscaled.to_f64().unwrap_or(f64::NAN);
    unscaled * 10f64.powi(-self.scale)
  }
}

fn rescale(unscaled: &BigInt, by: i32) -> BigInt {
  debug_assert!(by >= 0);
  unscaled * ten_pow(by as u32)
}

fn ten_pow(exp: u32) -> BigInt {
  BigInt::from(10).pow(exp)
}

impl std::fmt::Display for BigDec {
  /// `unscaled × 10^-scale` in plain decimal notation.
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    if self.scale <= 0 {
      let widened = rescale(&self.unscaled, -self.scale);
      return write!(f, "{}", widened);
    }
    let negative = self.unscaled.is_negative();
    let digits = self.unscaled.abs().to_string();
    let scale = self.scale as usize;
    let (int_part, frac_part) = if digits.len() > scale {
      let split = digits.len() - scale;
      (digits[..split].to_string(), digits[split..].to_string())
    } else {
      ("0".to_string(), format!("{:0>width$}", digits, width = scale))
    };
    if negative {
      write!(f, "-{}.{}", int_part, frac_part)
    } else {
      write!(f, "{}.{}", int_part, frac_part)
    }
  }
}

impl std::fmt::Display for Ratio {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}/{}", self.numerator, self.denominator)
  }
}

/// A borrowed view of a numeric value.
#[derive(Clone, Debug)]
pub enum Num<'a> {
  Int(i64),
  Big(&'a BigInt),
  Ratio(&'a Ratio),
  Dec(&'a BigDec),
  Float(f64),
}

pub fn num_of(v: &Value) -> Result<Num<'_>> {
  match v {
    Value::Int(i) => Ok(Num::Int(*i)),
    Value::BigInt(b) => Ok(Num::Big(b)),
    Value::Ratio(r) => Ok(Num::Ratio(r)),
    Value::BigDecimal(d) => Ok(Num::Dec(d)),
    Value::Float(f) => Ok(Num::Float(*f)),
    other => Err(Error::type_error(format!(
      "{} cannot be cast to a number",
      other.type_name()
    ))),
  }
}

pub fn is_number(v: &Value) -> bool {
  matches!(
    v,
    Value::Int(_)
      | Value::BigInt(_)
      | Value::Ratio(_)
      | Value::BigDecimal(_)
      | Value::Float(_)
  )
}

fn to_f64(n: &Num) -> f64 {
  match n {
    Num::Int(i) => *i as f64,
    Num::Big(b) => b.to_f64().unwrap_or(f64::NAN),
    Num::Ratio(r) => {
      let nf = r.numerator.to_f64().unwrap_or(f64::NAN);
      let df = r.denominator.to_f64().unwrap_or(f64::NAN);
      nf / df
    }
    Num::Dec(d) => d.to_f64(),
    Num::Float(f) => *f,
  }
}

fn to_big(n: &Num) -> Option<BigInt> {
  match n {
    Num::Int(i) => Some(BigInt::from(*i)),
    Num::Big(b) => Some((*b).clone()),
    _ => None,
  }
}

/// Exact value as a numerator/denominator pair.  Only the float lane has
/// no exact representation here.
fn to_rational(n: &Num) -> Option<(BigInt, BigInt)> {
  match n {
    Num::Int(i) => Some((BigInt::from(*i), BigInt::from(1))),
    Num::Big(b) => Some(((*b).clone(), BigInt::from(1))),
    Num::Ratio(r) => {
      Some((r.numerator.clone(), r.denominator.clone()))
    }
    Num::Dec(d) => {
      if d.scale >= 0 {
        Some((d.unscaled.clone(), ten_pow(d.scale as u32)))
      } else {
        Some((rescale(&d.unscaled, -d.scale), BigInt::from(1)))
      }
    }
    Num::Float(_) => None,
  }
}

fn to_dec(n: &Num) -> Result<BigDec> {
  match n {
    Num::Int(i) => Ok(BigDec::new(BigInt::from(*i), 0)),
    Num::Big(b) => Ok(BigDec::new((*b).clone(), 0)),
    Num::Dec(d) => Ok((*d).clone()),
    Num::Ratio(r) => ratio_to_dec(r),
    Num::Float(_) => {
      Err(Error::type_error("cannot coerce a double to a decimal"))
    }
  }
}

/// Exact ratio → decimal conversion; fails on a non-terminating
/// expansion, which is what happens whenever the reduced denominator has
/// a prime factor other than 2 or 5.
fn ratio_to_dec(r: &Ratio) -> Result<BigDec> {
  let mut den = r.denominator.clone();
  let two = BigInt::from(2);
  let five = BigInt::from(5);
  let mut twos = 0_i32;
  let mut fives = 0_i32;
  while (&den % &two).is_zero() {
    den /= &two;
    twos += 1;
  }
  while (&den % &five).is_zero() {
    den /= &five;
    fives += 1;
  }
  if den != BigInt::from(1) {
    return Err(Error::arithmetic(
      "non-terminating decimal expansion; no exact representable decimal result",
    ));
  }
  let scale = twos.max(fives);
  let factor = ten_pow(scale as u32) / &r.denominator;
  let unscaled = &r.numerator * factor;
  Ok(BigDec::new(unscaled, scale))
}

fn make_big(value: BigInt) -> Value {
  Value::BigInt(Rc::new(value))
}

/// Normalizes a raw numerator/denominator pair: reduce, push the sign up,
/// and collapse whole results to integers.
pub fn make_ratio(numerator: BigInt, denominator: BigInt) -> Result<Value> {
  if denominator.is_zero() {
    return Err(Error::arithmetic("divide by zero"));
  }
  let gcd = numerator.gcd(&denominator);
  let (mut n, mut d) = (numerator / &gcd, denominator / gcd);
  if d.is_negative() {
    n = -n;
    d = -d;
  }
  if d == BigInt::from(1) {
    Ok(int_result(n))
  } else {
    Ok(Value::Ratio(Rc::new(Ratio {
      numerator: n,
      denominator: d,
    })))
  }
}

/// Big integer results stay big; they never silently demote.
fn int_result(value: BigInt) -> Value {
  Value::BigInt(Rc::new(value))
}

fn dec_result(value: BigDec) -> Value {
  Value::BigDecimal(Rc::new(value))
}

//
// The promoted operation lanes
//

enum Lane {
  Int(i64, i64),
  Big(BigInt, BigInt),
  Ratio(Ratio, Ratio),
  Dec(BigDec, BigDec),
  Float(f64, f64),
}

fn lane_of(a: &Num, b: &Num) -> Result<Lane> {
  use Num as N;
  Ok(match (a, b) {
    (N::Float(_), _) | (_, N::Float(_)) => {
      Lane::Float(to_f64(a), to_f64(b))
    }
    (N::Dec(_), _) | (_, N::Dec(_)) => Lane::Dec(to_dec(a)?, to_dec(b)?),
    (N::Ratio(_), _) | (_, N::Ratio(_)) => {
      let (an, ad) = to_rational(a).unwrap();
      let (bn, bd) = to_rational(b).unwrap();
      Lane::Ratio(
        Ratio {
          numerator: an,
          denominator: ad,
        },
        Ratio {
          numerator: bn,
          denominator: bd,
        },
      )
    }
    (N::Big(_), _) | (_, N::Big(_)) => {
      Lane::Big(to_big(a).unwrap(), to_big(b).unwrap())
    }
    (N::Int(x), N::Int(y)) => Lane::Int(*x, *y),
  })
}

pub fn add(a: &Value, b: &Value, ov: Overflow) -> Result<Value> {
  match lane_of(&num_of(a)?, &num_of(b)?)? {
    Lane::Int(x, y) => match x.checked_add(y) {
      Some(v) => Ok(Value::Int(v)),
      None => overflowed(ov, BigInt::from(x) + BigInt::from(y)),
    },
    Lane::Big(x, y) => Ok(make_big(x + y)),
    Lane::Ratio(x, y) => make_ratio(
      &x.numerator * &y.denominator + &y.numerator * &x.denominator,
      x.denominator * y.denominator,
    ),
    Lane::Dec(x, y) => {
      let (xu, yu, scale) = x.aligned_with(&y);
      Ok(dec_result(BigDec::new(xu + yu, scale)))
    }
    Lane::Float(x, y) => Ok(Value::Float(x + y)),
  }
}

pub fn sub(a: &Value, b: &Value, ov: Overflow) -> Result<Value> {
  match lane_of(&num_of(a)?, &num_of(b)?)? {
    Lane::Int(x, y) => match x.checked_sub(y) {
      Some(v) => Ok(Value::Int(v)),
      None => overflowed(ov, BigInt::from(x) - BigInt::from(y)),
    },
    Lane::Big(x, y) => Ok(make_big(x - y)),
    Lane::Ratio(x, y) => make_ratio(
      &x.numerator * &y.denominator - &y.numerator * &x.denominator,
      x.denominator * y.denominator,
    ),
    Lane::Dec(x, y) => {
      let (xu, yu, scale) = x.aligned_with(&y);
      Ok(dec_result(BigDec::new(xu - yu, scale)))
    }
    Lane::Float(x, y) => Ok(Value::Float(x - y)),
  }
}

pub fn mul(a: &Value, b: &Value, ov: Overflow) -> Result<Value> {
  match lane_of(&num_of(a)?, &num_of(b)?)? {
    Lane::Int(x, y) => match x.checked_mul(y) {
      Some(v) => Ok(Value::Int(v)),
      None => overflowed(ov, BigInt::from(x) * BigInt::from(y)),
    },
    Lane::Big(x, y) => Ok(make_big(x * y)),
    Lane::Ratio(x, y) => make_ratio(
      x.numerator * y.numerator,
      x.denominator * y.denominator,
    ),
    Lane::Dec(x, y) => {
      let scale = x.scale.checked_add(y.scale).ok_or_else(|| {
        Error::arithmetic("decimal scale out of range")
      })?;
      Ok(dec_result(BigDec::new(x.unscaled * y.unscaled, scale)))
    }
    Lane::Float(x, y) => Ok(Value::Float(x * y)),
  }
}

pub fn div(a: &Value, b: &Value) -> Result<Value> {
  match lane_of(&num_of(a)?, &num_of(b)?)? {
    Lane::Int(x, y) => {
      if y == 0 {
        return Err(Error::arithmetic("divide by zero"));
      }
      make_ratio(BigInt::from(x), BigInt::from(y))
    }
    Lane::Big(x, y) => {
      if y.is_zero() {
        return Err(Error::arithmetic("divide by zero"));
      }
      make_ratio(x, y)
    }
    Lane::Ratio(x, y) => {
      if y.numerator.is_zero() {
        return Err(Error::arithmetic("divide by zero"));
      }
      make_ratio(
        x.numerator * y.denominator,
        x.denominator * y.numerator,
      )
    }
    Lane::Dec(x, y) => {
      if y.unscaled.is_zero() {
        return Err(Error::arithmetic("divide by zero"));
      }
      div_dec(&x, &y)
    }
    Lane::Float(x, y) => Ok(Value::Float(x / y)),
  }
}

/// Decimal division tries for an exact quotient within a generous scale
/// allowance; a non-terminating expansion is an error when no math
/// context is in force.
fn div_dec(x: &BigDec, y: &BigDec) -> Result<Value> {
  const EXTRA_SCALE: i32 = 32;
  let widened = rescale(&x.unscaled, EXTRA_SCALE);
  let (q, r) = widened.div_rem(&y.unscaled);
  if !r.is_zero() {
    return Err(Error::arithmetic(
      "non-terminating decimal expansion; no exact representable decimal result",
    ));
  }
  let scale = x.scale - y.scale + EXTRA_SCALE;
  // Trim the trailing zeros the widening introduced.
  let mut unscaled = q;
  let mut scale = scale;
  let ten = BigInt::from(10);
  while scale > 0 && (&unscaled % &ten).is_zero() && !unscaled.is_zero() {
    unscaled /= &ten;
    scale -= 1;
  }
  Ok(dec_result(BigDec::new(unscaled, scale)))
}

/// Truncating division.
pub fn quot(a: &Value, b: &Value) -> Result<Value> {
  match lane_of(&num_of(a)?, &num_of(b)?)? {
    Lane::Int(x, y) => {
      if y == 0 {
        return Err(Error::arithmetic("divide by zero"));
      }
      match x.checked_div(y) {
        Some(v) => Ok(Value::Int(v)),
        None => Ok(make_big(BigInt::from(x) / BigInt::from(y))),
      }
    }
    Lane::Big(x, y) => {
      if y.is_zero() {
        return Err(Error::arithmetic("divide by zero"));
      }
      Ok(int_result(x / y))
    }
    Lane::Ratio(x, y) => {
      if y.numerator.is_zero() {
        return Err(Error::arithmetic("divide by zero"));
      }
      let n = x.numerator * y.denominator;
      let d = x.denominator * y.numerator;
      Ok(int_result(n / d))
    }
    Lane::Dec(x, y) => {
      if y.unscaled.is_zero() {
        return Err(Error::arithmetic("divide by zero"));
      }
      let (xu, yu, _) = x.aligned_with(&y);
      Ok(dec_result(BigDec::new(xu / yu, 0)))
    }
    Lane::Float(x, y) => Ok(Value::Float((x / y).trunc())),
  }
}

/// Remainder of truncating division; the sign follows the dividend.
pub fn rem(a: &Value, b: &Value) -> Result<Value> {
  match lane_of(&num_of(a)?, &num_of(b)?)? {
    Lane::Int(x, y) => {
      if y == 0 {
        return Err(Error::arithmetic("divide by zero"));
      }
      Ok(Value::Int(x.wrapping_rem(y)))
    }
    Lane::Big(x, y) => {
      if y.is_zero() {
        return Err(Error::arithmetic("divide by zero"));
      }
      Ok(int_result(x % y))
    }
    Lane::Ratio(x, y) => {
      if y.numerator.is_zero() {
        return Err(Error::arithmetic("divide by zero"));
      }
      let q = {
        let n = &x.numerator * &y.denominator;
        let d = &x.denominator * &y.numerator;
        n / d
      };
      let scaled = mul(
        &make_ratio(y.numerator.clone(), y.denominator.clone())?,
        &int_result(q),
        Overflow::Promote,
      )?;
      sub(
        &make_ratio(x.numerator.clone(), x.denominator.clone())?,
        &scaled,
        Overflow::Promote,
      )
    }
    Lane::Dec(x, y) => {
      if y.unscaled.is_zero() {
        return Err(Error::arithmetic("divide by zero"));
      }
      let (xu, yu, scale) = x.aligned_with(&y);
      Ok(dec_result(BigDec::new(xu % yu, scale)))
    }
    Lane::Float(x, y) => Ok(Value::Float(x % y)),
  }
}

/// Flooring modulus; the sign follows the divisor.
pub fn modulo(a: &Value, b: &Value) -> Result<Value> {
  let r = rem(a, b)?;
  let zero = Value::Int(0);
  if is_zero(&r)? {
    return Ok(r);
  }
  let r_neg = compare(&r, &zero)? == Ordering::Less;
  let b_neg = compare(b, &zero)? == Ordering::Less;
  if r_neg != b_neg {
    add(&r, b, Overflow::Promote)
  } else {
    Ok(r)
  }
}

pub fn neg(a: &Value, ov: Overflow) -> Result<Value> {
  sub(&Value::Int(0), a, ov)
}

pub fn inc(a: &Value, ov: Overflow) -> Result<Value> {
  add(a, &Value::Int(1), ov)
}

pub fn dec(a: &Value, ov: Overflow) -> Result<Value> {
  sub(a, &Value::Int(1), ov)
}

fn overflowed(ov: Overflow, promoted: BigInt) -> Result<Value> {
  match ov {
    Overflow::Error => Err(Error::arithmetic("integer overflow")),
    Overflow::Promote => Ok(make_big(promoted)),
  }
}

pub fn compare(a: &Value, b: &Value) -> Result<Ordering> {
  let an = num_of(a)?;
  let bn = num_of(b)?;
  if matches!(an, Num::Float(_)) || matches!(bn, Num::Float(_)) {
    let x = to_f64(&an);
    let y = to_f64(&bn);
    return Ok(x.partial_cmp(&y).unwrap_or(Ordering::Equal));
  }
  let (xn, xd) = to_rational(&an).unwrap();
  let (yn, yd) = to_rational(&bn).unwrap();
  Ok((xn * yd).cmp(&(yn * xd)))
}

/// Category-aware equality: the integer kinds equal each other by value,
/// ratios equal ratios, decimals equal decimals scale-sensitively, floats
/// equal floats.  Cross-category comparisons are false, so `(= 1 1.0)`
/// and `(= 1 1M)` both miss while `(= 1 1N)` holds.
pub fn equiv(a: &Value, b: &Value) -> bool {
  use Num as N;
  let (Ok(an), Ok(bn)) = (num_of(a), num_of(b)) else {
    return false;
  };
  match (&an, &bn) {
    (N::Int(x), N::Int(y)) => x == y,
    (N::Int(_) | N::Big(_), N::Int(_) | N::Big(_)) => {
      to_big(&an).unwrap() == to_big(&bn).unwrap()
    }
    (N::Ratio(x), N::Ratio(y)) => x == y,
    (N::Dec(x), N::Dec(y)) => x == y,
    (N::Float(x), N::Float(y)) => x == y,
    _ => false,
  }
}

/// Hashes consistently with `equiv`: any big integer that fits an i64
/// hashes like the i64.
pub fn hash_num(v: &Value) -> i32 {
  match v {
    Value::Int(i) => hash::hash_int(*i),
    Value::BigInt(b) => match b.to_i64() {
      Some(i) => hash::hash_int(i),
      None => hash::hash_bytes(&b.to_signed_bytes_le()),
    },
    Value::Ratio(r) => hash::hash_bytes(&r.numerator.to_signed_bytes_le())
      .wrapping_mul(31)
      .wrapping_add(hash::hash_bytes(&r.denominator.to_signed_bytes_le())),
    Value::BigDecimal(d) => {
      hash::hash_bytes(&d.unscaled.to_signed_bytes_le())
        .wrapping_mul(31)
        .wrapping_add(d.scale)
    }
    Value::Float(f) => hash::hash_int(f.to_bits() as i64),
    _ => 0,
  }
}

pub fn is_zero(v: &Value) -> Result<bool> {
  Ok(match num_of(v)? {
    Num::Int(i) => i == 0,
    Num::Big(b) => b.is_zero(),
    Num::Ratio(_) => false,
    Num::Dec(d) => d.unscaled.is_zero(),
    Num::Float(f) => f == 0.0,
  })
}

pub fn is_pos(v: &Value) -> Result<bool> {
  Ok(compare(v, &Value::Int(0))? == Ordering::Greater)
}

pub fn is_neg(v: &Value) -> Result<bool> {
  Ok(compare(v, &Value::Int(0))? == Ordering::Less)
}

pub fn as_f64(v: &Value) -> Result<f64> {
  Ok(to_f64(&num_of(v)?))
}

/// Integer cast for indices and counts.
pub fn as_i64(v: &Value) -> Result<i64> {
  match v {
    Value::Int(i) => Ok(*i),
    Value::BigInt(b) => b.to_i64().ok_or_else(|| {
      Error::illegal_argument("value out of range for a long")
    }),
    Value::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
    other => Err(Error::type_error(format!(
      "{} cannot be cast to a long",
      other.type_name()
    ))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn int(i: i64) -> Value {
    Value::Int(i)
  }

  #[test]
  fn int_addition_stays_small() {
    assert_eq!(add(&int(2), &int(3), Overflow::Error).unwrap(), int(5));
  }

  #[test]
  fn unprimed_overflow_errors_primed_promotes() {
    let max = int(i64::MAX);
    assert!(add(&max, &int(1), Overflow::Error).is_err());
    let promoted = add(&max, &int(1), Overflow::Promote).unwrap();
    assert!(matches!(promoted, Value::BigInt(_)));
  }

  #[test]
  fn division_of_integers_makes_ratios() {
    let v = div(&int(1), &int(3)).unwrap();
    assert!(matches!(v, Value::Ratio(_)));
    let whole = div(&int(6), &int(3)).unwrap();
    assert!(matches!(whole, Value::BigInt(_)));
  }

  #[test]
  fn division_by_zero_is_an_error() {
    assert!(div(&int(1), &int(0)).is_err());
    // Floats divide to infinity instead.
    let v = div(&Value::Float(1.0), &Value::Float(0.0)).unwrap();
    assert_eq!(v, Value::Float(f64::INFINITY));
  }

  #[test]
  fn quot_rem_reconstruct_dividend() {
    for (i, j) in [(7, 2), (-7, 2), (7, -2), (-7, -2)] {
      let q = quot(&int(i), &int(j)).unwrap();
      let r = rem(&int(i), &int(j)).unwrap();
      let back =
        add(&mul(&q, &int(j), Overflow::Error).unwrap(), &r, Overflow::Error)
          .unwrap();
      assert_eq!(back, int(i));
    }
  }

  #[test]
  fn mod_follows_divisor_sign() {
    assert_eq!(modulo(&int(-7), &int(2)).unwrap(), int(1));
    assert_eq!(modulo(&int(7), &int(-2)).unwrap(), int(-1));
  }

  #[test]
  fn cross_category_equality() {
    let big_one = Value::BigInt(Rc::new(BigInt::from(1)));
    assert!(equiv(&int(1), &big_one));
    assert_eq!(hash_num(&int(1)), hash_num(&big_one));
    assert!(!equiv(&int(1), &Value::Float(1.0)));
  }

  #[test]
  fn nan_is_not_equal_to_itself() {
    let nan = Value::Float(f64::NAN);
    assert!(!equiv(&nan, &nan));
  }

  #[test]
  fn big_decimal_prints_plainly() {
    let d = BigDec::new(BigInt::from(1500), 2);
    assert_eq!(d.to_string(), "15.00");
    let neg = BigDec::new(BigInt::from(-5), 3);
    assert_eq!(neg.to_string(), "-0.005");
  }
}
