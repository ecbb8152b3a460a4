use core::fmt;
use std::cmp::Ordering;

use crate::{error::{LootError, LootResult}, expression::Expr};


/// An exact fraction in lowest terms with a positive denominator greater
/// than one. Only [`Number::exact`] builds these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    num: i64,
    den: i64,
}

impl Rational {
    pub fn numerator(&self) -> i64 {
        self.num
    }

    pub fn denominator(&self) -> i64 {
        self.den
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// A value of the numeric tower, detached from [`Expr`] for arithmetic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Fixnum(i64),
    Rational(Rational),
    Float(f64),
}

fn gcd(mut m: u128, mut n: u128) -> u128 {
    while n != 0 {
        let r = m % n;
        m = n;
        n = r;
    }
    m
}

fn overflow() -> LootError {
    LootError::eval("integer overflow")
}

impl Number {
    /// Reduce `num/den` to lowest terms with the sign on the numerator,
    /// collapsing to a fixnum when the denominator becomes one.
    pub fn exact(num: i128, den: i128) -> LootResult<Self> {
        if den == 0 { return Err(LootError::eval("division by zero")); }
        if num == 0 { return Ok(Self::Fixnum(0)); }

        let g = gcd(num.unsigned_abs(), den.unsigned_abs()) as i128;
        let (mut num, mut den) = (num / g, den / g);
        if den < 0 {
            num = num.checked_neg().ok_or_else(overflow)?;
            den = -den;
        }

        let num = i64::try_from(num).map_err(|_| overflow())?;
        let den = i64::try_from(den).map_err(|_| overflow())?;
        Ok(if den == 1 { Self::Fixnum(num) } else { Self::Rational(Rational { num, den }) })
    }

    pub fn from_expr(expr: &Expr) -> Option<Self> {
        match expr {
            Expr::Fixnum(value) => Some(Self::Fixnum(*value)),
            Expr::Rational(value) => Some(Self::Rational(*value)),
            Expr::Float(value) => Some(Self::Float(*value)),
            _ => None,
        }
    }

    pub fn into_expr(self) -> Expr {
        match self {
            Self::Fixnum(value) => Expr::Fixnum(value),
            Self::Rational(value) => Expr::Rational(value),
            Self::Float(value) => Expr::Float(value),
        }
    }

    fn exact_parts(&self) -> Option<(i128, i128)> {
        match self {
            Self::Fixnum(value) => Some((*value as i128, 1)),
            Self::Rational(Rational { num, den }) => Some((*num as i128, *den as i128)),
            Self::Float(_) => None,
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            Self::Fixnum(value) => *value as f64,
            Self::Rational(Rational { num, den }) => *num as f64 / *den as f64,
            Self::Float(value) => *value,
        }
    }

    fn combine(
        self,
        other: Self,
        exact: impl Fn((i128, i128), (i128, i128)) -> LootResult<Self>,
        inexact: impl Fn(f64, f64) -> f64,
    ) -> LootResult<Self> {
        match (self.exact_parts(), other.exact_parts()) {
            (Some(a), Some(b)) => exact(a, b),
            _ => Ok(Self::Float(inexact(self.to_f64(), other.to_f64()))),
        }
    }

    pub fn add(self, other: Self) -> LootResult<Self> {
        self.combine(other, |(a, b), (c, d)| {
            let num = (a * d).checked_add(c * b).ok_or_else(overflow)?;
            Self::exact(num, b * d)
        }, |x, y| x + y)
    }

    pub fn sub(self, other: Self) -> LootResult<Self> {
        self.combine(other, |(a, b), (c, d)| {
            let num = (a * d).checked_sub(c * b).ok_or_else(overflow)?;
            Self::exact(num, b * d)
        }, |x, y| x - y)
    }

    pub fn mul(self, other: Self) -> LootResult<Self> {
        self.combine(other, |(a, b), (c, d)| Self::exact(a * c, b * d), |x, y| x * y)
    }

    /// Exact division by zero is an error; inexact division follows IEEE.
    pub fn div(self, other: Self) -> LootResult<Self> {
        self.combine(other, |(a, b), (c, d)| Self::exact(a * d, b * c), |x, y| x / y)
    }

    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self.exact_parts(), other.exact_parts()) {
            (Some((a, b)), Some((c, d))) => Some((a * d).cmp(&(c * b))),
            _ => self.to_f64().partial_cmp(&other.to_f64()),
        }
    }
}

/// Build an exact number from a numerator and denominator.
pub fn make_rational(num: i64, den: i64) -> LootResult<Expr> {
    Number::exact(num as i128, den as i128).map(Number::into_expr)
}

/// Render a float the way C's `%e` does, e.g. `2.500000e+00`.
pub fn format_float(value: f64) -> String {
    if value.is_nan() { return "nan".to_owned(); }
    if value.is_infinite() { return if value > 0.0 { "inf".to_owned() } else { "-inf".to_owned() }; }

    let formatted = format!("{:.6e}", value);
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exponent.abs())
        }
        None => formatted,
    }
}

/// What a bare atom read from source denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lexeme {
    Integer,
    Rational,
    Float,
    Symbol,
}

/// Length of the optionally signed digit run at the start of `text`. A
/// sign counts toward the length unless it is the whole text.
fn integer_prefix(text: &[u8]) -> usize {
    let start = match text {
        [b'+' | b'-'] => return 0,
        [b'+' | b'-', ..] => 1,
        _ => 0,
    };
    start + text[start..].iter().take_while(|c| c.is_ascii_digit()).count()
}

fn is_integer(text: &[u8]) -> bool {
    !text.is_empty() && integer_prefix(text) == text.len()
}

fn is_rational(text: &[u8]) -> bool {
    let numerator = integer_prefix(text);
    if numerator == 0 || !text[numerator - 1].is_ascii_digit() { return false; }
    if text.get(numerator) != Some(&b'/') { return false; }

    let denominator = &text[numerator + 1..];
    !denominator.is_empty() && denominator.iter().all(u8::is_ascii_digit)
}

/// An exponent marker must be followed by a non-empty, optionally signed
/// digit run that ends the text.
fn is_exponent(text: &[u8]) -> bool {
    !text.is_empty() && integer_prefix(text) == text.len()
}

/// A leading integer part (possibly just a sign) followed by either a
/// fraction or an exponent. A dot that ends the text is accepted only
/// directly after the integer part, so `1.` and `-.` are floats while
/// `1.e5` is not.
fn is_float(text: &[u8]) -> bool {
    let integer = integer_prefix(text);
    if integer == 0 { return false; }

    let rest = &text[integer..];
    match rest.first() {
        Some(b'.') => {
            let fraction = &rest[1..];
            if !fraction.first().is_some_and(u8::is_ascii_digit) {
                return fraction.is_empty();
            }
            let digits = integer_prefix(fraction);
            match fraction.get(digits) {
                None => true,
                Some(b'e' | b'E') => is_exponent(&fraction[digits + 1..]),
                Some(_) => false,
            }
        }
        Some(b'e' | b'E') => is_exponent(&rest[1..]),
        _ => false,
    }
}

pub fn classify(text: &str) -> Lexeme {
    let bytes = text.as_bytes();
    if is_float(bytes) { Lexeme::Float }
    else if is_rational(bytes) { Lexeme::Rational }
    else if is_integer(bytes) { Lexeme::Integer }
    else { Lexeme::Symbol }
}

/// Value of the longest prefix of `text` that reads as a float, or zero
/// when there is none, so `-.` and `+e5` read as `0.0`.
fn leading_float(text: &str) -> f64 {
    (1..=text.len()).rev()
        .filter(|&end| text.is_char_boundary(end))
        .find_map(|end| text[..end].parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Parse a numeric atom, or `None` when the text names a symbol.
pub fn parse_number(text: &str) -> LootResult<Option<Expr>> {
    let out_of_range = || LootError::read(format!("number out of range {}", text));

    match classify(text) {
        Lexeme::Integer => text.parse::<i64>()
            .map(|value| Some(Expr::Fixnum(value)))
            .map_err(|_| out_of_range()),
        Lexeme::Rational => {
            let (num, den) = text.split_once('/').ok_or_else(out_of_range)?;
            let num: i64 = num.parse().map_err(|_| out_of_range())?;
            let den: i64 = den.parse().map_err(|_| out_of_range())?;
            make_rational(num, den).map(Some)
        }
        Lexeme::Float => Ok(Some(Expr::Float(leading_float(text)))),
        Lexeme::Symbol => Ok(None),
    }
}
