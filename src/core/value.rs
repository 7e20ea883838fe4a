/// Runtime value types for the dice language
///
/// A value is a boolean, a finite-width unsigned integer, a binary tuple, or
/// a list carrying an element tag. Arithmetic is modular in the integer's
/// width and ordering is unsigned. Values are hashable so that the inference
/// result can map each outcome to its probability.

use crate::ast::TypeTag;
use crate::errors::{DiceError, Result};
use std::fmt;

/// Width of the integer returned by `length`.
pub const LENGTH_WIDTH: u32 = 4;

const MAX_WIDTH: u32 = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Bool(bool),
    Int { width: u32, value: u64 },
    Tuple(Box<Value>, Box<Value>),
    List { items: Vec<Value>, elem: TypeTag },
}

/// Bit mask selecting the low `width` bits. Callers validate the width.
fn mask(width: u32) -> u64 {
    if width >= MAX_WIDTH {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

fn check_width(width: u32) -> Result<()> {
    if width == 0 || width > MAX_WIDTH {
        return Err(DiceError::range(format!(
            "integer width must lie in [1, {}] (got {})",
            MAX_WIDTH, width
        )));
    }
    Ok(())
}

impl Value {
    /// Builds `Int(width, value mod 2^width)`, rejecting invalid widths.
    pub fn int(width: u32, value: u64) -> Result<Value> {
        check_width(width)?;
        Ok(Value::Int {
            width,
            value: value & mask(width),
        })
    }

    /// Re-establishes the integer invariants on a literal built without
    /// validation (wraps out-of-range payloads, rejects bad widths).
    pub fn normalized(self) -> Result<Value> {
        match self {
            Value::Bool(b) => Ok(Value::Bool(b)),
            Value::Int { width, value } => Value::int(width, value),
            Value::Tuple(l, r) => Ok(Value::Tuple(
                Box::new(l.normalized()?),
                Box::new(r.normalized()?),
            )),
            Value::List { items, elem } => {
                let items = items
                    .into_iter()
                    .map(Value::normalized)
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::List { items, elem })
            }
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int { .. } => "int",
            Value::Tuple(_, _) => "tuple",
            Value::List { .. } => "list",
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(DiceError::type_kind("bool", other.kind_name())),
        }
    }

    pub fn as_int(&self) -> Result<(u32, u64)> {
        match self {
            Value::Int { width, value } => Ok((*width, *value)),
            other => Err(DiceError::type_kind("int", other.kind_name())),
        }
    }

    /// Two integer operands of equal width, or a type error.
    fn same_width(&self, other: &Value) -> Result<(u32, u64, u64)> {
        let (wl, l) = self.as_int()?;
        let (wr, r) = other.as_int()?;
        if wl != wr {
            return Err(DiceError::type_kind(
                format!("int({})", wl),
                format!("int({})", wr),
            ));
        }
        Ok((wl, l, r))
    }

    // ── Arithmetic, modulo 2^width ───────────────────────────────────────

    pub fn add(&self, other: &Value) -> Result<Value> {
        let (w, l, r) = self.same_width(other)?;
        Value::int(w, l.wrapping_add(r))
    }

    pub fn sub(&self, other: &Value) -> Result<Value> {
        let (w, l, r) = self.same_width(other)?;
        Value::int(w, l.wrapping_sub(r))
    }

    pub fn mul(&self, other: &Value) -> Result<Value> {
        let (w, l, r) = self.same_width(other)?;
        Value::int(w, l.wrapping_mul(r))
    }

    pub fn div(&self, other: &Value) -> Result<Value> {
        let (w, l, r) = self.same_width(other)?;
        if r == 0 {
            return Err(DiceError::range("division by zero"));
        }
        Value::int(w, l / r)
    }

    /// Left shift by a literal amount; bits shifted past the width are lost.
    pub fn shl(&self, amount: u32) -> Result<Value> {
        let (w, n) = self.as_int()?;
        Value::int(w, n.checked_shl(amount).unwrap_or(0))
    }

    /// Right shift by a literal amount; zero-fills.
    pub fn shr(&self, amount: u32) -> Result<Value> {
        let (w, n) = self.as_int()?;
        Value::int(w, n.checked_shr(amount).unwrap_or(0))
    }

    /// `nth_bit(i, v)`: bit `i` of `v`, bit 0 being the least significant.
    /// The index and the operand may have different widths.
    pub fn nth_bit(index: &Value, operand: &Value) -> Result<Value> {
        let (_, i) = index.as_int()?;
        let (_, n) = operand.as_int()?;
        let bit = if i >= u64::from(MAX_WIDTH) {
            0
        } else {
            (n >> i) & 1
        };
        Ok(Value::Bool(bit == 1))
    }

    // ── Comparison ───────────────────────────────────────────────────────

    /// Unsigned `<` over equal-width integers; anything else is a type error.
    pub fn lt(&self, other: &Value) -> Result<Value> {
        let (_, l, r) = self.same_width(other)?;
        Ok(Value::Bool(l < r))
    }

    /// Language-level equality. Total: mismatched kinds (or integer widths)
    /// compare as `false` rather than failing, so `discrete(..) == flip(..)`
    /// is a legal, always-false test.
    pub fn value_eq(&self, other: &Value) -> Value {
        Value::Bool(self.eq_inner(other))
    }

    fn eq_inner(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Bool(l), Value::Bool(r)) => l == r,
            (
                Value::Int { width: wl, value: l },
                Value::Int { width: wr, value: r },
            ) => wl == wr && l == r,
            (Value::Tuple(ll, lr), Value::Tuple(rl, rr)) => {
                ll.eq_inner(rl) && lr.eq_inner(rr)
            }
            (
                Value::List { items: li, elem: le },
                Value::List { items: ri, elem: re },
            ) => {
                if li.len() != ri.len() {
                    return false;
                }
                if li.is_empty() {
                    // Two empty lists are equal only when their kinds agree.
                    return le == re;
                }
                li.iter().zip(ri).all(|(l, r)| l.eq_inner(r))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int { width, value } => write!(f, "int({}, {})", width, value),
            Value::Tuple(l, r) => write!(f, "({}, {})", l, r),
            Value::List { items, .. } => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}
