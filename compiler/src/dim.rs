// dim.rs — Symbolic shape dimensions
//
// A `PrimExpr` is an integer arithmetic expression over named size
// variables. Shapes of tensors are sequences of `PrimExpr`. The folding
// constructors (`add`, `mul`, ...) collapse literal operands eagerly; the
// enum variants themselves are raw and keep whatever structure they are
// given, which is what the parser relies on to reproduce printed text.
//
// Preconditions: none.
// Postconditions: `to_string()` followed by `parse()` yields a structurally
//   identical expression.
// Failure modes: parsing malformed text returns `DimParseError`.
// Side effects: none.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── Expression ──────────────────────────────────────────────────────────────

/// Integer expression used for symbolic tensor dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PrimExpr {
    Int(i64),
    Var(String),
    Add(Box<PrimExpr>, Box<PrimExpr>),
    Sub(Box<PrimExpr>, Box<PrimExpr>),
    Mul(Box<PrimExpr>, Box<PrimExpr>),
    FloorDiv(Box<PrimExpr>, Box<PrimExpr>),
    FloorMod(Box<PrimExpr>, Box<PrimExpr>),
}

/// Integer floor division; `None` for a zero divisor or `i64::MIN // -1`.
pub fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a.checked_rem(b)? != 0 && ((a < 0) != (b < 0)) {
        Some(q - 1)
    } else {
        Some(q)
    }
}

/// Integer floor modulo, sign follows the divisor; `None` where
/// `floor_div` is.
pub fn floor_mod(a: i64, b: i64) -> Option<i64> {
    a.checked_sub(b.checked_mul(floor_div(a, b)?)?)
}

impl PrimExpr {
    pub fn var(name: impl Into<String>) -> Self {
        PrimExpr::Var(name.into())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PrimExpr::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_int(&self, value: i64) -> bool {
        self.as_int() == Some(value)
    }

    // ── Folding constructors ──

    pub fn add(a: PrimExpr, b: PrimExpr) -> PrimExpr {
        match (a.as_int(), b.as_int()) {
            (Some(x), Some(y)) => match x.checked_add(y) {
                Some(v) => PrimExpr::Int(v),
                None => PrimExpr::Add(Box::new(a), Box::new(b)),
            },
            (Some(0), _) => b,
            (_, Some(0)) => a,
            _ => PrimExpr::Add(Box::new(a), Box::new(b)),
        }
    }

    pub fn sub(a: PrimExpr, b: PrimExpr) -> PrimExpr {
        match (a.as_int(), b.as_int()) {
            (Some(x), Some(y)) => match x.checked_sub(y) {
                Some(v) => PrimExpr::Int(v),
                None => PrimExpr::Sub(Box::new(a), Box::new(b)),
            },
            (_, Some(0)) => a,
            _ if a == b => PrimExpr::Int(0),
            _ => PrimExpr::Sub(Box::new(a), Box::new(b)),
        }
    }

    pub fn mul(a: PrimExpr, b: PrimExpr) -> PrimExpr {
        match (a.as_int(), b.as_int()) {
            (Some(x), Some(y)) => match x.checked_mul(y) {
                Some(v) => PrimExpr::Int(v),
                None => PrimExpr::Mul(Box::new(a), Box::new(b)),
            },
            (Some(0), _) | (_, Some(0)) => PrimExpr::Int(0),
            (Some(1), _) => b,
            (_, Some(1)) => a,
            _ => PrimExpr::Mul(Box::new(a), Box::new(b)),
        }
    }

    pub fn floordiv(a: PrimExpr, b: PrimExpr) -> PrimExpr {
        match (a.as_int(), b.as_int()) {
            (Some(x), Some(y)) => match floor_div(x, y) {
                Some(v) => PrimExpr::Int(v),
                None => PrimExpr::FloorDiv(Box::new(a), Box::new(b)),
            },
            (_, Some(0)) => PrimExpr::FloorDiv(Box::new(a), Box::new(b)),
            (_, Some(1)) => a,
            _ => PrimExpr::FloorDiv(Box::new(a), Box::new(b)),
        }
    }

    pub fn floormod(a: PrimExpr, b: PrimExpr) -> PrimExpr {
        match (a.as_int(), b.as_int()) {
            (Some(x), Some(y)) => match floor_mod(x, y) {
                Some(v) => PrimExpr::Int(v),
                None => PrimExpr::FloorMod(Box::new(a), Box::new(b)),
            },
            (_, Some(0)) => PrimExpr::FloorMod(Box::new(a), Box::new(b)),
            (_, Some(1)) => PrimExpr::Int(0),
            _ => PrimExpr::FloorMod(Box::new(a), Box::new(b)),
        }
    }

    /// `ceil(a / b)` expressed as `(a + b - 1) // b`.
    pub fn ceildiv(a: PrimExpr, b: PrimExpr) -> PrimExpr {
        if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
            let folded = x
                .checked_neg()
                .and_then(|nx| floor_div(nx, y))
                .and_then(i64::checked_neg);
            if let Some(v) = folded {
                return PrimExpr::Int(v);
            }
        }
        let numer = PrimExpr::sub(PrimExpr::add(a, b.clone()), PrimExpr::Int(1));
        PrimExpr::floordiv(numer, b)
    }

    /// Product of a sequence of dims; the empty product is 1.
    pub fn product<'a>(dims: impl IntoIterator<Item = &'a PrimExpr>) -> PrimExpr {
        dims.into_iter()
            .fold(PrimExpr::Int(1), |acc, d| PrimExpr::mul(acc, d.clone()))
    }

    /// Names of all size variables, sorted and deduplicated.
    pub fn free_vars(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_vars(&mut out);
        out.sort();
        out.dedup();
        out
    }

    fn collect_vars(&self, out: &mut Vec<String>) {
        match self {
            PrimExpr::Int(_) => {}
            PrimExpr::Var(name) => out.push(name.clone()),
            PrimExpr::Add(a, b)
            | PrimExpr::Sub(a, b)
            | PrimExpr::Mul(a, b)
            | PrimExpr::FloorDiv(a, b)
            | PrimExpr::FloorMod(a, b) => {
                a.collect_vars(out);
                b.collect_vars(out);
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            PrimExpr::Add(..) | PrimExpr::Sub(..) => 1,
            PrimExpr::Mul(..) | PrimExpr::FloorDiv(..) | PrimExpr::FloorMod(..) => 2,
            PrimExpr::Int(_) | PrimExpr::Var(_) => 3,
        }
    }
}

impl From<i64> for PrimExpr {
    fn from(v: i64) -> Self {
        PrimExpr::Int(v)
    }
}

// ── Text form ───────────────────────────────────────────────────────────────

impl fmt::Display for PrimExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (lhs, op, rhs) = match self {
            PrimExpr::Int(v) => return write!(f, "{v}"),
            PrimExpr::Var(name) => return write!(f, "{name}"),
            PrimExpr::Add(a, b) => (a, "+", b),
            PrimExpr::Sub(a, b) => (a, "-", b),
            PrimExpr::Mul(a, b) => (a, "*", b),
            PrimExpr::FloorDiv(a, b) => (a, "//", b),
            PrimExpr::FloorMod(a, b) => (a, "%", b),
        };
        let prec = self.precedence();
        // Operators are left-associative: the right operand needs parens at
        // equal precedence.
        if lhs.precedence() < prec {
            write!(f, "({lhs})")?;
        } else {
            write!(f, "{lhs}")?;
        }
        write!(f, " {op} ")?;
        if rhs.precedence() <= prec {
            write!(f, "({rhs})")
        } else {
            write!(f, "{rhs}")
        }
    }
}

/// Error returned when dimension or shape text fails to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimParseError {
    pub input: String,
    pub messages: Vec<String>,
}

impl fmt::Display for DimParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot parse '{}': {}", self.input, self.messages.join("; "))
    }
}

impl std::error::Error for DimParseError {}

impl FromStr for PrimExpr {
    type Err = DimParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::parser::parse_dim(s)
    }
}

impl TryFrom<String> for PrimExpr {
    type Error = DimParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PrimExpr> for String {
    fn from(e: PrimExpr) -> String {
        e.to_string()
    }
}

/// Render a shape as `(d0, d1, ...)`.
pub fn fmt_shape(dims: &[PrimExpr]) -> String {
    let parts: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
    if parts.len() == 1 {
        format!("({},)", parts[0])
    } else {
        format!("({})", parts.join(", "))
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn n() -> PrimExpr {
        PrimExpr::var("n")
    }

    #[test]
    fn folding_constructors_collapse_literals() {
        assert_eq!(PrimExpr::add(2.into(), 3.into()), PrimExpr::Int(5));
        assert_eq!(PrimExpr::mul(n(), 1.into()), n());
        assert_eq!(PrimExpr::mul(n(), 0.into()), PrimExpr::Int(0));
        assert_eq!(PrimExpr::sub(n(), n()), PrimExpr::Int(0));
        assert_eq!(PrimExpr::floordiv((-7).into(), 2.into()), PrimExpr::Int(-4));
        assert_eq!(PrimExpr::floormod((-7).into(), 2.into()), PrimExpr::Int(1));
    }

    #[test]
    fn overflowing_literal_division_stays_symbolic() {
        assert_eq!(floor_div(i64::MIN, -1), None);
        assert_eq!(floor_mod(i64::MIN, -1), None);
        assert_eq!(floor_div(-7, 2), Some(-4));
        assert_eq!(floor_mod(-7, 2), Some(1));
        assert_eq!(
            PrimExpr::floordiv(i64::MIN.into(), (-1).into()),
            PrimExpr::FloorDiv(Box::new(i64::MIN.into()), Box::new((-1).into()))
        );
        assert!(PrimExpr::floormod(i64::MIN.into(), (-1).into()).as_int().is_none());
        assert_eq!(
            PrimExpr::ceildiv(i64::MIN.into(), 2.into()),
            PrimExpr::Int(i64::MIN / 2)
        );
    }

    #[test]
    fn ceildiv_literal_and_symbolic() {
        assert_eq!(PrimExpr::ceildiv(7.into(), 2.into()), PrimExpr::Int(4));
        assert_eq!(PrimExpr::ceildiv(6.into(), 2.into()), PrimExpr::Int(3));
        assert_eq!(
            PrimExpr::ceildiv(n(), 2.into()).to_string(),
            "(n + 2 - 1) // 2"
        );
    }

    #[test]
    fn display_parenthesizes_by_precedence() {
        let e = PrimExpr::Mul(
            Box::new(PrimExpr::Add(Box::new(n()), Box::new(1.into()))),
            Box::new(PrimExpr::var("m")),
        );
        assert_eq!(e.to_string(), "(n + 1) * m");

        let right_assoc = PrimExpr::Sub(
            Box::new(n()),
            Box::new(PrimExpr::Sub(Box::new(1.into()), Box::new(2.into()))),
        );
        assert_eq!(right_assoc.to_string(), "n - (1 - 2)");
    }

    #[test]
    fn text_roundtrip_preserves_structure() {
        let e = PrimExpr::FloorMod(
            Box::new(PrimExpr::Mul(Box::new(n()), Box::new((-3).into()))),
            Box::new(PrimExpr::Add(Box::new(PrimExpr::var("m")), Box::new(2.into()))),
        );
        let text = e.to_string();
        assert_eq!(text, "n * -3 % (m + 2)");
        let parsed: PrimExpr = text.parse().unwrap();
        assert_eq!(parsed, e);
    }

    #[test]
    fn free_vars_sorted_unique() {
        let e: PrimExpr = "n * m + n // 2".parse().unwrap();
        assert_eq!(e.free_vars(), vec!["m".to_string(), "n".to_string()]);
    }

    #[test]
    fn serde_uses_text_form() {
        let e: PrimExpr = "n * 2".parse().unwrap();
        let json = serde_json::to_string(&e).unwrap();
        assert_eq!(json, "\"n * 2\"");
        let back: PrimExpr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn fmt_shape_single_and_multi() {
        assert_eq!(fmt_shape(&[4.into()]), "(4,)");
        assert_eq!(fmt_shape(&[n(), 4.into()]), "(n, 4)");
        assert_eq!(fmt_shape(&[]), "()");
    }
}
