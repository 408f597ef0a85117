// arith.rs — Conservative prover for symbolic dimensions
//
// Rewrites a `PrimExpr` into a canonical polynomial: integer coefficients
// over monomials of size variables. Floor division and modulo that cannot
// be resolved exactly become opaque atoms, compared structurally after
// their operands are canonicalized.
//
// Preconditions: none.
// Postconditions: `can_prove_equal` never answers `true` for two expressions
//   that could evaluate differently under some binding of the size variables.
// Failure modes: none. Arithmetic overflow turns the offending subterm into
//   an opaque atom.
// Side effects: none.

use std::collections::BTreeMap;

use crate::dim::{floor_div, floor_mod, PrimExpr};

// ── Canonical form ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Atom {
    Var(String),
    Opaque(PrimExpr),
}

impl Atom {
    fn to_expr(&self) -> PrimExpr {
        match self {
            Atom::Var(name) => PrimExpr::Var(name.clone()),
            Atom::Opaque(e) => e.clone(),
        }
    }
}

/// Sorted multiset of atoms. The empty monomial is the constant term.
type Monomial = Vec<Atom>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct Poly {
    terms: BTreeMap<Monomial, i64>,
}

impl Poly {
    fn constant(v: i64) -> Self {
        let mut p = Poly::default();
        if v != 0 {
            p.terms.insert(Vec::new(), v);
        }
        p
    }

    fn atom(a: Atom) -> Self {
        let mut p = Poly::default();
        p.terms.insert(vec![a], 1);
        p
    }

    fn as_const(&self) -> Option<i64> {
        match self.terms.len() {
            0 => Some(0),
            1 => self.terms.get(&Vec::new()).copied(),
            _ => None,
        }
    }

    fn add_term(&mut self, mono: Monomial, coef: i64) -> Option<()> {
        let slot = self.terms.entry(mono).or_insert(0);
        *slot = slot.checked_add(coef)?;
        if *slot == 0 {
            self.terms.retain(|_, c| *c != 0);
        }
        Some(())
    }

    fn checked_add(&self, other: &Poly) -> Option<Poly> {
        let mut out = self.clone();
        for (m, c) in &other.terms {
            out.add_term(m.clone(), *c)?;
        }
        Some(out)
    }

    fn checked_scale(&self, k: i64) -> Option<Poly> {
        let mut out = Poly::default();
        for (m, c) in &self.terms {
            out.add_term(m.clone(), c.checked_mul(k)?)?;
        }
        Some(out)
    }

    fn checked_mul(&self, other: &Poly) -> Option<Poly> {
        let mut out = Poly::default();
        for (ma, ca) in &self.terms {
            for (mb, cb) in &other.terms {
                let mut mono = ma.clone();
                mono.extend(mb.iter().cloned());
                mono.sort();
                out.add_term(mono, ca.checked_mul(*cb)?)?;
            }
        }
        Some(out)
    }

    /// Divide every coefficient by `k` if all are multiples of it.
    fn exact_div(&self, k: i64) -> Option<Poly> {
        let mut out = Poly::default();
        for (m, c) in &self.terms {
            if c.checked_rem(k)? != 0 {
                return None;
            }
            out.terms.insert(m.clone(), c.checked_div(k)?);
        }
        Some(out)
    }

    /// Rebuild an expression: non-constant terms in monomial order, constant last.
    fn to_expr(&self) -> PrimExpr {
        let mut acc: Option<PrimExpr> = None;
        let mut constant = 0;
        for (mono, &coef) in &self.terms {
            if mono.is_empty() {
                constant = coef;
                continue;
            }
            let base = mono
                .iter()
                .map(Atom::to_expr)
                .reduce(PrimExpr::mul)
                .unwrap_or(PrimExpr::Int(1));
            acc = Some(match acc {
                None => PrimExpr::mul(base, PrimExpr::Int(coef)),
                Some(prev) if coef < 0 => {
                    PrimExpr::sub(prev, PrimExpr::mul(base, PrimExpr::Int(-coef)))
                }
                Some(prev) => PrimExpr::add(prev, PrimExpr::mul(base, PrimExpr::Int(coef))),
            });
        }
        match acc {
            None => PrimExpr::Int(constant),
            Some(e) if constant < 0 => PrimExpr::sub(e, PrimExpr::Int(-constant)),
            Some(e) => PrimExpr::add(e, PrimExpr::Int(constant)),
        }
    }
}

// ── Analyzer ────────────────────────────────────────────────────────────────

/// Symbolic-equality oracle over dimension expressions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Analyzer;

impl Analyzer {
    pub fn new() -> Self {
        Analyzer
    }

    /// True only when `a - b` canonicalizes to zero.
    pub fn can_prove_equal(&self, a: &PrimExpr, b: &PrimExpr) -> bool {
        a == b || self.diff(a, b).as_const() == Some(0)
    }

    /// True only when `a - b` canonicalizes to a non-zero constant.
    pub fn can_prove_not_equal(&self, a: &PrimExpr, b: &PrimExpr) -> bool {
        matches!(self.diff(a, b).as_const(), Some(c) if c != 0)
    }

    /// Literal value of `e` if it folds to a constant.
    pub fn as_const_int(&self, e: &PrimExpr) -> Option<i64> {
        e.as_int().or_else(|| canonical(e).as_const())
    }

    /// Canonical rewrite of `e`.
    pub fn simplify(&self, e: &PrimExpr) -> PrimExpr {
        canonical(e).to_expr()
    }

    fn diff(&self, a: &PrimExpr, b: &PrimExpr) -> Poly {
        canonical(&PrimExpr::Sub(Box::new(a.clone()), Box::new(b.clone())))
    }
}

fn canonical(e: &PrimExpr) -> Poly {
    try_canonical(e).unwrap_or_else(|| Poly::atom(Atom::Opaque(e.clone())))
}

fn try_canonical(e: &PrimExpr) -> Option<Poly> {
    match e {
        PrimExpr::Int(v) => Some(Poly::constant(*v)),
        PrimExpr::Var(name) => Some(Poly::atom(Atom::Var(name.clone()))),
        PrimExpr::Add(a, b) => canonical(a).checked_add(&canonical(b)),
        PrimExpr::Sub(a, b) => canonical(a).checked_add(&canonical(b).checked_scale(-1)?),
        PrimExpr::Mul(a, b) => canonical(a).checked_mul(&canonical(b)),
        PrimExpr::FloorDiv(a, b) => {
            let (pa, pb) = (canonical(a), canonical(b));
            match (pa.as_const(), pb.as_const()) {
                (_, Some(0)) => Some(opaque_div(&pa, &pb)),
                (Some(x), Some(y)) => Some(
                    floor_div(x, y)
                        .map(Poly::constant)
                        .unwrap_or_else(|| opaque_div(&pa, &pb)),
                ),
                (_, Some(k)) => Some(pa.exact_div(k).unwrap_or_else(|| opaque_div(&pa, &pb))),
                _ if pa == pb => Some(Poly::constant(1)),
                _ => Some(opaque_div(&pa, &pb)),
            }
        }
        PrimExpr::FloorMod(a, b) => {
            let (pa, pb) = (canonical(a), canonical(b));
            match (pa.as_const(), pb.as_const()) {
                (_, Some(0)) => Some(opaque_mod(&pa, &pb)),
                (Some(x), Some(y)) => Some(
                    floor_mod(x, y)
                        .map(Poly::constant)
                        .unwrap_or_else(|| opaque_mod(&pa, &pb)),
                ),
                (_, Some(k)) if pa.exact_div(k).is_some() => Some(Poly::constant(0)),
                _ if pa == pb => Some(Poly::constant(0)),
                _ => Some(opaque_mod(&pa, &pb)),
            }
        }
    }
}

fn opaque_div(a: &Poly, b: &Poly) -> Poly {
    Poly::atom(Atom::Opaque(PrimExpr::FloorDiv(
        Box::new(a.to_expr()),
        Box::new(b.to_expr()),
    )))
}

fn opaque_mod(a: &Poly, b: &Poly) -> Poly {
    Poly::atom(Atom::Opaque(PrimExpr::FloorMod(
        Box::new(a.to_expr()),
        Box::new(b.to_expr()),
    )))
}
