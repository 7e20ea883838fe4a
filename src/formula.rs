/// Boolean formulas over Bernoulli atoms
///
/// The symbolic back-end represents every boolean program expression as a
/// formula over atoms drawn from a compiler-owned pool. Each atom is either
/// a flip with a recorded probability or a function-parameter placeholder
/// awaiting substitution at a call site. Formula nodes are shared through
/// `Rc` so that a let-bound expression reused under several names keeps the
/// exact same atoms.

use crate::errors::{DiceError, Result};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;

pub type AtomId = usize;

/// A total assignment over a formula's support, sorted by atom id.
pub type Assignment = Vec<(AtomId, bool)>;

// ---------------------------------------------------------------------------
// Atom pool
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AtomKind {
    /// A Bernoulli draw with its success probability.
    Flip(f64),
    /// A formal-parameter placeholder; it has no probability of its own and
    /// must be substituted away before model counting.
    Param,
}

#[derive(Debug, Clone)]
pub struct AtomInfo {
    pub name: String,
    pub kind: AtomKind,
}

/// Allocates atoms from a single monotonically increasing counter, so no
/// name is ever reused within one compilation.
#[derive(Debug, Default)]
pub struct AtomTable {
    atoms: Vec<AtomInfo>,
}

impl AtomTable {
    pub fn new() -> AtomTable {
        AtomTable::default()
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn fresh_flip(&mut self, prob: f64) -> AtomId {
        let id = self.atoms.len();
        self.atoms.push(AtomInfo {
            name: format!("f{}", id),
            kind: AtomKind::Flip(prob),
        });
        id
    }

    pub fn fresh_param(&mut self, function: &str, param: &str) -> AtomId {
        let id = self.atoms.len();
        self.atoms.push(AtomInfo {
            name: format!("{}.{}", function, param),
            kind: AtomKind::Param,
        });
        id
    }

    /// A new atom with the same probability as `id`. Used when inlining a
    /// function body at a call site: every internal flip of the callee is
    /// renamed so sibling calls draw independently.
    pub fn freshen(&mut self, id: AtomId) -> AtomId {
        let kind = self.atoms[id].kind;
        let fresh = self.atoms.len();
        self.atoms.push(AtomInfo {
            name: format!("f{}", fresh),
            kind,
        });
        fresh
    }

    pub fn name(&self, id: AtomId) -> &str {
        &self.atoms[id].name
    }

    /// Weight of one literal in a model: `p` when the atom is set, `1 - p`
    /// when clear. Placeholders reaching model counting are a compiler
    /// invariant breach and reported as an unbound name.
    pub fn weight(&self, id: AtomId, set: bool) -> Result<f64> {
        match self.atoms[id].kind {
            AtomKind::Flip(p) => Ok(if set { p } else { 1.0 - p }),
            AtomKind::Param => Err(DiceError::unbound(self.atoms[id].name.clone())),
        }
    }
}

// ---------------------------------------------------------------------------
// Formulas
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    True,
    False,
    Var(AtomId),
    Not(Rc<Formula>),
    And(Rc<Formula>, Rc<Formula>),
    Or(Rc<Formula>, Rc<Formula>),
}

impl Formula {
    pub fn truth(b: bool) -> Rc<Formula> {
        Rc::new(if b { Formula::True } else { Formula::False })
    }

    pub fn var(id: AtomId) -> Rc<Formula> {
        Rc::new(Formula::Var(id))
    }

    // Constructors fold constants so that enumeration supports stay small.

    pub fn not(f: &Rc<Formula>) -> Rc<Formula> {
        match f.as_ref() {
            Formula::True => Formula::truth(false),
            Formula::False => Formula::truth(true),
            Formula::Not(inner) => Rc::clone(inner),
            _ => Rc::new(Formula::Not(Rc::clone(f))),
        }
    }

    pub fn and(l: &Rc<Formula>, r: &Rc<Formula>) -> Rc<Formula> {
        match (l.as_ref(), r.as_ref()) {
            (Formula::False, _) | (_, Formula::False) => Formula::truth(false),
            (Formula::True, _) => Rc::clone(r),
            (_, Formula::True) => Rc::clone(l),
            _ => Rc::new(Formula::And(Rc::clone(l), Rc::clone(r))),
        }
    }

    pub fn or(l: &Rc<Formula>, r: &Rc<Formula>) -> Rc<Formula> {
        match (l.as_ref(), r.as_ref()) {
            (Formula::True, _) | (_, Formula::True) => Formula::truth(true),
            (Formula::False, _) => Rc::clone(r),
            (_, Formula::False) => Rc::clone(l),
            _ => Rc::new(Formula::Or(Rc::clone(l), Rc::clone(r))),
        }
    }

    /// `l <-> r` over already-built formulas (no operand duplication).
    pub fn iff(l: &Rc<Formula>, r: &Rc<Formula>) -> Rc<Formula> {
        Formula::or(
            &Formula::and(l, r),
            &Formula::and(&Formula::not(l), &Formula::not(r)),
        )
    }

    /// The set of atoms appearing in the formula.
    pub fn support(&self) -> BTreeSet<AtomId> {
        let mut out = BTreeSet::new();
        self.collect_support(&mut out);
        out
    }

    fn collect_support(&self, out: &mut BTreeSet<AtomId>) {
        match self {
            Formula::True | Formula::False => {}
            Formula::Var(id) => {
                out.insert(*id);
            }
            Formula::Not(inner) => inner.collect_support(out),
            Formula::And(l, r) | Formula::Or(l, r) => {
                l.collect_support(out);
                r.collect_support(out);
            }
        }
    }

    pub fn eval(&self, assignment: &HashMap<AtomId, bool>) -> bool {
        match self {
            Formula::True => true,
            Formula::False => false,
            Formula::Var(id) => assignment.get(id).copied().unwrap_or(false),
            Formula::Not(inner) => !inner.eval(assignment),
            Formula::And(l, r) => l.eval(assignment) && r.eval(assignment),
            Formula::Or(l, r) => l.eval(assignment) || r.eval(assignment),
        }
    }

    /// Every total assignment over the formula's own support that satisfies
    /// it. `True` has exactly one satisfying assignment (the empty one) and
    /// `False` has none; both matter to the call-site inliner.
    pub fn satisfying_assignments(&self) -> Vec<Assignment> {
        let support: Vec<AtomId> = self.support().into_iter().collect();
        let mut rows = Vec::new();
        let mut current = HashMap::with_capacity(support.len());
        for bits in 0u64..(1u64 << support.len()) {
            current.clear();
            for (pos, &atom) in support.iter().enumerate() {
                current.insert(atom, (bits >> pos) & 1 == 1);
            }
            if self.eval(&current) {
                rows.push(
                    support
                        .iter()
                        .map(|&atom| (atom, current[&atom]))
                        .collect(),
                );
            }
        }
        rows
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::True => write!(f, "T"),
            Formula::False => write!(f, "F"),
            Formula::Var(id) => write!(f, "x{}", id),
            Formula::Not(inner) => write!(f, "!{}", inner),
            Formula::And(l, r) => write!(f, "({} & {})", l, r),
            Formula::Or(l, r) => write!(f, "({} | {})", l, r),
        }
    }
}
