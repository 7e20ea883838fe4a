/// AST definitions for the dice language
///
/// The expression type is a closed sum; everything the surface syntax admits
/// beyond it (`->`, `<->`, `^`, `<=`, `>=`, `>`, `!=`) is unfolded into the
/// core connectives by the constructor helpers below, so the evaluator and
/// the compiler only ever dispatch on the core variants.

use crate::core::value::Value;

// ---------------------------------------------------------------------------
// Type tags
// ---------------------------------------------------------------------------

/// Surface-language type annotations: `bool`, `int(w)`, `(T, T)`, `list(T)`.
/// Carried by function parameters and by list expressions, where the empty
/// list needs an explicit element kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Bool,
    Int(u32),
    Tuple(Box<TypeTag>, Box<TypeTag>),
    List(Box<TypeTag>),
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Lit(Value),
    Ident(String),

    // Random draws
    Flip(f64),
    Discrete(Vec<f64>),
    Uniform { width: u32, lo: u64, hi: u64 },
    Binomial { width: u32, n: u64, p: f64 },

    // Binding and control
    Let {
        name: String,
        bound: Box<Expr>,
        body: Box<Expr>,
    },
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },

    // Boolean connectives
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),

    // Comparisons
    Eq(Box<Expr>, Box<Expr>),
    Lt(Box<Expr>, Box<Expr>),

    // Width-preserving modular arithmetic
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Shl(Box<Expr>, u32),
    Shr(Box<Expr>, u32),
    NthBit(Box<Expr>, Box<Expr>),

    // Products and lists
    Tuple(Box<Expr>, Box<Expr>),
    Fst(Box<Expr>),
    Snd(Box<Expr>),
    List { items: Vec<Expr>, elem: TypeTag },
    Cons(Box<Expr>, Box<Expr>),
    Head(Box<Expr>),
    Tail(Box<Expr>),
    Length(Box<Expr>),

    // Functions and conditioning
    Call { name: String, args: Vec<Expr> },
    Observe(Box<Expr>),
}

impl Expr {
    // ── Literals and identifiers ─────────────────────────────────────────

    pub fn lit(value: Value) -> Expr {
        Expr::Lit(value)
    }

    pub fn truth(b: bool) -> Expr {
        Expr::Lit(Value::Bool(b))
    }

    /// An `int(w, n)` literal. `n` is wrapped modulo `2^w` when the literal
    /// is evaluated; an invalid width surfaces as a range error then.
    pub fn int(width: u32, value: u64) -> Expr {
        Expr::Lit(Value::Int { width, value })
    }

    pub fn ident(name: impl Into<String>) -> Expr {
        Expr::Ident(name.into())
    }

    // ── Random draws ─────────────────────────────────────────────────────

    pub fn flip(p: f64) -> Expr {
        Expr::Flip(p)
    }

    pub fn discrete(weights: impl Into<Vec<f64>>) -> Expr {
        Expr::Discrete(weights.into())
    }

    pub fn uniform(width: u32, lo: u64, hi: u64) -> Expr {
        Expr::Uniform { width, lo, hi }
    }

    pub fn binomial(width: u32, n: u64, p: f64) -> Expr {
        Expr::Binomial { width, n, p }
    }

    // ── Binding and control ──────────────────────────────────────────────

    pub fn let_in(name: impl Into<String>, bound: Expr, body: Expr) -> Expr {
        Expr::Let {
            name: name.into(),
            bound: Box::new(bound),
            body: Box::new(body),
        }
    }

    pub fn ite(cond: Expr, then: Expr, otherwise: Expr) -> Expr {
        Expr::If {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    // ── Core connectives and operators ───────────────────────────────────

    pub fn not(e: Expr) -> Expr {
        Expr::Not(Box::new(e))
    }

    pub fn and(l: Expr, r: Expr) -> Expr {
        Expr::And(Box::new(l), Box::new(r))
    }

    pub fn or(l: Expr, r: Expr) -> Expr {
        Expr::Or(Box::new(l), Box::new(r))
    }

    pub fn eq(l: Expr, r: Expr) -> Expr {
        Expr::Eq(Box::new(l), Box::new(r))
    }

    pub fn lt(l: Expr, r: Expr) -> Expr {
        Expr::Lt(Box::new(l), Box::new(r))
    }

    pub fn add(l: Expr, r: Expr) -> Expr {
        Expr::Add(Box::new(l), Box::new(r))
    }

    pub fn sub(l: Expr, r: Expr) -> Expr {
        Expr::Sub(Box::new(l), Box::new(r))
    }

    pub fn mul(l: Expr, r: Expr) -> Expr {
        Expr::Mul(Box::new(l), Box::new(r))
    }

    pub fn div(l: Expr, r: Expr) -> Expr {
        Expr::Div(Box::new(l), Box::new(r))
    }

    pub fn shl(e: Expr, k: u32) -> Expr {
        Expr::Shl(Box::new(e), k)
    }

    pub fn shr(e: Expr, k: u32) -> Expr {
        Expr::Shr(Box::new(e), k)
    }

    pub fn nth_bit(index: Expr, e: Expr) -> Expr {
        Expr::NthBit(Box::new(index), Box::new(e))
    }

    // ── Products and lists ───────────────────────────────────────────────

    pub fn tuple(l: Expr, r: Expr) -> Expr {
        Expr::Tuple(Box::new(l), Box::new(r))
    }

    pub fn fst(e: Expr) -> Expr {
        Expr::Fst(Box::new(e))
    }

    pub fn snd(e: Expr) -> Expr {
        Expr::Snd(Box::new(e))
    }

    pub fn list(items: impl Into<Vec<Expr>>, elem: TypeTag) -> Expr {
        Expr::List {
            items: items.into(),
            elem,
        }
    }

    pub fn cons(head: Expr, tail: Expr) -> Expr {
        Expr::Cons(Box::new(head), Box::new(tail))
    }

    pub fn head(e: Expr) -> Expr {
        Expr::Head(Box::new(e))
    }

    pub fn tail(e: Expr) -> Expr {
        Expr::Tail(Box::new(e))
    }

    pub fn length(e: Expr) -> Expr {
        Expr::Length(Box::new(e))
    }

    // ── Functions and conditioning ───────────────────────────────────────

    pub fn call(name: impl Into<String>, args: impl Into<Vec<Expr>>) -> Expr {
        Expr::Call {
            name: name.into(),
            args: args.into(),
        }
    }

    pub fn observe(e: Expr) -> Expr {
        Expr::Observe(Box::new(e))
    }

    // ── Sugar, unfolded at construction ──────────────────────────────────

    /// `a -> b`, unfolded to `!a || b`.
    pub fn implies(a: Expr, b: Expr) -> Expr {
        Expr::or(Expr::not(a), b)
    }

    /// `a <-> b`, unfolded to `(!a || b) && (!b || a)`. The operands are
    /// duplicated structurally, so probabilistic sub-expressions draw
    /// independently on each side.
    pub fn iff(a: Expr, b: Expr) -> Expr {
        Expr::and(
            Expr::or(Expr::not(a.clone()), b.clone()),
            Expr::or(Expr::not(b), a),
        )
    }

    /// `a ^ b`, unfolded to `(a || b) && !(a && b)`. Duplicates like `iff`.
    pub fn xor(a: Expr, b: Expr) -> Expr {
        Expr::and(
            Expr::or(a.clone(), b.clone()),
            Expr::not(Expr::and(a, b)),
        )
    }

    /// `a <= b`, unfolded to `!(b < a)`.
    pub fn leq(a: Expr, b: Expr) -> Expr {
        Expr::not(Expr::lt(b, a))
    }

    /// `a >= b`, unfolded to `!(a < b)`.
    pub fn geq(a: Expr, b: Expr) -> Expr {
        Expr::not(Expr::lt(a, b))
    }

    /// `a > b`, unfolded to `b < a`.
    pub fn gt(a: Expr, b: Expr) -> Expr {
        Expr::lt(b, a)
    }

    /// `a != b`, unfolded to `!(a == b)`.
    pub fn neq(a: Expr, b: Expr) -> Expr {
        Expr::not(Expr::eq(a, b))
    }

    /// Short construct name, used in error messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Expr::Lit(Value::Bool(_)) => "boolean literal",
            Expr::Lit(Value::Int { .. }) => "integer literal",
            Expr::Lit(Value::Tuple(_, _)) => "tuple literal",
            Expr::Lit(Value::List { .. }) => "list literal",
            Expr::Ident(_) => "identifier",
            Expr::Flip(_) => "flip",
            Expr::Discrete(_) => "discrete",
            Expr::Uniform { .. } => "uniform",
            Expr::Binomial { .. } => "binomial",
            Expr::Let { .. } => "let binding",
            Expr::If { .. } => "conditional",
            Expr::Not(_) => "negation",
            Expr::And(_, _) => "conjunction",
            Expr::Or(_, _) => "disjunction",
            Expr::Eq(_, _) => "equality",
            Expr::Lt(_, _) => "comparison",
            Expr::Add(_, _) => "addition",
            Expr::Sub(_, _) => "subtraction",
            Expr::Mul(_, _) => "multiplication",
            Expr::Div(_, _) => "division",
            Expr::Shl(_, _) => "left shift",
            Expr::Shr(_, _) => "right shift",
            Expr::NthBit(_, _) => "nth_bit",
            Expr::Tuple(_, _) => "tuple",
            Expr::Fst(_) => "fst",
            Expr::Snd(_) => "snd",
            Expr::List { .. } => "list",
            Expr::Cons(_, _) => "cons",
            Expr::Head(_) => "head",
            Expr::Tail(_) => "tail",
            Expr::Length(_) => "length",
            Expr::Call { .. } => "function call",
            Expr::Observe(_) => "observe",
        }
    }
}

// ---------------------------------------------------------------------------
// Functions and programs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<(String, TypeTag)>,
    pub body: Expr,
}

impl Function {
    pub fn new(
        name: impl Into<String>,
        params: impl Into<Vec<(String, TypeTag)>>,
        body: Expr,
    ) -> Function {
        Function {
            name: name.into(),
            params: params.into(),
            body,
        }
    }
}

/// A program is the list of top-level functions plus the body expression
/// whose posterior distribution is the inference result.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub functions: Vec<Function>,
    pub body: Expr,
}

impl Program {
    pub fn new(functions: impl Into<Vec<Function>>, body: Expr) -> Program {
        Program {
            functions: functions.into(),
            body,
        }
    }

    /// A program with no function definitions.
    pub fn from_body(body: Expr) -> Program {
        Program {
            functions: Vec::new(),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sugar_unfolds_to_core() {
        let e = Expr::implies(Expr::ident("a"), Expr::ident("b"));
        assert_eq!(
            e,
            Expr::or(Expr::not(Expr::ident("a")), Expr::ident("b"))
        );

        let e = Expr::gt(Expr::ident("a"), Expr::ident("b"));
        assert_eq!(e, Expr::lt(Expr::ident("b"), Expr::ident("a")));

        let e = Expr::neq(Expr::int(2, 1), Expr::int(2, 2));
        assert_eq!(e, Expr::not(Expr::eq(Expr::int(2, 1), Expr::int(2, 2))));
    }

    #[test]
    fn test_iff_duplicates_operands() {
        let e = Expr::iff(Expr::ident("a"), Expr::ident("b"));
        match e {
            Expr::And(l, r) => {
                assert!(matches!(*l, Expr::Or(_, _)));
                assert!(matches!(*r, Expr::Or(_, _)));
            }
            other => panic!("expected And at the root, got {:?}", other),
        }
    }
}
