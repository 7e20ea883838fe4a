/// Symbolic compilation back-end
///
/// Lowers every boolean-valued expression to a pair `(value, observation)`
/// of formulas over Bernoulli atoms, then computes the exact posterior by
/// weighted model counting: `P(body | obs) = P(body ∧ obs) / P(obs)`.
///
/// Functions are pre-compiled in callee-before-caller order to the
/// satisfying assignments of their body formulas, with formal parameters as
/// placeholder atoms. A call site substitutes argument formulas for the
/// placeholders and renames every internal flip to a fresh atom of the same
/// probability, one consistent renaming per call site. Sibling calls
/// therefore draw independently while each body keeps its internal
/// correlations.
///
/// The symbolic fragment is the boolean core: literals, flips, connectives,
/// boolean equality, conditionals, bindings, observations and calls.
/// Integer, tuple and list constructs are rejected with a type error; the
/// sampling back-end covers them.

use crate::ast::{Expr, Function, Program};
use crate::core::value::Value;
use crate::dist::check_probability;
use crate::errors::{DiceError, Result};
use crate::formula::{Assignment, AtomId, AtomTable, Formula};
use crate::funcs::FunctionTable;
use log::debug;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::rc::Rc;

/// The `(value, observation)` formula pair every lowering step produces.
type Lowered = (Rc<Formula>, Rc<Formula>);

// ---------------------------------------------------------------------------
// Scope — formula bindings, captured by shared reference
// ---------------------------------------------------------------------------

/// Same frame discipline as the sampler's environment, but binding names to
/// formulas. Capturing the bound formula (rather than re-lowering the bound
/// expression) is what makes two uses of one identifier share their atoms.
struct Scope {
    frames: Vec<HashMap<String, Rc<Formula>>>,
}

impl Scope {
    fn new() -> Scope {
        Scope {
            frames: vec![HashMap::new()],
        }
    }

    fn push_frame(&mut self) {
        self.frames.push(HashMap::new());
    }

    fn pop_frame(&mut self) {
        self.frames.pop();
    }

    fn get(&self, name: &str) -> Option<&Rc<Formula>> {
        for frame in self.frames.iter().rev() {
            if let Some(f) = frame.get(name) {
                return Some(f);
            }
        }
        None
    }

    fn define(&mut self, name: String, formula: Rc<Formula>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name, formula);
        }
    }
}

// ---------------------------------------------------------------------------
// Compiler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct CompiledFunction {
    params: Vec<AtomId>,
    value_rows: Vec<Assignment>,
    observe_rows: Vec<Assignment>,
}

#[derive(Default)]
pub struct Compiler {
    atoms: AtomTable,
    compiled: HashMap<String, CompiledFunction>,
}

impl Compiler {
    pub fn new() -> Compiler {
        Compiler::default()
    }

    /// Exact inference over the program body.
    pub fn infer(&mut self, program: &Program) -> Result<HashMap<Value, f64>> {
        let funcs = FunctionTable::new(&program.functions)?;
        for func in funcs.compile_order()? {
            self.compile_function(func)?;
        }

        let mut scope = Scope::new();
        let (value, observe) = self.lower(&program.body, &mut scope)?;
        debug!(
            "lowered program body over {} atoms: value {}, observe {}",
            self.atoms.len(),
            value,
            observe
        );

        let p_observe = self.probability(&observe)?;
        if p_observe == 0.0 {
            return Err(DiceError::InfeasibleObservation);
        }
        let joint = Formula::and(&value, &observe);
        let p_true = self.probability(&joint)? / p_observe;

        let mut result = HashMap::new();
        result.insert(Value::Bool(true), p_true);
        result.insert(Value::Bool(false), 1.0 - p_true);
        Ok(result)
    }

    /// Lowers a function body with its parameters bound to placeholder
    /// atoms and stores the satisfying assignments of both formulas.
    fn compile_function(&mut self, func: &Function) -> Result<()> {
        let mut scope = Scope::new();
        let mut params = Vec::with_capacity(func.params.len());
        for (param, _tag) in &func.params {
            let id = self.atoms.fresh_param(&func.name, param);
            scope.define(param.clone(), Formula::var(id));
            params.push(id);
        }

        let (value, observe) = self.lower(&func.body, &mut scope)?;
        let value_rows = value.satisfying_assignments();
        let observe_rows = observe.satisfying_assignments();
        debug!(
            "compiled '{}': {} value rows, {} observation rows",
            func.name,
            value_rows.len(),
            observe_rows.len()
        );

        self.compiled.insert(
            func.name.clone(),
            CompiledFunction {
                params,
                value_rows,
                observe_rows,
            },
        );
        Ok(())
    }

    fn lower(&mut self, expr: &Expr, scope: &mut Scope) -> Result<Lowered> {
        match expr {
            Expr::Lit(Value::Bool(b)) => Ok((Formula::truth(*b), Formula::truth(true))),
            Expr::Ident(name) => match scope.get(name) {
                Some(f) => Ok((Rc::clone(f), Formula::truth(true))),
                None => Err(DiceError::unbound(name.clone())),
            },
            Expr::Flip(p) => {
                check_probability(*p)?;
                Ok((Formula::var(self.atoms.fresh_flip(*p)), Formula::truth(true)))
            }

            Expr::Not(e) => {
                let (v, o) = self.lower(e, scope)?;
                Ok((Formula::not(&v), o))
            }
            Expr::And(l, r) => {
                let (lv, lo) = self.lower(l, scope)?;
                let (rv, ro) = self.lower(r, scope)?;
                Ok((Formula::and(&lv, &rv), Formula::and(&lo, &ro)))
            }
            Expr::Or(l, r) => {
                // Observations on either side must hold regardless of which
                // disjunct carries the value.
                let (lv, lo) = self.lower(l, scope)?;
                let (rv, ro) = self.lower(r, scope)?;
                Ok((Formula::or(&lv, &rv), Formula::and(&lo, &ro)))
            }
            Expr::Eq(l, r) => {
                let (lv, lo) = self.lower(l, scope)?;
                let (rv, ro) = self.lower(r, scope)?;
                Ok((Formula::iff(&lv, &rv), Formula::and(&lo, &ro)))
            }

            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                let (cv, co) = self.lower(cond, scope)?;
                let (tv, to) = self.lower(then, scope)?;
                let (ev, eo) = self.lower(otherwise, scope)?;
                let value = Formula::or(
                    &Formula::and(&cv, &tv),
                    &Formula::and(&Formula::not(&cv), &ev),
                );
                // The taken branch's observations apply, and the condition's
                // own observations always do.
                let branch_obs = Formula::or(
                    &Formula::and(&cv, &to),
                    &Formula::and(&Formula::not(&cv), &eo),
                );
                Ok((value, Formula::and(&co, &branch_obs)))
            }

            Expr::Let { name, bound, body } => {
                let (bound_v, bound_o) = self.lower(bound, scope)?;
                scope.push_frame();
                scope.define(name.clone(), bound_v);
                let lowered_body = self.lower(body, scope);
                scope.pop_frame();
                let (body_v, body_o) = lowered_body?;
                Ok((body_v, Formula::and(&bound_o, &body_o)))
            }

            Expr::Observe(e) => {
                let (v, o) = self.lower(e, scope)?;
                Ok((Formula::truth(true), Formula::and(&v, &o)))
            }

            Expr::Call { name, args } => self.lower_call(name, args, scope),

            other => Err(DiceError::type_kind("boolean expression", other.describe())),
        }
    }

    fn lower_call(&mut self, name: &str, args: &[Expr], scope: &mut Scope) -> Result<Lowered> {
        let mut lowered_args = Vec::with_capacity(args.len());
        for arg in args {
            lowered_args.push(self.lower(arg, scope)?);
        }

        let compiled = self
            .compiled
            .get(name)
            .cloned()
            .ok_or_else(|| DiceError::unbound(name))?;
        if lowered_args.len() != compiled.params.len() {
            return Err(DiceError::Arity {
                function: name.to_string(),
                expected: compiled.params.len(),
                found: lowered_args.len(),
            });
        }

        let param_index: HashMap<AtomId, usize> = compiled
            .params
            .iter()
            .enumerate()
            .map(|(i, &atom)| (atom, i))
            .collect();

        // One renaming map per call site, shared between the value and the
        // observation rows so both refer to the same inlined flips.
        let mut renamed: HashMap<AtomId, Rc<Formula>> = HashMap::new();
        let value = self.translate_rows(
            &compiled.value_rows,
            &param_index,
            &lowered_args,
            &mut renamed,
        );
        let observe_clauses = self.translate_rows(
            &compiled.observe_rows,
            &param_index,
            &lowered_args,
            &mut renamed,
        );

        let mut observe = observe_clauses;
        for (_, arg_observe) in &lowered_args {
            observe = Formula::and(arg_observe, &observe);
        }
        Ok((value, observe))
    }

    /// Disjunction over the translated rows. In each row a parameter
    /// placeholder becomes the matching argument's value formula (negated
    /// when the row assigns it 0); any other atom is an internal flip of the
    /// callee and maps to its call-site-fresh copy.
    fn translate_rows(
        &mut self,
        rows: &[Assignment],
        param_index: &HashMap<AtomId, usize>,
        args: &[Lowered],
        renamed: &mut HashMap<AtomId, Rc<Formula>>,
    ) -> Rc<Formula> {
        let mut clauses = Formula::truth(false);
        for row in rows {
            let mut clause = Formula::truth(true);
            for &(atom, set) in row {
                let literal = if let Some(&i) = param_index.get(&atom) {
                    Rc::clone(&args[i].0)
                } else {
                    match renamed.entry(atom) {
                        Entry::Occupied(entry) => Rc::clone(entry.get()),
                        Entry::Vacant(slot) => {
                            let fresh = Formula::var(self.atoms.freshen(atom));
                            Rc::clone(slot.insert(fresh))
                        }
                    }
                };
                let literal = if set { literal } else { Formula::not(&literal) };
                clause = Formula::and(&clause, &literal);
            }
            clauses = Formula::or(&clauses, &clause);
        }
        clauses
    }

    /// Weighted model count: Σ over satisfying assignments of Π `p` / `1-p`.
    fn probability(&self, f: &Rc<Formula>) -> Result<f64> {
        let mut total = 0.0;
        for row in f.satisfying_assignments() {
            let mut weight = 1.0;
            for (atom, set) in row {
                weight *= self.atoms.weight(atom, set)?;
            }
            total += weight;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;

    fn exact(program: &Program) -> HashMap<Value, f64> {
        Compiler::new().infer(program).unwrap()
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_flip_marginal() {
        let program = Program::from_body(Expr::flip(0.33));
        let result = exact(&program);
        assert_close(result[&Value::Bool(true)], 0.33);
        assert_close(result[&Value::Bool(false)], 0.67);
    }

    #[test]
    fn test_shared_binding_correlates() {
        // let x = flip 0.5 in x == x is certainly true.
        let program = Program::from_body(Expr::let_in(
            "x",
            Expr::flip(0.5),
            Expr::eq(Expr::ident("x"), Expr::ident("x")),
        ));
        assert_close(exact(&program)[&Value::Bool(true)], 1.0);
    }

    #[test]
    fn test_sibling_calls_are_independent() {
        // fun g() { flip 0.5 }  g() && g() has probability 0.25, not 0.5.
        let g = Function::new("g", Vec::new(), Expr::flip(0.5));
        let program = Program::new(
            vec![g],
            Expr::and(Expr::call("g", Vec::new()), Expr::call("g", Vec::new())),
        );
        assert_close(exact(&program)[&Value::Bool(true)], 0.25);
    }

    #[test]
    fn test_observation_conditions_the_posterior() {
        // let x = flip 0.5 in let _ = observe x in x
        let program = Program::from_body(Expr::let_in(
            "x",
            Expr::flip(0.5),
            Expr::let_in(
                "tmp",
                Expr::observe(Expr::ident("x")),
                Expr::ident("x"),
            ),
        ));
        assert_close(exact(&program)[&Value::Bool(true)], 1.0);
    }

    #[test]
    fn test_infeasible_observation() {
        let program = Program::from_body(Expr::let_in(
            "tmp",
            Expr::observe(Expr::truth(false)),
            Expr::flip(0.5),
        ));
        assert_eq!(
            Compiler::new().infer(&program),
            Err(DiceError::InfeasibleObservation)
        );
    }

    #[test]
    fn test_integer_constructs_are_outside_the_fragment() {
        let program = Program::from_body(Expr::eq(Expr::int(2, 1), Expr::int(2, 1)));
        assert!(matches!(
            Compiler::new().infer(&program),
            Err(DiceError::TypeKind { .. })
        ));
    }

    #[test]
    fn test_recursion_rejected() {
        let f = Function::new(
            "f",
            Vec::new(),
            Expr::ite(Expr::flip(0.5), Expr::truth(true), Expr::call("f", Vec::new())),
        );
        let program = Program::new(vec![f], Expr::call("f", Vec::new()));
        assert!(matches!(
            Compiler::new().infer(&program),
            Err(DiceError::RecursionDetected { .. })
        ));
    }
}
