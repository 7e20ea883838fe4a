/// Monte Carlo sampling back-end
///
/// Executes the AST once per trial under a seeded RNG, tracking a per-trial
/// observation flag. A failed `observe` never aborts the trial; evaluation
/// continues and the trial is simply discarded when counts are aggregated,
/// so lexically later observations and bindings still run. Aggregation over
/// N trials normalises outcome counts by the number of surviving trials.
///
/// Trials are independent, which makes the run embarrassingly parallel:
/// `run_parallel` splits the iteration count across rayon workers, each with
/// a sub-RNG derived from the run seed, and merges the counters.

use crate::ast::{Expr, Program};
use crate::core::value::{Value, LENGTH_WIDTH};
use crate::dist::{self, DiscreteTable};
use crate::errors::{DiceError, Result};
use crate::funcs::FunctionTable;
use log::trace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Env — flat-stack lexical scope
// ---------------------------------------------------------------------------

/// Each entry is one scope frame; index 0 is the outermost, the last is the
/// innermost. Lookup scans innermost-out, so `let` shadowing falls out of
/// frame order.
struct Env {
    frames: Vec<HashMap<String, Value>>,
}

impl Env {
    fn new(globals: HashMap<String, Value>) -> Env {
        Env {
            frames: vec![globals],
        }
    }

    fn push_frame(&mut self) {
        self.frames.push(HashMap::new());
    }

    fn pop_frame(&mut self) {
        self.frames.pop();
    }

    fn get(&self, name: &str) -> Option<&Value> {
        for frame in self.frames.iter().rev() {
            if let Some(v) = frame.get(name) {
                return Some(v);
            }
        }
        None
    }

    fn define(&mut self, name: String, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name, value);
        }
    }
}

// ---------------------------------------------------------------------------
// Trial evaluator
// ---------------------------------------------------------------------------

struct Trial<'a, R: Rng> {
    env: Env,
    funcs: &'a FunctionTable,
    rng: &'a mut R,
    observe_ok: bool,
}

impl<'a, R: Rng> Trial<'a, R> {
    fn eval(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Lit(v) => v.clone().normalized(),
            Expr::Ident(name) => self
                .env
                .get(name)
                .cloned()
                .ok_or_else(|| DiceError::unbound(name.clone())),

            Expr::Flip(p) => Ok(Value::Bool(dist::sample_flip(self.rng, *p)?)),
            Expr::Discrete(weights) => {
                let table = DiscreteTable::new(weights)?;
                let outcome = table.sample(self.rng);
                Value::int(table.bit_width, outcome)
            }
            Expr::Uniform { width, lo, hi } => {
                let v = dist::sample_uniform(self.rng, *width, *lo, *hi)?;
                Value::int(*width, v)
            }
            Expr::Binomial { width, n, p } => {
                let successes = dist::sample_binomial(self.rng, *n, *p)?;
                Value::int(*width, successes)
            }

            Expr::Let { name, bound, body } => {
                let bound_value = self.eval(bound)?;
                self.env.push_frame();
                self.env.define(name.clone(), bound_value);
                let result = self.eval(body);
                self.env.pop_frame();
                result
            }
            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                // Only the chosen branch runs, so draws and observations on
                // the untaken side never happen.
                if self.eval(cond)?.as_bool()? {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }

            Expr::Not(e) => Ok(Value::Bool(!self.eval(e)?.as_bool()?)),
            Expr::And(l, r) => {
                let l = self.eval(l)?.as_bool()?;
                let r = self.eval(r)?.as_bool()?;
                Ok(Value::Bool(l && r))
            }
            Expr::Or(l, r) => {
                let l = self.eval(l)?.as_bool()?;
                let r = self.eval(r)?.as_bool()?;
                Ok(Value::Bool(l || r))
            }

            Expr::Eq(l, r) => {
                let l = self.eval(l)?;
                let r = self.eval(r)?;
                Ok(l.value_eq(&r))
            }
            Expr::Lt(l, r) => self.eval(l)?.lt(&self.eval(r)?),
            Expr::Add(l, r) => self.eval(l)?.add(&self.eval(r)?),
            Expr::Sub(l, r) => self.eval(l)?.sub(&self.eval(r)?),
            Expr::Mul(l, r) => self.eval(l)?.mul(&self.eval(r)?),
            Expr::Div(l, r) => self.eval(l)?.div(&self.eval(r)?),
            Expr::Shl(e, k) => self.eval(e)?.shl(*k),
            Expr::Shr(e, k) => self.eval(e)?.shr(*k),
            Expr::NthBit(index, e) => {
                let index = self.eval(index)?;
                let operand = self.eval(e)?;
                Value::nth_bit(&index, &operand)
            }

            Expr::Tuple(l, r) => Ok(Value::Tuple(
                Box::new(self.eval(l)?),
                Box::new(self.eval(r)?),
            )),
            Expr::Fst(e) => match self.eval(e)? {
                Value::Tuple(l, _) => Ok(*l),
                other => Err(DiceError::type_kind("tuple", other.kind_name())),
            },
            Expr::Snd(e) => match self.eval(e)? {
                Value::Tuple(_, r) => Ok(*r),
                other => Err(DiceError::type_kind("tuple", other.kind_name())),
            },

            Expr::List { items, elem } => {
                let items = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::List {
                    items,
                    elem: elem.clone(),
                })
            }
            Expr::Cons(head, tail) => {
                let head = self.eval(head)?;
                match self.eval(tail)? {
                    Value::List { mut items, elem } => {
                        items.insert(0, head);
                        Ok(Value::List { items, elem })
                    }
                    other => Err(DiceError::type_kind("list", other.kind_name())),
                }
            }
            Expr::Head(e) => match self.eval(e)? {
                Value::List { items, .. } => items
                    .into_iter()
                    .next()
                    .ok_or_else(|| DiceError::range("head of an empty list")),
                other => Err(DiceError::type_kind("list", other.kind_name())),
            },
            Expr::Tail(e) => match self.eval(e)? {
                Value::List { items, elem } => {
                    if items.is_empty() {
                        return Err(DiceError::range("tail of an empty list"));
                    }
                    Ok(Value::List {
                        items: items[1..].to_vec(),
                        elem,
                    })
                }
                other => Err(DiceError::type_kind("list", other.kind_name())),
            },
            Expr::Length(e) => match self.eval(e)? {
                Value::List { items, .. } => {
                    Value::int(LENGTH_WIDTH, items.len() as u64)
                }
                other => Err(DiceError::type_kind("list", other.kind_name())),
            },

            Expr::Call { name, args } => self.eval_call(name, args),
            Expr::Observe(e) => {
                let observed = self.eval(e)?;
                if !observed.as_bool()? {
                    self.observe_ok = false;
                }
                Ok(Value::Bool(true))
            }
        }
    }

    fn eval_call(&mut self, name: &str, args: &[Expr]) -> Result<Value> {
        let func = self
            .funcs
            .get(name)
            .ok_or_else(|| DiceError::unbound(name))?;
        if args.len() != func.params.len() {
            return Err(DiceError::Arity {
                function: name.to_string(),
                expected: func.params.len(),
                found: args.len(),
            });
        }

        // Arguments evaluate in the caller's scope; the callee body sees a
        // fresh environment holding nothing but its parameters. Observation
        // failures inside the callee invalidate this trial as a whole, since
        // the flag lives on the trial, not the frame.
        let mut frame = HashMap::with_capacity(args.len());
        for ((param, _tag), arg) in func.params.iter().zip(args) {
            frame.insert(param.clone(), self.eval(arg)?);
        }
        let saved = std::mem::replace(&mut self.env, Env::new(frame));
        let result = self.eval(&func.body);
        self.env = saved;
        result
    }
}

// ---------------------------------------------------------------------------
// Sampler — trial aggregation
// ---------------------------------------------------------------------------

pub struct Sampler<'a> {
    program: &'a Program,
    funcs: FunctionTable,
    iterations: usize,
    seed: u64,
    bindings: HashMap<String, Value>,
}

impl<'a> Sampler<'a> {
    pub fn new(program: &'a Program, iterations: usize, seed: u64) -> Result<Sampler<'a>> {
        if iterations == 0 {
            return Err(DiceError::range("sampling requires at least one trial"));
        }
        Ok(Sampler {
            program,
            funcs: FunctionTable::new(&program.functions)?,
            iterations,
            seed,
            bindings: HashMap::new(),
        })
    }

    /// Pre-seeds a free variable of the program body, useful for testing
    /// fragments with open identifiers.
    pub fn bind(mut self, name: impl Into<String>, value: Value) -> Sampler<'a> {
        self.bindings.insert(name.into(), value);
        self
    }

    /// Runs all trials sequentially on one RNG stream; bit-for-bit
    /// reproducible for a given seed.
    pub fn run(&self) -> Result<HashMap<Value, f64>> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let (counts, successes) = self.count_outcomes(&mut rng, self.iterations)?;
        Ok(normalise(counts, successes))
    }

    /// Shards the trials across `shards` rayon tasks, each on a sub-RNG
    /// derived from the run seed, and merges the counters.
    pub fn run_parallel(&self, shards: usize) -> Result<HashMap<Value, f64>> {
        let shards = shards.max(1);
        let base = self.iterations / shards;
        let remainder = self.iterations % shards;

        let per_shard: Vec<(HashMap<Value, u64>, u64)> = (0..shards)
            .into_par_iter()
            .map(|shard| {
                let iterations = base + usize::from(shard < remainder);
                if iterations == 0 {
                    return Ok((HashMap::new(), 0));
                }
                let mut rng = StdRng::seed_from_u64(
                    self.seed.wrapping_add(1 + shard as u64),
                );
                self.count_outcomes(&mut rng, iterations)
            })
            .collect::<Result<_>>()?;

        let mut counts: HashMap<Value, u64> = HashMap::new();
        let mut successes = 0;
        for (shard_counts, shard_successes) in per_shard {
            successes += shard_successes;
            for (outcome, count) in shard_counts {
                *counts.entry(outcome).or_insert(0) += count;
            }
        }
        Ok(normalise(counts, successes))
    }

    fn count_outcomes<R: Rng>(
        &self,
        rng: &mut R,
        iterations: usize,
    ) -> Result<(HashMap<Value, u64>, u64)> {
        let mut counts: HashMap<Value, u64> = HashMap::new();
        let mut successes = 0;
        for _ in 0..iterations {
            let mut trial = Trial {
                env: Env::new(self.bindings.clone()),
                funcs: &self.funcs,
                rng: &mut *rng,
                observe_ok: true,
            };
            let outcome = trial.eval(&self.program.body)?;
            if trial.observe_ok {
                *counts.entry(outcome).or_insert(0) += 1;
                successes += 1;
            } else {
                trace!("trial discarded by failed observation");
            }
        }
        Ok((counts, successes))
    }
}

/// Empirical frequencies over the surviving trials; empty when every trial
/// failed observation.
fn normalise(counts: HashMap<Value, u64>, successes: u64) -> HashMap<Value, f64> {
    counts
        .into_iter()
        .map(|(outcome, count)| (outcome, count as f64 / successes as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;

    #[test]
    fn test_shadowing_is_lexical() {
        // let x = true in (let x = false in x is evaluated and dropped); x
        let program = Program::from_body(Expr::let_in(
            "x",
            Expr::truth(true),
            Expr::let_in(
                "y",
                Expr::let_in("x", Expr::truth(false), Expr::ident("x")),
                Expr::and(Expr::ident("x"), Expr::not(Expr::ident("y"))),
            ),
        ));
        let result = Sampler::new(&program, 16, 0).unwrap().run().unwrap();
        assert_eq!(result[&Value::Bool(true)], 1.0);
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let program = Program::from_body(Expr::truth(true));
        assert!(matches!(
            Sampler::new(&program, 0, 0),
            Err(DiceError::Range { .. })
        ));
    }

    #[test]
    fn test_initial_bindings() {
        let program = Program::from_body(Expr::not(Expr::ident("xyz")));
        let result = Sampler::new(&program, 8, 0)
            .unwrap()
            .bind("xyz", Value::Bool(true))
            .run()
            .unwrap();
        assert_eq!(result[&Value::Bool(false)], 1.0);
    }

    #[test]
    fn test_unbound_identifier_fails_the_run() {
        let program = Program::from_body(Expr::ident("ghost"));
        let result = Sampler::new(&program, 4, 0).unwrap().run();
        assert!(matches!(result, Err(DiceError::UnboundIdent { .. })));
    }

    #[test]
    fn test_all_trials_discarded_yields_empty_distribution() {
        let program = Program::from_body(Expr::let_in(
            "_",
            Expr::observe(Expr::truth(false)),
            Expr::truth(true),
        ));
        let result = Sampler::new(&program, 32, 0).unwrap().run().unwrap();
        assert!(result.is_empty());
    }
}
