/// Inference driver
///
/// Thin orchestration over the two back-ends: run N sampling trials and
/// normalise the counts, or run one symbolic compilation and return its
/// exact distribution.

use crate::ast::Program;
use crate::compiler::Compiler;
use crate::core::value::Value;
use crate::errors::Result;
use crate::sampler::Sampler;
use std::collections::HashMap;

/// The inference result: each outcome value mapped to its posterior
/// probability.
pub type Distribution = HashMap<Value, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Monte Carlo rejection sampling over `iterations` trials. With
    /// `parallel` set the trials are sharded across the rayon thread pool.
    Sample {
        iterations: usize,
        seed: u64,
        parallel: bool,
    },
    /// Exact inference by symbolic compilation.
    Exact,
}

pub fn infer(program: &Program, backend: Backend) -> Result<Distribution> {
    match backend {
        Backend::Sample {
            iterations,
            seed,
            parallel,
        } => {
            let sampler = Sampler::new(program, iterations, seed)?;
            if parallel {
                sampler.run_parallel(rayon::current_num_threads())
            } else {
                sampler.run()
            }
        }
        Backend::Exact => Compiler::new().infer(program),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;

    #[test]
    fn test_backends_agree_on_certainties() {
        let program = Program::from_body(Expr::let_in(
            "x",
            Expr::flip(1.0),
            Expr::ident("x"),
        ));
        let sampled = infer(
            &program,
            Backend::Sample {
                iterations: 64,
                seed: 0,
                parallel: false,
            },
        )
        .unwrap();
        let exact = infer(&program, Backend::Exact).unwrap();
        assert_eq!(sampled[&Value::Bool(true)], 1.0);
        assert_eq!(exact[&Value::Bool(true)], 1.0);
    }
}
