/// Function registry and call-graph analysis
///
/// Registration rejects duplicate names. `compile_order` builds the call
/// graph (edge callee → caller) and topologically sorts it so the symbolic
/// compiler sees every callee before its callers; any cycle, self-loops
/// included, is reported as recursion. The sampler uses only the registry
/// and happily runs recursive programs.

use crate::ast::{Expr, Function};
use crate::errors::{DiceError, Result};
use log::debug;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct FunctionTable {
    funcs: Vec<Function>,
    by_name: HashMap<String, usize>,
}

impl FunctionTable {
    pub fn new(functions: &[Function]) -> Result<FunctionTable> {
        let mut funcs = Vec::with_capacity(functions.len());
        let mut by_name = HashMap::new();
        for func in functions {
            if by_name.contains_key(&func.name) {
                return Err(DiceError::DuplicateFunction {
                    name: func.name.clone(),
                });
            }
            by_name.insert(func.name.clone(), funcs.len());
            funcs.push(func.clone());
        }
        Ok(FunctionTable { funcs, by_name })
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.by_name.get(name).map(|&i| &self.funcs[i])
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }

    /// Functions in callee-before-caller order, or the recursion error.
    pub fn compile_order(&self) -> Result<Vec<&Function>> {
        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let nodes: Vec<NodeIndex> =
            (0..self.funcs.len()).map(|i| graph.add_node(i)).collect();

        for (caller, func) in self.funcs.iter().enumerate() {
            let mut callees = Vec::new();
            collect_calls(&func.body, &mut callees);
            for callee in callees {
                // Unknown targets are not an ordering concern; they surface
                // as unbound identifiers when the call is actually reached.
                if let Some(&target) = self.by_name.get(&callee) {
                    graph.add_edge(nodes[target], nodes[caller], ());
                }
            }
        }

        match toposort(&graph, None) {
            Ok(order) => {
                let order: Vec<&Function> =
                    order.iter().map(|&n| &self.funcs[graph[n]]).collect();
                debug!(
                    "function compile order: {:?}",
                    order.iter().map(|f| f.name.as_str()).collect::<Vec<_>>()
                );
                Ok(order)
            }
            Err(cycle) => Err(DiceError::RecursionDetected {
                function: self.funcs[graph[cycle.node_id()]].name.clone(),
            }),
        }
    }
}

/// Records every call target reachable in an expression, arguments included.
fn collect_calls(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::Call { name, args } => {
            out.push(name.clone());
            for arg in args {
                collect_calls(arg, out);
            }
        }
        Expr::Lit(_)
        | Expr::Ident(_)
        | Expr::Flip(_)
        | Expr::Discrete(_)
        | Expr::Uniform { .. }
        | Expr::Binomial { .. } => {}
        Expr::Let { bound, body, .. } => {
            collect_calls(bound, out);
            collect_calls(body, out);
        }
        Expr::If {
            cond,
            then,
            otherwise,
        } => {
            collect_calls(cond, out);
            collect_calls(then, out);
            collect_calls(otherwise, out);
        }
        Expr::Not(e)
        | Expr::Shl(e, _)
        | Expr::Shr(e, _)
        | Expr::Fst(e)
        | Expr::Snd(e)
        | Expr::Head(e)
        | Expr::Tail(e)
        | Expr::Length(e)
        | Expr::Observe(e) => collect_calls(e, out),
        Expr::And(l, r)
        | Expr::Or(l, r)
        | Expr::Eq(l, r)
        | Expr::Lt(l, r)
        | Expr::Add(l, r)
        | Expr::Sub(l, r)
        | Expr::Mul(l, r)
        | Expr::Div(l, r)
        | Expr::NthBit(l, r)
        | Expr::Tuple(l, r)
        | Expr::Cons(l, r) => {
            collect_calls(l, out);
            collect_calls(r, out);
        }
        Expr::List { items, .. } => {
            for item in items {
                collect_calls(item, out);
            }
        }
    }
}
