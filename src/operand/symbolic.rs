use std::{collections::HashMap, rc::Rc};

use super::{broadcast, BinOp, OperandError, UnaryOp};
use crate::store::ParameterStore;

/// A node in a deferred element-wise expression graph. Evaluation pulls
/// current values out of the host store, so a `Sym` built over a parameter
/// stays live across training steps. `round`, `clip` and int-cast backprop
/// as identity (straight-through estimator), which keeps quantisers usable
/// inside a differentiable graph.
#[derive(Clone, Debug)]
pub struct Sym(Rc<Expr>);

#[derive(Debug)]
enum Expr {
    Source(String),
    Literal(Vec<f32>),
    Unary(UnaryOp, Sym),
    Binary(BinOp, Sym, Sym),
    Clip(Sym, f32, f32),
    Sum(Sym),
    Count(Sym),
}

impl Sym {
    pub fn source(name: impl Into<String>) -> Self {
        Self(Rc::new(Expr::Source(name.into())))
    }

    pub fn literal(values: Vec<f32>) -> Self {
        Self(Rc::new(Expr::Literal(values)))
    }

    pub(crate) fn unary(op: UnaryOp, input: Sym) -> Self {
        Self(Rc::new(Expr::Unary(op, input)))
    }

    pub(crate) fn binary(op: BinOp, lhs: Sym, rhs: Sym) -> Self {
        Self(Rc::new(Expr::Binary(op, lhs, rhs)))
    }

    pub(crate) fn clip(input: Sym, low: f32, high: f32) -> Self {
        Self(Rc::new(Expr::Clip(input, low, high)))
    }

    pub(crate) fn sum(input: Sym) -> Self {
        Self(Rc::new(Expr::Sum(input)))
    }

    pub(crate) fn count(input: Sym) -> Self {
        Self(Rc::new(Expr::Count(input)))
    }

    pub fn eval(&self, store: &dyn ParameterStore) -> Result<Vec<f32>, OperandError> {
        match &*self.0 {
            Expr::Source(name) => Ok(store.read(name)?.to_f32()),
            Expr::Literal(values) => Ok(values.clone()),
            Expr::Unary(op, x) => Ok(x.eval(store)?.into_iter().map(|v| op.apply(v)).collect()),
            Expr::Binary(op, a, b) => broadcast(*op, &a.eval(store)?, &b.eval(store)?),
            Expr::Clip(x, low, high) => {
                Ok(x.eval(store)?.into_iter().map(|v| v.clamp(*low, *high)).collect())
            }
            Expr::Sum(x) => Ok(vec![x.eval(store)?.iter().sum()]),
            Expr::Count(x) => Ok(vec![x.eval(store)?.len() as f32]),
        }
    }

    /// Accumulates the gradient of this node with respect to every named
    /// source into `grads`, seeded with `seed`. Comparisons and logical ops
    /// carry no gradient; `min`/`max` route it to the selected side.
    pub fn backward(
        &self,
        store: &dyn ParameterStore,
        seed: &[f32],
        grads: &mut HashMap<String, Vec<f32>>,
    ) -> Result<(), OperandError> {
        match &*self.0 {
            Expr::Source(name) => {
                let len = store.read(name)?.len();
                let contrib = fit(seed, len)?;
                let entry = grads.entry(name.clone()).or_insert_with(|| vec![0.0; len]);
                for (g, c) in entry.iter_mut().zip(contrib) {
                    *g += c;
                }
                Ok(())
            }
            Expr::Literal(_) | Expr::Count(_) => Ok(()),
            Expr::Unary(op, x) => {
                let xv = x.eval(store)?;
                let seed = fit(seed, xv.len())?;
                let contrib: Vec<f32> = match op {
                    UnaryOp::Round | UnaryOp::CastInt => seed,
                    UnaryOp::Abs => xv
                        .iter()
                        .zip(&seed)
                        .map(|(&v, &g)| if v < 0.0 { -g } else { g })
                        .collect(),
                    UnaryOp::Sqrt => {
                        xv.iter().zip(&seed).map(|(&v, &g)| g * 0.5 / v.sqrt()).collect()
                    }
                    UnaryOp::Exp2 => xv
                        .iter()
                        .zip(&seed)
                        .map(|(&v, &g)| g * std::f32::consts::LN_2 * v.exp2())
                        .collect(),
                };
                x.backward(store, &contrib, grads)
            }
            Expr::Binary(op, a, b) => {
                if matches!(op, BinOp::Gt | BinOp::Lt | BinOp::Or | BinOp::And) {
                    return Ok(());
                }

                let av = a.eval(store)?;
                let bv = b.eval(store)?;
                let len = av.len().max(bv.len());
                let seed = fit(seed, len)?;

                let mut da = vec![0.0; len];
                let mut db = vec![0.0; len];

                for i in 0..len {
                    let x = at(&av, i);
                    let y = at(&bv, i);
                    let g = seed[i];

                    let (dx, dy) = match op {
                        BinOp::Add => (g, g),
                        BinOp::Sub => (g, -g),
                        BinOp::Mul => (g * y, g * x),
                        BinOp::Div => (g / y, -g * x / (y * y)),
                        BinOp::Min => {
                            if x <= y {
                                (g, 0.0)
                            } else {
                                (0.0, g)
                            }
                        }
                        BinOp::Max => {
                            if x >= y {
                                (g, 0.0)
                            } else {
                                (0.0, g)
                            }
                        }
                        _ => (0.0, 0.0),
                    };

                    da[i] = dx;
                    db[i] = dy;
                }

                a.backward(store, &fit(&da, av.len())?, grads)?;
                b.backward(store, &fit(&db, bv.len())?, grads)
            }
            Expr::Clip(x, _, _) => {
                let len = x.eval(store)?.len();
                x.backward(store, &fit(seed, len)?, grads)
            }
            Expr::Sum(x) => {
                let len = x.eval(store)?.len();
                let g = fit(seed, 1)?[0];
                x.backward(store, &vec![g; len], grads)
            }
        }
    }
}

fn at(values: &[f32], index: usize) -> f32 {
    values[if values.len() == 1 { 0 } else { index }]
}

fn fit(seed: &[f32], len: usize) -> Result<Vec<f32>, OperandError> {
    if seed.len() == len {
        Ok(seed.to_vec())
    } else if len == 1 {
        Ok(vec![seed.iter().sum()])
    } else if seed.len() == 1 {
        Ok(vec![seed[0]; len])
    } else {
        Err(OperandError::LengthMismatch { lhs: seed.len(), rhs: len })
    }
}
