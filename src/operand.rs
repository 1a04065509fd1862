pub mod symbolic;

use std::fmt;

use symbolic::Sym;

use crate::store::{ParameterStore, StoreError};

/// The three representations a parameter value can arrive in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Constant,
    Array,
    Symbolic,
}

#[derive(Debug)]
pub enum OperandError {
    UnsupportedOp { op: &'static str, kind: Kind },
    LengthMismatch { lhs: usize, rhs: usize },
    Store(StoreError),
}

impl From<StoreError> for OperandError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl fmt::Display for OperandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedOp { op, kind } => {
                write!(f, "operation `{op}` is not supported on {kind:?} operands")
            }
            Self::LengthMismatch { lhs, rhs } => {
                write!(f, "operand lengths {lhs} and {rhs} do not broadcast")
            }
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for OperandError {}

/// Target representation for `Operand::cast`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CastKind {
    Int,
    Float,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Round,
    Abs,
    Sqrt,
    Exp2,
    CastInt,
}

impl UnaryOp {
    pub(crate) fn apply(self, x: f32) -> f32 {
        match self {
            Self::Round => x.round(),
            Self::Abs => x.abs(),
            Self::Sqrt => x.sqrt(),
            Self::Exp2 => x.exp2(),
            Self::CastInt => x.trunc(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
    Gt,
    Lt,
    Or,
    And,
}

impl BinOp {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Min => "min",
            Self::Max => "max",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Or => "logical_or",
            Self::And => "logical_and",
        }
    }

    pub(crate) fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => a / b,
            Self::Min => a.min(b),
            Self::Max => a.max(b),
            Self::Gt => f32::from(a > b),
            Self::Lt => f32::from(a < b),
            Self::Or => f32::from(a != 0.0 || b != 0.0),
            Self::And => f32::from(a != 0.0 && b != 0.0),
        }
    }
}

pub(crate) fn broadcast(op: BinOp, a: &[f32], b: &[f32]) -> Result<Vec<f32>, OperandError> {
    match (a.len(), b.len()) {
        (m, n) if m == n => Ok(a.iter().zip(b).map(|(&x, &y)| op.apply(x, y)).collect()),
        (_, 1) => Ok(a.iter().map(|&x| op.apply(x, b[0])).collect()),
        (1, _) => Ok(b.iter().map(|&y| op.apply(a[0], y)).collect()),
        (m, n) => Err(OperandError::LengthMismatch { lhs: m, rhs: n }),
    }
}

/// A value that is a plain scalar, a materialised array, or a node in a
/// deferred expression graph. Elementary operations classify their operands
/// once and route to the matching backend, so override logic runs unmodified
/// over every representation. Mixed constant and array operands promote to
/// the array backend, and anything mixed with a symbolic operand promotes to
/// the symbolic backend.
#[derive(Clone, Debug)]
pub enum Operand {
    Constant(f32),
    Array(Vec<f32>),
    Symbolic(Sym),
}

impl Operand {
    /// A live reference to a named store variable, as a symbolic node.
    pub fn source(name: &str) -> Self {
        Self::Symbolic(Sym::source(name))
    }

    pub fn kind(&self) -> Kind {
        match self {
            Self::Constant(_) => Kind::Constant,
            Self::Array(_) => Kind::Array,
            Self::Symbolic(_) => Kind::Symbolic,
        }
    }

    fn dense(&self) -> Vec<f32> {
        match self {
            Self::Constant(c) => vec![*c],
            Self::Array(v) => v.clone(),
            Self::Symbolic(_) => Vec::new(),
        }
    }

    fn lift(&self) -> Sym {
        match self {
            Self::Constant(c) => Sym::literal(vec![*c]),
            Self::Array(v) => Sym::literal(v.clone()),
            Self::Symbolic(s) => s.clone(),
        }
    }

    fn binary(&self, rhs: &Self, op: BinOp) -> Result<Self, OperandError> {
        match (self, rhs) {
            (Self::Constant(a), Self::Constant(b)) => {
                if matches!(op, BinOp::Or | BinOp::And) {
                    return Err(OperandError::UnsupportedOp { op: op.name(), kind: Kind::Constant });
                }
                Ok(Self::Constant(op.apply(*a, *b)))
            }
            (Self::Symbolic(_), _) | (_, Self::Symbolic(_)) => {
                Ok(Self::Symbolic(Sym::binary(op, self.lift(), rhs.lift())))
            }
            _ => Ok(Self::Array(broadcast(op, &self.dense(), &rhs.dense())?)),
        }
    }

    fn unary(&self, op: UnaryOp) -> Self {
        match self {
            Self::Constant(c) => Self::Constant(op.apply(*c)),
            Self::Array(v) => Self::Array(v.iter().map(|&x| op.apply(x)).collect()),
            Self::Symbolic(s) => Self::Symbolic(Sym::unary(op, s.clone())),
        }
    }

    pub fn add(&self, rhs: &Self) -> Result<Self, OperandError> {
        self.binary(rhs, BinOp::Add)
    }

    pub fn sub(&self, rhs: &Self) -> Result<Self, OperandError> {
        self.binary(rhs, BinOp::Sub)
    }

    pub fn mul(&self, rhs: &Self) -> Result<Self, OperandError> {
        self.binary(rhs, BinOp::Mul)
    }

    pub fn div(&self, rhs: &Self) -> Result<Self, OperandError> {
        self.binary(rhs, BinOp::Div)
    }

    pub fn min(&self, rhs: &Self) -> Result<Self, OperandError> {
        self.binary(rhs, BinOp::Min)
    }

    pub fn max(&self, rhs: &Self) -> Result<Self, OperandError> {
        self.binary(rhs, BinOp::Max)
    }

    /// Element-wise `self > rhs`, producing 0/1 values.
    pub fn gt(&self, rhs: &Self) -> Result<Self, OperandError> {
        self.binary(rhs, BinOp::Gt)
    }

    /// Element-wise `self < rhs`, producing 0/1 values.
    pub fn lt(&self, rhs: &Self) -> Result<Self, OperandError> {
        self.binary(rhs, BinOp::Lt)
    }

    pub fn logical_or(&self, rhs: &Self) -> Result<Self, OperandError> {
        self.binary(rhs, BinOp::Or)
    }

    pub fn logical_and(&self, rhs: &Self) -> Result<Self, OperandError> {
        self.binary(rhs, BinOp::And)
    }

    /// Rounds half away from zero. Gradient-transparent on symbolic operands.
    pub fn round(&self) -> Self {
        self.unary(UnaryOp::Round)
    }

    pub fn abs(&self) -> Self {
        self.unary(UnaryOp::Abs)
    }

    pub fn sqrt(&self) -> Self {
        self.unary(UnaryOp::Sqrt)
    }

    pub fn exp2(&self) -> Self {
        self.unary(UnaryOp::Exp2)
    }

    /// Casting to int truncates toward zero, casting to float is the
    /// identity. Gradient-transparent on symbolic operands.
    pub fn cast(&self, to: CastKind) -> Self {
        match to {
            CastKind::Int => self.unary(UnaryOp::CastInt),
            CastKind::Float => self.clone(),
        }
    }

    /// Clamps to `[low, high]`. Gradient-transparent on symbolic operands.
    pub fn clip(&self, low: f32, high: f32) -> Self {
        match self {
            Self::Constant(c) => Self::Constant(c.clamp(low, high)),
            Self::Array(v) => Self::Array(v.iter().map(|&x| x.clamp(low, high)).collect()),
            Self::Symbolic(s) => Self::Symbolic(Sym::clip(s.clone(), low, high)),
        }
    }

    pub fn sum(&self) -> Result<Self, OperandError> {
        match self {
            Self::Constant(_) => {
                Err(OperandError::UnsupportedOp { op: "sum", kind: Kind::Constant })
            }
            Self::Array(v) => Ok(Self::Constant(v.iter().sum())),
            Self::Symbolic(s) => Ok(Self::Symbolic(Sym::sum(s.clone()))),
        }
    }

    pub fn count(&self) -> Result<Self, OperandError> {
        match self {
            Self::Constant(_) => {
                Err(OperandError::UnsupportedOp { op: "count", kind: Kind::Constant })
            }
            Self::Array(v) => Ok(Self::Constant(v.len() as f32)),
            Self::Symbolic(s) => Ok(Self::Symbolic(Sym::count(s.clone()))),
        }
    }

    /// Materialises the operand, evaluating symbolic nodes against the store.
    pub fn eval(&self, store: &dyn ParameterStore) -> Result<Vec<f32>, OperandError> {
        match self {
            Self::Constant(c) => Ok(vec![*c]),
            Self::Array(v) => Ok(v.clone()),
            Self::Symbolic(s) => s.eval(store),
        }
    }

    pub fn eval_scalar(&self, store: &dyn ParameterStore) -> Result<f32, OperandError> {
        let values = self.eval(store)?;
        if values.len() == 1 {
            Ok(values[0])
        } else {
            Err(OperandError::LengthMismatch { lhs: values.len(), rhs: 1 })
        }
    }

    /// Gradients with respect to every named source feeding this operand,
    /// seeded with `output_grad`. Constant and array operands carry none.
    pub fn backward(
        &self,
        store: &dyn ParameterStore,
        output_grad: &[f32],
    ) -> Result<std::collections::HashMap<String, Vec<f32>>, OperandError> {
        let mut grads = std::collections::HashMap::new();
        if let Self::Symbolic(sym) = self {
            sym.backward(store, output_grad, &mut grads)?;
        }
        Ok(grads)
    }
}

/// Casts `|value| > threshold` to numeric 0/1.
pub fn binarise(value: &Operand, threshold: &Operand) -> Result<Operand, OperandError> {
    Ok(value.abs().gt(threshold)?.cast(CastKind::Float))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CpuStore;

    fn variants(values: &[f32]) -> [Operand; 2] {
        [Operand::Array(values.to_vec()), Operand::Symbolic(Sym::literal(values.to_vec()))]
    }

    #[test]
    fn unary_ops_agree_across_kinds() {
        let store = CpuStore::new();
        let scalar = Operand::Constant(-1.3);

        for v in variants(&[-1.3]) {
            assert_eq!(v.round().eval(&store).unwrap(), scalar.round().eval(&store).unwrap());
            assert_eq!(v.abs().eval(&store).unwrap(), scalar.abs().eval(&store).unwrap());
            assert_eq!(
                v.clip(-1.0, 1.0).eval(&store).unwrap(),
                scalar.clip(-1.0, 1.0).eval(&store).unwrap()
            );
            assert_eq!(
                v.cast(CastKind::Int).eval(&store).unwrap(),
                scalar.cast(CastKind::Int).eval(&store).unwrap()
            );
        }
    }

    #[test]
    fn binary_ops_agree_across_kinds() {
        let store = CpuStore::new();
        let a: f32 = 2.5;
        let b: f32 = -4.0;
        let expected_mul = a * b;
        let expected_max = a.max(b);

        for x in variants(&[a]) {
            for y in variants(&[b]) {
                assert_eq!(x.mul(&y).unwrap().eval(&store).unwrap(), vec![expected_mul]);
                assert_eq!(x.max(&y).unwrap().eval(&store).unwrap(), vec![expected_max]);
                assert_eq!(x.gt(&y).unwrap().eval(&store).unwrap(), vec![1.0]);
            }
        }

        let c = Operand::Constant(a);
        assert_eq!(c.mul(&Operand::Constant(b)).unwrap().eval(&store).unwrap(), vec![expected_mul]);
    }

    #[test]
    fn constants_broadcast_into_arrays() {
        let store = CpuStore::new();
        let v = Operand::Array(vec![1.0, 2.0, 3.0]);
        let out = v.mul(&Operand::Constant(2.0)).unwrap();
        assert_eq!(out.kind(), Kind::Array);
        assert_eq!(out.eval(&store).unwrap(), vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn symbolic_promotion_wins() {
        let v = Operand::Array(vec![1.0, 2.0]);
        let s = Operand::Symbolic(Sym::literal(vec![3.0, 4.0]));
        assert_eq!(v.add(&s).unwrap().kind(), Kind::Symbolic);
    }

    #[test]
    fn reductions_reject_constants() {
        let c = Operand::Constant(1.0);
        assert!(matches!(c.sum(), Err(OperandError::UnsupportedOp { op: "sum", .. })));
        assert!(matches!(c.count(), Err(OperandError::UnsupportedOp { op: "count", .. })));
    }

    #[test]
    fn logical_ops_reject_constants() {
        let a = Operand::Constant(1.0);
        let b = Operand::Constant(0.0);
        assert!(matches!(
            a.logical_or(&b),
            Err(OperandError::UnsupportedOp { op: "logical_or", .. })
        ));
        assert!(matches!(
            a.logical_and(&b),
            Err(OperandError::UnsupportedOp { op: "logical_and", .. })
        ));
    }

    #[test]
    fn mismatched_lengths_fail() {
        let a = Operand::Array(vec![1.0, 2.0]);
        let b = Operand::Array(vec![1.0, 2.0, 3.0]);
        assert!(matches!(a.add(&b), Err(OperandError::LengthMismatch { lhs: 2, rhs: 3 })));
    }

    #[test]
    fn binarise_marks_magnitudes_above_threshold() {
        let store = CpuStore::new();
        let v = Operand::Array(vec![0.1, -0.6, 0.4, 0.9]);
        let out = binarise(&v, &Operand::Constant(0.5)).unwrap();
        assert_eq!(out.eval(&store).unwrap(), vec![0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn int_cast_truncates_toward_zero() {
        let store = CpuStore::new();
        let v = Operand::Array(vec![1.9, -1.9, 0.2]);
        assert_eq!(v.cast(CastKind::Int).eval(&store).unwrap(), vec![1.0, -1.0, 0.0]);
    }
}
