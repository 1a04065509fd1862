use crate::{
    operand::{CastKind, Operand, OperandError},
    overrider::{variable_operand, Core, Internals, OverrideError, Overrider},
    report::Field,
    store::{DType, ParameterStore, StoreError, TensorData, VariableSpec},
};

/// Rounds to the nearest integer. Gradient-transparent on symbolic operands.
#[derive(Default)]
pub struct Rounder {
    core: Core,
}

impl Rounder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Overrider for Rounder {
    fn core(&self) -> &Core {
        &self.core
    }

    fn core_mut(&mut self) -> &mut Core {
        &mut self.core
    }

    fn label(&self) -> &'static str {
        "rounder"
    }

    fn transform(
        &mut self,
        _vars: &mut Internals<'_>,
        _name: &str,
        value: &Operand,
    ) -> Result<Operand, OverrideError> {
        Ok(value.round())
    }
}

/// The fixed-point scale exponent, either baked in at construction or held
/// as a store variable.
#[derive(Clone, Debug)]
pub enum Point {
    Static(i32),
    Variable(String),
}

/// Shift by `2^point`, round, clip into the `width`-bit two's complement
/// range when a width is set, then unshift.
pub fn quantise(
    value: &Operand,
    point: &Operand,
    width: Option<u32>,
) -> Result<Operand, OperandError> {
    let shift = point.exp2();
    let shifted = value.mul(&shift)?.round();

    let bounded = match width {
        Some(width) => {
            let max = 2f32.powi(width as i32 - 1);
            shifted.clip(-max, max - 1.0)
        }
        None => shifted,
    };

    bounded.div(&shift)
}

/// Fraction of elements whose shifted-and-rounded value falls outside the
/// `width`-bit representable range. Skips the clip, so it measures what the
/// clip would have destroyed.
pub fn overflow_rate(
    value: &Operand,
    point: &Operand,
    width: u32,
) -> Result<Operand, OperandError> {
    let shifted = value.mul(&point.exp2())?.round();
    let max = 2f32.powi(width as i32 - 1);

    let below = shifted.lt(&Operand::Constant(-max))?;
    let above = shifted.gt(&Operand::Constant(max - 1.0))?;
    let overflows = below.logical_or(&above)?;

    overflows.cast(CastKind::Int).sum()?.div(&overflows.count()?)
}

fn read_point(store: &dyn ParameterStore, name: &str) -> Result<i32, OverrideError> {
    match store.read(name)? {
        TensorData::I32(values) if values.len() == 1 => Ok(values[0]),
        other => Err(OverrideError::Store(StoreError::DTypeMismatch {
            name: name.to_string(),
            expected: DType::I32,
            got: other.dtype(),
        })),
    }
}

/// Two's complement fixed-point quantisation with a fixed binary point.
/// Without a width the representable range is unbounded and no clipping
/// occurs. See <https://arxiv.org/abs/1604.03168>.
pub struct FixedPointQuantiser {
    core: Core,
    point: Point,
    width: Option<u32>,
}

impl FixedPointQuantiser {
    pub fn new(point: i32, width: Option<u32>) -> Result<Self, OverrideError> {
        Self::with_point(Point::Static(point), width)
    }

    /// A quantiser whose binary point lives in the host store, e.g. one
    /// shared with or driven by machinery outside this overrider.
    pub fn with_point(point: Point, width: Option<u32>) -> Result<Self, OverrideError> {
        if let Some(width) = width {
            if width == 0 {
                return Err(OverrideError::InvalidWidth(width));
            }
        }

        Ok(Self { core: Core::new(), point, width })
    }

    fn point_operand(
        &self,
        like: &Operand,
        store: &dyn ParameterStore,
    ) -> Result<Operand, OverrideError> {
        match &self.point {
            Point::Static(point) => Ok(Operand::Constant(*point as f32)),
            Point::Variable(name) => variable_operand(like, name, store),
        }
    }

    fn width_field(&self) -> Field {
        match self.width {
            Some(width) => Field::Int(i64::from(width)),
            None => Field::Text("-".to_string()),
        }
    }
}

impl Overrider for FixedPointQuantiser {
    fn core(&self) -> &Core {
        &self.core
    }

    fn core_mut(&mut self) -> &mut Core {
        &mut self.core
    }

    fn label(&self) -> &'static str {
        "fixed-point-quantiser"
    }

    fn transform(
        &mut self,
        vars: &mut Internals<'_>,
        _name: &str,
        value: &Operand,
    ) -> Result<Operand, OverrideError> {
        let point = self.point_operand(value, vars.store())?;
        Ok(quantise(value, &point, self.width)?)
    }

    fn info_fields(
        &self,
        store: &dyn ParameterStore,
    ) -> Result<Vec<(&'static str, Field)>, OverrideError> {
        let point = match &self.point {
            Point::Static(point) => *point,
            Point::Variable(name) => read_point(store, name)?,
        };

        Ok(vec![("width", self.width_field()), ("point", Field::Int(i64::from(point)))])
    }
}

/// Fixed-point quantisation that hunts for the largest binary point whose
/// overflow rate stays within the configured budget. The point is a store
/// variable created on first `apply`, initialised to `width - 1`. Each
/// `update` takes one hill-climbing step from the current point; it
/// converges only under repeated calls across training steps. See
/// <https://arxiv.org/abs/1412.7024>.
pub struct DynamicFixedPointQuantiser {
    core: Core,
    width: u32,
    overflow_rate: f32,
    point: Option<String>,
}

impl DynamicFixedPointQuantiser {
    pub fn new(width: u32, overflow_rate: f32) -> Result<Self, OverrideError> {
        if width == 0 {
            return Err(OverrideError::InvalidWidth(width));
        }

        Ok(Self { core: Core::new(), width, overflow_rate, point: None })
    }
}

impl Overrider for DynamicFixedPointQuantiser {
    fn core(&self) -> &Core {
        &self.core
    }

    fn core_mut(&mut self) -> &mut Core {
        &mut self.core
    }

    fn label(&self) -> &'static str {
        "dynamic-fixed-point-quantiser"
    }

    fn transform(
        &mut self,
        vars: &mut Internals<'_>,
        name: &str,
        value: &Operand,
    ) -> Result<Operand, OverrideError> {
        let point_name = format!("{name}/point");

        if self.point.is_none() {
            vars.variable(&point_name, &VariableSpec::point(self.width as i32 - 1))?;
            self.point = Some(point_name.clone());
        }

        let point = variable_operand(value, &point_name, vars.store())?;

        Ok(quantise(value, &point, Some(self.width))?)
    }

    fn update_state(&mut self, store: &mut dyn ParameterStore) -> Result<(), OverrideError> {
        let point_name = self.point.clone().ok_or(OverrideError::NotApplied)?;
        let before = self.core.before().cloned().ok_or(OverrideError::NotApplied)?;

        let current = read_point(store, &point_name)?;
        let rate = overflow_rate(&before, &Operand::Constant(current as f32), self.width)?
            .eval_scalar(store)?;

        let next = if rate > self.overflow_rate {
            current - 1
        } else if 2.0 * rate <= self.overflow_rate {
            current + 1
        } else {
            current
        };

        if next != current {
            store.write(&point_name, TensorData::I32(vec![next]))?;
        }

        Ok(())
    }

    fn info_fields(
        &self,
        store: &dyn ParameterStore,
    ) -> Result<Vec<(&'static str, Field)>, OverrideError> {
        let mut fields = vec![("width", Field::Int(i64::from(self.width)))];

        if let Some(name) = &self.point {
            fields.push(("point", Field::Int(i64::from(read_point(store, name)?))));
        }

        Ok(fields)
    }
}
