use crate::{
    operand::{binarise, CastKind, Operand, OperandError},
    overrider::{variable_operand, Core, Internals, OverrideError, Overrider},
    report::{Field, InfoTable, Percent},
    store::{DType, ParameterStore, StoreError, TensorData, VariableSpec},
};

/// Computes the updated kept/pruned mask from the raw value and the mask
/// persisted by the previous update.
pub trait MaskPolicy {
    fn label(&self) -> &'static str;

    fn updated_mask(&self, value: &Operand, mask: &Operand) -> Result<Operand, OperandError>;
}

/// Mask-based sparsification. `apply` creates a boolean mask variable with
/// the parameter's element count, all elements kept, and multiplies the raw
/// value by the cast-to-numeric mask. `update` recomputes the mask through
/// the policy and persists it.
pub struct Pruner<P> {
    core: Core,
    policy: P,
}

impl<P> Pruner<P> {
    fn mask_name(name: &str) -> String {
        format!("{name}/mask")
    }

    fn bound_mask_name(&self) -> Result<String, OverrideError> {
        Ok(Self::mask_name(self.core.name().ok_or(OverrideError::NotApplied)?))
    }
}

impl<P: MaskPolicy> Overrider for Pruner<P> {
    fn core(&self) -> &Core {
        &self.core
    }

    fn core_mut(&mut self) -> &mut Core {
        &mut self.core
    }

    fn label(&self) -> &'static str {
        self.policy.label()
    }

    fn transform(
        &mut self,
        vars: &mut Internals<'_>,
        name: &str,
        value: &Operand,
    ) -> Result<Operand, OverrideError> {
        let total = value.count()?.eval_scalar(vars.store())? as usize;

        let mask_name = Self::mask_name(name);
        vars.variable(&mask_name, &VariableSpec::mask(total))?;

        let mask = variable_operand(value, &mask_name, vars.store())?;

        Ok(value.mul(&mask.cast(CastKind::Float))?)
    }

    fn update_state(&mut self, store: &mut dyn ParameterStore) -> Result<(), OverrideError> {
        let before = self.core.before().cloned().ok_or(OverrideError::NotApplied)?;
        let mask_name = self.bound_mask_name()?;

        let mask = variable_operand(&before, &mask_name, store)?;
        let updated = self.policy.updated_mask(&before, &mask)?;
        let kept = updated.eval(store)?;

        store.write(&mask_name, TensorData::Bool(kept.iter().map(|&x| x != 0.0).collect()))?;

        Ok(())
    }

    fn info_fields(
        &self,
        store: &dyn ParameterStore,
    ) -> Result<Vec<(&'static str, Field)>, OverrideError> {
        if !self.core.is_applied() {
            return Ok(Vec::new());
        }

        let mask_name = self.bound_mask_name()?;
        let mask = match store.read(&mask_name)? {
            TensorData::Bool(mask) => mask,
            other => {
                return Err(OverrideError::Store(StoreError::DTypeMismatch {
                    name: mask_name,
                    expected: DType::Bool,
                    got: other.dtype(),
                }))
            }
        };

        let kept = mask.iter().filter(|&&keep| keep).count();
        let density = kept as f32 / mask.len() as f32;

        Ok(vec![
            ("mask", Field::Text(mask_name)),
            ("density", Field::Percent(Percent(density))),
            ("count", Field::Int(mask.len() as i64)),
        ])
    }

    fn finalize_info(&self, table: &mut InfoTable) {
        let mut weighted = 0.0;
        let mut total = 0usize;

        for row in table.rows() {
            let density = match row.field("density") {
                Some(Field::Percent(p)) => p.0,
                _ => continue,
            };
            let count = match row.field("count") {
                Some(Field::Int(c)) => *c as usize,
                _ => continue,
            };

            weighted += density * count as f32;
            total += count;
        }

        if total > 0 {
            let overall = Percent(weighted / total as f32);
            table.set_footer(format!("overall density: {overall}"));
        }
    }
}

/// threshold = mean(|value|) + alpha * std(|value|), over all elements.
pub(crate) fn mean_std_threshold(value: &Operand, alpha: f32) -> Result<Operand, OperandError> {
    let magnitude = value.abs();
    let count = magnitude.count()?;

    let mean = magnitude.sum()?.div(&count)?;
    let centred = magnitude.sub(&mean)?;
    let variance = centred.mul(&centred)?.sum()?.div(&count)?;

    mean.add(&variance.sqrt().mul(&Operand::Constant(alpha))?)
}

/// Keeps elements whose magnitude exceeds a static threshold.
pub struct Threshold {
    pub threshold: f32,
}

impl MaskPolicy for Threshold {
    fn label(&self) -> &'static str {
        "threshold-pruner"
    }

    fn updated_mask(&self, value: &Operand, _mask: &Operand) -> Result<Operand, OperandError> {
        binarise(value, &Operand::Constant(self.threshold))
    }
}

pub type ThresholdPruner = Pruner<Threshold>;

impl ThresholdPruner {
    pub fn new(threshold: f32) -> Self {
        Self { core: Core::new(), policy: Threshold { threshold } }
    }
}

/// Keeps elements whose magnitude exceeds the mean plus `alpha` standard
/// deviations of the magnitudes.
pub struct MeanStd {
    pub alpha: f32,
}

impl MaskPolicy for MeanStd {
    fn label(&self) -> &'static str {
        "mean-std-pruner"
    }

    fn updated_mask(&self, value: &Operand, _mask: &Operand) -> Result<Operand, OperandError> {
        binarise(value, &mean_std_threshold(value, self.alpha)?)
    }
}

pub type MeanStdPruner = Pruner<MeanStd>;

impl MeanStdPruner {
    pub fn new(alpha: f32) -> Self {
        Self { core: Core::new(), policy: MeanStd { alpha } }
    }
}

/// Hysteresis pruning after dynamic network surgery
/// (<https://arxiv.org/abs/1608.04493>). An element must rise above
/// `on_factor * threshold` to be reinstated and fall below
/// `off_factor * threshold` to be pruned, which stops elements near the
/// threshold from oscillating between consecutive updates.
pub struct DynamicSurgery {
    pub alpha: f32,
    pub on_factor: f32,
    pub off_factor: f32,
}

impl MaskPolicy for DynamicSurgery {
    fn label(&self) -> &'static str {
        "dynamic-surgery-pruner"
    }

    fn updated_mask(&self, value: &Operand, mask: &Operand) -> Result<Operand, OperandError> {
        let threshold = mean_std_threshold(value, self.alpha)?;
        let magnitude = value.abs();

        let on = magnitude.gt(&threshold.mul(&Operand::Constant(self.on_factor))?)?;
        let kept = mask.logical_or(&on)?;

        let off = magnitude.gt(&threshold.mul(&Operand::Constant(self.off_factor))?)?;
        kept.logical_and(&off)
    }
}

pub type DynamicSurgeryPruner = Pruner<DynamicSurgery>;

impl DynamicSurgeryPruner {
    pub fn new(alpha: f32, on_factor: f32, off_factor: f32) -> Result<Self, OverrideError> {
        if on_factor <= off_factor {
            return Err(OverrideError::InvalidFactors { on_factor, off_factor });
        }

        Ok(Self { core: Core::new(), policy: DynamicSurgery { alpha, on_factor, off_factor } })
    }
}
