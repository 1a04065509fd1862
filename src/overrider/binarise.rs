use crate::{
    operand::{binarise, Operand},
    overrider::{Core, Internals, OverrideError, Overrider},
};

/// Collapses values to 0/1 by magnitude threshold. Carries no adaptive
/// state, so `update` has nothing to recompute.
pub struct ThresholdBinariser {
    core: Core,
    threshold: f32,
}

impl ThresholdBinariser {
    pub fn new(threshold: f32) -> Self {
        Self { core: Core::new(), threshold }
    }
}

impl Overrider for ThresholdBinariser {
    fn core(&self) -> &Core {
        &self.core
    }

    fn core_mut(&mut self) -> &mut Core {
        &mut self.core
    }

    fn label(&self) -> &'static str {
        "threshold-binariser"
    }

    fn transform(
        &mut self,
        _vars: &mut Internals<'_>,
        _name: &str,
        value: &Operand,
    ) -> Result<Operand, OverrideError> {
        Ok(binarise(value, &Operand::Constant(self.threshold))?)
    }
}
