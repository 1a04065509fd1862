use std::ops::Index;

use crate::{
    operand::Operand,
    overrider::{Core, Internals, OverrideError, Overrider},
    report::Field,
    store::ParameterStore,
};

/// Sequential composition of overriders sharing one bound parameter. `apply`
/// threads the value through each child in order, so the composite `after`
/// is the last child's. Children update from their own `before`, captured at
/// composite-apply time; they never see each other's updated output until
/// the next `apply`.
pub struct ChainOverrider {
    core: Core,
    children: Vec<Box<dyn Overrider>>,
}

impl ChainOverrider {
    pub fn new(children: Vec<Box<dyn Overrider>>) -> Self {
        Self { core: Core::new(), children }
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Overrider> {
        self.children.iter().map(|child| &**child)
    }
}

impl Index<usize> for ChainOverrider {
    type Output = dyn Overrider;

    fn index(&self, index: usize) -> &Self::Output {
        &*self.children[index]
    }
}

impl Overrider for ChainOverrider {
    fn core(&self) -> &Core {
        &self.core
    }

    fn core_mut(&mut self) -> &mut Core {
        &mut self.core
    }

    fn label(&self) -> &'static str {
        "chain"
    }

    fn transform(
        &mut self,
        vars: &mut Internals<'_>,
        name: &str,
        value: &Operand,
    ) -> Result<Operand, OverrideError> {
        let mut value = value.clone();

        for child in &mut self.children {
            value = child.apply(vars.store_mut(), name, value)?;
        }

        Ok(value)
    }

    fn update_state(&mut self, store: &mut dyn ParameterStore) -> Result<(), OverrideError> {
        for child in &mut self.children {
            child.update(store)?;
        }

        Ok(())
    }

    fn reset(&mut self, store: &mut dyn ParameterStore) -> Result<(), OverrideError> {
        for child in &mut self.children {
            child.reset(store)?;
        }

        Ok(())
    }

    fn info_fields(
        &self,
        _store: &dyn ParameterStore,
    ) -> Result<Vec<(&'static str, Field)>, OverrideError> {
        let labels =
            self.children.iter().map(|child| child.label()).collect::<Vec<_>>().join(" -> ");

        Ok(vec![("overriders", Field::Text(labels))])
    }
}
