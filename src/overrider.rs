pub mod binarise;
pub mod chain;
pub mod prune;
pub mod quantise;

use std::fmt;

use crate::{
    operand::{Operand, OperandError},
    report::{Field, Info, InfoTable},
    store::{ParameterStore, StoreError, TensorData, VariableSpec},
};

#[derive(Debug)]
pub enum OverrideError {
    /// `update` was called on an overrider that has not been applied.
    NotApplied,
    InvalidWidth(u32),
    InvalidFactors { on_factor: f32, off_factor: f32 },
    Operand(OperandError),
    Store(StoreError),
}

impl From<OperandError> for OverrideError {
    fn from(value: OperandError) -> Self {
        Self::Operand(value)
    }
}

impl From<StoreError> for OverrideError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl fmt::Display for OverrideError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotApplied => write!(f, "`apply` must be invoked before `update`"),
            Self::InvalidWidth(width) => {
                write!(f, "width of quantised value must be greater than 0, got {width}")
            }
            Self::InvalidFactors { on_factor, off_factor } => {
                write!(f, "hysteresis needs on_factor > off_factor, got {on_factor} and {off_factor}")
            }
            Self::Operand(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for OverrideError {}

/// State common to every overrider: the bound parameter name, the raw and
/// overridden values captured at `apply`, and the names of the internal
/// variables created through the getter.
#[derive(Debug)]
pub struct Core {
    name: Option<String>,
    before: Option<Operand>,
    after: Option<Operand>,
    internals: Vec<String>,
    should_update: bool,
}

impl Core {
    pub fn new() -> Self {
        Self { name: None, before: None, after: None, internals: Vec::new(), should_update: true }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn before(&self) -> Option<&Operand> {
        self.before.as_ref()
    }

    pub fn after(&self) -> Option<&Operand> {
        self.after.as_ref()
    }

    pub fn internals(&self) -> &[String] {
        &self.internals
    }

    pub fn is_applied(&self) -> bool {
        self.name.is_some()
    }

    pub fn should_update(&self) -> bool {
        self.should_update
    }

    /// Overriders constructed as non-updating treat `update` as a no-op.
    pub fn set_updating(&mut self, updating: bool) {
        self.should_update = updating;
    }
}

impl Default for Core {
    fn default() -> Self {
        Self::new()
    }
}

/// The getter capability handed to `transform`. Variables created through it
/// are recorded on the owning overrider so `reset` can find them later.
pub struct Internals<'a> {
    store: &'a mut dyn ParameterStore,
    recorded: Vec<String>,
}

impl<'a> Internals<'a> {
    fn new(store: &'a mut dyn ParameterStore) -> Self {
        Self { store, recorded: Vec::new() }
    }

    pub fn variable(&mut self, name: &str, spec: &VariableSpec) -> Result<(), StoreError> {
        self.store.get_or_create(name, spec)?;
        self.recorded.push(name.to_string());
        Ok(())
    }

    pub fn store(&self) -> &(dyn ParameterStore + 'a) {
        &*self.store
    }

    pub fn store_mut(&mut self) -> &mut (dyn ParameterStore + 'a) {
        &mut *self.store
    }

    fn finish(self) -> Vec<String> {
        self.recorded
    }
}

/// Lifecycle contract shared by every override type. Concrete overriders
/// implement `transform` (and `update_state` where they carry adaptive
/// state); the provided methods handle binding, sequencing checks, commit
/// and rollback.
pub trait Overrider {
    fn core(&self) -> &Core;

    fn core_mut(&mut self) -> &mut Core;

    /// Short identifier used in diagnostics.
    fn label(&self) -> &'static str;

    /// Computes the overridden value from `value`, creating internal
    /// variables through `vars` as needed.
    fn transform(
        &mut self,
        vars: &mut Internals<'_>,
        name: &str,
        value: &Operand,
    ) -> Result<Operand, OverrideError>;

    /// Recomputes internal variables from the raw value captured at `apply`.
    fn update_state(&mut self, _store: &mut dyn ParameterStore) -> Result<(), OverrideError> {
        Ok(())
    }

    fn info_fields(
        &self,
        _store: &dyn ParameterStore,
    ) -> Result<Vec<(&'static str, Field)>, OverrideError> {
        Ok(Vec::new())
    }

    /// Appends an aggregate row once the host has collected a full table of
    /// records for this override type.
    fn finalize_info(&self, _table: &mut InfoTable) {}

    /// Binds the overrider to `name`, installs the transform and returns the
    /// overridden value the host should use in place of the raw parameter.
    /// Applying again rebinds to the new value; internal variables are
    /// reused.
    fn apply(
        &mut self,
        store: &mut dyn ParameterStore,
        name: &str,
        value: Operand,
    ) -> Result<Operand, OverrideError> {
        let mut vars = Internals::new(store);
        let after = self.transform(&mut vars, name, &value)?;
        let recorded = vars.finish();

        let core = self.core_mut();
        core.name = Some(name.to_string());
        core.before = Some(value);
        core.after = Some(after.clone());

        for name in recorded {
            if !core.internals.contains(&name) {
                core.internals.push(name);
            }
        }

        Ok(after)
    }

    fn update(&mut self, store: &mut dyn ParameterStore) -> Result<(), OverrideError> {
        if !self.core().is_applied() {
            return Err(OverrideError::NotApplied);
        }

        if !self.core().should_update() {
            return Ok(());
        }

        self.update_state(store)
    }

    /// Commits the overridden value into the raw parameter entry.
    fn assign(&mut self, store: &mut dyn ParameterStore) -> Result<(), OverrideError> {
        let core = self.core();
        let name = core.name().ok_or(OverrideError::NotApplied)?.to_string();
        let after = core.after().ok_or(OverrideError::NotApplied)?;

        let values = after.eval(store)?;
        store.write(&name, TensorData::F32(values))?;

        Ok(())
    }

    /// Restores every internal variable to its initial value.
    fn reset(&mut self, store: &mut dyn ParameterStore) -> Result<(), OverrideError> {
        for name in self.core().internals() {
            store.restore_initial(name)?;
        }

        Ok(())
    }

    fn info(&self, store: &dyn ParameterStore) -> Result<Info, OverrideError> {
        let name = self.core().name().unwrap_or("<unbound>").to_string();
        Ok(Info { overrider: self.label(), name, fields: self.info_fields(store)? })
    }
}

/// Views a store variable as an operand of the same kind as `like`:
/// symbolic operands get a live source node, materialised operands a copy of
/// the current value.
pub(crate) fn variable_operand(
    like: &Operand,
    name: &str,
    store: &dyn ParameterStore,
) -> Result<Operand, OverrideError> {
    match like {
        Operand::Symbolic(_) => Ok(Operand::source(name)),
        _ => Ok(Operand::Array(store.read(name)?.to_f32())),
    }
}
