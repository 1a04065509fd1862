use std::{collections::HashMap, fmt};

use crate::rng;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DType {
    F32,
    I32,
    Bool,
}

/// Initial value of a tracked variable.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Init {
    Zeros,
    Ones,
    Fill(f32),
    Randn { mean: f32, stdev: f32 },
}

/// What an overrider asks the host getter for when it introduces a new
/// internal variable.
#[derive(Clone, Debug)]
pub struct VariableSpec {
    pub dtype: DType,
    pub size: usize,
    pub init: Init,
    pub trainable: bool,
}

impl VariableSpec {
    pub fn new(dtype: DType, size: usize, init: Init, trainable: bool) -> Self {
        Self { dtype, size, init, trainable }
    }

    /// A kept/pruned mask: boolean, all elements kept, not trained.
    pub fn mask(size: usize) -> Self {
        Self::new(DType::Bool, size, Init::Ones, false)
    }

    /// A binary-point scalar, not trained.
    pub fn point(initial: i32) -> Self {
        Self::new(DType::I32, 1, Init::Fill(initial as f32), false)
    }
}

/// A materialised variable value.
#[derive(Clone, Debug, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    I32(Vec<i32>),
    Bool(Vec<bool>),
}

impl TensorData {
    pub fn dtype(&self) -> DType {
        match self {
            Self::F32(_) => DType::F32,
            Self::I32(_) => DType::I32,
            Self::Bool(_) => DType::Bool,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_f32(&self) -> Vec<f32> {
        match self {
            Self::F32(v) => v.clone(),
            Self::I32(v) => v.iter().map(|&x| x as f32).collect(),
            Self::Bool(v) => v.iter().map(|&x| f32::from(x)).collect(),
        }
    }

    fn from_init(spec: &VariableSpec) -> Self {
        let fill = |x: f32| match spec.dtype {
            DType::F32 => Self::F32(vec![x; spec.size]),
            DType::I32 => Self::I32(vec![x as i32; spec.size]),
            DType::Bool => Self::Bool(vec![x != 0.0; spec.size]),
        };

        match spec.init {
            Init::Zeros => fill(0.0),
            Init::Ones => fill(1.0),
            Init::Fill(x) => fill(x),
            Init::Randn { mean, stdev } => {
                let samples = rng::vec_f32(spec.size, mean, stdev, true);
                match spec.dtype {
                    DType::F32 => Self::F32(samples),
                    DType::I32 => Self::I32(samples.iter().map(|&x| x as i32).collect()),
                    DType::Bool => Self::Bool(samples.iter().map(|&x| x > 0.0).collect()),
                }
            }
        }
    }
}

#[derive(Debug)]
pub enum StoreError {
    UnknownVariable(String),
    DTypeMismatch { name: String, expected: DType, got: DType },
    SizeMismatch { name: String, expected: usize, got: usize },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownVariable(name) => write!(f, "no variable with id `{name}`"),
            Self::DTypeMismatch { name, expected, got } => {
                write!(f, "variable `{name}` holds {got:?} data, expected {expected:?}")
            }
            Self::SizeMismatch { name, expected, got } => {
                write!(f, "variable `{name}` has {expected} elements, got {got}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// The host's parameter and variable storage, as seen by the engine. Hosts
/// with their own graph machinery implement this over their tracked
/// variables; `CpuStore` is the in-memory reference.
pub trait ParameterStore {
    /// Returns the named variable, creating it from `spec` if absent. An
    /// existing entry must match the requested dtype and element count.
    fn get_or_create(&mut self, name: &str, spec: &VariableSpec) -> Result<(), StoreError>;

    fn read(&self, name: &str) -> Result<TensorData, StoreError>;

    /// Element count and dtype are fixed at creation; writes that would
    /// change either are rejected.
    fn write(&mut self, name: &str, value: TensorData) -> Result<(), StoreError>;

    /// Restores the variable to the value it held at creation.
    fn restore_initial(&mut self, name: &str) -> Result<(), StoreError>;
}

struct Entry {
    initial: TensorData,
    value: TensorData,
    trainable: bool,
}

#[derive(Default)]
pub struct CpuStore {
    vars: HashMap<String, Entry>,
}

impl CpuStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a host-owned value, e.g. a trainable parameter.
    pub fn insert(&mut self, name: &str, value: TensorData, trainable: bool) {
        let entry = Entry { initial: value.clone(), value, trainable };
        self.vars.insert(name.to_string(), entry);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn trainable_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> =
            self.vars.iter().filter(|(_, e)| e.trainable).map(|(k, _)| k.clone()).collect();
        ids.sort();
        ids
    }
}

impl ParameterStore for CpuStore {
    fn get_or_create(&mut self, name: &str, spec: &VariableSpec) -> Result<(), StoreError> {
        if let Some(entry) = self.vars.get(name) {
            if entry.value.dtype() != spec.dtype {
                return Err(StoreError::DTypeMismatch {
                    name: name.to_string(),
                    expected: spec.dtype,
                    got: entry.value.dtype(),
                });
            }

            if entry.value.len() != spec.size {
                return Err(StoreError::SizeMismatch {
                    name: name.to_string(),
                    expected: spec.size,
                    got: entry.value.len(),
                });
            }

            return Ok(());
        }

        let value = TensorData::from_init(spec);
        let entry = Entry { initial: value.clone(), value, trainable: spec.trainable };
        self.vars.insert(name.to_string(), entry);

        Ok(())
    }

    fn read(&self, name: &str) -> Result<TensorData, StoreError> {
        self.vars
            .get(name)
            .map(|entry| entry.value.clone())
            .ok_or_else(|| StoreError::UnknownVariable(name.to_string()))
    }

    fn write(&mut self, name: &str, value: TensorData) -> Result<(), StoreError> {
        let entry = self
            .vars
            .get_mut(name)
            .ok_or_else(|| StoreError::UnknownVariable(name.to_string()))?;

        if entry.value.dtype() != value.dtype() {
            return Err(StoreError::DTypeMismatch {
                name: name.to_string(),
                expected: entry.value.dtype(),
                got: value.dtype(),
            });
        }

        if entry.value.len() != value.len() {
            return Err(StoreError::SizeMismatch {
                name: name.to_string(),
                expected: entry.value.len(),
                got: value.len(),
            });
        }

        entry.value = value;

        Ok(())
    }

    fn restore_initial(&mut self, name: &str) -> Result<(), StoreError> {
        let entry = self
            .vars
            .get_mut(name)
            .ok_or_else(|| StoreError::UnknownVariable(name.to_string()))?;

        entry.value = entry.initial.clone();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_idempotent() {
        let mut store = CpuStore::new();
        let spec = VariableSpec::mask(3);

        store.get_or_create("w/mask", &spec).unwrap();
        store.write("w/mask", TensorData::Bool(vec![false, true, false])).unwrap();
        store.get_or_create("w/mask", &spec).unwrap();

        assert_eq!(store.read("w/mask").unwrap(), TensorData::Bool(vec![false, true, false]));
    }

    #[test]
    fn get_or_create_rejects_mismatched_spec() {
        let mut store = CpuStore::new();
        store.get_or_create("w/mask", &VariableSpec::mask(3)).unwrap();

        let err = store.get_or_create("w/mask", &VariableSpec::mask(4)).unwrap_err();
        assert!(matches!(err, StoreError::SizeMismatch { expected: 4, got: 3, .. }));

        let err = store.get_or_create("w/mask", &VariableSpec::point(0)).unwrap_err();
        assert!(matches!(err, StoreError::DTypeMismatch { .. }));
    }

    #[test]
    fn writes_cannot_change_shape_or_dtype() {
        let mut store = CpuStore::new();
        store.insert("w", TensorData::F32(vec![1.0, 2.0]), true);

        let err = store.write("w", TensorData::F32(vec![1.0])).unwrap_err();
        assert!(matches!(err, StoreError::SizeMismatch { expected: 2, got: 1, .. }));

        let err = store.write("w", TensorData::I32(vec![1, 2])).unwrap_err();
        assert!(matches!(err, StoreError::DTypeMismatch { .. }));
    }

    #[test]
    fn restore_initial_rewinds_to_creation_value() {
        let mut store = CpuStore::new();
        store.get_or_create("w/point", &VariableSpec::point(7)).unwrap();
        store.write("w/point", TensorData::I32(vec![4])).unwrap();

        store.restore_initial("w/point").unwrap();
        assert_eq!(store.read("w/point").unwrap(), TensorData::I32(vec![7]));
    }

    #[test]
    fn missing_names_are_lookup_errors() {
        let store = CpuStore::new();
        assert!(matches!(store.read("nope"), Err(StoreError::UnknownVariable(_))));
    }

    #[test]
    fn mask_spec_initialises_all_kept() {
        let mut store = CpuStore::new();
        store.get_or_create("w/mask", &VariableSpec::mask(4)).unwrap();
        assert_eq!(store.read("w/mask").unwrap(), TensorData::Bool(vec![true; 4]));
    }

    #[test]
    fn trainable_ids_are_sorted_and_filtered() {
        let mut store = CpuStore::new();
        store.insert("b", TensorData::F32(vec![0.0]), true);
        store.insert("a", TensorData::F32(vec![0.0]), true);
        store.get_or_create("a/mask", &VariableSpec::mask(1)).unwrap();

        assert_eq!(store.trainable_ids(), vec!["a".to_string(), "b".to_string()]);
    }
}
