/// Contains the operand kinds and the elementary operations dispatched over them.
pub mod operand;
/// Contains the `Overrider` trait and lifecycle state, as well as the
/// provided pruner, quantiser and binariser families.
pub mod overrider;
/// Contains diagnostic records and the table the host assembles from them.
pub mod report;
/// Contains the `ParameterStore` trait and the in-memory `CpuStore` reference store.
pub mod store;

mod rng;
