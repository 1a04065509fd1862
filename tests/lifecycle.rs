use crimp::{
    operand::Operand,
    overrider::{
        chain::ChainOverrider,
        prune::ThresholdPruner,
        quantise::{DynamicFixedPointQuantiser, FixedPointQuantiser},
        OverrideError, Overrider,
    },
    report::InfoTable,
    store::{CpuStore, ParameterStore, TensorData},
};

#[test]
fn update_before_apply_fails() {
    let mut store = CpuStore::new();
    let mut pruner = ThresholdPruner::new(0.5);

    assert!(matches!(pruner.update(&mut store), Err(OverrideError::NotApplied)));
}

#[test]
fn update_before_apply_fails_even_when_non_updating() {
    let mut store = CpuStore::new();
    let mut pruner = ThresholdPruner::new(0.5);
    pruner.core_mut().set_updating(false);

    assert!(matches!(pruner.update(&mut store), Err(OverrideError::NotApplied)));
}

#[test]
fn non_updating_overrider_leaves_state_unchanged() {
    let mut store = CpuStore::new();
    let mut pruner = ThresholdPruner::new(0.5);
    pruner.core_mut().set_updating(false);

    pruner.apply(&mut store, "w", Operand::Array(vec![0.1, 0.9])).unwrap();
    pruner.update(&mut store).unwrap();

    assert_eq!(store.read("w/mask").unwrap(), TensorData::Bool(vec![true, true]));
}

#[test]
fn apply_binds_name_and_captures_values() {
    let mut store = CpuStore::new();
    let mut pruner = ThresholdPruner::new(0.5);

    assert!(!pruner.core().is_applied());

    let after = pruner.apply(&mut store, "w", Operand::Array(vec![0.1, 0.9])).unwrap();
    let store_ref: &dyn ParameterStore = &store;

    assert!(pruner.core().is_applied());
    assert_eq!(pruner.core().name(), Some("w"));
    assert_eq!(after.eval(store_ref).unwrap(), vec![0.1, 0.9]);
    assert_eq!(pruner.core().after().unwrap().eval(store_ref).unwrap(), vec![0.1, 0.9]);
    assert!(store.contains("w/mask"));
}

#[test]
fn reapply_rebinds_against_current_state() {
    let mut store = CpuStore::new();
    let mut pruner = ThresholdPruner::new(0.5);

    pruner.apply(&mut store, "w", Operand::Array(vec![0.1, 0.9])).unwrap();
    pruner.update(&mut store).unwrap();
    assert_eq!(store.read("w/mask").unwrap(), TensorData::Bool(vec![false, true]));

    let after = pruner.apply(&mut store, "w", Operand::Array(vec![0.7, 0.8])).unwrap();
    assert_eq!(after.eval(&store).unwrap(), vec![0.0, 0.8]);
}

#[test]
fn assign_commits_overridden_values_into_the_parameter() {
    let mut store = CpuStore::new();
    store.insert("w", TensorData::F32(vec![1.3, -0.3]), true);

    let mut quantiser = FixedPointQuantiser::new(2, Some(4)).unwrap();
    quantiser.apply(&mut store, "w", Operand::source("w")).unwrap();
    quantiser.assign(&mut store).unwrap();

    assert_eq!(store.read("w").unwrap(), TensorData::F32(vec![1.25, -0.25]));
}

#[test]
fn reset_restores_internal_variables_not_the_parameter() {
    let mut store = CpuStore::new();
    store.insert("w", TensorData::F32(vec![1.5; 20]), true);

    let mut quantiser = DynamicFixedPointQuantiser::new(8, 0.01).unwrap();
    quantiser.apply(&mut store, "w", Operand::source("w")).unwrap();
    assert_eq!(store.read("w/point").unwrap(), TensorData::I32(vec![7]));

    quantiser.update(&mut store).unwrap();
    assert_eq!(store.read("w/point").unwrap(), TensorData::I32(vec![6]));

    quantiser.assign(&mut store).unwrap();
    let committed = store.read("w").unwrap();

    quantiser.reset(&mut store).unwrap();
    assert_eq!(store.read("w/point").unwrap(), TensorData::I32(vec![7]));
    assert_eq!(store.read("w").unwrap(), committed);
}

#[test]
fn chain_threads_value_through_children_in_order() {
    let mut store = CpuStore::new();
    let mut chain = ChainOverrider::new(vec![
        Box::new(ThresholdPruner::new(0.5)),
        Box::new(FixedPointQuantiser::new(2, Some(4)).unwrap()),
    ]);

    let after =
        chain.apply(&mut store, "w", Operand::Array(vec![0.1, -0.6, 0.4, 1.3])).unwrap();

    assert_eq!(after.eval(&store).unwrap(), vec![0.0, -0.5, 0.5, 1.25]);

    assert_eq!(chain.len(), 2);
    assert_eq!(chain[0].label(), "threshold-pruner");
    assert_eq!(chain[1].label(), "fixed-point-quantiser");
    assert_eq!(chain.iter().count(), 2);

    let info = chain.info(&store).unwrap();
    assert_eq!(
        info.field("overriders").unwrap().to_string(),
        "threshold-pruner -> fixed-point-quantiser"
    );
}

#[test]
fn chain_updates_and_resets_every_child() {
    let mut store = CpuStore::new();
    let mut chain = ChainOverrider::new(vec![
        Box::new(ThresholdPruner::new(0.5)),
        Box::new(FixedPointQuantiser::new(2, Some(4)).unwrap()),
    ]);

    chain.apply(&mut store, "w", Operand::Array(vec![0.1, -0.6, 0.4, 1.3])).unwrap();
    chain.update(&mut store).unwrap();

    assert_eq!(
        store.read("w/mask").unwrap(),
        TensorData::Bool(vec![false, true, false, true])
    );

    chain.reset(&mut store).unwrap();
    assert_eq!(store.read("w/mask").unwrap(), TensorData::Bool(vec![true; 4]));
}

#[test]
fn chain_update_before_apply_fails() {
    let mut store = CpuStore::new();
    let mut chain = ChainOverrider::new(vec![Box::new(ThresholdPruner::new(0.5))]);

    assert!(matches!(chain.update(&mut store), Err(OverrideError::NotApplied)));
}

#[test]
fn info_table_aggregates_weighted_density() {
    let mut store = CpuStore::new();

    let mut a = ThresholdPruner::new(0.5);
    a.apply(&mut store, "conv0/w", Operand::Array(vec![0.1, -0.6, 0.4, 0.9])).unwrap();
    a.update(&mut store).unwrap();

    let mut b = ThresholdPruner::new(0.5);
    b.apply(&mut store, "conv1/w", Operand::Array(vec![0.7, 0.8])).unwrap();
    b.update(&mut store).unwrap();

    let mut table = InfoTable::new();
    table.push(a.info(&store).unwrap());
    table.push(b.info(&store).unwrap());
    a.finalize_info(&mut table);

    // (0.5 * 4 + 1.0 * 2) / 6
    assert_eq!(table.footer(), Some("overall density: 66.67%"));

    let rendered = table.to_string();
    assert!(rendered.contains("conv0/w"));
    assert!(rendered.contains("density: 50.00%"));
}
