//! ---
//! devsim_section: "05-testing"
//! devsim_subsection: "integration-tests"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Identity uniqueness and shape preservation across many instances."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
use std::collections::HashSet;

use devsim_core::devices::{boiler, builtin_methods, refrigerator};
use devsim_core::{
    remap_identities, AddressSpace, DeviceRegistry, DeviceTemplate, InstanceFactory,
    InstanceHandle, SpaceError,
};
use devsim_nodes::{NodeBuilder, NodeId, NodeSet, RandomValueGenerator};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn registry(seed: u64) -> DeviceRegistry {
    DeviceRegistry::new(InstanceFactory::new(
        NodeBuilder::new(2, Box::new(RandomValueGenerator::new(seed))),
        builtin_methods(),
    ))
}

fn assert_isomorphic(space: &AddressSpace, template: &DeviceTemplate, handle: &InstanceHandle) {
    let state = space.lock();
    let built = state.nodes.depth_first(&handle.root);
    let shape = template.root().walk();
    assert_eq!(built.len(), shape.len(), "{} is incomplete", handle.name);
    for (index, (id, expected)) in built.iter().zip(&shape).enumerate() {
        let node = state.nodes.get(id).unwrap();
        assert_eq!(*id, NodeId::numeric(2, handle.range.offset() + expected.id));
        assert_eq!(node.class(), expected.class);
        if index > 0 {
            assert_eq!(node.browse_name.name, expected.name);
        }
        assert_eq!(node.children().len(), expected.children.len());
    }
}

#[test]
fn random_strides_keep_instances_disjoint_and_complete() {
    let mut rng = StdRng::seed_from_u64(0x1D_E7);
    let space = AddressSpace::new(10_000);
    let mut registry = registry(5);
    let templates = [refrigerator::template().unwrap(), boiler::template().unwrap()];

    let mut handles = Vec::new();
    {
        let mut state = space.lock();
        let folder = registry.create_organizer(&mut state, "Devices").unwrap();
        for index in 0..40 {
            let template = &templates[index % 2];
            let stride = template.span() + rng.gen_range(0..50);
            let handle = registry
                .register_instance(&mut state, template, &folder, &format!("Device{index}"), stride)
                .unwrap();
            handles.push((index % 2, handle));
        }
        assert!(state.nodes.links_consistent());
    }

    let mut seen = HashSet::new();
    for (kind, handle) in &handles {
        let state = space.lock();
        for id in state.nodes.depth_first(&handle.root) {
            let value = id.as_numeric().unwrap();
            assert!(handle.range.contains(value));
            assert!(seen.insert(value), "identity {value} issued twice");
        }
        drop(state);
        assert_isomorphic(&space, &templates[*kind], handle);
    }
    for pair in handles.windows(2) {
        assert!(!pair[0].1.range.overlaps(&pair[1].1.range));
        assert!(pair[0].1.range.end() <= pair[1].1.range.offset());
    }
}

#[test]
fn remapping_is_a_pure_offset() {
    let template = boiler::template().unwrap();
    let space = AddressSpace::new(0);
    let mut registry = registry(8);
    let handle = {
        let mut state = space.lock();
        let folder = registry.create_organizer(&mut state, "Boilers").unwrap();
        registry
            .register_instance_at(&mut state, &template, &folder, "Boiler1", 0, 26)
            .unwrap()
    };
    assert_isomorphic(&space, &template, &handle);

    let subtree = {
        let state = space.lock();
        let mut copy = NodeSet::new();
        let mut builder = NodeBuilder::new(2, Box::new(RandomValueGenerator::new(1)));
        for id in state.nodes.depth_first(&handle.root) {
            let node = state.nodes.get(&id).unwrap();
            let raw = id.as_numeric().unwrap();
            let parent = node.parent().filter(|_| id != handle.root).cloned();
            builder
                .object(&mut copy, parent.as_ref(), raw, &node.browse_name.name)
                .unwrap();
        }
        copy
    };
    let (moved, root) = remap_identities(subtree, &handle.root, 500).unwrap();
    assert_eq!(root, NodeId::numeric(2, 500));
    assert_eq!(moved.len(), 26);
    assert!(moved.links_consistent());
    let output = moved.resolve_path(&root, "Drum/LevelIndicator/Output").unwrap();
    assert_eq!(output, NodeId::numeric(2, 506));

    let mut lone = NodeSet::new();
    let mut builder = NodeBuilder::new(2, Box::new(RandomValueGenerator::new(1)));
    let single = builder.object(&mut lone, None, 5u32, "Lone").unwrap();
    let err = remap_identities(lone, &single, u32::MAX).unwrap_err();
    assert!(matches!(
        err,
        SpaceError::RemapOverflow { offset: u32::MAX, relative: 5 }
    ));
    assert!(err.is_contract_violation());
}

#[test]
fn exhausted_identity_space_is_rejected() {
    let space = AddressSpace::new(u32::MAX - 15);
    let mut registry = registry(2);
    let template = refrigerator::template().unwrap();
    let mut state = space.lock();
    let folder = registry.create_organizer(&mut state, "Refrigerators").unwrap();
    registry
        .register_instance(&mut state, &template, &folder, "Refrigerator1", 10)
        .unwrap();
    let err = registry
        .register_instance(&mut state, &template, &folder, "Refrigerator2", 10)
        .unwrap_err();
    assert!(matches!(err, SpaceError::IdentityOverflow { .. }));
    assert!(err.is_contract_violation());
}
