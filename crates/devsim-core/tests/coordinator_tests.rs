//! ---
//! devsim_section: "03-device-simulation"
//! devsim_subsection: "tests"
//! devsim_type: "test"
//! devsim_scope: "code"
//! devsim_description: "Coordinator build and shutdown behaviour."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use devsim_common::AppConfig;
use devsim_core::{
    AddressSpaceCoordinator, CoordinatorState, DeviceKindPlan, JsonTemplateLoader, LocalRuntime,
    MethodTable, SimulationRule, SpacePlan, TemplateSource, ValueRule,
};
use devsim_nodes::{NodeBuilder, NodeId, RandomValueGenerator, StatusCode, Variant};
use tempfile::NamedTempFile;

fn coordinator(plan: SpacePlan) -> (AddressSpaceCoordinator, Arc<LocalRuntime>) {
    let runtime = Arc::new(LocalRuntime::default());
    let coordinator =
        AddressSpaceCoordinator::new(plan, runtime.clone(), Box::new(JsonTemplateLoader));
    (coordinator, runtime)
}

fn json_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[tokio::test]
async fn reference_deployment_builds_ten_devices() {
    let plan = SpacePlan::from_config(&AppConfig::default());
    let (mut coordinator, runtime) = coordinator(plan);
    let report = coordinator.build();

    assert!(!report.is_fatal());
    assert!(report.failures.is_empty());
    assert_eq!(report.namespace, Some(2));
    assert_eq!(coordinator.state(), CoordinatorState::Ready);
    assert_eq!(report.instance_count(), 10);

    let offsets: Vec<u32> = report
        .instances_of("refrigerators")
        .iter()
        .map(|handle| handle.range.offset())
        .collect();
    assert_eq!(offsets, vec![10_000, 10_010, 10_020, 10_030, 10_040]);
    assert_eq!(report.instances_of("boilers")[0].range.offset(), 10_050);
    assert_eq!(report.instances_of("boilers")[4].range.offset(), 10_450);
    assert_eq!(report.instances_of("refrigerators")[0].name, "Refrigerator1");

    assert_eq!(coordinator.space().node_count(), 2 + 5 * 9 + 5 * 26);
    assert_eq!(
        runtime.root_references(&NodeId::objects_folder()),
        vec![NodeId::new(2, "Refrigerators"), NodeId::new(2, "Boilers")]
    );
    assert_eq!(runtime.node_managers(), vec![2]);
    assert_eq!(coordinator.scheduler().map(|s| s.len()), Some(10));
    {
        let space = coordinator.space();
        let state = space.lock();
        assert!(state.nodes.links_consistent());
        let binding = state.device("Refrigerator1").unwrap().binding.clone().unwrap();
        assert_eq!(binding.period, Duration::from_secs(5));
        assert_eq!(binding.targets, vec![NodeId::numeric(2, 10_001)]);
    }

    coordinator.shutdown().await.unwrap();
    assert_eq!(coordinator.state(), CoordinatorState::Closed);
    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn collision_stops_only_the_affected_kind() {
    let plan = SpacePlan::from_config(&AppConfig::default());
    let (mut coordinator, _) = coordinator(plan);
    {
        let space = coordinator.space();
        let mut state = space.lock();
        let mut stray = NodeBuilder::new(2, Box::new(RandomValueGenerator::new(9)));
        stray.object(&mut state.nodes, None, 10_025u32, "Stray").unwrap();
    }

    let report = coordinator.build();
    assert!(!report.is_fatal());
    assert_eq!(coordinator.state(), CoordinatorState::Ready);
    assert_eq!(report.instances_of("refrigerators").len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].instance.as_deref(), Some("Refrigerator3"));

    let boilers = report.instances_of("boilers");
    assert_eq!(boilers.len(), 5);
    assert_eq!(boilers[0].range.offset(), 10_030);
    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn undersized_stride_is_a_contract_violation() {
    let mut plan = SpacePlan::from_config(&AppConfig::default());
    plan.kinds[0].stride = 5;
    let (mut coordinator, _) = coordinator(plan);

    let report = coordinator.build();
    assert!(report.is_fatal());
    assert!(report
        .contract_violation
        .as_deref()
        .unwrap()
        .contains("stride 5"));
    assert_eq!(coordinator.state(), CoordinatorState::Uninitialized);
    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn missing_method_handler_is_a_contract_violation() {
    let plan = SpacePlan::from_config(&AppConfig::default()).with_devices_per_kind(2);
    let (coordinator, _) = coordinator(plan);
    let mut coordinator = coordinator.with_methods(MethodTable::new());

    let report = coordinator.build();
    assert!(report.is_fatal());
    assert!(report
        .contract_violation
        .as_deref()
        .unwrap()
        .contains("OpenCloseDoor"));
    assert!(report.instances.is_empty());
    assert_eq!(coordinator.state(), CoordinatorState::Uninitialized);
    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn unknown_template_is_absorbed() {
    let mut plan = SpacePlan::from_config(&AppConfig::default()).with_devices_per_kind(2);
    plan.kinds[0].template = TemplateSource::Builtin("chiller".to_owned());
    plan.simulate = false;
    let (mut coordinator, _) = coordinator(plan);

    let report = coordinator.build();
    assert!(!report.is_fatal());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, "refrigerators");
    assert!(report.instances_of("refrigerators").is_empty());
    assert_eq!(report.instances_of("boilers").len(), 2);
    assert_eq!(report.instances_of("boilers")[0].range.offset(), 10_000);
    assert_eq!(coordinator.scheduler().map(|s| s.len()), Some(0));
}

#[tokio::test]
async fn imports_static_nodes_and_file_templates() {
    let import = json_file(
        r#"{ "nodes": [ { "id": 10, "name": "Plant", "class": "folder", "children": [
             { "id": 11, "name": "Ambient", "class": "variable", "data_type": "Double",
               "initial": { "Double": 21.5 } } ] } ] }"#,
    );
    let pumps = json_file(
        r#"{ "nodes": [ { "id": 0, "name": "Pump", "class": "object", "children": [
             { "id": 1, "name": "Speed", "class": "variable", "data_type": "Double" },
             { "id": 2, "name": "Running", "class": "variable", "data_type": "Boolean" } ] } ] }"#,
    );
    let plan = SpacePlan {
        namespace_uri: "urn:test:pumps".to_owned(),
        base_offset: 1_000,
        seed: 11,
        null_frequency: 0.0,
        simulate: true,
        static_import: Some(import.path().to_path_buf()),
        kinds: vec![DeviceKindPlan {
            kind: "pumps".to_owned(),
            template: TemplateSource::File {
                path: pumps.path().to_path_buf(),
                root: "Pump".to_owned(),
            },
            folder: "Pumps".to_owned(),
            name_prefix: "Pump".to_owned(),
            count: 3,
            stride: 4,
            period: Duration::from_secs(60),
            rules: vec![SimulationRule::new("Speed", ValueRule::Constant { value: 1450.0 })],
        }],
    };
    let (mut coordinator, runtime) = coordinator(plan);
    let report = coordinator.build();

    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.imported, vec![NodeId::numeric(2, 10)]);
    assert_eq!(
        runtime.root_references(&NodeId::objects_folder()),
        vec![NodeId::numeric(2, 10), NodeId::new(2, "Pumps")]
    );
    let pumps = report.instances_of("pumps");
    assert_eq!(pumps.len(), 3);
    assert_eq!(pumps[2].root, NodeId::numeric(2, 1_008));

    let service = coordinator.service();
    let ambient = service.read_value(&NodeId::numeric(2, 11));
    assert_eq!(ambient.status, StatusCode::Good);
    assert_eq!(ambient.value, Some(Variant::Double(21.5)));
    assert_eq!(coordinator.scheduler().map(|s| s.len()), Some(3));

    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn second_build_is_a_no_op() {
    let plan = SpacePlan::from_config(&AppConfig::default()).with_devices_per_kind(1);
    let (mut coordinator, _) = coordinator(plan);
    assert_eq!(coordinator.build().instance_count(), 2);
    let again = coordinator.build();
    assert_eq!(again.instance_count(), 0);
    assert_eq!(coordinator.space().instances().len(), 2);
    coordinator.shutdown().await.unwrap();
}
