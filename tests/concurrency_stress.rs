//! ---
//! devsim_section: "05-testing"
//! devsim_subsection: "integration-tests"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Readers racing fast simulation firings."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use devsim_common::AppConfig;
use devsim_core::{AddressSpaceCoordinator, JsonTemplateLoader, LocalRuntime, SpacePlan};
use devsim_nodes::{NodeId, StatusCode, Variant};

const FLOW: &str = "InputPipe/FlowTransmitter1/Output";
const LEVEL: &str = "Drum/LevelIndicator/Output";

fn fast_plan() -> SpacePlan {
    let mut plan = SpacePlan::from_config(&AppConfig::default()).with_devices_per_kind(3);
    for kind in &mut plan.kinds {
        kind.period = Duration::from_millis(2);
    }
    plan
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_observe_partial_firings() {
    let runtime = Arc::new(LocalRuntime::default());
    let mut coordinator =
        AddressSpaceCoordinator::new(fast_plan(), runtime, Box::new(JsonTemplateLoader));
    let report = coordinator.build();
    assert!(!report.is_fatal());
    let space = coordinator.space();

    let targets: Vec<(NodeId, NodeId)> = {
        let state = space.lock();
        report
            .instances_of("boilers")
            .iter()
            .map(|handle| {
                (
                    state.nodes.resolve_path(&handle.root, FLOW).unwrap(),
                    state.nodes.resolve_path(&handle.root, LEVEL).unwrap(),
                )
            })
            .collect()
    };

    // Wait until every boiler fired at least once.
    let first = {
        let state = space.lock();
        targets
            .iter()
            .map(|(flow, _)| state.nodes.get(flow).unwrap().variable().unwrap().timestamp)
            .collect::<Vec<_>>()
    };
    for _ in 0..500 {
        let fired = {
            let state = space.lock();
            targets.iter().zip(&first).all(|((flow, _), before)| {
                state.nodes.get(flow).unwrap().variable().unwrap().timestamp != *before
            })
        };
        if fired {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let mut readers = Vec::new();
    for _ in 0..4 {
        let space = space.clone();
        let targets = targets.clone();
        readers.push(tokio::task::spawn_blocking(move || {
            for _ in 0..2_000 {
                let state = space.lock();
                for (flow, level) in &targets {
                    let flow = state.nodes.get(flow).unwrap().variable().unwrap();
                    let level = state.nodes.get(level).unwrap().variable().unwrap();
                    assert_eq!(flow.status, StatusCode::Good);
                    assert_eq!(flow.timestamp, level.timestamp, "firing observed half-applied");
                    match &flow.value {
                        Variant::Double(value) => assert!((0.0..=100.0).contains(value)),
                        other => panic!("unexpected flow value {other:?}"),
                    }
                    assert!(matches!(level.value, Variant::Double(_)));
                }
            }
        }));
    }

    let service = coordinator.service();
    let fridge = NodeId::numeric(2, 10_001);
    for _ in 0..200 {
        let value = service.read_value(&fridge);
        assert_eq!(value.status, StatusCode::Good);
        tokio::task::yield_now().await;
    }

    for reader in readers {
        reader.await.unwrap();
    }
    let stats = coordinator.scheduler().unwrap().stats();
    assert!(stats.succeeded > 0);
    assert_eq!(stats.failed, 0);

    coordinator.shutdown().await.unwrap();
    let frozen = space.lock().nodes.get(&targets[0].0).unwrap().variable().unwrap().timestamp;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let after = space.lock().nodes.get(&targets[0].0).unwrap().variable().unwrap().timestamp;
    assert_eq!(frozen, after);
}
