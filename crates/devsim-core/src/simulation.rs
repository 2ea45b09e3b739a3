//! ---
//! devsim_section: "03-device-simulation"
//! devsim_subsection: "module"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Device factory, registry, simulation scheduler and coordinator."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
//! Simulation bindings and the scheduler that drives them.
//!
//! Each binding runs as its own task. A firing takes the address-space lock,
//! computes every new value, writes them and releases the lock. Failures and
//! panics inside a firing are logged and the schedule carries on.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result as AnyResult;
use chrono::{DateTime, Utc};
use devsim_common::RuleKind;
use devsim_nodes::{DataType, NodeId, NodeSet, ValueRank, Variant};
use devsim_rt::{RateLimiter, TaskSet};
use rand::distributions::Uniform;
use rand::prelude::*;
use rand_distr::Normal;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

use crate::errors::{Result, SpaceError};
use crate::registry::InstanceHandle;
use crate::space::AddressSpace;

/// How a simulated variable evolves on each firing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueRule {
    Uniform { min: f64, max: f64 },
    Normal { mean: f64, std_dev: f64 },
    /// Flip a Boolean with the given probability.
    Toggle { probability: f64 },
    Constant { value: f64 },
}

impl From<&RuleKind> for ValueRule {
    fn from(kind: &RuleKind) -> Self {
        match *kind {
            RuleKind::Uniform { min, max } => ValueRule::Uniform { min, max },
            RuleKind::Normal { mean, std_dev } => ValueRule::Normal { mean, std_dev },
            RuleKind::Toggle { probability } => ValueRule::Toggle { probability },
            RuleKind::Constant { value } => ValueRule::Constant { value },
        }
    }
}

/// A rule applied to the variable at `target`, a browse path relative to the
/// instance root.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationRule {
    pub target: String,
    pub rule: ValueRule,
}

impl SimulationRule {
    pub fn new(target: impl Into<String>, rule: ValueRule) -> Self {
        Self {
            target: target.into(),
            rule,
        }
    }
}

#[derive(Debug, Clone)]
enum Sampler {
    Uniform(Uniform<f64>),
    Normal(Normal<f64>),
    Toggle(f64),
    Constant(f64),
    /// Panics on its first sample, then behaves like `Constant(0.0)`.
    #[cfg(test)]
    PanicOnce(Arc<std::sync::atomic::AtomicBool>),
}

impl Sampler {
    fn compile(target: &str, rule: ValueRule) -> Result<Self> {
        let invalid = |reason: String| SpaceError::InvalidRule {
            target: target.to_owned(),
            reason,
        };
        match rule {
            ValueRule::Uniform { min, max } => {
                if !(min.is_finite() && max.is_finite() && min <= max) {
                    return Err(invalid(format!("uniform range [{min}, {max}] is not ordered")));
                }
                Ok(Sampler::Uniform(Uniform::new_inclusive(min, max)))
            }
            ValueRule::Normal { mean, std_dev } => Normal::new(mean, std_dev)
                .map(Sampler::Normal)
                .map_err(|err| invalid(err.to_string())),
            ValueRule::Toggle { probability } => {
                if !(0.0..=1.0).contains(&probability) {
                    return Err(invalid(format!("probability {probability} outside [0, 1]")));
                }
                Ok(Sampler::Toggle(probability))
            }
            ValueRule::Constant { value } => Ok(Sampler::Constant(value)),
        }
    }

    fn accepts(&self, data_type: DataType) -> bool {
        match self {
            Sampler::Toggle(_) => data_type == DataType::Boolean,
            _ => data_type.is_numeric(),
        }
    }

    fn next(&self, current: &Variant, data_type: DataType, rng: &mut StdRng) -> Option<Variant> {
        match self {
            Sampler::Toggle(probability) => {
                let value = current.as_bool()?;
                Some(Variant::Boolean(value ^ rng.gen_bool(*probability)))
            }
            Sampler::Uniform(distribution) => Variant::from_f64(data_type, distribution.sample(rng)),
            Sampler::Normal(distribution) => Variant::from_f64(data_type, distribution.sample(rng)),
            Sampler::Constant(value) => Variant::from_f64(data_type, *value),
            #[cfg(test)]
            Sampler::PanicOnce(armed) => {
                if armed.swap(false, Ordering::SeqCst) {
                    panic!("sampler failed");
                }
                Variant::from_f64(data_type, 0.0)
            }
        }
    }
}

#[derive(Debug, Clone)]
struct BoundTarget {
    node: NodeId,
    data_type: DataType,
    sampler: Sampler,
}

/// A live instance paired with its period and resolved rules.
#[derive(Debug, Clone)]
pub struct SimulationBinding {
    instance: InstanceHandle,
    period: Duration,
    targets: Vec<BoundTarget>,
}

impl SimulationBinding {
    /// Resolve every rule target to a scalar variable of the instance.
    pub fn resolve(
        nodes: &NodeSet,
        instance: &InstanceHandle,
        period: Duration,
        rules: &[SimulationRule],
    ) -> Result<Self> {
        let mut targets = Vec::with_capacity(rules.len());
        for rule in rules {
            let unknown = || SpaceError::UnknownTarget {
                instance: instance.name.clone(),
                path: rule.target.clone(),
            };
            let node_id = nodes
                .resolve_path(&instance.root, &rule.target)
                .map_err(|_| unknown())?;
            let variable = nodes
                .get(&node_id)
                .and_then(|node| node.variable())
                .ok_or_else(unknown)?;
            let sampler = Sampler::compile(&rule.target, rule.rule)?;
            if variable.value_rank != ValueRank::Scalar || !sampler.accepts(variable.data_type) {
                return Err(SpaceError::RuleTypeMismatch {
                    target: node_id,
                    data_type: variable.data_type,
                });
            }
            targets.push(BoundTarget {
                node: node_id,
                data_type: variable.data_type,
                sampler,
            });
        }
        Ok(Self {
            instance: instance.clone(),
            period,
            targets,
        })
    }

    pub fn instance(&self) -> &InstanceHandle {
        &self.instance
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn targets(&self) -> impl Iterator<Item = &NodeId> {
        self.targets.iter().map(|target| &target.node)
    }

    /// Compute every new value, then write them all. Nothing is written when
    /// any computation fails. Returns the number of variables updated.
    pub fn fire(&self, nodes: &mut NodeSet, rng: &mut StdRng, now: DateTime<Utc>) -> Result<usize> {
        let mut updates = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            let current = nodes
                .get(&target.node)
                .and_then(|node| node.variable())
                .map(|variable| &variable.value)
                .ok_or_else(|| devsim_nodes::NodeError::UnknownNode(target.node.clone()))?;
            let value = target
                .sampler
                .next(current, target.data_type, rng)
                .ok_or(SpaceError::RuleTypeMismatch {
                    target: target.node.clone(),
                    data_type: target.data_type,
                })?;
            updates.push((&target.node, value));
        }
        let written = updates.len();
        for (node, value) in updates {
            nodes.set_value(node, value, now)?;
        }
        Ok(written)
    }
}

/// Firing counters shared by every task of a scheduler.
#[derive(Debug, Default)]
struct Counters {
    succeeded: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FiringStats {
    pub succeeded: u64,
    pub failed: u64,
}

pub struct SimulationScheduler {
    space: AddressSpace,
    shutdown: broadcast::Sender<()>,
    tasks: TaskSet,
    seed: u64,
    counters: Arc<Counters>,
}

impl SimulationScheduler {
    pub fn new(space: AddressSpace, seed: u64) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            space,
            shutdown,
            tasks: TaskSet::new("simulation"),
            seed,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Start the recurring task of `binding`. Must be called from within a
    /// tokio runtime.
    pub fn spawn(&mut self, binding: SimulationBinding) {
        let rng = StdRng::seed_from_u64(self.seed.wrapping_add(self.tasks.len() as u64));
        let shutdown = self.shutdown.subscribe();
        debug!(
            instance = %binding.instance.name,
            period_ms = binding.period.as_millis() as u64,
            targets = binding.targets.len(),
            "simulation binding scheduled"
        );
        self.tasks.spawn(run_binding(
            self.space.clone(),
            binding,
            rng,
            shutdown,
            self.counters.clone(),
        ));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn stats(&self) -> FiringStats {
        FiringStats {
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Signal every task to stop and wait for in-flight firings to finish.
    pub async fn shutdown(self) -> AnyResult<usize> {
        let _ = self.shutdown.send(());
        let joined = self.tasks.join().await?;
        info!(tasks = joined, "simulation scheduler stopped");
        Ok(joined)
    }
}

async fn run_binding(
    space: AddressSpace,
    binding: SimulationBinding,
    mut rng: StdRng,
    mut shutdown: broadcast::Receiver<()>,
    counters: Arc<Counters>,
) {
    let mut limiter = RateLimiter::delayed(binding.period);
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                debug!(instance = %binding.instance.name, "simulation task shutdown");
                break;
            }
            _ = limiter.tick() => {
                let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    let mut state = space.lock();
                    binding.fire(&mut state.nodes, &mut rng, Utc::now())
                }));
                match outcome {
                    Ok(Ok(written)) => {
                        counters.succeeded.fetch_add(1, Ordering::Relaxed);
                        trace!(instance = %binding.instance.name, written, "simulation fired");
                    }
                    Ok(Err(err)) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(instance = %binding.instance.name, error = %err, "simulation firing failed");
                    }
                    Err(_) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        error!(instance = %binding.instance.name, "simulation firing panicked");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{builtin_methods, refrigerator};
    use crate::factory::InstanceFactory;
    use crate::registry::DeviceRegistry;
    use devsim_nodes::{NodeBuilder, RandomValueGenerator};

    fn fridge(space: &AddressSpace) -> InstanceHandle {
        let mut registry = DeviceRegistry::new(InstanceFactory::new(
            NodeBuilder::new(2, Box::new(RandomValueGenerator::new(8))),
            builtin_methods(),
        ));
        let mut state = space.lock();
        let folder = registry.create_organizer(&mut state, "Refrigerators").unwrap();
        let template = refrigerator::template().unwrap();
        registry
            .register_instance(&mut state, &template, &folder, "Refrigerator1", 10)
            .unwrap()
    }

    fn value_of(space: &AddressSpace, id: &NodeId) -> Variant {
        space.lock().nodes.get(id).unwrap().variable().unwrap().value.clone()
    }

    #[test]
    fn firing_writes_values_inside_the_rule_range() {
        let space = AddressSpace::new(10_000);
        let handle = fridge(&space);
        let rules = [SimulationRule::new(
            refrigerator::ACTUAL_TEMPERATURE,
            ValueRule::Uniform { min: -5.0, max: 2.0 },
        )];
        let binding = {
            let state = space.lock();
            SimulationBinding::resolve(&state.nodes, &handle, Duration::from_secs(5), &rules).unwrap()
        };
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let mut state = space.lock();
            assert_eq!(binding.fire(&mut state.nodes, &mut rng, Utc::now()).unwrap(), 1);
            drop(state);
            let value = value_of(&space, &NodeId::numeric(2, 10_001)).as_f64().unwrap();
            assert!((-5.0..=2.0).contains(&value), "{value} outside range");
        }
    }

    #[test]
    fn toggle_with_certainty_flips_every_time() {
        let space = AddressSpace::new(10_000);
        let handle = fridge(&space);
        let rules = [SimulationRule::new(
            refrigerator::STATE,
            ValueRule::Toggle { probability: 1.0 },
        )];
        let binding = {
            let state = space.lock();
            SimulationBinding::resolve(&state.nodes, &handle, Duration::from_secs(1), &rules).unwrap()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let state_id = NodeId::numeric(2, 10_007);
        assert_eq!(value_of(&space, &state_id), Variant::Boolean(true));
        binding.fire(&mut space.lock().nodes, &mut rng, Utc::now()).unwrap();
        assert_eq!(value_of(&space, &state_id), Variant::Boolean(false));
    }

    #[test]
    fn resolve_rejects_unknown_and_mistyped_targets() {
        let space = AddressSpace::new(10_000);
        let handle = fridge(&space);
        let state = space.lock();
        let unknown = [SimulationRule::new("Compressor", ValueRule::Constant { value: 1.0 })];
        assert!(matches!(
            SimulationBinding::resolve(&state.nodes, &handle, Duration::from_secs(1), &unknown),
            Err(SpaceError::UnknownTarget { .. })
        ));
        let mistyped = [SimulationRule::new(
            refrigerator::DOOR_STATE,
            ValueRule::Uniform { min: 0.0, max: 1.0 },
        )];
        assert!(matches!(
            SimulationBinding::resolve(&state.nodes, &handle, Duration::from_secs(1), &mistyped),
            Err(SpaceError::RuleTypeMismatch { .. })
        ));
        let inverted = [SimulationRule::new(
            refrigerator::ACTUAL_TEMPERATURE,
            ValueRule::Uniform { min: 3.0, max: -3.0 },
        )];
        assert!(matches!(
            SimulationBinding::resolve(&state.nodes, &handle, Duration::from_secs(1), &inverted),
            Err(SpaceError::InvalidRule { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failing_firings_do_not_stop_the_schedule() {
        let source = AddressSpace::new(10_000);
        let handle = fridge(&source);
        let rules = [SimulationRule::new(
            refrigerator::ACTUAL_TEMPERATURE,
            ValueRule::Constant { value: 1.0 },
        )];
        let binding = {
            let state = source.lock();
            SimulationBinding::resolve(&state.nodes, &handle, Duration::from_millis(20), &rules)
                .unwrap()
        };

        // An empty space makes every firing miss its target.
        let mut scheduler = SimulationScheduler::new(AddressSpace::new(10_000), 5);
        scheduler.spawn(binding);
        tokio::time::sleep(Duration::from_millis(150)).await;
        let stats = scheduler.stats();
        assert!(stats.failed >= 2, "{stats:?}");
        assert_eq!(stats.succeeded, 0);
        assert_eq!(scheduler.shutdown().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_firing_is_contained() {
        let space = AddressSpace::new(10_000);
        let handle = fridge(&space);
        let target = NodeId::numeric(2, 10_001);
        let binding = SimulationBinding {
            instance: handle,
            period: Duration::from_millis(20),
            targets: vec![BoundTarget {
                node: target.clone(),
                data_type: DataType::Double,
                sampler: Sampler::PanicOnce(Arc::new(std::sync::atomic::AtomicBool::new(true))),
            }],
        };

        let mut scheduler = SimulationScheduler::new(space.clone(), 5);
        scheduler.spawn(binding);
        tokio::time::sleep(Duration::from_millis(150)).await;
        let stats = scheduler.stats();
        assert_eq!(stats.failed, 1, "{stats:?}");
        assert!(stats.succeeded >= 1, "{stats:?}");
        assert_eq!(scheduler.shutdown().await.unwrap(), 1);
        assert_eq!(value_of(&space, &target), Variant::Double(0.0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn scheduled_binding_updates_the_live_space() {
        let space = AddressSpace::new(10_000);
        let handle = fridge(&space);
        let rules = [SimulationRule::new(
            refrigerator::MOTOR_TEMPERATURE,
            ValueRule::Constant { value: 42.5 },
        )];
        let binding = {
            let state = space.lock();
            SimulationBinding::resolve(&state.nodes, &handle, Duration::from_millis(20), &rules)
                .unwrap()
        };
        let mut scheduler = SimulationScheduler::new(space.clone(), 5);
        scheduler.spawn(binding);
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(scheduler.stats().succeeded >= 1);
        scheduler.shutdown().await.unwrap();
        assert_eq!(
            value_of(&space, &NodeId::numeric(2, 10_002)),
            Variant::Double(42.5)
        );
    }
}
