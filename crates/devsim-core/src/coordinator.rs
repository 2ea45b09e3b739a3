//! ---
//! devsim_section: "03-device-simulation"
//! devsim_subsection: "module"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Device factory, registry, simulation scheduler and coordinator."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
//! Address-space coordinator: builds the organizer folders and every device
//! instance, starts their simulations and stops them again at shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result as AnyResult;
use devsim_common::AppConfig;
use devsim_nodes::{NodeBuilder, NodeId, RandomValueGenerator};
use indexmap::IndexMap;
use serde::Serialize;
use strum::Display;
use tracing::{error, info, warn};

use crate::devices::{builtin_methods, builtin_template};
use crate::errors::{Result, SpaceError};
use crate::factory::{InstanceFactory, MethodTable};
use crate::registry::{DeviceRegistry, InstanceHandle};
use crate::runtime::ServerRuntime;
use crate::service::AttributeService;
use crate::simulation::{SimulationRule, SimulationScheduler, ValueRule};
use crate::space::{AddressSpace, SpaceState};
use crate::template::{DeviceTemplate, StaticTemplateLoader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum CoordinatorState {
    Uninitialized,
    Building,
    Ready,
    ShuttingDown,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    Builtin(String),
    /// Top-level node `root` of a static template file.
    File { path: PathBuf, root: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceKindPlan {
    pub kind: String,
    pub template: TemplateSource,
    pub folder: String,
    pub name_prefix: String,
    pub count: u32,
    pub stride: u32,
    pub period: Duration,
    pub rules: Vec<SimulationRule>,
}

impl DeviceKindPlan {
    pub fn instance_name(&self, index: u32) -> String {
        format!("{}{}", self.name_prefix, index)
    }
}

/// Everything the coordinator needs to build the address space.
#[derive(Debug, Clone, PartialEq)]
pub struct SpacePlan {
    pub namespace_uri: String,
    pub base_offset: u32,
    pub seed: u64,
    pub null_frequency: f64,
    pub simulate: bool,
    pub static_import: Option<PathBuf>,
    pub kinds: Vec<DeviceKindPlan>,
}

impl SpacePlan {
    pub fn from_config(config: &AppConfig) -> Self {
        let kinds = config
            .devices
            .iter()
            .map(|(kind, device)| DeviceKindPlan {
                kind: kind.clone(),
                template: match &device.template_path {
                    Some(path) => TemplateSource::File {
                        path: path.clone(),
                        root: device.template.clone(),
                    },
                    None => TemplateSource::Builtin(device.template.clone()),
                },
                folder: device.folder.clone(),
                name_prefix: device.name_prefix.clone(),
                count: device.count,
                stride: device.stride,
                period: device.period,
                rules: device
                    .rules
                    .iter()
                    .map(|rule| SimulationRule::new(rule.target.clone(), ValueRule::from(&rule.kind)))
                    .collect(),
            })
            .collect();
        Self {
            namespace_uri: config.server.namespace_uri.clone(),
            base_offset: config.identity.base_offset,
            seed: config.simulation.random_seed,
            null_frequency: config.simulation.null_frequency,
            simulate: config.simulation.enabled,
            static_import: config.server.static_import.clone(),
            kinds,
        }
    }

    /// Override the instance count of every device kind.
    pub fn with_devices_per_kind(mut self, count: u32) -> Self {
        for kind in &mut self.kinds {
            kind.count = count;
        }
        self
    }
}

/// A construction error absorbed during building.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildFailure {
    pub kind: String,
    pub instance: Option<String>,
    pub error: String,
}

/// Outcome of [`AddressSpaceCoordinator::build`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    pub namespace: Option<u16>,
    pub imported: Vec<NodeId>,
    pub instances: IndexMap<String, Vec<InstanceHandle>>,
    pub failures: Vec<BuildFailure>,
    pub contract_violation: Option<String>,
}

impl BuildReport {
    pub fn is_fatal(&self) -> bool {
        self.contract_violation.is_some()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.values().map(Vec::len).sum()
    }

    pub fn instances_of(&self, kind: &str) -> &[InstanceHandle] {
        self.instances.get(kind).map(Vec::as_slice).unwrap_or_default()
    }

    fn fail(&mut self, kind: &str, instance: Option<&str>, err: &SpaceError) {
        warn!(kind, instance, error = %err, "construction error absorbed");
        self.failures.push(BuildFailure {
            kind: kind.to_owned(),
            instance: instance.map(str::to_owned),
            error: err.to_string(),
        });
    }
}

pub struct AddressSpaceCoordinator {
    plan: SpacePlan,
    runtime: Arc<dyn ServerRuntime>,
    loader: Box<dyn StaticTemplateLoader>,
    methods: MethodTable,
    space: AddressSpace,
    scheduler: Option<SimulationScheduler>,
    state: CoordinatorState,
}

impl AddressSpaceCoordinator {
    pub fn new(
        plan: SpacePlan,
        runtime: Arc<dyn ServerRuntime>,
        loader: Box<dyn StaticTemplateLoader>,
    ) -> Self {
        let space = AddressSpace::new(plan.base_offset);
        Self {
            plan,
            runtime,
            loader,
            methods: builtin_methods(),
            space,
            scheduler: None,
            state: CoordinatorState::Uninitialized,
        }
    }

    /// Replace the method handler table used for every instance.
    pub fn with_methods(mut self, methods: MethodTable) -> Self {
        self.methods = methods;
        self
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn space(&self) -> AddressSpace {
        self.space.clone()
    }

    pub fn service(&self) -> AttributeService {
        AttributeService::new(self.space.clone())
    }

    pub fn scheduler(&self) -> Option<&SimulationScheduler> {
        self.scheduler.as_ref()
    }

    /// Populate the address space. Must run inside a tokio runtime when
    /// simulation is enabled.
    ///
    /// Construction errors stop the affected device kind and are recorded in
    /// the report; building continues with the next kind. A contract violation
    /// stops building and leaves the coordinator uninitialized.
    pub fn build(&mut self) -> BuildReport {
        let mut report = BuildReport::default();
        if self.state != CoordinatorState::Uninitialized {
            warn!(state = %self.state, "address space already built");
            return report;
        }
        self.state = CoordinatorState::Building;
        info!(kinds = self.plan.kinds.len(), "building address space");

        match self.populate(&mut report) {
            Ok(()) => {
                self.state = CoordinatorState::Ready;
                info!(
                    instances = report.instance_count(),
                    failures = report.failures.len(),
                    nodes = self.space.node_count(),
                    "address space ready"
                );
            }
            Err(err) => {
                error!(error = %err, "contract violation while building the address space");
                report.contract_violation = Some(err.to_string());
                self.state = CoordinatorState::Uninitialized;
            }
        }
        report
    }

    fn populate(&mut self, report: &mut BuildReport) -> Result<()> {
        let namespace = self
            .runtime
            .register_namespace(std::slice::from_ref(&self.plan.namespace_uri))?;
        report.namespace = Some(namespace);

        let values = RandomValueGenerator::new(self.plan.seed)
            .with_null_frequency(self.plan.null_frequency);
        let factory = InstanceFactory::new(
            NodeBuilder::new(namespace, Box::new(values)),
            self.methods.clone(),
        );
        let mut registry = DeviceRegistry::new(factory);
        let scheduler = self
            .scheduler
            .insert(SimulationScheduler::new(self.space.clone(), self.plan.seed));

        // File reads happen before the lock is taken.
        let import = match &self.plan.static_import {
            Some(path) => match self.loader.load_static_template(path) {
                Ok(document) => Some(document),
                Err(err) => {
                    report.fail("static-import", None, &err);
                    None
                }
            },
            None => None,
        };
        let templates: Vec<Result<DeviceTemplate>> = self
            .plan
            .kinds
            .iter()
            .map(|kind| match &kind.template {
                TemplateSource::Builtin(name) => builtin_template(name),
                TemplateSource::File { path, root } => self
                    .loader
                    .load_static_template(path)
                    .and_then(|document| document.template(root)),
            })
            .collect();

        let mut state = self.space.lock();
        if let Some(document) = import {
            match registry.import_predefined(&mut state, &document) {
                Ok(roots) => {
                    for root in &roots {
                        self.runtime
                            .attach_root_reference(root, &NodeId::objects_folder())?;
                    }
                    report.imported = roots;
                }
                Err(err) if err.is_contract_violation() => return Err(err),
                Err(err) => report.fail("static-import", None, &err),
            }
        }

        for (kind, template) in self.plan.kinds.iter().zip(templates) {
            let template = match template {
                Ok(template) => template,
                Err(err) => {
                    report.fail(&kind.kind, None, &err);
                    continue;
                }
            };
            let folder = match registry.create_organizer(&mut state, &kind.folder) {
                Ok(folder) => folder,
                Err(err) => {
                    report.fail(&kind.kind, None, &err);
                    continue;
                }
            };
            self.runtime
                .attach_root_reference(&folder, &NodeId::objects_folder())?;
            let built = populate_kind(
                &mut registry,
                scheduler,
                &mut state,
                kind,
                &template,
                &folder,
                self.plan.simulate,
                report,
            )?;
            report.instances.insert(kind.kind.clone(), built);
        }
        drop(state);

        // Nodes imported or created after namespace registration become
        // visible through an explicit registration.
        self.runtime.register_node_manager(namespace)?;
        Ok(())
    }

    /// Stop every simulation task, wait for in-flight firings, then take the
    /// lock one final time.
    pub async fn shutdown(&mut self) -> AnyResult<()> {
        if matches!(self.state, CoordinatorState::ShuttingDown | CoordinatorState::Closed) {
            return Ok(());
        }
        self.state = CoordinatorState::ShuttingDown;
        let stopped = match self.scheduler.take() {
            Some(scheduler) => scheduler.shutdown().await?,
            None => 0,
        };
        let devices = self.space.lock().devices.len();
        self.state = CoordinatorState::Closed;
        info!(tasks = stopped, devices, "address space closed");
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
fn populate_kind(
    registry: &mut DeviceRegistry,
    scheduler: &mut SimulationScheduler,
    state: &mut SpaceState,
    kind: &DeviceKindPlan,
    template: &DeviceTemplate,
    folder: &NodeId,
    simulate: bool,
    report: &mut BuildReport,
) -> Result<Vec<InstanceHandle>> {
    let mut built = Vec::with_capacity(kind.count as usize);
    for index in 1..=kind.count {
        let name = kind.instance_name(index);
        let handle = match registry.register_instance(state, template, folder, &name, kind.stride) {
            Ok(handle) => handle,
            Err(err) if err.is_contract_violation() => return Err(err),
            Err(err) => {
                report.fail(&kind.kind, Some(&name), &err);
                break;
            }
        };
        if simulate && !kind.rules.is_empty() {
            if let Err(err) =
                registry.attach_simulation(state, scheduler, &handle, kind.period, &kind.rules)
            {
                report.fail(&kind.kind, Some(&name), &err);
            }
        }
        built.push(handle);
    }
    Ok(built)
}
