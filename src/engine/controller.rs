//! The graph controller owns the live graph and mediates every mutation.
//!
//! Topology changes happen inside a whole-graph critical section, so a
//! toggle always completes before the next one is accepted. `start()`
//! releases that lock while data flows and only re-takes it to tear the
//! graph down.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};

use super::negotiate::{bind, negotiate_chain};
use super::stage::{BusMessage, Flow, RunningStage, Stage, StageCommand, StageHandle, StageLinks};
use super::state::ControllerState;
use crate::core::{Element, ElementId};
use crate::description::{PipelineConfig, PipelineDescription};
use crate::error::{PipelineError, Result};
use crate::factory::ElementFactoryRegistry;
use crate::observability::{ElementMetrics, MetricsCollector};
use crate::registry::{ElementInfo, ElementRegistry, LiveElementState};

const CONTROL_CAPACITY: usize = 4;

pub struct GraphController {
    factories: Arc<ElementFactoryRegistry>,
    graph: Mutex<Graph>,
    stop_tx: watch::Sender<bool>,
}

#[derive(Default)]
struct Graph {
    state: ControllerState,
    registry: ElementRegistry,
    config: PipelineConfig,
    metrics: MetricsCollector,
    flow: Option<FlowContext>,
}

/// Channels shared by every stage of one flowing graph
struct FlowContext {
    shutdown_tx: broadcast::Sender<()>,
    bus_tx: mpsc::UnboundedSender<BusMessage>,
}

impl Graph {
    fn transition_to(&mut self, target: ControllerState) -> Result<()> {
        if !self.state.can_transition_to(target) {
            return Err(PipelineError::InvalidState {
                operation: "transition",
                state: self.state.name(),
            });
        }
        log::trace!("Graph state: {} -> {}", self.state, target);
        self.state = target;
        Ok(())
    }

    fn element(&self, id: ElementId) -> Result<&LiveElementState> {
        self.registry.get(id).ok_or(PipelineError::ElementNotFound(id))
    }

    fn element_mut(&mut self, id: ElementId) -> Result<&mut LiveElementState> {
        self.registry.get_mut(id).ok_or(PipelineError::ElementNotFound(id))
    }

    fn metrics_for(&self, id: ElementId) -> Arc<ElementMetrics> {
        self.metrics.get(id).unwrap_or_else(|| {
            let name = self.registry.get(id).map_or("", |e| e.spec().name.as_str());
            Arc::new(ElementMetrics::new(id, name))
        })
    }

    fn running(&self, id: ElementId) -> Option<&RunningStage> {
        self.registry.get(id).and_then(|e| e.handle().running())
    }

    /// Input link of a running stage, if it has one
    fn input_of(&self, id: Option<ElementId>) -> Option<mpsc::Sender<Flow>> {
        id.and_then(|id| self.running(id)).and_then(|stage| stage.input.clone())
    }

    /// Returns the element's instance, creating and configuring a new one
    /// when none can be reused
    async fn take_instance(&mut self, id: ElementId) -> Result<Box<dyn Element>> {
        let element = self.element_mut(id)?;
        if let StageHandle::Idle(instance) = element.handle.take() {
            return Ok(instance);
        }

        let spec = element.spec().clone();
        let binding = element.binding().cloned().ok_or_else(|| PipelineError::BuildFailure {
            id,
            name: spec.name.clone(),
            reason: "element type has not been resolved".to_string(),
        })?;

        let mut instance = binding.metadata.create_instance();
        instance
            .on_create(&spec.properties, &binding.filter)
            .await
            .map_err(|e| PipelineError::BuildFailure {
                id,
                name: spec.name.clone(),
                reason: format!("{:#}", e),
            })?;
        log::trace!("Instantiated {} ({}) as {}", id, spec.name, binding.metadata.type_name);
        Ok(instance)
    }

    /// Spawns a stage for `id` whose output feeds `output`
    fn spawn_stage(
        &mut self,
        id: ElementId,
        instance: Box<dyn Element>,
        output: Option<mpsc::Sender<Flow>>,
    ) -> Result<()> {
        let capacity = self.config.channel_capacity;
        let metrics = self.metrics_for(id);
        let flow = self.flow.as_ref().ok_or(PipelineError::InvalidState {
            operation: "spawn a stage",
            state: self.state.name(),
        })?;

        let element = self.element(id)?;
        let is_source = element.binding().map_or(false, |b| b.is_source());
        let name = element.spec().name.clone();

        let (input_tx, input_rx) = if is_source {
            (None, None)
        } else {
            let (tx, rx) = mpsc::channel(capacity);
            (Some(tx), Some(rx))
        };
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);

        let links = StageLinks {
            input: input_rx,
            output,
            control: control_rx,
            shutdown: flow.shutdown_tx.subscribe(),
            bus: flow.bus_tx.clone(),
        };
        let join = Stage::spawn(id, name, instance, links, metrics);

        self.element_mut(id)?.handle = StageHandle::Running(RunningStage {
            input: input_tx,
            control: control_tx,
            join,
        });
        Ok(())
    }
}

/// Runs the element's release hook and drops the instance
async fn release(id: ElementId, mut instance: Box<dyn Element>) {
    if let Err(e) = instance.on_release().await {
        log::warn!("Element {} failed to release cleanly: {:#}", id, e);
    }
}

/// Waits for a stage task and recovers its element. The control link
/// stays open until the task has exited, so a stage draining towards an
/// `Unlink` marker is not cut short.
async fn join_stage(id: ElementId, stage: RunningStage) -> Option<Box<dyn Element>> {
    let RunningStage { input, control, join } = stage;
    drop(input);

    let joined = join.await;
    drop(control);

    match joined {
        Ok(instance) => Some(instance),
        Err(e) => {
            log::error!("Stage {} did not exit cleanly: {}", id, e);
            None
        }
    }
}

impl GraphController {
    pub fn new(factories: Arc<ElementFactoryRegistry>) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            factories,
            graph: Mutex::new(Graph::default()),
            stop_tx,
        }
    }

    /// Controller using the built-in element types
    pub fn with_builtins() -> Self {
        Self::new(Arc::new(ElementFactoryRegistry::with_builtins()))
    }

    pub async fn state(&self) -> ControllerState {
        self.graph.lock().await.state
    }

    pub async fn elements(&self) -> Vec<ElementInfo> {
        self.graph.lock().await.registry.infos()
    }

    /// Ids of the active elements in flow order
    pub async fn active_chain(&self) -> Vec<ElementId> {
        self.graph.lock().await.registry.active_chain()
    }

    pub async fn is_active(&self, id: ElementId) -> Result<bool> {
        Ok(self.graph.lock().await.element(id)?.is_active())
    }

    pub async fn metrics(&self) -> MetricsCollector {
        self.graph.lock().await.metrics.clone()
    }

    /// Resolves every element, instantiates the active ones and checks
    /// that the active chain negotiates. A controller is built only once.
    pub async fn build(&self, description: PipelineDescription) -> Result<()> {
        let mut graph = self.graph.lock().await;
        if graph.state != ControllerState::Unbuilt {
            return Err(PipelineError::InvalidState {
                operation: "build",
                state: graph.state.name(),
            });
        }

        let mut registry = ElementRegistry::new(&description);
        if let Some(duplicate) = registry.duplicate_name() {
            return Err(PipelineError::BuildFailure {
                id: duplicate.id(),
                name: duplicate.spec().name.clone(),
                reason: "element name is already in use".to_string(),
            });
        }

        let mut metrics = MetricsCollector::new();
        for element in registry.iter_mut() {
            let binding = bind(element.spec(), &self.factories)?;
            element.bind(binding);
            metrics.register(Arc::new(ElementMetrics::new(element.id(), element.spec().name.clone())));
        }

        negotiate_chain(&registry, &registry.active_chain())?;

        let mut staged = Graph {
            state: ControllerState::Unbuilt,
            registry,
            config: description.config().clone(),
            metrics,
            flow: None,
        };
        for id in staged.registry.active_chain() {
            let instance = staged.take_instance(id).await?;
            staged.element_mut(id)?.handle = StageHandle::Idle(instance);
        }

        staged.transition_to(ControllerState::Built)?;
        log::info!(
            "Built pipeline: {}",
            staged.registry.describe_chain(&staged.registry.active_chain())
        );
        *graph = staged;
        Ok(())
    }

    /// Starts data flow and waits until it ends.
    ///
    /// Returns `Ok` after end-of-stream or `stop()`, and `RuntimeFault` if
    /// a stage failed. The graph is torn down before returning either way.
    pub async fn start(&self) -> Result<()> {
        let (mut bus_rx, mut stop_rx) = {
            let mut graph = self.graph.lock().await;
            if graph.state != ControllerState::Built {
                return Err(PipelineError::InvalidState {
                    operation: "start",
                    state: graph.state.name(),
                });
            }

            let (bus_tx, bus_rx) = mpsc::unbounded_channel();
            let (shutdown_tx, _) = broadcast::channel(1);
            graph.flow = Some(FlowContext { shutdown_tx, bus_tx });

            self.stop_tx.send_replace(false);
            let stop_rx = self.stop_tx.subscribe();

            if let Err(e) = Self::launch(&mut graph).await {
                drop(graph);
                self.teardown().await;
                return Err(e);
            }
            (bus_rx, stop_rx)
        };

        // A stop issued while the stages were spawning
        let stopped_early = *stop_rx.borrow_and_update();
        let outcome = loop {
            if stopped_early {
                log::info!("Stop requested");
                break Ok(());
            }
            tokio::select! {
                message = bus_rx.recv() => match message {
                    Some(BusMessage::Eos { id }) => {
                        log::info!("End of stream reached at element {}", id);
                        break Ok(());
                    }
                    Some(BusMessage::Fault { id, name, reason }) => {
                        break Err(PipelineError::RuntimeFault { id, name, reason });
                    }
                    None => break Ok(()),
                },
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        log::info!("Stop requested");
                        break Ok(());
                    }
                }
            }
        };

        self.teardown().await;
        outcome
    }

    /// Spawns the active chain downstream first, so every stage's output
    /// link already exists
    async fn launch(graph: &mut Graph) -> Result<()> {
        let chain = graph.registry.active_chain();
        let mut next_input = None;
        for &id in chain.iter().rev() {
            let instance = graph.take_instance(id).await?;
            graph.spawn_stage(id, instance, next_input.take())?;
            next_input = graph.input_of(Some(id));
        }

        graph.transition_to(ControllerState::Flowing)?;
        log::info!("Pipeline flowing: {}", graph.registry.describe_chain(&chain));
        Ok(())
    }

    /// Requests termination of a flowing graph. Never fails and may be
    /// called any number of times from any thread.
    pub fn stop(&self) {
        self.stop_tx.send_if_modified(|stopped| {
            if *stopped {
                false
            } else {
                *stopped = true;
                true
            }
        });
    }

    async fn teardown(&self) {
        let mut graph = self.graph.lock().await;

        if let Some(flow) = graph.flow.take() {
            let _ = flow.shutdown_tx.send(());
        }

        let running: Vec<(ElementId, RunningStage)> = graph
            .registry
            .iter_mut()
            .filter_map(|element| match element.handle.take() {
                StageHandle::Running(stage) => Some((element.id(), stage)),
                other => {
                    element.handle = other;
                    None
                }
            })
            .collect();

        for (id, stage) in running {
            if let Some(instance) = join_stage(id, stage).await {
                release(id, instance).await;
            }
        }
        for element in graph.registry.iter_mut() {
            element.handle = StageHandle::Released;
        }

        if graph.state == ControllerState::Built {
            log::warn!("Tearing down a graph that never started flowing");
        }
        if let Err(e) = graph.transition_to(ControllerState::Stopped) {
            log::error!("Teardown left the graph {}: {}", graph.state, e);
        }
        log::debug!("{}", graph.metrics.generate_report());
    }

    pub async fn enable(&self, id: ElementId) -> Result<()> {
        self.set_active(id, true).await
    }

    pub async fn disable(&self, id: ElementId) -> Result<()> {
        self.set_active(id, false).await
    }

    /// Enables every optional element, reporting each outcome
    pub async fn enable_optional(&self) -> Vec<(ElementId, Result<()>)> {
        self.toggle_optional(true).await
    }

    /// Disables every optional element, reporting each outcome
    pub async fn disable_optional(&self) -> Vec<(ElementId, Result<()>)> {
        self.toggle_optional(false).await
    }

    async fn toggle_optional(&self, active: bool) -> Vec<(ElementId, Result<()>)> {
        let ids = self.graph.lock().await.registry.optional_ids();
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            results.push((id, self.set_active(id, active).await));
        }
        results
    }

    async fn set_active(&self, id: ElementId, active: bool) -> Result<()> {
        let operation = if active { "enable" } else { "disable" };
        let mut graph = self.graph.lock().await;

        if !graph.state.allows_toggle() {
            return Err(PipelineError::InvalidState {
                operation,
                state: graph.state.name(),
            });
        }

        let element = graph.element(id)?;
        if !element.is_optional() {
            return Err(PipelineError::NotOptional {
                id,
                name: element.spec().name.clone(),
            });
        }
        if element.is_active() == active {
            log::debug!("Element {} ({}) is already {}d", id, element.spec().name, operation);
            return Ok(());
        }

        let chain = graph.registry.chain_with(id, active);
        negotiate_chain(&graph.registry, &chain)?;

        match (graph.state, active) {
            (ControllerState::Flowing, true) => Self::splice_in(&mut graph, id).await?,
            (ControllerState::Flowing, false) => Self::splice_out(&mut graph, id).await,
            (_, true) => {
                let instance = graph.take_instance(id).await?;
                graph.element_mut(id)?.handle = StageHandle::Idle(instance);
            }
            (_, false) => {
                if let StageHandle::Idle(instance) = graph.element_mut(id)?.handle.take() {
                    release(id, instance).await;
                }
            }
        }

        graph.element_mut(id)?.set_active(active);
        log::info!(
            "Element {} {}d; pipeline: {}",
            id,
            operation,
            graph.registry.describe_chain(&chain)
        );
        Ok(())
    }

    /// Inserts `id` between its active neighbours while data flows
    async fn splice_in(graph: &mut Graph, id: ElementId) -> Result<()> {
        let upstream = graph.registry.upstream_of(id);
        let downstream = graph.registry.downstream_of(id);

        let instance = graph.take_instance(id).await?;
        let output = graph.input_of(downstream);
        graph.spawn_stage(id, instance, output)?;

        // Frames the upstream already sent stay ahead in the downstream
        // queue; everything after the relink goes through the new stage
        if let (Some(upstream), Some(input)) = (upstream, graph.input_of(Some(id))) {
            if let Some(stage) = graph.running(upstream) {
                if !stage.relink(Some(input), false, None).await {
                    log::debug!("Upstream {} already exited; {} receives nothing", upstream, id);
                }
            }
        }

        graph.metrics_for(id).record_splice();
        log::debug!("Spliced {} in after {:?}, before {:?}", id, upstream, downstream);
        Ok(())
    }

    /// Removes `id` from the flowing chain, bypassing it
    async fn splice_out(graph: &mut Graph, id: ElementId) {
        let upstream = graph.registry.upstream_of(id);
        let downstream = graph.registry.downstream_of(id);
        let bypass = graph.input_of(downstream);

        let handle = match graph.registry.get_mut(id) {
            Some(element) => element.handle.take(),
            None => return,
        };
        let stage = match handle {
            StageHandle::Running(stage) => stage,
            other => {
                if let Some(element) = graph.registry.get_mut(id) {
                    element.handle = other;
                }
                return;
            }
        };

        // Upstream pushes Unlink behind its last frame for the removed
        // stage, switches to the bypass and holds until the removed stage
        // has drained
        let (resume_tx, resume_rx) = oneshot::channel();
        let relinked = match upstream.and_then(|u| graph.running(u)) {
            Some(upstream_stage) => upstream_stage.relink(bypass, true, Some(resume_rx)).await,
            None => false,
        };

        if !relinked {
            match &stage.input {
                // Queued behind whatever the departed upstream left
                Some(input) => {
                    let _ = input.send(Flow::Unlink).await;
                }
                None => {
                    let _ = stage.control.send(StageCommand::Detach).await;
                }
            }
        }

        let instance = join_stage(id, stage).await;
        let _ = resume_tx.send(());

        if let Some(instance) = instance {
            release(id, instance).await;
        }

        graph.metrics_for(id).record_splice();
        log::debug!("Spliced {} out between {:?} and {:?}", id, upstream, downstream);
    }
}
