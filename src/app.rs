//! Process-level wiring: load, build, flow, and operator control.

use anyhow::Context;
use crossbeam_channel::Receiver;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

use crate::control::{ControlLoop, LoopExit, DEFAULT_POLL_INTERVAL};
use crate::description;
use crate::engine::{ControllerState, GraphController, RunState};
use crate::factory::ElementFactoryRegistry;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub input: PathBuf,
    pub poll_interval: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input: description::default_path(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// A built pipeline ready to run under operator control
pub struct App {
    config: AppConfig,
    controller: Arc<GraphController>,
    run_state: RunState,
}

impl App {
    /// Loads the description and builds the graph
    pub async fn new(config: AppConfig, factories: Arc<ElementFactoryRegistry>) -> anyhow::Result<Self> {
        log::info!("Provided pipeline file: {}", config.input.display());
        let description = description::load(&config.input)?;

        let controller = Arc::new(GraphController::new(factories));
        controller
            .build(description)
            .await
            .with_context(|| format!("failed to build pipeline from {}", config.input.display()))?;

        Ok(Self {
            config,
            controller,
            run_state: RunState::new(),
        })
    }

    pub fn controller(&self) -> &Arc<GraphController> {
        &self.controller
    }

    pub fn run_state(&self) -> &RunState {
        &self.run_state
    }

    /// Runs the flow until end-of-stream, quit or a fault, with the
    /// control loop reading commands from `input`
    pub async fn run(self, input: Receiver<io::Result<char>>) -> anyhow::Result<LoopExit> {
        let control = ControlLoop::new(
            self.controller.clone(),
            self.run_state.clone(),
            input,
            Handle::current(),
        )
        .with_poll_interval(self.config.poll_interval)
        .spawn()
        .context("failed to spawn the control loop")?;

        let watcher = tokio::spawn(stop_when_stopped(
            self.controller.clone(),
            self.run_state.clone(),
            self.config.poll_interval,
        ));

        let outcome = self.controller.start().await;
        self.run_state.stop();

        if let Err(e) = watcher.await {
            log::warn!("Stop watcher failed: {}", e);
        }
        let exit = tokio::task::spawn_blocking(move || control.join())
            .await
            .context("control loop join task failed")?
            .map_err(|_| anyhow::anyhow!("control loop panicked"))?;

        log::info!("{}", self.controller.metrics().await.generate_report());
        outcome?;
        Ok(exit)
    }
}

/// Forwards a stopped run state to the controller. A stop that lands
/// before the flow has started is ignored by the controller, so it is
/// repeated until the graph has left `Built`.
async fn stop_when_stopped(controller: Arc<GraphController>, run_state: RunState, retry: Duration) {
    run_state.stopped().await;

    loop {
        let state = controller.state().await;
        controller.stop();
        if state != ControllerState::Built {
            break;
        }
        tokio::time::sleep(retry).await;
    }
}
