//! One spawned task per active element.
//!
//! Stages are linked by bounded channels carrying [`Flow`] items. The
//! controller rewires a running stage through its control channel: a
//! `Relink` swaps the stage's output between two frames, so frames already
//! sent keep their position ahead of everything sent afterwards.

use crate::core::{DataFrame, Element, ElementId};
use crate::observability::ElementMetrics;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

/// Items travelling along a link
#[derive(Debug)]
pub(crate) enum Flow {
    Buffer(DataFrame),
    /// End of stream, forwarded to the end of the chain
    Eos,
    /// The receiving stage is being removed: exit after everything queued
    /// ahead of this marker has been processed and forwarded
    Unlink,
}

pub(crate) enum StageCommand {
    Relink {
        output: Option<mpsc::Sender<Flow>>,
        /// Send `Unlink` on the previous output before swapping
        unlink_previous: bool,
        /// Hold further output until this fires (or is dropped)
        resume: Option<oneshot::Receiver<()>>,
        ack: oneshot::Sender<()>,
    },
    /// Exit immediately; used for stages without an input link
    Detach,
}

/// Reported by stages to the task awaiting `GraphController::start`
#[derive(Debug)]
pub(crate) enum BusMessage {
    Eos { id: ElementId },
    Fault {
        id: ElementId,
        name: String,
        reason: String,
    },
}

/// Controller-side ownership of a spawned stage
pub struct RunningStage {
    pub(crate) input: Option<mpsc::Sender<Flow>>,
    pub(crate) control: mpsc::Sender<StageCommand>,
    pub(crate) join: JoinHandle<Box<dyn Element>>,
}

impl RunningStage {
    /// Swaps the stage's output. Returns false if the stage is gone.
    pub(crate) async fn relink(
        &self,
        output: Option<mpsc::Sender<Flow>>,
        unlink_previous: bool,
        resume: Option<oneshot::Receiver<()>>,
    ) -> bool {
        let (ack, acked) = oneshot::channel();
        let command = StageCommand::Relink {
            output,
            unlink_previous,
            resume,
            ack,
        };
        if self.control.send(command).await.is_err() {
            return false;
        }
        acked.await.is_ok()
    }
}

/// Ownership of an element's underlying stage resource
pub enum StageHandle {
    /// No instance exists
    Released,
    /// Instantiated and waiting for the graph to start flowing
    Idle(Box<dyn Element>),
    Running(RunningStage),
}

impl StageHandle {
    pub fn is_released(&self) -> bool {
        matches!(self, Self::Released)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running(_))
    }

    pub(crate) fn running(&self) -> Option<&RunningStage> {
        match self {
            Self::Running(stage) => Some(stage),
            _ => None,
        }
    }

    pub(crate) fn take(&mut self) -> StageHandle {
        std::mem::replace(self, Self::Released)
    }
}

pub(crate) struct StageLinks {
    pub input: Option<mpsc::Receiver<Flow>>,
    pub output: Option<mpsc::Sender<Flow>>,
    pub control: mpsc::Receiver<StageCommand>,
    pub shutdown: broadcast::Receiver<()>,
    pub bus: mpsc::UnboundedSender<BusMessage>,
}

pub(crate) struct Stage {
    id: ElementId,
    name: String,
    element: Box<dyn Element>,
    output: Option<mpsc::Sender<Flow>>,
    control: mpsc::Receiver<StageCommand>,
    /// Cleared once the controller drops its end; the stage then only
    /// stops on shutdown, end of stream or `Unlink`
    control_open: bool,
    shutdown: broadcast::Receiver<()>,
    bus: mpsc::UnboundedSender<BusMessage>,
    metrics: Arc<ElementMetrics>,
}

enum Event {
    Shutdown,
    Control(Option<StageCommand>),
    Produced(anyhow::Result<Option<DataFrame>>),
    Received(Option<Flow>),
}

#[derive(PartialEq)]
enum Step {
    Continue,
    Exit,
}

impl Stage {
    /// Spawns the stage task
    pub(crate) fn spawn(
        id: ElementId,
        name: impl Into<String>,
        element: Box<dyn Element>,
        links: StageLinks,
        metrics: Arc<ElementMetrics>,
    ) -> JoinHandle<Box<dyn Element>> {
        let StageLinks {
            input,
            output,
            control,
            shutdown,
            bus,
        } = links;

        let stage = Stage {
            id,
            name: name.into(),
            element,
            output,
            control,
            control_open: true,
            shutdown,
            bus,
            metrics,
        };

        tokio::spawn(stage.run(input))
    }

    async fn run(mut self, input: Option<mpsc::Receiver<Flow>>) -> Box<dyn Element> {
        log::trace!("Stage {} ({}) started", self.id, self.name);

        match input {
            Some(input) => self.run_linked(input).await,
            None => self.run_source().await,
        }

        log::trace!("Stage {} ({}) exited", self.id, self.name);
        self.element
    }

    async fn run_source(&mut self) {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.shutdown.recv() => Event::Shutdown,
                cmd = self.control.recv(), if self.control_open => Event::Control(cmd),
                produced = self.element.produce() => Event::Produced(produced),
            };

            if self.handle(event).await == Step::Exit {
                return;
            }
        }
    }

    async fn run_linked(&mut self, mut input: mpsc::Receiver<Flow>) {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.shutdown.recv() => Event::Shutdown,
                cmd = self.control.recv(), if self.control_open => Event::Control(cmd),
                flow = input.recv() => Event::Received(flow),
            };

            if self.handle(event).await == Step::Exit {
                return;
            }
        }
    }

    async fn handle(&mut self, event: Event) -> Step {
        match event {
            Event::Shutdown => Step::Exit,
            Event::Control(None) => {
                self.control_open = false;
                Step::Continue
            }
            Event::Control(Some(command)) => self.apply(command).await,
            Event::Produced(Ok(Some(mut frame))) => {
                self.metrics.record_frame_processed();
                frame.mark_visited(&self.name);
                self.forward(Flow::Buffer(frame)).await
            }
            Event::Produced(Ok(None)) => {
                log::debug!("Source {} ({}) reached end of stream", self.id, self.name);
                self.end_of_stream().await
            }
            Event::Produced(Err(e)) => self.fault(e),
            Event::Received(Some(Flow::Buffer(frame))) => self.process(frame).await,
            Event::Received(Some(Flow::Eos)) => self.end_of_stream().await,
            Event::Received(Some(Flow::Unlink)) => {
                log::debug!("Stage {} ({}) unlinked", self.id, self.name);
                Step::Exit
            }
            Event::Received(None) => Step::Exit,
        }
    }

    async fn apply(&mut self, command: StageCommand) -> Step {
        match command {
            StageCommand::Relink {
                output,
                unlink_previous,
                resume,
                ack,
            } => {
                let previous = std::mem::replace(&mut self.output, output);
                if unlink_previous {
                    if let Some(previous) = &previous {
                        let _ = previous.send(Flow::Unlink).await;
                    }
                }
                drop(previous);
                let _ = ack.send(());

                // Nothing is admitted until the removed stage has drained
                if let Some(resume) = resume {
                    let _ = resume.await;
                }
                Step::Continue
            }
            StageCommand::Detach => Step::Exit,
        }
    }

    async fn process(&mut self, mut frame: DataFrame) -> Step {
        frame.mark_visited(&self.name);

        let start = self.metrics.start_processing();
        match self.element.process(frame).await {
            Ok(output) => {
                self.metrics.finish_processing(start);
                self.metrics.record_frame_processed();
                match output {
                    Some(frame) => self.forward(Flow::Buffer(frame)).await,
                    None => Step::Continue,
                }
            }
            Err(e) => self.fault(e),
        }
    }

    async fn forward(&mut self, flow: Flow) -> Step {
        let Some(output) = &self.output else {
            return Step::Continue;
        };

        if output.send(flow).await.is_err() {
            log::debug!("Stage {} ({}): downstream closed", self.id, self.name);
            return Step::Exit;
        }
        Step::Continue
    }

    async fn end_of_stream(&mut self) -> Step {
        match &self.output {
            Some(output) => {
                let _ = output.send(Flow::Eos).await;
            }
            None => {
                let _ = self.bus.send(BusMessage::Eos { id: self.id });
            }
        }
        Step::Exit
    }

    fn fault(&mut self, error: anyhow::Error) -> Step {
        self.metrics.record_error();
        log::error!("Element {} ({}) failed: {:#}", self.id, self.name, error);
        let _ = self.bus.send(BusMessage::Fault {
            id: self.id,
            name: self.name.clone(),
            reason: format!("{:#}", error),
        });
        Step::Exit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    struct SlowRelay;

    #[async_trait]
    impl Element for SlowRelay {
        async fn process(&mut self, input: DataFrame) -> anyhow::Result<Option<DataFrame>> {
            tokio::time::sleep(Duration::from_millis(1)).await;
            Ok(Some(input))
        }
    }

    #[tokio::test]
    async fn test_unlinked_stage_drains_queue_after_control_closes() {
        let (input_tx, input_rx) = mpsc::channel(16);
        let (output_tx, mut output_rx) = mpsc::channel(32);
        let (control_tx, control_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (bus_tx, _bus_rx) = mpsc::unbounded_channel();

        for sequence in 0..10 {
            input_tx.send(Flow::Buffer(DataFrame::new(0, sequence))).await.unwrap();
        }
        input_tx.send(Flow::Unlink).await.unwrap();
        drop(control_tx);

        let links = StageLinks {
            input: Some(input_rx),
            output: Some(output_tx),
            control: control_rx,
            shutdown: shutdown_rx,
            bus: bus_tx,
        };
        let metrics = Arc::new(ElementMetrics::new(ElementId(1), "relay"));
        let join = Stage::spawn(ElementId(1), "relay", Box::new(SlowRelay), links, metrics.clone());
        join.await.unwrap();

        let mut forwarded = Vec::new();
        while let Ok(Flow::Buffer(frame)) = output_rx.try_recv() {
            forwarded.push(frame.sequence_id);
        }
        assert_eq!(forwarded, (0..10).collect::<Vec<u64>>());
        assert_eq!(metrics.frames_processed(), 10);
        drop(shutdown_tx);
    }

    #[tokio::test]
    async fn test_shutdown_still_stops_stage_without_control() {
        let (_input_tx, input_rx) = mpsc::channel::<Flow>(4);
        let (control_tx, control_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (bus_tx, _bus_rx) = mpsc::unbounded_channel();
        drop(control_tx);

        let links = StageLinks {
            input: Some(input_rx),
            output: None,
            control: control_rx,
            shutdown: shutdown_rx,
            bus: bus_tx,
        };
        let metrics = Arc::new(ElementMetrics::new(ElementId(0), "idle"));
        let join = Stage::spawn(ElementId(0), "idle", Box::new(SlowRelay), links, metrics);

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!join.is_finished());
        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), join).await.unwrap().unwrap();
    }
}
