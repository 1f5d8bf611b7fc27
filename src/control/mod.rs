//! Operator command channel for a running graph.
//!
//! Commands arrive as single characters on a crossbeam channel fed by a
//! reader thread. The loop waits on that channel with a short timeout so
//! it notices when the flow has ended even if the operator never types.

use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::io::{self, Read};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::runtime::Handle;

use crate::core::ElementId;
use crate::engine::{GraphController, RunState};
use crate::error::Result;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub const USAGE: &str =
    "Enter 'e' to enable optional elements, 'd' to disable optional elements, and 'q' to quit:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    EnableOptional,
    DisableOptional,
    Quit,
}

impl Command {
    pub fn parse(input: char) -> Option<Self> {
        match input {
            'e' => Some(Self::EnableOptional),
            'd' => Some(Self::DisableOptional),
            'q' => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Why the control loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The operator quit
    Quit,
    /// The run state was stopped elsewhere
    FlowEnded,
    /// Input reached end of file
    InputClosed,
    /// Reading input failed
    InputFailed,
}

pub struct ControlLoop {
    controller: Arc<GraphController>,
    run_state: RunState,
    input: Receiver<io::Result<char>>,
    runtime: Handle,
    poll_interval: Duration,
}

impl ControlLoop {
    pub fn new(
        controller: Arc<GraphController>,
        run_state: RunState,
        input: Receiver<io::Result<char>>,
        runtime: Handle,
    ) -> Self {
        Self {
            controller,
            run_state,
            input,
            runtime,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Runs the loop on a dedicated OS thread
    pub fn spawn(self) -> io::Result<thread::JoinHandle<LoopExit>> {
        thread::Builder::new()
            .name("control-loop".to_string())
            .spawn(move || self.run())
    }

    /// Blocks the calling thread until quit, end of flow or end of input.
    /// Must not be called from inside the async runtime.
    pub fn run(self) -> LoopExit {
        log::info!("{}", USAGE);

        while self.run_state.is_running() {
            match self.input.recv_timeout(self.poll_interval) {
                Ok(Ok(input)) => {
                    if let Some(exit) = self.dispatch(input) {
                        return exit;
                    }
                }
                Ok(Err(e)) => {
                    log::error!("Failed to read operator input: {}", e);
                    self.run_state.stop();
                    return LoopExit::InputFailed;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    log::info!("Operator input closed; the pipeline keeps running");
                    return LoopExit::InputClosed;
                }
            }
        }

        log::debug!("Control loop exiting: flow ended");
        LoopExit::FlowEnded
    }

    fn dispatch(&self, input: char) -> Option<LoopExit> {
        let Some(command) = Command::parse(input) else {
            log::warn!("Invalid command. Use 'e', 'd', or 'q'.");
            return None;
        };

        match command {
            Command::EnableOptional => {
                let results = self.runtime.block_on(self.controller.enable_optional());
                report("enable", &results);
                log::info!("Enabled optional pipeline elements.");
                None
            }
            Command::DisableOptional => {
                let results = self.runtime.block_on(self.controller.disable_optional());
                report("disable", &results);
                log::info!("Disabled optional pipeline elements.");
                None
            }
            Command::Quit => {
                self.controller.stop();
                self.run_state.stop();
                log::info!("Stopped pipeline and exiting.");
                Some(LoopExit::Quit)
            }
        }
    }
}

fn report(operation: &str, results: &[(ElementId, Result<()>)]) {
    if results.is_empty() {
        log::warn!("The pipeline declares no optional elements");
    }
    for (id, result) in results {
        if let Err(e) = result {
            log::warn!("Could not {} element {}: {}", operation, id, e);
        }
    }
}

/// Spawns a thread forwarding every non-whitespace character of `reader`.
///
/// The channel disconnects at end of input; a read error is forwarded
/// once and ends the thread.
pub fn spawn_reader<R>(reader: R) -> io::Result<Receiver<io::Result<char>>>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = crossbeam_channel::unbounded();

    thread::Builder::new().name("input-reader".to_string()).spawn(move || {
        for byte in reader.bytes() {
            let item = byte.map(char::from);
            let failed = item.is_err();
            if matches!(item, Ok(c) if c.is_whitespace()) {
                continue;
            }
            if tx.send(item).is_err() || failed {
                break;
            }
        }
    })?;

    Ok(rx)
}

/// Operator input from the process's standard input
pub fn stdin_reader() -> io::Result<Receiver<io::Result<char>>> {
    spawn_reader(io::stdin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_command_parsing() {
        assert_eq!(Command::parse('e'), Some(Command::EnableOptional));
        assert_eq!(Command::parse('d'), Some(Command::DisableOptional));
        assert_eq!(Command::parse('q'), Some(Command::Quit));
        assert_eq!(Command::parse('x'), None);
        assert_eq!(Command::parse('E'), None);
    }

    #[test]
    fn test_reader_skips_whitespace() {
        let rx = spawn_reader(Cursor::new("e\n d\tq\n")).unwrap();
        let received: Vec<char> = rx.iter().map(|item| item.unwrap()).collect();
        assert_eq!(received, vec!['e', 'd', 'q']);
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "terminal went away"))
        }
    }

    #[test]
    fn test_reader_forwards_error_once() {
        let rx = spawn_reader(FailingReader).unwrap();
        let items: Vec<_> = rx.iter().collect();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }
}
