use crossbeam_channel::{unbounded, Sender};
use serde_json::json;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use streamctl::app::{App, AppConfig};
use streamctl::control::{ControlLoop, LoopExit};
use streamctl::core::ElementId;
use streamctl::description::PipelineDescription;
use streamctl::engine::{ControllerState, GraphController, RunState};
use streamctl::factory::ElementFactoryRegistry;
use tempfile::NamedTempFile;
use tokio::runtime::Handle;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};

const POLL: Duration = Duration::from_millis(10);

fn chain(num_buffers: u64) -> serde_json::Value {
    json!({"pipeline": {"elements": [
        {"name": "src", "type": "testsrc", "caps": "audio/x-raw", "optional": false,
         "properties": {"interval-ms": 1, "num-buffers": num_buffers}},
        {"name": "vol", "type": "volume", "caps": "audio/x-raw", "optional": true},
        {"name": "sink", "type": "fakesink", "caps": "ANY", "optional": false,
         "properties": {"check-sequence": true}}
    ]}})
}

async fn built_controller(num_buffers: u64) -> Arc<GraphController> {
    let controller = Arc::new(GraphController::with_builtins());
    controller
        .build(PipelineDescription::from_json(chain(num_buffers)).unwrap())
        .await
        .unwrap();
    controller
}

fn spawn_loop(
    controller: &Arc<GraphController>,
    run_state: &RunState,
) -> (Sender<io::Result<char>>, std::thread::JoinHandle<LoopExit>) {
    let (tx, rx) = unbounded();
    let handle = ControlLoop::new(controller.clone(), run_state.clone(), rx, Handle::current())
        .with_poll_interval(POLL)
        .spawn()
        .unwrap();
    (tx, handle)
}

async fn wait_for_state(controller: &GraphController, state: ControllerState) {
    timeout(Duration::from_secs(2), async {
        while controller.state().await != state {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();
}

async fn join(handle: std::thread::JoinHandle<LoopExit>) -> LoopExit {
    tokio::task::spawn_blocking(move || handle.join().unwrap())
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_commands_toggle_and_quit() {
    let controller = built_controller(0).await;
    let run_state = RunState::new();
    let (input, handle) = spawn_loop(&controller, &run_state);

    let flow = tokio::spawn({
        let controller = controller.clone();
        async move { controller.start().await }
    });
    wait_for_state(&controller, ControllerState::Flowing).await;

    input.send(Ok('d')).unwrap();
    timeout(Duration::from_secs(2), async {
        while controller.active_chain().await.len() != 2 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();

    input.send(Ok('x')).unwrap();
    input.send(Ok('e')).unwrap();
    input.send(Ok('q')).unwrap();

    let quit_at = Instant::now();
    assert_eq!(join(handle).await, LoopExit::Quit);
    assert_ok!(timeout(Duration::from_secs(2), flow).await.unwrap().unwrap());
    assert!(quit_at.elapsed() < Duration::from_secs(2));

    assert!(run_state.is_stopped());
    assert_eq!(controller.state().await, ControllerState::Stopped);
    assert_eq!(controller.metrics().await.get(ElementId(1)).unwrap().splices(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_commands_apply_before_flow_starts() {
    let controller = built_controller(0).await;
    let run_state = RunState::new();
    let (input, handle) = spawn_loop(&controller, &run_state);

    input.send(Ok('d')).unwrap();
    input.send(Ok('d')).unwrap();
    input.send(Ok('q')).unwrap();
    assert_eq!(join(handle).await, LoopExit::Quit);
    assert_eq!(controller.active_chain().await, vec![ElementId(0), ElementId(2)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_loop_exits_when_flow_ends() {
    let controller = built_controller(5).await;
    let run_state = RunState::new();
    let (_input, handle) = spawn_loop(&controller, &run_state);

    assert_ok!(controller.start().await);
    run_state.stop();

    let stopped_at = Instant::now();
    assert_eq!(join(handle).await, LoopExit::FlowEnded);
    assert!(stopped_at.elapsed() < Duration::from_secs(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_closed_input_leaves_flow_running() {
    let controller = built_controller(0).await;
    let run_state = RunState::new();
    let (input, handle) = spawn_loop(&controller, &run_state);
    drop(input);

    assert_eq!(join(handle).await, LoopExit::InputClosed);
    assert!(run_state.is_running());
    assert_eq!(controller.state().await, ControllerState::Built);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_input_failure_stops_run_state() {
    let controller = built_controller(0).await;
    let run_state = RunState::new();
    let (input, handle) = spawn_loop(&controller, &run_state);

    input
        .send(Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone")))
        .unwrap();
    assert_eq!(join(handle).await, LoopExit::InputFailed);
    assert!(run_state.is_stopped());
}

fn description_file(value: &serde_json::Value) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(value.to_string().as_bytes()).unwrap();
    file
}

fn app_config(file: &NamedTempFile) -> AppConfig {
    AppConfig {
        input: file.path().to_path_buf(),
        poll_interval: POLL,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_app_quits_on_command() {
    let file = description_file(&chain(0));
    let app = App::new(app_config(&file), Arc::new(ElementFactoryRegistry::with_builtins()))
        .await
        .unwrap();
    let controller = app.controller().clone();

    let (input, rx) = unbounded();
    let run = tokio::spawn(app.run(rx));

    wait_for_state(&controller, ControllerState::Flowing).await;
    input.send(Ok('d')).unwrap();
    input.send(Ok('e')).unwrap();
    input.send(Ok('q')).unwrap();

    let exit = timeout(Duration::from_secs(5), run).await.unwrap().unwrap();
    assert_eq!(assert_ok!(exit), LoopExit::Quit);
    assert_eq!(controller.state().await, ControllerState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_app_runs_to_end_of_stream_without_input() {
    let file = description_file(&chain(10));
    let app = App::new(app_config(&file), Arc::new(ElementFactoryRegistry::with_builtins()))
        .await
        .unwrap();
    let controller = app.controller().clone();

    let (input, rx) = unbounded();
    let exit = timeout(Duration::from_secs(5), app.run(rx)).await.unwrap();
    assert_eq!(assert_ok!(exit), LoopExit::FlowEnded);
    drop(input);

    assert_eq!(
        controller.metrics().await.get(ElementId(2)).unwrap().frames_processed(),
        10
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_app_reports_runtime_fault() {
    let file = description_file(&json!({"pipeline": {"elements": [
        {"name": "src", "type": "testsrc", "caps": "ANY", "optional": false,
         "properties": {"interval-ms": 0}},
        {"name": "sink", "type": "fakesink", "caps": "ANY", "optional": false,
         "properties": {"fail-after": 2}}
    ]}}));
    let app = App::new(app_config(&file), Arc::new(ElementFactoryRegistry::with_builtins()))
        .await
        .unwrap();

    let (_input, rx) = unbounded();
    let err = assert_err!(timeout(Duration::from_secs(5), app.run(rx)).await.unwrap());
    let fault = err.downcast_ref::<streamctl::PipelineError>().unwrap();
    assert_eq!(fault.kind(), "RuntimeFault");
}

#[tokio::test]
async fn test_app_rejects_missing_description() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig {
        input: dir.path().join("absent.json"),
        ..AppConfig::default()
    };

    let Err(err) = App::new(config, Arc::new(ElementFactoryRegistry::with_builtins())).await else {
        panic!("a missing description was accepted");
    };
    let err = err.downcast_ref::<streamctl::PipelineError>().unwrap();
    assert_eq!(err.kind(), "NotFound");
}
