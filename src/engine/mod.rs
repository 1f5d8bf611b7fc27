pub mod controller;
pub(crate) mod negotiate;
pub mod run_state;
pub mod stage;
pub mod state;

pub use controller::GraphController;
pub use run_state::RunState;
pub use stage::{RunningStage, StageHandle};
pub use state::ControllerState;
