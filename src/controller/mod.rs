pub mod mode_controller;

pub use mode_controller::{ControllerOutcome, ModeController};
