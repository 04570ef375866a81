pub mod config;
pub mod run;
pub mod steps;

pub use config::handle_config_command;
pub use run::{handle_run_command, RunArgs};
pub use steps::handle_steps_command;
