//! High-level operations.
//!
//! This module contains the implementation of the build, install, sdist and
//! wheel actions.

pub mod actions;
pub mod command_line;

pub use actions::{run_action, ActionOptions, ActionOutcome};
pub use command_line::{CommandLine, OptionOwner};
