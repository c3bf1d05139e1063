//! Command implementations

use anyhow::Result;

use crate::cli::ActionArgs;
use crate::Logging;
use sipbuild::core::option::Tool;

pub mod build;
pub mod install;
pub mod sdist;
pub mod wheel;

pub fn execute(tool: Tool, args: ActionArgs, logging: &Logging) -> Result<()> {
    match tool {
        Tool::Build => build::execute(args, logging),
        Tool::Install => install::execute(args, logging),
        Tool::Sdist => sdist::execute(args, logging),
        Tool::Wheel => wheel::execute(args, logging),
    }
}
