//! `sipbuild build` command

use anyhow::Result;

use crate::cli::ActionArgs;
use crate::Logging;
use sipbuild::ops::{run_action, ActionOptions};
use sipbuild::core::option::Tool;
use sipbuild::core::Configurable;
use sipbuild::{BuilderRegistry, Project};

pub fn execute(args: ActionArgs, logging: &Logging) -> Result<()> {
    let registry = BuilderRegistry::new();
    let set_verbosity = |project: &Project| {
        logging.set_verbosity(project.values().flag("verbose"), project.values().flag("quiet"))
    };

    let mut opts = ActionOptions::new(Tool::Build, std::env::current_dir()?, &registry);
    opts.args = args.args;
    opts.on_configured = Some(&set_verbosity);

    run_action(opts)?;

    Ok(())
}
