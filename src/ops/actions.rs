//! Running one action on the project in a directory.

use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, warn};

use crate::builder::{BuildContext, BuilderRegistry};
use crate::codegen::{CodeGenerator, CommandGenerator};
use crate::core::option::Tool;
use crate::core::project::{NoHooks, Project, ProjectHooks, ResolvedProject};
use crate::core::python::PythonProbe;
use crate::ops::command_line::CommandLine;

/// What an action produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Built,
    Installed(PathBuf),
    Sdist(PathBuf),
    Wheel(PathBuf),
}

/// Options for running an action.
pub struct ActionOptions<'a> {
    pub tool: Tool,

    /// The directory containing pyproject.toml.
    pub root_dir: PathBuf,

    /// Command line arguments, not including the program name.
    pub args: Vec<OsString>,

    /// Where sdists and wheels are written.
    pub output_dir: PathBuf,

    pub registry: &'a BuilderRegistry,

    pub hooks: &'a dyn ProjectHooks,

    /// The code generator to use instead of the external command.
    pub generator: Option<&'a dyn CodeGenerator>,

    /// The target interpreter, searched for if not given.
    pub python: Option<PythonProbe>,

    /// Called once the command line has been applied, before defaults.
    pub on_configured: Option<&'a dyn Fn(&Project)>,

    /// Called once the configuration has been verified.
    pub on_verified: Option<&'a dyn Fn(&ResolvedProject)>,
}

impl<'a> ActionOptions<'a> {
    pub fn new(tool: Tool, root_dir: impl Into<PathBuf>, registry: &'a BuilderRegistry) -> Self {
        let root_dir = root_dir.into();

        ActionOptions {
            tool,
            output_dir: root_dir.clone(),
            root_dir,
            args: Vec::new(),
            registry,
            hooks: &NoHooks,
            generator: None,
            python: None,
            on_configured: None,
            on_verified: None,
        }
    }
}

/// Configure the project for an action and run it.
///
/// The configuration is loaded from pyproject.toml, overridden by the
/// command line and completed with defaults before the build directory is
/// created. The build directory is released at the end: a temporary one is
/// removed if the action succeeded.
pub fn run_action(opts: ActionOptions<'_>) -> Result<ActionOutcome> {
    let ActionOptions {
        tool,
        root_dir,
        args,
        output_dir,
        registry,
        hooks,
        generator,
        python,
        on_configured,
        on_verified,
    } = opts;

    let mut project = Project::load(&root_dir, registry, hooks)?;
    if let Some(python) = python {
        project = project.with_python(python);
    }

    CommandLine::new(tool, &project).apply(&mut project, args)?;
    if let Some(on_configured) = on_configured {
        on_configured(&project);
    }

    project.apply_defaults(tool)?;
    project.create_build_dir()?;

    let result = configure_and_run(&mut project, tool, hooks, generator, on_verified, &output_dir);

    if let Err(e) = project.release_build_dir(result.is_ok()) {
        if result.is_ok() {
            return Err(e);
        }
        warn!("failed to release the build directory: {:#}", e);
    }

    result
}

fn configure_and_run(
    project: &mut Project,
    tool: Tool,
    hooks: &dyn ProjectHooks,
    generator: Option<&dyn CodeGenerator>,
    on_verified: Option<&dyn Fn(&ResolvedProject)>,
    output_dir: &std::path::Path,
) -> Result<ActionOutcome> {
    hooks.update(project, tool)?;

    let resolved = project.verify(tool)?;
    if let Some(on_verified) = on_verified {
        on_verified(&resolved);
    }

    let command_generator;
    let generator: &dyn CodeGenerator = match generator {
        Some(generator) => generator,
        None => {
            command_generator = CommandGenerator::from_env(resolved.verbose);
            &command_generator
        }
    };

    let (builder, bindings) = project.parts_mut();
    debug!("running {} with the '{}' builder", tool, builder.name());

    if tool != Tool::Sdist {
        resolved.progress(&ResolvedProject::bindings_message(bindings));
    }

    let ctx = BuildContext {
        project: &resolved,
        generator,
    };

    let outcome = match tool {
        Tool::Build => {
            builder.build(&ctx, bindings)?;
            resolved.progress("The project has been built.");
            ActionOutcome::Built
        }
        Tool::Install => {
            let target_dir = builder.install(&ctx, bindings)?;
            resolved.progress("The project has been installed.");
            ActionOutcome::Installed(target_dir)
        }
        Tool::Sdist => {
            let sdist = builder.build_sdist(&ctx, bindings, output_dir)?;
            resolved.progress("The sdist has been built.");
            ActionOutcome::Sdist(sdist)
        }
        Tool::Wheel => {
            let wheel = builder.build_wheel(&ctx, bindings, output_dir)?;
            resolved.progress("The wheel has been built.");
            ActionOutcome::Wheel(wheel)
        }
    };

    Ok(outcome)
}
