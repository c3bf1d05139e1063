//! The command line of an action.
//!
//! The arguments are not fixed: they are generated from the user-facing
//! options that the project, its builder and its bindings declare for the
//! action. A value given on the command line replaces the one from
//! pyproject.toml. Options that are not given keep their current value so
//! that defaulting can still tell the two apart.

use std::ffi::OsString;

use anyhow::Result;
use clap::parser::ValueSource;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use indexmap::IndexMap;

use crate::core::configurable::Configurable;
use crate::core::option::{ConfigOption, OptionType, Origin, Tool, Value, COMPILING_TOOLS};
use crate::core::project::{multibindings_options, Project};

/// Which part of the project an option belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionOwner {
    Project,
    Builder,
    /// Every set of bindings.
    Bindings,
}

/// Where the value of one command line argument goes.
#[derive(Debug, Clone)]
struct Route {
    option: &'static str,
    option_type: OptionType,
    inverted: bool,
    owners: Vec<OptionOwner>,
}

const INCLUDE_DIR: &str = "include_dir";
const WARNINGS: &str = "enable_warnings";
const WARNINGS_ARE_ERRORS: &str = "warnings_as_errors";

/// The command line of one action of one project.
#[derive(Debug)]
pub struct CommandLine {
    tool: Tool,
    command: Command,
    routes: IndexMap<String, Route>,
}

impl CommandLine {
    pub fn new(tool: Tool, project: &Project) -> Self {
        let multibindings: Vec<&'static str> =
            multibindings_options().iter().map(|o| o.name).collect();
        let has_multibindings = project.bindings().len() > 1;

        let mut routes: IndexMap<String, Route> = IndexMap::new();
        let mut args: Vec<Arg> = Vec::new();

        let mut add = |option: &ConfigOption, owner: OptionOwner| {
            if !option.is_user_facing() || !option.applies_to(tool) {
                return;
            }

            if owner == OptionOwner::Project
                && !has_multibindings
                && multibindings.contains(&option.name)
            {
                return;
            }

            let flag = option.flag_name();
            if let Some(route) = routes.get_mut(&flag) {
                if !route.owners.contains(&owner) {
                    route.owners.push(owner);
                }
                return;
            }

            args.push(option_arg(option, &flag));
            routes.insert(
                flag,
                Route {
                    option: option.name,
                    option_type: option.option_type,
                    inverted: option.inverted,
                    owners: vec![owner],
                },
            );
        };

        for option in project.options() {
            add(option, OptionOwner::Project);
        }
        for option in project.builder().options() {
            add(option, OptionOwner::Builder);
        }
        for bindings in project.bindings().iter() {
            for option in bindings.options() {
                add(option, OptionOwner::Bindings);
            }
        }

        let mut command = Command::new(tool.program())
            .about(about(tool))
            .disable_version_flag(true)
            .args(args);

        if COMPILING_TOOLS.contains(&tool) {
            command = command.args(standard_args());
        }

        CommandLine { tool, command, routes }
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Parse the arguments (excluding the program name) and apply the values
    /// that were given to the project.
    ///
    /// Parse failures, and requests for help, are returned as `clap::Error`.
    pub fn apply<I, T>(self, project: &mut Project, args: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let program = self.tool.program();
        let argv = std::iter::once(OsString::from(program)).chain(args.into_iter().map(Into::into));
        let matches = self.command.try_get_matches_from(argv)?;

        for (flag, route) in &self.routes {
            if matches.value_source(flag) != Some(ValueSource::CommandLine) {
                continue;
            }

            let Some(value) = route_value(&matches, flag, route) else {
                continue;
            };

            for owner in &route.owners {
                match owner {
                    OptionOwner::Project => {
                        project
                            .values_mut()
                            .set(route.option, value.clone(), Origin::CommandLine)?
                    }
                    OptionOwner::Builder => {
                        project
                            .builder_mut()
                            .values_mut()
                            .set(route.option, value.clone(), Origin::CommandLine)?
                    }
                    OptionOwner::Bindings => {
                        for bindings in project.bindings_mut().iter_mut() {
                            if bindings.values().is_declared(route.option) {
                                bindings
                                    .values_mut()
                                    .set(route.option, value.clone(), Origin::CommandLine)?;
                            }
                        }
                    }
                }
            }
        }

        apply_standard_args(project, &matches)
    }
}

fn about(tool: Tool) -> &'static str {
    match tool {
        Tool::Build => "Build a project in the current directory.",
        Tool::Install => "Build and install a project.",
        Tool::Sdist => "Build an sdist for the project.",
        Tool::Wheel => "Build a wheel for the project.",
    }
}

fn option_arg(option: &ConfigOption, flag: &str) -> Arg {
    let mut arg = Arg::new(flag.to_string()).long(flag.to_string());

    if let Some(help) = option.help {
        arg = arg.help(help);
    }

    match option.option_type {
        OptionType::Bool => arg.action(ArgAction::SetTrue),
        OptionType::Str => arg
            .action(ArgAction::Set)
            .value_name(option.metavar.unwrap_or("VALUE")),
        OptionType::Int => arg
            .action(ArgAction::Set)
            .value_name(option.metavar.unwrap_or("N"))
            .value_parser(value_parser!(i64)),
        OptionType::List => arg
            .action(ArgAction::Append)
            .value_name(option.metavar.unwrap_or("VALUE")),
    }
}

fn route_value(matches: &ArgMatches, flag: &str, route: &Route) -> Option<Value> {
    match route.option_type {
        OptionType::Bool => Some(Value::Bool(matches.get_flag(flag) != route.inverted)),
        OptionType::Str => matches.get_one::<String>(flag).map(|s| Value::Str(s.clone())),
        OptionType::Int => matches.get_one::<i64>(flag).map(|i| Value::Int(*i)),
        OptionType::List => matches
            .get_many::<String>(flag)
            .map(|values| Value::list(values.cloned())),
    }
}

/// The arguments every compiling action has regardless of configuration.
fn standard_args() -> Vec<Arg> {
    vec![
        Arg::new(INCLUDE_DIR)
            .short('I')
            .long("include-dir")
            .action(ArgAction::Append)
            .value_name("DIR")
            .help("add DIR to the list of directories searched for .sip files"),
        Arg::new(WARNINGS)
            .short('w')
            .action(ArgAction::SetTrue)
            .help("enable warning messages"),
        Arg::new(WARNINGS_ARE_ERRORS)
            .short('f')
            .long("warnings-are-errors")
            .action(ArgAction::SetTrue)
            .help("warnings are handled as errors"),
    ]
}

fn apply_standard_args(project: &mut Project, matches: &ArgMatches) -> Result<()> {
    let given = |id: &str| {
        matches.try_contains_id(id).unwrap_or(false)
            && matches.value_source(id) == Some(ValueSource::CommandLine)
    };

    if given(INCLUDE_DIR) {
        let mut dirs = project.values().list("sip_include_dirs").to_vec();
        if let Some(extra) = matches.get_many::<String>(INCLUDE_DIR) {
            dirs.extend(extra.cloned());
        }
        project
            .values_mut()
            .set("sip_include_dirs", Value::List(dirs), Origin::CommandLine)?;
    }

    if given(WARNINGS) {
        project
            .values_mut()
            .set("warnings", Value::Bool(true), Origin::CommandLine)?;
    }

    if given(WARNINGS_ARE_ERRORS) {
        project
            .values_mut()
            .set("warnings_are_errors", Value::Bool(true), Origin::CommandLine)?;
    }

    Ok(())
}
