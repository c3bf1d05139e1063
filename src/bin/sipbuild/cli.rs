//! CLI definitions using clap.
//!
//! Only the actions are fixed. The options of each action depend on the
//! project being built, so their arguments are collected raw and parsed once
//! pyproject.toml has been read.

use std::ffi::OsString;

use clap::{Args, Parser, Subcommand};
use sipbuild::core::option::Tool;

/// sipbuild - build Python extension modules from .sip files
#[derive(Parser)]
#[command(name = "sipbuild")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the project in the current directory
    Build(ActionArgs),

    /// Build the project and install it
    Install(ActionArgs),

    /// Create an sdist of the project
    Sdist(ActionArgs),

    /// Build a wheel of the project
    Wheel(ActionArgs),
}

impl Commands {
    pub fn tool(&self) -> Tool {
        match self {
            Commands::Build(_) => Tool::Build,
            Commands::Install(_) => Tool::Install,
            Commands::Sdist(_) => Tool::Sdist,
            Commands::Wheel(_) => Tool::Wheel,
        }
    }

    pub fn into_args(self) -> ActionArgs {
        match self {
            Commands::Build(args)
            | Commands::Install(args)
            | Commands::Sdist(args)
            | Commands::Wheel(args) => args,
        }
    }
}

#[derive(Args)]
#[command(disable_help_flag = true)]
pub struct ActionArgs {
    /// Options of the action (see `sipbuild <action> --help`)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<OsString>,
}
