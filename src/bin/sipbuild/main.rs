//! sipbuild CLI - configure and build Python extension modules

use std::io::IsTerminal;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

mod cli;
mod commands;

use cli::Cli;
use sipbuild::util::diagnostic;
use sipbuild::UserError;

/// Handle used to change the log level once the configuration is known.
pub struct Logging {
    handle: Option<reload::Handle<EnvFilter, Registry>>,
}

impl Logging {
    fn init() -> Self {
        // RUST_LOG always wins over the configured verbosity.
        let (filter, reloadable) = match EnvFilter::try_from_default_env() {
            Ok(filter) => (filter, false),
            Err(_) => (EnvFilter::new("sipbuild=info"), true),
        };

        let (filter, handle) = reload::Layer::new(filter);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).without_time())
            .init();

        Logging {
            handle: reloadable.then_some(handle),
        }
    }

    pub fn set_verbosity(&self, verbose: bool, quiet: bool) {
        let Some(ref handle) = self.handle else {
            return;
        };

        let directive = if verbose {
            "sipbuild=debug"
        } else if quiet {
            "sipbuild=warn"
        } else {
            "sipbuild=info"
        };

        if let Err(e) = handle.modify(|filter| *filter = EnvFilter::new(directive)) {
            tracing::warn!("unable to change the log level: {}", e);
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let logging = Logging::init();

    let color = !cli.no_color && std::io::stderr().is_terminal();
    let tool = cli.command.tool();

    if let Err(e) = commands::execute(tool, cli.command.into_args(), &logging) {
        if let Some(clap_error) = e.downcast_ref::<clap::Error>() {
            clap_error.exit();
        }

        if let Some(user_error) = e.downcast_ref::<UserError>() {
            diagnostic::emit(&user_error.to_diagnostic(&tool.program()), color);
        } else {
            eprintln!("{}: an internal error occurred, please report it", tool.program());
            eprintln!("error: {:#}", e);
        }

        std::process::exit(1);
    }
}
