//! Trigmap CLI: the `trigmap` command.

mod cli;
mod commands;
mod support;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    support::init_tracing(cli.common.log_level.as_deref());

    match cli.command {
        Commands::Triggers(args) => commands::triggers::run(&cli.common, args),
        Commands::Dep { command } => commands::dep::run(&cli.common, command),
        Commands::MapState {
            sysmapid,
            severity_min,
        } => commands::map_state::run(&cli.common, sysmapid, severity_min),
    }
}
