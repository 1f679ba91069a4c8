//! Bridge launcher
//!
//! Loads one module through an embedding environment and prints its
//! exports as JSON.

use bridge_cli::launcher::parse_log_level;
use bridge_cli::{Cli, CliResult, Launcher};
use clap::Parser as ClapParser;

fn run(cli: &Cli) -> CliResult<()> {
    let launcher = Launcher::from_cli(cli)?;
    let exports = launcher.run(&cli.module, cli.frames)?;
    println!("{}", serde_json::to_string_pretty(&exports)?);
    if cli.stats {
        let stats = serde_json::to_value(launcher.statistics())?;
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let level = match parse_log_level(&cli.log_level) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };
    env_logger::Builder::new().filter_level(level).init();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
