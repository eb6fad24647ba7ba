mod cli;
mod paths;
mod run;
mod settings;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Compile) => run::compile(cli.run),
        None => run::run(cli.run),
    }
}
