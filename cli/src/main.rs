mod commands;
mod terminal;

use commands::{CommandLine, Commands, automate, partition, scan};
use terminal::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let commands = CommandLine::parse_args();

    logging::init(commands.verbose, commands.quiet);
    let config = commands.engine_config()?;

    match commands.command {
        Commands::Scan(args) => scan::scan(args, config).await,
        Commands::Automate(args) => automate::automate(args, config).await,
        Commands::Partition(args) => partition::partition(args, config),
    }
}
