use clap::{Parser, Subcommand};

mod commands;
mod common;

#[derive(Parser)]
#[command(name = "oathkeeper-cli", version, about = "Oathkeeper CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Protocol management
    Protocol {
        #[command(subcommand)]
        action: commands::protocol::ProtocolAction,
    },
    /// Submit proof for a cycle
    Submit(commands::submit::SubmitArgs),
    /// Owner status snapshot
    Status,
    /// Run a scheduler sweep
    Tick(commands::tick::TickArgs),
    /// Compliance statistics
    Stats,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Protocol { action } => commands::protocol::run(action),
        Commands::Submit(args) => commands::submit::run(args),
        Commands::Status => commands::status::run(),
        Commands::Tick(args) => commands::tick::run(args),
        Commands::Stats => commands::stats::run(),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
