use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "dinnerhop", version, about = "Dinnerhop progressive dinner CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Event management
    Event {
        #[command(subcommand)]
        action: commands::event::EventAction,
    },
    /// Couple registration
    Couple {
        #[command(subcommand)]
        action: commands::couple::CoupleAction,
    },
    /// Couples that must never meet
    Block {
        #[command(subcommand)]
        action: commands::block::BlockAction,
    },
    /// Per-event envelope reveal timing
    Timing {
        #[command(subcommand)]
        action: commands::timing::TimingAction,
    },
    /// Run and inspect matchings
    Match {
        #[command(subcommand)]
        action: commands::matching::MatchAction,
    },
    /// Envelope inspection
    Envelope {
        #[command(subcommand)]
        action: commands::envelope::EnvelopeAction,
    },
    /// Repair the active plan after late changes
    Cascade {
        #[command(subcommand)]
        action: commands::cascade::CascadeAction,
    },
    /// Audit log
    Audit {
        #[command(subcommand)]
        action: commands::audit::AuditAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Event { action } => commands::event::run(action),
        Commands::Couple { action } => commands::couple::run(action),
        Commands::Block { action } => commands::block::run(action),
        Commands::Timing { action } => commands::timing::run(action),
        Commands::Match { action } => commands::matching::run(action),
        Commands::Envelope { action } => commands::envelope::run(action),
        Commands::Cascade { action } => commands::cascade::run(action),
        Commands::Audit { action } => commands::audit::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
