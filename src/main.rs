mod align;
mod cli;
mod commands;
mod common;
mod config;
mod media;
mod pipeline;
mod providers;
mod transcript;
mod ui;
mod utils;

use clap::Parser;

use cli::Commands;
use ui::prelude::{Level, emit};

/// Revoice: replace a narrated video's voice with a synthesized clone while
/// keeping the new track aligned to the original timeline.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Activate debug mode
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit machine-readable JSON events
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

fn main() {
    let cli = Cli::parse();

    ui::set_debug_mode(cli.debug);
    let format = if cli.json {
        ui::OutputFormat::Json
    } else {
        ui::OutputFormat::Text
    };
    ui::init(format, true);

    let result = match cli.command {
        Commands::Process(args) => commands::handle_process(args),
        Commands::Transcribe(args) => commands::handle_transcribe(args),
        Commands::Probe(args) => commands::handle_probe(args),
        Commands::Setup(args) => commands::handle_setup(args),
        Commands::Check => commands::handle_check(),
    };

    if let Err(err) = result {
        emit(Level::Error, "cli.error", &format!("{err:#}"), None);
        std::process::exit(1);
    }
}
