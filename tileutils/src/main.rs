mod convert;
mod export;
mod formats;
mod import;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tileutils")]
#[command(about = "Convert and index map-tile archives", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert between tile storage formats
    Convert(convert::Args),
    /// Export a tile index (and optionally tile data) from a tileset
    #[command(name = "export-index")]
    ExportIndex(export::Args),
    /// Create a tileset from an exported tile index and data
    #[command(name = "import-index")]
    ImportIndex(import::Args),
}

fn main() -> anyhow::Result<()> {
    // Initialize logger from RUST_LOG environment variable
    // Example: RUST_LOG=debug tileutils convert ...
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Convert(args) => convert::run(args),
        Commands::ExportIndex(args) => export::run(args),
        Commands::ImportIndex(args) => import::run(args),
    }
}
