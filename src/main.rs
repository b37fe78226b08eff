use backbone::cli::{Cli, Commands};
use backbone::BackboneError;
use clap::Parser;
use colored::*;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over BACKBONE_LOG; -v raises the default
    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let log_level = std::env::var("BACKBONE_LOG").unwrap_or_else(|_| default_level.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);

        let exit_code = match e.downcast_ref::<BackboneError>() {
            Some(BackboneError::Config(_)) => 2,
            Some(BackboneError::Io(_)) => 3,
            Some(BackboneError::Schema { .. }) | Some(BackboneError::Parse(_)) => 4,
            Some(BackboneError::Structural { .. }) => 5,
            _ => 1,
        };
        process::exit(exit_code);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let num_threads = if cli.threads == 0 {
        num_cpus::get()
    } else {
        cli.threads
    };

    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
        .map_err(|e| anyhow::anyhow!("Failed to initialize thread pool: {}", e))?;
    tracing::debug!("Using {} threads", num_threads);

    match cli.command {
        Commands::Build(args) => backbone::cli::commands::build::run(args),
        Commands::Search(args) => backbone::cli::commands::search::run(args),
    }
}
