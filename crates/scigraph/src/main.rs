use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use scigraph::cli::{extract::ExtractOptions, Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    dispatch(cli.command)
}

fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Extract {
            input,
            out,
            config,
            jobs,
            resume,
            min_confidence,
        } => scigraph::cli::extract::run(&ExtractOptions {
            input,
            out,
            config,
            jobs,
            resume,
            min_confidence,
        }),
        Commands::Path { graph, from, to } => scigraph::cli::graph::run_path(&graph, &from, &to),
        Commands::Cycles { graph } => scigraph::cli::graph::run_cycles(&graph),
        Commands::Stats { graph } => scigraph::cli::graph::run_stats(&graph),
        Commands::Config { config } => scigraph::cli::config::run(config.as_deref()),
    }
}
