pub mod config;
pub mod extract;
pub mod graph;

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "scigraph",
    about = "Extract entity relationships and knowledge graphs from research text",
    version
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

fn default_jobs() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process a .txt file or a directory of .txt files
    Extract {
        /// Text file or directory of text files
        input: PathBuf,
        /// Output directory for per-document artifacts
        #[arg(short, long)]
        out: PathBuf,
        /// Config file (defaults to $SCIGRAPH_CONFIG, then the user config file)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Documents processed concurrently
        #[arg(short, long, default_value_t = default_jobs())]
        jobs: usize,
        /// Skip documents recorded in the output's checkpoint
        #[arg(long)]
        resume: bool,
        /// Drop relationships below this confidence
        #[arg(long = "min-confidence")]
        min_confidence: Option<f64>,
    },
    /// Print the shortest path between two nodes of a knowledge graph
    Path {
        /// knowledge_graph.json file
        graph: PathBuf,
        /// Start node id or text
        from: String,
        /// End node id or text
        to: String,
    },
    /// Print the cycles of a knowledge graph
    Cycles {
        /// knowledge_graph.json file
        graph: PathBuf,
    },
    /// Print statistics for a knowledge graph as JSON
    Stats {
        /// knowledge_graph.json file
        graph: PathBuf,
    },
    /// Print the effective configuration as JSON
    Config {
        /// Config file to read instead of the discovered one
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
