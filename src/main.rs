// Command-line entry point for TraceVis.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracevis::application::{layout, ExportUsecase, GraphSummary};
use tracevis::infrastructure::concurrency::init_thread_pool;
use tracevis::infrastructure::config::VisConfig;
use tracevis::infrastructure::{DiskDisassembly, GraphFile};
use tracevis::ports::dot_exporter::DotExporter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file
    #[arg(short, long, default_value = "tracevis.toml")]
    config: PathBuf,

    /// Directory holding saved graphs (overrides the config)
    #[arg(long)]
    graph_dir: Option<PathBuf>,

    /// Disassembly store directory (overrides the config)
    #[arg(long)]
    disassembly: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print node and edge counts for a saved trace
    Inspect { trace: String },
    /// Print the sphere position of every node
    Layout { trace: String },
    /// Write a Graphviz rendering of a saved trace
    Export {
        trace: String,
        /// Output file path
        #[arg(short, long)]
        output: String,
    },
}

fn print_summary(trace: &str, summary: &GraphSummary) {
    println!(
        "{}: {} nodes ({} internal, {} external), {} edges",
        trace,
        summary.nodes,
        summary.internal,
        summary.external,
        summary.edges
    );
    if !summary.self_loops.is_empty() {
        println!("  self loops on: {:?}", summary.self_loops);
    }
    if !summary.unmirrored_edges.is_empty() {
        println!("  unmirrored edges: {:?}", summary.unmirrored_edges);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = VisConfig::load(&cli.config)?;
    if let Some(dir) = cli.graph_dir {
        config.storage.graph_dir = dir;
    }
    if let Some(dir) = cli.disassembly {
        config.storage.disassembly_dir = dir;
    }

    let cache = DiskDisassembly::open(&config.storage.disassembly_dir)?;

    match cli.command {
        Command::Inspect { trace } => {
            let file = GraphFile::new(&config.storage.graph_dir, &trace);
            let arena = file.load(&cache)?;
            print_summary(&trace, &GraphSummary::of(&arena));
        }
        Command::Layout { trace } => {
            init_thread_pool()?;
            let file = GraphFile::new(&config.storage.graph_dir, &trace);
            let arena = file.load(&cache)?;
            let sphere = &config.sphere;
            for (index, c) in layout(&arena, &sphere.dims(), sphere.diam_modifier) {
                println!("{} {:.3} {:.3} {:.3}", index, c.x, c.y, c.z);
            }
        }
        Command::Export { trace, output } => {
            let file = GraphFile::new(&config.storage.graph_dir, &trace);
            let usecase = ExportUsecase { exporter: &DotExporter };
            let summary = usecase
                .run(&file, &cache, &output)
                .with_context(|| format!("Failed to export {}", trace))?;
            print_summary(&trace, &summary);
            println!("Graph written to {}", output);
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
