//! haphpipe: HAplotype and PHylodynamics pipeline for viral genome assembly
//! and phylogenetic analysis.
//!
//! Each subcommand is a stage: `annotate-from-ref` maps reference GTF gene
//! coordinates onto consensus sequences via the padded pairwise alignment,
//! `build-tree` wraps RAxML-NG, and `demo` sets up the demo directory.

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;

mod align;
mod annotate;
mod demo;
mod error;
mod exec;
mod gtf;
mod tree;

#[derive(Parser, Debug)]
#[command(name = "haphpipe")]
#[command(version)]
#[command(about = "Viral genome assembly and phylodynamics pipeline stages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Annotate consensus sequences from reference annotation
    AnnotateFromRef(annotate::AnnotateArgs),

    /// Build phylogenetic tree with RAxML-NG
    BuildTree(tree::BuildTreeArgs),

    /// Set up demo directory and run demo
    Demo(demo::DemoArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    info!("haphpipe v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::AnnotateFromRef(args) => annotate::run(&args),
        Commands::BuildTree(args) => tree::run(&args),
        Commands::Demo(args) => demo::run(&args),
    }
}
