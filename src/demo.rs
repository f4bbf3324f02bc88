//! Set up the demo directory and run the demo pipeline.
//!
//! Pulls the packaged reference bundle (FASTA, amplicons, GTF) if it is not
//! already present, then hands off to the `haphpipe_demo` driver.

use crate::exec;
use anyhow::{Context, Result};
use clap::Args;
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

const REFS_URL: &str = "https://github.com/gwcbi/haphpipe/blob/master/bin/refs.tar.gz?raw=true";

/// Files expected under `<outdir>/refs` once the bundle is unpacked.
const REQUIRED_REFS: &[&str] = &[
    "HIV_B.K03455.HXB2.amplicons.fasta",
    "HIV_B.K03455.HXB2.fasta",
    "HIV_B.K03455.HXB2.gtf",
];

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Output directory
    #[arg(long, default_value = "./demo")]
    pub outdir: PathBuf,

    /// Only pull the reference files, do not run the full demo
    #[arg(long)]
    pub refonly: bool,

    /// Silence external tool output
    #[arg(long)]
    pub quiet: bool,

    /// Print commands but do not run
    #[arg(long)]
    pub debug: bool,
}

/// True when every file of the reference bundle is already in place.
pub fn refs_present(outdir: &Path) -> bool {
    let refs_dir = outdir.join("refs");
    REQUIRED_REFS.iter().all(|f| refs_dir.join(f).exists())
}

pub fn run(args: &DemoArgs) -> Result<()> {
    fs::create_dir_all(&args.outdir)
        .with_context(|| format!("Failed to create {}", args.outdir.display()))?;

    if refs_present(&args.outdir) {
        info!(
            "References found at {}.",
            args.outdir.join("refs").display()
        );
    } else {
        let tarball = args.outdir.join("refs.tar.gz");
        let cmds = vec![
            vec![
                "curl".to_string(),
                "-L".to_string(),
                REFS_URL.to_string(),
                ">".to_string(),
                tarball.display().to_string(),
            ],
            vec![
                "tar".to_string(),
                "-xzvf".to_string(),
                tarball.display().to_string(),
                "-C".to_string(),
                args.outdir.display().to_string(),
            ],
            vec!["rm".to_string(), tarball.display().to_string()],
        ];
        exec::command_runner(&cmds, "refs", args.quiet, None, args.debug)?;
    }

    if args.refonly {
        info!("Complete: demo was run with --refonly.");
        return Ok(());
    }

    info!("Running demo in {}.", args.outdir.display());
    exec::check_dependency("fastq-dump")?;

    exec::command_runner(
        &[vec![
            "haphpipe_demo".to_string(),
            args.outdir.display().to_string(),
        ]],
        "demo",
        args.quiet,
        None,
        args.debug,
    )
}
