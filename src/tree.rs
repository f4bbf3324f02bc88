//! Build phylogenetic trees with RAxML-NG.
//!
//! Thin stage wrapper: sanitize sequence names, build the raxml-ng invocation,
//! run it in a temporary directory, and copy the known output files into the
//! stage output directory. `--ncpu` is passed straight through to raxml-ng's
//! own threading.

use crate::exec;
use anyhow::{anyhow, Context, Result};
use clap::{Args, ValueEnum};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

const STAGE: &str = "build_tree_NG";

/// Directory created under `--outdir` for tree outputs.
const TREE_DIR: &str = "hp_tree";

/// RAxML-NG output file suffixes copied back from the tempdir.
const RAXML_OUTPUTS: &[&str] = &[
    "bestTree",
    "bestPartitionTrees",
    "bestModel",
    "bootstraps",
    "bootstrapMSA.<REP>.phy",
    "ckp",
    "consensusTree",
    "log",
    "mlTrees",
    "startTree",
    "support",
    "terrace",
    "terraceNewick",
];

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum InType {
    Fasta,
    Phylip,
}

#[derive(Args, Debug)]
pub struct BuildTreeArgs {
    /// Input alignment in FASTA or PHYLIP format
    #[arg(long)]
    pub seqs: Option<PathBuf>,

    /// Input file format
    #[arg(long, value_enum, default_value_t = InType::Fasta)]
    pub in_type: InType,

    /// Run name for trees
    #[arg(long, default_value = "hp_tree")]
    pub output_name: String,

    /// Output directory
    #[arg(long, default_value = ".")]
    pub outdir: PathBuf,

    /// Substitution model OR path to partition file
    #[arg(long, default_value = "GTR")]
    pub model: String,

    /// Run bootstrap search and find best ML tree
    #[arg(long)]
    pub all: bool,

    /// Branch length estimation mode: linked, scaled, unlinked
    #[arg(long)]
    pub branch_length: Option<String>,

    /// Consensus tree building options: STRICT, MR, or MRE
    #[arg(long)]
    pub consense: Option<String>,

    /// Start from a random topology
    #[arg(long)]
    pub rand_tree: Option<u32>,

    /// Start from a parsimony-based randomized stepwise addition tree
    #[arg(long)]
    pub pars_tree: Option<u32>,

    /// Load a custom starting tree from a NEWICK file
    #[arg(long)]
    pub user_tree: Option<PathBuf>,

    /// Find best scoring ML tree
    #[arg(long)]
    pub search: bool,

    /// Find best scoring ML tree with 1 random tree
    #[arg(long)]
    pub search_1random: bool,

    /// Constraint tree, e.g. to enforce monophyly of certain groups
    #[arg(long)]
    pub constraint_tree: Option<PathBuf>,

    /// Outgroup(s) for tree
    #[arg(long)]
    pub outgroup: Option<String>,

    /// A posteriori bootstrap convergence test
    #[arg(long)]
    pub bsconverge: bool,

    /// Generate bootstrap replicate alignments
    #[arg(long)]
    pub bs_msa: bool,

    /// Number of bootstrap trees OR autoMRE
    #[arg(long)]
    pub bs_trees: Option<String>,

    /// Bootstopping cutoff value
    #[arg(long)]
    pub bs_tree_cutoff: Option<f64>,

    /// Bootstrap support metric: tbe or fbp,tbe
    #[arg(long)]
    pub bs_metric: Option<String>,

    /// Run non-parametric bootstrap analysis
    #[arg(long)]
    pub bootstrap: bool,

    /// Check alignment file and remove all-gap columns
    #[arg(long)]
    pub check: bool,

    /// RAxML-NG output verbosity: ERROR, WARNING, RESULT, INFO, PROGRESS, VERBOSE, or DEBUG
    #[arg(long)]
    pub log: Option<String>,

    /// Compute log-likelihood of a given tree without optimization
    #[arg(long)]
    pub loglh: bool,

    /// Check whether a tree lies on a phylogenetic terrace
    #[arg(long)]
    pub terrace: bool,

    /// Seed for random numbers
    #[arg(long, default_value_t = 12345)]
    pub seed: u64,

    /// Run even if there are existing files with the same name
    #[arg(long)]
    pub redo: bool,

    /// Check RAxML-NG version only
    #[arg(long)]
    pub version: bool,

    /// Keep temporary directory
    #[arg(long)]
    pub keep_tmp: bool,

    /// Append console output to this file
    #[arg(long)]
    pub logfile: Option<PathBuf>,

    /// Silence external tool output
    #[arg(long)]
    pub quiet: bool,

    /// Print commands but do not run
    #[arg(long)]
    pub debug: bool,

    /// Number of CPU for raxml-ng
    #[arg(long, default_value_t = 1)]
    pub ncpu: u32,
}

pub fn run(args: &BuildTreeArgs) -> Result<()> {
    exec::check_dependency("raxml-ng")?;

    if args.version {
        return exec::command_runner(
            &[vec!["raxml-ng".to_string(), "-v".to_string()]],
            STAGE,
            args.quiet,
            args.logfile.as_deref(),
            args.debug,
        );
    }

    let seqs = args
        .seqs
        .as_ref()
        .ok_or_else(|| anyhow!("No alignment provided."))?;

    let output_dir = args.outdir.join(TREE_DIR);
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let msa_name = match args.in_type {
        InType::Fasta => "seqs_fixednames.fasta",
        InType::Phylip => "seqs_fixednames.phy",
    };
    let msa = output_dir.join(msa_name);
    sanitize_seq_names(seqs, &msa, args.in_type)?;

    let tmp = exec::create_tempdir(STAGE)?;
    let cmd = raxml_command(args, tmp.path(), &msa);
    exec::command_runner(&[cmd], STAGE, args.quiet, args.logfile.as_deref(), args.debug)?;

    let mut copied = 0usize;
    for suffix in RAXML_OUTPUTS {
        let name = format!("{}.raxml.{}", args.output_name, suffix);
        let src = tmp.path().join(&name);
        if src.exists() {
            fs::copy(&src, output_dir.join(&name))
                .with_context(|| format!("Failed to copy {}", name))?;
            copied += 1;
        }
    }
    if !args.debug {
        info!("Copied {} RAxML-NG output files", copied);
    }
    exec::finish_tempdir(tmp, STAGE, args.keep_tmp)?;

    info!(
        "Stage completed. Output files are located here: {}",
        output_dir.display()
    );
    Ok(())
}

/// Replace symbols that break downstream tree tools in sequence names.
/// FASTA inputs additionally replace spaces.
pub fn sanitize_seq_names(input: &Path, output: &Path, in_type: InType) -> Result<()> {
    let symbols: &[char] = match in_type {
        InType::Fasta => &[' ', ';', ',', ':', '(', ')', '\''],
        InType::Phylip => &[';', ',', ':', '(', ')', '\''],
    };
    let mut content = fs::read_to_string(input)
        .with_context(|| format!("Failed to read alignment: {}", input.display()))?;
    for &sym in symbols {
        if content.contains(sym) {
            content = content.replace(sym, "_");
        }
    }
    fs::write(output, content)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(())
}

/// Build the raxml-ng invocation. Pure so the constructed command is testable.
pub fn raxml_command(args: &BuildTreeArgs, prefix_dir: &Path, msa: &Path) -> Vec<String> {
    let mut cmd: Vec<String> = vec![
        "raxml-ng".to_string(),
        "--prefix".to_string(),
        prefix_dir.join(&args.output_name).display().to_string(),
        "--threads".to_string(),
        args.ncpu.to_string(),
        "--seed".to_string(),
        args.seed.to_string(),
        "--model".to_string(),
        args.model.clone(),
        "--msa".to_string(),
        msa.display().to_string(),
    ];

    let mut push_opt = |flag: &str, value: Option<String>| {
        if let Some(v) = value {
            cmd.push(flag.to_string());
            cmd.push(v);
        }
    };
    push_opt("--brlen", args.branch_length.clone());
    push_opt("--consense", args.consense.clone());

    match (args.pars_tree, args.rand_tree) {
        (Some(p), Some(r)) => push_opt("--tree", Some(format!("pars{{{}}},rand{{{}}}", p, r))),
        (Some(p), None) => push_opt("--tree", Some(format!("pars{{{}}}", p))),
        (None, Some(r)) => push_opt("--tree", Some(format!("rand{{{}}}", r))),
        (None, None) => {}
    }
    push_opt(
        "--tree",
        args.user_tree.as_ref().map(|p| p.display().to_string()),
    );
    push_opt(
        "--tree-constraint",
        args.constraint_tree.as_ref().map(|p| p.display().to_string()),
    );
    push_opt("--outgroup", args.outgroup.clone());
    push_opt("--bs-trees", args.bs_trees.clone());
    push_opt("--bs-cutoff", args.bs_tree_cutoff.map(|c| c.to_string()));
    push_opt("--bs-metric", args.bs_metric.clone());
    push_opt("--log", args.log.clone());

    let mut push_flag = |flag: &str, on: bool| {
        if on {
            cmd.push(flag.to_string());
        }
    };
    push_flag("--search", args.search);
    push_flag("--search1", args.search_1random);
    push_flag("--all", args.all);
    push_flag("--bsconverge", args.bsconverge);
    push_flag("--bsmsa", args.bs_msa);
    push_flag("--bootstrap", args.bootstrap);
    push_flag("--check", args.check);
    push_flag("--loglh", args.loglh);
    push_flag("--terrace", args.terrace);
    push_flag("--redo", args.redo);

    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn base_args() -> BuildTreeArgs {
        BuildTreeArgs {
            seqs: Some(PathBuf::from("aln.fasta")),
            in_type: InType::Fasta,
            output_name: "hp_tree".to_string(),
            outdir: PathBuf::from("."),
            model: "GTR".to_string(),
            all: false,
            branch_length: None,
            consense: None,
            rand_tree: None,
            pars_tree: None,
            user_tree: None,
            search: false,
            search_1random: false,
            constraint_tree: None,
            outgroup: None,
            bsconverge: false,
            bs_msa: false,
            bs_trees: None,
            bs_tree_cutoff: None,
            bs_metric: None,
            bootstrap: false,
            check: false,
            log: None,
            loglh: false,
            terrace: false,
            seed: 12345,
            redo: false,
            version: false,
            keep_tmp: false,
            logfile: None,
            quiet: true,
            debug: true,
            ncpu: 1,
        }
    }

    #[test]
    fn test_raxml_command_defaults() {
        let args = base_args();
        let cmd = raxml_command(&args, Path::new("/tmp/work"), Path::new("msa.fasta"));
        assert_eq!(cmd[0], "raxml-ng");
        let rendered = cmd.join(" ");
        assert!(rendered.contains("--prefix /tmp/work/hp_tree"));
        assert!(rendered.contains("--threads 1"));
        assert!(rendered.contains("--seed 12345"));
        assert!(rendered.contains("--model GTR"));
        assert!(rendered.contains("--msa msa.fasta"));
        assert!(!rendered.contains("--tree"));
    }

    #[test]
    fn test_raxml_command_starting_trees() {
        let mut args = base_args();
        args.pars_tree = Some(2);
        args.rand_tree = Some(3);
        let cmd = raxml_command(&args, Path::new("/tmp/work"), Path::new("msa.fasta"));
        assert!(cmd.join(" ").contains("--tree pars{2},rand{3}"));

        args.rand_tree = None;
        let cmd = raxml_command(&args, Path::new("/tmp/work"), Path::new("msa.fasta"));
        assert!(cmd.join(" ").contains("--tree pars{2}"));

        args.pars_tree = None;
        args.rand_tree = Some(7);
        let cmd = raxml_command(&args, Path::new("/tmp/work"), Path::new("msa.fasta"));
        assert!(cmd.join(" ").contains("--tree rand{7}"));
    }

    #[test]
    fn test_raxml_command_bootstrap_options() {
        let mut args = base_args();
        args.all = true;
        args.bs_trees = Some("autoMRE".to_string());
        args.bs_metric = Some("tbe".to_string());
        args.bs_tree_cutoff = Some(0.03);
        let rendered = raxml_command(&args, Path::new("/t"), Path::new("m.fasta")).join(" ");
        assert!(rendered.contains("--all"));
        assert!(rendered.contains("--bs-trees autoMRE"));
        assert!(rendered.contains("--bs-metric tbe"));
        assert!(rendered.contains("--bs-cutoff 0.03"));
    }

    #[test]
    fn test_sanitize_seq_names_fasta() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("in.fasta");
        let output = dir.path().join("out.fasta");
        let mut f = fs::File::create(&input).unwrap();
        writeln!(f, ">seq one (clone A); test").unwrap();
        writeln!(f, "ACGT").unwrap();
        drop(f);

        sanitize_seq_names(&input, &output, InType::Fasta).unwrap();
        let content = fs::read_to_string(&output).unwrap();
        assert!(content.starts_with(">seq_one__clone_A___test"));
        assert!(content.contains("ACGT"));
    }

    #[test]
    fn test_sanitize_seq_names_phylip_keeps_spaces() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("in.phy");
        let output = dir.path().join("out.phy");
        fs::write(&input, "2 4\nseq:1 ACGT\n").unwrap();

        sanitize_seq_names(&input, &output, InType::Phylip).unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "2 4\nseq_1 ACGT\n");
    }
}
