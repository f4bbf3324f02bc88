//! Annotate consensus sequences from a reference annotation.
//!
//! Translates reference GTF gene coordinates into consensus-sequence
//! coordinates by walking the padded pairwise-alignment table produced by the
//! upstream alignment stage. Each mapped row carries segment statistics plus
//! the consensus regions that were actually called.

use crate::align::{self, AlignmentColumn, PaddedAlignment};
use crate::error::PipelineError;
use crate::gtf::{GtfReader, GtfRow};
use anyhow::{Context, Result};
use clap::Args;
use log::info;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Source tag written into the second GTF column of mapped rows.
const SOURCE: &str = "haphpipe";

/// Slot of the alignment JSON holding the padded alignment tables.
const ALIGNMENT_SLOT: &str = "padded_alignments";

#[derive(Args, Debug)]
pub struct AnnotateArgs {
    /// JSON file describing alignment (output of pairwise alignment stage)
    #[arg(long)]
    pub align_json: PathBuf,

    /// GTF file for reference regions
    #[arg(long)]
    pub ref_gtf: PathBuf,

    /// Output file (default: stdout)
    #[arg(long)]
    pub outfile: Option<PathBuf>,
}

/// Stage entry point: owns the output sink and hands the mapping loop an
/// explicit writer.
pub fn run(args: &AnnotateArgs) -> Result<()> {
    match &args.outfile {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut out = BufWriter::new(file);
            annotate_from_ref(&args.align_json, &args.ref_gtf, &mut out)?;
            out.flush()?;
        }
        None => {
            let mut out = std::io::stdout().lock();
            annotate_from_ref(&args.align_json, &args.ref_gtf, &mut out)?;
            out.flush()?;
        }
    }
    Ok(())
}

/// Map every gene row of `ref_gtf` onto its consensus sequence and write the
/// remapped GTF rows to `out`. The first unresolvable row aborts the run.
pub fn annotate_from_ref<W: Write>(align_json: &Path, ref_gtf: &Path, out: &mut W) -> Result<()> {
    let jaln = align::load_slot_json(align_json, ALIGNMENT_SLOT)?;
    let refmap = align::ref_map(&jaln)?;
    info!(
        "Loaded {} padded alignments from {}",
        jaln.len(),
        align_json.display()
    );

    let gtf_file = File::open(ref_gtf)
        .with_context(|| format!("Failed to open GTF file: {}", ref_gtf.display()))?;

    let mut mapped_rows = 0usize;
    for row in GtfReader::new(BufReader::new(gtf_file)) {
        let row = row?;
        if row.feature != "gene" {
            continue;
        }
        let mapped = map_row(&jaln, &refmap, &row)?;
        writeln!(out, "{}", mapped)?;
        mapped_rows += 1;
    }

    info!("Annotated {} gene features", mapped_rows);
    Ok(())
}

/// Resolve the alignment for one GTF row and map it.
fn map_row(
    jaln: &BTreeMap<String, PaddedAlignment>,
    refmap: &BTreeMap<String, String>,
    row: &GtfRow,
) -> Result<GtfRow, PipelineError> {
    let key = refmap
        .get(&row.chrom)
        .ok_or_else(|| PipelineError::ReferenceNotFound(row.chrom.clone()))?;
    let alignment = jaln
        .get(key)
        .ok_or_else(|| PipelineError::ReferenceNotFound(row.chrom.clone()))?;
    map_annotation(key, alignment, row)
}

/// Translate one gene annotation from reference to consensus coordinates.
///
/// The reference window is `[start - 1, end)` in 0-based coordinates. Both
/// window edges must match a column's `ref_pos` exactly; columns without a
/// consensus call are skipped inward from either edge. All scans are
/// bounds-checked: a window with no called column at all resolves to
/// `CoordinateNotFound` rather than walking off the table.
pub fn map_annotation(
    key: &str,
    alignment: &[AlignmentColumn],
    row: &GtfRow,
) -> Result<GtfRow, PipelineError> {
    let ref_start = row.start - 1;
    let ref_end = row.end;

    let not_found = |pos: i64| PipelineError::CoordinateNotFound {
        chrom: row.chrom.clone(),
        pos,
    };

    let mut aln_s = alignment
        .iter()
        .position(|c| c.ref_pos == ref_start)
        .ok_or_else(|| not_found(ref_start))?;
    while aln_s < alignment.len() && !alignment[aln_s].is_called() {
        aln_s += 1;
    }
    if aln_s == alignment.len() {
        return Err(not_found(ref_start));
    }

    let mut aln_e = alignment
        .iter()
        .rposition(|c| c.ref_pos == ref_end)
        .ok_or_else(|| not_found(ref_end))?;
    while !alignment[aln_e].is_called() {
        if aln_e == 0 {
            return Err(not_found(ref_end));
        }
        aln_e -= 1;
    }

    // Both skips land on called columns; if they crossed, the window holds no
    // consensus call at all.
    if aln_e < aln_s {
        return Err(not_found(ref_start));
    }

    let con_s = alignment[aln_s].con_pos;
    let con_e = alignment[aln_e].con_pos;
    let window = &alignment[aln_s..=aln_e];

    let mut mapped = GtfRow {
        chrom: key.to_string(),
        source: SOURCE.to_string(),
        feature: row.feature.clone(),
        start: con_s + 1,
        end: con_e,
        score: ".".to_string(),
        strand: row.strand,
        frame: row.frame,
        attrs: Vec::new(),
    };
    if let Some(name) = row.attr("name") {
        mapped.set_attr("name", name);
    }

    for (stat, value) in segment_stats(window) {
        mapped.set_attr(stat, value);
    }

    let regions = called_regions(window);
    mapped.set_attr(
        "call_reg",
        regions
            .iter()
            .map(|(s, e)| format!("{}-{}", s, e))
            .collect::<Vec<_>>()
            .join(","),
    );
    mapped.set_attr(
        "call_len",
        regions
            .iter()
            .map(|(s, e)| e - s + 1)
            .sum::<i64>()
            .to_string(),
    );

    Ok(mapped)
}

/// Per-window column counts, in stable output order.
pub fn segment_stats(window: &[AlignmentColumn]) -> Vec<(&'static str, String)> {
    let mut ref_cols = 0i64;
    let mut con_cols = 0i64;
    let mut matches = 0i64;
    let mut mismatches = 0i64;

    for col in window {
        let has_ref = col.ref_base != '-';
        let has_con = col.is_called() && col.con_base != '-';
        if has_ref {
            ref_cols += 1;
        }
        if has_con {
            con_cols += 1;
        }
        if has_ref && has_con {
            if col.ref_base.eq_ignore_ascii_case(&col.con_base) {
                matches += 1;
            } else {
                mismatches += 1;
            }
        }
    }

    vec![
        ("aln_cols", window.len().to_string()),
        ("ref_cols", ref_cols.to_string()),
        ("con_cols", con_cols.to_string()),
        ("match", matches.to_string()),
        ("mismatch", mismatches.to_string()),
    ]
}

/// Maximal contiguous runs of called columns, as closed consensus intervals.
pub fn called_regions(window: &[AlignmentColumn]) -> Vec<(i64, i64)> {
    let mut regions: Vec<(i64, i64)> = Vec::new();
    let mut current: Option<(i64, i64)> = None;

    for col in window {
        if col.is_called() {
            current = match current {
                Some((first, _)) => Some((first, col.con_pos)),
                None => Some((col.con_pos, col.con_pos)),
            };
        } else if let Some(region) = current.take() {
            regions.push(region);
        }
    }
    if let Some(region) = current {
        regions.push(region);
    }
    regions
}
