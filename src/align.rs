//! Padded pairwise-alignment model and JSON loading.
//!
//! The upstream pairwise-alignment stage writes a JSON document whose
//! `padded_alignments` slot maps each consensus sequence id to a table of
//! alignment columns. Each column is a 4-tuple
//! `[ref_pos, ref_base, con_base, con_pos]`; a `con_pos` of -1 marks a
//! reference position with no consensus call.

use crate::error::PipelineError;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Sentinel consensus position for uncalled columns.
pub const UNCALLED: i64 = -1;

/// One column of a padded pairwise alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "(i64, String, String, i64)")]
pub struct AlignmentColumn {
    /// Reference position (0-based). Non-decreasing across the table.
    pub ref_pos: i64,
    /// Reference base, or '-' for an insertion in the consensus.
    pub ref_base: char,
    /// Consensus base, or '-' for a deletion in the consensus.
    pub con_base: char,
    /// Consensus position (0-based), or [`UNCALLED`].
    pub con_pos: i64,
}

impl AlignmentColumn {
    /// True when this column carries a real consensus coordinate.
    pub fn is_called(&self) -> bool {
        self.con_pos != UNCALLED
    }
}

impl TryFrom<(i64, String, String, i64)> for AlignmentColumn {
    type Error = String;

    fn try_from(raw: (i64, String, String, i64)) -> std::result::Result<Self, Self::Error> {
        let (ref_pos, ref_base, con_base, con_pos) = raw;
        Ok(AlignmentColumn {
            ref_pos,
            ref_base: single_base(&ref_base)?,
            con_base: single_base(&con_base)?,
            con_pos,
        })
    }
}

fn single_base(s: &str) -> std::result::Result<char, String> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(format!("expected single base character, got {:?}", s)),
    }
}

/// Ordered alignment columns for one reference/consensus pair.
pub type PaddedAlignment = Vec<AlignmentColumn>;

/// Load one slot of an alignment JSON document, keyed by sequence id.
///
/// Inputs ending in `.gz` are decompressed transparently.
pub fn load_slot_json(path: &Path, slot: &str) -> Result<BTreeMap<String, PaddedAlignment>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let gzipped = path.extension().map(|e| e == "gz").unwrap_or(false);
    let reader: Box<dyn Read> = if gzipped {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    let mut doc: serde_json::Value = serde_json::from_reader(BufReader::new(reader))
        .with_context(|| format!("Failed to parse alignment JSON: {}", path.display()))?;

    let slot_value = doc
        .get_mut(slot)
        .ok_or_else(|| PipelineError::SlotNotFound {
            path: path.to_path_buf(),
            slot: slot.to_string(),
        })?
        .take();

    serde_json::from_value(slot_value)
        .with_context(|| format!("Malformed '{}' slot in {}", slot, path.display()))
}

/// Parse a pipe-delimited sequence id of alternating key/value fields,
/// e.g. `sid|sample1|ref|HIV_B.K03455.HXB2` -> {sid: sample1, ref: ...}.
pub fn parse_seq_id(id: &str) -> BTreeMap<String, String> {
    let fields: Vec<&str> = id
        .trim_start_matches('>')
        .trim_matches('|')
        .split('|')
        .collect();
    fields
        .chunks_exact(2)
        .map(|kv| (kv[0].to_string(), kv[1].to_string()))
        .collect()
}

/// Map each derived reference id to its full alignment key.
///
/// Keys are visited in sorted order; a reference id derived from more than one
/// alignment entry is an error rather than silent last-write-wins.
pub fn ref_map(
    alignments: &BTreeMap<String, PaddedAlignment>,
) -> Result<BTreeMap<String, String>, PipelineError> {
    let mut map = BTreeMap::new();
    for key in alignments.keys() {
        let ref_id = parse_seq_id(key).remove("ref").ok_or_else(|| {
            PipelineError::MalformedAlignment(format!("alignment key '{}' has no 'ref' field", key))
        })?;
        if map.insert(ref_id.clone(), key.clone()).is_some() {
            return Err(PipelineError::AmbiguousReference(ref_id));
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn col(ref_pos: i64, ref_base: char, con_base: char, con_pos: i64) -> AlignmentColumn {
        AlignmentColumn {
            ref_pos,
            ref_base,
            con_base,
            con_pos,
        }
    }

    #[test]
    fn test_column_from_tuple() {
        let c: AlignmentColumn =
            serde_json::from_str(r#"[100, "A", "-", -1]"#).unwrap();
        assert_eq!(c, col(100, 'A', '-', -1));
        assert!(!c.is_called());

        let bad: std::result::Result<AlignmentColumn, _> =
            serde_json::from_str(r#"[100, "AC", "G", 5]"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_parse_seq_id() {
        let parsed = parse_seq_id(">sid|sample1|ref|HIV_B.K03455.HXB2|");
        assert_eq!(parsed.get("sid").map(String::as_str), Some("sample1"));
        assert_eq!(
            parsed.get("ref").map(String::as_str),
            Some("HIV_B.K03455.HXB2")
        );

        // Trailing odd field is dropped, not an error
        let parsed = parse_seq_id("sid|s1|extra");
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_ref_map_collision() {
        let aln = vec![col(0, 'A', 'A', 0)];
        let mut alignments = BTreeMap::new();
        alignments.insert("sid|a|ref|chr1".to_string(), aln.clone());
        alignments.insert("sid|b|ref|chr1".to_string(), aln);

        match ref_map(&alignments) {
            Err(PipelineError::AmbiguousReference(r)) => assert_eq!(r, "chr1"),
            other => panic!("expected AmbiguousReference, got {:?}", other),
        }
    }

    #[test]
    fn test_ref_map_missing_ref_field() {
        let mut alignments = BTreeMap::new();
        alignments.insert("sid|a".to_string(), vec![col(0, 'A', 'A', 0)]);
        assert!(matches!(
            ref_map(&alignments),
            Err(PipelineError::MalformedAlignment(_))
        ));
    }

    #[test]
    fn test_load_slot_json() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            tmp,
            r#"{{"padded_alignments": {{"sid|s1|ref|chr1": [[0, "A", "A", 0], [1, "C", "-", -1]]}}}}"#
        )
        .unwrap();
        tmp.flush().unwrap();

        let loaded = load_slot_json(tmp.path(), "padded_alignments").unwrap();
        let aln = loaded.get("sid|s1|ref|chr1").unwrap();
        assert_eq!(aln.len(), 2);
        assert_eq!(aln[0], col(0, 'A', 'A', 0));
        assert_eq!(aln[1], col(1, 'C', '-', -1));
    }

    #[test]
    fn test_load_slot_json_missing_slot() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, r#"{{"other": {{}}}}"#).unwrap();
        tmp.flush().unwrap();

        let err = load_slot_json(tmp.path(), "padded_alignments").unwrap_err();
        let err = err.downcast::<PipelineError>().unwrap();
        assert!(matches!(err, PipelineError::SlotNotFound { .. }));
    }
}
