//! GTF parsing and emission.
//!
//! Rows are kept close to the wire format: nine tab-separated fields with an
//! order-preserving `key "value";` attribute list, so a parsed row can be
//! re-emitted (or a remapped copy written) without attribute reshuffling.

use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::io::BufRead;

/// A single GTF record. `start`/`end` are 1-based inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct GtfRow {
    pub chrom: String,
    pub source: String,
    pub feature: String,
    pub start: i64,
    pub end: i64,
    pub score: String,
    pub strand: char,
    pub frame: char,
    pub attrs: Vec<(String, String)>,
}

impl GtfRow {
    /// Look up an attribute by key.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Append an attribute, preserving insertion order.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attrs.push((key.into(), value.into()));
    }

    /// Parse one GTF data line.
    pub fn parse(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 9 {
            return Err(anyhow!(
                "expected 9 tab-separated fields, found {}",
                fields.len()
            ));
        }

        let start: i64 = fields[3]
            .parse()
            .with_context(|| format!("invalid start coordinate '{}'", fields[3]))?;
        let end: i64 = fields[4]
            .parse()
            .with_context(|| format!("invalid end coordinate '{}'", fields[4]))?;

        Ok(GtfRow {
            chrom: fields[0].to_string(),
            source: fields[1].to_string(),
            feature: fields[2].to_string(),
            start,
            end,
            score: fields[5].to_string(),
            strand: fields[6].chars().next().unwrap_or('.'),
            frame: fields[7].chars().next().unwrap_or('.'),
            attrs: parse_attrs(fields[8]),
        })
    }
}

/// Parse a GTF attribute field: `key "value"; key2 "value2";`
/// Bare (unquoted) values are tolerated; a `;` inside a quoted value does not
/// terminate the attribute.
fn parse_attrs(field: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut token = String::new();
    let mut in_quotes = false;
    for c in field.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                token.push(c);
            }
            ';' if !in_quotes => {
                push_attr(&mut attrs, &token);
                token.clear();
            }
            _ => token.push(c),
        }
    }
    push_attr(&mut attrs, &token);
    attrs
}

fn push_attr(attrs: &mut Vec<(String, String)>, token: &str) {
    let token = token.trim();
    if token.is_empty() {
        return;
    }
    if let Some((key, value)) = token.split_once(' ') {
        attrs.push((key.to_string(), value.trim().trim_matches('"').to_string()));
    }
}

impl fmt::Display for GtfRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attrs = self
            .attrs
            .iter()
            .map(|(k, v)| format!("{} \"{}\";", k, v))
            .collect::<Vec<_>>()
            .join(" ");
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.chrom,
            self.source,
            self.feature,
            self.start,
            self.end,
            self.score,
            self.strand,
            self.frame,
            attrs
        )
    }
}

/// Streaming GTF reader. Comment and blank lines are skipped.
pub struct GtfReader<R: BufRead> {
    lines: std::io::Lines<R>,
    line_no: usize,
}

impl<R: BufRead> GtfReader<R> {
    pub fn new(reader: R) -> Self {
        GtfReader {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl<R: BufRead> Iterator for GtfReader<R> {
    type Item = Result<GtfRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            let line_no = self.line_no;
            return Some(
                GtfRow::parse(&line).with_context(|| format!("GTF line {}", line_no)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const LINE: &str =
        "HIV_B.K03455.HXB2\trefann\tgene\t790\t2292\t.\t+\t0\tname \"gag\"; locus_tag \"HXB2_1\";";

    #[test]
    fn test_parse_line() {
        let row = GtfRow::parse(LINE).unwrap();
        assert_eq!(row.chrom, "HIV_B.K03455.HXB2");
        assert_eq!(row.feature, "gene");
        assert_eq!(row.start, 790);
        assert_eq!(row.end, 2292);
        assert_eq!(row.strand, '+');
        assert_eq!(row.frame, '0');
        assert_eq!(row.attr("name"), Some("gag"));
        assert_eq!(row.attr("locus_tag"), Some("HXB2_1"));
        assert_eq!(row.attr("missing"), None);
    }

    #[test]
    fn test_parse_bare_attr_value() {
        let line = "chr1\tsrc\tgene\t1\t10\t.\t+\t.\tname gag; call_len 42";
        let row = GtfRow::parse(line).unwrap();
        assert_eq!(row.attr("name"), Some("gag"));
        assert_eq!(row.attr("call_len"), Some("42"));
    }

    #[test]
    fn test_parse_quoted_semicolon_in_value() {
        let line = "chr1\tsrc\tgene\t1\t10\t.\t+\t.\tproduct \"protease; mature\"; name \"pol\";";
        let row = GtfRow::parse(line).unwrap();
        assert_eq!(row.attr("product"), Some("protease; mature"));
        assert_eq!(row.attr("name"), Some("pol"));
    }

    #[test]
    fn test_parse_short_line_fails() {
        assert!(GtfRow::parse("chr1\tsrc\tgene\t1\t10").is_err());
        assert!(GtfRow::parse("chr1\tsrc\tgene\tX\t10\t.\t+\t.\tname \"g\";").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        let row = GtfRow::parse(LINE).unwrap();
        let reparsed = GtfRow::parse(&row.to_string()).unwrap();
        assert_eq!(row, reparsed);
    }

    #[test]
    fn test_reader_skips_comments_and_blanks() {
        let input = format!("# comment\n\n{}\n##another\n{}\n", LINE, LINE);
        let rows: Vec<_> = GtfReader::new(Cursor::new(input))
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_reader_reports_line_number() {
        let input = format!("# header\n{}\nbroken line\n", LINE);
        let results: Vec<_> = GtfReader::new(Cursor::new(input)).collect();
        assert!(results[0].is_ok());
        let err = results[1].as_ref().unwrap_err();
        assert!(format!("{:#}", err).contains("GTF line 3"));
    }
}
