//! Reader and writer for protein FASTA files.

use std::io::{BufRead, Write};
use std::path::Path;

use crate::error::Error;
use crate::tsv::open_text;

/// One FASTA entry: the identifier token, the remainder of the header, and the
/// sequence with line breaks removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    pub id: String,
    pub description: String,
    pub sequence: String,
}

impl FastaRecord {
    /// Writes the record with `id` in place of the original identifier token.
    pub fn write_as<W: Write>(&self, writer: &mut W, id: &str) -> std::io::Result<()> {
        if self.description.is_empty() {
            writeln!(writer, ">{id}")?;
        } else {
            writeln!(writer, ">{id} {}", self.description)?;
        }
        writeln!(writer, "{}", self.sequence)
    }
}

/// Reads a plain or gzip-compressed FASTA file.
pub fn read_fasta(path: &Path) -> Result<Vec<FastaRecord>, Error> {
    parse_fasta(open_text(path)?)
        .map_err(|e| Error::Parse(format!("{}: {e}", path.display())))
}

/// Reads FASTA from a buffered reader. Lines before the first header are ignored.
pub fn parse_fasta<R: BufRead>(reader: R) -> Result<Vec<FastaRecord>, Error> {
    let mut results: Vec<FastaRecord> = Vec::new();
    let mut current: Option<FastaRecord> = None;

    for line in reader.lines() {
        let line = line?;
        if line.starts_with('>') {
            if let Some(record) = current.take() {
                results.push(record);
            }
            let (id, description) = split_header(&line)?;
            current = Some(FastaRecord {
                id,
                description,
                sequence: String::new(),
            });
        } else if let Some(record) = current.as_mut() {
            record.sequence.push_str(line.trim());
        }
    }

    if let Some(record) = current {
        results.push(record);
    }

    Ok(results)
}

/// Splits a header line into its first whitespace-delimited token (without `>`)
/// and the trimmed remainder.
fn split_header(header: &str) -> Result<(String, String), Error> {
    let header = header.trim_start_matches('>').trim();
    let mut parts = header.splitn(2, char::is_whitespace);
    let id = parts.next().unwrap_or("");
    if id.is_empty() {
        return Err(Error::Parse("empty FASTA header".to_string()));
    }
    let description = parts.next().unwrap_or("").trim().to_string();
    Ok((id.to_string(), description))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Cursor;

    #[test]
    fn parse_multiple_records() {
        let fasta = ">WP_001.1 DNA polymerase [Archaeoglobus]\nMKV\nLLA\n>WP_002.1\nMSS*\n";
        let records = parse_fasta(Cursor::new(fasta)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "WP_001.1");
        assert_eq!(records[0].description, "DNA polymerase [Archaeoglobus]");
        assert_eq!(records[0].sequence, "MKVLLA");
        assert_eq!(records[1].id, "WP_002.1");
        assert_eq!(records[1].description, "");
        assert_eq!(records[1].sequence, "MSS*");
    }

    #[test]
    fn empty_header_is_error() {
        assert!(parse_fasta(Cursor::new(">\nMKV\n")).is_err());
    }

    #[test]
    fn write_as_replaces_identifier_only() {
        let record = FastaRecord {
            id: "WP_001.1".to_string(),
            description: "WP_001.1 lookalike in description".to_string(),
            sequence: "MKV".to_string(),
        };
        let mut out = Vec::new();
        record.write_as(&mut out, "GCF_1.1_1").unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            ">GCF_1.1_1 WP_001.1 lookalike in description\nMKV\n"
        );
    }

    #[test]
    fn read_gzip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genome_protein.faa.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(b">p1 x\nMK\n>p2\nMV\n").unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();

        let records = read_fasta(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].id, "p2");
        assert_eq!(records[1].sequence, "MV");
    }
}
