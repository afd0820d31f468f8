//! Readers for the tab-separated side tables shared by the pipeline stages.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;

use crate::error::Error;

/// Opens a text file for buffered reading, decompressing when the name ends in `.gz`.
pub fn open_text(path: &Path) -> Result<Box<dyn BufRead>, Error> {
    let file = File::open(path)
        .map_err(|e| Error::Format(format!("failed to open {}: {e}", path.display())))?;
    if is_gzip_path(path) {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

pub fn is_gzip_path(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

/// True when `path` is an existing regular file with at least one byte.
pub fn is_nonempty_file(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > 0)
}

/// A two-column `key \t value` table, e.g. generated gene ID → original gene ID,
/// or genome name → object reference.
#[derive(Debug, Default, Clone)]
pub struct IdMap {
    name: String,
    entries: HashMap<String, String>,
}

impl IdMap {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Parses a two-column map. `#` comment lines and blank lines are skipped;
    /// any other line must hold exactly two tab-separated fields. Repeated keys
    /// are rejected.
    pub fn parse<R: BufRead>(name: &str, reader: R) -> Result<Self, Error> {
        let mut map = Self::new(name);
        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('\t') else {
                return Err(Error::Parse(format!(
                    "{name} line {} has 1 column, expected 2: {line}",
                    line_num + 1
                )));
            };
            if value.contains('\t') {
                return Err(Error::Parse(format!(
                    "{name} line {} has more than 2 columns: {line}",
                    line_num + 1
                )));
            }
            map.insert(key, value)?;
        }
        Ok(map)
    }

    pub fn from_file(name: &str, path: &Path) -> Result<Self, Error> {
        Self::parse(name, open_text(path)?)
    }

    pub fn insert(&mut self, key: &str, value: &str) -> Result<(), Error> {
        if self
            .entries
            .insert(key.to_string(), value.to_string())
            .is_some()
        {
            return Err(Error::Validation(format!(
                "duplicate key '{key}' in {}",
                self.name
            )));
        }
        Ok(())
    }

    /// Resolves a key, failing with a lookup error that names the table.
    pub fn resolve(&self, key: &str) -> Result<&str, Error> {
        self.entries
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| Error::lookup(&self.name, key))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parse_two_columns() {
        let input = "# generated\toriginal\ng1_1\tscaffoldA.gene1\n\ng1_2\tscaffoldA.gene2\n";
        let map = IdMap::parse("gene id map", Cursor::new(input)).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.resolve("g1_1").unwrap(), "scaffoldA.gene1");
        assert_eq!(map.get("g1_2"), Some("scaffoldA.gene2"));
    }

    #[test]
    fn missing_key_names_table() {
        let map = IdMap::parse("gene id map", Cursor::new("a\tb\n")).unwrap();
        let err = map.resolve("zzz").unwrap_err();
        assert_eq!(err.to_string(), "zzz not found in gene id map");
    }

    #[test]
    fn wrong_column_count() {
        assert!(IdMap::parse("m", Cursor::new("only_one\n")).is_err());
        assert!(IdMap::parse("m", Cursor::new("a\tb\tc\n")).is_err());
    }

    #[test]
    fn duplicate_key_rejected() {
        let err = IdMap::parse("m", Cursor::new("a\tb\na\tc\n")).unwrap_err();
        assert!(err.to_string().contains("duplicate key 'a'"));
    }

    #[test]
    fn crlf_tolerated() {
        let map = IdMap::parse("m", Cursor::new("a\tb\r\n")).unwrap();
        assert_eq!(map.resolve("a").unwrap(), "b");
    }

    #[test]
    fn gzip_detection() {
        assert!(is_gzip_path(Path::new("x/clusters.tsv.gz")));
        assert!(is_gzip_path(Path::new("x.GZ")));
        assert!(!is_gzip_path(Path::new("x.tsv")));
    }
}
