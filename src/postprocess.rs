//! Reshaping of serialized pangenomes: split by category, chunking and
//! field stripping. Results always go to a new file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::Error;
use crate::pangenome::{ClusterCategory, PangenomeObject};

/// `dir/name.json` → `dir/name<suffix>.json`. Names without `.json` get the
/// suffix and the extension appended.
pub fn sibling_path(input: &Path, suffix: &str) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name.strip_suffix(".json").unwrap_or(&name);
    input.with_file_name(format!("{stem}{suffix}.json"))
}

/// Fails when `output` would overwrite `input`.
pub fn ensure_new_file(input: &Path, output: &Path) -> Result<(), Error> {
    let same = match (input.canonicalize(), output.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => input == output,
    };
    if same {
        return Err(Error::Validation(format!(
            "output {} would overwrite the input",
            output.display()
        )));
    }
    Ok(())
}

fn with_suffix(pangenome: &PangenomeObject, suffix: &str) -> PangenomeObject {
    PangenomeObject {
        id: format!("{}{suffix}", pangenome.id),
        name: format!("{}{suffix}", pangenome.name),
        orthologs: Vec::new(),
        ..pangenome.clone()
    }
}

/// Keeps only clusters of `category`; `id` and `name` get a `-core` or
/// `-accessory` suffix.
pub fn split_by_category(pangenome: &PangenomeObject, category: ClusterCategory) -> PangenomeObject {
    let mut subset = with_suffix(pangenome, &format!("-{category}"));
    subset.orthologs = pangenome
        .orthologs
        .iter()
        .filter(|c| c.category == category)
        .cloned()
        .collect();
    subset
}

/// `<input>-core.json` or `<input>-acc.json`.
pub fn split_output_path(input: &Path, category: ClusterCategory) -> PathBuf {
    match category {
        ClusterCategory::Core => sibling_path(input, "-core"),
        ClusterCategory::Accessory => sibling_path(input, "-acc"),
    }
}

/// A half-open range `[start, stop)` over the cluster list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub start: usize,
    pub stop: usize,
}

impl ChunkRange {
    pub fn new(start: usize, stop: usize) -> Result<Self, Error> {
        if start >= stop {
            return Err(Error::Validation(format!(
                "invalid chunk range {start}:{stop}: start must be below stop"
            )));
        }
        Ok(Self { start, stop })
    }

    /// Suffix naming the chunk by 1-based inclusive bounds.
    pub fn suffix(&self) -> String {
        format!("-{}-{}", self.start + 1, self.stop)
    }
}

impl fmt::Display for ChunkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.stop)
    }
}

/// Parses `start:stop`.
impl FromStr for ChunkRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::Parse(format!("invalid chunk range '{s}', expected start:stop"));
        let (start, stop) = s.split_once(':').ok_or_else(invalid)?;
        let start = start.trim().parse().map_err(|_| invalid())?;
        let stop = stop.trim().parse().map_err(|_| invalid())?;
        Self::new(start, stop)
    }
}

/// Consecutive ranges of `size` clusters covering `total` clusters.
pub fn chunk_ranges(total: usize, size: usize) -> Result<Vec<ChunkRange>, Error> {
    if size == 0 {
        return Err(Error::Validation("chunk size must be at least 1".to_string()));
    }
    Ok((0..total)
        .step_by(size)
        .map(|start| ChunkRange {
            start,
            stop: (start + size).min(total),
        })
        .collect())
}

/// Clusters in `range`, with the range appended to `id` and `name`.
pub fn chunk(pangenome: &PangenomeObject, range: ChunkRange) -> PangenomeObject {
    let mut part = with_suffix(pangenome, &range.suffix());
    let stop = range.stop.min(pangenome.orthologs.len());
    let start = range.start.min(stop);
    part.orthologs = pangenome.orthologs[start..stop].to_vec();
    part
}

/// `<input>-part<k>.json`, `k` 1-based.
pub fn chunk_output_path(input: &Path, part: usize) -> PathBuf {
    sibling_path(input, &format!("-part{part}"))
}

/// A cluster field that can be reset to its empty value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterField {
    Function,
    FunctionSources,
    GeneName,
    ProteinTranslation,
    ProteinTranslationSource,
    Md5,
}

impl ClusterField {
    pub const ALL: [ClusterField; 6] = [
        ClusterField::Function,
        ClusterField::FunctionSources,
        ClusterField::GeneName,
        ClusterField::ProteinTranslation,
        ClusterField::ProteinTranslationSource,
        ClusterField::Md5,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ClusterField::Function => "function",
            ClusterField::FunctionSources => "function_sources",
            ClusterField::GeneName => "gene_name",
            ClusterField::ProteinTranslation => "protein_translation",
            ClusterField::ProteinTranslationSource => "protein_translation_source",
            ClusterField::Md5 => "md5",
        }
    }
}

impl fmt::Display for ClusterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|f| f.as_str()).collect();
                Error::Parse(format!(
                    "unknown cluster field '{s}', expected one of: {}",
                    names.join(", ")
                ))
            })
    }
}

/// Resets `field` in every cluster. The field stays present in the output.
pub fn strip_field(pangenome: &mut PangenomeObject, field: ClusterField) {
    for cluster in &mut pangenome.orthologs {
        match field {
            ClusterField::Function => cluster.function.clear(),
            ClusterField::FunctionSources => cluster.function_sources.clear(),
            ClusterField::GeneName => cluster.gene_name.clear(),
            ClusterField::ProteinTranslation => cluster.protein_translation.clear(),
            ClusterField::ProteinTranslationSource => cluster.protein_translation_source = None,
            ClusterField::Md5 => cluster.md5.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pangenome::tests::{cluster, pangenome};
    use crate::pangenome::{GeneSource, read_pangenome, write_pangenome};
    use crate::upa::GenomeIdentifier;

    fn sample() -> PangenomeObject {
        pangenome(vec![
            cluster("c1", ClusterCategory::Core, &["g1", "g2"]),
            cluster("c2", ClusterCategory::Accessory, &["g1"]),
            cluster("c3", ClusterCategory::Core, &["g2"]),
            cluster("c4", ClusterCategory::Accessory, &["g2"]),
            cluster("c5", ClusterCategory::Accessory, &["g1"]),
        ])
    }

    #[test]
    fn split_keeps_category_and_suffixes_names() {
        let pg = sample();
        let core = split_by_category(&pg, ClusterCategory::Core);
        assert_eq!(core.id, "g__Test-core");
        assert_eq!(core.name, "g__Test-pangenome.mOTUpan.Pangenome-core");
        let ids: Vec<&str> = core.orthologs.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c3"]);

        let acc = split_by_category(&pg, ClusterCategory::Accessory);
        assert_eq!(acc.id, "g__Test-accessory");
        assert_eq!(acc.orthologs.len(), 3);
        assert_eq!(acc.genome_names, pg.genome_names);

        assert_eq!(
            split_output_path(Path::new("/d/x-mOTUpan-pangenome.json"), ClusterCategory::Accessory),
            Path::new("/d/x-mOTUpan-pangenome-acc.json")
        );
    }

    #[test]
    fn chunks_by_explicit_range() {
        let pg = sample();
        let part = chunk(&pg, "1:3".parse().unwrap());
        assert_eq!(part.id, "g__Test-2-3");
        let ids: Vec<&str> = part.orthologs.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c3"]);

        let tail = chunk(&pg, ChunkRange::new(3, 100).unwrap());
        assert_eq!(tail.orthologs.len(), 2);
        assert_eq!(tail.id, "g__Test-4-100");

        assert!("3:3".parse::<ChunkRange>().is_err());
        assert!("a:3".parse::<ChunkRange>().is_err());
        assert_eq!(chunk_output_path(Path::new("pg.json"), 2), Path::new("pg-part2.json"));
    }

    #[test]
    fn chunk_size_covers_all_clusters() {
        let ranges = chunk_ranges(5, 2).unwrap();
        assert_eq!(
            ranges,
            vec![
                ChunkRange { start: 0, stop: 2 },
                ChunkRange { start: 2, stop: 4 },
                ChunkRange { start: 4, stop: 5 },
            ]
        );
        assert!(chunk_ranges(5, 0).is_err());
        assert!(chunk_ranges(0, 3).unwrap().is_empty());
    }

    #[test]
    fn strip_resets_but_keeps_fields() {
        let mut pg = sample();
        let source = GeneSource {
            gene_id: "a".to_string(),
            genome: GenomeIdentifier::from("g1"),
        };
        pg.orthologs[0].function_sources = vec![source.clone()];
        pg.orthologs[0].protein_translation_source = Some(source);
        pg.orthologs[0].function = "ATPase".to_string();

        strip_field(&mut pg, "function_sources".parse().unwrap());
        strip_field(&mut pg, ClusterField::ProteinTranslationSource);
        assert!(pg.orthologs[0].function_sources.is_empty());
        assert!(pg.orthologs[0].protein_translation_source.is_none());
        assert_eq!(pg.orthologs[0].function, "ATPase");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pg.json");
        write_pangenome(&path, &pg).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"function_sources\": []"));
        assert_eq!(read_pangenome(&path).unwrap(), pg);

        assert!("orthologs".parse::<ClusterField>().is_err());
    }

    #[test]
    fn split_and_chunk_carry_unknown_fields() {
        let mut pg = sample();
        pg.extra
            .insert("source_set".to_string(), serde_json::json!("1/9/1"));

        let core = split_by_category(&pg, ClusterCategory::Core);
        let part = chunk(&pg, ChunkRange::new(0, 1).unwrap());
        for doc in [&core, &part] {
            let value = serde_json::to_value(doc).unwrap();
            assert_eq!(value["source_set"], "1/9/1");
        }
    }

    #[test]
    fn refuses_to_overwrite_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("pg.json");
        std::fs::write(&input, "{}").unwrap();
        assert!(ensure_new_file(&input, &input).is_err());
        assert!(ensure_new_file(&input, &dir.path().join("../").join(dir.path().file_name().unwrap()).join("pg.json")).is_err());
        assert!(ensure_new_file(&input, &dir.path().join("out.json")).is_ok());
    }
}
