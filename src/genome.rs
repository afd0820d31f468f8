//! Source genome records: feature annotations and quality scores.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::Error;
use crate::upa::Upa;

/// Separator between genome name and feature ID in host-mode gene IDs.
const FEATURE_SEPARATOR: &str = ".f:";

/// A gene alias, either `[type, value]` or a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Alias {
    Typed(String, String),
    Plain(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Feature {
    pub id: String,
    #[serde(default)]
    pub protein_translation: Option<String>,
    #[serde(default)]
    pub functions: Vec<String>,
    /// Older records carry a single function string instead of a list.
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub aliases: Vec<Alias>,
}

impl Feature {
    pub fn translation(&self) -> Option<&str> {
        self.protein_translation
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }

    pub fn function_terms(&self) -> impl Iterator<Item = &str> {
        self.functions
            .iter()
            .map(String::as_str)
            .chain(self.function.as_deref())
    }

    /// Aliases of type `gene`, i.e. gene names.
    pub fn gene_names(&self) -> impl Iterator<Item = &str> {
        self.aliases.iter().filter_map(|a| match a {
            Alias::Typed(kind, value) if kind == "gene" => Some(value.as_str()),
            _ => None,
        })
    }
}

/// A quality estimate attached to a genome, e.g. CheckM percent completeness.
#[derive(Debug, Clone, Deserialize)]
pub struct QualityScore {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub score_interpretation: String,
    #[serde(default)]
    pub score: serde_json::Value,
}

impl QualityScore {
    pub fn score_text(&self) -> Option<String> {
        match &self.score {
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }
}

/// The object-store payload of a genome, reduced to what the pipeline uses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenomeData {
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub quality_scores: Vec<QualityScore>,
}

/// A named genome with its features and, when it came from the host, its reference.
#[derive(Debug, Clone, Deserialize)]
pub struct GenomeRecord {
    pub name: String,
    #[serde(default, rename = "ref")]
    pub reference: Option<Upa>,
    #[serde(flatten)]
    pub data: GenomeData,
}

impl GenomeRecord {
    /// Reads a genome record JSON document: `{"name", "ref"?, "features", "quality_scores"?}`.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Format(format!("failed to read {}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Format(format!("invalid genome record {}: {e}", path.display())))
    }

    /// Features that carry a protein translation, in record order.
    pub fn protein_features(&self) -> impl Iterator<Item = &Feature> {
        self.data.features.iter().filter(|f| f.translation().is_some())
    }
}

/// Original gene ID written for a host genome feature.
pub fn host_gene_id(genome_name: &str, feature_id: &str) -> String {
    format!("{genome_name}{FEATURE_SEPARATOR}{feature_id}")
}

/// Feature lookup across the source genome records of a run.
#[derive(Debug, Default)]
pub struct FeatureIndex<'a> {
    genomes: HashMap<&'a str, HashMap<&'a str, &'a Feature>>,
}

impl<'a> FeatureIndex<'a> {
    pub fn new(records: &'a [GenomeRecord]) -> Self {
        let genomes = records
            .iter()
            .map(|r| {
                let features = r.data.features.iter().map(|f| (f.id.as_str(), f)).collect();
                (r.name.as_str(), features)
            })
            .collect();
        Self { genomes }
    }

    pub fn has_genome(&self, genome: &str) -> bool {
        self.genomes.contains_key(genome)
    }

    /// Finds the feature behind a resolved gene ID, accepting both the bare
    /// feature ID and the `<genome>.f:<feature>` form.
    pub fn lookup(&self, genome: &str, gene_id: &str) -> Option<&'a Feature> {
        let features = self.genomes.get(genome)?;
        if let Some(f) = features.get(gene_id) {
            return Some(f);
        }
        gene_id
            .strip_prefix(genome)
            .and_then(|rest| rest.strip_prefix(FEATURE_SEPARATOR))
            .and_then(|id| features.get(id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD: &str = r#"{
        "name": "GCF_000008665.1",
        "ref": "10/20/1",
        "features": [
            {"id": "AF_0001", "protein_translation": "MKV",
             "functions": ["DNA polymerase"],
             "aliases": [["gene", "polB"], ["locus_tag", "AF_0001"], "old_name"]},
            {"id": "AF_0002", "function": "tRNA"},
            {"id": "AF_0003", "protein_translation": ""}
        ],
        "quality_scores": [
            {"method": "CheckM", "score_interpretation": "percent_completeness", "score": 98.5}
        ]
    }"#;

    #[test]
    fn parse_record() {
        let record: GenomeRecord = serde_json::from_str(RECORD).unwrap();
        assert_eq!(record.name, "GCF_000008665.1");
        assert_eq!(record.reference, Some(Upa::new(10, 20, 1)));
        assert_eq!(record.data.features.len(), 3);
        assert_eq!(record.protein_features().count(), 1);

        let f = &record.data.features[0];
        assert_eq!(f.gene_names().collect::<Vec<_>>(), vec!["polB"]);
        assert_eq!(f.function_terms().collect::<Vec<_>>(), vec!["DNA polymerase"]);
        assert_eq!(
            record.data.features[1].function_terms().collect::<Vec<_>>(),
            vec!["tRNA"]
        );
        assert_eq!(record.data.quality_scores[0].score_text().as_deref(), Some("98.5"));
    }

    #[test]
    fn index_accepts_host_gene_ids() {
        let records: Vec<GenomeRecord> = vec![serde_json::from_str(RECORD).unwrap()];
        let index = FeatureIndex::new(&records);
        let host_id = host_gene_id("GCF_000008665.1", "AF_0001");
        assert_eq!(host_id, "GCF_000008665.1.f:AF_0001");
        assert_eq!(index.lookup("GCF_000008665.1", &host_id).unwrap().id, "AF_0001");
        assert_eq!(index.lookup("GCF_000008665.1", "AF_0002").unwrap().id, "AF_0002");
        assert!(index.lookup("GCF_000008665.1", "missing").is_none());
        assert!(index.lookup("other", "AF_0001").is_none());
        assert!(index.has_genome("GCF_000008665.1"));
    }
}
