//! Pangenome document types and their JSON serialization.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::upa::{GenomeIdentifier, Upa};

/// Type tag written into every pangenome document.
pub const PANGENOME_TYPE: &str = "mOTUpan";

/// Estimator classification of a gene cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterCategory {
    Core,
    Accessory,
}

impl ClusterCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ClusterCategory::Core => "core",
            ClusterCategory::Accessory => "accessory",
        }
    }
}

impl fmt::Display for ClusterCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "core" => Ok(ClusterCategory::Core),
            "accessory" => Ok(ClusterCategory::Accessory),
            _ => Err(Error::Parse(format!(
                "invalid cluster category '{s}', expected 'core' or 'accessory'"
            ))),
        }
    }
}

/// One member gene of a cluster: `[gene_id, gene_order, genome]` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "(String, u32, GenomeIdentifier)",
    into = "(String, u32, GenomeIdentifier)"
)]
pub struct Ortholog {
    pub gene_id: String,
    pub gene_order: u32,
    pub genome: GenomeIdentifier,
}

impl From<(String, u32, GenomeIdentifier)> for Ortholog {
    fn from((gene_id, gene_order, genome): (String, u32, GenomeIdentifier)) -> Self {
        Self {
            gene_id,
            gene_order,
            genome,
        }
    }
}

impl From<Ortholog> for (String, u32, GenomeIdentifier) {
    fn from(o: Ortholog) -> Self {
        (o.gene_id, o.gene_order, o.genome)
    }
}

/// A gene in a specific genome, cited as the source of an annotation:
/// `[gene_id, genome]` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, GenomeIdentifier)", into = "(String, GenomeIdentifier)")]
pub struct GeneSource {
    pub gene_id: String,
    pub genome: GenomeIdentifier,
}

impl From<(String, GenomeIdentifier)> for GeneSource {
    fn from((gene_id, genome): (String, GenomeIdentifier)) -> Self {
        Self { gene_id, genome }
    }
}

impl From<GeneSource> for (String, GenomeIdentifier) {
    fn from(s: GeneSource) -> Self {
        (s.gene_id, s.genome)
    }
}

/// One gene family. Annotation fields are always serialized, using empty
/// values when nothing is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PangenomeCluster {
    pub id: String,
    #[serde(rename = "cat")]
    pub category: ClusterCategory,
    #[serde(rename = "genome_occ")]
    pub genome_occurrence_count: u32,
    pub core_log_likelihood: f64,
    #[serde(rename = "mean_copies")]
    pub mean_copies_per_genome: f64,
    pub orthologs: Vec<Ortholog>,
    #[serde(default)]
    pub function: String,
    #[serde(default)]
    pub function_sources: Vec<GeneSource>,
    #[serde(default)]
    pub gene_name: Vec<String>,
    #[serde(default)]
    pub protein_translation: String,
    #[serde(default)]
    pub protein_translation_source: Option<GeneSource>,
    #[serde(default)]
    pub md5: String,
}

impl PangenomeCluster {
    /// Number of distinct genomes among the cluster's orthologs.
    pub fn distinct_genomes(&self) -> usize {
        self.orthologs
            .iter()
            .map(|o| &o.genome)
            .collect::<HashSet<&GenomeIdentifier>>()
            .len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PangenomeObject {
    pub name: String,
    pub id: String,
    #[serde(rename = "type")]
    pub pangenome_type: String,
    pub type_ver: String,
    pub genome_names: Vec<String>,
    #[serde(default)]
    pub genome_refs: Vec<Upa>,
    pub genome_count: u32,
    pub core_length: u64,
    pub mean_est_genome_size: f64,
    pub prior_genome_completeness: BTreeMap<String, f64>,
    pub posterior_genome_completeness: BTreeMap<String, f64>,
    pub orthologs: Vec<PangenomeCluster>,
    /// Top-level fields this crate does not interpret, written back unchanged.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PangenomeObject {
    pub fn category_count(&self, category: ClusterCategory) -> usize {
        self.orthologs
            .iter()
            .filter(|c| c.category == category)
            .count()
    }
}

/// Reads a pangenome JSON document.
pub fn read_pangenome(path: &Path) -> Result<PangenomeObject, Error> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Format(format!("failed to read {}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| Error::Format(format!("invalid pangenome JSON {}: {e}", path.display())))
}

/// Serializes a pangenome as pretty-printed UTF-8 JSON (4-space indent).
pub fn to_json_bytes(pangenome: &PangenomeObject) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    pangenome.serialize(&mut serializer)?;
    buf.push(b'\n');
    Ok(buf)
}

/// Writes a pangenome JSON document. The document is fully serialized before
/// the file is created.
pub fn write_pangenome(path: &Path, pangenome: &PangenomeObject) -> Result<(), Error> {
    let bytes = to_json_bytes(pangenome)?;
    fs::write(path, bytes)
        .map_err(|e| Error::Format(format!("failed to write {}: {e}", path.display())))
}
