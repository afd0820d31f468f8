//! Per-cluster annotation merging: gene names, functions and the
//! representative protein sequence.

use md5::{Digest, Md5};

use crate::pangenome::{GeneSource, PangenomeCluster};

/// Function text for clusters with no member in an annotated genome.
pub const FUNCTION_NOT_AVAILABLE: &str = "NA";
/// Function text for clusters whose annotated members carry no function terms.
pub const FUNCTION_HYPOTHETICAL: &str = "hypothetical protein";

/// Accumulates annotation over the members of one cluster, in member order.
#[derive(Debug, Default)]
pub struct ClusterAnnotation {
    source_genome_seen: bool,
    functions: Vec<String>,
    gene_names: Vec<String>,
    sources: Vec<GeneSource>,
    representative: Option<(String, GeneSource)>,
}

impl ClusterAnnotation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a member gene as a candidate function source.
    pub fn add_member(&mut self, source: GeneSource) {
        self.sources.push(source);
    }

    /// Notes that at least one member lies in a genome that has annotation.
    pub fn mark_source_genome(&mut self) {
        self.source_genome_seen = true;
    }

    pub fn source_genome_seen(&self) -> bool {
        self.source_genome_seen
    }

    pub fn add_functions<'a, I: IntoIterator<Item = &'a str>>(&mut self, functions: I) {
        push_unique(&mut self.functions, functions);
    }

    pub fn add_gene_names<'a, I: IntoIterator<Item = &'a str>>(&mut self, names: I) {
        push_unique(&mut self.gene_names, names);
    }

    /// Offers a protein translation. Only a strictly longer sequence replaces
    /// the current one, so the first of equally long sequences is kept.
    pub fn offer_translation(&mut self, sequence: &str, source: GeneSource) {
        let sequence = sequence.trim_end_matches('*');
        if sequence.is_empty() {
            return;
        }
        let longer = match &self.representative {
            Some((current, _)) => sequence.len() > current.len(),
            None => true,
        };
        if longer {
            self.representative = Some((sequence.to_string(), source));
        }
    }

    pub fn function_text(&self) -> String {
        if !self.source_genome_seen {
            FUNCTION_NOT_AVAILABLE.to_string()
        } else if self.functions.is_empty() {
            FUNCTION_HYPOTHETICAL.to_string()
        } else {
            self.functions.join(";")
        }
    }

    /// Writes `function`, `function_sources` and `gene_name` into the cluster.
    pub fn apply_functions(&self, cluster: &mut PangenomeCluster) {
        cluster.function = self.function_text();
        if !self.source_genome_seen {
            cluster.gene_name = Vec::new();
            cluster.function_sources = Vec::new();
        } else if self.functions.is_empty() {
            cluster.gene_name = Vec::new();
            cluster.function_sources = self.sources.clone();
        } else {
            cluster.gene_name = self.gene_names.clone();
            cluster.function_sources = self.sources.clone();
        }
    }

    /// Writes the representative sequence, its source and checksum into the
    /// cluster; leaves empty placeholders when no member had a translation.
    pub fn apply_translation(&self, cluster: &mut PangenomeCluster) {
        match &self.representative {
            Some((sequence, source)) => set_translation(cluster, sequence, source.clone()),
            None => {
                cluster.protein_translation = String::new();
                cluster.protein_translation_source = None;
                cluster.md5 = String::new();
            }
        }
    }
}

/// Sets a cluster's representative protein sequence along with its MD5.
pub fn set_translation(cluster: &mut PangenomeCluster, sequence: &str, source: GeneSource) {
    cluster.md5 = md5_hex(sequence);
    cluster.protein_translation = sequence.to_string();
    cluster.protein_translation_source = Some(source);
}

/// Lower-case hex MD5 of a sequence string.
pub fn md5_hex(sequence: &str) -> String {
    format!("{:x}", Md5::digest(sequence.as_bytes()))
}

fn push_unique<'a, I: IntoIterator<Item = &'a str>>(target: &mut Vec<String>, items: I) {
    for item in items {
        let item = item.trim();
        if !item.is_empty() && !target.iter().any(|t| t == item) {
            target.push(item.to_string());
        }
    }
}
