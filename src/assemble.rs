//! Builds the pangenome document from the estimator table, the cluster
//! membership table and the gene ID map.

use std::path::Path;

use crate::annotation::ClusterAnnotation;
use crate::error::Error;
use crate::format::split_generated_id;
use crate::genome::FeatureIndex;
use crate::mmseqs::ClusterMembership;
use crate::motupan::{EstimatorOutput, EstimatorRow};
use crate::pangenome::{GeneSource, Ortholog, PANGENOME_TYPE, PangenomeCluster, PangenomeObject};
use crate::tsv::IdMap;
use crate::upa::{GenomeIdMode, GenomeIdentifier, Upa};

/// Document name for an estimator output file: `<file name>.Pangenome`.
pub fn pangenome_name(estimator_path: &Path) -> String {
    let file_name = estimator_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{file_name}.Pangenome")
}

/// Assembles pangenome documents. Genomes are named by ID unless a
/// genome → reference map is attached, in which case every ortholog carries
/// the genome's object reference.
pub struct Assembler<'a> {
    id_map: &'a IdMap,
    mode: GenomeIdMode,
    references: Option<&'a IdMap>,
    features: Option<&'a FeatureIndex<'a>>,
}

impl<'a> Assembler<'a> {
    pub fn new(id_map: &'a IdMap) -> Self {
        Self {
            id_map,
            mode: GenomeIdMode::Name,
            references: None,
            features: None,
        }
    }

    #[must_use]
    pub fn with_references(mut self, references: &'a IdMap) -> Self {
        self.mode = GenomeIdMode::Reference;
        self.references = Some(references);
        self
    }

    /// Enables annotation from source genome features.
    #[must_use]
    pub fn with_features(mut self, features: &'a FeatureIndex<'a>) -> Self {
        self.features = Some(features);
        self
    }

    pub fn mode(&self) -> GenomeIdMode {
        self.mode
    }

    fn genome_reference(&self, genome_id: &str) -> Result<Upa, Error> {
        let references = self
            .references
            .ok_or_else(|| Error::lookup("genome reference map", genome_id))?;
        references.resolve(genome_id)?.parse()
    }

    fn genome_identifier(&self, genome_id: &str) -> Result<GenomeIdentifier, Error> {
        match self.mode {
            GenomeIdMode::Name => Ok(GenomeIdentifier::Name(genome_id.to_string())),
            GenomeIdMode::Reference => Ok(GenomeIdentifier::Reference(self.genome_reference(genome_id)?)),
        }
    }

    pub fn assemble(
        &self,
        name: &str,
        estimator: &EstimatorOutput,
        membership: &ClusterMembership,
    ) -> Result<PangenomeObject, Error> {
        let orthologs = estimator
            .rows
            .iter()
            .map(|row| self.build_cluster(row, membership))
            .collect::<Result<Vec<_>, _>>()?;

        let genome_names = estimator.genome_names();
        let genome_refs = match self.mode {
            GenomeIdMode::Name => Vec::new(),
            GenomeIdMode::Reference => genome_names
                .iter()
                .map(|g| self.genome_reference(g))
                .collect::<Result<_, _>>()?,
        };

        Ok(PangenomeObject {
            name: name.to_string(),
            id: estimator.run_name.clone(),
            pangenome_type: PANGENOME_TYPE.to_string(),
            type_ver: estimator.type_ver.clone(),
            genome_names,
            genome_refs,
            genome_count: estimator.genome_count,
            core_length: estimator.core_length,
            mean_est_genome_size: estimator.mean_est_genome_size,
            prior_genome_completeness: estimator.prior_completeness(),
            posterior_genome_completeness: estimator.posterior_completeness(),
            orthologs,
            extra: serde_json::Map::new(),
        })
    }

    fn build_cluster(&self, row: &EstimatorRow, membership: &ClusterMembership) -> Result<PangenomeCluster, Error> {
        let members = membership.members(&row.cluster_id)?;
        let mut annotation = ClusterAnnotation::new();
        let mut orthologs = Vec::with_capacity(members.len());

        for generated_id in members {
            let original_id = self.id_map.resolve(generated_id)?;
            let (genome_id, gene_order) = split_generated_id(generated_id)?;
            let genome = self.genome_identifier(genome_id)?;

            if let Some(index) = self.features {
                annotation.add_member(GeneSource {
                    gene_id: original_id.to_string(),
                    genome: genome.clone(),
                });
                if index.has_genome(genome_id) {
                    annotation.mark_source_genome();
                }
                if let Some(feature) = index.lookup(genome_id, original_id) {
                    annotation.add_functions(feature.function_terms());
                    annotation.add_gene_names(feature.gene_names());
                    if let Some(seq) = feature.translation() {
                        annotation.offer_translation(
                            seq,
                            GeneSource {
                                gene_id: original_id.to_string(),
                                genome: genome.clone(),
                            },
                        );
                    }
                }
            }

            orthologs.push(Ortholog {
                gene_id: original_id.to_string(),
                gene_order,
                genome,
            });
        }

        let mut cluster = PangenomeCluster {
            id: row.cluster_id.clone(),
            category: row.category,
            genome_occurrence_count: row.genome_occurrence_count,
            core_log_likelihood: row.core_log_likelihood,
            mean_copies_per_genome: row.raw_mean_copies * members.len() as f64,
            orthologs,
            function: String::new(),
            function_sources: Vec::new(),
            gene_name: Vec::new(),
            protein_translation: String::new(),
            protein_translation_source: None,
            md5: String::new(),
        };

        let distinct = cluster.distinct_genomes();
        if distinct != cluster.genome_occurrence_count as usize {
            return Err(Error::Validation(format!(
                "cluster {}: estimator reports genome_occ {} but members span {distinct} genomes",
                cluster.id, cluster.genome_occurrence_count
            )));
        }

        if self.features.is_some() {
            annotation.apply_functions(&mut cluster);
            annotation.apply_translation(&mut cluster);
        }
        Ok(cluster)
    }
}
