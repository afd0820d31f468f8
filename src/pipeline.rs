//! The memoized file-based pipeline: cluster, convert, estimate, assemble.
//!
//! Every stage is skipped when its output already exists and is non-empty,
//! unless `force_redo` is set, so an interrupted run can be resumed in place.

use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::assemble::{Assembler, pangenome_name};
use crate::cli;
use crate::config::{PipelineSettings, RunConfig, ToolPaths};
use crate::error::Error;
use crate::genome::{FeatureIndex, GenomeRecord};
use crate::mmseqs::{self, ClusterMembership, ClusterOutputs};
use crate::motupan::{self, EstimatorOutput};
use crate::pangenome::write_pangenome;
use crate::runner::{StageStatus, needs_run};
use crate::tsv::IdMap;

/// Everything a pipeline run reads, with tool locations and settings.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub tools: ToolPaths,
    pub settings: PipelineSettings,
    pub faa: PathBuf,
    pub quality: PathBuf,
    pub id_map: PathBuf,
    pub run_dir: PathBuf,
    pub output_json: PathBuf,
    pub genome_refs: Option<PathBuf>,
    pub genome_records: Vec<GenomeRecord>,
}

impl PipelineRun {
    /// Builds a run from a config file, loading any genome records it lists.
    pub fn from_config(config: &RunConfig) -> Result<Self, Error> {
        let genome_records = config
            .genome_records
            .iter()
            .map(|p| GenomeRecord::from_file(p))
            .collect::<Result<_, _>>()?;
        Self {
            tools: config.tools.clone(),
            settings: config.settings.clone(),
            faa: config.input_faa_path.clone(),
            quality: config.input_qual_path.clone(),
            id_map: config.input_gene_id_map_path.clone(),
            run_dir: config.run_dir.clone(),
            output_json: config.output_pangenome_json_path.clone(),
            genome_refs: config.genome_name2ref_path.clone(),
            genome_records,
        }
        .into_absolute()
    }

    /// Resolves every path against the current directory. The external
    /// tools run inside `run_dir`, so relative paths would not reach them.
    pub fn into_absolute(self) -> Result<Self, Error> {
        Ok(Self {
            faa: std::path::absolute(&self.faa)?,
            quality: std::path::absolute(&self.quality)?,
            id_map: std::path::absolute(&self.id_map)?,
            run_dir: std::path::absolute(&self.run_dir)?,
            output_json: std::path::absolute(&self.output_json)?,
            genome_refs: self
                .genome_refs
                .as_deref()
                .map(std::path::absolute)
                .transpose()?,
            ..self
        })
    }

    /// File stem shared by the stage outputs: the FASTA file name without `.faa`.
    pub fn stem(&self) -> String {
        let name = self
            .faa
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        name.strip_suffix(".faa").unwrap_or(&name).to_string()
    }
}

/// Paths produced by a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutputs {
    pub clusters: ClusterOutputs,
    pub converted: PathBuf,
    pub estimator: PathBuf,
    pub pangenome_json: PathBuf,
    pub completeness: PathBuf,
}

fn report_stage(name: &str, status: StageStatus, output: &Path) {
    let file = output.display().to_string();
    match status {
        StageStatus::Ran => cli::success(&format!("{name}: {file}")),
        StageStatus::Cached => cli::kv(name, &format!("{file} {}", "(cached)".dimmed())),
    }
}

pub fn run_pipeline(run: &PipelineRun) -> Result<PipelineOutputs, Error> {
    let force_redo = run.settings.force_redo;
    let stem = run.stem();
    let mut sink = |line: &str| cli::tool_output(line);

    let (clusters, status) = mmseqs::run_clustering(
        &run.tools.mmseqs,
        &run.settings.cluster_params(),
        &run.faa,
        &run.run_dir,
        &stem,
        force_redo,
        &mut sink,
    )?;
    report_stage("Clustering", status, &clusters.clusters);

    let (converted, status) =
        motupan::run_convert(&run.tools.motuconvert, &run.run_dir, &clusters, force_redo, &mut sink)?;
    report_stage("Conversion", status, &converted);

    let (estimator, status) = motupan::run_estimator(
        &run.tools.motupan,
        &run.run_dir,
        &stem,
        &converted,
        &run.quality,
        run.settings.motupan_max_iter,
        force_redo,
        &mut sink,
    )?;
    report_stage("Estimation", status, &estimator);

    let completeness = motupan::completeness_output_path(&run.run_dir, &run.quality);
    let status = if needs_run(&run.output_json, force_redo) || needs_run(&completeness, force_redo) {
        assemble_files(run, &clusters.clusters, &estimator, &completeness)?;
        StageStatus::Ran
    } else {
        StageStatus::Cached
    };
    report_stage("Pangenome", status, &run.output_json);

    Ok(PipelineOutputs {
        clusters,
        converted,
        estimator,
        pangenome_json: run.output_json.clone(),
        completeness,
    })
}

/// Assembles the pangenome from stage outputs and writes the JSON document
/// and the posterior completeness table. Nothing is written unless assembly
/// succeeds.
pub fn assemble_files(
    run: &PipelineRun,
    clusters: &Path,
    estimator_path: &Path,
    completeness: &Path,
) -> Result<(), Error> {
    let estimator = EstimatorOutput::from_file(estimator_path)?;
    let membership = ClusterMembership::from_file(clusters)?;
    let id_map = IdMap::from_file("gene ID map", &run.id_map)?;
    let references = run
        .genome_refs
        .as_deref()
        .map(|p| IdMap::from_file("genome reference map", p))
        .transpose()?;
    let features = FeatureIndex::new(&run.genome_records);

    let mut assembler = Assembler::new(&id_map);
    if let Some(references) = &references {
        assembler = assembler.with_references(references);
    }
    if !run.genome_records.is_empty() {
        assembler = assembler.with_features(&features);
    }

    let pangenome = assembler.assemble(&pangenome_name(estimator_path), &estimator, &membership)?;
    write_pangenome(&run.output_json, &pangenome)?;
    motupan::write_completeness_file(completeness, &estimator.genomes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relative_run() -> PipelineRun {
        PipelineRun {
            tools: Default::default(),
            settings: Default::default(),
            faa: PathBuf::from("run/formatted.faa"),
            quality: PathBuf::from("run/formatted.checkm"),
            id_map: PathBuf::from("run/formatted.gene_id_map"),
            run_dir: PathBuf::from("run"),
            output_json: PathBuf::from("out/pangenome.json"),
            genome_refs: Some(PathBuf::from("refs.tsv")),
            genome_records: Vec::new(),
        }
    }

    #[test]
    fn into_absolute_resolves_against_current_dir() {
        let cwd = std::env::current_dir().unwrap();
        let run = relative_run().into_absolute().unwrap();
        assert_eq!(run.run_dir, cwd.join("run"));
        assert_eq!(run.faa, cwd.join("run/formatted.faa"));
        assert_eq!(run.quality, cwd.join("run/formatted.checkm"));
        assert_eq!(run.id_map, cwd.join("run/formatted.gene_id_map"));
        assert_eq!(run.output_json, cwd.join("out/pangenome.json"));
        assert_eq!(run.genome_refs, Some(cwd.join("refs.tsv")));
        assert_eq!(run.stem(), "formatted");
    }

    #[test]
    fn into_absolute_keeps_absolute_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut run = relative_run();
        run.run_dir = dir.path().to_path_buf();
        run.genome_refs = None;
        let run = run.into_absolute().unwrap();
        assert_eq!(run.run_dir, dir.path());
        assert_eq!(run.genome_refs, None);
    }
}
