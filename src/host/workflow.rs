use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use serde_json::Value;

use super::{
    CirclePlotRequest, CreatedObject, FileLink, HostServices, ObjectInfo, PANGENOME_OBJECT_TYPE,
    Provenance, ReportContent, ReportInfo, ReportRequest, SaveRequest, StoredObject,
};
use crate::cli;
use crate::config::{CheckmVersion, HostConfig, HostParams, QualityFallback};
use crate::error::Error;
use crate::format::{FormatOutputs, QualityTable, format_genome_records};
use crate::genome::{GenomeData, GenomeRecord};
use crate::pangenome::{PangenomeObject, read_pangenome};
use crate::pipeline::{PipelineRun, run_pipeline};

const SERVICE_NAME: &str = "pangenomer";
const METHOD_NAME: &str = "run_host";

/// Genome object references held by a tree or genome set object.
pub fn genome_refs_from_set(object: &StoredObject) -> Result<Vec<String>> {
    let type_name = object.info.type_name();
    let data = &object.data;
    let refs = match type_name {
        "KBaseTrees.Tree" => {
            let mut refs = Vec::new();
            if let Some(nodes) = data.get("ws_refs").and_then(Value::as_object) {
                for by_type in nodes.values().filter_map(Value::as_object) {
                    for list in by_type.values().filter_map(Value::as_array) {
                        refs.extend(list.iter().filter_map(Value::as_str).map(str::to_string));
                    }
                }
            }
            refs
        }
        "KBaseSets.GenomeSet" => data
            .get("items")
            .and_then(Value::as_array)
            .map(|items| item_refs(items.iter()))
            .unwrap_or_default(),
        "KBaseSearch.GenomeSet" => data
            .get("elements")
            .and_then(Value::as_object)
            .map(|elements| item_refs(elements.values()))
            .unwrap_or_default(),
        other => bail!("{other} type is not supported"),
    };
    if refs.is_empty() {
        bail!("{} ({type_name}) holds no genomes", object.info.name);
    }
    Ok(refs)
}

fn item_refs<'a>(items: impl Iterator<Item = &'a Value>) -> Vec<String> {
    items
        .filter_map(|item| item.get("ref").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

/// A genome fetched from the object store, named by its object name.
pub fn genome_record(object: StoredObject) -> Result<GenomeRecord> {
    let reference = object.info.upa();
    let data: GenomeData = serde_json::from_value(object.data)
        .with_context(|| format!("invalid genome object {reference}"))?;
    Ok(GenomeRecord {
        name: object.info.name,
        reference: Some(reference),
        data,
    })
}

/// Completeness/contamination per genome from its quality scores. Genomes
/// without a completeness score take the fallback values if configured.
pub fn quality_table(
    records: &[GenomeRecord],
    version: CheckmVersion,
    fallback: Option<&QualityFallback>,
) -> Result<QualityTable, Error> {
    let mut table = QualityTable::default();
    for record in records {
        let mut completeness = None;
        let mut contamination = None;
        for score in &record.data.quality_scores {
            if score.method != version.method() {
                continue;
            }
            match score.score_interpretation.as_str() {
                "percent_completeness" => completeness = score.score_text(),
                "percent_contamination" => contamination = score.score_text(),
                _ => {}
            }
        }
        match (completeness, fallback) {
            (Some(c), _) => {
                table.insert(&record.name, &c, contamination.as_deref().unwrap_or("N/A"));
            }
            (None, Some(f)) => {
                table.insert(
                    &record.name,
                    &f.completeness.to_string(),
                    &f.contamination.to_string(),
                );
            }
            (None, None) => {
                return Err(Error::lookup(
                    &format!("{} quality scores", version.method()),
                    &record.name,
                ));
            }
        }
    }
    Ok(table)
}

/// The genome that shares clusters with the most other genomes: each
/// multi-genome cluster adds `genomes_in_cluster - 1` to every member genome.
pub fn centroid_genome(pangenome: &PangenomeObject) -> Option<String> {
    let mut order: Vec<String> = Vec::new();
    let mut scores: HashMap<String, usize> = HashMap::new();
    for cluster in &pangenome.orthologs {
        let mut genomes: Vec<String> =
            cluster.orthologs.iter().map(|o| o.genome.to_string()).collect();
        genomes.sort();
        genomes.dedup();
        if genomes.len() < 2 {
            continue;
        }
        let weight = genomes.len() - 1;
        for genome in genomes {
            let score = scores.entry(genome.clone()).or_insert_with(|| {
                order.push(genome);
                0
            });
            *score += weight;
        }
    }
    let mut best: Option<(&String, usize)> = None;
    for genome in &order {
        let score = scores[genome];
        if best.is_none_or(|(_, high)| score > high) {
            best = Some((genome, score));
        }
    }
    best.map(|(genome, _)| genome.clone())
}

/// Files staged for a host run.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub run_dir: PathBuf,
    pub genome_refs: Vec<String>,
    pub records: Vec<GenomeRecord>,
    pub formatted: FormatOutputs,
    pub name2ref: PathBuf,
    pub output_json: PathBuf,
}

fn timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Fetches the genomes behind `params.input_ref` and writes the pipeline
/// inputs into a fresh run directory under the scratch directory.
pub fn prepare_run(
    config: &HostConfig,
    params: &HostParams,
    services: &HostServices,
) -> Result<PreparedRun> {
    let top = services.objects.get_object(&params.input_ref)?;
    let genome_refs = genome_refs_from_set(&top)?;
    cli::kv("Input", &format!("{} ({})", top.info.name, top.info.type_name()));
    cli::kv("Genomes", &genome_refs.len().to_string());

    let records = genome_refs
        .iter()
        .map(|r| genome_record(services.objects.get_object(r)?))
        .collect::<Result<Vec<_>>>()?;

    let quality = quality_table(&records, params.checkm_version, config.quality_fallback.as_ref())?;

    let stamp = timestamp_millis();
    let run_dir = config.scratch.join(format!("pangenome_run.{stamp}"));
    fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create directory: {}", run_dir.display()))?;
    cli::kv("Run directory", &run_dir.display().to_string());

    let name2ref = run_dir.join(format!("{stamp}-genome_name2ref.map"));
    write_reference_map(&name2ref, &records)?;

    let formatted = FormatOutputs {
        faa: run_dir.join(format!("{stamp}.faa")),
        quality: run_dir.join(format!("{stamp}.checkm")),
        id_map: run_dir.join(format!("{stamp}.gene_id_map")),
    };
    let summary = format_genome_records(&records, &quality, &formatted)?;
    cli::kv("Proteins", &summary.genes.to_string());

    Ok(PreparedRun {
        output_json: run_dir.join(format!("{stamp}-pangenome.json")),
        run_dir,
        genome_refs,
        records,
        formatted,
        name2ref,
    })
}

fn write_reference_map(path: &Path, records: &[GenomeRecord]) -> Result<()> {
    let file = fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for record in records {
        let Some(reference) = record.reference else {
            bail!("genome {} has no object reference", record.name);
        };
        writeln!(writer, "{}\t{reference}", record.name)?;
    }
    writer.flush()?;
    Ok(())
}

/// Saves the pangenome under the requested name. Failure is fatal.
pub fn save_pangenome(
    params: &HostParams,
    mut pangenome: PangenomeObject,
    services: &HostServices,
) -> Result<ObjectInfo> {
    if pangenome.id.is_empty() {
        pangenome.id = params.output_pangenome_name.clone();
    }
    let request = SaveRequest {
        workspace: params.workspace_name.clone(),
        object_type: PANGENOME_OBJECT_TYPE.to_string(),
        name: params.output_pangenome_name.clone(),
        data: serde_json::to_value(&pangenome)?,
        provenance: vec![Provenance {
            service: SERVICE_NAME.to_string(),
            method: METHOD_NAME.to_string(),
            input_ws_objects: vec![params.input_ref.clone()],
        }],
    };
    services
        .objects
        .save_object(&request)
        .context("error saving pangenome object")
}

/// Requests a circle plot and returns the content of its report.
pub fn circle_plot(
    params: &HostParams,
    pangenome: &PangenomeObject,
    pangenome_ref: &str,
    services: &HostServices,
) -> Result<ReportContent> {
    let base = match &params.pcp_input_genome_ref {
        Some(requested) => requested.clone(),
        None => centroid_genome(pangenome)
            .context("no genome shares a cluster with another genome; cannot pick a base genome")?,
    };
    cli::kv("Base genome", &base);
    let request = CirclePlotRequest {
        workspace_name: params.workspace_name.clone(),
        input_genome_ref: base,
        input_pangenome_ref: pangenome_ref.to_string(),
        save_featuresets: params.pcp_save_featuresets,
        genome_disp_name_config: params.pcp_genome_disp_name_config.clone(),
        input_compare_genome_refs: params.pcp_input_compare_genome_refs.clone(),
        input_outgroup_genome_refs: params.pcp_input_outgroup_genome_refs.clone(),
    };
    let report_ref = services.plots.circle_plot(&request)?;
    let report = services.objects.get_object(&report_ref)?;
    serde_json::from_value(report.data)
        .with_context(|| format!("unexpected circle plot report {report_ref}"))
}

/// Uploads the run archive and creates the final report.
pub fn create_report(
    params: &HostParams,
    run_dir: &Path,
    pangenome_ref: &str,
    plot: ReportContent,
    services: &HostServices,
) -> Result<ReportInfo> {
    let shock_id = services.files.upload_archive(run_dir)?;

    let mut objects_created = vec![CreatedObject {
        reference: pangenome_ref.to_string(),
        description: "Calculated Pangenome".to_string(),
    }];
    objects_created.extend(plot.objects_created);

    let mut file_links = vec![FileLink {
        shock_id,
        name: "pangenome_run_archive.zip".to_string(),
        label: None,
        description: Some("pangenome run output".to_string()),
    }];
    file_links.extend(plot.file_links.iter().map(|l| l.to_file_link()));
    let html_links: Vec<FileLink> = plot.html_links.iter().map(|l| l.to_file_link()).collect();

    let request = ReportRequest {
        workspace_name: params.workspace_name.clone(),
        report_object_name: format!("pangenome_report_{}", timestamp_millis()),
        message: format!("Pangenome {} saved as {pangenome_ref}", params.output_pangenome_name),
        objects_created,
        direct_html_link_index: (!html_links.is_empty()).then_some(0),
        file_links,
        html_links,
    };
    services.reports.create_report(&request)
}

#[derive(Debug, Clone)]
pub struct HostOutcome {
    pub pangenome: ObjectInfo,
    pub report: ReportInfo,
    pub run_dir: PathBuf,
}

/// Saves, plots and reports a finished pangenome. Only the circle plot may
/// fail without failing the run.
pub fn publish(
    config: &HostConfig,
    params: &HostParams,
    pangenome: PangenomeObject,
    genome_count: usize,
    run_dir: &Path,
    services: &HostServices,
) -> Result<(ObjectInfo, ReportInfo)> {
    let saved = save_pangenome(params, pangenome.clone(), services)?;
    let pangenome_ref = saved.upa().to_string();
    cli::success(&format!("saved {} as {pangenome_ref}", saved.name));

    let plot = if genome_count > config.circle_plot_max_genomes {
        cli::warning(&format!(
            "{genome_count} genomes exceed the circle plot limit of {}; skipping plot",
            config.circle_plot_max_genomes
        ));
        ReportContent::default()
    } else {
        match circle_plot(params, &pangenome, &pangenome_ref, services) {
            Ok(content) => content,
            Err(e) => {
                cli::warning(&format!("circle plot failed: {e:#}"));
                ReportContent::default()
            }
        }
    };

    let report = create_report(params, run_dir, &pangenome_ref, plot, services)?;
    cli::success(&format!("report {} ({})", report.name, report.reference));
    Ok((saved, report))
}

/// The full host-orchestrated run.
pub fn run_host(
    config: &HostConfig,
    params: &HostParams,
    services: &HostServices,
) -> Result<HostOutcome> {
    cli::section("Inputs");
    let prepared = prepare_run(config, params, services)?;
    eprintln!();

    cli::section("Pipeline");
    let run = PipelineRun {
        tools: config.tools.clone(),
        settings: params.settings.clone(),
        faa: prepared.formatted.faa.clone(),
        quality: prepared.formatted.quality.clone(),
        id_map: prepared.formatted.id_map.clone(),
        run_dir: prepared.run_dir.clone(),
        output_json: prepared.output_json.clone(),
        genome_refs: Some(prepared.name2ref.clone()),
        genome_records: prepared.records.clone(),
    }
    .into_absolute()?;
    let outputs = run_pipeline(&run)?;
    let pangenome = read_pangenome(&outputs.pangenome_json)?;
    eprintln!();

    cli::section("Publishing");
    let (pangenome_info, report) = publish(
        config,
        params,
        pangenome,
        prepared.genome_refs.len(),
        &prepared.run_dir,
        services,
    )?;
    eprintln!();

    Ok(HostOutcome {
        pangenome: pangenome_info,
        report,
        run_dir: prepared.run_dir,
    })
}
