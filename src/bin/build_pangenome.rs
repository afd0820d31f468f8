use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;

use pangenomer::cli;
use pangenomer::genome::GenomeRecord;
use pangenomer::pipeline::{PipelineRun, assemble_files};

#[derive(Parser)]
#[command(
    name = "build_pangenome",
    about = "Assemble a pangenome document from mOTUpan and clustering outputs"
)]
struct Cli {
    /// mOTUpan output file
    #[arg(short = 'm', long = "motupan", value_parser = cli::nonempty_file)]
    motupan: PathBuf,

    /// Clustering table (cluster ID, member gene ID)
    #[arg(short = 'g', long = "clusters", value_parser = cli::nonempty_file)]
    clusters: PathBuf,

    /// Generated-to-original gene ID map
    #[arg(short = 'i', long = "gene-id-map", value_parser = cli::nonempty_file)]
    gene_id_map: PathBuf,

    /// Genome name to object reference map; switches genomes to references
    #[arg(short = 'r', long = "genome-refs", value_parser = cli::nonempty_file)]
    genome_refs: Option<PathBuf>,

    /// Source genome record JSON, repeatable; enables function and protein annotation
    #[arg(long = "genome-record", value_parser = cli::nonempty_file)]
    genome_records: Vec<PathBuf>,

    /// Output pangenome JSON [default: <motupan>.json]
    #[arg(short = 'p', long = "out")]
    out: Option<PathBuf>,

    /// Output posterior completeness table [default: <motupan>.completeness]
    #[arg(short = 'c', long = "completeness")]
    completeness: Option<PathBuf>,
}

fn with_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(ext);
    PathBuf::from(name)
}

fn main() -> Result<()> {
    let start = Instant::now();
    let cli_args = Cli::parse();

    cli::banner("Build Pangenome");

    // ── Inputs ───────────────────────────────────────────
    cli::section("Inputs");

    let output_json = cli_args
        .out
        .clone()
        .unwrap_or_else(|| with_extension(&cli_args.motupan, ".json"));
    let completeness = cli_args
        .completeness
        .clone()
        .unwrap_or_else(|| with_extension(&cli_args.motupan, ".completeness"));

    let genome_records = cli_args
        .genome_records
        .iter()
        .map(|p| GenomeRecord::from_file(p))
        .collect::<Result<Vec<_>, _>>()
        .context("failed to load genome records")?;

    cli::kv("mOTUpan", &cli_args.motupan.display().to_string());
    cli::kv("Clusters", &cli_args.clusters.display().to_string());
    cli::kv("Gene ID map", &cli_args.gene_id_map.display().to_string());
    match &cli_args.genome_refs {
        Some(path) => cli::kv("Genome IDs", &format!("references ({})", path.display())),
        None => cli::kv("Genome IDs", "names"),
    }
    if !genome_records.is_empty() {
        cli::kv("Genome records", &genome_records.len().to_string());
    }

    eprintln!();

    // ── Assembly ─────────────────────────────────────────
    cli::section("Assembly");

    let run = PipelineRun {
        tools: Default::default(),
        settings: Default::default(),
        faa: PathBuf::new(),
        quality: PathBuf::new(),
        id_map: cli_args.gene_id_map.clone(),
        run_dir: PathBuf::from("."),
        output_json: output_json.clone(),
        genome_refs: cli_args.genome_refs.clone(),
        genome_records,
    };
    assemble_files(&run, &cli_args.clusters, &cli_args.motupan, &completeness)?;

    cli::success(&format!("pangenome: {}", output_json.display()));
    cli::success(&format!("completeness: {}", completeness.display()));

    cli::print_summary(start);
    Ok(())
}
