use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;

use pangenomer::cli;
use pangenomer::config::RunConfig;
use pangenomer::pangenome::{ClusterCategory, read_pangenome};
use pangenomer::pipeline::{PipelineRun, run_pipeline};

#[derive(Parser)]
#[command(
    name = "run_pipeline",
    about = "Run clustering, mOTUpan and pangenome assembly, reusing finished stages"
)]
struct Cli {
    /// Path to the JSON run configuration
    #[arg(short = 'c', long = "config", value_parser = cli::nonempty_file)]
    config: PathBuf,
}

fn main() -> Result<()> {
    let start = Instant::now();
    let cli_args = Cli::parse();

    cli::banner("Run Pipeline");

    // ── Configuration ────────────────────────────────────
    cli::section("Configuration");

    let config = RunConfig::from_file(&cli_args.config)?;
    let run = PipelineRun::from_config(&config)?;

    cli::kv("Config", &cli_args.config.display().to_string());
    cli::kv("Run directory", &run.run_dir.display().to_string());
    cli::kv("Proteins", &run.faa.display().to_string());
    cli::kv("Cluster mode", run.settings.mmseqs_cluster_mode.as_str());
    cli::kv("Min seq ID", &run.settings.mmseqs_min_seq_id.to_string());
    cli::kv("Min coverage", &run.settings.mmseqs_min_coverage.to_string());
    cli::kv("Max iterations", &run.settings.motupan_max_iter.to_string());
    if run.settings.force_redo {
        cli::warning("force redo: all stages will run");
    }

    eprintln!();

    // ── Pipeline ─────────────────────────────────────────
    cli::section("Pipeline");

    let outputs = run_pipeline(&run)?;

    eprintln!();

    // ── Summary ──────────────────────────────────────────
    cli::section("Summary");

    let pangenome = read_pangenome(&outputs.pangenome_json)?;
    cli::kv("Genomes", &pangenome.genome_count.to_string());
    cli::kv("Clusters", &pangenome.orthologs.len().to_string());
    cli::kv("Core", &pangenome.category_count(ClusterCategory::Core).to_string());
    cli::kv(
        "Accessory",
        &pangenome.category_count(ClusterCategory::Accessory).to_string(),
    );
    cli::kv("Completeness", &outputs.completeness.display().to_string());

    cli::print_summary(start);
    Ok(())
}
